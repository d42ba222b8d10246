//! Intervals command implementation.

use tickbar_lib::prelude::*;

/// Lists the supported bar intervals.
pub(crate) fn list_intervals() {
    println!("{:<8} {:>10}", "CODE", "SECONDS");
    println!("{}", "-".repeat(19));

    for interval in Interval::all() {
        let marker = if *interval == Interval::default() {
            " (default)"
        } else {
            ""
        };
        println!("{:<8} {:>10}{marker}", interval.as_str(), interval.seconds());
    }
}
