//! CLI command implementations.

pub(crate) mod bars;
pub(crate) mod intervals;
pub(crate) mod run;
