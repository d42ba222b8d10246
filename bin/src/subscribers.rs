//! Subscribers shipped with the CLI.

use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use tickbar_lib::prelude::*;
use tracing::info;

/// Logs every finalized bar.
#[derive(Debug, Default)]
pub(crate) struct BarLogSubscriber;

#[async_trait]
impl Subscriber for BarLogSubscriber {
    fn name(&self) -> &str {
        "bar-log"
    }

    async fn on_bar(&self, bar: Arc<Bar>) -> SubscriberResult {
        info!(
            symbol = bar.symbol(),
            interval_start = %bar.interval_start(),
            open = %bar.open(),
            high = %bar.high(),
            low = %bar.low(),
            close = %bar.close(),
            volume = bar.volume(),
            ticks = bar.tick_count(),
            "Bar finalized"
        );
        Ok(())
    }
}

/// Writes every finalized bar to stdout as one JSON line.
#[derive(Debug, Default)]
pub(crate) struct StdoutSubscriber;

#[async_trait]
impl Subscriber for StdoutSubscriber {
    fn name(&self) -> &str {
        "stdout"
    }

    async fn on_bar(&self, bar: Arc<Bar>) -> SubscriberResult {
        let line = serde_json::to_string(bar.as_ref())?;
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{line}")?;
        Ok(())
    }
}
