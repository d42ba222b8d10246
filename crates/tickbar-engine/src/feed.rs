//! NDJSON tick feed ingestion.

use futures::stream::{self, Stream, StreamExt};
use serde::Serialize;
use tickbar_aggregate::AggregateError;
use tickbar_types::{Tick, TickError};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::Engine;

/// Totals from one [`drive`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FeedReport {
    /// Non-blank lines read.
    pub lines: u64,
    /// Ticks accepted by the engine.
    pub accepted: u64,
    /// Lines that did not decode or validate.
    pub rejected: u64,
    /// True if the run stopped on cancellation rather than end of input.
    pub cancelled: bool,
}

/// Decodes newline-delimited JSON ticks from `reader`.
///
/// Blank lines are skipped. A line that fails to decode yields an error and
/// the stream continues; a read error yields an error and ends the stream.
pub fn tick_stream<R>(reader: R) -> impl Stream<Item = Result<Tick, TickError>>
where
    R: AsyncBufRead + Unpin + Send,
{
    stream::unfold(Some(reader.lines()), |state| async move {
        let Some(mut lines) = state else {
            return None;
        };
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    return Some((Tick::from_json(line), Some(lines)));
                }
                Ok(None) => return None,
                Err(e) => {
                    return Some((Err(TickError::Decode(format!("read failed: {e}"))), None));
                }
            }
        }
    })
}

/// Feeds `ticks` into the engine until the stream ends or `cancel` fires.
///
/// Rejected ticks are counted and skipped. The engine is not flushed; call
/// [`Engine::shutdown`] afterwards.
pub async fn drive<S>(engine: &Engine, ticks: S, cancel: &CancellationToken) -> FeedReport
where
    S: Stream<Item = Result<Tick, TickError>>,
{
    let mut ticks = std::pin::pin!(ticks);
    let mut report = FeedReport::default();

    loop {
        let item = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                report.cancelled = true;
                break;
            }
            item = ticks.next() => item,
        };
        let Some(item) = item else { break };
        report.lines += 1;

        match item {
            // A full shard queue must not hold off cancellation.
            Ok(tick) => match tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    report.cancelled = true;
                    break;
                }
                result = engine.ingest(tick) => result,
            } {
                Ok(()) => report.accepted += 1,
                Err(AggregateError::Closed) => {
                    warn!("Engine closed, stopping feed");
                    break;
                }
                Err(_) => report.rejected += 1,
            },
            Err(e) => {
                engine.reject(&e);
                report.rejected += 1;
            }
        }
    }

    info!(
        lines = report.lines,
        accepted = report.accepted,
        rejected = report.rejected,
        cancelled = report.cancelled,
        "Feed finished"
    );
    report
}
