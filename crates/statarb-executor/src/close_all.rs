//! Bounded-parallel close-all by strategy tag.
//!
//! Fetches the open positions once, fires every per-ticket close request
//! concurrently (bounded), and retries survivors for up to two global
//! rounds. Closing an already-closed ticket is a broker-side no-op, so
//! concurrent close-alls from the risk supervisor and the execution worker
//! converge.

use crate::error::ExecutorResult;
use futures_util::stream::{self, StreamExt};
use statarb_broker::{DynBroker, OrderRequest, PositionInfo};
use tracing::{error, info, warn};

/// Outcome of one close-all sweep.
#[derive(Debug, Clone, Default)]
pub struct CloseReport {
    pub total_closed: usize,
    pub total_failed: usize,
    pub rounds: usize,
    /// Tickets still open after the final round; non-empty means fail-closed.
    pub remaining: Vec<u64>,
}

impl CloseReport {
    #[must_use]
    pub fn success(&self) -> bool {
        self.remaining.is_empty()
    }
}

/// Parallel closer for every position under the strategy magic.
pub struct CloseManager {
    broker: DynBroker,
    magic: u32,
    max_workers: usize,
    max_rounds: usize,
}

impl CloseManager {
    #[must_use]
    pub fn new(broker: DynBroker, magic: u32) -> Self {
        Self {
            broker,
            magic,
            max_workers: 100,
            max_rounds: 2,
        }
    }

    /// Close everything stamped with the strategy magic.
    pub async fn close_all(&self) -> ExecutorResult<CloseReport> {
        warn!(magic = self.magic, "Close-all initiated");
        let mut report = CloseReport::default();

        for round in 1..=self.max_rounds {
            report.rounds = round;
            let positions = self.broker.positions(Some(self.magic)).await?;
            if positions.is_empty() {
                break;
            }
            info!(round, count = positions.len(), "Closing positions");

            let results: Vec<bool> = stream::iter(positions.into_iter().map(|pos| {
                let broker = self.broker.clone();
                let magic = self.magic;
                async move { close_one(&broker, magic, &pos).await }
            }))
            .buffer_unordered(self.max_workers)
            .collect()
            .await;

            let closed = results.iter().filter(|ok| **ok).count();
            let failed = results.len() - closed;
            report.total_closed += closed;
            report.total_failed += failed;

            if failed == 0 {
                break;
            }
            warn!(round, failed, "Retrying failed closes");
        }

        report.remaining = self
            .broker
            .positions(Some(self.magic))
            .await?
            .into_iter()
            .map(|p| p.ticket)
            .collect();

        if report.success() {
            info!(
                closed = report.total_closed,
                rounds = report.rounds,
                "Close-all complete"
            );
        } else {
            error!(
                remaining = ?report.remaining,
                "Close-all incomplete, manual intervention may be required"
            );
        }
        Ok(report)
    }
}

async fn close_one(broker: &DynBroker, magic: u32, pos: &PositionInfo) -> bool {
    let request = OrderRequest::close(
        &pos.symbol,
        pos.action.opposite(),
        pos.volume,
        pos.ticket,
        magic,
        "FAST_CLOSE_ALL",
    );
    match broker.order_send(request).await {
        Ok(result) if result.is_done() => true,
        Ok(result) => {
            warn!(ticket = pos.ticket, reason = %result.comment, "Close rejected");
            false
        }
        Err(e) => {
            warn!(ticket = pos.ticket, error = %e, "Close failed");
            false
        }
    }
}
