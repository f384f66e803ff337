//! Bounded action queue with exit preemption.
//!
//! Single-producer single-consumer FIFO: the signal worker enqueues without
//! blocking, the execution worker dequeues with a timeout so it can poll the
//! shared running flag between waits. An exit enqueue drains everything
//! queued ahead of it so the close is consumed next.

use crate::action::Action;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::warn;

/// Bounded FIFO of pending actions.
pub struct ActionQueue {
    inner: Mutex<VecDeque<Action>>,
    notify: Notify,
    capacity: usize,
}

impl ActionQueue {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            capacity,
        }
    }

    /// Non-blocking enqueue.
    ///
    /// Returns the action back to the caller when the queue is full.
    pub fn push(&self, action: Action) -> Result<(), Action> {
        {
            let mut queue = self.inner.lock();
            if queue.len() >= self.capacity {
                return Err(action);
            }
            queue.push_back(action);
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Enqueue an exit, discarding everything queued before it.
    ///
    /// Returns the number of actions that were dropped.
    pub fn push_preempting(&self, action: Action) -> usize {
        let dropped = {
            let mut queue = self.inner.lock();
            let dropped = queue.len();
            queue.clear();
            queue.push_back(action);
            dropped
        };
        if dropped > 0 {
            warn!(dropped, "Cleared queued actions for exit priority");
        }
        self.notify.notify_one();
        dropped
    }

    /// Dequeue with a timeout.
    ///
    /// Returns `None` when nothing arrived within `timeout`.
    pub async fn pop_timeout(&self, timeout: Duration) -> Option<Action> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(action) = self.inner.lock().pop_front() {
                return Some(action);
            }
            let notified = self.notify.notified();
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.inner.lock().pop_front();
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SpreadSide;

    fn exit_action() -> Action {
        Action::Exit {
            side: SpreadSide::Long,
            zscore: -0.4,
        }
    }

    fn rebalance_action() -> Action {
        use crate::action::VolumeAdjustment;
        use crate::decimal::Lots;
        use crate::types::{MarketSnapshot, OrderAction, SpreadId};
        use rust_decimal_macros::dec;

        Action::VolumeRebalance {
            adjustment: VolumeAdjustment {
                spread_id: SpreadId(String::from("test")),
                symbol: String::from("XAGUSD"),
                action: OrderAction::Buy,
                quantity: Lots::new(dec!(0.2)),
                reason: String::from("test"),
                old_hedge: 1.9,
                new_hedge: 2.0,
            },
            snapshot: MarketSnapshot {
                timestamp: chrono::Utc::now(),
                primary_bid: 2400.0,
                primary_ask: 2400.5,
                secondary_bid: 30.0,
                secondary_ask: 30.02,
                spread: 2340.0,
                spread_mean: 2300.0,
                spread_std: 20.0,
                zscore: 2.0,
                hedge_ratio: 2.0,
            },
        }
    }

    #[tokio::test]
    async fn test_push_pop_order() {
        let queue = ActionQueue::new(4);
        queue.push(rebalance_action()).unwrap();
        queue.push(exit_action()).unwrap();

        let first = queue.pop_timeout(Duration::from_millis(10)).await.unwrap();
        assert_eq!(first.kind(), "VOLUME_REBALANCE");
        let second = queue.pop_timeout(Duration::from_millis(10)).await.unwrap();
        assert!(second.is_exit());
    }

    #[tokio::test]
    async fn test_capacity_rejects() {
        let queue = ActionQueue::new(1);
        queue.push(rebalance_action()).unwrap();
        assert!(queue.push(rebalance_action()).is_err());
    }

    #[tokio::test]
    async fn test_preemption_clears_queue() {
        let queue = ActionQueue::new(4);
        queue.push(rebalance_action()).unwrap();
        queue.push(rebalance_action()).unwrap();

        let dropped = queue.push_preempting(exit_action());
        assert_eq!(dropped, 2);
        assert_eq!(queue.len(), 1);

        let next = queue.pop_timeout(Duration::from_millis(10)).await.unwrap();
        assert!(next.is_exit());
    }

    #[tokio::test]
    async fn test_pop_timeout_empty() {
        let queue = ActionQueue::new(4);
        let got = queue.pop_timeout(Duration::from_millis(20)).await;
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn test_pop_wakes_on_push() {
        let queue = std::sync::Arc::new(ActionQueue::new(4));
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop_timeout(Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.push(exit_action()).unwrap();

        let got = consumer.await.unwrap();
        assert!(got.unwrap().is_exit());
    }
}
