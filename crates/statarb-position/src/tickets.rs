//! Shared broker-ticket sets.
//!
//! The monitor worker and the risk supervisor each hold their own
//! `TicketWatch`; every fill registers with both (dual registration), so a
//! stalled monitor cannot blind the risk side's manual-closure detection.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// Thread-safe set of watched broker tickets.
#[derive(Debug, Clone, Default)]
pub struct TicketWatch {
    inner: Arc<Mutex<HashSet<u64>>>,
}

impl TicketWatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, ticket: u64) {
        self.inner.lock().insert(ticket);
    }

    pub fn unregister(&self, ticket: u64) {
        self.inner.lock().remove(&ticket);
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    #[must_use]
    pub fn contains(&self, ticket: u64) -> bool {
        self.inner.lock().contains(&ticket)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    #[must_use]
    pub fn snapshot(&self) -> HashSet<u64> {
        self.inner.lock().clone()
    }

    /// Tickets in the watch set that are absent from `live`.
    #[must_use]
    pub fn missing_from(&self, live: &HashSet<u64>) -> HashSet<u64> {
        self.inner.lock().difference(live).copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_missing() {
        let watch = TicketWatch::new();
        watch.register(111);
        watch.register(222);

        let live: HashSet<u64> = [222].into_iter().collect();
        let missing = watch.missing_from(&live);
        assert_eq!(missing, [111].into_iter().collect());

        // All gone from the broker.
        let missing = watch.missing_from(&HashSet::new());
        assert_eq!(missing.len(), 2);
    }

    #[test]
    fn test_clones_share_state() {
        let watch = TicketWatch::new();
        let other = watch.clone();
        watch.register(7);
        assert!(other.contains(7));
        other.clear();
        assert!(watch.is_empty());
    }
}
