//! Alert throttling.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// At most one identical alert per cooldown window.
#[derive(Debug)]
pub struct AlertThrottle {
    cooldown: Duration,
    last_fired: HashMap<String, Instant>,
}

impl AlertThrottle {
    #[must_use]
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_fired: HashMap::new(),
        }
    }

    /// Standard 5-minute throttle.
    #[must_use]
    pub fn default_cooldown() -> Self {
        Self::new(Duration::from_secs(300))
    }

    /// True when the alert keyed by `key` may fire now; firing records the
    /// timestamp.
    pub fn should_alert(&mut self, key: &str) -> bool {
        let now = Instant::now();
        match self.last_fired.get(key) {
            Some(last) if now.duration_since(*last) < self.cooldown => false,
            _ => {
                self.last_fired.insert(key.to_string(), now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_alert_fires_repeat_suppressed() {
        let mut throttle = AlertThrottle::new(Duration::from_secs(60));
        assert!(throttle.should_alert("margin_critical"));
        assert!(!throttle.should_alert("margin_critical"));
        // Distinct keys are independent.
        assert!(throttle.should_alert("drawdown_high"));
    }

    #[test]
    fn test_fires_again_after_cooldown() {
        let mut throttle = AlertThrottle::new(Duration::from_millis(10));
        assert!(throttle.should_alert("x"));
        std::thread::sleep(Duration::from_millis(15));
        assert!(throttle.should_alert("x"));
    }
}
