//! Operator-facing alert stream.
//!
//! The engine exposes alerts as a broadcast channel instead of GUI
//! callbacks; any number of consumers (CLI printer, notification bridge)
//! can subscribe, and emitting with no subscribers is a no-op.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARNING"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// A single operator alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Broadcast bus for alerts.
#[derive(Clone)]
pub struct AlertBus {
    tx: broadcast::Sender<Alert>,
}

impl AlertBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn emit(&self, severity: AlertSeverity, title: &str, message: String) {
        let alert = Alert {
            severity,
            title: title.to_string(),
            message,
            at: Utc::now(),
        };
        // No subscribers is fine; alerts are also always logged by callers.
        let _ = self.tx.send(alert);
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Alert> {
        self.tx.subscribe()
    }
}

impl Default for AlertBus {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_and_receive() {
        let bus = AlertBus::new(8);
        let mut rx = bus.subscribe();

        bus.emit(
            AlertSeverity::Critical,
            "Daily Limit Breach",
            String::from("daily P&L -3100 below limit -1000"),
        );

        let alert = rx.recv().await.unwrap();
        assert_eq!(alert.severity, AlertSeverity::Critical);
        assert_eq!(alert.title, "Daily Limit Breach");
    }

    #[test]
    fn test_emit_without_subscribers_is_noop() {
        let bus = AlertBus::new(8);
        bus.emit(AlertSeverity::Info, "status", String::from("ok"));
    }
}
