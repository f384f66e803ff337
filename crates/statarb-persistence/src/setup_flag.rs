//! Active-setup flag.
//!
//! The first thing startup recovery reads: flag active means positions may
//! be open and reconciliation is required; inactive means a fresh start.

use crate::atomic::write_json_atomic;
use crate::error::PersistenceResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statarb_core::SpreadId;
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

/// Contents of `active_setup_flag.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetupFlagInfo {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spread_id: Option<SpreadId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deactivated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Owner of the setup flag file.
pub struct SetupFlagManager {
    flag_file: PathBuf,
}

impl SetupFlagManager {
    pub fn new(data_dir: impl Into<PathBuf>) -> PersistenceResult<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)?;
        Ok(Self {
            flag_file: data_dir.join("active_setup_flag.json"),
        })
    }

    #[must_use]
    pub fn is_setup_active(&self) -> bool {
        self.read().map_or(false, |info| info.active)
    }

    pub fn mark_setup_active(
        &self,
        spread_id: &SpreadId,
        metadata: serde_json::Value,
    ) -> PersistenceResult<()> {
        let info = SetupFlagInfo {
            active: true,
            spread_id: Some(spread_id.clone()),
            activated_at: Some(Utc::now()),
            deactivated_at: None,
            reason: None,
            metadata,
        };
        write_json_atomic(&self.flag_file, &info)?;
        info!(spread_id = %spread_id.prefix(), "Setup flag: ACTIVE");
        Ok(())
    }

    pub fn mark_setup_inactive(&self, reason: &str) -> PersistenceResult<()> {
        let info = SetupFlagInfo {
            active: false,
            spread_id: None,
            activated_at: None,
            deactivated_at: Some(Utc::now()),
            reason: Some(reason.to_string()),
            metadata: serde_json::Value::Null,
        };
        write_json_atomic(&self.flag_file, &info)?;
        info!(reason, "Setup flag: INACTIVE");
        Ok(())
    }

    /// Flag contents if a setup is active.
    #[must_use]
    pub fn setup_info(&self) -> Option<SetupFlagInfo> {
        self.read().filter(|info| info.active)
    }

    pub fn clear(&self) -> PersistenceResult<()> {
        if self.flag_file.exists() {
            fs::remove_file(&self.flag_file)?;
        }
        Ok(())
    }

    fn read(&self) -> Option<SetupFlagInfo> {
        if !self.flag_file.exists() {
            return None;
        }
        match fs::read(&self.flag_file).map(|bytes| serde_json::from_slice(&bytes)) {
            Ok(Ok(info)) => Some(info),
            Ok(Err(e)) => {
                warn!(?e, "Failed to parse setup flag");
                None
            }
            Err(e) => {
                warn!(?e, "Failed to read setup flag");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SetupFlagManager::new(dir.path()).unwrap();
        assert!(!manager.is_setup_active());

        let spread = SpreadId(String::from("s1"));
        manager
            .mark_setup_active(&spread, serde_json::json!({"side": "LONG"}))
            .unwrap();
        assert!(manager.is_setup_active());

        let info = manager.setup_info().unwrap();
        assert_eq!(info.spread_id, Some(spread));
        assert_eq!(info.metadata["side"], "LONG");

        manager.mark_setup_inactive("Emergency close").unwrap();
        assert!(!manager.is_setup_active());
        assert!(manager.setup_info().is_none());
    }

    #[test]
    fn test_clear_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SetupFlagManager::new(dir.path()).unwrap();
        manager
            .mark_setup_active(&SpreadId(String::from("s1")), serde_json::Value::Null)
            .unwrap();
        manager.clear().unwrap();
        assert!(!manager.is_setup_active());
    }
}
