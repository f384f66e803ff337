//! Per-leg position persistence.
//!
//! File layout under the data directory:
//!
//! ```text
//! positions/
//!     active_positions.json      # all active legs
//!     spread_<id>.json           # per-spread backup
//!     history/
//!         closed_<id>_<ts>.json  # archived spreads (audit trail)
//! ```

use crate::atomic::write_json_atomic;
use crate::error::PersistenceResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statarb_core::{Lots, OrderAction, PositionId, Price, SpreadId};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

/// One persisted leg. Two per spread on a healthy spread; a volume
/// rebalance can make the count odd.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedPosition {
    pub position_id: PositionId,
    pub spread_id: SpreadId,
    pub broker_ticket: u64,
    pub symbol: String,
    pub side: OrderAction,
    pub volume: Lots,
    pub entry_price: Price,
    pub entry_time: DateTime<Utc>,
    pub entry_zscore: f64,
    pub hedge_ratio: f64,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// Archive record written when a spread closes.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ArchivedSpread {
    spread_id: SpreadId,
    closed_at: DateTime<Utc>,
    reason: String,
    positions: BTreeMap<String, PersistedPosition>,
}

/// Owner of the on-disk position files.
pub struct PositionStore {
    data_dir: PathBuf,
    active_file: PathBuf,
    history_dir: PathBuf,
}

impl PositionStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> PersistenceResult<Self> {
        let data_dir = data_dir.into();
        let history_dir = data_dir.join("history");
        fs::create_dir_all(&history_dir)?;
        Ok(Self {
            active_file: data_dir.join("active_positions.json"),
            data_dir,
            history_dir,
        })
    }

    /// Insert or update one leg and rewrite the active file atomically,
    /// along with the per-spread backup.
    pub fn save_position(&self, position: &PersistedPosition) -> PersistenceResult<()> {
        let mut positions = self.load_active_raw();
        positions.insert(position.position_id.as_str().to_string(), position.clone());
        write_json_atomic(&self.active_file, &positions)?;

        let spread: BTreeMap<_, _> = positions
            .iter()
            .filter(|(_, p)| p.spread_id == position.spread_id)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        write_json_atomic(&self.spread_backup_path(&position.spread_id), &spread)?;

        info!(
            position_id = %position.position_id,
            ticket = position.broker_ticket,
            "Position saved"
        );
        Ok(())
    }

    /// All active legs keyed by position id.
    #[must_use]
    pub fn load_active(&self) -> BTreeMap<String, PersistedPosition> {
        self.load_active_raw()
    }

    pub fn delete_position(&self, position_id: &PositionId) -> PersistenceResult<()> {
        let mut positions = self.load_active_raw();
        if positions.remove(position_id.as_str()).is_none() {
            warn!(position_id = %position_id, "Position not found in storage");
            return Ok(());
        }
        write_json_atomic(&self.active_file, &positions)
    }

    /// Drop every leg of a spread, including its backup file.
    pub fn delete_spread(&self, spread_id: &SpreadId) -> PersistenceResult<usize> {
        let mut positions = self.load_active_raw();
        let before = positions.len();
        positions.retain(|_, p| &p.spread_id != spread_id);
        write_json_atomic(&self.active_file, &positions)?;

        let backup = self.spread_backup_path(spread_id);
        if backup.exists() {
            fs::remove_file(&backup)?;
        }
        Ok(before - positions.len())
    }

    /// Move a spread to the history directory, then drop it from the
    /// active file.
    pub fn archive_spread(&self, spread_id: &SpreadId, reason: &str) -> PersistenceResult<()> {
        let positions = self.load_active_raw();
        let spread: BTreeMap<_, _> = positions
            .into_iter()
            .filter(|(_, p)| &p.spread_id == spread_id)
            .collect();
        self.archive_records(spread_id, spread, reason)
    }

    /// Archive the given records for a spread, then drop whatever the
    /// active file still holds for it.
    ///
    /// Recovery uses this with a snapshot taken before orphan cleanup, so
    /// spreads whose records were just pruned still leave an audit trail.
    pub fn archive_records(
        &self,
        spread_id: &SpreadId,
        records: BTreeMap<String, PersistedPosition>,
        reason: &str,
    ) -> PersistenceResult<()> {
        if records.is_empty() {
            warn!(spread_id = %spread_id, "No positions found for spread, nothing to archive");
            return Ok(());
        }

        let now = Utc::now();
        let archive = ArchivedSpread {
            spread_id: spread_id.clone(),
            closed_at: now,
            reason: reason.to_string(),
            positions: records,
        };
        let name = format!(
            "closed_{}_{}.json",
            spread_id.as_str(),
            now.format("%Y%m%d_%H%M%S")
        );
        write_json_atomic(&self.history_dir.join(name), &archive)?;
        self.delete_spread(spread_id)?;

        info!(spread_id = %spread_id, reason, "Spread archived");
        Ok(())
    }

    /// Wipe the active file (emergency close / full reset).
    pub fn clear_all(&self) -> PersistenceResult<()> {
        write_json_atomic(&self.active_file, &BTreeMap::<String, PersistedPosition>::new())
    }

    #[must_use]
    pub fn spread_positions(&self, spread_id: &SpreadId) -> Vec<PersistedPosition> {
        self.load_active_raw()
            .into_values()
            .filter(|p| &p.spread_id == spread_id)
            .collect()
    }

    /// Remove legs whose ticket is not in `live_tickets`. Returns how many
    /// were dropped.
    pub fn cleanup_orphaned(&self, live_tickets: &HashSet<u64>) -> PersistenceResult<usize> {
        let mut positions = self.load_active_raw();
        let before = positions.len();
        positions.retain(|_, p| {
            let alive = live_tickets.contains(&p.broker_ticket);
            if !alive {
                warn!(
                    position_id = %p.position_id,
                    ticket = p.broker_ticket,
                    "Orphaned position dropped"
                );
            }
            alive
        });
        let dropped = before - positions.len();
        if dropped > 0 {
            write_json_atomic(&self.active_file, &positions)?;
        }
        Ok(dropped)
    }

    #[must_use]
    pub fn history_count(&self) -> usize {
        fs::read_dir(&self.history_dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_name().to_string_lossy().starts_with("closed_"))
                    .count()
            })
            .unwrap_or(0)
    }

    fn spread_backup_path(&self, spread_id: &SpreadId) -> PathBuf {
        self.data_dir.join(format!("spread_{}.json", spread_id.as_str()))
    }

    fn load_active_raw(&self) -> BTreeMap<String, PersistedPosition> {
        if !self.active_file.exists() {
            return BTreeMap::new();
        }
        match fs::read(&self.active_file).map(|bytes| serde_json::from_slice(&bytes)) {
            Ok(Ok(map)) => map,
            Ok(Err(e)) => {
                warn!(?e, "Failed to parse active positions, starting empty");
                BTreeMap::new()
            }
            Err(e) => {
                warn!(?e, "Failed to read active positions, starting empty");
                BTreeMap::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample(spread: &str, ticket: u64, primary: bool) -> PersistedPosition {
        let now = Utc::now();
        PersistedPosition {
            position_id: PositionId::random(),
            spread_id: SpreadId(spread.to_string()),
            broker_ticket: ticket,
            symbol: if primary { "XAUUSD" } else { "XAGUSD" }.to_string(),
            side: if primary { OrderAction::Buy } else { OrderAction::Sell },
            volume: Lots::new(dec!(0.5)),
            entry_price: Price::new(dec!(2400)),
            entry_time: now,
            entry_zscore: -2.1,
            hedge_ratio: 2.0,
            is_primary: primary,
            created_at: now,
            last_updated: now,
        }
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = PositionStore::new(dir.path().join("positions")).unwrap();

        let pos = sample("s1", 111, true);
        store.save_position(&pos).unwrap();
        store.save_position(&sample("s1", 222, false)).unwrap();

        let loaded = store.load_active();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[pos.position_id.as_str()], pos);
    }

    #[test]
    fn test_archive_moves_to_history() {
        let dir = tempfile::tempdir().unwrap();
        let store = PositionStore::new(dir.path().join("positions")).unwrap();
        let spread = SpreadId(String::from("s1"));

        store.save_position(&sample("s1", 111, true)).unwrap();
        store.save_position(&sample("s1", 222, false)).unwrap();
        store.save_position(&sample("s2", 333, true)).unwrap();

        store.archive_spread(&spread, "all_closed_offline").unwrap();

        assert_eq!(store.load_active().len(), 1);
        assert_eq!(store.history_count(), 1);
        assert!(store.spread_positions(&spread).is_empty());
    }

    #[test]
    fn test_archive_records_after_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let store = PositionStore::new(dir.path().join("positions")).unwrap();
        let spread = SpreadId(String::from("s1"));

        store.save_position(&sample("s1", 111, true)).unwrap();
        store.save_position(&sample("s1", 222, false)).unwrap();

        // Snapshot before the prune, as recovery does.
        let snapshot = store.load_active();
        let dropped = store.cleanup_orphaned(&HashSet::new()).unwrap();
        assert_eq!(dropped, 2);
        assert!(store.load_active().is_empty());

        // The audit trail still gets written from the snapshot.
        store
            .archive_records(&spread, snapshot, "all_closed_offline")
            .unwrap();
        assert_eq!(store.history_count(), 1);
    }

    #[test]
    fn test_cleanup_orphaned() {
        let dir = tempfile::tempdir().unwrap();
        let store = PositionStore::new(dir.path().join("positions")).unwrap();

        store.save_position(&sample("s1", 111, true)).unwrap();
        store.save_position(&sample("s1", 222, false)).unwrap();

        let live: HashSet<u64> = [222].into_iter().collect();
        let dropped = store.cleanup_orphaned(&live).unwrap();
        assert_eq!(dropped, 1);

        let remaining = store.load_active();
        assert_eq!(remaining.len(), 1);
        assert!(remaining.values().all(|p| p.broker_ticket == 222));
    }

    #[test]
    fn test_clear_all() {
        let dir = tempfile::tempdir().unwrap();
        let store = PositionStore::new(dir.path().join("positions")).unwrap();
        store.save_position(&sample("s1", 111, true)).unwrap();

        store.clear_all().unwrap();
        assert!(store.load_active().is_empty());
    }
}
