//! Grid-state file codec.
//!
//! The unified executor persists its `SpreadEntryState` map here on every
//! mutation; startup recovery restores `last_z_entry` from this file so the
//! pyramid ladder survives restarts.

use crate::atomic::write_json_atomic;
use crate::error::PersistenceResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statarb_core::{SpreadEntryState, SpreadId};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

#[derive(Debug, Serialize, Deserialize)]
struct StateFileSchema {
    spreads: BTreeMap<String, SpreadEntryState>,
    last_updated: DateTime<Utc>,
}

/// Owner of `spread_states.json`.
pub struct SpreadStateFile {
    path: PathBuf,
}

impl SpreadStateFile {
    pub fn new(state_dir: impl Into<PathBuf>) -> PersistenceResult<Self> {
        let state_dir = state_dir.into();
        fs::create_dir_all(&state_dir)?;
        Ok(Self {
            path: state_dir.join("spread_states.json"),
        })
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Persist the full state map (may be empty after an exit).
    pub fn save(&self, states: &BTreeMap<SpreadId, SpreadEntryState>) -> PersistenceResult<()> {
        let schema = StateFileSchema {
            spreads: states
                .iter()
                .map(|(id, state)| (id.as_str().to_string(), state.clone()))
                .collect(),
            last_updated: Utc::now(),
        };
        write_json_atomic(&self.path, &schema)?;
        debug!(spreads = states.len(), path = %self.path.display(), "Spread states saved");
        Ok(())
    }

    /// Load the state map; a missing or unreadable file is an empty map.
    #[must_use]
    pub fn load(&self) -> BTreeMap<SpreadId, SpreadEntryState> {
        if !self.path.exists() {
            return BTreeMap::new();
        }
        let schema: StateFileSchema = match fs::read(&self.path)
            .map(|bytes| serde_json::from_slice(&bytes))
        {
            Ok(Ok(schema)) => schema,
            Ok(Err(e)) => {
                warn!(?e, "Failed to parse spread states, starting fresh");
                return BTreeMap::new();
            }
            Err(e) => {
                warn!(?e, "Failed to read spread states, starting fresh");
                return BTreeMap::new();
            }
        };
        schema
            .spreads
            .into_iter()
            .map(|(id, state)| (SpreadId(id), state))
            .collect()
    }
}
