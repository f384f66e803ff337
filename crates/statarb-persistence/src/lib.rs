//! Durable state files.
//!
//! Everything the engine needs to survive a crash lives in small JSON
//! files, each written atomically (temp file + rename). Owners:
//! - `PositionStore`: active legs, per-spread backups, close archive
//! - `SetupFlagManager`: the active-setup flag checked first at startup
//! - `SpreadStateFile`: the unified executor's grid state

pub mod atomic;
pub mod error;
pub mod positions;
pub mod setup_flag;
pub mod spread_state;

pub use atomic::write_json_atomic;
pub use error::{PersistenceError, PersistenceResult};
pub use positions::{PersistedPosition, PositionStore};
pub use setup_flag::{SetupFlagInfo, SetupFlagManager};
pub use spread_state::SpreadStateFile;
