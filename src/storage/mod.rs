//! Persistence layer.
//!
//! Saved races live under a single key in a small key-value store, as one
//! JSON array that is overwritten wholesale on every save or delete.
//! Backends:
//! - [`FileStore`]: one JSON file per key in a data directory
//! - [`MemoryStore`]: in-process map, used by tests and previews
//! - [`NullStore`]: no persistence at all; reads are empty, writes vanish

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::{MemoryStore, NullStore};

use tracing::{debug, info};

use crate::types::{Snapshot, ToteError};

/// Key under which the saved race history is stored.
pub const HISTORY_KEY: &str = "tote-saved-races";

/// Minimal string key-value store backing the race history.
#[cfg_attr(test, mockall::automock)]
pub trait KeyValueStore {
    /// Fetch the raw value for `key`, or `None` if nothing is stored.
    fn get(&self, key: &str) -> Result<Option<String>, ToteError>;

    /// Replace the value stored under `key`.
    fn set(&mut self, key: &str, value: &str) -> Result<(), ToteError>;

    /// Whether writes survive the process. `NullStore` says no.
    fn is_persistent(&self) -> bool {
        true
    }
}

/// Serialize the full history and overwrite the stored copy.
pub fn save_history(store: &mut dyn KeyValueStore, history: &[Snapshot]) -> Result<(), ToteError> {
    let json = serde_json::to_string(history)
        .map_err(|e| ToteError::Storage(format!("Failed to serialise history: {e}")))?;
    store.set(HISTORY_KEY, &json)?;
    debug!(races = history.len(), bytes = json.len(), "History saved");
    Ok(())
}

/// Read the stored history.
/// Returns `None` when nothing has been stored yet (fresh start).
pub fn load_history(store: &dyn KeyValueStore) -> Result<Option<Vec<Snapshot>>, ToteError> {
    let Some(json) = store.get(HISTORY_KEY)? else {
        info!(key = HISTORY_KEY, "No saved races found, starting fresh");
        return Ok(None);
    };

    let history: Vec<Snapshot> =
        serde_json::from_str(&json).map_err(|source| ToteError::PersistenceCorruption {
            key: HISTORY_KEY.to_string(),
            source,
        })?;

    info!(races = history.len(), "Saved races loaded");
    Ok(Some(history))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
