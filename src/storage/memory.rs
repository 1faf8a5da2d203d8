//! In-memory and no-op stores.

use std::collections::HashMap;

use super::KeyValueStore;
use crate::types::ToteError;

/// Map-backed store. Contents are lost when it is dropped.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a value, e.g. a history written by another session.
    pub fn with_entry(mut self, key: &str, value: &str) -> Self {
        self.entries.insert(key.to_string(), value.to_string());
        self
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, ToteError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), ToteError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn is_persistent(&self) -> bool {
        false
    }
}

/// Store for contexts without persistence. Reads find nothing, writes
/// succeed and are discarded.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStore;

impl KeyValueStore for NullStore {
    fn get(&self, _key: &str) -> Result<Option<String>, ToteError> {
        Ok(None)
    }

    fn set(&mut self, _key: &str, _value: &str) -> Result<(), ToteError> {
        Ok(())
    }

    fn is_persistent(&self) -> bool {
        false
    }
}
