//! The replicated key-value store.

use dashmap::DashMap;

use crate::types::Operation;

/// One node's copy of the replicated keyed mapping.
///
/// Only the learner path mutates the store ([`apply`](Self::apply) is
/// crate-private); clients read through [`get`](Self::get), which returns an
/// unsynchronized local snapshot with no cross-node guarantee.
#[derive(Debug, Default)]
pub struct ReplicatedStore {
    entries: DashMap<String, String>,
}

impl ReplicatedStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the current local value for `key`.
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Number of keys currently present.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Apply a learned operation, returning the value it displaced.
    pub(crate) fn apply(&self, operation: &Operation) -> Option<String> {
        match operation {
            Operation::Write { key, value } => self.entries.insert(key.clone(), value.clone()),
            Operation::Delete { key } => self.entries.remove(key).map(|(_, value)| value),
        }
    }
}
