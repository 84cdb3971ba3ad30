// In-memory view of an asynchronous storage area
//
// Extension storage only answers through promises, while the shuffler
// reads and writes synchronously. A snapshot is loaded up front, served
// from memory, and its changes are written back in one batch.

use super::KeyValueStore;
use crate::error::Result;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

/// Writes made since the last [`SnapshotStore::take_changes`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changes {
    pub set: Vec<(String, String)>,
    pub removed: Vec<String>,
}

impl Changes {
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.removed.is_empty()
    }
}

/// [`KeyValueStore`] over a loaded snapshot, with a change log.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    entries: RefCell<HashMap<String, String>>,
    // None marks a removal; the last write to a key wins
    changes: RefCell<BTreeMap<String, Option<String>>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: RefCell::new(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
            changes: RefCell::default(),
        }
    }

    pub fn has_changes(&self) -> bool {
        !self.changes.borrow().is_empty()
    }

    /// Drain the change log.
    pub fn take_changes(&self) -> Changes {
        let mut changes = Changes::default();
        for (key, value) in std::mem::take(&mut *self.changes.borrow_mut()) {
            match value {
                Some(value) => changes.set.push((key, value)),
                None => changes.removed.push(key),
            }
        }
        changes
    }
}

impl KeyValueStore for SnapshotStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        self.changes
            .borrow_mut()
            .insert(key.to_string(), Some(value.to_string()));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.borrow_mut().remove(key);
        self.changes.borrow_mut().insert(key.to_string(), None);
        Ok(())
    }
}
