// Storage module for shuffler state persistence
//
// Everything the shuffler persists is a small JSON string under a fixed
// key:
// - the identity salt
// - the user config
// - per-site settings
// - rotation bookkeeping
//
// In the browser these live in extension storage, never in the page's
// own storage.

#[cfg(target_arch = "wasm32")]
mod extension;
mod snapshot;

#[cfg(target_arch = "wasm32")]
pub use extension::ExtensionStore;
pub use snapshot::{Changes, SnapshotStore};

use crate::error::{Result, ShufflerError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::cell::RefCell;
use std::collections::HashMap;

pub const SALT_KEY: &str = "fp_salt";
pub const CONFIG_KEY: &str = "fpConfig";
pub const SITE_SETTINGS_KEY: &str = "fp_site_settings";
pub const ROTATION_INFO_KEY: &str = "fp_rotation_info";

/// Every key the shuffler reads or writes.
pub const STORED_KEYS: [&str; 4] = [SALT_KEY, CONFIG_KEY, SITE_SETTINGS_KEY, ROTATION_INFO_KEY];

/// Whether a stored string is a JSON object or array rather than a bare
/// value such as the salt.
pub fn is_json_document(value: &str) -> bool {
    matches!(value.trim_start().as_bytes().first(), Some(b'{') | Some(b'['))
}

/// Synchronous string key/value store.
///
/// Asynchronous backends are served through a [`SnapshotStore`].
/// Implementations use interior mutability; the shuffler never shares a
/// store across threads.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// In-memory store for native hosts and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for std::rc::Rc<S> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }
}

/// Load and deserialize a JSON document stored under `key`.
pub fn load_json<T, S>(store: &S, key: &str) -> Result<Option<T>>
where
    T: DeserializeOwned,
    S: KeyValueStore + ?Sized,
{
    match store.get(key)? {
        Some(json) => serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| ShufflerError::Storage(format!("Failed to deserialize {}: {}", key, e))),
        None => Ok(None),
    }
}

/// Serialize `value` as JSON and store it under `key`.
pub fn save_json<T, S>(store: &S, key: &str, value: &T) -> Result<()>
where
    T: Serialize + ?Sized,
    S: KeyValueStore + ?Sized,
{
    let json = serde_json::to_string(value)
        .map_err(|e| ShufflerError::Storage(format!("Failed to serialize {}: {}", key, e)))?;
    store.set(key, &json)
}
