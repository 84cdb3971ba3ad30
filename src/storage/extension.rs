// chrome.storage.local-backed store for the browser build
//
// Extension storage is private to the extension and shared by every
// origin, so the salt never reaches page script and one rotation covers
// all sites.

use js_sys::{Array, Object, Promise, Reflect, JSON};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;

use super::{is_json_document, KeyValueStore, SnapshotStore, STORED_KEYS};
use crate::error::{Result, ShufflerError};

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(catch, js_namespace = ["chrome", "storage", "local"], js_name = get)]
    fn storage_get(keys: &JsValue) -> std::result::Result<Promise, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "storage", "local"], js_name = set)]
    fn storage_set(items: &JsValue) -> std::result::Result<Promise, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "storage", "local"], js_name = remove)]
    fn storage_remove(keys: &JsValue) -> std::result::Result<Promise, JsValue>;
}

async fn settle(promise: std::result::Result<Promise, JsValue>, what: &str) -> Result<JsValue> {
    let promise = promise
        .map_err(|e| ShufflerError::Storage(format!("{} unavailable: {:?}", what, e)))?;
    JsFuture::from(promise)
        .await
        .map_err(|e| ShufflerError::Storage(format!("{} failed: {:?}", what, e)))
}

/// Snapshot of the shuffler's keys in `chrome.storage.local`.
///
/// Reads and writes go to the snapshot; [`ExtensionStore::commit`] writes
/// the changes back. Documents are stored as objects, like the options
/// page does, and the salt as a plain string.
#[derive(Debug)]
pub struct ExtensionStore {
    snapshot: SnapshotStore,
}

impl ExtensionStore {
    pub async fn open() -> Result<Self> {
        let keys: Array = STORED_KEYS.iter().map(|k| JsValue::from_str(k)).collect();
        let items = settle(storage_get(&keys), "chrome.storage.local.get").await?;

        let mut entries = Vec::with_capacity(STORED_KEYS.len());
        for key in STORED_KEYS {
            let value = Reflect::get(&items, &JsValue::from_str(key)).unwrap_or(JsValue::UNDEFINED);
            if value.is_undefined() || value.is_null() {
                continue;
            }
            let text = match value.as_string() {
                Some(text) => text,
                None => JSON::stringify(&value)
                    .ok()
                    .and_then(|s| s.as_string())
                    .ok_or_else(|| ShufflerError::Storage(format!("Unreadable value for {}", key)))?,
            };
            entries.push((key, text));
        }
        Ok(Self {
            snapshot: SnapshotStore::from_entries(entries),
        })
    }

    /// Write pending changes back to extension storage.
    pub async fn commit(&self) -> Result<()> {
        let changes = self.snapshot.take_changes();
        if !changes.set.is_empty() {
            let items = Object::new();
            for (key, text) in &changes.set {
                let value = if is_json_document(text) {
                    JSON::parse(text).unwrap_or_else(|_| JsValue::from_str(text))
                } else {
                    JsValue::from_str(text)
                };
                Reflect::set(&items, &JsValue::from_str(key), &value)
                    .map_err(|e| ShufflerError::Storage(format!("Failed to stage {}: {:?}", key, e)))?;
            }
            settle(storage_set(&items), "chrome.storage.local.set").await?;
        }
        if !changes.removed.is_empty() {
            let keys: Array = changes.removed.iter().map(|k| JsValue::from_str(k)).collect();
            settle(storage_remove(&keys), "chrome.storage.local.remove").await?;
        }
        Ok(())
    }
}

impl KeyValueStore for ExtensionStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.snapshot.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.snapshot.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.snapshot.remove(key)
    }
}
