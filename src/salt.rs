//! Identity salt: the only secret behind every derived seed.
//!
//! The salt is created lazily on first read, persisted, and never modified
//! by the engine. Rotation deletes it so the next read creates a new one.

use async_trait::async_trait;
use std::fmt;
use zeroize::Zeroizing;

use crate::error::{Result, ShufflerError};
use crate::storage::{KeyValueStore, SALT_KEY};

/// Number of random bytes behind a freshly generated salt.
pub const SALT_BYTES: usize = 16;

/// Opaque salt string, wiped from memory on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct Salt(Zeroizing<String>);

impl Salt {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Salt(..)")
    }
}

/// Generate a new random salt (hex of [`SALT_BYTES`] bytes).
/// Uses `getrandom` (backed by crypto.getRandomValues in WASM).
pub fn generate_salt() -> Result<Salt> {
    let mut bytes = Zeroizing::new([0u8; SALT_BYTES]);
    getrandom::getrandom(&mut bytes[..])
        .map_err(|e| ShufflerError::EntropyError(format!("Failed to generate salt: {}", e)))?;
    Ok(Salt::new(hex::encode(&bytes[..])))
}

/// Where the per-installation salt comes from.
///
/// `get_salt` is the only suspension point of initialization.
#[async_trait(?Send)]
pub trait SaltSource {
    /// Return the current salt, creating and persisting one if absent.
    async fn get_salt(&self) -> Result<Salt>;

    /// Forget the current salt so the next read creates a new one.
    async fn invalidate_salt(&self) -> Result<()>;
}

/// Salt source persisting under [`SALT_KEY`] in a [`KeyValueStore`].
pub struct StoredSaltSource<S> {
    store: S,
}

impl<S: KeyValueStore> StoredSaltSource<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

#[async_trait(?Send)]
impl<S: KeyValueStore> SaltSource for StoredSaltSource<S> {
    async fn get_salt(&self) -> Result<Salt> {
        let stored = self
            .store
            .get(SALT_KEY)
            .map_err(|e| ShufflerError::SaltUnavailable(e.to_string()))?;
        if let Some(existing) = stored.filter(|s| !s.is_empty()) {
            return Ok(Salt::new(existing));
        }

        let salt = generate_salt()?;
        self.store
            .set(SALT_KEY, salt.as_str())
            .map_err(|e| ShufflerError::SaltUnavailable(e.to_string()))?;
        log::info!("🧂 Generated new fingerprint salt");
        Ok(salt)
    }

    async fn invalidate_salt(&self) -> Result<()> {
        self.store.remove(SALT_KEY)?;
        log::info!("🗑️ Cleared fingerprint salt");
        Ok(())
    }
}

/// Salt source returning a fixed value. Invalidation is a no-op.
#[derive(Debug, Clone)]
pub struct StaticSaltSource(Salt);

impl StaticSaltSource {
    pub fn new(salt: impl Into<String>) -> Self {
        Self(Salt::new(salt))
    }
}

#[async_trait(?Send)]
impl SaltSource for StaticSaltSource {
    async fn get_salt(&self) -> Result<Salt> {
        Ok(self.0.clone())
    }

    async fn invalidate_salt(&self) -> Result<()> {
        Ok(())
    }
}
