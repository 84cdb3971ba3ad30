//! Fingerprint rotation.
//!
//! Rotating forgets the salt, so the next context derives a new seed and
//! every surface changes at once. A live [`Environment`](crate::engine::Environment)
//! is never touched; open contexts keep their identity until reloaded.
//! The timer or alarm that calls [`FingerprintRotator::on_alarm`] lives
//! outside this crate.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::FingerprintConfig;
use crate::error::Result;
use crate::salt::SaltSource;
use crate::storage::{load_json, save_json, KeyValueStore, ROTATION_INFO_KEY};

const MS_PER_HOUR: f64 = 3_600_000.0;

/// Bookkeeping persisted under `fp_rotation_info`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RotationInfo {
    /// Unix time of the last rotation, in milliseconds.
    pub last_rotation: u64,
    pub rotation_count: u32,
}

impl RotationInfo {
    pub fn load<S: KeyValueStore + ?Sized>(store: &S) -> Self {
        load_json(store, ROTATION_INFO_KEY)
            .unwrap_or_else(|e| {
                log::debug!("[fp][rotation] Ignoring stored rotation info: {}", e);
                None
            })
            .unwrap_or_default()
    }

    pub fn save<S: KeyValueStore + ?Sized>(&self, store: &S) -> Result<()> {
        save_json(store, ROTATION_INFO_KEY, self)
    }
}

/// Rotation settings taken from the config.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationPolicy {
    pub auto_rotate: bool,
    pub interval: Duration,
    pub on_startup: bool,
}

impl RotationPolicy {
    pub fn from_config(config: &FingerprintConfig) -> Self {
        let hours = config.rotation_interval_hours.max(0.0);
        Self {
            auto_rotate: config.auto_rotate_fingerprint,
            interval: Duration::from_millis((hours * MS_PER_HOUR) as u64),
            on_startup: config.rotate_on_startup,
        }
    }

    /// Whether an automatic rotation is owed at `now_ms`.
    pub fn is_due(&self, info: &RotationInfo, now_ms: u64) -> bool {
        self.auto_rotate
            && now_ms.saturating_sub(info.last_rotation) >= self.interval.as_millis() as u64
    }
}

/// Told to reload open contexts after a rotation.
pub trait ContextReloader {
    fn reload_contexts(&self);
}

/// Reloader that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoReload;

impl ContextReloader for NoReload {
    fn reload_contexts(&self) {}
}

impl<F: Fn()> ContextReloader for F {
    fn reload_contexts(&self) {
        self()
    }
}

pub struct FingerprintRotator<Src, St, R = NoReload> {
    salt: Src,
    store: St,
    reloader: R,
    policy: RotationPolicy,
}

impl<Src, St> FingerprintRotator<Src, St, NoReload>
where
    Src: SaltSource,
    St: KeyValueStore,
{
    pub fn new(salt: Src, store: St, policy: RotationPolicy) -> Self {
        Self {
            salt,
            store,
            reloader: NoReload,
            policy,
        }
    }
}

impl<Src, St, R> FingerprintRotator<Src, St, R>
where
    Src: SaltSource,
    St: KeyValueStore,
    R: ContextReloader,
{
    pub fn with_reloader<R2: ContextReloader>(self, reloader: R2) -> FingerprintRotator<Src, St, R2> {
        FingerprintRotator {
            salt: self.salt,
            store: self.store,
            reloader,
            policy: self.policy,
        }
    }

    pub fn policy(&self) -> &RotationPolicy {
        &self.policy
    }

    pub fn info(&self) -> RotationInfo {
        RotationInfo::load(&self.store)
    }

    pub fn is_due(&self, now_ms: u64) -> bool {
        self.policy.is_due(&self.info(), now_ms)
    }

    /// Forget the salt, record the rotation and ask open contexts to reload.
    pub async fn rotate_now(&self, now_ms: u64) -> Result<RotationInfo> {
        self.salt.invalidate_salt().await?;

        let previous = self.info();
        let info = RotationInfo {
            last_rotation: now_ms,
            rotation_count: previous.rotation_count.saturating_add(1),
        };
        info.save(&self.store)?;
        log::info!("🔄 Fingerprint rotated (#{})", info.rotation_count);

        self.reloader.reload_contexts();
        Ok(info)
    }

    /// Browser start: rotate when configured to.
    pub async fn on_startup(&self, now_ms: u64) -> Result<Option<RotationInfo>> {
        if !self.policy.on_startup {
            return Ok(None);
        }
        self.rotate_now(now_ms).await.map(Some)
    }

    /// Periodic tick: rotate when the interval has elapsed.
    pub async fn on_alarm(&self, now_ms: u64) -> Result<Option<RotationInfo>> {
        if !self.is_due(now_ms) {
            return Ok(None);
        }
        self.rotate_now(now_ms).await.map(Some)
    }
}

/// Current Unix time in milliseconds.
pub fn now_ms() -> u64 {
    web_time::SystemTime::now()
        .duration_since(web_time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::salt::StoredSaltSource;
    use crate::storage::{MemoryStore, SALT_KEY};
    use futures::executor::block_on;
    use std::cell::Cell;
    use std::rc::Rc;

    const HOUR_MS: u64 = 3_600_000;

    fn policy(auto: bool, on_startup: bool) -> RotationPolicy {
        let mut config = FingerprintConfig::default();
        config.auto_rotate_fingerprint = auto;
        config.rotate_on_startup = on_startup;
        RotationPolicy::from_config(&config)
    }

    #[test]
    fn test_policy_from_defaults() {
        let policy = RotationPolicy::from_config(&FingerprintConfig::default());
        assert!(!policy.auto_rotate);
        assert!(!policy.on_startup);
        assert_eq!(policy.interval, Duration::from_secs(24 * 3600));
    }

    #[test]
    fn test_is_due() {
        let policy = policy(true, false);
        let info = RotationInfo {
            last_rotation: 1_000,
            rotation_count: 1,
        };
        assert!(!policy.is_due(&info, 1_000 + 23 * HOUR_MS));
        assert!(policy.is_due(&info, 1_000 + 24 * HOUR_MS));
        // Clock going backwards is never due
        assert!(!policy.is_due(&info, 0));
        assert!(!self::policy(false, false).is_due(&info, u64::MAX));
    }

    #[test]
    fn test_rotate_now_clears_salt_and_counts() {
        let store = Rc::new(MemoryStore::new());
        store.set(SALT_KEY, "00ff").unwrap();
        let reloads = Rc::new(Cell::new(0));
        let counter = Rc::clone(&reloads);
        let rotator = FingerprintRotator::new(
            StoredSaltSource::new(Rc::clone(&store)),
            Rc::clone(&store),
            policy(true, false),
        )
        .with_reloader(move || counter.set(counter.get() + 1));

        let info = block_on(rotator.rotate_now(5_000)).unwrap();
        assert_eq!(info.rotation_count, 1);
        assert_eq!(info.last_rotation, 5_000);
        assert_eq!(store.get(SALT_KEY).unwrap(), None);
        assert_eq!(reloads.get(), 1);

        let info = block_on(rotator.rotate_now(9_000)).unwrap();
        assert_eq!(info.rotation_count, 2);
        assert_eq!(RotationInfo::load(&*store), info);
    }

    #[test]
    fn test_startup_and_alarm() {
        let store = Rc::new(MemoryStore::new());
        let rotator = FingerprintRotator::new(
            StoredSaltSource::new(Rc::clone(&store)),
            Rc::clone(&store),
            policy(true, false),
        );
        assert_eq!(block_on(rotator.on_startup(1)).unwrap(), None);

        // Never rotated: due immediately once the interval has passed since epoch
        let first = block_on(rotator.on_alarm(24 * HOUR_MS)).unwrap().unwrap();
        assert_eq!(first.rotation_count, 1);
        assert_eq!(block_on(rotator.on_alarm(25 * HOUR_MS)).unwrap(), None);
        assert!(block_on(rotator.on_alarm(48 * HOUR_MS)).unwrap().is_some());
    }

    #[test]
    fn test_rotation_info_wire_shape() {
        let info = RotationInfo {
            last_rotation: 1_700_000_000_000,
            rotation_count: 3,
        };
        let json = serde_json::to_string(&info).unwrap();
        assert_eq!(json, r#"{"lastRotation":1700000000000,"rotationCount":3}"#);
    }
}
