//! # Fingerprint Shuffler
//!
//! Deterministic per-identity noise for browser fingerprinting surfaces.
//!
//! Every value a page can read to fingerprint the browser (canvas pixels,
//! WebGL parameters, audio samples, navigator and screen properties,
//! fonts, timezone, sensors, WebRTC SDP) is perturbed with noise drawn
//! from one seeded generator per browsing context. The seed comes from a
//! persisted random salt and the page's origin, so a site sees the same
//! perturbed device on every visit while two sites, or one site after a
//! rotation, see unrelated ones.
//!
//! ## Architecture
//!
//! ```text
//! Shuffler (bootstrap)
//!   ↓  salt + origin + config
//! Environment (seed, generator, noise, timing, stealth registry, stats)
//!   ↓  drained in fixed order
//! HookInstallers (canvas, webgl, audio, ... sensors)
//!   ↓
//! Realm (interception points)
//! ```
//!
//! On `wasm32` the [`wasm`] module exposes the isolated-world bootstrap and
//! a page-world engine rebuilt from the handshake.

pub mod bootstrap;
pub mod config;
pub mod engine;
mod error;
pub mod hooks;
pub mod rotation;
pub mod salt;
pub mod site_settings;
pub mod stats;
pub mod storage;

#[cfg(target_arch = "wasm32")]
pub mod wasm;

pub use bootstrap::{Session, Shuffler};
pub use config::{FingerprintConfig, PrngAlgorithm};
pub use engine::{
    Environment, EnvironmentBuilder, HookInstaller, InstallReport, InstallerRegistry,
    NoiseDistribution, NoiseEngine, PageHandshake, PatchRegistry, SharedPrng, TimingUtils,
};
pub use error::{ErrorCode, ErrorInfo, Result, ShufflerError};
pub use hooks::{default_registry, Realm, Value};
pub use rotation::{ContextReloader, FingerprintRotator, RotationInfo, RotationPolicy};
pub use salt::{Salt, SaltSource, StaticSaltSource, StoredSaltSource};
pub use site_settings::{SiteSettings, SiteSettingsStore};
pub use stats::{StatCategory, StatsSink, StatsTracker};
pub use storage::{KeyValueStore, MemoryStore};
