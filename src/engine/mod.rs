//! Deterministic noise engine.
//!
//! ```text
//! salt ──▶ hash (FNV-1a / iterated KDF) ──▶ seed
//!                                            │
//!                                  SharedPrng (xoshiro128** | mulberry32)
//!                                 ┌──────────┼──────────┐
//!                             NoiseEngine  TimingUtils  installers
//! ```
//!
//! A context draws from exactly one generator. The order in which draws
//! happen is part of the output, so installer order is fixed.

pub mod environment;
pub mod hash;
pub mod noise;
pub mod prng;
pub mod registry;
pub mod stealth;
pub mod timing;

pub use environment::{Environment, EnvironmentBuilder, PageHandshake, PAGE_HANDSHAKE_TYPE};
pub use hash::{context_seed, derive_seed, derive_seed_simple, derive_strong_seed, hash_string};
pub use noise::{NoiseDistribution, NoiseEngine};
pub use prng::{Generator, Mulberry32, SharedPrng, SplitMix32, Xoshiro128StarStar};
pub use registry::{HookInstaller, InstallFailure, InstallReport, Installed, InstallerRegistry};
pub use stealth::PatchRegistry;
pub use timing::TimingUtils;
