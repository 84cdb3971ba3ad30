//! Per-context environment.
//!
//! Everything an installer needs (seed, config, noise, timing, stealth
//! registry, stats sink) is built once per browsing context and passed
//! explicitly. The environment is immutable after construction; the only
//! state that moves is the shared generator inside it.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use super::hash::context_seed;
use super::noise::NoiseEngine;
use super::prng::SharedPrng;
use super::stealth::PatchRegistry;
use super::timing::TimingUtils;
use crate::config::FingerprintConfig;
use crate::salt::Salt;
use crate::stats::{NullSink, StatCategory, StatsSink};

/// Message type of the page-world handshake.
pub const PAGE_HANDSHAKE_TYPE: &str = "FP_INIT_PAGE_HOOKS";

/// What the isolated world hands the page world so both build the same
/// stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageHandshake {
    #[serde(rename = "type")]
    pub kind: String,
    pub config: FingerprintConfig,
    pub seed: u32,
}

impl PageHandshake {
    pub fn new(config: FingerprintConfig, seed: u32) -> Self {
        Self {
            kind: PAGE_HANDSHAKE_TYPE.to_string(),
            config,
            seed,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.kind == PAGE_HANDSHAKE_TYPE
    }
}

pub struct Environment {
    salt: Option<Salt>,
    seed: u32,
    origin: Option<String>,
    config: FingerprintConfig,
    prng: SharedPrng,
    noise: NoiseEngine,
    timing: TimingUtils,
    stealth: Rc<PatchRegistry>,
    stats: Rc<dyn StatsSink>,
}

impl Environment {
    /// The salt, in the isolated world only.
    pub fn salt(&self) -> Option<&Salt> {
        self.salt.as_ref()
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    pub fn config(&self) -> &FingerprintConfig {
        &self.config
    }

    pub fn prng(&self) -> &SharedPrng {
        &self.prng
    }

    pub fn noise(&self) -> &NoiseEngine {
        &self.noise
    }

    pub fn timing(&self) -> &TimingUtils {
        &self.timing
    }

    pub fn stealth(&self) -> &Rc<PatchRegistry> {
        &self.stealth
    }

    pub fn stats(&self) -> &Rc<dyn StatsSink> {
        &self.stats
    }

    /// Next raw draw from the shared stream.
    #[inline]
    pub fn draw(&self) -> f64 {
        self.prng.draw()
    }

    /// Report one intercepted read.
    #[inline]
    pub fn record(&self, category: StatCategory) {
        self.stats.increment(category);
    }

    pub fn is_debug(&self) -> bool {
        self.config.debug
    }

    pub fn handshake(&self) -> PageHandshake {
        PageHandshake::new(self.config.clone(), self.seed)
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("seed", &self.seed)
            .field("origin", &self.origin)
            .field("salt", &self.salt)
            .field("prng", &self.config.prng_algorithm)
            .field("noise", &self.noise.distribution())
            .finish()
    }
}

/// Assembles an [`Environment`] in the fixed order
/// seed, generator, noise, environment.
pub struct EnvironmentBuilder {
    config: FingerprintConfig,
    origin: Option<String>,
    stealth: Option<Rc<PatchRegistry>>,
    stats: Option<Rc<dyn StatsSink>>,
}

impl EnvironmentBuilder {
    pub fn new(config: FingerprintConfig) -> Self {
        Self {
            config,
            origin: None,
            stealth: None,
            stats: None,
        }
    }

    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Share a patch registry with earlier contexts of the same realm.
    pub fn patch_registry(mut self, stealth: Rc<PatchRegistry>) -> Self {
        self.stealth = Some(stealth);
        self
    }

    pub fn stats_sink(mut self, stats: Rc<dyn StatsSink>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Isolated world: derive the seed from `salt` and the origin.
    pub fn build(self, salt: Salt) -> Environment {
        let seed = context_seed(salt.as_str(), self.origin.as_deref(), &self.config);
        self.assemble(Some(salt), seed)
    }

    /// Page world: use a seed handed over by the isolated world.
    pub fn build_with_seed(self, seed: u32) -> Environment {
        self.assemble(None, seed)
    }

    /// Page world environment from a handshake.
    pub fn from_handshake(handshake: &PageHandshake) -> Environment {
        Self::new(handshake.config.clone()).build_with_seed(handshake.seed)
    }

    fn assemble(self, salt: Option<Salt>, seed: u32) -> Environment {
        let prng = SharedPrng::new(self.config.prng_algorithm, seed);
        let noise = NoiseEngine::from_config(prng.clone(), &self.config);
        let timing = TimingUtils::new(prng.clone());
        Environment {
            salt,
            seed,
            origin: self.origin,
            prng,
            noise,
            timing,
            stealth: self.stealth.unwrap_or_default(),
            stats: self.stats.unwrap_or_else(|| Rc::new(NullSink)),
            config: self.config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGIN: &str = "https://example.com";

    #[test]
    fn test_isolated_world_seed() {
        let env = EnvironmentBuilder::new(FingerprintConfig::default())
            .origin(ORIGIN)
            .build(Salt::new("abc123"));
        assert_eq!(env.seed(), 2_464_208_555);
        assert_eq!(env.origin(), Some(ORIGIN));
        assert_eq!(env.salt().map(Salt::as_str), Some("abc123"));
    }

    #[test]
    fn test_handshake_rebuilds_same_stream() {
        let isolated = EnvironmentBuilder::new(FingerprintConfig::default())
            .origin(ORIGIN)
            .build(Salt::new("abc123"));
        let handshake = isolated.handshake();
        assert!(handshake.is_valid());

        let page = EnvironmentBuilder::from_handshake(&handshake);
        assert!(page.salt().is_none());
        for _ in 0..1000 {
            assert_eq!(isolated.draw(), page.draw());
        }
    }

    #[test]
    fn test_consumers_share_one_stream() {
        let env = EnvironmentBuilder::new(FingerprintConfig::default()).build_with_seed(42);
        let probe = SharedPrng::new(FingerprintConfig::default().prng_algorithm, 42);

        env.draw();
        env.noise().uniform(1.0);
        env.timing().execution_jitter();
        for _ in 0..3 {
            probe.draw();
        }
        assert_eq!(env.prng().draw(), probe.draw());
    }

    #[test]
    fn test_handshake_wire_format() {
        let handshake = PageHandshake::new(FingerprintConfig::default(), 7);
        let json = serde_json::to_value(&handshake).unwrap();
        assert_eq!(json["type"], "FP_INIT_PAGE_HOOKS");
        assert_eq!(json["seed"], 7);
        assert_eq!(json["config"]["useStrongKDF"], true);

        let back: PageHandshake = serde_json::from_value(json).unwrap();
        assert_eq!(back, handshake);
    }

    #[test]
    fn test_debug_output_hides_salt() {
        let env = EnvironmentBuilder::new(FingerprintConfig::default()).build(Salt::new("s3cret"));
        assert!(!format!("{:?}", env).contains("s3cret"));
    }

    #[test]
    fn test_shared_patch_registry() {
        let registry = Rc::new(PatchRegistry::new());
        let env = EnvironmentBuilder::new(FingerprintConfig::default())
            .patch_registry(Rc::clone(&registry))
            .build_with_seed(1);
        assert!(Rc::ptr_eq(env.stealth(), &registry));
    }
}
