//! Browser bindings.
//!
//! ```javascript
//! import init, { bootstrap_isolated, PageEngine } from './pkg/fp_shuffler.js';
//! await init();
//!
//! // isolated world
//! const handshake = await bootstrap_isolated();   // null when disabled
//! const stats = new MessageChannel();
//! stats.port1.onmessage = (e) => chrome.runtime.sendMessage(e.data);
//! window.postMessage(handshake, '*', [stats.port2]);
//!
//! // page world
//! const engine = new PageEngine(event.data, event.ports[0]);
//! engine.noise_pixels(imageData.data);
//! ```

use std::rc::Rc;

use js_sys::Float64Array;
use wasm_bindgen::prelude::*;
use web_sys::MessagePort;

use crate::bootstrap::Shuffler;
use crate::config::FingerprintConfig;
use crate::engine::{self, Environment, EnvironmentBuilder, PageHandshake};
use crate::error::{Result, ShufflerError};
use crate::hooks::{audio, canvas, webgl};
use crate::rotation::{now_ms, FingerprintRotator, RotationPolicy};
use crate::salt::StoredSaltSource;
use crate::stats::{StatCategory, StatsMessage, StatsReporter, StatsTracker};
use crate::storage::ExtensionStore;

#[wasm_bindgen(start)]
pub fn init() {
    if console_log::init_with_level(log::Level::Info).is_err() {
        return;
    }
    log::info!("Fingerprint shuffler initialized");
}

fn current_origin() -> Option<String> {
    web_sys::window()?.location().origin().ok()
}

/// Build the environment for the current origin and return the page-world
/// handshake, or `null` when the site is whitelisted or the salt is
/// unavailable.
#[wasm_bindgen]
pub async fn bootstrap_isolated() -> std::result::Result<JsValue, JsValue> {
    let store = Rc::new(ExtensionStore::open().await?);
    let config = FingerprintConfig::load(&*store);
    log::set_max_level(config.log_level().to_level_filter());

    let shuffler = Shuffler::from_store(Rc::clone(&store));
    let origin = current_origin();
    let handshake = shuffler.handshake(origin.as_deref()).await;
    // A freshly generated salt must be persisted before any seed leaves
    store.commit().await?;
    match handshake {
        Some(handshake) => Ok(serde_wasm_bindgen::to_value(&handshake)?),
        None => Ok(JsValue::NULL),
    }
}

/// Forget the salt so every origin gets a new identity in its next
/// context.
///
/// Returns the updated `{lastRotation, rotationCount}`.
#[wasm_bindgen]
pub async fn rotate_fingerprint() -> std::result::Result<JsValue, JsValue> {
    let store = Rc::new(ExtensionStore::open().await?);
    let config = FingerprintConfig::load(&*store);
    let rotator = FingerprintRotator::new(
        StoredSaltSource::new(Rc::clone(&store)),
        Rc::clone(&store),
        RotationPolicy::from_config(&config),
    );
    let info = rotator.rotate_now(now_ms()).await?;
    store.commit().await?;
    Ok(serde_wasm_bindgen::to_value(&info)?)
}

/// FNV-1a over the UTF-16 code units of `input`.
#[wasm_bindgen]
pub fn hash_string(input: &str) -> u32 {
    engine::hash_string(input)
}

/// Seed for `salt` and `origin` under the default KDF settings.
#[wasm_bindgen]
pub fn derive_seed(salt: &str, origin: Option<String>) -> u32 {
    engine::derive_seed(salt, origin.as_deref(), &FingerprintConfig::default())
}

/// Posts stats batches on the port handed over with the handshake, so
/// only the isolated world receives them. Without a port they are
/// dropped.
struct PortReporter(Option<MessagePort>);

impl StatsReporter for PortReporter {
    fn report(&self, message: &StatsMessage) -> Result<()> {
        let port = self
            .0
            .as_ref()
            .ok_or_else(|| ShufflerError::Host("No stats port".into()))?;
        let value = serde_wasm_bindgen::to_value(message)
            .map_err(|e| ShufflerError::Serialization(e.to_string()))?;
        port.post_message(&value)
            .map_err(|e| ShufflerError::Host(format!("postMessage failed: {:?}", e)))
    }
}

/// Page-world engine rebuilt from a handshake.
///
/// Draws come from the same generator as the isolated world, so both
/// sides see one stream.
#[wasm_bindgen]
pub struct PageEngine {
    env: Rc<Environment>,
    stats: Rc<StatsTracker<PortReporter>>,
}

#[wasm_bindgen]
impl PageEngine {
    #[wasm_bindgen(constructor)]
    pub fn new(
        handshake: JsValue,
        stats_port: Option<MessagePort>,
    ) -> std::result::Result<PageEngine, JsValue> {
        let handshake: PageHandshake = serde_wasm_bindgen::from_value(handshake)?;
        if !handshake.is_valid() {
            return Err(ShufflerError::Host(format!("Unexpected message type {}", handshake.kind)).into());
        }
        let stats = Rc::new(StatsTracker::new(PortReporter(stats_port)).debug(handshake.config.debug));
        let env = EnvironmentBuilder::new(handshake.config)
            .stats_sink(stats.clone())
            .build_with_seed(handshake.seed);
        Ok(PageEngine {
            env: Rc::new(env),
            stats,
        })
    }

    #[wasm_bindgen(getter)]
    pub fn seed(&self) -> u32 {
        self.env.seed()
    }

    pub fn draw(&self) -> f64 {
        self.env.draw()
    }

    /// `count` consecutive draws.
    pub fn draws(&self, count: u32) -> Float64Array {
        let values: Vec<f64> = (0..count).map(|_| self.env.draw()).collect();
        Float64Array::from(values.as_slice())
    }

    /// Noise in the configured distribution.
    pub fn noise(&self, scale: f64) -> f64 {
        self.env.noise().noise(scale)
    }

    pub fn uniform_noise(&self, scale: f64) -> f64 {
        self.env.noise().uniform(scale)
    }

    pub fn gaussian_noise(&self, mean: f64, stddev: f64) -> f64 {
        self.env.noise().gaussian(mean, stddev)
    }

    /// Noise RGBA pixel data in place.
    pub fn noise_pixels(&self, data: &mut [u8]) {
        self.env.record(StatCategory::Canvas);
        canvas::noise_pixels(&self.env, data);
    }

    /// Noise audio samples in place.
    pub fn noise_samples(&self, samples: &mut [f32]) {
        self.env.record(StatCategory::Audio);
        audio::noise_samples(&self.env, samples);
    }

    pub fn mask_vendor_string(&self, value: &str) -> String {
        self.env.record(StatCategory::Webgl);
        webgl::mask_vendor_string(&self.env, value)
    }

    /// Count one read under a counter name such as `fontReads`.
    pub fn record(&self, counter: &str) {
        if let Some(category) = StatCategory::ALL
            .iter()
            .copied()
            .find(|c| c.counter_name() == counter)
        {
            self.env.record(category);
        }
    }

    pub fn flush_stats(&self) {
        self.stats.flush();
    }
}
