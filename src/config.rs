//! Shuffler configuration.
//!
//! The persisted form is a JSON object (key `fpConfig`) merged over the
//! defaults below. Nested objects merge key-by-key, everything else is
//! replaced wholesale. Unknown keys are ignored.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, ShufflerError};
use crate::storage::{KeyValueStore, CONFIG_KEY};

/// Iteration count used when the configured value is zero.
pub const DEFAULT_KDF_ITERATIONS: u32 = 1000;

/// Generator backing the shared randomness stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PrngAlgorithm {
    #[default]
    #[serde(rename = "xoshiro128**")]
    Xoshiro128StarStar,
    #[serde(rename = "mulberry32")]
    Mulberry32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NavigatorOptions {
    pub fuzz_hardware_concurrency: bool,
    pub fuzz_device_memory: bool,
    pub shuffle_languages: bool,
}

impl Default for NavigatorOptions {
    fn default() -> Self {
        Self {
            fuzz_hardware_concurrency: true,
            fuzz_device_memory: true,
            shuffle_languages: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WebRtcOptions {
    #[serde(rename = "blockIPLeak")]
    pub block_ip_leak: bool,
    #[serde(rename = "randomizeSDP")]
    pub randomize_sdp: bool,
    pub force_relay: bool,
}

impl Default for WebRtcOptions {
    fn default() -> Self {
        Self {
            block_ip_leak: true,
            randomize_sdp: true,
            force_relay: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MediaDeviceOptions {
    pub randomize_device_ids: bool,
    pub spoof_device_labels: bool,
}

impl Default for MediaDeviceOptions {
    fn default() -> Self {
        Self {
            randomize_device_ids: true,
            spoof_device_labels: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScreenOptions {
    pub use_real_distribution: bool,
}

impl Default for ScreenOptions {
    fn default() -> Self {
        Self {
            use_real_distribution: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SensorOptions {
    pub hide_gamepads: bool,
}

impl Default for SensorOptions {
    fn default() -> Self {
        Self {
            hide_gamepads: true,
        }
    }
}

/// Full shuffler configuration. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FingerprintConfig {
    pub debug: bool,

    // Identity
    pub per_origin_fingerprint: bool,
    #[serde(rename = "useStrongKDF")]
    pub use_strong_kdf: bool,
    pub kdf_iterations: u32,
    pub use_gaussian_noise: bool,
    pub prng_algorithm: PrngAlgorithm,

    // Canvas
    pub enable_canvas_noise: bool,
    pub canvas_noise_strength: f64,

    // WebGL
    #[serde(rename = "enableWebGLMasking")]
    pub enable_webgl_masking: bool,
    pub webgl_jitter: f64,
    #[serde(rename = "maskWebGLVendorStrings")]
    pub mask_webgl_vendor_strings: bool,
    #[serde(rename = "shuffleWebGLExtensions")]
    pub shuffle_webgl_extensions: bool,

    // Audio
    pub enable_audio_noise: bool,
    pub audio_noise_strength: f64,

    // Navigator
    pub enable_navigator_fuzz: bool,
    pub navigator: NavigatorOptions,

    // WebRTC
    #[serde(rename = "enableWebRTCProtection")]
    pub enable_webrtc_protection: bool,
    pub webrtc: WebRtcOptions,

    // Media devices
    pub enable_media_device_protection: bool,
    pub media_devices: MediaDeviceOptions,

    // Screen
    pub enable_screen_protection: bool,
    pub screen: ScreenOptions,

    pub enable_font_protection: bool,
    pub enable_timezone_protection: bool,

    // Sensors
    pub enable_sensor_protection: bool,
    pub sensors: SensorOptions,

    // Rotation
    pub auto_rotate_fingerprint: bool,
    pub rotation_interval_hours: f64,
    pub rotate_on_startup: bool,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            debug: false,
            per_origin_fingerprint: true,
            use_strong_kdf: true,
            kdf_iterations: DEFAULT_KDF_ITERATIONS,
            use_gaussian_noise: true,
            prng_algorithm: PrngAlgorithm::default(),
            enable_canvas_noise: true,
            canvas_noise_strength: 2.0,
            enable_webgl_masking: true,
            webgl_jitter: 2.0,
            mask_webgl_vendor_strings: true,
            shuffle_webgl_extensions: true,
            enable_audio_noise: true,
            audio_noise_strength: 1e-7,
            enable_navigator_fuzz: true,
            navigator: NavigatorOptions::default(),
            enable_webrtc_protection: true,
            webrtc: WebRtcOptions::default(),
            enable_media_device_protection: true,
            media_devices: MediaDeviceOptions::default(),
            enable_screen_protection: true,
            screen: ScreenOptions::default(),
            enable_font_protection: true,
            enable_timezone_protection: true,
            enable_sensor_protection: true,
            sensors: SensorOptions::default(),
            auto_rotate_fingerprint: false,
            rotation_interval_hours: 24.0,
            rotate_on_startup: false,
        }
    }
}

impl FingerprintConfig {
    /// Iteration count for the strong KDF. Zero means "use the default".
    pub fn effective_kdf_iterations(&self) -> u32 {
        if self.kdf_iterations == 0 {
            DEFAULT_KDF_ITERATIONS
        } else {
            self.kdf_iterations
        }
    }

    /// Log level matching the `debug` flag.
    pub fn log_level(&self) -> log::Level {
        if self.debug {
            log::Level::Debug
        } else {
            log::Level::Info
        }
    }

    /// Merge a partial JSON object over this config.
    ///
    /// Nested objects are merged one level deep; scalars and arrays replace.
    /// A non-object `overrides` leaves the config unchanged.
    pub fn merged_with(&self, overrides: &Value) -> Result<Self> {
        let Value::Object(overrides) = overrides else {
            return Ok(self.clone());
        };
        let mut base = match serde_json::to_value(self)? {
            Value::Object(map) => map,
            _ => return Err(ShufflerError::Internal("config is not an object".into())),
        };
        merge_shallow(&mut base, overrides);
        serde_json::from_value(Value::Object(base))
            .map_err(|e| ShufflerError::Config(format!("Invalid config override: {}", e)))
    }

    /// Parse a stored config document and merge it over the defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let stored: Value = serde_json::from_str(json)
            .map_err(|e| ShufflerError::Config(format!("Failed to parse config: {}", e)))?;
        Self::default().merged_with(&stored)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| ShufflerError::Serialization(format!("Failed to serialize config: {}", e)))
    }

    /// Load the persisted config. Any failure yields the defaults.
    pub fn load<S: KeyValueStore + ?Sized>(store: &S) -> Self {
        match store.get(CONFIG_KEY) {
            Ok(Some(json)) => Self::from_json(&json).unwrap_or_else(|e| {
                log::debug!("[fp][config] Failed to load stored config: {}", e);
                Self::default()
            }),
            Ok(None) => Self::default(),
            Err(e) => {
                log::debug!("[fp][config] Config storage unavailable: {}", e);
                Self::default()
            }
        }
    }

    pub fn save<S: KeyValueStore + ?Sized>(&self, store: &S) -> Result<()> {
        store.set(CONFIG_KEY, &self.to_json()?)
    }
}

/// Merge `overrides` into `base`: objects merge key-by-key, the rest replaces.
pub(crate) fn merge_shallow(base: &mut Map<String, Value>, overrides: &Map<String, Value>) {
    for (key, value) in overrides {
        match (base.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(patch)) => {
                for (k, v) in patch {
                    existing.insert(k.clone(), v.clone());
                }
            }
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = FingerprintConfig::default();
        assert!(config.per_origin_fingerprint);
        assert!(config.use_strong_kdf);
        assert!(config.use_gaussian_noise);
        assert_eq!(config.kdf_iterations, 1000);
        assert_eq!(config.canvas_noise_strength, 2.0);
        assert_eq!(config.audio_noise_strength, 1e-7);
        assert!(!config.webrtc.force_relay);
        assert!(!config.auto_rotate_fingerprint);
        assert_eq!(config.prng_algorithm, PrngAlgorithm::Xoshiro128StarStar);
    }

    #[test]
    fn test_wire_names() {
        let value = serde_json::to_value(FingerprintConfig::default()).unwrap();
        for key in [
            "useStrongKDF",
            "enableWebGLMasking",
            "maskWebGLVendorStrings",
            "shuffleWebGLExtensions",
            "enableWebRTCProtection",
            "webglJitter",
            "perOriginFingerprint",
            "rotationIntervalHours",
        ] {
            assert!(value.get(key).is_some(), "missing key {}", key);
        }
        assert_eq!(value["webrtc"]["blockIPLeak"], json!(true));
        assert_eq!(value["webrtc"]["randomizeSDP"], json!(true));
        assert_eq!(value["prngAlgorithm"], json!("xoshiro128**"));
    }

    #[test]
    fn test_nested_merge_is_per_key() {
        let merged = FingerprintConfig::default()
            .merged_with(&json!({ "webrtc": { "forceRelay": true } }))
            .unwrap();
        assert!(merged.webrtc.force_relay);
        // Siblings keep their defaults
        assert!(merged.webrtc.block_ip_leak);
        assert!(merged.webrtc.randomize_sdp);
    }

    #[test]
    fn test_scalar_override_and_unknown_keys() {
        let merged = FingerprintConfig::default()
            .merged_with(&json!({
                "canvasNoiseStrength": 5,
                "useGaussianNoise": false,
                "someFutureKnob": { "x": 1 }
            }))
            .unwrap();
        assert_eq!(merged.canvas_noise_strength, 5.0);
        assert!(!merged.use_gaussian_noise);
    }

    #[test]
    fn test_non_object_override_is_noop() {
        let base = FingerprintConfig::default();
        assert_eq!(base.merged_with(&json!(42)).unwrap(), base);
        assert_eq!(base.merged_with(&Value::Null).unwrap(), base);
    }

    #[test]
    fn test_zero_iterations_means_default() {
        let config = FingerprintConfig {
            kdf_iterations: 0,
            ..Default::default()
        };
        assert_eq!(config.effective_kdf_iterations(), 1000);

        let config = FingerprintConfig {
            kdf_iterations: 7,
            ..Default::default()
        };
        assert_eq!(config.effective_kdf_iterations(), 7);
    }

    #[test]
    fn test_load_falls_back_to_defaults() {
        let store = MemoryStore::new();
        store.set(CONFIG_KEY, "{ not json").unwrap();
        assert_eq!(FingerprintConfig::load(&store), FingerprintConfig::default());

        store
            .set(CONFIG_KEY, r#"{"canvasNoiseStrength":"loud"}"#)
            .unwrap();
        assert_eq!(FingerprintConfig::load(&store), FingerprintConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let store = MemoryStore::new();
        let config = FingerprintConfig {
            debug: true,
            prng_algorithm: PrngAlgorithm::Mulberry32,
            ..Default::default()
        };
        config.save(&store).unwrap();
        assert_eq!(FingerprintConfig::load(&store), config);
    }
}
