//! Error types for the fingerprint shuffler
//!
//! Errors never reach the page. Initialization errors make bootstrap fail
//! closed, installer errors are contained by the registry, and everything
//! else is only visible through the debug log.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use wasm_bindgen::JsValue;

pub type Result<T> = std::result::Result<T, ShufflerError>;

/// Error codes for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Identity errors (1xx) - FATAL for the context
    EntropyError = 100,
    SaltUnavailable = 101,

    // Storage errors (2xx)
    StorageError = 200,
    SerializationError = 201,

    // Configuration errors (3xx)
    ConfigError = 300,

    // Interception errors (4xx)
    MissingTarget = 400,
    NonConfigurable = 401,
    InstallerFailed = 402,

    // Host errors (5xx)
    HostError = 500,

    // Internal errors (9xx)
    InternalError = 900,
}

/// Main error type for the fingerprint shuffler
#[derive(Error, Debug, Clone)]
pub enum ShufflerError {
    // ===== Identity Errors (FATAL) =====
    #[error("Entropy/RNG failure: {0}")]
    EntropyError(String),

    #[error("Salt unavailable: {0}")]
    SaltUnavailable(String),

    // ===== Storage Errors =====
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // ===== Configuration Errors =====
    #[error("Config error: {0}")]
    Config(String),

    // ===== Interception Errors =====
    #[error("Interception target not found: {object}.{property}")]
    MissingTarget { object: String, property: String },

    #[error("Property is not configurable: {object}.{property}")]
    NonConfigurable { object: String, property: String },

    #[error("Installer '{name}' failed: {reason}")]
    InstallerFailed { name: String, reason: String },

    // ===== Host Errors =====
    #[error("Host call failed: {0}")]
    Host(String),

    // ===== Internal Errors =====
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ShufflerError {
    /// Get the error code for programmatic handling
    pub fn code(&self) -> ErrorCode {
        match self {
            ShufflerError::EntropyError(_) => ErrorCode::EntropyError,
            ShufflerError::SaltUnavailable(_) => ErrorCode::SaltUnavailable,

            ShufflerError::Storage(_) => ErrorCode::StorageError,
            ShufflerError::Serialization(_) => ErrorCode::SerializationError,

            ShufflerError::Config(_) => ErrorCode::ConfigError,

            ShufflerError::MissingTarget { .. } => ErrorCode::MissingTarget,
            ShufflerError::NonConfigurable { .. } => ErrorCode::NonConfigurable,
            ShufflerError::InstallerFailed { .. } => ErrorCode::InstallerFailed,

            ShufflerError::Host(_) => ErrorCode::HostError,

            ShufflerError::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Whether this error prevents an environment from being built.
    ///
    /// A context that hits a fatal error runs with no protections at all
    /// rather than with a degraded identity.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ShufflerError::EntropyError(_) | ShufflerError::SaltUnavailable(_)
        )
    }

    /// Whether the interception point was skipped rather than broken.
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            ShufflerError::MissingTarget { .. } | ShufflerError::NonConfigurable { .. }
        )
    }

    pub fn missing(object: &str, property: &str) -> Self {
        ShufflerError::MissingTarget {
            object: object.to_string(),
            property: property.to_string(),
        }
    }

    pub fn non_configurable(object: &str, property: &str) -> Self {
        ShufflerError::NonConfigurable {
            object: object.to_string(),
            property: property.to_string(),
        }
    }
}

impl From<serde_json::Error> for ShufflerError {
    fn from(err: serde_json::Error) -> Self {
        ShufflerError::Serialization(err.to_string())
    }
}

impl From<ShufflerError> for JsValue {
    fn from(err: ShufflerError) -> Self {
        JsValue::from_str(&err.to_string())
    }
}

/// Error information for JavaScript consumption
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: u32,
    pub message: String,
    pub is_fatal: bool,
}

impl From<&ShufflerError> for ErrorInfo {
    fn from(err: &ShufflerError) -> Self {
        ErrorInfo {
            code: err.code() as u32,
            message: err.to_string(),
            is_fatal: err.is_fatal(),
        }
    }
}
