//! Dot cloud client library.
//!
//! Provides authenticated access to the Dot device API: device discovery
//! with a TTL cache, native text pushes, and image pushes of frames
//! produced by `quote-image`.

pub mod api;
pub mod auth;
pub mod cache;
pub mod clock;

pub use api::{Border, DotClient, DotConfig, RenderMode, SendOptions};
pub use api::models::{
    Device, DeviceInfo, DeviceStatus, DeviceStatusInfo, DeviceTask, DotApiResponse,
};
pub use auth::{AuthPhase, Credentials};
pub use cache::CachedDevices;
pub use clock::{Clock, ManualClock, SystemClock};

use quote_image::RenderError;

/// Production API host.
pub const DEFAULT_BASE_URL: &str = "https://dot.mindreset.tech";

/// Path segments every device endpoint is nested under.
pub(crate) const API_SEGMENTS: &[&str] = &["api", "authV2", "open"];

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_DEVICE_CACHE_TTL_SECS: u64 = 60;

/// Upper bound on a serialized request body.
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 64 * 1024;

/// Unified error type for the dot-client crate.
///
/// Errors are plain data so a failed refresh can be handed to every caller
/// that waited on it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DotError {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Payload too large: {size} bytes (limit {limit})")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Dot API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Invalid URL: {0}")]
    Url(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Coarse classification of a [`DotError`], stable across message changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnsupportedFormat,
    InvalidDimensions,
    UnknownAlgorithm,
    FontUnavailable,
    Encode,
    Auth,
    Network,
    DeviceNotFound,
    PayloadTooLarge,
    Api,
    Protocol,
    Config,
}

impl DotError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DotError::Render(e) => match e {
                RenderError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
                RenderError::InvalidDimensions { .. } => ErrorKind::InvalidDimensions,
                RenderError::UnknownAlgorithm(_) => ErrorKind::UnknownAlgorithm,
                RenderError::FontUnavailable(_) => ErrorKind::FontUnavailable,
                RenderError::Encode(_) => ErrorKind::Encode,
            },
            DotError::Auth(_) => ErrorKind::Auth,
            DotError::Network(_) => ErrorKind::Network,
            DotError::DeviceNotFound(_) => ErrorKind::DeviceNotFound,
            DotError::PayloadTooLarge { .. } => ErrorKind::PayloadTooLarge,
            DotError::Api { .. } => ErrorKind::Api,
            DotError::Json(_) | DotError::Url(_) => ErrorKind::Protocol,
            DotError::Config(_) => ErrorKind::Config,
        }
    }

    /// Whether repeating the same call later may succeed.
    ///
    /// Transport failures, rate limiting and server-side errors qualify.
    /// Everything else fails the same way again.
    pub fn is_retryable(&self) -> bool {
        match self {
            DotError::Network(_) => true,
            DotError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for DotError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            DotError::Network(format!("request timed out: {e}"))
        } else if e.is_connect() {
            DotError::Network(format!("connection failed: {e}"))
        } else if e.is_decode() {
            DotError::Json(e.to_string())
        } else {
            DotError::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for DotError {
    fn from(e: serde_json::Error) -> Self {
        DotError::Json(e.to_string())
    }
}

impl From<url::ParseError> for DotError {
    fn from(e: url::ParseError) -> Self {
        DotError::Url(e.to_string())
    }
}
