//! Dot device REST API client.
//!
//! Provides typed access to the device endpoints with automatic bearer
//! injection, a single re-authentication retry on 401 Unauthorized, and a
//! device list cache used to validate targets before content is pushed.

mod content;
mod devices;
mod request;

pub mod models;

pub use content::{Border, RenderMode, SendOptions};

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use quote_image::TextRasterizer;
use url::Url;

use crate::auth::{AuthPhase, Credentials, SessionManager};
use crate::cache::{CachedDevices, DeviceCache};
use crate::clock::{Clock, SystemClock};
use crate::{
    DEFAULT_BASE_URL, DEFAULT_DEVICE_CACHE_TTL_SECS, DEFAULT_MAX_PAYLOAD_BYTES,
    DEFAULT_TIMEOUT_SECS, DotError,
};

/// Connection settings for [`DotClient`].
#[derive(Debug, Clone)]
pub struct DotConfig {
    pub credentials: Credentials,
    pub base_url: String,
    /// Applies to every HTTP call, credential exchange included.
    pub timeout: Duration,
    pub device_cache_ttl: Duration,
    pub max_payload_bytes: usize,
}

impl DotConfig {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            device_cache_ttl: Duration::from_secs(DEFAULT_DEVICE_CACHE_TTL_SECS),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Dot API client. Cheap to share behind an `Arc`; all methods take `&self`.
pub struct DotClient {
    pub(super) http: reqwest::Client,
    pub(super) base_url: Url,
    pub(super) session: SessionManager,
    pub(super) cache: DeviceCache,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) rasterizer: Option<TextRasterizer>,
    pub(super) max_payload_bytes: usize,
}

impl DotClient {
    pub fn new(config: DotConfig) -> Result<Self, DotError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build a client whose session expiry and cache staleness follow `clock`.
    pub fn with_clock(config: DotConfig, clock: Arc<dyn Clock>) -> Result<Self, DotError> {
        let base_url = Url::parse(&config.base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(DotError::Url(format!("{base_url} cannot be a base URL")));
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DotError::Network(format!("failed to build HTTP client: {e}")))?;

        let ttl = TimeDelta::from_std(config.device_cache_ttl).map_err(|_| {
            DotError::Config(format!(
                "device cache TTL {:?} is out of range",
                config.device_cache_ttl
            ))
        })?;

        Ok(Self {
            session: SessionManager::new(config.credentials, http.clone(), clock.clone()),
            http,
            base_url,
            cache: DeviceCache::new(ttl),
            clock,
            rasterizer: None,
            max_payload_bytes: config.max_payload_bytes,
        })
    }

    /// Enable [`RenderMode::Image`] text pushes with this rasterizer.
    #[must_use]
    pub fn with_rasterizer(mut self, rasterizer: TextRasterizer) -> Self {
        self.rasterizer = Some(rasterizer);
        self
    }

    pub fn auth_phase(&self) -> AuthPhase {
        self.session.phase()
    }

    /// Drop the current session and the device cache.
    pub async fn invalidate(&self) {
        self.session.invalidate().await;
        self.cache.clear();
    }

    /// Last fetched device list, stale or not.
    pub fn cached_devices(&self) -> Option<CachedDevices> {
        self.cache.snapshot()
    }
}

#[cfg(test)]
mod tests;
