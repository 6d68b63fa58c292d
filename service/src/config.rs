//! Runtime configuration loaded from the environment (and `.env`).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use dot_client::{
    Border, Credentials, DEFAULT_BASE_URL, DEFAULT_DEVICE_CACHE_TTL_SECS,
    DEFAULT_MAX_PAYLOAD_BYTES, DEFAULT_TIMEOUT_SECS, DotConfig,
};
use quote_image::TextRasterizer;
use url::Url;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: String,
    pub default_device_id: String,
    pub base_url: String,
    /// Token exchange endpoint; the API key is the bearer when unset.
    pub auth_url: Option<String>,
    pub timeout_secs: u64,
    pub device_cache_ttl_secs: u64,
    pub max_payload_bytes: usize,
    pub font_path: Option<PathBuf>,
    pub border: Border,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            default_device_id: String::new(),
            base_url: DEFAULT_BASE_URL.into(),
            auth_url: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            device_cache_ttl_secs: DEFAULT_DEVICE_CACHE_TTL_SECS,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            font_path: None,
            border: Border::White,
        }
    }
}

impl AppConfig {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self, anyhow::Error> {
        load_dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, anyhow::Error> {
        let g = |key: &str| -> String { lookup(key).unwrap_or_default().trim().to_string() };
        let opt = |key: &str| -> Option<String> { Some(g(key)).filter(|v| !v.is_empty()) };

        for key in [
            "DOT_API_BASE_URL",
            "DOT_AUTH_URL",
            "DOT_TIMEOUT_SECS",
            "DOT_DEVICE_CACHE_TTL_SECS",
            "DOT_MAX_PAYLOAD_BYTES",
            "SCREEN_BORDER",
        ] {
            let value = g(key);
            if !value.is_empty() {
                validate_setting(key, &value).map_err(|e| anyhow::anyhow!("{key}: {e}"))?;
            }
        }

        let api_key = g("DOT_API_KEY");
        if api_key.is_empty() {
            bail!("DOT_API_KEY is not set");
        }

        let config = Self {
            api_key,
            default_device_id: g("DOT_DEFAULT_DEVICE_ID"),
            base_url: opt("DOT_API_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.into()),
            auth_url: opt("DOT_AUTH_URL"),
            timeout_secs: parse_u64(&g("DOT_TIMEOUT_SECS"), DEFAULT_TIMEOUT_SECS),
            device_cache_ttl_secs: parse_u64(
                &g("DOT_DEVICE_CACHE_TTL_SECS"),
                DEFAULT_DEVICE_CACHE_TTL_SECS,
            ),
            max_payload_bytes: parse_usize(
                &g("DOT_MAX_PAYLOAD_BYTES"),
                DEFAULT_MAX_PAYLOAD_BYTES,
            ),
            font_path: opt("DOT_FONT_PATH").map(PathBuf::from),
            border: opt("SCREEN_BORDER")
                .and_then(|b| b.parse().ok())
                .unwrap_or_default(),
        };

        tracing::debug!(
            base_url = %config.base_url,
            exchange = config.auth_url.is_some(),
            default_device = !config.default_device_id.is_empty(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Client settings derived from this configuration.
    pub fn dot_config(&self) -> Result<DotConfig, anyhow::Error> {
        let credentials = match &self.auth_url {
            Some(url) => Credentials::Exchange {
                url: Url::parse(url).with_context(|| format!("invalid DOT_AUTH_URL '{url}'"))?,
                api_key: self.api_key.clone(),
            },
            None => Credentials::ApiKey(self.api_key.clone()),
        };

        Ok(DotConfig {
            credentials,
            base_url: self.base_url.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            device_cache_ttl: Duration::from_secs(self.device_cache_ttl_secs),
            max_payload_bytes: self.max_payload_bytes,
        })
    }

    /// Font for image-mode text: the configured file, else a system font.
    ///
    /// `Ok(None)` when no font is configured and none is installed.
    pub fn load_rasterizer(&self) -> Result<Option<TextRasterizer>, anyhow::Error> {
        if let Some(path) = &self.font_path {
            let data = std::fs::read(path)
                .with_context(|| format!("failed to read DOT_FONT_PATH {}", path.display()))?;
            let rasterizer = TextRasterizer::from_bytes(data)
                .with_context(|| format!("unusable font at {}", path.display()))?;
            return Ok(Some(rasterizer));
        }

        match TextRasterizer::system() {
            Ok(r) => Ok(Some(r)),
            Err(e) => {
                tracing::warn!(error = %e, "No font available; image-mode text is disabled");
                Ok(None)
            }
        }
    }
}

/// Load .env from the usual candidate paths.
fn load_dotenv() {
    let candidates = [".env", "../.env"];
    for path in &candidates {
        if dotenvy::from_filename(path).is_ok() {
            tracing::info!("Loaded .env from: {path}");
            return;
        }
    }
    tracing::debug!("No .env file found, using system environment variables");
}

/// Validate a setting value. Returns `Ok(())` if valid, or an error message.
pub fn validate_setting(key: &str, value: &str) -> Result<(), String> {
    match key {
        "DOT_API_BASE_URL" | "DOT_AUTH_URL" => {
            let url = Url::parse(value).map_err(|e| format!("invalid URL: {e}"))?;
            if url.scheme() != "http" && url.scheme() != "https" {
                return Err("must be an http(s) URL".into());
            }
        }
        "DOT_TIMEOUT_SECS" => validate_int_range(value, 1, 600)?,
        "DOT_DEVICE_CACHE_TTL_SECS" => validate_int_range(value, 0, 86_400)?,
        "DOT_MAX_PAYLOAD_BYTES" => validate_int_range(value, 1024, 16 * 1024 * 1024)?,
        "SCREEN_BORDER" => {
            value.parse::<Border>()?;
        }
        _ => {}
    }
    Ok(())
}

fn validate_int_range(value: &str, min: u64, max: u64) -> Result<(), String> {
    let v: u64 = value.parse().map_err(|_| "must be a non-negative integer")?;
    if !(min..=max).contains(&v) {
        return Err(format!("must be between {min} and {max}"));
    }
    Ok(())
}

fn parse_u64(s: &str, default: u64) -> u64 {
    if s.is_empty() {
        return default;
    }
    s.parse().unwrap_or(default)
}

fn parse_usize(s: &str, default: usize) -> usize {
    if s.is_empty() {
        return default;
    }
    s.parse().unwrap_or(default)
}
