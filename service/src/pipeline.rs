//! Image and text publishing on top of [`DotClient`].
//!
//! Resolves the target device, runs the local render pipeline and hands the
//! result to the client. Local failures surface before any network call.

use std::sync::Arc;

use dot_client::{Device, DotApiResponse, DotClient, DotError, RenderMode, SendOptions};
use quote_image::{DitherAlgorithm, FitMode, MonoFrame, RenderError, TextLayoutRequest};

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("no device id given and DOT_DEFAULT_DEVICE_ID is not set")]
    NoDevice,

    #[error(transparent)]
    Dot(#[from] DotError),
}

impl From<RenderError> for PublishError {
    fn from(e: RenderError) -> Self {
        PublishError::Dot(DotError::Render(e))
    }
}

pub struct Publisher {
    client: Arc<DotClient>,
    default_device_id: Option<String>,
    options: SendOptions,
}

impl Publisher {
    pub fn new(client: Arc<DotClient>, default_device_id: impl Into<String>) -> Self {
        let id = default_device_id.into();
        Self {
            client,
            default_device_id: Some(id).filter(|id| !id.trim().is_empty()),
            options: SendOptions::default(),
        }
    }

    /// Options applied to every push from this publisher.
    #[must_use]
    pub fn with_options(mut self, options: SendOptions) -> Self {
        self.options = options;
        self
    }

    pub fn client(&self) -> &DotClient {
        &self.client
    }

    /// Explicit id first, then the configured default.
    pub fn resolve_device<'a>(
        &'a self,
        device_id: Option<&'a str>,
    ) -> Result<&'a str, PublishError> {
        device_id
            .filter(|id| !id.trim().is_empty())
            .or(self.default_device_id.as_deref())
            .ok_or(PublishError::NoDevice)
    }

    /// Decode, normalize and dither encoded image bytes without sending.
    pub fn preview_image(
        &self,
        bytes: &[u8],
        fit: FitMode,
        algorithm: DitherAlgorithm,
    ) -> Result<MonoFrame, RenderError> {
        let gray = quote_image::normalize_bytes(bytes, fit)?;
        Ok(quote_image::dither(&gray, algorithm))
    }

    pub async fn publish_image(
        &self,
        bytes: &[u8],
        fit: FitMode,
        algorithm: DitherAlgorithm,
        device_id: Option<&str>,
    ) -> Result<DotApiResponse, PublishError> {
        let device = self.resolve_device(device_id)?;
        let frame = self.preview_image(bytes, fit, algorithm)?;
        tracing::info!(device, %algorithm, ?fit, "Publishing image");
        Ok(self.client.send_image_with(device, &frame, &self.options).await?)
    }

    pub async fn publish_text(
        &self,
        request: &TextLayoutRequest,
        mode: RenderMode,
        device_id: Option<&str>,
    ) -> Result<DotApiResponse, PublishError> {
        let device = self.resolve_device(device_id)?;
        tracing::info!(device, ?mode, "Publishing text");
        Ok(self
            .client
            .send_text_with(device, request, mode, &self.options)
            .await?)
    }

    pub async fn next(&self, device_id: Option<&str>) -> Result<DotApiResponse, PublishError> {
        let device = self.resolve_device(device_id)?;
        Ok(self.client.switch_next(device).await?)
    }

    pub async fn devices(&self) -> Result<Vec<Device>, PublishError> {
        Ok(self.client.list_devices().await?)
    }
}
