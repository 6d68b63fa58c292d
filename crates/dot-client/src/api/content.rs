use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use quote_image::{DitherAlgorithm, MonoFrame, RenderError, TextLayoutRequest, dither};
use reqwest::Method;
use serde::Serialize;

use super::models::{DotApiResponse, ImagePayload, TextPayload};
use super::*;

/// How a text push reaches the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    /// Send the fields and let the device lay them out.
    #[default]
    Native,
    /// Rasterize locally, dither with the given algorithm, send as an image.
    Image(DitherAlgorithm),
}

/// Panel border color for image pushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Border {
    #[default]
    White,
    Black,
}

impl Border {
    fn wire_value(self) -> u8 {
        match self {
            Border::White => 0,
            Border::Black => 1,
        }
    }
}

impl std::str::FromStr for Border {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "white" | "0" => Ok(Border::White),
            "black" | "1" => Ok(Border::Black),
            other => Err(format!("unknown border '{other}' (expected white or black)")),
        }
    }
}

/// Optional fields shared by text and image pushes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOptions {
    /// Show the content immediately instead of at the next rotation.
    pub refresh_now: bool,
    /// NFC tap redirect URL.
    pub link: Option<String>,
    /// Targets one specific content slot on the device.
    pub task_key: Option<String>,
    /// Base64 PNG icon; native text only.
    pub icon: Option<String>,
    /// Image pushes only.
    pub border: Border,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            refresh_now: true,
            link: None,
            task_key: None,
            icon: None,
            border: Border::default(),
        }
    }
}

impl DotClient {
    pub async fn send_text(
        &self,
        device_id: &str,
        request: &TextLayoutRequest,
        mode: RenderMode,
    ) -> Result<DotApiResponse, DotError> {
        self.send_text_with(device_id, request, mode, &SendOptions::default())
            .await
    }

    /// Push text either natively or as a locally rendered image.
    ///
    /// Rendering and payload checks run before any network call.
    pub async fn send_text_with(
        &self,
        device_id: &str,
        request: &TextLayoutRequest,
        mode: RenderMode,
        options: &SendOptions,
    ) -> Result<DotApiResponse, DotError> {
        match mode {
            RenderMode::Native => {
                let payload = TextPayload {
                    refresh_now: options.refresh_now,
                    title: non_blank(request.title.as_deref()),
                    message: non_blank(Some(request.body.as_str())),
                    signature: non_blank(request.signature.as_deref()),
                    icon: options.icon.as_deref(),
                    link: options.link.as_deref(),
                    task_key: options.task_key.as_deref(),
                };
                let body = self.encode_payload(&payload)?;
                self.ensure_known_device(device_id).await?;

                let resp = self
                    .authorized(Method::POST, &["device", device_id, "text"], Some(&body))
                    .await?;
                tracing::info!(device_id, "Text pushed");
                Ok(DotApiResponse::from_body(&resp))
            }
            RenderMode::Image(algorithm) => {
                let rasterizer = self.rasterizer.as_ref().ok_or_else(|| {
                    RenderError::FontUnavailable("no rasterizer configured for image mode".into())
                })?;
                let (canvas, layout) = rasterizer.render(request);
                if layout.truncated() {
                    tracing::debug!(
                        lines_total = layout.lines_total,
                        lines_rendered = layout.lines_rendered,
                        "Body truncated to fit the panel"
                    );
                }
                let frame = dither(&canvas, algorithm);
                self.send_image_with(device_id, &frame, options).await
            }
        }
    }

    pub async fn send_image(
        &self,
        device_id: &str,
        frame: &MonoFrame,
    ) -> Result<DotApiResponse, DotError> {
        self.send_image_with(device_id, frame, &SendOptions::default())
            .await
    }

    /// Push a pre-dithered frame. The cloud is told not to dither again.
    pub async fn send_image_with(
        &self,
        device_id: &str,
        frame: &MonoFrame,
        options: &SendOptions,
    ) -> Result<DotApiResponse, DotError> {
        let png = frame.to_png()?;
        let payload = ImagePayload {
            refresh_now: options.refresh_now,
            image: STANDARD.encode(&png),
            border: options.border.wire_value(),
            dither_type: "NONE",
            link: options.link.as_deref(),
            task_key: options.task_key.as_deref(),
        };
        let body = self.encode_payload(&payload)?;
        self.ensure_known_device(device_id).await?;

        let resp = self
            .authorized(Method::POST, &["device", device_id, "image"], Some(&body))
            .await?;
        tracing::info!(device_id, png_bytes = png.len(), "Image pushed");
        Ok(DotApiResponse::from_body(&resp))
    }

    fn encode_payload<T: Serialize>(&self, payload: &T) -> Result<Vec<u8>, DotError> {
        let body = serde_json::to_vec(payload)?;
        if body.len() > self.max_payload_bytes {
            return Err(DotError::PayloadTooLarge {
                size: body.len(),
                limit: self.max_payload_bytes,
            });
        }
        Ok(body)
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.trim().is_empty())
}
