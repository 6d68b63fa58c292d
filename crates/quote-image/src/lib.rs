//! Image pipeline for the Quote/0 e-ink display.
//!
//! Provides cover-crop normalization to the 296x152 panel, error-diffusion
//! dithering to 1-bit, and text layout rendering for the render-as-image
//! text path.

pub mod dither;
pub mod frame;
pub mod layout;
pub mod normalize;
pub mod text;

// Re-exports for convenience
pub use dither::{DitherAlgorithm, Kernel, dither, dither_image};
pub use frame::{GrayFrame, MonoFrame};
pub use layout::{Band, TextLayout, TextLayoutRequest, TextRasterizer};
pub use normalize::{FitMode, normalize, normalize_bytes};

/// Quote/0 panel width in pixels.
pub const SCREEN_WIDTH: u32 = 296;

/// Quote/0 panel height in pixels.
pub const SCREEN_HEIGHT: u32 = 152;

/// Unified error type for the quote-image crate.
///
/// Every variant is a local, non-retryable input problem.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Unknown dither algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("Font unavailable: {0}")]
    FontUnavailable(String),

    #[error("PNG encoding failed: {0}")]
    Encode(String),
}
