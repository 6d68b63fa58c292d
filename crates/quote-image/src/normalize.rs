//! Image normalization to the panel grid.
//!
//! Decodes arbitrary source images, resizes them with Lanczos3 filtering
//! and converts to 8-bit grayscale at exactly `SCREEN_WIDTH` x `SCREEN_HEIGHT`.

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use tracing::debug;

use crate::frame::GrayFrame;
use crate::{RenderError, SCREEN_HEIGHT, SCREEN_WIDTH};

/// How a source image is fitted to the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FitMode {
    /// Scale to cover the whole panel, then center-crop the overflow.
    #[default]
    Cover,
    /// Scale to fit inside the panel and pad with white.
    Contain,
    /// Resize to the panel ignoring aspect ratio.
    Stretch,
}

impl std::str::FromStr for FitMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cover" | "crop" => Ok(FitMode::Cover),
            "contain" | "letterbox" => Ok(FitMode::Contain),
            "stretch" => Ok(FitMode::Stretch),
            other => Err(format!("unknown fit mode '{other}'")),
        }
    }
}

/// Decode encoded image bytes (PNG, JPEG, ...) and normalize them.
pub fn normalize_bytes(bytes: &[u8], fit: FitMode) -> Result<GrayFrame, RenderError> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| RenderError::UnsupportedFormat(e.to_string()))?;
    normalize(&img, fit)
}

/// Normalize a decoded image to a panel-sized grayscale frame.
pub fn normalize(img: &DynamicImage, fit: FitMode) -> Result<GrayFrame, RenderError> {
    let (src_w, src_h) = (img.width(), img.height());
    if src_w == 0 || src_h == 0 {
        return Err(RenderError::InvalidDimensions {
            width: src_w,
            height: src_h,
        });
    }

    debug!(src_w, src_h, ?fit, "Normalizing image to panel");

    let gray = flatten_to_gray(img);
    let out = match fit {
        FitMode::Cover => cover(&gray),
        FitMode::Contain => contain(&gray),
        FitMode::Stretch => resize_exact(&gray, SCREEN_WIDTH, SCREEN_HEIGHT),
    };

    GrayFrame::from_image(out)
}

/// Composite any alpha channel over white, then take luminance.
fn flatten_to_gray(img: &DynamicImage) -> GrayImage {
    if !img.color().has_alpha() {
        return img.to_luma8();
    }

    let rgba = img.to_rgba8();
    let rgb = RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = f32::from(a) / 255.0;
        let blend = |c: u8| (f32::from(c) * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        Rgb([blend(r), blend(g), blend(b)])
    });
    DynamicImage::ImageRgb8(rgb).to_luma8()
}

fn resize_exact(img: &GrayImage, width: u32, height: u32) -> GrayImage {
    if img.dimensions() == (width, height) {
        return img.clone();
    }
    imageops::resize(img, width, height, FilterType::Lanczos3)
}

fn cover(img: &GrayImage) -> GrayImage {
    let (src_w, src_h) = img.dimensions();
    let scale = f64::max(
        f64::from(SCREEN_WIDTH) / f64::from(src_w),
        f64::from(SCREEN_HEIGHT) / f64::from(src_h),
    );
    // Source region that lands on the panel, so only that region is resampled.
    let crop_w = ((f64::from(SCREEN_WIDTH) / scale).round() as u32).clamp(1, src_w);
    let crop_h = ((f64::from(SCREEN_HEIGHT) / scale).round() as u32).clamp(1, src_h);
    let x = (src_w - crop_w) / 2;
    let y = (src_h - crop_h) / 2;

    debug!(crop_w, crop_h, scale, "Cover crop before resize");

    let region = imageops::crop_imm(img, x, y, crop_w, crop_h).to_image();
    resize_exact(&region, SCREEN_WIDTH, SCREEN_HEIGHT)
}

fn contain(img: &GrayImage) -> GrayImage {
    let (src_w, src_h) = img.dimensions();
    let scale = f64::min(
        f64::from(SCREEN_WIDTH) / f64::from(src_w),
        f64::from(SCREEN_HEIGHT) / f64::from(src_h),
    );
    let new_w = ((f64::from(src_w) * scale).round() as u32).clamp(1, SCREEN_WIDTH);
    let new_h = ((f64::from(src_h) * scale).round() as u32).clamp(1, SCREEN_HEIGHT);

    let resized = resize_exact(img, new_w, new_h);
    let mut canvas = GrayImage::from_pixel(SCREEN_WIDTH, SCREEN_HEIGHT, Luma([255]));
    let x = i64::from((SCREEN_WIDTH - new_w) / 2);
    let y = i64::from((SCREEN_HEIGHT - new_h) / 2);
    imageops::overlay(&mut canvas, &resized, x, y);
    canvas
}
