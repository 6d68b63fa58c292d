//! Fixed-size display frames.
//!
//! A frame always covers the whole panel: constructors reject any buffer
//! whose dimensions differ from `SCREEN_WIDTH` x `SCREEN_HEIGHT`.

use std::io::Cursor;

use image::{DynamicImage, GrayImage, ImageFormat, Luma};

use crate::{RenderError, SCREEN_HEIGHT, SCREEN_WIDTH};

/// Bytes per packed row of a [`MonoFrame`].
pub const ROW_STRIDE: usize = SCREEN_WIDTH.div_ceil(8) as usize;

fn check_dimensions(width: u32, height: u32) -> Result<(), RenderError> {
    if width != SCREEN_WIDTH || height != SCREEN_HEIGHT {
        return Err(RenderError::InvalidDimensions { width, height });
    }
    Ok(())
}

/// An 8-bit grayscale frame (0 = black, 255 = white).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrayFrame {
    image: GrayImage,
}

impl GrayFrame {
    /// A white frame.
    pub fn blank() -> Self {
        Self {
            image: GrayImage::from_pixel(SCREEN_WIDTH, SCREEN_HEIGHT, Luma([255])),
        }
    }

    /// Wrap a grayscale image, rejecting anything that is not panel-sized.
    pub fn from_image(image: GrayImage) -> Result<Self, RenderError> {
        check_dimensions(image.width(), image.height())?;
        Ok(Self { image })
    }

    /// Callers must have produced a panel-sized image.
    pub(crate) fn from_trusted(image: GrayImage) -> Self {
        debug_assert_eq!(image.dimensions(), (SCREEN_WIDTH, SCREEN_HEIGHT));
        Self { image }
    }

    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.image.get_pixel(x, y).0[0]
    }

    pub fn as_image(&self) -> &GrayImage {
        &self.image
    }

    pub fn into_image(self) -> GrayImage {
        self.image
    }
}

/// A 1-bit frame, packed MSB-first per row. A set bit is a white pixel.
#[derive(Clone, PartialEq, Eq)]
pub struct MonoFrame {
    bits: Vec<u8>,
}

impl std::fmt::Debug for MonoFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonoFrame")
            .field("width", &SCREEN_WIDTH)
            .field("height", &SCREEN_HEIGHT)
            .field("white_pixels", &self.white_count())
            .finish()
    }
}

impl MonoFrame {
    /// An all-white frame.
    pub fn white() -> Self {
        Self {
            bits: vec![0xFF; ROW_STRIDE * SCREEN_HEIGHT as usize],
        }
    }

    /// Pack a panel-sized grayscale image. Values `>= 128` become white.
    pub fn from_gray_image(image: &GrayImage) -> Result<Self, RenderError> {
        check_dimensions(image.width(), image.height())?;
        Ok(Self::pack(image))
    }

    /// Callers must have checked the dimensions.
    pub(crate) fn pack(image: &GrayImage) -> Self {
        let mut bits = vec![0u8; ROW_STRIDE * SCREEN_HEIGHT as usize];
        for (x, y, px) in image.enumerate_pixels() {
            if px.0[0] >= 128 {
                let idx = y as usize * ROW_STRIDE + (x as usize / 8);
                bits[idx] |= 0x80 >> (x % 8);
            }
        }
        Self { bits }
    }

    /// Wrap an already packed buffer.
    pub fn from_packed(bits: Vec<u8>) -> Result<Self, RenderError> {
        if bits.len() != ROW_STRIDE * SCREEN_HEIGHT as usize {
            return Err(RenderError::InvalidDimensions {
                width: SCREEN_WIDTH,
                height: (bits.len() / ROW_STRIDE) as u32,
            });
        }
        Ok(Self { bits })
    }

    pub fn width(&self) -> u32 {
        SCREEN_WIDTH
    }

    pub fn height(&self) -> u32 {
        SCREEN_HEIGHT
    }

    pub fn is_white(&self, x: u32, y: u32) -> bool {
        let idx = y as usize * ROW_STRIDE + (x as usize / 8);
        self.bits[idx] & (0x80 >> (x % 8)) != 0
    }

    /// Number of white pixels in the frame.
    pub fn white_count(&self) -> usize {
        (0..SCREEN_HEIGHT)
            .flat_map(|y| (0..SCREEN_WIDTH).map(move |x| (x, y)))
            .filter(|&(x, y)| self.is_white(x, y))
            .count()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    /// Expand back to 0/255 grayscale.
    pub fn to_gray_image(&self) -> GrayImage {
        GrayImage::from_fn(SCREEN_WIDTH, SCREEN_HEIGHT, |x, y| {
            Luma([if self.is_white(x, y) { 255 } else { 0 }])
        })
    }

    /// Encode as a PNG, the format the cloud image endpoint accepts.
    pub fn to_png(&self) -> Result<Vec<u8>, RenderError> {
        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageLuma8(self.to_gray_image())
            .write_to(&mut cursor, ImageFormat::Png)
            .map_err(|e| RenderError::Encode(e.to_string()))?;
        Ok(cursor.into_inner())
    }
}
