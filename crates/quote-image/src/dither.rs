//! Dithering algorithms for converting grayscale frames to black-and-white.
//!
//! Every error-diffusion variant is a [`Kernel`] descriptor run through the
//! same raster-order loop. `None` is a plain threshold at the midpoint.

use std::fmt;
use std::str::FromStr;

use image::{GrayImage, Luma};
use tracing::debug;

use crate::frame::{GrayFrame, MonoFrame};
use crate::RenderError;

/// Threshold value for binarization.
const THRESHOLD: u8 = 128;

/// One error-diffusion target relative to the current pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tap {
    pub dx: i32,
    pub dy: u32,
    pub weight: f32,
}

const fn tap(dx: i32, dy: u32, weight: f32) -> Tap {
    Tap { dx, dy, weight }
}

/// Error-diffusion kernel: each tap receives `error * weight / divisor`.
///
/// Weights need not sum to the divisor; Atkinson deliberately drops a quarter
/// of the error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Kernel {
    pub taps: &'static [Tap],
    pub divisor: f32,
}

pub const FLOYD_STEINBERG: Kernel = Kernel {
    taps: &[tap(1, 0, 7.0), tap(-1, 1, 3.0), tap(0, 1, 5.0), tap(1, 1, 1.0)],
    divisor: 16.0,
};

pub const ATKINSON: Kernel = Kernel {
    taps: &[
        tap(1, 0, 1.0),
        tap(2, 0, 1.0),
        tap(-1, 1, 1.0),
        tap(0, 1, 1.0),
        tap(1, 1, 1.0),
        tap(0, 2, 1.0),
    ],
    divisor: 8.0,
};

pub const SIERRA: Kernel = Kernel {
    taps: &[
        tap(1, 0, 5.0),
        tap(2, 0, 3.0),
        tap(-2, 1, 2.0),
        tap(-1, 1, 4.0),
        tap(0, 1, 5.0),
        tap(1, 1, 4.0),
        tap(2, 1, 2.0),
        tap(-1, 2, 2.0),
        tap(0, 2, 3.0),
        tap(1, 2, 2.0),
    ],
    divisor: 32.0,
};

pub const TWO_ROW_SIERRA: Kernel = Kernel {
    taps: &[
        tap(1, 0, 4.0),
        tap(2, 0, 3.0),
        tap(-2, 1, 1.0),
        tap(-1, 1, 2.0),
        tap(0, 1, 3.0),
        tap(1, 1, 2.0),
        tap(2, 1, 1.0),
    ],
    divisor: 16.0,
};

pub const SIERRA_LITE: Kernel = Kernel {
    taps: &[tap(1, 0, 2.0), tap(-1, 1, 1.0), tap(0, 1, 1.0)],
    divisor: 4.0,
};

pub const BURKES: Kernel = Kernel {
    taps: &[
        tap(1, 0, 8.0),
        tap(2, 0, 4.0),
        tap(-2, 1, 2.0),
        tap(-1, 1, 4.0),
        tap(0, 1, 8.0),
        tap(1, 1, 4.0),
        tap(2, 1, 2.0),
    ],
    divisor: 32.0,
};

pub const STUCKI: Kernel = Kernel {
    taps: &[
        tap(1, 0, 8.0),
        tap(2, 0, 4.0),
        tap(-2, 1, 2.0),
        tap(-1, 1, 4.0),
        tap(0, 1, 8.0),
        tap(1, 1, 4.0),
        tap(2, 1, 2.0),
        tap(-2, 2, 1.0),
        tap(-1, 2, 2.0),
        tap(0, 2, 4.0),
        tap(1, 2, 2.0),
        tap(2, 2, 1.0),
    ],
    divisor: 42.0,
};

pub const JARVIS_JUDICE_NINKE: Kernel = Kernel {
    taps: &[
        tap(1, 0, 7.0),
        tap(2, 0, 5.0),
        tap(-2, 1, 3.0),
        tap(-1, 1, 5.0),
        tap(0, 1, 7.0),
        tap(1, 1, 5.0),
        tap(2, 1, 3.0),
        tap(-2, 2, 1.0),
        tap(-1, 2, 3.0),
        tap(0, 2, 5.0),
        tap(1, 2, 3.0),
        tap(2, 2, 1.0),
    ],
    divisor: 48.0,
};

/// Selectable grayscale-to-1-bit conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DitherAlgorithm {
    /// Threshold at 128, no diffusion.
    None,
    #[default]
    FloydSteinberg,
    Atkinson,
    /// Full three-row Sierra.
    Sierra,
    TwoRowSierra,
    SierraLite,
    Burkes,
    Stucki,
    JarvisJudiceNinke,
}

impl DitherAlgorithm {
    pub const ALL: [DitherAlgorithm; 9] = [
        DitherAlgorithm::None,
        DitherAlgorithm::FloydSteinberg,
        DitherAlgorithm::Atkinson,
        DitherAlgorithm::Sierra,
        DitherAlgorithm::TwoRowSierra,
        DitherAlgorithm::SierraLite,
        DitherAlgorithm::Burkes,
        DitherAlgorithm::Stucki,
        DitherAlgorithm::JarvisJudiceNinke,
    ];

    /// The diffusion kernel, or `None` for plain thresholding.
    pub fn kernel(self) -> Option<&'static Kernel> {
        match self {
            DitherAlgorithm::None => None,
            DitherAlgorithm::FloydSteinberg => Some(&FLOYD_STEINBERG),
            DitherAlgorithm::Atkinson => Some(&ATKINSON),
            DitherAlgorithm::Sierra => Some(&SIERRA),
            DitherAlgorithm::TwoRowSierra => Some(&TWO_ROW_SIERRA),
            DitherAlgorithm::SierraLite => Some(&SIERRA_LITE),
            DitherAlgorithm::Burkes => Some(&BURKES),
            DitherAlgorithm::Stucki => Some(&STUCKI),
            DitherAlgorithm::JarvisJudiceNinke => Some(&JARVIS_JUDICE_NINKE),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DitherAlgorithm::None => "none",
            DitherAlgorithm::FloydSteinberg => "floyd_steinberg",
            DitherAlgorithm::Atkinson => "atkinson",
            DitherAlgorithm::Sierra => "sierra",
            DitherAlgorithm::TwoRowSierra => "two_row_sierra",
            DitherAlgorithm::SierraLite => "sierra_lite",
            DitherAlgorithm::Burkes => "burkes",
            DitherAlgorithm::Stucki => "stucki",
            DitherAlgorithm::JarvisJudiceNinke => "jarvis_judice_ninke",
        }
    }
}

impl fmt::Display for DitherAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DitherAlgorithm {
    type Err = RenderError;

    /// Accepts snake, kebab or upper case, plus the cloud API kernel names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        let algorithm = match key.as_str() {
            "none" | "threshold" => DitherAlgorithm::None,
            "floyd_steinberg" | "floydsteinberg" | "fs" => DitherAlgorithm::FloydSteinberg,
            "atkinson" => DitherAlgorithm::Atkinson,
            "sierra" | "sierra3" => DitherAlgorithm::Sierra,
            "two_row_sierra" | "sierra2" => DitherAlgorithm::TwoRowSierra,
            "sierra_lite" | "sierra_2_4a" => DitherAlgorithm::SierraLite,
            "burkes" => DitherAlgorithm::Burkes,
            "stucki" => DitherAlgorithm::Stucki,
            "jarvis_judice_ninke" | "jjn" => DitherAlgorithm::JarvisJudiceNinke,
            _ => return Err(RenderError::UnknownAlgorithm(s.to_string())),
        };
        Ok(algorithm)
    }
}

/// Dither a panel frame into a packed 1-bit frame.
pub fn dither(frame: &GrayFrame, algorithm: DitherAlgorithm) -> MonoFrame {
    MonoFrame::pack(&dither_image(frame.as_image(), algorithm))
}

/// Dither a grayscale image of any size. Output pixels are exactly 0 or 255.
pub fn dither_image(img: &GrayImage, algorithm: DitherAlgorithm) -> GrayImage {
    match algorithm.kernel() {
        Some(kernel) => diffuse(img, kernel),
        None => threshold_convert(img, THRESHOLD),
    }
}

/// Single raster-order error-diffusion pass.
fn diffuse(img: &GrayImage, kernel: &Kernel) -> GrayImage {
    let (width, height) = img.dimensions();
    debug!(width, height, taps = kernel.taps.len(), "Applying error diffusion");

    let w = width as usize;
    let mut buffer: Vec<f32> = img.as_raw().iter().map(|&v| f32::from(v)).collect();

    for y in 0..height {
        for x in 0..width {
            let idx = y as usize * w + x as usize;
            let old_pixel = buffer[idx];
            let new_pixel = if old_pixel >= f32::from(THRESHOLD) {
                255.0
            } else {
                0.0
            };
            buffer[idx] = new_pixel;

            let error = old_pixel - new_pixel;
            if error != 0.0 {
                distribute_error(&mut buffer, kernel, x, y, width, height, error);
            }
        }
    }

    GrayImage::from_fn(width, height, |x, y| {
        Luma([buffer[y as usize * w + x as usize] as u8])
    })
}

/// Spread quantization error to unvisited neighbours. Taps outside the grid are dropped.
fn distribute_error(
    buffer: &mut [f32],
    kernel: &Kernel,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    error: f32,
) {
    for t in kernel.taps {
        let nx = i64::from(x) + i64::from(t.dx);
        let ny = y + t.dy;
        if nx < 0 || nx >= i64::from(width) || ny >= height {
            continue;
        }
        buffer[ny as usize * width as usize + nx as usize] += error * t.weight / kernel.divisor;
    }
}

/// Simple threshold conversion without dithering.
///
/// Pixels with values >= `threshold` become white (255), others become black (0).
pub fn threshold_convert(img: &GrayImage, threshold: u8) -> GrayImage {
    let (width, height) = img.dimensions();
    debug!(width, height, threshold, "Applying threshold conversion");

    GrayImage::from_fn(width, height, |x, y| {
        let val = img.get_pixel(x, y).0[0];
        Luma([if val >= threshold { 255 } else { 0 }])
    })
}
