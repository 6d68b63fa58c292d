//! Title / body / signature layout for the render-as-image text path.
//!
//! Layout:
//! ```text
//! +--------------------------------+
//! | Title                          |  title band (one line)
//! | body text wraps here and is    |  body band
//! | truncated at the last line     |
//! | that fits completely           |
//! |                     signature  |  signature band (one line)
//! +--------------------------------+
//! ```
//!
//! Bands are fixed before any glyph is drawn. Each band is rendered on its
//! own canvas and copied into the frame, so glyphs never cross band edges.

use ab_glyph::{FontArc, PxScale};
use image::{GrayImage, Luma};
use imageproc::drawing::draw_text_mut;
use tracing::debug;

use crate::frame::GrayFrame;
use crate::text;
use crate::{RenderError, SCREEN_HEIGHT, SCREEN_WIDTH};

const BLACK: Luma<u8> = Luma([0]);
const WHITE: Luma<u8> = Luma([255]);

/// Gap between the title band and the body band.
pub const TITLE_GAP: u32 = 6;

/// Gap between the body band and the signature band.
pub const SIGNATURE_GAP: u32 = 4;

/// Extra space between wrapped body lines.
pub const LINE_SPACING: u32 = 2;

/// Text to lay out on the panel.
#[derive(Debug, Clone, PartialEq)]
pub struct TextLayoutRequest {
    pub title: Option<String>,
    pub body: String,
    pub signature: Option<String>,
    pub title_size: f32,
    pub body_size: f32,
    pub signature_size: f32,
    pub padding: u32,
}

impl Default for TextLayoutRequest {
    fn default() -> Self {
        Self {
            title: None,
            body: String::new(),
            signature: None,
            title_size: 18.0,
            body_size: 14.0,
            signature_size: 10.0,
            padding: 8,
        }
    }
}

impl TextLayoutRequest {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    fn title_text(&self) -> Option<&str> {
        self.title.as_deref().filter(|t| !t.trim().is_empty())
    }

    fn signature_text(&self) -> Option<&str> {
        self.signature.as_deref().filter(|s| !s.trim().is_empty())
    }
}

/// A horizontal strip of the frame, in rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Band {
    pub top: u32,
    pub height: u32,
}

impl Band {
    /// First row below the band.
    pub fn bottom(&self) -> u32 {
        self.top + self.height
    }
}

/// Computed geometry and truncation outcome of one layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextLayout {
    pub title: Option<Band>,
    pub body: Band,
    pub signature: Option<Band>,
    /// Body line height in pixels, without spacing.
    pub body_line_height: u32,
    /// Wrapped body lines before truncation.
    pub lines_total: usize,
    /// Body lines actually drawn.
    pub lines_rendered: usize,
}

impl TextLayout {
    pub fn truncated(&self) -> bool {
        self.lines_rendered < self.lines_total
    }
}

/// Renders [`TextLayoutRequest`]s with a fixed font.
#[derive(Clone)]
pub struct TextRasterizer {
    font: FontArc,
}

impl std::fmt::Debug for TextRasterizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextRasterizer").finish_non_exhaustive()
    }
}

impl TextRasterizer {
    pub fn new(font: FontArc) -> Self {
        Self { font }
    }

    /// Build from TTF/OTF bytes.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, RenderError> {
        Ok(Self::new(text::load_font(data)?))
    }

    /// Build from the first usable system font.
    pub fn system() -> Result<Self, RenderError> {
        Ok(Self::new(text::load_system_font()?))
    }

    /// Compute bands and wrapped body lines without drawing.
    pub fn layout(&self, request: &TextLayoutRequest) -> TextLayout {
        self.plan(request).0
    }

    /// Render the request onto a white panel-sized canvas.
    ///
    /// Body text that does not fit is dropped at the last complete line.
    pub fn render(&self, request: &TextLayoutRequest) -> (GrayFrame, TextLayout) {
        let (layout, lines) = self.plan(request);
        let padding = request.padding.min(SCREEN_WIDTH / 2);
        let inner_width = SCREEN_WIDTH - 2 * padding;
        let mut canvas = GrayImage::from_pixel(SCREEN_WIDTH, SCREEN_HEIGHT, WHITE);

        if let (Some(band), Some(title)) = (layout.title, request.title_text()) {
            let scale = PxScale::from(request.title_size);
            let mut strip = band_canvas(inner_width, band);
            draw_text_mut(&mut strip, BLACK, 0, 0, scale, &self.font, title);
            paste(&mut canvas, &strip, padding, band);
        }

        if layout.lines_rendered > 0 {
            let scale = PxScale::from(request.body_size);
            let pitch = layout.body_line_height + LINE_SPACING;
            let mut strip = band_canvas(inner_width, layout.body);
            for (i, line) in lines.iter().take(layout.lines_rendered).enumerate() {
                let y = (i as u32 * pitch) as i32;
                draw_text_mut(&mut strip, BLACK, 0, y, scale, &self.font, line);
            }
            paste(&mut canvas, &strip, padding, layout.body);
        }

        if let (Some(band), Some(signature)) = (layout.signature, request.signature_text()) {
            let scale = PxScale::from(request.signature_size);
            let width = text::measure_text_width(&self.font, scale, signature);
            let x = inner_width.saturating_sub(width) as i32;
            let mut strip = band_canvas(inner_width, band);
            draw_text_mut(&mut strip, BLACK, x, 0, scale, &self.font, signature);
            paste(&mut canvas, &strip, padding, band);
        }

        debug!(
            lines_total = layout.lines_total,
            lines_rendered = layout.lines_rendered,
            "Rendered text layout"
        );

        (GrayFrame::from_trusted(canvas), layout)
    }

    fn plan(&self, request: &TextLayoutRequest) -> (TextLayout, Vec<String>) {
        let padding = request.padding.min(SCREEN_HEIGHT / 2);
        let inner_bottom = SCREEN_HEIGHT - padding;
        let inner_width = SCREEN_WIDTH.saturating_sub(2 * request.padding.min(SCREEN_WIDTH / 2));

        let title = request.title_text().map(|_| {
            let h = text::line_height(&self.font, PxScale::from(request.title_size));
            Band {
                top: padding,
                height: h.min(inner_bottom - padding),
            }
        });

        let signature = request.signature_text().map(|_| {
            let h = text::line_height(&self.font, PxScale::from(request.signature_size));
            let floor = title.map_or(padding, |b| b.bottom());
            let top = inner_bottom.saturating_sub(h).max(floor);
            Band {
                top,
                height: inner_bottom - top,
            }
        });

        let body_top = title.map_or(padding, |b| b.bottom() + TITLE_GAP);
        let body_bottom = signature.map_or(inner_bottom, |b| b.top.saturating_sub(SIGNATURE_GAP));
        let body = Band {
            top: body_top.min(body_bottom),
            height: body_bottom.saturating_sub(body_top),
        };

        let body_scale = PxScale::from(request.body_size);
        let body_line_height = text::line_height(&self.font, body_scale);
        let lines = if request.body.trim().is_empty() {
            Vec::new()
        } else {
            text::wrap_text(&self.font, body_scale, &request.body, inner_width)
        };

        let fit = lines_that_fit(body.height, body_line_height);
        let layout = TextLayout {
            title,
            body,
            signature,
            body_line_height,
            lines_total: lines.len(),
            lines_rendered: lines.len().min(fit),
        };
        (layout, lines)
    }
}

/// Number of complete lines a band of `height` rows can hold.
fn lines_that_fit(height: u32, line_height: u32) -> usize {
    if line_height == 0 || height < line_height {
        return 0;
    }
    1 + ((height - line_height) / (line_height + LINE_SPACING)) as usize
}

fn band_canvas(width: u32, band: Band) -> GrayImage {
    GrayImage::from_pixel(width, band.height, WHITE)
}

fn paste(canvas: &mut GrayImage, strip: &GrayImage, x: u32, band: Band) {
    image::imageops::replace(canvas, strip, i64::from(x), i64::from(band.top));
}
