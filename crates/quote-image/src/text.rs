//! Font loading and text measurement helpers.
//!
//! Provides glyph-advance based width measurement, line height, and
//! word-wrapping used by the text layout renderer.

use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use tracing::{debug, info};

use crate::RenderError;

/// Parse TTF/OTF (or collection) bytes into a usable font.
pub fn load_font(data: Vec<u8>) -> Result<FontArc, RenderError> {
    FontArc::try_from_vec(data)
        .map_err(|_| RenderError::FontUnavailable("failed to parse font data (TTF/OTF)".into()))
}

/// Load the first parsable font from the well-known system locations.
pub fn load_system_font() -> Result<FontArc, RenderError> {
    for path in system_font_candidates() {
        let Ok(data) = std::fs::read(path) else {
            continue;
        };
        match load_font(data) {
            Ok(font) => {
                info!(path = %path, "Using system font for text rendering");
                return Ok(font);
            }
            Err(e) => debug!(path = %path, error = %e, "Skipping unusable system font"),
        }
    }
    Err(RenderError::FontUnavailable(
        "no usable font found (configure a font file or install system fonts)".into(),
    ))
}

fn system_font_candidates() -> &'static [&'static str] {
    #[cfg(target_os = "macos")]
    {
        &[
            "/System/Library/Fonts/Supplemental/Arial.ttf",
            "/System/Library/Fonts/Supplemental/Arial Unicode.ttf",
            "/System/Library/Fonts/Helvetica.ttc",
            "/System/Library/Fonts/Hiragino Sans GB.ttc",
        ]
    }
    #[cfg(target_os = "windows")]
    {
        &[
            "C:\\Windows\\Fonts\\arial.ttf",
            "C:\\Windows\\Fonts\\msyh.ttc",
            "C:\\Windows\\Fonts\\msgothic.ttc",
        ]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        &[
            "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
            "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
            "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
            "/usr/share/fonts/noto-cjk/NotoSansCJK-Regular.ttc",
        ]
    }
}

/// Measure the pixel width of a string at the given font and scale.
pub fn measure_text_width<F: Font>(font: &F, scale: PxScale, text: &str) -> u32 {
    let scaled = font.as_scaled(scale);
    let mut width = 0.0f32;
    let mut prev_glyph: Option<ab_glyph::GlyphId> = None;

    for ch in text.chars() {
        let glyph_id = scaled.glyph_id(ch);
        if let Some(prev) = prev_glyph {
            width += scaled.kern(prev, glyph_id);
        }
        width += scaled.h_advance(glyph_id);
        prev_glyph = Some(glyph_id);
    }

    width.ceil() as u32
}

/// Compute the line height for the given font and scale.
pub fn line_height<F: Font>(font: &F, scale: PxScale) -> u32 {
    let scaled = font.as_scaled(scale);
    (scaled.ascent() - scaled.descent() + scaled.line_gap()).ceil() as u32
}

/// Wrap text to fit within `max_width` pixels.
///
/// Explicit `\n` starts a new line. Lines break at whitespace; a single word
/// wider than `max_width` is broken between characters.
pub fn wrap_text<F: Font>(font: &F, scale: PxScale, text: &str, max_width: u32) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        wrap_paragraph(font, scale, paragraph.trim_end_matches('\r'), max_width, &mut lines);
    }
    lines
}

fn wrap_paragraph<F: Font>(
    font: &F,
    scale: PxScale,
    paragraph: &str,
    max_width: u32,
    lines: &mut Vec<String>,
) {
    if paragraph.trim().is_empty() {
        lines.push(String::new());
        return;
    }

    let mut current_line = String::new();
    let mut current_width: u32 = 0;

    for word in paragraph.split_inclusive(|c: char| c.is_whitespace()) {
        let word_width = measure_text_width(font, scale, word);

        if current_width + word_width > max_width && !current_line.is_empty() {
            lines.push(current_line.trim_end().to_string());
            current_line = String::new();
            current_width = 0;
        }

        // Force-break a word that cannot fit on a line of its own.
        if word_width > max_width && current_line.is_empty() {
            let mut char_line = String::new();
            let mut char_width: u32 = 0;
            for ch in word.chars() {
                let ch_w = measure_text_width(font, scale, ch.encode_utf8(&mut [0; 4]));
                if char_width + ch_w > max_width && !char_line.is_empty() {
                    lines.push(std::mem::take(&mut char_line));
                    char_width = 0;
                }
                char_line.push(ch);
                char_width += ch_w;
            }
            current_line = char_line;
            current_width = char_width;
            continue;
        }

        current_line.push_str(word);
        current_width += word_width;
    }

    if !current_line.trim().is_empty() {
        lines.push(current_line.trim_end().to_string());
    }
}
