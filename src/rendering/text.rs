//! Text shaping, measurement and glyph painting.
//!
//! All card text comes from one embedded sans face (DejaVu Sans, see
//! `assets/fonts/DejaVuSans-LICENSE.txt`). Runs are shaped with rustybuzz
//! and painted as outline paths through tiny-skia.

use crate::{Error, Result};
use rustybuzz::ttf_parser::{GlyphId, OutlineBuilder};
use rustybuzz::{Face, UnicodeBuffer};
use std::fmt;
use std::sync::OnceLock;
use tiny_skia::{FillRule, Paint, Path, PathBuilder, Pixmap, Transform};

const EMBEDDED_SANS: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans.ttf");

pub const ELLIPSIS: &str = "\u{2026}";

static EMBEDDED: OnceLock<Option<Typeface>> = OnceLock::new();

/// One glyph of a shaped run, positioned in px relative to the run origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionedGlyph {
    pub id: u16,
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShapedRun {
    pub glyphs: Vec<PositionedGlyph>,
    pub width: f32,
}

pub struct Typeface {
    face: Face<'static>,
}

impl fmt::Debug for Typeface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Typeface")
            .field("units_per_em", &self.face.units_per_em())
            .field("glyphs", &self.face.number_of_glyphs())
            .finish()
    }
}

impl Typeface {
    /// The embedded sans face, parsed once per process.
    pub fn embedded() -> Result<&'static Typeface> {
        EMBEDDED
            .get_or_init(|| Typeface::from_static(EMBEDDED_SANS))
            .as_ref()
            .ok_or_else(|| Error::Config("embedded font could not be parsed".into()))
    }

    pub fn from_static(data: &'static [u8]) -> Option<Typeface> {
        Face::from_slice(data, 0).map(|face| Typeface { face })
    }

    fn scale(&self, size: f32) -> f32 {
        size / self.face.units_per_em() as f32
    }

    /// Distance from the top of a line box to its baseline.
    pub fn ascent(&self, size: f32) -> f32 {
        self.face.ascender() as f32 * self.scale(size)
    }

    pub fn line_height(&self, size: f32) -> f32 {
        let units = self.face.ascender() as f32 - self.face.descender() as f32 + self.face.line_gap() as f32;
        units * self.scale(size)
    }

    pub fn has_glyph(&self, c: char) -> bool {
        self.face.glyph_index(c).is_some()
    }

    pub fn shape(&self, text: &str, size: f32) -> ShapedRun {
        let mut buffer = UnicodeBuffer::new();
        buffer.push_str(text);
        buffer.guess_segment_properties();
        let output = rustybuzz::shape(&self.face, &[], buffer);

        let scale = self.scale(size);
        let mut pen = 0.0;
        let glyphs = output
            .glyph_infos()
            .iter()
            .zip(output.glyph_positions())
            .map(|(info, pos)| {
                let glyph = PositionedGlyph {
                    id: info.glyph_id as u16,
                    x: pen + pos.x_offset as f32 * scale,
                    y: pos.y_offset as f32 * scale,
                };
                pen += pos.x_advance as f32 * scale;
                glyph
            })
            .collect();
        ShapedRun { glyphs, width: pen }
    }

    pub fn measure(&self, text: &str, size: f32) -> f32 {
        self.shape(text, size).width
    }

    /// `text` unchanged when it fits in `max_width`, otherwise its longest
    /// prefix that fits once an ellipsis is appended.
    pub fn fit(&self, text: &str, size: f32, max_width: f32) -> String {
        if self.measure(text, size) <= max_width {
            return text.to_string();
        }
        let mut chars: Vec<char> = text.chars().collect();
        while chars.pop().is_some() {
            let prefix: String = chars.iter().collect();
            let candidate = format!("{}{}", prefix.trim_end(), ELLIPSIS);
            if self.measure(&candidate, size) <= max_width {
                return candidate;
            }
        }
        String::new()
    }

    fn outline(&self, id: u16) -> Option<Path> {
        let mut builder = GlyphPath(PathBuilder::new());
        self.face.outline_glyph(GlyphId(id), &mut builder)?;
        builder.0.finish()
    }

    /// Fill `text` with its line box top-left at (`x`, `top`) in user space.
    /// `device` maps user space to pixels.
    #[allow(clippy::too_many_arguments)]
    pub fn draw(
        &self,
        pixmap: &mut Pixmap,
        text: &str,
        x: f32,
        top: f32,
        size: f32,
        paint: &Paint,
        device: Transform,
    ) {
        let scale = self.scale(size);
        let baseline = top + self.ascent(size);
        for glyph in self.shape(text, size).glyphs {
            // Whitespace has no outline.
            let Some(path) = self.outline(glyph.id) else {
                continue;
            };
            let placement = Transform::from_row(scale, 0.0, 0.0, -scale, x + glyph.x, baseline - glyph.y);
            pixmap.fill_path(&path, paint, FillRule::Winding, device.pre_concat(placement), None);
        }
    }
}

/// Collects a glyph outline (font units, y up) into a tiny-skia path.
struct GlyphPath(PathBuilder);

impl OutlineBuilder for GlyphPath {
    fn move_to(&mut self, x: f32, y: f32) {
        self.0.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.0.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        self.0.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        self.0.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.0.close();
    }
}
