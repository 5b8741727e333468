//! Bitmap-snapshot capability and its native implementation.

use crate::rendering::paint::{PaintCommand, Scene, BROKEN_FILL, MUTED_INK};
use crate::rendering::text::Typeface;
use crate::rendering::{Color, ExportArtifact};
use crate::{Error, Result};
use base64::Engine as Base64Engine;
use futures::future::BoxFuture;
use image::imageops::{self, FilterType};
use image::RgbaImage;
use tiny_skia::{
    IntSize, LineCap, Paint, PathBuilder, Pixmap, PixmapPaint, Rect, Stroke, Transform,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterOptions {
    /// Device pixels per CSS px
    pub pixel_ratio: f32,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self { pixel_ratio: 2.0 }
    }
}

/// Turns a scene into an encoded image (`data:image/png;base64,...`).
pub trait Rasterizer: Send + Sync {
    fn to_png<'a>(&'a self, scene: &'a Scene, options: RasterOptions) -> BoxFuture<'a, Result<String>>;
}

/// Pure-Rust rasterizer painting into a tiny-skia pixmap.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeRasterizer;

impl NativeRasterizer {
    pub fn new() -> Self {
        NativeRasterizer
    }

    /// Paint `scene` at `pixel_ratio`.
    pub fn paint(&self, scene: &Scene, options: RasterOptions) -> Result<Pixmap> {
        let ratio = options.pixel_ratio;
        if !(ratio.is_finite() && ratio > 0.0) {
            return Err(Error::Config(format!("invalid pixel ratio {}", ratio)));
        }
        let width = (scene.width as f32 * ratio).round() as u32;
        let height = (scene.height as f32 * ratio).round() as u32;
        let mut pixmap = Pixmap::new(width, height)
            .ok_or_else(|| Error::Image(format!("cannot allocate a {}x{} canvas", width, height)))?;
        pixmap.fill(skia_color(scene.background));

        let device = Transform::from_scale(ratio, ratio);
        let face = Typeface::embedded()?;

        for cmd in &scene.commands {
            match cmd {
                PaintCommand::SolidRect { x, y, width, height, rgba } => {
                    if let Some(rect) = css_rect(*x, *y, *width, *height) {
                        pixmap.fill_rect(rect, &solid(*rgba), device, None);
                    }
                }
                PaintCommand::Ellipse { x, y, width, height, rgba } => {
                    if let Some(oval) = css_rect(*x, *y, *width, *height).and_then(PathBuilder::from_oval) {
                        pixmap.fill_path(&oval, &solid(*rgba), tiny_skia::FillRule::Winding, device, None);
                    }
                }
                PaintCommand::Image { x, y, width, height, image } => {
                    let w = (*width as f32 * ratio).round() as u32;
                    let h = (*height as f32 * ratio).round() as u32;
                    if w == 0 || h == 0 || image.width() == 0 || image.height() == 0 {
                        continue;
                    }
                    if let Some(photo) = to_pixmap(cover(image, w, h)) {
                        let at = Transform::from_translate(
                            (*x as f32 * ratio).round(),
                            (*y as f32 * ratio).round(),
                        );
                        pixmap.draw_pixmap(0, 0, photo.as_ref(), &PixmapPaint::default(), at, None);
                    }
                }
                PaintCommand::BrokenImage { x, y, width, height } => {
                    let Some(rect) = css_rect(*x, *y, *width, *height) else {
                        continue;
                    };
                    pixmap.fill_rect(rect, &solid(BROKEN_FILL), device, None);
                    let mut cross = PathBuilder::new();
                    cross.move_to(rect.left(), rect.top());
                    cross.line_to(rect.right(), rect.bottom());
                    cross.move_to(rect.right(), rect.top());
                    cross.line_to(rect.left(), rect.bottom());
                    if let Some(cross) = cross.finish() {
                        let stroke = Stroke {
                            width: 2.0,
                            line_cap: LineCap::Square,
                            ..Stroke::default()
                        };
                        pixmap.stroke_path(&cross, &solid(MUTED_INK), &stroke, device, None);
                    }
                }
                PaintCommand::Text { x, y, text, size, rgba } => {
                    face.draw(&mut pixmap, text, *x as f32, *y as f32, *size, &solid(*rgba), device);
                }
            }
        }
        Ok(pixmap)
    }

    /// Paint and encode as a PNG data URI.
    pub fn encode(&self, scene: &Scene, options: RasterOptions) -> Result<String> {
        let png = self
            .paint(scene, options)?
            .encode_png()
            .map_err(|e| Error::Image(format!("PNG encoding failed: {}", e)))?;
        Ok(format!(
            "{}{}",
            ExportArtifact::PNG_DATA_PREFIX,
            base64::engine::general_purpose::STANDARD.encode(&png)
        ))
    }
}

impl Rasterizer for NativeRasterizer {
    fn to_png<'a>(&'a self, scene: &'a Scene, options: RasterOptions) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move { self.encode(scene, options) })
    }
}

fn skia_color(c: Color) -> tiny_skia::Color {
    tiny_skia::Color::from_rgba8(c.r, c.g, c.b, c.a)
}

fn solid(c: Color) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(c.r, c.g, c.b, c.a);
    paint.anti_alias = true;
    paint
}

fn css_rect(x: i32, y: i32, width: u32, height: u32) -> Option<Rect> {
    Rect::from_xywh(x as f32, y as f32, width as f32, height as f32)
}

/// Premultiply an RGBA buffer into a pixmap.
fn to_pixmap(image: RgbaImage) -> Option<Pixmap> {
    let size = IntSize::from_wh(image.width(), image.height())?;
    let mut data = image.into_raw();
    for px in data.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a < 255 {
            for c in &mut px[..3] {
                *c = ((*c as u16 * a + 127) / 255) as u8;
            }
        }
    }
    Pixmap::from_vec(data, size)
}

/// Scale and centre-crop `src` so it covers `w` x `h`.
fn cover(src: &RgbaImage, w: u32, h: u32) -> RgbaImage {
    let sw = src.width() as f32;
    let sh = src.height() as f32;
    let target_aspect = w as f32 / h as f32;
    let (cw, ch) = if sw / sh > target_aspect {
        ((sh * target_aspect).round().max(1.0) as u32, src.height())
    } else {
        (src.width(), (sw / target_aspect).round().max(1.0) as u32)
    };
    let cx = (src.width() - cw.min(src.width())) / 2;
    let cy = (src.height() - ch.min(src.height())) / 2;
    let cropped = imageops::crop_imm(src, cx, cy, cw, ch).to_image();
    imageops::resize(&cropped, w, h, FilterType::Triangle)
}
