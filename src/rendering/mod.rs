//! Rendering: stage a roster layout, wait for its images, rasterize it.

pub mod images;
pub mod layout;
pub mod paint;
pub mod raster;
pub mod snapshot;
pub mod target;
pub mod text;

use crate::{Error, Result};
use base64::Engine as Base64Engine;
use std::io::Cursor;

/// 8-bit RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const BLACK: Color = Color::rgb(0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Parse `#rgb`, `#rrggbb` or `#rrggbbaa`.
    pub fn parse_hex(s: &str) -> Option<Self> {
        let hex = s.trim().strip_prefix('#')?;
        let nibble = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok();
        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        if !hex.is_ascii() {
            return None;
        }
        match hex.len() {
            3 => Some(Color::rgb(nibble(0)? * 17, nibble(1)? * 17, nibble(2)? * 17)),
            6 => Some(Color::rgb(byte(0)?, byte(2)?, byte(4)?)),
            8 => Some(Color {
                r: byte(0)?,
                g: byte(2)?,
                b: byte(4)?,
                a: byte(6)?,
            }),
            _ => None,
        }
    }

    pub fn is_transparent(self) -> bool {
        self.a == 0
    }
}

/// The raster image produced by one capture.
///
/// Created per export and consumed by exactly one assembler.
#[derive(Debug, Clone)]
pub struct ExportArtifact {
    /// `data:image/png;base64,...`
    pub data_url: String,
    /// Pixel width of the encoded image
    pub width: u32,
    /// Pixel height of the encoded image
    pub height: u32,
}

impl ExportArtifact {
    pub const PNG_DATA_PREFIX: &'static str = "data:image/png;base64,";

    /// Validate a rasterizer result and measure it.
    pub fn from_data_url(data_url: String) -> Result<Self> {
        let payload = data_url
            .strip_prefix(Self::PNG_DATA_PREFIX)
            .ok_or_else(|| {
                let head: String = data_url.chars().take(32).collect();
                Error::RenderProducedInvalidImage(format!("unexpected prefix `{}`", head))
            })?;
        if payload.is_empty() {
            return Err(Error::RenderProducedInvalidImage("empty image payload".into()));
        }
        let bytes = decode_payload(payload)?;
        let (width, height) = png_dimensions(&bytes)?;
        Ok(Self {
            data_url,
            width,
            height,
        })
    }

    /// Decoded PNG bytes.
    pub fn png_bytes(&self) -> Result<Vec<u8>> {
        let payload = self
            .data_url
            .strip_prefix(Self::PNG_DATA_PREFIX)
            .unwrap_or(&self.data_url);
        decode_payload(payload)
    }
}

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

fn decode_payload(payload: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| Error::RenderProducedInvalidImage(format!("bad base64: {}", e)))
}

fn png_dimensions(bytes: &[u8]) -> Result<(u32, u32)> {
    if !bytes.starts_with(PNG_SIGNATURE) {
        return Err(Error::RenderProducedInvalidImage("missing PNG signature".into()));
    }
    let (width, height) = image::io::Reader::with_format(Cursor::new(bytes), image::ImageFormat::Png)
        .into_dimensions()
        .map_err(|e| Error::RenderProducedInvalidImage(e.to_string()))?;
    if width == 0 || height == 0 {
        return Err(Error::RenderProducedInvalidImage(format!(
            "degenerate image {}x{}",
            width, height
        )));
    }
    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};

    fn png_data_url(w: u32, h: u32) -> String {
        let img: ImageBuffer<Rgba<u8>, Vec<u8>> = ImageBuffer::from_pixel(w, h, Rgba([10, 20, 30, 255]));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        format!(
            "{}{}",
            ExportArtifact::PNG_DATA_PREFIX,
            base64::engine::general_purpose::STANDARD.encode(&buf)
        )
    }

    #[test]
    fn artifact_measures_png() {
        let a = ExportArtifact::from_data_url(png_data_url(7, 3)).unwrap();
        assert_eq!((a.width, a.height), (7, 3));
        assert!(a.png_bytes().unwrap().starts_with(PNG_SIGNATURE));
    }

    #[test]
    fn artifact_rejects_malformed_output() {
        for bad in [
            "".to_string(),
            "data:,".to_string(),
            "data:image/png;base64,".to_string(),
            "data:image/jpeg;base64,AAAA".to_string(),
            "data:image/png;base64,!!!".to_string(),
            "data:image/png;base64,AAAAAAAA".to_string(),
        ] {
            match ExportArtifact::from_data_url(bad.clone()) {
                Err(Error::RenderProducedInvalidImage(_)) => {}
                other => panic!("{:?} accepted: {:?}", bad, other),
            }
        }
    }

    #[test]
    fn parses_hex_colors() {
        assert_eq!(Color::parse_hex("#fff"), Some(Color::WHITE));
        assert_eq!(Color::parse_hex("#0a1b2c"), Some(Color::rgb(10, 27, 44)));
        assert_eq!(Color::parse_hex("#00000000").map(Color::is_transparent), Some(true));
        assert_eq!(Color::parse_hex("red"), None);
    }
}
