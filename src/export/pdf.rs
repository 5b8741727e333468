//! PDF-author capability: one landscape page filled by the artifact.

use crate::rendering::ExportArtifact;
use crate::{Error, Result};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::io::Write;

/// Page dimensions in PostScript points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    pub const A4_LANDSCAPE: PageSize = PageSize {
        width: 841.89,
        height: 595.28,
    };
}

pub trait PdfAuthor: Send + Sync {
    /// Dimensions of a landscape page as the library reports them.
    fn landscape_page(&self) -> PageSize;

    /// Serialize a single-page document whose page is covered edge to edge
    /// by `artifact`. Aspect ratio is not preserved.
    fn render_full_page(&self, artifact: &ExportArtifact, page: PageSize) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfAuthor;

impl LopdfAuthor {
    pub fn new() -> Self {
        LopdfAuthor
    }
}

fn deflate(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(bytes)
        .and_then(|_| encoder.finish())
        .map_err(|e| Error::Assembly(format!("pdf: compression failed: {}", e)))
}

impl PdfAuthor for LopdfAuthor {
    fn landscape_page(&self) -> PageSize {
        PageSize::A4_LANDSCAPE
    }

    fn render_full_page(&self, artifact: &ExportArtifact, page: PageSize) -> Result<Vec<u8>> {
        let png = artifact.png_bytes()?;
        let decoded = image::load_from_memory_with_format(&png, image::ImageFormat::Png)?;
        // PDF images carry no alpha here; PNG exports are opaque anyway.
        let rgb = decoded.to_rgb8();
        let (px_w, px_h) = rgb.dimensions();

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let image_stream = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => px_w as i64,
                "Height" => px_h as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "FlateDecode",
            },
            deflate(rgb.as_raw())?,
        );
        let image_id = doc.add_object(image_stream);

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        Object::Real(page.width),
                        0.into(),
                        0.into(),
                        Object::Real(page.height),
                        0.into(),
                        0.into(),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(b"Im1".to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let content_stream = Stream::new(
            dictionary! { "Filter" => "FlateDecode" },
            deflate(&content.encode()?)?,
        );
        let content_id = doc.add_object(content_stream);

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), Object::Real(page.width), Object::Real(page.height)],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im1" => image_id },
            },
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);

        let mut out = Vec::new();
        doc.save_to(&mut out)
            .map_err(|e| Error::Assembly(format!("pdf: {}", e)))?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as Base64Engine;
    use image::{Rgba, RgbaImage};
    use std::io::Cursor;

    fn artifact(w: u32, h: u32) -> ExportArtifact {
        let img = RgbaImage::from_pixel(w, h, Rgba([20, 40, 60, 255]));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        ExportArtifact::from_data_url(format!(
            "{}{}",
            ExportArtifact::PNG_DATA_PREFIX,
            base64::engine::general_purpose::STANDARD.encode(&buf)
        ))
        .unwrap()
    }

    #[test]
    fn reports_landscape_a4() {
        let page = LopdfAuthor::new().landscape_page();
        assert!(page.width > page.height);
        assert_eq!(page, PageSize::A4_LANDSCAPE);
    }

    #[test]
    fn writes_one_page_with_stretched_image() {
        let author = LopdfAuthor::new();
        let bytes = author
            .render_full_page(&artifact(30, 10), author.landscape_page())
            .unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));

        let doc = Document::load_mem(&bytes).unwrap();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 1);
        let page_id = *pages.values().next().unwrap();

        let content = Content::decode(&doc.get_page_content(page_id).unwrap()).unwrap();
        let cm = content.operations.iter().find(|op| op.operator == "cm").unwrap();
        assert!((cm.operands[0].as_float().unwrap() - 841.89).abs() < 0.01);
        assert!((cm.operands[3].as_float().unwrap() - 595.28).abs() < 0.01);
        assert!(content.operations.iter().any(|op| op.operator == "Do"));

        let images: Vec<_> = doc
            .objects
            .values()
            .filter_map(|obj| obj.as_stream().ok())
            .filter(|s| matches!(s.dict.get(b"Subtype").and_then(Object::as_name), Ok(b"Image")))
            .collect();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].dict.get(b"Width").and_then(Object::as_i64).unwrap(), 30);
        assert_eq!(images[0].dict.get(b"Height").and_then(Object::as_i64).unwrap(), 10);
    }

    #[test]
    fn garbage_artifact_fails_assembly() {
        let bad = ExportArtifact {
            data_url: format!("{}AAAA", ExportArtifact::PNG_DATA_PREFIX),
            width: 1,
            height: 1,
        };
        assert!(LopdfAuthor::new()
            .render_full_page(&bad, PageSize::A4_LANDSCAPE)
            .is_err());
    }
}
