//! Slide-author capability: a presentation with one full-bleed picture slide.
//!
//! The package is the smallest part set PowerPoint and LibreOffice open
//! without repair: one master, one blank layout, one theme, one slide.

use crate::rendering::ExportArtifact;
use crate::{Error, Result};
use std::io::{Cursor, Seek, Write};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Slide dimensions in EMU (914400 per inch).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlideLayout {
    pub width_emu: u64,
    pub height_emu: u64,
}

impl SlideLayout {
    /// 13.33 x 7.5 in
    pub const WIDESCREEN: SlideLayout = SlideLayout {
        width_emu: 12_192_000,
        height_emu: 6_858_000,
    };
}

pub trait SlideAuthor: Send + Sync {
    /// Layout the deck reports, if any.
    fn layout(&self) -> Option<SlideLayout>;

    /// Serialize a deck with exactly one slide covered by `artifact`.
    fn single_slide(&self, artifact: &ExportArtifact, layout: SlideLayout) -> Result<Vec<u8>>;
}

/// Writes `.pptx` packages with the zip crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct PptxAuthor {
    layout: Option<SlideLayout>,
}

impl PptxAuthor {
    pub fn new() -> Self {
        Self { layout: None }
    }

    pub fn with_layout(layout: SlideLayout) -> Self {
        Self { layout: Some(layout) }
    }
}

impl SlideAuthor for PptxAuthor {
    fn layout(&self) -> Option<SlideLayout> {
        self.layout
    }

    fn single_slide(&self, artifact: &ExportArtifact, layout: SlideLayout) -> Result<Vec<u8>> {
        let png = artifact.png_bytes()?;
        let mut package = Package::new(Cursor::new(Vec::new()));
        package.text("[Content_Types].xml", CONTENT_TYPES)?;
        package.text("_rels/.rels", ROOT_RELS)?;
        package.text("ppt/presentation.xml", &presentation_xml(layout))?;
        package.text("ppt/_rels/presentation.xml.rels", PRESENTATION_RELS)?;
        package.text("ppt/slideMasters/slideMaster1.xml", SLIDE_MASTER)?;
        package.text("ppt/slideMasters/_rels/slideMaster1.xml.rels", SLIDE_MASTER_RELS)?;
        package.text("ppt/slideLayouts/slideLayout1.xml", SLIDE_LAYOUT)?;
        package.text("ppt/slideLayouts/_rels/slideLayout1.xml.rels", SLIDE_LAYOUT_RELS)?;
        package.text("ppt/theme/theme1.xml", THEME)?;
        package.text("ppt/slides/slide1.xml", &slide_xml(layout))?;
        package.text("ppt/slides/_rels/slide1.xml.rels", SLIDE_RELS)?;
        package.binary("ppt/media/image1.png", &png)?;
        Ok(package.finish()?.into_inner())
    }
}

struct Package<W: Write + Seek> {
    zip: ZipWriter<W>,
}

impl<W: Write + Seek> Package<W> {
    fn new(writer: W) -> Self {
        Self {
            zip: ZipWriter::new(writer),
        }
    }

    fn text(&mut self, path: &str, content: &str) -> Result<()> {
        let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        self.zip.start_file(path, options)?;
        self.zip.write_all(content.as_bytes()).map_err(write_failed)
    }

    /// PNG data is already compressed
    fn binary(&mut self, path: &str, data: &[u8]) -> Result<()> {
        let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        self.zip.start_file(path, options)?;
        self.zip.write_all(data).map_err(write_failed)
    }

    fn finish(self) -> Result<W> {
        Ok(self.zip.finish()?)
    }
}

fn write_failed(err: std::io::Error) -> Error {
    Error::Assembly(format!("pptx: {}", err))
}

const NS_P: &str = "http://schemas.openxmlformats.org/presentationml/2006/main";
const NS_A: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const NS_R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

fn presentation_xml(layout: SlideLayout) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:presentation xmlns:a="{a}" xmlns:r="{r}" xmlns:p="{p}" saveSubsetFonts="1"><p:sldMasterIdLst><p:sldMasterId id="2147483648" r:id="rId1"/></p:sldMasterIdLst><p:sldIdLst><p:sldId id="256" r:id="rId2"/></p:sldIdLst><p:sldSz cx="{cx}" cy="{cy}"/><p:notesSz cx="6858000" cy="9144000"/></p:presentation>"#,
        a = NS_A,
        r = NS_R,
        p = NS_P,
        cx = layout.width_emu,
        cy = layout.height_emu,
    )
}

fn slide_xml(layout: SlideLayout) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:sld xmlns:a="{a}" xmlns:r="{r}" xmlns:p="{p}"><p:cSld><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="0" cy="0"/><a:chOff x="0" y="0"/><a:chExt cx="0" cy="0"/></a:xfrm></p:grpSpPr><p:pic><p:nvPicPr><p:cNvPr id="2" name="Export"/><p:cNvPicPr><a:picLocks noChangeAspect="1"/></p:cNvPicPr><p:nvPr/></p:nvPicPr><p:blipFill><a:blip r:embed="rId2"/><a:stretch><a:fillRect/></a:stretch></p:blipFill><p:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom></p:spPr></p:pic></p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sld>"#,
        a = NS_A,
        r = NS_R,
        p = NS_P,
        cx = layout.width_emu,
        cy = layout.height_emu,
    )
}

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Default Extension="png" ContentType="image/png"/><Override PartName="/ppt/presentation.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml"/><Override PartName="/ppt/slideMasters/slideMaster1.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slideMaster+xml"/><Override PartName="/ppt/slideLayouts/slideLayout1.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slideLayout+xml"/><Override PartName="/ppt/slides/slide1.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slide+xml"/><Override PartName="/ppt/theme/theme1.xml" ContentType="application/vnd.openxmlformats-officedocument.theme+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="ppt/presentation.xml"/></Relationships>"#;

const PRESENTATION_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideMaster" Target="slideMasters/slideMaster1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide" Target="slides/slide1.xml"/><Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/theme" Target="theme/theme1.xml"/></Relationships>"#;

const SLIDE_MASTER: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:sldMaster xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"><p:cSld><p:bg><p:bgRef idx="1001"><a:schemeClr val="bg1"/></p:bgRef></p:bg><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/></p:spTree></p:cSld><p:clrMap bg1="lt1" tx1="dk1" bg2="lt2" tx2="dk2" accent1="accent1" accent2="accent2" accent3="accent3" accent4="accent4" accent5="accent5" accent6="accent6" hlink="hlink" folHlink="folHlink"/><p:sldLayoutIdLst><p:sldLayoutId id="2147483649" r:id="rId1"/></p:sldLayoutIdLst></p:sldMaster>"#;

const SLIDE_MASTER_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideLayout" Target="../slideLayouts/slideLayout1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/theme" Target="../theme/theme1.xml"/></Relationships>"#;

const SLIDE_LAYOUT: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:sldLayout xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main" type="blank" preserve="1"><p:cSld name="Blank"><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/></p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sldLayout>"#;

const SLIDE_LAYOUT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideMaster" Target="../slideMasters/slideMaster1.xml"/></Relationships>"#;

const SLIDE_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideLayout" Target="../slideLayouts/slideLayout1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="../media/image1.png"/></Relationships>"#;

const THEME: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<a:theme xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" name="Export"><a:themeElements><a:clrScheme name="Export"><a:dk1><a:sysClr val="windowText" lastClr="000000"/></a:dk1><a:lt1><a:sysClr val="window" lastClr="FFFFFF"/></a:lt1><a:dk2><a:srgbClr val="1F2937"/></a:dk2><a:lt2><a:srgbClr val="F4F6FB"/></a:lt2><a:accent1><a:srgbClr val="4472C4"/></a:accent1><a:accent2><a:srgbClr val="ED7D31"/></a:accent2><a:accent3><a:srgbClr val="A5A5A5"/></a:accent3><a:accent4><a:srgbClr val="FFC000"/></a:accent4><a:accent5><a:srgbClr val="5B9BD5"/></a:accent5><a:accent6><a:srgbClr val="70AD47"/></a:accent6><a:hlink><a:srgbClr val="0563C1"/></a:hlink><a:folHlink><a:srgbClr val="954F72"/></a:folHlink></a:clrScheme><a:fontScheme name="Export"><a:majorFont><a:latin typeface="Calibri Light"/><a:ea typeface=""/><a:cs typeface=""/></a:majorFont><a:minorFont><a:latin typeface="Calibri"/><a:ea typeface=""/><a:cs typeface=""/></a:minorFont></a:fontScheme><a:fmtScheme name="Export"><a:fillStyleLst><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:fillStyleLst><a:lnStyleLst><a:ln w="6350"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln><a:ln w="12700"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln><a:ln w="19050"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln></a:lnStyleLst><a:effectStyleLst><a:effectStyle><a:effectLst/></a:effectStyle><a:effectStyle><a:effectLst/></a:effectStyle><a:effectStyle><a:effectLst/></a:effectStyle></a:effectStyleLst><a:bgFillStyleLst><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:bgFillStyleLst></a:fmtScheme></a:themeElements></a:theme>"#;

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as Base64Engine;
    use image::{Rgba, RgbaImage};
    use std::io::Read;

    fn artifact() -> ExportArtifact {
        let img = RgbaImage::from_pixel(16, 9, Rgba([1, 2, 3, 255]));
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

    fn read(archive: &mut zip::ZipArchive<Cursor<Vec<u8>>>, name: &str) -> String {
        let mut out = String::new();
        archive.by_name(name).unwrap().read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn deck_has_exactly_one_full_bleed_slide() {
        let author = PptxAuthor::new();
        assert_eq!(author.layout(), None);
        let bytes = author.single_slide(&artifact(), SlideLayout::WIDESCREEN).unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();

        let slides: Vec<String> = archive
            .file_names()
            .filter(|n| n.starts_with("ppt/slides/slide"))
            .map(String::from)
            .collect();
        assert_eq!(slides, vec!["ppt/slides/slide1.xml".to_string()]);

        let slide = read(&mut archive, "ppt/slides/slide1.xml");
        assert!(slide.contains(r#"<a:off x="0" y="0"/><a:ext cx="12192000" cy="6858000"/>"#));
        let presentation = read(&mut archive, "ppt/presentation.xml");
        assert!(presentation.contains(r#"<p:sldSz cx="12192000" cy="6858000"/>"#));

        let mut png = Vec::new();
        archive
            .by_name("ppt/media/image1.png")
            .unwrap()
            .read_to_end(&mut png)
            .unwrap();
        assert_eq!(png, artifact().png_bytes().unwrap());
    }

    #[test]
    fn reported_layout_is_used_for_slide_size() {
        let custom = SlideLayout {
            width_emu: 9_144_000,
            height_emu: 6_858_000,
        };
        let author = PptxAuthor::with_layout(custom);
        let bytes = author.single_slide(&artifact(), author.layout().unwrap()).unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert!(read(&mut archive, "ppt/slides/slide1.xml").contains(r#"cx="9144000""#));
    }
}
