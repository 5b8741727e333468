//! The staged container that gets turned into an image.

use crate::record::ExportableRecord;
use crate::rendering::images::{ImageLoader, ImageSet};
use crate::rendering::layout::{layout_document, Layout, LayoutOptions};
use crate::rendering::text::Typeface;
use crate::rendering::Color;
use crate::{Error, ExportConfig, Result};
use log::debug;
use scraper::{Html, Selector};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Display {
    Block,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Static,
    Fixed,
}

/// Inline style of the target's root element.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetStyle {
    pub display: Display,
    pub visibility: Visibility,
    pub position: Position,
    pub left: f32,
    pub top: f32,
    pub opacity: f32,
    pub z_index: i32,
    pub background_color: Option<Color>,
}

impl TargetStyle {
    pub fn on_screen() -> Self {
        Self {
            display: Display::Block,
            visibility: Visibility::Visible,
            position: Position::Static,
            left: 0.0,
            top: 0.0,
            opacity: 1.0,
            z_index: 0,
            background_color: None,
        }
    }

    /// Export-only staging: laid out at full size but never seen.
    pub fn off_screen() -> Self {
        Self {
            display: Display::Block,
            visibility: Visibility::Hidden,
            position: Position::Fixed,
            left: -10000.0,
            top: 0.0,
            opacity: 0.0,
            z_index: -1,
            background_color: None,
        }
    }

    /// Whether a rasterizer reading this element gets real pixels.
    pub fn is_painted(&self) -> bool {
        self.display == Display::Block && self.visibility == Visibility::Visible && self.opacity > 0.0
    }

    fn needs_capture_patch(&self) -> bool {
        !self.is_painted() || self.left < 0.0 || self.top < 0.0
    }

    fn apply_capture_patch(&mut self) {
        self.visibility = Visibility::Visible;
        self.position = Position::Fixed;
        self.left = 0.0;
        self.top = 0.0;
        self.opacity = 1.0;
        self.z_index = -1;
    }

    fn restore_capture_patch(&mut self, saved: &TargetStyle) {
        self.visibility = saved.visibility;
        self.position = saved.position;
        self.left = saved.left;
        self.top = saved.top;
        self.opacity = saved.opacity;
        self.z_index = saved.z_index;
    }
}

/// How a freshly staged target is styled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagingMode {
    /// Visible in the page (e.g. a preview pane)
    OnScreen,
    /// Hidden staging area used only for export
    OffScreen,
}

/// A fixed-width roster layout ready to be captured.
///
/// Exactly one target exists per export invocation. Staging starts every
/// image load immediately on the current tokio runtime.
pub struct RenderTarget {
    records: Vec<ExportableRecord>,
    heading: Option<String>,
    markup: String,
    layout: LayoutOptions,
    origin: Option<Url>,
    style: Mutex<TargetStyle>,
    images: ImageSet,
    typeface: &'static Typeface,
}

impl RenderTarget {
    /// Fails with `Error::Config` when called outside a tokio runtime.
    pub fn stage(
        records: Vec<ExportableRecord>,
        heading: Option<&str>,
        mode: StagingMode,
        config: &ExportConfig,
        loader: Arc<dyn ImageLoader>,
    ) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::Config(format!("staging needs a tokio runtime: {}", e)))?;
        let typeface = Typeface::embedded()?;
        let origin = config.page_origin.clone();
        let sources: Vec<Option<String>> = records
            .iter()
            .map(|r| r.image_url.as_deref().map(|u| resolve(u, origin.as_ref())))
            .collect();
        let heading = heading.map(str::trim).filter(|h| !h.is_empty()).map(String::from);
        let markup = build_markup(&records, &sources, heading.as_deref(), &config.layout);
        let images = ImageSet::start(sources.iter().flatten().map(String::as_str), loader, &runtime);

        let style = match mode {
            StagingMode::OnScreen => TargetStyle::on_screen(),
            StagingMode::OffScreen => TargetStyle::off_screen(),
        };
        debug!(
            "Staged {} records ({} images) {:?}",
            records.len(),
            images.len(),
            mode
        );

        Ok(Self {
            records,
            heading,
            markup,
            layout: config.layout,
            origin,
            style: Mutex::new(style),
            images,
            typeface,
        })
    }

    pub fn records(&self) -> &[ExportableRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn heading(&self) -> Option<&str> {
        self.heading.as_deref()
    }

    pub fn markup(&self) -> &str {
        &self.markup
    }

    pub fn origin(&self) -> Option<&Url> {
        self.origin.as_ref()
    }

    pub fn images(&self) -> &ImageSet {
        &self.images
    }

    pub fn typeface(&self) -> &'static Typeface {
        self.typeface
    }

    fn lock_style(&self) -> MutexGuard<'_, TargetStyle> {
        self.style.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn style(&self) -> TargetStyle {
        self.lock_style().clone()
    }

    pub fn set_background(&self, color: Color) {
        self.lock_style().background_color = Some(color);
    }

    /// `display: none`; the target then measures 0x0.
    pub fn hide(&self) {
        self.lock_style().display = Display::None;
    }

    /// Background used for capture: the target's own color when it has an
    /// opaque one, otherwise `fallback`.
    pub fn effective_background(&self, fallback: Color) -> Color {
        match self.lock_style().background_color {
            Some(c) if !c.is_transparent() => c,
            _ => fallback,
        }
    }

    /// Current layout. A `display: none` target lays out to nothing.
    pub fn layout(&self) -> Layout {
        if self.style().display == Display::None {
            return Layout { width: 0, height: 0, nodes: Vec::new() };
        }
        let document = Html::parse_fragment(&self.markup);
        layout_document(&document, &self.layout, self.typeface)
    }

    /// Equivalent of `offsetWidth` x `offsetHeight`.
    pub fn measured_size(&self) -> (u32, u32) {
        let layout = self.layout();
        (layout.width, layout.height)
    }

    /// `src` of every `<img>` element inside the target.
    pub fn image_sources(&self) -> Vec<String> {
        let document = Html::parse_fragment(&self.markup);
        let img = Selector::parse("img").expect("selector literal");
        document
            .select(&img)
            .filter_map(|el| el.value().attr("src"))
            .map(String::from)
            .collect()
    }

    /// Resolve once every contained image has loaded or errored.
    pub async fn wait_for_images(&self) {
        let sources = self.image_sources();
        self.images
            .wait_settled(sources.iter().map(String::as_str))
            .await;
    }

    /// Make the target readable by a rasterizer until the guard drops.
    ///
    /// Targets that already paint in place are left untouched.
    pub fn prepare_for_capture(&self) -> StyleGuard<'_> {
        let mut style = self.lock_style();
        if !style.needs_capture_patch() {
            return StyleGuard { target: self, saved: None };
        }
        let saved = style.clone();
        style.apply_capture_patch();
        debug!("Patched target style for capture");
        StyleGuard { target: self, saved: Some(saved) }
    }
}

/// Restores the properties patched by [`RenderTarget::prepare_for_capture`].
pub struct StyleGuard<'a> {
    target: &'a RenderTarget,
    saved: Option<TargetStyle>,
}

impl StyleGuard<'_> {
    pub fn is_patched(&self) -> bool {
        self.saved.is_some()
    }
}

impl Drop for StyleGuard<'_> {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            self.target.lock_style().restore_capture_patch(&saved);
            debug!("Restored target style");
        }
    }
}

fn resolve(src: &str, origin: Option<&Url>) -> String {
    if Url::parse(src).is_ok() {
        return src.to_string();
    }
    origin
        .and_then(|base| base.join(src).ok())
        .map(|u| u.to_string())
        .unwrap_or_else(|| src.to_string())
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn build_markup(
    records: &[ExportableRecord],
    sources: &[Option<String>],
    heading: Option<&str>,
    layout: &LayoutOptions,
) -> String {
    let mut html = format!(
        r#"<section class="export-root" style="width:{}px">"#,
        layout.width
    );
    if let Some(h) = heading {
        html.push_str(&format!(r#"<h1 class="export-heading">{}</h1>"#, escape(h)));
    }
    html.push_str(r#"<div class="export-grid">"#);
    for (record, src) in records.iter().zip(sources) {
        html.push_str(&format!(
            r#"<article class="export-card" data-id="{}">"#,
            escape(&record.id)
        ));
        match src {
            Some(src) => html.push_str(&format!(
                r#"<img class="export-photo" src="{}" alt="{}" crossorigin="anonymous">"#,
                escape(src),
                escape(&record.display_name)
            )),
            None => html.push_str(&format!(
                r#"<div class="export-placeholder" aria-hidden="true">{}</div>"#,
                escape(&record.initials())
            )),
        }
        html.push_str(&format!(
            r#"<h2 class="export-name">{}</h2>"#,
            escape(&record.display_name)
        ));
        for sub in record.subtitles() {
            html.push_str(&format!(r#"<p class="export-subtitle">{}</p>"#, escape(sub)));
        }
        html.push_str("</article>");
    }
    html.push_str("</div></section>");
    html
}
