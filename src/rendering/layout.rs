//! Fixed-width card-grid layout for staged roster markup

use crate::rendering::text::Typeface;
use scraper::{ElementRef, Html, Selector};

#[derive(Debug, Clone, PartialEq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutBox {
    pub rect: Rect,
    /// Inset of the content from every edge
    pub padding: u32,
}

impl LayoutBox {
    fn plain(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            rect: Rect { x, y, width, height },
            padding: 0,
        }
    }
}

/// Geometry of the staged roster, in CSS px.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutOptions {
    /// Fixed container width
    pub width: u32,
    pub columns: u32,
    pub gap: u32,
    pub padding: u32,
    pub card_height: u32,
    pub photo_size: u32,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            width: 1120,
            columns: 4,
            gap: 16,
            padding: 24,
            card_height: 216,
            photo_size: 96,
        }
    }
}

impl LayoutOptions {
    pub fn card_width(&self) -> u32 {
        let cols = self.columns.max(1);
        let inner = self
            .width
            .saturating_sub(self.padding * 2)
            .saturating_sub(self.gap * (cols - 1));
        inner / cols
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementType {
    Heading,
    Card,
    Photo,
    Placeholder,
    Name,
    Subtitle,
}

#[derive(Debug, Clone)]
pub struct LayoutNode {
    pub lb: LayoutBox,
    pub text: String,
    pub elem_type: ElementType,
    /// Font size in px for text nodes
    pub size: f32,
    /// Image source for `Photo` nodes
    pub src: Option<String>,
}

impl LayoutNode {
    fn new(lb: LayoutBox, elem_type: ElementType) -> Self {
        Self { lb, text: String::new(), elem_type, size: 0.0, src: None }
    }

    fn text(lb: LayoutBox, elem_type: ElementType, text: String, size: f32) -> Self {
        Self { lb, text, elem_type, size, src: None }
    }
}

#[derive(Debug, Clone)]
pub struct Layout {
    pub width: u32,
    pub height: u32,
    pub nodes: Vec<LayoutNode>,
}

pub const HEADING_SIZE: f32 = 28.0;
pub const NAME_SIZE: f32 = 16.0;
pub const SUBTITLE_SIZE: f32 = 12.0;
pub const INITIALS_SIZE: f32 = 32.0;
const NAME_MAX_LINES: usize = 2;
const SUBTITLE_MAX_LINES: usize = 3;
const CARD_INSET: u32 = 8;
const PHOTO_TOP: u32 = 16;

fn selector(s: &'static str) -> Selector {
    Selector::parse(s).expect("selector literal")
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Greedy word wrap by measured width. Overflow past `max_lines` is
/// folded into the last line, and any line still too wide is ellipsized.
fn wrap(face: &Typeface, text: &str, size: f32, max_width: f32, max_lines: usize) -> Vec<String> {
    let max_lines = max_lines.max(1);
    let mut lines = Vec::new();
    let mut cur = String::new();
    for word in text.split_whitespace() {
        if !cur.is_empty() && face.measure(&format!("{} {}", cur, word), size) > max_width {
            lines.push(std::mem::take(&mut cur));
        }
        if !cur.is_empty() {
            cur.push(' ');
        }
        cur.push_str(word);
    }
    if !cur.is_empty() {
        lines.push(cur);
    }
    if lines.len() > max_lines {
        let rest = lines[max_lines - 1..].join(" ");
        lines.truncate(max_lines - 1);
        lines.push(rest);
    }
    lines
        .into_iter()
        .map(|l| face.fit(&l, size, max_width))
        .collect()
}

fn line_height(face: &Typeface, size: f32) -> u32 {
    face.line_height(size).ceil() as u32
}

fn centered(container_x: i32, container_w: u32, width: u32) -> i32 {
    container_x + (container_w.saturating_sub(width) / 2) as i32
}

/// Lay out the roster markup produced by `RenderTarget::stage`.
/// - An optional heading spans the full width
/// - Cards flow left to right in `columns` columns, fixed height
/// - A root with no cards collapses to zero height
pub fn layout_document(document: &Html, options: &LayoutOptions, face: &Typeface) -> Layout {
    let heading_sel = selector(".export-heading");
    let card_sel = selector("article.export-card");
    let photo_sel = selector("img.export-photo");
    let placeholder_sel = selector(".export-placeholder");
    let name_sel = selector(".export-name");
    let subtitle_sel = selector(".export-subtitle");

    let width = options.width;
    let padding = options.padding;
    let mut nodes = Vec::new();
    let mut y = padding;

    if let Some(h) = document.select(&heading_sel).next() {
        let text = text_of(h);
        if !text.is_empty() {
            let inset = 8u32;
            let box_h = line_height(face, HEADING_SIZE) + inset * 2;
            let avail = width.saturating_sub(padding * 2);
            let text = face.fit(&text, HEADING_SIZE, avail.saturating_sub(inset * 2) as f32);
            let lb = LayoutBox {
                rect: Rect {
                    x: padding as i32,
                    y: y as i32,
                    width: avail,
                    height: box_h,
                },
                padding: inset,
            };
            nodes.push(LayoutNode::text(lb, ElementType::Heading, text, HEADING_SIZE));
            y += box_h + options.gap;
        }
    }

    let cards: Vec<ElementRef<'_>> = document.select(&card_sel).collect();
    if cards.is_empty() {
        return Layout { width, height: 0, nodes: Vec::new() };
    }

    let cols = options.columns.max(1);
    let card_w = options.card_width();
    let card_h = options.card_height;
    let text_w = card_w.saturating_sub(CARD_INSET * 2) as f32;

    for (i, card) in cards.iter().enumerate() {
        let col = i as u32 % cols;
        let row = i as u32 / cols;
        let cx = (padding + col * (card_w + options.gap)) as i32;
        let cy = (y + row * (card_h + options.gap)) as i32;
        nodes.push(LayoutNode::new(LayoutBox::plain(cx, cy, card_w, card_h), ElementType::Card));

        let photo = options.photo_size.min(card_w);
        let photo_box = LayoutBox::plain(
            cx + ((card_w - photo) / 2) as i32,
            cy + PHOTO_TOP as i32,
            photo,
            photo,
        );
        if let Some(src) = card.select(&photo_sel).next().and_then(|img| img.value().attr("src")) {
            let mut node = LayoutNode::new(photo_box, ElementType::Photo);
            node.src = Some(src.to_string());
            nodes.push(node);
        } else {
            let initials = card
                .select(&placeholder_sel)
                .next()
                .map(text_of)
                .unwrap_or_default();
            nodes.push(LayoutNode::text(photo_box, ElementType::Placeholder, initials, INITIALS_SIZE));
        }

        let mut ty = cy + (PHOTO_TOP + photo + 12) as i32;
        let name = card.select(&name_sel).next().map(text_of).unwrap_or_default();
        let name_h = line_height(face, NAME_SIZE);
        for line in wrap(face, &name, NAME_SIZE, text_w, NAME_MAX_LINES) {
            let w = face.measure(&line, NAME_SIZE).ceil() as u32;
            let x = centered(cx, card_w, w);
            nodes.push(LayoutNode::text(LayoutBox::plain(x, ty, w, name_h), ElementType::Name, line, NAME_SIZE));
            ty += name_h as i32;
        }
        ty += 4;

        let sub_h = line_height(face, SUBTITLE_SIZE) + 2;
        for sub in card.select(&subtitle_sel).map(text_of).filter(|s| !s.is_empty()).take(SUBTITLE_MAX_LINES) {
            let line = face.fit(&sub, SUBTITLE_SIZE, text_w);
            let w = face.measure(&line, SUBTITLE_SIZE).ceil() as u32;
            let x = centered(cx, card_w, w);
            nodes.push(LayoutNode::text(LayoutBox::plain(x, ty, w, sub_h), ElementType::Subtitle, line, SUBTITLE_SIZE));
            ty += sub_h as i32;
        }
    }

    let rows = (cards.len() as u32).div_ceil(cols);
    let height = y + rows * card_h + (rows - 1) * options.gap + padding;
    Layout { width, height, nodes }
}
