//! Paint commands produced from a target's layout.

use crate::rendering::images::ImageState;
use crate::rendering::layout::ElementType;
use crate::rendering::target::RenderTarget;
use crate::rendering::Color;
use image::RgbaImage;
use std::sync::Arc;
use url::Url;

pub const CARD_FILL: Color = Color::rgb(0xf4, 0xf6, 0xfb);
pub const CARD_EDGE: Color = Color::rgb(0xd5, 0xdb, 0xe8);
pub const INK: Color = Color::rgb(0x1f, 0x29, 0x37);
pub const MUTED_INK: Color = Color::rgb(0x4b, 0x55, 0x63);
pub const PLACEHOLDER_FILL: Color = Color::rgb(0xc7, 0xd2, 0xfe);
pub const BROKEN_FILL: Color = Color::rgb(0xe5, 0xe7, 0xeb);

#[derive(Debug, Clone, PartialEq)]
pub enum PaintCommand {
    SolidRect {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        rgba: Color,
    },
    Ellipse {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        rgba: Color,
    },
    Image {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        image: Arc<RgbaImage>,
    },
    /// An image that settled without pixels
    BrokenImage {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    },
    /// One line of text; (`x`, `y`) is the top-left of its line box
    Text {
        x: i32,
        y: i32,
        text: String,
        size: f32,
        rgba: Color,
    },
}

/// Everything a rasterizer needs, in CSS px.
#[derive(Debug, Clone)]
pub struct Scene {
    pub width: u32,
    pub height: u32,
    pub background: Color,
    pub commands: Vec<PaintCommand>,
}

fn is_cross_origin(src: &str, origin: Option<&Url>) -> bool {
    if src.starts_with("data:") {
        return false;
    }
    match (Url::parse(src), origin) {
        (Ok(url), Some(origin)) => url.origin() != origin.origin(),
        _ => true,
    }
}

/// Build the scene for `target` as it currently stands.
///
/// A target whose style does not paint contributes only its background,
/// which is what a snapshot of a hidden element looks like.
pub fn build_scene(target: &RenderTarget, background: Color, include_cross_origin: bool) -> Scene {
    let layout = target.layout();
    let mut scene = Scene {
        width: layout.width,
        height: layout.height,
        background,
        commands: Vec::new(),
    };
    if !target.style().is_painted() {
        return scene;
    }

    for node in layout.nodes {
        let r = &node.lb.rect;
        match node.elem_type {
            ElementType::Heading => {
                let inset = node.lb.padding as i32;
                scene.commands.push(PaintCommand::Text {
                    x: r.x + inset,
                    y: r.y + inset,
                    text: node.text,
                    size: node.size,
                    rgba: INK,
                });
            }
            ElementType::Card => {
                scene.commands.push(PaintCommand::SolidRect {
                    x: r.x,
                    y: r.y,
                    width: r.width,
                    height: r.height,
                    rgba: CARD_EDGE,
                });
                scene.commands.push(PaintCommand::SolidRect {
                    x: r.x + 1,
                    y: r.y + 1,
                    width: r.width.saturating_sub(2),
                    height: r.height.saturating_sub(2),
                    rgba: CARD_FILL,
                });
            }
            ElementType::Photo => {
                let src = node.src.as_deref().unwrap_or_default();
                if !include_cross_origin && is_cross_origin(src, target.origin()) {
                    // Without CORS the canvas is tainted; the slot stays blank.
                    continue;
                }
                let cmd = match target.images().state(src) {
                    ImageState::Loaded(image) => PaintCommand::Image {
                        x: r.x,
                        y: r.y,
                        width: r.width,
                        height: r.height,
                        image,
                    },
                    _ => PaintCommand::BrokenImage {
                        x: r.x,
                        y: r.y,
                        width: r.width,
                        height: r.height,
                    },
                };
                scene.commands.push(cmd);
            }
            ElementType::Placeholder => {
                scene.commands.push(PaintCommand::Ellipse {
                    x: r.x,
                    y: r.y,
                    width: r.width,
                    height: r.height,
                    rgba: PLACEHOLDER_FILL,
                });
                let face = target.typeface();
                let w = face.measure(&node.text, node.size).ceil() as u32;
                let h = face.line_height(node.size).ceil() as u32;
                scene.commands.push(PaintCommand::Text {
                    x: r.x + (r.width.saturating_sub(w) / 2) as i32,
                    y: r.y + (r.height.saturating_sub(h) / 2) as i32,
                    text: node.text,
                    size: node.size,
                    rgba: INK,
                });
            }
            ElementType::Name => scene.commands.push(PaintCommand::Text {
                x: r.x,
                y: r.y,
                text: node.text,
                size: node.size,
                rgba: INK,
            }),
            ElementType::Subtitle => scene.commands.push(PaintCommand::Text {
                x: r.x,
                y: r.y,
                text: node.text,
                size: node.size,
                rgba: MUTED_INK,
            }),
        }
    }
    scene
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paint_command_debug() {
        let cmd = PaintCommand::SolidRect {
            x: 0,
            y: 0,
            width: 10,
            height: 10,
            rgba: Color::rgb(255, 0, 0),
        };
        match cmd {
            PaintCommand::SolidRect { width, .. } => assert_eq!(width, 10),
            _ => panic!("unexpected"),
        }
    }

    #[test]
    fn cross_origin_detection() {
        let origin = Url::parse("https://school.test/admin").unwrap();
        assert!(!is_cross_origin("https://school.test/media/a.png", Some(&origin)));
        assert!(is_cross_origin("https://cdn.other.test/a.png", Some(&origin)));
        assert!(is_cross_origin("https://school.test/a.png", None));
        assert!(!is_cross_origin("data:image/png;base64,AAAA", None));
    }
}
