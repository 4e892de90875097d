//! Paint commands for a laid-out card

use super::layout::{BoxRole, CardLayout, Rect};

pub type Rgba = [u8; 4];

pub const CARD_BACKGROUND: Rgba = [255, 255, 255, 255];
pub const TEXT_COLOR: Rgba = [15, 20, 25, 255];
pub const MUTED_COLOR: Rgba = [83, 100, 113, 255];
pub const ACCENT_COLOR: Rgba = [29, 155, 240, 255];
pub const PLACEHOLDER_COLOR: Rgba = [207, 217, 222, 255];
pub const CARD_RADIUS: u32 = 16;

#[derive(Debug, Clone, PartialEq)]
pub enum PaintCommand {
    RoundedRect {
        rect: Rect,
        radius: u32,
        rgba: Rgba,
    },
    /// Circular avatar, or a placeholder disc when the image is unavailable
    Avatar { rect: Rect },
    Logo { rect: Rect, rgba: Rgba },
    /// One line of text drawn as glyph blocks
    Text {
        rect: Rect,
        text: String,
        rgba: Rgba,
    },
}

/// Display list in paint order
pub fn display_list(layout: &CardLayout) -> Vec<PaintCommand> {
    layout
        .nodes
        .iter()
        .filter_map(|node| {
            let cmd = match node.role {
                BoxRole::Card => PaintCommand::RoundedRect {
                    rect: node.rect,
                    radius: CARD_RADIUS,
                    rgba: CARD_BACKGROUND,
                },
                BoxRole::Avatar => PaintCommand::Avatar { rect: node.rect },
                BoxRole::Logo => PaintCommand::Logo {
                    rect: node.rect,
                    rgba: TEXT_COLOR,
                },
                BoxRole::Name | BoxRole::BodyLine => text(node.rect, &node.text, TEXT_COLOR)?,
                BoxRole::Handle | BoxRole::Time => text(node.rect, &node.text, MUTED_COLOR)?,
                BoxRole::BrandTag => text(node.rect, &node.text, ACCENT_COLOR)?,
            };
            Some(cmd)
        })
        .collect()
}

fn text(rect: Rect, text: &str, rgba: Rgba) -> Option<PaintCommand> {
    if text.trim().is_empty() {
        return None;
    }
    Some(PaintCommand::Text {
        rect,
        text: text.to_string(),
        rgba,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::layout::LayoutNode;

    #[test]
    fn blank_lines_paint_nothing() {
        let rect = Rect { x: 0, y: 0, width: 10, height: 10 };
        let layout = CardLayout {
            width: 100,
            height: 100,
            nodes: vec![
                LayoutNode { rect, role: BoxRole::Card, text: String::new() },
                LayoutNode { rect, role: BoxRole::BodyLine, text: String::new() },
                LayoutNode { rect, role: BoxRole::BrandTag, text: "X-Share".into() },
            ],
        };
        let cmds = display_list(&layout);
        assert_eq!(cmds.len(), 2);
        match &cmds[1] {
            PaintCommand::Text { rgba, .. } => assert_eq!(*rgba, ACCENT_COLOR),
            other => panic!("unexpected {:?}", other),
        }
    }
}
