//! Block layout for the share card.
//!
//! Text metrics are fixed: 8px per narrow glyph, 16px per wide (CJK, emoji)
//! glyph. Measurement stays deterministic without a font stack.

use crate::dom::{Document, NodeId, Selector};
use crate::{Error, Result};

pub const GLYPH_WIDTH: u32 = 8;
pub const OUTER_PADDING: u32 = 20;
pub const CARD_PADDING: u32 = 24;
pub const AVATAR_SIZE: u32 = 48;
pub const LOGO_SIZE: u32 = 16;
pub const SECTION_GAP: u32 = 16;
pub const BODY_LINE_HEIGHT: u32 = 24;
pub const FOOTER_LINE_HEIGHT: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxRole {
    Card,
    Avatar,
    Name,
    Handle,
    Logo,
    BodyLine,
    Time,
    BrandTag,
}

/// A laid-out box with the text it renders, if any
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutNode {
    pub rect: Rect,
    pub role: BoxRole,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CardLayout {
    pub width: u32,
    /// Realized content height; the surface is resized to exactly this
    pub height: u32,
    pub nodes: Vec<LayoutNode>,
}

impl CardLayout {
    pub fn nodes_with(&self, role: BoxRole) -> impl Iterator<Item = &LayoutNode> {
        self.nodes.iter().filter(move |n| n.role == role)
    }
}

/// Horizontal advance of a character in glyph units
pub fn glyph_units(ch: char) -> u32 {
    if (ch as u32) >= 0x1100 {
        2
    } else {
        1
    }
}

pub fn text_width(text: &str) -> u32 {
    text.chars().map(glyph_units).sum::<u32>() * GLYPH_WIDTH
}

/// Greedy word wrap to `max_units` glyph units. Words longer than a line are
/// broken by character. Empty input yields one empty line.
pub fn wrap_line(text: &str, max_units: u32) -> Vec<String> {
    let max_units = max_units.max(1);
    let mut lines = Vec::new();
    let mut cur = String::new();
    let mut cur_units = 0u32;

    for word in text.split_whitespace() {
        let word_units: u32 = word.chars().map(glyph_units).sum();
        let sep = if cur.is_empty() { 0 } else { 1 };
        if cur_units + sep + word_units <= max_units {
            if sep == 1 {
                cur.push(' ');
            }
            cur.push_str(word);
            cur_units += sep + word_units;
            continue;
        }
        if !cur.is_empty() {
            lines.push(std::mem::take(&mut cur));
            cur_units = 0;
        }
        for ch in word.chars() {
            let u = glyph_units(ch);
            if cur_units + u > max_units && !cur.is_empty() {
                lines.push(std::mem::take(&mut cur));
                cur_units = 0;
            }
            cur.push(ch);
            cur_units += u;
        }
    }
    if !cur.is_empty() || lines.is_empty() {
        lines.push(cur);
    }
    lines
}

fn text_of(doc: &Document, scope: NodeId, selector: &str) -> Result<String> {
    let sel = Selector::parse(selector)?;
    Ok(doc
        .query_selector(scope, &sel)
        .map(|n| doc.inner_text(n))
        .unwrap_or_default())
}

/// Lay out the card rooted at `container` for a surface of `width` pixels.
pub fn layout_card(doc: &Document, container: NodeId, width: u32) -> Result<CardLayout> {
    let min_width = 2 * (OUTER_PADDING + CARD_PADDING) + AVATAR_SIZE + LOGO_SIZE;
    if width < min_width {
        return Err(Error::RenderError(format!(
            "card width {} is below the minimum of {}",
            width, min_width
        )));
    }
    let name = text_of(doc, container, ".x-share-name")?;
    let handle = text_of(doc, container, ".x-share-handle")?;
    let body = text_of(doc, container, ".x-share-text")?;
    let time = text_of(doc, container, ".x-share-time")?;
    let brand = text_of(doc, container, ".x-share-brand-tag")?;

    let card_x = OUTER_PADDING as i32;
    let card_w = width - 2 * OUTER_PADDING;
    let content_x = card_x + CARD_PADDING as i32;
    let content_w = card_w - 2 * CARD_PADDING;
    let content_right = content_x + content_w as i32;

    let mut nodes = Vec::new();
    let card_top = OUTER_PADDING;
    let mut y = card_top + CARD_PADDING;

    // Header: avatar, name over handle, logo at the right edge
    nodes.push(LayoutNode {
        rect: Rect { x: content_x, y: y as i32, width: AVATAR_SIZE, height: AVATAR_SIZE },
        role: BoxRole::Avatar,
        text: String::new(),
    });
    let meta_x = content_x + (AVATAR_SIZE + 12) as i32;
    let meta_units = content_w.saturating_sub(AVATAR_SIZE + 12 + LOGO_SIZE + 8) / GLYPH_WIDTH;
    let name_line = wrap_line(&name, meta_units).swap_remove(0);
    nodes.push(LayoutNode {
        rect: Rect { x: meta_x, y: y as i32 + 4, width: text_width(&name_line), height: 20 },
        role: BoxRole::Name,
        text: name_line,
    });
    if !handle.is_empty() {
        let handle_line = wrap_line(&handle, meta_units).swap_remove(0);
        nodes.push(LayoutNode {
            rect: Rect { x: meta_x, y: y as i32 + 26, width: text_width(&handle_line), height: 18 },
            role: BoxRole::Handle,
            text: handle_line,
        });
    }
    nodes.push(LayoutNode {
        rect: Rect { x: content_right - LOGO_SIZE as i32, y: y as i32, width: LOGO_SIZE, height: LOGO_SIZE },
        role: BoxRole::Logo,
        text: String::new(),
    });
    y += AVATAR_SIZE + SECTION_GAP;

    // Body: hard line breaks are kept, long lines wrap
    let body_units = content_w / GLYPH_WIDTH;
    for paragraph in body.split('\n') {
        for line in wrap_line(paragraph, body_units) {
            nodes.push(LayoutNode {
                rect: Rect { x: content_x, y: y as i32, width: text_width(&line), height: BODY_LINE_HEIGHT },
                role: BoxRole::BodyLine,
                text: line,
            });
            y += BODY_LINE_HEIGHT;
        }
    }
    y += SECTION_GAP;

    // Footer: time left, brand tag right
    if !time.is_empty() {
        nodes.push(LayoutNode {
            rect: Rect { x: content_x, y: y as i32, width: text_width(&time), height: FOOTER_LINE_HEIGHT },
            role: BoxRole::Time,
            text: time,
        });
    }
    if !brand.is_empty() {
        let w = text_width(&brand);
        nodes.push(LayoutNode {
            rect: Rect { x: content_right - w as i32, y: y as i32, width: w, height: FOOTER_LINE_HEIGHT },
            role: BoxRole::BrandTag,
            text: brand,
        });
    }
    y += FOOTER_LINE_HEIGHT + CARD_PADDING;

    nodes.insert(
        0,
        LayoutNode {
            rect: Rect { x: card_x, y: card_top as i32, width: card_w, height: y - card_top },
            role: BoxRole::Card,
            text: String::new(),
        },
    );

    Ok(CardLayout {
        width,
        height: y + OUTER_PADDING,
        nodes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_breaks_words_and_long_tokens() {
        assert_eq!(wrap_line("aa bb cc", 5), vec!["aa bb", "cc"]);
        assert_eq!(wrap_line("abcdefgh", 3), vec!["abc", "def", "gh"]);
        assert_eq!(wrap_line("", 10), vec![""]);
        assert_eq!(wrap_line("你好世界", 4), vec!["你好", "世界"]);
    }

    fn card_doc(body: &str) -> (Document, NodeId) {
        let html = format!(
            r#"<body><div class="x-share-container"><div class="x-share-card">
               <div class="x-share-name">Alice</div><div class="x-share-handle">@alice</div>
               <div class="x-share-text">{}</div>
               <div class="x-share-time">2024/01/01 · 09:30</div><div class="x-share-brand-tag">X-Share</div>
               </div></div></body>"#,
            body
        );
        let doc = Document::parse_html(&html);
        let container = doc
            .query_selector(doc.root(), &Selector::parse(".x-share-container").unwrap())
            .unwrap();
        (doc, container)
    }

    #[test]
    fn height_grows_with_content() {
        let (short_doc, c1) = card_doc("Hello");
        let (long_doc, c2) = card_doc("Hello<br>World<br><br>again");
        let short = layout_card(&short_doc, c1, 600).unwrap();
        let long = layout_card(&long_doc, c2, 600).unwrap();
        assert_eq!(long.height - short.height, 3 * BODY_LINE_HEIGHT);
        assert_eq!(long.nodes_with(BoxRole::BodyLine).count(), 4);
        assert_eq!(short.nodes[0].role, BoxRole::Card);
    }

    #[test]
    fn rejects_tiny_width() {
        let (doc, c) = card_doc("x");
        assert!(layout_card(&doc, c, 100).is_err());
    }
}
