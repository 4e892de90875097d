//! Card structure inside a render surface.
//!
//! Post text is inserted as text nodes, never as markup, so content from the
//! host page cannot inject elements into the card.

use crate::dom::{Document, NodeId};
use crate::extract::ExtractedPost;
use crate::render::RenderSurface;
use crate::{Error, Result, ShareConfig};

pub const LOGO_PATH: &str = "M18.244 2.25h3.308l-7.227 8.26 8.502 11.24H16.17l-5.214-6.817L4.99 21.75H1.68l7.73-8.835L1.254 2.25H8.08l4.713 6.231zm-1.161 17.52h1.833L7.084 4.126H5.117z";

/// Nodes the renderer needs after building
#[derive(Debug, Clone, Copy)]
pub struct CardNodes {
    /// Outermost node; the one that gets rasterized
    pub container: NodeId,
    pub card: NodeId,
    pub avatar: NodeId,
}

fn child(doc: &mut Document, parent: NodeId, tag: &str, class: &str) -> Result<NodeId> {
    let id = doc.create_element(tag);
    if !class.is_empty() {
        doc.set_attr(id, "class", class)?;
    }
    doc.append_child(parent, id)?;
    Ok(id)
}

fn text_child(doc: &mut Document, parent: NodeId, tag: &str, class: &str, text: &str) -> Result<NodeId> {
    let id = child(doc, parent, tag, class)?;
    if !text.is_empty() {
        doc.set_text(id, text)?;
    }
    Ok(id)
}

/// Populate the surface body with the card for `post`
pub fn build_card(surface: &mut RenderSurface, post: &ExtractedPost, config: &ShareConfig) -> Result<CardNodes> {
    let doc = surface.document_mut();
    let body = doc
        .body()
        .ok_or_else(|| Error::RenderError("render surface has no body".into()))?;

    let container = child(doc, body, "div", "x-share-container")?;
    let card = child(doc, container, "div", "x-share-card")?;

    let header = child(doc, card, "div", "x-share-header")?;
    let user = child(doc, header, "div", "x-share-user")?;
    let avatar = child(doc, user, "img", "x-share-avatar")?;
    doc.set_attr(avatar, "src", &post.avatar_url)?;
    doc.set_attr(avatar, "crossorigin", "anonymous")?;
    let meta = child(doc, user, "div", "x-share-meta")?;
    text_child(doc, meta, "div", "x-share-name", &post.author_name)?;
    text_child(doc, meta, "div", "x-share-handle", &post.author_handle)?;
    let platform = child(doc, header, "div", "x-share-platform")?;
    let svg = child(doc, platform, "svg", "x-logo-icon")?;
    doc.set_attr(svg, "viewBox", "0 0 24 24")?;
    doc.set_attr(svg, "width", "16")?;
    doc.set_attr(svg, "height", "16")?;
    let path = child(doc, svg, "path", "")?;
    doc.set_attr(path, "d", LOGO_PATH)?;

    let body_region = child(doc, card, "div", "x-share-body")?;
    let text = child(doc, body_region, "div", "x-share-text")?;
    for (i, line) in post.body_text.split('\n').enumerate() {
        if i > 0 {
            child(doc, text, "br", "")?;
        }
        if !line.is_empty() {
            let t = doc.create_text(line);
            doc.append_child(text, t)?;
        }
    }

    let footer = child(doc, card, "div", "x-share-footer")?;
    text_child(doc, footer, "div", "x-share-time", &post.posted_label())?;
    text_child(doc, footer, "div", "x-share-brand-tag", &config.brand_tag)?;

    Ok(CardNodes {
        container,
        card,
        avatar,
    })
}
