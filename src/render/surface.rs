//! Off-screen render surface.
//!
//! A surface is an isolated sub-document plus one placeholder element in the
//! host page body, pushed far off-screen so it never affects page layout. The
//! placeholder is removed exactly once, by [`RenderSurface::teardown`] or on drop.

use std::sync::Arc;

use image::RgbaImage;

use crate::dom::{Document, NodeId, Page};
use crate::{Error, Result, ShareConfig};

#[derive(Debug, Clone, Default)]
pub enum AvatarState {
    #[default]
    Pending,
    Loaded(Arc<RgbaImage>),
    Failed,
}

pub struct RenderSurface {
    page: Page,
    host: NodeId,
    doc: Document,
    width: u32,
    height: u32,
    avatar: AvatarState,
    attached: bool,
}

impl RenderSurface {
    /// Create the surface and append its placeholder to the page body
    pub fn attach(page: &Page, config: &ShareConfig) -> Result<Self> {
        let body = page
            .body()
            .ok_or_else(|| Error::RenderError("page has no body".into()))?;
        let width = config.card_width;
        let host = page.update(|d| -> Result<NodeId> {
            let frame = d.create_element("iframe");
            d.set_attr(frame, "class", "x-share-surface")?;
            d.set_attr(frame, "aria-hidden", "true")?;
            d.set_attr(frame, "style", &placeholder_style(width, 0))?;
            d.append_child(body, frame)?;
            Ok(frame)
        })?;

        let mut doc = Document::new();
        if let Some(head) = doc.head() {
            let link = doc.create_element("link");
            doc.set_attr(link, "rel", "stylesheet")?;
            doc.set_attr(link, "href", &config.stylesheet_url)?;
            doc.append_child(head, link)?;
            let style = doc.create_element("style");
            doc.append_child(head, style)?;
            doc.set_text(style, "body { margin: 0; padding: 0; background: transparent; }")?;
        }
        log::debug!("render surface {} attached", host);

        Ok(Self {
            page: page.clone(),
            host,
            doc,
            width,
            height: 0,
            avatar: AvatarState::Pending,
            attached: true,
        })
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Placeholder node in the host page
    pub fn host(&self) -> NodeId {
        self.host
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Fit the placeholder to the measured content height
    pub fn set_height(&mut self, height: u32) -> Result<()> {
        self.height = height;
        let style = placeholder_style(self.width, height);
        let host = self.host;
        self.page.update(|d| d.set_attr(host, "style", &style))
    }

    pub fn avatar(&self) -> &AvatarState {
        &self.avatar
    }

    pub fn set_avatar(&mut self, state: AvatarState) {
        self.avatar = state;
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Remove the placeholder from the page. Returns false if already removed.
    pub fn teardown(&mut self) -> bool {
        if !self.attached {
            return false;
        }
        self.attached = false;
        let host = self.host;
        self.page.update(|d| d.remove(host));
        log::debug!("render surface {} removed", host);
        true
    }
}

impl Drop for RenderSurface {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn placeholder_style(width: u32, height: u32) -> String {
    format!(
        "position:absolute;left:-9999px;top:0;width:{}px;height:{}px;border:0;",
        width, height
    )
}
