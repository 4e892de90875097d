//! Export overlay: a modal preview of the rendered card with copy-to-clipboard
//! and save actions.
//!
//! The overlay owns the image until it is dismissed. Dismissal removes the
//! modal from the page, unregisters its click handlers and releases the image.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use tokio::sync::watch;

use crate::dom::{Document, NodeId, Page, Propagation};
use crate::host::{Clipboard, ClipboardItem};
use crate::render::RasterImage;
use crate::{Error, Labels, Result, ShareConfig};

const COPIED_STYLE: &str = "background:#10B981;color:#fff;";
const COPY_FAILED_STYLE: &str = "background:#F4212E;color:#fff;";

/// `<prefix><author>.png` with characters that are illegal in file names
/// replaced by `_`.
pub fn download_filename(prefix: &str, author: &str) -> String {
    let safe: String = author
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    format!("{}{}.png", prefix, safe.trim())
}

#[derive(Debug, Clone, Copy)]
struct OverlayNodes {
    overlay: NodeId,
    content: NodeId,
    close: NodeId,
    preview: NodeId,
    copy: NodeId,
    download: NodeId,
}

struct OverlayInner {
    page: Page,
    nodes: OverlayNodes,
    image: Mutex<Option<Arc<RasterImage>>>,
    filename: String,
    labels: Labels,
    feedback: std::time::Duration,
    clipboard: Arc<dyn Clipboard>,
    dismissed: watch::Sender<bool>,
    // bumped on each copy so a stale revert leaves newer feedback alone
    feedback_epoch: AtomicU64,
}

/// Handle to a presented overlay
#[derive(Clone)]
pub struct ExportOverlay {
    inner: Arc<OverlayInner>,
}

impl std::fmt::Debug for ExportOverlay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportOverlay")
            .field("overlay", &self.inner.nodes.overlay)
            .field("filename", &self.inner.filename)
            .field("dismissed", &self.is_dismissed())
            .finish()
    }
}

impl ExportOverlay {
    /// Show `image` in a modal appended to the page body.
    pub fn present(
        page: &Page,
        image: RasterImage,
        author: &str,
        config: &ShareConfig,
        clipboard: Arc<dyn Clipboard>,
    ) -> Result<Self> {
        let data_url = image.to_data_url()?;
        let filename = download_filename(&config.filename_prefix, author);
        let labels = config.labels.clone();

        let nodes = page.update(|d| build_overlay(d, &data_url, &filename, &labels))?;
        let (dismissed, _) = watch::channel(false);
        let overlay = Self {
            inner: Arc::new(OverlayInner {
                page: page.clone(),
                nodes,
                image: Mutex::new(Some(Arc::new(image))),
                filename,
                labels,
                feedback: config.feedback(),
                clipboard,
                dismissed,
                feedback_epoch: AtomicU64::new(0),
            }),
        };
        overlay.register_handlers();
        info!("presenting {} in overlay {}", overlay.inner.filename, nodes.overlay);
        Ok(overlay)
    }

    fn register_handlers(&self) {
        let nodes = self.inner.nodes;

        let this = self.clone();
        self.inner.page.on_click(
            nodes.overlay,
            Arc::new(move |_, ev| {
                // only a click on the backdrop itself dismisses
                if ev.target == ev.current {
                    this.dismiss();
                }
                Propagation::Continue
            }),
        );

        let this = self.clone();
        self.inner.page.on_click(
            nodes.close,
            Arc::new(move |_, _| {
                this.dismiss();
                Propagation::Stop
            }),
        );

        let this = self.clone();
        self.inner.page.on_click(
            nodes.copy,
            Arc::new(move |_, _| {
                let overlay = this.clone();
                tokio::spawn(async move {
                    let _ = overlay.copy().await;
                });
                Propagation::Stop
            }),
        );
    }

    /// Write the image to the clipboard and show success or failure on the
    /// copy button, reverting after the feedback period. Failure leaves the
    /// overlay and the save action usable.
    pub async fn copy(&self) -> Result<()> {
        let image = self
            .image()
            .ok_or_else(|| Error::ClipboardError("overlay already dismissed".into()))?;
        let result = match ClipboardItem::from_image(&image) {
            Ok(item) => self.inner.clipboard.write(item).await,
            Err(e) => Err(e),
        };
        match &result {
            Ok(()) => {
                debug!("copied {} to clipboard", self.inner.filename);
                self.show_feedback(&self.inner.labels.copied, COPIED_STYLE);
            }
            Err(e) => {
                warn!("clipboard write failed: {}", e);
                self.show_feedback(&self.inner.labels.copy_failed, COPY_FAILED_STYLE);
            }
        }
        result
    }

    fn show_feedback(&self, text: &str, style: &str) {
        if self.is_dismissed() {
            return;
        }
        let epoch = self.inner.feedback_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let button = self.inner.nodes.copy;
        self.inner.page.update(|d| {
            let _ = d.set_text(button, text);
            let _ = d.set_attr(button, "style", style);
        });

        let inner = self.inner.clone();
        tokio::spawn(async move {
            tokio::time::sleep(inner.feedback).await;
            if inner.feedback_epoch.load(Ordering::SeqCst) != epoch || *inner.dismissed.borrow() {
                return;
            }
            inner.page.update(|d| {
                let _ = d.set_text(button, &inner.labels.copy);
                d.remove_attr(button, "style");
            });
        });
    }

    /// Write the PNG into `dir` under the download filename
    pub async fn save_to(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let png = self.png()?;
        let path = dir.as_ref().join(&self.inner.filename);
        tokio::fs::write(&path, png).await?;
        info!("saved {}", path.display());
        Ok(path)
    }

    /// Remove the overlay and release the image. Returns false if it was
    /// already dismissed.
    pub fn dismiss(&self) -> bool {
        let first = self.inner.dismissed.send_if_modified(|d| {
            if *d {
                return false;
            }
            *d = true;
            true
        });
        if !first {
            return false;
        }
        let nodes = self.inner.nodes;
        self.inner.page.update(|d| {
            d.remove(nodes.overlay);
            d.clear_click_handler(nodes.overlay);
            d.clear_click_handler(nodes.close);
            d.clear_click_handler(nodes.copy);
        });
        self.inner
            .image
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        debug!("overlay {} dismissed", nodes.overlay);
        true
    }

    pub fn is_dismissed(&self) -> bool {
        *self.inner.dismissed.borrow()
    }

    /// Resolves once the overlay has been dismissed
    pub async fn dismissed(&self) {
        let mut rx = self.inner.dismissed.subscribe();
        let _ = rx.wait_for(|d| *d).await;
    }

    /// The presented image, or `None` after dismissal
    pub fn image(&self) -> Option<Arc<RasterImage>> {
        self.inner
            .image
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn png(&self) -> Result<Vec<u8>> {
        self.image()
            .ok_or_else(|| Error::Other("overlay already dismissed".into()))?
            .encode_png()
    }

    pub fn filename(&self) -> &str {
        &self.inner.filename
    }

    pub fn overlay_node(&self) -> NodeId {
        self.inner.nodes.overlay
    }

    pub fn content_node(&self) -> NodeId {
        self.inner.nodes.content
    }

    pub fn preview_node(&self) -> NodeId {
        self.inner.nodes.preview
    }

    pub fn copy_button(&self) -> NodeId {
        self.inner.nodes.copy
    }

    pub fn download_link(&self) -> NodeId {
        self.inner.nodes.download
    }

    pub fn close_button(&self) -> NodeId {
        self.inner.nodes.close
    }
}

fn element(d: &mut Document, tag: &str, class: &str) -> Result<NodeId> {
    let node = d.create_element(tag);
    d.set_attr(node, "class", class)?;
    Ok(node)
}

fn build_overlay(
    d: &mut Document,
    data_url: &str,
    filename: &str,
    labels: &Labels,
) -> Result<OverlayNodes> {
    let body = d.body().ok_or_else(|| Error::Other("page has no body".into()))?;

    let overlay = element(d, "div", "x-share-modal-overlay")?;
    let content = element(d, "div", "x-share-modal-content")?;
    d.append_child(overlay, content)?;

    let close = element(d, "button", "x-share-close-button")?;
    d.set_attr(close, "type", "button")?;
    d.set_text(close, &labels.close)?;
    d.append_child(content, close)?;

    let preview = element(d, "img", "x-share-preview-img")?;
    d.set_attr(preview, "src", data_url)?;
    d.set_attr(preview, "alt", "share card preview")?;
    d.append_child(content, preview)?;

    let actions = element(d, "div", "x-share-modal-actions")?;
    d.append_child(content, actions)?;

    let copy = element(d, "button", "x-share-action-button x-share-copy-button")?;
    d.set_attr(copy, "type", "button")?;
    d.set_text(copy, &labels.copy)?;
    d.append_child(actions, copy)?;

    let download = element(d, "a", "x-share-action-button x-share-download-button")?;
    d.set_attr(download, "href", data_url)?;
    d.set_attr(download, "download", filename)?;
    d.set_text(download, &labels.save)?;
    d.append_child(actions, download)?;

    d.append_child(body, overlay)?;
    Ok(OverlayNodes {
        overlay,
        content,
        close,
        preview,
        copy,
        download,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryClipboard;
    use image::{Rgba, RgbaImage};

    fn image() -> RasterImage {
        RasterImage::new(RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 255])), 1)
    }

    #[test]
    fn filename_strips_illegal_characters() {
        assert_eq!(download_filename("X-Share_", "Alice"), "X-Share_Alice.png");
        assert_eq!(download_filename("X-Share_", "a/b:c*?"), "X-Share_a_b_c__.png");
        assert_eq!(download_filename("p_", "日本 語"), "p_日本 語.png");
    }

    #[tokio::test]
    async fn click_targets_decide_dismissal() {
        let page = Page::from_html("<body></body>", None).unwrap();
        let cfg = ShareConfig::default();
        let overlay =
            ExportOverlay::present(&page, image(), "Alice", &cfg, Arc::new(MemoryClipboard::new()))
                .unwrap();
        let link = overlay.download_link();
        assert_eq!(page.attr(link, "download").as_deref(), Some("X-Share_Alice.png"));
        assert!(page
            .attr(overlay.preview_node(), "src")
            .unwrap()
            .starts_with("data:image/png;base64,"));

        page.click(overlay.content_node()).unwrap();
        page.click(overlay.preview_node()).unwrap();
        assert!(!overlay.is_dismissed());

        page.click(overlay.overlay_node()).unwrap();
        assert!(overlay.is_dismissed());
        assert!(!page.is_connected(overlay.overlay_node()));
        assert!(overlay.image().is_none());
        assert!(!overlay.dismiss());
        overlay.dismissed().await;
    }
}
