//! Host capabilities the pipeline calls into: rasterization, image fetching,
//! clipboard and user notices.
//!
//! Each surface is a small trait with an in-memory implementation usable in
//! tests and as a safe default, plus a real backend where one exists.

pub mod clipboard;
pub mod images;
pub mod notice;

use std::sync::Arc;

pub use clipboard::{Clipboard, ClipboardItem, MemoryClipboard};
#[cfg(feature = "system-clipboard")]
pub use clipboard::ArboardClipboard;
pub use images::{FileImageLoader, ImageLoader, NoopImageLoader, StaticImageLoader};
pub use notice::{LogNotifier, Notice, NoticeKind, Notifier, RecordingNotifier};

use crate::render::{CardRasterizer, Rasterizer};

/// Composite of the host surfaces a controller needs
#[derive(Clone)]
pub struct HostServices {
    pub rasterizer: Arc<dyn Rasterizer>,
    pub images: Arc<dyn ImageLoader>,
    pub clipboard: Arc<dyn Clipboard>,
    pub notifier: Arc<dyn Notifier>,
}

impl HostServices {
    /// Built-in rasterizer, no image fetching, in-memory clipboard, log notices
    pub fn noop() -> Self {
        Self {
            rasterizer: Arc::new(CardRasterizer::new()),
            images: Arc::new(NoopImageLoader),
            clipboard: Arc::new(MemoryClipboard::new()),
            notifier: Arc::new(LogNotifier),
        }
    }

    /// Like [`HostServices::noop`] but writing to the system clipboard
    #[cfg(feature = "system-clipboard")]
    pub fn system() -> Self {
        Self {
            clipboard: Arc::new(ArboardClipboard),
            ..Self::noop()
        }
    }

    pub fn with_rasterizer(mut self, rasterizer: Arc<dyn Rasterizer>) -> Self {
        self.rasterizer = rasterizer;
        self
    }

    pub fn with_images(mut self, images: Arc<dyn ImageLoader>) -> Self {
        self.images = images;
        self
    }

    pub fn with_clipboard(mut self, clipboard: Arc<dyn Clipboard>) -> Self {
        self.clipboard = clipboard;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }
}

impl Default for HostServices {
    fn default() -> Self {
        Self::noop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_host_provides_working_surfaces() {
        let host = HostServices::noop();
        assert!(host.images.fetch("https://img/u.png").await.is_err());

        let item = ClipboardItem {
            mime: "image/png".to_string(),
            png: vec![1, 2, 3],
            width: 1,
            height: 1,
            rgba: vec![0; 4],
        };
        assert!(host.clipboard.write(item).await.is_ok());
        host.notifier.notify(&Notice::new(NoticeKind::RenderFailed, "x"));
    }
}
