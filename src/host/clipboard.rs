//! Clipboard surface for image payloads

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use futures::future::{BoxFuture, FutureExt};

use crate::render::RasterImage;
use crate::{Error, Result};

/// One image-typed clipboard entry. Carries both the encoded payload and the
/// raw pixels since backends differ in which they accept.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipboardItem {
    pub mime: String,
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl ClipboardItem {
    pub fn from_image(image: &RasterImage) -> Result<Self> {
        Ok(Self {
            mime: "image/png".to_string(),
            png: image.encode_png()?,
            width: image.width(),
            height: image.height(),
            rgba: image.pixels().as_raw().clone(),
        })
    }
}

pub trait Clipboard: Send + Sync {
    fn write(&self, item: ClipboardItem) -> BoxFuture<'static, Result<()>>;
}

/// Keeps written items in memory; can be switched to reject writes
#[derive(Default)]
pub struct MemoryClipboard {
    items: Mutex<Vec<ClipboardItem>>,
    failing: AtomicBool,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// A clipboard that rejects every write, like a denied permission
    pub fn failing() -> Self {
        let c = Self::default();
        c.set_failing(true);
        c
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn items(&self) -> Vec<ClipboardItem> {
        self.items.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Clipboard for MemoryClipboard {
    fn write(&self, item: ClipboardItem) -> BoxFuture<'static, Result<()>> {
        let res = if self.failing.load(Ordering::SeqCst) {
            Err(Error::ClipboardError("write permission denied".into()))
        } else {
            self.items
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(item);
            Ok(())
        };
        futures::future::ready(res).boxed()
    }
}

/// System clipboard via arboard. Runs on the blocking pool since arboard
/// talks to the platform synchronously.
#[cfg(feature = "system-clipboard")]
pub struct ArboardClipboard;

#[cfg(feature = "system-clipboard")]
impl Clipboard for ArboardClipboard {
    fn write(&self, item: ClipboardItem) -> BoxFuture<'static, Result<()>> {
        async move {
            tokio::task::spawn_blocking(move || {
                let mut clipboard = arboard::Clipboard::new()
                    .map_err(|e| Error::ClipboardError(e.to_string()))?;
                clipboard
                    .set_image(arboard::ImageData {
                        width: item.width as usize,
                        height: item.height as usize,
                        bytes: std::borrow::Cow::Owned(item.rgba),
                    })
                    .map_err(|e| Error::ClipboardError(e.to_string()))
            })
            .await
            .map_err(|e| Error::ClipboardError(format!("clipboard task failed: {}", e)))?
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> ClipboardItem {
        ClipboardItem {
            mime: "image/png".into(),
            png: vec![0x89],
            width: 1,
            height: 1,
            rgba: vec![0, 0, 0, 0],
        }
    }

    #[tokio::test]
    async fn memory_clipboard_records_and_fails_on_demand() {
        let c = MemoryClipboard::new();
        c.write(item()).await.unwrap();
        assert_eq!(c.items().len(), 1);

        c.set_failing(true);
        assert!(matches!(c.write(item()).await, Err(Error::ClipboardError(_))));
        assert_eq!(c.items().len(), 1);
    }
}
