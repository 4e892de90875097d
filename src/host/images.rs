//! Image fetching for the card avatar

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use image::RgbaImage;

use crate::{Error, Result};

pub trait ImageLoader: Send + Sync {
    /// Fetch the encoded bytes behind `url`
    fn fetch(&self, url: &str) -> BoxFuture<'static, Result<Vec<u8>>>;
}

/// Decode fetched bytes into RGBA pixels
pub fn decode(bytes: &[u8]) -> Result<RgbaImage> {
    Ok(image::load_from_memory(bytes)?.to_rgba8())
}

/// Every fetch fails; cards render with the avatar placeholder
pub struct NoopImageLoader;

impl ImageLoader for NoopImageLoader {
    fn fetch(&self, url: &str) -> BoxFuture<'static, Result<Vec<u8>>> {
        let err = Error::ImageError(format!("image loading disabled: {}", url));
        futures::future::ready(Err(err)).boxed()
    }
}

/// Serves images from memory, optionally after a delay
#[derive(Default)]
pub struct StaticImageLoader {
    images: Mutex<HashMap<String, Vec<u8>>>,
    delay: Duration,
}

impl StaticImageLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn insert(&self, url: &str, bytes: Vec<u8>) {
        self.images
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.to_string(), bytes);
    }
}

impl ImageLoader for StaticImageLoader {
    fn fetch(&self, url: &str) -> BoxFuture<'static, Result<Vec<u8>>> {
        let found = self
            .images
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(url)
            .cloned()
            .ok_or_else(|| Error::ImageError(format!("no image for {}", url)));
        let delay = self.delay;
        async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            found
        }
        .boxed()
    }
}

/// Resolves `file://` URLs directly and any other URL to the file named by
/// its last path segment under `root`. Used to render saved pages offline.
pub struct FileImageLoader {
    root: PathBuf,
}

impl FileImageLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn resolve(&self, url: &str) -> Option<PathBuf> {
        let parsed = url::Url::parse(url).ok();
        match parsed {
            Some(u) if u.scheme() == "file" => u.to_file_path().ok(),
            Some(u) => u
                .path_segments()
                .and_then(|mut s| s.next_back().map(str::to_string))
                .filter(|name| !name.is_empty())
                .map(|name| self.root.join(name)),
            None => Some(self.root.join(url)),
        }
    }
}

impl ImageLoader for FileImageLoader {
    fn fetch(&self, url: &str) -> BoxFuture<'static, Result<Vec<u8>>> {
        let path = self.resolve(url);
        let url = url.to_string();
        async move {
            let path = path.ok_or_else(|| Error::ImageError(format!("cannot resolve {}", url)))?;
            log::debug!("loading image {} from {}", url, path.display());
            Ok(tokio::fs::read(&path).await?)
        }
        .boxed()
    }
}
