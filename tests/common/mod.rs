#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use image::{Rgba, RgbaImage};

use xshare::dom::{MutationBatch, NodeId};
use xshare::host::{MemoryClipboard, RecordingNotifier, StaticImageLoader};
use xshare::render::{
    AvatarState, CardRasterizer, RasterImage, RasterOptions, Rasterizer, RenderSurface,
};
use xshare::{HostServices, Page, ShareConfig, TimeZoneSetting};

pub const ORIGIN: &str = "https://x.com/home";

pub fn avatar_url(handle: &str) -> String {
    format!("https://pbs.twimg.com/profile_images/{}.png", handle)
}

/// Markup of one post shaped like the host feed
pub fn post(name: &str, handle: &str, body: &str) -> String {
    format!(
        r#"<article data-handle="{handle}">
  <div data-testid="Tweet-User-Avatar"><img alt="{name}" draggable="true" src="{avatar}"></div>
  <div data-testid="User-Name"><div><span>{name}</span></div><div><span>@{handle}</span></div></div>
  <div data-testid="tweetText">{body}</div>
  <time datetime="2024-01-01T09:30:00.000Z">Jan 1</time>
  <div role="group"><button data-testid="reply">Reply</button></div>
</article>"#,
        handle = handle,
        name = name,
        avatar = avatar_url(handle),
        body = body
    )
}

pub fn feed(posts: &[String]) -> String {
    format!("<html><head></head><body><main>{}</main></body></html>", posts.concat())
}

pub fn config() -> ShareConfig {
    ShareConfig {
        timezone: TimeZoneSetting::utc(),
        ..ShareConfig::default()
    }
}

pub fn avatar_png() -> Vec<u8> {
    RasterImage::new(RgbaImage::from_pixel(32, 32, Rgba([220, 40, 40, 255])), 1)
        .encode_png()
        .unwrap()
}

/// Host doubles that record what the pipeline did
pub struct Harness {
    pub clipboard: Arc<MemoryClipboard>,
    pub notifier: Arc<RecordingNotifier>,
    pub images: Arc<StaticImageLoader>,
    pub rasterizer: Arc<ProbeRasterizer>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_images(StaticImageLoader::new())
    }

    pub fn with_images(images: StaticImageLoader) -> Self {
        for handle in ["alice", "bob", "carol"] {
            images.insert(&avatar_url(handle), avatar_png());
        }
        Self {
            clipboard: Arc::new(MemoryClipboard::new()),
            notifier: Arc::new(RecordingNotifier::new()),
            images: Arc::new(images),
            rasterizer: Arc::new(ProbeRasterizer::default()),
        }
    }

    pub fn services(&self) -> HostServices {
        HostServices::noop()
            .with_clipboard(self.clipboard.clone())
            .with_notifier(self.notifier.clone())
            .with_images(self.images.clone())
            .with_rasterizer(self.rasterizer.clone())
    }
}

/// Wraps the built-in rasterizer, counting calls and recording the avatar
/// state seen at capture time. Can be switched to fail.
#[derive(Default)]
pub struct ProbeRasterizer {
    pub calls: AtomicUsize,
    pub fail: std::sync::atomic::AtomicBool,
    pub avatar_loaded: Mutex<Vec<bool>>,
}

impl ProbeRasterizer {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

impl Rasterizer for ProbeRasterizer {
    fn rasterize<'a>(
        &'a self,
        surface: &'a RenderSurface,
        node: NodeId,
        options: RasterOptions,
    ) -> BoxFuture<'a, xshare::Result<RasterImage>> {
        async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.avatar_loaded
                .lock()
                .unwrap()
                .push(matches!(surface.avatar(), AvatarState::Loaded(_)));
            if self.fail.load(Ordering::SeqCst) {
                return Err(xshare::Error::RenderError("canvas unavailable".into()));
            }
            let inner = CardRasterizer::new();
            let image = inner.rasterize(surface, node, options).await?;
            Ok(image)
        }
        .boxed()
    }
}

/// Let spawned tasks run; with a paused clock this also advances time
pub async fn tick() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

pub fn share_buttons(page: &Page) -> Vec<NodeId> {
    page.query_selector_all(page.root(), ".x-share-button").unwrap()
}

pub fn posts(page: &Page) -> Vec<NodeId> {
    page.query_selector_all(page.root(), "article").unwrap()
}

/// Surfaces removed from the page across the given batches
pub fn removed_surfaces(page: &Page, batches: &[MutationBatch]) -> usize {
    page.read(|d| {
        batches
            .iter()
            .flatten()
            .flat_map(|r| r.removed.iter())
            .filter(|n| d.has_class(**n, "x-share-surface"))
            .count()
    })
}
