//! Card rendering: build the card in an off-screen surface, wait for the
//! avatar, measure, rasterize.

pub mod card;
pub mod layout;
pub mod paint;
pub mod raster;
pub mod surface;

use std::io::Cursor;
use std::sync::Arc;

use base64::Engine as _;
use futures::future::BoxFuture;
use image::imageops::FilterType;
use image::RgbaImage;
use sha2::{Digest, Sha256};

pub use raster::CardRasterizer;
pub use surface::{AvatarState, RenderSurface};

use crate::dom::{NodeId, Page};
use crate::extract::ExtractedPost;
use crate::host::{images, ImageLoader};
use crate::{wait, Error, Result, ShareConfig};

/// Options handed to a [`Rasterizer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterOptions {
    /// Fetch cross-origin images with CORS so they do not taint the canvas
    pub use_cors: bool,
    /// Supersampling factor
    pub scale: u32,
    /// `None` keeps the backdrop transparent
    pub background: Option<[u8; 4]>,
}

impl RasterOptions {
    pub fn for_config(config: &ShareConfig) -> Self {
        Self {
            use_cors: true,
            scale: config.scale,
            background: None,
        }
    }
}

/// Rasterized card
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    pixels: RgbaImage,
    scale: u32,
}

impl RasterImage {
    pub fn new(pixels: RgbaImage, scale: u32) -> Self {
        Self { pixels, scale }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Lossless PNG encoding
    pub fn encode_png(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.pixels
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
        Ok(buf)
    }

    pub fn to_data_url(&self) -> Result<String> {
        let png = self.encode_png()?;
        Ok(format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(png)
        ))
    }

    /// Hex sha256 over dimensions and pixels
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.width().to_be_bytes());
        hasher.update(self.height().to_be_bytes());
        hasher.update(self.pixels.as_raw());
        hex::encode(hasher.finalize())
    }
}

/// Turns a node of a render surface into a bitmap
pub trait Rasterizer: Send + Sync {
    fn rasterize<'a>(
        &'a self,
        surface: &'a RenderSurface,
        node: NodeId,
        options: RasterOptions,
    ) -> BoxFuture<'a, Result<RasterImage>>;
}

/// Drives one render: surface lifecycle, avatar readiness, measurement and
/// rasterization.
pub struct CardRenderer {
    config: Arc<ShareConfig>,
    rasterizer: Arc<dyn Rasterizer>,
    images: Arc<dyn ImageLoader>,
}

impl CardRenderer {
    pub fn new(
        config: Arc<ShareConfig>,
        rasterizer: Arc<dyn Rasterizer>,
        images: Arc<dyn ImageLoader>,
    ) -> Self {
        Self {
            config,
            rasterizer,
            images,
        }
    }

    /// Render `post` to an image. The off-screen surface is removed from the
    /// page on every outcome.
    pub async fn render(&self, page: &Page, post: &ExtractedPost) -> Result<RasterImage> {
        let mut surface = RenderSurface::attach(page, &self.config)?;
        let result = self.render_in(&mut surface, post).await;
        surface.teardown();
        match result {
            Ok(image) => {
                log::debug!(
                    "rendered card {}x{} for {}",
                    image.width(),
                    image.height(),
                    post.author_name
                );
                Ok(image)
            }
            Err(Error::RenderError(msg)) => Err(Error::RenderError(msg)),
            Err(other) => Err(Error::RenderError(other.to_string())),
        }
    }

    async fn render_in(&self, surface: &mut RenderSurface, post: &ExtractedPost) -> Result<RasterImage> {
        let nodes = card::build_card(surface, post, &self.config)?;
        self.await_avatar(surface, &post.avatar_url).await;
        wait::settle(self.config.capture_settle()).await;

        let measured = layout::layout_card(surface.document(), nodes.container, surface.width())?;
        surface.set_height(measured.height)?;

        let options = RasterOptions::for_config(&self.config);
        self.rasterizer
            .rasterize(surface, nodes.container, options)
            .await
    }

    /// Resolve the avatar before capture. A cached image counts as loaded;
    /// otherwise fetch, bounded by the avatar timeout. Failure is not fatal:
    /// the card renders with a placeholder.
    async fn await_avatar(&self, surface: &mut RenderSurface, url: &str) {
        if let Some(cached) = surface.page().cached_image(url) {
            log::debug!("avatar cache hit for {}", url);
            surface.set_avatar(AvatarState::Loaded(cached));
            return;
        }
        let state = match self.fetch_avatar(url).await {
            Ok(decoded) => {
                let decoded = Arc::new(decoded);
                surface.page().cache_image(url, decoded.clone());
                AvatarState::Loaded(decoded)
            }
            Err(e) => {
                log::warn!("avatar {} unavailable, using placeholder: {}", url, e);
                AvatarState::Failed
            }
        };
        surface.set_avatar(state);
    }

    /// Fetch and decode an avatar, shrunk to the size it is drawn at
    async fn fetch_avatar(&self, url: &str) -> Result<RgbaImage> {
        let bytes = tokio::time::timeout(self.config.avatar_timeout(), self.images.fetch(url))
            .await
            .map_err(|_| Error::Timeout(self.config.avatar_timeout_ms))??;
        let decoded = images::decode(&bytes)?;
        let px = layout::AVATAR_SIZE * self.config.scale;
        if decoded.width() <= px && decoded.height() <= px {
            return Ok(decoded);
        }
        Ok(image::imageops::resize(&decoded, px, px, FilterType::Triangle))
    }
}
