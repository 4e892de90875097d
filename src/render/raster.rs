//! Built-in rasterizer: paints the card's display list onto an RGBA canvas.

use futures::future::{BoxFuture, FutureExt};
use image::imageops::FilterType;
use image::{Rgba, RgbaImage};

use super::layout::{layout_card, CardLayout, Rect, GLYPH_WIDTH};
use super::paint::{display_list, PaintCommand, Rgba as Color, PLACEHOLDER_COLOR};
use super::{AvatarState, RasterImage, RasterOptions, RenderSurface, Rasterizer};
use crate::dom::{NodeId, Selector};
use crate::{Error, Result};

#[derive(Debug, Default, Clone, Copy)]
pub struct CardRasterizer;

impl CardRasterizer {
    pub fn new() -> Self {
        CardRasterizer
    }
}

impl Rasterizer for CardRasterizer {
    fn rasterize<'a>(
        &'a self,
        surface: &'a RenderSurface,
        node: NodeId,
        options: RasterOptions,
    ) -> BoxFuture<'a, Result<RasterImage>> {
        async move {
            let layout = layout_card(surface.document(), node, surface.width())?;
            if matches!(surface.avatar(), AvatarState::Loaded(_)) && !options.use_cors {
                let sel = Selector::parse(".x-share-avatar")?;
                let doc = surface.document();
                let src = doc
                    .query_selector(node, &sel)
                    .and_then(|img| doc.attr(img, "src"))
                    .unwrap_or_default();
                if is_cross_origin(surface.page().origin(), src) {
                    return Err(Error::RenderError(format!(
                        "cross-origin image {} would taint the canvas",
                        src
                    )));
                }
            }
            tokio::task::yield_now().await;
            rasterize_layout(&layout, surface.avatar(), options)
        }
        .boxed()
    }
}

/// Whether `url` lives on a different origin than the page. Relative and
/// `data:` URLs count as same-origin; without a page origin every absolute
/// URL is foreign.
pub fn is_cross_origin(page_origin: Option<&url::Url>, url: &str) -> bool {
    let Ok(parsed) = url::Url::parse(url) else {
        return false;
    };
    if parsed.scheme() == "data" {
        return false;
    }
    match page_origin {
        Some(origin) => origin.origin() != parsed.origin(),
        None => true,
    }
}

/// Paint `layout` at `options.scale`
pub fn rasterize_layout(
    layout: &CardLayout,
    avatar: &AvatarState,
    options: RasterOptions,
) -> Result<RasterImage> {
    let scale = options.scale;
    let width = layout.width.saturating_mul(scale);
    let height = layout.height.saturating_mul(scale);
    if width == 0 || height == 0 {
        return Err(Error::RenderError(format!(
            "nothing to rasterize ({}x{})",
            width, height
        )));
    }
    let backdrop = options.background.unwrap_or([0, 0, 0, 0]);
    let mut canvas = Canvas {
        img: RgbaImage::from_pixel(width, height, Rgba(backdrop)),
        scale,
    };
    for cmd in display_list(layout) {
        match cmd {
            PaintCommand::RoundedRect { rect, radius, rgba } => {
                canvas.fill_rounded_rect(rect, radius, rgba)
            }
            PaintCommand::Avatar { rect } => canvas.draw_avatar(rect, avatar),
            PaintCommand::Logo { rect, rgba } => canvas.draw_logo(rect, rgba),
            PaintCommand::Text { rect, text, rgba } => canvas.draw_text(rect, &text, rgba),
        }
    }
    Ok(RasterImage::new(canvas.img, scale))
}

struct Canvas {
    img: RgbaImage,
    scale: u32,
}

impl Canvas {
    fn scaled(&self, rect: Rect) -> (i64, i64, i64, i64) {
        let s = self.scale as i64;
        let x = rect.x as i64 * s;
        let y = rect.y as i64 * s;
        (x, y, x + rect.width as i64 * s, y + rect.height as i64 * s)
    }

    fn blend(&mut self, x: i64, y: i64, c: Color) {
        if x < 0 || y < 0 || x >= self.img.width() as i64 || y >= self.img.height() as i64 {
            return;
        }
        let sa = c[3] as u32;
        if sa == 0 {
            return;
        }
        let px = self.img.get_pixel_mut(x as u32, y as u32);
        if sa == 255 {
            *px = Rgba(c);
            return;
        }
        let d = px.0;
        let da = d[3] as u32 * (255 - sa) / 255;
        let out_a = (sa + da).max(1);
        let mut out = [0u8; 4];
        for i in 0..3 {
            out[i] = ((c[i] as u32 * sa + d[i] as u32 * da) / out_a) as u8;
        }
        out[3] = out_a.min(255) as u8;
        *px = Rgba(out);
    }

    fn fill_rect(&mut self, x0: i64, y0: i64, x1: i64, y1: i64, c: Color) {
        for y in y0..y1 {
            for x in x0..x1 {
                self.blend(x, y, c);
            }
        }
    }

    fn fill_rounded_rect(&mut self, rect: Rect, radius: u32, c: Color) {
        let (x0, y0, x1, y1) = self.scaled(rect);
        let r = (radius as i64 * self.scale as i64).min((x1 - x0) / 2).min((y1 - y0) / 2);
        for y in y0..y1 {
            for x in x0..x1 {
                let cx = if x < x0 + r { x0 + r } else if x >= x1 - r { x1 - r - 1 } else { x };
                let cy = if y < y0 + r { y0 + r } else if y >= y1 - r { y1 - r - 1 } else { y };
                let (dx, dy) = (x - cx, y - cy);
                if dx * dx + dy * dy <= r * r {
                    self.blend(x, y, c);
                }
            }
        }
    }

    fn draw_avatar(&mut self, rect: Rect, avatar: &AvatarState) {
        let (x0, y0, x1, _) = self.scaled(rect);
        let size = (x1 - x0).max(1) as u32;
        let source = match avatar {
            AvatarState::Loaded(img) => Some(image::imageops::resize(&**img, size, size, FilterType::Triangle)),
            _ => None,
        };
        let r = size as i64 / 2;
        for dy in 0..size as i64 {
            for dx in 0..size as i64 {
                let (ox, oy) = (dx - r, dy - r);
                if ox * ox + oy * oy > r * r {
                    continue;
                }
                let color = match &source {
                    Some(img) => img.get_pixel(dx as u32, dy as u32).0,
                    None => PLACEHOLDER_COLOR,
                };
                self.blend(x0 + dx, y0 + dy, color);
            }
        }
    }

    fn draw_logo(&mut self, rect: Rect, c: Color) {
        let (x0, y0, x1, y1) = self.scaled(rect);
        let size = (x1 - x0).min(y1 - y0);
        let thickness = 2 * self.scale as i64;
        for i in 0..size {
            for t in 0..thickness {
                self.blend(x0 + i, y0 + i + t - thickness / 2, c);
                self.blend(x1 - 1 - i, y0 + i + t - thickness / 2, c);
            }
        }
    }

    fn draw_text(&mut self, rect: Rect, text: &str, c: Color) {
        let s = self.scale as i64;
        let top = (rect.y as i64 + rect.height as i64 / 4) * s;
        let glyph_h = (rect.height as i64 / 2).max(1) * s;
        let mut cx = rect.x as i64 * s;
        for ch in text.chars() {
            let advance = (super::layout::glyph_units(ch) * GLYPH_WIDTH) as i64 * s;
            if !ch.is_whitespace() {
                self.fill_rect(cx + s, top, cx + advance - s, top + glyph_h, c);
            }
            cx += advance;
        }
    }
}
