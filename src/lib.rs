//! XShare
//!
//! Watches a social feed page for post elements, attaches a share action to
//! each, and turns a post into a styled snapshot card presented for copy or
//! download.
//!
//! # Pipeline
//!
//! - **Watcher** ([`watcher`]): waits for the feed root, observes insertions and
//!   finds post elements, including ones already on the page
//! - **Injector** ([`injector`]): attaches exactly one share control per post
//! - **Extractor** ([`extract`]): reads avatar, author, handle, body and time
//! - **Renderer** ([`render`]): lays the post out as a card in an off-screen
//!   surface and rasterizes it
//! - **Presenter** ([`present`]): overlay with copy-to-clipboard and save
//!
//! The page itself is a simulated document ([`dom`]); host capabilities such as
//! the clipboard or image fetching sit behind the traits in [`host`].
//!
//! # Example
//!
//! ```no_run
//! use xshare::{HostServices, Page, ShareConfig, ShareController};
//!
//! # async fn run() -> xshare::Result<()> {
//! let page = Page::from_html("<body><main></main></body>", Some("https://x.com/home"))?;
//! let controller = ShareController::new(page, ShareConfig::default(), HostServices::noop())?;
//! assert!(controller.install());
//! assert!(!controller.install());
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub mod error;
pub use error::{Error, Result};

pub mod dom;
pub mod wait;

pub mod host;
pub mod session;

pub mod extract;
pub mod injector;
pub mod watcher;

// Card layout, paint and rasterization
pub mod render;

pub mod controller;
pub mod present;

pub use controller::{ShareController, ShareOutcome, ShareReport, ShareState};
pub use dom::{Document, NodeId, Page};
pub use extract::ExtractedPost;
pub use host::HostServices;
pub use present::ExportOverlay;
pub use render::RasterImage;

/// Structural markers of the host page the pipeline depends on
///
/// Any change to the host markup is absorbed here rather than in code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostSelectors {
    /// Root container of the feed
    pub feed_root: String,
    /// One post
    pub post: String,
    /// Block holding display name and handle, one per line
    pub identity: String,
    /// Shallower lookup used when the identity block yields no name
    pub identity_fallback: String,
    pub avatar: String,
    pub body_text: String,
    /// Region the share control is appended to
    pub action_bar: String,
    pub timestamp: String,
    /// "Show more" control of truncated posts
    pub show_more: String,
}

impl Default for HostSelectors {
    fn default() -> Self {
        Self {
            feed_root: "main".to_string(),
            post: "article".to_string(),
            identity: r#"div[data-testid="User-Name"]"#.to_string(),
            identity_fallback: r#"div[data-testid="User-Name"] span"#.to_string(),
            avatar: r#"div[data-testid="Tweet-User-Avatar"] img[alt][draggable="true"]"#.to_string(),
            body_text: r#"div[data-testid="tweetText"]"#.to_string(),
            action_bar: r#"div[role="group"]"#.to_string(),
            timestamp: "time[datetime]".to_string(),
            show_more: r#"[data-testid="tweet-text-show-more-link"]"#.to_string(),
        }
    }
}

/// User-facing strings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Labels {
    pub share: String,
    pub copy: String,
    pub copied: String,
    pub copy_failed: String,
    pub save: String,
    pub close: String,
    /// Placeholder author when the identity block has no readable name
    pub unknown_author: String,
    pub extraction_notice: String,
    pub render_notice: String,
}

impl Default for Labels {
    fn default() -> Self {
        Self {
            share: "Share".to_string(),
            copy: "Copy image".to_string(),
            copied: "Copied".to_string(),
            copy_failed: "Copy failed".to_string(),
            save: "Save image".to_string(),
            close: "\u{00d7}".to_string(),
            unknown_author: "Unknown".to_string(),
            extraction_notice: "Could not capture the post content, please try again.".to_string(),
            render_notice: "Could not render the share card, please try again.".to_string(),
        }
    }
}

/// Zone used to format post timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimeZoneSetting {
    /// The machine's local zone
    #[default]
    Local,
    /// A fixed offset east of UTC
    Fixed { offset_minutes: i32 },
}

impl TimeZoneSetting {
    pub fn utc() -> Self {
        TimeZoneSetting::Fixed { offset_minutes: 0 }
    }
}

/// Configuration for the share pipeline
///
/// Defaults reproduce the behavior expected on the reference feed markup:
/// a 600px card rendered at 2x, 500ms feed-root polling and a 500ms settle
/// after expanding truncated text.
///
/// # Examples
///
/// ```
/// let cfg = xshare::ShareConfig::default();
/// assert_eq!(cfg.card_width, 600);
/// assert_eq!(cfg.scale, 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShareConfig {
    pub selectors: HostSelectors,
    pub labels: Labels,
    /// Class marking the injected share control
    pub action_class: String,
    /// Polling interval while the document body is missing
    pub body_poll_ms: u64,
    /// Polling interval while the feed root is missing
    pub root_poll_ms: u64,
    /// Give up on the feed root after this many probes (`None` => never)
    pub root_max_attempts: Option<u32>,
    /// Wait after invoking "show more" before reading the body text
    pub expand_settle_ms: u64,
    /// Finish the expand wait early once the "show more" control is gone
    pub expand_early_exit: bool,
    /// Delay before capture to absorb layout reflow
    pub capture_settle_ms: u64,
    /// Upper bound on waiting for the avatar to load
    pub avatar_timeout_ms: u64,
    /// How long copy feedback stays on the button
    pub feedback_ms: u64,
    /// Nominal card width in CSS pixels
    pub card_width: u32,
    /// Supersampling factor for rasterization
    pub scale: u32,
    /// Stylesheet referenced by the render surface
    pub stylesheet_url: String,
    pub filename_prefix: String,
    pub brand_tag: String,
    pub timezone: TimeZoneSetting,
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            selectors: HostSelectors::default(),
            labels: Labels::default(),
            action_class: "x-share-button".to_string(),
            body_poll_ms: 100,
            root_poll_ms: 500,
            root_max_attempts: None,
            expand_settle_ms: 500,
            expand_early_exit: false,
            capture_settle_ms: 100,
            avatar_timeout_ms: 5000,
            feedback_ms: 2000,
            card_width: 600,
            scale: 2,
            stylesheet_url: "style.css".to_string(),
            filename_prefix: "X-Share_".to_string(),
            brand_tag: "X-Share".to_string(),
            timezone: TimeZoneSetting::Local,
        }
    }
}

impl ShareConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: ShareConfig = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Reject values that would make the pipeline spin or render nothing
    pub fn validate(&self) -> Result<()> {
        if self.card_width == 0 {
            return Err(Error::ConfigError("card_width must be positive".into()));
        }
        if self.scale == 0 {
            return Err(Error::ConfigError("scale must be positive".into()));
        }
        if self.body_poll_ms == 0 || self.root_poll_ms == 0 {
            return Err(Error::ConfigError("poll intervals must be positive".into()));
        }
        for sel in [
            &self.selectors.feed_root,
            &self.selectors.post,
            &self.selectors.identity,
            &self.selectors.identity_fallback,
            &self.selectors.avatar,
            &self.selectors.body_text,
            &self.selectors.action_bar,
            &self.selectors.timestamp,
            &self.selectors.show_more,
        ] {
            dom::Selector::parse(sel)?;
        }
        if self.action_class.split_whitespace().count() != 1 {
            return Err(Error::ConfigError("action_class must be a single class name".into()));
        }
        Ok(())
    }

    pub fn body_poll(&self) -> Duration {
        Duration::from_millis(self.body_poll_ms)
    }

    pub fn root_poll(&self) -> Duration {
        Duration::from_millis(self.root_poll_ms)
    }

    pub fn expand_settle(&self) -> Duration {
        Duration::from_millis(self.expand_settle_ms)
    }

    pub fn capture_settle(&self) -> Duration {
        Duration::from_millis(self.capture_settle_ms)
    }

    pub fn avatar_timeout(&self) -> Duration {
        Duration::from_millis(self.avatar_timeout_ms)
    }

    pub fn feedback(&self) -> Duration {
        Duration::from_millis(self.feedback_ms)
    }

    /// Selector matching the injected share control
    pub fn action_selector(&self) -> String {
        format!(".{}", self.action_class)
    }
}
