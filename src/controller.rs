//! Share controller: owns the page session and runs share actions.
//!
//! Each share action is an independent task moving through
//! `Idle -> Extracting -> Rendering -> Presenting -> Dismissed`, or ending in
//! `ExtractionFailed` / `RenderFailed`. A failed action raises exactly one
//! user notice and leaves no partial artifacts in the page.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, error, info, warn};
use tokio::task::JoinHandle;

use crate::dom::{NodeId, Page};
use crate::extract::extract;
use crate::host::{HostServices, Notice, NoticeKind};
use crate::injector::ShareTrigger;
use crate::present::ExportOverlay;
use crate::render::CardRenderer;
use crate::session::PageSession;
use crate::watcher::Watcher;
use crate::{Error, Result, ShareConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShareState {
    Idle,
    Extracting,
    ExtractionFailed,
    Rendering,
    RenderFailed,
    Presenting,
    Dismissed,
}

impl ShareState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ShareState::ExtractionFailed | ShareState::RenderFailed | ShareState::Dismissed
        )
    }

    pub fn can_advance_to(self, next: ShareState) -> bool {
        use ShareState::*;
        matches!(
            (self, next),
            (Idle, Extracting)
                | (Extracting, ExtractionFailed)
                | (Extracting, Rendering)
                | (Rendering, RenderFailed)
                | (Rendering, Presenting)
                | (Presenting, Dismissed)
        )
    }

    /// Validated transition
    pub fn advance(self, next: ShareState) -> Result<ShareState> {
        if self.can_advance_to(next) {
            Ok(next)
        } else {
            Err(Error::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl fmt::Display for ShareState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ShareState::Idle => "idle",
            ShareState::Extracting => "extracting",
            ShareState::ExtractionFailed => "extraction-failed",
            ShareState::Rendering => "rendering",
            ShareState::RenderFailed => "render-failed",
            ShareState::Presenting => "presenting",
            ShareState::Dismissed => "dismissed",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub enum ShareOutcome {
    ExtractionFailed(Error),
    RenderFailed(Error),
    Presented(ExportOverlay),
}

/// Result of one share action
#[derive(Debug)]
pub struct ShareReport {
    pub id: u64,
    pub post: NodeId,
    /// States visited, starting at `Idle`
    pub trail: Vec<ShareState>,
    pub outcome: ShareOutcome,
}

impl ShareReport {
    /// Current state; a presented action reports `Dismissed` once its overlay is closed
    pub fn state(&self) -> ShareState {
        match &self.outcome {
            ShareOutcome::Presented(o) if o.is_dismissed() => ShareState::Dismissed,
            _ => self.trail.last().copied().unwrap_or(ShareState::Idle),
        }
    }

    pub fn overlay(&self) -> Option<&ExportOverlay> {
        match &self.outcome {
            ShareOutcome::Presented(o) => Some(o),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&Error> {
        match &self.outcome {
            ShareOutcome::ExtractionFailed(e) | ShareOutcome::RenderFailed(e) => Some(e),
            ShareOutcome::Presented(_) => None,
        }
    }
}

struct Trail {
    id: u64,
    states: Vec<ShareState>,
}

impl Trail {
    fn new(id: u64) -> Self {
        Self {
            id,
            states: vec![ShareState::Idle],
        }
    }

    fn enter(&mut self, next: ShareState) {
        let current = self.states.last().copied().unwrap_or(ShareState::Idle);
        debug_assert!(current.can_advance_to(next), "{} -> {}", current, next);
        debug!("share #{}: {} -> {}", self.id, current, next);
        self.states.push(next);
    }
}

struct ControllerInner {
    page: Page,
    config: Arc<ShareConfig>,
    host: HostServices,
    session: PageSession,
    renderer: CardRenderer,
    next_id: AtomicU64,
    in_flight: Mutex<Vec<JoinHandle<ShareReport>>>,
}

/// Entry point for one page. Cheap to clone.
#[derive(Clone)]
pub struct ShareController {
    inner: Arc<ControllerInner>,
}

impl ShareController {
    pub fn new(page: Page, config: ShareConfig, host: HostServices) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let renderer = CardRenderer::new(
            config.clone(),
            host.rasterizer.clone(),
            host.images.clone(),
        );
        Ok(Self {
            inner: Arc::new(ControllerInner {
                page,
                config,
                host,
                session: PageSession::new(),
                renderer,
                next_id: AtomicU64::new(0),
                in_flight: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn page(&self) -> &Page {
        &self.inner.page
    }

    pub fn config(&self) -> &ShareConfig {
        &self.inner.config
    }

    pub fn session(&self) -> &PageSession {
        &self.inner.session
    }

    /// Start the feed watcher. Only the first call per session does anything;
    /// later calls return false. Must be called within a tokio runtime.
    pub fn install(&self) -> bool {
        let session = &self.inner.session;
        if !session.try_install() {
            debug!("share pipeline already installed");
            return false;
        }
        info!("installing share pipeline");
        let watcher = Watcher::new(
            self.inner.page.clone(),
            self.inner.config.clone(),
            self.trigger(),
            session.cancellation().clone(),
        );
        let handle = tokio::spawn(async move {
            match watcher.run().await {
                Ok(()) | Err(Error::Cancelled) => debug!("feed watcher stopped"),
                Err(e) => warn!("feed watcher gave up: {}", e),
            }
        });
        session.set_watcher(handle);
        true
    }

    /// Stop watching. Attached controls stay in the page.
    pub fn shutdown(&self) {
        self.inner.session.shutdown();
    }

    /// Share controls hold only a weak reference, so a dropped controller
    /// leaves inert buttons rather than keeping itself alive.
    fn trigger(&self) -> ShareTrigger {
        let weak = Arc::downgrade(&self.inner);
        Arc::new(move |post| {
            if let Some(inner) = weak.upgrade() {
                ShareController { inner }.spawn_share(post);
            }
        })
    }

    /// Run a share action for `post` as a background task
    pub fn spawn_share(&self, post: NodeId) {
        let controller = self.clone();
        let handle = tokio::spawn(async move { controller.share(post).await });
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(handle);
    }

    /// Wait for every spawned share action, including ones started while
    /// waiting, and return their reports in start order.
    pub async fn settle_actions(&self) -> Vec<ShareReport> {
        let mut reports = Vec::new();
        loop {
            let handles: Vec<_> = std::mem::take(
                &mut *self
                    .inner
                    .in_flight
                    .lock()
                    .unwrap_or_else(|e| e.into_inner()),
            );
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                match handle.await {
                    Ok(report) => reports.push(report),
                    Err(e) => error!("share task failed to complete: {}", e),
                }
            }
        }
        reports.sort_by_key(|r| r.id);
        reports
    }

    /// Run one share action to completion
    pub async fn share(&self, post: NodeId) -> ShareReport {
        let inner = &self.inner;
        let id = inner.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let mut trail = Trail::new(id);
        let report = |trail: Trail, outcome| ShareReport {
            id,
            post,
            trail: trail.states,
            outcome,
        };

        trail.enter(ShareState::Extracting);
        let extracted = match extract(&inner.page, post, &inner.config).await {
            Ok(p) => p,
            Err(e) => {
                warn!("share #{}: extraction failed for post {}: {}", id, post, e);
                trail.enter(ShareState::ExtractionFailed);
                self.notify(NoticeKind::ExtractionIncomplete, &inner.config.labels.extraction_notice);
                return report(trail, ShareOutcome::ExtractionFailed(e));
            }
        };

        trail.enter(ShareState::Rendering);
        let presented = match inner.renderer.render(&inner.page, &extracted).await {
            Ok(image) => ExportOverlay::present(
                &inner.page,
                image,
                &extracted.author_name,
                &inner.config,
                inner.host.clipboard.clone(),
            ),
            Err(e) => Err(e),
        };
        match presented {
            Ok(overlay) => {
                trail.enter(ShareState::Presenting);
                info!("share #{}: card for {} ready", id, extracted.author_name);
                report(trail, ShareOutcome::Presented(overlay))
            }
            Err(e) => {
                error!("share #{}: render failed: {}", id, e);
                trail.enter(ShareState::RenderFailed);
                self.notify(NoticeKind::RenderFailed, &inner.config.labels.render_notice);
                report(trail, ShareOutcome::RenderFailed(e))
            }
        }
    }

    fn notify(&self, kind: NoticeKind, message: &str) {
        self.inner.host.notifier.notify(&Notice::new(kind, message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_follow_the_lifecycle() {
        use ShareState::*;
        let happy = [Idle, Extracting, Rendering, Presenting, Dismissed];
        for pair in happy.windows(2) {
            assert_eq!(pair[0].advance(pair[1]).unwrap(), pair[1]);
        }
        assert!(Extracting.advance(ExtractionFailed).is_ok());
        assert!(Rendering.advance(RenderFailed).is_ok());

        assert!(Idle.advance(Rendering).is_err());
        assert!(ExtractionFailed.advance(Rendering).is_err());
        assert!(Dismissed.advance(Presenting).is_err());
        assert!(Presenting.advance(RenderFailed).is_err());
        assert!(Dismissed.is_terminal() && !Presenting.is_terminal());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let page = Page::from_html("<body></body>", None).unwrap();
        let config = ShareConfig {
            card_width: 0,
            ..ShareConfig::default()
        };
        assert!(ShareController::new(page, config, HostServices::noop()).is_err());
    }
}
