//! Per-page session state: the install-once guard and the watcher's lifetime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tokio::task::JoinHandle;

use crate::wait::Cancellation;

/// Owned by the controller. Installation succeeds at most once per session.
#[derive(Default)]
pub struct PageSession {
    installed: AtomicBool,
    cancel: Cancellation,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl PageSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip the installed flag. Returns false if the pipeline was already installed.
    pub fn try_install(&self) -> bool {
        self.installed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::SeqCst)
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.cancel
    }

    pub(crate) fn set_watcher(&self, handle: JoinHandle<()>) {
        *self.watcher.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    /// Whether a watcher task was started and has not finished
    pub fn watcher_running(&self) -> bool {
        self.watcher
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Stop the watcher and any pending readiness wait. The installed flag
    /// stays set: a session never installs twice.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.watcher.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
        }
    }
}
