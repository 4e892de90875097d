//! User-visible notices for failed share actions

use std::fmt;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    ExtractionIncomplete,
    RenderFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn new(kind: NoticeKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: &Notice);
}

/// Writes notices to the log
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: &Notice) {
        log::warn!("{:?}: {}", notice.kind, notice.message);
    }
}

/// Keeps notices in memory for inspection
#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: &Notice) {
        self.notices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(notice.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_notifier_keeps_order() {
        let n = RecordingNotifier::new();
        n.notify(&Notice::new(NoticeKind::ExtractionIncomplete, "a"));
        n.notify(&Notice::new(NoticeKind::RenderFailed, "b"));
        let got = n.notices();
        assert_eq!(got.len(), 2);
        assert_eq!(got[1].to_string(), "b");
    }
}
