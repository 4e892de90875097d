//! Readiness waits: timed retries, condition-or-timeout polling, cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use crate::{Error, Result};

/// How often and how many times to probe for readiness
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    /// `None` retries until cancelled
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub fn forever(interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: None,
        }
    }

    pub fn attempts(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: Some(max_attempts),
        }
    }
}

/// Cloneable cancellation token
#[derive(Clone, Default)]
pub struct Cancellation {
    inner: Arc<CancelInner>,
}

#[derive(Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel` has been called
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Probe immediately, then once per interval, until `probe` yields a value.
pub async fn retry_until<T, F>(policy: RetryPolicy, cancel: &Cancellation, mut probe: F) -> Result<T>
where
    F: FnMut() -> Option<T>,
{
    let mut attempts = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        attempts += 1;
        if let Some(value) = probe() {
            return Ok(value);
        }
        if policy.max_attempts.is_some_and(|max| attempts >= max) {
            return Err(Error::NotReady { attempts });
        }
        log::trace!("not ready after attempt {}, retrying in {:?}", attempts, policy.interval);
        tokio::select! {
            _ = tokio::time::sleep(policy.interval) => {}
            _ = cancel.cancelled() => return Err(Error::Cancelled),
        }
    }
}

/// Poll `condition` until it holds or `timeout` elapses. Returns whether it held.
pub async fn wait_for<F>(mut condition: F, timeout: Duration, poll: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        let now = tokio::time::Instant::now();
        if now >= deadline {
            return false;
        }
        tokio::time::sleep(poll.min(deadline - now)).await;
    }
}

/// Fixed settle delay used where the host exposes no completion signal
pub async fn settle(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
