//! Polling helpers used while a test step waits on the IUT or an operator.
//!
//! Waiting is timeout-based only: when the deadline passes the helper
//! returns a negative result and the caller decides what that means.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

/// Poll interval of [`wait_for`].
pub const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Poll `predicate` every 250 ms until it holds or `timeout` expires.
///
/// Returns `false` after expiry; there is no retry.
pub async fn wait_for<F>(timeout: Duration, mut predicate: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if predicate() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(WAIT_POLL_INTERVAL).await;
    }
}

/// Single-slot answer source for prompts that cannot be answered
/// immediately.
///
/// Anything holding a clone (an event handler, an operator console) may
/// [`set`](PendingResponse::set) the answer; the test case engine
/// [`take`](PendingResponse::take)s it while waiting.
#[derive(Debug, Clone, Default)]
pub struct PendingResponse {
    slot: Arc<Mutex<Option<String>>>,
}

impl PendingResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the answer, replacing any earlier one.
    pub fn set(&self, response: impl Into<String>) {
        *self.lock() = Some(response.into());
    }

    /// Remove and return the stored answer.
    pub fn take(&self) -> Option<String> {
        self.lock().take()
    }

    pub fn is_set(&self) -> bool {
        self.lock().is_some()
    }

    /// Poll once per `interval` until an answer arrives or `timeout`
    /// expires.
    pub async fn wait(&self, timeout: Duration, interval: Duration) -> Option<String> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(response) = self.take() {
                return Some(response);
            }
            if Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(interval).await;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_succeeds_after_polls() {
        let polls = AtomicU32::new(0);
        let ok = wait_for(Duration::from_secs(5), || {
            polls.fetch_add(1, Ordering::SeqCst) >= 3
        })
        .await;
        assert!(ok);
        assert_eq!(polls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_expires() {
        let start = Instant::now();
        assert!(!wait_for(Duration::from_secs(1), || false).await);
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_pending_response_take_once() {
        let pending = PendingResponse::new();
        assert!(!pending.is_set());

        pending.set("OK");
        pending.clone().set("Cancel");
        assert!(pending.is_set());
        assert_eq!(pending.take().as_deref(), Some("Cancel"));
        assert_eq!(pending.take(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_response_wait() {
        let pending = PendingResponse::new();
        let setter = pending.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            setter.set("1234");
        });

        let got = pending
            .wait(Duration::from_secs(90), Duration::from_secs(1))
            .await;
        assert_eq!(got.as_deref(), Some("1234"));

        let start = Instant::now();
        let got = pending
            .wait(Duration::from_secs(90), Duration::from_secs(1))
            .await;
        assert_eq!(got, None);
        assert!(start.elapsed() >= Duration::from_secs(90));
    }
}
