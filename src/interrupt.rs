//! Cooperative cancellation token.
//!
//! The OS interrupt handler never touches the pipeline directly; it only
//! flips an [`InterruptToken`]. The warden checks the token between
//! middleware, and long-running middleware can poll
//! [`InterruptToken::is_interrupted`] or await [`InterruptToken::cancelled`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Shared interruption flag. Clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct InterruptToken {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl InterruptToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the token interrupted and wakes every waiter.
    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Completes once the token is interrupted.
    pub async fn cancelled(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent interrupt is not missed.
        notified.as_mut().enable();
        if self.is_interrupted() {
            return;
        }
        notified.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_clones_share_state() {
        let token = InterruptToken::new();
        let clone = token.clone();
        assert!(!clone.is_interrupted());
        token.interrupt();
        assert!(clone.is_interrupted());
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let token = InterruptToken::new();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.interrupt();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_returns_when_already_interrupted() {
        let token = InterruptToken::new();
        token.interrupt();
        token.cancelled().await;
    }
}
