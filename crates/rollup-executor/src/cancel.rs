// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cooperative cancellation for a running execution (§4.7, §5).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Why an execution was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancellationReason {
    UserRequested,
    Timeout,
    SystemShutdown,
}

impl CancellationReason {
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::UserRequested => "cancelled by user request",
            Self::Timeout => "cancelled due to timeout",
            Self::SystemShutdown => "cancelled because the executor is shutting down",
        }
    }
}

struct TokenInner {
    cancelled: AtomicBool,
    reason: std::sync::Mutex<Option<CancellationReason>>,
    notify: Notify,
}

/// A cloneable, cheaply-shareable token checked at phase boundaries and
/// inside bounded loops. All clones observe the same cancellation.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self { inner: Arc::new(TokenInner { cancelled: AtomicBool::new(false), reason: std::sync::Mutex::new(None), notify: Notify::new() }) }
    }

    /// Signal cancellation with a reason. Only the first reason is kept;
    /// idempotent to call more than once.
    pub fn cancel(&self, reason: CancellationReason) {
        {
            let mut guard = self.inner.reason.lock().expect("cancellation reason lock poisoned");
            if guard.is_none() {
                *guard = Some(reason);
            }
        }
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn reason(&self) -> Option<CancellationReason> {
        *self.inner.reason.lock().expect("cancellation reason lock poisoned")
    }

    /// Resolves once [`cancel`](Self::cancel) has been called; resolves
    /// immediately if already cancelled.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        loop {
            self.inner.notify.notified().await;
            if self.is_cancelled() {
                return;
            }
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_reason_sticks() {
        let token = CancellationToken::new();
        token.cancel(CancellationReason::Timeout);
        token.cancel(CancellationReason::UserRequested);
        assert_eq!(token.reason(), Some(CancellationReason::Timeout));
    }

    #[test]
    fn clone_shares_state() {
        let a = CancellationToken::new();
        let b = a.clone();
        a.cancel(CancellationReason::UserRequested);
        assert!(b.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_future_resolves_after_cancel() {
        let token = CancellationToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });
        token.cancel(CancellationReason::Timeout);
        handle.await.unwrap();
    }
}
