// Copyright 2026 RangeStore Project Authors. Licensed under Apache-2.0.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

/// A minimal cancelable context with an optional deadline.
///
/// Every RPC carries a caller context and every region carries a lifetime
/// context; dispatcher awaits race against them via [`Context::done`].
#[derive(Debug, Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

#[derive(Debug)]
struct ContextInner {
    canceled: AtomicBool,
    notify: Notify,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Context {
        Context::build(None)
    }

    /// A context cancelled through the returned handle.
    pub fn with_cancel() -> (Context, CancelHandle) {
        let ctx = Context::build(None);
        let cancel = CancelHandle {
            inner: ctx.inner.clone(),
        };
        (ctx, cancel)
    }

    /// A context that expires after `timeout`, or earlier through the handle.
    pub fn with_timeout(timeout: Duration) -> (Context, CancelHandle) {
        let ctx = Context::build(Some(Instant::now() + timeout));
        let cancel = CancelHandle {
            inner: ctx.inner.clone(),
        };
        (ctx, cancel)
    }

    fn build(deadline: Option<Instant>) -> Context {
        Context {
            inner: Arc::new(ContextInner {
                canceled: AtomicBool::new(false),
                notify: Notify::new(),
                deadline,
            }),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Whether the context has been cancelled or its deadline has passed.
    pub fn is_done(&self) -> bool {
        if self.inner.canceled.load(Ordering::Acquire) {
            return true;
        }
        self.inner
            .deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Completes once the context is cancelled or its deadline passes.
    pub async fn done(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        // Register before re-checking the flag so a concurrent cancel cannot
        // slip between the check and the await.
        notified.as_mut().enable();
        if self.inner.canceled.load(Ordering::Acquire) {
            return;
        }
        match self.inner.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = notified => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => notified.await,
        }
    }
}

/// Cancels the [`Context`] it was created with.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    inner: Arc<ContextInner>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        if !self.inner.canceled.swap(true, Ordering::AcqRel) {
            self.inner.notify.notify_waiters();
        }
    }
}
