/// Caller context: a cancellation signal plus an optional deadline
///
/// Operations that can block on the anonymizing network take a `&Context`
/// and stop waiting as soon as it is canceled or its deadline passes. They
/// do not necessarily stop the underlying work.

use oniontransport_common::{ContextError, Result};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

struct Inner {
    cancel: watch::Sender<bool>,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never canceled and has no deadline
    pub fn background() -> Self {
        Self::new(None)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new(Some(Instant::now() + timeout))
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self::new(Some(deadline))
    }

    /// A context canceled along with `self` that keeps its deadline
    ///
    /// Canceling the child leaves the parent live. Must be called from
    /// within a tokio runtime.
    pub fn child(&self) -> Self {
        let child = Self::new(self.inner.deadline);
        if *self.inner.cancel.borrow() {
            child.cancel();
            return child;
        }

        let parent = self.inner.cancel.subscribe();
        let own = child.inner.cancel.subscribe();
        let weak = Arc::downgrade(&child.inner);
        tokio::spawn(async move {
            tokio::select! {
                canceled = wait_for_flag(parent) => {
                    if let (true, Some(inner)) = (canceled, weak.upgrade()) {
                        inner.cancel.send_replace(true);
                    }
                }
                // child canceled on its own or dropped
                _ = wait_for_flag(own) => {}
            }
        });
        child
    }

    fn new(deadline: Option<Instant>) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner { cancel, deadline }),
        }
    }

    /// Cancel this context and every clone of it
    pub fn cancel(&self) {
        self.inner.cancel.send_replace(true);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Why the context is done, or `None` while it is still live
    pub fn err(&self) -> Option<ContextError> {
        if *self.inner.cancel.borrow() {
            return Some(ContextError::Canceled);
        }
        match self.inner.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the context is canceled or its deadline passes
    pub async fn done(&self) -> ContextError {
        if let Some(err) = self.err() {
            return err;
        }

        // the sender lives in `self`, so this only completes on cancel
        let canceled = wait_for_flag(self.inner.cancel.subscribe());

        match self.inner.deadline {
            Some(deadline) => tokio::select! {
                _ = canceled => ContextError::Canceled,
                _ = tokio::time::sleep_until(deadline) => ContextError::DeadlineExceeded,
            },
            None => {
                canceled.await;
                ContextError::Canceled
            }
        }
    }

    /// Await `fut` unless the context finishes first
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            err = self.done() => Err(err.into()),
            res = fut => res,
        }
    }
}

/// Completes once the watched flag is set or its sender is gone, returning
/// whether the flag was set
pub(crate) async fn wait_for_flag(mut rx: watch::Receiver<bool>) -> bool {
    loop {
        if *rx.borrow_and_update() {
            return true;
        }
        if rx.changed().await.is_err() {
            return false;
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("deadline", &self.inner.deadline)
            .field("err", &self.err())
            .finish()
    }
}
