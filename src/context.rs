//! Request-scoped cancellation.
//!
//! A [`Context`] is the cancellation handle threaded through
//! [`Params`](crate::server::Params) on the server and offered to
//! context-aware executors on the client. Clones share the same state, so
//! a handle can be passed freely into spawned work; the server cancels the
//! request's context when the handler returns.

use std::sync::Arc;

use tokio::sync::watch;

/// A cloneable cancellation handle.
#[derive(Clone, Debug)]
pub struct Context {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl Context {
    /// A fresh, uncancelled context.
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Context {
            sender: Arc::new(sender),
            receiver,
        }
    }

    /// Cancel the context. Every clone observes the cancellation.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// Whether the context has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once the context is cancelled.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        while !*receiver.borrow_and_update() {
            if receiver.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_is_observed_by_clones() {
        let ctx = Context::new();
        let clone = ctx.clone();
        assert!(!clone.is_cancelled());

        ctx.cancel();
        assert!(clone.is_cancelled());
        clone.cancelled().await;
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let ctx = Context::new();
        let waiter = ctx.clone();
        let task = tokio::spawn(async move { waiter.cancelled().await });
        ctx.cancel();
        task.await.unwrap();
    }

    #[test]
    fn test_new_context_is_not_cancelled() {
        assert!(!Context::new().is_cancelled());
    }
}
