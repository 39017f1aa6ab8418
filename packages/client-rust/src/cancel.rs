//! Cooperative cancellation for source calls.
//!
//! A [`CancelHandle`] owns a `watch` channel; every [`CancelToken`] handed
//! out by it observes the same flag. Dropping the handle without calling
//! [`cancel`](CancelHandle::cancel) leaves its tokens uncancelled forever.

use std::future::Future;

use tokio::sync::watch;

use crate::source::SourceError;

/// Owner side of a cancellation signal.
#[derive(Debug)]
pub struct CancelHandle {
    signal: watch::Sender<bool>,
}

impl CancelHandle {
    /// Creates a handle whose tokens start uncancelled.
    #[must_use]
    pub fn new() -> Self {
        let (signal, _rx) = watch::channel(false);
        Self { signal }
    }

    /// Returns a token observing this handle.
    #[must_use]
    pub fn token(&self) -> CancelToken {
        CancelToken {
            signal: Some(self.signal.subscribe()),
        }
    }

    /// Cancels every token of this handle. Idempotent.
    pub fn cancel(&self) {
        self.signal.send_replace(true);
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer side of a cancellation signal, passed to every source call.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    signal: Option<watch::Receiver<bool>>,
}

impl CancelToken {
    /// A token that is never cancelled.
    #[must_use]
    pub fn never() -> Self {
        Self { signal: None }
    }

    /// Whether the owning handle has cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.signal.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolves once the token is cancelled. Never resolves for
    /// [`never`](Self::never) tokens or after the handle is dropped.
    pub async fn cancelled(&self) {
        let Some(rx) = &self.signal else {
            return std::future::pending().await;
        };
        let mut rx = rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return std::future::pending().await;
            }
        }
    }

    /// Runs `fut` to completion unless the token is cancelled first.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Cancelled`] if cancellation wins; `fut` is
    /// dropped at its current suspension point.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, SourceError> {
        if self.is_cancelled() {
            return Err(SourceError::Cancelled);
        }
        tokio::select! {
            biased;
            () = self.cancelled() => Err(SourceError::Cancelled),
            out = fut => Ok(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn run_completes_when_not_cancelled() {
        let handle = CancelHandle::new();
        let out = handle.token().run(async { 7 }).await.unwrap();
        assert_eq!(out, 7);
    }

    #[tokio::test]
    async fn run_fails_fast_when_already_cancelled() {
        let handle = CancelHandle::new();
        let token = handle.token();
        handle.cancel();
        assert!(token.is_cancelled());
        let out = token.run(async { 7 }).await;
        assert!(matches!(out, Err(SourceError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_pending_future() {
        let handle = CancelHandle::new();
        let token = handle.token();
        let task = tokio::spawn(async move {
            token
                .run(tokio::time::sleep(Duration::from_secs(3600)))
                .await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.cancel();
        assert!(matches!(task.await.unwrap(), Err(SourceError::Cancelled)));
    }

    #[test]
    fn never_token_is_not_cancelled() {
        assert!(!CancelToken::never().is_cancelled());
    }
}
