//! Cancellation and deadlines for a single ingestion run
//!
//! Every collaborator call in a run goes through [`RunContext::guard`], which
//! races the call against the cancel signal and the deadline. Work that
//! already committed before the signal stays committed.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::{Error, Result};

/// Cancels every context cloned from the one that created it
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

#[derive(Debug, Clone)]
pub struct RunContext {
    cancel: watch::Receiver<bool>,
    deadline: Option<Instant>,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::background()
    }
}

impl RunContext {
    /// A context that is never cancelled and has no deadline
    pub fn background() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self {
            cancel: rx,
            deadline: None,
        }
    }

    /// A context plus the handle that cancels it
    pub fn cancellable() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        let ctx = Self {
            cancel: rx,
            deadline: None,
        };
        (ctx, CancelHandle { tx: Arc::new(tx) })
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Fail fast if the run is already cancelled or out of time
    pub fn check(&self, op: &str) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled(op.to_string()));
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(Error::DeadlineExceeded(op.to_string()));
        }
        Ok(())
    }

    /// Run `fut` unless the context is cancelled or the deadline passes first
    pub async fn guard<T, F>(&self, op: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check(op)?;

        let mut cancel = self.cancel.clone();
        let cancelled = async move {
            let closed = cancel.wait_for(|c| *c).await.map(|_| ()).is_err();
            if closed {
                // Sender dropped without cancelling: never fires
                std::future::pending::<()>().await;
            }
        };
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => Err(Error::Cancelled(op.to_string())),
            _ = expired => Err(Error::DeadlineExceeded(op.to_string())),
            result = fut => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_guard_passes_result_through() {
        let ctx = RunContext::background();
        let value = ctx.guard("op", async { Ok(42) }).await.unwrap();
        assert_eq!(value, 42);

        let err = ctx
            .guard::<(), _>("op", async { Err(Error::Blob("boom".into())) })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Blob(_)));
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let (ctx, handle) = RunContext::cancellable();
        handle.cancel();
        assert!(handle.is_cancelled());
        let err = ctx.guard("download", async { Ok(()) }).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled(op) if op == "download"));
    }

    #[tokio::test]
    async fn test_cancel_while_waiting() {
        let (ctx, handle) = RunContext::cancellable();
        let clone = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            handle.cancel();
        });
        let err = clone
            .guard("persist", async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled(_)));
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_deadline_exceeded() {
        let ctx = RunContext::background().with_timeout(Duration::from_millis(20));
        let err = ctx
            .guard("notify", async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DeadlineExceeded(op) if op == "notify"));
        assert!(ctx.check("next").is_err());
    }

    #[test]
    fn test_with_deadline_keeps_earliest() {
        let now = Instant::now();
        let ctx = RunContext::background()
            .with_deadline(now + Duration::from_secs(5))
            .with_deadline(now + Duration::from_secs(60));
        assert_eq!(ctx.deadline(), Some(now + Duration::from_secs(5)));
    }
}
