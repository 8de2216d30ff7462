//! Cooperative cancellation
//!
//! A [`ShutdownHandle`] flips a watch channel; every [`Shutdown`] observing
//! it sees the flag at its next check point.

use crate::error::{SchedulerError, SchedulerResult};
use tokio::sync::watch;

/// Sending side, held by the launcher
#[derive(Debug)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    /// New handle, not triggered
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// A receiver for one worker
    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            rx: self.tx.subscribe(),
        }
    }

    /// Ask every worker to stop
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Whether [`trigger`](Self::trigger) was called
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side, cloned into each worker
#[derive(Clone, Debug)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// A receiver that never triggers
    pub fn never() -> Self {
        let (_, rx) = watch::channel(false);
        Self { rx }
    }

    /// Whether shutdown was requested
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// `Err(Cancelled)` once shutdown was requested
    pub fn check(&self) -> SchedulerResult<()> {
        if self.is_triggered() {
            Err(SchedulerError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolve when shutdown is requested; pending forever if it never can be
    pub async fn wait(&mut self) {
        if self.rx.wait_for(|stop| *stop).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_trigger_reaches_subscribers() {
        let handle = ShutdownHandle::new();
        let a = handle.subscribe();
        let b = a.clone();
        assert!(a.check().is_ok());

        handle.trigger();
        assert!(handle.is_triggered());
        assert!(matches!(a.check(), Err(SchedulerError::Cancelled)));
        assert!(b.is_triggered());
    }

    #[test]
    fn test_never_stays_clear() {
        let shutdown = Shutdown::never();
        assert!(!shutdown.is_triggered());
        assert!(shutdown.check().is_ok());
    }

    #[tokio::test]
    async fn test_wait_resolves_on_trigger() {
        let handle = ShutdownHandle::new();
        let mut shutdown = handle.subscribe();
        let waiter = tokio::spawn(async move { shutdown.wait().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.trigger();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_pends_without_sender() {
        let mut shutdown = Shutdown::never();
        let result = tokio::time::timeout(Duration::from_millis(20), shutdown.wait()).await;
        assert!(result.is_err());
    }
}
