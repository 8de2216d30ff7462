//! One unit of work per transaction, tolerant of serialization conflicts

use crate::error::{SchedulerError, SchedulerResult};
use crate::shutdown::Shutdown;
use std::sync::Arc;
use wms_metrics::{names, timed, WorkerMetrics};
use wms_store::{Store, Transaction};

/// What happened to a unit of work
#[derive(Debug, PartialEq, Eq)]
pub enum UnitOutcome<T> {
    /// Work succeeded and its transaction committed
    Committed(T),
    /// Lost a race to a concurrent transaction; nothing was applied
    Retry,
    /// Failed for another reason; logged and rolled back
    Skipped,
}

impl<T> UnitOutcome<T> {
    /// The committed value, if any
    pub fn committed(self) -> Option<T> {
        match self {
            UnitOutcome::Committed(value) => Some(value),
            _ => None,
        }
    }
}

/// Runs units of work in fresh transactions
///
/// Every unit either commits entirely or leaves no trace. Conflicts bump the
/// worker's `conflicts` counter without logging above debug; other failures
/// are logged and counted as `errors`. Cancellation rolls back first, then
/// surfaces as `Err(Cancelled)`.
#[derive(Clone, Debug)]
pub struct ConflictRetryLoop {
    store: Store,
    metrics: Arc<WorkerMetrics>,
    shutdown: Shutdown,
}

impl ConflictRetryLoop {
    /// Create a loop for one worker
    pub fn new(store: Store, metrics: Arc<WorkerMetrics>, shutdown: Shutdown) -> Self {
        Self {
            store,
            metrics,
            shutdown,
        }
    }

    /// Store the loop opens transactions on
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Metrics of the owning worker
    pub fn metrics(&self) -> &Arc<WorkerMetrics> {
        &self.metrics
    }

    /// Shutdown receiver of the owning worker
    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    /// Run `work` in a fresh transaction and commit it
    ///
    /// `context` names the unit in logs.
    pub fn run<T, F>(&self, context: &str, work: F) -> SchedulerResult<UnitOutcome<T>>
    where
        F: FnOnce(&mut Transaction) -> SchedulerResult<T>,
    {
        self.shutdown.check()?;
        let mut txn = self.store.begin();
        let result = timed!(self.metrics, names::UNIT_MS, { work(&mut txn) });

        if self.shutdown.is_triggered() {
            txn.rollback();
            return Err(SchedulerError::Cancelled);
        }

        match result {
            Ok(value) => match txn.commit() {
                Ok(_) => Ok(UnitOutcome::Committed(value)),
                Err(e) => Ok(self.on_failure(context, e.into())),
            },
            Err(SchedulerError::Cancelled) => {
                txn.rollback();
                Err(SchedulerError::Cancelled)
            }
            Err(e) => {
                txn.rollback();
                Ok(self.on_failure(context, e))
            }
        }
    }

    fn on_failure<T>(&self, context: &str, err: SchedulerError) -> UnitOutcome<T> {
        match err {
            SchedulerError::SerializationConflict(key) => {
                self.metrics.incr(names::CONFLICTS);
                tracing::debug!(context, %key, "serialization conflict, will retry");
                UnitOutcome::Retry
            }
            SchedulerError::PreconditionNotMet { .. } => {
                self.metrics.incr(names::ERRORS);
                tracing::warn!(context, error = %err, "skipping");
                UnitOutcome::Skipped
            }
            other => {
                self.metrics.incr(names::ERRORS);
                tracing::error!(context, error = %other, "unit of work failed");
                UnitOutcome::Skipped
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown::ShutdownHandle;
    use wms_domain::{Location, LocationId};
    use wms_store::RowKey;

    fn retry_loop(store: &Store, shutdown: Shutdown) -> ConflictRetryLoop {
        ConflictRetryLoop::new(
            store.clone(),
            Arc::new(WorkerMetrics::new("regular", 1)),
            shutdown,
        )
    }

    fn insert_location(store: &Store, code: &str) -> LocationId {
        let mut txn = store.begin();
        let id = txn.allocate::<Location>();
        txn.insert(Location { id, code: code.into() }).unwrap();
        txn.commit().unwrap();
        id
    }

    #[test]
    fn test_success_commits() {
        let store = Store::new();
        let runner = retry_loop(&store, Shutdown::never());
        let outcome = runner
            .run("insert", |txn| {
                let id = txn.allocate::<Location>();
                txn.insert(Location { id, code: "stock".into() })?;
                Ok(id)
            })
            .unwrap();

        let id = outcome.committed().unwrap();
        assert!(store.begin().get::<Location>(id).unwrap().is_some());
    }

    #[test]
    fn test_conflict_in_work_reports_retry() {
        let store = Store::new();
        let id = insert_location(&store, "stock");
        let runner = retry_loop(&store, Shutdown::never());

        // Another transaction holds the row
        let mut other = store.begin();
        assert!(other.try_lock::<Location>(id).unwrap());

        let outcome = runner
            .run("update", |txn| {
                let mut loc = txn.fetch::<Location>(id)?;
                loc.code = "attic".into();
                txn.update(&loc)?;
                Ok(())
            })
            .unwrap();
        assert_eq!(outcome, UnitOutcome::Retry);
        assert_eq!(runner.metrics().counter(names::CONFLICTS), 1);
        assert_eq!(runner.metrics().counter(names::ERRORS), 0);
        other.rollback();

        // Retrying with a fresh snapshot succeeds and applies exactly once
        let outcome = runner
            .run("update", |txn| {
                let mut loc = txn.fetch::<Location>(id)?;
                loc.code = format!("{}-moved", loc.code);
                txn.update(&loc)?;
                Ok(())
            })
            .unwrap();
        assert_eq!(outcome, UnitOutcome::Committed(()));
        assert_eq!(store.begin().fetch::<Location>(id).unwrap().code, "stock-moved");
    }

    #[test]
    fn test_conflict_on_newer_row_reports_retry() {
        let store = Store::new();
        let id = insert_location(&store, "stock");
        let runner = retry_loop(&store, Shutdown::never());

        let outcome = runner
            .run("stale read", |txn| {
                let loc = txn.fetch::<Location>(id)?;
                // Concurrent writer commits between our read and our write
                let mut other = store.begin();
                let mut theirs = loc.clone();
                theirs.code = "theirs".into();
                other.update(&theirs).unwrap();
                other.commit().unwrap();
                txn.update(&loc)?;
                Ok(())
            })
            .unwrap();
        assert_eq!(outcome, UnitOutcome::Retry);
        assert_eq!(store.begin().fetch::<Location>(id).unwrap().code, "theirs");
    }

    #[test]
    fn test_other_error_skips_and_rolls_back() {
        let store = Store::new();
        let runner = retry_loop(&store, Shutdown::never());
        let outcome: UnitOutcome<()> = runner
            .run("broken", |txn| {
                let id = txn.allocate::<Location>();
                txn.insert(Location { id, code: "ghost".into() })?;
                Err(SchedulerError::Unclassified("boom".into()))
            })
            .unwrap();

        assert_eq!(outcome, UnitOutcome::Skipped);
        assert_eq!(runner.metrics().counter(names::ERRORS), 1);
        assert!(store.begin().scan::<Location>().unwrap().is_empty());
        assert_eq!(store.locked_rows(), 0);
    }

    #[test]
    fn test_cancelled_before_start() {
        let store = Store::new();
        let handle = ShutdownHandle::new();
        let runner = retry_loop(&store, handle.subscribe());
        handle.trigger();

        let mut ran = false;
        let result = runner.run("never", |_| {
            ran = true;
            Ok(())
        });
        assert!(matches!(result, Err(SchedulerError::Cancelled)));
        assert!(!ran);
    }

    #[test]
    fn test_cancelled_during_work_rolls_back() {
        let store = Store::new();
        let id = insert_location(&store, "stock");
        let handle = ShutdownHandle::new();
        let runner = retry_loop(&store, handle.subscribe());

        let result = runner.run("interrupted", |txn| {
            let mut loc = txn.fetch::<Location>(id)?;
            loc.code = "half-done".into();
            txn.update(&loc)?;
            handle.trigger();
            Ok(())
        });

        assert!(matches!(result, Err(SchedulerError::Cancelled)));
        assert_eq!(store.begin().fetch::<Location>(id).unwrap().code, "stock");
        assert_eq!(store.lock_holder(&RowKey::of::<Location>(id)), None);
    }
}
