//! Serialized query service
//!
//! Every index mutation and every query evaluation is packaged as a unit of
//! work and executed by one dedicated worker thread in admission order:
//! - mutations are fire-and-forget
//! - queries block the caller on a single-slot reply channel
//!
//! Cancellation never raises across a blocking call. A query whose admission
//! or reply wait is interrupted yields an empty result; use the `try_`
//! variants to tell "no data" from "cancelled".

pub mod context;
pub(crate) mod operation;
mod worker;

pub use context::ServiceContext;
pub use operation::IndexScope;

use crate::config::{QueryServiceConfig, ServiceSettings};
use crate::error::{QueryServiceError, Result};
use crate::index::{Index, IndexId};
use crate::monitoring::{MetricsSnapshot, ServiceMetrics, SlowQuery, SlowQueryLogger};
use crate::query::{PlanSummary, Predicate, QueryPlanner};
use crate::value::{normalize, Value};
use crossbeam::channel::{self, Receiver, Sender};
use operation::Operation;
use parking_lot::{Mutex, RwLock};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{error, info, warn};
use worker::{Control, Worker};

/// Handle to a running query service.
///
/// Clones share the same queue and worker.
pub struct QueryService<R> {
    inner: Arc<Inner<R>>,
}

struct Inner<R> {
    /// Taken on shutdown; admission fails once it is gone
    work_tx: RwLock<Option<Sender<Operation<R>>>>,
    control_tx: Sender<Control>,
    next_index_id: AtomicU64,
    context: ServiceContext,
    settings: ServiceSettings,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<R> Clone for QueryService<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R> QueryService<R>
where
    R: Clone + Eq + Hash + Send + 'static,
{
    /// Start a service with default configuration
    pub fn start_default(node_name: impl Into<String>) -> Result<Self> {
        Self::start(ServiceContext::new(node_name), &QueryServiceConfig::default())
    }

    /// Validate `config` and spawn the worker thread.
    ///
    /// The slow-query log of `context` is rebuilt from `config.logging`.
    pub fn start(context: ServiceContext, config: &QueryServiceConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| QueryServiceError::Config(e.to_string()))?;

        let context =
            context.with_slow_query_logger(SlowQueryLogger::from_settings(&config.logging));

        let (work_tx, work_rx) = match config.service.queue_capacity {
            Some(capacity) => channel::bounded(capacity),
            None => channel::unbounded(),
        };
        let (control_tx, control_rx) = channel::unbounded();

        let planner =
            QueryPlanner::new().with_strict_range_values(config.planner.strict_range_values);
        let worker = Worker::new(
            context.clone(),
            planner,
            work_rx,
            control_rx,
            config.service.interrupt_policy,
        );

        let handle = thread::Builder::new()
            .name(config.service.thread_name.clone())
            .spawn(move || worker.run())?;

        info!(
            node = context.node_name(),
            queue_capacity = ?config.service.queue_capacity,
            "Query service started"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                work_tx: RwLock::new(Some(work_tx)),
                control_tx,
                next_index_id: AtomicU64::new(1),
                context,
                settings: config.service.clone(),
                handle: Mutex::new(Some(handle)),
            }),
        })
    }

    /// Hand an index over to the worker.
    ///
    /// The returned id is valid immediately: any unit admitted after this
    /// call sees the index.
    pub fn register_index<I>(&self, index: I) -> Result<IndexId>
    where
        I: Index<R> + 'static,
    {
        let id = IndexId::new(self.inner.next_index_id.fetch_add(1, Ordering::Relaxed));
        self.admit(Operation::RegisterIndex {
            id,
            index: Box::new(index),
        })?;
        Ok(id)
    }

    /// Remove an index from the worker catalog
    pub fn drop_index(&self, id: IndexId) -> Result<()> {
        self.admit(Operation::DropIndex { id })
    }

    /// Queue adding `record` under the normalized `value`
    pub fn enqueue_index_insert(
        &self,
        index: IndexId,
        value: impl Into<Value>,
        record: R,
    ) -> Result<()> {
        let key = normalize(&value.into());
        self.admit(Operation::Insert { index, key, record })
    }

    /// Queue moving `record` from `old_value` to `new_value`
    pub fn enqueue_index_update(
        &self,
        index: IndexId,
        old_value: impl Into<Value>,
        new_value: impl Into<Value>,
        record: R,
    ) -> Result<()> {
        let old_key = normalize(&old_value.into());
        let new_key = normalize(&new_value.into());
        self.admit(Operation::Update {
            index,
            old_key,
            new_key,
            record,
        })
    }

    /// Queue removing `record` from the normalized `value`
    pub fn enqueue_index_remove(
        &self,
        index: IndexId,
        value: impl Into<Value>,
        record: R,
    ) -> Result<()> {
        let key = normalize(&value.into());
        self.admit(Operation::Remove { index, key, record })
    }

    /// Candidate records for `predicate`, empty if the call was interrupted
    pub fn evaluate_query(
        &self,
        all_records: Vec<R>,
        named_indexes: &IndexScope,
        predicate: Arc<dyn Predicate<R>>,
    ) -> Vec<R> {
        self.try_evaluate_query(all_records, named_indexes, predicate)
            .unwrap_or_default()
    }

    /// Candidate records for `predicate`, blocking until the worker answers
    pub fn try_evaluate_query(
        &self,
        all_records: Vec<R>,
        named_indexes: &IndexScope,
        predicate: Arc<dyn Predicate<R>>,
    ) -> Result<Vec<R>> {
        let (reply_tx, reply_rx) = channel::bounded(1);
        self.admit(Operation::Query {
            records: all_records,
            scope: named_indexes.clone(),
            predicate,
            reply: reply_tx,
        })?;
        self.await_reply(reply_rx)
    }

    /// Exact matches: the candidate set filtered by [`Predicate::test`] on
    /// the calling thread
    pub fn select(
        &self,
        all_records: Vec<R>,
        named_indexes: &IndexScope,
        predicate: Arc<dyn Predicate<R>>,
    ) -> Vec<R> {
        let mut records = self.evaluate_query(all_records, named_indexes, Arc::clone(&predicate));
        records.retain(|record| predicate.test(record));
        records
    }

    /// Plan `predicate` on the worker and report how it was answered
    pub fn explain(
        &self,
        all_records: Vec<R>,
        named_indexes: &IndexScope,
        predicate: Arc<dyn Predicate<R>>,
    ) -> Result<PlanSummary> {
        let (reply_tx, reply_rx) = channel::bounded(1);
        self.admit(Operation::Explain {
            records: all_records,
            scope: named_indexes.clone(),
            predicate,
            reply: reply_tx,
        })?;
        self.await_reply(reply_rx)
    }

    /// Interrupt the worker; what happens next depends on the configured
    /// interrupt policy
    pub fn interrupt(&self) -> Result<()> {
        self.inner
            .control_tx
            .send(Control::Interrupt)
            .map_err(|_| QueryServiceError::AdmissionInterrupted {
                operation: "interrupt",
            })
    }

    /// Stop the worker after every unit admitted so far has executed.
    ///
    /// Admission closes first, so calls on other clones that race with
    /// shutdown either run before the worker stops or fail with
    /// [`QueryServiceError::AdmissionInterrupted`].
    pub fn shutdown(self) -> Result<()> {
        self.inner.close();
        self.inner.join();
        Ok(())
    }

    fn admit(&self, op: Operation<R>) -> Result<()> {
        let kind = op.kind();
        let sent = {
            let work_tx = self.inner.work_tx.read();
            match (work_tx.as_ref(), self.inner.settings.admission_timeout()) {
                (None, _) => false,
                (Some(tx), Some(timeout)) => tx.send_timeout(op, timeout).is_ok(),
                (Some(tx), None) => tx.send(op).is_ok(),
            }
        };

        let metrics = self.inner.context.metrics();
        if sent {
            ServiceMetrics::incr(&metrics.units_enqueued);
            Ok(())
        } else {
            ServiceMetrics::incr(&metrics.admissions_dropped);
            warn!(
                node = self.inner.context.node_name(),
                unit = kind,
                "Unit of work dropped at admission"
            );
            Err(QueryServiceError::AdmissionInterrupted { operation: kind })
        }
    }

    fn await_reply<T>(&self, reply_rx: Receiver<T>) -> Result<T> {
        let received = match self.inner.settings.query_timeout() {
            Some(timeout) => reply_rx.recv_timeout(timeout).ok(),
            None => reply_rx.recv().ok(),
        };

        received.ok_or_else(|| {
            ServiceMetrics::incr(&self.inner.context.metrics().results_interrupted);
            warn!(
                node = self.inner.context.node_name(),
                "Interrupted while waiting for query result"
            );
            QueryServiceError::ResultInterrupted
        })
    }
}

impl<R> QueryService<R> {
    pub fn node_name(&self) -> &str {
        self.inner.context.node_name()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.context.metrics().snapshot()
    }

    /// Recent slow queries, newest first
    pub fn slow_queries(&self, limit: usize) -> Vec<SlowQuery> {
        self.inner.context.slow_queries().get_slow_queries(limit)
    }

    /// Whether the worker thread is still running
    pub fn is_running(&self) -> bool {
        self.inner
            .handle
            .lock()
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }
}

impl<R> Inner<R> {
    /// Close admission and queue the final `Shutdown` unit behind everything
    /// already admitted
    fn close(&self) {
        let Some(work_tx) = self.work_tx.write().take() else {
            return;
        };
        // Fails only if the worker is already gone
        if work_tx.send(Operation::Shutdown).is_ok() {
            ServiceMetrics::incr(&self.context.metrics().units_enqueued);
        }
    }

    fn join(&self) {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!(node = self.context.node_name(), "Query worker terminated abnormally");
            }
        }
    }
}

impl<R> Drop for Inner<R> {
    fn drop(&mut self) {
        self.close();
        self.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InterruptPolicy;
    use crate::index::BTreeIndex;
    use crate::query::{FieldPredicate, FnPredicate, RangeDescriptor};
    use std::time::Duration;

    fn age_of(record: &u32) -> Option<Value> {
        Some(Value::Int64(*record as i64))
    }

    fn age_service() -> (QueryService<u32>, IndexScope) {
        let service = QueryService::start_default("test-node").unwrap();
        let id = service.register_index(BTreeIndex::new("age")).unwrap();
        for age in [20u32, 25, 30] {
            service.enqueue_index_insert(id, age as i64, age).unwrap();
        }
        (service, IndexScope::new().with("age", id))
    }

    #[test]
    fn test_query_sees_prior_mutations() {
        let (service, scope) = age_service();
        let predicate = Arc::new(FieldPredicate::range(
            "age",
            RangeDescriptor::greater_equal(25),
            age_of,
        ));

        let mut result = service.evaluate_query(vec![20, 25, 30], &scope, predicate);
        result.sort();
        assert_eq!(result, vec![25, 30]);
        service.shutdown().unwrap();
    }

    #[test]
    fn test_select_applies_full_predicate() {
        let (service, scope) = age_service();
        let predicate: Arc<dyn Predicate<u32>> = Arc::new(FnPredicate::new(|r: &u32| *r != 25));

        let mut result = service.select(vec![20, 25, 30], &scope, predicate);
        result.sort();
        assert_eq!(result, vec![20, 30]);
    }

    #[test]
    fn test_explain_reports_full_scan() {
        let (service, scope) = age_service();
        let summary = service
            .explain(vec![20, 25, 30], &scope, Arc::new(FnPredicate::new(|_: &u32| true)))
            .unwrap();
        assert!(summary.full_scan);
        assert_eq!(summary.candidates, 3);
    }

    #[test]
    fn test_calls_after_shutdown_are_interrupted() {
        let (service, scope) = age_service();
        let other = service.clone();
        service.shutdown().unwrap();

        assert!(!other.is_running());
        let err = other
            .try_evaluate_query(vec![1], &scope, Arc::new(FnPredicate::new(|_: &u32| true)))
            .unwrap_err();
        assert!(err.is_cancellation());
        assert!(other
            .evaluate_query(vec![1], &scope, Arc::new(FnPredicate::new(|_: &u32| true)))
            .is_empty());
        assert!(other.enqueue_index_insert(IndexId::new(1), 1, 1).is_err());
        assert!(other.metrics().admissions_dropped >= 3);
    }

    #[test]
    fn test_interrupt_exit_policy_stops_worker() {
        let mut config = QueryServiceConfig::default();
        config.service.interrupt_policy = InterruptPolicy::Exit;
        let service: QueryService<u32> =
            QueryService::start(ServiceContext::new("exit-node"), &config).unwrap();

        service.interrupt().unwrap();
        for _ in 0..100 {
            if !service.is_running() {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert!(!service.is_running());
    }

    #[test]
    fn test_interrupt_continue_policy_keeps_serving() {
        let (service, scope) = age_service();
        service.interrupt().unwrap();

        let result = service.evaluate_query(
            vec![20, 25, 30],
            &scope,
            Arc::new(FieldPredicate::equal("age", 30, age_of)),
        );
        assert_eq!(result, vec![30]);
        assert!(service.is_running());
    }

    #[test]
    fn test_slow_query_threshold_comes_from_config() {
        struct Sleepy;
        impl Predicate<u32> for Sleepy {
            fn test(&self, _: &u32) -> bool {
                true
            }
            fn indexed_predicates(&self) -> Option<Vec<crate::query::IndexedPredicate>> {
                thread::sleep(Duration::from_millis(50));
                None
            }
        }

        let mut config = QueryServiceConfig::default();
        config.logging.slow_query_threshold_ms = 60_000;
        let lenient: QueryService<u32> =
            QueryService::start(ServiceContext::new("lenient"), &config).unwrap();
        lenient.evaluate_query(vec![1], &IndexScope::new(), Arc::new(Sleepy));
        assert!(lenient.slow_queries(10).is_empty());

        config.logging.slow_query_threshold_ms = 10;
        let strict: QueryService<u32> =
            QueryService::start(ServiceContext::new("strict"), &config).unwrap();
        strict.evaluate_query(vec![1], &IndexScope::new(), Arc::new(Sleepy));
        let slow = strict.slow_queries(10);
        assert_eq!(slow.len(), 1);
        assert_eq!(slow[0].node, "strict");
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = QueryServiceConfig::default();
        config.service.queue_capacity = Some(0);
        let result = QueryService::<u32>::start(ServiceContext::new("bad"), &config);
        assert!(matches!(result, Err(QueryServiceError::Config(_))));
    }
}
