//! The single query worker
//!
//! Owns every registered index and executes units of work one at a time in
//! the order they were admitted. Nothing else touches index state, so no
//! index needs a lock.

use super::context::ServiceContext;
use super::operation::{IndexScope, Operation};
use crate::config::InterruptPolicy;
use crate::index::{Index, IndexId};
use crate::monitoring::ServiceMetrics;
use crate::query::{CandidateSet, IndexResolver, Predicate, QueryPlanner};
use crossbeam::channel::{self, select, Receiver};
use std::any::Any;
use std::collections::HashMap;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error, info, info_span, warn};

/// Out-of-band signal delivered ahead of queued work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Control {
    Interrupt,
}

type Catalog<R> = HashMap<IndexId, Box<dyn Index<R>>>;

/// Resolves index names through a query's scope into the worker catalog
struct ScopedCatalog<'a, R> {
    scope: &'a IndexScope,
    catalog: &'a Catalog<R>,
}

impl<R> IndexResolver<R> for ScopedCatalog<'_, R> {
    fn resolve(&self, name: &str) -> Option<&dyn Index<R>> {
        let id = self.scope.get(name)?;
        self.catalog.get(&id).map(|index| index.as_ref())
    }
}

pub(crate) struct Worker<R> {
    context: ServiceContext,
    planner: QueryPlanner,
    catalog: Catalog<R>,
    work_rx: Receiver<Operation<R>>,
    control_rx: Receiver<Control>,
    interrupt_policy: InterruptPolicy,
}

impl<R> Worker<R>
where
    R: Clone + Eq + Hash + Send + 'static,
{
    pub(crate) fn new(
        context: ServiceContext,
        planner: QueryPlanner,
        work_rx: Receiver<Operation<R>>,
        control_rx: Receiver<Control>,
        interrupt_policy: InterruptPolicy,
    ) -> Self {
        Self {
            context,
            planner,
            catalog: HashMap::new(),
            work_rx,
            control_rx,
            interrupt_policy,
        }
    }

    /// Worker loop: runs until a shutdown unit, an interrupt under
    /// [`InterruptPolicy::Exit`], or the last producer going away.
    pub(crate) fn run(mut self) {
        let span = info_span!("query_service", node = %self.context.node_name());
        let _guard = span.enter();
        info!("Query worker started");

        let work_rx = self.work_rx.clone();
        let control_rx = self.control_rx.clone();
        let closed = channel::never();
        let mut control_open = true;

        loop {
            let control = if control_open { &control_rx } else { &closed };
            select! {
                recv(work_rx) -> op => match op {
                    Ok(Operation::Shutdown) => {
                        ServiceMetrics::incr(&self.context.metrics().units_executed);
                        info!("Shutdown unit received, draining admitted units");
                        self.drain();
                        break;
                    }
                    Ok(op) => self.execute(op),
                    Err(_) => {
                        info!("All producers disconnected");
                        break;
                    }
                },
                recv(control) -> signal => match signal {
                    Ok(Control::Interrupt) => match self.interrupt_policy {
                        InterruptPolicy::Continue => {
                            warn!("Query worker interrupted, continuing");
                        }
                        InterruptPolicy::Exit => {
                            warn!("Query worker interrupted, draining admitted units");
                            self.drain();
                            break;
                        }
                    },
                    Err(_) => control_open = false,
                },
            }
        }

        info!(indexes = self.catalog.len(), "Query worker stopped");
    }

    /// Execute whatever is already queued so no admitted unit is lost
    fn drain(&mut self) {
        while let Ok(op) = self.work_rx.try_recv() {
            if let Operation::Shutdown = op {
                ServiceMetrics::incr(&self.context.metrics().units_executed);
                continue;
            }
            self.execute(op);
        }
    }

    /// Run one unit, containing any panic so the loop survives it
    fn execute(&mut self, op: Operation<R>) {
        let kind = op.kind();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.apply(op)));

        let metrics = self.context.metrics();
        ServiceMetrics::incr(&metrics.units_executed);
        if let Err(payload) = outcome {
            ServiceMetrics::incr(&metrics.units_failed);
            error!(
                unit = kind,
                reason = panic_message(payload.as_ref()),
                "Unit of work panicked"
            );
        }
    }

    fn apply(&mut self, op: Operation<R>) {
        match op {
            Operation::RegisterIndex { id, index } => {
                debug!(%id, name = index.name(), "Registering index");
                if self.catalog.insert(id, index).is_some() {
                    warn!(%id, "Replaced an index registered under the same id");
                }
            }
            Operation::DropIndex { id } => match self.catalog.remove(&id) {
                Some(index) => debug!(%id, name = index.name(), "Dropped index"),
                None => debug!(%id, "Drop for unknown index ignored"),
            },
            Operation::Insert { index, key, record } => {
                self.mutate(index, "insert", |idx| idx.insert(key, record));
            }
            Operation::Update {
                index,
                old_key,
                new_key,
                record,
            } => {
                self.mutate(index, "update", |idx| idx.update(old_key, new_key, record));
            }
            Operation::Remove { index, key, record } => {
                self.mutate(index, "remove", |idx| {
                    idx.remove(key, &record);
                });
            }
            Operation::Query {
                records,
                scope,
                predicate,
                reply,
            } => {
                let candidates = self.evaluate(records, &scope, predicate.as_ref());
                if reply.send(candidates.records).is_err() {
                    debug!("Query caller stopped waiting, result discarded");
                }
            }
            Operation::Explain {
                records,
                scope,
                predicate,
                reply,
            } => {
                let candidates = self.evaluate(records, &scope, predicate.as_ref());
                if reply.send(candidates.summary).is_err() {
                    debug!("Explain caller stopped waiting, plan discarded");
                }
            }
            Operation::Shutdown => {}
        }
    }

    fn mutate<F>(&mut self, id: IndexId, kind: &'static str, f: F)
    where
        F: FnOnce(&mut dyn Index<R>),
    {
        let metrics = self.context.metrics();
        match self.catalog.get_mut(&id) {
            Some(index) => {
                f(index.as_mut());
                ServiceMetrics::incr(&metrics.mutations_applied);
            }
            None => {
                ServiceMetrics::incr(&metrics.mutations_unresolved);
                warn!(%id, unit = kind, "Mutation for unregistered index ignored");
            }
        }
    }

    fn evaluate(
        &self,
        records: Vec<R>,
        scope: &IndexScope,
        predicate: &dyn Predicate<R>,
    ) -> CandidateSet<R> {
        let slow_queries = self.context.slow_queries();
        let tracker = slow_queries.start_query();

        let resolver = ScopedCatalog {
            scope,
            catalog: &self.catalog,
        };
        let candidates = self.planner.plan(records, &resolver, predicate);
        let summary = &candidates.summary;

        let metrics = self.context.metrics();
        ServiceMetrics::incr(&metrics.queries_evaluated);
        ServiceMetrics::add(&metrics.index_lookups, summary.contributing.len() as u64);
        ServiceMetrics::add(&metrics.unresolved_terms, summary.unresolved_count() as u64);
        if summary.full_scan {
            ServiceMetrics::incr(&metrics.full_scans);
        }

        debug!(
            terms = summary.terms,
            contributing = ?summary.contributing,
            candidates = summary.candidates,
            full_scan = summary.full_scan,
            "Query planned"
        );
        slow_queries.finish_query(tracker, self.context.node_name(), summary);

        candidates
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
