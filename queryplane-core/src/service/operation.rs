//! Units of work executed by the query worker

use crate::index::{Index, IndexId};
use crate::query::{PlanSummary, Predicate};
use crossbeam::channel::Sender;
use std::collections::HashMap;
use std::sync::Arc;

/// One queued operation, consumed exactly once by the worker
pub(crate) enum Operation<R> {
    RegisterIndex {
        id: IndexId,
        index: Box<dyn Index<R>>,
    },
    DropIndex {
        id: IndexId,
    },
    Insert {
        index: IndexId,
        key: i64,
        record: R,
    },
    Update {
        index: IndexId,
        old_key: i64,
        new_key: i64,
        record: R,
    },
    Remove {
        index: IndexId,
        key: i64,
        record: R,
    },
    Query {
        records: Vec<R>,
        scope: IndexScope,
        predicate: Arc<dyn Predicate<R>>,
        reply: Sender<Vec<R>>,
    },
    Explain {
        records: Vec<R>,
        scope: IndexScope,
        predicate: Arc<dyn Predicate<R>>,
        reply: Sender<PlanSummary>,
    },
    Shutdown,
}

impl<R> Operation<R> {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Operation::RegisterIndex { .. } => "register_index",
            Operation::DropIndex { .. } => "drop_index",
            Operation::Insert { .. } => "insert",
            Operation::Update { .. } => "update",
            Operation::Remove { .. } => "remove",
            Operation::Query { .. } => "query",
            Operation::Explain { .. } => "explain",
            Operation::Shutdown => "shutdown",
        }
    }
}

/// Name to index mapping visible to one query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexScope {
    names: Arc<HashMap<String, IndexId>>,
}

impl IndexScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`IndexScope::insert`]
    pub fn with(mut self, name: impl Into<String>, id: IndexId) -> Self {
        self.insert(name, id);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, id: IndexId) -> Option<IndexId> {
        Arc::make_mut(&mut self.names).insert(name.into(), id)
    }

    pub fn remove(&mut self, name: &str) -> Option<IndexId> {
        Arc::make_mut(&mut self.names).remove(name)
    }

    pub fn get(&self, name: &str) -> Option<IndexId> {
        self.names.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
