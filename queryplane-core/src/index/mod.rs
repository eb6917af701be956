//! Index capability consumed by the query service
//!
//! The service never builds indexes itself. Anything implementing [`Index`]
//! can be registered; from then on the worker thread owns it, which is why
//! mutations take `&mut self` and no implementation needs internal locking.
//!
//! [`BTreeIndex`] is an ordered reference implementation.

pub mod btree;

pub use btree::{BTreeIndex, IndexStats};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered mapping from a normalized `i64` key to the records holding it
pub trait Index<R>: Send {
    /// Index name
    fn name(&self) -> &str;

    /// Add `record` under `key`
    fn insert(&mut self, key: i64, record: R);

    /// Move `record` from `old_key` to `new_key`
    fn update(&mut self, old_key: i64, new_key: i64, record: R);

    /// Remove `record` from `key`, returning whether it was present
    fn remove(&mut self, key: i64, record: &R) -> bool;

    /// Records stored under exactly `key`
    fn lookup_exact(&self, key: i64) -> Vec<R>;

    /// Records with `from <= key <= to`
    fn lookup_range(&self, from: i64, to: i64) -> Vec<R>;

    /// Records on one side of `bound`.
    ///
    /// `below` selects keys less than the bound, otherwise keys greater than
    /// it; `inclusive` adds the records stored at the bound itself.
    fn lookup_open(&self, inclusive: bool, below: bool, bound: i64) -> Vec<R>;

    /// Number of indexed records
    fn len(&self) -> usize;

    /// Check if the index holds no records
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle to an index registered with a query service
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IndexId(u64);

impl IndexId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw handle value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for IndexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "idx#{}", self.0)
    }
}
