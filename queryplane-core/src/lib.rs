//! Queryplane Core - single-writer query execution for indexed record stores
//!
//! This crate provides:
//! - A serialized query service: one worker thread owns every index and
//!   executes mutations and queries in admission order
//! - A predicate planner that answers indexed terms with equality and range
//!   lookups and intersects the partial results
//! - Value normalization onto the `i64` index key space
//! - Configuration, structured logging and service metrics

pub mod config;
pub mod error;
pub mod index;
pub mod monitoring;
pub mod query;
pub mod service;
pub mod value;

pub use config::{InterruptPolicy, QueryServiceConfig};
pub use error::{QueryServiceError, Result};
pub use index::{BTreeIndex, Index, IndexId};
pub use query::{
    AndPredicate, CandidateSet, FieldPredicate, FnPredicate, IndexedPredicate, PlanSummary,
    Predicate, QueryPlanner, RangeDescriptor, RangeKind,
};
pub use service::{IndexScope, QueryService, ServiceContext};
pub use value::{get_long_value, normalize, Value};
