//! Query planning over named indexes
//!
//! Predicates describe which of their terms an index can answer; the
//! planner turns those terms into index lookups and intersects the results.

pub mod planner;
pub mod predicate;

pub use planner::{CandidateSet, IndexResolver, PlanSummary, QueryPlanner, SkipReason, SkippedTerm};
pub use predicate::{
    AndPredicate, Extractor, FieldPredicate, FnPredicate, IndexedPredicate, Predicate,
    RangeDescriptor, RangeKind,
};
