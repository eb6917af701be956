//! Query planner for pruning candidate records with indexes
//!
//! Walks the indexed terms of a predicate, looks each one up in its named
//! index and intersects the partial results. When no term can be answered by
//! an index the whole record collection is the candidate set.
//!
//! The result is a candidate set, not a final answer: terms without an index
//! are not applied here, so callers still run [`Predicate::test`] on every
//! candidate.

use super::predicate::{Bounds, IndexedPredicate, Predicate};
use crate::index::Index;
use crate::value::normalize;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use tracing::{trace, warn};

/// Name to index mapping the planner resolves terms against
pub trait IndexResolver<R> {
    fn resolve(&self, name: &str) -> Option<&dyn Index<R>>;
}

impl<R> IndexResolver<R> for HashMap<String, Box<dyn Index<R>>> {
    fn resolve(&self, name: &str) -> Option<&dyn Index<R>> {
        self.get(name).map(|index| index.as_ref())
    }
}

/// Query planner
#[derive(Debug, Clone, Default)]
pub struct QueryPlanner {
    /// Skip range terms whose bounds only have hash-ordered keys
    strict_range_values: bool,
}

impl QueryPlanner {
    /// Create a new query planner
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strict_range_values(mut self, strict: bool) -> Self {
        self.strict_range_values = strict;
        self
    }

    pub fn strict_range_values(&self) -> bool {
        self.strict_range_values
    }

    /// Compute the candidate set for `predicate`
    pub fn plan<R, I>(
        &self,
        all_records: Vec<R>,
        indexes: &I,
        predicate: &dyn Predicate<R>,
    ) -> CandidateSet<R>
    where
        R: Clone + Eq + Hash,
        I: IndexResolver<R> + ?Sized,
    {
        let mut summary = PlanSummary::default();

        let terms = match predicate.indexed_predicates() {
            Some(terms) => {
                summary.index_aware = true;
                terms
            }
            None => Vec::new(),
        };
        summary.terms = terms.len();

        let mut records: Option<Vec<R>> = None;

        for term in &terms {
            let Some(index) = indexes.resolve(term.index_name()) else {
                trace!(index = term.index_name(), "no index registered for term, skipping");
                summary.skip(term, SkipReason::UnresolvedIndex);
                continue;
            };

            if let Some(range) = term.range() {
                if !range.is_order_preserving() {
                    warn!(
                        index = term.index_name(),
                        range = %range,
                        "range over hash-ordered values does not follow natural order"
                    );
                    if self.strict_range_values {
                        summary.skip(term, SkipReason::HashOrderedRange);
                        continue;
                    }
                }
            }

            let sub = Self::lookup(index, term);
            trace!(index = term.index_name(), sub_size = sub.len(), "index lookup");
            summary.contributing.push(term.index_name().to_string());

            records = Some(match records {
                None => sub,
                Some(mut current) => {
                    let keep: HashSet<&R> = sub.iter().collect();
                    current.retain(|record| keep.contains(record));
                    current
                }
            });
        }

        let records = match records {
            Some(records) => records,
            None => {
                summary.full_scan = true;
                all_records
            }
        };
        summary.candidates = records.len();

        CandidateSet { records, summary }
    }

    fn lookup<R>(index: &dyn Index<R>, term: &IndexedPredicate) -> Vec<R> {
        let Some(range) = term.range() else {
            return index.lookup_exact(normalize(term.value()));
        };

        match range.bounds() {
            Bounds::Between(from, to) => index.lookup_range(normalize(from), normalize(to)),
            Bounds::Less(bound) => index.lookup_open(false, true, normalize(bound)),
            Bounds::LessEqual(bound) => index.lookup_open(true, true, normalize(bound)),
            Bounds::Greater(bound) => index.lookup_open(false, false, normalize(bound)),
            Bounds::GreaterEqual(bound) => index.lookup_open(true, false, normalize(bound)),
        }
    }
}

/// Candidate records plus how they were found
#[derive(Debug, Clone)]
pub struct CandidateSet<R> {
    pub records: Vec<R>,
    pub summary: PlanSummary,
}

/// Why an indexed term did not contribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// The term names an index absent from the mapping
    UnresolvedIndex,
    /// Range over hash-ordered keys, skipped in strict mode
    HashOrderedRange,
}

/// A term that was left out of the index intersection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedTerm {
    pub index_name: String,
    pub reason: SkipReason,
}

/// Explanation of a planner run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    /// Predicate exposed an indexed decomposition
    pub index_aware: bool,
    /// Number of indexed terms exposed
    pub terms: usize,
    /// Indexes whose lookups were intersected, in term order
    pub contributing: Vec<String>,
    pub skipped: Vec<SkippedTerm>,
    /// Size of the candidate set
    pub candidates: usize,
    /// No index contributed and the full collection was returned
    pub full_scan: bool,
}

impl PlanSummary {
    fn skip(&mut self, term: &IndexedPredicate, reason: SkipReason) {
        self.skipped.push(SkippedTerm {
            index_name: term.index_name().to_string(),
            reason,
        });
    }

    pub fn unresolved_count(&self) -> usize {
        self.skipped
            .iter()
            .filter(|s| s.reason == SkipReason::UnresolvedIndex)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::BTreeIndex;
    use crate::query::predicate::{AndPredicate, FieldPredicate, FnPredicate, RangeDescriptor};
    use crate::value::Value;
    use std::sync::Arc;

    type Indexes = HashMap<String, Box<dyn Index<u32>>>;

    fn no_extract(_: &u32) -> Option<Value> {
        None
    }

    /// Records 1..=10, "n" holds the record under its own number and
    /// "parity" under 0 or 1.
    fn fixture() -> (Vec<u32>, Indexes) {
        let records: Vec<u32> = (1..=10).collect();
        let mut n = BTreeIndex::new("n");
        let mut parity = BTreeIndex::new("parity");
        for &r in &records {
            n.insert(r as i64, r);
            parity.insert((r % 2) as i64, r);
        }
        let mut indexes: Indexes = HashMap::new();
        indexes.insert("n".to_string(), Box::new(n));
        indexes.insert("parity".to_string(), Box::new(parity));
        (records, indexes)
    }

    fn sorted(mut records: Vec<u32>) -> Vec<u32> {
        records.sort();
        records
    }

    fn range(index: &str, range: RangeDescriptor) -> FieldPredicate<u32> {
        FieldPredicate::range(index, range, no_extract)
    }

    #[test]
    fn test_plain_predicate_returns_everything() {
        let (records, indexes) = fixture();
        let predicate = FnPredicate::new(|r: &u32| *r > 100);

        let result = QueryPlanner::new().plan(records.clone(), &indexes, &predicate);
        assert_eq!(result.records, records);
        assert!(result.summary.full_scan);
        assert!(!result.summary.index_aware);
    }

    #[test]
    fn test_empty_conjunction_returns_everything() {
        let (records, indexes) = fixture();
        let predicate: AndPredicate<u32> = AndPredicate::new(vec![]);
        let result = QueryPlanner::new().plan(records.clone(), &indexes, &predicate);
        assert_eq!(result.records, records);
        assert!(result.summary.full_scan);
        assert!(!result.summary.index_aware);
    }

    #[test]
    fn test_index_aware_without_terms_returns_everything() {
        struct NoTerms;
        impl Predicate<u32> for NoTerms {
            fn test(&self, _: &u32) -> bool {
                true
            }
            fn indexed_predicates(&self) -> Option<Vec<IndexedPredicate>> {
                Some(Vec::new())
            }
        }

        let (records, indexes) = fixture();
        let result = QueryPlanner::new().plan(records.clone(), &indexes, &NoTerms);
        assert_eq!(result.records, records);
        assert!(result.summary.index_aware);
        assert!(result.summary.full_scan);
        assert_eq!(result.summary.terms, 0);
    }

    #[test]
    fn test_equality_lookup() {
        let (records, indexes) = fixture();
        let predicate = FieldPredicate::equal("n", 4, no_extract);

        let result = QueryPlanner::new().plan(records, &indexes, &predicate);
        assert_eq!(result.records, vec![4]);
        assert_eq!(result.summary.contributing, vec!["n".to_string()]);
        assert!(!result.summary.full_scan);
    }

    #[test]
    fn test_range_boundaries() {
        let (records, indexes) = fixture();
        let planner = QueryPlanner::new();
        let run = |r: RangeDescriptor| {
            sorted(planner.plan(records.clone(), &indexes, &range("n", r)).records)
        };

        assert_eq!(run(RangeDescriptor::between(3, 7)), vec![3, 4, 5, 6, 7]);
        assert_eq!(run(RangeDescriptor::less(5)), vec![1, 2, 3, 4]);
        assert_eq!(run(RangeDescriptor::less_equal(5)), vec![1, 2, 3, 4, 5]);
        assert_eq!(run(RangeDescriptor::greater(5)), vec![6, 7, 8, 9, 10]);
        assert_eq!(run(RangeDescriptor::greater_equal(5)), vec![5, 6, 7, 8, 9, 10]);
    }

    #[test]
    fn test_intersection_of_terms() {
        let (records, indexes) = fixture();
        let predicate: AndPredicate<u32> = AndPredicate::new(vec![
            Arc::new(range("n", RangeDescriptor::greater(3))),
            Arc::new(FieldPredicate::equal("parity", 0, no_extract)),
            Arc::new(range("n", RangeDescriptor::less_equal(8))),
        ]);

        let result = QueryPlanner::new().plan(records, &indexes, &predicate);
        assert_eq!(sorted(result.records), vec![4, 6, 8]);
        assert_eq!(result.summary.contributing.len(), 3);
        assert_eq!(result.summary.candidates, 3);
    }

    #[test]
    fn test_unresolved_index_is_skipped() {
        let (records, indexes) = fixture();
        let predicate: AndPredicate<u32> = AndPredicate::new(vec![
            Arc::new(FieldPredicate::equal("missing", 1, no_extract)),
            Arc::new(range("n", RangeDescriptor::less(3))),
        ]);

        let result = QueryPlanner::new().plan(records, &indexes, &predicate);
        assert_eq!(sorted(result.records), vec![1, 2]);
        assert_eq!(result.summary.unresolved_count(), 1);
    }

    #[test]
    fn test_all_indexes_unresolved_falls_back() {
        let (records, _) = fixture();
        let predicate = FieldPredicate::equal("n", 1, no_extract);

        let result = QueryPlanner::new().plan(records.clone(), &Indexes::new(), &predicate);
        assert_eq!(result.records, records);
        assert!(result.summary.full_scan);
        assert_eq!(result.summary.skipped[0].reason, SkipReason::UnresolvedIndex);
    }

    #[test]
    fn test_empty_sub_result_empties_candidates() {
        let (records, indexes) = fixture();
        let predicate = FieldPredicate::equal("n", 42, no_extract);

        let result = QueryPlanner::new().plan(records, &indexes, &predicate);
        assert!(result.records.is_empty());
        assert!(!result.summary.full_scan);
    }

    #[test]
    fn test_strict_mode_skips_hash_ordered_ranges() {
        let (records, indexes) = fixture();
        let predicate = range("n", RangeDescriptor::less("m"));

        let lenient = QueryPlanner::new().plan(records.clone(), &indexes, &predicate);
        assert!(!lenient.summary.full_scan);

        let strict = QueryPlanner::new()
            .with_strict_range_values(true)
            .plan(records.clone(), &indexes, &predicate);
        assert_eq!(strict.records, records);
        assert_eq!(strict.summary.skipped[0].reason, SkipReason::HashOrderedRange);
    }

    #[test]
    fn test_boolean_keys() {
        let mut flags = BTreeIndex::new("active");
        flags.insert(normalize(&Value::Bool(true)), 1u32);
        flags.insert(normalize(&Value::Bool(false)), 2u32);
        let mut indexes: Indexes = HashMap::new();
        indexes.insert("active".to_string(), Box::new(flags));

        let predicate = FieldPredicate::equal("active", true, no_extract);
        let result = QueryPlanner::new().plan(vec![1, 2], &indexes, &predicate);
        assert_eq!(result.records, vec![1]);

        // false (-1) sorts below true (1)
        let below = range("active", RangeDescriptor::less(true));
        assert_eq!(QueryPlanner::new().plan(vec![1, 2], &indexes, &below).records, vec![2]);
    }
}
