//! Predicates and their index-friendly decomposition
//!
//! A [`Predicate`] is a boolean test over a record. It may also be
//! index-aware, exposing the conjunctive terms that a named index can answer
//! as [`IndexedPredicate`]s.

use crate::error::{QueryServiceError, Result};
use crate::value::{normalize, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Boolean test over a record, optionally backed by indexes
pub trait Predicate<R>: Send + Sync {
    /// Exact per-record test
    fn test(&self, record: &R) -> bool;

    /// Indexed terms this predicate is the conjunction of.
    ///
    /// `None` means the predicate is not index-aware.
    fn indexed_predicates(&self) -> Option<Vec<IndexedPredicate>> {
        None
    }
}

/// Comparison kind of a range descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RangeKind {
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Between,
}

impl RangeKind {
    /// Whether the boundary value itself matches
    pub fn is_inclusive(&self) -> bool {
        matches!(
            self,
            RangeKind::LessEqual | RangeKind::GreaterEqual | RangeKind::Between
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RangeKind::Less => "LESS",
            RangeKind::LessEqual => "LESS_EQUAL",
            RangeKind::Greater => "GREATER",
            RangeKind::GreaterEqual => "GREATER_EQUAL",
            RangeKind::Between => "BETWEEN",
        }
    }
}

impl fmt::Display for RangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RangeKind {
    type Err = QueryServiceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "LESS" | "LT" => Ok(RangeKind::Less),
            "LESS_EQUAL" | "LTE" => Ok(RangeKind::LessEqual),
            "GREATER" | "GT" => Ok(RangeKind::Greater),
            "GREATER_EQUAL" | "GTE" => Ok(RangeKind::GreaterEqual),
            "BETWEEN" => Ok(RangeKind::Between),
            other => Err(QueryServiceError::MalformedRangeDescriptor(format!(
                "unknown range kind '{}'",
                other
            ))),
        }
    }
}

/// Range comparison with one bound, or two for `Between`.
///
/// The bound count always matches the kind: every constructor, including
/// deserialization, goes through [`RangeDescriptor::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRangeDescriptor", into = "RawRangeDescriptor")]
pub struct RangeDescriptor {
    bounds: Bounds,
}

/// Bounds of a range, one variant per [`RangeKind`]
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Bounds {
    Less(Value),
    LessEqual(Value),
    Greater(Value),
    GreaterEqual(Value),
    Between(Value, Value),
}

/// Wire form of a range descriptor
#[derive(Serialize, Deserialize)]
struct RawRangeDescriptor {
    kind: RangeKind,
    from: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    to: Option<Value>,
}

impl TryFrom<RawRangeDescriptor> for RangeDescriptor {
    type Error = QueryServiceError;

    fn try_from(raw: RawRangeDescriptor) -> Result<Self> {
        Self::new(raw.kind, raw.from, raw.to)
    }
}

impl From<RangeDescriptor> for RawRangeDescriptor {
    fn from(range: RangeDescriptor) -> Self {
        let kind = range.kind();
        let (from, to) = match range.bounds {
            Bounds::Between(from, to) => (from, Some(to)),
            Bounds::Less(from)
            | Bounds::LessEqual(from)
            | Bounds::Greater(from)
            | Bounds::GreaterEqual(from) => (from, None),
        };
        Self { kind, from, to }
    }
}

impl RangeDescriptor {
    /// Build a descriptor, checking the bound count against the kind
    pub fn new(kind: RangeKind, from: Value, to: Option<Value>) -> Result<Self> {
        let bounds = match (kind, to) {
            (RangeKind::Between, Some(to)) => Bounds::Between(from, to),
            (RangeKind::Between, None) => {
                return Err(QueryServiceError::MalformedRangeDescriptor(
                    "BETWEEN requires an upper bound".to_string(),
                ))
            }
            (kind, Some(_)) => {
                return Err(QueryServiceError::MalformedRangeDescriptor(format!(
                    "{} takes a single bound",
                    kind
                )))
            }
            (RangeKind::Less, None) => Bounds::Less(from),
            (RangeKind::LessEqual, None) => Bounds::LessEqual(from),
            (RangeKind::Greater, None) => Bounds::Greater(from),
            (RangeKind::GreaterEqual, None) => Bounds::GreaterEqual(from),
        };
        Ok(Self { bounds })
    }

    /// Parse the kind from its name, e.g. `"GREATER_EQUAL"`
    pub fn parse(kind: &str, from: Value, to: Option<Value>) -> Result<Self> {
        Self::new(kind.parse()?, from, to)
    }

    pub fn less(value: impl Into<Value>) -> Self {
        Self { bounds: Bounds::Less(value.into()) }
    }

    pub fn less_equal(value: impl Into<Value>) -> Self {
        Self { bounds: Bounds::LessEqual(value.into()) }
    }

    pub fn greater(value: impl Into<Value>) -> Self {
        Self { bounds: Bounds::Greater(value.into()) }
    }

    pub fn greater_equal(value: impl Into<Value>) -> Self {
        Self { bounds: Bounds::GreaterEqual(value.into()) }
    }

    pub fn between(from: impl Into<Value>, to: impl Into<Value>) -> Self {
        Self {
            bounds: Bounds::Between(from.into(), to.into()),
        }
    }

    pub fn kind(&self) -> RangeKind {
        match self.bounds {
            Bounds::Less(_) => RangeKind::Less,
            Bounds::LessEqual(_) => RangeKind::LessEqual,
            Bounds::Greater(_) => RangeKind::Greater,
            Bounds::GreaterEqual(_) => RangeKind::GreaterEqual,
            Bounds::Between(..) => RangeKind::Between,
        }
    }

    /// Lower bound for `Between`, the only bound otherwise
    pub fn from(&self) -> &Value {
        match &self.bounds {
            Bounds::Less(from)
            | Bounds::LessEqual(from)
            | Bounds::Greater(from)
            | Bounds::GreaterEqual(from)
            | Bounds::Between(from, _) => from,
        }
    }

    /// Upper bound, present only for `Between`
    pub fn to(&self) -> Option<&Value> {
        match &self.bounds {
            Bounds::Between(_, to) => Some(to),
            _ => None,
        }
    }

    pub(crate) fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    /// Whether both bounds normalize to order-preserving keys
    pub fn is_order_preserving(&self) -> bool {
        self.from().is_order_preserving() && self.to().map_or(true, Value::is_order_preserving)
    }

    /// Test a normalized key against this range
    pub fn matches_key(&self, key: i64) -> bool {
        match &self.bounds {
            Bounds::Less(bound) => key < normalize(bound),
            Bounds::LessEqual(bound) => key <= normalize(bound),
            Bounds::Greater(bound) => key > normalize(bound),
            Bounds::GreaterEqual(bound) => key >= normalize(bound),
            Bounds::Between(from, to) => normalize(from) <= key && key <= normalize(to),
        }
    }
}

impl fmt::Display for RangeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to() {
            Some(to) => write!(f, "{}({}, {})", self.kind(), self.from(), to),
            None => write!(f, "{}({})", self.kind(), self.from()),
        }
    }
}

/// One index-backed term of a predicate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedPredicate {
    index_name: String,
    value: Value,
    range: Option<RangeDescriptor>,
}

impl IndexedPredicate {
    /// Equality against `value` on the named index
    pub fn equal(index_name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            index_name: index_name.into(),
            value: value.into(),
            range: None,
        }
    }

    /// Range comparison on the named index
    pub fn ranged(index_name: impl Into<String>, range: RangeDescriptor) -> Self {
        Self {
            index_name: index_name.into(),
            value: range.from().clone(),
            range: Some(range),
        }
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Comparison value; the first bound for range terms
    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn range(&self) -> Option<&RangeDescriptor> {
        self.range.as_ref()
    }

    /// Test a normalized key against this term
    pub fn matches_key(&self, key: i64) -> bool {
        match &self.range {
            Some(range) => range.matches_key(key),
            None => key == normalize(&self.value),
        }
    }
}

impl fmt::Display for IndexedPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.range {
            Some(range) => write!(f, "{} {}", self.index_name, range),
            None => write!(f, "{} = {}", self.index_name, self.value),
        }
    }
}

/// Extracts the indexed attribute of a record
pub type Extractor<R> = Arc<dyn Fn(&R) -> Option<Value> + Send + Sync>;

/// Single indexed term over an extracted attribute.
///
/// `test` compares normalized keys, so it agrees with what the index returns.
pub struct FieldPredicate<R> {
    term: IndexedPredicate,
    extractor: Extractor<R>,
}

impl<R> FieldPredicate<R> {
    pub fn new<F>(term: IndexedPredicate, extractor: F) -> Self
    where
        F: Fn(&R) -> Option<Value> + Send + Sync + 'static,
    {
        Self {
            term,
            extractor: Arc::new(extractor),
        }
    }

    pub fn equal<F>(index_name: &str, value: impl Into<Value>, extractor: F) -> Self
    where
        F: Fn(&R) -> Option<Value> + Send + Sync + 'static,
    {
        Self::new(IndexedPredicate::equal(index_name, value), extractor)
    }

    pub fn range<F>(index_name: &str, range: RangeDescriptor, extractor: F) -> Self
    where
        F: Fn(&R) -> Option<Value> + Send + Sync + 'static,
    {
        Self::new(IndexedPredicate::ranged(index_name, range), extractor)
    }

    pub fn term(&self) -> &IndexedPredicate {
        &self.term
    }
}

impl<R> Predicate<R> for FieldPredicate<R> {
    fn test(&self, record: &R) -> bool {
        (self.extractor)(record)
            .map(|value| self.term.matches_key(normalize(&value)))
            .unwrap_or(false)
    }

    fn indexed_predicates(&self) -> Option<Vec<IndexedPredicate>> {
        Some(vec![self.term.clone()])
    }
}

/// Conjunction of predicates.
///
/// Index-aware as soon as one child is; its indexed terms are the
/// concatenation of the children's, in child order.
pub struct AndPredicate<R> {
    children: Vec<Arc<dyn Predicate<R>>>,
}

impl<R> AndPredicate<R> {
    pub fn new(children: Vec<Arc<dyn Predicate<R>>>) -> Self {
        Self { children }
    }

    pub fn and(mut self, child: Arc<dyn Predicate<R>>) -> Self {
        self.children.push(child);
        self
    }
}

impl<R> Predicate<R> for AndPredicate<R> {
    fn test(&self, record: &R) -> bool {
        self.children.iter().all(|child| child.test(record))
    }

    fn indexed_predicates(&self) -> Option<Vec<IndexedPredicate>> {
        let mut terms: Option<Vec<IndexedPredicate>> = None;
        for child in &self.children {
            if let Some(child_terms) = child.indexed_predicates() {
                terms.get_or_insert_with(Vec::new).extend(child_terms);
            }
        }
        terms
    }
}

/// Plain closure predicate with no index support
pub struct FnPredicate<R> {
    test: Box<dyn Fn(&R) -> bool + Send + Sync>,
}

impl<R> FnPredicate<R> {
    pub fn new<F>(test: F) -> Self
    where
        F: Fn(&R) -> bool + Send + Sync + 'static,
    {
        Self { test: Box::new(test) }
    }
}

impl<R> Predicate<R> for FnPredicate<R> {
    fn test(&self, record: &R) -> bool {
        (self.test)(record)
    }
}
