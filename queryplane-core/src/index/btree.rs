//! B-tree index implementation
//!
//! Keeps one record set per normalized key in a `BTreeMap`, so range lookups
//! walk keys in order.

use super::Index;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::hash::Hash;
use std::ops::Bound;

/// B-tree index over normalized keys
#[derive(Debug)]
pub struct BTreeIndex<R> {
    /// Index name
    name: String,
    /// The actual B-tree storage
    tree: BTreeMap<i64, HashSet<R>>,
    /// Index statistics
    stats: IndexStats,
}

impl<R> BTreeIndex<R>
where
    R: Clone + Eq + Hash,
{
    /// Create a new B-tree index
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tree: BTreeMap::new(),
            stats: IndexStats::default(),
        }
    }

    /// Get the number of unique keys in the index
    pub fn key_count(&self) -> usize {
        self.tree.len()
    }

    /// Get index statistics
    pub fn statistics(&self) -> IndexStats {
        self.stats.clone()
    }

    /// Clear all entries from the index
    pub fn clear(&mut self) {
        self.tree.clear();
        self.stats = IndexStats::default();
    }

    fn collect<'a, I>(entries: I) -> Vec<R>
    where
        I: Iterator<Item = (&'a i64, &'a HashSet<R>)>,
        R: 'a,
    {
        entries.flat_map(|(_, records)| records.iter().cloned()).collect()
    }
}

impl<R> Index<R> for BTreeIndex<R>
where
    R: Clone + Eq + Hash + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn insert(&mut self, key: i64, record: R) {
        if self.tree.entry(key).or_default().insert(record) {
            self.stats.total_entries += 1;
        }
        self.stats.insert_count += 1;
    }

    fn update(&mut self, old_key: i64, new_key: i64, record: R) {
        if old_key == new_key {
            // Still make sure the record is present
            self.insert(new_key, record);
            return;
        }
        self.remove(old_key, &record);
        self.insert(new_key, record);
        self.stats.update_count += 1;
    }

    fn remove(&mut self, key: i64, record: &R) -> bool {
        let Some(records) = self.tree.get_mut(&key) else {
            return false;
        };
        let removed = records.remove(record);
        if records.is_empty() {
            self.tree.remove(&key);
        }
        if removed {
            self.stats.total_entries -= 1;
            self.stats.delete_count += 1;
        }
        removed
    }

    fn lookup_exact(&self, key: i64) -> Vec<R> {
        self.tree
            .get(&key)
            .map(|records| records.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn lookup_range(&self, from: i64, to: i64) -> Vec<R> {
        // BTreeMap::range panics on an inverted range
        if from > to {
            return Vec::new();
        }
        Self::collect(self.tree.range(from..=to))
    }

    fn lookup_open(&self, inclusive: bool, below: bool, bound: i64) -> Vec<R> {
        let edge = if inclusive {
            Bound::Included(bound)
        } else {
            Bound::Excluded(bound)
        };
        let range = if below {
            (Bound::Unbounded, edge)
        } else {
            (edge, Bound::Unbounded)
        };
        Self::collect(self.tree.range(range))
    }

    fn len(&self) -> usize {
        self.stats.total_entries as usize
    }
}

/// Index statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    /// Total number of entries
    pub total_entries: u64,
    /// Number of inserts performed
    pub insert_count: u64,
    /// Number of key moves performed
    pub update_count: u64,
    /// Number of deletes performed
    pub delete_count: u64,
}
