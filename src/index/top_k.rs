//! Bounded top-k ranking kept at every trie node

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Identifier of an interned query string
pub type QueryId = usize;

/// A query and the number of times it was seen under a prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedEntry {
    /// Interned query
    pub id: QueryId,
    /// Occurrence count
    pub count: u64,
}

impl RankedEntry {
    pub fn new(id: QueryId, count: u64) -> Self {
        Self { id, count }
    }
}

/// Ranking order: count descending, then query text ascending.
///
/// This is a total order over distinct queries, so the retained set at a
/// node does not depend on the order events arrived in.
pub fn compare_ranked(a: &RankedEntry, b: &RankedEntry, queries: &[String]) -> Ordering {
    b.count
        .cmp(&a.count)
        .then_with(|| query_text(queries, a.id).cmp(query_text(queries, b.id)))
}

fn query_text(queries: &[String], id: QueryId) -> &str {
    queries.get(id).map(String::as_str).unwrap_or_default()
}

/// The best `capacity` queries seen under one prefix, kept sorted.
///
/// Updates are O(k): a bumped entry only ever moves towards the front,
/// and a new entry is placed with a binary search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopQueries {
    entries: Vec<RankedEntry>,
    capacity: usize,
}

impl TopQueries {
    /// Create an empty ranking holding at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity,
        }
    }

    /// Rebuild a ranking from complete counts.
    pub fn from_counts<I>(capacity: usize, counts: I, queries: &[String]) -> Self
    where
        I: IntoIterator<Item = RankedEntry>,
    {
        let mut entries: Vec<RankedEntry> = counts.into_iter().collect();
        if entries.len() > capacity && capacity > 0 {
            entries.select_nth_unstable_by(capacity - 1, |a, b| compare_ranked(a, b, queries));
        }
        entries.truncate(capacity);
        entries.sort_unstable_by(|a, b| compare_ranked(a, b, queries));
        Self { entries, capacity }
    }

    /// Record that query `id` now has `count` occurrences under this prefix.
    ///
    /// `count` must be the query's full count at this node, which is why the
    /// builder keeps every count around even for queries not ranked here.
    pub fn record(&mut self, id: QueryId, count: u64, queries: &[String]) {
        if let Some(pos) = self.entries.iter().position(|e| e.id == id) {
            self.entries[pos].count = count;
            let mut i = pos;
            while i > 0
                && compare_ranked(&self.entries[i], &self.entries[i - 1], queries) == Ordering::Less
            {
                self.entries.swap(i, i - 1);
                i -= 1;
            }
            return;
        }

        let candidate = RankedEntry::new(id, count);
        if self.entries.len() < self.capacity {
            self.insert_sorted(candidate, queries);
            return;
        }

        // Full: only an entry ranking strictly ahead of the last one gets in
        let beats_last = match self.entries.last() {
            Some(last) => compare_ranked(&candidate, last, queries) == Ordering::Less,
            None => false,
        };
        if beats_last {
            self.entries.pop();
            self.insert_sorted(candidate, queries);
        }
    }

    fn insert_sorted(&mut self, entry: RankedEntry, queries: &[String]) {
        let at = self
            .entries
            .partition_point(|e| compare_ranked(e, &entry, queries) == Ordering::Less);
        self.entries.insert(at, entry);
    }

    /// Ranked entries, best first
    pub fn entries(&self) -> &[RankedEntry] {
        &self.entries
    }

    /// Consume the ranking
    pub fn into_entries(self) -> Vec<RankedEntry> {
        self.entries
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
