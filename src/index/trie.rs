//! Frozen prefix index over timestamp strings
//!
//! Every node stands for all events whose timestamp starts with the
//! characters on its path from the root, and caches two aggregates for
//! them: the number of distinct queries and the `k_max` most frequent
//! queries. Lookups walk one child per prefix character and never touch
//! the events themselves.
//!
//! The index is immutable. Adding events means rebuilding it from the
//! union of old and new events, because a ranking cannot be patched
//! correctly without the per-query counts that were dropped at build time.

use crate::core::event::QueryEvent;
use crate::error::{Error, Result};
use crate::index::builder::IndexBuilder;
use crate::index::top_k::RankedEntry;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeMap;

/// Arena position of the root node (empty prefix)
pub const ROOT: usize = 0;

/// A ranked query returned by [`PrefixIndex::top_queries_for_prefix`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueryCount<'a> {
    pub query: &'a str,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct IndexNode {
    children: BTreeMap<char, usize>,
    distinct_count: u64,
    top: Vec<RankedEntry>,
}

impl IndexNode {
    pub(crate) fn new(
        children: BTreeMap<char, usize>,
        distinct_count: u64,
        top: Vec<RankedEntry>,
    ) -> Self {
        Self {
            children,
            distinct_count,
            top,
        }
    }
}

/// Read-only prefix index answering distinct-count and top-k lookups.
///
/// `PrefixIndex` is `Send + Sync` and holds no interior mutability, so a
/// single instance can be shared behind an `Arc` by any number of readers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixIndex {
    k_max: usize,
    nodes: Vec<IndexNode>,
    /// Query texts referenced by some node ranking
    queries: Vec<String>,
    events: u64,
}

impl PrefixIndex {
    /// Build an index from events, keeping at most `k_max` queries per prefix.
    ///
    /// Any character sequence is a valid timestamp; validating the format is
    /// up to the event source.
    pub fn build<I>(events: I, k_max: usize) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: Borrow<QueryEvent>,
    {
        let mut builder = IndexBuilder::new(k_max)?;
        builder.extend(events);
        Ok(builder.finish())
    }

    /// Build an index on the rayon thread pool.
    ///
    /// Events are folded into one builder per work split and the partial
    /// tries are merged. The result is identical to [`PrefixIndex::build`].
    pub fn build_parallel(events: &[QueryEvent], k_max: usize) -> Result<Self> {
        IndexBuilder::new(k_max)?;
        let builder = events
            .par_iter()
            .fold(
                || IndexBuilder::with_valid_k_max(k_max),
                |mut builder, event| {
                    builder.insert(event);
                    builder
                },
            )
            .reduce(
                || IndexBuilder::with_valid_k_max(k_max),
                |mut left, right| {
                    left.absorb(right);
                    left
                },
            );
        Ok(builder.finish())
    }

    pub(crate) fn from_parts(
        k_max: usize,
        nodes: Vec<IndexNode>,
        queries: Vec<String>,
        events: u64,
    ) -> Self {
        Self {
            k_max,
            nodes,
            queries,
            events,
        }
    }

    fn node_at(&self, prefix: &str) -> Option<&IndexNode> {
        let mut node = self.nodes.get(ROOT)?;
        for ch in prefix.chars() {
            let &child = node.children.get(&ch)?;
            node = self.nodes.get(child)?;
        }
        Some(node)
    }

    /// Number of distinct queries among events whose timestamp starts with
    /// `prefix`. Unknown prefixes give 0; the empty prefix covers all events.
    pub fn distinct_count_for_prefix(&self, prefix: &str) -> u64 {
        self.node_at(prefix).map_or(0, |node| node.distinct_count)
    }

    /// Most frequent queries among events whose timestamp starts with
    /// `prefix`, ordered by count descending then query ascending.
    ///
    /// At most `min(limit, k_max)` entries are returned: only `k_max`
    /// queries are retained per prefix, so a larger `limit` cannot be
    /// answered and is capped. Unknown prefixes give an empty list.
    pub fn top_queries_for_prefix(&self, prefix: &str, limit: usize) -> Vec<QueryCount<'_>> {
        let Some(node) = self.node_at(prefix) else {
            return Vec::new();
        };
        node.top
            .iter()
            .take(limit.min(self.k_max))
            .filter_map(|entry| {
                self.queries.get(entry.id).map(|query| QueryCount {
                    query,
                    count: entry.count,
                })
            })
            .collect()
    }

    /// Whether any event's timestamp starts with `prefix`
    pub fn contains_prefix(&self, prefix: &str) -> bool {
        self.node_at(prefix).is_some()
    }

    /// Maximum number of queries retained per prefix
    pub fn k_max(&self) -> usize {
        self.k_max
    }

    /// Number of trie nodes, root included
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of query strings kept for rankings
    pub fn query_table_len(&self) -> usize {
        self.queries.len()
    }

    /// Number of events the index was built from
    pub fn event_count(&self) -> u64 {
        self.events
    }

    /// Check the internal references of an index loaded from outside.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.k_max == 0 {
            return Err(Error::Index("k_max must be at least 1".to_string()));
        }
        if self.nodes.is_empty() {
            return Err(Error::Index("index has no root node".to_string()));
        }
        for (position, node) in self.nodes.iter().enumerate() {
            let dangling = node
                .children
                .iter()
                .find(|(_, child)| **child >= self.nodes.len());
            if let Some((ch, _)) = dangling {
                return Err(Error::Index(format!(
                    "node {} has dangling child for {:?}",
                    position, ch
                )));
            }
            if node.top.len() > self.k_max {
                return Err(Error::Index(format!(
                    "node {} ranks {} queries, above k_max {}",
                    position,
                    node.top.len(),
                    self.k_max
                )));
            }
            if node.top.iter().any(|e| e.id >= self.queries.len()) {
                return Err(Error::Index(format!(
                    "node {} ranks an unknown query",
                    position
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn events(list: &[(&str, &str)]) -> Vec<QueryEvent> {
        list.iter().map(|&(ts, q)| QueryEvent::new(ts, q)).collect()
    }

    fn pairs<'a>(top: &[QueryCount<'a>]) -> Vec<(&'a str, u64)> {
        top.iter().map(|qc| (qc.query, qc.count)).collect()
    }

    #[test]
    fn test_distinct_and_top_by_day() {
        let index = PrefixIndex::build(
            events(&[
                ("2021-01-01T10", "cats"),
                ("2021-01-01T11", "cats"),
                ("2021-01-01T12", "dogs"),
            ]),
            5,
        )
        .unwrap();

        assert_eq!(index.distinct_count_for_prefix("2021-01-01"), 2);
        assert_eq!(
            pairs(&index.top_queries_for_prefix("2021-01-01", 5)),
            vec![("cats", 2), ("dogs", 1)]
        );
        assert_eq!(
            pairs(&index.top_queries_for_prefix("2021-01-01T12", 5)),
            vec![("dogs", 1)]
        );
    }

    #[test]
    fn test_single_slot_keeps_most_frequent() {
        let index = PrefixIndex::build(
            events(&[
                ("2021", "a"),
                ("2021", "a"),
                ("2021", "b"),
                ("2021", "b"),
                ("2021", "b"),
            ]),
            1,
        )
        .unwrap();

        assert_eq!(pairs(&index.top_queries_for_prefix("2021", 5)), vec![("b", 3)]);
        assert_eq!(index.distinct_count_for_prefix("2021"), 2);
    }

    #[test]
    fn test_queries_are_case_sensitive() {
        let index = PrefixIndex::build(
            events(&[("2015", "Cats"), ("2015", "cats"), ("2015", "cats")]),
            5,
        )
        .unwrap();

        assert_eq!(index.distinct_count_for_prefix("2015"), 2);
        assert_eq!(
            pairs(&index.top_queries_for_prefix("2015", 5)),
            vec![("cats", 2), ("Cats", 1)]
        );
    }

    #[test]
    fn test_unknown_prefix_is_empty() {
        let index = PrefixIndex::build(
            events(&[
                ("2014-08-01 00:03:49", "vungle"),
                ("2015-09-01 00:03:49", "vungle"),
                ("2015-08-01 00:03:49", "test"),
                ("2015-11-01 00:03:49", "test"),
            ]),
            50,
        )
        .unwrap();

        assert_eq!(index.distinct_count_for_prefix("2015"), 2);
        assert_eq!(index.distinct_count_for_prefix("2015-08"), 1);
        assert_eq!(index.distinct_count_for_prefix("2013"), 0);
        assert!(index.top_queries_for_prefix("2013", 2).is_empty());
        assert!(index.top_queries_for_prefix("2015-08-01 00:03:49 extra", 2).is_empty());
        assert!(!index.contains_prefix("2013"));
        assert_eq!(
            pairs(&index.top_queries_for_prefix("2015", 2)),
            vec![("test", 2), ("vungle", 1)]
        );
    }

    #[test]
    fn test_empty_prefix_is_global() {
        let index = PrefixIndex::build(
            events(&[("1", "x"), ("2", "y"), ("3", "x"), ("4", "z")]),
            2,
        )
        .unwrap();

        assert_eq!(index.distinct_count_for_prefix(""), 3);
        assert_eq!(
            pairs(&index.top_queries_for_prefix("", 10)),
            vec![("x", 2), ("y", 1)]
        );
        assert_eq!(index.event_count(), 4);
    }

    #[test]
    fn test_empty_index() {
        let index = PrefixIndex::build(Vec::<QueryEvent>::new(), 3).unwrap();

        assert_eq!(index.distinct_count_for_prefix(""), 0);
        assert!(index.top_queries_for_prefix("", 3).is_empty());
        assert_eq!(index.node_count(), 1);
        assert!(index.validate().is_ok());
    }

    #[test]
    fn test_limit_zero_returns_nothing() {
        let index = PrefixIndex::build(events(&[("1", "x")]), 3).unwrap();
        assert!(index.top_queries_for_prefix("1", 0).is_empty());
    }

    #[test]
    fn test_zero_k_max_is_rejected() {
        assert!(PrefixIndex::build(events(&[("1", "x")]), 0).is_err());
        assert!(PrefixIndex::build_parallel(&events(&[("1", "x")]), 0).is_err());
    }

    #[test]
    fn test_non_ascii_timestamps_are_paths() {
        let index =
            PrefixIndex::build(events(&[("二〇二一年", "a"), ("二〇二二年", "b")]), 3).unwrap();
        assert_eq!(index.distinct_count_for_prefix("二〇二"), 2);
        assert_eq!(index.distinct_count_for_prefix("二〇二一"), 1);
    }

    #[test]
    fn test_validate_rejects_dangling_child() {
        let mut children = BTreeMap::new();
        children.insert('1', 7);
        let nodes = vec![IndexNode::new(children, 0, Vec::new())];
        let index = PrefixIndex::from_parts(3, nodes, Vec::new(), 0);
        assert!(matches!(index.validate(), Err(Error::Index(_))));
    }

    fn arb_events() -> impl Strategy<Value = Vec<QueryEvent>> {
        prop::collection::vec(("[0-2]{0,4}", "[a-dA]{1,2}"), 0..60)
            .prop_map(|v| v.into_iter().map(QueryEvent::from).collect())
    }

    proptest! {
        #[test]
        fn prop_build_is_order_independent(
            (original, shuffled) in arb_events().prop_flat_map(|events| {
                let shuffled = Just(events.clone()).prop_shuffle();
                (Just(events), shuffled)
            }),
            k_max in 1usize..5,
        ) {
            let a = PrefixIndex::build(&original, k_max).unwrap();
            let b = PrefixIndex::build(&shuffled, k_max).unwrap();
            prop_assert_eq!(&a, &b);

            let parallel = PrefixIndex::build_parallel(&shuffled, k_max).unwrap();
            prop_assert_eq!(&a, &parallel);
        }

        #[test]
        fn prop_top_k_matches_exact_ranking(events in arb_events(), k_max in 1usize..5) {
            let index = PrefixIndex::build(&events, k_max).unwrap();

            for prefix in ["", "0", "1", "01", "12", "200"] {
                let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
                for e in events.iter().filter(|e| e.timestamp().starts_with(prefix)) {
                    *counts.entry(e.query()).or_default() += 1;
                }
                let mut expected: Vec<(&str, u64)> = counts.iter().map(|(&q, &c)| (q, c)).collect();
                expected.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
                expected.truncate(k_max);

                prop_assert_eq!(index.distinct_count_for_prefix(prefix), counts.len() as u64);
                prop_assert_eq!(pairs(&index.top_queries_for_prefix(prefix, k_max)), expected);
            }
        }

        #[test]
        fn prop_result_length_is_capped(
            events in arb_events(),
            k_max in 1usize..5,
            limit in 0usize..10,
        ) {
            let index = PrefixIndex::build(&events, k_max).unwrap();
            for prefix in ["", "0", "1", "2", "10"] {
                prop_assert!(index.top_queries_for_prefix(prefix, limit).len() <= limit.min(k_max));
            }
        }

        #[test]
        fn prop_more_events_never_lower_distinct_count(
            events in arb_events(),
            extra in arb_events(),
        ) {
            let before = PrefixIndex::build(&events, 3).unwrap();
            let after = PrefixIndex::build(events.iter().chain(extra.iter()), 3).unwrap();
            for prefix in ["", "0", "1", "2", "11"] {
                prop_assert!(
                    after.distinct_count_for_prefix(prefix)
                        >= before.distinct_count_for_prefix(prefix)
                );
            }
        }
    }
}
