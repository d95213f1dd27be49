//! Build pipeline for the prefix index
//!
//! The builder folds events into a mutable trie. Every node on an event's
//! path (root included) keeps the full per-query counts for its prefix in
//! `query_counts`, so its top-k ranking can be maintained exactly as counts
//! grow: a query pushed out of the ranking keeps its true count and re-enters
//! once it overtakes the last ranked entry. The counts are build-scoped and
//! are dropped by [`IndexBuilder::finish`].

use crate::core::event::QueryEvent;
use crate::error::{Error, Result};
use crate::index::top_k::{QueryId, RankedEntry, TopQueries};
use crate::index::trie::{IndexNode, PrefixIndex, ROOT};
use ahash::AHashMap;
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Mutable trie node, only alive while the index is being built
#[derive(Debug, Default)]
struct BuildNode {
    children: AHashMap<char, usize>,
    /// Count of every query seen under this prefix
    query_counts: AHashMap<QueryId, u64>,
    distinct_count: u64,
    top: TopQueries,
}

impl BuildNode {
    fn new(k_max: usize) -> Self {
        Self {
            top: TopQueries::new(k_max),
            ..Default::default()
        }
    }
}

/// Interns query strings so nodes only store integer ids
#[derive(Debug, Default)]
struct QueryInterner {
    names: Vec<String>,
    ids: AHashMap<String, QueryId>,
}

impl QueryInterner {
    fn intern(&mut self, query: &str) -> QueryId {
        if let Some(&id) = self.ids.get(query) {
            return id;
        }
        self.intern_owned(query.to_string())
    }

    fn intern_owned(&mut self, query: String) -> QueryId {
        if let Some(&id) = self.ids.get(query.as_str()) {
            return id;
        }
        let id = self.names.len();
        self.ids.insert(query.clone(), id);
        self.names.push(query);
        id
    }
}

/// Statistics about a build in progress
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BuildStats {
    /// Events folded into the trie
    pub events: u64,
    /// Trie nodes, root included
    pub nodes: usize,
    /// Distinct queries across all events
    pub distinct_queries: usize,
}

/// Incremental builder for [`PrefixIndex`]
#[derive(Debug)]
pub struct IndexBuilder {
    k_max: usize,
    nodes: Vec<BuildNode>,
    queries: QueryInterner,
    events: u64,
}

impl IndexBuilder {
    /// Create a builder retaining at most `k_max` queries per prefix
    pub fn new(k_max: usize) -> Result<Self> {
        if k_max == 0 {
            return Err(Error::Configuration(
                "k_max must be at least 1".to_string(),
            ));
        }
        Ok(Self::with_valid_k_max(k_max))
    }

    pub(crate) fn with_valid_k_max(k_max: usize) -> Self {
        Self {
            k_max,
            nodes: vec![BuildNode::new(k_max)],
            queries: QueryInterner::default(),
            events: 0,
        }
    }

    pub fn k_max(&self) -> usize {
        self.k_max
    }

    pub fn stats(&self) -> BuildStats {
        BuildStats {
            events: self.events,
            nodes: self.nodes.len(),
            distinct_queries: self.queries.names.len(),
        }
    }

    /// Fold one event into every node on its timestamp's path
    pub fn insert(&mut self, event: &QueryEvent) {
        let id = self.queries.intern(event.query());

        let mut node = ROOT;
        self.record(node, id);
        for ch in event.timestamp().chars() {
            node = self.child_or_insert(node, ch);
            self.record(node, id);
        }
        self.events += 1;
    }

    /// Fold a sequence of events
    pub fn extend<I>(&mut self, events: I)
    where
        I: IntoIterator,
        I::Item: std::borrow::Borrow<QueryEvent>,
    {
        for event in events {
            self.insert(std::borrow::Borrow::borrow(&event));
        }
    }

    fn child_or_insert(&mut self, parent: usize, ch: char) -> usize {
        if let Some(&child) = self.nodes[parent].children.get(&ch) {
            return child;
        }
        let child = self.nodes.len();
        self.nodes.push(BuildNode::new(self.k_max));
        self.nodes[parent].children.insert(ch, child);
        child
    }

    fn record(&mut self, node: usize, id: QueryId) {
        let node = &mut self.nodes[node];
        let count = match node.query_counts.entry(id) {
            Entry::Vacant(slot) => {
                slot.insert(1);
                node.distinct_count += 1;
                1
            }
            Entry::Occupied(mut slot) => {
                *slot.get_mut() += 1;
                *slot.get()
            }
        };
        node.top.record(id, count, &self.queries.names);
    }

    /// Merge a builder fed with a disjoint part of the same event set.
    ///
    /// Counts are summed per node and each merged node's ranking is rebuilt
    /// from the summed counts, so the result is the same as if every event
    /// had gone through one builder.
    pub fn merge(&mut self, other: IndexBuilder) -> Result<()> {
        if other.k_max != self.k_max {
            return Err(Error::Index(format!(
                "cannot merge builders with k_max {} and {}",
                self.k_max, other.k_max
            )));
        }
        self.absorb(other);
        Ok(())
    }

    pub(crate) fn absorb(&mut self, other: IndexBuilder) {
        let IndexBuilder {
            nodes: mut other_nodes,
            queries: other_queries,
            events,
            ..
        } = other;

        let remap: Vec<QueryId> = other_queries
            .names
            .into_iter()
            .map(|name| self.queries.intern_owned(name))
            .collect();

        let mut pending = vec![(ROOT, ROOT)];
        while let Some((own, theirs)) = pending.pop() {
            let theirs = std::mem::take(&mut other_nodes[theirs]);

            let node = &mut self.nodes[own];
            for (id, count) in theirs.query_counts {
                match node.query_counts.entry(remap[id]) {
                    Entry::Vacant(slot) => {
                        slot.insert(count);
                        node.distinct_count += 1;
                    }
                    Entry::Occupied(mut slot) => *slot.get_mut() += count,
                }
            }
            node.top = TopQueries::from_counts(
                self.k_max,
                node.query_counts
                    .iter()
                    .map(|(&id, &count)| RankedEntry::new(id, count)),
                &self.queries.names,
            );

            for (ch, their_child) in theirs.children {
                let own_child = self.child_or_insert(own, ch);
                pending.push((own_child, their_child));
            }
        }

        self.events += events;
        debug!(events = self.events, nodes = self.nodes.len(), "Merged partial index");
    }

    /// Freeze the trie into a read-only [`PrefixIndex`].
    ///
    /// Per-query counts are dropped here. Nodes are laid out depth-first with
    /// children in character order and the query table keeps only queries
    /// that are still ranked somewhere, sorted, so the frozen index does not
    /// depend on the order events were inserted in.
    pub fn finish(self) -> PrefixIndex {
        let stats = self.stats();
        let IndexBuilder {
            k_max,
            mut nodes,
            queries,
            events,
        } = self;
        let mut names = queries.names;
        drop(queries.ids);

        let mut ranked: Vec<QueryId> = nodes
            .iter()
            .flat_map(|n| n.top.entries().iter().map(|e| e.id))
            .collect();
        ranked.sort_unstable();
        ranked.dedup();
        ranked.sort_unstable_by(|a, b| names[*a].cmp(&names[*b]));

        let mut query_remap: AHashMap<QueryId, QueryId> = AHashMap::with_capacity(ranked.len());
        let mut table = Vec::with_capacity(ranked.len());
        for (new_id, old_id) in ranked.into_iter().enumerate() {
            query_remap.insert(old_id, new_id);
            table.push(std::mem::take(&mut names[old_id]));
        }
        drop(names);

        // Depth-first order, children visited in character order
        let mut order = Vec::with_capacity(nodes.len());
        let mut stack = vec![ROOT];
        while let Some(id) = stack.pop() {
            order.push(id);
            let mut children: Vec<(char, usize)> =
                nodes[id].children.iter().map(|(&c, &n)| (c, n)).collect();
            children.sort_unstable_by(|a, b| b.0.cmp(&a.0));
            stack.extend(children.into_iter().map(|(_, n)| n));
        }
        let mut position = vec![0usize; nodes.len()];
        for (new_id, &old_id) in order.iter().enumerate() {
            position[old_id] = new_id;
        }

        let frozen: Vec<IndexNode> = order
            .into_iter()
            .map(|old_id| {
                let node = std::mem::take(&mut nodes[old_id]);
                let children: BTreeMap<char, usize> = node
                    .children
                    .into_iter()
                    .map(|(c, n)| (c, position[n]))
                    .collect();
                let top = node
                    .top
                    .into_entries()
                    .into_iter()
                    .filter_map(|e| query_remap.get(&e.id).map(|&id| RankedEntry::new(id, e.count)))
                    .collect();
                IndexNode::new(children, node.distinct_count, top)
            })
            .collect();

        info!(
            events = stats.events,
            nodes = stats.nodes,
            distinct_queries = stats.distinct_queries,
            ranked_queries = table.len(),
            k_max,
            "Prefix index built"
        );

        PrefixIndex::from_parts(k_max, frozen, table, events)
    }
}
