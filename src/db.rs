//! Main database implementation

use crate::config::Config;
use crate::core::event::QueryEvent;
use crate::error::{Error, Result};
use crate::index::trie::PrefixIndex;
use crate::ingest::{IngestStats, TsvLogReader};
use crate::storage::snapshot;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Payload for the distinct-count lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountResponse {
    pub count: u64,
}

/// One entry of the popular-queries payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopularQuery {
    pub query: String,
    pub count: u64,
}

/// Payload for the top-k lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopularResponse {
    pub queries: Vec<PopularQuery>,
}

/// Search log database: a built prefix index shared by all readers
#[derive(Debug, Clone)]
pub struct QueryLogDB {
    index: Arc<PrefixIndex>,
    /// Present when the index was built from a log file
    ingest_stats: Option<IngestStats>,
}

impl QueryLogDB {
    /// Wrap an already built index
    pub fn from_index(index: PrefixIndex) -> Self {
        Self {
            index: Arc::new(index),
            ingest_stats: None,
        }
    }

    /// Build from in-memory events
    pub fn from_events<I>(events: I, k_max: usize) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: std::borrow::Borrow<QueryEvent>,
    {
        Ok(Self::from_index(PrefixIndex::build(events, k_max)?))
    }

    /// Replay a TSV search log
    pub fn from_log_file<P: AsRef<Path>>(path: P, config: &Config) -> Result<Self> {
        let mut reader = TsvLogReader::open(path, config.ingest.clone())?;
        let k_max = config.index.k_max;

        let index = if config.index.parallel_build {
            let events = reader.by_ref().collect::<Result<Vec<_>>>()?;
            PrefixIndex::build_parallel(&events, k_max)?
        } else {
            let mut builder = crate::index::IndexBuilder::new(k_max)?;
            for event in reader.by_ref() {
                builder.insert(&event?);
            }
            builder.finish()
        };

        Ok(Self {
            index: Arc::new(index),
            ingest_stats: Some(reader.stats()),
        })
    }

    /// Load a snapshot written by [`QueryLogDB::save_snapshot`]
    pub fn from_snapshot<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::from_index(snapshot::load(path)?))
    }

    /// Open the index described by `config`.
    ///
    /// An existing snapshot wins over the log file when it was built with
    /// the configured `k_max`. Otherwise the log is replayed and the
    /// snapshot rewritten; without a log file that is a configuration error.
    pub fn open(config: &Config) -> Result<Self> {
        if let Some(path) = config.index.snapshot.as_deref().filter(|p| p.exists()) {
            let db = Self::from_snapshot(path)?;
            if db.k_max() == config.index.k_max {
                return Ok(db);
            }
            if config.index.log_file.is_none() {
                return Err(Error::Configuration(format!(
                    "snapshot {} was built with k_max {} but k_max {} is configured; \
                     a log file is needed to rebuild it",
                    path.display(),
                    db.k_max(),
                    config.index.k_max
                )));
            }
            warn!(
                snapshot_k_max = db.k_max(),
                configured_k_max = config.index.k_max,
                "Snapshot was built with a different k_max, rebuilding from the log"
            );
        }

        match config.index.log_file.as_deref() {
            Some(path) => {
                let db = Self::from_log_file(path, config)?;
                if let Some(snapshot_path) = config.index.snapshot.as_deref() {
                    db.save_snapshot(snapshot_path)?;
                }
                Ok(db)
            }
            None => Err(Error::Configuration(
                "no log file or existing snapshot configured".to_string(),
            )),
        }
    }

    /// Write the index to disk
    pub fn save_snapshot<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        snapshot::save(path, &self.index)?;
        Ok(())
    }

    /// Number of distinct queries under a timestamp prefix
    pub fn distinct_queries(&self, prefix: &str) -> CountResponse {
        let count = self.index.distinct_count_for_prefix(prefix);
        info!(prefix, count, "Distinct queries by prefix");
        CountResponse { count }
    }

    /// Most popular queries under a timestamp prefix, at most `k_max`
    pub fn popular_queries(&self, prefix: &str, size: usize) -> PopularResponse {
        if size > self.k_max() {
            info!(size, k_max = self.k_max(), "Requested size capped to k_max");
        }
        let queries: Vec<PopularQuery> = self
            .index
            .top_queries_for_prefix(prefix, size)
            .into_iter()
            .map(|qc| PopularQuery {
                query: qc.query.to_string(),
                count: qc.count,
            })
            .collect();
        info!(prefix, size, returned = queries.len(), "Popular queries by prefix");
        PopularResponse { queries }
    }

    pub fn index(&self) -> &Arc<PrefixIndex> {
        &self.index
    }

    pub fn k_max(&self) -> usize {
        self.index.k_max()
    }

    pub fn ingest_stats(&self) -> Option<IngestStats> {
        self.ingest_stats
    }
}
