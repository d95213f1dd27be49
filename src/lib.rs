//! QueryLog-DB: prefix-indexed search query logs
//!
//! Answers two questions about a log of `(timestamp, query)` events, for
//! any timestamp prefix such as `"2015"`, `"2015-08-01"` or
//! `"2015-08-01 00:04"`:
//!
//! - how many distinct queries were made, and
//! - which queries were the most popular.
//!
//! # Core Concepts
//!
//! - **Events**: `(timestamp, query)` pairs read from a TSV log
//! - **Prefix index**: a trie over timestamp characters whose nodes cache a
//!   distinct-query count and a bounded top-k ranking
//! - **k_max**: the number of queries ranked per prefix, fixed at build time
//! - **Snapshots**: frozen indexes written to disk to skip log replay
//!
//! # Example
//!
//! ```
//! use querylog_db::prelude::*;
//!
//! # fn example() -> querylog_db::error::Result<()> {
//! let events = vec![
//!     QueryEvent::new("2021-01-01T10", "cats"),
//!     QueryEvent::new("2021-01-01T11", "cats"),
//!     QueryEvent::new("2021-01-01T12", "dogs"),
//! ];
//! let index = PrefixIndex::build(&events, 5)?;
//!
//! assert_eq!(index.distinct_count_for_prefix("2021-01-01"), 2);
//! let top = index.top_queries_for_prefix("2021-01-01", 5);
//! assert_eq!((top[0].query, top[0].count), ("cats", 2));
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod index;
pub mod ingest;
pub mod storage;

/// Main database type
pub mod db;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::core::*;
    pub use crate::db::{CountResponse, PopularQuery, PopularResponse, QueryLogDB};
    pub use crate::error::{Error, Result};
    pub use crate::index::{IndexBuilder, PrefixIndex, QueryCount};
    pub use crate::ingest::{IngestStats, TsvLogReader};
}
