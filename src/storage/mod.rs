//! On-disk snapshots of built indexes

pub mod snapshot;

pub use snapshot::{load, save, SnapshotHeader};
