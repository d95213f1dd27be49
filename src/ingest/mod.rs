//! Event sources feeding the index builder

pub mod tsv;

pub use tsv::*;
