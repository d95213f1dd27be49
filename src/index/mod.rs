//! Prefix index over timestamp strings

pub mod builder;
pub mod top_k;
pub mod trie;

pub use builder::*;
pub use top_k::*;
pub use trie::*;
