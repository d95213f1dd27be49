//! Core data types and models

pub mod event;

pub use event::*;
