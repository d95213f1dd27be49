//! API layer (REST)

pub mod rest;

pub use rest::*;
