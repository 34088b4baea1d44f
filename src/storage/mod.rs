//! Storage Layer
//!
//! Persistence of accepted tests and attempt ledgers.

pub mod output;

pub use output::OutputStore;
