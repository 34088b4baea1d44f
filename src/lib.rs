//! AssertFlip
//!
//! Synthesizes bug-revealing tests for a reported defect by steering a
//! reasoning oracle through generate, execute, and revise cycles.
//!
//! - `models` - Run configuration and dataset records
//! - `services` - Per-instance synthesis and the batch runner
//! - `storage` - Persisted tests and attempt ledgers
//! - `utils` - Errors and path helpers
//! - `cli` - Command-line definitions

pub mod cli;
pub mod models;
pub mod services;
pub mod storage;
pub mod utils;

pub use models::config::{ConfigOverrides, PhaseStrategy, SynthesisConfig};
pub use models::dataset::{load_dataset, parse_dataset, DatasetInstance};
pub use services::{BatchRunner, BatchSummary, PhaseOrchestrator, SynthesisReport};
pub use storage::OutputStore;
pub use utils::error::{AppError, AppResult};
