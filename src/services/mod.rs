//! Services
//!
//! Business logic: per-instance synthesis and the batch runner that drives
//! it over a dataset.

pub mod batch;
pub mod synthesis;

pub use batch::{BatchRunner, BatchSummary};
pub use synthesis::{OracleClient, OrchestratorSettings, PhaseOrchestrator, SynthesisReport};
