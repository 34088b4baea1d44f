//! AssertFlip Runner
//!
//! Executes candidate tests in an isolated environment and classifies the
//! result as passing, failing or error, with coverage totals.

pub mod classifier;
pub mod clean;
pub mod environment;
pub mod error;
pub mod verdict;

pub use classifier::{classify, RepeatMode, VerdictClassifier};
pub use clean::clean_error;
pub use environment::{
    parse_coverage_totals, ExecutionEnvironment, LocalEnvironment, LocalEnvironmentConfig,
    RunOutput,
};
pub use error::{ExecutionError, ExecutionResult};
pub use verdict::Verdict;
