//! Execution Errors
//!
//! Faults raised while running a candidate. The classifier turns every one of
//! them into an `error` verdict; none of them escape to the fix loop.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutionError {
    /// The test command could not be started
    #[error("Failed to execute command: {0}")]
    Spawn(String),

    /// The test command exceeded its hard timeout and was killed
    #[error("Test execution timed out after {secs} seconds")]
    Timeout { secs: u64 },

    /// The run finished but left no coverage data behind
    #[error("No coverage data file produced; test may have crashed or done no work")]
    MissingCoverage { output: Vec<u8> },

    /// `coverage combine` / `coverage json` failed or produced garbage
    #[error("Failed to convert coverage to JSON: {0}")]
    Coverage(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExecutionError {
    /// Output captured before the fault, if any.
    pub fn output(&self) -> Option<&[u8]> {
        match self {
            ExecutionError::MissingCoverage { output } => Some(output),
            _ => None,
        }
    }
}

pub type ExecutionResult<T> = Result<T, ExecutionError>;
