//! Shared Status Types
//!
//! Small enums and summaries that cross crate boundaries: the classified
//! outcome of running a candidate, coverage totals, and the generation mode a
//! phase is working in.

use serde::{Deserialize, Serialize};

/// Reduced outcome of running a candidate test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictStatus {
    /// Test command exited with code 0
    Passing,
    /// Test command exited non-zero
    Failing,
    /// Timeout, missing coverage artifact, or process fault
    Error,
}

impl std::fmt::Display for VerdictStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerdictStatus::Passing => write!(f, "passing"),
            VerdictStatus::Failing => write!(f, "failing"),
            VerdictStatus::Error => write!(f, "error"),
        }
    }
}

/// Coverage totals as reported by `coverage json`.
///
/// Only the `totals` object is kept; per-file detail is dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageTotals {
    #[serde(default)]
    pub covered_lines: u64,
    #[serde(default)]
    pub num_statements: u64,
    #[serde(default)]
    pub percent_covered: f64,
    #[serde(default)]
    pub missing_lines: u64,
    #[serde(default)]
    pub excluded_lines: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_branches: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub covered_branches: Option<u64>,
}

/// What kind of test a generation attempt is steering towards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    /// Passing test that still exhibits the bug, inverted afterwards
    PassingFirst,
    /// Test that fails because of the bug
    FailingFirst,
}

impl GenerationMode {
    /// Status a candidate must reach in this mode's fix loop.
    pub fn goal(&self) -> VerdictStatus {
        match self {
            GenerationMode::PassingFirst => VerdictStatus::Passing,
            GenerationMode::FailingFirst => VerdictStatus::Failing,
        }
    }
}

impl std::fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerationMode::PassingFirst => write!(f, "passing_first"),
            GenerationMode::FailingFirst => write!(f, "failing_first"),
        }
    }
}
