//! Verdict
//!
//! Classified outcome of executing one candidate, possibly over several
//! repetitions.

use serde::{Deserialize, Serialize};

use assertflip_core::{CoverageTotals, VerdictStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub status: VerdictStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage: Option<CoverageTotals>,
    /// Combined stdout/stderr of every run
    #[serde(skip)]
    pub raw_output: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_text: Option<String>,
    /// Number of runs combined into this verdict
    pub repetitions: u32,
    /// Repetitions disagreed; never accepted as a goal match
    #[serde(default)]
    pub flaky: bool,
}

impl Verdict {
    pub fn passing(raw_output: Vec<u8>, coverage: Option<CoverageTotals>) -> Self {
        Self {
            status: VerdictStatus::Passing,
            coverage,
            raw_output,
            error_text: None,
            repetitions: 1,
            flaky: false,
        }
    }

    pub fn failing(
        raw_output: Vec<u8>,
        error_text: impl Into<String>,
        coverage: Option<CoverageTotals>,
    ) -> Self {
        Self {
            status: VerdictStatus::Failing,
            coverage,
            raw_output,
            error_text: Some(error_text.into()),
            repetitions: 1,
            flaky: false,
        }
    }

    pub fn error(raw_output: Vec<u8>, error_text: impl Into<String>) -> Self {
        Self {
            status: VerdictStatus::Error,
            coverage: None,
            raw_output,
            error_text: Some(error_text.into()),
            repetitions: 1,
            flaky: false,
        }
    }

    /// Raw output decoded lossily
    pub fn output_text(&self) -> String {
        String::from_utf8_lossy(&self.raw_output).into_owned()
    }

    /// Error text, or an empty string for passing runs
    pub fn error_text_or_empty(&self) -> &str {
        self.error_text.as_deref().unwrap_or("")
    }
}
