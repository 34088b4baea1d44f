//! Attempt Ledger
//!
//! Append-only record of every generation, execution, and validation event for
//! one instance. The ledger never drives control flow; it is flushed once at
//! termination, followed by a termination entry and a cost summary.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreResult;
use crate::status::{CoverageTotals, GenerationMode, VerdictStatus};

// ============================================================================
// Records
// ============================================================================

/// Phase an attempt record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptPhase {
    /// Oracle-authored plan
    Planning,
    /// Initial candidate request
    FirstTest,
    /// Fix loop steering towards a passing test
    GeneratePassingTest,
    /// Fix loop steering towards a failing test
    GenerateFailingTest,
    /// Inverting a passing test into a failing one
    InvertToFailing,
    /// Validation gate judgement
    ValidateBug,
    /// Corrective instruction after a malformed response
    GenerationFeedback,
    /// Instance termination
    Terminating,
}

impl AttemptPhase {
    /// Fix-loop phase for a generation mode.
    pub fn fix_phase(mode: GenerationMode) -> Self {
        match mode {
            GenerationMode::PassingFirst => AttemptPhase::GeneratePassingTest,
            GenerationMode::FailingFirst => AttemptPhase::GenerateFailingTest,
        }
    }
}

impl std::fmt::Display for AttemptPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AttemptPhase::Planning => "planning",
            AttemptPhase::FirstTest => "first_test",
            AttemptPhase::GeneratePassingTest => "generate_passing_test",
            AttemptPhase::GenerateFailingTest => "generate_failing_test",
            AttemptPhase::InvertToFailing => "invert_to_failing",
            AttemptPhase::ValidateBug => "validate_bug",
            AttemptPhase::GenerationFeedback => "generation_feedback",
            AttemptPhase::Terminating => "terminating",
        };
        write!(f, "{}", s)
    }
}

/// What happened in one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    /// Oracle returned a plan
    Planned,
    /// Oracle returned nothing usable
    NoResponse,
    /// Response carried no fenced code block
    NoCode,
    /// A candidate was extracted
    Generated,
    /// Candidate executed and passed
    Passing,
    /// Candidate executed and failed
    Failing,
    /// Candidate execution timed out or faulted
    Error,
    /// Validation gate accepted the failure as bug-revealing
    Revealing,
    /// Validation gate rejected the failure
    NotRevealing,
    /// Identical-failure circuit breaker tripped
    Abandoned,
    /// Attempt budget ran out
    Exhausted,
}

impl AttemptStatus {
    /// True for records produced by executing a candidate.
    pub fn is_execution(&self) -> bool {
        matches!(
            self,
            AttemptStatus::Passing | AttemptStatus::Failing | AttemptStatus::Error
        )
    }
}

impl From<VerdictStatus> for AttemptStatus {
    fn from(status: VerdictStatus) -> Self {
        match status {
            VerdictStatus::Passing => AttemptStatus::Passing,
            VerdictStatus::Failing => AttemptStatus::Failing,
            VerdictStatus::Error => AttemptStatus::Error,
        }
    }
}

/// One ledger entry. `seq` and `timestamp` are assigned on append.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    #[serde(default)]
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub phase: AttemptPhase,
    pub attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_attempt: Option<u32>,
    pub status: AttemptStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revealing: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage: Option<CoverageTotals>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AttemptRecord {
    pub fn new(phase: AttemptPhase, attempt: u32, status: AttemptStatus) -> Self {
        Self {
            seq: 0,
            timestamp: Utc::now(),
            phase,
            attempt,
            sub_attempt: None,
            status,
            test_code: None,
            error: None,
            reason: None,
            revealing: None,
            coverage: None,
            detail: None,
        }
    }

    pub fn with_sub_attempt(mut self, sub_attempt: u32) -> Self {
        self.sub_attempt = Some(sub_attempt);
        self
    }

    pub fn with_test_code(mut self, code: impl Into<String>) -> Self {
        self.test_code = Some(code.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_revealing(mut self, revealing: bool) -> Self {
        self.revealing = Some(revealing);
        self
    }

    pub fn with_coverage(mut self, coverage: Option<CoverageTotals>) -> Self {
        self.coverage = coverage;
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

// ============================================================================
// Terminal entries
// ============================================================================

/// Final outcome of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceOutcome {
    Success,
    Failure,
}

impl std::fmt::Display for InstanceOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstanceOutcome::Success => write!(f, "success"),
            InstanceOutcome::Failure => write!(f, "failure"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminationEntry {
    pub phase: AttemptPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<GenerationMode>,
    pub outcome: InstanceOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_test: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostSummaryEntry {
    pub meta: String,
    /// Process-wide oracle cost at the time the instance finished
    pub total_cost: f64,
    /// Oracle cost attributable to this instance
    pub instance_cost: f64,
}

/// Serialized shape of one element of the ledger file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LedgerEntry {
    Attempt(AttemptRecord),
    Termination(TerminationEntry),
    CostSummary(CostSummaryEntry),
}

// ============================================================================
// Ledger
// ============================================================================

/// Append-only sequence of attempt records for one instance.
#[derive(Debug, Clone)]
pub struct AttemptLedger {
    instance_id: String,
    records: Vec<AttemptRecord>,
}

impl AttemptLedger {
    pub fn new(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            records: Vec::new(),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Append a record, stamping it with the next sequence number.
    pub fn append(&mut self, mut record: AttemptRecord) -> u64 {
        let seq = self.records.len() as u64 + 1;
        record.seq = seq;
        self.records.push(record);
        seq
    }

    pub fn records(&self) -> &[AttemptRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last(&self) -> Option<&AttemptRecord> {
        self.records.last()
    }

    /// Number of candidate executions recorded for `phase`.
    pub fn executions_in(&self, phase: AttemptPhase) -> usize {
        self.records
            .iter()
            .filter(|r| r.phase == phase && r.status.is_execution())
            .count()
    }

    /// Close the ledger with its terminal entries.
    pub fn finish(
        self,
        mode: Option<GenerationMode>,
        outcome: InstanceOutcome,
        final_test: Option<String>,
        total_cost: f64,
        instance_cost: f64,
    ) -> LedgerDocument {
        LedgerDocument {
            instance_id: self.instance_id,
            records: self.records,
            termination: TerminationEntry {
                phase: AttemptPhase::Terminating,
                mode,
                outcome,
                final_test,
                timestamp: Utc::now(),
            },
            cost_summary: CostSummaryEntry {
                meta: "cost_summary".to_string(),
                total_cost,
                instance_cost,
            },
        }
    }
}

/// A finished ledger, ready to be flushed.
#[derive(Debug, Clone)]
pub struct LedgerDocument {
    pub instance_id: String,
    pub records: Vec<AttemptRecord>,
    pub termination: TerminationEntry,
    pub cost_summary: CostSummaryEntry,
}

impl LedgerDocument {
    /// Entries in file order: attempts, termination, cost summary.
    pub fn entries(&self) -> Vec<LedgerEntry> {
        let mut entries: Vec<LedgerEntry> = self
            .records
            .iter()
            .cloned()
            .map(LedgerEntry::Attempt)
            .collect();
        entries.push(LedgerEntry::Termination(self.termination.clone()));
        entries.push(LedgerEntry::CostSummary(self.cost_summary.clone()));
        entries
    }

    /// Write the ledger as a pretty-printed JSON array, creating parent dirs.
    pub fn write_json(&self, path: &Path) -> CoreResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.entries())?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
