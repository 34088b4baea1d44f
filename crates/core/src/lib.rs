//! AssertFlip Core
//!
//! Foundational types shared by every AssertFlip crate. Nothing here talks to
//! the oracle or spawns processes.
//!
//! ## Module Organization
//!
//! - `error` - Core error types (`CoreError`, `CoreResult`)
//! - `status` - Verdict status, coverage totals, generation mode
//! - `context` - Per-instance working state (`BugContext`, `Continuation`)
//! - `ledger` - Append-only attempt ledger and its terminal entries
//! - `progress` - Process-wide atomic counters and accumulated cost

pub mod context;
pub mod error;
pub mod ledger;
pub mod progress;
pub mod status;

// ── Error Types ────────────────────────────────────────────────────────
pub use error::{CoreError, CoreResult};

// ── Bug Context ────────────────────────────────────────────────────────
pub use context::{BugContext, Continuation, LocalizedFile};

// ── Ledger ─────────────────────────────────────────────────────────────
pub use ledger::{
    AttemptLedger, AttemptPhase, AttemptRecord, AttemptStatus, InstanceOutcome, LedgerDocument,
    LedgerEntry,
};

// ── Progress ───────────────────────────────────────────────────────────
pub use progress::{ProgressCounter, ProgressSnapshot, ProgressTracker};

// ── Status ─────────────────────────────────────────────────────────────
pub use status::{CoverageTotals, GenerationMode, VerdictStatus};
