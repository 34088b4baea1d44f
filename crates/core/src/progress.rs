//! Progress and Cost Tracking
//!
//! Process-wide counters shared by every instance task. Created once at run
//! start, incremented atomically, snapshotted at run end. Purely advisory:
//! nothing in the control loops reads these values.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Cost is accumulated in micro-dollars so it can live in an `AtomicU64`.
const MICROS_PER_DOLLAR: f64 = 1_000_000.0;

/// Counter selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressCounter {
    /// Tests persisted
    Generated,
    /// Fix-loop executions that missed their goal
    Failed,
    /// Failures the validation gate judged unrelated to the bug
    Useless,
    /// Transient oracle failures that were retried
    Retried,
}

#[derive(Debug, Default)]
pub struct ProgressTracker {
    total: AtomicU64,
    completed: AtomicU64,
    generated: AtomicU64,
    failed: AtomicU64,
    useless: AtomicU64,
    retried: AtomicU64,
    cost_micros: AtomicU64,
}

impl ProgressTracker {
    /// Fresh tracker for a run over `total` instances.
    pub fn new(total: u64) -> Self {
        let tracker = Self::default();
        tracker.total.store(total, Ordering::Relaxed);
        tracker
    }

    pub fn inc(&self, counter: ProgressCounter) {
        let slot = match counter {
            ProgressCounter::Generated => &self.generated,
            ProgressCounter::Failed => &self.failed,
            ProgressCounter::Useless => &self.useless,
            ProgressCounter::Retried => &self.retried,
        };
        slot.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_cost(&self, usd: f64) {
        if usd.is_finite() && usd > 0.0 {
            let micros = (usd * MICROS_PER_DOLLAR).round() as u64;
            self.cost_micros.fetch_add(micros, Ordering::Relaxed);
        }
    }

    pub fn total_cost(&self) -> f64 {
        self.cost_micros.load(Ordering::Relaxed) as f64 / MICROS_PER_DOLLAR
    }

    pub fn complete_one(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            total: self.total.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            generated: self.generated.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            useless: self.useless.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            total_cost: self.total_cost(),
        }
    }
}

/// Point-in-time copy of the tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub total: u64,
    pub completed: u64,
    pub generated: u64,
    pub failed: u64,
    pub useless: u64,
    pub retried: u64,
    pub total_cost: f64,
}

impl std::fmt::Display for ProgressSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} G={} F={} U={} R={} cost=~${:.2}",
            self.completed,
            self.total,
            self.generated,
            self.failed,
            self.useless,
            self.retried,
            self.total_cost
        )
    }
}
