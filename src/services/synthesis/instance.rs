//! Instance Run
//!
//! Everything one instance's synthesis touches, bundled so the loops can
//! borrow it as a unit.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use assertflip_core::{AttemptLedger, BugContext, Continuation, ProgressTracker};
use assertflip_runner::VerdictClassifier;

use super::prompts::Prompter;
use super::session::OracleSession;

pub struct InstanceRun {
    pub ctx: BugContext,
    pub session: OracleSession,
    pub ledger: AttemptLedger,
    pub prompter: Arc<dyn Prompter>,
    pub classifier: VerdictClassifier,
    pub progress: Arc<ProgressTracker>,
    /// Checked before every attempt
    pub cancel: CancellationToken,
}

impl InstanceRun {
    pub fn new(
        ctx: BugContext,
        session: OracleSession,
        prompter: Arc<dyn Prompter>,
        classifier: VerdictClassifier,
        progress: Arc<ProgressTracker>,
        cancel: CancellationToken,
    ) -> Self {
        let ledger = AttemptLedger::new(ctx.instance_id());
        Self {
            ctx,
            session,
            ledger,
            prompter,
            classifier,
            progress,
            cancel,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn instance_id(&self) -> &str {
        self.ctx.instance_id()
    }

    /// Replace the continuation, keeping the current plan.
    pub fn record_continuation(
        &mut self,
        test_code: Option<&str>,
        error: Option<&str>,
        reason: Option<&str>,
    ) {
        self.ctx.continuation = Continuation {
            plan: std::mem::take(&mut self.ctx.continuation.plan),
            last_test_code: test_code.map(String::from),
            last_error: error.map(String::from),
            last_rejection_reason: reason.map(String::from),
        };
    }
}
