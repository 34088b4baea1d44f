//! Fix Loop
//!
//! Executes a candidate against a goal status and revises it until it is
//! accepted, abandoned on a repeated identical failure, or the attempt
//! budget runs out. Every execution appends exactly one ledger record.
//!
//! ```text
//! Initial    → Executing
//! Executing  → Accepted | Validating | Revising
//! Validating → Accepted | Revising
//! Revising   → Executing | Abandoned
//! any non-terminal → Exhausted
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use assertflip_core::{
    AttemptPhase, AttemptRecord, AttemptStatus, GenerationMode, ProgressCounter, VerdictStatus,
};
use assertflip_runner::Verdict;

use super::generation::extract_python;
use super::instance::InstanceRun;
use super::session::Conversation;
use super::validation::validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixState {
    Initial,
    Executing,
    Validating,
    Revising,
    Accepted,
    Abandoned,
    Exhausted,
}

impl FixState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Accepted | Self::Abandoned | Self::Exhausted)
    }
}

impl fmt::Display for FixState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initial => write!(f, "initial"),
            Self::Executing => write!(f, "executing"),
            Self::Validating => write!(f, "validating"),
            Self::Revising => write!(f, "revising"),
            Self::Accepted => write!(f, "accepted"),
            Self::Abandoned => write!(f, "abandoned"),
            Self::Exhausted => write!(f, "exhausted"),
        }
    }
}

fn is_legal_transition(from: FixState, to: FixState) -> bool {
    use FixState::*;

    if to == Exhausted && !from.is_terminal() {
        return true;
    }

    matches!(
        (from, to),
        (Initial, Executing)
            | (Executing, Accepted)
            | (Executing, Validating)
            | (Executing, Revising)
            | (Validating, Accepted)
            | (Validating, Revising)
            | (Revising, Executing)
            | (Revising, Abandoned)
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixTransition {
    pub from: FixState,
    pub to: FixState,
    pub attempt: u32,
}

/// Error returned when an illegal transition is attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IllegalTransition {
    pub from: FixState,
    pub to: FixState,
}

impl fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Illegal fix-loop transition: {} -> {}", self.from, self.to)
    }
}

impl std::error::Error for IllegalTransition {}

#[derive(Debug, Clone)]
pub struct FixStateMachine {
    current: FixState,
    transitions: Vec<FixTransition>,
}

impl Default for FixStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl FixStateMachine {
    pub fn new() -> Self {
        Self {
            current: FixState::Initial,
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> FixState {
        self.current
    }

    pub fn transitions(&self) -> &[FixTransition] {
        &self.transitions
    }

    pub fn advance(&mut self, to: FixState, attempt: u32) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(IllegalTransition {
                from: self.current,
                to,
            });
        }
        self.transitions.push(FixTransition {
            from: self.current,
            to,
            attempt,
        });
        self.current = to;
        Ok(())
    }
}

// ============================================================================
// Loop
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct FixLoopSettings {
    pub mode: GenerationMode,
    /// Gate goal-matching failures on the oracle's relevance judgement
    pub validate: bool,
    pub max_attempts: u32,
    pub identical_failure_limit: u32,
}

impl FixLoopSettings {
    pub fn goal(&self) -> VerdictStatus {
        self.mode.goal()
    }

    pub fn phase(&self) -> AttemptPhase {
        AttemptPhase::fix_phase(self.mode)
    }

    /// Whether `verdict` reaches the goal. Flaky verdicts never do; an
    /// `error` verdict counts as failing only when a validator will look
    /// at it.
    pub fn matches_goal(&self, verdict: &Verdict) -> bool {
        if verdict.flaky {
            return false;
        }
        match self.goal() {
            VerdictStatus::Passing => verdict.status == VerdictStatus::Passing,
            VerdictStatus::Failing => {
                verdict.status == VerdictStatus::Failing
                    || (self.validate && verdict.status == VerdictStatus::Error)
            }
            VerdictStatus::Error => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FixOutcome {
    pub state: FixState,
    /// Last live candidate; the accepted test when `state` is `Accepted`
    pub test_code: String,
    pub error_text: Option<String>,
    /// Executions performed
    pub executions: u32,
    pub transitions: Vec<FixTransition>,
}

impl FixOutcome {
    pub fn accepted_test(&self) -> Option<&str> {
        (self.state == FixState::Accepted).then_some(self.test_code.as_str())
    }
}

fn step(machine: &mut FixStateMachine, to: FixState, attempt: u32) {
    if let Err(e) = machine.advance(to, attempt) {
        tracing::error!("[fix-loop] {}", e);
    }
}

/// Error text the identical-failure streak compares.
///
/// Validation feedback is not part of it: a rejected failure with a reworded
/// reason is still the same failure.
fn streak_text(settings: &FixLoopSettings, verdict: &Verdict) -> String {
    let text = verdict.error_text_or_empty();
    if text.is_empty()
        && settings.goal() == VerdictStatus::Failing
        && verdict.status == VerdictStatus::Passing
    {
        return "Test passed but should fail to reveal the bug.".to_string();
    }
    text.to_string()
}

/// Feedback text for a verdict that missed the goal.
fn feedback_text(settings: &FixLoopSettings, verdict: &Verdict, rejection: Option<&str>) -> String {
    let mut text = streak_text(settings, verdict);
    if verdict.flaky {
        text = format!(
            "The test is flaky: its {} repetitions did not agree.\n{}",
            verdict.repetitions, text
        );
    }
    if let Some(reason) = rejection {
        text.push_str(&format!("\n\nVALIDATION_FEEDBACK:\n{}", reason.trim()));
    }
    text
}

/// Drive `candidate` towards the goal in `settings`.
///
/// `conversation` is the generation dialogue the candidate came from;
/// revisions are requested within it.
pub async fn run_fix_loop(
    run: &mut InstanceRun,
    settings: &FixLoopSettings,
    candidate: String,
    conversation: &mut Conversation,
) -> FixOutcome {
    let phase = settings.phase();
    let mut machine = FixStateMachine::new();
    let mut candidate = candidate;
    let mut last_error: Option<String> = None;
    run.ctx.reset_streak();
    step(&mut machine, FixState::Executing, 1);

    let mut attempt: u32 = 1;
    while attempt <= settings.max_attempts {
        if run.is_cancelled() {
            tracing::info!("[fix-loop] {} cancelled", run.instance_id());
            break;
        }
        tracing::info!(
            "[fix-loop] {} {} attempt {}/{}",
            run.instance_id(),
            phase,
            attempt,
            settings.max_attempts
        );
        // Executing
        let verdict = run.classifier.classify(&candidate).await;
        let mut record = AttemptRecord::new(phase, attempt, verdict.status.into())
            .with_test_code(candidate.clone())
            .with_coverage(verdict.coverage.clone());
        if let Some(error) = &verdict.error_text {
            record = record.with_error(error.clone());
        }
        if verdict.flaky {
            record = record.with_detail(format!("flaky over {} repetitions", verdict.repetitions));
        }
        run.ledger.append(record);
        last_error = verdict.error_text.clone();

        let mut rejection: Option<String> = None;
        if settings.matches_goal(&verdict) {
            if settings.validate && settings.goal() == VerdictStatus::Failing {
                step(&mut machine, FixState::Validating, attempt);
                let error = verdict.error_text_or_empty().to_string();
                let judgement = validate(run, &candidate, &error, attempt).await;
                if judgement.revealing {
                    step(&mut machine, FixState::Accepted, attempt);
                    return accept(run, machine, candidate, last_error, attempt);
                }
                run.progress.inc(ProgressCounter::Useless);
                run.record_continuation(
                    Some(candidate.as_str()),
                    Some(error.as_str()),
                    Some(judgement.reason.as_str()),
                );
                rejection = Some(judgement.reason);
            } else {
                step(&mut machine, FixState::Accepted, attempt);
                return accept(run, machine, candidate, last_error, attempt);
            }
        }
        step(&mut machine, FixState::Revising, attempt);
        run.progress.inc(ProgressCounter::Failed);

        // Revising
        let feedback = feedback_text(settings, &verdict, rejection.as_deref());
        let error = streak_text(settings, &verdict);
        let revision = if feedback.is_empty() {
            run.prompter.generic_revision()
        } else {
            let streak = if error.is_empty() {
                run.ctx.reset_streak();
                0
            } else {
                run.ctx.observe_error(&error)
            };
            if streak >= settings.identical_failure_limit {
                tracing::warn!(
                    "[fix-loop] {} identical failure {} times, abandoning candidate",
                    run.instance_id(),
                    streak
                );
                step(&mut machine, FixState::Abandoned, attempt);
                run.ledger.append(
                    AttemptRecord::new(phase, attempt, AttemptStatus::Abandoned)
                        .with_reason("Repeated identical error text"),
                );
                run.record_continuation(
                    Some(candidate.as_str()),
                    last_error.as_deref(),
                    Some("Repeated identical error text"),
                );
                return FixOutcome {
                    state: machine.current(),
                    transitions: machine.transitions().to_vec(),
                    test_code: candidate,
                    error_text: last_error,
                    executions: attempt,
                };
            }
            if streak > 1 {
                run.prompter.identical_error(&feedback)
            } else {
                run.prompter.revision(&feedback, settings.mode)
            }
        };

        conversation.push(revision);
        match run.session.chat(conversation, true).await {
            None => {
                tracing::warn!("[fix-loop] {} no revision from oracle", run.instance_id());
                run.ledger
                    .append(AttemptRecord::new(phase, attempt, AttemptStatus::NoResponse));
            }
            Some(reply) => {
                conversation.push_assistant(reply.clone());
                conversation.trim();
                match extract_python(&reply) {
                    Some(code) => {
                        run.ledger.append(
                            AttemptRecord::new(phase, attempt, AttemptStatus::Generated)
                                .with_test_code(code.clone()),
                        );
                        candidate = code;
                    }
                    None => {
                        run.ledger.append(
                            AttemptRecord::new(phase, attempt, AttemptStatus::NoCode)
                                .with_error("No Python code found in the reply."),
                        );
                    }
                }
            }
        }
        attempt += 1;
        if attempt <= settings.max_attempts {
            step(&mut machine, FixState::Executing, attempt);
        }
    }

    let executions = attempt - 1;
    let reason = if run.is_cancelled() {
        "Run cancelled"
    } else {
        "Exceeded max attempts in fix loop"
    };
    tracing::warn!(
        "[fix-loop] {} exhausted after {} attempts: {}",
        run.instance_id(),
        executions,
        reason
    );
    step(&mut machine, FixState::Exhausted, executions);
    run.ledger.append(
        AttemptRecord::new(phase, executions, AttemptStatus::Exhausted).with_reason(reason),
    );
    run.record_continuation(
        Some(candidate.as_str()),
        Some(last_error.as_deref().unwrap_or("<no error captured>")),
        Some(reason),
    );
    FixOutcome {
        state: machine.current(),
        transitions: machine.transitions().to_vec(),
        test_code: candidate,
        error_text: last_error,
        executions,
    }
}

fn accept(
    run: &mut InstanceRun,
    machine: FixStateMachine,
    candidate: String,
    error_text: Option<String>,
    attempt: u32,
) -> FixOutcome {
    tracing::info!(
        "[fix-loop] {} accepted at attempt {}",
        run.instance_id(),
        attempt
    );
    run.record_continuation(Some(candidate.as_str()), error_text.as_deref(), None);
    FixOutcome {
        state: machine.current(),
        transitions: machine.transitions().to_vec(),
        test_code: candidate,
        error_text,
        executions: attempt,
    }
}
