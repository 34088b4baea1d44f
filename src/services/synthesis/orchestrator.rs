//! Phase Orchestrator
//!
//! Composes generation, fix and validation into the two strategies:
//!
//! - **pass-then-invert**: reach a passing test that exhibits the bug, then
//!   ask for a minimal inversion that fails on it;
//! - **direct-fail**: reach a failing test the validator accepts.
//!
//! Each strategy gets `max_generation_retries` attempts, each starting from a
//! fresh conversation and plan. The first accepted test wins; it is saved
//! and the ledger is flushed before `run` returns.

use std::path::PathBuf;

use assertflip_core::{
    AttemptPhase, AttemptRecord, AttemptStatus, Continuation, GenerationMode, InstanceOutcome,
    ProgressCounter, VerdictStatus,
};
use assertflip_llm::Message;

use crate::models::config::{PhaseStrategy, SynthesisConfig};
use crate::storage::OutputStore;
use crate::utils::error::AppResult;

use super::fix_loop::{run_fix_loop, FixLoopSettings};
use super::generation::{extract_python, generate};
use super::instance::InstanceRun;
use super::prompts::{PLANNER_DISABLED, PLAN_UNAVAILABLE};
use super::session::Conversation;
use super::validation::validate;

#[derive(Debug, Clone, Copy)]
pub struct OrchestratorSettings {
    pub phase: PhaseStrategy,
    pub llm_validation: bool,
    pub planner: bool,
    pub max_attempts: u32,
    pub max_generation_retries: u32,
    pub max_generation_sub_attempts: u32,
    pub max_inversion_attempts: u32,
    pub identical_failure_limit: u32,
}

impl From<&SynthesisConfig> for OrchestratorSettings {
    fn from(config: &SynthesisConfig) -> Self {
        Self {
            phase: config.phase,
            llm_validation: config.llm_validation,
            planner: config.planner,
            max_attempts: config.max_attempts,
            max_generation_retries: config.max_generation_retries,
            max_generation_sub_attempts: config.max_generation_sub_attempts,
            max_inversion_attempts: config.max_inversion_attempts,
            identical_failure_limit: config.identical_failure_limit,
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from(&SynthesisConfig::default())
    }
}

/// Final result for one instance
#[derive(Debug, Clone)]
pub struct SynthesisReport {
    pub instance_id: String,
    pub outcome: InstanceOutcome,
    /// Strategy that produced the test, or the last one tried
    pub mode: Option<GenerationMode>,
    pub test_path: Option<PathBuf>,
    /// Absent when the instance was cancelled
    pub ledger_path: Option<PathBuf>,
    pub instance_cost: f64,
    pub cancelled: bool,
}

#[derive(Debug, Clone)]
pub struct PhaseOrchestrator {
    settings: OrchestratorSettings,
}

impl PhaseOrchestrator {
    pub fn new(settings: OrchestratorSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    fn fix_settings(&self, mode: GenerationMode, validate: bool) -> FixLoopSettings {
        FixLoopSettings {
            mode,
            validate,
            max_attempts: self.settings.max_attempts,
            identical_failure_limit: self.settings.identical_failure_limit,
        }
    }

    /// Run every configured strategy until one yields an accepted test,
    /// then persist the test and the ledger.
    pub async fn run(&self, mut run: InstanceRun, store: &OutputStore) -> AppResult<SynthesisReport> {
        let mut accepted: Option<(GenerationMode, String)> = None;
        let mut last_mode = None;

        for mode in self.settings.phase.modes() {
            if run.is_cancelled() {
                break;
            }
            last_mode = Some(mode);
            tracing::info!("[orchestrator] {} starting {}", run.instance_id(), mode);
            if let Some(test) = self.run_strategy(&mut run, mode).await {
                accepted = Some((mode, test));
                break;
            }
            tracing::info!(
                "[orchestrator] {} {} failed after {} generation attempts",
                run.instance_id(),
                mode,
                self.settings.max_generation_retries
            );
        }

        let cancelled = run.is_cancelled() && accepted.is_none();
        let instance_id = run.instance_id().to_string();
        let mut test_path = None;
        let mut save_error = None;
        if let Some((_, test)) = &accepted {
            match store.save_test(&instance_id, test) {
                Ok(path) => {
                    run.progress.inc(ProgressCounter::Generated);
                    test_path = Some(path);
                }
                Err(e) => {
                    tracing::error!("[orchestrator] {} could not save test: {}", instance_id, e);
                    save_error = Some(e);
                }
            }
        }

        let outcome = if test_path.is_some() {
            InstanceOutcome::Success
        } else {
            InstanceOutcome::Failure
        };
        let mode = accepted.as_ref().map(|(m, _)| *m).or(last_mode);
        let instance_cost = run.session.spent();
        let document = run.ledger.finish(
            mode,
            outcome,
            accepted.map(|(_, test)| test),
            run.progress.total_cost(),
            instance_cost,
        );
        // Cancelled instances leave no ledger behind so a resumed run retries them.
        let ledger_path = if cancelled {
            tracing::warn!("[orchestrator] {} cancelled, ledger not written", instance_id);
            None
        } else {
            Some(store.save_ledger(&document)?)
        };

        if let Some(e) = save_error {
            return Err(e);
        }
        if outcome == InstanceOutcome::Failure && !cancelled {
            tracing::error!("[orchestrator] {} no bug-revealing test", instance_id);
        }
        Ok(SynthesisReport {
            instance_id,
            outcome,
            mode,
            test_path,
            ledger_path,
            instance_cost,
            cancelled,
        })
    }

    async fn run_strategy(&self, run: &mut InstanceRun, mode: GenerationMode) -> Option<String> {
        let retries = self.settings.max_generation_retries;
        let mut conversation = self.new_prompt(run, mode, false).await;

        for retry in 1..=retries {
            if run.is_cancelled() {
                return None;
            }
            tracing::info!(
                "[orchestrator] {} {} generation attempt {}/{}",
                run.instance_id(),
                mode,
                retry,
                retries
            );
            let result = match mode {
                GenerationMode::PassingFirst => {
                    self.pass_then_invert(run, &mut conversation, retry).await
                }
                GenerationMode::FailingFirst => {
                    self.direct_fail(run, &mut conversation, retry).await
                }
            };
            if result.is_some() {
                return result;
            }
            if retry < retries && !run.is_cancelled() {
                conversation = self.new_prompt(run, mode, true).await;
            }
        }
        None
    }

    /// Plan (when enabled) and build the initial generation conversation.
    async fn new_prompt(&self, run: &mut InstanceRun, mode: GenerationMode, retry: bool) -> Conversation {
        let previous: Option<Continuation> = retry.then(|| run.ctx.continuation.clone());

        let plan = if self.settings.planner {
            let planning = if run.ctx.continuation.has_attempt() {
                run.prompter.improve_planning(&run.ctx, mode)
            } else {
                run.prompter.planning(&run.ctx, mode)
            };
            match run.session.chat(&planning, true).await {
                Some(plan) => {
                    run.ledger.append(
                        AttemptRecord::new(AttemptPhase::Planning, 0, AttemptStatus::Planned)
                            .with_detail(plan.clone()),
                    );
                    plan
                }
                None => {
                    tracing::warn!("[orchestrator] {} planner gave no reply", run.instance_id());
                    run.ledger.append(AttemptRecord::new(
                        AttemptPhase::Planning,
                        0,
                        AttemptStatus::NoResponse,
                    ));
                    PLAN_UNAVAILABLE.to_string()
                }
            }
        } else {
            PLANNER_DISABLED.to_string()
        };

        run.ctx.continuation = Continuation::with_plan(plan.clone());
        run.prompter
            .initial_generation(&run.ctx, mode, &plan, previous.as_ref())
    }

    async fn direct_fail(
        &self,
        run: &mut InstanceRun,
        conversation: &mut Conversation,
        generation_attempt: u32,
    ) -> Option<String> {
        let candidate = generate(
            &mut run.session,
            run.prompter.as_ref(),
            conversation,
            &mut run.ledger,
            generation_attempt,
            self.settings.max_generation_sub_attempts,
        )
        .await?;

        let settings = self.fix_settings(GenerationMode::FailingFirst, self.settings.llm_validation);
        let outcome = run_fix_loop(run, &settings, candidate, conversation).await;
        outcome.accepted_test().map(String::from)
    }

    async fn pass_then_invert(
        &self,
        run: &mut InstanceRun,
        conversation: &mut Conversation,
        generation_attempt: u32,
    ) -> Option<String> {
        let candidate = generate(
            &mut run.session,
            run.prompter.as_ref(),
            conversation,
            &mut run.ledger,
            generation_attempt,
            self.settings.max_generation_sub_attempts,
        )
        .await?;

        let settings = self.fix_settings(GenerationMode::PassingFirst, false);
        let outcome = run_fix_loop(run, &settings, candidate, conversation).await;
        let passing = outcome.accepted_test()?.to_string();

        self.invert(run, &passing, generation_attempt).await
    }

    /// Turn an accepted passing test into a failing one.
    async fn invert(&self, run: &mut InstanceRun, passing: &str, generation_attempt: u32) -> Option<String> {
        let max = self.settings.max_inversion_attempts;
        let goal = self.fix_settings(GenerationMode::FailingFirst, self.settings.llm_validation);
        let phase = AttemptPhase::InvertToFailing;
        let mut follow_up: Option<Message> = None;

        for attempt in 1..=max {
            if run.is_cancelled() {
                return None;
            }
            tracing::info!(
                "[orchestrator] {} inversion attempt {}/{}",
                run.instance_id(),
                attempt,
                max
            );
            let mut conversation = run.prompter.inversion(run.ctx.problem_statement(), passing);
            if let Some(message) = follow_up.take() {
                conversation.push(message);
            }

            let reply = run.session.chat(&conversation, true).await;
            let Some(inverted) = reply.as_deref().and_then(extract_python) else {
                let status = if reply.is_none() {
                    AttemptStatus::NoResponse
                } else {
                    AttemptStatus::NoCode
                };
                run.ledger.append(AttemptRecord::new(phase, attempt, status));
                follow_up = Some(run.prompter.missing_code());
                continue;
            };
            run.ledger.append(
                AttemptRecord::new(phase, attempt, AttemptStatus::Generated)
                    .with_test_code(inverted.clone()),
            );

            let verdict = run.classifier.classify(&inverted).await;
            let mut record = AttemptRecord::new(phase, attempt, verdict.status.into())
                .with_test_code(inverted.clone())
                .with_coverage(verdict.coverage.clone());
            if let Some(error) = &verdict.error_text {
                record = record.with_error(error.clone());
            }
            run.ledger.append(record);

            if !goal.matches_goal(&verdict) {
                run.progress.inc(ProgressCounter::Failed);
                follow_up = Some(match &verdict.error_text {
                    Some(error) if verdict.status != VerdictStatus::Passing => {
                        run.prompter.revision(error, GenerationMode::FailingFirst)
                    }
                    _ => run.prompter.inversion_still_passing(),
                });
                continue;
            }

            let error = verdict.error_text_or_empty().to_string();
            if !self.settings.llm_validation {
                return Some(inverted);
            }
            let judgement = validate(run, &inverted, &error, attempt).await;
            if judgement.revealing {
                return Some(inverted);
            }

            run.progress.inc(ProgressCounter::Useless);
            run.ledger.append(
                AttemptRecord::new(
                    AttemptPhase::GenerationFeedback,
                    generation_attempt + 1,
                    AttemptStatus::NotRevealing,
                )
                .with_reason(judgement.reason.clone())
                .with_detail("Previous test was rejected; trying a different approach."),
            );
            run.record_continuation(
                Some(inverted.as_str()),
                Some(error.as_str()),
                Some(judgement.reason.as_str()),
            );
            return None;
        }

        run.ledger.append(
            AttemptRecord::new(phase, max, AttemptStatus::Exhausted)
                .with_reason("All inversion attempts produced passing tests; no failing test to validate"),
        );
        let error = format!("Inverted test never failed after {} tries", max);
        run.record_continuation(
            Some(passing),
            Some(error.as_str()),
            Some("Inversion did not yield a failing test"),
        );
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_config() {
        let mut config = SynthesisConfig::default();
        config.phase = PhaseStrategy::DirectFail;
        config.max_inversion_attempts = 2;
        let settings = OrchestratorSettings::from(&config);
        assert_eq!(settings.phase, PhaseStrategy::DirectFail);
        assert_eq!(settings.max_inversion_attempts, 2);
        assert_eq!(settings.max_generation_sub_attempts, 3);
        assert!(settings.llm_validation);
    }
}
