//! Validation Gate
//!
//! Secondary oracle judgement on whether a failing candidate fails because
//! of the reported bug.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use assertflip_core::{AttemptPhase, AttemptRecord, AttemptStatus};

use super::instance::InstanceRun;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ValidationResult {
    /// Why the failure does or does not reveal the bug
    pub reason: String,
    /// Whether the test failure reveals the reported bug
    pub revealing: bool,
}

impl ValidationResult {
    /// Stand-in for a missing or unparseable judgement.
    pub fn unusable() -> Self {
        Self {
            reason: "The validator returned no usable judgement, so the failure is not accepted as revealing the bug.".to_string(),
            revealing: false,
        }
    }
}

/// Judge `test_code` and its `error_text`, recording the outcome.
pub async fn validate(
    run: &mut InstanceRun,
    test_code: &str,
    error_text: &str,
    attempt: u32,
) -> ValidationResult {
    let conversation = run.prompter.validation(&run.ctx, test_code, error_text);
    let result = match run
        .session
        .judge::<ValidationResult>(&conversation, "ValidationResult")
        .await
    {
        Some(result) => result,
        None => ValidationResult::unusable(),
    };

    tracing::info!(
        "[validation] {} attempt {} revealing={}",
        run.instance_id(),
        attempt,
        result.revealing
    );
    let status = if result.revealing {
        AttemptStatus::Revealing
    } else {
        AttemptStatus::NotRevealing
    };
    run.ledger.append(
        AttemptRecord::new(AttemptPhase::ValidateBug, attempt, status)
            .with_test_code(test_code)
            .with_error(error_text)
            .with_reason(result.reason.clone())
            .with_revealing(result.revealing),
    );
    result
}
