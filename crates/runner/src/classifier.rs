//! Verdict Classifier
//!
//! Turns raw environment runs into a single [`Verdict`]. Repetitions are
//! either delegated to the environment (one invocation) or executed as
//! separate invocations whose results are aggregated.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use assertflip_core::VerdictStatus;

use crate::clean::clean_error;
use crate::environment::ExecutionEnvironment;
use crate::verdict::Verdict;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatMode {
    /// Single invocation, the environment repeats the test itself
    #[default]
    Inline,
    /// One invocation per repetition
    Separate,
}

#[derive(Clone)]
pub struct VerdictClassifier {
    environment: Arc<dyn ExecutionEnvironment>,
    repetitions: u32,
    mode: RepeatMode,
}

impl VerdictClassifier {
    pub fn new(environment: Arc<dyn ExecutionEnvironment>, repetitions: u32, mode: RepeatMode) -> Self {
        Self {
            environment,
            repetitions: repetitions.max(1),
            mode,
        }
    }

    pub fn repetitions(&self) -> u32 {
        self.repetitions
    }

    pub async fn classify(&self, test_source: &str) -> Verdict {
        classify(
            self.environment.as_ref(),
            test_source,
            self.repetitions,
            self.mode,
        )
        .await
    }
}

/// Classify `test_source` over `repetitions` runs.
///
/// Inline mode falls back to separate runs when the environment cannot
/// repeat on its own.
pub async fn classify(
    environment: &dyn ExecutionEnvironment,
    test_source: &str,
    repetitions: u32,
    mode: RepeatMode,
) -> Verdict {
    let repetitions = repetitions.max(1);
    let inline = mode == RepeatMode::Inline && environment.supports_inline_repeat();

    if repetitions == 1 || inline {
        let mut verdict = run_once(environment, test_source, repetitions).await;
        verdict.repetitions = repetitions;
        return verdict;
    }

    let mut runs = Vec::with_capacity(repetitions as usize);
    for i in 0..repetitions {
        let verdict = run_once(environment, test_source, 1).await;
        let stop = verdict.status == VerdictStatus::Error;
        runs.push(verdict);
        if stop {
            tracing::debug!("[runner] repetition {} errored, stopping", i + 1);
            break;
        }
    }
    aggregate(runs)
}

async fn run_once(environment: &dyn ExecutionEnvironment, test_source: &str, count: u32) -> Verdict {
    match environment.run(test_source, count).await {
        Ok(out) if out.success() => Verdict::passing(out.output, out.coverage),
        Ok(out) => {
            let text = clean_error(&String::from_utf8_lossy(&out.output));
            Verdict::failing(out.output, text, out.coverage)
        }
        Err(e) => {
            tracing::warn!("[runner] {} run failed: {}", environment.name(), e);
            let output = e.output().map(<[u8]>::to_vec).unwrap_or_default();
            let text = if output.is_empty() {
                e.to_string()
            } else {
                format!("{}\n{}", e, String::from_utf8_lossy(&output))
            };
            Verdict::error(output, text)
        }
    }
}

/// Any error wins, then any failure; mixed pass/fail is flaky.
fn aggregate(runs: Vec<Verdict>) -> Verdict {
    let count = runs.len() as u32;
    let passes = runs.iter().filter(|v| v.status == VerdictStatus::Passing).count();
    let fails = runs.iter().filter(|v| v.status == VerdictStatus::Failing).count();
    let raw_output: Vec<u8> = runs.iter().flat_map(|v| v.raw_output.iter().copied()).collect();

    let pick = |status: VerdictStatus| runs.iter().position(|v| v.status == status);
    let index = pick(VerdictStatus::Error)
        .or_else(|| pick(VerdictStatus::Failing))
        .unwrap_or(runs.len().saturating_sub(1));

    let mut verdict = runs
        .into_iter()
        .nth(index)
        .unwrap_or_else(|| Verdict::error(Vec::new(), "no runs executed"));
    verdict.flaky = verdict.status != VerdictStatus::Error && passes > 0 && fails > 0;
    verdict.raw_output = raw_output;
    verdict.repetitions = count;
    verdict
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::RunOutput;
    use crate::error::{ExecutionError, ExecutionResult};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    enum Scripted {
        Exit(i32, &'static str),
        Timeout,
        NoCoverage(&'static str),
    }

    struct ScriptedEnv {
        inline: bool,
        script: Mutex<VecDeque<Scripted>>,
        calls: Mutex<Vec<u32>>,
    }

    impl ScriptedEnv {
        fn new(inline: bool, script: Vec<Scripted>) -> Self {
            Self {
                inline,
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ExecutionEnvironment for ScriptedEnv {
        fn name(&self) -> &str {
            "scripted"
        }

        fn supports_inline_repeat(&self) -> bool {
            self.inline
        }

        async fn run(&self, _src: &str, repetitions: u32) -> ExecutionResult<RunOutput> {
            self.calls.lock().unwrap().push(repetitions);
            match self.script.lock().unwrap().pop_front() {
                Some(Scripted::Exit(code, out)) => Ok(RunOutput {
                    exit_code: Some(code),
                    output: out.as_bytes().to_vec(),
                    coverage: None,
                }),
                Some(Scripted::Timeout) => Err(ExecutionError::Timeout { secs: 1 }),
                Some(Scripted::NoCoverage(out)) => Err(ExecutionError::MissingCoverage {
                    output: out.as_bytes().to_vec(),
                }),
                None => Ok(RunOutput {
                    exit_code: Some(0),
                    ..Default::default()
                }),
            }
        }
    }

    #[tokio::test]
    async fn test_inline_single_invocation() {
        let env = ScriptedEnv::new(true, vec![Scripted::Exit(0, "5 passed")]);
        let verdict = classify(&env, "src", 5, RepeatMode::Inline).await;
        assert_eq!(verdict.status, VerdictStatus::Passing);
        assert_eq!(verdict.repetitions, 5);
        assert_eq!(*env.calls.lock().unwrap(), vec![5]);
    }

    #[tokio::test]
    async fn test_inline_falls_back_to_separate() {
        let env = ScriptedEnv::new(false, vec![]);
        let verdict = classify(&env, "src", 3, RepeatMode::Inline).await;
        assert_eq!(verdict.status, VerdictStatus::Passing);
        assert_eq!(*env.calls.lock().unwrap(), vec![1, 1, 1]);
    }

    #[tokio::test]
    async fn test_failure_text_is_cleaned() {
        let out = "header\n====== FAILURES ======\n_____ test_bug _____\n\nE   assert 1 == 2\n====== short test summary info ======\nFAILED";
        let env = ScriptedEnv::new(true, vec![Scripted::Exit(1, out)]);
        let verdict = classify(&env, "src", 1, RepeatMode::Inline).await;
        assert_eq!(verdict.status, VerdictStatus::Failing);
        assert_eq!(verdict.error_text_or_empty(), "E   assert 1 == 2\n");
    }

    #[tokio::test]
    async fn test_mixed_results_are_flaky() {
        let env = ScriptedEnv::new(
            false,
            vec![Scripted::Exit(0, "ok"), Scripted::Exit(1, "boom"), Scripted::Exit(0, "ok")],
        );
        let verdict = classify(&env, "src", 3, RepeatMode::Separate).await;
        assert_eq!(verdict.status, VerdictStatus::Failing);
        assert!(verdict.flaky);
        assert_eq!(verdict.repetitions, 3);
        assert_eq!(verdict.output_text(), "okboomok");
    }

    #[tokio::test]
    async fn test_error_short_circuits() {
        let env = ScriptedEnv::new(
            false,
            vec![Scripted::Exit(1, "boom"), Scripted::Timeout, Scripted::Exit(0, "ok")],
        );
        let verdict = classify(&env, "src", 3, RepeatMode::Separate).await;
        assert_eq!(verdict.status, VerdictStatus::Error);
        assert!(!verdict.flaky);
        assert_eq!(verdict.repetitions, 2);
        assert!(verdict.error_text_or_empty().contains("timed out"));
    }

    #[tokio::test]
    async fn test_missing_coverage_keeps_output() {
        let env = ScriptedEnv::new(true, vec![Scripted::NoCoverage("SyntaxError: bad")]);
        let verdict = classify(&env, "src", 1, RepeatMode::Inline).await;
        assert_eq!(verdict.status, VerdictStatus::Error);
        assert!(verdict.error_text_or_empty().contains("SyntaxError: bad"));
        assert_eq!(verdict.output_text(), "SyntaxError: bad");
    }
}
