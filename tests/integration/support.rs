//! Scripted oracle and execution doubles shared by the integration tests.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use assertflip::services::synthesis::{
    DefaultPrompter, InstanceRun, OracleClient, OrchestratorSettings,
};
use assertflip::storage::OutputStore;
use assertflip::PhaseStrategy;
use assertflip_core::{BugContext, ProgressTracker};
use assertflip_llm::{
    LlmProvider, LlmRequestOptions, LlmResponse, LlmResult, Message, ProviderConfig,
    RetryPolicy, ToolDefinition,
};
use assertflip_runner::{
    ExecutionEnvironment, ExecutionError, ExecutionResult, RepeatMode, RunOutput,
    VerdictClassifier,
};

// ============================================================================
// Oracle double
// ============================================================================

/// Replies are handed out in order; an exhausted script answers with nothing.
pub struct ScriptedOracle {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<Vec<Message>>>,
    config: ProviderConfig,
}

impl ScriptedOracle {
    pub fn new<S: Into<String>>(replies: impl IntoIterator<Item = S>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            requests: Mutex::new(Vec::new()),
            config: ProviderConfig::default(),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmProvider for ScriptedOracle {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn model(&self) -> &str {
        "gpt-4o"
    }

    async fn send_message(
        &self,
        messages: Vec<Message>,
        _system: Option<String>,
        _tools: Vec<ToolDefinition>,
        _request_options: LlmRequestOptions,
    ) -> LlmResult<LlmResponse> {
        self.requests.lock().unwrap().push(messages);
        let reply = self.replies.lock().unwrap().pop_front().unwrap_or_default();
        Ok(LlmResponse::text(reply, "gpt-4o"))
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }
}

// ============================================================================
// Execution double
// ============================================================================

pub enum Step {
    Exit(i32, &'static str),
    Timeout,
}

pub struct ScriptedEnv {
    script: Mutex<VecDeque<Step>>,
    sources: Mutex<Vec<String>>,
}

impl ScriptedEnv {
    pub fn new(script: Vec<Step>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            sources: Mutex::new(Vec::new()),
        }
    }

    pub fn runs(&self) -> usize {
        self.sources.lock().unwrap().len()
    }

    pub fn sources(&self) -> Vec<String> {
        self.sources.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExecutionEnvironment for ScriptedEnv {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn run(&self, test_source: &str, _repetitions: u32) -> ExecutionResult<RunOutput> {
        self.sources.lock().unwrap().push(test_source.to_string());
        match self.script.lock().unwrap().pop_front() {
            Some(Step::Exit(code, output)) => Ok(RunOutput {
                exit_code: Some(code),
                output: output.as_bytes().to_vec(),
                coverage: None,
            }),
            Some(Step::Timeout) => Err(ExecutionError::Timeout { secs: 120 }),
            None => Err(ExecutionError::Spawn("script exhausted".to_string())),
        }
    }
}

// ============================================================================
// Harness
// ============================================================================

pub fn code(body: &str) -> String {
    format!("Here is the test.\n```python\n{}\n```", body)
}

pub fn judgement(revealing: bool, reason: &str) -> String {
    serde_json::json!({ "reason": reason, "revealing": revealing }).to_string()
}

pub fn settings(phase: PhaseStrategy, llm_validation: bool) -> OrchestratorSettings {
    OrchestratorSettings {
        phase,
        llm_validation,
        planner: false,
        max_generation_retries: 1,
        ..OrchestratorSettings::default()
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub oracle: Arc<ScriptedOracle>,
    pub env: Arc<ScriptedEnv>,
    pub progress: Arc<ProgressTracker>,
    pub store: OutputStore,
    pub cancel: CancellationToken,
}

impl Harness {
    pub fn new<S: Into<String>>(replies: impl IntoIterator<Item = S>, steps: Vec<Step>) -> Self {
        let dir = TempDir::new().unwrap();
        let store = OutputStore::new(dir.path().join("tests"), dir.path().join("results"), "af");
        Self {
            oracle: Arc::new(ScriptedOracle::new(replies)),
            env: Arc::new(ScriptedEnv::new(steps)),
            progress: Arc::new(ProgressTracker::new(1)),
            store,
            cancel: CancellationToken::new(),
            dir,
        }
    }

    pub fn client(&self) -> OracleClient {
        OracleClient::new(self.oracle.clone(), self.progress.clone())
            .with_retry_policy(RetryPolicy::new(0, 1))
    }

    pub fn classifier(&self) -> VerdictClassifier {
        VerdictClassifier::new(self.env.clone(), 1, RepeatMode::Inline)
    }

    pub fn instance(&self, instance_id: &str) -> InstanceRun {
        let ctx = BugContext::new(
            instance_id,
            "parse('1') returns a string instead of an int",
            "def parse(s):\n    return s\n",
        );
        InstanceRun::new(
            ctx,
            self.client().session(instance_id),
            Arc::new(DefaultPrompter::default()),
            self.classifier(),
            self.progress.clone(),
            self.cancel.clone(),
        )
    }

    pub fn tests_dir(&self) -> PathBuf {
        self.dir.path().join("tests")
    }

    pub fn results_dir(&self) -> PathBuf {
        self.dir.path().join("results")
    }

    /// Ledger entries as written to disk
    pub fn ledger(&self, instance_id: &str) -> Vec<serde_json::Value> {
        let raw = std::fs::read_to_string(self.store.ledger_path(instance_id)).unwrap();
        serde_json::from_str(&raw).unwrap()
    }
}

/// Attempt records of `phase`, as (attempt, status) pairs.
pub fn records(ledger: &[serde_json::Value], phase: &str) -> Vec<(u64, String)> {
    ledger
        .iter()
        .filter(|e| e["phase"] == phase && e.get("seq").is_some())
        .map(|e| {
            (
                e["attempt"].as_u64().unwrap(),
                e["status"].as_str().unwrap().to_string(),
            )
        })
        .collect()
}
