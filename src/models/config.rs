//! Run Configuration
//!
//! `SynthesisConfig` is read from an optional TOML file and then patched with
//! command-line overrides. Every field has a default, so an empty file (or no
//! file) yields a usable configuration.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use assertflip_core::GenerationMode;
use assertflip_llm::{ProviderConfig, ProviderType, RetryPolicy};
use assertflip_runner::{LocalEnvironmentConfig, RepeatMode};

use crate::utils::error::{AppError, AppResult};
use crate::utils::paths::expand_home;

/// Which strategies to run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum PhaseStrategy {
    /// Pass-then-invert, falling back to direct-fail
    #[default]
    Both,
    PassThenInvert,
    DirectFail,
}

impl PhaseStrategy {
    pub fn modes(&self) -> Vec<GenerationMode> {
        match self {
            PhaseStrategy::Both => vec![GenerationMode::PassingFirst, GenerationMode::FailingFirst],
            PhaseStrategy::PassThenInvert => vec![GenerationMode::PassingFirst],
            PhaseStrategy::DirectFail => vec![GenerationMode::FailingFirst],
        }
    }
}

/// How candidates are executed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Directory throwaway candidates are written to
    pub tests_dir: PathBuf,
    /// Working directory of the test command (the checkout)
    pub working_dir: PathBuf,
    pub test_cmd: String,
    pub pytest_args: Vec<String>,
    pub python: String,
    /// Repetitions per execution, to catch flaky candidates
    pub repeat_tests: u32,
    pub repeat_mode: RepeatMode,
    pub timeout_secs: u64,
    /// Pass the module name instead of the file path (Django runner)
    pub pass_module_name: bool,
    pub coverage: bool,
    pub env: HashMap<String, String>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            tests_dir: PathBuf::from("tests"),
            working_dir: PathBuf::from("."),
            test_cmd: "pytest".to_string(),
            pytest_args: Vec::new(),
            python: "python".to_string(),
            repeat_tests: 5,
            repeat_mode: RepeatMode::Inline,
            timeout_secs: 120,
            pass_module_name: false,
            coverage: true,
            env: HashMap::new(),
        }
    }
}

impl ExecutionConfig {
    pub fn environment_config(&self) -> LocalEnvironmentConfig {
        LocalEnvironmentConfig {
            python: self.python.clone(),
            test_cmd: self.test_cmd.clone(),
            pytest_args: self.pytest_args.clone(),
            tests_dir: expand_home(&self.tests_dir),
            working_dir: expand_home(&self.working_dir),
            timeout: Duration::from_secs(self.timeout_secs),
            pass_module_name: self.pass_module_name,
            coverage: self.coverage,
            env: self.env.clone(),
        }
    }
}

/// Reasoning oracle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub provider: ProviderType,
    pub model: String,
    /// Falls back to `OPENAI_API_KEY`
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub temperature: f32,
    pub max_tokens_per_response: Option<u32>,
    /// Shared token budget per minute; 0 disables limiting
    pub rate_limit_tokens_per_minute: u64,
    pub max_backoff_secs: u64,
    pub max_retries: u32,
    pub proxy: Option<String>,
    pub request_timeout_secs: u64,
    /// Offer the `get_info` tool during generation
    pub tools: bool,
    /// Checkout the `get_info` tool resolves relative paths against
    pub source_root: PathBuf,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider: ProviderType::OpenAI,
            model: "gpt-4o".to_string(),
            api_key: None,
            base_url: None,
            temperature: 0.0,
            max_tokens_per_response: None,
            rate_limit_tokens_per_minute: 0,
            max_backoff_secs: 64,
            max_retries: 10,
            proxy: None,
            request_timeout_secs: 600,
            tools: true,
            source_root: PathBuf::from("."),
        }
    }
}

impl OracleConfig {
    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            provider: self.provider,
            api_key: self
                .api_key
                .clone()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok())
                .filter(|k| !k.is_empty()),
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            max_tokens: self.max_tokens_per_response,
            temperature: self.temperature,
            proxy: self.proxy.clone(),
            request_timeout_secs: self.request_timeout_secs,
            options: HashMap::new(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.max_backoff_secs)
    }
}

/// Where results are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub prefix: String,
    /// Defaults to `execution.tests_dir`
    pub tests_dir: Option<PathBuf>,
    pub results_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            prefix: "assertflip".to_string(),
            tests_dir: None,
            results_dir: PathBuf::from("results"),
        }
    }
}

/// Complete run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub phase: PhaseStrategy,
    /// Gate failing candidates on an oracle judgement of relevance
    pub llm_validation: bool,
    /// Ask the oracle for a plan before each generation attempt
    pub planner: bool,
    pub max_attempts: u32,
    pub max_generation_retries: u32,
    pub max_generation_sub_attempts: u32,
    pub max_inversion_attempts: u32,
    pub identical_failure_limit: u32,
    pub execution: ExecutionConfig,
    pub oracle: OracleConfig,
    pub output: OutputConfig,
    /// Token ceiling for the localized code excerpt
    pub max_tokens: usize,
    pub max_concurrent_instances: usize,
    /// Instances rerun even when a ledger already exists
    pub force_instances: Vec<String>,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            phase: PhaseStrategy::Both,
            llm_validation: true,
            planner: true,
            max_attempts: 10,
            max_generation_retries: 10,
            max_generation_sub_attempts: 3,
            max_inversion_attempts: 3,
            identical_failure_limit: 3,
            execution: ExecutionConfig::default(),
            oracle: OracleConfig::default(),
            output: OutputConfig::default(),
            max_tokens: 90_000,
            max_concurrent_instances: 1,
            force_instances: Vec::new(),
        }
    }
}

/// Partial update taken from the command line.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub phase: Option<PhaseStrategy>,
    pub llm_validation: Option<bool>,
    pub planner: Option<bool>,
    pub max_attempts: Option<u32>,
    pub max_generation_retries: Option<u32>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub temperature: Option<f32>,
    pub tests_dir: Option<PathBuf>,
    pub working_dir: Option<PathBuf>,
    pub test_cmd: Option<String>,
    pub repeat_tests: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub results_dir: Option<PathBuf>,
    pub prefix: Option<String>,
    pub max_concurrent_instances: Option<usize>,
    pub force_instances: Vec<String>,
}

impl SynthesisConfig {
    /// Load from a TOML file, or defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    AppError::config(format!("cannot read {}: {}", path.display(), e))
                })?;
                toml::from_str(&content)?
            }
            None => Self::default(),
        };
        Ok(config)
    }

    /// Apply a partial update to the configuration
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(phase) = overrides.phase {
            self.phase = phase;
        }
        if let Some(enabled) = overrides.llm_validation {
            self.llm_validation = enabled;
        }
        if let Some(enabled) = overrides.planner {
            self.planner = enabled;
        }
        if let Some(max) = overrides.max_attempts {
            self.max_attempts = max;
        }
        if let Some(max) = overrides.max_generation_retries {
            self.max_generation_retries = max;
        }
        if let Some(model) = overrides.model {
            self.oracle.model = model;
        }
        if let Some(base_url) = overrides.base_url {
            self.oracle.base_url = Some(base_url);
        }
        if let Some(temperature) = overrides.temperature {
            self.oracle.temperature = temperature;
        }
        if let Some(dir) = overrides.tests_dir {
            self.execution.tests_dir = dir;
        }
        if let Some(dir) = overrides.working_dir {
            self.execution.working_dir = dir;
        }
        if let Some(cmd) = overrides.test_cmd {
            self.execution.test_cmd = cmd;
        }
        if let Some(repeat) = overrides.repeat_tests {
            self.execution.repeat_tests = repeat;
        }
        if let Some(secs) = overrides.timeout_secs {
            self.execution.timeout_secs = secs;
        }
        if let Some(dir) = overrides.results_dir {
            self.output.results_dir = dir;
        }
        if let Some(prefix) = overrides.prefix {
            self.output.prefix = prefix;
        }
        if let Some(max) = overrides.max_concurrent_instances {
            self.max_concurrent_instances = max;
        }
        self.force_instances.extend(overrides.force_instances);
    }

    /// Directory accepted tests are persisted to
    pub fn output_tests_dir(&self) -> PathBuf {
        expand_home(
            self.output
                .tests_dir
                .as_deref()
                .unwrap_or(&self.execution.tests_dir),
        )
    }

    pub fn results_dir(&self) -> PathBuf {
        expand_home(&self.output.results_dir)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        let budgets = [
            ("max_attempts", self.max_attempts),
            ("max_generation_retries", self.max_generation_retries),
            ("max_generation_sub_attempts", self.max_generation_sub_attempts),
            ("max_inversion_attempts", self.max_inversion_attempts),
            ("identical_failure_limit", self.identical_failure_limit),
            ("execution.repeat_tests", self.execution.repeat_tests),
        ];
        for (name, value) in budgets {
            if value == 0 {
                return Err(format!("{} must be at least 1", name));
            }
        }
        if self.execution.timeout_secs == 0 {
            return Err("execution.timeout_secs must be at least 1".to_string());
        }
        if self.max_concurrent_instances == 0 {
            return Err("max_concurrent_instances must be at least 1".to_string());
        }
        if self.max_tokens == 0 {
            return Err("max_tokens must be at least 1".to_string());
        }
        if self.oracle.model.trim().is_empty() {
            return Err("oracle.model must not be empty".to_string());
        }
        if self.execution.test_cmd.trim().is_empty() {
            return Err("execution.test_cmd must not be empty".to_string());
        }
        if self.execution.python.trim().is_empty() {
            return Err("execution.python must not be empty".to_string());
        }
        if self.output.prefix.trim().is_empty() {
            return Err("output.prefix must not be empty".to_string());
        }
        if self.oracle.provider == ProviderType::OpenAICompatible && self.oracle.base_url.is_none()
        {
            return Err("oracle.base_url is required for openai_compatible".to_string());
        }
        Ok(())
    }
}
