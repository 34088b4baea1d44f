//! Command-line interface
//!
//! `assertflip run --dataset <file> [--config <toml>] [overrides...]`. Flags
//! override values loaded from the config file.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::models::config::{ConfigOverrides, PhaseStrategy};

#[derive(Parser, Debug)]
#[command(
    name = "assertflip",
    version,
    about = "Synthesize bug-revealing tests with a reasoning oracle"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run synthesis over one or more dataset instances
    Run(RunArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Dataset JSON (a single instance or an array of instances)
    #[arg(long)]
    pub dataset: PathBuf,
    /// TOML run configuration
    #[arg(long, env = "ASSERTFLIP_CONFIG")]
    pub config: Option<PathBuf>,
    #[arg(long, value_enum)]
    pub phase: Option<PhaseStrategy>,
    /// Gate failing tests on the oracle's relevance judgement
    #[arg(long, value_name = "BOOL")]
    pub llm_validation: Option<bool>,
    #[arg(long, value_name = "BOOL")]
    pub planner: Option<bool>,
    #[arg(long)]
    pub max_attempts: Option<u32>,
    #[arg(long)]
    pub max_generation_retries: Option<u32>,
    #[arg(long)]
    pub model: Option<String>,
    #[arg(long)]
    pub base_url: Option<String>,
    #[arg(long)]
    pub temperature: Option<f32>,
    /// Directory candidates are executed from
    #[arg(long)]
    pub tests_dir: Option<PathBuf>,
    #[arg(long)]
    pub working_dir: Option<PathBuf>,
    #[arg(long)]
    pub test_cmd: Option<String>,
    #[arg(long)]
    pub repeat_tests: Option<u32>,
    #[arg(long)]
    pub timeout_secs: Option<u64>,
    #[arg(long)]
    pub results_dir: Option<PathBuf>,
    #[arg(long)]
    pub prefix: Option<String>,
    #[arg(long)]
    pub max_concurrent_instances: Option<usize>,
    /// Re-run these instances even if a ledger already exists
    #[arg(long = "force", value_delimiter = ',')]
    pub force_instances: Vec<String>,
}

impl RunArgs {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            phase: self.phase,
            llm_validation: self.llm_validation,
            planner: self.planner,
            max_attempts: self.max_attempts,
            max_generation_retries: self.max_generation_retries,
            model: self.model.clone(),
            base_url: self.base_url.clone(),
            temperature: self.temperature,
            tests_dir: self.tests_dir.clone(),
            working_dir: self.working_dir.clone(),
            test_cmd: self.test_cmd.clone(),
            repeat_tests: self.repeat_tests,
            timeout_secs: self.timeout_secs,
            results_dir: self.results_dir.clone(),
            prefix: self.prefix.clone(),
            max_concurrent_instances: self.max_concurrent_instances,
            force_instances: self.force_instances.clone(),
        }
    }
}
