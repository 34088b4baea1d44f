// AssertFlip - command-line entry point

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use assertflip::cli::{Cli, Commands, RunArgs};
use assertflip::models::config::SynthesisConfig;
use assertflip::models::dataset::load_dataset;
use assertflip::services::synthesis::{DefaultPrompter, OracleClient};
use assertflip::services::BatchRunner;
use assertflip::storage::OutputStore;
use assertflip_core::ProgressTracker;
use assertflip_llm::{OpenAIProvider, TokenRateLimiter};
use assertflip_runner::{LocalEnvironment, VerdictClassifier};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run(args) => run(args).await,
    };
    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: RunArgs) -> Result<bool> {
    let mut config = SynthesisConfig::load(args.config.as_deref())?;
    config.apply_overrides(args.overrides());
    config
        .validate()
        .map_err(|e| anyhow!("invalid configuration: {}", e))?;

    let instances = load_dataset(&args.dataset)
        .with_context(|| format!("loading dataset {}", args.dataset.display()))?;
    let progress = Arc::new(ProgressTracker::new(instances.len() as u64));

    let provider = OpenAIProvider::new(config.oracle.provider_config())
        .map_err(|e| anyhow!("oracle provider: {}", e))?;
    let mut oracle = OracleClient::new(Arc::new(provider), progress.clone())
        .with_retry_policy(config.oracle.retry_policy())
        .with_rate_limiter(Arc::new(TokenRateLimiter::per_minute(
            config.oracle.rate_limit_tokens_per_minute,
        )));
    if config.oracle.tools {
        oracle = oracle.with_tools(
            assertflip_tools::default_registry(),
            config.oracle.source_root.clone(),
        );
    }

    let environment = Arc::new(LocalEnvironment::new(config.execution.environment_config()));
    let classifier = VerdictClassifier::new(
        environment,
        config.execution.repeat_tests,
        config.execution.repeat_mode,
    );
    let store = OutputStore::from_config(&config);
    let cancel = CancellationToken::new();

    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("[main] interrupt received, stopping after current attempts");
            ctrl_c.cancel();
        }
    });

    let runner = BatchRunner::new(
        Arc::new(config),
        oracle,
        Arc::new(DefaultPrompter::default()),
        classifier,
        store,
        cancel,
    );
    let summary = runner.run(instances).await;

    println!("{}", progress.snapshot());
    Ok(summary.all_succeeded())
}
