//! Batch Runner
//!
//! Runs the phase orchestrator over a dataset with bounded concurrency.
//! Instances are independent: they share only the oracle client, the
//! execution environment, the output store, and the progress counters.
//! Instances that already have a ledger on disk are skipped unless forced.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use assertflip_core::InstanceOutcome;
use assertflip_runner::VerdictClassifier;

use crate::models::config::SynthesisConfig;
use crate::models::dataset::DatasetInstance;
use crate::storage::OutputStore;

use super::synthesis::{
    InstanceRun, OracleClient, OrchestratorSettings, PhaseOrchestrator, Prompter, SynthesisReport,
};

/// Counts per instance outcome
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: usize,
}

impl BatchSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0 && self.cancelled == 0
    }

    fn record(&mut self, outcome: &InstanceResult) {
        match outcome {
            InstanceResult::Finished(report) if report.cancelled => self.cancelled += 1,
            InstanceResult::Finished(report) if report.outcome == InstanceOutcome::Success => {
                self.succeeded += 1
            }
            InstanceResult::Finished(_) | InstanceResult::Errored => self.failed += 1,
            InstanceResult::Skipped => self.skipped += 1,
            InstanceResult::Cancelled => self.cancelled += 1,
        }
    }
}

#[derive(Debug)]
enum InstanceResult {
    Finished(SynthesisReport),
    Errored,
    Skipped,
    Cancelled,
}

pub struct BatchRunner {
    config: Arc<SynthesisConfig>,
    oracle: OracleClient,
    prompter: Arc<dyn Prompter>,
    classifier: VerdictClassifier,
    store: OutputStore,
    cancel: CancellationToken,
}

impl BatchRunner {
    pub fn new(
        config: Arc<SynthesisConfig>,
        oracle: OracleClient,
        prompter: Arc<dyn Prompter>,
        classifier: VerdictClassifier,
        store: OutputStore,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            oracle,
            prompter,
            classifier,
            store,
            cancel,
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn should_skip(&self, instance_id: &str, forced: &HashSet<String>) -> bool {
        !forced.contains(instance_id) && self.store.has_ledger(instance_id)
    }

    /// Run every instance and wait for all of them.
    pub async fn run(&self, instances: Vec<DatasetInstance>) -> BatchSummary {
        let run_id = Uuid::new_v4();
        let total = instances.len();
        let limit = self.config.max_concurrent_instances.max(1);
        tracing::info!(
            "[batch] run {} starting: {} instances, concurrency {}",
            run_id,
            total,
            limit
        );

        let forced: HashSet<String> = self.config.force_instances.iter().cloned().collect();
        let semaphore = Arc::new(Semaphore::new(limit));
        let orchestrator = Arc::new(PhaseOrchestrator::new(OrchestratorSettings::from(
            self.config.as_ref(),
        )));
        let progress = self.oracle.progress().clone();
        let mut summary = BatchSummary::default();
        let mut handles = Vec::new();

        for instance in instances {
            if self.should_skip(&instance.instance_id, &forced) {
                tracing::info!("[batch] {} already has a ledger, skipping", instance.instance_id);
                progress.complete_one();
                summary.record(&InstanceResult::Skipped);
                continue;
            }

            let sem = semaphore.clone();
            let cancel = self.cancel.clone();
            let orchestrator = orchestrator.clone();
            let oracle = self.oracle.clone();
            let prompter = self.prompter.clone();
            let classifier = self.classifier.clone();
            let store = self.store.clone();
            let progress = progress.clone();
            let max_tokens = self.config.max_tokens;

            handles.push(tokio::spawn(async move {
                let _permit = tokio::select! {
                    permit = sem.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return InstanceResult::Cancelled,
                    },
                    _ = cancel.cancelled() => return InstanceResult::Cancelled,
                };
                if cancel.is_cancelled() {
                    return InstanceResult::Cancelled;
                }

                let instance_id = instance.instance_id.clone();
                let ctx = instance.into_context(max_tokens);
                let run = InstanceRun::new(
                    ctx,
                    oracle.session(instance_id.clone()),
                    prompter,
                    classifier,
                    progress.clone(),
                    cancel,
                );
                let result = match orchestrator.run(run, &store).await {
                    Ok(report) => {
                        tracing::info!(
                            "[batch] {} finished: {} (cost ~${:.4})",
                            report.instance_id,
                            report.outcome,
                            report.instance_cost
                        );
                        InstanceResult::Finished(report)
                    }
                    Err(e) => {
                        tracing::error!("[batch] {} failed: {}", instance_id, e);
                        InstanceResult::Errored
                    }
                };
                progress.complete_one();
                tracing::info!("[batch] {}", progress.snapshot());
                result
            }));
        }

        for handle in handles {
            match handle.await {
                Ok(result) => summary.record(&result),
                Err(e) => {
                    tracing::error!("[batch] instance task panicked: {}", e);
                    summary.record(&InstanceResult::Errored);
                }
            }
        }

        tracing::info!(
            "[batch] run {} done: {} succeeded, {} failed, {} skipped, {} cancelled",
            run_id,
            summary.succeeded,
            summary.failed,
            summary.skipped,
            summary.cancelled
        );
        summary
    }
}
