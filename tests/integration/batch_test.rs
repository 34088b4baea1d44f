//! Batch Runner Integration Tests
//!
//! Resume, forced re-runs, cancellation, and summary counts over small
//! datasets.

use std::sync::Arc;

use assertflip::services::synthesis::{DefaultPrompter, OracleClient};
use assertflip::services::BatchRunner;
use assertflip::storage::OutputStore;
use assertflip::{parse_dataset, PhaseStrategy, SynthesisConfig};
use assertflip_core::ProgressTracker;
use assertflip_llm::RetryPolicy;
use assertflip_runner::{RepeatMode, VerdictClassifier};
use tokio_util::sync::CancellationToken;

use crate::support::{code, Harness, Step};

const DATASET: &str = r#"[
    {"instance_id": "a", "problem_statement": "a is broken", "localized_code": "def a(): pass"},
    {"instance_id": "b", "problem_statement": "b is broken", "localized_code": "def b(): pass"}
]"#;

fn config(h: &Harness) -> SynthesisConfig {
    let mut config = SynthesisConfig::default();
    config.phase = PhaseStrategy::DirectFail;
    config.llm_validation = false;
    config.planner = false;
    config.max_generation_retries = 1;
    config.execution.tests_dir = h.tests_dir();
    config.output.results_dir = h.results_dir();
    config.output.prefix = "af".to_string();
    config
}

fn runner(h: &Harness, config: SynthesisConfig, progress: Arc<ProgressTracker>) -> BatchRunner {
    let store = OutputStore::from_config(&config);
    let oracle = OracleClient::new(h.oracle.clone(), progress).with_retry_policy(RetryPolicy::new(0, 1));
    BatchRunner::new(
        Arc::new(config),
        oracle,
        Arc::new(DefaultPrompter::default()),
        VerdictClassifier::new(h.env.clone(), 1, RepeatMode::Inline),
        store,
        h.cancel.clone(),
    )
}

#[tokio::test]
async fn test_batch_runs_every_instance() {
    let h = Harness::new(
        [code("def test_a(): assert a()"), code("def test_b(): assert b()")],
        vec![
            Step::Exit(1, "AssertionError: a"),
            Step::Exit(1, "AssertionError: b"),
        ],
    );
    let progress = Arc::new(ProgressTracker::new(2));
    let batch = runner(&h, config(&h), progress.clone());

    let summary = batch.run(parse_dataset(DATASET).unwrap()).await;

    assert_eq!(summary.succeeded, 2);
    assert!(summary.all_succeeded());
    let snapshot = progress.snapshot();
    assert_eq!(snapshot.completed, 2);
    assert_eq!(snapshot.generated, 2);
    assert!(h.store.test_path("a").exists());
    assert!(h.store.has_ledger("b"));
}

#[tokio::test]
async fn test_batch_skips_instances_with_ledger_unless_forced() {
    let h = Harness::new(
        [code("def test_b(): assert b()")],
        vec![Step::Exit(1, "AssertionError: b")],
    );
    std::fs::create_dir_all(h.results_dir()).unwrap();
    std::fs::write(h.store.ledger_path("a"), "[]").unwrap();
    let progress = Arc::new(ProgressTracker::new(2));
    let batch = runner(&h, config(&h), progress.clone());

    let summary = batch.run(parse_dataset(DATASET).unwrap()).await;

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(h.env.runs(), 1);
    assert_eq!(progress.snapshot().completed, 2);

    let forced = Harness::new(
        [code("def test_a(): assert a()")],
        vec![Step::Exit(1, "AssertionError: a")],
    );
    std::fs::create_dir_all(forced.results_dir()).unwrap();
    std::fs::write(forced.store.ledger_path("a"), "[]").unwrap();
    let mut cfg = config(&forced);
    cfg.force_instances = vec!["a".to_string()];
    let batch = runner(&forced, cfg, Arc::new(ProgressTracker::new(1)));

    let one = parse_dataset(DATASET)
        .unwrap()
        .into_iter()
        .filter(|i| i.instance_id == "a")
        .collect();
    let summary = batch.run(one).await;

    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.succeeded, 1);
}

#[tokio::test(start_paused = true)]
async fn test_batch_reports_failed_instances() {
    let h = Harness::new(Vec::<String>::new(), Vec::new());
    let batch = runner(&h, config(&h), Arc::new(ProgressTracker::new(2)));

    let summary = batch.run(parse_dataset(DATASET).unwrap()).await;

    assert_eq!(summary.failed, 2);
    assert!(!summary.all_succeeded());
    assert!(h.store.has_ledger("a"));
    assert!(!h.store.test_path("a").exists());
}

#[tokio::test]
async fn test_cancelled_batch_runs_nothing() {
    let h = Harness::new([code("def test_a(): pass")], vec![Step::Exit(1, "AssertionError")]);
    let batch = runner(&h, config(&h), Arc::new(ProgressTracker::new(2)));
    let token: CancellationToken = batch.cancel_token();
    token.cancel();

    let summary = batch.run(parse_dataset(DATASET).unwrap()).await;

    assert_eq!(summary.cancelled, 2);
    assert_eq!(h.env.runs(), 0);
    assert!(!h.store.has_ledger("a"));
}
