//! Phase Orchestrator Integration Tests
//!
//! Drives whole instances through the orchestrator with a scripted oracle and
//! a scripted execution environment:
//! - pass-then-invert and direct-fail acceptance
//! - identical-failure circuit breaker
//! - fix-loop attempt budget
//! - execution timeouts
//! - `both` falling through to direct-fail
//! - persistence of tests and ledgers

use assertflip::services::synthesis::{OrchestratorSettings, PhaseOrchestrator};
use assertflip::PhaseStrategy;
use assertflip_core::{GenerationMode, InstanceOutcome};

use crate::support::{code, judgement, records, settings, Harness, Step};

const PASSING_TEST: &str = "def test_parse():\n    assert parse('1') == '1'";
const INVERTED_TEST: &str = "def test_parse():\n    assert parse('1') == 1";

// ============================================================================
// Acceptance
// ============================================================================

#[tokio::test]
async fn test_pass_then_invert_accepts_validated_inversion() {
    let h = Harness::new(
        [
            code(PASSING_TEST),
            code(INVERTED_TEST),
            judgement(true, "The assertion checks the parsed type."),
        ],
        vec![
            Step::Exit(0, "1 passed"),
            Step::Exit(1, "E   AssertionError: assert '1' == 1"),
        ],
    );
    let orchestrator = PhaseOrchestrator::new(settings(PhaseStrategy::PassThenInvert, true));

    let report = orchestrator.run(h.instance("inv-1"), &h.store).await.unwrap();

    assert_eq!(report.outcome, InstanceOutcome::Success);
    assert_eq!(report.mode, Some(GenerationMode::PassingFirst));
    let saved = std::fs::read_to_string(report.test_path.unwrap()).unwrap();
    assert_eq!(saved.trim_end(), INVERTED_TEST);
    let sources: Vec<String> = h.env.sources().iter().map(|s| s.trim_end().to_string()).collect();
    assert_eq!(sources, vec![PASSING_TEST, INVERTED_TEST]);
    assert_eq!(h.oracle.calls(), 3);

    let ledger = h.ledger("inv-1");
    assert_eq!(
        records(&ledger, "generate_passing_test"),
        vec![(1, "passing".to_string())]
    );
    assert_eq!(
        records(&ledger, "invert_to_failing"),
        vec![(1, "generated".to_string()), (1, "failing".to_string())]
    );
    assert_eq!(records(&ledger, "validate_bug"), vec![(1, "revealing".to_string())]);
    let termination = ledger.iter().find(|e| e["phase"] == "terminating").unwrap();
    assert_eq!(termination["outcome"], "success");
    assert_eq!(termination["final_test"].as_str().unwrap().trim_end(), INVERTED_TEST);
    assert_eq!(ledger.last().unwrap()["meta"], "cost_summary");
}

#[tokio::test]
async fn test_direct_fail_without_validation_accepts_first_failure() {
    let h = Harness::new(
        [code(INVERTED_TEST)],
        vec![Step::Exit(1, "E   AssertionError: X")],
    );
    let orchestrator = PhaseOrchestrator::new(settings(PhaseStrategy::DirectFail, false));

    let report = orchestrator.run(h.instance("df-1"), &h.store).await.unwrap();

    assert_eq!(report.outcome, InstanceOutcome::Success);
    assert_eq!(report.mode, Some(GenerationMode::FailingFirst));
    // No validation call
    assert_eq!(h.oracle.calls(), 1);
    let ledger = h.ledger("df-1");
    assert_eq!(
        records(&ledger, "generate_failing_test"),
        vec![(1, "failing".to_string())]
    );
    assert!(records(&ledger, "validate_bug").is_empty());
    assert_eq!(h.progress.snapshot().generated, 1);
}

#[tokio::test]
async fn test_planner_reply_is_recorded() {
    let h = Harness::new(
        [
            "1. Call parse('1') and check the type.".to_string(),
            code(INVERTED_TEST),
        ],
        vec![Step::Exit(1, "E   AssertionError: X")],
    );
    let orchestrator = PhaseOrchestrator::new(OrchestratorSettings {
        planner: true,
        ..settings(PhaseStrategy::DirectFail, false)
    });

    let report = orchestrator.run(h.instance("plan-1"), &h.store).await.unwrap();

    assert_eq!(report.outcome, InstanceOutcome::Success);
    assert_eq!(h.oracle.calls(), 2);
    let ledger = h.ledger("plan-1");
    assert_eq!(records(&ledger, "planning"), vec![(0, "planned".to_string())]);
}

// ============================================================================
// Fix loop bounds
// ============================================================================

#[tokio::test]
async fn test_identical_rejected_failures_abandon_at_third() {
    let reason = "The import error is unrelated to the reported bug.";
    let h = Harness::new(
        [
            code("import foo"),
            judgement(false, reason),
            code("import foo  # again"),
            judgement(false, reason),
            code("import foo  # once more"),
            judgement(false, reason),
            code("never requested"),
        ],
        vec![
            Step::Exit(1, "ImportError: foo"),
            Step::Exit(1, "ImportError: foo"),
            Step::Exit(1, "ImportError: foo"),
        ],
    );
    let orchestrator = PhaseOrchestrator::new(settings(PhaseStrategy::DirectFail, true));

    let report = orchestrator.run(h.instance("abandon-1"), &h.store).await.unwrap();

    assert_eq!(report.outcome, InstanceOutcome::Failure);
    assert!(report.test_path.is_none());
    assert_eq!(h.env.runs(), 3);
    assert_eq!(h.oracle.remaining(), 1);

    let ledger = h.ledger("abandon-1");
    let fix = records(&ledger, "generate_failing_test");
    assert_eq!(fix.last(), Some(&(3, "abandoned".to_string())));
    assert_eq!(
        records(&ledger, "validate_bug"),
        vec![
            (1, "not_revealing".to_string()),
            (2, "not_revealing".to_string()),
            (3, "not_revealing".to_string()),
        ]
    );
    assert_eq!(h.progress.snapshot().useless, 3);
    assert!(!h.store.test_path("abandon-1").exists());
}

#[tokio::test]
async fn test_identical_errors_abandon_despite_reworded_rejections() {
    let h = Harness::new(
        [
            code("import foo"),
            judgement(false, "reason one"),
            code("import foo  # two"),
            judgement(false, "reason two"),
            code("import foo  # three"),
            judgement(false, "reason three"),
            code("import foo  # four"),
            judgement(false, "reason four"),
        ],
        vec![
            Step::Exit(1, "ImportError: foo"),
            Step::Exit(1, "ImportError: foo"),
            Step::Exit(1, "ImportError: foo"),
            Step::Exit(1, "ImportError: foo"),
        ],
    );
    let orchestrator = PhaseOrchestrator::new(settings(PhaseStrategy::DirectFail, true));

    let report = orchestrator.run(h.instance("reworded-1"), &h.store).await.unwrap();

    assert_eq!(report.outcome, InstanceOutcome::Failure);
    assert_eq!(h.env.runs(), 3);
    let fix = records(&h.ledger("reworded-1"), "generate_failing_test");
    assert_eq!(fix.last(), Some(&(3, "abandoned".to_string())));
    assert!(!fix.iter().any(|(attempt, _)| *attempt > 3));
}

#[tokio::test]
async fn test_identical_failure_limit_is_configurable() {
    let h = Harness::new(
        [code("def test_a(): assert False"), code("def test_a(): assert 0")],
        vec![
            Step::Exit(1, "AssertionError: same"),
            Step::Exit(1, "AssertionError: same"),
        ],
    );
    let orchestrator = PhaseOrchestrator::new(OrchestratorSettings {
        identical_failure_limit: 2,
        ..settings(PhaseStrategy::PassThenInvert, false)
    });

    orchestrator.run(h.instance("limit-2"), &h.store).await.unwrap();

    assert_eq!(h.env.runs(), 2);
    let fix = records(&h.ledger("limit-2"), "generate_passing_test");
    assert_eq!(fix.last(), Some(&(2, "abandoned".to_string())));
}

#[tokio::test]
async fn test_fix_loop_never_exceeds_max_attempts() {
    let h = Harness::new(
        (0..6).map(|i| code(&format!("def test_{i}(): assert parse('1') == {i}"))),
        vec![
            Step::Exit(1, "AssertionError: 1 != 0"),
            Step::Exit(1, "AssertionError: 1 != 1"),
            Step::Exit(1, "AssertionError: 1 != 2"),
            Step::Exit(1, "AssertionError: 1 != 3"),
            Step::Exit(0, "never reached"),
        ],
    );
    let orchestrator = PhaseOrchestrator::new(OrchestratorSettings {
        max_attempts: 4,
        ..settings(PhaseStrategy::PassThenInvert, false)
    });

    let report = orchestrator.run(h.instance("budget-1"), &h.store).await.unwrap();

    assert_eq!(report.outcome, InstanceOutcome::Failure);
    assert_eq!(h.env.runs(), 4);
    let fix = records(&h.ledger("budget-1"), "generate_passing_test");
    let executions = fix
        .iter()
        .filter(|(_, s)| s == "failing" || s == "passing" || s == "error")
        .count();
    assert_eq!(executions, 4);
    assert_eq!(fix.last(), Some(&(4, "exhausted".to_string())));
    assert_eq!(h.progress.snapshot().failed, 4);
}

#[tokio::test]
async fn test_timeout_consumes_an_attempt_and_loop_continues() {
    let h = Harness::new(
        [code("def test_slow(): loop()"), code(INVERTED_TEST)],
        vec![Step::Timeout, Step::Exit(1, "AssertionError: X")],
    );
    let orchestrator = PhaseOrchestrator::new(settings(PhaseStrategy::DirectFail, false));

    let report = orchestrator.run(h.instance("timeout-1"), &h.store).await.unwrap();

    assert_eq!(report.outcome, InstanceOutcome::Success);
    let ledger = h.ledger("timeout-1");
    let fix: Vec<_> = ledger
        .iter()
        .filter(|e| e["phase"] == "generate_failing_test" && e["status"] == "error")
        .collect();
    assert_eq!(fix.len(), 1);
    assert_eq!(fix[0]["attempt"], 1);
    assert!(fix[0]["error"].as_str().unwrap().contains("timed out"));
    assert_eq!(
        records(&ledger, "generate_failing_test").last(),
        Some(&(2, "failing".to_string()))
    );
}

// ============================================================================
// Strategy fallthrough
// ============================================================================

#[tokio::test]
async fn test_both_falls_through_to_direct_fail_after_passing_inversions() {
    let direct = "def test_direct():\n    assert isinstance(parse('1'), int)";
    let h = Harness::new(
        [
            code(PASSING_TEST),
            code("def test_inv1(): assert True"),
            code("def test_inv2(): assert True"),
            code("def test_inv3(): assert True"),
            code(direct),
        ],
        vec![
            Step::Exit(0, "passed"),
            Step::Exit(0, "passed"),
            Step::Exit(0, "passed"),
            Step::Exit(0, "passed"),
            Step::Exit(1, "AssertionError: assert False"),
        ],
    );
    let orchestrator = PhaseOrchestrator::new(settings(PhaseStrategy::Both, false));

    let report = orchestrator.run(h.instance("both-1"), &h.store).await.unwrap();

    assert_eq!(report.outcome, InstanceOutcome::Success);
    assert_eq!(report.mode, Some(GenerationMode::FailingFirst));
    let saved = std::fs::read_to_string(h.store.test_path("both-1")).unwrap();
    assert_eq!(saved.trim_end(), direct);

    let ledger = h.ledger("both-1");
    let inversions = records(&ledger, "invert_to_failing");
    let passing = inversions.iter().filter(|(_, s)| s == "passing").count();
    assert_eq!(passing, 3);
    assert_eq!(inversions.last(), Some(&(3, "exhausted".to_string())));
    assert_eq!(
        records(&ledger, "generate_failing_test"),
        vec![(1, "failing".to_string())]
    );
    let termination = ledger.iter().find(|e| e["phase"] == "terminating").unwrap();
    assert_eq!(termination["mode"], "failing_first");
}

#[tokio::test]
async fn test_rejected_inversion_ends_pass_then_invert_attempt() {
    let h = Harness::new(
        [
            code(PASSING_TEST),
            code(INVERTED_TEST),
            judgement(false, "Fails on a typo, not the bug."),
        ],
        vec![Step::Exit(0, "passed"), Step::Exit(1, "NameError: prase")],
    );
    let orchestrator = PhaseOrchestrator::new(settings(PhaseStrategy::PassThenInvert, true));

    let report = orchestrator.run(h.instance("rej-1"), &h.store).await.unwrap();

    assert_eq!(report.outcome, InstanceOutcome::Failure);
    let ledger = h.ledger("rej-1");
    let feedback: Vec<_> = ledger
        .iter()
        .filter(|e| e["phase"] == "generation_feedback")
        .collect();
    assert_eq!(feedback.len(), 1);
    assert_eq!(feedback[0]["reason"], "Fails on a typo, not the bug.");
}

// ============================================================================
// Malformed replies
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_code_less_reply_is_retried_within_generation() {
    let h = Harness::new(
        ["I would write a test that calls parse.".to_string(), code(INVERTED_TEST)],
        vec![Step::Exit(1, "AssertionError: X")],
    );
    let orchestrator = PhaseOrchestrator::new(settings(PhaseStrategy::DirectFail, false));

    let report = orchestrator.run(h.instance("nocode-1"), &h.store).await.unwrap();

    assert_eq!(report.outcome, InstanceOutcome::Success);
    let first = records(&h.ledger("nocode-1"), "first_test");
    assert_eq!(
        first,
        vec![(1, "no_code".to_string()), (1, "generated".to_string())]
    );
}

// ============================================================================
// Persistence
// ============================================================================

#[tokio::test]
async fn test_existing_test_file_fails_instance_but_keeps_ledger() {
    let h = Harness::new(
        [code(INVERTED_TEST)],
        vec![Step::Exit(1, "AssertionError: X")],
    );
    h.store.save_test("dup-1", "# earlier").unwrap();
    let orchestrator = PhaseOrchestrator::new(settings(PhaseStrategy::DirectFail, false));

    let err = orchestrator.run(h.instance("dup-1"), &h.store).await.unwrap_err();

    assert!(err.is_already_exists());
    let ledger = h.ledger("dup-1");
    let termination = ledger.iter().find(|e| e["phase"] == "terminating").unwrap();
    assert_eq!(termination["outcome"], "failure");
    assert_eq!(
        std::fs::read_to_string(h.store.test_path("dup-1")).unwrap(),
        "# earlier"
    );
    assert_eq!(h.progress.snapshot().generated, 0);
}

#[tokio::test]
async fn test_cancelled_instance_writes_no_ledger() {
    let h = Harness::new([code(INVERTED_TEST)], vec![Step::Exit(1, "AssertionError: X")]);
    h.cancel.cancel();
    let orchestrator = PhaseOrchestrator::new(settings(PhaseStrategy::Both, false));

    let report = orchestrator.run(h.instance("cancel-1"), &h.store).await.unwrap();

    assert!(report.cancelled);
    assert!(report.ledger_path.is_none());
    assert!(!h.store.has_ledger("cancel-1"));
    assert_eq!(h.env.runs(), 0);
    assert_eq!(h.oracle.calls(), 0);
}
