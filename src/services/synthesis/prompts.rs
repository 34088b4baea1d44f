//! Prompter
//!
//! Builds every instruction the synthesis loops send to the oracle. The
//! loops depend only on the `Prompter` trait; `DefaultPrompter` is the
//! pytest-oriented wording used by the binary.

use assertflip_core::{BugContext, Continuation, GenerationMode};
use assertflip_llm::Message;

use super::session::Conversation;

/// Plan text used when the planner is disabled
pub const PLANNER_DISABLED: &str =
    "<Planning is disabled. Reason about the issue and write the test directly.>";

/// Plan text used when the planner gave no reply
pub const PLAN_UNAVAILABLE: &str =
    "<No plan could be produced. Reason about the issue and write the test directly.>";

pub trait Prompter: Send + Sync {
    /// First planning request for an instance.
    fn planning(&self, ctx: &BugContext, mode: GenerationMode) -> Conversation;

    /// Planning request that treats a failed continuation as negative context.
    fn improve_planning(&self, ctx: &BugContext, mode: GenerationMode) -> Conversation;

    /// Conversation asking for the first candidate of a generation attempt.
    fn initial_generation(
        &self,
        ctx: &BugContext,
        mode: GenerationMode,
        plan: &str,
        retry: Option<&Continuation>,
    ) -> Conversation;

    /// Revision request for a candidate that missed its goal.
    fn revision(&self, error: &str, mode: GenerationMode) -> Message;

    /// Revision request when the error text repeats the previous round.
    fn identical_error(&self, error: &str) -> Message;

    /// Revision request when there is no error text to show.
    fn generic_revision(&self) -> Message;

    /// Corrective turn after a reply without a python code block.
    fn missing_code(&self) -> Message;

    /// Relevance judgement on a failing candidate.
    fn validation(&self, ctx: &BugContext, test_code: &str, error: &str) -> Conversation;

    /// Minimal edit of a passing, bug-exhibiting test into a failing one.
    fn inversion(&self, problem_statement: &str, test_code: &str) -> Conversation;

    /// Follow-up when an inverted test still passed.
    fn inversion_still_passing(&self) -> Message;
}

// ============================================================================
// Default wording
// ============================================================================

#[derive(Debug, Clone)]
pub struct DefaultPrompter {
    /// Framework instruction appended to the generation constraints
    pub framework_instruction: String,
}

impl Default for DefaultPrompter {
    fn default() -> Self {
        Self {
            framework_instruction: "Write the test with pytest and its fixtures.".to_string(),
        }
    }
}

fn goal_sentence(mode: GenerationMode) -> &'static str {
    match mode {
        GenerationMode::PassingFirst => {
            "pass while the bug is present, asserting the buggy behaviour, and fail once it is fixed"
        }
        GenerationMode::FailingFirst => {
            "fail while the bug is present, because of the bug itself, and pass once it is fixed"
        }
    }
}

fn planning_rules(mode: GenerationMode) -> &'static str {
    match mode {
        GenerationMode::PassingFirst => "\
- Work out how to trigger the bug in a test that still completes successfully.
- Plan assertions that hold today precisely because the bug is present.",
        GenerationMode::FailingFirst => "\
- Work out how to trigger the bug so the test fails on the incorrect behaviour.
- The failure must come from the reported bug, never from setup mistakes,
  unrelated exceptions or missing dependencies.",
    }
}

fn generation_rules(mode: GenerationMode) -> &'static str {
    match mode {
        GenerationMode::PassingFirst => "\
1. Reproduce the misbehaviour described in the issue.
2. The test must pass when run, and its assertions must capture the buggy result.
3. Use pytest.raises for exceptions; assert the wrong value for logic bugs.
4. Mark each assertion of incorrect behaviour with a `# BUG:` comment.
5. Avoid a test that passes without touching the bug.",
        GenerationMode::FailingFirst => "\
1. Reproduce the misbehaviour described in the issue.
2. The test must fail while the bug exists and pass after the fix.
3. It must not fail for syntax, import or fixture problems.
4. Include every import the test needs.
5. Avoid a test that fails for reasons other than the bug.",
    }
}

const PLAN_FORMAT: &str = "\
<plan>
1. Setup
2. Inputs and mocks
3. How the bug is triggered
4. Test structure
5. Key assertions
6. Edge cases
7. Expected outcome
</plan>";

const REVISION_RULES: &str = "\
Do not leave placeholders for the user to fill in and do not ask for more information.
Use the get_info tool to look up code you cannot see. New packages cannot be installed.";

impl DefaultPrompter {
    fn issue_and_code(ctx: &BugContext) -> String {
        let mut text = format!(
            "<ISSUE_TICKET>\n{}\n</ISSUE_TICKET>\n\nCode that may contain the bug, with related tests:\n\n<CODE_SNIPPETS>\n{}\n</CODE_SNIPPETS>\n",
            ctx.problem_statement(),
            ctx.localized_code()
        );
        let targets = ctx.format_coverage_targets();
        if !targets.is_empty() {
            text.push_str(&format!(
                "\nLines suspected of holding the bug (try to execute them):\n<COVERAGE_TARGETS>\n{}\n</COVERAGE_TARGETS>\n",
                targets
            ));
        }
        text
    }

    fn previous_attempt(continuation: &Continuation) -> String {
        format!(
            "<TEST_ATTEMPT>\n{}\n</TEST_ATTEMPT>\n\n<TEST_ATTEMPT_ERROR>\n{}\n</TEST_ATTEMPT_ERROR>\n\n<VALIDATION_FEEDBACK>\n{}\n</VALIDATION_FEEDBACK>\n",
            continuation
                .last_test_code
                .as_deref()
                .unwrap_or("<no prior test code>"),
            continuation.last_error.as_deref().unwrap_or("<no prior error>"),
            continuation
                .last_rejection_reason
                .as_deref()
                .unwrap_or("No validation feedback"),
        )
    }
}

impl Prompter for DefaultPrompter {
    fn planning(&self, ctx: &BugContext, mode: GenerationMode) -> Conversation {
        let system = format!(
            "You are a senior Python developer planning a test that exposes a reported bug.\n\
             The test must {goal}.\n\n\
             Read the issue and the code, then:\n\
             - classify the bug (exception, wrong value, missing behaviour);\n\
             - quote the parts of the issue and code that matter;\n\
             - describe the incorrect behaviour you expect to observe;\n\
             {rules}\n\n\
             Answer with a plan in this shape:\n{format}\n\n\
             Keep the plan independent of any particular test framework and do not write code yet.\n\
             Use the get_info tool if something you need was trimmed away.",
            goal = goal_sentence(mode),
            rules = planning_rules(mode),
            format = PLAN_FORMAT,
        );
        let user = format!(
            "Plan a test for the issue below.\n\n{}",
            Self::issue_and_code(ctx)
        );
        Conversation::new(system, user)
    }

    fn improve_planning(&self, ctx: &BugContext, mode: GenerationMode) -> Conversation {
        let system = format!(
            "You are a senior Python developer helping a colleague whose test failed to expose a reported bug.\n\
             The new test must {goal}.\n\n\
             You will see the issue, the code, your colleague's plan, the test they wrote, the error it \
             produced and any reviewer feedback. Work out why that attempt failed, then write a new plan \
             from scratch that avoids the same mistakes.\n\
             {rules}\n\n\
             Answer with a plan in this shape:\n{format}\n\n\
             Do not copy the previous plan. Do not write code. The get_info tool is available.",
            goal = goal_sentence(mode),
            rules = planning_rules(mode),
            format = PLAN_FORMAT,
        );
        let continuation = &ctx.continuation;
        let plan = if continuation.plan.is_empty() {
            "<no prior plan>"
        } else {
            continuation.plan.as_str()
        };
        let user = format!(
            "Plan a new test for the issue below.\n\n{}\n\
             Previous plan:\n<THOUGHT_PROCESS>\n{}\n</THOUGHT_PROCESS>\n\n{}",
            Self::issue_and_code(ctx),
            plan,
            Self::previous_attempt(continuation)
        );
        Conversation::new(system, user)
    }

    fn initial_generation(
        &self,
        ctx: &BugContext,
        mode: GenerationMode,
        plan: &str,
        retry: Option<&Continuation>,
    ) -> Conversation {
        let retry_note = if retry.is_some() {
            "A previous attempt was rejected; you will see it below and must take a different approach.\n"
        } else {
            ""
        };
        let system = format!(
            "You are a Python developer writing a test that reveals a reported bug.\n\
             The test must {goal}.\n\
             {retry_note}\n\
             Requirements:\n{rules}\n\
             6. Clean up any state the test changes (monkeypatch is fine).\n\
             7. No top-level code beyond imports and helpers; do not call pytest.main.\n\
             8. The test must run as-is.\n\n\
             Constraints:\n\
             - Do not install packages or ask the user for anything.\n\
             - {framework}\n\n\
             The supervisor's plan is guidance only. Facts returned by get_info override it.\n\
             Think inside <think></think> first, then give the complete test in a single ```python block.",
            goal = goal_sentence(mode),
            retry_note = retry_note,
            rules = generation_rules(mode),
            framework = self.framework_instruction,
        );

        let mut user = format!(
            "Write the test for the issue below.\n\n{}\n",
            Self::issue_and_code(ctx)
        );
        if let Some(previous) = retry {
            user.push_str(&Self::previous_attempt(previous));
            user.push_str(
                "\nThat test was rejected. Change the structure and assertions; do not repeat it.\n\n",
            );
        }
        user.push_str(&format!("Supervisor's plan:\n<PLAN>\n{}\n</PLAN>\n", plan));
        Conversation::new(system, user)
    }

    fn revision(&self, error: &str, mode: GenerationMode) -> Message {
        let instruction = match mode {
            GenerationMode::PassingFirst => {
                "The test fails. Change it so it passes while still demonstrating the bug from the issue."
            }
            GenerationMode::FailingFirst => {
                "The test does not fail because of the bug. Change it so its failure comes from the reported bug and nothing else."
            }
        };
        Message::user(format!(
            "Running the test produced the output below.\n{}\n\n\
             Reply with the complete corrected test in a ```python block.\n{}\n\n\
             OBSERVED ERROR:\n{}",
            instruction, REVISION_RULES, error
        ))
    }

    fn identical_error(&self, error: &str) -> Message {
        Message::user(format!(
            "The output is identical to the previous run:\n{}\n\n\
             Take another code path to expose the same bug.\n{}\n\
             Reply with exactly one ```python block.",
            error, REVISION_RULES
        ))
    }

    fn generic_revision(&self) -> Message {
        Message::user("The test did not reach its goal. Rewrite it with a different approach.")
    }

    fn missing_code(&self) -> Message {
        Message::user(
            "Your reply had no code. Give the complete test in a fenced block: ```python\n...\n```",
        )
    }

    fn validation(&self, ctx: &BugContext, test_code: &str, error: &str) -> Conversation {
        let system = "You review tests written to reproduce reported bugs. Decide whether the failure \
                      shown is caused by the reported bug. If it is not, explain precisely what is \
                      wrong with the test.";
        let user = format!(
            "Judge the test below using only the issue, the test code and its output; no tools are available.\n\n\
             <ISSUE_TICKET>\n{}\n</ISSUE_TICKET>\n\n\
             <TEST_CODE>\n{}\n</TEST_CODE>\n\n\
             <TEST_ERROR>\n{}\n</TEST_ERROR>\n\n\
             Answer as JSON: {{\"reason\": string, \"revealing\": bool}}.",
            ctx.problem_statement(),
            test_code,
            error
        );
        Conversation::new(system, user)
    }

    fn inversion(&self, problem_statement: &str, test_code: &str) -> Conversation {
        let system = format!(
            "You turn passing tests that demonstrate a bug into tests that fail because of it.\n\n\
             <ISSUE_TICKET>\n{}\n</ISSUE_TICKET>\n\n\
             Rules:\n\
             1. Change as little as possible and keep the structure.\n\
             2. Make the assertions expect the correct behaviour.\n\
             3. Drop comments that describe the buggy behaviour as expected.\n\
             4. The result must fail while the bug exists and pass after the fix.\n\n\
             Reply with the full updated test in one python code block and nothing else.",
            problem_statement
        );
        let user = format!(
            "Invert this passing test so it fails on the bug:\n\n```python\n{}\n```\n",
            test_code
        );
        Conversation::new(system, user)
    }

    fn inversion_still_passing(&self) -> Message {
        Message::user(
            "The inverted test still passes, so it does not reveal the bug. Rewrite it so it fails while the bug is present.",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assertflip_core::LocalizedFile;

    fn ctx() -> BugContext {
        BugContext::new("pkg-1", "split() drops the last field", "10 | def split(s):")
            .with_localization(vec![LocalizedFile {
                filename: "pkg/text.py".into(),
                suspect_lines: vec![10, 12],
            }])
    }

    #[test]
    fn test_planning_mentions_issue_and_targets() {
        let conv = DefaultPrompter::default().planning(&ctx(), GenerationMode::PassingFirst);
        let user = conv.turns[0].text_content();
        assert!(user.contains("split() drops the last field"));
        assert!(user.contains("pkg/text.py: lines 10, 12"));
        assert!(conv.system.contains("pass while the bug is present"));
    }

    #[test]
    fn test_improve_planning_carries_previous_attempt() {
        let mut ctx = ctx();
        ctx.continuation = Continuation {
            plan: "old plan".into(),
            last_test_code: Some("def test_x(): pass".into()),
            last_error: None,
            last_rejection_reason: Some("unrelated ImportError".into()),
        };
        let conv = DefaultPrompter::default().improve_planning(&ctx, GenerationMode::FailingFirst);
        let user = conv.turns[0].text_content();
        assert!(user.contains("old plan"));
        assert!(user.contains("def test_x(): pass"));
        assert!(user.contains("<no prior error>"));
        assert!(user.contains("unrelated ImportError"));
    }

    #[test]
    fn test_initial_generation_retry_block() {
        let prompter = DefaultPrompter::default();
        let first = prompter.initial_generation(&ctx(), GenerationMode::FailingFirst, "P", None);
        assert!(!first.turns[0].text_content().contains("<TEST_ATTEMPT>"));

        let previous = Continuation {
            plan: "P".into(),
            last_test_code: Some("code".into()),
            last_error: Some("boom".into()),
            last_rejection_reason: None,
        };
        let retry =
            prompter.initial_generation(&ctx(), GenerationMode::FailingFirst, "P2", Some(&previous));
        let text = retry.turns[0].text_content();
        assert!(text.contains("<TEST_ATTEMPT>\ncode"));
        assert!(text.contains("<PLAN>\nP2\n</PLAN>"));
        assert!(retry.system.contains("different approach"));
    }

    #[test]
    fn test_revision_includes_error() {
        let msg = DefaultPrompter::default().revision("E  assert 1 == 2", GenerationMode::PassingFirst);
        assert!(msg.text_content().ends_with("OBSERVED ERROR:\nE  assert 1 == 2"));
    }
}
