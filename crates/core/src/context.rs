//! Bug Context
//!
//! Per-instance working state shared by the generation, fix, and validation
//! loops. The problem statement and localized code never change once the
//! context is built; the continuation and the identical-failure streak are
//! rewritten as attempts come and go.

use serde::{Deserialize, Serialize};

/// Typed snapshot of a failed attempt, used as negative context when a new
/// plan and candidate are requested.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Continuation {
    /// Plan the attempt was working from
    #[serde(default)]
    pub plan: String,
    /// Last candidate source
    #[serde(default, alias = "test_code", skip_serializing_if = "Option::is_none")]
    pub last_test_code: Option<String>,
    /// Error text the last candidate produced
    #[serde(default, alias = "error", skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Why the validation gate (or inversion) rejected the last candidate
    #[serde(default, alias = "reason", skip_serializing_if = "Option::is_none")]
    pub last_rejection_reason: Option<String>,
}

impl Continuation {
    /// Continuation holding only a freshly authored plan.
    pub fn with_plan(plan: impl Into<String>) -> Self {
        Self {
            plan: plan.into(),
            ..Default::default()
        }
    }

    /// True once the continuation carries evidence of a failed attempt.
    pub fn has_attempt(&self) -> bool {
        self.last_test_code.is_some()
            || self.last_error.is_some()
            || self.last_rejection_reason.is_some()
    }
}

/// Suspect lines of one source file, as localized by the dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedFile {
    pub filename: String,
    #[serde(default)]
    pub suspect_lines: Vec<u32>,
}

/// Working state for one bug instance.
#[derive(Debug, Clone)]
pub struct BugContext {
    instance_id: String,
    problem_statement: String,
    localized_code: String,
    line_level_localization: Vec<LocalizedFile>,
    /// Current continuation; rewritten on every terminal fix-loop state
    pub continuation: Continuation,
    previous_error: Option<String>,
    failure_streak: u32,
}

impl BugContext {
    pub fn new(
        instance_id: impl Into<String>,
        problem_statement: impl Into<String>,
        localized_code: impl Into<String>,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            problem_statement: problem_statement.into(),
            localized_code: localized_code.into(),
            line_level_localization: Vec::new(),
            continuation: Continuation::default(),
            previous_error: None,
            failure_streak: 0,
        }
    }

    pub fn with_localization(mut self, files: Vec<LocalizedFile>) -> Self {
        self.line_level_localization = files;
        self
    }

    pub fn with_continuation(mut self, continuation: Continuation) -> Self {
        self.continuation = continuation;
        self
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn problem_statement(&self) -> &str {
        &self.problem_statement
    }

    pub fn localized_code(&self) -> &str {
        &self.localized_code
    }

    pub fn line_level_localization(&self) -> &[LocalizedFile] {
        &self.line_level_localization
    }

    pub fn failure_streak(&self) -> u32 {
        self.failure_streak
    }

    /// Compare `error` with the previous error text.
    ///
    /// Byte-identical text increments the streak; anything else resets it to
    /// zero and becomes the new reference. Returns the number of consecutive
    /// rounds (including this one) that produced the same text.
    pub fn observe_error(&mut self, error: &str) -> u32 {
        match &self.previous_error {
            Some(previous) if previous == error => {
                self.failure_streak += 1;
            }
            _ => {
                self.failure_streak = 0;
                self.previous_error = Some(error.to_string());
            }
        }
        self.failure_streak + 1
    }

    /// Forget the previous error; a new candidate starts a new streak.
    pub fn reset_streak(&mut self) {
        self.failure_streak = 0;
        self.previous_error = None;
    }

    /// Render the line-level localization as a list of coverage targets.
    pub fn format_coverage_targets(&self) -> String {
        self.line_level_localization
            .iter()
            .filter(|f| !f.suspect_lines.is_empty())
            .map(|f| {
                let lines: Vec<String> = f.suspect_lines.iter().map(|l| l.to_string()).collect();
                format!("{}: lines {}", f.filename, lines.join(", "))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> BugContext {
        BugContext::new("django__django-11099", "validator accepts trailing newline", "1 | code")
    }

    #[test]
    fn test_streak_counts_identical_rounds() {
        let mut c = ctx();
        assert_eq!(c.observe_error("ImportError: foo"), 1);
        assert_eq!(c.observe_error("ImportError: foo"), 2);
        assert_eq!(c.observe_error("ImportError: foo"), 3);
        assert_eq!(c.failure_streak(), 2);
    }

    #[test]
    fn test_streak_resets_on_any_difference() {
        let mut c = ctx();
        c.observe_error("ImportError: foo");
        c.observe_error("ImportError: foo");
        // trailing whitespace is a difference
        assert_eq!(c.observe_error("ImportError: foo "), 1);
        assert_eq!(c.failure_streak(), 0);
        assert_eq!(c.observe_error("ImportError: foo "), 2);
    }

    #[test]
    fn test_reset_streak_forgets_previous() {
        let mut c = ctx();
        c.observe_error("E");
        c.observe_error("E");
        c.reset_streak();
        assert_eq!(c.observe_error("E"), 1);
    }

    #[test]
    fn test_continuation_aliases_short_keys() {
        let json = r#"{"plan": "p", "test_code": "def test(): pass", "error": "boom", "reason": "unrelated"}"#;
        let cont: Continuation = serde_json::from_str(json).unwrap();
        assert_eq!(cont.last_test_code.as_deref(), Some("def test(): pass"));
        assert_eq!(cont.last_error.as_deref(), Some("boom"));
        assert_eq!(cont.last_rejection_reason.as_deref(), Some("unrelated"));
        assert!(cont.has_attempt());
        assert!(!Continuation::with_plan("p").has_attempt());
    }

    #[test]
    fn test_format_coverage_targets() {
        let c = ctx().with_localization(vec![
            LocalizedFile {
                filename: "django/core/validators.py".into(),
                suspect_lines: vec![10, 12],
            },
            LocalizedFile {
                filename: "empty.py".into(),
                suspect_lines: vec![],
            },
        ]);
        assert_eq!(
            c.format_coverage_targets(),
            "django/core/validators.py: lines 10, 12"
        );
    }
}
