//! Generation Loop
//!
//! Requests a candidate test from the oracle and extracts its python code
//! block, retrying a bounded number of times when the reply is missing or
//! has no code.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

use assertflip_core::{AttemptLedger, AttemptPhase, AttemptRecord, AttemptStatus};

use super::prompts::Prompter;
use super::session::{Conversation, OracleSession};

/// Pause between sub-attempts after an empty or code-less reply
pub const SUB_ATTEMPT_PAUSE: Duration = Duration::from_secs(1);

/// Content recorded for a code-less reply is cut to this many chars
const DETAIL_LIMIT: usize = 500;

fn python_block_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```python\n(.*?)(?:```|\z)").ok())
        .as_ref()
}

/// Extract the first ```python block; an unterminated block runs to the end.
pub fn extract_python(response: &str) -> Option<String> {
    python_block_regex()
        .and_then(|re| re.captures(response))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|code| !code.trim().is_empty())
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

/// Ask for a candidate up to `max_sub_attempts` times.
///
/// Every reply is appended to `conversation`, which is then trimmed to its
/// first user turn and latest reply. Returns `None` when all sub-attempts
/// fail, which is not the same thing as a failing test.
pub async fn generate(
    session: &mut OracleSession,
    prompter: &dyn Prompter,
    conversation: &mut Conversation,
    ledger: &mut AttemptLedger,
    attempt: u32,
    max_sub_attempts: u32,
) -> Option<String> {
    for sub_attempt in 1..=max_sub_attempts {
        tracing::debug!(
            "[generation] {} requesting candidate ({}/{})",
            session.instance_id(),
            sub_attempt,
            max_sub_attempts
        );
        let Some(reply) = session.chat(conversation, true).await else {
            ledger.append(
                AttemptRecord::new(AttemptPhase::FirstTest, attempt, AttemptStatus::NoResponse)
                    .with_sub_attempt(sub_attempt),
            );
            tokio::time::sleep(SUB_ATTEMPT_PAUSE).await;
            continue;
        };

        conversation.push_assistant(reply.clone());
        conversation.trim();

        if let Some(code) = extract_python(&reply) {
            ledger.append(
                AttemptRecord::new(AttemptPhase::FirstTest, attempt, AttemptStatus::Generated)
                    .with_sub_attempt(sub_attempt)
                    .with_test_code(code.clone()),
            );
            return Some(code);
        }

        ledger.append(
            AttemptRecord::new(AttemptPhase::FirstTest, attempt, AttemptStatus::NoCode)
                .with_sub_attempt(sub_attempt)
                .with_detail(truncate_chars(&reply, DETAIL_LIMIT)),
        );
        conversation.push(prompter.missing_code());
        tokio::time::sleep(SUB_ATTEMPT_PAUSE).await;
    }

    tracing::warn!(
        "[generation] {} no candidate after {} tries",
        session.instance_id(),
        max_sub_attempts
    );
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_python_block() {
        let reply = "<think>plan</think>\n```python\nimport os\n\ndef test_a():\n    assert os\n```\ntrailing";
        assert_eq!(
            extract_python(reply).as_deref(),
            Some("import os\n\ndef test_a():\n    assert os\n")
        );
    }

    #[test]
    fn test_extract_unterminated_block() {
        let reply = "```python\ndef test_a():\n    pass\n";
        assert_eq!(
            extract_python(reply).as_deref(),
            Some("def test_a():\n    pass\n")
        );
    }

    #[test]
    fn test_extract_rejects_missing_or_empty_block() {
        assert!(extract_python("no code here").is_none());
        assert!(extract_python("```\ndef test(): pass\n```").is_none());
        assert!(extract_python("```python\n```").is_none());
    }

    #[test]
    fn test_truncate_chars_is_char_safe() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
    }
}
