//! Failure Text Cleaning
//!
//! Strips pytest framing from a failing run's output so only the traceback
//! and assertion detail reach the oracle. Output in any other shape is left
//! alone.

use std::sync::OnceLock;

use regex::Regex;

fn banner_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)=====+ (?:FAILURES|ERRORS) ===+\n___+ [^\n]+ _+___\n\n?(.*)").ok()
    })
    .as_ref()
}

fn summary_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)(.*\n)===+ short test summary info ===+").ok())
        .as_ref()
}

/// Remove the `FAILURES`/`ERRORS` banner with its first test header, and the
/// trailing `short test summary info` section.
pub fn clean_error(output: &str) -> String {
    let mut text = output;
    if let Some(body) = banner_regex()
        .and_then(|re| re.captures(text))
        .and_then(|c| c.get(1))
    {
        text = body.as_str();
    }
    if let Some(head) = summary_regex()
        .and_then(|re| re.captures(text))
        .and_then(|c| c.get(1))
    {
        text = head.as_str();
    }
    text.to_string()
}
