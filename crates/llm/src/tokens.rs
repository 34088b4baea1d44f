//! Token Estimation
//!
//! Rough token counts used for budgeting before a request is sent.

use crate::types::{Message, MessageContent};

/// Estimate tokens for a piece of text (~4 characters per token).
pub fn estimate_tokens(text: &str) -> usize {
    text.len() / 4
}

/// Estimate tokens for a whole conversation, including tool traffic.
pub fn estimate_message_tokens(messages: &[Message], system: Option<&str>) -> usize {
    let body: usize = messages
        .iter()
        .flat_map(|m| m.content.iter())
        .map(|c| match c {
            MessageContent::Text { text } => estimate_tokens(text),
            MessageContent::ToolUse { input, .. } => estimate_tokens(&input.to_string()),
            MessageContent::ToolResult { content, .. } => estimate_tokens(content),
        })
        .sum();
    body + system.map_or(0, estimate_tokens)
}
