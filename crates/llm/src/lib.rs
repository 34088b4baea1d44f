//! AssertFlip LLM
//!
//! Reasoning-oracle plumbing: message types, the `LlmProvider` trait, an
//! OpenAI-compatible chat-completions provider, transient-failure retry,
//! a shared token rate limiter, and a pricing table for cost accounting.

pub mod cost;
pub mod http_client;
pub mod openai;
pub mod provider;
pub mod rate_limit;
pub mod retry;
pub mod tokens;
pub mod types;

// Re-export main types
pub use cost::{CostCalculator, ModelPricing};
pub use http_client::build_http_client;
pub use openai::OpenAIProvider;
pub use provider::LlmProvider;
pub use rate_limit::TokenRateLimiter;
pub use retry::{send_with_retry, RetryPolicy};
pub use tokens::{estimate_message_tokens, estimate_tokens};
pub use types::*;
