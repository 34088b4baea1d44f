//! Transient-Failure Retry
//!
//! Retries a provider call on rate limits, 5xx responses, and transport
//! failures with exponential backoff capped at `max_interval`. Inputs are
//! cloned per attempt because `send_message` takes ownership.

use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};

use crate::provider::LlmProvider;
use crate::types::{LlmError, LlmRequestOptions, LlmResponse, LlmResult, Message, ToolDefinition};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_interval: Duration,
    /// Upper bound for a single wait
    pub max_interval: Duration,
    /// Jitter as a fraction of the interval (0.0 disables jitter)
    pub randomization_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 10,
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(64),
            randomization_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, max_backoff_secs: u64) -> Self {
        Self {
            max_retries,
            max_interval: Duration::from_secs(max_backoff_secs.max(1)),
            ..Default::default()
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_interval)
            .with_multiplier(2.0)
            .with_randomization_factor(self.randomization_factor)
            .with_max_interval(self.max_interval)
            .with_max_elapsed_time(None)
            .build()
    }

    /// Wait before the next attempt, honoring a provider `Retry-After` hint
    /// without exceeding `max_interval`.
    fn wait_for(&self, backoff: &mut ExponentialBackoff, error: &LlmError) -> Duration {
        let delay = backoff.next_backoff().unwrap_or(self.max_interval);
        match error.retry_after_secs() {
            Some(hint) => delay.max(Duration::from_secs(hint)).min(self.max_interval),
            None => delay.min(self.max_interval),
        }
    }
}

/// Send a request, retrying transient failures per `policy`.
///
/// `on_retry` is called with the error, the 1-based retry number, and the
/// wait before each retry.
#[allow(clippy::too_many_arguments)]
pub async fn send_with_retry<F>(
    provider: &dyn LlmProvider,
    messages: &[Message],
    system: Option<&str>,
    tools: &[ToolDefinition],
    request_options: &LlmRequestOptions,
    policy: &RetryPolicy,
    mut on_retry: F,
) -> LlmResult<LlmResponse>
where
    F: FnMut(&LlmError, u32, Duration),
{
    let mut backoff = policy.backoff();
    let mut attempt: u32 = 0;
    loop {
        match provider
            .send_message(
                messages.to_vec(),
                system.map(String::from),
                tools.to_vec(),
                request_options.clone(),
            )
            .await
        {
            Ok(response) => return Ok(response),
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                attempt += 1;
                let wait = policy.wait_for(&mut backoff, &e);
                tracing::warn!(
                    "[oracle:retry] {} attempt {}/{} failed: {}; waiting {:?}",
                    provider.name(),
                    attempt,
                    policy.max_retries,
                    e,
                    wait
                );
                on_retry(&e, attempt, wait);
                tokio::time::sleep(wait).await;
            }
            Err(e) => return Err(e),
        }
    }
}
