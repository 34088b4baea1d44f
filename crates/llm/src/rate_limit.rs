//! Token Rate Limiter
//!
//! Sliding-window budget of tokens per interval, shared by every instance
//! talking to the same provider. A limit of zero disables the limiter.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug)]
pub struct TokenRateLimiter {
    tokens_per_window: u64,
    window: Duration,
    usage: Mutex<VecDeque<(Instant, u64)>>,
}

impl TokenRateLimiter {
    pub fn new(tokens_per_window: u64, window: Duration) -> Self {
        Self {
            tokens_per_window,
            window,
            usage: Mutex::new(VecDeque::new()),
        }
    }

    /// Limiter over a one-minute window.
    pub fn per_minute(tokens: u64) -> Self {
        Self::new(tokens, Duration::from_secs(60))
    }

    pub fn is_enabled(&self) -> bool {
        self.tokens_per_window > 0
    }

    /// Wait until `tokens` fit in the current window, then reserve them.
    ///
    /// Requests larger than the whole budget are clamped to it so they can
    /// still proceed once the window is empty.
    pub async fn acquire(&self, tokens: u64) {
        if !self.is_enabled() {
            return;
        }
        let tokens = tokens.min(self.tokens_per_window);
        loop {
            let wait = {
                let mut usage = self.usage.lock().await;
                let now = Instant::now();
                while let Some((at, _)) = usage.front() {
                    if now.duration_since(*at) >= self.window {
                        usage.pop_front();
                    } else {
                        break;
                    }
                }
                let used: u64 = usage.iter().map(|(_, t)| t).sum();
                if used + tokens <= self.tokens_per_window {
                    usage.push_back((now, tokens));
                    return;
                }
                match usage.front() {
                    Some((oldest, _)) => (*oldest + self.window).saturating_duration_since(now),
                    None => Duration::ZERO,
                }
            };
            tracing::debug!("[oracle:rate-limit] waiting {:?} for {} tokens", wait, tokens);
            tokio::time::sleep(wait).await;
        }
    }
}
