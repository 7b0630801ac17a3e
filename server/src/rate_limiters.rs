use std::sync::atomic::Ordering::Relaxed;
use std::sync::{atomic::AtomicBool, Arc};
use tokio::time::Duration;

use leaky_bucket::RateLimiter;

use crate::server_config::cfg;

/// Client-side throttle for the LLM gateway: a prompt bucket (requests/sec)
/// and a token bucket (tokens/min), plus a global backoff flag flipped when
/// the gateway reports a hard rate limit.
#[derive(Clone)]
pub struct RateLimiters {
    prompt: Arc<RateLimiter>,
    tokens: Arc<RateLimiter>,
    backoff: Arc<AtomicBool>,
    backoff_duration: Duration,
}

impl RateLimiters {
    pub fn new(
        prompt_limit_per_sec: usize,
        prompt_interval_ms: usize,
        prompt_refill: usize,
        token_limit_per_min: usize,
        token_interval_ms: usize,
        token_refill: usize,
    ) -> Self {
        let prompt = RateLimiter::builder()
            .initial(1)
            .interval(Duration::from_millis(prompt_interval_ms as u64))
            .max(prompt_limit_per_sec)
            .refill(prompt_refill)
            .build();

        let tokens = RateLimiter::builder()
            .initial(token_limit_per_min / 2) // half capacity at start, no burst
            .interval(Duration::from_millis(token_interval_ms as u64))
            .max(token_limit_per_min)
            .refill(token_refill)
            .build();

        Self {
            prompt: Arc::new(prompt),
            tokens: Arc::new(tokens),
            backoff: Arc::new(AtomicBool::new(false)),
            backoff_duration: Duration::from_secs(60),
        }
    }

    pub fn from_config() -> Self {
        Self::new(
            cfg.api.prompt_limits.rate_limit_per_sec,
            cfg.api.prompt_limits.refill_interval_ms,
            cfg.api.prompt_limits.refill_amount,
            cfg.api.token_limits.rate_limit_per_min,
            cfg.api.token_limits.refill_interval_ms,
            cfg.api.token_limits.refill_amount,
        )
    }

    /// Acquire one prompt slot plus the estimated token budget for a call.
    pub async fn acquire(&self, estimated_tokens: usize) {
        if self.backoff.load(Relaxed) {
            tokio::time::sleep(self.backoff_duration).await;
        }
        self.prompt.acquire_one().await;
        self.tokens.acquire(estimated_tokens).await;
    }

    pub fn trigger_backoff(&self) {
        tracing::info!("Triggering gateway backoff...");
        self.backoff.store(true, Relaxed);
        let self_ = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(self_.backoff_duration).await;
            tracing::info!("Gateway backoff expired");
            self_.backoff.store(false, Relaxed);
        });
    }

    pub fn get_status(&self) -> String {
        let prompt_bucket = format!("{}/{}", self.prompt.balance(), self.prompt.max());
        let token_bucket = format!("{}/{}", self.tokens.balance(), self.tokens.max());
        if self.backoff.load(Relaxed) {
            format!("prompts: {} tokens: {} (BACKOFF)", prompt_bucket, token_bucket)
        } else {
            format!("prompts: {} tokens: {}", prompt_bucket, token_bucket)
        }
    }
}
