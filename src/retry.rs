//! Retry and backoff around a single page fetch.
//!
//! One [`RetryContext`] lives for one logical page fetch and is reset for
//! the next page. The policy is:
//!
//! - `Transport` failures back off exponentially (`base * 2^(attempt-1)`,
//!   capped, plus 0-250 ms of jitter) and retry up to the attempt ceiling.
//! - `SecurityBlock` failures retry too, but with the backoff stretched by
//!   a cooldown factor, because hammering a platform that just flagged us
//!   only digs the hole deeper.
//! - `Parse` and `Configuration` failures are returned immediately; the
//!   orchestrator decides whether to escalate.
//!
//! On ceiling exhaustion the last error is returned to the pagination
//! controller, which turns it into a terminal `StrategyOutcome` instead of
//! propagating past the orchestrator.

use crate::error::CrawlError;
use crate::models::{FailureKind, PageResult};
use crate::pacing::RateLimiter;
use crate::strategies::FetchStrategy;
use rand::{Rng, rng};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, instrument, warn};

const MAX_BACKOFF: Duration = Duration::from_secs(30);
/// Backoff stretch applied after an explicit platform rejection.
const BLOCK_COOLDOWN_FACTOR: u32 = 5;

/// Backoff tunables, derived from the run configuration.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempt ceiling (first try included).
    pub max_attempts: u32,
    /// Base delay for exponential backoff.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay before the next attempt, given the attempt that just failed.
    pub fn backoff_delay(&self, attempt: u32, error: &CrawlError) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let mut delay = self.base_delay.saturating_mul(1 << exp);
        if matches!(error, CrawlError::SecurityBlock(_)) {
            delay = delay.saturating_mul(BLOCK_COOLDOWN_FACTOR);
        }
        if delay > MAX_BACKOFF {
            delay = MAX_BACKOFF;
        }
        delay + Duration::from_millis(rng().random_range(0..=250))
    }
}

/// State of one in-flight page fetch. Reset per page.
#[derive(Debug, Default)]
pub struct RetryContext {
    pub attempt: u32,
    pub last_failure: Option<FailureKind>,
    pub elapsed_backoff: Duration,
}

/// Fetch one page through the rate limiter with retries.
///
/// With a ceiling of N and a permanently failing transport, exactly N
/// attempts are made before the last error is returned.
#[instrument(level = "info", skip(strategy, limiter, policy), fields(strategy = strategy.name()))]
pub async fn fetch_page_with_retry(
    strategy: &dyn FetchStrategy,
    limiter: &RateLimiter,
    policy: &RetryPolicy,
    uid: u64,
    page: u32,
) -> Result<PageResult, CrawlError> {
    let mut ctx = RetryContext::default();

    loop {
        limiter.pause_before_page().await;
        ctx.attempt += 1;

        match strategy.fetch_page(uid, page).await {
            Ok(result) => return Ok(result),
            Err(e) => {
                ctx.last_failure = Some(FailureKind::from(&e));

                if !e.is_retryable() {
                    return Err(e);
                }
                if ctx.attempt >= policy.max_attempts {
                    error!(
                        page,
                        attempts = ctx.attempt,
                        elapsed_backoff = ?ctx.elapsed_backoff,
                        error = %e,
                        "Page fetch exhausted retries"
                    );
                    return Err(e);
                }

                let delay = policy.backoff_delay(ctx.attempt, &e);
                ctx.elapsed_backoff += delay;
                warn!(
                    page,
                    attempt = ctx.attempt,
                    max = policy.max_attempts,
                    ?delay,
                    error = %e,
                    "Page fetch failed; backing off"
                );
                sleep(delay).await;
            }
        }
    }
}
