//! Error taxonomy for the acquisition pipeline.
//!
//! Every failure a strategy can produce is folded into one of four kinds,
//! because the retry and escalation layers branch on the kind alone:
//!
//! - [`CrawlError::Transport`]: connectivity problems and timeouts. Retried
//!   locally with exponential backoff.
//! - [`CrawlError::SecurityBlock`]: the platform explicitly rejected the
//!   request (anti-automation defenses). Retried after a longer cooldown.
//! - [`CrawlError::Parse`]: no parsing fallback step produced records. Never
//!   retried within a strategy; triggers strategy escalation in auto mode.
//! - [`CrawlError::Configuration`]: the request itself is invalid. Surfaced
//!   immediately, before any network operation.

use thiserror::Error;

/// Unified error type for the crawling core.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// Network-level failure: connection refused, DNS, timeout, proxy error.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The platform explicitly rejected the request (risk control, captcha
    /// interstitial, HTTP 412, API codes -352/-412).
    #[error("security block: {0}")]
    SecurityBlock(String),

    /// Every step of the parsing fallback chain came up empty.
    #[error("no parsing path produced records")]
    Parse,

    /// Invalid request or configuration, e.g. start date after end date.
    #[error("invalid configuration: {0}")]
    Configuration(String),
}

impl CrawlError {
    /// Whether the retry controller may re-attempt the failed operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CrawlError::Transport(_) | CrawlError::SecurityBlock(_))
    }
}

impl From<reqwest::Error> for CrawlError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            CrawlError::Transport(format!("request timed out: {e}"))
        } else {
            CrawlError::Transport(e.to_string())
        }
    }
}
