//! Configuration snapshot for one acquisition run.
//!
//! All tunables are collected into [`CrawlConfig`] and threaded into the
//! orchestrator at construction. The snapshot is read-only for the duration
//! of a run; no process-wide mutable settings exist.

use crate::pacing::PacingProfile;
use std::time::Duration;

/// Default creator UID (李大霄's Bilibili account).
pub const DEFAULT_UID: u64 = 2137589551;

/// Default window length in days (today minus six through today).
pub const DEFAULT_DAYS_RANGE: i64 = 6;

/// Immutable per-run configuration.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Per-operation timeout (page fetch, element wait).
    pub timeout: Duration,
    /// Retry attempt ceiling per page fetch.
    pub retry_attempts: u32,
    /// Base delay for exponential backoff.
    pub retry_base_delay: Duration,
    /// Request pacing profile.
    pub pacing: PacingProfile,
    /// Hard page-count ceiling; bounds worst-case cost against misbehaving
    /// pagination.
    pub max_pages: u32,
    /// Optional proxy endpoint for the HTTP strategies.
    pub proxy: Option<String>,
    /// Allow the synthetic generator when no strategy yields authoritative data.
    pub allow_synthetic: bool,
    /// Run the browser strategy headless.
    pub headless: bool,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retry_attempts: 3,
            retry_base_delay: Duration::from_secs(2),
            pacing: PacingProfile::Standard,
            max_pages: 20,
            proxy: None,
            allow_synthetic: false,
            headless: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let cfg = CrawlConfig::default();
        assert_eq!(cfg.timeout, Duration::from_secs(10));
        assert_eq!(cfg.retry_attempts, 3);
        assert_eq!(cfg.retry_base_delay, Duration::from_secs(2));
        assert_eq!(cfg.max_pages, 20);
        assert!(!cfg.allow_synthetic);
        assert!(cfg.headless);
        assert!(cfg.proxy.is_none());
    }
}
