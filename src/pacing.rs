//! Request pacing / humanization.
//!
//! Every network-touching operation is gated by a randomized pause so the
//! request cadence resembles a person browsing rather than a tight loop.
//! Two profiles exist, differing by roughly an order of magnitude in both
//! bound and variance:
//!
//! | Profile  | Page pause  | Action pause |
//! |----------|-------------|--------------|
//! | Standard | 3.0 - 6.0 s | 1.0 - 2.0 s  |
//! | Fast     | 1.0 - 2.0 s | 0.3 - 0.8 s  |
//!
//! "Action" pauses are the shorter delays the browser strategy inserts
//! between simulated scroll/click steps.

use rand::{Rng, rng};
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Named pacing profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacingProfile {
    Standard,
    Fast,
}

impl PacingProfile {
    /// Inclusive millisecond bounds for the pause before a page fetch.
    pub fn page_delay_bounds(&self) -> (u64, u64) {
        match self {
            PacingProfile::Standard => (3_000, 6_000),
            PacingProfile::Fast => (1_000, 2_000),
        }
    }

    /// Inclusive millisecond bounds for the pause between browser actions.
    pub fn action_delay_bounds(&self) -> (u64, u64) {
        match self {
            PacingProfile::Standard => (1_000, 2_000),
            PacingProfile::Fast => (300, 800),
        }
    }
}

/// Gate applied before every network-touching call.
#[derive(Debug, Clone, Copy)]
pub struct RateLimiter {
    profile: PacingProfile,
}

impl RateLimiter {
    pub fn new(profile: PacingProfile) -> Self {
        Self { profile }
    }

    /// Sample a pause from the page-fetch range.
    pub fn sample_page_delay(&self) -> Duration {
        let (lo, hi) = self.profile.page_delay_bounds();
        Duration::from_millis(rng().random_range(lo..=hi))
    }

    /// Sample a pause from the between-actions range.
    pub fn sample_action_delay(&self) -> Duration {
        let (lo, hi) = self.profile.action_delay_bounds();
        Duration::from_millis(rng().random_range(lo..=hi))
    }

    /// Block the calling flow before a page fetch.
    pub async fn pause_before_page(&self) {
        let delay = self.sample_page_delay();
        debug!(?delay, profile = ?self.profile, "Pacing pause before page fetch");
        sleep(delay).await;
    }

    /// Block the calling flow before a session-level operation (open, warm-up).
    pub async fn pause_before_action(&self) {
        let delay = self.sample_action_delay();
        debug!(?delay, profile = ?self.profile, "Pacing pause before action");
        sleep(delay).await;
    }
}
