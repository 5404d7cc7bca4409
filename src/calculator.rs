//! Index reduction over acquired records.
//!
//! The score itself is deliberately simple: each video contributes
//! `view / 10000 + comment / 100`, and the index for a window is the sum of
//! contributions. An empty record set reduces to 0.0.

use crate::models::VideoRecord;

/// View-count divisor for one video's contribution.
pub const VIEW_DIVISOR: f64 = 10_000.0;
/// Comment-count divisor for one video's contribution.
pub const COMMENT_DIVISOR: f64 = 100.0;

/// One video's contribution to the index.
pub fn video_contribution(video: &VideoRecord) -> f64 {
    (video.view as f64) / VIEW_DIVISOR + (video.comment as f64) / COMMENT_DIVISOR
}

/// Total index over a record set.
pub fn calculate_index(videos: &[VideoRecord]) -> f64 {
    videos.iter().map(video_contribution).sum()
}
