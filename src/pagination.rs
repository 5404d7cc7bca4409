//! Pagination controller: drives one strategy page by page until a stop
//! condition fires.
//!
//! The controller is a small state machine, `Fetching -> Evaluating ->
//! {Fetching, Done}`. Each cycle fetches one page through the retry
//! controller, reduces it through the parsing chain, filters records to the
//! request window, then evaluates the stop conditions in a fixed order
//! (first true wins):
//!
//! 1. the page parsed to zero records;
//! 2. the strategy reported no further page;
//! 3. the oldest record on the page predates the window start by more than
//!    one page's worth of slack;
//! 4. the hard page ceiling was reached.
//!
//! Condition 3 compares only the current page's oldest item to the window
//! start. A creator pinning non-chronological items at the top of the
//! listing can trip it early; that platform behavior is unspecified and the
//! rule is applied as stated.

use crate::error::CrawlError;
use crate::models::{FetchRequest, Provenance, StrategyOutcome, VideoRecord};
use crate::pacing::RateLimiter;
use crate::parse::parse_page;
use crate::retry::{RetryPolicy, fetch_page_with_retry};
use crate::strategies::FetchStrategy;
use chrono::Duration;
use tracing::{debug, info, instrument, warn};

/// Why pagination stopped. Logged and useful in tests; the caller only
/// sees the accumulated outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EmptyPage,
    NoMoreSignal,
    WindowExceeded,
    PageCeiling,
}

/// Evaluate the stop conditions for one fetched page, in priority order.
fn evaluate_page(
    parsed: &[VideoRecord],
    has_more: bool,
    page: u32,
    req: &FetchRequest,
    max_pages: u32,
) -> Option<StopReason> {
    if parsed.is_empty() {
        return Some(StopReason::EmptyPage);
    }
    if !has_more {
        return Some(StopReason::NoMoreSignal);
    }
    // One page's worth of slack: the date span the current page covers,
    // never less than a day. Out-of-window records count here by design.
    let oldest = parsed.iter().map(|r| r.pubdate).min()?;
    let newest = parsed.iter().map(|r| r.pubdate).max()?;
    let slack = (newest - oldest).max(Duration::days(1));
    if oldest < req.start_date - slack {
        return Some(StopReason::WindowExceeded);
    }
    if page >= max_pages {
        return Some(StopReason::PageCeiling);
    }
    None
}

/// Drive `strategy` through its pages for one request.
///
/// Always terminates within `max_pages` pages, even if the strategy never
/// reports "no more pages". Every failure is folded into a terminal
/// [`StrategyOutcome`]; nothing propagates past the orchestrator.
#[instrument(level = "info", skip_all, fields(strategy = strategy.name(), uid = req.uid))]
pub async fn paginate(
    strategy: &dyn FetchStrategy,
    limiter: &RateLimiter,
    policy: &RetryPolicy,
    req: &FetchRequest,
    max_pages: u32,
) -> StrategyOutcome {
    let mut kept: Vec<VideoRecord> = Vec::new();
    let mut provenance: Option<Provenance> = None;
    let mut page = 1u32;

    loop {
        // Fetching
        let result = match fetch_page_with_retry(strategy, limiter, policy, req.uid, page).await {
            Ok(r) => r,
            Err(CrawlError::SecurityBlock(reason)) => {
                warn!(page, %reason, "Strategy blocked; terminal");
                return StrategyOutcome::Blocked(reason);
            }
            Err(CrawlError::Parse) => return StrategyOutcome::ParseFailure,
            Err(e) => {
                warn!(page, error = %e, "Strategy transport failed; terminal");
                return StrategyOutcome::TransportFailure(e.to_string());
            }
        };

        let (parsed, page_provenance) = match parse_page(&result.raw) {
            Ok(x) => x,
            Err(_) => {
                warn!(page, "No parsing path produced records; escalating");
                return StrategyOutcome::ParseFailure;
            }
        };
        provenance.get_or_insert(page_provenance);

        let in_window = parsed
            .iter()
            .filter(|r| r.pubdate >= req.start_date && r.pubdate <= req.end_date)
            .cloned()
            .collect::<Vec<_>>();
        debug!(
            page,
            parsed = parsed.len(),
            kept = in_window.len(),
            has_more = result.has_more,
            "Page reduced"
        );
        kept.extend(in_window);

        // Evaluating
        if let Some(reason) = evaluate_page(&parsed, result.has_more, page, req, max_pages) {
            info!(page, ?reason, total = kept.len(), "Pagination done");
            return StrategyOutcome::Success {
                records: kept,
                pages: page,
                provenance: provenance.unwrap_or(Provenance::Api),
            };
        }
        page += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FetchMode, PageResult, RawContent};
    use crate::pacing::PacingProfile;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::time::Duration as StdDuration;

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn vid(aid: u64, date: &str, view: u64, comment: u64) -> serde_json::Value {
        let created = day(date).and_hms_opt(12, 0, 0).unwrap().and_utc().timestamp();
        serde_json::json!({
            "aid": aid,
            "play": view,
            "comment": comment,
            "title": format!("视频{aid}"),
            "created": created
        })
    }

    /// Serves a fixed script of JSON pages; pages beyond the script repeat
    /// the last entry (so "misbehaving pagination" is easy to model).
    struct ScriptedStrategy {
        pages: Vec<(Vec<serde_json::Value>, bool)>,
    }

    #[async_trait]
    impl FetchStrategy for ScriptedStrategy {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn open(&mut self) -> Result<(), CrawlError> {
            Ok(())
        }

        async fn fetch_page(&self, _uid: u64, page: u32) -> Result<PageResult, CrawlError> {
            let idx = ((page - 1) as usize).min(self.pages.len() - 1);
            let (vlist, has_more) = &self.pages[idx];
            Ok(PageResult {
                raw: RawContent::Json(serde_json::json!({ "list": { "vlist": vlist } })),
                page,
                has_more: *has_more,
            })
        }

        async fn close(&mut self) {}
    }

    fn request(start: &str, end: &str) -> FetchRequest {
        FetchRequest {
            uid: 1,
            start_date: day(start),
            end_date: day(end),
            mode: FetchMode::Direct,
        }
    }

    fn limiter() -> RateLimiter {
        RateLimiter::new(PacingProfile::Fast)
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, StdDuration::from_millis(1))
    }

    #[tokio::test(start_paused = true)]
    async fn test_page_ceiling_bounds_misbehaving_pagination() {
        // Claims more pages forever; never yields an empty page.
        let strategy = ScriptedStrategy {
            pages: vec![(vec![vid(1, "2025-06-05", 100, 1)], true)],
        };
        let outcome = paginate(&strategy, &limiter(), &policy(), &request("2025-06-01", "2025-06-07"), 3).await;
        match outcome {
            StrategyOutcome::Success { pages, .. } => assert_eq!(pages, 3),
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_records_filtered_to_window_inclusive() {
        let strategy = ScriptedStrategy {
            pages: vec![(
                vec![
                    vid(1, "2025-06-08", 10, 1), // after window
                    vid(2, "2025-06-07", 20, 2), // end boundary
                    vid(3, "2025-06-03", 30, 3),
                    vid(4, "2025-06-01", 40, 4), // start boundary
                    vid(5, "2025-05-20", 50, 5), // before window
                ],
                false,
            )],
        };
        let outcome = paginate(&strategy, &limiter(), &policy(), &request("2025-06-01", "2025-06-07"), 10).await;
        match outcome {
            StrategyOutcome::Success { records, .. } => {
                let aids: Vec<u64> = records.iter().map(|r| r.aid).collect();
                assert_eq!(aids, vec![2, 3, 4]);
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_first_page_is_an_empty_authoritative_result() {
        let strategy = ScriptedStrategy {
            pages: vec![(vec![], false)],
        };
        let outcome = paginate(&strategy, &limiter(), &policy(), &request("2025-06-01", "2025-06-07"), 10).await;
        match outcome {
            StrategyOutcome::Success { records, pages, provenance } => {
                assert!(records.is_empty());
                assert_eq!(pages, 1);
                assert!(provenance.is_authoritative());
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_once_page_is_past_the_window() {
        let strategy = ScriptedStrategy {
            pages: vec![
                (vec![vid(1, "2025-06-06", 10, 1), vid(2, "2025-06-05", 10, 1)], true),
                // Whole page far older than the window start.
                (vec![vid(3, "2025-04-01", 10, 1), vid(4, "2025-03-28", 10, 1)], true),
                (vec![vid(5, "2025-02-01", 10, 1)], true),
            ],
        };
        let outcome = paginate(&strategy, &limiter(), &policy(), &request("2025-06-01", "2025-06-07"), 10).await;
        match outcome {
            StrategyOutcome::Success { records, pages, .. } => {
                assert_eq!(pages, 2);
                assert_eq!(records.len(), 2);
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    struct AlwaysBlocked;

    #[async_trait]
    impl FetchStrategy for AlwaysBlocked {
        fn name(&self) -> &'static str {
            "blocked"
        }
        async fn open(&mut self) -> Result<(), CrawlError> {
            Ok(())
        }
        async fn fetch_page(&self, _uid: u64, _page: u32) -> Result<PageResult, CrawlError> {
            Err(CrawlError::SecurityBlock("risk control".into()))
        }
        async fn close(&mut self) {}
    }

    #[tokio::test(start_paused = true)]
    async fn test_block_exhaustion_is_a_terminal_blocked_outcome() {
        let outcome = paginate(&AlwaysBlocked, &limiter(), &policy(), &request("2025-06-01", "2025-06-07"), 10).await;
        assert!(matches!(outcome, StrategyOutcome::Blocked(_)));
    }

    #[test]
    fn test_stop_condition_priority_order() {
        let req = request("2025-06-01", "2025-06-07");
        // Empty page wins over everything.
        assert_eq!(
            evaluate_page(&[], false, 99, &req, 10),
            Some(StopReason::EmptyPage)
        );
        let recent = crate::parse::records_from_vlist(&serde_json::json!([
            vid(1, "2025-06-05", 1, 1)
        ]));
        // No-more signal beats the ceiling.
        assert_eq!(
            evaluate_page(&recent, false, 99, &req, 10),
            Some(StopReason::NoMoreSignal)
        );
        // Ceiling fires when nothing else does.
        assert_eq!(
            evaluate_page(&recent, true, 10, &req, 10),
            Some(StopReason::PageCeiling)
        );
        // Mid-run page with more to come: keep going.
        assert_eq!(evaluate_page(&recent, true, 2, &req, 10), None);
    }
}
