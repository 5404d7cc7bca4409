//! Data model for the acquisition pipeline.
//!
//! This module defines the records exchanged between the strategies, the
//! pagination controller and the orchestrator:
//! - [`VideoRecord`]: one published video, as extracted by a parsing path
//! - [`FetchRequest`]: the caller's acquisition request (creator + window + mode)
//! - [`PageResult`]: one raw listing page as produced by a strategy
//! - [`StrategyOutcome`]: terminal result of driving one strategy to completion
//! - [`AcquisitionReport`]: the output contract handed to the scoring collaborator

use crate::error::CrawlError;
use chrono::NaiveDate;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// One published video in a creator's listing.
///
/// Immutable once returned by a parsing path. Counts are unsigned by
/// construction; a parsing path that cannot determine a count substitutes 0
/// rather than omitting the field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRecord {
    /// Platform item id, unique per item.
    pub aid: u64,
    /// View count.
    pub view: u64,
    /// Comment count.
    pub comment: u64,
    /// Publication date (derived from `created`).
    pub pubdate: NaiveDate,
    /// Video title.
    pub title: String,
    /// Publication timestamp, epoch seconds.
    pub created: i64,
}

/// Transport mode requested by the caller.
///
/// `Auto` walks the priority table in [`crate::strategies`]; the other
/// variants pin a single strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FetchMode {
    /// Structured listing API.
    Direct,
    /// Plain HTTP with a realistic browser identity.
    Simulated,
    /// Real browser engine.
    Automated,
    /// Escalate Direct -> Simulated -> Automated on terminal failure.
    Auto,
}

/// One acquisition request, read-only for the duration of a run.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Creator id (UP主 UID).
    pub uid: u64,
    /// Window start, inclusive.
    pub start_date: NaiveDate,
    /// Window end, inclusive.
    pub end_date: NaiveDate,
    /// Requested transport mode.
    pub mode: FetchMode,
}

impl FetchRequest {
    /// Validate the request before any network operation is attempted.
    pub fn validate(&self) -> Result<(), CrawlError> {
        if self.start_date > self.end_date {
            return Err(CrawlError::Configuration(format!(
                "start date {} is after end date {}",
                self.start_date, self.end_date
            )));
        }
        Ok(())
    }
}

/// Raw listing-page content, opaque to the orchestrator.
///
/// The direct strategy yields the API's JSON `data` payload; the HTTP and
/// browser strategies yield the page markup.
#[derive(Debug, Clone)]
pub enum RawContent {
    Json(serde_json::Value),
    Html(String),
}

/// One listing page as produced by a strategy.
///
/// Consumed once by the parsing chain, then discarded; pages are never
/// retained across iterations.
#[derive(Debug)]
pub struct PageResult {
    pub raw: RawContent,
    /// 1-based page index.
    pub page: u32,
    /// Strategy-reported further-page signal. For the direct strategy this is
    /// list emptiness; for the markup strategies it is the pager control state.
    pub has_more: bool,
}

/// Which parsing path produced a set of records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Typed decode of the structured listing API payload.
    Api,
    /// Embedded hydration-state data island.
    InitialState,
    /// Current platform markup conventions.
    ModernDom,
    /// Older markup shapes.
    LegacyDom,
    /// Deterministic synthetic generator; never authoritative.
    Synthetic,
}

impl Provenance {
    /// Whether records with this provenance derive from real platform content.
    pub fn is_authoritative(&self) -> bool {
        !matches!(self, Provenance::Synthetic)
    }
}

/// Coarse failure classification used for reporting and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Transport,
    Blocked,
    Parse,
}

impl From<&CrawlError> for FailureKind {
    fn from(e: &CrawlError) -> Self {
        match e {
            CrawlError::Transport(_) => FailureKind::Transport,
            CrawlError::SecurityBlock(_) => FailureKind::Blocked,
            // Configuration errors never reach the per-strategy layer; they
            // are rejected before a strategy is constructed.
            CrawlError::Parse | CrawlError::Configuration(_) => FailureKind::Parse,
        }
    }
}

/// Terminal result of driving one strategy through pagination.
#[derive(Debug)]
pub enum StrategyOutcome {
    /// Pagination reached `Done`; records are filtered to the window.
    Success {
        records: Vec<VideoRecord>,
        pages: u32,
        provenance: Provenance,
    },
    /// The platform explicitly rejected us and retries were exhausted.
    Blocked(String),
    /// No parsing path produced records.
    ParseFailure,
    /// Transport retries were exhausted.
    TransportFailure(String),
}

/// One attempted-and-failed strategy, for the final report.
#[derive(Debug, Clone, Serialize)]
pub struct StrategyAttempt {
    pub strategy: &'static str,
    pub failure: FailureKind,
    pub detail: String,
}

/// Output contract of one acquisition run.
///
/// Callers must be able to tell "no data in range" (authoritative, empty
/// `records`) apart from "acquisition failed" (`authoritative` false and no
/// synthetic fallback).
#[derive(Debug, Serialize)]
pub struct AcquisitionReport {
    pub records: Vec<VideoRecord>,
    /// Which parsing path produced `records`; `None` when acquisition failed
    /// outright.
    pub provenance: Option<Provenance>,
    pub pages_traversed: u32,
    /// Strategies that terminated with a failure, in attempt order.
    pub attempts: Vec<StrategyAttempt>,
    /// True when the synthetic generator supplied `records`.
    pub synthetic_fallback: bool,
    /// True when `records` derive from real platform content.
    pub authoritative: bool,
}

impl AcquisitionReport {
    /// All strategies exhausted and no fallback invoked.
    pub fn failed(&self) -> bool {
        !self.authoritative && !self.synthetic_fallback
    }
}
