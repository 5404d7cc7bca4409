//! # bili_index
//!
//! Crawls a Bilibili creator's published videos over a date window, reduces
//! them to a popularity index, and persists daily + history JSON for
//! charting.
//!
//! ## Architecture
//!
//! The hard part is acquisition, not scoring. The platform fingerprints and
//! blocks automated access, so three structurally different transports hide
//! behind one strategy interface:
//!
//! 1. **Direct API**: the structured listing endpoint (fastest, most easily
//!    flagged)
//! 2. **Simulated client**: plain HTTP with a realistic browser identity
//! 3. **Automated browser**: a real Chromium engine driving the listing SPA
//!
//! An orchestrator escalates across them on terminal failures, a pagination
//! controller walks pages with bounded stop conditions, a layered parsing
//! chain reduces raw pages to records, and a retry controller with
//! exponential backoff plus a humanized rate limiter wraps every network
//! touch.
//!
//! ## Usage
//!
//! ```sh
//! bili_index --mode auto -o ./data
//! ```

use chrono::Local;
use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod calculator;
mod cli;
mod config;
mod error;
mod historical;
mod models;
mod orchestrator;
mod outputs;
mod pacing;
mod pagination;
mod parse;
mod retry;
mod strategies;

use cli::Cli;
use models::FetchRequest;
use orchestrator::Orchestrator;
use historical::HistoricalCalculator;
use outputs::json::{
    DailySnapshot, HistoryEntry, ensure_writable_dir, update_history, write_estimates,
    write_snapshot,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("bili_index starting up");

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    // Early check: fail before any network traffic if we cannot persist.
    if let Err(e) = ensure_writable_dir(&args.output_dir).await {
        error!(
            path = %args.output_dir,
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    let today = Local::now().date_naive();
    let (start_date, end_date) = args.window(today);
    let request = FetchRequest {
        uid: args.uid,
        start_date,
        end_date,
        mode: args.mode,
    };
    info!(
        uid = request.uid,
        %start_date,
        %end_date,
        mode = ?request.mode,
        "Acquisition window resolved"
    );

    let orchestrator = Orchestrator::new(args.crawl_config());
    let report = orchestrator.acquire(&request).await?;

    if report.failed() {
        for attempt in &report.attempts {
            error!(
                strategy = attempt.strategy,
                failure = ?attempt.failure,
                detail = %attempt.detail,
                "Strategy terminated"
            );
        }
        return Err("acquisition failed: every strategy exhausted and fallback disabled".into());
    }
    if report.synthetic_fallback {
        info!("Serving synthetic fallback data; the index below is not authoritative");
    }

    let index = calculator::calculate_index(&report.records);
    for video in &report.records {
        debug!(
            aid = video.aid,
            title = %video.title,
            pubdate = %video.pubdate,
            contribution = calculator::video_contribution(video),
            "Video contribution"
        );
    }
    info!(
        index,
        videos = report.records.len(),
        pages = report.pages_traversed,
        authoritative = report.authoritative,
        "Index computed"
    );

    let snapshot = DailySnapshot {
        date: end_date,
        index,
        video_count: report.records.len(),
        pages_traversed: report.pages_traversed,
        provenance: report.provenance,
        videos: report.records,
    };
    write_snapshot(&snapshot, &args.output_dir).await?;
    update_history(HistoryEntry { date: end_date, index }, &args.output_dir).await?;

    if let Some(model) = args.backfill_model {
        let calc = HistoricalCalculator::new(args.decay_rate, args.growth_rate);
        let estimates = calc.backfill_series(index, start_date, end_date, end_date, model)?;
        info!(?model, points = estimates.len(), "Back-extrapolated estimated series");
        write_estimates(&estimates, &args.output_dir).await?;
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    Ok(())
}
