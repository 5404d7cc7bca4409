//! Command-line interface definitions.
//!
//! All tunables of the acquisition core surface here as flags with the
//! defaults documented in [`crate::config`]. The date window defaults to
//! the last seven days (today minus six through today).

use crate::config::{CrawlConfig, DEFAULT_DAYS_RANGE, DEFAULT_UID};
use crate::historical::{BackfillModel, DEFAULT_DECAY_RATE, DEFAULT_GROWTH_RATE};
use crate::models::FetchMode;
use crate::pacing::PacingProfile;
use chrono::NaiveDate;
use clap::Parser;
use std::time::Duration;

/// Command-line arguments.
///
/// # Examples
///
/// ```sh
/// # Last seven days, auto escalation, output next to the binary
/// bili_index
///
/// # Pin the browser strategy for a custom window, with fast pacing
/// bili_index --mode automated --start-date 2025-06-01 --end-date 2025-06-07 --fast
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Creator UID to crawl
    #[arg(short, long, default_value_t = DEFAULT_UID)]
    pub uid: u64,

    /// Window start (YYYY-MM-DD); defaults to six days before the end date
    #[arg(long)]
    pub start_date: Option<NaiveDate>,

    /// Window end (YYYY-MM-DD); defaults to today
    #[arg(long)]
    pub end_date: Option<NaiveDate>,

    /// Transport mode
    #[arg(short, long, value_enum, default_value = "auto")]
    pub mode: FetchMode,

    /// Use the fast pacing profile (roughly 10x tighter delays)
    #[arg(long)]
    pub fast: bool,

    /// Output directory for snapshot and history JSON
    #[arg(short, long, default_value = ".")]
    pub output_dir: String,

    /// Hard page-count ceiling per strategy
    #[arg(long, default_value_t = 20)]
    pub max_pages: u32,

    /// Per-operation timeout in seconds
    #[arg(long, default_value_t = 10)]
    pub timeout: u64,

    /// Retry attempt ceiling per page fetch
    #[arg(long, default_value_t = 3)]
    pub retries: u32,

    /// Proxy endpoint for the HTTP strategies
    #[arg(long, env = "BILI_INDEX_PROXY")]
    pub proxy: Option<String>,

    /// Serve deterministic synthetic data when every strategy fails
    #[arg(long)]
    pub allow_synthetic: bool,

    /// Show the browser window instead of running headless
    #[arg(long)]
    pub headed: bool,

    /// Back-extrapolate an estimated index series over the window with the
    /// given growth model, written to estimates.json
    #[arg(long, value_enum)]
    pub backfill_model: Option<BackfillModel>,

    /// Daily decay rate for the exponential backfill model
    #[arg(long, default_value_t = DEFAULT_DECAY_RATE)]
    pub decay_rate: f64,

    /// Daily growth rate for the linear backfill model
    #[arg(long, default_value_t = DEFAULT_GROWTH_RATE)]
    pub growth_rate: f64,
}

impl Cli {
    /// Immutable configuration snapshot for this run.
    pub fn crawl_config(&self) -> CrawlConfig {
        CrawlConfig {
            timeout: Duration::from_secs(self.timeout),
            retry_attempts: self.retries,
            pacing: if self.fast {
                PacingProfile::Fast
            } else {
                PacingProfile::Standard
            },
            max_pages: self.max_pages,
            proxy: self.proxy.clone(),
            allow_synthetic: self.allow_synthetic,
            headless: !self.headed,
            ..CrawlConfig::default()
        }
    }

    /// Resolve the date window against today's date.
    pub fn window(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let end = self.end_date.unwrap_or(today);
        let start = self
            .start_date
            .unwrap_or(end - chrono::Duration::days(DEFAULT_DAYS_RANGE));
        (start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["bili_index"]);
        assert_eq!(cli.uid, DEFAULT_UID);
        assert_eq!(cli.mode, FetchMode::Auto);
        assert_eq!(cli.max_pages, 20);
        assert_eq!(cli.retries, 3);
        assert!(!cli.fast);
        assert!(!cli.allow_synthetic);
        assert!(cli.backfill_model.is_none());
        assert_eq!(cli.decay_rate, DEFAULT_DECAY_RATE);
        assert_eq!(cli.growth_rate, DEFAULT_GROWTH_RATE);
    }

    #[test]
    fn test_backfill_model_values() {
        for (value, model) in [
            ("exponential", BackfillModel::Exponential),
            ("linear", BackfillModel::Linear),
            ("hybrid", BackfillModel::Hybrid),
        ] {
            let cli = Cli::parse_from(["bili_index", "--backfill-model", value]);
            assert_eq!(cli.backfill_model, Some(model));
        }
    }

    #[test]
    fn test_cli_mode_values() {
        for (value, mode) in [
            ("direct", FetchMode::Direct),
            ("simulated", FetchMode::Simulated),
            ("automated", FetchMode::Automated),
            ("auto", FetchMode::Auto),
        ] {
            let cli = Cli::parse_from(["bili_index", "--mode", value]);
            assert_eq!(cli.mode, mode);
        }
    }

    #[test]
    fn test_fast_flag_selects_fast_pacing() {
        let cli = Cli::parse_from(["bili_index", "--fast"]);
        assert_eq!(cli.crawl_config().pacing, PacingProfile::Fast);
        let cli = Cli::parse_from(["bili_index"]);
        assert_eq!(cli.crawl_config().pacing, PacingProfile::Standard);
    }

    #[test]
    fn test_window_defaults_to_last_seven_days() {
        let cli = Cli::parse_from(["bili_index"]);
        let today = "2025-06-07".parse().unwrap();
        let (start, end) = cli.window(today);
        assert_eq!(end, today);
        assert_eq!(start, "2025-06-01".parse::<NaiveDate>().unwrap());
    }

    #[test]
    fn test_explicit_window_is_passed_through() {
        let cli = Cli::parse_from([
            "bili_index",
            "--start-date",
            "2025-05-01",
            "--end-date",
            "2025-05-03",
        ]);
        let today = "2025-06-07".parse().unwrap();
        let (start, end) = cli.window(today);
        assert_eq!(start, "2025-05-01".parse::<NaiveDate>().unwrap());
        assert_eq!(end, "2025-05-03".parse::<NaiveDate>().unwrap());
    }
}
