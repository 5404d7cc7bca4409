//! JSON persistence for index snapshots.
//!
//! Two files are maintained per output directory: a per-date snapshot with
//! the full record set and provenance, and a cumulative `history.json`
//! holding the date -> index series that charting tools consume. Writing
//! the same date twice replaces the history entry instead of stacking a
//! duplicate point. Back-extrapolated series go to a separate
//! `estimates.json` so estimated points never mix into observed history.

use crate::historical::EstimatedPoint;
use crate::models::{Provenance, VideoRecord};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fs as stdfs;
use tokio::fs;
use tracing::{info, instrument};

const HISTORY_FILE: &str = "history.json";

/// One run's persisted result.
#[derive(Debug, Serialize, Deserialize)]
pub struct DailySnapshot {
    pub date: NaiveDate,
    pub index: f64,
    pub video_count: usize,
    pub pages_traversed: u32,
    pub provenance: Option<Provenance>,
    pub videos: Vec<VideoRecord>,
}

/// One point of the cumulative series.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub date: NaiveDate,
    pub index: f64,
}

/// Write the per-date snapshot to `{output_dir}/{date}.json`.
#[instrument(level = "info", skip_all, fields(output_dir = %output_dir, date = %snapshot.date))]
pub async fn write_snapshot(
    snapshot: &DailySnapshot,
    output_dir: &str,
) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(output_dir).await?;
    let path = format!("{}/{}.json", output_dir.trim_end_matches('/'), snapshot.date);
    let json = serde_json::to_string_pretty(snapshot)?;
    fs::write(&path, json).await?;
    info!(path = %path, "Wrote daily snapshot");
    Ok(())
}

/// Append (or replace) one point in `{output_dir}/history.json`.
#[instrument(level = "info", skip_all, fields(output_dir = %output_dir, date = %entry.date))]
pub async fn update_history(
    entry: HistoryEntry,
    output_dir: &str,
) -> Result<Vec<HistoryEntry>, Box<dyn Error>> {
    fs::create_dir_all(output_dir).await?;
    let path = format!("{}/{HISTORY_FILE}", output_dir.trim_end_matches('/'));

    let mut history: Vec<HistoryEntry> = match fs::read_to_string(&path).await {
        Ok(contents) => serde_json::from_str(&contents)?,
        Err(_) => Vec::new(),
    };

    history.retain(|existing| existing.date != entry.date);
    history.push(entry);
    history.sort_by_key(|e| e.date);

    let json = serde_json::to_string_pretty(&history)?;
    fs::write(&path, json).await?;
    info!(path = %path, points = history.len(), "Updated history series");
    Ok(history)
}

/// Write a back-extrapolated series to `{output_dir}/estimates.json`,
/// replacing any previous run's estimates.
#[instrument(level = "info", skip_all, fields(output_dir = %output_dir, points = points.len()))]
pub async fn write_estimates(
    points: &[EstimatedPoint],
    output_dir: &str,
) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(output_dir).await?;
    let path = format!("{}/estimates.json", output_dir.trim_end_matches('/'));
    let json = serde_json::to_string_pretty(points)?;
    fs::write(&path, json).await?;
    info!(path = %path, "Wrote back-extrapolated estimates");
    Ok(())
}

/// Ensure a directory exists and is writable before the crawl starts.
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    let probe_path = format!("{}/..__probe_write__", path.trim_end_matches('/'));
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!("Output directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}
