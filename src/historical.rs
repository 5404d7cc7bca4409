//! Historical index back-extrapolation.
//!
//! Crawled counts are cumulative, so the index for a past date cannot be
//! observed directly; it is estimated from today's index by assuming a
//! growth shape and running it backwards. Three models are supported:
//!
//! | Model | Estimate for `d` days ago |
//! |-------|---------------------------|
//! | Exponential | `index * exp(-decay_rate * d)` |
//! | Linear | `index / (1 + growth_rate * d)` |
//! | Hybrid | `0.7 * exponential + 0.3 * linear` |
//!
//! Estimates are clearly marked as such in the output; they never replace
//! observed history points.

use crate::error::CrawlError;
use chrono::NaiveDate;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Default exponential decay rate per day.
pub const DEFAULT_DECAY_RATE: f64 = 0.05;
/// Default linear growth rate per day.
pub const DEFAULT_GROWTH_RATE: f64 = 0.02;
/// Exponential-model weight in the hybrid estimate.
const HYBRID_EXP_WEIGHT: f64 = 0.7;

/// Growth shape assumed when running the index backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackfillModel {
    Exponential,
    Linear,
    Hybrid,
}

/// One estimated point of the back-extrapolated series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimatedPoint {
    pub date: NaiveDate,
    pub index: f64,
    pub model: BackfillModel,
    /// Always true; keeps estimated series distinguishable from observed
    /// history when files are consumed together.
    pub estimated: bool,
}

/// Back-extrapolation parameters.
#[derive(Debug, Clone, Copy)]
pub struct HistoricalCalculator {
    decay_rate: f64,
    growth_rate: f64,
}

impl Default for HistoricalCalculator {
    fn default() -> Self {
        Self {
            decay_rate: DEFAULT_DECAY_RATE,
            growth_rate: DEFAULT_GROWTH_RATE,
        }
    }
}

impl HistoricalCalculator {
    pub fn new(decay_rate: f64, growth_rate: f64) -> Self {
        Self {
            decay_rate,
            growth_rate,
        }
    }

    /// `index * exp(-decay_rate * d)`: assumes the data grew exponentially.
    pub fn exponential_decay(&self, current_index: f64, days_ago: i64) -> f64 {
        if days_ago <= 0 {
            return current_index;
        }
        current_index * (-self.decay_rate * days_ago as f64).exp()
    }

    /// `index / (1 + growth_rate * d)`: assumes the data grew linearly.
    pub fn linear_growth(&self, current_index: f64, days_ago: i64) -> f64 {
        if days_ago <= 0 {
            return current_index;
        }
        current_index / (1.0 + self.growth_rate * days_ago as f64)
    }

    /// Weighted blend of the two shapes.
    pub fn hybrid(&self, current_index: f64, days_ago: i64) -> f64 {
        if days_ago <= 0 {
            return current_index;
        }
        HYBRID_EXP_WEIGHT * self.exponential_decay(current_index, days_ago)
            + (1.0 - HYBRID_EXP_WEIGHT) * self.linear_growth(current_index, days_ago)
    }

    /// Estimate the index for one past date.
    pub fn estimate(
        &self,
        current_index: f64,
        target: NaiveDate,
        as_of: NaiveDate,
        model: BackfillModel,
    ) -> Result<f64, CrawlError> {
        if target > as_of {
            return Err(CrawlError::Configuration(format!(
                "backfill target {target} is after the observation date {as_of}"
            )));
        }
        let days_ago = (as_of - target).num_days();
        Ok(match model {
            BackfillModel::Exponential => self.exponential_decay(current_index, days_ago),
            BackfillModel::Linear => self.linear_growth(current_index, days_ago),
            BackfillModel::Hybrid => self.hybrid(current_index, days_ago),
        })
    }

    /// Estimate the series for every day of `start..=end`, oldest first.
    pub fn backfill_series(
        &self,
        current_index: f64,
        start: NaiveDate,
        end: NaiveDate,
        as_of: NaiveDate,
        model: BackfillModel,
    ) -> Result<Vec<EstimatedPoint>, CrawlError> {
        if start > end {
            return Err(CrawlError::Configuration(format!(
                "backfill start {start} is after end {end}"
            )));
        }
        let mut points = Vec::new();
        let mut date = start;
        while date <= end {
            let index = self.estimate(current_index, date, as_of, model)?;
            points.push(EstimatedPoint {
                date,
                index: (index * 100.0).round() / 100.0,
                model,
                estimated: true,
            });
            date += chrono::Duration::days(1);
        }
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_zero_days_ago_returns_the_current_index() {
        let calc = HistoricalCalculator::default();
        assert_eq!(calc.exponential_decay(10.0, 0), 10.0);
        assert_eq!(calc.linear_growth(10.0, 0), 10.0);
        assert_eq!(calc.hybrid(10.0, 0), 10.0);
    }

    #[test]
    fn test_exponential_decay_values() {
        let calc = HistoricalCalculator::default();
        // 10 * exp(-0.05 * 10) = 10 * exp(-0.5)
        let expected = 10.0 * (-0.5f64).exp();
        assert!((calc.exponential_decay(10.0, 10) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_linear_growth_values() {
        let calc = HistoricalCalculator::default();
        // 10 / (1 + 0.02 * 10) = 10 / 1.2
        assert!((calc.linear_growth(10.0, 10) - 10.0 / 1.2).abs() < 1e-9);
    }

    #[test]
    fn test_hybrid_sits_between_its_components() {
        let calc = HistoricalCalculator::default();
        let exp = calc.exponential_decay(10.0, 10);
        let lin = calc.linear_growth(10.0, 10);
        let hyb = calc.hybrid(10.0, 10);
        assert!(hyb > exp.min(lin) && hyb < exp.max(lin));
        assert!((hyb - (0.7 * exp + 0.3 * lin)).abs() < 1e-9);
    }

    #[test]
    fn test_estimates_shrink_as_days_increase() {
        let calc = HistoricalCalculator::default();
        for model in [
            BackfillModel::Exponential,
            BackfillModel::Linear,
            BackfillModel::Hybrid,
        ] {
            let as_of = day("2025-06-07");
            let near = calc.estimate(10.0, day("2025-06-05"), as_of, model).unwrap();
            let far = calc.estimate(10.0, day("2025-05-01"), as_of, model).unwrap();
            assert!(far < near && near < 10.0, "{model:?}");
        }
    }

    #[test]
    fn test_future_target_is_a_configuration_error() {
        let calc = HistoricalCalculator::default();
        let result = calc.estimate(
            10.0,
            day("2025-06-10"),
            day("2025-06-07"),
            BackfillModel::Exponential,
        );
        assert!(matches!(result, Err(CrawlError::Configuration(_))));
    }

    #[test]
    fn test_backfill_series_covers_window_oldest_first() {
        let calc = HistoricalCalculator::default();
        let points = calc
            .backfill_series(
                10.0,
                day("2025-06-01"),
                day("2025-06-07"),
                day("2025-06-07"),
                BackfillModel::Hybrid,
            )
            .unwrap();
        assert_eq!(points.len(), 7);
        assert_eq!(points[0].date, day("2025-06-01"));
        assert_eq!(points[6].date, day("2025-06-07"));
        assert!(points.iter().all(|p| p.estimated));
        // Monotonic towards the observation date.
        assert!(points.windows(2).all(|w| w[0].index <= w[1].index));
        assert_eq!(points[6].index, 10.0);
    }
}
