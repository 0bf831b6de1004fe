//! Timing - beat-offset folding and precision classification
//!
//! This module evaluates a note's timing against the beat clock grid.
//! Key features:
//! - Signed offset from the *nearest* beat (late hits positive, early hits negative)
//! - Tolerance window expressed as a fraction of the beat period
//! - Perfect/Good bands, then Early/Late for the outer band
//! - Pure functions, no shared state
//!
//! The trainer stores the timestamp of the most recent tick. A note arriving
//! more than half a period after that tick is measured against the *next*
//! beat instead, so it reports as early.

use serde::{Deserialize, Serialize};

use crate::config::TrainerConfig;

/// Precision band of an accepted hit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitPrecision {
    /// Within the perfect fraction of the beat period
    Perfect,
    /// Within the good fraction of the beat period
    Good,
    /// Outer band, before the beat
    Early,
    /// Outer band, after the beat
    Late,
}

impl HitPrecision {
    /// Early and Late share the outer ("fair") band
    pub fn is_fair(self) -> bool {
        matches!(self, HitPrecision::Early | HitPrecision::Late)
    }

    pub fn label(self) -> &'static str {
        match self {
            HitPrecision::Perfect => "perfect",
            HitPrecision::Good => "good",
            HitPrecision::Early => "early",
            HitPrecision::Late => "late",
        }
    }
}

/// Result of evaluating one note against the beat grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimingEvaluation {
    pub precision: HitPrecision,
    /// Signed offset from the nearest beat in milliseconds
    pub offset_ms: f64,
    /// Offset scaled by half a beat period, clamped to [-1, 1]
    pub normalized_offset: f32,
}

/// Tolerance and band fractions, all relative to the beat period
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingWindow {
    pub tolerance_fraction: f64,
    pub perfect_fraction: f64,
    pub good_fraction: f64,
}

impl TimingWindow {
    pub fn from_config(config: &TrainerConfig) -> Self {
        Self {
            tolerance_fraction: config.tolerance_fraction as f64,
            perfect_fraction: config.perfect_fraction as f64,
            good_fraction: config.good_fraction as f64,
        }
    }

    /// Evaluate a note against the most recent beat.
    ///
    /// # Arguments
    /// * `since_last_beat_ms` - time elapsed since the last tick
    /// * `bpm` - current clock tempo
    ///
    /// # Returns
    /// `None` when the note falls outside the tolerance window (mistimed),
    /// otherwise the precision band and offsets.
    ///
    /// # Examples
    /// ```ignore
    /// let window = TimingWindow::from_config(&TrainerConfig::default());
    /// // 120 BPM, period 500ms
    /// assert_eq!(window.evaluate(0.0, 120.0).unwrap().precision, HitPrecision::Perfect);
    /// assert_eq!(window.evaluate(100.0, 120.0).unwrap().precision, HitPrecision::Late);
    /// assert!(window.evaluate(250.0, 120.0).is_none());
    /// ```
    pub fn evaluate(&self, since_last_beat_ms: f64, bpm: f32) -> Option<TimingEvaluation> {
        let period = beat_period_ms(bpm)?;
        let offset_ms = fold_offset(since_last_beat_ms, period);
        let magnitude = offset_ms.abs();

        if magnitude >= self.tolerance_fraction * period {
            return None;
        }

        let precision = if magnitude <= self.perfect_fraction * period {
            HitPrecision::Perfect
        } else if magnitude <= self.good_fraction * period {
            HitPrecision::Good
        } else if offset_ms < 0.0 {
            HitPrecision::Early
        } else {
            HitPrecision::Late
        };

        let normalized = (offset_ms / (period / 2.0)).clamp(-1.0, 1.0) as f32;

        Some(TimingEvaluation {
            precision,
            offset_ms,
            normalized_offset: normalized,
        })
    }
}

impl Default for TimingWindow {
    fn default() -> Self {
        Self::from_config(&TrainerConfig::default())
    }
}

/// Beat period in milliseconds, `None` for a non-positive or non-finite BPM
pub fn beat_period_ms(bpm: f32) -> Option<f64> {
    if !bpm.is_finite() || bpm <= 0.0 {
        return None;
    }
    Some(60_000.0 / bpm as f64)
}

/// Signed offset from the nearest beat.
///
/// `since_last_beat_ms` beyond half a period is re-expressed relative to the
/// following beat and becomes negative.
pub fn fold_offset(since_last_beat_ms: f64, period_ms: f64) -> f64 {
    if since_last_beat_ms > period_ms / 2.0 {
        since_last_beat_ms - period_ms
    } else {
        since_last_beat_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beat_period() {
        assert_eq!(beat_period_ms(120.0), Some(500.0));
        assert_eq!(beat_period_ms(60.0), Some(1000.0));
        assert_eq!(beat_period_ms(0.0), None);
        assert_eq!(beat_period_ms(-10.0), None);
    }

    #[test]
    fn test_hit_on_the_beat_is_perfect() {
        let window = TimingWindow::default();
        let eval = window.evaluate(0.0, 120.0).unwrap();
        assert_eq!(eval.precision, HitPrecision::Perfect);
        assert_eq!(eval.offset_ms, 0.0);
        assert_eq!(eval.normalized_offset, 0.0);
    }

    #[test]
    fn test_hit_100ms_late_is_outer_band() {
        let window = TimingWindow::default();
        let eval = window.evaluate(100.0, 120.0).unwrap();
        assert_eq!(eval.precision, HitPrecision::Late);
        assert!(eval.precision.is_fair());
        assert!((eval.offset_ms - 100.0).abs() < 1e-9);
        assert!((eval.normalized_offset - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_hit_at_half_period_is_rejected() {
        let window = TimingWindow::default();
        assert!(window.evaluate(250.0, 120.0).is_none());
    }

    #[test]
    fn test_good_band() {
        let window = TimingWindow::default();
        // 50ms = 10% of 500ms
        let eval = window.evaluate(50.0, 120.0).unwrap();
        assert_eq!(eval.precision, HitPrecision::Good);
    }

    #[test]
    fn test_overshoot_folds_into_early_hit() {
        let window = TimingWindow::default();
        // 470ms after the last tick is 30ms before the next one
        let eval = window.evaluate(470.0, 120.0).unwrap();
        assert!((eval.offset_ms + 30.0).abs() < 1e-9);
        assert_eq!(eval.precision, HitPrecision::Good);

        // 350ms after is 150ms early (30%): outer band, still inside tolerance
        let eval = window.evaluate(350.0, 120.0).unwrap();
        assert_eq!(eval.precision, HitPrecision::Early);
        assert!(eval.normalized_offset < 0.0);
    }

    #[test]
    fn test_early_beyond_tolerance_is_rejected() {
        let window = TimingWindow::default();
        // 290ms after = 210ms early (42%)
        assert!(window.evaluate(290.0, 120.0).is_none());
    }

    #[test]
    fn test_invalid_bpm_never_accepts() {
        let window = TimingWindow::default();
        assert!(window.evaluate(0.0, 0.0).is_none());
    }

    #[test]
    fn test_fold_offset() {
        assert_eq!(fold_offset(100.0, 500.0), 100.0);
        assert_eq!(fold_offset(250.0, 500.0), 250.0);
        assert_eq!(fold_offset(400.0, 500.0), -100.0);
    }
}
