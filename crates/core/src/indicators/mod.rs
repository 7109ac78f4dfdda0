pub mod math;

use crate::domain::price::PriceHistory;
use anyhow::ensure;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorConfig {
    pub sma_windows: Vec<usize>,
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            sma_windows: vec![20, 50],
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
        }
    }
}

impl IndicatorConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(!self.sma_windows.is_empty(), "at least one SMA window is required");
        ensure!(
            self.sma_windows.iter().all(|&w| w > 0),
            "SMA windows must be positive (got {:?})",
            self.sma_windows
        );
        ensure!(self.rsi_period > 0, "RSI period must be positive");
        ensure!(
            self.macd_fast > 0 && self.macd_signal > 0,
            "MACD periods must be positive"
        );
        ensure!(
            self.macd_fast < self.macd_slow,
            "MACD fast period must be below slow period (got {}/{})",
            self.macd_fast,
            self.macd_slow
        );
        Ok(())
    }

    /// Closes needed before every indicator has a value.
    pub fn required_history(&self) -> usize {
        let sma = self.sma_windows.iter().copied().max().unwrap_or(0);
        let rsi = self.rsi_period + 1;
        let macd = self.macd_slow + self.macd_signal - 1;
        sma.max(rsi).max(macd)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmaValue {
    pub window: usize,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MacdCross {
    /// Histogram turned positive on the latest bar.
    BullishCrossover,
    /// Histogram turned negative on the latest bar.
    BearishCrossover,
    Bullish,
    Bearish,
    Flat,
}

impl MacdCross {
    fn classify(histogram: f64, previous: Option<f64>) -> Self {
        match previous {
            Some(prev) if histogram > 0.0 && prev <= 0.0 => Self::BullishCrossover,
            Some(prev) if histogram < 0.0 && prev >= 0.0 => Self::BearishCrossover,
            _ if histogram > 0.0 => Self::Bullish,
            _ if histogram < 0.0 => Self::Bearish,
            _ => Self::Flat,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacdValue {
    pub line: f64,
    pub signal: f64,
    pub histogram: f64,
    pub previous_histogram: Option<f64>,
    pub cross: MacdCross,
}

/// Latest indicator values. Only built when every configured indicator has a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorBundle {
    pub as_of: NaiveDate,
    pub last_close: f64,
    pub sma: Vec<SmaValue>,
    pub rsi_period: usize,
    pub rsi: f64,
    pub macd: MacdValue,
}

impl IndicatorBundle {
    pub fn sma(&self, window: usize) -> Option<f64> {
        self.sma.iter().find(|s| s.window == window).map(|s| s.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IndicatorOutcome {
    Ready(IndicatorBundle),
    InsufficientData { required: usize, available: usize },
}

impl IndicatorOutcome {
    pub fn bundle(&self) -> Option<&IndicatorBundle> {
        match self {
            Self::Ready(bundle) => Some(bundle),
            Self::InsufficientData { .. } => None,
        }
    }
}

/// Computes every configured indicator at the latest close of `history`.
pub fn compute(history: &PriceHistory, config: &IndicatorConfig) -> IndicatorOutcome {
    let required = config.required_history();
    let available = history.len();
    let insufficient = IndicatorOutcome::InsufficientData {
        required,
        available,
    };

    let Some(latest) = history.latest() else {
        return insufficient;
    };
    if available < required {
        return insufficient;
    }

    let closes = history.closes();

    let mut sma = Vec::with_capacity(config.sma_windows.len());
    for &window in &config.sma_windows {
        let Some(value) = math::sma(&closes, window) else {
            return insufficient;
        };
        sma.push(SmaValue { window, value });
    }

    let Some(rsi) = math::rsi(&closes, config.rsi_period) else {
        return insufficient;
    };

    let series = math::macd(&closes, config.macd_fast, config.macd_slow, config.macd_signal);
    let (Some(&line), Some(&signal), Some(&histogram)) = (
        series.line.last(),
        series.signal.last(),
        series.histogram.last(),
    ) else {
        return insufficient;
    };
    let previous_histogram = series
        .histogram
        .len()
        .checked_sub(2)
        .map(|i| series.histogram[i]);

    IndicatorOutcome::Ready(IndicatorBundle {
        as_of: latest.date,
        last_close: latest.close,
        sma,
        rsi_period: config.rsi_period,
        rsi,
        macd: MacdValue {
            line,
            signal,
            histogram,
            previous_histogram,
            cross: MacdCross::classify(histogram, previous_histogram),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::price::PricePoint;
    use chrono::Duration;

    fn history(closes: &[f64]) -> PriceHistory {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let points = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| PricePoint {
                date: start + Duration::days(i as i64),
                close,
            })
            .collect();
        PriceHistory::try_new("TEST", None, points).unwrap()
    }

    #[test]
    fn default_config_requires_fifty_closes() {
        let config = IndicatorConfig::default();
        config.validate().unwrap();
        assert_eq!(config.required_history(), 50);
    }

    #[test]
    fn short_history_is_insufficient_not_zero() {
        let closes: Vec<f64> = (0..10).map(|i| 100.0 + i as f64).collect();
        let outcome = compute(&history(&closes), &IndicatorConfig::default());
        assert_eq!(
            outcome,
            IndicatorOutcome::InsufficientData {
                required: 50,
                available: 10
            }
        );
        assert!(outcome.bundle().is_none());
    }

    #[test]
    fn history_shorter_than_rsi_period_is_insufficient() {
        let config = IndicatorConfig {
            sma_windows: vec![3],
            rsi_period: 14,
            macd_fast: 2,
            macd_slow: 4,
            macd_signal: 2,
        };
        let closes: Vec<f64> = (0..12).map(|i| 10.0 + i as f64).collect();
        assert!(compute(&history(&closes), &config).bundle().is_none());
    }

    #[test]
    fn empty_history_is_insufficient() {
        let outcome = compute(&history(&[]), &IndicatorConfig::default());
        assert!(matches!(
            outcome,
            IndicatorOutcome::InsufficientData { available: 0, .. }
        ));
    }

    #[test]
    fn bundle_has_every_configured_window() {
        let closes: Vec<f64> = (0..80).map(|i| 100.0 + (i as f64 * 0.2).sin()).collect();
        let outcome = compute(&history(&closes), &IndicatorConfig::default());
        let bundle = outcome.bundle().unwrap();

        let expected_20 = closes[60..].iter().sum::<f64>() / 20.0;
        let expected_50 = closes[30..].iter().sum::<f64>() / 50.0;
        assert!((bundle.sma(20).unwrap() - expected_20).abs() < 1e-9);
        assert!((bundle.sma(50).unwrap() - expected_50).abs() < 1e-9);
        assert!((0.0..=100.0).contains(&bundle.rsi));
        assert!(bundle.macd.previous_histogram.is_some());
        assert!((bundle.macd.histogram - (bundle.macd.line - bundle.macd.signal)).abs() < 1e-12);
        assert_eq!(bundle.last_close, *closes.last().unwrap());
    }

    #[test]
    fn macd_cross_classification() {
        assert_eq!(MacdCross::classify(0.5, Some(-0.1)), MacdCross::BullishCrossover);
        assert_eq!(MacdCross::classify(-0.5, Some(0.0)), MacdCross::BearishCrossover);
        assert_eq!(MacdCross::classify(0.5, Some(0.2)), MacdCross::Bullish);
        assert_eq!(MacdCross::classify(-0.5, None), MacdCross::Bearish);
        assert_eq!(MacdCross::classify(0.0, Some(0.0)), MacdCross::Flat);
    }

    #[test]
    fn config_validation() {
        let mut config = IndicatorConfig::default();
        config.macd_fast = 30;
        assert!(config.validate().is_err());

        let config = IndicatorConfig {
            sma_windows: vec![],
            ..IndicatorConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
