use crate::domain::article::SentimentLabel;
use anyhow::ensure;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentThresholds {
    /// Score strictly above this is Positive.
    pub positive: f64,
    /// Score strictly below this is Negative.
    pub negative: f64,
}

impl Default for SentimentThresholds {
    fn default() -> Self {
        Self::symmetric(0.15)
    }
}

impl SentimentThresholds {
    pub fn symmetric(threshold: f64) -> Self {
        Self {
            positive: threshold,
            negative: -threshold,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            (-1.0..=1.0).contains(&self.negative) && (-1.0..=1.0).contains(&self.positive),
            "sentiment thresholds must lie in [-1, 1] (got {}/{})",
            self.negative,
            self.positive
        );
        ensure!(
            self.negative <= self.positive,
            "negative threshold must not exceed positive threshold"
        );
        Ok(())
    }

    pub fn label(&self, score: f64) -> SentimentLabel {
        if score > self.positive {
            SentimentLabel::Positive
        } else if score < self.negative {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentBreakdown {
    pub positive: usize,
    pub negative: usize,
    pub neutral: usize,
}

impl SentimentBreakdown {
    pub fn total(&self) -> usize {
        self.positive + self.negative + self.neutral
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentBundle {
    pub label: SentimentLabel,
    /// (positive - negative) / count, in [-1, 1].
    pub score: f64,
    pub count: usize,
    pub breakdown: SentimentBreakdown,
}

/// `NoSignal` means nothing was labeled, which is not the same as neutral news.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SentimentOutcome {
    Signal(SentimentBundle),
    NoSignal,
}

impl SentimentOutcome {
    pub fn bundle(&self) -> Option<&SentimentBundle> {
        match self {
            Self::Signal(bundle) => Some(bundle),
            Self::NoSignal => None,
        }
    }
}

pub fn aggregate(labels: &[SentimentLabel], thresholds: &SentimentThresholds) -> SentimentOutcome {
    let mut breakdown = SentimentBreakdown::default();
    for label in labels {
        match label {
            SentimentLabel::Positive => breakdown.positive += 1,
            SentimentLabel::Negative => breakdown.negative += 1,
            SentimentLabel::Neutral => breakdown.neutral += 1,
        }
    }

    let count = breakdown.total();
    if count == 0 {
        return SentimentOutcome::NoSignal;
    }

    let score = (breakdown.positive as f64 - breakdown.negative as f64) / count.max(1) as f64;
    SentimentOutcome::Signal(SentimentBundle {
        label: thresholds.label(score),
        score,
        count,
        breakdown,
    })
}
