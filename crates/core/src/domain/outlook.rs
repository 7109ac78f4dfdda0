use crate::domain::article::LabeledArticle;
use crate::domain::profile::CompanyProfile;
use crate::indicators::IndicatorOutcome;
use crate::news::aggregate::SentimentOutcome;
use crate::news::fanout::ItemFailure;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlookCategory {
    Positive,
    Neutral,
    Negative,
}

impl fmt::Display for OutlookCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBand {
    High,
    Medium,
    Low,
}

impl ConfidenceBand {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.7 {
            Self::High
        } else if confidence >= 0.4 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outlook {
    pub category: OutlookCategory,
    /// Combined score in [-1, 1].
    pub score: f64,
    /// In [0, 1].
    pub confidence: f64,
    pub confidence_band: ConfidenceBand,
    pub technical_score: Option<f64>,
    pub sentiment_score: Option<f64>,
    pub drivers: Vec<String>,
}

/// Terminal result of one analysis. `InsufficientData` is never folded into a Neutral outlook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verdict {
    Assessed(Outlook),
    InsufficientData { drivers: Vec<String> },
}

impl Verdict {
    pub fn outlook(&self) -> Option<&Outlook> {
        match self {
            Self::Assessed(outlook) => Some(outlook),
            Self::InsufficientData { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OutlookReport {
    pub ticker: String,
    pub company_name: String,
    /// Absent when the provider could not supply one.
    pub profile: Option<CompanyProfile>,
    pub as_of_date: NaiveDate,
    pub generated_at: DateTime<Utc>,
    pub indicators: IndicatorOutcome,
    pub sentiment: SentimentOutcome,
    pub articles: Vec<LabeledArticle>,
    pub raw_news_count: usize,
    pub relevant_news_count: usize,
    pub relevance_failures: Vec<ItemFailure>,
    pub sentiment_failures: Vec<ItemFailure>,
    pub verdict: Verdict,
}
