use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest article text handed to a classifier.
pub const MAX_CLASSIFY_CHARS: usize = 2000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub snippet: String,
    pub url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub source: Option<String>,
}

impl Article {
    /// Title and snippet joined into one block of text, truncated on a char boundary.
    pub fn classification_text(&self) -> String {
        let title = self.title.trim();
        let snippet = self.snippet.trim();
        let text = match (title.is_empty(), snippet.is_empty()) {
            (false, false) if title != snippet => format!("{title}. {snippet}"),
            (false, _) => title.to_string(),
            (true, _) => snippet.to_string(),
        };
        truncate_chars(&text, MAX_CLASSIFY_CHARS)
    }
}

pub(crate) fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// The equity a classifier judges articles against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub ticker: String,
    pub company_name: String,
}

impl Target {
    pub fn new(ticker: impl Into<String>, company_name: Option<String>) -> Self {
        let ticker = ticker.into();
        let company_name = company_name
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| ticker.clone());
        Self {
            ticker,
            company_name,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.company_name == self.ticker {
            write!(f, "{}", self.ticker)
        } else {
            write!(f, "{} ({})", self.company_name, self.ticker)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelevanceVerdict {
    pub relevant: bool,
    /// 1 (unrelated) ..= 5 (directly about the company), when the classifier grades.
    pub score: Option<u8>,
    pub justification: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    /// Case-insensitive parse of the three labels.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" => Some(Self::Positive),
            "negative" => Some(Self::Negative),
            "neutral" => Some(Self::Neutral),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentVerdict {
    pub label: SentimentLabel,
    pub strength: Option<f64>,
    pub justification: Option<String>,
}

/// A relevant article together with its sentiment verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledArticle {
    pub article: Article,
    pub relevance: RelevanceVerdict,
    pub sentiment: SentimentVerdict,
}
