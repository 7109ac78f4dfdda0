use std::time::Duration;
use thiserror::Error;

/// An upstream price or news source could not supply data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("data unavailable from {provider}: {detail}")]
pub struct DataUnavailable {
    pub provider: &'static str,
    pub detail: String,
}

impl DataUnavailable {
    pub fn new(provider: &'static str, detail: impl Into<String>) -> Self {
        Self {
            provider,
            detail: detail.into(),
        }
    }

    /// Keeps the whole context chain of a plumbing error.
    pub fn from_anyhow(provider: &'static str, err: &anyhow::Error) -> Self {
        Self::new(provider, format!("{err:#}"))
    }
}

/// A single article could not be classified. Absorbed by the stage that owns the article.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassificationError {
    #[error("classification timed out after {0:?}")]
    TimedOut(Duration),

    #[error("classifier request failed: {0}")]
    Request(String),

    #[error("classifier returned an unusable response: {0}")]
    InvalidResponse(String),

    #[error("classification task aborted: {0}")]
    Aborted(String),
}

/// Neither technical nor sentiment signal was available.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("insufficient data for an outlook: {}", .drivers.join("; "))]
pub struct InsufficientDataError {
    pub drivers: Vec<String>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OutlookError {
    #[error("invalid ticker: {0:?}")]
    InvalidTicker(String),

    #[error(transparent)]
    DataUnavailable(#[from] DataUnavailable),
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn data_unavailable_keeps_context_chain() {
        let err = Err::<(), _>(anyhow::anyhow!("connection refused"))
            .context("price request failed")
            .unwrap_err();
        let unavailable = DataUnavailable::from_anyhow("prices", &err);
        assert_eq!(
            unavailable.to_string(),
            "data unavailable from prices: price request failed: connection refused"
        );
    }

    #[test]
    fn insufficient_data_lists_drivers() {
        let err = InsufficientDataError {
            drivers: vec!["a".into(), "b".into()],
        };
        assert_eq!(err.to_string(), "insufficient data for an outlook: a; b");
    }
}
