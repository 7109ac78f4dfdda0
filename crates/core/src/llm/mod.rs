pub mod anthropic;
pub mod error;
pub mod json;

use crate::domain::article::{Article, RelevanceVerdict, SentimentVerdict, Target};
use crate::error::ClassificationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Anthropic,
    Lexicon,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Anthropic => "anthropic",
            Provider::Lexicon => "lexicon",
        }
    }
}

/// Decides whether an article is about the target equity.
#[async_trait::async_trait]
pub trait RelevanceClassifier: Send + Sync {
    fn provider(&self) -> Provider;

    async fn classify_relevance(
        &self,
        article: &Article,
        target: &Target,
    ) -> Result<RelevanceVerdict, ClassificationError>;
}

/// Labels a relevant article positive, negative or neutral for the target equity.
#[async_trait::async_trait]
pub trait SentimentClassifier: Send + Sync {
    fn provider(&self) -> Provider;

    async fn classify_sentiment(
        &self,
        article: &Article,
        target: &Target,
    ) -> Result<SentimentVerdict, ClassificationError>;
}
