use crate::domain::article::{RelevanceVerdict, SentimentLabel, SentimentVerdict};
use anyhow::{bail, ensure};
use serde::{Deserialize, Serialize};

/// Relevance judgement as emitted by the language model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRelevanceVerdict {
    pub relevance_score: i64,
    #[serde(default)]
    pub relevance_justification: Option<String>,
}

/// Sentiment judgement as emitted by the language model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSentimentVerdict {
    pub sentiment: String,
    #[serde(default)]
    pub strength: Option<f64>,
    #[serde(default)]
    pub justification: Option<String>,
}

impl LlmRelevanceVerdict {
    pub fn validate_and_into_verdict(
        self,
        min_relevance_score: u8,
    ) -> anyhow::Result<RelevanceVerdict> {
        ensure!(
            (1..=5).contains(&self.relevance_score),
            "relevance_score must be between 1 and 5 (got {})",
            self.relevance_score
        );
        let score = u8::try_from(self.relevance_score)?;

        Ok(RelevanceVerdict {
            relevant: score >= min_relevance_score,
            score: Some(score),
            justification: clean(self.relevance_justification),
        })
    }
}

impl LlmSentimentVerdict {
    pub fn validate_and_into_verdict(self) -> anyhow::Result<SentimentVerdict> {
        let Some(label) = SentimentLabel::parse(&self.sentiment) else {
            bail!("unknown sentiment label: {:?}", self.sentiment);
        };

        if let Some(strength) = self.strength {
            ensure!(
                (0.0..=1.0).contains(&strength),
                "strength must be between 0 and 1 (got {strength})"
            );
        }

        Ok(SentimentVerdict {
            label,
            strength: self.strength,
            justification: clean(self.justification),
        })
    }
}

fn clean(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}
