//! Keyword classifiers that need no network access.
//!
//! Used by the CLI in `--offline` mode and when no model key is configured.

use crate::domain::article::{
    Article, RelevanceVerdict, SentimentLabel, SentimentVerdict, Target,
};
use crate::error::ClassificationError;
use crate::llm::{Provider, RelevanceClassifier, SentimentClassifier};

const POSITIVE_WORDS: &[&str] = &[
    "bullish", "rally", "surge", "surged", "gain", "gains", "profit", "growth", "beat", "beats",
    "upgrade", "upgraded", "outperform", "strong", "positive", "rise", "rises", "increase",
    "breakthrough", "record", "exceed", "exceeds", "momentum", "optimistic", "rebound",
    "recovery", "expansion", "robust", "accelerating", "overweight", "raised", "buyback",
    "dividend", "upside", "tailwind",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bearish", "decline", "declines", "loss", "losses", "fall", "falls", "plunge", "plunged",
    "crash", "miss", "misses", "downgrade", "downgraded", "underperform", "weak", "negative",
    "drop", "drops", "decrease", "concern", "concerns", "fail", "disappoint", "disappointing",
    "slump", "warning", "pessimistic", "lawsuit", "litigation", "recall", "investigation",
    "probe", "bankruptcy", "layoff", "layoffs", "downside", "headwind", "lowered", "cut",
];

const NEGATION_WORDS: &[&str] = &[
    "not", "no", "never", "don't", "doesn't", "didn't", "isn't", "aren't", "wasn't", "won't",
    "hardly", "barely", "without",
];

const NEGATION_WINDOW: usize = 3;

const CORPORATE_SUFFIXES: &[&str] = &[
    "inc", "inc.", "corp", "corp.", "corporation", "co", "co.", "company", "ltd", "ltd.",
    "plc", "llc", "holdings", "group", "sa", "ag", "nv",
];

#[derive(Debug, Clone)]
pub struct LexiconClassifier {
    min_relevance_score: u8,
}

impl LexiconClassifier {
    pub fn new(min_relevance_score: u8) -> Self {
        Self {
            min_relevance_score,
        }
    }

    fn relevance_score(article: &Article, target: &Target) -> u8 {
        let needles = needles(target);
        let title = tokens(&article.title);
        let snippet = tokens(&article.snippet);

        if needles.iter().any(|n| contains_phrase(&title, n)) {
            5
        } else if needles.iter().any(|n| contains_phrase(&snippet, n)) {
            4
        } else {
            1
        }
    }
}

impl Default for LexiconClassifier {
    fn default() -> Self {
        Self::new(4)
    }
}

/// Lowercased ticker plus the company name without its corporate suffix.
fn needles(target: &Target) -> Vec<Vec<String>> {
    let mut out = vec![vec![target.ticker.to_lowercase()]];
    let name: Vec<String> = tokens(&target.company_name)
        .into_iter()
        .filter(|t| !CORPORATE_SUFFIXES.contains(&t.as_str()))
        .collect();
    if !name.is_empty() && name != out[0] {
        out.push(name);
    }
    out
}

fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '.'))
        .map(|t| t.trim_matches('.').to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

fn contains_phrase(haystack: &[String], phrase: &[String]) -> bool {
    !phrase.is_empty() && haystack.windows(phrase.len()).any(|w| w == phrase)
}

/// Net positive minus negative hits, with a preceding negation flipping a hit.
fn score_text(text: &str) -> (i32, i32) {
    let words = tokens(text);
    let mut positive = 0;
    let mut negative = 0;
    for (i, word) in words.iter().enumerate() {
        let polarity = if POSITIVE_WORDS.contains(&word.as_str()) {
            1
        } else if NEGATIVE_WORDS.contains(&word.as_str()) {
            -1
        } else {
            continue;
        };
        let negated = words[i.saturating_sub(NEGATION_WINDOW)..i]
            .iter()
            .any(|w| NEGATION_WORDS.contains(&w.as_str()));
        if (polarity > 0) != negated {
            positive += 1;
        } else {
            negative += 1;
        }
    }
    (positive, negative)
}

#[async_trait::async_trait]
impl RelevanceClassifier for LexiconClassifier {
    fn provider(&self) -> Provider {
        Provider::Lexicon
    }

    async fn classify_relevance(
        &self,
        article: &Article,
        target: &Target,
    ) -> Result<RelevanceVerdict, ClassificationError> {
        let score = Self::relevance_score(article, target);
        Ok(RelevanceVerdict {
            relevant: score >= self.min_relevance_score,
            score: Some(score),
            justification: None,
        })
    }
}

#[async_trait::async_trait]
impl SentimentClassifier for LexiconClassifier {
    fn provider(&self) -> Provider {
        Provider::Lexicon
    }

    async fn classify_sentiment(
        &self,
        article: &Article,
        _target: &Target,
    ) -> Result<SentimentVerdict, ClassificationError> {
        let (positive, negative) = score_text(&article.classification_text());
        let hits = positive + negative;
        let label = match positive.cmp(&negative) {
            std::cmp::Ordering::Greater => SentimentLabel::Positive,
            std::cmp::Ordering::Less => SentimentLabel::Negative,
            std::cmp::Ordering::Equal => SentimentLabel::Neutral,
        };
        let strength = (hits > 0).then(|| f64::from((positive - negative).abs()) / f64::from(hits));

        Ok(SentimentVerdict {
            label,
            strength,
            justification: Some(format!(
                "{positive} positive and {negative} negative keyword hits"
            )),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(title: &str, snippet: &str) -> Article {
        Article {
            title: title.into(),
            snippet: snippet.into(),
            url: None,
            published_at: None,
            source: None,
        }
    }

    fn target() -> Target {
        Target::new("TSLA", Some("Tesla, Inc.".into()))
    }

    #[tokio::test]
    async fn relevance_by_ticker_or_name() {
        let c = LexiconClassifier::default();

        let v = c
            .classify_relevance(&article("TSLA shares rally", ""), &target())
            .await
            .unwrap();
        assert!(v.relevant);
        assert_eq!(v.score, Some(5));

        let v = c
            .classify_relevance(&article("EV makers slump", "Tesla deliveries fell"), &target())
            .await
            .unwrap();
        assert!(v.relevant);
        assert_eq!(v.score, Some(4));

        let v = c
            .classify_relevance(&article("Widget market grows", "ABC Widgets"), &target())
            .await
            .unwrap();
        assert!(!v.relevant);
    }

    #[tokio::test]
    async fn sentiment_counts_keywords() {
        let c = LexiconClassifier::default();
        let v = c
            .classify_sentiment(&article("Tesla beats estimates", "record profit"), &target())
            .await
            .unwrap();
        assert_eq!(v.label, SentimentLabel::Positive);
        assert_eq!(v.strength, Some(1.0));

        let v = c
            .classify_sentiment(&article("Tesla faces probe", "analysts see downside"), &target())
            .await
            .unwrap();
        assert_eq!(v.label, SentimentLabel::Negative);
    }

    #[tokio::test]
    async fn negation_flips_polarity() {
        let c = LexiconClassifier::default();
        let v = c
            .classify_sentiment(&article("Results did not beat forecasts", ""), &target())
            .await
            .unwrap();
        assert_eq!(v.label, SentimentLabel::Negative);
    }

    #[tokio::test]
    async fn no_keywords_is_neutral() {
        let c = LexiconClassifier::default();
        let v = c
            .classify_sentiment(&article("Tesla holds annual meeting", ""), &target())
            .await
            .unwrap();
        assert_eq!(v.label, SentimentLabel::Neutral);
        assert_eq!(v.strength, None);
    }

    #[test]
    fn company_suffix_is_stripped() {
        let n = needles(&target());
        assert_eq!(n, vec![vec!["tsla".to_string()], vec!["tesla".to_string()]]);
    }
}
