use crate::config::{AnalysisOptions, Settings};
use crate::domain::article::Target;
use crate::domain::outlook::{OutlookReport, Verdict};
use crate::error::{DataUnavailable, OutlookError};
use crate::indicators;
use crate::ingest::news::{NewsApiProvider, NewsProvider};
use crate::ingest::prices::{HttpJsonPriceProvider, PriceHistoryProvider};
use crate::llm::anthropic::AnthropicClient;
use crate::llm::{RelevanceClassifier, SentimentClassifier};
use crate::news::aggregate;
use crate::news::lexicon::LexiconClassifier;
use crate::news::relevance::RelevanceFilter;
use crate::news::sentiment::SentimentStage;
use crate::synthesis::SynthesisEngine;
use crate::time::market::{self, HistoryRange};
use chrono::{NaiveDate, Utc};
use std::sync::Arc;

const MAX_TICKER_LEN: usize = 12;

#[derive(Debug, Clone, Default)]
pub struct AnalysisRequest {
    pub ticker: String,
    /// Used when the provider's company profile has no name.
    pub company_name: Option<String>,
    /// Defaults to the latest completed trading day.
    pub as_of_date: Option<NaiveDate>,
}

impl AnalysisRequest {
    pub fn new(ticker: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            ..Self::default()
        }
    }
}

/// Request-scoped pipeline: fetch, compute indicators, classify news, synthesize.
///
/// Price history is fetched concurrently with the profile-then-news chain, so
/// the news query can use the company name without waiting on prices.
pub struct OutlookService {
    prices: Arc<dyn PriceHistoryProvider>,
    news: Arc<dyn NewsProvider>,
    relevance: Arc<dyn RelevanceClassifier>,
    sentiment: Arc<dyn SentimentClassifier>,
    options: AnalysisOptions,
    engine: SynthesisEngine,
}

impl OutlookService {
    pub fn new(
        prices: Arc<dyn PriceHistoryProvider>,
        news: Arc<dyn NewsProvider>,
        relevance: Arc<dyn RelevanceClassifier>,
        sentiment: Arc<dyn SentimentClassifier>,
        options: AnalysisOptions,
    ) -> anyhow::Result<Self> {
        options.validate()?;
        let engine = SynthesisEngine::new(options.synthesis.clone());
        Ok(Self {
            prices,
            news,
            relevance,
            sentiment,
            options,
            engine,
        })
    }

    /// Wires the HTTP collaborators from `settings`. Classification uses the
    /// language model unless `offline` is set or no model key is configured.
    pub fn from_settings(
        settings: &Settings,
        options: AnalysisOptions,
        offline: bool,
    ) -> anyhow::Result<Self> {
        let prices = Arc::new(HttpJsonPriceProvider::from_settings(settings)?);
        let news = Arc::new(NewsApiProvider::from_settings(settings)?);

        let (relevance, sentiment): (Arc<dyn RelevanceClassifier>, Arc<dyn SentimentClassifier>) =
            if offline || settings.anthropic_api_key.is_none() {
                if !offline {
                    tracing::warn!("ANTHROPIC_API_KEY missing; using keyword classifiers");
                }
                let lexicon = Arc::new(LexiconClassifier::new(options.min_relevance_score));
                (lexicon.clone(), lexicon)
            } else {
                let client = Arc::new(AnthropicClient::from_settings(
                    settings,
                    options.min_relevance_score,
                )?);
                if options.fanout.per_item_timeout < client.retry_budget() {
                    tracing::warn!(
                        classify_timeout = ?options.fanout.per_item_timeout,
                        retry_budget = ?client.retry_budget(),
                        "classify timeout is shorter than a fully retried model call"
                    );
                }
                (client.clone(), client)
            };

        Self::new(prices, news, relevance, sentiment, options)
    }

    pub fn options(&self) -> &AnalysisOptions {
        &self.options
    }

    pub async fn synthesize(&self, ticker: &str) -> Result<OutlookReport, OutlookError> {
        self.analyze(AnalysisRequest::new(ticker)).await
    }

    pub async fn analyze(&self, request: AnalysisRequest) -> Result<OutlookReport, OutlookError> {
        let ticker = normalize_ticker(&request.ticker)?;
        let now = Utc::now();
        let as_of_date = match request.as_of_date {
            Some(date) => date,
            None => market::resolve_as_of_date(None, now).unwrap_or_else(|err| {
                tracing::warn!(error = %err, "as-of resolution failed; using UTC date");
                now.date_naive()
            }),
        };
        let range = HistoryRange::lookback(as_of_date, self.options.lookback_days);

        tracing::info!(
            %ticker,
            %as_of_date,
            prices = self.prices.provider_name(),
            news = self.news.provider_name(),
            "analysis started"
        );

        let profile_then_news = async {
            let profile = match self.prices.fetch_profile(&ticker).await {
                Ok(profile) => Some(profile),
                Err(err) => {
                    tracing::warn!(%ticker, error = %err, "company profile unavailable; continuing without it");
                    None
                }
            };
            let name = profile
                .as_ref()
                .and_then(|p| p.name.clone())
                .or_else(|| request.company_name.clone());
            let query_target = Target::new(ticker.clone(), name);
            let articles = self
                .news
                .fetch_news(&query_target, self.options.news_recency_days)
                .await?;
            Ok::<_, DataUnavailable>((profile, query_target, articles))
        };

        let (history, (profile, query_target, articles)) = tokio::try_join!(
            self.prices.fetch_history(&ticker, range),
            profile_then_news,
        )?;

        let target = if query_target.company_name == ticker {
            Target::new(ticker.clone(), history.company_name.clone())
        } else {
            query_target
        };

        let indicator_outcome = indicators::compute(&history, &self.options.indicators);

        let raw_news_count = articles.len();
        let relevance = RelevanceFilter::new(
            Arc::clone(&self.relevance),
            self.options.fanout,
            self.options.max_relevant_articles,
        )
        .filter(&target, articles)
        .await;
        let relevant_news_count = relevance.relevant.len();

        let sentiment = SentimentStage::new(Arc::clone(&self.sentiment), self.options.fanout)
            .classify(&target, relevance.relevant)
            .await;

        let labels: Vec<_> = sentiment.labeled.iter().map(|l| l.sentiment.label).collect();
        let sentiment_outcome = aggregate::aggregate(&labels, &self.options.sentiment_thresholds);

        let verdict = match self.engine.synthesize(&indicator_outcome, &sentiment_outcome) {
            Ok(outlook) => {
                tracing::info!(
                    %ticker,
                    category = %outlook.category,
                    score = outlook.score,
                    confidence = outlook.confidence,
                    "outlook ready"
                );
                Verdict::Assessed(outlook)
            }
            Err(err) => {
                tracing::warn!(%ticker, error = %err, "no outlook");
                Verdict::InsufficientData {
                    drivers: err.drivers,
                }
            }
        };

        Ok(OutlookReport {
            ticker,
            company_name: target.company_name,
            profile,
            as_of_date,
            generated_at: Utc::now(),
            indicators: indicator_outcome,
            sentiment: sentiment_outcome,
            articles: sentiment.labeled,
            raw_news_count,
            relevant_news_count,
            relevance_failures: relevance.failures,
            sentiment_failures: sentiment.failures,
            verdict,
        })
    }
}

/// Trims and uppercases; accepts symbols like `BRK.B`, `RDS-A` and `^GSPC`.
pub fn normalize_ticker(raw: &str) -> Result<String, OutlookError> {
    let ticker = raw.trim().to_ascii_uppercase();
    let valid = !ticker.is_empty()
        && ticker.len() <= MAX_TICKER_LEN
        && ticker
            .trim_start_matches('^')
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphanumeric())
        && ticker
            .chars()
            .enumerate()
            .all(|(i, c)| c.is_ascii_alphanumeric() || c == '.' || c == '-' || (i == 0 && c == '^'));
    if valid {
        Ok(ticker)
    } else {
        Err(OutlookError::InvalidTicker(raw.to_string()))
    }
}
