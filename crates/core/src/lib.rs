pub mod domain;
pub mod error;
pub mod indicators;
pub mod ingest;
pub mod llm;
pub mod news;
pub mod service;
pub mod synthesis;
pub mod time;

pub mod config {
    use crate::indicators::IndicatorConfig;
    use crate::news::aggregate::SentimentThresholds;
    use crate::news::fanout::FanoutPolicy;
    use crate::synthesis::SynthesisConfig;
    use anyhow::{ensure, Context};
    use std::str::FromStr;
    use std::time::Duration;

    #[derive(Debug, Clone, Default)]
    pub struct Settings {
        pub anthropic_api_key: Option<String>,
        pub news_api_key: Option<String>,
        pub news_api_base_url: Option<String>,
        pub price_provider_base_url: Option<String>,
        pub price_provider_api_key: Option<String>,
        pub sentry_dsn: Option<String>,
        pub port: Option<u16>,
        pub cors_allowed_origins: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let port = match non_empty_var("PORT") {
                Some(s) => Some(
                    s.parse::<u16>()
                        .with_context(|| format!("PORT must be a port number (got {s:?})"))?,
                ),
                None => None,
            };

            Ok(Self {
                anthropic_api_key: non_empty_var("ANTHROPIC_API_KEY"),
                news_api_key: non_empty_var("NEWS_API_KEY"),
                news_api_base_url: non_empty_var("NEWS_API_BASE_URL"),
                price_provider_base_url: non_empty_var("PRICE_PROVIDER_BASE_URL"),
                price_provider_api_key: non_empty_var("PRICE_PROVIDER_API_KEY"),
                sentry_dsn: non_empty_var("SENTRY_DSN"),
                port,
                cors_allowed_origins: non_empty_var("CORS_ALLOWED_ORIGINS"),
            })
        }

        pub fn require_anthropic_api_key(&self) -> anyhow::Result<&str> {
            self.anthropic_api_key
                .as_deref()
                .context("ANTHROPIC_API_KEY is required")
        }

        pub fn require_news_api_key(&self) -> anyhow::Result<&str> {
            self.news_api_key
                .as_deref()
                .context("NEWS_API_KEY is required")
        }

        pub fn require_price_provider_base_url(&self) -> anyhow::Result<&str> {
            self.price_provider_base_url
                .as_deref()
                .context("PRICE_PROVIDER_BASE_URL is required")
        }
    }

    fn non_empty_var(key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|s| !s.trim().is_empty())
    }

    /// Tunables for one analysis. Unparseable values fall back to the default;
    /// `validate` rejects combinations that cannot work.
    #[derive(Debug, Clone, PartialEq)]
    pub struct AnalysisOptions {
        pub indicators: IndicatorConfig,
        pub fanout: FanoutPolicy,
        pub sentiment_thresholds: SentimentThresholds,
        pub synthesis: SynthesisConfig,
        /// Calendar days of price history requested.
        pub lookback_days: u32,
        pub news_recency_days: u32,
        /// 1..=5; language-model relevance scores below this are not relevant.
        pub min_relevance_score: u8,
        pub max_relevant_articles: usize,
    }

    impl Default for AnalysisOptions {
        fn default() -> Self {
            Self {
                indicators: IndicatorConfig::default(),
                fanout: FanoutPolicy::default(),
                sentiment_thresholds: SentimentThresholds::default(),
                synthesis: SynthesisConfig::default(),
                lookback_days: 365,
                news_recency_days: 7,
                min_relevance_score: 4,
                max_relevant_articles: 10,
            }
        }
    }

    impl AnalysisOptions {
        pub fn from_env() -> Self {
            Self::from_lookup(|key| std::env::var(key).ok())
        }

        pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
            let mut out = Self::default();
            let get = |key: &str| lookup(key).filter(|s| !s.trim().is_empty());

            if let Some(windows) = get("OUTLOOK_SMA_WINDOWS").and_then(|s| parse_list(&s)) {
                out.indicators.sma_windows = windows;
            }
            if let Some(p) = get("OUTLOOK_RSI_PERIOD").and_then(|s| parse_one(&s)) {
                out.indicators.rsi_period = p;
            }
            if let Some([fast, slow, signal]) = get("OUTLOOK_MACD")
                .and_then(|s| parse_list::<usize>(&s))
                .and_then(|v| <[usize; 3]>::try_from(v).ok())
            {
                out.indicators.macd_fast = fast;
                out.indicators.macd_slow = slow;
                out.indicators.macd_signal = signal;
            }
            if let Some(days) = get("OUTLOOK_LOOKBACK_DAYS").and_then(|s| parse_one(&s)) {
                out.lookback_days = days;
            }
            if let Some(days) = get("OUTLOOK_NEWS_RECENCY_DAYS").and_then(|s| parse_one(&s)) {
                out.news_recency_days = days;
            }
            if let Some(score) = get("OUTLOOK_MIN_RELEVANCE_SCORE").and_then(|s| parse_one(&s)) {
                out.min_relevance_score = score;
            }
            if let Some(n) = get("OUTLOOK_MAX_RELEVANT_ARTICLES").and_then(|s| parse_one(&s)) {
                out.max_relevant_articles = n;
            }
            if let Some(n) = get("OUTLOOK_CLASSIFY_CONCURRENCY").and_then(|s| parse_one(&s)) {
                out.fanout.concurrency = n;
            }
            if let Some(secs) = get("OUTLOOK_CLASSIFY_TIMEOUT_SECS").and_then(|s| parse_one(&s)) {
                out.fanout.per_item_timeout = Duration::from_secs(secs);
            }
            if let Some(t) = get("OUTLOOK_SENTIMENT_THRESHOLD").and_then(|s| parse_one::<f64>(&s)) {
                out.sentiment_thresholds = SentimentThresholds::symmetric(t);
                out.synthesis.category_threshold = t;
            }
            if let Some(w) = get("OUTLOOK_TECHNICAL_WEIGHT").and_then(|s| parse_one(&s)) {
                out.synthesis.technical_weight = w;
            }
            if let Some(w) = get("OUTLOOK_SENTIMENT_WEIGHT").and_then(|s| parse_one(&s)) {
                out.synthesis.sentiment_weight = w;
            }
            out
        }

        pub fn validate(&self) -> anyhow::Result<()> {
            self.indicators.validate()?;
            self.sentiment_thresholds.validate()?;
            self.synthesis.validate()?;
            ensure!(
                (1..=5).contains(&self.min_relevance_score),
                "min relevance score must be in 1..=5 (got {})",
                self.min_relevance_score
            );
            ensure!(
                self.max_relevant_articles > 0,
                "max relevant articles must be positive"
            );
            ensure!(self.fanout.concurrency > 0, "classify concurrency must be positive");
            ensure!(
                !self.fanout.per_item_timeout.is_zero(),
                "classify timeout must be positive"
            );
            ensure!(self.news_recency_days > 0, "news recency must be positive");
            let required = self.indicators.required_history();
            ensure!(
                self.lookback_days as usize >= required,
                "lookback of {} days cannot hold {required} closes",
                self.lookback_days
            );
            Ok(())
        }
    }

    fn parse_one<T: FromStr>(s: &str) -> Option<T> {
        match s.trim().parse() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(value = s, "ignoring unparseable option; using default");
                None
            }
        }
    }

    fn parse_list<T: FromStr>(s: &str) -> Option<Vec<T>> {
        s.split(',')
            .map(|part| part.trim().parse().ok())
            .collect::<Option<Vec<T>>>()
            .filter(|v| !v.is_empty())
    }

}
