use crate::config::Settings;
use crate::domain::article::{Article, Target};
use crate::error::DataUnavailable;
use crate::ingest::types::{NewsApiArticle, NewsApiResponse};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;

const PROVIDER_NAME: &str = "newsapi";
const DEFAULT_BASE_URL: &str = "https://newsapi.org";
const EVERYTHING_PATH: &str = "/v2/everything";
const DEFAULT_PAGE_SIZE: u32 = 10;
const MAX_PAGE_SIZE: u32 = 100;
const DEFAULT_TIMEOUT_SECS: u64 = 15;

const MARKET_TERMS: &str =
    r#"(stock OR shares OR earnings OR "price target" OR analyst OR market OR investors)"#;

#[async_trait::async_trait]
pub trait NewsProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// Recent articles about `target`. Zero articles is a valid result.
    async fn fetch_news(
        &self,
        target: &Target,
        recency_days: u32,
    ) -> Result<Vec<Article>, DataUnavailable>;
}

#[derive(Debug, Clone)]
pub struct NewsApiProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    page_size: u32,
}

impl NewsApiProvider {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let api_key = settings.require_news_api_key()?.to_string();
        let base_url = settings
            .news_api_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let page_size = std::env::var("NEWS_PAGE_SIZE")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);

        let timeout_secs = std::env::var("NEWS_API_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build news http client")?;

        Ok(Self {
            http,
            base_url,
            api_key,
            page_size,
        })
    }

    async fn fetch_once(&self, target: &Target, from: DateTime<Utc>) -> Result<Vec<Article>> {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), EVERYTHING_PATH);
        let res = self
            .http
            .get(url)
            .header("X-Api-Key", &self.api_key)
            .query(&[
                ("q", search_query(target)),
                ("from", from.format("%Y-%m-%dT%H:%M:%S").to_string()),
                ("language", "en".to_string()),
                ("sortBy", "relevancy".to_string()),
                ("pageSize", self.page_size.to_string()),
            ])
            .send()
            .await
            .context("news request failed")?;

        let status = res.status();
        let text = res.text().await.context("failed to read news response")?;
        let parsed = serde_json::from_str::<NewsApiResponse>(&text)
            .with_context(|| format!("news response is not valid JSON (HTTP {status}): {text}"))?;

        if !status.is_success() || parsed.status != "ok" {
            anyhow::bail!(
                "news API HTTP {status}: {} {}",
                parsed.code.as_deref().unwrap_or("unknown"),
                parsed.message.as_deref().unwrap_or_default()
            );
        }

        Ok(into_articles(parsed))
    }
}

#[async_trait::async_trait]
impl NewsProvider for NewsApiProvider {
    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn fetch_news(
        &self,
        target: &Target,
        recency_days: u32,
    ) -> Result<Vec<Article>, DataUnavailable> {
        let from = Utc::now() - ChronoDuration::days(i64::from(recency_days));
        let articles = self
            .fetch_once(target, from)
            .await
            .map_err(|err| DataUnavailable::from_anyhow(PROVIDER_NAME, &err))?;

        tracing::info!(
            ticker = %target.ticker,
            articles = articles.len(),
            recency_days,
            "fetched news"
        );
        Ok(articles)
    }
}

/// `("<name>" OR "<ticker>") AND (<market terms>)`.
pub fn search_query(target: &Target) -> String {
    let name = target.company_name.replace('"', "");
    let subject = if name.eq_ignore_ascii_case(&target.ticker) {
        format!("\"{}\"", target.ticker)
    } else {
        format!("(\"{name}\" OR \"{}\")", target.ticker)
    };
    format!("{subject} AND {MARKET_TERMS}")
}

fn non_blank(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Drops articles with neither title nor text. The snippet falls back from
/// description to content to title.
fn into_articles(resp: NewsApiResponse) -> Vec<Article> {
    resp.articles
        .into_iter()
        .filter_map(|raw: NewsApiArticle| {
            let title = non_blank(raw.title);
            let snippet = non_blank(raw.description)
                .or_else(|| non_blank(raw.content))
                .or_else(|| title.clone())?;
            Some(Article {
                title: title.unwrap_or_default(),
                snippet,
                url: non_blank(raw.url),
                published_at: raw.published_at,
                source: raw.source.and_then(|s| non_blank(s.name)),
            })
        })
        .collect()
}
