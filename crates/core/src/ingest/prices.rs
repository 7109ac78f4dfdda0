use crate::config::Settings;
use crate::domain::price::{PriceHistory, PricePoint};
use crate::domain::profile::CompanyProfile;
use crate::error::DataUnavailable;
use crate::ingest::types::{CompanyProfileResponse, PriceHistoryResponse};
use crate::time::backoff_delay;
use crate::time::market::HistoryRange;
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

const PROVIDER_NAME: &str = "price_http_json";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PATH: &str = "/v1/price_history";
const DEFAULT_PROFILE_PATH: &str = "/v1/profile";
const DEFAULT_RETRIES: u32 = 3;
const MAX_RETRIES: u32 = 6;

#[async_trait::async_trait]
pub trait PriceHistoryProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// Daily closes for `ticker` within `range`, oldest first.
    /// An empty series is reported as `DataUnavailable`.
    async fn fetch_history(
        &self,
        ticker: &str,
        range: HistoryRange,
    ) -> Result<PriceHistory, DataUnavailable>;

    /// Name and fundamentals for `ticker`.
    async fn fetch_profile(&self, ticker: &str) -> Result<CompanyProfile, DataUnavailable>;
}

#[derive(Debug, Clone)]
pub struct HttpJsonPriceProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    path: String,
    profile_path: String,
    retries: u32,
    backoff_base: Duration,
}

impl HttpJsonPriceProvider {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings.require_price_provider_base_url()?.to_string();
        let api_key = settings.price_provider_api_key.clone();

        let timeout_secs = std::env::var("PRICE_PROVIDER_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let retries = std::env::var("PRICE_PROVIDER_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_RETRIES)
            .clamp(1, MAX_RETRIES);

        let path = std::env::var("PRICE_PROVIDER_HISTORY_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PATH.to_string());

        let profile_path = std::env::var("PRICE_PROVIDER_PROFILE_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PROFILE_PATH.to_string());

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build price provider http client")?;

        Ok(Self {
            http,
            base_url,
            api_key,
            path,
            profile_path,
            retries,
            backoff_base: Duration::from_secs(1),
        })
    }

    fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("{}/{path}", self.base_url.trim_end_matches('/'))
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &self.api_key {
            headers.insert("x-api-key", HeaderValue::from_str(api_key)?);
        }
        Ok(headers)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let res = self
            .http
            .get(self.url(path))
            .headers(self.headers()?)
            .query(query)
            .send()
            .await
            .context("price provider request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read price provider response")?;
        let raw_json = serde_json::from_str::<Value>(&text)
            .with_context(|| format!("price provider response is not valid JSON: {text}"))?;

        if !status.is_success() {
            anyhow::bail!("price provider HTTP {status}: {raw_json}");
        }

        serde_json::from_value::<T>(raw_json).with_context(|| {
            format!(
                "failed to parse price provider response into {}",
                std::any::type_name::<T>()
            )
        })
    }

    async fn get_with_retry<T: DeserializeOwned>(
        &self,
        ticker: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.get_json(path, query).await {
                Ok(resp) => return Ok(resp),
                Err(err) => {
                    if attempt >= self.retries {
                        return Err(err);
                    }
                    let backoff = backoff_delay(self.backoff_base, attempt);
                    tracing::warn!(
                        ticker,
                        attempt,
                        ?backoff,
                        error = %err,
                        path,
                        "price provider request failed; retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl PriceHistoryProvider for HttpJsonPriceProvider {
    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn fetch_history(
        &self,
        ticker: &str,
        range: HistoryRange,
    ) -> Result<PriceHistory, DataUnavailable> {
        let query = [
            ("ticker", ticker.to_string()),
            ("from", range.start.to_string()),
            ("to", range.end.to_string()),
        ];
        let history = self
            .get_with_retry::<PriceHistoryResponse>(ticker, &self.path, &query)
            .await
            .and_then(|resp| into_history(resp, ticker, range))
            .map_err(|err| DataUnavailable::from_anyhow(PROVIDER_NAME, &err))?;

        tracing::info!(
            ticker,
            points = history.len(),
            start = %range.start,
            end = %range.end,
            "fetched price history"
        );
        Ok(history)
    }

    async fn fetch_profile(&self, ticker: &str) -> Result<CompanyProfile, DataUnavailable> {
        let query = [("ticker", ticker.to_string())];
        let profile = self
            .get_with_retry::<CompanyProfileResponse>(ticker, &self.profile_path, &query)
            .await
            .and_then(|resp| into_profile(resp, ticker))
            .map_err(|err| DataUnavailable::from_anyhow(PROVIDER_NAME, &err))?;

        tracing::info!(ticker, name = ?profile.name, "fetched company profile");
        Ok(profile)
    }
}

fn into_profile(resp: CompanyProfileResponse, requested: &str) -> Result<CompanyProfile> {
    anyhow::ensure!(
        resp.ticker.trim().eq_ignore_ascii_case(requested),
        "price provider ticker mismatch: requested {requested}, got {}",
        resp.ticker
    );
    Ok(CompanyProfile {
        ticker: requested.to_string(),
        name: resp.name,
        sector: resp.sector,
        industry: resp.industry,
        country: resp.country,
        market_cap: resp.market_cap,
        trailing_pe: resp.trailing_pe,
        forward_pe: resp.forward_pe,
        dividend_yield: resp.dividend_yield,
        fifty_two_week_high: resp.fifty_two_week_high,
        fifty_two_week_low: resp.fifty_two_week_low,
    }
    .normalized())
}

/// Validates a provider response into a chronological series. Points outside
/// the requested range are dropped; an empty result is an error.
fn into_history(
    resp: PriceHistoryResponse,
    requested: &str,
    range: HistoryRange,
) -> Result<PriceHistory> {
    anyhow::ensure!(
        resp.ticker.trim().eq_ignore_ascii_case(requested),
        "price provider ticker mismatch: requested {requested}, got {}",
        resp.ticker
    );

    let mut points: Vec<PricePoint> = resp
        .points
        .into_iter()
        .filter(|p| range.contains(p.date))
        .map(|p| PricePoint {
            date: p.date,
            close: p.close,
        })
        .collect();
    anyhow::ensure!(
        !points.is_empty(),
        "price provider returned no closes for {requested} between {} and {}",
        range.start,
        range.end
    );
    points.sort_by_key(|p| p.date);

    PriceHistory::try_new(requested, resp.name, points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn range() -> HistoryRange {
        HistoryRange {
            start: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
        }
    }

    fn parse(v: Value) -> PriceHistoryResponse {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn parses_and_sorts_points() {
        let resp = parse(json!({
            "ticker": "aapl",
            "name": "Apple Inc.",
            "points": [
                {"date": "2026-01-06", "close": 101.5},
                {"date": "2026-01-05", "close": 100.0},
                {"date": "2025-12-31", "close": 99.0}
            ]
        }));

        let history = into_history(resp, "AAPL", range()).unwrap();
        assert_eq!(history.ticker, "AAPL");
        assert_eq!(history.company_name.as_deref(), Some("Apple Inc."));
        assert_eq!(history.closes(), vec![100.0, 101.5]);
    }

    #[test]
    fn empty_series_is_rejected() {
        let resp = parse(json!({"ticker": "AAPL", "points": []}));
        let err = into_history(resp, "AAPL", range()).unwrap_err();
        assert!(err.to_string().contains("no closes"));
    }

    #[test]
    fn rejects_ticker_mismatch_and_bad_closes() {
        let resp = parse(json!({
            "ticker": "MSFT",
            "points": [{"date": "2026-01-05", "close": 1.0}]
        }));
        assert!(into_history(resp, "AAPL", range()).is_err());

        let resp = parse(json!({
            "ticker": "AAPL",
            "points": [{"date": "2026-01-05", "close": -3.0}]
        }));
        assert!(into_history(resp, "AAPL", range()).is_err());
    }

    #[test]
    fn rejects_non_numeric_close_via_deserialize() {
        let v = json!({
            "ticker": "AAPL",
            "points": [{"date": "2026-01-05", "close": "100.0"}]
        });
        assert!(serde_json::from_value::<PriceHistoryResponse>(v).is_err());
    }

    #[test]
    fn url_joins_base_and_path() {
        let provider = HttpJsonPriceProvider {
            http: reqwest::Client::new(),
            base_url: "https://prices.example.com/".into(),
            api_key: None,
            path: "v1/price_history".into(),
            profile_path: DEFAULT_PROFILE_PATH.into(),
            retries: 1,
            backoff_base: Duration::from_millis(1),
        };
        assert_eq!(
            provider.url(&provider.path),
            "https://prices.example.com/v1/price_history"
        );
        assert_eq!(
            provider.url(&provider.profile_path),
            "https://prices.example.com/v1/profile"
        );
        assert!(provider.headers().unwrap().is_empty());
    }

    #[test]
    fn parses_profile_and_checks_ticker() {
        let resp: CompanyProfileResponse = serde_json::from_value(json!({
            "ticker": "aapl",
            "name": "Apple Inc.",
            "sector": "Technology",
            "industry": "Consumer Electronics",
            "market_cap": 3.1e12,
            "trailing_pe": 31.5,
            "fifty_two_week_high": 260.1,
            "fifty_two_week_low": 164.08
        }))
        .unwrap();
        let profile = into_profile(resp, "AAPL").unwrap();
        assert_eq!(profile.ticker, "AAPL");
        assert_eq!(profile.name.as_deref(), Some("Apple Inc."));
        assert_eq!(profile.forward_pe, None);
        assert_eq!(profile.fifty_two_week_low, Some(164.08));

        let resp: CompanyProfileResponse =
            serde_json::from_value(json!({"ticker": "MSFT"})).unwrap();
        assert!(into_profile(resp, "AAPL").is_err());
    }
}
