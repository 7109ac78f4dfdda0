use anyhow::ensure;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

/// Daily closes for one ticker, strictly increasing by date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceHistory {
    pub ticker: String,
    pub company_name: Option<String>,
    points: Vec<PricePoint>,
}

impl PriceHistory {
    pub fn try_new(
        ticker: impl Into<String>,
        company_name: Option<String>,
        points: Vec<PricePoint>,
    ) -> anyhow::Result<Self> {
        let ticker = ticker.into().trim().to_uppercase();
        ensure!(!ticker.is_empty(), "ticker must be non-empty");

        for point in &points {
            ensure!(
                point.close.is_finite() && point.close > 0.0,
                "close must be a positive finite number (date={}, close={})",
                point.date,
                point.close
            );
        }
        for pair in points.windows(2) {
            ensure!(
                pair[0].date < pair[1].date,
                "price points must be strictly chronological ({} is followed by {})",
                pair[0].date,
                pair[1].date
            );
        }

        let company_name = company_name
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(Self {
            ticker,
            company_name,
            points,
        })
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn closes(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.close).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn latest(&self) -> Option<&PricePoint> {
        self.points.last()
    }
}
