//! Signal Synthesis Engine.
//!
//! Reduces an [`IndicatorOutcome`] and a [`SentimentOutcome`] to one [`Outlook`].
//! Either input may be missing; missing inputs never count as neutral data.
//!
//! Technical sub-score: the signed sum of the SMA trend, RSI zone and MACD
//! contributions (see [`TechnicalWeights`]) divided by the largest attainable
//! magnitude, so it lies in [-1, 1].
//!
//! Final score: weighted mean of the available sub-scores, with the weights
//! renormalized over what is present.
//!
//! Confidence: `0.2 + 0.4*A + 0.2*D + 0.2*M`, clamped to [0, 1], where `A` is
//! agreement between the sub-scores (0 when only one is present), `D` saturates
//! with the number of labeled articles and `M` is the magnitude of the final score.

use crate::domain::outlook::{ConfidenceBand, Outlook, OutlookCategory};
use crate::error::InsufficientDataError;
use crate::indicators::{IndicatorBundle, IndicatorOutcome, MacdCross};
use crate::news::aggregate::{SentimentBundle, SentimentOutcome};
use anyhow::ensure;
use serde::{Deserialize, Serialize};

const CONFIDENCE_BASE: f64 = 0.2;
const CONFIDENCE_AGREEMENT: f64 = 0.4;
const CONFIDENCE_DEPTH: f64 = 0.2;
const CONFIDENCE_MAGNITUDE: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TechnicalWeights {
    /// Shortest SMA above or below the longest.
    pub sma_trend: f64,
    /// RSI in the oversold or overbought zone.
    pub rsi_zone: f64,
    /// MACD histogram changed sign on the latest bar.
    pub macd_crossover: f64,
    /// MACD histogram sign without a crossover.
    pub macd_trend: f64,
}

impl Default for TechnicalWeights {
    fn default() -> Self {
        Self {
            sma_trend: 0.75,
            rsi_zone: 0.5,
            macd_crossover: 1.0,
            macd_trend: 0.5,
        }
    }
}

impl TechnicalWeights {
    fn max_magnitude(&self) -> f64 {
        self.sma_trend + self.rsi_zone + self.macd_crossover.max(self.macd_trend)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisConfig {
    pub technical_weight: f64,
    pub sentiment_weight: f64,
    /// Final score above this is Positive, below its negation Negative.
    pub category_threshold: f64,
    pub technical: TechnicalWeights,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    /// Article count at which news depth reaches ~63% of its contribution.
    pub news_saturation: f64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            technical_weight: 0.6,
            sentiment_weight: 0.4,
            category_threshold: 0.15,
            technical: TechnicalWeights::default(),
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
            news_saturation: 3.0,
        }
    }
}

impl SynthesisConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.technical_weight > 0.0 && self.sentiment_weight > 0.0,
            "signal weights must be positive (got technical={}, sentiment={})",
            self.technical_weight,
            self.sentiment_weight
        );
        ensure!(
            (0.0..1.0).contains(&self.category_threshold),
            "category threshold must be in [0, 1) (got {})",
            self.category_threshold
        );
        ensure!(
            self.rsi_oversold < self.rsi_overbought,
            "RSI oversold level must be below overbought level"
        );
        ensure!(
            self.technical.max_magnitude() > 0.0,
            "technical weights must not all be zero"
        );
        ensure!(self.news_saturation > 0.0, "news saturation must be positive");
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SynthesisEngine {
    config: SynthesisConfig,
}

struct SubScore {
    score: f64,
    drivers: Vec<String>,
}

impl SynthesisEngine {
    pub fn new(config: SynthesisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    pub fn synthesize(
        &self,
        indicators: &IndicatorOutcome,
        sentiment: &SentimentOutcome,
    ) -> Result<Outlook, InsufficientDataError> {
        let technical = match indicators {
            IndicatorOutcome::Ready(bundle) => Some(self.technical_score(bundle)),
            IndicatorOutcome::InsufficientData { .. } => None,
        };
        let news = sentiment.bundle().map(|bundle| self.sentiment_score(bundle));

        let (t, s) = match (&technical, &news) {
            (None, None) => {
                return Err(InsufficientDataError {
                    drivers: vec![
                        missing_technical_driver(indicators),
                        "no labeled news articles".to_string(),
                    ],
                });
            }
            (t, s) => (t.as_ref().map(|x| x.score), s.as_ref().map(|x| x.score)),
        };

        let score = match (t, s) {
            (Some(t), Some(s)) => {
                let (wt, ws) = (self.config.technical_weight, self.config.sentiment_weight);
                ((wt * t + ws * s) / (wt + ws)).clamp(-1.0, 1.0)
            }
            // A single input carries the full weight.
            (Some(only), None) | (None, Some(only)) => only,
            (None, None) => 0.0,
        };

        let category = if score > self.config.category_threshold {
            OutlookCategory::Positive
        } else if score < -self.config.category_threshold {
            OutlookCategory::Negative
        } else {
            OutlookCategory::Neutral
        };

        let agreement = match (t, s) {
            (Some(t), Some(s)) => 1.0 - (t - s).abs() / 2.0,
            _ => 0.0,
        };
        let labeled = sentiment.bundle().map_or(0, |b| b.count);
        let depth = 1.0 - (-(labeled as f64) / self.config.news_saturation).exp();
        let confidence = (CONFIDENCE_BASE
            + CONFIDENCE_AGREEMENT * agreement
            + CONFIDENCE_DEPTH * depth
            + CONFIDENCE_MAGNITUDE * score.abs())
        .clamp(0.0, 1.0);

        let mut drivers = Vec::new();
        match technical {
            Some(sub) => drivers.extend(sub.drivers),
            None => drivers.push(missing_technical_driver(indicators)),
        }
        match news {
            Some(sub) => drivers.extend(sub.drivers),
            None => drivers.push("no labeled news articles".to_string()),
        }
        match (t, s) {
            (Some(_), None) => drivers.push("outlook based solely on technical indicators".into()),
            (None, Some(_)) => drivers.push("outlook based solely on news sentiment".into()),
            _ => {}
        }

        tracing::debug!(
            technical = ?t,
            sentiment = ?s,
            score,
            confidence,
            %category,
            "outlook synthesized"
        );

        Ok(Outlook {
            category,
            score,
            confidence,
            confidence_band: ConfidenceBand::from_confidence(confidence),
            technical_score: t,
            sentiment_score: s,
            drivers,
        })
    }

    fn technical_score(&self, bundle: &IndicatorBundle) -> SubScore {
        let weights = &self.config.technical;
        let mut raw = 0.0;
        let mut drivers = Vec::with_capacity(3);

        let shortest = bundle.sma.iter().min_by_key(|s| s.window);
        let longest = bundle.sma.iter().max_by_key(|s| s.window);
        if let (Some(short), Some(long)) = (shortest, longest) {
            // With one window the trend is price against that average.
            let (lhs_name, lhs, rhs_name, rhs) = if short.window == long.window {
                ("close".to_string(), bundle.last_close, format!("SMA {}", long.window), long.value)
            } else {
                (
                    format!("SMA {}", short.window),
                    short.value,
                    format!("SMA {}", long.window),
                    long.value,
                )
            };
            if lhs > rhs {
                raw += weights.sma_trend;
                drivers.push(format!("{lhs_name} above {rhs_name} ({lhs:.2} > {rhs:.2})"));
            } else if lhs < rhs {
                raw -= weights.sma_trend;
                drivers.push(format!("{lhs_name} below {rhs_name} ({lhs:.2} < {rhs:.2})"));
            } else {
                drivers.push(format!("{lhs_name} level with {rhs_name} ({lhs:.2})"));
            }
        }

        let rsi = bundle.rsi;
        if rsi < self.config.rsi_oversold {
            raw += weights.rsi_zone;
            drivers.push(format!("RSI oversold ({rsi:.2})"));
        } else if rsi > self.config.rsi_overbought {
            raw -= weights.rsi_zone;
            drivers.push(format!("RSI overbought ({rsi:.2})"));
        } else {
            drivers.push(format!("RSI neutral ({rsi:.2})"));
        }

        let macd = &bundle.macd;
        let hist = macd.histogram;
        let trend = match macd.previous_histogram {
            Some(prev) if hist > prev => " and rising",
            Some(prev) if hist < prev => " and falling",
            _ => "",
        };
        match macd.cross {
            MacdCross::BullishCrossover => {
                raw += weights.macd_crossover;
                drivers.push(format!("MACD bullish crossover ({hist:.2})"));
            }
            MacdCross::BearishCrossover => {
                raw -= weights.macd_crossover;
                drivers.push(format!("MACD bearish crossover ({hist:.2})"));
            }
            MacdCross::Bullish => {
                raw += weights.macd_trend;
                drivers.push(format!("MACD histogram positive{trend} ({hist:.2})"));
            }
            MacdCross::Bearish => {
                raw -= weights.macd_trend;
                drivers.push(format!("MACD histogram negative{trend} ({hist:.2})"));
            }
            MacdCross::Flat => drivers.push(format!("MACD histogram flat ({hist:.2})")),
        }

        SubScore {
            score: (raw / weights.max_magnitude()).clamp(-1.0, 1.0),
            drivers,
        }
    }

    fn sentiment_score(&self, bundle: &SentimentBundle) -> SubScore {
        let b = &bundle.breakdown;
        let noun = if bundle.count == 1 { "article" } else { "articles" };
        SubScore {
            score: bundle.score,
            drivers: vec![format!(
                "{} news sentiment across {} {noun} ({} positive, {} negative, {} neutral)",
                bundle.label, bundle.count, b.positive, b.negative, b.neutral
            )],
        }
    }
}

fn missing_technical_driver(indicators: &IndicatorOutcome) -> String {
    match indicators {
        IndicatorOutcome::InsufficientData {
            required,
            available,
        } => format!(
            "insufficient price history for indicators ({available} closes, {required} required)"
        ),
        IndicatorOutcome::Ready(_) => "technical indicators unavailable".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::article::SentimentLabel;
    use crate::domain::price::{PriceHistory, PricePoint};
    use crate::indicators::{self, IndicatorConfig, MacdValue, SmaValue};
    use crate::news::aggregate::{aggregate, SentimentThresholds};
    use chrono::NaiveDate;

    fn bundle(sma20: f64, sma50: f64, rsi: f64, hist: f64, prev: Option<f64>) -> IndicatorOutcome {
        let cross = match prev {
            Some(p) if hist > 0.0 && p <= 0.0 => MacdCross::BullishCrossover,
            Some(p) if hist < 0.0 && p >= 0.0 => MacdCross::BearishCrossover,
            _ if hist > 0.0 => MacdCross::Bullish,
            _ if hist < 0.0 => MacdCross::Bearish,
            _ => MacdCross::Flat,
        };
        IndicatorOutcome::Ready(IndicatorBundle {
            as_of: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            last_close: 106.0,
            sma: vec![
                SmaValue {
                    window: 20,
                    value: sma20,
                },
                SmaValue {
                    window: 50,
                    value: sma50,
                },
            ],
            rsi_period: 14,
            rsi,
            macd: MacdValue {
                line: 1.0,
                signal: 1.0 - hist,
                histogram: hist,
                previous_histogram: prev,
                cross,
            },
        })
    }

    fn bullish_indicators() -> IndicatorOutcome {
        bundle(105.0, 100.0, 25.0, 0.42, Some(0.30))
    }

    fn news(labels: &[SentimentLabel]) -> SentimentOutcome {
        aggregate(labels, &SentimentThresholds::default())
    }

    fn engine() -> SynthesisEngine {
        SynthesisEngine::default()
    }

    #[test]
    fn default_config_is_valid() {
        assert!(SynthesisConfig::default().validate().is_ok());
        assert!((TechnicalWeights::default().max_magnitude() - 2.25).abs() < 1e-12);
    }

    #[test]
    fn bullish_scenario_with_agreeing_news() {
        let outlook = engine()
            .synthesize(&bullish_indicators(), &news(&[SentimentLabel::Positive; 5]))
            .unwrap();

        assert_eq!(outlook.category, OutlookCategory::Positive);
        assert!(outlook.confidence > 0.6, "confidence {}", outlook.confidence);
        assert_eq!(outlook.confidence_band, ConfidenceBand::High);
        assert!(outlook.drivers.iter().any(|d| d.contains("RSI oversold")));
        assert!(outlook
            .drivers
            .iter()
            .any(|d| d.contains("positive news sentiment across 5 articles")));
        assert_eq!(outlook.drivers[0], "SMA 20 above SMA 50 (105.00 > 100.00)");
        assert_eq!(outlook.drivers[2], "MACD histogram positive and rising (0.42)");
        // (0.75 + 0.5 + 0.5) / 2.25
        assert!((outlook.technical_score.unwrap() - 1.75 / 2.25).abs() < 1e-12);
        assert_eq!(outlook.sentiment_score, Some(1.0));
    }

    #[test]
    fn technical_only_is_less_confident_than_agreement() {
        let both = engine()
            .synthesize(&bullish_indicators(), &news(&[SentimentLabel::Positive; 5]))
            .unwrap();
        let alone = engine()
            .synthesize(&bullish_indicators(), &SentimentOutcome::NoSignal)
            .unwrap();

        assert_eq!(alone.sentiment_score, None);
        assert_eq!(alone.score, alone.technical_score.unwrap());
        assert_eq!(alone.category, OutlookCategory::Positive);
        assert!(alone.confidence < both.confidence);
        assert_eq!(
            alone.drivers.last().unwrap(),
            "outlook based solely on technical indicators"
        );
    }

    #[test]
    fn sentiment_only_takes_full_weight() {
        let insufficient = IndicatorOutcome::InsufficientData {
            required: 50,
            available: 10,
        };
        let labels = [
            SentimentLabel::Positive,
            SentimentLabel::Positive,
            SentimentLabel::Negative,
            SentimentLabel::Neutral,
            SentimentLabel::Neutral,
        ];
        let sentiment = news(&labels);
        let outlook = engine().synthesize(&insufficient, &sentiment).unwrap();

        assert_eq!(outlook.technical_score, None);
        assert_eq!(outlook.score, sentiment.bundle().unwrap().score);
        assert_eq!(outlook.sentiment_score, Some(outlook.score));
        assert_eq!(
            outlook.drivers[0],
            "insufficient price history for indicators (10 closes, 50 required)"
        );
    }

    #[test]
    fn disagreement_lowers_confidence() {
        // Technical +0.5/2.25 from RSI alone; news of the same magnitude in each direction.
        let indicators = bundle(100.0, 100.0, 25.0, 0.0, Some(0.0));

        let agree = engine()
            .synthesize(&indicators, &news(&[SentimentLabel::Positive; 4]))
            .unwrap();
        let disagree = engine()
            .synthesize(&indicators, &news(&[SentimentLabel::Negative; 4]))
            .unwrap();

        assert!(disagree.confidence < agree.confidence);
    }

    #[test]
    fn opposite_signs_with_equal_magnitude() {
        // All four technical contributions align: score is exactly +-1.
        let up = bundle(105.0, 100.0, 25.0, 0.5, Some(-0.1));
        let down = bundle(95.0, 100.0, 75.0, -0.5, Some(0.1));
        let positive = news(&[SentimentLabel::Positive; 3]);

        let agree = engine().synthesize(&up, &positive).unwrap();
        let disagree = engine().synthesize(&down, &positive).unwrap();

        assert_eq!(agree.technical_score, Some(1.0));
        assert_eq!(disagree.technical_score, Some(-1.0));
        assert!(disagree.confidence < agree.confidence);
        assert_eq!(disagree.category, OutlookCategory::Negative);
        assert!(disagree.drivers.iter().any(|d| d == "MACD bearish crossover (-0.50)"));
        assert!(disagree.drivers.iter().any(|d| d.starts_with("RSI overbought")));
    }

    #[test]
    fn short_history_and_no_news_is_insufficient_data() {
        let dates = (1..=10).map(|d| NaiveDate::from_ymd_opt(2026, 1, d).unwrap());
        let points = dates
            .zip(1..)
            .map(|(date, i)| PricePoint {
                date,
                close: 100.0 + f64::from(i),
            })
            .collect();
        let history = PriceHistory::try_new("ACME", None, points).unwrap();
        let outcome = indicators::compute(&history, &IndicatorConfig::default());
        assert!(outcome.bundle().is_none());

        let err = engine()
            .synthesize(&outcome, &SentimentOutcome::NoSignal)
            .unwrap_err();
        assert_eq!(err.drivers.len(), 2);
        assert!(err.drivers[0].contains("10 closes"));
    }

    #[test]
    fn flat_history_has_no_technical_lean() {
        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let points = (0..60)
            .map(|i| PricePoint {
                date: start + chrono::Duration::days(i),
                close: 100.0,
            })
            .collect();
        let history = PriceHistory::try_new("FLAT", None, points).unwrap();
        let outcome = indicators::compute(&history, &IndicatorConfig::default());
        assert_eq!(outcome.bundle().unwrap().rsi, 50.0);

        let outlook = engine()
            .synthesize(&outcome, &SentimentOutcome::NoSignal)
            .unwrap();
        assert_eq!(outlook.technical_score, Some(0.0));
        assert_eq!(outlook.category, OutlookCategory::Neutral);
        assert!(outlook.drivers.iter().any(|d| d == "RSI neutral (50.00)"));
        assert!(!outlook.drivers.iter().any(|d| d.contains("overbought")));
    }

    #[test]
    fn confidence_grows_with_article_count() {
        let confidences: Vec<f64> = [1, 3, 10]
            .iter()
            .map(|&n| {
                engine()
                    .synthesize(&bullish_indicators(), &news(&vec![SentimentLabel::Positive; n]))
                    .unwrap()
                    .confidence
            })
            .collect();
        assert!(confidences[0] < confidences[1], "{confidences:?}");
        assert!(confidences[1] < confidences[2], "{confidences:?}");
    }

    #[test]
    fn confidence_grows_with_score_magnitude() {
        // Technical only: agreement and depth are both zero.
        let weak = engine()
            .synthesize(&bundle(100.0, 100.0, 25.0, 0.0, None), &SentimentOutcome::NoSignal)
            .unwrap();
        let strong = engine()
            .synthesize(&bullish_indicators(), &SentimentOutcome::NoSignal)
            .unwrap();
        assert!(weak.score.abs() < strong.score.abs());
        assert!(weak.confidence < strong.confidence);

        // News only over the same article count.
        let insufficient = IndicatorOutcome::InsufficientData {
            required: 50,
            available: 0,
        };
        let mixed = [
            SentimentLabel::Positive,
            SentimentLabel::Positive,
            SentimentLabel::Positive,
            SentimentLabel::Neutral,
        ];
        let mild = engine().synthesize(&insufficient, &news(&mixed)).unwrap();
        let firm = engine()
            .synthesize(&insufficient, &news(&[SentimentLabel::Positive; 4]))
            .unwrap();
        assert!(mild.score < firm.score);
        assert!(mild.confidence < firm.confidence);
    }

    #[test]
    fn neutral_news_is_not_no_signal() {
        let insufficient = IndicatorOutcome::InsufficientData {
            required: 50,
            available: 0,
        };
        let outlook = engine()
            .synthesize(&insufficient, &news(&[SentimentLabel::Neutral; 2]))
            .unwrap();
        assert_eq!(outlook.category, OutlookCategory::Neutral);
        assert_eq!(outlook.score, 0.0);
    }

    #[test]
    fn deterministic() {
        let indicators = bullish_indicators();
        let sentiment = news(&[SentimentLabel::Positive, SentimentLabel::Negative]);
        let first = engine().synthesize(&indicators, &sentiment).unwrap();
        for _ in 0..5 {
            assert_eq!(engine().synthesize(&indicators, &sentiment).unwrap(), first);
        }
    }

    #[test]
    fn confidence_stays_in_unit_interval() {
        let cases = [
            bundle(105.0, 100.0, 25.0, 0.5, Some(-0.1)),
            bundle(95.0, 100.0, 75.0, -0.5, Some(0.1)),
            bundle(100.0, 100.0, 50.0, 0.0, None),
        ];
        let sentiments = [
            news(&[SentimentLabel::Positive; 50]),
            news(&[SentimentLabel::Negative; 1]),
            SentimentOutcome::NoSignal,
        ];
        for indicators in &cases {
            for sentiment in &sentiments {
                let outlook = engine().synthesize(indicators, sentiment).unwrap();
                assert!((0.0..=1.0).contains(&outlook.confidence));
                assert!((-1.0..=1.0).contains(&outlook.score));
            }
        }
    }
}
