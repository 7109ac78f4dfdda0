use serde::{Deserialize, Serialize};

/// Descriptive company data returned alongside the outlook. Every field is
/// optional; providers omit what they do not know.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub ticker: String,
    pub name: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub country: Option<String>,
    pub market_cap: Option<f64>,
    pub trailing_pe: Option<f64>,
    pub forward_pe: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub fifty_two_week_high: Option<f64>,
    pub fifty_two_week_low: Option<f64>,
}

impl CompanyProfile {
    /// Blank text is dropped and non-finite numbers are discarded.
    pub fn normalized(mut self) -> Self {
        for text in [
            &mut self.name,
            &mut self.sector,
            &mut self.industry,
            &mut self.country,
        ] {
            *text = text
                .take()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty());
        }
        for number in [
            &mut self.market_cap,
            &mut self.trailing_pe,
            &mut self.forward_pe,
            &mut self.dividend_yield,
            &mut self.fifty_two_week_high,
            &mut self.fifty_two_week_low,
        ] {
            *number = number.filter(|v| v.is_finite());
        }
        self
    }
}
