use anyhow::Context;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// US Eastern standard time. Daylight saving is not modelled; the cutoff
// below leaves enough margin for the one-hour shift.
const EASTERN_OFFSET_SECS: i32 = -5 * 3600;

// Before this local time the latest complete session is the previous one.
// Regular close is 16:00 ET.
const CLOSE_CUTOFF_HOUR: u32 = 17;
const CLOSE_CUTOFF_MINUTE: u32 = 0;

/// Inclusive date window for price history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl HistoryRange {
    /// `days` calendar days ending at `as_of`.
    pub fn lookback(as_of: NaiveDate, days: u32) -> Self {
        Self {
            start: as_of - Duration::days(i64::from(days)),
            end: as_of,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Explicit `YYYY-MM-DD` wins; otherwise the latest completed US trading day.
pub fn resolve_as_of_date(
    as_of_date_arg: Option<&str>,
    now_utc: DateTime<Utc>,
) -> anyhow::Result<NaiveDate> {
    resolve_with_holidays(as_of_date_arg, now_utc, &configured_holidays())
}

fn resolve_with_holidays(
    as_of_date_arg: Option<&str>,
    now_utc: DateTime<Utc>,
    holidays: &HashSet<NaiveDate>,
) -> anyhow::Result<NaiveDate> {
    if let Some(s) = as_of_date_arg {
        return NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .with_context(|| format!("invalid as-of date {s:?}, expected YYYY-MM-DD"));
    }

    let eastern =
        chrono::FixedOffset::east_opt(EASTERN_OFFSET_SECS).context("invalid Eastern offset")?;
    let now_local = now_utc.with_timezone(&eastern);

    let cutoff_reached =
        (now_local.hour(), now_local.minute()) >= (CLOSE_CUTOFF_HOUR, CLOSE_CUTOFF_MINUTE);
    let mut date = now_local.date_naive();
    if !cutoff_reached {
        date = date - Duration::days(1);
    }

    while is_weekend(date) || holidays.contains(&date) {
        date = date - Duration::days(1);
    }

    Ok(date)
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun)
}

fn configured_holidays() -> HashSet<NaiveDate> {
    // Fixed-date exchange holidays only; add floating ones via
    // MARKET_HOLIDAYS="YYYY-MM-DD,YYYY-MM-DD".
    let mut out = HashSet::new();
    for y in 2024..=2030 {
        for (m, d) in [(1, 1), (6, 19), (7, 4), (12, 25)] {
            if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
                out.insert(date);
            }
        }
    }

    if let Ok(s) = std::env::var("MARKET_HOLIDAYS") {
        out.extend(parse_holidays(&s));
    }

    out
}

fn parse_holidays(s: &str) -> Vec<NaiveDate> {
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .filter_map(|part| match NaiveDate::parse_from_str(part, "%Y-%m-%d") {
            Ok(d) => Some(d),
            Err(_) => {
                tracing::warn!(value = part, "ignoring unparseable MARKET_HOLIDAYS entry");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn explicit_date_wins() {
        let now = Utc.with_ymd_and_hms(2026, 1, 3, 8, 0, 0).unwrap();
        let got = resolve_with_holidays(Some("2025-11-20"), now, &HashSet::new()).unwrap();
        assert_eq!(got, d(2025, 11, 20));
        assert!(resolve_with_holidays(Some("20/11/2025"), now, &HashSet::new()).is_err());
    }

    #[test]
    fn uses_previous_day_before_cutoff() {
        // 2026-01-06 20:00 UTC = 15:00 ET, session still open.
        let now = Utc.with_ymd_and_hms(2026, 1, 6, 20, 0, 0).unwrap();
        let got = resolve_with_holidays(None, now, &HashSet::new()).unwrap();
        assert_eq!(got, d(2026, 1, 5));
    }

    #[test]
    fn uses_same_day_after_cutoff() {
        // 2026-01-06 23:00 UTC = 18:00 ET.
        let now = Utc.with_ymd_and_hms(2026, 1, 6, 23, 0, 0).unwrap();
        let got = resolve_with_holidays(None, now, &HashSet::new()).unwrap();
        assert_eq!(got, d(2026, 1, 6));
    }

    #[test]
    fn rolls_back_over_weekend_and_holiday() {
        // Monday 2026-01-05 before the cutoff: Sunday, Saturday, then a Friday holiday.
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 15, 0, 0).unwrap();
        let holidays: HashSet<_> = [d(2026, 1, 2)].into_iter().collect();
        let got = resolve_with_holidays(None, now, &holidays).unwrap();
        assert_eq!(got, d(2026, 1, 1));

        let holidays: HashSet<_> = [d(2026, 1, 1), d(2026, 1, 2)].into_iter().collect();
        let got = resolve_with_holidays(None, now, &holidays).unwrap();
        assert_eq!(got, d(2025, 12, 31));
    }

    #[test]
    fn lookback_range_is_inclusive() {
        let range = HistoryRange::lookback(d(2026, 3, 31), 30);
        assert_eq!(range.start, d(2026, 3, 1));
        assert!(range.contains(d(2026, 3, 1)));
        assert!(range.contains(d(2026, 3, 31)));
        assert!(!range.contains(d(2026, 4, 1)));
    }

    #[test]
    fn holiday_list_skips_garbage() {
        let parsed = parse_holidays("2026-11-26, nope,,2026-09-07");
        assert_eq!(parsed, vec![d(2026, 11, 26), d(2026, 9, 7)]);
    }
}
