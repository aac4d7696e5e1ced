//! Time-bucket conversions.
//!
//! Maps record timestamps onto canonical [`Period`] buckets and formats
//! bucket labels (ISO dates, ISO weeks, months, years).

use chrono::{Datelike, Duration, NaiveDate};

use super::types::{Granularity, Period};
use crate::model::Timestamp;

/// First day of the bucket containing `ts`.
///
/// Weeks start on the ISO Monday. A week whose Monday falls before the
/// earliest representable date starts at `ts` itself.
pub fn bucket_start(ts: Timestamp, granularity: Granularity) -> Timestamp {
    match granularity {
        Granularity::Day => ts,
        Granularity::Week => ts
            .checked_sub_signed(Duration::days(i64::from(
                ts.weekday().num_days_from_monday(),
            )))
            .unwrap_or(ts),
        Granularity::Month => NaiveDate::from_ymd_opt(ts.year(), ts.month(), 1).unwrap_or(ts),
        Granularity::Year => NaiveDate::from_ymd_opt(ts.year(), 1, 1).unwrap_or(ts),
    }
}

/// The period containing `ts`.
pub fn period_of(ts: Timestamp, granularity: Granularity) -> Period {
    Period {
        start: bucket_start(ts, granularity),
        granularity,
    }
}

/// Format a period as a stable label.
///
/// - day: `YYYY-MM-DD`
/// - week: `YYYY-Www` (ISO week-numbering year)
/// - month: `YYYY-MM`
/// - year: `YYYY`
pub fn period_label(period: &Period) -> String {
    let ts = period.start;
    match period.granularity {
        Granularity::Day => ts.format("%Y-%m-%d").to_string(),
        Granularity::Week => {
            let iso = ts.iso_week();
            format!("{}-W{:02}", iso.year(), iso.week())
        }
        Granularity::Month => ts.format("%Y-%m").to_string(),
        Granularity::Year => ts.format("%Y").to_string(),
    }
}

/// Parse a `YYYY-MM-DD` date, the only timestamp format the engine accepts
/// at its edges (CLI flags, config markers).
pub fn parse_date(s: &str) -> Result<Timestamp, chrono::ParseError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
