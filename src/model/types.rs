//! Typed per-dataset record schemas.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::str::FromStr;

/// Canonical instant. Every source dataset is date-grained (week start dates,
/// reporting-period end dates), so day resolution is the finest we keep.
pub type Timestamp = NaiveDate;

/// The four datasets behind the linked views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetId {
    Ads,
    Requests,
    Removals,
    StateSpend,
}

impl DatasetId {
    pub const ALL: [DatasetId; 4] = [
        DatasetId::Ads,
        DatasetId::Requests,
        DatasetId::Removals,
        DatasetId::StateSpend,
    ];

    /// Whether records of this dataset carry a timestamp.
    pub fn is_temporal(&self) -> bool {
        !matches!(self, Self::StateSpend)
    }
}

impl std::fmt::Display for DatasetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ads => write!(f, "ads"),
            Self::Requests => write!(f, "requests"),
            Self::Removals => write!(f, "removals"),
            Self::StateSpend => write!(f, "state_spend"),
        }
    }
}

impl FromStr for DatasetId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ads" => Ok(Self::Ads),
            "requests" => Ok(Self::Requests),
            "removals" => Ok(Self::Removals),
            "state_spend" | "states" => Ok(Self::StateSpend),
            other => Err(format!("unknown dataset '{other}'")),
        }
    }
}

/// Identifier of one sub-series within a dataset (party, reason, state, metric).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryKey(String);

impl CategoryKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CategoryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CategoryKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for CategoryKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for CategoryKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Party attribution of an ad buy. Anything the ingestion step could not map
/// to one of the two major parties lands in `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Party {
    Democratic,
    Republican,
    #[serde(other)]
    Other,
}

impl Party {
    /// Stacking order used by the ads view.
    pub const ALL: [Party; 3] = [Party::Democratic, Party::Republican, Party::Other];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Democratic => "Democratic",
            Self::Republican => "Republican",
            Self::Other => "Other",
        }
    }
}

impl From<Party> for CategoryKey {
    fn from(p: Party) -> Self {
        CategoryKey::from(p.as_str())
    }
}

/// Weekly ad spend attributed to a party.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdRecord {
    pub date: Timestamp,
    pub party: Party,
    pub spend: f64,
}

/// Government user-data requests for one reporting period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub date: Timestamp,
    pub requests: f64,
    pub accounts: f64,
    /// Percentage (0..=100) of requests where some data was produced.
    #[serde(alias = "disclosureRate")]
    pub disclosure_rate: f64,
}

/// Content-removal requests for one reporting period and reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovalRecord {
    pub date: Timestamp,
    pub reason: String,
    pub total: f64,
}

/// All-time ad spend in one state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSpendRecord {
    pub state: String,
    pub spend: f64,
}

/// Inverted bounds passed where a `[start, end]` range was expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid time range: start {start} is after end {end}")]
pub struct InvalidRange {
    pub start: Timestamp,
    pub end: Timestamp,
}

/// Inclusive `[start, end]` window. Construction guarantees `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TimeRange {
    start: Timestamp,
    end: Timestamp,
}

impl TimeRange {
    pub fn new(start: Timestamp, end: Timestamp) -> Result<Self, InvalidRange> {
        if start > end {
            return Err(InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Single-day range.
    pub fn day(ts: Timestamp) -> Self {
        Self { start: ts, end: ts }
    }

    pub fn start(&self) -> Timestamp {
        self.start
    }

    pub fn end(&self) -> Timestamp {
        self.end
    }

    pub fn contains(&self, ts: Timestamp) -> bool {
        self.start <= ts && ts <= self.end
    }

    /// Smallest range covering both.
    pub fn union(&self, other: &TimeRange) -> TimeRange {
        TimeRange {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Smallest range covering every timestamp, `None` when empty.
    pub fn covering<I: IntoIterator<Item = Timestamp>>(stamps: I) -> Option<TimeRange> {
        stamps.into_iter().fold(None, |acc: Option<TimeRange>, ts| match acc {
            None => Some(TimeRange::day(ts)),
            Some(r) => Some(r.union(&TimeRange::day(ts))),
        })
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// Metric field names used as categories for the requests dataset.
pub const REQUESTS_FIELD: &str = "requests";
pub const ACCOUNTS_FIELD: &str = "accounts";
pub const DISCLOSURE_RATE_FIELD: &str = "disclosure_rate";

/// One immutable input row, tagged by dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dataset", rename_all = "snake_case")]
pub enum Record {
    Ad(AdRecord),
    Request(RequestRecord),
    Removal(RemovalRecord),
    StateSpend(StateSpendRecord),
}

impl Record {
    pub fn dataset(&self) -> DatasetId {
        match self {
            Self::Ad(_) => DatasetId::Ads,
            Self::Request(_) => DatasetId::Requests,
            Self::Removal(_) => DatasetId::Removals,
            Self::StateSpend(_) => DatasetId::StateSpend,
        }
    }

    /// `None` for state totals, which are not time-indexed.
    pub fn timestamp(&self) -> Option<Timestamp> {
        match self {
            Self::Ad(r) => Some(r.date),
            Self::Request(r) => Some(r.date),
            Self::Removal(r) => Some(r.date),
            Self::StateSpend(_) => None,
        }
    }

    /// `None` for request rows, whose categories are their metric fields.
    pub fn category(&self) -> Option<CategoryKey> {
        match self {
            Self::Ad(r) => Some(r.party.into()),
            Self::Request(_) => None,
            Self::Removal(r) => Some(CategoryKey::from(r.reason.as_str())),
            Self::StateSpend(r) => Some(CategoryKey::from(r.state.as_str())),
        }
    }

    /// Primary metric of the row.
    pub fn metric(&self) -> f64 {
        match self {
            Self::Ad(r) => r.spend,
            Self::Request(r) => r.requests,
            Self::Removal(r) => r.total,
            Self::StateSpend(r) => r.spend,
        }
    }

    /// Every numeric field of the row, used by ingestion checks.
    pub fn metrics(&self) -> Vec<(&'static str, f64)> {
        match self {
            Self::Ad(r) => vec![("spend", r.spend)],
            Self::Request(r) => vec![
                (REQUESTS_FIELD, r.requests),
                (ACCOUNTS_FIELD, r.accounts),
                (DISCLOSURE_RATE_FIELD, r.disclosure_rate),
            ],
            Self::Removal(r) => vec![("total", r.total)],
            Self::StateSpend(r) => vec![("spend", r.spend)],
        }
    }

    pub fn as_request(&self) -> Option<&RequestRecord> {
        match self {
            Self::Request(r) => Some(r),
            _ => None,
        }
    }
}
