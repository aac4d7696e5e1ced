//! Shared types for the aggregation library.
//!
//! These are the view-models handed to rendering collaborators: period-keyed
//! series, stacked layers and category rankings. All of them are derived
//! values, rebuilt wholesale on every recomputation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{CategoryKey, Timestamp};

// ---------------------------------------------------------------------------
// Granularity
// ---------------------------------------------------------------------------

/// Time-bucket granularity.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[default]
    Day,
    Week,
    Month,
    Year,
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Day => write!(f, "day"),
            Self::Week => write!(f, "week"),
            Self::Month => write!(f, "month"),
            Self::Year => write!(f, "year"),
        }
    }
}

impl std::str::FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(Self::Day),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            "year" => Ok(Self::Year),
            other => Err(format!("unknown granularity '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Period
// ---------------------------------------------------------------------------

/// A canonical time bucket. Ordered by bucket start.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Period {
    /// First day of the bucket.
    pub start: Timestamp,
    pub granularity: Granularity,
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&super::bucketing::period_label(self))
    }
}

// ---------------------------------------------------------------------------
// Reducers and ordering policies
// ---------------------------------------------------------------------------

/// How values falling into the same (period, category) cell are combined.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reduce {
    #[default]
    Sum,
    Mean,
}

/// Layer ordering for [`super::stack::stack`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderingPolicy {
    /// Stack in the caller's category order.
    #[default]
    AsGiven,
    /// Largest all-time total at the bottom; ties keep the caller's order.
    DescendingByTotal,
}

// ---------------------------------------------------------------------------
// AggregatedSeries
// ---------------------------------------------------------------------------

/// Values of every category at one period.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PeriodValues {
    pub period: Period,
    pub values: BTreeMap<CategoryKey, f64>,
}

impl PeriodValues {
    /// Sum across categories; `0.0` when no category is present.
    pub fn total(&self) -> f64 {
        self.values.values().fold(0.0, |acc, v| acc + v)
    }

    pub fn get(&self, key: &CategoryKey) -> f64 {
        self.values.get(key).copied().unwrap_or(0.0)
    }
}

/// Period-keyed series sorted ascending by period.
///
/// `categories` lists the keys the series carries: the dataset's domain in
/// its own order, then keys outside the domain in first-seen order. That
/// order is the tie-breaker for rankings.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AggregatedSeries {
    pub categories: Vec<CategoryKey>,
    pub points: Vec<PeriodValues>,
}

impl AggregatedSeries {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn periods(&self) -> impl Iterator<Item = Period> + '_ {
        self.points.iter().map(|p| p.period)
    }

    /// All-time total of one category.
    pub fn category_total(&self, key: &CategoryKey) -> f64 {
        self.points.iter().map(|p| p.get(key)).fold(0.0, |acc, v| acc + v)
    }

    /// All-time totals in `categories` order.
    pub fn category_totals(&self) -> Vec<(CategoryKey, f64)> {
        self.categories
            .iter()
            .map(|k| (k.clone(), self.category_total(k)))
            .collect()
    }

    /// Grand total across every period and category.
    pub fn grand_total(&self) -> f64 {
        self.points
            .iter()
            .map(PeriodValues::total)
            .fold(0.0, |acc, v| acc + v)
    }
}

// ---------------------------------------------------------------------------
// Stacking
// ---------------------------------------------------------------------------

/// One stacked segment.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct StackPoint {
    pub period: Period,
    pub y0: f64,
    pub y1: f64,
}

impl StackPoint {
    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }
}

/// A category's band across all periods.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StackedLayer {
    pub category: CategoryKey,
    pub points: Vec<StackPoint>,
}

/// Numeric axis extent `[min, max]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Domain {
    pub min: f64,
    pub max: f64,
}

impl Domain {
    /// Fixed axis for percentage metrics.
    pub const PERCENT: Domain = Domain {
        min: 0.0,
        max: 100.0,
    };

    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// `[0, max]`, the shape every value axis in the engine takes.
    pub fn from_zero(max: f64) -> Self {
        Self { min: 0.0, max }
    }
}

// ---------------------------------------------------------------------------
// Rankings
// ---------------------------------------------------------------------------

/// A category and its summed total, for non-temporal bar rankings.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RankedCategory {
    pub category: CategoryKey,
    pub total: f64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
