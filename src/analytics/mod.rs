//! Shared aggregation library.
//!
//! One implementation of the rollup, zero-fill, top-N and stacking logic used
//! by every view, parameterised by period/category/value strategies.
//!
//! # Module structure
//!
//! - [`types`]: periods, series, layers, rankings, axis domains
//! - [`bucketing`]: timestamp ↔ period bucket conversions and labels
//! - [`aggregate`]: period/category rollups and series projections
//! - [`stack`]: cumulative layer stacking
//! - [`derive`]: y-domains, nice rounding, growth annotations
//! - [`validate`]: series and stack invariant checks

pub mod aggregate;
pub mod bucketing;
pub mod derive;
pub mod stack;
pub mod types;
pub mod validate;

// Re-export the most commonly used items at the crate::analytics level.
pub use aggregate::{
    MetricField, aggregate_by_period, aggregate_by_period_with, aggregate_fields,
    filter_by_categories, filter_by_range, period_totals, rank_categories, top_n_categories,
    truncate_to_top_n,
};
pub use stack::stack;
pub use types::{
    AggregatedSeries, Domain, Granularity, OrderingPolicy, Period, PeriodValues, RankedCategory,
    Reduce, StackPoint, StackedLayer,
};
pub use validate::{Check, Severity, ValidationReport};
