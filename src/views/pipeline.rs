//! Per-view derivation pipeline.
//!
//! The base series is aggregated once, when the view is mounted. A selection
//! change then runs at most two passes:
//!
//! 1. **filter**: time range and category visibility, only when one of them
//!    changed;
//! 2. **layout**: stacking or lines, y-domains, markers, growth annotation,
//!    on every change.

use std::collections::BTreeMap;

use tracing::debug;

use super::{Marker, RenderFrame, ViewKind, ViewSeries, ViewSpec};
use crate::analytics::bucketing::{bucket_start, period_of};
use crate::analytics::derive::{self, DEFAULT_TICKS};
use crate::analytics::{
    AggregatedSeries, Domain, Granularity, MetricField, PeriodValues, RankedCategory, Reduce,
    aggregate_by_period, aggregate_fields, filter_by_categories, filter_by_range, period_totals,
    rank_categories, stack, truncate_to_top_n,
};
use crate::model::types::{ACCOUNTS_FIELD, DISCLOSURE_RATE_FIELD, REQUESTS_FIELD};
use crate::model::{CategoryKey, DatasetId, Record, TimeRange};
use crate::selection::{ChartMode, SelectionChange, SelectionState};
use crate::store::{RecordStore, StoreError};

/// Category key of the single line drawn by totals views.
pub const TOTAL_KEY: &str = "total";

/// How many passes a pipeline has run since it was mounted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct PipelineStats {
    pub filter_passes: usize,
    pub layout_passes: usize,
}

#[derive(Debug, Clone, PartialEq)]
enum Derived {
    Temporal(AggregatedSeries),
    Ranking(Vec<RankedCategory>),
}

/// Multi-metric request rows: counts are summed, the rate is averaged.
fn request_fields() -> [MetricField<Record>; 3] {
    [
        MetricField {
            key: CategoryKey::from(REQUESTS_FIELD),
            value: |r| r.as_request().map(|q| q.requests),
            reduce: Reduce::Sum,
        },
        MetricField {
            key: CategoryKey::from(ACCOUNTS_FIELD),
            value: |r| r.as_request().map(|q| q.accounts),
            reduce: Reduce::Sum,
        },
        MetricField {
            key: CategoryKey::from(DISCLOSURE_RATE_FIELD),
            value: |r| r.as_request().map(|q| q.disclosure_rate),
            reduce: Reduce::Mean,
        },
    ]
}

/// Widen `range` so the bucket containing its start is kept.
fn snap_to_buckets(range: &TimeRange, granularity: Granularity) -> TimeRange {
    let start = bucket_start(range.start(), granularity);
    TimeRange::new(start, range.end()).unwrap_or(*range)
}

/// Single `total` line over the visible categories; empty when none is visible.
fn totals_series(series: &AggregatedSeries) -> AggregatedSeries {
    if series.categories.is_empty() {
        return AggregatedSeries::default();
    }
    let key = CategoryKey::from(TOTAL_KEY);
    AggregatedSeries {
        categories: vec![key.clone()],
        points: period_totals(series)
            .into_iter()
            .map(|(period, total)| PeriodValues {
                period,
                values: BTreeMap::from([(key.clone(), total)]),
            })
            .collect(),
    }
}

/// Growth between the first and last period of the first primary-axis line.
fn growth_of(series: &AggregatedSeries, secondary: &[CategoryKey]) -> Option<f64> {
    let key = series.categories.iter().find(|k| !secondary.contains(k))?;
    if series.len() < 2 {
        return None;
    }
    let first = series.points.first()?.get(key);
    let last = series.points.last()?.get(key);
    derive::growth_factor(first, last)
}

/// Derivation state of one mounted view.
#[derive(Debug, Clone)]
pub struct ViewPipeline {
    spec: ViewSpec,
    /// Layer order for stacking (the dataset's category domain).
    category_order: Vec<CategoryKey>,
    /// Default x-domain when no range is selected.
    extent: Option<TimeRange>,
    markers: Vec<Marker>,
    base: Derived,
    filtered: Derived,
    selection: SelectionState,
    frame: RenderFrame,
    stats: PipelineStats,
}

impl ViewPipeline {
    /// Aggregate the view's dataset and derive its first frame.
    pub fn new(
        spec: ViewSpec,
        store: &RecordStore,
        selection: SelectionState,
        markers: &[Marker],
    ) -> Result<Self, StoreError> {
        let records = store.load(spec.dataset)?;
        let category_order = store.domain(spec.dataset)?.keys().to_vec();
        let granularity = spec.granularity;
        let period = |r: &Record| r.timestamp().map(|ts| period_of(ts, granularity));

        let (base, extent) = match spec.kind {
            ViewKind::Ranking => {
                let ranking = rank_categories(
                    records,
                    &category_order,
                    Record::category,
                    Record::metric,
                    spec.top_n,
                );
                (Derived::Ranking(ranking), None)
            }
            kind => {
                let mut series = if spec.dataset == DatasetId::Requests {
                    aggregate_fields(records, period, &request_fields())
                } else {
                    aggregate_by_period(
                        records,
                        &category_order,
                        period,
                        Record::category,
                        Record::metric,
                    )
                };
                if let Some(n) = spec.top_n {
                    series = truncate_to_top_n(&series, n);
                }
                let extent = if kind == ViewKind::Totals {
                    let temporal: Vec<DatasetId> =
                        store.loaded().filter(DatasetId::is_temporal).collect();
                    store.combined_extent(&temporal)?
                } else {
                    derive::time_extent(&series)
                };
                (Derived::Temporal(series), extent)
            }
        };

        let filtered = Self::filter(&spec, &base, &selection);
        let frame = Self::layout(&spec, &category_order, extent, markers, &filtered, &selection);
        debug!(view = %spec.id, dataset = %spec.dataset, kind = %spec.kind, "view pipeline mounted");
        Ok(Self {
            spec,
            category_order,
            extent,
            markers: markers.to_vec(),
            base,
            filtered,
            selection,
            frame,
            stats: PipelineStats {
                filter_passes: 1,
                layout_passes: 1,
            },
        })
    }

    pub fn spec(&self) -> &ViewSpec {
        &self.spec
    }

    pub fn frame(&self) -> &RenderFrame {
        &self.frame
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// This view's local copy of the selection.
    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    /// Base series before any selection is applied (`None` for rankings).
    pub fn base_series(&self) -> Option<&AggregatedSeries> {
        match &self.base {
            Derived::Temporal(s) => Some(s),
            Derived::Ranking(_) => None,
        }
    }

    /// Series after the range/category filter (`None` for rankings).
    pub fn filtered_series(&self) -> Option<&AggregatedSeries> {
        match &self.filtered {
            Derived::Temporal(s) => Some(s),
            Derived::Ranking(_) => None,
        }
    }

    /// Merge `change` into the local selection and re-derive the frame.
    pub fn apply(&mut self, change: &SelectionChange) -> &RenderFrame {
        self.selection.merge(change);
        if change.affects_data() {
            self.filtered = Self::filter(&self.spec, &self.base, &self.selection);
            self.stats.filter_passes += 1;
        }
        self.frame = Self::layout(
            &self.spec,
            &self.category_order,
            self.extent,
            &self.markers,
            &self.filtered,
            &self.selection,
        );
        self.stats.layout_passes += 1;
        debug!(
            view = %self.spec.id,
            filter_passes = self.stats.filter_passes,
            layout_passes = self.stats.layout_passes,
            "view re-derived"
        );
        &self.frame
    }

    fn filter(spec: &ViewSpec, base: &Derived, selection: &SelectionState) -> Derived {
        match base {
            Derived::Temporal(series) => {
                let ranged = match &selection.time_range {
                    Some(range) => filter_by_range(series, &snap_to_buckets(range, spec.granularity)),
                    None => series.clone(),
                };
                Derived::Temporal(filter_by_categories(&ranged, &selection.visible_categories))
            }
            Derived::Ranking(ranking) => Derived::Ranking(
                ranking
                    .iter()
                    .filter(|r| selection.is_visible(&r.category))
                    .cloned()
                    .collect(),
            ),
        }
    }

    fn layout(
        spec: &ViewSpec,
        category_order: &[CategoryKey],
        extent: Option<TimeRange>,
        markers: &[Marker],
        filtered: &Derived,
        selection: &SelectionState,
    ) -> RenderFrame {
        let x_domain = if spec.kind.is_temporal() {
            selection.time_range.or(extent)
        } else {
            None
        };
        let markers: Vec<Marker> = x_domain
            .map(|window| {
                markers
                    .iter()
                    .filter(|m| window.contains(m.date))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let mut secondary_domain = None;
        let mut growth = None;
        let (series, y_domain) = match filtered {
            Derived::Ranking(ranking) => {
                let max = ranking.iter().map(|r| r.total).fold(0.0, f64::max);
                (
                    ViewSeries::Ranking {
                        ranking: ranking.clone(),
                    },
                    Domain::from_zero(max),
                )
            }
            Derived::Temporal(series) if spec.kind == ViewKind::Totals => {
                let totals = totals_series(series);
                let y = derive::line_y_domain(&totals, &[]);
                (ViewSeries::Lines { series: totals }, y)
            }
            Derived::Temporal(series)
                if spec.kind == ViewKind::Stackable && selection.mode == ChartMode::Stacked =>
            {
                let layers = stack(series, category_order, spec.ordering);
                let y = derive::stacked_y_domain(&layers);
                (ViewSeries::Stacked { layers }, y)
            }
            Derived::Temporal(series) => {
                let y = derive::line_y_domain(series, &spec.secondary_axis);
                if !spec.secondary_axis.is_empty() {
                    secondary_domain = Some(Domain::PERCENT);
                }
                if spec.kind == ViewKind::Lines {
                    growth = growth_of(series, &spec.secondary_axis);
                }
                (
                    ViewSeries::Lines {
                        series: series.clone(),
                    },
                    y,
                )
            }
        };

        RenderFrame {
            view: spec.id.clone(),
            series,
            selection: selection.clone(),
            x_domain,
            y_domain: derive::nice_domain(y_domain, DEFAULT_TICKS),
            secondary_domain,
            markers,
            growth,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
