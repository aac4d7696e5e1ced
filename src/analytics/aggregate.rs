//! Period/category rollups, top-N truncation and series projections.
//!
//! Every function here is pure: inputs are borrowed, outputs are fresh
//! values. Callers pass extraction strategies (period, category, value) so
//! one implementation serves every dataset.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use itertools::Itertools;
use tracing::debug;

use super::types::{AggregatedSeries, Period, PeriodValues, RankedCategory, Reduce};
use crate::model::{CategoryKey, TimeRange};

/// Running accumulator for one (period, category) cell.
#[derive(Debug, Default, Clone, Copy)]
struct Cell {
    sum: f64,
    count: u32,
}

impl Cell {
    fn push(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn finish(self, reduce: Reduce) -> f64 {
        match reduce {
            Reduce::Sum => self.sum,
            Reduce::Mean if self.count == 0 => 0.0,
            Reduce::Mean => self.sum / f64::from(self.count),
        }
    }
}

/// Named numeric field of a multi-metric record, aggregated as its own category.
#[derive(Debug, Clone)]
pub struct MetricField<R> {
    pub key: CategoryKey,
    pub value: fn(&R) -> Option<f64>,
    pub reduce: Reduce,
}

/// Domain keys first (in domain order), then keys seen only in the records.
fn merge_category_order(seen: Vec<CategoryKey>, domain: &[CategoryKey]) -> Vec<CategoryKey> {
    domain.iter().cloned().chain(seen).unique().collect()
}

fn zero_filled(
    cells: BTreeMap<Period, HashMap<CategoryKey, (Cell, Reduce)>>,
    categories: &[CategoryKey],
) -> Vec<PeriodValues> {
    cells
        .into_iter()
        .map(|(period, row)| {
            let values = categories
                .iter()
                .map(|k| {
                    let v = row.get(k).map(|(c, r)| c.finish(*r)).unwrap_or(0.0);
                    (k.clone(), v)
                })
                .collect();
            PeriodValues { period, values }
        })
        .collect()
}

/// Group records by period then category, summing values.
///
/// Every category of `domain` (and every category seen in the records) is
/// present in every period's value map, zero where nothing was recorded.
/// `categories` lists the domain in its own order, followed by keys the
/// domain lacks in first-seen order.
/// Records for which `period_fn` or `category_fn` yields `None` are skipped.
pub fn aggregate_by_period<R, P, C, V>(
    records: &[R],
    domain: &[CategoryKey],
    period_fn: P,
    category_fn: C,
    value_fn: V,
) -> AggregatedSeries
where
    P: Fn(&R) -> Option<Period>,
    C: Fn(&R) -> Option<CategoryKey>,
    V: Fn(&R) -> f64,
{
    aggregate_by_period_with(records, domain, period_fn, category_fn, value_fn, Reduce::Sum)
}

/// [`aggregate_by_period`] with an explicit reducer.
pub fn aggregate_by_period_with<R, P, C, V>(
    records: &[R],
    domain: &[CategoryKey],
    period_fn: P,
    category_fn: C,
    value_fn: V,
    reduce: Reduce,
) -> AggregatedSeries
where
    P: Fn(&R) -> Option<Period>,
    C: Fn(&R) -> Option<CategoryKey>,
    V: Fn(&R) -> f64,
{
    let mut cells: BTreeMap<Period, HashMap<CategoryKey, (Cell, Reduce)>> = BTreeMap::new();
    let mut seen = Vec::new();
    let mut seen_set = HashSet::new();

    for record in records {
        let (Some(period), Some(category)) = (period_fn(record), category_fn(record)) else {
            continue;
        };
        if seen_set.insert(category.clone()) {
            seen.push(category.clone());
        }
        cells
            .entry(period)
            .or_default()
            .entry(category)
            .or_insert((Cell::default(), reduce))
            .0
            .push(value_fn(record));
    }

    let categories = merge_category_order(seen, domain);
    let points = zero_filled(cells, &categories);
    debug!(
        records = records.len(),
        periods = points.len(),
        categories = categories.len(),
        "aggregated series"
    );
    AggregatedSeries { categories, points }
}

/// Explode multi-metric records into one category per field.
///
/// Each field carries its own reducer, so additive counts and percentages can
/// share a series without a percentage being summed.
pub fn aggregate_fields<R, P>(
    records: &[R],
    period_fn: P,
    fields: &[MetricField<R>],
) -> AggregatedSeries
where
    P: Fn(&R) -> Option<Period>,
{
    let mut cells: BTreeMap<Period, HashMap<CategoryKey, (Cell, Reduce)>> = BTreeMap::new();
    for record in records {
        let Some(period) = period_fn(record) else {
            continue;
        };
        let row = cells.entry(period).or_default();
        for field in fields {
            if let Some(v) = (field.value)(record) {
                row.entry(field.key.clone())
                    .or_insert((Cell::default(), field.reduce))
                    .0
                    .push(v);
            }
        }
    }

    let categories: Vec<CategoryKey> = fields.iter().map(|f| f.key.clone()).unique().collect();
    let points = zero_filled(cells, &categories);
    debug!(
        records = records.len(),
        periods = points.len(),
        fields = categories.len(),
        "aggregated metric fields"
    );
    AggregatedSeries { categories, points }
}

/// Rank categories by all-time total, descending.
///
/// Ties keep the order of `series.categories` (domain order, then first-seen),
/// so the result is deterministic for a given domain and record order.
pub fn top_n_categories(series: &AggregatedSeries, n: usize) -> Vec<CategoryKey> {
    let mut totals = series.category_totals();
    // Stable sort: equal totals keep category order.
    totals.sort_by(|a, b| b.1.total_cmp(&a.1));
    totals.into_iter().take(n).map(|(k, _)| k).collect()
}

/// Keep only the top `n` categories; the rest are dropped, not merged into an
/// "other" bucket. The dropped volume is logged so the undercount is visible.
pub fn truncate_to_top_n(series: &AggregatedSeries, n: usize) -> AggregatedSeries {
    let keep: BTreeSet<CategoryKey> = top_n_categories(series, n).into_iter().collect();
    if keep.len() == series.categories.len() {
        return series.clone();
    }
    let dropped: Vec<&CategoryKey> = series
        .categories
        .iter()
        .filter(|k| !keep.contains(*k))
        .collect();
    let dropped_total: f64 = dropped.iter().map(|k| series.category_total(k)).sum();
    debug!(
        kept = keep.len(),
        dropped = dropped.len(),
        dropped_total,
        "top-n truncation dropped categories"
    );
    filter_by_categories(series, &keep)
}

/// Periods whose start lies in `[range.start, range.end]` (inclusive).
pub fn filter_by_range(series: &AggregatedSeries, range: &TimeRange) -> AggregatedSeries {
    AggregatedSeries {
        categories: series.categories.clone(),
        points: series
            .points
            .iter()
            .filter(|p| range.contains(p.period.start))
            .cloned()
            .collect(),
    }
}

/// Project every value map onto `visible`. Hidden keys are removed, not zeroed,
/// so domain computations only see visible data.
pub fn filter_by_categories(
    series: &AggregatedSeries,
    visible: &BTreeSet<CategoryKey>,
) -> AggregatedSeries {
    AggregatedSeries {
        categories: series
            .categories
            .iter()
            .filter(|k| visible.contains(*k))
            .cloned()
            .collect(),
        points: series
            .points
            .iter()
            .map(|p| PeriodValues {
                period: p.period,
                values: p
                    .values
                    .iter()
                    .filter(|(k, _)| visible.contains(*k))
                    .map(|(k, v)| (k.clone(), *v))
                    .collect(),
            })
            .collect(),
    }
}

/// Sum each category over all records, ranked descending and optionally
/// truncated to `limit` entries.
///
/// Ties keep `domain` order, then first-seen order for keys outside the
/// domain. Domain keys with no records are not ranked.
pub fn rank_categories<R, C, V>(
    records: &[R],
    domain: &[CategoryKey],
    category_fn: C,
    value_fn: V,
    limit: Option<usize>,
) -> Vec<RankedCategory>
where
    C: Fn(&R) -> Option<CategoryKey>,
    V: Fn(&R) -> f64,
{
    let mut index: HashMap<CategoryKey, usize> = HashMap::new();
    let mut ranked: Vec<(RankedCategory, bool)> = Vec::new();
    for category in domain {
        if !index.contains_key(category) {
            index.insert(category.clone(), ranked.len());
            ranked.push((
                RankedCategory {
                    category: category.clone(),
                    total: 0.0,
                },
                false,
            ));
        }
    }
    for record in records {
        let Some(category) = category_fn(record) else {
            continue;
        };
        let value = value_fn(record);
        match index.get(&category) {
            Some(&i) => {
                ranked[i].0.total += value;
                ranked[i].1 = true;
            }
            None => {
                index.insert(category.clone(), ranked.len());
                ranked.push((
                    RankedCategory {
                        category,
                        total: value,
                    },
                    true,
                ));
            }
        }
    }
    let mut ranked: Vec<RankedCategory> = ranked
        .into_iter()
        .filter_map(|(entry, seen)| seen.then_some(entry))
        .collect();
    ranked.sort_by(|a, b| b.total.total_cmp(&a.total));
    if let Some(n) = limit {
        ranked.truncate(n);
    }
    ranked
}

/// Per-period sum across categories.
pub fn period_totals(series: &AggregatedSeries) -> Vec<(Period, f64)> {
    series.points.iter().map(|p| (p.period, p.total())).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
