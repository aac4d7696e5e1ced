//! Cumulative stacking of an aggregated series into layers.

use std::collections::HashSet;

use itertools::Itertools;

use super::types::{AggregatedSeries, OrderingPolicy, StackPoint, StackedLayer};
use crate::model::CategoryKey;

/// Resolve the bottom-to-top layer order.
///
/// Keys in `category_order` come first (duplicates ignored); series
/// categories missing from it follow in the series' own order.
pub fn layer_order(
    series: &AggregatedSeries,
    category_order: &[CategoryKey],
    policy: OrderingPolicy,
) -> Vec<CategoryKey> {
    let known: HashSet<&CategoryKey> = series.categories.iter().collect();
    let mut order: Vec<CategoryKey> = category_order
        .iter()
        .filter(|k| known.contains(k))
        .chain(series.categories.iter())
        .unique()
        .cloned()
        .collect();

    if policy == OrderingPolicy::DescendingByTotal {
        let mut keyed: Vec<(CategoryKey, f64)> = order
            .into_iter()
            .map(|k| {
                let total = series.category_total(&k);
                (k, total)
            })
            .collect();
        keyed.sort_by(|a, b| b.1.total_cmp(&a.1));
        order = keyed.into_iter().map(|(k, _)| k).collect();
    }
    order
}

/// Stack `series` into one layer per category, bottom layer first.
///
/// For each period, a layer's `y0` is the running sum of the layers below it
/// and `y1 - y0` is its own value (0 where the period has no entry). The top
/// layer's `y1` therefore equals the period total of the stacked keys.
pub fn stack(
    series: &AggregatedSeries,
    category_order: &[CategoryKey],
    policy: OrderingPolicy,
) -> Vec<StackedLayer> {
    let order = layer_order(series, category_order, policy);
    let mut layers: Vec<StackedLayer> = order
        .into_iter()
        .map(|category| StackedLayer {
            category,
            points: Vec::with_capacity(series.len()),
        })
        .collect();

    for point in &series.points {
        let mut base = 0.0;
        for layer in &mut layers {
            let value = point.get(&layer.category);
            layer.points.push(StackPoint {
                period: point.period,
                y0: base,
                y1: base + value,
            });
            base += value;
        }
    }
    layers
}
