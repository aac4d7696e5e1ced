//! Scale domains and derived annotations.
//!
//! Every function is total: empty inputs produce `[0, 0]` domains and
//! zero denominators produce `None`, never NaN or Infinity.

use super::types::{AggregatedSeries, Domain, StackedLayer};
use crate::model::{CategoryKey, TimeRange};

/// Default tick count used when rounding an axis.
pub const DEFAULT_TICKS: usize = 10;

/// `[0, max top y1]` across all layers.
pub fn stacked_y_domain(layers: &[StackedLayer]) -> Domain {
    let max = layers
        .iter()
        .flat_map(|l| l.points.iter().map(|p| p.y1))
        .fold(0.0, f64::max);
    Domain::from_zero(max)
}

/// `[0, max individual value]` across the series' categories, skipping any
/// key listed in `exclude` (secondary-axis metrics).
pub fn line_y_domain(series: &AggregatedSeries, exclude: &[CategoryKey]) -> Domain {
    let max = series
        .points
        .iter()
        .flat_map(|p| p.values.iter())
        .filter(|(k, _)| !exclude.contains(k))
        .map(|(_, v)| *v)
        .fold(0.0, f64::max);
    Domain::from_zero(max)
}

/// Tick step for `[start, stop]` split into roughly `count` intervals.
///
/// Positive results are the step itself; negative results encode a fractional
/// step as `-1 / step` so rounding stays exact in decimal.
fn tick_increment(start: f64, stop: f64, count: usize) -> f64 {
    let e10 = 50f64.sqrt();
    let e5 = 10f64.sqrt();
    let e2 = 2f64.sqrt();

    let step = (stop - start) / count.max(1) as f64;
    let power = step.log10().floor();
    let error = step / 10f64.powf(power);
    let factor = if error >= e10 {
        10.0
    } else if error >= e5 {
        5.0
    } else if error >= e2 {
        2.0
    } else {
        1.0
    };
    if power >= 0.0 {
        factor * 10f64.powf(power)
    } else {
        -(10f64.powf(-power)) / factor
    }
}

/// Extend `domain` outward so both bounds land on a round tick step
/// (1, 2 or 5 times a power of ten).
pub fn nice_domain(domain: Domain, ticks: usize) -> Domain {
    let (mut start, mut stop) = (domain.min, domain.max);
    if !(stop > start) || !start.is_finite() || !stop.is_finite() {
        return domain;
    }

    let mut previous: Option<f64> = None;
    for _ in 0..10 {
        let step = tick_increment(start, stop, ticks);
        if previous == Some(step) {
            break;
        }
        if step > 0.0 {
            start = (start / step).floor() * step;
            stop = (stop / step).ceil() * step;
        } else if step < 0.0 {
            start = (start * step).ceil() / step;
            stop = (stop * step).floor() / step;
        } else {
            break;
        }
        previous = Some(step);
    }
    Domain::new(start, stop)
}

/// First and last period start, `None` for an empty series.
pub fn time_extent(series: &AggregatedSeries) -> Option<TimeRange> {
    TimeRange::covering(series.periods().map(|p| p.start))
}

/// `round(last / first)`, the "N× growth" annotation.
pub fn growth_factor(first: f64, last: f64) -> Option<f64> {
    safe_div(last, first).map(f64::round)
}

/// Division returning `None` when the denominator is zero or the result is
/// not finite.
pub fn safe_div(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator == 0.0 {
        return None;
    }
    let q = numerator / denominator;
    q.is_finite().then_some(q)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
