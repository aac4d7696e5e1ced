//! Invariant checks over aggregated series and stacked layers.
//!
//! Provides deterministic checks for:
//! - **Series shape**: periods strictly ascending, every domain category
//!   present in every period, finite non-negative values.
//! - **Stack geometry**: each segment's height equals its source value and
//!   the top layer reaches the period total.
//!
//! Output is a structured [`ValidationReport`] that serialises to JSON for
//! `iop validate`.

use std::time::Instant;

use serde::Serialize;

use super::types::{AggregatedSeries, StackedLayer};
use crate::model::CategoryKey;

/// Absolute tolerance for floating-point geometry comparisons.
const EPSILON: f64 = 1e-6;

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// Severity level for a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A single validation check result.
#[derive(Debug, Clone, Serialize)]
pub struct Check {
    pub id: String,
    pub ok: bool,
    pub severity: Severity,
    pub details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
}

impl Check {
    /// Passing check when `failures == 0`, otherwise failing at `severity`.
    fn counted(
        id: &str,
        failures: usize,
        checked: usize,
        what: &str,
        severity: Severity,
        action: &str,
    ) -> Self {
        let ok = failures == 0;
        Self {
            id: id.to_string(),
            ok,
            severity: if ok { Severity::Info } else { severity },
            details: format!("{what}: {failures}/{checked} mismatched"),
            suggested_action: (!ok).then(|| action.to_string()),
        }
    }
}

/// Report metadata.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReportMeta {
    pub elapsed_ms: u64,
    pub points_checked: usize,
    pub layers_checked: usize,
}

/// Full validation report.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub checks: Vec<Check>,
    pub _meta: ReportMeta,
}

impl ValidationReport {
    /// True if every check passed.
    pub fn all_ok(&self) -> bool {
        self.checks.iter().all(|c| c.ok)
    }

    /// Count of checks that failed with a given severity.
    pub fn count_failures(&self, sev: Severity) -> usize {
        self.checks
            .iter()
            .filter(|c| !c.ok && c.severity == sev)
            .count()
    }

    /// Append another report's checks, summing metadata.
    pub fn merge(&mut self, other: ValidationReport) {
        self.checks.extend(other.checks);
        self._meta.elapsed_ms += other._meta.elapsed_ms;
        self._meta.points_checked += other._meta.points_checked;
        self._meta.layers_checked += other._meta.layers_checked;
    }

    /// Produce the JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::json!({"error": "serialization failed"}))
    }
}

// ---------------------------------------------------------------------------
// Series checks
// ---------------------------------------------------------------------------

/// Check the shape of one aggregated series against its category domain.
pub fn validate_series(series: &AggregatedSeries, domain: &[CategoryKey]) -> ValidationReport {
    let started = Instant::now();
    let mut checks = Vec::new();

    if series.is_empty() {
        checks.push(Check {
            id: "series.has_data".into(),
            ok: true,
            severity: Severity::Info,
            details: "series is empty; nothing to check".into(),
            suggested_action: None,
        });
        return ValidationReport {
            checks,
            _meta: ReportMeta {
                elapsed_ms: started.elapsed().as_millis() as u64,
                ..Default::default()
            },
        };
    }

    let out_of_order = series
        .points
        .windows(2)
        .filter(|w| w[0].period >= w[1].period)
        .count();
    checks.push(Check::counted(
        "series.periods_ascending",
        out_of_order,
        series.len().saturating_sub(1),
        "adjacent periods out of order or duplicated",
        Severity::Error,
        "Aggregate from the record store instead of concatenating series",
    ));

    let expected: Vec<&CategoryKey> = domain.iter().chain(series.categories.iter()).collect();
    let unfilled = series
        .points
        .iter()
        .filter(|p| expected.iter().any(|k| !p.values.contains_key(*k)))
        .count();
    checks.push(Check::counted(
        "series.domain_zero_filled",
        unfilled,
        series.len(),
        "periods missing a domain category",
        Severity::Error,
        "Pass the dataset's category domain to aggregate_by_period",
    ));

    let values = series.points.iter().flat_map(|p| p.values.values());
    let cells = values.clone().count();
    let non_finite = values.clone().filter(|v| !v.is_finite()).count();
    let negative = values.filter(|v| **v < 0.0).count();
    checks.push(Check::counted(
        "series.values_finite",
        non_finite,
        cells,
        "non-finite values",
        Severity::Error,
        "Reject NaN/Infinity at ingestion",
    ));
    checks.push(Check::counted(
        "series.values_non_negative",
        negative,
        cells,
        "negative values",
        Severity::Warning,
        "Check the source dataset for corrections or refunds",
    ));

    ValidationReport {
        checks,
        _meta: ReportMeta {
            elapsed_ms: started.elapsed().as_millis() as u64,
            points_checked: series.len(),
            layers_checked: 0,
        },
    }
}

// ---------------------------------------------------------------------------
// Layer checks
// ---------------------------------------------------------------------------

/// Check stacked layers against the series they were built from.
pub fn validate_layers(series: &AggregatedSeries, layers: &[StackedLayer]) -> ValidationReport {
    let started = Instant::now();
    let mut checks = Vec::new();

    let misaligned = layers
        .iter()
        .filter(|l| {
            l.points.len() != series.len()
                || l.points.iter().zip(&series.points).any(|(s, p)| s.period != p.period)
        })
        .count();
    checks.push(Check::counted(
        "layers.periods_aligned",
        misaligned,
        layers.len(),
        "layers not aligned with series periods",
        Severity::Error,
        "Re-stack after every filter pass",
    ));

    let mut segments = 0_usize;
    let mut bad_heights = 0_usize;
    for layer in layers {
        for (seg, point) in layer.points.iter().zip(&series.points) {
            segments += 1;
            if (seg.height() - point.get(&layer.category)).abs() > EPSILON {
                bad_heights += 1;
            }
        }
    }
    checks.push(Check::counted(
        "layers.heights_match_values",
        bad_heights,
        segments,
        "segments whose y1 - y0 differs from the value",
        Severity::Error,
        "Re-stack from the filtered series",
    ));

    let stacked: Vec<&CategoryKey> = layers.iter().map(|l| &l.category).collect();
    let mut bad_tops = 0_usize;
    if let Some(top) = layers.last() {
        for (seg, point) in top.points.iter().zip(&series.points) {
            let sum: f64 = stacked.iter().map(|k| point.get(k)).sum();
            if (seg.y1 - sum).abs() > EPSILON {
                bad_tops += 1;
            }
        }
    }
    checks.push(Check::counted(
        "layers.top_equals_period_sum",
        bad_tops,
        series.len(),
        "periods whose top y1 differs from the stacked sum",
        Severity::Error,
        "Re-stack from the filtered series",
    ));

    ValidationReport {
        checks,
        _meta: ReportMeta {
            elapsed_ms: started.elapsed().as_millis() as u64,
            points_checked: series.len(),
            layers_checked: layers.len(),
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
