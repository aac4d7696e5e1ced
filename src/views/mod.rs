//! View adapter contract and view-model types.
//!
//! A view adapter is the rendering collaborator: it receives a fully derived
//! [`RenderFrame`] and draws it. Everything numeric (filtering, stacking,
//! domains, markers) is computed on this side of the boundary by a
//! [`ViewPipeline`].

pub mod pipeline;

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analytics::{AggregatedSeries, Domain, Granularity, OrderingPolicy, RankedCategory, StackedLayer};
use crate::bus::ViewId;
use crate::model::{CategoryKey, DatasetId, TimeRange, Timestamp};
use crate::selection::SelectionState;

pub use pipeline::{PipelineStats, ViewPipeline};

#[derive(Error, Debug)]
pub enum ViewError {
    #[error("view '{view}' failed to render: {message}")]
    Render { view: ViewId, message: String },
}

impl ViewError {
    pub fn render(view: &ViewId, message: impl Into<String>) -> Self {
        Self::Render {
            view: view.clone(),
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// ViewSpec
// ---------------------------------------------------------------------------

/// How a view turns its dataset into a series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
    /// Layers in stacked mode, one line per category in line mode.
    #[default]
    Stackable,
    /// Always lines, with optional secondary-axis metrics.
    Lines,
    /// Non-temporal bar ranking.
    Ranking,
    /// One line of per-period totals.
    Totals,
}

impl ViewKind {
    pub fn is_temporal(&self) -> bool {
        !matches!(self, Self::Ranking)
    }
}

impl std::fmt::Display for ViewKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stackable => write!(f, "stackable"),
            Self::Lines => write!(f, "lines"),
            Self::Ranking => write!(f, "ranking"),
            Self::Totals => write!(f, "totals"),
        }
    }
}

/// Static description of one mounted view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewSpec {
    pub id: ViewId,
    pub dataset: DatasetId,
    #[serde(default)]
    pub granularity: Granularity,
    #[serde(default)]
    pub kind: ViewKind,
    /// Keep only the N largest categories (dropped, not merged).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_n: Option<usize>,
    #[serde(default)]
    pub ordering: OrderingPolicy,
    /// Percentage metrics drawn against a fixed 0–100 axis.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secondary_axis: Vec<CategoryKey>,
}

impl ViewSpec {
    pub fn new(id: impl Into<String>, dataset: DatasetId, kind: ViewKind) -> Self {
        Self {
            id: ViewId::new(id),
            dataset,
            granularity: Granularity::default(),
            kind,
            top_n: None,
            ordering: OrderingPolicy::default(),
            secondary_axis: Vec::new(),
        }
    }

    pub fn with_granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = granularity;
        self
    }

    pub fn with_top_n(mut self, n: usize) -> Self {
        self.top_n = Some(n);
        self
    }

    pub fn with_ordering(mut self, ordering: OrderingPolicy) -> Self {
        self.ordering = ordering;
        self
    }

    pub fn with_secondary_axis(mut self, key: impl Into<CategoryKey>) -> Self {
        self.secondary_axis.push(key.into());
        self
    }
}

// ---------------------------------------------------------------------------
// RenderFrame
// ---------------------------------------------------------------------------

/// A dated annotation, e.g. an election day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    pub date: Timestamp,
    pub label: String,
}

/// The drawable payload of a frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViewSeries {
    Stacked { layers: Vec<StackedLayer> },
    Lines { series: AggregatedSeries },
    Ranking { ranking: Vec<RankedCategory> },
}

/// Everything an adapter needs to draw one view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderFrame {
    pub view: ViewId,
    pub series: ViewSeries,
    pub selection: SelectionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x_domain: Option<TimeRange>,
    pub y_domain: Domain,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_domain: Option<Domain>,
    pub markers: Vec<Marker>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub growth: Option<f64>,
}

// ---------------------------------------------------------------------------
// Adapters
// ---------------------------------------------------------------------------

/// Rendering collaborator for one view.
pub trait ViewAdapter {
    fn render(&mut self, frame: &RenderFrame) -> Result<(), ViewError>;
}

/// Keeps the latest frame of every view it renders, shared through a
/// cloneable handle.
#[derive(Debug, Clone, Default)]
pub struct FrameCollector {
    frames: Rc<RefCell<BTreeMap<ViewId, RenderFrame>>>,
}

impl FrameCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self, view: &ViewId) -> Option<RenderFrame> {
        self.frames.borrow().get(view).cloned()
    }

    /// Latest frames ordered by view id.
    pub fn frames(&self) -> Vec<RenderFrame> {
        self.frames.borrow().values().cloned().collect()
    }
}

impl ViewAdapter for FrameCollector {
    fn render(&mut self, frame: &RenderFrame) -> Result<(), ViewError> {
        self.frames
            .borrow_mut()
            .insert(frame.view.clone(), frame.clone());
        Ok(())
    }
}
