//! The selection state machine.
//!
//! One composite state `(time_range, visible_categories, mode)` owned by the
//! session. Transitions are the only write path; each applied transition
//! yields a [`SelectionChange`] carrying just the fields that changed, and a
//! transition that changes nothing yields `None`.

use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::bus::ViewId;
use crate::model::{CategoryKey, InvalidRange, TimeRange, Timestamp};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    #[error(transparent)]
    InvalidRange(#[from] InvalidRange),

    #[error("invalid chart mode '{0}' (expected 'stacked' or 'line')")]
    InvalidMode(String),
}

// ---------------------------------------------------------------------------
// ChartMode
// ---------------------------------------------------------------------------

/// How stackable views draw their categories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartMode {
    #[default]
    Stacked,
    Line,
}

impl std::fmt::Display for ChartMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stacked => write!(f, "stacked"),
            Self::Line => write!(f, "line"),
        }
    }
}

impl FromStr for ChartMode {
    type Err = SelectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stacked" => Ok(Self::Stacked),
            "line" => Ok(Self::Line),
            _ => Err(SelectionError::InvalidMode(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// State and changes
// ---------------------------------------------------------------------------

/// Snapshot of the shared selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SelectionState {
    /// `None` shows every period.
    pub time_range: Option<TimeRange>,
    pub visible_categories: BTreeSet<CategoryKey>,
    pub mode: ChartMode,
}

impl SelectionState {
    /// Fold a change into this copy.
    pub fn merge(&mut self, change: &SelectionChange) {
        if let Some(range) = change.time_range {
            self.time_range = range;
        }
        if let Some(visible) = &change.visible_categories {
            self.visible_categories = visible.clone();
        }
        if let Some(mode) = change.mode {
            self.mode = mode;
        }
    }

    pub fn is_visible(&self, key: &CategoryKey) -> bool {
        self.visible_categories.contains(key)
    }
}

/// Diff between two selection states. Absent fields did not change.
///
/// `time_range: Some(None)` means the range was cleared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SelectionChange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_range: Option<Option<TimeRange>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visible_categories: Option<BTreeSet<CategoryKey>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<ChartMode>,
}

impl SelectionChange {
    /// Fields of `next` that differ from `prev`.
    pub fn between(prev: &SelectionState, next: &SelectionState) -> Self {
        Self {
            time_range: (prev.time_range != next.time_range).then_some(next.time_range),
            visible_categories: (prev.visible_categories != next.visible_categories)
                .then(|| next.visible_categories.clone()),
            mode: (prev.mode != next.mode).then_some(next.mode),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.time_range.is_none() && self.visible_categories.is_none() && self.mode.is_none()
    }

    /// Whether the data a view shows (not just its layout) must be refiltered.
    pub fn affects_data(&self) -> bool {
        self.time_range.is_some() || self.visible_categories.is_some()
    }
}

/// A change broadcast on the bus, tagged with the view that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectionEvent {
    pub origin: ViewId,
    pub change: SelectionChange,
}

/// A user gesture, as reported by a view adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionIntent {
    SetTimeRange { start: Timestamp, end: Timestamp },
    ClearTimeRange,
    ToggleCategory(CategoryKey),
    SetMode(ChartMode),
    Reset,
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Owner of the live selection and its initial value.
#[derive(Debug, Clone)]
pub struct Selection {
    state: SelectionState,
    initial: SelectionState,
}

impl Selection {
    /// Start from the full extent with every category visible, stacked.
    pub fn new(
        full_extent: Option<TimeRange>,
        categories: impl IntoIterator<Item = CategoryKey>,
    ) -> Self {
        let initial = SelectionState {
            time_range: full_extent,
            visible_categories: categories.into_iter().collect(),
            mode: ChartMode::Stacked,
        };
        Self {
            state: initial.clone(),
            initial,
        }
    }

    /// Owned copy of the current state.
    pub fn snapshot(&self) -> SelectionState {
        self.state.clone()
    }

    pub fn initial(&self) -> &SelectionState {
        &self.initial
    }

    /// Apply `next` and report what changed.
    fn transition(&mut self, next: SelectionState, label: &'static str) -> Option<SelectionChange> {
        let change = SelectionChange::between(&self.state, &next);
        if change.is_empty() {
            debug!(transition = label, "selection unchanged");
            return None;
        }
        self.state = next;
        debug!(transition = label, change = ?change, "selection changed");
        Some(change)
    }

    pub fn set_time_range(
        &mut self,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Option<SelectionChange>, SelectionError> {
        let range = TimeRange::new(start, end)?;
        let next = SelectionState {
            time_range: Some(range),
            ..self.state.clone()
        };
        Ok(self.transition(next, "set_time_range"))
    }

    pub fn clear_time_range(&mut self) -> Option<SelectionChange> {
        let next = SelectionState {
            time_range: None,
            ..self.state.clone()
        };
        self.transition(next, "clear_time_range")
    }

    /// Hide the key if visible, show it otherwise. Hiding the last key is
    /// legal and leaves an empty set.
    pub fn toggle_category(&mut self, key: &CategoryKey) -> Option<SelectionChange> {
        let mut next = self.state.clone();
        if !next.visible_categories.remove(key) {
            next.visible_categories.insert(key.clone());
        }
        self.transition(next, "toggle_category")
    }

    pub fn set_mode(&mut self, mode: ChartMode) -> Option<SelectionChange> {
        let next = SelectionState {
            mode,
            ..self.state.clone()
        };
        self.transition(next, "set_mode")
    }

    pub fn reset(&mut self) -> Option<SelectionChange> {
        self.transition(self.initial.clone(), "reset")
    }

    /// Dispatch an intent to its transition.
    pub fn apply(&mut self, intent: &SelectionIntent) -> Result<Option<SelectionChange>, SelectionError> {
        match intent {
            SelectionIntent::SetTimeRange { start, end } => self.set_time_range(*start, *end),
            SelectionIntent::ClearTimeRange => Ok(self.clear_time_range()),
            SelectionIntent::ToggleCategory(key) => Ok(self.toggle_category(key)),
            SelectionIntent::SetMode(mode) => Ok(self.set_mode(*mode)),
            SelectionIntent::Reset => Ok(self.reset()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
