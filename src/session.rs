//! Session orchestration: loads datasets, owns the selection, mounts views
//! and routes user selection changes through the bus.
//!
//! Everything here is single-threaded. Mutating calls take `&mut Session`, so
//! a new transition cannot start while the previous broadcast is running.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use futures::future::try_join_all;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::bus::{EventBus, HandlerError, HandlerFailure, PublishReport, SubscriptionId, ViewId};
use crate::config::EngineConfig;
use crate::selection::{
    Selection, SelectionChange, SelectionError, SelectionEvent, SelectionIntent, SelectionState,
};
use crate::store::{DatasetLoad, RecordStore, StoreError};
use crate::views::{Marker, PipelineStats, RenderFrame, ViewAdapter, ViewError, ViewPipeline, ViewSpec};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    View(#[from] ViewError),

    #[error("view '{0}' is already mounted")]
    DuplicateView(ViewId),

    #[error("view '{0}' is not mounted")]
    UnknownView(ViewId),
}

/// A view's pipeline together with the adapter that draws it.
struct MountedView {
    pipeline: ViewPipeline,
    adapter: Box<dyn ViewAdapter>,
}

impl MountedView {
    fn sync(&mut self, change: &SelectionChange) -> Result<(), ViewError> {
        let frame = self.pipeline.apply(change);
        self.adapter.render(frame)
    }
}

struct ViewEntry {
    view: Rc<RefCell<MountedView>>,
    subscription: SubscriptionId,
}

/// Result of one user-originated selection change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    /// `None` when the transition changed nothing (no event was published).
    pub change: Option<SelectionChange>,
    /// Delivery to the non-origin views.
    pub report: PublishReport,
    /// Whether the origin view re-derived and rendered successfully.
    pub origin_rendered: bool,
}

pub struct Session {
    store: RecordStore,
    selection: Selection,
    bus: EventBus,
    views: BTreeMap<ViewId, ViewEntry>,
    markers: Vec<Marker>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("selection", &self.selection)
            .field("views", &self.views.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Session {
    /// Resolve every dataset load, then build the store and the initial
    /// selection (full extent, every category visible, stacked).
    pub async fn init<I>(config: &EngineConfig, loads: I) -> Result<Self, SessionError>
    where
        I: IntoIterator<Item = DatasetLoad>,
    {
        let loaded = try_join_all(loads).await?;
        let store = RecordStore::from_datasets(loaded)?;
        Ok(Self::from_store(store, config.markers.clone()))
    }

    /// Session over an already populated store.
    pub fn from_store(store: RecordStore, markers: Vec<Marker>) -> Self {
        let selection = Selection::new(store.full_extent(), store.all_categories());
        info!(
            datasets = store.loaded().count(),
            categories = selection.initial().visible_categories.len(),
            extent = ?selection.initial().time_range,
            "session ready"
        );
        Self {
            store,
            selection,
            bus: EventBus::new(),
            views: BTreeMap::new(),
            markers,
        }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Owned copy of the current selection.
    pub fn snapshot(&self) -> SelectionState {
        self.selection.snapshot()
    }

    pub fn view_ids(&self) -> impl Iterator<Item = &ViewId> {
        self.views.keys()
    }

    /// Derive the view from the current snapshot, render it, then subscribe
    /// it to later changes.
    pub fn mount_view<A>(&mut self, spec: ViewSpec, adapter: A) -> Result<(), SessionError>
    where
        A: ViewAdapter + 'static,
    {
        if self.views.contains_key(&spec.id) {
            return Err(SessionError::DuplicateView(spec.id));
        }
        let id = spec.id.clone();
        let pipeline = ViewPipeline::new(spec, &self.store, self.selection.snapshot(), &self.markers)?;
        let mut adapter: Box<dyn ViewAdapter> = Box::new(adapter);
        adapter.render(pipeline.frame())?;

        let view = Rc::new(RefCell::new(MountedView { pipeline, adapter }));
        let handle = Rc::clone(&view);
        let subscription = self.bus.subscribe_fn(id.clone(), move |event: &SelectionEvent| {
            handle
                .borrow_mut()
                .sync(&event.change)
                .map_err(HandlerError::from)
        });
        debug!(view = %id, "view mounted");
        self.views.insert(id, ViewEntry { view, subscription });
        Ok(())
    }

    pub fn unmount_view(&mut self, id: &ViewId) -> Result<(), SessionError> {
        let entry = self
            .views
            .remove(id)
            .ok_or_else(|| SessionError::UnknownView(id.clone()))?;
        self.bus.unsubscribe(entry.subscription);
        debug!(view = %id, "view unmounted");
        Ok(())
    }

    /// Apply one transition on behalf of `origin`.
    ///
    /// Non-origin views receive the change through the bus; the origin view
    /// then re-derives its own output. An origin that is not a mounted view
    /// (a URL, the CLI) reaches every view. Transition errors leave the
    /// selection and all views untouched.
    pub fn on_user_selection_change(
        &mut self,
        origin: &ViewId,
        intent: SelectionIntent,
    ) -> Result<SyncOutcome, SessionError> {
        let Some(change) = self.selection.apply(&intent)? else {
            return Ok(SyncOutcome::default());
        };

        let event = SelectionEvent {
            origin: origin.clone(),
            change,
        };
        let mut report = self.bus.publish(&event);

        let mut origin_rendered = false;
        if let Some(entry) = self.views.get(origin) {
            match entry.view.borrow_mut().sync(&event.change) {
                Ok(()) => origin_rendered = true,
                Err(e) => {
                    warn!(view = %origin, error = %e, "origin view failed to re-render");
                    report.failures.push(HandlerFailure {
                        view: origin.clone(),
                        message: e.to_string(),
                        panicked: false,
                    });
                }
            }
        }

        Ok(SyncOutcome {
            change: Some(event.change),
            report,
            origin_rendered,
        })
    }

    /// Restore the initial selection on behalf of `origin`.
    pub fn reset(&mut self, origin: &ViewId) -> Result<SyncOutcome, SessionError> {
        self.on_user_selection_change(origin, SelectionIntent::Reset)
    }

    /// Latest frame derived for a view.
    pub fn frame(&self, id: &ViewId) -> Result<RenderFrame, SessionError> {
        let entry = self
            .views
            .get(id)
            .ok_or_else(|| SessionError::UnknownView(id.clone()))?;
        let frame = entry.view.borrow().pipeline.frame().clone();
        Ok(frame)
    }

    pub fn stats(&self, id: &ViewId) -> Result<PipelineStats, SessionError> {
        let entry = self
            .views
            .get(id)
            .ok_or_else(|| SessionError::UnknownView(id.clone()))?;
        let stats = entry.view.borrow().pipeline.stats();
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DatasetId;
    use crate::selection::ChartMode;
    use crate::store::{DatasetBundle, parse_bundle};
    use crate::views::{FrameCollector, ViewKind};
    use futures::FutureExt;
    use futures::executor::block_on;

    fn bundle() -> DatasetBundle {
        parse_bundle(
            r#"{
                "ads": [{"date": "2020-01-06", "party": "Democratic", "spend": 10}],
                "removals": [{"date": "2019-12-31", "reason": "Spam", "total": 4}]
            }"#,
        )
        .unwrap()
    }

    fn session() -> Session {
        block_on(Session::init(&EngineConfig::default(), bundle().into_loads())).unwrap()
    }

    #[test]
    fn init_waits_for_every_load() {
        let s = session();
        assert!(s.store().is_loaded(DatasetId::Ads));
        assert!(s.snapshot().time_range.is_some());
    }

    #[test]
    fn failed_load_fails_init() {
        let failing: DatasetLoad = futures::future::ready(Err(StoreError::Load {
            dataset: DatasetId::Removals,
            message: "connection reset".into(),
        }))
        .boxed_local();
        let mut loads = bundle().into_loads();
        loads.push(failing);
        let err = block_on(Session::init(&EngineConfig::default(), loads)).unwrap_err();
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn duplicate_mount_rejected() {
        let mut s = session();
        let spec = ViewSpec::new("ads", DatasetId::Ads, ViewKind::Stackable);
        s.mount_view(spec.clone(), FrameCollector::new()).unwrap();
        assert!(matches!(
            s.mount_view(spec, FrameCollector::new()),
            Err(SessionError::DuplicateView(_))
        ));
    }

    #[test]
    fn mount_renders_current_snapshot() {
        let mut s = session();
        s.on_user_selection_change(&ViewId::from("cli"), SelectionIntent::SetMode(ChartMode::Line))
            .unwrap();
        let sink = FrameCollector::new();
        s.mount_view(
            ViewSpec::new("ads", DatasetId::Ads, ViewKind::Stackable),
            sink.clone(),
        )
        .unwrap();
        let frame = sink.latest(&ViewId::from("ads")).unwrap();
        assert_eq!(frame.selection.mode, ChartMode::Line);
    }

    #[test]
    fn no_op_intent_publishes_nothing() {
        let mut s = session();
        s.mount_view(
            ViewSpec::new("ads", DatasetId::Ads, ViewKind::Stackable),
            FrameCollector::new(),
        )
        .unwrap();
        let outcome = s
            .on_user_selection_change(&ViewId::from("ads"), SelectionIntent::Reset)
            .unwrap();
        assert!(outcome.change.is_none());
        assert_eq!(s.stats(&ViewId::from("ads")).unwrap().layout_passes, 1);
    }

    #[test]
    fn unmount_and_unknown_view() {
        let mut s = session();
        let id = ViewId::from("ads");
        s.mount_view(
            ViewSpec::new("ads", DatasetId::Ads, ViewKind::Stackable),
            FrameCollector::new(),
        )
        .unwrap();
        s.unmount_view(&id).unwrap();
        assert!(matches!(s.frame(&id), Err(SessionError::UnknownView(_))));
        assert!(matches!(s.unmount_view(&id), Err(SessionError::UnknownView(_))));
    }
}
