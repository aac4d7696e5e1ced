//! In-process selection event bus.
//!
//! Synchronous, single-threaded publish/subscribe. Each subscription belongs
//! to a view; publishing skips every subscription whose view is the event's
//! origin, so a view never re-applies its own change.
//!
//! # Failure isolation
//!
//! A handler that returns an error or panics is logged via `tracing::warn!`
//! and recorded in the [`PublishReport`]; the remaining handlers still run.
//! There is no event history: late subscribers read the current snapshot.

use std::panic::AssertUnwindSafe;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::selection::SelectionEvent;
use crate::views::ViewError;

/// Stable identifier of a mounted view.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewId(String);

impl ViewId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ViewId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ViewId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

#[derive(Error, Debug)]
pub enum HandlerError {
    #[error(transparent)]
    Render(#[from] ViewError),

    #[error("{0}")]
    Failed(String),
}

// ---------------------------------------------------------------------------
// SelectionHandler
// ---------------------------------------------------------------------------

/// Receiver of selection events.
pub trait SelectionHandler {
    fn on_selection_change(&mut self, event: &SelectionEvent) -> Result<(), HandlerError>;
}

/// Adapter that wraps a closure into a [`SelectionHandler`].
struct FnHandler<F>(F);

impl<F> SelectionHandler for FnHandler<F>
where
    F: FnMut(&SelectionEvent) -> Result<(), HandlerError>,
{
    fn on_selection_change(&mut self, event: &SelectionEvent) -> Result<(), HandlerError> {
        (self.0)(event)
    }
}

// ---------------------------------------------------------------------------
// PublishReport
// ---------------------------------------------------------------------------

/// One handler that did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandlerFailure {
    pub view: ViewId,
    pub message: String,
    pub panicked: bool,
}

/// Outcome of one [`EventBus::publish`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    /// Views whose handler completed, in subscription order.
    pub delivered: Vec<ViewId>,
    /// Subscriptions skipped because they belong to the origin view.
    pub suppressed: usize,
    pub failures: Vec<HandlerFailure>,
}

impl PublishReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

struct Subscription {
    id: SubscriptionId,
    view: ViewId,
    handler: Box<dyn SelectionHandler>,
}

#[derive(Default)]
pub struct EventBus {
    subscriptions: Vec<Subscription>,
    next_id: u64,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field(
                "subscriptions",
                &self.subscriptions.iter().map(|s| &s.view).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` on behalf of `view`.
    pub fn subscribe<H>(&mut self, view: ViewId, handler: H) -> SubscriptionId
    where
        H: SelectionHandler + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        debug!(view = %view, subscription = id.0, "subscribed");
        self.subscriptions.push(Subscription {
            id,
            view,
            handler: Box::new(handler),
        });
        id
    }

    /// Register a closure on behalf of `view`.
    pub fn subscribe_fn<F>(&mut self, view: ViewId, f: F) -> SubscriptionId
    where
        F: FnMut(&SelectionEvent) -> Result<(), HandlerError> + 'static,
    {
        self.subscribe(view, FnHandler(f))
    }

    /// Returns `true` if the subscription existed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.id != id);
        self.subscriptions.len() < before
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Deliver `event` to every non-origin subscription, in subscription order.
    pub fn publish(&mut self, event: &SelectionEvent) -> PublishReport {
        let mut report = PublishReport::default();
        for sub in &mut self.subscriptions {
            if sub.view == event.origin {
                report.suppressed += 1;
                continue;
            }
            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
                sub.handler.on_selection_change(event)
            }));
            match outcome {
                Ok(Ok(())) => report.delivered.push(sub.view.clone()),
                Ok(Err(e)) => {
                    warn!(view = %sub.view, origin = %event.origin, error = %e, "selection handler failed");
                    report.failures.push(HandlerFailure {
                        view: sub.view.clone(),
                        message: e.to_string(),
                        panicked: false,
                    });
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    warn!(view = %sub.view, origin = %event.origin, panic = %message, "selection handler panicked");
                    report.failures.push(HandlerFailure {
                        view: sub.view.clone(),
                        message,
                        panicked: true,
                    });
                }
            }
        }
        debug!(
            origin = %event.origin,
            delivered = report.delivered.len(),
            suppressed = report.suppressed,
            failed = report.failures.len(),
            "selection event published"
        );
        report
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
