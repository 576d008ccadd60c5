//! Fire-and-forget dispatch seam used by the worker.

use std::sync::Arc;

use tracing::debug;

use crate::bus::EventBus;
use crate::event::JobEvent;

/// Notifies observers of job lifecycle events.
///
/// Dispatch never fails from the caller's point of view.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, event: JobEvent);
}

impl<D> Dispatcher for Arc<D>
where
    D: Dispatcher + ?Sized,
{
    fn dispatch(&self, event: JobEvent) {
        (**self).dispatch(event)
    }
}

/// Publishes every event on an [`EventBus`], dropping publish errors.
#[derive(Debug)]
pub struct BusDispatcher<B> {
    bus: B,
}

impl<B> BusDispatcher<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<B> Dispatcher for BusDispatcher<B>
where
    B: EventBus<JobEvent>,
{
    fn dispatch(&self, event: JobEvent) {
        let event_id = event.event_id();
        if let Err(err) = self.bus.publish(event) {
            debug!(%event_id, error = ?err, "job event publish failed");
        }
    }
}

/// Discards every event.
#[derive(Debug, Default, Copy, Clone)]
pub struct NullDispatcher;

impl Dispatcher for NullDispatcher {
    fn dispatch(&self, _event: JobEvent) {}
}
