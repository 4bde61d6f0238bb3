//! Publisher utilities and helpers

use crate::bus::EventBus;
use crate::error::BusResult;
use crate::handle::EventId;
use std::marker::PhantomData;

/// Typed publisher bound to one event type
///
/// Resolves the event id once at construction, so each publish goes
/// straight to the registry without a type lookup.
pub struct Publisher<'bus, E> {
    bus: &'bus EventBus,
    event: EventId,
    _payload: PhantomData<fn(E)>,
}

impl<'bus, E: 'static> Publisher<'bus, E> {
    pub(crate) fn new(bus: &'bus EventBus, event: EventId) -> Self {
        Self {
            bus,
            event,
            _payload: PhantomData,
        }
    }

    pub fn event_id(&self) -> EventId {
        self.event
    }

    /// Publish a freshly constructed event
    pub fn publish(&self, event: E) -> BusResult<usize> {
        self.bus.publish_to(self.event, event)
    }

    /// Publish through the bus's reusable payload for `E`
    pub fn publish_in_place<F>(&self, fill: F) -> BusResult<usize>
    where
        E: Default,
        F: FnOnce(&mut E),
    {
        self.bus.publish_in_place_to(self.event, fill)
    }

    /// Live listeners of `E`
    pub fn listener_count(&self) -> usize {
        self.bus.listener_count::<E>()
    }
}

impl<E> Clone for Publisher<'_, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for Publisher<'_, E> {}
