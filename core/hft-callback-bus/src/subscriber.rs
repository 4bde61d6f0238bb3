//! Scoped subscriptions

use crate::bus::EventBus;
use crate::error::BusResult;
use crate::handle::ListenerHandle;
use tracing::debug;

/// Listener registration that is removed when dropped
///
/// Created by [`EventBus::subscribe_scoped`]. Useful for components whose
/// interest in an event type ends with their own lifetime.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription<'bus> {
    bus: &'bus EventBus,
    handle: ListenerHandle,
    armed: bool,
}

impl<'bus> Subscription<'bus> {
    pub(crate) fn new(bus: &'bus EventBus, handle: ListenerHandle) -> Self {
        Self {
            bus,
            handle,
            armed: true,
        }
    }

    /// Handle of the underlying listener
    pub fn handle(&self) -> ListenerHandle {
        self.handle
    }

    /// Whether the listener is still registered
    pub fn is_active(&self) -> bool {
        self.bus.is_subscribed(self.handle)
    }

    /// Unsubscribe now and report the outcome
    pub fn unsubscribe(mut self) -> BusResult<()> {
        self.armed = false;
        self.bus.unsubscribe(self.handle)
    }

    /// Keep the listener registered and return its plain handle
    pub fn forget(mut self) -> ListenerHandle {
        self.armed = false;
        self.handle
    }
}

impl Drop for Subscription<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        // Already removed elsewhere (unsubscribe, unsubscribe_all, reset).
        if let Err(e) = self.bus.unsubscribe(self.handle) {
            debug!("Scoped subscription {} was already released: {}", self.handle, e);
        }
    }
}
