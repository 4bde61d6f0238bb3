//! Listener handles and event identifiers
//!
//! A handle is a plain value. It owns nothing inside the bus and is only
//! meaningful to the [`EventBus`](crate::EventBus) that issued it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of one [`EventBus`](crate::EventBus) instance
///
/// Unique for the life of the process, so handles issued by different
/// buses never compare equal even when their event ids coincide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BusId(u64);

impl BusId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bus#{}", self.0)
    }
}

/// Numeric identity of a payload type within one bus
///
/// Assigned lazily in first-use order starting at 0 and used purely as an
/// index into the bus's registry table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(pub(crate) u32);

impl EventId {
    /// Raw numeric value
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event#{}", self.0)
    }
}

/// Token identifying one subscription
///
/// `slot_index` and `generation` name the subscription inside its registry,
/// `event_id` selects the registry and `bus_id` the issuing bus. A handle is valid only while its
/// generation matches the slot's current generation, so a handle stays
/// rejected after its slot has been recycled for a later subscription.
///
/// Two equal handles always name the same subscription (or are both stale).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle {
    bus: BusId,
    slot: u32,
    generation: u32,
    event: EventId,
}

impl ListenerHandle {
    pub(crate) fn new(bus: BusId, slot: u32, generation: u32, event: EventId) -> Self {
        Self {
            bus,
            slot,
            generation,
            event,
        }
    }

    /// Bus that issued this handle
    #[inline]
    pub fn bus_id(&self) -> BusId {
        self.bus
    }

    /// Event type this handle was issued for
    #[inline]
    pub fn event_id(&self) -> EventId {
        self.event
    }

    #[inline]
    pub fn slot_index(&self) -> u32 {
        self.slot
    }

    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/slot {} gen {}",
            self.bus, self.event, self.slot, self.generation
        )
    }
}
