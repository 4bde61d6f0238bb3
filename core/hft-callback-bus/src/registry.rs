//! Per-type subscription registry
//!
//! One [`SubscriptionRegistry`] exists per payload type. It owns the dense
//! callback array that dispatch walks, plus a [`SlotTable`] mapping listener
//! handles to dense positions. The two arrays move in lockstep: every
//! `swap_remove` the slot table reports is mirrored on the callbacks.
//!
//! ## Dispatch policy
//!
//! A publish copies the live `(slot, generation)` keys into a reusable
//! scratch buffer before the first callback runs, then visits them in
//! order. A key is invoked only if it is still live when its turn comes:
//!
//! - listeners live at publish start are called exactly once, even when a
//!   callback removes itself or a neighbour (swap-remove reorders the dense
//!   array, never the snapshot);
//! - a listener removed earlier in the same pass is not called;
//! - a listener added during the pass waits for the next publish.
//!
//! While no listener has been removed since the snapshot, the dense array
//! still lines up with it and callbacks are read by position.
//!
//! No `RefCell` borrow is held while a callback runs, so callbacks may
//! freely subscribe, unsubscribe and publish on the same bus.

use crate::config::BusConfig;
use crate::error::{BusError, BusResult};
use crate::handle::{BusId, EventId, ListenerHandle};
use crate::slot_table::SlotTable;
use serde::Serialize;
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use tracing::{trace, warn};

/// Stored listener callback
pub(crate) type Callback<E> = Rc<dyn Fn(&E)>;

/// Per-type counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EventStats {
    /// Publish calls that reached the registry
    pub published: u64,
    /// Callback invocations
    pub delivered: u64,
    /// Currently live listeners
    pub listeners: usize,
    /// Unsubscribe calls rejected with a stale handle
    pub stale_unsubscribes: u64,
}

pub(crate) struct SubscriptionRegistry<E> {
    bus: BusId,
    event: EventId,
    name: &'static str,

    /// Dense, gap-free; parallel to the slot table's back-references
    callbacks: Vec<Callback<E>>,
    slots: SlotTable,

    /// Bumped on every removal; a pass compares it against its snapshot
    removals: u64,

    /// Snapshot buffer, taken out while a pass runs
    scratch: Vec<(u32, u32)>,

    /// Reusable payload for in-place publishing
    payload: Option<E>,
    in_place_active: bool,

    /// Nested publishes of this type currently running
    depth: usize,

    stats: EventStats,
}

impl<E> SubscriptionRegistry<E> {
    pub(crate) fn new(bus: BusId, event: EventId, name: &'static str, capacity: usize) -> Self {
        Self {
            bus,
            event,
            name,
            callbacks: Vec::with_capacity(capacity),
            slots: SlotTable::with_capacity(capacity),
            removals: 0,
            scratch: Vec::with_capacity(capacity),
            payload: None,
            in_place_active: false,
            depth: 0,
            stats: EventStats::default(),
        }
    }

    /// Register a callback; O(1) amortized, no existing handle is affected
    pub(crate) fn add(&mut self, callback: Callback<E>) -> ListenerHandle {
        let (slot, generation) = self.slots.insert();
        self.callbacks.push(callback);
        debug_assert_eq!(self.callbacks.len(), self.slots.len());

        trace!("Listener added to {} (slot {}, gen {})", self.name, slot, generation);
        ListenerHandle::new(self.bus, slot, generation, self.event)
    }

    /// Remove a callback by handle; O(1)
    ///
    /// The removed callback is handed back so the caller can drop it after
    /// releasing any borrow of the registry.
    pub(crate) fn remove(&mut self, handle: ListenerHandle) -> BusResult<Callback<E>> {
        let dense = if self.issued(handle) {
            self.slots.remove(handle.slot_index(), handle.generation())
        } else {
            None
        };

        match dense {
            Some(dense) => {
                self.removals += 1;
                let callback = self.callbacks.swap_remove(dense);
                debug_assert_eq!(self.callbacks.len(), self.slots.len());
                trace!("Listener removed from {} ({})", self.name, handle);
                Ok(callback)
            }
            None => {
                self.stats.stale_unsubscribes += 1;
                warn!("Rejected stale handle {} for {}", handle, self.name);
                Err(BusError::StaleHandle { handle })
            }
        }
    }

    pub(crate) fn contains(&self, handle: ListenerHandle) -> bool {
        self.issued(handle) && self.slots.contains(handle.slot_index(), handle.generation())
    }

    #[inline]
    fn issued(&self, handle: ListenerHandle) -> bool {
        handle.bus_id() == self.bus && handle.event_id() == self.event
    }

    /// Callback for a snapshotted key, if that listener is still live
    ///
    /// `position` is the key's index in a snapshot taken when the removal
    /// counter read `removals`.
    #[inline]
    pub(crate) fn callback(
        &self,
        position: usize,
        (slot, generation): (u32, u32),
        removals: u64,
    ) -> Option<Callback<E>> {
        let dense = if removals == self.removals {
            debug_assert_eq!(self.slots.dense_index(slot, generation), Some(position));
            position
        } else {
            self.slots.dense_index(slot, generation)?
        };
        Some(Rc::clone(&self.callbacks[dense]))
    }

    /// Remove every listener; all outstanding handles become stale
    pub(crate) fn clear(&mut self) -> Vec<Callback<E>> {
        if !self.callbacks.is_empty() {
            self.removals += 1;
        }
        self.slots.clear();
        std::mem::take(&mut self.callbacks)
    }

    /// Clear listeners and counters
    pub(crate) fn reset(&mut self) -> Vec<Callback<E>> {
        self.stats = EventStats::default();
        if !self.in_place_active {
            self.payload = None;
        }
        self.clear()
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub(crate) fn stats(&self) -> EventStats {
        EventStats {
            listeners: self.len(),
            ..self.stats
        }
    }

    /// Enter a dispatch pass and snapshot the live keys.
    ///
    /// Fails without side effects when the nesting rules forbid this pass.
    fn begin_dispatch(&mut self, config: &BusConfig, in_place: bool) -> BusResult<Vec<(u32, u32)>> {
        let nested_rejected = self.depth > 0 && !config.allow_nested_publish;
        if (in_place && self.in_place_active)
            || nested_rejected
            || self.depth >= config.max_dispatch_depth
        {
            warn!(
                "Rejected re-entrant publish of {} at depth {}",
                self.name, self.depth
            );
            return Err(BusError::ReentrancyViolation {
                event: self.name,
                depth: self.depth,
            });
        }

        self.depth += 1;
        self.in_place_active |= in_place;
        self.stats.published += 1;

        // Nested passes find the buffer taken and get a fresh one.
        let mut keys = std::mem::take(&mut self.scratch);
        keys.extend(self.slots.keys());
        Ok(keys)
    }

    fn end_dispatch(&mut self, mut keys: Vec<(u32, u32)>, delivered: u64, in_place: bool) {
        self.depth -= 1;
        if in_place {
            self.in_place_active = false;
        }
        self.stats.delivered += delivered;

        keys.clear();
        if keys.capacity() > self.scratch.capacity() {
            self.scratch = keys;
        }
    }

    fn take_payload(&mut self) -> E
    where
        E: Default,
    {
        self.payload.take().unwrap_or_default()
    }

    fn store_payload(&mut self, payload: E) {
        self.payload = Some(payload);
    }
}

impl<E> fmt::Debug for SubscriptionRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("event", &self.event)
            .field("name", &self.name)
            .field("listeners", &self.callbacks.len())
            .field("slots", &self.slots.slot_count())
            .field("free_slots", &self.slots.free_count())
            .field("retired_slots", &self.slots.retired_count())
            .field("depth", &self.depth)
            .field("stats", &self.stats)
            .finish()
    }
}

/// One running publish of a single event type
///
/// Dropping the pass (normally or while a callback unwinds) restores the
/// registry's depth and in-place flags, so the bus stays usable.
pub(crate) struct Dispatch<E> {
    registry: Rc<RefCell<SubscriptionRegistry<E>>>,
    keys: Vec<(u32, u32)>,
    removals: u64,
    delivered: u64,
    in_place: bool,
}

impl<E> Dispatch<E> {
    pub(crate) fn begin(
        registry: Rc<RefCell<SubscriptionRegistry<E>>>,
        config: &BusConfig,
        in_place: bool,
    ) -> BusResult<Self> {
        let keys = registry.borrow_mut().begin_dispatch(config, in_place)?;
        let removals = registry.borrow().removals;
        Ok(Self {
            registry,
            keys,
            removals,
            delivered: 0,
            in_place,
        })
    }

    /// Invoke every snapshotted listener that is still live
    pub(crate) fn run(&mut self, event: &E) -> usize {
        for (position, &key) in self.keys.iter().enumerate() {
            let callback = self.registry.borrow().callback(position, key, self.removals);
            if let Some(callback) = callback {
                callback(event);
                self.delivered += 1;
            }
        }
        self.delivered as usize
    }

    /// Move the reusable payload out for the duration of the pass
    pub(crate) fn take_payload(&self) -> E
    where
        E: Default,
    {
        self.registry.borrow_mut().take_payload()
    }

    pub(crate) fn store_payload(&self, payload: E) {
        self.registry.borrow_mut().store_payload(payload);
    }
}

impl<E> Drop for Dispatch<E> {
    fn drop(&mut self) {
        let keys = std::mem::take(&mut self.keys);
        let registry = self.registry.try_borrow_mut();
        debug_assert!(registry.is_ok(), "registry borrowed while its dispatch pass ends");
        match registry {
            Ok(mut registry) => registry.end_dispatch(keys, self.delivered, self.in_place),
            Err(_) => warn!("Dispatch pass ended while its registry was borrowed"),
        }
    }
}

/// Type-erased view of a registry, used where the payload type is unknown
pub(crate) trait ErasedRegistry {
    fn event_name(&self) -> &'static str;

    fn remove(&self, handle: ListenerHandle) -> BusResult<()>;

    fn contains(&self, handle: ListenerHandle) -> bool;

    fn listener_count(&self) -> usize;

    fn stats(&self) -> EventStats;

    /// Drop every listener, returning how many were removed
    fn clear(&self) -> usize;

    /// Drop every listener and zero the counters
    fn reset(&self) -> usize;

    fn into_any(self: Rc<Self>) -> Rc<dyn Any>;
}

impl<E: 'static> ErasedRegistry for RefCell<SubscriptionRegistry<E>> {
    fn event_name(&self) -> &'static str {
        self.borrow().name
    }

    fn remove(&self, handle: ListenerHandle) -> BusResult<()> {
        // Borrow ends with the statement; the callback (and whatever it
        // captured) is dropped outside of it.
        let removed = self.borrow_mut().remove(handle)?;
        drop(removed);
        Ok(())
    }

    fn contains(&self, handle: ListenerHandle) -> bool {
        self.borrow().contains(handle)
    }

    fn listener_count(&self) -> usize {
        self.borrow().len()
    }

    fn stats(&self) -> EventStats {
        self.borrow().stats()
    }

    fn clear(&self) -> usize {
        let removed = self.borrow_mut().clear();
        removed.len()
    }

    fn reset(&self) -> usize {
        let removed = self.borrow_mut().reset();
        removed.len()
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}
