//! Core event bus implementation
//!
//! [`EventBus`] owns one subscription registry per payload type and routes
//! every call to the registry selected by the payload's [`EventId`]. All
//! operations take `&self` and run synchronously on the calling thread, so
//! a callback may subscribe, unsubscribe or publish on the bus that is
//! currently dispatching to it. See the [`registry`](crate::registry)
//! module for the exact dispatch policy.

use crate::config::BusConfig;
use crate::error::{BusError, BusResult};
use crate::handle::{BusId, EventId, ListenerHandle};
use crate::publisher::Publisher;
use crate::registry::{Callback, Dispatch, ErasedRegistry, EventStats, SubscriptionRegistry};
use crate::subscriber::Subscription;
use crate::type_registry::TypeRegistry;
use std::any::type_name;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, trace, warn};

type TypedRegistry<E> = Rc<RefCell<SubscriptionRegistry<E>>>;

/// Synchronous, single-threaded publish/subscribe bus
///
/// `EventBus` is an explicit value: construct one, pass it (or an `Rc` of
/// it) to the components that need it, drop it when done. It is neither
/// `Send` nor `Sync`.
pub struct EventBus {
    id: BusId,
    config: BusConfig,

    /// Payload type to event id binding
    types: RefCell<TypeRegistry>,

    /// Registries indexed by event id
    registries: RefCell<Vec<Rc<dyn ErasedRegistry>>>,
}

impl EventBus {
    /// Create a bus with default configuration
    pub fn new() -> Self {
        Self::build(BusConfig::default())
    }

    /// Create a bus with validated configuration
    pub fn with_config(config: BusConfig) -> BusResult<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: BusConfig) -> Self {
        Self {
            id: BusId::next(),
            config,
            types: RefCell::new(TypeRegistry::new()),
            registries: RefCell::new(Vec::new()),
        }
    }

    /// Identity stamped into every handle this bus issues
    pub fn id(&self) -> BusId {
        self.id
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Id of payload type `E`, creating its registry on first use
    pub fn register<E: 'static>(&self) -> EventId {
        let existing = self.types.borrow().lookup::<E>();
        if let Some(id) = existing {
            return id;
        }

        let name = type_name::<E>();
        let id = self.types.borrow_mut().id_for::<E>();
        let registry = SubscriptionRegistry::<E>::new(
            self.id,
            id,
            name,
            self.config.initial_listener_capacity,
        );

        let mut registries = self.registries.borrow_mut();
        debug_assert_eq!(registries.len(), id.index());
        registries.push(Rc::new(RefCell::new(registry)));

        debug!("Registered event type {} as {}", name, id);
        id
    }

    /// Id of `E` if it has been registered; never registers
    pub fn event_id<E: 'static>(&self) -> Option<EventId> {
        self.types.borrow().lookup::<E>()
    }

    /// Type name recorded for an event id
    pub fn event_name(&self, id: EventId) -> Option<&'static str> {
        self.types.borrow().name(id)
    }

    /// Number of payload types registered so far
    pub fn event_type_count(&self) -> usize {
        self.types.borrow().len()
    }

    /// Typed publisher for `E` that skips the per-call type lookup
    pub fn publisher<E: 'static>(&self) -> Publisher<'_, E> {
        Publisher::new(self, self.register::<E>())
    }

    /// Register `callback` for every published `E`
    pub fn subscribe<E, F>(&self, callback: F) -> ListenerHandle
    where
        E: 'static,
        F: Fn(&E) + 'static,
    {
        let id = self.register::<E>();
        let callback: Callback<E> = Rc::new(callback);
        self.typed::<E>(id).borrow_mut().add(callback)
    }

    /// Register a method bound to `receiver`
    ///
    /// Only a weak reference is kept: once the receiver is dropped the
    /// listener does nothing until it is unsubscribed.
    pub fn subscribe_bound<E, R>(&self, receiver: &Rc<R>, method: fn(&R, &E)) -> ListenerHandle
    where
        E: 'static,
        R: 'static,
    {
        let receiver = Rc::downgrade(receiver);
        self.subscribe(move |event: &E| match receiver.upgrade() {
            Some(receiver) => method(&receiver, event),
            None => trace!("Skipping {} listener bound to a dropped receiver", type_name::<E>()),
        })
    }

    /// Register a `&mut self` method bound to `receiver`
    ///
    /// If the receiver is already borrowed when the event arrives (for
    /// example because the publish originates from inside that receiver)
    /// the call is skipped with a warning instead of panicking.
    pub fn subscribe_bound_mut<E, R>(
        &self,
        receiver: &Rc<RefCell<R>>,
        method: fn(&mut R, &E),
    ) -> ListenerHandle
    where
        E: 'static,
        R: 'static,
    {
        let receiver = Rc::downgrade(receiver);
        self.subscribe(move |event: &E| {
            let Some(receiver) = receiver.upgrade() else {
                trace!("Skipping {} listener bound to a dropped receiver", type_name::<E>());
                return;
            };
            match receiver.try_borrow_mut() {
                Ok(mut receiver) => method(&mut receiver, event),
                Err(_) => warn!(
                    "Skipping {} listener, receiver {} is already borrowed",
                    type_name::<E>(),
                    type_name::<R>()
                ),
            };
        })
    }

    /// Register `callback` for as long as the returned guard lives
    pub fn subscribe_scoped<E, F>(&self, callback: F) -> Subscription<'_>
    where
        E: 'static,
        F: Fn(&E) + 'static,
    {
        Subscription::new(self, self.subscribe(callback))
    }

    /// Remove a listener
    ///
    /// Fails with [`BusError::StaleHandle`] if the handle was already
    /// removed (or its slot recycled), and with [`BusError::UnknownEvent`]
    /// if this bus never issued handles for its event id.
    pub fn unsubscribe(&self, handle: ListenerHandle) -> BusResult<()> {
        if handle.bus_id() != self.id {
            warn!("Rejected handle {} issued by another bus", handle);
            return Err(BusError::UnknownEvent(handle.event_id()));
        }
        match self.erased(handle.event_id()) {
            Some(registry) => registry.remove(handle),
            None => {
                warn!("Rejected handle {} for an unknown event type", handle);
                Err(BusError::UnknownEvent(handle.event_id()))
            }
        }
    }

    /// Whether `handle` still names a live listener
    pub fn is_subscribed(&self, handle: ListenerHandle) -> bool {
        handle.bus_id() == self.id
            && self
                .erased(handle.event_id())
                .is_some_and(|registry| registry.contains(handle))
    }

    /// Remove every listener of `E`, returning how many were removed
    pub fn unsubscribe_all<E: 'static>(&self) -> usize {
        match self.event_id::<E>().and_then(|id| self.erased(id)) {
            Some(registry) => registry.clear(),
            None => 0,
        }
    }

    /// Live listeners of `E`
    pub fn listener_count<E: 'static>(&self) -> usize {
        self.event_id::<E>()
            .and_then(|id| self.erased(id))
            .map(|registry| registry.listener_count())
            .unwrap_or(0)
    }

    /// Publish a freshly constructed event
    ///
    /// Every listener of `E` runs before this returns, each receiving a
    /// reference to the same `event`. Returns the number of callbacks run.
    /// Publishing a type nobody subscribed to is a no-op.
    pub fn publish<E: 'static>(&self, event: E) -> BusResult<usize> {
        match self.event_id::<E>() {
            Some(id) => self.publish_to(id, event),
            None => {
                trace!("No listeners registered for {}", type_name::<E>());
                Ok(0)
            }
        }
    }

    /// Publish through the per-type reusable payload
    ///
    /// `fill` overwrites the payload kept by the bus for `E` (created with
    /// `E::default()` on first use), then every listener receives a
    /// reference to it. No payload is allocated per publish. The payload is
    /// not re-entrant: an in-place publish of `E` from a listener currently
    /// handling an in-place `E` fails with
    /// [`BusError::ReentrancyViolation`].
    pub fn publish_in_place<E, F>(&self, fill: F) -> BusResult<usize>
    where
        E: Default + 'static,
        F: FnOnce(&mut E),
    {
        match self.event_id::<E>() {
            Some(id) => self.publish_in_place_to(id, fill),
            None => {
                trace!("No listeners registered for {}", type_name::<E>());
                Ok(0)
            }
        }
    }

    pub(crate) fn publish_to<E: 'static>(&self, id: EventId, event: E) -> BusResult<usize> {
        let mut pass = Dispatch::begin(self.typed::<E>(id), &self.config, false)?;
        let delivered = pass.run(&event);

        trace!("Published {} to {} listeners", type_name::<E>(), delivered);
        Ok(delivered)
    }

    pub(crate) fn publish_in_place_to<E, F>(&self, id: EventId, fill: F) -> BusResult<usize>
    where
        E: Default + 'static,
        F: FnOnce(&mut E),
    {
        let mut pass = Dispatch::begin(self.typed::<E>(id), &self.config, true)?;

        let mut payload = pass.take_payload();
        fill(&mut payload);
        let delivered = pass.run(&payload);
        pass.store_payload(payload);

        trace!("Published {} in place to {} listeners", type_name::<E>(), delivered);
        Ok(delivered)
    }

    /// Statistics for `E`, if it has been registered
    pub fn stats<E: 'static>(&self) -> Option<EventStats> {
        self.event_id::<E>()
            .and_then(|id| self.erased(id))
            .map(|registry| registry.stats())
    }

    /// Statistics for every registered type, in event id order
    pub fn get_stats(&self) -> Vec<(&'static str, EventStats)> {
        self.registries
            .borrow()
            .iter()
            .map(|registry| (registry.event_name(), registry.stats()))
            .collect()
    }

    /// Publish calls across all types
    pub fn total_published(&self) -> u64 {
        self.registries
            .borrow()
            .iter()
            .map(|registry| registry.stats().published)
            .sum()
    }

    /// Remove every listener and zero all statistics
    ///
    /// Event ids stay assigned and every outstanding handle becomes stale.
    /// Returns the number of listeners removed.
    pub fn reset(&self) -> usize {
        let registries: Vec<_> = self.registries.borrow().clone();
        let removed = registries.iter().map(|registry| registry.reset()).sum();

        debug!("Bus reset, {} listeners removed", removed);
        removed
    }

    /// Registry for `id`, cloned out so no borrow of the table is held
    fn erased(&self, id: EventId) -> Option<Rc<dyn ErasedRegistry>> {
        self.registries.borrow().get(id.index()).cloned()
    }

    /// Typed registry for an id this bus assigned to `E`
    fn typed<E: 'static>(&self, id: EventId) -> TypedRegistry<E> {
        let erased = Rc::clone(&self.registries.borrow()[id.index()]);
        erased
            .into_any()
            .downcast::<RefCell<SubscriptionRegistry<E>>>()
            .expect("Type mismatch in listener registry")
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners: usize = self
            .registries
            .borrow()
            .iter()
            .map(|registry| registry.listener_count())
            .sum();
        f.debug_struct("EventBus")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("event_types", &self.event_type_count())
            .field("listeners", &listeners)
            .finish()
    }
}
