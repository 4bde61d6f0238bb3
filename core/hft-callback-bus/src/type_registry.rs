//! Payload type to event id binding

use crate::handle::EventId;
use std::any::{type_name, TypeId};
use std::collections::HashMap;

/// Assigns each distinct payload type a stable [`EventId`]
///
/// Ids are handed out on first reference, in first-use order starting at 0,
/// and are never removed for the lifetime of the registry.
#[derive(Debug, Default)]
pub(crate) struct TypeRegistry {
    ids: HashMap<TypeId, EventId>,
    /// Type names indexed by event id
    names: Vec<&'static str>,
}

impl TypeRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Id of `E` if it was registered before
    #[inline]
    pub(crate) fn lookup<E: 'static>(&self) -> Option<EventId> {
        self.ids.get(&TypeId::of::<E>()).copied()
    }

    /// Id of `E`, registering it on first use
    pub(crate) fn id_for<E: 'static>(&mut self) -> EventId {
        let names = &mut self.names;
        *self.ids.entry(TypeId::of::<E>()).or_insert_with(|| {
            assert!(names.len() < u32::MAX as usize, "event id space exhausted");
            names.push(type_name::<E>());
            EventId((names.len() - 1) as u32)
        })
    }

    pub(crate) fn name(&self, id: EventId) -> Option<&'static str> {
        self.names.get(id.index()).copied()
    }

    pub(crate) fn len(&self) -> usize {
        self.names.len()
    }
}
