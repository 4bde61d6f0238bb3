//! Error types for the callback bus

use crate::handle::{EventId, ListenerHandle};
use thiserror::Error;

/// Errors reported by bus operations
///
/// All of them are local to the failing call. Nothing is raised across a
/// dispatch loop and nothing is retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// Handle was already removed, or its slot has since been recycled
    #[error("stale listener handle {handle}")]
    StaleHandle { handle: ListenerHandle },

    /// Handle was issued by another bus, or names an event type this bus
    /// never registered
    #[error("{0} is not registered on this bus")]
    UnknownEvent(EventId),

    /// Nested publish of a type that is already being dispatched
    #[error("re-entrant publish of {event} rejected at dispatch depth {depth}")]
    ReentrancyViolation { event: &'static str, depth: usize },

    /// Configuration could not be parsed or failed validation
    #[error("invalid bus configuration: {0}")]
    Config(String),
}

impl BusError {
    /// Whether the error only means "nothing left to remove"
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::StaleHandle { .. } | Self::UnknownEvent(_))
    }
}

/// Result alias used across the crate
pub type BusResult<T> = Result<T, BusError>;
