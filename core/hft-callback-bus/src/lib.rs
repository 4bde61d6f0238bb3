//! # HFT Callback Bus
//!
//! Synchronous, in-process publish/subscribe for single-threaded components.
//!
//! ## Features
//!
//! - **Type Safety**: one registry per payload type, no unchecked downcasts
//! - **Generational Handles**: O(1) unsubscribe; stale or recycled handles are
//!   rejected, never silently accepted
//! - **Dense Dispatch**: listeners live in a gap-free array walked in order
//! - **Re-entrancy**: callbacks may subscribe, unsubscribe and publish
//!   while being dispatched to
//! - **In-place Payloads**: optional per-type reusable payload, no
//!   allocation per publish
//!
//! ## Example
//!
//! ```rust
//! use hft_callback_bus::EventBus;
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! struct Tick {
//!     price: f64,
//! }
//!
//! let bus = EventBus::new();
//! let last = Rc::new(Cell::new(0.0));
//!
//! let sink = Rc::clone(&last);
//! let handle = bus.subscribe(move |tick: &Tick| sink.set(tick.price));
//!
//! assert_eq!(bus.publish(Tick { price: 6000.25 }).unwrap(), 1);
//! assert_eq!(last.get(), 6000.25);
//!
//! bus.unsubscribe(handle).unwrap();
//! assert!(bus.unsubscribe(handle).is_err());
//! assert_eq!(bus.publish(Tick { price: 1.0 }).unwrap(), 0);
//! ```

pub mod bus;
pub mod config;
pub mod error;
pub mod handle;
pub mod publisher;
pub mod registry;
pub mod subscriber;

mod slot_table;
mod type_registry;

// Re-exports
pub use bus::EventBus;
pub use config::BusConfig;
pub use error::{BusError, BusResult};
pub use handle::{BusId, EventId, ListenerHandle};
pub use publisher::Publisher;
pub use registry::EventStats;
pub use subscriber::Subscription;
