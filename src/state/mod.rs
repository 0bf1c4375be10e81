//! In-memory mirror of the panel's state (zones, partitions, outputs,
//! system health) and the event-to-property translation that keeps it
//! current.

pub mod events;
pub mod store;

pub use events::{EventProcessor, EventTargetKind, ProcessedEvent, RawEvent};
pub use store::{Element, ElementKind, PropertyChange, PropertyValue, StateStore};
