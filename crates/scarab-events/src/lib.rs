//! Event records, entity views, and typed identifiers for the Scarab
//! simulation kernel.
//!
//! Everything that crosses a boundary in Scarab -- handler invocation,
//! the event queue, the broadcast stream to observers -- is expressed in
//! the types defined here:
//!
//! - [`EntityId`] -- UUID-backed identifier assigned to every registered
//!   entity, never reused or rewritten.
//! - [`Event`] -- a named record with a simulation-time stamp, an
//!   optional target entity, and a structured payload.
//! - [`EntityView`] -- the JSON-serializable public projection of an
//!   entity carried inside lifecycle events.
//!
//! The reserved system event names live in [`event::names`] and must be
//! used verbatim on the wire; any other event name denotes a user event.

pub mod event;
pub mod ids;
pub mod view;

pub use event::{names, Event, EventKind, SimTime};
pub use ids::EntityId;
pub use view::{EntityView, PropertyMap};
