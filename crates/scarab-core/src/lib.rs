//! Scarab simulation kernel: clock, queue, registry, router, and the
//! stepping loop.
//!
//! A user assembles a set of entities -- opaque domain objects
//! implementing [`SimEntity`] -- and runs them inside a [`Simulation`]
//! that advances an integer clock, routes lifecycle and user events to
//! interested handlers, detects property changes around every handler
//! invocation, and streams every dispatched event to observers.
//!
//! # Modules
//!
//! - [`clock`] -- monotonic simulation clock with checked advance.
//! - [`config`] -- typed configuration with YAML loading and validation.
//! - [`control`] -- control commands, run states, and channel endpoints.
//! - [`entity`] -- the [`SimEntity`] trait, handler bindings, and the
//!   per-invocation outbox.
//! - [`logger`] -- optional JSON-lines event log side channel.
//! - [`queue`] -- time-ordered, FIFO-within-a-tick event queue.
//! - [`registry`] -- id assignment, descriptors, and entity views.
//! - [`router`] -- subscriber lookup, ordered dispatch, and change
//!   detection.
//! - [`simulation`] -- the container, the run loop, and the
//!   pause/resume/shutdown state machine.
//! - [`snapshot`] -- pre/post property snapshots and structural diffing.
//!
//! # Concurrency
//!
//! Dispatch is single-threaded and cooperative: exactly one task owns
//! the clock, the queue drain order, the subscriber indexes, and entity
//! state. The control server runs concurrently and communicates only
//! through the bounded channels in [`control::ControlChannels`]; no
//! entity state ever crosses that boundary unserialized.

pub mod clock;
pub mod config;
pub mod control;
pub mod entity;
pub mod logger;
pub mod queue;
pub mod registry;
pub mod router;
pub mod simulation;
pub mod snapshot;

pub use clock::{ClockError, SimClock};
pub use config::{ConfigError, SimulationConfig};
pub use control::{ControlChannels, ControlCommand, RunState};
pub use entity::{HandlerBinding, HandlerFault, HandlerKind, Outbox, SimEntity};
pub use logger::{EventLogConfig, EventLogFilter, EventLogger};
pub use queue::{EventQueue, QueueError};
pub use registry::{EntityDescriptor, EntityRegistry, RegistrationError};
pub use router::{EventRouter, RouterError};
pub use simulation::{EndReason, RunReport, Simulation, SimulationError};
pub use snapshot::PropertySnapshot;
