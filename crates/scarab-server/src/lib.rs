//! `WebSocket` control server for the Scarab simulation kernel.
//!
//! A single endpoint (`GET /`, default `localhost:1234`) serves both
//! directions of the control protocol:
//!
//! - **Server -> client**: every event the router dispatches, serialized
//!   once on the dispatch task and fanned out as one JSON text frame per
//!   event, in dispatch order.
//! - **Client -> server**: control frames
//!   `{"action":"start"|"pause"|"resume"|"shutdown"}` forwarded to the
//!   simulation over a bounded command channel. Malformed frames and
//!   unknown actions are logged and ignored.
//!
//! The server holds only channel endpoints ([`AppState`]); it never
//! reads or writes simulation state. Clients that cannot keep up with
//! the broadcast are disconnected so that dispatch is never blocked by
//! a slow observer.
//!
//! # Wiring
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use scarab_core::{Simulation, SimulationConfig};
//! use scarab_server::{spawn_control_server, AppState, ServerConfig};
//!
//! let sim = Simulation::new(SimulationConfig::default())?;
//! let state = Arc::new(AppState::new(sim.channels()));
//! let (addr, server) = spawn_control_server(&ServerConfig::default(), state).await?;
//! let report = sim.run().await?;
//! ```

pub mod server;
pub mod state;
pub mod ws;

pub use server::{build_router, spawn_control_server, start_server, ServerConfig, ServerError};
pub use state::AppState;
