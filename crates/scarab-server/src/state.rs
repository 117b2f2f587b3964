//! Shared state for the control server.
//!
//! [`AppState`] holds nothing but the two channel endpoints obtained
//! from the simulation: the broadcast sender whose frames are fanned out
//! to every connected client, and the command sender that carries
//! observer actions back to the stepping loop. The server never owns or
//! parses simulation state; it is a pure transport.

use std::sync::Arc;

use scarab_core::{ControlChannels, ControlCommand};
use tokio::sync::{broadcast, mpsc};
use tracing::warn;

/// Shared application state, injected via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    events: broadcast::Sender<Arc<str>>,
    commands: mpsc::Sender<ControlCommand>,
}

impl AppState {
    /// Build the state from the simulation's channel endpoints.
    pub fn new(channels: ControlChannels) -> Self {
        Self {
            events: channels.events,
            commands: channels.commands,
        }
    }

    /// Subscribe to the event frame broadcast.
    ///
    /// A receiver that falls behind the channel capacity is lagged, and
    /// the connection holding it is disconnected rather than allowed to
    /// slow the simulation down.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<str>> {
        self.events.subscribe()
    }

    /// Forward a control command to the simulation without blocking.
    ///
    /// The command channel is bounded and drained every step; if it is
    /// somehow full the command is dropped with a warning rather than
    /// stalling the connection task.
    pub fn submit_command(&self, command: ControlCommand) {
        if let Err(err) = self.commands.try_send(command) {
            warn!(?command, error = %err, "control command dropped");
        }
    }
}
