//! Control commands, run states, and the channel endpoints that couple
//! the simulation to its control server.
//!
//! The dispatch task and the network task communicate exclusively through
//! two bounded channels: commands flow server -> simulation over an mpsc
//! channel, and serialized event frames flow simulation -> server over a
//! broadcast channel. Neither side ever blocks on the other.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

/// Capacity of the command channel (server -> simulation). Commands are
/// drained every step, so the bound is generous.
pub const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Capacity of the broadcast channel (simulation -> server). A client
/// that falls further behind than this is disconnected rather than
/// allowed to slow the simulation down.
pub const BROADCAST_CHANNEL_CAPACITY: usize = 256;

/// A control command submitted by an observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlCommand {
    /// Begin running (meaningful when the run started paused).
    Start,
    /// Pause the stepping loop after the current step.
    Pause,
    /// Resume a paused run.
    Resume,
    /// Initiate a cooperative shutdown at the next dispatch boundary.
    Shutdown,
}

/// The raw client frame: `{"action": "start" | "pause" | "resume" |
/// "shutdown"}`.
#[derive(Debug, Deserialize)]
pub struct ControlFrame {
    /// The requested action.
    pub action: String,
}

impl ControlFrame {
    /// Parse a text frame into a command.
    ///
    /// Returns `None` both for frames that are not the expected JSON
    /// shape and for unrecognized actions; callers log and ignore either
    /// way, per the protocol.
    pub fn parse(text: &str) -> Option<ControlCommand> {
        let frame: Self = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(error) => {
                debug!(%error, "malformed control frame");
                return None;
            }
        };
        match frame.action.as_str() {
            "start" => Some(ControlCommand::Start),
            "pause" => Some(ControlCommand::Pause),
            "resume" => Some(ControlCommand::Resume),
            "shutdown" => Some(ControlCommand::Shutdown),
            other => {
                debug!(action = other, "unrecognized control action");
                None
            }
        }
    }
}

/// The simulation lifecycle state machine:
/// `Ready -> Running <-> Paused -> ShuttingDown -> Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Constructed but not yet run.
    Ready,
    /// Actively stepping.
    Running,
    /// Waiting for a resume, start, or shutdown command.
    Paused,
    /// Shutdown requested; honored at the next dispatch boundary.
    ShuttingDown,
    /// The run loop has exited.
    Terminated,
}

impl RunState {
    /// Whether the run loop has permanently stopped.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated)
    }
}

/// The channel endpoints a control server needs: the broadcast sender for
/// event frames and the command sender back into the simulation.
///
/// Obtained from [`Simulation::channels`](crate::simulation::Simulation::channels)
/// and handed to the server at startup. The server holds only these
/// handles -- it never owns or reads simulation state.
#[derive(Clone)]
pub struct ControlChannels {
    /// Serialized event frames, one JSON object per frame.
    pub events: broadcast::Sender<Arc<str>>,
    /// Control commands flowing back to the simulation.
    pub commands: mpsc::Sender<ControlCommand>,
}
