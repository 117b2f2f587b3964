//! The simulation container and its stepping loop.
//!
//! A `Simulation` owns the clock, the queue, and the router, and drives
//! the `Ready -> Running <-> Paused -> ShuttingDown -> Terminated` state
//! machine. Dispatch is single-threaded and cooperative: the only things
//! running alongside it are the control server's I/O loop and the pacing
//! sleep, coupled through two bounded channels.
//!
//! A step advances the clock, emits `scarab.time.updated`, drains the
//! queue up to the new time (including same-tick cascades), drains
//! pending control commands, and then sleeps out the remainder of the
//! configured step length. Shutdown -- whether from reaching the step
//! count or from a command -- emits `scarab.simulation.shutdown` and
//! drains once more before the loop exits.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use scarab_events::{EntityId, Event, SimTime};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

use crate::clock::{ClockError, SimClock};
use crate::config::{ConfigError, SimulationConfig};
use crate::control::{
    ControlChannels, ControlCommand, RunState, BROADCAST_CHANNEL_CAPACITY,
    COMMAND_CHANNEL_CAPACITY,
};
use crate::entity::SimEntity;
use crate::logger::EventLogger;
use crate::queue::{EventQueue, QueueError};
use crate::registry::RegistrationError;
use crate::router::{EventRouter, RouterError};

/// Errors surfaced by the simulation container.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    /// Invalid configuration; fatal at construction.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A registration-level failure; the simulation continues.
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    /// The clock counter overflowed; fatal.
    #[error(transparent)]
    Clock(#[from] ClockError),

    /// A queue invariant was violated; fatal.
    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl From<RouterError> for SimulationError {
    fn from(error: RouterError) -> Self {
        match error {
            RouterError::Registration(err) => Self::Registration(err),
            RouterError::Queue(err) => Self::Queue(err),
        }
    }
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The configured number of steps completed.
    StepsCompleted,
    /// An observer requested shutdown.
    ShutdownRequested,
}

/// Summary of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Why the run ended.
    pub end_reason: EndReason,
    /// Simulation time when the run terminated.
    pub final_time: SimTime,
    /// Number of steps actually executed.
    pub steps_run: u64,
    /// Wall-clock time the run started.
    pub started_at: DateTime<Utc>,
}

/// The top-level simulation container.
pub struct Simulation {
    config: SimulationConfig,
    clock: SimClock,
    router: EventRouter,
    state: RunState,
    commands_rx: mpsc::Receiver<ControlCommand>,
    commands_tx: mpsc::Sender<ControlCommand>,
    broadcast_tx: broadcast::Sender<Arc<str>>,
}

impl Simulation {
    /// Create a simulation from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration is invalid.
    pub fn new(config: SimulationConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let queue = Arc::new(EventQueue::new());
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_CHANNEL_CAPACITY);
        let event_log = config.event_log.as_ref().map(EventLogger::from_config);
        let router = EventRouter::new(queue, broadcast_tx.clone(), event_log);

        Ok(Self {
            config,
            clock: SimClock::new(),
            router,
            state: RunState::Ready,
            commands_rx,
            commands_tx,
            broadcast_tx,
        })
    }

    /// Register an entity with the simulation.
    ///
    /// The router synthesizes its `scarab.entity.created` event at the
    /// current simulation time.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::Registration`] for unsupported handler
    /// shapes; the simulation remains usable.
    pub fn add_entity(&mut self, entity: Box<dyn SimEntity>) -> Result<EntityId, SimulationError> {
        Ok(self.router.register(entity, self.clock.now())?)
    }

    /// Unregister an entity, synthesizing `scarab.entity.destroyed`.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::Registration`] for an unknown id.
    pub fn destroy_entity(&mut self, id: EntityId) -> Result<(), SimulationError> {
        Ok(self.router.unregister(id, self.clock.now())?)
    }

    /// Enqueue an event at the time it declares.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::Queue`] on a queue invariant violation.
    pub fn send_event(&self, event: Event) -> Result<(), SimulationError> {
        Ok(self.router.send(event)?)
    }

    /// The channel endpoints a control server attaches to.
    pub fn channels(&self) -> ControlChannels {
        ControlChannels {
            events: self.broadcast_tx.clone(),
            commands: self.commands_tx.clone(),
        }
    }

    /// A sender for submitting control commands directly.
    pub fn command_sender(&self) -> mpsc::Sender<ControlCommand> {
        self.commands_tx.clone()
    }

    /// Subscribe to the serialized event broadcast.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<str>> {
        self.broadcast_tx.subscribe()
    }

    /// The current lifecycle state.
    pub const fn state(&self) -> RunState {
        self.state
    }

    /// The current simulation time.
    pub const fn time(&self) -> SimTime {
        self.clock.now()
    }

    /// The current public projection of a live entity.
    pub fn entity_view(&self, id: EntityId) -> Option<scarab_events::EntityView> {
        self.router.entity_view(id)
    }

    /// Run the stepping loop to completion.
    ///
    /// Consumes the simulation; once terminated it cannot be restarted.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError`] on a fatal invariant violation
    /// (queue sequence or clock overflow). Everything else -- handler
    /// faults, slow observers, malformed control frames -- is absorbed.
    pub async fn run(mut self) -> Result<RunReport, SimulationError> {
        let started_at = Utc::now();
        let mut steps_run: u64 = 0;

        self.state = if self.config.start_paused {
            RunState::Paused
        } else {
            RunState::Running
        };

        info!(
            number_steps = self.config.number_steps,
            step_length_secs = self.config.step_length_secs,
            start_paused = self.config.start_paused,
            headless = self.config.headless,
            "simulation starting"
        );

        let end_reason = loop {
            match self.state {
                RunState::Paused => {
                    // Block until an observer wakes us. A command that
                    // does not apply in the paused state is a no-op and
                    // we keep waiting.
                    match self.commands_rx.recv().await {
                        Some(command) => self.apply_command(command),
                        None => self.state = RunState::ShuttingDown,
                    }
                    continue;
                }
                RunState::ShuttingDown => break EndReason::ShutdownRequested,
                _ => {}
            }

            if self.clock.now() >= self.config.number_steps {
                break EndReason::StepsCompleted;
            }

            let step_start = Instant::now();

            let now = self.clock.advance()?;
            self.router.send(Event::time_updated(now, now - 1))?;
            self.router.dispatch_due(now)?;
            steps_run += 1;

            self.drain_commands();

            if !self.config.headless {
                let step_length = self.config.step_length();
                let elapsed = step_start.elapsed();
                if elapsed < step_length {
                    tokio::time::sleep(step_length - elapsed).await;
                }
            }
        };

        // Let every shutdown handler and observer see the end of the run.
        let final_time = self.clock.now();
        self.router.send(Event::shutdown(final_time))?;
        self.router.dispatch_due(final_time)?;
        self.state = RunState::Terminated;

        info!(
            ?end_reason,
            final_time, steps_run, "simulation terminated"
        );

        Ok(RunReport {
            end_reason,
            final_time,
            steps_run,
            started_at,
        })
    }

    /// Apply one control command to the state machine. Transitions that
    /// do not apply in the current state are no-ops.
    fn apply_command(&mut self, command: ControlCommand) {
        match (command, self.state) {
            (ControlCommand::Pause, RunState::Running) => {
                self.state = RunState::Paused;
                info!("simulation paused");
            }
            (ControlCommand::Resume | ControlCommand::Start, RunState::Paused) => {
                self.state = RunState::Running;
                info!("simulation resumed");
            }
            (ControlCommand::Shutdown, RunState::Running | RunState::Paused) => {
                self.state = RunState::ShuttingDown;
                info!("shutdown requested");
            }
            _ => {
                debug!(?command, state = ?self.state, "command ignored in current state");
            }
        }
    }

    /// Drain pending control commands without blocking.
    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands_rx.try_recv() {
            self.apply_command(command);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headless(number_steps: u64) -> SimulationConfig {
        SimulationConfig {
            number_steps,
            headless: true,
            ..SimulationConfig::default()
        }
    }

    fn frame_names(rx: &mut broadcast::Receiver<Arc<str>>) -> Vec<String> {
        let mut names = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            let value: serde_json::Value =
                serde_json::from_str(&frame).unwrap_or(serde_json::Value::Null);
            if let Some(name) = value["event_name"].as_str() {
                names.push(name.to_owned());
            }
        }
        names
    }

    #[tokio::test]
    async fn runs_the_configured_number_of_steps() {
        let sim = Simulation::new(headless(3)).expect("construct");
        let mut rx = sim.subscribe();

        let report = sim.run().await.expect("run");
        assert_eq!(report.end_reason, EndReason::StepsCompleted);
        assert_eq!(report.steps_run, 3);
        assert_eq!(report.final_time, 3);

        let names = frame_names(&mut rx);
        assert_eq!(
            names,
            vec![
                "scarab.time.updated".to_owned(),
                "scarab.time.updated".to_owned(),
                "scarab.time.updated".to_owned(),
                "scarab.simulation.shutdown".to_owned(),
            ]
        );
    }

    #[tokio::test]
    async fn zero_steps_means_shutdown_without_time_updates() {
        let sim = Simulation::new(headless(0)).expect("construct");
        let mut rx = sim.subscribe();

        let report = sim.run().await.expect("run");
        assert_eq!(report.end_reason, EndReason::StepsCompleted);
        assert_eq!(report.steps_run, 0);
        assert_eq!(report.final_time, 0);

        let names = frame_names(&mut rx);
        assert_eq!(names, vec!["scarab.simulation.shutdown".to_owned()]);
    }

    #[tokio::test]
    async fn shutdown_command_ends_the_run_at_the_next_boundary() {
        let sim = Simulation::new(headless(1_000_000)).expect("construct");
        let commands = sim.command_sender();
        commands
            .try_send(ControlCommand::Shutdown)
            .expect("queue command");

        let report = sim.run().await.expect("run");
        assert_eq!(report.end_reason, EndReason::ShutdownRequested);
        // The command is drained after the first step completes.
        assert_eq!(report.steps_run, 1);
    }

    #[tokio::test]
    async fn redundant_commands_are_no_ops() {
        let config = SimulationConfig {
            start_paused: true,
            ..headless(2)
        };
        let sim = Simulation::new(config).expect("construct");
        let commands = sim.command_sender();

        // Pause while paused is a no-op; start then wakes the loop; the
        // stray resume while running is equally harmless.
        commands.try_send(ControlCommand::Pause).expect("send");
        commands.try_send(ControlCommand::Start).expect("send");
        commands.try_send(ControlCommand::Resume).expect("send");

        let report = sim.run().await.expect("run");
        assert_eq!(report.end_reason, EndReason::StepsCompleted);
        assert_eq!(report.steps_run, 2);
    }

    #[tokio::test]
    async fn construction_rejects_invalid_config() {
        let config = SimulationConfig {
            step_length_secs: f64::NAN,
            ..SimulationConfig::default()
        };
        assert!(Simulation::new(config).is_err());
    }
}
