//! The event router: subscriber lookup, ordered dispatch, change
//! detection, and the broadcast seam.
//!
//! The router is the single point through which every event flows. It
//! owns the entity registry and the subscriber indexes, drains the queue
//! tick by tick, snapshots and diffs entity state around every handler
//! invocation, and hands each fully-dispatched event to the broadcast
//! channel and the optional event log.
//!
//! Handler invocations for one event happen in stable registration
//! order, and an event is broadcast only after all of its handlers have
//! run, so observers always see causal order consistent with handler
//! execution.

use std::collections::HashMap;
use std::sync::Arc;

use scarab_events::{names, EntityId, EntityView, Event, EventKind, SimTime};
use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use crate::entity::{HandlerKind, Outbox, SimEntity};
use crate::logger::EventLogger;
use crate::queue::{EventQueue, QueueError};
use crate::registry::{EntityRegistry, RegistrationError};
use crate::snapshot::PropertySnapshot;

/// Errors surfaced by router operations.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// A registration-level failure; the simulation continues.
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    /// A queue invariant violation; fatal for the run.
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// One entry in a subscriber index: which entity, which handler slot.
#[derive(Debug, Clone)]
struct Subscriber {
    entity_id: EntityId,
    handler: String,
}

/// Central event dispatcher.
pub struct EventRouter {
    registry: EntityRegistry,
    queue: Arc<EventQueue>,

    /// User events indexed by event name.
    named: HashMap<String, Vec<Subscriber>>,
    /// Entity lifecycle/change bindings indexed by `(kind, scarab_name)`.
    lifecycle: HashMap<(HandlerKind, String), Vec<Subscriber>>,
    /// Clock-advance subscribers, in registration order.
    time_updated: Vec<Subscriber>,
    /// Shutdown subscribers, in registration order.
    shutdown: Vec<Subscriber>,

    broadcast: broadcast::Sender<Arc<str>>,
    event_log: Option<EventLogger>,

    /// True while `dispatch_due` is draining; registrations that happen
    /// inside handler invocations only become active at the next tick.
    dispatching: bool,
}

impl EventRouter {
    /// Create a router over the given queue and broadcast sender.
    pub fn new(
        queue: Arc<EventQueue>,
        broadcast: broadcast::Sender<Arc<str>>,
        event_log: Option<EventLogger>,
    ) -> Self {
        Self {
            registry: EntityRegistry::new(),
            queue,
            named: HashMap::new(),
            lifecycle: HashMap::new(),
            time_updated: Vec::new(),
            shutdown: Vec::new(),
            broadcast,
            event_log,
            dispatching: false,
        }
    }

    /// Register an entity: validate its bindings, index its handlers,
    /// and synthesize `scarab.entity.created` at the current sim-time.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::Registration`] for unsupported handler
    /// shapes or an id collision, [`RouterError::Queue`] if the created
    /// event cannot be enqueued.
    pub fn register(
        &mut self,
        entity: Box<dyn SimEntity>,
        now: SimTime,
    ) -> Result<EntityId, RouterError> {
        // An entity registered while a tick is being dispatched must not
        // observe events from that tick or earlier.
        let active_from = if self.dispatching {
            now.saturating_add(1)
        } else {
            now
        };

        let id = self.registry.insert(entity, active_from)?;

        let bindings = self
            .registry
            .descriptor(id)
            .map(|d| d.bindings.clone())
            .unwrap_or_default();
        for binding in bindings {
            let subscriber = Subscriber {
                entity_id: id,
                handler: binding.handler,
            };
            match (binding.kind, binding.selector) {
                (HandlerKind::TimeUpdated, _) => self.time_updated.push(subscriber),
                (HandlerKind::Shutdown, _) => self.shutdown.push(subscriber),
                (HandlerKind::NamedEvent, Some(event_name)) => {
                    self.named.entry(event_name).or_default().push(subscriber);
                }
                (kind, Some(entity_name)) => {
                    self.lifecycle
                        .entry((kind, entity_name))
                        .or_default()
                        .push(subscriber);
                }
                // Selector shapes were validated by the registry.
                (_, None) => {}
            }
        }

        if let Some(view) = self.registry.view(id) {
            self.queue.push(Event::entity_created(&view, now))?;
        }
        Ok(id)
    }

    /// Unregister an entity: synthesize `scarab.entity.destroyed` with
    /// its last-known view and drop every subscriber index entry.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::Registration`] for an unknown id,
    /// [`RouterError::Queue`] if the destroyed event cannot be enqueued.
    pub fn unregister(&mut self, id: EntityId, now: SimTime) -> Result<(), RouterError> {
        let view = self.registry.remove(id)?;

        self.named
            .values_mut()
            .for_each(|subs| subs.retain(|s| s.entity_id != id));
        self.lifecycle
            .values_mut()
            .for_each(|subs| subs.retain(|s| s.entity_id != id));
        self.time_updated.retain(|s| s.entity_id != id);
        self.shutdown.retain(|s| s.entity_id != id);

        self.queue.push(Event::entity_destroyed(&view, now))?;
        Ok(())
    }

    /// Enqueue an event at the time it declares.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::SequenceOverflow`] on counter exhaustion.
    pub fn send(&self, event: Event) -> Result<(), QueueError> {
        self.queue.push(event)
    }

    /// Drain and dispatch everything due at or before `now`, including
    /// change events and user events cascading from handler invocations
    /// within the same tick.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] on a queue invariant violation; the caller
    /// must initiate shutdown.
    pub fn dispatch_due(&mut self, now: SimTime) -> Result<(), QueueError> {
        self.dispatching = true;
        let result = self.drain_loop(now);
        self.dispatching = false;
        result
    }

    /// The current public projection of a live entity.
    pub fn entity_view(&self, id: EntityId) -> Option<EntityView> {
        self.registry.view(id)
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.registry.len()
    }

    fn drain_loop(&mut self, now: SimTime) -> Result<(), QueueError> {
        loop {
            let due = self.queue.drain_due(now);
            if due.is_empty() {
                return Ok(());
            }
            for event in due {
                self.dispatch_one(&event, now)?;
            }
        }
    }

    fn dispatch_one(&mut self, event: &Event, now: SimTime) -> Result<(), QueueError> {
        debug!(event = %event.event_name, sim_time = event.sim_time, "dispatching");

        let subscribers = self.subscribers_for(event);
        // Lifecycle events are never delivered to the entity they are
        // about; it already knows.
        let subject = match event.kind() {
            EventKind::EntityLifecycle => event.subject_id(),
            _ => None,
        };

        let mut matched_target = false;
        for subscriber in subscribers {
            if let Some(target) = event.target_id {
                if subscriber.entity_id != target {
                    continue;
                }
                matched_target = true;
            }
            if subject == Some(subscriber.entity_id) {
                continue;
            }
            self.invoke_subscriber(&subscriber, event, now)?;
        }

        if event.target_id.is_some() && !matched_target {
            debug!(
                event = %event.event_name,
                target = ?event.target_id,
                "no subscriber matched target; event not delivered"
            );
        }

        // Observers see the event only after every handler has run.
        self.broadcast_event(event);
        if let Some(logger) = self.event_log.as_mut() {
            logger.log_event(event);
        }
        Ok(())
    }

    fn invoke_subscriber(
        &mut self,
        subscriber: &Subscriber,
        event: &Event,
        now: SimTime,
    ) -> Result<(), QueueError> {
        let (changed, outbox) = {
            let Some(registered) = self.registry.get_mut(subscriber.entity_id) else {
                // Destroyed earlier in this same drain; nothing to do.
                return Ok(());
            };
            if event.sim_time < registered.descriptor.active_from {
                return Ok(());
            }

            let tracked = registered.descriptor.tracked_properties.clone();
            let snapshot = PropertySnapshot::capture(registered.entity.as_ref(), &tracked);
            let mut outbox = Outbox::new(now);

            if let Err(fault) =
                registered
                    .entity
                    .invoke(&subscriber.handler, event, &mut outbox)
            {
                error!(
                    event = %event.event_name,
                    entity = %subscriber.entity_id,
                    handler = %subscriber.handler,
                    %fault,
                    "handler fault; continuing with remaining subscribers"
                );
            }

            // Diff even after a fault: partial mutations are real state
            // and must still be observable.
            let changed = snapshot.diff(registered.entity.as_ref(), &tracked);
            (changed, outbox)
        };

        if !changed.is_empty() {
            if let Some(view) = self.registry.view(subscriber.entity_id) {
                self.queue.push(Event::entity_changed(&view, changed, now))?;
            }
        }

        self.apply_outbox(outbox, now)
    }

    fn apply_outbox(&mut self, outbox: Outbox, now: SimTime) -> Result<(), QueueError> {
        for event in outbox.events {
            self.queue.push(event)?;
        }
        for entity in outbox.spawns {
            match self.register(entity, now) {
                Ok(_) => {}
                Err(RouterError::Registration(err)) => {
                    warn!(%err, "entity spawned from a handler was rejected");
                }
                Err(RouterError::Queue(err)) => return Err(err),
            }
        }
        for id in outbox.destroys {
            match self.unregister(id, now) {
                Ok(()) => {}
                Err(RouterError::Registration(err)) => {
                    warn!(%err, "entity destroy from a handler was rejected");
                }
                Err(RouterError::Queue(err)) => return Err(err),
            }
        }
        Ok(())
    }

    fn subscribers_for(&self, event: &Event) -> Vec<Subscriber> {
        match event.event_name.as_str() {
            names::TIME_UPDATED => self.time_updated.clone(),
            names::SIMULATION_SHUTDOWN => self.shutdown.clone(),
            names::ENTITY_CREATED | names::ENTITY_CHANGED | names::ENTITY_DESTROYED => {
                let kind = match event.event_name.as_str() {
                    names::ENTITY_CREATED => HandlerKind::EntityCreated,
                    names::ENTITY_CHANGED => HandlerKind::EntityChanged,
                    _ => HandlerKind::EntityDestroyed,
                };
                event
                    .subject_name()
                    .and_then(|name| self.lifecycle.get(&(kind, name.to_owned())))
                    .cloned()
                    .unwrap_or_default()
            }
            name => self.named.get(name).cloned().unwrap_or_default(),
        }
    }

    fn broadcast_event(&self, event: &Event) {
        match serde_json::to_string(&event.to_wire()) {
            Ok(text) => {
                // send fails only when no observer is subscribed, which
                // is normal.
                let _ = self.broadcast.send(Arc::from(text));
            }
            Err(err) => warn!(event = %event.event_name, error = %err, "event not serializable"),
        }
    }
}
