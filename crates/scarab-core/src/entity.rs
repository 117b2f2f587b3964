//! The entity trait, handler bindings, and the per-invocation outbox.
//!
//! Handler discovery is an explicit registration step: an entity declares
//! its interests once through [`SimEntity::bindings`], and the router
//! dispatches back into it through [`SimEntity::invoke`] with the bound
//! handler name. This replaces runtime reflection with a stable,
//! inspectable contract.

use scarab_events::{Event, PropertyMap, SimTime};

/// The kinds of lifecycle and event interests a handler can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    /// An entity with a matching `scarab_name` was registered.
    EntityCreated,
    /// Tracked properties of a matching entity changed.
    EntityChanged,
    /// A matching entity was unregistered.
    EntityDestroyed,
    /// The simulation clock advanced.
    TimeUpdated,
    /// The simulation is shutting down.
    Shutdown,
    /// A user event with a specific name was dispatched.
    NamedEvent,
}

impl HandlerKind {
    /// Whether bindings of this kind require a selector.
    ///
    /// Entity-kind bindings select by `scarab_name`; named-event bindings
    /// select by event name. Time and shutdown bindings take none.
    pub const fn requires_selector(&self) -> bool {
        !matches!(self, Self::TimeUpdated | Self::Shutdown)
    }
}

/// One declared handler: a kind, an optional selector, and the name of
/// the handler slot [`SimEntity::invoke`] dispatches on.
///
/// A single entity may carry multiple bindings of the same kind for
/// different selectors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerBinding {
    /// What family of events the handler is interested in.
    pub kind: HandlerKind,
    /// Entity-name selector for entity-kind bindings; event-name selector
    /// for named-event bindings; `None` for time/shutdown bindings.
    pub selector: Option<String>,
    /// Handler slot name passed back to [`SimEntity::invoke`].
    pub handler: String,
}

impl HandlerBinding {
    /// React to registrations of entities named `entity_name`.
    pub fn entity_created(entity_name: impl Into<String>, handler: impl Into<String>) -> Self {
        Self {
            kind: HandlerKind::EntityCreated,
            selector: Some(entity_name.into()),
            handler: handler.into(),
        }
    }

    /// React to property changes of entities named `entity_name`.
    pub fn entity_changed(entity_name: impl Into<String>, handler: impl Into<String>) -> Self {
        Self {
            kind: HandlerKind::EntityChanged,
            selector: Some(entity_name.into()),
            handler: handler.into(),
        }
    }

    /// React to destruction of entities named `entity_name`.
    pub fn entity_destroyed(entity_name: impl Into<String>, handler: impl Into<String>) -> Self {
        Self {
            kind: HandlerKind::EntityDestroyed,
            selector: Some(entity_name.into()),
            handler: handler.into(),
        }
    }

    /// React to every clock advance.
    pub fn time_updated(handler: impl Into<String>) -> Self {
        Self {
            kind: HandlerKind::TimeUpdated,
            selector: None,
            handler: handler.into(),
        }
    }

    /// React to simulation shutdown.
    pub fn shutdown(handler: impl Into<String>) -> Self {
        Self {
            kind: HandlerKind::Shutdown,
            selector: None,
            handler: handler.into(),
        }
    }

    /// React to user events named `event_name`.
    pub fn named_event(event_name: impl Into<String>, handler: impl Into<String>) -> Self {
        Self {
            kind: HandlerKind::NamedEvent,
            selector: Some(event_name.into()),
            handler: handler.into(),
        }
    }
}

/// Failure raised by user code inside a handler.
///
/// Faults are logged with the event name and entity id; routing continues
/// with the remaining subscribers and the tick is never aborted.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct HandlerFault {
    /// Human-readable description of what went wrong.
    pub message: String,
}

impl HandlerFault {
    /// Create a fault with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for HandlerFault {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for HandlerFault {
    fn from(message: &str) -> Self {
        Self {
            message: message.to_owned(),
        }
    }
}

/// Side effects collected during a single handler invocation.
///
/// Handlers never touch the queue or the registry directly; they record
/// intentions here and the router applies them after the handler returns.
pub struct Outbox {
    now: SimTime,
    pub(crate) events: Vec<Event>,
    pub(crate) spawns: Vec<Box<dyn SimEntity>>,
    pub(crate) destroys: Vec<scarab_events::EntityId>,
}

impl Outbox {
    /// Create an outbox for an invocation happening at `now`.
    pub fn new(now: SimTime) -> Self {
        Self {
            now,
            events: Vec::new(),
            spawns: Vec::new(),
            destroys: Vec::new(),
        }
    }

    /// The simulation time of the invocation.
    pub const fn now(&self) -> SimTime {
        self.now
    }

    /// Enqueue an event at the time it declares. Events stamped with the
    /// current time are delivered before the clock advances again.
    pub fn send(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Enqueue a user event for the current tick.
    pub fn emit(&mut self, event_name: impl Into<String>, payload: PropertyMap) {
        self.events
            .push(Event::named(event_name, self.now).with_payload(payload));
    }

    /// Register a new entity after this handler returns.
    pub fn spawn(&mut self, entity: Box<dyn SimEntity>) {
        self.spawns.push(entity);
    }

    /// Unregister an entity after this handler returns.
    pub fn destroy(&mut self, id: scarab_events::EntityId) {
        self.destroys.push(id);
    }

    /// Whether the invocation recorded any side effects.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.spawns.is_empty() && self.destroys.is_empty()
    }
}

/// A user-supplied stateful simulation object.
///
/// Entities expose their identity tag, a projection of their public
/// properties, their declared handler bindings, and a single dispatch
/// entry point. The kernel owns the boxed entity for its whole lifetime;
/// no handler ever runs concurrently with another.
pub trait SimEntity: Send {
    /// Domain-level name tag shared by all entities of this kind.
    fn scarab_name(&self) -> &str;

    /// Optional interface-like grouping tag.
    fn conforms_to(&self) -> Option<&str> {
        None
    }

    /// The entity's public, data-valued properties.
    ///
    /// Names beginning with an underscore are treated as private and
    /// excluded from views and change tracking.
    fn properties(&self) -> PropertyMap;

    /// The handler bindings this entity declares. Read once at
    /// registration; later changes have no effect.
    fn bindings(&self) -> Vec<HandlerBinding> {
        Vec::new()
    }

    /// Invoke the handler slot named in a binding.
    ///
    /// # Errors
    ///
    /// Returns a [`HandlerFault`] when the handler fails; the router logs
    /// the fault and continues with the remaining subscribers. An unknown
    /// slot name is also a fault.
    fn invoke(
        &mut self,
        handler: &str,
        event: &Event,
        outbox: &mut Outbox,
    ) -> Result<(), HandlerFault> {
        let _ = (event, outbox);
        Err(HandlerFault::new(format!("unknown handler slot: {handler}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Counter {
        count: i64,
    }

    impl SimEntity for Counter {
        fn scarab_name(&self) -> &str {
            "counter"
        }

        fn properties(&self) -> PropertyMap {
            let mut props = PropertyMap::new();
            props.insert("count".to_owned(), json!(self.count));
            props
        }

        fn bindings(&self) -> Vec<HandlerBinding> {
            vec![HandlerBinding::time_updated("on_time")]
        }

        fn invoke(
            &mut self,
            handler: &str,
            _event: &Event,
            outbox: &mut Outbox,
        ) -> Result<(), HandlerFault> {
            match handler {
                "on_time" => {
                    self.count += 1;
                    outbox.emit("counter.ticked", PropertyMap::new());
                    Ok(())
                }
                other => Err(HandlerFault::new(format!("unknown handler slot: {other}"))),
            }
        }
    }

    #[test]
    fn selector_requirements_by_kind() {
        assert!(HandlerKind::EntityCreated.requires_selector());
        assert!(HandlerKind::NamedEvent.requires_selector());
        assert!(!HandlerKind::TimeUpdated.requires_selector());
        assert!(!HandlerKind::Shutdown.requires_selector());
    }

    #[test]
    fn invoke_dispatches_on_slot_name() {
        let mut entity = Counter { count: 0 };
        let event = Event::time_updated(1, 0);
        let mut outbox = Outbox::new(1);

        assert!(entity.invoke("on_time", &event, &mut outbox).is_ok());
        assert_eq!(entity.count, 1);
        assert_eq!(outbox.events.len(), 1);
        assert_eq!(outbox.events[0].event_name, "counter.ticked");
        assert_eq!(outbox.events[0].sim_time, 1);
    }

    #[test]
    fn unknown_slot_is_a_fault() {
        let mut entity = Counter { count: 0 };
        let event = Event::time_updated(1, 0);
        let mut outbox = Outbox::new(1);

        let result = entity.invoke("nope", &event, &mut outbox);
        assert!(result.is_err());
        assert!(outbox.is_empty());
    }
}
