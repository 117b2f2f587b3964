//! The event record and the reserved system event names.
//!
//! Events are tagged records: a name, a simulation-time stamp, an
//! optional target entity id, and an opaque payload of JSON-native
//! values. The five system names in [`names`] are reserved and appear
//! verbatim on the wire; every other name denotes a user event.

use serde_json::{Map, Value};

use crate::ids::EntityId;
use crate::view::EntityView;

/// Simulation time: a non-negative integer tick counter, monotonically
/// non-decreasing inside a run.
pub type SimTime = u64;

/// Reserved system event names, used verbatim on the wire.
pub mod names {
    /// The clock advanced. Payload carries `previous_time`.
    pub const TIME_UPDATED: &str = "scarab.time.updated";
    /// An entity was registered. Payload carries its initial view.
    pub const ENTITY_CREATED: &str = "scarab.entity.created";
    /// Tracked properties of an entity changed. Payload carries the new
    /// view plus `changed_properties`.
    pub const ENTITY_CHANGED: &str = "scarab.entity.changed";
    /// An entity was unregistered. Payload carries its last-known view.
    pub const ENTITY_DESTROYED: &str = "scarab.entity.destroyed";
    /// The simulation is shutting down.
    pub const SIMULATION_SHUTDOWN: &str = "scarab.simulation.shutdown";
}

/// Coarse classification of an event, used by the event logger filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// `scarab.entity.created` / `.changed` / `.destroyed`.
    EntityLifecycle,
    /// `scarab.time.updated` and `scarab.simulation.shutdown`.
    Simulation,
    /// Any non-reserved event name.
    Named,
}

/// A simulation event.
///
/// System events are built through the typed constructors below so that
/// their payload shape is uniform; user events are built with
/// [`Event::named`].
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// The event name. Reserved names are listed in [`names`].
    pub event_name: String,

    /// Simulation time at which the event was produced.
    pub sim_time: SimTime,

    /// When set, routing delivers the event only to the handler whose
    /// entity carries this id. Broadcast to observers is unaffected.
    pub target_id: Option<EntityId>,

    /// Structured payload merged into the wire envelope at the top level.
    pub payload: Map<String, Value>,
}

impl Event {
    /// Build a user event with the given name and time.
    pub fn named(event_name: impl Into<String>, sim_time: SimTime) -> Self {
        Self {
            event_name: event_name.into(),
            sim_time,
            target_id: None,
            payload: Map::new(),
        }
    }

    /// Attach a payload, replacing any existing one.
    pub fn with_payload(mut self, payload: Map<String, Value>) -> Self {
        self.payload = payload;
        self
    }

    /// Set a single payload field.
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }

    /// Address the event at a single entity.
    pub fn with_target(mut self, target: EntityId) -> Self {
        self.target_id = Some(target);
        self
    }

    /// The clock advanced from `previous_time` to `sim_time`.
    pub fn time_updated(sim_time: SimTime, previous_time: SimTime) -> Self {
        debug_assert!(previous_time < sim_time);
        let mut payload = Map::new();
        payload.insert("previous_time".to_owned(), Value::from(previous_time));
        Self {
            event_name: names::TIME_UPDATED.to_owned(),
            sim_time,
            target_id: None,
            payload,
        }
    }

    /// An entity was registered; carries its initial view.
    pub fn entity_created(view: &EntityView, sim_time: SimTime) -> Self {
        let mut payload = Map::new();
        payload.insert("entity".to_owned(), view.as_json());
        Self {
            event_name: names::ENTITY_CREATED.to_owned(),
            sim_time,
            target_id: None,
            payload,
        }
    }

    /// Tracked properties of an entity changed; carries the new view and
    /// the names that differ.
    pub fn entity_changed(view: &EntityView, changed: Vec<String>, sim_time: SimTime) -> Self {
        let mut payload = Map::new();
        payload.insert("entity".to_owned(), view.as_json());
        payload.insert(
            "changed_properties".to_owned(),
            Value::from(changed),
        );
        Self {
            event_name: names::ENTITY_CHANGED.to_owned(),
            sim_time,
            target_id: None,
            payload,
        }
    }

    /// An entity was unregistered; carries its last-known view.
    pub fn entity_destroyed(view: &EntityView, sim_time: SimTime) -> Self {
        let mut payload = Map::new();
        payload.insert("entity".to_owned(), view.as_json());
        Self {
            event_name: names::ENTITY_DESTROYED.to_owned(),
            sim_time,
            target_id: None,
            payload,
        }
    }

    /// The simulation is shutting down.
    pub fn shutdown(sim_time: SimTime) -> Self {
        Self {
            event_name: names::SIMULATION_SHUTDOWN.to_owned(),
            sim_time,
            target_id: None,
            payload: Map::new(),
        }
    }

    /// Whether the event name is one of the reserved system names.
    pub fn is_system(&self) -> bool {
        matches!(
            self.event_name.as_str(),
            names::TIME_UPDATED
                | names::ENTITY_CREATED
                | names::ENTITY_CHANGED
                | names::ENTITY_DESTROYED
                | names::SIMULATION_SHUTDOWN
        )
    }

    /// Classify the event for logger filtering.
    pub fn kind(&self) -> EventKind {
        match self.event_name.as_str() {
            names::ENTITY_CREATED | names::ENTITY_CHANGED | names::ENTITY_DESTROYED => {
                EventKind::EntityLifecycle
            }
            names::TIME_UPDATED | names::SIMULATION_SHUTDOWN => EventKind::Simulation,
            _ => EventKind::Named,
        }
    }

    /// The entity view carried by a lifecycle event, if any.
    pub fn entity_view(&self) -> Option<&Value> {
        self.payload.get("entity")
    }

    /// The `scarab_name` of the entity a lifecycle event is about.
    pub fn subject_name(&self) -> Option<&str> {
        self.entity_view()
            .and_then(|e| e.get("scarab_name"))
            .and_then(Value::as_str)
    }

    /// The `scarab_id` of the entity a lifecycle event is about.
    pub fn subject_id(&self) -> Option<EntityId> {
        self.entity_view()
            .and_then(|e| e.get("scarab_id"))
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Build the flat wire envelope for this event.
    ///
    /// `event_name` and `sim_time` (and `target_id` when set) are written
    /// first, then the payload fields are merged at the top level. A
    /// payload key colliding with an envelope key is dropped in favour of
    /// the envelope -- the envelope keys are reserved.
    pub fn to_wire(&self) -> Value {
        let mut envelope = Map::new();
        envelope.insert("event_name".to_owned(), Value::from(self.event_name.clone()));
        envelope.insert("sim_time".to_owned(), Value::from(self.sim_time));
        if let Some(target) = self.target_id {
            envelope.insert("target_id".to_owned(), Value::from(target.to_string()));
        }
        for (key, value) in &self.payload {
            if !envelope.contains_key(key) {
                envelope.insert(key.clone(), value.clone());
            }
        }
        Value::Object(envelope)
    }
}
