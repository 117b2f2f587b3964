//! Entity registry: id assignment, descriptor capture, and views.
//!
//! Registration inspects an entity exactly once: its bindings are
//! validated, its tracked property set is captured, and a fresh
//! [`EntityId`] is assigned. The descriptor never changes afterwards --
//! handler bindings declared later are not observed, and the tracked set
//! stays fixed for the entity's lifetime.

use std::collections::HashMap;

use scarab_events::{EntityId, EntityView, SimTime};
use tracing::debug;

use crate::entity::{HandlerBinding, SimEntity};
use crate::snapshot::public_properties;

/// Errors surfaced by registration and deregistration.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    /// Deregistration (or a lookup) referenced an id that was never
    /// registered or is already destroyed.
    #[error("unknown entity id: {0}")]
    UnknownEntity(EntityId),

    /// A binding declared a shape the kernel cannot route: a selector on
    /// a kind that takes none, or a missing selector on a kind that
    /// requires one.
    #[error("unsupported handler binding '{handler}' on entity '{entity}'")]
    UnsupportedHandler {
        /// The `scarab_name` of the offending entity.
        entity: String,
        /// The handler slot named by the binding.
        handler: String,
    },

    /// A freshly generated id collided with a live one. With UUID v4 this
    /// is unreachable in practice; if it happens the id space can no
    /// longer be trusted and the run must stop.
    #[error("entity id collision: {0}")]
    IdCollision(EntityId),
}

/// Immutable record of what an entity declared at registration.
#[derive(Debug, Clone)]
pub struct EntityDescriptor {
    /// The registry-assigned id.
    pub id: EntityId,
    /// Domain-level name tag.
    pub scarab_name: String,
    /// Optional interface-like grouping tag.
    pub conforms_to: Option<String>,
    /// Declared handler bindings, in declaration order.
    pub bindings: Vec<HandlerBinding>,
    /// Names of the public properties tracked for change detection,
    /// captured at registration.
    pub tracked_properties: Vec<String>,
    /// Simulation time from which this entity's handlers receive events.
    pub active_from: SimTime,
}

pub(crate) struct RegisteredEntity {
    pub(crate) descriptor: EntityDescriptor,
    pub(crate) entity: Box<dyn SimEntity>,
}

/// Storage for all live entities, keyed by id.
#[derive(Default)]
pub struct EntityRegistry {
    entities: HashMap<EntityId, RegisteredEntity>,
}

impl EntityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity, assigning it a fresh id.
    ///
    /// `active_from` is the simulation time from which the entity's own
    /// handlers become eligible for events.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::UnsupportedHandler`] if a binding's
    /// selector does not match its kind, or
    /// [`RegistrationError::IdCollision`] if the generated id is already
    /// live.
    pub fn insert(
        &mut self,
        entity: Box<dyn SimEntity>,
        active_from: SimTime,
    ) -> Result<EntityId, RegistrationError> {
        let bindings = entity.bindings();
        for binding in &bindings {
            if binding.kind.requires_selector() != binding.selector.is_some() {
                return Err(RegistrationError::UnsupportedHandler {
                    entity: entity.scarab_name().to_owned(),
                    handler: binding.handler.clone(),
                });
            }
        }

        let id = EntityId::new();
        if self.entities.contains_key(&id) {
            return Err(RegistrationError::IdCollision(id));
        }

        let tracked_properties: Vec<String> = public_properties(entity.properties())
            .keys()
            .cloned()
            .collect();

        let descriptor = EntityDescriptor {
            id,
            scarab_name: entity.scarab_name().to_owned(),
            conforms_to: entity.conforms_to().map(str::to_owned),
            bindings,
            tracked_properties,
            active_from,
        };

        debug!(
            entity = %descriptor.scarab_name,
            %id,
            handlers = descriptor.bindings.len(),
            "entity registered"
        );

        self.entities.insert(id, RegisteredEntity { descriptor, entity });
        Ok(id)
    }

    /// Remove an entity, returning its final view.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::UnknownEntity`] if the id is not live.
    pub fn remove(&mut self, id: EntityId) -> Result<EntityView, RegistrationError> {
        let registered = self
            .entities
            .remove(&id)
            .ok_or(RegistrationError::UnknownEntity(id))?;
        Ok(Self::view_of(&registered))
    }

    /// Whether the id refers to a live entity.
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// The descriptor captured at registration.
    pub fn descriptor(&self, id: EntityId) -> Option<&EntityDescriptor> {
        self.entities.get(&id).map(|r| &r.descriptor)
    }

    /// The current public projection of a live entity.
    pub fn view(&self, id: EntityId) -> Option<EntityView> {
        self.entities.get(&id).map(Self::view_of)
    }

    pub(crate) fn get_mut(&mut self, id: EntityId) -> Option<&mut RegisteredEntity> {
        self.entities.get_mut(&id)
    }

    fn view_of(registered: &RegisteredEntity) -> EntityView {
        EntityView::new(
            registered.descriptor.scarab_name.clone(),
            registered.descriptor.id,
            registered.descriptor.conforms_to.clone(),
            public_properties(registered.entity.properties()),
        )
    }
}
