//! The serialized public projection of an entity.
//!
//! An [`EntityView`] is what flows inside `created`/`changed`/`destroyed`
//! events and over the wire to observers. It carries every public,
//! data-valued property of the entity plus the three `scarab_*` identity
//! fields, and never contains handler references or private state.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::EntityId;

/// Ordered map of public property names to JSON-native values.
pub type PropertyMap = serde_json::Map<String, Value>;

/// The public projection of an entity at a point in simulation time.
///
/// Serializes flat: the identity fields and the entity's properties all
/// appear at the top level of the JSON object, so a client sees e.g.
/// `{"scarab_name":"bee","scarab_id":"...","scarab_conforms_to":null,
/// "temp":70}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityView {
    /// Domain-level name tag for the entity (not the host type name).
    pub scarab_name: String,

    /// The registry-assigned identifier.
    pub scarab_id: EntityId,

    /// Optional interface-like grouping tag.
    pub scarab_conforms_to: Option<String>,

    /// Public, data-valued properties with JSON-native values.
    #[serde(flatten)]
    pub properties: PropertyMap,
}

impl EntityView {
    /// Build a view from identity fields and a property map.
    pub fn new(
        scarab_name: impl Into<String>,
        scarab_id: EntityId,
        scarab_conforms_to: Option<String>,
        properties: PropertyMap,
    ) -> Self {
        Self {
            scarab_name: scarab_name.into(),
            scarab_id,
            scarab_conforms_to,
            properties,
        }
    }

    /// Read a single property value by name.
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Convert the view into its flat JSON object representation.
    pub fn as_json(&self) -> Value {
        // Serialization of the struct cannot fail: every field is
        // JSON-native by construction.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
