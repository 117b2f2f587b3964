//! Property snapshots and change detection.
//!
//! Before a handler runs on an entity, the router captures a shallow
//! structural copy of that entity's tracked properties. Afterwards the
//! copy is diffed against the live values: a property changed iff the two
//! values are unequal under structural equality. Nested mutation that
//! still compares equal at the top level is not reported -- an entity
//! that wants a change reported must assign a new value.

use scarab_events::PropertyMap;

use crate::entity::SimEntity;

/// Drop property names beginning with an underscore; those are private
/// and never tracked or serialized.
pub fn public_properties(mut properties: PropertyMap) -> PropertyMap {
    properties.retain(|name, _| !name.starts_with('_'));
    properties
}

/// A shallow pre-invocation copy of an entity's tracked properties.
#[derive(Debug, Clone)]
pub struct PropertySnapshot {
    values: PropertyMap,
}

impl PropertySnapshot {
    /// Capture the tracked properties of `entity`.
    pub fn capture(entity: &dyn SimEntity, tracked: &[String]) -> Self {
        let current = entity.properties();
        let mut values = PropertyMap::new();
        for name in tracked {
            if let Some(value) = current.get(name) {
                values.insert(name.clone(), value.clone());
            }
        }
        Self { values }
    }

    /// Compare against the entity's current state and return the names of
    /// tracked properties that differ, in tracked order.
    ///
    /// Covers all three change shapes: a value that changed, a tracked
    /// property that appeared, and one that disappeared.
    pub fn diff(&self, entity: &dyn SimEntity, tracked: &[String]) -> Vec<String> {
        let current = entity.properties();
        let mut changed = Vec::new();
        for name in tracked {
            match (self.values.get(name), current.get(name)) {
                (Some(before), Some(after)) if before == after => {}
                (None, None) => {}
                _ => changed.push(name.clone()),
            }
        }
        changed
    }
}
