//! Cook session interface
//!
//! Translation never talks to the procedural engine directly; it receives an
//! explicit session handle and queries it for attributes, instance transforms
//! and object references. The session's own lifecycle (open, cook, close) is
//! owned by the caller.
//!
//! [`MemorySession`] is a complete in-memory implementation, used by tests and
//! by callers that snapshot cook results before translating.

use std::collections::HashMap;

use crate::attributes::{Attribute, AttributeOwner};
use crate::math::Transform3;
use crate::scene::ObjectRef;

/// Query surface of a cooked procedural session.
pub trait CookSession {
    /// Looks up an attribute by name and owner on a part.
    fn attribute(
        &self,
        geo_id: i32,
        part_id: i32,
        name: &str,
        owner: AttributeOwner,
    ) -> Option<&Attribute>;

    /// Looks up an attribute by name on any owner, scanning point, then
    /// primitive, then detail.
    fn find_attribute(&self, geo_id: i32, part_id: i32, name: &str) -> Option<&Attribute> {
        AttributeOwner::ALL
            .iter()
            .find_map(|owner| self.attribute(geo_id, part_id, name, *owner))
    }

    /// Per-point instance transforms for a part.
    fn point_instance_transforms(&self, geo_id: i32, part_id: i32) -> Option<Vec<Transform3>>;

    /// Instance transforms recorded directly on a packed-primitive instancer.
    fn instancer_part_transforms(&self, geo_id: i32, part_id: i32) -> Option<Vec<Transform3>>;

    /// Part ids of the sub-parts referenced by a packed-primitive instancer.
    fn instanced_part_ids(&self, geo_id: i32, part_id: i32) -> Option<Vec<i32>>;

    /// Per-point target object ids for the legacy instancer schemes.
    fn instanced_object_ids(&self, geo_id: i32) -> Option<Vec<i32>>;

    /// All attributes recorded for a part, across every owner.
    fn attributes(&self, geo_id: i32, part_id: i32) -> Vec<&Attribute>;

    /// Resolves an object path to a placeable object reference.
    fn load_object(&self, path: &str) -> Option<ObjectRef>;
}

/// In-memory cook snapshot implementing [`CookSession`].
#[derive(Debug, Default)]
pub struct MemorySession {
    attributes: HashMap<(i32, i32), Vec<Attribute>>,
    point_transforms: HashMap<(i32, i32), Vec<Transform3>>,
    instancer_transforms: HashMap<(i32, i32), Vec<Transform3>>,
    instanced_part_ids: HashMap<(i32, i32), Vec<i32>>,
    instanced_object_ids: HashMap<i32, Vec<i32>>,
    objects: HashMap<String, ObjectRef>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an attribute for a part.
    pub fn add_attribute(&mut self, geo_id: i32, part_id: i32, attribute: Attribute) {
        self.attributes
            .entry((geo_id, part_id))
            .or_default()
            .push(attribute);
    }

    /// Records the per-point instance transforms for a part.
    pub fn set_point_transforms(&mut self, geo_id: i32, part_id: i32, transforms: Vec<Transform3>) {
        self.point_transforms.insert((geo_id, part_id), transforms);
    }

    /// Records the packed-primitive transforms for an instancer part.
    pub fn set_instancer_transforms(
        &mut self,
        geo_id: i32,
        part_id: i32,
        transforms: Vec<Transform3>,
    ) {
        self.instancer_transforms
            .insert((geo_id, part_id), transforms);
    }

    /// Records the sub-part ids referenced by a packed-primitive instancer.
    pub fn set_instanced_part_ids(&mut self, geo_id: i32, part_id: i32, part_ids: Vec<i32>) {
        self.instanced_part_ids.insert((geo_id, part_id), part_ids);
    }

    /// Records the per-point object ids for the legacy instancer schemes.
    pub fn set_instanced_object_ids(&mut self, geo_id: i32, object_ids: Vec<i32>) {
        self.instanced_object_ids.insert(geo_id, object_ids);
    }

    /// Registers an object so [`CookSession::load_object`] can resolve it.
    pub fn register_object(&mut self, object: ObjectRef) {
        self.objects.insert(object.path.clone(), object);
    }
}

impl CookSession for MemorySession {
    fn attribute(
        &self,
        geo_id: i32,
        part_id: i32,
        name: &str,
        owner: AttributeOwner,
    ) -> Option<&Attribute> {
        self.attributes
            .get(&(geo_id, part_id))?
            .iter()
            .find(|a| a.name == name && a.owner == owner)
    }

    fn point_instance_transforms(&self, geo_id: i32, part_id: i32) -> Option<Vec<Transform3>> {
        self.point_transforms.get(&(geo_id, part_id)).cloned()
    }

    fn instancer_part_transforms(&self, geo_id: i32, part_id: i32) -> Option<Vec<Transform3>> {
        self.instancer_transforms.get(&(geo_id, part_id)).cloned()
    }

    fn instanced_part_ids(&self, geo_id: i32, part_id: i32) -> Option<Vec<i32>> {
        self.instanced_part_ids.get(&(geo_id, part_id)).cloned()
    }

    fn instanced_object_ids(&self, geo_id: i32) -> Option<Vec<i32>> {
        self.instanced_object_ids.get(&geo_id).cloned()
    }

    fn attributes(&self, geo_id: i32, part_id: i32) -> Vec<&Attribute> {
        self.attributes
            .get(&(geo_id, part_id))
            .map(|attrs| attrs.iter().collect())
            .unwrap_or_default()
    }

    fn load_object(&self, path: &str) -> Option<ObjectRef> {
        self.objects.get(path).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::AttributeData;

    #[test]
    fn test_find_attribute_scans_owners_in_order() {
        let mut session = MemorySession::new();
        session.add_attribute(
            1,
            0,
            Attribute::new(
                "instance",
                AttributeOwner::Detail,
                1,
                AttributeData::String(vec!["/objects/rock".to_string()]),
            ),
        );
        let found = session.find_attribute(1, 0, "instance").expect("present");
        assert_eq!(found.owner, AttributeOwner::Detail);

        session.add_attribute(
            1,
            0,
            Attribute::new(
                "instance",
                AttributeOwner::Point,
                1,
                AttributeData::String(vec!["/objects/tree".to_string()]),
            ),
        );
        let found = session.find_attribute(1, 0, "instance").expect("present");
        assert_eq!(found.owner, AttributeOwner::Point);
    }

    #[test]
    fn test_load_object_resolves_registered_paths() {
        let mut session = MemorySession::new();
        session.register_object(ObjectRef::mesh("/meshes/rock_a"));
        assert!(session.load_object("/meshes/rock_a").is_some());
        assert!(session.load_object("/meshes/missing").is_none());
    }
}
