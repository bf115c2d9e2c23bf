//! Output bookkeeping across cooks
//!
//! Everything a cook produces is keyed by a stable [`OutputIdentifier`]; that
//! key is the join used to reconcile a fresh cook against the previous one.
//! [`InstancedOutput`] entries persist across cooks and carry the user-editable
//! variation setup; [`OutputObject`] entries own the live components the
//! synthesizer materialized.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::geo::{GeoPartObject, PartType};
use crate::math::Transform3;
use crate::scene::{ComponentId, ObjectRef};

/// Stable key for one output object.
///
/// Two identifiers are equal iff all five fields match. The `loaded` flag is
/// bookkeeping, not identity: an identifier restored from a saved scene keeps
/// the node ids of the session that produced it, and those must be patched to
/// the current cook's ids (see [`CookOutput::patch_loaded_identifiers`])
/// before map lookups succeed.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct OutputIdentifier {
    pub object_id: i32,
    pub geo_id: i32,
    pub part_id: i32,
    /// Distinguishes multiple outputs derived from one part. For synthesized
    /// instancer components the format is `{original_index}_{variation_index}`;
    /// instanced outputs use `{original_index}` alone.
    pub split_identifier: String,
    pub part_name: String,
    /// True when this identifier was restored from a saved scene and may carry
    /// stale node ids.
    #[serde(default)]
    pub loaded: bool,
}

impl OutputIdentifier {
    pub fn new(
        object_id: i32,
        geo_id: i32,
        part_id: i32,
        split_identifier: impl Into<String>,
    ) -> Self {
        Self {
            object_id,
            geo_id,
            part_id,
            split_identifier: split_identifier.into(),
            part_name: String::new(),
            loaded: false,
        }
    }

    /// Builds the identifier for a part, with an empty split.
    pub fn for_part(part: &GeoPartObject) -> Self {
        Self {
            object_id: part.object_id,
            geo_id: part.geo_id,
            part_id: part.part_id,
            split_identifier: String::new(),
            part_name: part.part_name.clone(),
            loaded: false,
        }
    }

    /// Returns a copy with a different split identifier.
    pub fn with_split(&self, split_identifier: impl Into<String>) -> Self {
        Self {
            split_identifier: split_identifier.into(),
            ..self.clone()
        }
    }

    /// True if this identifier refers to the given part (node ids equal).
    pub fn matches(&self, part: &GeoPartObject) -> bool {
        self.object_id == part.object_id
            && self.geo_id == part.geo_id
            && self.part_id == part.part_id
    }
}

impl PartialEq for OutputIdentifier {
    fn eq(&self, other: &Self) -> bool {
        self.object_id == other.object_id
            && self.geo_id == other.geo_id
            && self.part_id == other.part_id
            && self.split_identifier == other.split_identifier
            && self.part_name == other.part_name
    }
}

impl Hash for OutputIdentifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.object_id.hash(state);
        self.geo_id.hash(state);
        self.part_id.hash(state);
        self.split_identifier.hash(state);
        self.part_name.hash(state);
    }
}

/// Split identifier for a (original object, variation) pair.
pub fn variation_split(original_index: usize, variation_index: usize) -> String {
    format!("{}_{}", original_index, variation_index)
}

/// One persistent instanced output: an original instanced object and the
/// variation setup the user layered on top of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstancedOutput {
    /// Object the cook asked to instance.
    pub original_object: ObjectRef,
    /// Index of the original object within its part's object list.
    pub original_object_index: usize,
    /// Instance transforms from the latest cook.
    pub original_transforms: Vec<Transform3>,
    /// Substitutable objects standing in for the original. Never empty; the
    /// original is its own sole variation by default.
    pub variation_objects: Vec<ObjectRef>,
    /// Local transform offset per variation. Same length as
    /// `variation_objects`.
    pub variation_transform_offsets: Vec<Transform3>,
    /// Variation index assigned to each transform. Same length as
    /// `original_transforms`, or empty when assignment must be recomputed.
    pub transform_variation_indices: Vec<usize>,
    /// Set when a user edit requires this output's components to be rebuilt.
    #[serde(default)]
    pub changed: bool,
    /// Set at the start of a cook; cleared when the cook still produces this
    /// output. Stale entries are pruned after translation.
    #[serde(default)]
    pub stale: bool,
}

impl InstancedOutput {
    /// Creates an instanced output seeded with the original object as its sole
    /// variation, identity offset, and every transform assigned variation 0.
    pub fn new(
        original_object: ObjectRef,
        original_object_index: usize,
        original_transforms: Vec<Transform3>,
    ) -> Self {
        let transform_count = original_transforms.len();
        Self {
            variation_objects: vec![original_object.clone()],
            variation_transform_offsets: vec![Transform3::IDENTITY],
            transform_variation_indices: vec![0; transform_count],
            original_object,
            original_object_index,
            original_transforms,
            changed: false,
            stale: false,
        }
    }

    pub fn variation_count(&self) -> usize {
        self.variation_objects.len()
    }

    pub fn mark_changed(&mut self, changed: bool) {
        self.changed = changed;
    }

    /// Replaces or appends a variation object. Growing the list pads the
    /// offset list with identity so both stay the same length.
    pub fn set_variation_object_at(&mut self, index: usize, object: ObjectRef) {
        if index < self.variation_objects.len() {
            self.variation_objects[index] = object;
        } else {
            self.variation_objects.push(object);
            self.variation_transform_offsets.push(Transform3::IDENTITY);
        }
        // Assignments must be redistributed over the new variation set.
        self.transform_variation_indices.clear();
        self.changed = true;
    }

    /// Sets the local transform offset for one variation.
    pub fn set_transform_offset_at(&mut self, index: usize, offset: Transform3) -> bool {
        match self.variation_transform_offsets.get_mut(index) {
            Some(slot) => {
                *slot = offset;
                self.changed = true;
                true
            }
            None => false,
        }
    }

    /// The local transform offset for one variation, if it exists.
    pub fn transform_offset_at(&self, index: usize) -> Option<&Transform3> {
        self.variation_transform_offsets.get(index)
    }
}

/// One materialized output: the placed object and/or live component, plus an
/// optional proxy pair shown until the full-resolution result is ready.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputObject {
    pub output_object: Option<ObjectRef>,
    pub output_component: Option<ComponentId>,
    pub proxy_object: Option<ObjectRef>,
    pub proxy_component: Option<ComponentId>,
    /// True when the proxy is newer than the full-resolution object and should
    /// be the visually active one.
    pub proxy_is_current: bool,
}

impl OutputObject {
    /// The object an instancer should place for this output.
    ///
    /// A proxy is only usable for single-instance outputs; batched instancers
    /// always take the full-resolution object.
    pub fn instanceable_object(&self, transform_count: usize) -> Option<&ObjectRef> {
        if transform_count <= 1 && self.proxy_is_current {
            if let Some(proxy) = &self.proxy_object {
                return Some(proxy);
            }
        }
        self.output_object.as_ref()
    }
}

/// All output state for one cooked node output: the part list from the latest
/// cook plus the persistent object and instanced-output maps.
#[derive(Debug, Clone, Default)]
pub struct CookOutput {
    pub parts: Vec<GeoPartObject>,
    pub output_objects: HashMap<OutputIdentifier, OutputObject>,
    pub instanced_outputs: HashMap<OutputIdentifier, InstancedOutput>,
    /// Material assignments resolved for this output, by attribute value.
    pub assignment_materials: HashMap<String, ObjectRef>,
}

impl CookOutput {
    pub fn new(parts: Vec<GeoPartObject>) -> Self {
        Self {
            parts,
            ..Self::default()
        }
    }

    /// True if any part of this output is a mesh.
    pub fn has_mesh_parts(&self) -> bool {
        self.parts.iter().any(|p| p.part_type == PartType::Mesh)
    }

    /// Marks every identifier in the persistent maps as loaded. Called after
    /// restoring output state from a saved scene.
    pub fn mark_identifiers_loaded(&mut self) {
        fn mark<V>(map: &mut HashMap<OutputIdentifier, V>) {
            *map = map
                .drain()
                .map(|(mut key, value)| {
                    key.loaded = true;
                    (key, value)
                })
                .collect();
        }
        mark(&mut self.output_objects);
        mark(&mut self.instanced_outputs);
    }

    /// Patches loaded identifiers to the node ids of the current part list.
    ///
    /// Loaded identifiers keep the numeric ids of the session that saved them;
    /// until those are rewritten to the fresh cook's ids, strict map lookups
    /// cannot find them. Matching is by part name, which survives session
    /// restarts.
    pub fn patch_loaded_identifiers(&mut self) {
        fn patch<V>(map: &mut HashMap<OutputIdentifier, V>, parts: &[GeoPartObject]) {
            let stale_keys: Vec<OutputIdentifier> = map
                .keys()
                .filter(|k| k.loaded)
                .filter(|k| !parts.iter().any(|p| k.matches(p)))
                .cloned()
                .collect();
            for old_key in stale_keys {
                let Some(part) = parts.iter().find(|p| p.part_name == old_key.part_name) else {
                    continue;
                };
                let Some(value) = map.remove(&old_key) else {
                    continue;
                };
                let mut new_key = old_key;
                new_key.object_id = part.object_id;
                new_key.geo_id = part.geo_id;
                new_key.part_id = part.part_id;
                new_key.loaded = false;
                map.insert(new_key, value);
            }
        }
        patch(&mut self.output_objects, &self.parts);
        patch(&mut self.instanced_outputs, &self.parts);
    }
}
