//! Part descriptions produced by a cook
//!
//! A cook emits a flat list of parts per output. Each part is identified by
//! the (object, geo, part) node id triple plus its name, and carries the
//! metadata translation needs: part type, instancer scheme, element counts and
//! the part-level transform. Parts are immutable for the duration of a cook
//! and recreated wholesale by the next one.

use serde::{Deserialize, Serialize};

use crate::math::Transform3;

/// What kind of output a part is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PartType {
    Invalid,
    Mesh,
    Instancer,
}

/// Which instancing scheme an instancer part uses.
///
/// The tag is recorded on the part at cook time and selects exactly one
/// classification path; the schemes never compete for a single part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstancerType {
    /// Packed primitives: the part itself carries N transforms and references
    /// M instanced sub-parts, each instanced at all N transforms.
    PackedPrimitive,
    /// A point or detail string attribute names the instanced object by path.
    AttributeInstancer,
    /// Legacy scheme: per-point numeric ids reference sibling mesh parts,
    /// excluding parts already flagged as instanced.
    OldSchoolAttributeInstancer,
    /// Legacy scheme: the part's object carries a single target object id.
    ObjectInstancer,
}

/// Element counts for one part.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartInfo {
    pub point_count: usize,
    /// Number of instance transforms on a packed-primitive instancer.
    pub instance_count: usize,
    /// Number of sub-parts referenced by a packed-primitive instancer.
    pub instanced_part_count: usize,
}

/// One unit of geometry output from a cook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPartObject {
    pub object_id: i32,
    pub geo_id: i32,
    pub part_id: i32,
    pub part_name: String,
    pub part_type: PartType,
    pub instancer_type: Option<InstancerType>,
    pub part_info: PartInfo,
    /// Part-level transform, applied to batched instancer components.
    pub transform: Transform3,
    /// True when this part's geometry is consumed by another instancer.
    pub is_instanced: bool,
    /// Target object id for the legacy object-instancer scheme.
    pub object_to_instance_id: Option<i32>,
}

impl GeoPartObject {
    /// Creates a mesh part with the given ids and name.
    pub fn mesh(object_id: i32, geo_id: i32, part_id: i32, part_name: impl Into<String>) -> Self {
        Self {
            object_id,
            geo_id,
            part_id,
            part_name: part_name.into(),
            part_type: PartType::Mesh,
            instancer_type: None,
            part_info: PartInfo::default(),
            transform: Transform3::IDENTITY,
            is_instanced: false,
            object_to_instance_id: None,
        }
    }

    /// Creates an instancer part with the given scheme.
    pub fn instancer(
        object_id: i32,
        geo_id: i32,
        part_id: i32,
        part_name: impl Into<String>,
        instancer_type: InstancerType,
    ) -> Self {
        Self {
            object_id,
            geo_id,
            part_id,
            part_name: part_name.into(),
            part_type: PartType::Instancer,
            instancer_type: Some(instancer_type),
            part_info: PartInfo::default(),
            transform: Transform3::IDENTITY,
            is_instanced: false,
            object_to_instance_id: None,
        }
    }

    pub fn is_instancer(&self) -> bool {
        self.part_type == PartType::Instancer
    }
}
