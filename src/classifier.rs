//! Instancer classification
//!
//! Turns one instancer part into a flat list of (object, transforms) pairs.
//! Which extraction path runs is decided entirely by the part's
//! [`InstancerType`] tag; the four schemes never compete for a single part.
//!
//! Classification is read-only: it queries the session and the already-built
//! mesh outputs of sibling parts, but touches no scene state. A part that
//! yields nothing usable is reported as an error for the caller to log and
//! skip.

use std::collections::HashMap;

use log::warn;

use crate::attributes::{AttributeOwner, ATTR_INSTANCE, ATTR_INSTANCE_OVERRIDE};
use crate::error::TranslateError;
use crate::geo::{GeoPartObject, InstancerType, PartType};
use crate::math::Transform3;
use crate::outputs::CookOutput;
use crate::scene::ObjectRef;
use crate::session::CookSession;

/// Classifier result: parallel lists of instanced objects and the transforms
/// each one should be placed at. Always the same length.
#[derive(Debug, Clone, Default)]
pub struct ClassifiedInstances {
    pub objects: Vec<ObjectRef>,
    pub transforms: Vec<Vec<Transform3>>,
}

impl ClassifiedInstances {
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn push(&mut self, object: ObjectRef, transforms: Vec<Transform3>) {
        self.objects.push(object);
        self.transforms.push(transforms);
    }

    fn validate(self, part: &GeoPartObject) -> Result<Self, TranslateError> {
        if self.objects.len() != self.transforms.len() {
            return Err(TranslateError::MismatchedInstancer {
                part_name: part.part_name.clone(),
                objects: self.objects.len(),
                transform_sets: self.transforms.len(),
            });
        }
        if self.is_empty() {
            return Err(TranslateError::EmptyInstancer {
                part_name: part.part_name.clone(),
            });
        }
        Ok(self)
    }
}

/// Extracts the instanced objects and their transforms for one instancer part.
pub fn classify_instancer(
    part: &GeoPartObject,
    session: &dyn CookSession,
    all_outputs: &[CookOutput],
) -> Result<ClassifiedInstances, TranslateError> {
    let scheme = part
        .instancer_type
        .ok_or_else(|| TranslateError::EmptyInstancer {
            part_name: part.part_name.clone(),
        })?;
    let result = match scheme {
        InstancerType::PackedPrimitive => packed_primitive_instances(part, session, all_outputs)?,
        InstancerType::AttributeInstancer => attribute_instances(part, session)?,
        InstancerType::OldSchoolAttributeInstancer => {
            old_school_instances(part, session, all_outputs)?
        }
        InstancerType::ObjectInstancer => object_instances(part, session, all_outputs)?,
    };
    result.validate(part)
}

/// Packed primitives: the part carries N transforms and references M
/// sub-parts; every sub-part is instanced at all N transforms. Sub-parts are
/// resolved to the mesh objects the sibling outputs already generated for
/// them.
fn packed_primitive_instances(
    part: &GeoPartObject,
    session: &dyn CookSession,
    all_outputs: &[CookOutput],
) -> Result<ClassifiedInstances, TranslateError> {
    let transforms = session
        .instancer_part_transforms(part.geo_id, part.part_id)
        .ok_or(TranslateError::MissingTransforms {
            geo_id: part.geo_id,
            part_id: part.part_id,
        })?;
    if transforms.is_empty() {
        return Err(TranslateError::EmptyInstancer {
            part_name: part.part_name.clone(),
        });
    }

    let instanced_part_ids = session
        .instanced_part_ids(part.geo_id, part.part_id)
        .unwrap_or_default();
    let mut result = ClassifiedInstances::default();
    for instanced_part_id in instanced_part_ids {
        match find_part_output_object(
            all_outputs,
            part.object_id,
            part.geo_id,
            instanced_part_id,
            transforms.len(),
        ) {
            Some(object) => result.push(object, transforms.clone()),
            None => warn!(
                "instancer '{}': no generated object for packed sub-part {}, skipping",
                part.part_name, instanced_part_id
            ),
        }
    }
    Ok(result)
}

/// Attribute instancer: a string attribute names the instanced object by path.
/// A detail attribute instances one object at every point; a point attribute
/// groups the points by distinct path.
fn attribute_instances(
    part: &GeoPartObject,
    session: &dyn CookSession,
) -> Result<ClassifiedInstances, TranslateError> {
    let attribute = session
        .find_attribute(part.geo_id, part.part_id, ATTR_INSTANCE)
        .or_else(|| session.find_attribute(part.geo_id, part.part_id, ATTR_INSTANCE_OVERRIDE))
        .ok_or_else(|| TranslateError::EmptyInstancer {
            part_name: part.part_name.clone(),
        })?;
    let transforms = session
        .point_instance_transforms(part.geo_id, part.part_id)
        .ok_or(TranslateError::MissingTransforms {
            geo_id: part.geo_id,
            part_id: part.part_id,
        })?;
    if transforms.is_empty() {
        return Err(TranslateError::EmptyInstancer {
            part_name: part.part_name.clone(),
        });
    }

    let mut result = ClassifiedInstances::default();
    match attribute.owner {
        AttributeOwner::Detail => {
            let path = attribute
                .first_string()
                .ok_or_else(|| TranslateError::EmptyInstancer {
                    part_name: part.part_name.clone(),
                })?;
            match session.load_object(path) {
                Some(object) => result.push(object, transforms),
                None => {
                    warn!(
                        "instancer '{}': could not load instanced object '{}'",
                        part.part_name, path
                    );
                }
            }
        }
        _ => {
            let paths =
                attribute
                    .string_values()
                    .ok_or_else(|| TranslateError::EmptyInstancer {
                        part_name: part.part_name.clone(),
                    })?;
            if paths.len() != transforms.len() {
                return Err(TranslateError::MismatchedInstancer {
                    part_name: part.part_name.clone(),
                    objects: paths.len(),
                    transform_sets: transforms.len(),
                });
            }
            // Load each distinct path once, keeping failures so a bad path is
            // not retried for every point that references it.
            let mut loaded: HashMap<&str, Option<ObjectRef>> = HashMap::new();
            let mut group_order: Vec<&str> = Vec::new();
            let mut groups: HashMap<&str, Vec<Transform3>> = HashMap::new();
            for (path, transform) in paths.iter().zip(&transforms) {
                let object = loaded
                    .entry(path.as_str())
                    .or_insert_with(|| {
                        let object = session.load_object(path);
                        if object.is_none() {
                            warn!(
                                "instancer '{}': could not load instanced object '{}'",
                                part.part_name, path
                            );
                        }
                        object
                    });
                if object.is_none() {
                    continue;
                }
                groups
                    .entry(path.as_str())
                    .or_insert_with(|| {
                        group_order.push(path.as_str());
                        Vec::new()
                    })
                    .push(*transform);
            }
            for path in group_order {
                if let (Some(Some(object)), Some(transforms)) =
                    (loaded.get(path), groups.remove(path))
                {
                    result.push(object.clone(), transforms);
                }
            }
        }
    }
    Ok(result)
}

/// Legacy point instancer: a per-point id array references sibling mesh parts
/// by object id. Parts already consumed by another instancer are excluded.
fn old_school_instances(
    part: &GeoPartObject,
    session: &dyn CookSession,
    all_outputs: &[CookOutput],
) -> Result<ClassifiedInstances, TranslateError> {
    let object_ids = session
        .instanced_object_ids(part.geo_id)
        .ok_or_else(|| TranslateError::EmptyInstancer {
            part_name: part.part_name.clone(),
        })?;
    let transforms = session
        .point_instance_transforms(part.geo_id, part.part_id)
        .ok_or(TranslateError::MissingTransforms {
            geo_id: part.geo_id,
            part_id: part.part_id,
        })?;
    if object_ids.len() != transforms.len() {
        return Err(TranslateError::MismatchedInstancer {
            part_name: part.part_name.clone(),
            objects: object_ids.len(),
            transform_sets: transforms.len(),
        });
    }

    let mut group_order: Vec<i32> = Vec::new();
    let mut groups: HashMap<i32, Vec<Transform3>> = HashMap::new();
    for (object_id, transform) in object_ids.iter().zip(&transforms) {
        groups
            .entry(*object_id)
            .or_insert_with(|| {
                group_order.push(*object_id);
                Vec::new()
            })
            .push(*transform);
    }

    let mut result = ClassifiedInstances::default();
    for object_id in group_order {
        let Some(transforms) = groups.remove(&object_id) else {
            continue;
        };
        match find_mesh_object_by_object_id(all_outputs, object_id, transforms.len(), true) {
            Some(object) => result.push(object, transforms),
            None => warn!(
                "instancer '{}': no mesh output for instanced object id {}, skipping",
                part.part_name, object_id
            ),
        }
    }
    Ok(result)
}

/// Legacy object instancer: the part's object carries a single target object
/// id, instanced at every point transform. Unlike the old-school point
/// scheme, parts flagged as instanced are still eligible targets here.
fn object_instances(
    part: &GeoPartObject,
    session: &dyn CookSession,
    all_outputs: &[CookOutput],
) -> Result<ClassifiedInstances, TranslateError> {
    let target_id = part
        .object_to_instance_id
        .ok_or_else(|| TranslateError::EmptyInstancer {
            part_name: part.part_name.clone(),
        })?;
    let transforms = session
        .point_instance_transforms(part.geo_id, part.part_id)
        .ok_or(TranslateError::MissingTransforms {
            geo_id: part.geo_id,
            part_id: part.part_id,
        })?;
    if transforms.is_empty() {
        return Err(TranslateError::EmptyInstancer {
            part_name: part.part_name.clone(),
        });
    }

    let mut result = ClassifiedInstances::default();
    match find_mesh_object_by_object_id(all_outputs, target_id, transforms.len(), false) {
        Some(object) => result.push(object, transforms),
        None => warn!(
            "instancer '{}': no mesh output for object id {}",
            part.part_name, target_id
        ),
    }
    Ok(result)
}

/// Resolves the object a sibling mesh output generated for a specific part.
fn find_part_output_object(
    all_outputs: &[CookOutput],
    object_id: i32,
    geo_id: i32,
    part_id: i32,
    transform_count: usize,
) -> Option<ObjectRef> {
    for output in all_outputs {
        let is_mesh = output.parts.iter().any(|p| {
            p.part_type == PartType::Mesh
                && p.object_id == object_id
                && p.geo_id == geo_id
                && p.part_id == part_id
        });
        if !is_mesh {
            continue;
        }
        for (identifier, output_object) in &output.output_objects {
            if identifier.object_id == object_id
                && identifier.geo_id == geo_id
                && identifier.part_id == part_id
            {
                if let Some(object) = output_object.instanceable_object(transform_count) {
                    return Some(object.clone());
                }
            }
        }
    }
    None
}

/// Resolves the object generated for any mesh part of the given object id.
fn find_mesh_object_by_object_id(
    all_outputs: &[CookOutput],
    object_id: i32,
    transform_count: usize,
    exclude_instanced: bool,
) -> Option<ObjectRef> {
    for output in all_outputs {
        for part in &output.parts {
            if part.part_type != PartType::Mesh || part.object_id != object_id {
                continue;
            }
            if exclude_instanced && part.is_instanced {
                continue;
            }
            for (identifier, output_object) in &output.output_objects {
                if identifier.matches(part) {
                    if let Some(object) = output_object.instanceable_object(transform_count) {
                        return Some(object.clone());
                    }
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{Attribute, AttributeData};
    use crate::outputs::{OutputIdentifier, OutputObject};
    use crate::session::MemorySession;
    use glam::Vec3;

    fn transform_at(x: f32) -> Transform3 {
        Transform3::from_translation(Vec3::new(x, 0.0, 0.0))
    }

    fn mesh_output(part: GeoPartObject, object: ObjectRef) -> CookOutput {
        let mut identifier = OutputIdentifier::for_part(&part);
        identifier.split_identifier = "0".to_string();
        let mut output = CookOutput::new(vec![part]);
        output.output_objects.insert(
            identifier,
            OutputObject {
                output_object: Some(object),
                ..Default::default()
            },
        );
        output
    }

    #[test]
    fn test_packed_primitive_cross_product() {
        let mut session = MemorySession::new();
        session.set_instancer_transforms(5, 3, vec![transform_at(0.0), transform_at(1.0)]);
        session.set_instanced_part_ids(5, 3, vec![0, 1]);

        let mut sub_a = GeoPartObject::mesh(1, 5, 0, "rock_a");
        sub_a.is_instanced = true;
        let mut sub_b = GeoPartObject::mesh(1, 5, 1, "rock_b");
        sub_b.is_instanced = true;
        let outputs = vec![
            mesh_output(sub_a, ObjectRef::mesh("/meshes/rock_a")),
            mesh_output(sub_b, ObjectRef::mesh("/meshes/rock_b")),
        ];

        let part =
            GeoPartObject::instancer(1, 5, 3, "packed", InstancerType::PackedPrimitive);
        let classified = classify_instancer(&part, &session, &outputs).expect("classifies");
        // 2 sub-parts, each at all 2 transforms.
        assert_eq!(classified.len(), 2);
        assert_eq!(classified.transforms[0].len(), 2);
        assert_eq!(classified.transforms[1].len(), 2);
    }

    #[test]
    fn test_attribute_instancer_detail_places_all_points() {
        let mut session = MemorySession::new();
        session.register_object(ObjectRef::mesh("/meshes/tree"));
        session.add_attribute(
            2,
            0,
            Attribute::new(
                ATTR_INSTANCE,
                AttributeOwner::Detail,
                1,
                AttributeData::String(vec!["/meshes/tree".to_string()]),
            ),
        );
        session.set_point_transforms(2, 0, vec![transform_at(0.0), transform_at(1.0), transform_at(2.0)]);

        let part =
            GeoPartObject::instancer(1, 2, 0, "scatter", InstancerType::AttributeInstancer);
        let classified = classify_instancer(&part, &session, &[]).expect("classifies");
        assert_eq!(classified.len(), 1);
        assert_eq!(classified.transforms[0].len(), 3);
    }

    #[test]
    fn test_attribute_instancer_groups_points_by_path() {
        let mut session = MemorySession::new();
        session.register_object(ObjectRef::mesh("/meshes/tree"));
        session.register_object(ObjectRef::mesh("/meshes/bush"));
        session.add_attribute(
            2,
            0,
            Attribute::new(
                ATTR_INSTANCE,
                AttributeOwner::Point,
                1,
                AttributeData::String(vec![
                    "/meshes/tree".to_string(),
                    "/meshes/bush".to_string(),
                    "/meshes/tree".to_string(),
                ]),
            ),
        );
        session.set_point_transforms(2, 0, vec![transform_at(0.0), transform_at(1.0), transform_at(2.0)]);

        let part =
            GeoPartObject::instancer(1, 2, 0, "scatter", InstancerType::AttributeInstancer);
        let classified = classify_instancer(&part, &session, &[]).expect("classifies");
        assert_eq!(classified.len(), 2);
        assert_eq!(classified.objects[0].path, "/meshes/tree");
        assert_eq!(classified.transforms[0].len(), 2);
        assert_eq!(classified.objects[1].path, "/meshes/bush");
        assert_eq!(classified.transforms[1].len(), 1);
    }

    #[test]
    fn test_attribute_instancer_skips_unresolvable_paths() {
        let mut session = MemorySession::new();
        session.register_object(ObjectRef::mesh("/meshes/tree"));
        session.add_attribute(
            2,
            0,
            Attribute::new(
                ATTR_INSTANCE,
                AttributeOwner::Point,
                1,
                AttributeData::String(vec![
                    "/meshes/missing".to_string(),
                    "/meshes/tree".to_string(),
                ]),
            ),
        );
        session.set_point_transforms(2, 0, vec![transform_at(0.0), transform_at(1.0)]);

        let part =
            GeoPartObject::instancer(1, 2, 0, "scatter", InstancerType::AttributeInstancer);
        let classified = classify_instancer(&part, &session, &[]).expect("classifies");
        assert_eq!(classified.len(), 1);
        assert_eq!(classified.objects[0].path, "/meshes/tree");
    }

    #[test]
    fn test_old_school_excludes_instanced_parts() {
        let mut session = MemorySession::new();
        session.set_instanced_object_ids(4, vec![8, 9]);
        session.set_point_transforms(4, 0, vec![transform_at(0.0), transform_at(1.0)]);

        let eligible = GeoPartObject::mesh(8, 6, 0, "house");
        let mut excluded = GeoPartObject::mesh(9, 7, 0, "door");
        excluded.is_instanced = true;
        let outputs = vec![
            mesh_output(eligible, ObjectRef::mesh("/meshes/house")),
            mesh_output(excluded, ObjectRef::mesh("/meshes/door")),
        ];

        let part = GeoPartObject::instancer(
            1,
            4,
            0,
            "legacy",
            InstancerType::OldSchoolAttributeInstancer,
        );
        let classified = classify_instancer(&part, &session, &outputs).expect("classifies");
        assert_eq!(classified.len(), 1);
        assert_eq!(classified.objects[0].path, "/meshes/house");
    }

    #[test]
    fn test_object_instancer_allows_instanced_targets() {
        let mut session = MemorySession::new();
        session.set_point_transforms(4, 0, vec![transform_at(0.0)]);

        let mut target = GeoPartObject::mesh(9, 7, 0, "door");
        target.is_instanced = true;
        let outputs = vec![mesh_output(target, ObjectRef::mesh("/meshes/door"))];

        let mut part =
            GeoPartObject::instancer(1, 4, 0, "objinst", InstancerType::ObjectInstancer);
        part.object_to_instance_id = Some(9);
        let classified = classify_instancer(&part, &session, &outputs).expect("classifies");
        assert_eq!(classified.len(), 1);
        assert_eq!(classified.objects[0].path, "/meshes/door");
    }

    #[test]
    fn test_empty_instancer_is_an_error() {
        let session = MemorySession::new();
        let part =
            GeoPartObject::instancer(1, 2, 0, "scatter", InstancerType::AttributeInstancer);
        assert!(matches!(
            classify_instancer(&part, &session, &[]),
            Err(TranslateError::EmptyInstancer { .. })
        ));
    }

    #[test]
    fn test_zero_point_detail_instancer_is_an_error() {
        let mut session = MemorySession::new();
        session.register_object(ObjectRef::mesh("/meshes/tree"));
        session.add_attribute(
            2,
            0,
            Attribute::new(
                ATTR_INSTANCE,
                AttributeOwner::Detail,
                1,
                AttributeData::String(vec!["/meshes/tree".to_string()]),
            ),
        );
        session.set_point_transforms(2, 0, Vec::new());

        let part =
            GeoPartObject::instancer(1, 2, 0, "scatter", InstancerType::AttributeInstancer);
        assert!(matches!(
            classify_instancer(&part, &session, &[]),
            Err(TranslateError::EmptyInstancer { .. })
        ));
    }

    #[test]
    fn test_mismatched_counts_are_an_error() {
        let mut session = MemorySession::new();
        session.register_object(ObjectRef::mesh("/meshes/tree"));
        session.add_attribute(
            2,
            0,
            Attribute::new(
                ATTR_INSTANCE,
                AttributeOwner::Point,
                1,
                AttributeData::String(vec!["/meshes/tree".to_string()]),
            ),
        );
        session.set_point_transforms(2, 0, vec![transform_at(0.0), transform_at(1.0)]);

        let part =
            GeoPartObject::instancer(1, 2, 0, "scatter", InstancerType::AttributeInstancer);
        assert!(matches!(
            classify_instancer(&part, &session, &[]),
            Err(TranslateError::MismatchedInstancer { .. })
        ));
    }
}
