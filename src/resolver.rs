//! Variation resolution
//!
//! An instanced output starts life with its original object as the sole
//! variation. Users can substitute alternative objects and per-variation
//! transform offsets; this module distributes the cook's instance transforms
//! across those variations and composes the offsets.
//!
//! Assignment is deterministic: a fixed-seed linear congruential generator
//! walks the transform list once, so the same transform count and variation
//! count always produce the same distribution, across cooks and across runs.

use crate::math::Transform3;
use crate::outputs::InstancedOutput;
use crate::scene::ObjectRef;

const VARIATION_SEED: i32 = 1234;

/// One variation of an instanced output, with the transforms assigned to it.
#[derive(Debug, Clone)]
pub struct ResolvedVariation {
    pub object: ObjectRef,
    pub variation_index: usize,
    pub transforms: Vec<Transform3>,
}

fn next_random(seed: &mut i32) -> i32 {
    *seed = seed.wrapping_mul(214013).wrapping_add(2531011);
    (*seed >> 16) & 0x7fff
}

/// Recomputes the variation index assigned to every transform.
pub fn update_variation_assignments(output: &mut InstancedOutput) {
    output.transform_variation_indices.clear();
    let variation_count = output.variation_count();
    if variation_count == 0 {
        return;
    }
    let mut seed = VARIATION_SEED;
    for _ in 0..output.original_transforms.len() {
        let index = next_random(&mut seed) as usize % variation_count;
        output.transform_variation_indices.push(index);
    }
}

/// Refreshes a persistent instanced output with this cook's original object
/// and transforms, pruning variation substitutions that no longer resolve.
///
/// `is_object_live` reports whether a previously substituted object still
/// exists. When the cook replaced the original object, variations still
/// pointing at the old original are stale and pruned too. Pruning invalidates
/// the index assignment; a fully pruned list collapses back to the original
/// as sole variation.
pub fn refresh_instanced_output(
    output: &mut InstancedOutput,
    original_object: &ObjectRef,
    original_object_index: usize,
    original_transforms: &[Transform3],
    is_object_live: &dyn Fn(&ObjectRef) -> bool,
) {
    let previous_original =
        std::mem::replace(&mut output.original_object, original_object.clone());
    output.original_object_index = original_object_index;
    output.original_transforms = original_transforms.to_vec();
    let original_replaced = previous_original != *original_object;

    let before = output.variation_objects.len();
    let mut kept_offsets = Vec::with_capacity(before);
    let mut kept_objects = Vec::with_capacity(before);
    for (object, offset) in output
        .variation_objects
        .drain(..)
        .zip(output.variation_transform_offsets.drain(..))
    {
        if original_replaced && object == previous_original {
            continue;
        }
        if is_object_live(&object) {
            kept_objects.push(object);
            kept_offsets.push(offset);
        }
    }
    output.variation_objects = kept_objects;
    output.variation_transform_offsets = kept_offsets;
    if output.variation_objects.is_empty() {
        output.variation_objects.push(original_object.clone());
        output.variation_transform_offsets.push(Transform3::IDENTITY);
    }
    if output.variation_objects.len() != before {
        output.transform_variation_indices.clear();
    }
}

/// Composes the transforms assigned to one variation with its offset.
///
/// With a single variation and an identity offset the originals are returned
/// unchanged.
pub fn process_instance_transforms(
    output: &InstancedOutput,
    variation_index: usize,
) -> Vec<Transform3> {
    let offset = output
        .transform_offset_at(variation_index)
        .copied()
        .unwrap_or(Transform3::IDENTITY);
    if output.variation_count() == 1 && offset.is_identity() {
        return output.original_transforms.clone();
    }
    output
        .original_transforms
        .iter()
        .zip(&output.transform_variation_indices)
        .filter(|(_, assigned)| **assigned == variation_index)
        .map(|(transform, _)| transform.with_offset(&offset))
        .collect()
}

/// Distributes the output's transforms over its variations.
///
/// Repairs the assignment first: offset list padded to the variation count,
/// and indices recomputed whenever their length no longer matches the
/// transform list. Variations the assignment gave no transforms are omitted;
/// they get no component.
pub fn resolve_variations(output: &mut InstancedOutput) -> Vec<ResolvedVariation> {
    while output.variation_transform_offsets.len() < output.variation_objects.len() {
        output.variation_transform_offsets.push(Transform3::IDENTITY);
    }
    if output.transform_variation_indices.len() != output.original_transforms.len() {
        update_variation_assignments(output);
    }
    output
        .variation_objects
        .iter()
        .enumerate()
        .filter_map(|(variation_index, object)| {
            let transforms = process_instance_transforms(output, variation_index);
            if transforms.is_empty() {
                return None;
            }
            Some(ResolvedVariation {
                object: object.clone(),
                variation_index,
                transforms,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec3};

    fn output_with_transforms(count: usize) -> InstancedOutput {
        let transforms = (0..count)
            .map(|i| Transform3::from_translation(Vec3::new(i as f32, 0.0, 0.0)))
            .collect();
        InstancedOutput::new(ObjectRef::mesh("/meshes/rock_a"), 0, transforms)
    }

    #[test]
    fn test_assignment_is_deterministic() {
        let mut a = output_with_transforms(64);
        a.set_variation_object_at(1, ObjectRef::mesh("/meshes/rock_b"));
        a.set_variation_object_at(2, ObjectRef::mesh("/meshes/rock_c"));
        let mut b = a.clone();
        update_variation_assignments(&mut a);
        update_variation_assignments(&mut b);
        assert_eq!(a.transform_variation_indices, b.transform_variation_indices);
        assert!(a
            .transform_variation_indices
            .iter()
            .all(|&i| i < a.variation_count()));
    }

    #[test]
    fn test_every_transform_assigned_to_exactly_one_variation() {
        let mut output = output_with_transforms(50);
        output.set_variation_object_at(1, ObjectRef::mesh("/meshes/rock_b"));
        output.set_variation_object_at(2, ObjectRef::mesh("/meshes/rock_c"));
        let resolved = resolve_variations(&mut output);
        let total: usize = resolved.iter().map(|v| v.transforms.len()).sum();
        assert_eq!(total, 50);
        assert_eq!(resolved.len(), 3);
    }

    #[test]
    fn test_single_variation_identity_offset_passes_through() {
        let mut output = output_with_transforms(4);
        let originals = output.original_transforms.clone();
        let resolved = resolve_variations(&mut output);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].transforms, originals);
    }

    #[test]
    fn test_offset_composition_applies_to_assigned_transforms() {
        let mut output = output_with_transforms(10);
        output.set_variation_object_at(1, ObjectRef::mesh("/meshes/rock_b"));
        output.set_transform_offset_at(
            1,
            Transform3::new(Vec3::new(0.0, 5.0, 0.0), Quat::IDENTITY, Vec3::splat(2.0)),
        );
        let resolved = resolve_variations(&mut output);
        for transform in &resolved[1].transforms {
            assert!((transform.translation.y - 5.0).abs() < 1.0e-6);
            assert!((transform.scale.x - 2.0).abs() < 1.0e-6);
        }
        for transform in &resolved[0].transforms {
            assert!(transform.translation.y.abs() < 1.0e-6);
        }
    }

    #[test]
    fn test_refresh_prunes_dead_variations_and_reassigns() {
        let mut output = output_with_transforms(8);
        output.set_variation_object_at(1, ObjectRef::mesh("/meshes/deleted"));
        resolve_variations(&mut output);
        assert_eq!(output.transform_variation_indices.len(), 8);

        let original = output.original_object.clone();
        let transforms = output.original_transforms.clone();
        refresh_instanced_output(&mut output, &original, 0, &transforms, &|object| {
            object.path != "/meshes/deleted"
        });
        assert_eq!(output.variation_count(), 1);
        assert!(output.transform_variation_indices.is_empty());

        let resolved = resolve_variations(&mut output);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].transforms.len(), 8);
    }

    #[test]
    fn test_refresh_drops_substitutions_of_replaced_original() {
        // Sole variation is the original itself; a recook swaps the original.
        let mut output = output_with_transforms(4);
        let new_original = ObjectRef::mesh("/meshes/rock_new");
        let transforms = output.original_transforms.clone();
        refresh_instanced_output(&mut output, &new_original, 0, &transforms, &|_| true);
        assert_eq!(output.variation_count(), 1);
        assert_eq!(output.variation_objects[0].path, "/meshes/rock_new");

        // Unrelated substitutions survive the swap.
        let mut output = output_with_transforms(4);
        output.set_variation_object_at(1, ObjectRef::mesh("/meshes/rock_b"));
        let transforms = output.original_transforms.clone();
        refresh_instanced_output(&mut output, &new_original, 0, &transforms, &|_| true);
        assert_eq!(output.variation_count(), 1);
        assert_eq!(output.variation_objects[0].path, "/meshes/rock_b");
        assert!(output.transform_variation_indices.is_empty());
    }

    #[test]
    fn test_zero_transform_variations_are_omitted() {
        let mut output = output_with_transforms(1);
        output.set_variation_object_at(1, ObjectRef::mesh("/meshes/rock_b"));
        let resolved = resolve_variations(&mut output);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].transforms.len(), 1);
        assert!(resolved.iter().all(|v| !v.transforms.is_empty()));
    }

    #[test]
    fn test_refresh_collapses_to_original_when_all_pruned() {
        let mut output = output_with_transforms(3);
        output.variation_objects = vec![ObjectRef::mesh("/meshes/gone")];
        output.variation_transform_offsets = vec![Transform3::IDENTITY];
        let original = output.original_object.clone();
        let transforms = output.original_transforms.clone();
        refresh_instanced_output(&mut output, &original, 0, &transforms, &|_| false);
        assert_eq!(output.variation_count(), 1);
        assert_eq!(output.variation_objects[0].path, "/meshes/rock_a");
    }
}
