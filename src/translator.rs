//! Instancer translation orchestration
//!
//! Runs the full pipeline for one cooked output: classify every instancer
//! part, refresh the persistent instanced outputs, distribute variations,
//! synthesize components, then reconcile against the previous cook's
//! components. Per-part and per-variation failures are logged and skipped;
//! the cook as a whole always completes.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use log::{debug, warn};

use crate::attributes::{
    PropertyAttribute, ATTR_INSTANCE_COLOR, ATTR_MATERIAL, ATTR_SPLIT_INSTANCES,
};
use crate::classifier::classify_instancer;
use crate::error::TranslateError;
use crate::geo::GeoPartObject;
use crate::outputs::{variation_split, CookOutput, InstancedOutput, OutputIdentifier, OutputObject};
use crate::reconciler::reconcile_outputs;
use crate::resolver::{refresh_instanced_output, resolve_variations, ResolvedVariation};
use crate::scene::{ComponentId, ObjectRef, SceneGraph};
use crate::session::CookSession;
use crate::synthesizer::{create_or_update_component, SynthesisContext};

/// Per-part inputs shared by every component synthesized from the part.
struct PartContext {
    split_instances: bool,
    colors: Vec<[f32; 4]>,
    materials: Vec<ObjectRef>,
    properties: Vec<PropertyAttribute>,
}

/// True when the part asks for one sub-component per instance: a detail int
/// attribute whose first value is non-zero.
pub fn is_split_instancer(part: &GeoPartObject, session: &dyn CookSession) -> bool {
    session
        .attribute(
            part.geo_id,
            part.part_id,
            ATTR_SPLIT_INSTANCES,
            crate::attributes::AttributeOwner::Detail,
        )
        .and_then(|attr| attr.first_int())
        .map(|value| value != 0)
        .unwrap_or(false)
}

fn collect_instance_colors(part: &GeoPartObject, session: &dyn CookSession) -> Vec<[f32; 4]> {
    let Some(attr) = session.find_attribute(part.geo_id, part.part_id, ATTR_INSTANCE_COLOR) else {
        return Vec::new();
    };
    let Some(values) = attr.float_values() else {
        return Vec::new();
    };
    match attr.tuple_size {
        4 => values
            .chunks_exact(4)
            .map(|c| [c[0], c[1], c[2], c[3]])
            .collect(),
        3 => values
            .chunks_exact(3)
            .map(|c| [c[0], c[1], c[2], 1.0])
            .collect(),
        other => {
            warn!(
                "instancer '{}': instance color tuple size {} not supported, ignoring",
                part.part_name, other
            );
            Vec::new()
        }
    }
}

/// Resolves the part's material override attribute, caching resolutions in the
/// output's assignment map so one path is loaded once per cook.
fn collect_instancer_materials(
    part: &GeoPartObject,
    session: &dyn CookSession,
    assignment_materials: &mut HashMap<String, ObjectRef>,
) -> Vec<ObjectRef> {
    let Some(attr) = session.find_attribute(part.geo_id, part.part_id, ATTR_MATERIAL) else {
        return Vec::new();
    };
    let Some(paths) = attr.string_values() else {
        return Vec::new();
    };
    let mut materials = Vec::new();
    for path in paths {
        if let Some(material) = assignment_materials.get(path) {
            materials.push(material.clone());
            continue;
        }
        match session.load_object(path) {
            Some(material) => {
                assignment_materials.insert(path.clone(), material.clone());
                materials.push(material);
            }
            None => warn!(
                "instancer '{}': could not load material '{}'",
                part.part_name, path
            ),
        }
    }
    materials
}

fn collect_property_attributes(part: &GeoPartObject, session: &dyn CookSession) -> Vec<PropertyAttribute> {
    session
        .attributes(part.geo_id, part.part_id)
        .into_iter()
        .filter_map(PropertyAttribute::from_attribute)
        .collect()
}

fn collect_part_context(
    part: &GeoPartObject,
    session: &dyn CookSession,
    assignment_materials: &mut HashMap<String, ObjectRef>,
) -> PartContext {
    PartContext {
        split_instances: is_split_instancer(part, session),
        colors: collect_instance_colors(part, session),
        materials: collect_instancer_materials(part, session, assignment_materials),
        properties: collect_property_attributes(part, session),
    }
}

/// Material list for one variation: a single override applies to every
/// variation, a list is indexed by variation with the first entry as fallback.
fn variation_materials(materials: &[ObjectRef], variation_index: usize) -> Vec<ObjectRef> {
    if materials.is_empty() {
        return Vec::new();
    }
    let material = materials
        .get(variation_index)
        .unwrap_or(&materials[0])
        .clone();
    vec![material]
}

/// Colors for the instances assigned to one variation.
fn variation_colors(colors: &[[f32; 4]], assignment: &[usize], variation_index: usize) -> Vec<[f32; 4]> {
    if colors.len() != assignment.len() {
        return colors.to_vec();
    }
    colors
        .iter()
        .zip(assignment)
        .filter(|(_, assigned)| **assigned == variation_index)
        .map(|(color, _)| *color)
        .collect()
}

fn synthesize_variation(
    part: &GeoPartObject,
    context: &PartContext,
    assignment: &[usize],
    variation: &ResolvedVariation,
    old_component: Option<ComponentId>,
    scene: &mut SceneGraph,
    parent: ComponentId,
) -> Result<ComponentId, TranslateError> {
    let mut ctx = SynthesisContext::new(scene, parent);
    ctx.part_transform = part.transform;
    ctx.split_instances = context.split_instances;
    ctx.materials = variation_materials(&context.materials, variation.variation_index);
    ctx.properties = context.properties.clone();
    if context.split_instances {
        ctx.instance_colors =
            variation_colors(&context.colors, assignment, variation.variation_index);
    }
    create_or_update_component(&variation.object, &variation.transforms, &mut ctx, old_component)
}

/// Translates every instancer part of one output.
///
/// `all_outputs` holds every output of the cooked node, including the one
/// being translated; sibling mesh outputs are needed to resolve packed and
/// legacy instancer targets. On return the output's object map references
/// only this cook's components, the previous cook's unreferenced components
/// are destroyed, and stale instanced outputs are pruned.
pub fn create_all_instancers(
    output_index: usize,
    all_outputs: &mut [CookOutput],
    session: &dyn CookSession,
    scene: &mut SceneGraph,
    parent: ComponentId,
) -> Result<(), TranslateError> {
    {
        let output = all_outputs
            .get_mut(output_index)
            .ok_or_else(|| TranslateError::Scene(format!("output index {} out of range", output_index)))?;
        output.patch_loaded_identifiers();
        for instanced in output.instanced_outputs.values_mut() {
            instanced.stale = true;
        }
    }

    // Classification is read-only and may look at every sibling output,
    // including the one being translated (packed sub-parts live in it).
    let instancer_parts: Vec<GeoPartObject> = all_outputs[output_index]
        .parts
        .iter()
        .filter(|p| p.is_instancer())
        .cloned()
        .collect();
    let mut classified = Vec::new();
    for part in instancer_parts {
        match classify_instancer(&part, session, all_outputs) {
            Ok(instances) => classified.push((part, instances)),
            Err(err) => warn!("skipping instancer part '{}': {}", part.part_name, err),
        }
    }

    let output = &mut all_outputs[output_index];
    let is_live = |object: &ObjectRef| session.load_object(&object.path).is_some();
    let mut new_objects: HashMap<OutputIdentifier, OutputObject> = HashMap::new();

    for (part, instances) in classified {
        let context = collect_part_context(&part, session, &mut output.assignment_materials);
        debug!(
            "instancer '{}': {} instanced objects",
            part.part_name,
            instances.len()
        );
        for (original_index, (object, transforms)) in
            instances.objects.iter().zip(&instances.transforms).enumerate()
        {
            let key = OutputIdentifier::for_part(&part).with_split(original_index.to_string());
            let (resolved, assignment) = {
                let entry = match output.instanced_outputs.entry(key.clone()) {
                    Entry::Occupied(occupied) => {
                        let entry = occupied.into_mut();
                        refresh_instanced_output(
                            entry,
                            object,
                            original_index,
                            transforms,
                            &is_live,
                        );
                        entry
                    }
                    Entry::Vacant(vacant) => vacant.insert(InstancedOutput::new(
                        object.clone(),
                        original_index,
                        transforms.clone(),
                    )),
                };
                entry.stale = false;
                entry.changed = false;
                let resolved = resolve_variations(entry);
                (resolved, entry.transform_variation_indices.clone())
            };

            for variation in &resolved {
                let identifier =
                    key.with_split(variation_split(original_index, variation.variation_index));
                let old_component = output
                    .output_objects
                    .get(&identifier)
                    .and_then(|o| o.output_component);
                match synthesize_variation(
                    &part,
                    &context,
                    &assignment,
                    variation,
                    old_component,
                    scene,
                    parent,
                ) {
                    Ok(component) => {
                        new_objects.insert(
                            identifier,
                            OutputObject {
                                output_object: Some(variation.object.clone()),
                                output_component: Some(component),
                                ..Default::default()
                            },
                        );
                    }
                    Err(err) => warn!(
                        "instancer '{}' variation {}: {}",
                        part.part_name, variation.variation_index, err
                    ),
                }
            }
        }
    }

    // Reconcile everything except the entries owned by this cook's mesh
    // parts: entries for current instancer parts, and entries whose part
    // vanished from the part list entirely, are both diffed against the new
    // map so their unreused components get destroyed.
    let instancer_keys: Vec<OutputIdentifier> = {
        let parts = &output.parts;
        output
            .output_objects
            .keys()
            .filter(|k| !parts.iter().any(|p| !p.is_instancer() && k.matches(p)))
            .cloned()
            .collect()
    };
    let mut old_objects = HashMap::new();
    for key in instancer_keys {
        if let Some(object) = output.output_objects.remove(&key) {
            old_objects.insert(key, object);
        }
    }
    reconcile_outputs(&new_objects, &old_objects, scene);
    output.output_objects.extend(new_objects);
    output.instanced_outputs.retain(|_, v| !v.stale);
    Ok(())
}

/// Re-synthesizes the instanced outputs flagged `changed` by a user edit,
/// without re-running classification. Returns the number of outputs updated.
pub fn update_changed_instanced_outputs(
    output: &mut CookOutput,
    session: &dyn CookSession,
    scene: &mut SceneGraph,
    parent: ComponentId,
) -> usize {
    let changed_keys: Vec<OutputIdentifier> = output
        .instanced_outputs
        .iter()
        .filter(|(_, v)| v.changed)
        .map(|(k, _)| k.clone())
        .collect();

    let mut updated = 0;
    for key in changed_keys {
        let Some(part) = output.parts.iter().find(|p| key.matches(p)).cloned() else {
            warn!(
                "changed instanced output '{}' has no matching part",
                key.part_name
            );
            continue;
        };
        let context = collect_part_context(&part, session, &mut output.assignment_materials);
        let original_index: usize = key.split_identifier.parse().unwrap_or(0);

        let (resolved, assignment) = {
            let Some(entry) = output.instanced_outputs.get_mut(&key) else {
                continue;
            };
            entry.changed = false;
            let resolved = resolve_variations(entry);
            (resolved, entry.transform_variation_indices.clone())
        };

        for variation in &resolved {
            let identifier =
                key.with_split(variation_split(original_index, variation.variation_index));
            let old_component = output
                .output_objects
                .get(&identifier)
                .and_then(|o| o.output_component);
            match synthesize_variation(
                &part,
                &context,
                &assignment,
                variation,
                old_component,
                scene,
                parent,
            ) {
                Ok(component) => {
                    output.output_objects.insert(
                        identifier,
                        OutputObject {
                            output_object: Some(variation.object.clone()),
                            output_component: Some(component),
                            ..Default::default()
                        },
                    );
                }
                Err(err) => warn!(
                    "instancer '{}' variation {}: {}",
                    part.part_name, variation.variation_index, err
                ),
            }
        }

        // Drop components for variation slots this resolution did not emit.
        let emitted: Vec<usize> = resolved.iter().map(|v| v.variation_index).collect();
        let surplus: Vec<OutputIdentifier> = output
            .output_objects
            .keys()
            .filter(|k| k.matches(&part))
            .filter(|k| {
                let prefix = format!("{}_", original_index);
                k.split_identifier
                    .strip_prefix(&prefix)
                    .and_then(|v| v.parse::<usize>().ok())
                    .map(|v| !emitted.contains(&v))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        for stale_key in surplus {
            if let Some(object) = output.output_objects.remove(&stale_key) {
                if let Some(component) = object.output_component {
                    scene.destroy_component(component);
                }
            }
        }
        updated += 1;
    }
    updated
}
