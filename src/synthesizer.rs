//! Component synthesis
//!
//! Materializes one (object, transforms) pair as a scene component. The
//! concrete representation is picked from the object kind and transform count,
//! recorded on the component as a [`ComponentKind`], and compared by value on
//! the next cook: matching kinds update the existing component in place,
//! differing kinds create a replacement and destroy the old one afterwards.
//!
//! Materials, per-instance colors and generic property overrides carry no
//! state between cooks; they are reapplied in full every time.

use log::warn;

use crate::attributes::{AttributeOwner, PropertyAttribute};
use crate::error::TranslateError;
use crate::math::Transform3;
use crate::scene::{ComponentId, ComponentKind, ObjectKind, ObjectRef, SceneGraph};

/// Everything synthesis needs besides the object and its transforms.
pub struct SynthesisContext<'a> {
    pub scene: &'a mut SceneGraph,
    /// Component all synthesized components attach under.
    pub parent: ComponentId,
    /// Instancer part transform, applied as the relative transform of batched
    /// components.
    pub part_transform: Transform3,
    /// One sub-component per instance instead of a batched array.
    pub split_instances: bool,
    /// Per-instance color overrides (split components only).
    pub instance_colors: Vec<[f32; 4]>,
    /// Materials for this component, already resolved per variation.
    pub materials: Vec<ObjectRef>,
    /// Generic property overrides collected from the instancer part.
    pub properties: Vec<PropertyAttribute>,
}

impl<'a> SynthesisContext<'a> {
    pub fn new(scene: &'a mut SceneGraph, parent: ComponentId) -> Self {
        Self {
            scene,
            parent,
            part_transform: Transform3::IDENTITY,
            split_instances: false,
            instance_colors: Vec::new(),
            materials: Vec::new(),
            properties: Vec::new(),
        }
    }
}

/// Picks the component representation for an object and transform count.
pub fn decide_component_kind(
    object: &ObjectRef,
    transform_count: usize,
    split_instances: bool,
) -> Result<ComponentKind, TranslateError> {
    match object.kind {
        ObjectKind::Mesh { lod_count } => {
            if split_instances {
                Ok(ComponentKind::SplitMesh)
            } else if transform_count == 1 {
                Ok(ComponentKind::StaticMesh)
            } else if lod_count > 1 {
                Ok(ComponentKind::HierarchicalInstancedMesh)
            } else {
                Ok(ComponentKind::InstancedMesh)
            }
        }
        ObjectKind::ProxyMesh => {
            if transform_count <= 1 {
                Ok(ComponentKind::ProxyMesh)
            } else {
                Err(TranslateError::UnsupportedProxyInstancing {
                    path: object.path.clone(),
                    count: transform_count,
                })
            }
        }
        ObjectKind::Material | ObjectKind::Spawnable => Ok(ComponentKind::InstancedActors),
    }
}

/// Creates or updates the component placing `object` at `transforms`.
///
/// An old component of the same kind is updated in place; a kind change
/// creates the replacement first and destroys the old component after, so a
/// failure never leaves the output with neither.
pub fn create_or_update_component(
    object: &ObjectRef,
    transforms: &[Transform3],
    ctx: &mut SynthesisContext,
    old_component: Option<ComponentId>,
) -> Result<ComponentId, TranslateError> {
    let kind = decide_component_kind(object, transforms.len(), ctx.split_instances)?;

    let reusable = old_component
        .filter(|&id| {
            ctx.scene
                .component(id)
                .map(|c| c.kind == kind)
                .unwrap_or(false)
        });

    let id = match reusable {
        Some(id) => id,
        None => {
            let id = ctx.scene.create_component(kind, object.clone());
            ctx.scene
                .attach(id, ctx.parent)
                .map_err(TranslateError::Scene)?;
            ctx.scene.register(id).map_err(TranslateError::Scene)?;
            id
        }
    };

    let object_changed;
    {
        let component = ctx
            .scene
            .component_mut(id)
            .ok_or_else(|| TranslateError::Scene(format!("component {:?} vanished", id)))?;
        object_changed = component.object != *object;
        component.object = object.clone();
        component.transforms.clear();
        component.transforms.extend_from_slice(transforms);
        component.relative_transform = match kind {
            ComponentKind::InstancedMesh
            | ComponentKind::HierarchicalInstancedMesh
            | ComponentKind::SplitMesh
            | ComponentKind::InstancedActors => ctx.part_transform,
            _ => Transform3::IDENTITY,
        };
        component.materials = ctx.materials.clone();
        component.instance_colors.clear();
        component.instance_properties.clear();
        component.properties.clear();
        if kind == ComponentKind::SplitMesh && !ctx.instance_colors.is_empty() {
            if ctx.instance_colors.len() == transforms.len() {
                component.instance_colors = ctx.instance_colors.clone();
            } else {
                warn!(
                    "ignoring {} instance colors for {} instances on '{}'",
                    ctx.instance_colors.len(),
                    transforms.len(),
                    object.path
                );
            }
        }
    }

    if kind == ComponentKind::InstancedActors {
        sync_actors(ctx.scene, id, object, transforms, object_changed)?;
    }

    apply_properties(ctx.scene, id, kind, &ctx.properties, transforms.len());

    // Replace-then-destroy: the old component goes away only once the new one
    // is attached and populated.
    if let Some(old) = old_component {
        if old != id {
            ctx.scene.destroy_component(old);
        }
    }
    Ok(id)
}

/// Reconciles the spawned actors of an actor component with the transform
/// list. Actors are reused positionally; a change of instanced object
/// invalidates all of them.
fn sync_actors(
    scene: &mut SceneGraph,
    id: ComponentId,
    object: &ObjectRef,
    transforms: &[Transform3],
    object_changed: bool,
) -> Result<(), TranslateError> {
    let mut actors = {
        let component = scene
            .component_mut(id)
            .ok_or_else(|| TranslateError::Scene(format!("component {:?} vanished", id)))?;
        std::mem::take(&mut component.actors)
    };

    if object_changed {
        for actor in actors.drain(..).flatten() {
            scene.destroy_actor(actor);
        }
    }
    while actors.len() > transforms.len() {
        if let Some(Some(actor)) = actors.pop() {
            scene.destroy_actor(actor);
        }
    }
    for (index, transform) in transforms.iter().enumerate() {
        match actors.get(index).copied().flatten() {
            Some(actor) => {
                if let Some(actor) = scene.actor_mut(actor) {
                    actor.transform = *transform;
                } else {
                    actors[index] = Some(scene.spawn_actor(object.clone(), *transform));
                }
            }
            None => {
                let spawned = scene.spawn_actor(object.clone(), *transform);
                if index < actors.len() {
                    actors[index] = Some(spawned);
                } else {
                    actors.push(Some(spawned));
                }
            }
        }
    }

    let component = scene
        .component_mut(id)
        .ok_or_else(|| TranslateError::Scene(format!("component {:?} vanished", id)))?;
    component.actors = actors;
    Ok(())
}

/// Applies generic property overrides to a synthesized component.
///
/// Point-owned overrides become per-instance values on per-instance kinds and
/// fall back to their first value otherwise. Each override is applied
/// independently; a failure is logged and the rest still apply.
fn apply_properties(
    scene: &mut SceneGraph,
    id: ComponentId,
    kind: ComponentKind,
    properties: &[PropertyAttribute],
    transform_count: usize,
) {
    let per_instance_kind =
        matches!(kind, ComponentKind::SplitMesh | ComponentKind::InstancedActors);
    for property in properties {
        if property.owner == AttributeOwner::Point && per_instance_kind {
            for index in 0..transform_count {
                let Some(value) = property.value_at(index) else {
                    continue;
                };
                if let Err(err) =
                    scene.set_component_property(id, &property.property_name, value, Some(index))
                {
                    warn!(
                        "failed to set property '{}' on instance {}: {}",
                        property.property_name, index, err
                    );
                }
            }
        } else {
            let Some(value) = property.value_at(0) else {
                continue;
            };
            if let Err(err) = scene.set_component_property(id, &property.property_name, value, None)
            {
                warn!(
                    "failed to set property '{}': {}",
                    property.property_name, err
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{Attribute, AttributeData, PropertyValue};
    use glam::Vec3;

    fn transforms(count: usize) -> Vec<Transform3> {
        (0..count)
            .map(|i| Transform3::from_translation(Vec3::new(i as f32, 0.0, 0.0)))
            .collect()
    }

    fn proxy(path: &str) -> ObjectRef {
        ObjectRef::new(path, ObjectKind::ProxyMesh)
    }

    #[test]
    fn test_decision_table() {
        let mesh = ObjectRef::mesh("/m/a");
        let lod_mesh = ObjectRef::new("/m/b", ObjectKind::Mesh { lod_count: 3 });
        let spawnable = ObjectRef::new("/bp/torch", ObjectKind::Spawnable);

        assert_eq!(
            decide_component_kind(&mesh, 1, false).unwrap(),
            ComponentKind::StaticMesh
        );
        assert_eq!(
            decide_component_kind(&mesh, 5, false).unwrap(),
            ComponentKind::InstancedMesh
        );
        assert_eq!(
            decide_component_kind(&lod_mesh, 5, false).unwrap(),
            ComponentKind::HierarchicalInstancedMesh
        );
        assert_eq!(
            decide_component_kind(&mesh, 5, true).unwrap(),
            ComponentKind::SplitMesh
        );
        assert_eq!(
            decide_component_kind(&proxy("/p/a"), 1, false).unwrap(),
            ComponentKind::ProxyMesh
        );
        assert_eq!(
            decide_component_kind(&spawnable, 4, false).unwrap(),
            ComponentKind::InstancedActors
        );
        assert!(matches!(
            decide_component_kind(&proxy("/p/a"), 3, false),
            Err(TranslateError::UnsupportedProxyInstancing { count: 3, .. })
        ));
    }

    #[test]
    fn test_same_kind_is_reused_in_place() {
        let mut scene = SceneGraph::new();
        let parent = scene.create_root();
        let object = ObjectRef::mesh("/m/a");

        let first = {
            let mut ctx = SynthesisContext::new(&mut scene, parent);
            create_or_update_component(&object, &transforms(4), &mut ctx, None).unwrap()
        };
        let swapped = ObjectRef::mesh("/m/b");
        let second = {
            let mut ctx = SynthesisContext::new(&mut scene, parent);
            create_or_update_component(&swapped, &transforms(6), &mut ctx, Some(first)).unwrap()
        };
        assert_eq!(first, second);
        let component = scene.component(second).unwrap();
        assert_eq!(component.object.path, "/m/b");
        assert_eq!(component.transforms.len(), 6);
    }

    #[test]
    fn test_kind_change_replaces_and_destroys_old() {
        let mut scene = SceneGraph::new();
        let parent = scene.create_root();
        let object = ObjectRef::mesh("/m/a");

        let batched = {
            let mut ctx = SynthesisContext::new(&mut scene, parent);
            create_or_update_component(&object, &transforms(4), &mut ctx, None).unwrap()
        };
        // Dropping to one transform switches to a single-instance component.
        let single = {
            let mut ctx = SynthesisContext::new(&mut scene, parent);
            create_or_update_component(&object, &transforms(1), &mut ctx, Some(batched)).unwrap()
        };
        assert_ne!(batched, single);
        assert!(!scene.is_live(batched));
        assert_eq!(scene.component(single).unwrap().kind, ComponentKind::StaticMesh);
    }

    #[test]
    fn test_update_is_idempotent() {
        let mut scene = SceneGraph::new();
        let parent = scene.create_root();
        let object = ObjectRef::mesh("/m/a");
        let list = transforms(5);

        let first = {
            let mut ctx = SynthesisContext::new(&mut scene, parent);
            create_or_update_component(&object, &list, &mut ctx, None).unwrap()
        };
        let before = scene.component(first).unwrap().clone();
        let second = {
            let mut ctx = SynthesisContext::new(&mut scene, parent);
            create_or_update_component(&object, &list, &mut ctx, Some(first)).unwrap()
        };
        assert_eq!(first, second);
        let after = scene.component(second).unwrap();
        assert_eq!(before.transforms, after.transforms);
        assert_eq!(before.kind, after.kind);
        assert_eq!(scene.live_component_count(), 2);
    }

    #[test]
    fn test_actor_component_reuses_actors_positionally() {
        let mut scene = SceneGraph::new();
        let parent = scene.create_root();
        let object = ObjectRef::new("/bp/torch", ObjectKind::Spawnable);

        let id = {
            let mut ctx = SynthesisContext::new(&mut scene, parent);
            create_or_update_component(&object, &transforms(3), &mut ctx, None).unwrap()
        };
        let actors_before: Vec<_> = scene.component(id).unwrap().actors.clone();
        assert_eq!(scene.live_actor_count(), 3);

        // Shrink to 2: first two actors survive, third is despawned.
        let id2 = {
            let mut ctx = SynthesisContext::new(&mut scene, parent);
            create_or_update_component(&object, &transforms(2), &mut ctx, Some(id)).unwrap()
        };
        assert_eq!(id, id2);
        let actors_after: Vec<_> = scene.component(id).unwrap().actors.clone();
        assert_eq!(actors_after.len(), 2);
        assert_eq!(actors_after[0], actors_before[0]);
        assert_eq!(actors_after[1], actors_before[1]);
        assert_eq!(scene.live_actor_count(), 2);
    }

    #[test]
    fn test_actor_component_respawns_on_object_change() {
        let mut scene = SceneGraph::new();
        let parent = scene.create_root();
        let torch = ObjectRef::new("/bp/torch", ObjectKind::Spawnable);
        let lamp = ObjectRef::new("/bp/lamp", ObjectKind::Spawnable);

        let id = {
            let mut ctx = SynthesisContext::new(&mut scene, parent);
            create_or_update_component(&torch, &transforms(2), &mut ctx, None).unwrap()
        };
        let before: Vec<_> = scene.component(id).unwrap().actors.clone();
        {
            let mut ctx = SynthesisContext::new(&mut scene, parent);
            create_or_update_component(&lamp, &transforms(2), &mut ctx, Some(id)).unwrap();
        }
        let after: Vec<_> = scene.component(id).unwrap().actors.clone();
        assert!(before.iter().all(|a| !after.contains(a)));
        assert_eq!(scene.live_actor_count(), 2);
    }

    #[test]
    fn test_split_component_takes_matching_colors_only() {
        let mut scene = SceneGraph::new();
        let parent = scene.create_root();
        let object = ObjectRef::mesh("/m/a");

        let id = {
            let mut ctx = SynthesisContext::new(&mut scene, parent);
            ctx.split_instances = true;
            ctx.instance_colors = vec![[1.0, 0.0, 0.0, 1.0], [0.0, 1.0, 0.0, 1.0]];
            create_or_update_component(&object, &transforms(2), &mut ctx, None).unwrap()
        };
        assert_eq!(scene.component(id).unwrap().instance_colors.len(), 2);

        // Length mismatch: colors dropped, component still built.
        let id2 = {
            let mut ctx = SynthesisContext::new(&mut scene, parent);
            ctx.split_instances = true;
            ctx.instance_colors = vec![[1.0, 0.0, 0.0, 1.0]];
            create_or_update_component(&object, &transforms(3), &mut ctx, Some(id)).unwrap()
        };
        assert!(scene.component(id2).unwrap().instance_colors.is_empty());
    }

    #[test]
    fn test_point_properties_apply_per_instance_on_split() {
        let mut scene = SceneGraph::new();
        let parent = scene.create_root();
        let object = ObjectRef::mesh("/m/a");
        let attr = Attribute::new(
            "prop_priority",
            AttributeOwner::Point,
            1,
            AttributeData::Int(vec![1, 2]),
        );
        let property = PropertyAttribute::from_attribute(&attr).unwrap();

        let id = {
            let mut ctx = SynthesisContext::new(&mut scene, parent);
            ctx.split_instances = true;
            ctx.properties = vec![property];
            create_or_update_component(&object, &transforms(2), &mut ctx, None).unwrap()
        };
        let component = scene.component(id).unwrap();
        assert_eq!(
            component.instance_properties[0].get("priority"),
            Some(&PropertyValue::Int(1))
        );
        assert_eq!(
            component.instance_properties[1].get("priority"),
            Some(&PropertyValue::Int(2))
        );
    }
}
