//! Scene-graph abstraction consumed by the translator
//!
//! The host editor's scene is modeled as a flat store of components and
//! spawned actors addressed by opaque ids. Ids are monotonic and never reused,
//! so handle equality doubles as object identity across cooks. Every entry
//! carries an explicit `alive` flag: a component that has been destroyed but
//! whose handle is still held somewhere is treated as absent by all accessors.
//!
//! Each component records its [`ComponentKind`] once at creation time; reuse
//! decisions compare kinds by value instead of inspecting a live object's
//! runtime type.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::attributes::PropertyValue;
use crate::math::Transform3;

/// What an instanced object is, as far as component synthesis cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    /// A full-resolution mesh with the given number of detail levels.
    Mesh { lod_count: usize },
    /// A lightweight preview mesh, only valid for single-instance components.
    ProxyMesh,
    /// A material, referenced by override attributes.
    Material,
    /// Anything placed by spawning an actor per transform (blueprints,
    /// sounds, particle systems, ...).
    Spawnable,
}

/// Reference to an object the scene can place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub path: String,
    pub kind: ObjectKind,
}

impl ObjectRef {
    pub fn new(path: impl Into<String>, kind: ObjectKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    /// A mesh object with a single detail level.
    pub fn mesh(path: impl Into<String>) -> Self {
        Self::new(path, ObjectKind::Mesh { lod_count: 1 })
    }

    pub fn is_proxy_mesh(&self) -> bool {
        self.kind == ObjectKind::ProxyMesh
    }
}

/// Handle to a live scene component. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentId(pub u64);

/// Handle to a spawned actor. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorId(pub u64);

/// Concrete placement representation, chosen by the synthesizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentKind {
    /// Plain grouping component (used for attachment roots).
    Group,
    /// Single-instance mesh component.
    StaticMesh,
    /// Batched flat instance array.
    InstancedMesh,
    /// Batched instance array with per-LOD hierarchy.
    HierarchicalInstancedMesh,
    /// One sub-component per instance.
    SplitMesh,
    /// Single-instance preview mesh component.
    ProxyMesh,
    /// One spawned actor per transform.
    InstancedActors,
}

/// One live component in the scene.
#[derive(Debug, Clone)]
pub struct SceneComponent {
    pub id: ComponentId,
    pub kind: ComponentKind,
    pub object: ObjectRef,
    pub transforms: Vec<Transform3>,
    /// Transform relative to the attachment parent (the instancer part's own
    /// transform for batched kinds).
    pub relative_transform: Transform3,
    pub materials: Vec<ObjectRef>,
    /// Per-instance vertex color overrides (split components only).
    pub instance_colors: Vec<[f32; 4]>,
    /// Component-level property overrides applied via `prop_*` attributes.
    pub properties: HashMap<String, PropertyValue>,
    /// Per-instance property overrides (split and actor components).
    pub instance_properties: Vec<HashMap<String, PropertyValue>>,
    /// Spawned actor per transform slot (actor components only). A slot is
    /// `None` when spawning failed for that index.
    pub actors: Vec<Option<ActorId>>,
    pub parent: Option<ComponentId>,
    pub registered: bool,
    pub alive: bool,
}

/// One spawned actor in the scene.
#[derive(Debug, Clone)]
pub struct SceneActor {
    pub id: ActorId,
    pub object: ObjectRef,
    pub transform: Transform3,
    pub properties: HashMap<String, PropertyValue>,
    pub alive: bool,
}

/// Flat component/actor store standing in for the host scene.
#[derive(Debug, Default)]
pub struct SceneGraph {
    components: HashMap<ComponentId, SceneComponent>,
    actors: HashMap<ActorId, SceneActor>,
    next_component_id: u64,
    next_actor_id: u64,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new component for the given object. The component starts
    /// detached and unregistered.
    pub fn create_component(&mut self, kind: ComponentKind, object: ObjectRef) -> ComponentId {
        let id = ComponentId(self.next_component_id);
        self.next_component_id += 1;
        self.components.insert(
            id,
            SceneComponent {
                id,
                kind,
                object,
                transforms: Vec::new(),
                relative_transform: Transform3::IDENTITY,
                materials: Vec::new(),
                instance_colors: Vec::new(),
                properties: HashMap::new(),
                instance_properties: Vec::new(),
                actors: Vec::new(),
                parent: None,
                registered: false,
                alive: true,
            },
        );
        id
    }

    /// Creates a plain grouping component, usable as an attachment root.
    pub fn create_root(&mut self) -> ComponentId {
        self.create_component(
            ComponentKind::Group,
            ObjectRef::new("", ObjectKind::Spawnable),
        )
    }

    /// Returns the component if it exists and is alive.
    pub fn component(&self, id: ComponentId) -> Option<&SceneComponent> {
        self.components.get(&id).filter(|c| c.alive)
    }

    /// Mutable access to a live component.
    pub fn component_mut(&mut self, id: ComponentId) -> Option<&mut SceneComponent> {
        self.components.get_mut(&id).filter(|c| c.alive)
    }

    /// True if the handle refers to a live component.
    pub fn is_live(&self, id: ComponentId) -> bool {
        self.component(id).is_some()
    }

    /// Attaches a component to a parent component.
    pub fn attach(&mut self, id: ComponentId, parent: ComponentId) -> Result<(), String> {
        if !self.is_live(parent) {
            return Err(format!("attach target {:?} is not alive", parent));
        }
        let component = self
            .component_mut(id)
            .ok_or_else(|| format!("component {:?} is not alive", id))?;
        component.parent = Some(parent);
        Ok(())
    }

    /// Registers a component so it participates in the scene.
    pub fn register(&mut self, id: ComponentId) -> Result<(), String> {
        let component = self
            .component_mut(id)
            .ok_or_else(|| format!("component {:?} is not alive", id))?;
        component.registered = true;
        Ok(())
    }

    /// Detaches, unregisters and destroys a component, along with any actors
    /// it spawned. Returns false if the handle was already dead.
    pub fn destroy_component(&mut self, id: ComponentId) -> bool {
        let actors = match self.components.get_mut(&id) {
            Some(component) if component.alive => {
                component.parent = None;
                component.registered = false;
                component.alive = false;
                std::mem::take(&mut component.actors)
            }
            _ => return false,
        };
        for actor in actors.into_iter().flatten() {
            self.destroy_actor(actor);
        }
        self.components.remove(&id);
        true
    }

    /// Marks a component dead without removing it. Models a host object that
    /// is logically destroyed but not yet reclaimed.
    pub fn mark_dead(&mut self, id: ComponentId) {
        if let Some(component) = self.components.get_mut(&id) {
            component.alive = false;
        }
    }

    /// Spawns an actor placing `object` at `transform`.
    pub fn spawn_actor(&mut self, object: ObjectRef, transform: Transform3) -> ActorId {
        let id = ActorId(self.next_actor_id);
        self.next_actor_id += 1;
        self.actors.insert(
            id,
            SceneActor {
                id,
                object,
                transform,
                properties: HashMap::new(),
                alive: true,
            },
        );
        id
    }

    /// Returns the actor if it exists and is alive.
    pub fn actor(&self, id: ActorId) -> Option<&SceneActor> {
        self.actors.get(&id).filter(|a| a.alive)
    }

    /// Mutable access to a live actor.
    pub fn actor_mut(&mut self, id: ActorId) -> Option<&mut SceneActor> {
        self.actors.get_mut(&id).filter(|a| a.alive)
    }

    /// Destroys a spawned actor. Returns false if already dead.
    pub fn destroy_actor(&mut self, id: ActorId) -> bool {
        match self.actors.get_mut(&id) {
            Some(actor) if actor.alive => {
                actor.alive = false;
                self.actors.remove(&id);
                true
            }
            _ => false,
        }
    }

    /// Sets a property on a live component, optionally for one instance slot.
    pub fn set_component_property(
        &mut self,
        id: ComponentId,
        name: &str,
        value: PropertyValue,
        instance_index: Option<usize>,
    ) -> Result<(), String> {
        let component = self
            .component_mut(id)
            .ok_or_else(|| format!("component {:?} is not alive", id))?;
        match instance_index {
            Some(index) => {
                if index >= component.transforms.len() {
                    return Err(format!(
                        "instance index {} out of range for component {:?}",
                        index, id
                    ));
                }
                if component.instance_properties.len() < component.transforms.len() {
                    component
                        .instance_properties
                        .resize_with(component.transforms.len(), HashMap::new);
                }
                component.instance_properties[index].insert(name.to_string(), value);
            }
            None => {
                component.properties.insert(name.to_string(), value);
            }
        }
        Ok(())
    }

    /// Sets a property on a live actor.
    pub fn set_actor_property(
        &mut self,
        id: ActorId,
        name: &str,
        value: PropertyValue,
    ) -> Result<(), String> {
        let actor = self
            .actor_mut(id)
            .ok_or_else(|| format!("actor {:?} is not alive", id))?;
        actor.properties.insert(name.to_string(), value);
        Ok(())
    }

    /// Number of live components (tests and diagnostics).
    pub fn live_component_count(&self) -> usize {
        self.components.values().filter(|c| c.alive).count()
    }

    /// Number of live actors (tests and diagnostics).
    pub fn live_actor_count(&self) -> usize {
        self.actors.values().filter(|a| a.alive).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_ids_are_never_reused() {
        let mut scene = SceneGraph::new();
        let a = scene.create_component(ComponentKind::InstancedMesh, ObjectRef::mesh("/m/a"));
        scene.destroy_component(a);
        let b = scene.create_component(ComponentKind::InstancedMesh, ObjectRef::mesh("/m/a"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_dead_component_is_absent() {
        let mut scene = SceneGraph::new();
        let id = scene.create_component(ComponentKind::StaticMesh, ObjectRef::mesh("/m/a"));
        assert!(scene.is_live(id));
        scene.mark_dead(id);
        assert!(!scene.is_live(id));
        assert!(scene.component(id).is_none());
    }

    #[test]
    fn test_destroy_component_despawns_owned_actors() {
        let mut scene = SceneGraph::new();
        let id = scene.create_component(
            ComponentKind::InstancedActors,
            ObjectRef::new("/bp/torch", ObjectKind::Spawnable),
        );
        let actor = scene.spawn_actor(
            ObjectRef::new("/bp/torch", ObjectKind::Spawnable),
            Transform3::IDENTITY,
        );
        scene.component_mut(id).unwrap().actors.push(Some(actor));
        assert_eq!(scene.live_actor_count(), 1);
        scene.destroy_component(id);
        assert_eq!(scene.live_actor_count(), 0);
    }

    #[test]
    fn test_instance_property_requires_valid_slot() {
        let mut scene = SceneGraph::new();
        let id = scene.create_component(ComponentKind::SplitMesh, ObjectRef::mesh("/m/a"));
        scene.component_mut(id).unwrap().transforms = vec![Transform3::IDENTITY];
        assert!(scene
            .set_component_property(id, "tint", PropertyValue::Float(0.5), Some(0))
            .is_ok());
        assert!(scene
            .set_component_property(id, "tint", PropertyValue::Float(0.5), Some(3))
            .is_err());
    }
}
