//! Output reconciliation
//!
//! After a cook rebuilds an output's object map, the previous map is diffed
//! against it and every component the new map no longer references is
//! destroyed. "Still referenced" means handle equality: component ids are
//! never reused, so an id appearing in both maps is the same live component,
//! updated in place by the synthesizer. A handle whose component is already
//! dead is treated as absent and skipped.

use std::collections::HashMap;

use crate::outputs::{OutputIdentifier, OutputObject};
use crate::scene::{ComponentId, SceneGraph};

/// Destroys every component of `old_objects` that `new_objects` does not
/// still reference. Returns the number of components destroyed.
pub fn reconcile_outputs(
    new_objects: &HashMap<OutputIdentifier, OutputObject>,
    old_objects: &HashMap<OutputIdentifier, OutputObject>,
    scene: &mut SceneGraph,
) -> usize {
    let mut destroyed = 0;
    for (identifier, old_object) in old_objects {
        let kept = new_objects.get(identifier);
        for component in [old_object.output_component, old_object.proxy_component] {
            let Some(id) = component else {
                continue;
            };
            if is_still_referenced(kept, id) {
                continue;
            }
            if scene.destroy_component(id) {
                destroyed += 1;
            }
        }
    }
    destroyed
}

fn is_still_referenced(kept: Option<&OutputObject>, id: ComponentId) -> bool {
    kept.map(|object| object.output_component == Some(id) || object.proxy_component == Some(id))
        .unwrap_or(false)
}
