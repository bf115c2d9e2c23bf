//! Cookbridge instancer translation library
//!
//! Translates the instancer parts of a cooked procedural output into scene
//! components: classifies each part's instancing scheme, distributes instance
//! transforms across user-defined variations, synthesizes or updates the
//! matching component kind, and reconciles against the previous cook so only
//! stale components are destroyed.

pub mod attributes;
pub mod classifier;
pub mod error;
pub mod geo;
pub mod math;
pub mod outputs;
pub mod reconciler;
pub mod resolver;
pub mod scene;
pub mod session;
pub mod synthesizer;
pub mod translator;

// Re-export the types most consumers need
pub use error::TranslateError;
pub use geo::{GeoPartObject, InstancerType, PartType};
pub use math::Transform3;
pub use outputs::{CookOutput, InstancedOutput, OutputIdentifier, OutputObject};
pub use scene::{ComponentId, ComponentKind, ObjectKind, ObjectRef, SceneGraph};
pub use session::{CookSession, MemorySession};
pub use translator::{create_all_instancers, update_changed_instanced_outputs};
