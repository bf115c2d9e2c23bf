//! Error types for instancer translation
//!
//! Every variant here is a *soft* failure: the translator logs it and moves on
//! to the next part / variation / instance. Nothing in this crate aborts a
//! cook. Fatal conditions (session unavailable, node creation failure) belong
//! to the bootstrap layer that owns the session, not to translation.

use thiserror::Error;

/// Soft failures raised while translating instancer parts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TranslateError {
    /// The classifier could not extract any (object, transforms) pair for a part.
    #[error("instancer part '{part_name}' produced no instanced objects")]
    EmptyInstancer { part_name: String },

    /// The classifier extracted objects and transform sets of differing lengths.
    #[error("instancer part '{part_name}' has {objects} objects but {transform_sets} transform sets")]
    MismatchedInstancer {
        part_name: String,
        objects: usize,
        transform_sets: usize,
    },

    /// The session had no transform data for a part that requires it.
    #[error("no instance transforms for geo {geo_id} part {part_id}")]
    MissingTransforms { geo_id: i32, part_id: i32 },

    /// A preview (proxy) mesh can only back a single-instance component.
    #[error("preview mesh '{path}' cannot be instanced {count} times")]
    UnsupportedProxyInstancing { path: String, count: usize },

    /// The scene graph refused a component operation (dead or missing handle).
    #[error("scene component operation failed: {0}")]
    Scene(String),
}
