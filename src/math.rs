//! Transform math for instance placement
//!
//! Instance transforms are kept in decomposed TRS form rather than as matrices:
//! variation offsets compose per-channel (additive position, quaternion
//! rotation product, component-wise scale), which has no clean matrix
//! equivalent once non-uniform scale is involved.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Minimum magnitude allowed for a scale component.
///
/// Batched instance rendering needs an invertible transform per instance.
/// Scale components below this threshold are clamped to it (sign preserved)
/// instead of being rejected.
pub const SCALE_SMALL_VALUE: f32 = 1.0e-4;

/// Tolerance used for identity / equality checks on transforms.
pub const TRANSFORM_EPSILON: f32 = 1.0e-6;

/// A decomposed translation / rotation / scale transform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform3 {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform3 {
    /// The identity transform.
    pub const IDENTITY: Transform3 = Transform3 {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    /// Creates a transform from a translation, with identity rotation and unit scale.
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    /// Creates a transform from translation, rotation and scale.
    pub fn new(translation: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            translation,
            rotation,
            scale,
        }
    }

    /// Approximate equality, used to detect identity offsets.
    pub fn approx_eq(&self, other: &Transform3) -> bool {
        self.translation.abs_diff_eq(other.translation, TRANSFORM_EPSILON)
            && self.rotation.abs_diff_eq(other.rotation, TRANSFORM_EPSILON)
            && self.scale.abs_diff_eq(other.scale, TRANSFORM_EPSILON)
    }

    /// Returns true if this transform is (approximately) the identity.
    pub fn is_identity(&self) -> bool {
        self.approx_eq(&Self::IDENTITY)
    }

    /// Returns true if all components are finite.
    pub fn is_finite(&self) -> bool {
        self.translation.is_finite() && self.rotation.is_finite() && self.scale.is_finite()
    }

    /// Composes a variation offset onto this transform.
    ///
    /// Position is additive, rotation is a quaternion product, scale is a
    /// component-wise product. Scale components whose magnitude falls below
    /// [`SCALE_SMALL_VALUE`] are clamped to it, preserving sign, so the result
    /// stays invertible. If composition produces a non-finite transform the
    /// original is returned unchanged.
    pub fn with_offset(&self, offset: &Transform3) -> Transform3 {
        let translation = self.translation + offset.translation;
        let rotation = self.rotation * offset.rotation;
        let scale = clamp_scale(self.scale * offset.scale);

        let result = Transform3::new(translation, rotation, scale);
        if result.is_finite() {
            result
        } else {
            *self
        }
    }
}

impl Default for Transform3 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Clamps each scale component away from zero, preserving sign.
fn clamp_scale(scale: Vec3) -> Vec3 {
    Vec3::new(
        clamp_scale_component(scale.x),
        clamp_scale_component(scale.y),
        clamp_scale_component(scale.z),
    )
}

fn clamp_scale_component(value: f32) -> f32 {
    if value.abs() >= SCALE_SMALL_VALUE {
        return value;
    }
    if value < 0.0 {
        -SCALE_SMALL_VALUE
    } else {
        SCALE_SMALL_VALUE
    }
}
