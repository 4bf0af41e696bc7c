//! # Poses
//!
//! Rigid transforms as reported by the tracking engine: a translation and a unit orientation
//! quaternion. Poses are immutable per-frame snapshots.

use cgmath::{InnerSpace, Matrix4, Quaternion, Vector3};

#[derive(Copy, Clone, PartialEq, Debug)]
pub struct Pose {
    pub translation: Vector3<f32>,
    /// Unit quaternion.
    pub rotation: Quaternion<f32>,
}
impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}
impl Pose {
    pub const IDENTITY: Self = Self {
        translation: Vector3::new(0.0, 0.0, 0.0),
        rotation: Quaternion::new(1.0, 0.0, 0.0, 0.0),
    };
    /// Create from a position and an `[x, y, z, w]` quaternion, the order tracking engines report.
    #[must_use]
    pub fn new(translation: [f32; 3], [x, y, z, w]: [f32; 4]) -> Self {
        Self {
            translation: translation.into(),
            rotation: Quaternion::new(w, x, y, z),
        }
    }
    #[must_use]
    pub fn from_translation(translation: [f32; 3]) -> Self {
        Self {
            translation: translation.into(),
            ..Self::IDENTITY
        }
    }
    /// Column-major rigid transform, rotation applied first.
    #[must_use]
    pub fn to_matrix(&self) -> Matrix4<f32> {
        Matrix4::from_translation(self.translation) * Matrix4::from(self.rotation)
    }
    /// The pose that undoes this one, i.e. world space to this pose's local space.
    #[must_use]
    pub fn inverse(&self) -> Self {
        let rotation = self.rotation.conjugate();
        Self {
            translation: -(rotation * self.translation),
            rotation,
        }
    }
    #[must_use]
    pub fn transform_point(&self, point: [f32; 3]) -> [f32; 3] {
        (self.rotation * Vector3::from(point) + self.translation).into()
    }
    /// Euclidean distance between translations.
    #[must_use]
    pub fn position_delta(&self, other: &Self) -> f32 {
        (self.translation - other.translation).magnitude()
    }
    /// `acos` of the clamped quaternion dot product, in radians.
    ///
    /// This is half the true angular difference and ignores the `q == -q` double cover, as
    /// the stability thresholds are tuned against exactly this measure.
    #[must_use]
    pub fn rotation_delta(&self, other: &Self) -> f32 {
        self.rotation.dot(other.rotation).clamp(-1.0, 1.0).acos()
    }
}
