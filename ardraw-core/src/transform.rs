//! # Transforms
//!
//! Model/view/projection composition for anchored content. Every drawable instance gets
//! `projection * view * model`, with the model built from a pose and one of two kinds of scale.

use cgmath::{Matrix4, SquareMatrix};

use crate::pose::Pose;

/// Physical size of a tracked image, in the tracking engine's world units.
///
/// Images lie flat in their local XZ plane, so `x` is width and `z` is height.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct PhysicalExtent {
    pub x: f32,
    pub z: f32,
}
impl PhysicalExtent {
    #[must_use]
    pub fn new(x: f32, z: f32) -> Self {
        Self { x, z }
    }
}

/// Where an instance's scale comes from. These are not interchangeable: a cosmetic scale is
/// uniform and arbitrary, an extent is measured and stretches only the plane of the image.
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum ModelScale {
    /// Fixed uniform scale for decorations.
    Cosmetic(f32),
    /// Measured size of a tracked image. Y is left unscaled.
    Extent(PhysicalExtent),
}
impl ModelScale {
    #[must_use]
    pub fn to_matrix(self) -> Matrix4<f32> {
        match self {
            Self::Cosmetic(scale) => Matrix4::from_scale(scale),
            Self::Extent(PhysicalExtent { x, z }) => Matrix4::from_nonuniform_scale(x, 1.0, z),
        }
    }
}

/// Pose matrix times scale matrix. Scale is applied in the pose's local space.
#[must_use]
pub fn model_matrix(pose: &Pose, scale: ModelScale) -> Matrix4<f32> {
    pose.to_matrix() * scale.to_matrix()
}

/// `projection * view * model`.
#[must_use]
pub fn model_view_projection(
    projection: &Matrix4<f32>,
    view: &Matrix4<f32>,
    model: &Matrix4<f32>,
) -> Matrix4<f32> {
    projection * view * model
}

/// Near and far clip distances handed to the tracking engine when requesting a projection.
#[derive(Copy, Clone, PartialEq, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ClipPlanes {
    pub near: f32,
    pub far: f32,
}
impl Default for ClipPlanes {
    fn default() -> Self {
        Self {
            near: 0.1,
            far: 100.0,
        }
    }
}

/// The camera half of the MVP, as reported for a single frame.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct CameraMatrices {
    pub view: Matrix4<f32>,
    pub projection: Matrix4<f32>,
}
impl Default for CameraMatrices {
    fn default() -> Self {
        Self {
            view: Matrix4::identity(),
            projection: Matrix4::identity(),
        }
    }
}
impl CameraMatrices {
    #[must_use]
    pub fn mvp(&self, model: &Matrix4<f32>) -> Matrix4<f32> {
        model_view_projection(&self.projection, &self.view, model)
    }
    /// MVP for a pose and scale in one go.
    #[must_use]
    pub fn mvp_for(&self, pose: &Pose, scale: ModelScale) -> Matrix4<f32> {
        self.mvp(&model_matrix(pose, scale))
    }
}
