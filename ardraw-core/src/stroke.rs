//! # Strokes
//!
//! Freehand polylines drawn over the overlay, in the anchor's local normalized coordinates.
//! The image spans `[-0.5, 0.5]` on both axes, `x` along the image width and `y` along its height
//! (the anchor's local Z).

use crate::color::Rgba;
use crate::pose::Pose;
use crate::transform::PhysicalExtent;

#[repr(C)]
#[derive(Copy, Clone, PartialEq, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StrokePoint {
    pub x: f32,
    pub y: f32,
}
impl StrokePoint {
    #[must_use]
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
    /// Whether the point lies on the image, edges inclusive.
    #[must_use]
    pub fn is_within_bounds(&self) -> bool {
        (-0.5..=0.5).contains(&self.x) && (-0.5..=0.5).contains(&self.y)
    }
}

#[derive(Clone, PartialEq, Debug, Default)]
pub struct Stroke {
    pub points: Vec<StrokePoint>,
    pub color: Rgba,
}
impl Stroke {
    /// Whether there's enough here to draw a line.
    #[must_use]
    pub fn is_drawable(&self) -> bool {
        self.points.len() >= 2
    }
}

/// The strokes of one drawing session, in insertion order. Later strokes draw on top.
///
/// Only the last stroke can be open (receiving points). Beginning a new stroke closes it.
#[derive(Clone, Debug, Default)]
pub struct StrokeSet {
    strokes: Vec<Stroke>,
    open: bool,
}
impl StrokeSet {
    /// Start a new stroke, closing any open one.
    pub fn begin(&mut self, color: Rgba) {
        self.strokes.push(Stroke {
            points: Vec::new(),
            color,
        });
        self.open = true;
    }
    /// Append a point to the open stroke. With no open stroke, one is started with the default
    /// color.
    pub fn push(&mut self, point: StrokePoint) {
        if !self.open {
            self.begin(Rgba::default());
        }
        // Just ensured there is an open, last stroke.
        if let Some(stroke) = self.strokes.last_mut() {
            stroke.points.push(point);
        }
    }
    /// Close the open stroke, if any. It's immutable from here on.
    pub fn end(&mut self) {
        self.open = false;
    }
    pub fn clear(&mut self) {
        self.strokes.clear();
        self.open = false;
    }
    pub fn iter(&self) -> impl Iterator<Item = &Stroke> + '_ {
        self.strokes.iter()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty()
    }
    #[must_use]
    pub fn len(&self) -> usize {
        self.strokes.len()
    }
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open
    }
}

/// Convert a world-space point (e.g. a touch ray's hit on the image plane) into the anchor-local
/// normalized coordinates strokes are stored in. `None` if it falls outside the image.
#[must_use]
pub fn anchor_local_point(
    anchor_pose: &Pose,
    extent: PhysicalExtent,
    world: [f32; 3],
) -> Option<StrokePoint> {
    if extent.x <= 0.0 || extent.z <= 0.0 {
        return None;
    }
    let [x, _, z] = anchor_pose.inverse().transform_point(world);
    let point = StrokePoint::new(x / extent.x, z / extent.z);
    point.is_within_bounds().then_some(point)
}
