//! # Tracking data model
//!
//! Everything the external tracking engine reports, and the seam it is reached through. The core
//! never computes tracking itself, it only reads these snapshots once per frame.

use crate::color::Rgba;
use crate::pose::Pose;
use crate::transform::{CameraMatrices, ClipPlanes, PhysicalExtent};

/// Coarse tracking state of a trackable or anchor.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, strum::AsRefStr)]
pub enum TrackingState {
    Tracking,
    /// Temporarily not tracked, may resume.
    Paused,
    /// Will never be tracked again.
    Stopped,
}
impl TrackingState {
    /// Tracking or temporarily paused, as opposed to gone for good.
    #[must_use]
    pub fn is_detected(self) -> bool {
        matches!(self, Self::Tracking | Self::Paused)
    }
}

/// How a tracked image's pose is being produced.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, strum::AsRefStr)]
pub enum TrackingMethod {
    /// Image is in view and its pose is measured this frame.
    FullTracking,
    /// Image left the view, the pose is remembered.
    LastKnownPose,
    NotTracking,
}
impl TrackingMethod {
    /// Wireframe tint communicating tracking quality: green, yellow, or red.
    #[must_use]
    pub fn tint(self) -> Rgba {
        match self {
            Self::FullTracking => Rgba::from_array_unchecked([0.2, 1.0, 0.2, 1.0]),
            Self::LastKnownPose => Rgba::from_array_unchecked([1.0, 1.0, 0.2, 1.0]),
            Self::NotTracking => Rgba::from_array_unchecked([1.0, 0.3, 0.3, 1.0]),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct TrackableId(pub u64);
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct AnchorId(pub u64);

/// Per-frame snapshot of a recognized reference image.
#[derive(Clone, PartialEq, Debug)]
pub struct Trackable {
    pub id: TrackableId,
    /// Name of the reference image in the tracking database.
    pub name: String,
    pub state: TrackingState,
    pub method: TrackingMethod,
    pub center_pose: Pose,
    pub extent: PhysicalExtent,
}

/// Per-frame snapshot of an engine-side anchor.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct AnchorSnapshot {
    pub id: AnchorId,
    pub pose: Pose,
    pub state: TrackingState,
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default, strum::AsRefStr)]
pub enum DisplayRotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

/// Viewport size and orientation, forwarded to the engine so it can fit the camera image.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct DisplayGeometry {
    pub rotation: DisplayRotation,
    pub width: u32,
    pub height: u32,
}

/// Everything the engine reports for one camera frame.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct TrackingFrame {
    pub camera: CameraMatrices,
    /// Texture coordinates for the full-screen background quad's four corners, in strip order,
    /// after accounting for display rotation and aspect. `None` if the engine could not
    /// provide them this frame.
    pub display_uv: Option<[[f32; 2]; 4]>,
    pub trackables: Vec<Trackable>,
    pub anchors: Vec<AnchorSnapshot>,
}
impl TrackingFrame {
    #[must_use]
    pub fn trackable(&self, id: TrackableId) -> Option<&Trackable> {
        self.trackables.iter().find(|t| t.id == id)
    }
    #[must_use]
    pub fn anchor(&self, id: AnchorId) -> Option<&AnchorSnapshot> {
        self.anchors.iter().find(|a| a.id == id)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackingError {
    #[error("tracking engine is not available on this device")]
    Unavailable,
    #[error("device is not supported: {0}")]
    Unsupported(String),
    #[error("tracking session is paused")]
    Paused,
    #[error("frame update failed: {0}")]
    Update(String),
    #[error("failed to create anchor: {0}")]
    AnchorCreation(String),
}

/// The external tracking engine.
///
/// Implementations are driven once per display refresh from the render thread.
pub trait TrackingEngine {
    /// Fetch the latest frame, with a projection for the given clip planes.
    fn update(&mut self, clip: ClipPlanes) -> Result<TrackingFrame, TrackingError>;
    /// Ask the engine to attach an anchor to a trackable at the given pose.
    fn create_anchor(
        &mut self,
        trackable: TrackableId,
        pose: &Pose,
    ) -> Result<AnchorId, TrackingError>;
    fn set_display_geometry(&mut self, geometry: DisplayGeometry);
    /// Detach the session. No frames are produced until [`TrackingEngine::resume`].
    fn pause(&mut self);
    fn resume(&mut self) -> Result<(), TrackingError>;
}

/// An anchor committed by the orchestrator, with its live pose.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct Anchor {
    pub id: AnchorId,
    /// The trackable this anchor was placed on.
    pub trackable: TrackableId,
    /// Size of the tracked image, fixed at commit time.
    pub extent: PhysicalExtent,
    pub pose: Pose,
    pub state: TrackingState,
}
impl Anchor {
    /// Pull this anchor's live pose and state from the frame. An anchor missing from the frame is
    /// considered stopped, and keeps its last pose.
    pub fn refresh(&mut self, frame: &TrackingFrame) {
        match frame.anchor(self.id) {
            Some(snapshot) => {
                self.pose = snapshot.pose;
                self.state = snapshot.state;
            }
            None => self.state = TrackingState::Stopped,
        }
    }
    #[must_use]
    pub fn is_tracking(&self) -> bool {
        self.state == TrackingState::Tracking
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn anchor() -> Anchor {
        Anchor {
            id: AnchorId(7),
            trackable: TrackableId(1),
            extent: PhysicalExtent::new(0.2, 0.3),
            pose: Pose::IDENTITY,
            state: TrackingState::Tracking,
        }
    }

    #[test]
    fn refresh_follows_snapshot() {
        let mut anchor = anchor();
        let frame = TrackingFrame {
            anchors: vec![AnchorSnapshot {
                id: AnchorId(7),
                pose: Pose::from_translation([0.0, 1.0, 0.0]),
                state: TrackingState::Paused,
            }],
            ..Default::default()
        };
        anchor.refresh(&frame);
        assert_eq!(anchor.pose, Pose::from_translation([0.0, 1.0, 0.0]));
        assert!(!anchor.is_tracking());
    }
    #[test]
    fn missing_anchor_is_stopped() {
        let mut anchor = anchor();
        anchor.refresh(&TrackingFrame::default());
        assert_eq!(anchor.state, TrackingState::Stopped);
        assert_eq!(anchor.pose, Pose::IDENTITY);
    }
    #[test]
    fn tints_by_method() {
        assert_eq!(
            TrackingMethod::FullTracking.tint().as_array(),
            [0.2, 1.0, 0.2, 1.0]
        );
        assert_eq!(
            TrackingMethod::LastKnownPose.tint().as_array(),
            [1.0, 1.0, 0.2, 1.0]
        );
        assert_eq!(
            TrackingMethod::NotTracking.tint().as_array(),
            [1.0, 0.3, 0.3, 1.0]
        );
    }
}
