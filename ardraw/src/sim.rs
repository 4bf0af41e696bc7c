//! A scripted stand-in for the tracking engine. Replays a fixed sequence of observations of a
//! single tracked image, for the demo and for tests.

use std::collections::VecDeque;

use ardraw_core::pose::Pose;
use ardraw_core::tracking::{
    AnchorId, AnchorSnapshot, DisplayGeometry, DisplayRotation, Trackable, TrackableId,
    TrackingEngine, TrackingError, TrackingFrame, TrackingMethod, TrackingState,
};
use ardraw_core::transform::{CameraMatrices, ClipPlanes, PhysicalExtent};

/// What the engine sees in one frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Step {
    /// The image is tracked at this pose.
    Seen { pose: Pose, method: TrackingMethod },
    /// The image is out of view. Its last pose is remembered.
    Hidden,
    /// The image is gone for good.
    Lost,
    /// `update` fails with this message.
    Fail(String),
}

pub struct ScriptedEngine {
    steps: VecDeque<Step>,
    /// Replayed forever once the script runs out.
    last: Step,
    trackable: TrackableId,
    name: String,
    extent: PhysicalExtent,
    last_pose: Pose,
    anchors: Vec<AnchorId>,
    next_anchor: u64,
    paused: bool,
    geometry: Option<DisplayGeometry>,
    geometry_updates: usize,
    frames: usize,
}
impl ScriptedEngine {
    pub fn new(extent: PhysicalExtent, steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            last: Step::Lost,
            trackable: TrackableId(1),
            name: "reference".to_owned(),
            extent,
            last_pose: Pose::IDENTITY,
            anchors: Vec::new(),
            next_anchor: 1,
            paused: false,
            geometry: None,
            geometry_updates: 0,
            frames: 0,
        }
    }
    /// The image wobbles within a few millimeters of `rest`, settling onto it.
    #[must_use]
    pub fn settling(rest: Pose, jitter_frames: usize) -> Vec<Step> {
        let mut steps = Vec::with_capacity(jitter_frames + 1);
        for i in 0..jitter_frames {
            // As OK - small frame counts.
            let offset = 0.008 * (jitter_frames - i) as f32 / jitter_frames as f32;
            let mut pose = rest;
            pose.translation.x += offset;
            steps.push(Step::Seen {
                pose,
                method: TrackingMethod::FullTracking,
            });
        }
        steps.push(Step::Seen {
            pose: rest,
            method: TrackingMethod::FullTracking,
        });
        steps
    }
    /// The image sweeps past in large jumps, as when the camera is still being aimed.
    #[must_use]
    pub fn sweeping(rest: Pose, frames: usize) -> Vec<Step> {
        (0..frames)
            .map(|i| {
                let mut pose = rest;
                // As OK - small frame counts.
                pose.translation.x += 0.1 * (frames - i) as f32;
                Step::Seen {
                    pose,
                    method: TrackingMethod::FullTracking,
                }
            })
            .collect()
    }
    pub fn push_steps(&mut self, steps: impl IntoIterator<Item = Step>) {
        self.steps.extend(steps);
    }
    #[must_use]
    pub fn trackable_id(&self) -> TrackableId {
        self.trackable
    }
    #[must_use]
    pub fn geometry(&self) -> Option<DisplayGeometry> {
        self.geometry
    }
    /// How many times the display geometry was set.
    #[must_use]
    pub fn geometry_updates(&self) -> usize {
        self.geometry_updates
    }
    /// Successful and failed updates so far.
    #[must_use]
    pub fn frames(&self) -> usize {
        self.frames
    }
    #[must_use]
    pub fn anchors(&self) -> &[AnchorId] {
        &self.anchors
    }
    fn camera(&self, clip: ClipPlanes) -> CameraMatrices {
        let aspect = self
            .geometry
            .filter(|g| g.width > 0 && g.height > 0)
            // As OK - display sizes are far below f32 precision limits.
            .map_or(1.0, |g| g.width as f32 / g.height as f32);
        CameraMatrices {
            // Camera one meter above the origin, looking straight down at the image.
            view: cgmath::Matrix4::look_at_rh(
                cgmath::Point3::new(0.0, 1.0, 0.0),
                cgmath::Point3::new(0.0, 0.0, 0.0),
                cgmath::Vector3::new(0.0, 0.0, -1.0),
            ),
            projection: cgmath::perspective(cgmath::Deg(60.0), aspect, clip.near, clip.far),
        }
    }
    /// Background texcoords for the current display rotation.
    fn display_uv(&self) -> Option<[[f32; 2]; 4]> {
        let geometry = self.geometry?;
        let mut uv = [[0.0, 1.0], [0.0, 0.0], [1.0, 1.0], [1.0, 0.0]];
        let turns = match geometry.rotation {
            DisplayRotation::Deg0 => 0,
            DisplayRotation::Deg90 => 1,
            DisplayRotation::Deg180 => 2,
            DisplayRotation::Deg270 => 3,
        };
        for _ in 0..turns {
            uv = uv.map(|[u, v]| [v, 1.0 - u]);
        }
        Some(uv)
    }
}
impl TrackingEngine for ScriptedEngine {
    fn update(&mut self, clip: ClipPlanes) -> Result<TrackingFrame, TrackingError> {
        if self.paused {
            return Err(TrackingError::Paused);
        }
        self.frames += 1;
        let step = match self.steps.pop_front() {
            Some(step) => {
                self.last = step.clone();
                step
            }
            None => self.last.clone(),
        };

        let (state, method) = match step {
            Step::Seen { pose, method } => {
                self.last_pose = pose;
                (TrackingState::Tracking, method)
            }
            Step::Hidden => (TrackingState::Paused, TrackingMethod::LastKnownPose),
            Step::Lost => (TrackingState::Stopped, TrackingMethod::NotTracking),
            Step::Fail(message) => return Err(TrackingError::Update(message)),
        };

        Ok(TrackingFrame {
            camera: self.camera(clip),
            display_uv: self.display_uv(),
            trackables: vec![Trackable {
                id: self.trackable,
                name: self.name.clone(),
                state,
                method,
                center_pose: self.last_pose,
                extent: self.extent,
            }],
            anchors: self
                .anchors
                .iter()
                .map(|&id| AnchorSnapshot {
                    id,
                    pose: self.last_pose,
                    // Anchors outlive their image. They pause rather than stop.
                    state: if state == TrackingState::Tracking {
                        TrackingState::Tracking
                    } else {
                        TrackingState::Paused
                    },
                })
                .collect(),
        })
    }
    fn create_anchor(
        &mut self,
        trackable: TrackableId,
        _pose: &Pose,
    ) -> Result<AnchorId, TrackingError> {
        if trackable != self.trackable {
            return Err(TrackingError::AnchorCreation(format!(
                "unknown trackable {trackable:?}"
            )));
        }
        let id = AnchorId(self.next_anchor);
        self.next_anchor += 1;
        self.anchors.push(id);
        Ok(id)
    }
    fn set_display_geometry(&mut self, geometry: DisplayGeometry) {
        self.geometry = Some(geometry);
        self.geometry_updates += 1;
    }
    fn pause(&mut self) {
        self.paused = true;
    }
    fn resume(&mut self) -> Result<(), TrackingError> {
        self.paused = false;
        Ok(())
    }
}
