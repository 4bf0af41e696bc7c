//! # Frame orchestrator
//!
//! Owns the tracking session, the stabilizer, the committed anchor and every render pass, and
//! turns each display refresh into one frame: pull tracking state, decide on the anchor, draw the
//! layers in order. The host drives it from its per-frame callback on the render thread and reads
//! the returned [`FrameReport`] to update its UI.

use ardraw_core::overlay::{OverlaySelection, OverlaySource};
use ardraw_core::pose::Pose;
use ardraw_core::raster::RasterImage;
use ardraw_core::stabilizer::Stabilizer;
use ardraw_core::stroke::{anchor_local_point, StrokePoint, StrokeSet};
use ardraw_core::tracking::{
    Anchor, AnchorId, DisplayGeometry, DisplayRotation, TrackableId, TrackingEngine,
    TrackingError, TrackingFrame, TrackingMethod, TrackingState,
};
use ardraw_core::transform::{CameraMatrices, ClipPlanes};
use ardraw_core::Rgba;
use smallvec::SmallVec;
use strum::IntoEnumIterator;

use crate::gpu::{ClearFlags, GpuDevice, TextureError};
use crate::passes::{
    background::BackgroundPass, bounding_box::BoundingBoxPass, decorations::DecorationsPass,
    plane::TexturedPlanePass, setup_or_disable, strokes::StrokesPass, FrameContext, PassName,
    RenderPass,
};
use crate::settings::{RenderSettings, SettingsData};

const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Where tracking stands, for the host's status display.
#[derive(Clone, PartialEq, Debug)]
pub enum TrackingStatus {
    /// The session is detached. Nothing was drawn.
    Paused,
    /// The engine failed to produce a frame. Only the background was drawn.
    Failed(TrackingError),
    /// No image is being tracked.
    Searching,
    /// An image is tracked, waiting for it to hold still.
    Stabilizing { progress: f32 },
    /// An anchor is committed. `tracking` is false while it is stale.
    Anchored { tracking: bool },
}

/// Outcome of one [`Orchestrator::draw_frame`].
#[derive(Clone, Debug)]
pub struct FrameReport {
    pub status: TrackingStatus,
    pub anchor: Option<Anchor>,
    /// Passes that ran to completion, in draw order. A pass may run and still draw nothing.
    pub passes_run: SmallVec<[PassName; 5]>,
    /// Passes that returned an error. The frame carried on without them.
    pub passes_failed: SmallVec<[PassName; 5]>,
}
impl FrameReport {
    fn new(status: TrackingStatus) -> Self {
        Self {
            status,
            anchor: None,
            passes_run: SmallVec::new(),
            passes_failed: SmallVec::new(),
        }
    }
    #[must_use]
    pub fn ran(&self, pass: PassName) -> bool {
        self.passes_run.contains(&pass)
    }
    #[must_use]
    pub fn failed(&self, pass: PassName) -> bool {
        self.passes_failed.contains(&pass)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum DecorationError {
    #[error(transparent)]
    Tracking(#[from] TrackingError),
    #[error(transparent)]
    Texture(#[from] TextureError),
}

pub struct Orchestrator<Engine: TrackingEngine> {
    engine: Engine,
    clip: ClipPlanes,
    render: RenderSettings,
    stabilizer: Stabilizer,
    anchor: Option<Anchor>,
    /// Whether any trackable was in the `Tracking` state last frame.
    was_tracking: bool,
    /// Camera of the last successful update, reused when the engine fails.
    last_camera: CameraMatrices,
    geometry: Option<DisplayGeometry>,
    geometry_dirty: bool,
    paused: bool,

    background: BackgroundPass,
    plane: TexturedPlanePass,
    decorations: DecorationsPass,
    bounding_boxes: BoundingBoxPass,
    strokes: StrokesPass,

    overlay: OverlaySelection,
}

impl<Engine: TrackingEngine> Orchestrator<Engine> {
    pub fn new(engine: Engine, settings: &SettingsData) -> Self {
        Self {
            engine,
            clip: settings.clip,
            render: settings.render,
            stabilizer: Stabilizer::new(settings.stabilizer),
            anchor: None,
            was_tracking: false,
            last_camera: CameraMatrices::default(),
            geometry: None,
            geometry_dirty: false,
            paused: false,
            background: BackgroundPass::default(),
            plane: TexturedPlanePass::default(),
            decorations: DecorationsPass::default(),
            bounding_boxes: BoundingBoxPass::default(),
            strokes: StrokesPass::default(),
            overlay: OverlaySelection::default(),
        }
    }
    #[must_use]
    pub fn engine(&self) -> &Engine {
        &self.engine
    }
    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }
    #[must_use]
    pub fn stabilizer(&self) -> &Stabilizer {
        &self.stabilizer
    }
    #[must_use]
    pub fn anchor(&self) -> Option<&Anchor> {
        self.anchor.as_ref()
    }
    fn passes_mut(&mut self) -> [&mut dyn RenderPass; 5] {
        [
            &mut self.background,
            &mut self.plane,
            &mut self.decorations,
            &mut self.bounding_boxes,
            &mut self.strokes,
        ]
    }
    /// Passes that are set up and able to draw.
    #[must_use]
    pub fn enabled_passes(&self) -> SmallVec<[PassName; 5]> {
        let passes: [&dyn RenderPass; 5] = [
            &self.background,
            &self.plane,
            &self.decorations,
            &self.bounding_boxes,
            &self.strokes,
        ];
        passes
            .into_iter()
            .filter(|pass| pass.is_enabled())
            .map(|pass| pass.name())
            .collect()
    }

    /// Set up every pass on a fresh surface. A pass that fails stays disabled, the rest carry on.
    pub fn on_surface_created(&mut self, device: &mut dyn GpuDevice) {
        let mut enabled = 0;
        for pass in self.passes_mut() {
            if setup_or_disable(pass, device) {
                enabled += 1;
            }
        }
        log::info!(
            "Surface created, {enabled}/{} passes ready",
            PassName::iter().count()
        );

        self.plane.set_opacity(self.render.overlay_opacity);
        self.bounding_boxes
            .set_line_width(self.render.wireframe_width);
        self.strokes.set_line_width(self.render.stroke_width);

        if let Err(e) = self.apply_overlay(device) {
            log::warn!("Overlay image not restored: {e}");
        }
    }
    pub fn on_surface_changed(&mut self, width: u32, height: u32, rotation: DisplayRotation) {
        self.geometry = Some(DisplayGeometry {
            rotation,
            width,
            height,
        });
        self.geometry_dirty = true;
    }
    /// Free every GPU resource. Decorations don't survive this, their images are gone.
    pub fn on_surface_destroyed(&mut self, device: &mut dyn GpuDevice) {
        for pass in self.passes_mut() {
            pass.release(device);
        }
        log::info!("Surface destroyed, GPU resources released");
    }

    pub fn pause(&mut self) {
        if !self.paused {
            self.engine.pause();
            self.paused = true;
            log::debug!("Tracking session paused");
        }
    }
    pub fn resume(&mut self) -> Result<(), TrackingError> {
        if self.paused {
            self.engine.resume()?;
            self.paused = false;
            // The engine may have lost the viewport while detached.
            self.geometry_dirty = self.geometry.is_some();
            log::debug!("Tracking session resumed");
        }
        Ok(())
    }
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused
    }
    pub fn set_show_bounding_boxes(&mut self, show: bool) {
        self.render.show_bounding_boxes = show;
    }
    #[must_use]
    pub fn show_bounding_boxes(&self) -> bool {
        self.render.show_bounding_boxes
    }

    pub fn begin_stroke(&mut self, color: Rgba) {
        self.strokes.strokes_mut().begin(color);
    }
    pub fn extend_stroke(&mut self, point: StrokePoint) {
        self.strokes.strokes_mut().push(point);
    }
    pub fn end_stroke(&mut self) {
        self.strokes.strokes_mut().end();
    }
    pub fn clear_strokes(&mut self) {
        self.strokes.strokes_mut().clear();
    }
    #[must_use]
    pub fn strokes(&self) -> &StrokeSet {
        self.strokes.strokes()
    }
    /// Map a world-space hit on the image plane to anchor-local stroke coordinates. `None`
    /// without an anchor, or if the point is off the image.
    #[must_use]
    pub fn anchor_local(&self, world: [f32; 3]) -> Option<StrokePoint> {
        let anchor = self.anchor.as_ref()?;
        anchor_local_point(&anchor.pose, anchor.extent, world)
    }

    /// Pin a decoration image to a new engine anchor on `trackable`.
    pub fn add_decoration(
        &mut self,
        device: &mut dyn GpuDevice,
        trackable: TrackableId,
        pose: &Pose,
        image: &RasterImage,
    ) -> Result<AnchorId, DecorationError> {
        let anchor = self.engine.create_anchor(trackable, pose)?;
        self.decorations.add(device, anchor, image)?;
        Ok(anchor)
    }
    pub fn clear_decorations(&mut self, device: &mut dyn GpuDevice) {
        self.decorations.clear(device);
    }

    /// Hand the latest camera frame to the background.
    pub fn set_camera_frame(
        &mut self,
        device: &mut dyn GpuDevice,
        image: &RasterImage,
    ) -> Result<(), TextureError> {
        self.background.set_camera_frame(device, image)
    }

    #[must_use]
    pub fn overlay(&self) -> &OverlaySelection {
        &self.overlay
    }
    /// Modify the overlay images. Takes effect on the next [`Orchestrator::apply_overlay`].
    pub fn overlay_mut(&mut self) -> &mut OverlaySelection {
        &mut self.overlay
    }
    /// Upload the preferred overlay image to the plane and bounding box passes, or clear them if
    /// there is none.
    pub fn apply_overlay(
        &mut self,
        device: &mut dyn GpuDevice,
    ) -> Result<Option<OverlaySource>, TextureError> {
        let Some((source, image)) = self.overlay.display_image() else {
            self.plane.clear_image(device);
            self.bounding_boxes.clear_reference_image(device);
            return Ok(None);
        };
        self.plane.set_image(device, image)?;
        self.bounding_boxes.set_reference_image(device, image)?;
        log::debug!("Showing {} overlay, {:?}", source.as_ref(), image);
        Ok(Some(source))
    }

    /// Run one frame. Call exactly once per display refresh.
    pub fn draw_frame(&mut self, device: &mut dyn GpuDevice) -> FrameReport {
        if self.paused {
            return FrameReport::new(TrackingStatus::Paused);
        }

        if self.geometry_dirty {
            self.geometry_dirty = false;
            if let Some(geometry) = self.geometry {
                self.engine.set_display_geometry(geometry);
            }
        }

        let (tracking, status) = match self.engine.update(self.clip) {
            Ok(frame) => {
                self.last_camera = frame.camera;
                self.background.update_display_uv(frame.display_uv);
                if let Some(anchor) = &mut self.anchor {
                    anchor.refresh(&frame);
                }
                let status = self.stabilize(&frame);
                (Some(frame), status)
            }
            Err(e) => {
                log::error!("Tracking update failed: {e}");
                (None, TrackingStatus::Failed(e))
            }
        };
        let mut report = FrameReport::new(status);
        report.anchor = self.anchor;

        device.clear(ClearFlags::COLOR | ClearFlags::DEPTH, CLEAR_COLOR);

        let context = FrameContext {
            camera: self.last_camera,
            anchor: self.anchor.as_ref(),
            tracking: tracking.as_ref(),
        };
        run_pass(&mut self.background, device, &context, &mut report);
        if tracking.is_some() {
            // Stale anchors are skipped, not deleted. They may come back.
            if self.anchor.as_ref().is_some_and(Anchor::is_tracking) {
                run_pass(&mut self.plane, device, &context, &mut report);
            }
            if !self.decorations.is_empty() {
                run_pass(&mut self.decorations, device, &context, &mut report);
            }
            if self.render.show_bounding_boxes {
                run_pass(&mut self.bounding_boxes, device, &context, &mut report);
            }
            if !self.strokes.strokes().is_empty() {
                run_pass(&mut self.strokes, device, &context, &mut report);
            }
        }
        report
    }

    /// Feed this frame's trackables to the stabilizer, committing an anchor once stable.
    fn stabilize(&mut self, frame: &TrackingFrame) -> TrackingStatus {
        if frame.trackables.iter().any(|t| t.state.is_detected()) {
            self.stabilizer.mark_detected();
        } else {
            self.stabilizer.mark_lost();
        }

        let candidate = frame
            .trackables
            .iter()
            .find(|t| t.state == TrackingState::Tracking);
        let is_tracking = candidate.is_some();
        if is_tracking && !self.was_tracking && !self.stabilizer.is_anchor_committed() {
            // Fresh session, don't hold the previous sighting against it.
            self.stabilizer.reset_baseline();
        }
        self.was_tracking = is_tracking;

        if let Some(anchor) = &self.anchor {
            return TrackingStatus::Anchored {
                tracking: anchor.is_tracking(),
            };
        }
        let Some(candidate) = candidate else {
            return TrackingStatus::Searching;
        };

        let stable = self.stabilizer.observe(&candidate.center_pose);
        if stable && candidate.method == TrackingMethod::FullTracking {
            match self
                .engine
                .create_anchor(candidate.id, &candidate.center_pose)
            {
                Ok(id) => {
                    self.stabilizer.commit_anchor();
                    let anchor = Anchor {
                        id,
                        trackable: candidate.id,
                        extent: candidate.extent,
                        pose: candidate.center_pose,
                        state: TrackingState::Tracking,
                    };
                    log::info!(
                        "Anchored to {} ({:?}), extent {:.2}x{:.2}",
                        candidate.name,
                        id,
                        anchor.extent.x,
                        anchor.extent.z,
                    );
                    self.anchor = Some(anchor);
                    return TrackingStatus::Anchored { tracking: true };
                }
                // Still stable next frame, so this is retried then.
                Err(e) => log::warn!("{e}"),
            }
        }

        let progress = self.stabilizer.progress();
        log::debug!("Stabilizing {}: {progress:.0}%", candidate.name);
        TrackingStatus::Stabilizing { progress }
    }
}

/// Draw one pass, recording the outcome. Errors are logged and otherwise ignored.
fn run_pass(
    pass: &mut dyn RenderPass,
    device: &mut dyn GpuDevice,
    context: &FrameContext<'_>,
    report: &mut FrameReport,
) {
    if !pass.is_enabled() {
        return;
    }
    match pass.draw(device, context) {
        Ok(()) => report.passes_run.push(pass.name()),
        Err(e) => {
            log::error!("{} pass failed: {e}", pass.name().as_ref());
            report.passes_failed.push(pass.name());
        }
    }
}
