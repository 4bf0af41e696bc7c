//! Freehand strokes, drawn over everything in the anchor's image plane.

use ardraw_core::stroke::StrokeSet;
use ardraw_core::transform::ModelScale;
use smallvec::smallvec;

use super::{
    release_program, FrameContext, PassName, RenderError, RenderPass, SetupError, SolidProgram,
};
use crate::gpu::{
    DrawCall, GpuDevice, PipelineState, Topology, Uniform, UniformValue, VertexInput, Vertices,
};

pub const PROGRAM_LABEL: &str = "strokes";

/// Lift off the image plane so strokes don't z-fight with the overlay.
const SURFACE_OFFSET: f32 = 0.01;
/// Extra lift per stroke, so later strokes sit above earlier ones.
const LAYER_OFFSET: f32 = 1.0e-4;

#[derive(Debug)]
pub struct StrokesPass {
    program: Option<SolidProgram>,
    strokes: StrokeSet,
    line_width: f32,
}
impl Default for StrokesPass {
    fn default() -> Self {
        Self {
            program: None,
            strokes: StrokeSet::default(),
            line_width: PipelineState::STROKES.line_width,
        }
    }
}
impl StrokesPass {
    #[must_use]
    pub fn strokes(&self) -> &StrokeSet {
        &self.strokes
    }
    pub fn strokes_mut(&mut self) -> &mut StrokeSet {
        &mut self.strokes
    }
    pub fn set_line_width(&mut self, width: f32) {
        if width.is_finite() && width > 0.0 {
            self.line_width = width;
        }
    }
}

/// Anchor-local `(x, y)` points become `(x, lift, y)` on the image plane.
fn stroke_vertices(points: &[ardraw_core::stroke::StrokePoint], layer: usize) -> Vec<f32> {
    // As OK - precision loss past 2^24 strokes is irrelevant.
    let lift = SURFACE_OFFSET + layer as f32 * LAYER_OFFSET;
    points.iter().flat_map(|p| [p.x, lift, p.y]).collect()
}

impl RenderPass for StrokesPass {
    fn name(&self) -> PassName {
        PassName::Strokes
    }
    fn setup(&mut self, device: &mut dyn GpuDevice) -> Result<(), SetupError> {
        self.program = Some(SolidProgram::build(device, PROGRAM_LABEL)?);
        Ok(())
    }
    fn is_enabled(&self) -> bool {
        self.program.is_some()
    }
    fn draw(
        &mut self,
        device: &mut dyn GpuDevice,
        frame: &FrameContext<'_>,
    ) -> Result<(), RenderError> {
        let Some(program) = self.program else {
            return Ok(());
        };
        // Strokes live in anchor space, no tracking anchor means nowhere to put them.
        let Some(anchor) = frame.anchor.filter(|anchor| anchor.is_tracking()) else {
            return Ok(());
        };
        let mvp = frame
            .camera
            .mvp_for(&anchor.pose, ModelScale::Extent(anchor.extent));

        for (layer, stroke) in self.strokes.iter().enumerate() {
            if !stroke.is_drawable() {
                continue;
            }
            device.draw(&DrawCall {
                program: program.handle,
                state: PipelineState::STROKES.with_line_width(self.line_width),
                topology: Topology::LineStrip,
                attributes: smallvec![VertexInput {
                    location: program.position,
                    components: 3,
                    data: Vertices::Inline(stroke_vertices(&stroke.points, layer)),
                }],
                uniforms: smallvec![
                    Uniform {
                        location: program.mvp,
                        value: UniformValue::Matrix4(mvp),
                    },
                    Uniform {
                        location: program.color,
                        value: UniformValue::Vec4(stroke.color.as_array()),
                    },
                ],
                indices: None,
                count: u32::try_from(stroke.points.len()).unwrap_or(u32::MAX),
            })?;
        }
        Ok(())
    }
    fn release(&mut self, device: &mut dyn GpuDevice) {
        release_program(device, self.program.take().map(|p| p.handle));
    }
}

#[cfg(test)]
mod test {
    use super::{StrokesPass, PROGRAM_LABEL};
    use crate::gpu::headless::HeadlessDevice;
    use crate::gpu::{DepthTest, Topology, UniformValue, Vertices};
    use crate::passes::{FrameContext, RenderPass};
    use ardraw_core::stroke::StrokePoint;
    use ardraw_core::tracking::{Anchor, AnchorId, TrackableId, TrackingState};
    use ardraw_core::transform::PhysicalExtent;
    use ardraw_core::{Pose, Rgba};

    fn anchor() -> Anchor {
        Anchor {
            id: AnchorId(1),
            trackable: TrackableId(1),
            extent: PhysicalExtent::new(0.2, 0.2),
            pose: Pose::IDENTITY,
            state: TrackingState::Tracking,
        }
    }

    #[test]
    fn one_strip_per_drawable_stroke() {
        let mut device = HeadlessDevice::new();
        let mut pass = StrokesPass::default();
        pass.setup(&mut device).unwrap();

        let strokes = pass.strokes_mut();
        strokes.begin(Rgba::BLACK);
        strokes.push(StrokePoint::new(0.0, 0.0));
        strokes.push(StrokePoint::new(0.1, 0.2));
        strokes.end();
        // Single point, skipped.
        strokes.begin(Rgba::WHITE);
        strokes.push(StrokePoint::new(0.3, 0.3));
        strokes.end();
        strokes.push(StrokePoint::new(-0.1, 0.0));
        strokes.push(StrokePoint::new(-0.2, 0.0));
        strokes.push(StrokePoint::new(-0.3, 0.0));

        let anchor = anchor();
        let frame = FrameContext {
            camera: Default::default(),
            anchor: Some(&anchor),
            tracking: None,
        };
        pass.draw(&mut device, &frame).unwrap();

        let calls: Vec<_> = device.draws_for(PROGRAM_LABEL).collect();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].topology, Topology::LineStrip);
        assert_eq!(calls[0].state.depth_test, DepthTest::Disabled);
        assert_eq!(calls[0].count, 2);
        assert_eq!(calls[0].uniforms[1].value, UniformValue::Vec4([0.0, 0.0, 0.0, 1.0]));
        assert_eq!(calls[1].count, 3);
        // Default color for a stroke started implicitly.
        assert_eq!(calls[1].uniforms[1].value, UniformValue::Vec4([1.0, 0.0, 0.0, 1.0]));

        // Later strokes are lifted higher.
        let lift = |call: &crate::gpu::DrawCall| match &call.attributes[0].data {
            Vertices::Inline(data) => data[1],
            Vertices::Buffer(_) => panic!("strokes are streamed"),
        };
        assert!(lift(calls[1]) > lift(calls[0]));
    }
    #[test]
    fn nothing_without_tracking_anchor() {
        let mut device = HeadlessDevice::new();
        let mut pass = StrokesPass::default();
        pass.setup(&mut device).unwrap();
        pass.strokes_mut().push(StrokePoint::new(0.0, 0.0));
        pass.strokes_mut().push(StrokePoint::new(0.1, 0.0));

        let mut stale = anchor();
        stale.state = TrackingState::Stopped;
        for anchor in [None, Some(&stale)] {
            let frame = FrameContext {
                camera: Default::default(),
                anchor,
                tracking: None,
            };
            pass.draw(&mut device, &frame).unwrap();
        }
        assert!(device.draws().is_empty());
    }
}
