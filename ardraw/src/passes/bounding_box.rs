//! Diagnostic view of every tracked image: the reference image stretched over it, then a thin
//! wireframe box tinted by tracking quality. Toggled by the user.

use ardraw_core::raster::RasterImage;
use ardraw_core::tracking::TrackingState;
use ardraw_core::transform::ModelScale;
use smallvec::smallvec;

use super::{
    release_buffer, release_program, FrameContext, PassName, RenderError, RenderPass, SetupError,
    SolidProgram, TexturedProgram, PLANE_QUAD, PLANE_QUAD_UV,
};
use crate::gpu::{
    BufferHandle, DrawCall, GpuDevice, PipelineState, TextureError, TextureHandle, Topology,
    Uniform, UniformValue, VertexInput, Vertices,
};

pub const IMAGE_PROGRAM_LABEL: &str = "bounding box image";
pub const WIREFRAME_PROGRAM_LABEL: &str = "bounding box wireframe";

/// Height of the box above the image plane, before scaling. Y is never scaled.
const BOX_HEIGHT: f32 = 0.02;
const BOX: [f32; 24] = [
    // Bottom face, on the image.
    -0.5, 0.0, -0.5, //
    0.5, 0.0, -0.5, //
    0.5, 0.0, 0.5, //
    -0.5, 0.0, 0.5, //
    // Top face.
    -0.5, BOX_HEIGHT, -0.5, //
    0.5, BOX_HEIGHT, -0.5, //
    0.5, BOX_HEIGHT, 0.5, //
    -0.5, BOX_HEIGHT, 0.5,
];
/// Line pairs for the 12 edges.
const BOX_EDGES: [u16; 24] = [
    0, 1, 1, 2, 2, 3, 3, 0, // bottom
    4, 5, 5, 6, 6, 7, 7, 4, // top
    0, 4, 1, 5, 2, 6, 3, 7, // verticals
];

#[derive(Debug)]
pub struct BoundingBoxPass {
    image_program: Option<TexturedProgram>,
    wireframe_program: Option<SolidProgram>,
    quad: Option<BufferHandle>,
    quad_uv: Option<BufferHandle>,
    box_vertices: Option<BufferHandle>,
    box_edges: Option<BufferHandle>,
    texture: Option<TextureHandle>,
    line_width: f32,
}
impl Default for BoundingBoxPass {
    fn default() -> Self {
        Self {
            image_program: None,
            wireframe_program: None,
            quad: None,
            quad_uv: None,
            box_vertices: None,
            box_edges: None,
            texture: None,
            line_width: PipelineState::WIREFRAME.line_width,
        }
    }
}
impl BoundingBoxPass {
    /// Image to show inside the boxes. Replaces and frees any previous one. Without an image,
    /// only the wireframes are drawn.
    pub fn set_reference_image(
        &mut self,
        device: &mut dyn GpuDevice,
        image: &RasterImage,
    ) -> Result<(), TextureError> {
        if let Some(old) = self.texture.take() {
            device.delete_texture(old);
        }
        self.texture = Some(device.upload_texture(image)?);
        Ok(())
    }
    pub fn clear_reference_image(&mut self, device: &mut dyn GpuDevice) {
        if let Some(old) = self.texture.take() {
            device.delete_texture(old);
        }
    }
    pub fn set_line_width(&mut self, width: f32) {
        if width.is_finite() && width > 0.0 {
            self.line_width = width;
        }
    }
}
impl RenderPass for BoundingBoxPass {
    fn name(&self) -> PassName {
        PassName::BoundingBoxes
    }
    fn setup(&mut self, device: &mut dyn GpuDevice) -> Result<(), SetupError> {
        self.image_program = Some(TexturedProgram::build(device, IMAGE_PROGRAM_LABEL)?);
        self.wireframe_program = Some(SolidProgram::build(device, WIREFRAME_PROGRAM_LABEL)?);

        self.quad = Some(device.create_vertex_buffer(&PLANE_QUAD)?);
        self.quad_uv = Some(device.create_vertex_buffer(&PLANE_QUAD_UV)?);
        self.box_vertices = Some(device.create_vertex_buffer(&BOX)?);
        self.box_edges = Some(device.create_index_buffer(&BOX_EDGES)?);
        Ok(())
    }
    fn is_enabled(&self) -> bool {
        self.image_program.is_some()
            && self.wireframe_program.is_some()
            && self.quad.is_some()
            && self.quad_uv.is_some()
            && self.box_vertices.is_some()
            && self.box_edges.is_some()
    }
    fn draw(
        &mut self,
        device: &mut dyn GpuDevice,
        frame: &FrameContext<'_>,
    ) -> Result<(), RenderError> {
        let (Some(image_program), Some(wireframe_program)) =
            (self.image_program, self.wireframe_program)
        else {
            return Ok(());
        };
        let (Some(quad), Some(quad_uv), Some(box_vertices), Some(box_edges)) =
            (self.quad, self.quad_uv, self.box_vertices, self.box_edges)
        else {
            return Ok(());
        };
        let Some(tracking) = frame.tracking else {
            return Ok(());
        };

        for trackable in tracking
            .trackables
            .iter()
            .filter(|t| t.state == TrackingState::Tracking)
        {
            let mvp = frame
                .camera
                .mvp_for(&trackable.center_pose, ModelScale::Extent(trackable.extent));

            if let Some(texture) = self.texture {
                device.draw(&DrawCall {
                    program: image_program.handle,
                    state: PipelineState::WIREFRAME,
                    topology: Topology::TriangleFan,
                    attributes: smallvec![
                        VertexInput {
                            location: image_program.position,
                            components: 3,
                            data: Vertices::Buffer(quad),
                        },
                        VertexInput {
                            location: image_program.texcoord,
                            components: 2,
                            data: Vertices::Buffer(quad_uv),
                        },
                    ],
                    uniforms: smallvec![
                        Uniform {
                            location: image_program.mvp,
                            value: UniformValue::Matrix4(mvp),
                        },
                        Uniform {
                            location: image_program.texture,
                            value: UniformValue::Texture(texture),
                        },
                        Uniform {
                            location: image_program.tint,
                            value: UniformValue::Vec4([1.0; 4]),
                        },
                    ],
                    indices: None,
                    count: 4,
                })?;
            }

            device.draw(&DrawCall {
                program: wireframe_program.handle,
                state: PipelineState::WIREFRAME.with_line_width(self.line_width),
                topology: Topology::Lines,
                attributes: smallvec![VertexInput {
                    location: wireframe_program.position,
                    components: 3,
                    data: Vertices::Buffer(box_vertices),
                }],
                uniforms: smallvec![
                    Uniform {
                        location: wireframe_program.mvp,
                        value: UniformValue::Matrix4(mvp),
                    },
                    Uniform {
                        location: wireframe_program.color,
                        value: UniformValue::Vec4(trackable.method.tint().as_array()),
                    },
                ],
                indices: Some(box_edges),
                // As OK - constant length.
                count: BOX_EDGES.len() as u32,
            })?;
        }
        Ok(())
    }
    fn release(&mut self, device: &mut dyn GpuDevice) {
        release_program(device, self.image_program.take().map(|p| p.handle));
        release_program(device, self.wireframe_program.take().map(|p| p.handle));
        release_buffer(device, &mut self.quad);
        release_buffer(device, &mut self.quad_uv);
        release_buffer(device, &mut self.box_vertices);
        release_buffer(device, &mut self.box_edges);
        self.clear_reference_image(device);
    }
}

#[cfg(test)]
mod test {
    use super::{BoundingBoxPass, IMAGE_PROGRAM_LABEL, WIREFRAME_PROGRAM_LABEL};
    use crate::gpu::headless::HeadlessDevice;
    use crate::gpu::{DepthTest, Topology, UniformValue};
    use crate::passes::{FrameContext, RenderPass};
    use ardraw_core::tracking::{
        Trackable, TrackableId, TrackingFrame, TrackingMethod, TrackingState,
    };
    use ardraw_core::transform::PhysicalExtent;
    use ardraw_core::{Argb, Pose, RasterImage};

    fn trackable(id: u64, state: TrackingState, method: TrackingMethod) -> Trackable {
        Trackable {
            id: TrackableId(id),
            name: format!("image {id}"),
            state,
            method,
            center_pose: Pose::IDENTITY,
            extent: PhysicalExtent::new(0.2, 0.2),
        }
    }

    #[test]
    fn image_then_tinted_wireframe() {
        let mut device = HeadlessDevice::new();
        let mut pass = BoundingBoxPass::default();
        pass.setup(&mut device).unwrap();
        let image = RasterImage::new_filled(2, 2, Argb::WHITE).unwrap();
        pass.set_reference_image(&mut device, &image).unwrap();

        let tracking = TrackingFrame {
            trackables: vec![
                trackable(1, TrackingState::Tracking, TrackingMethod::LastKnownPose),
                trackable(2, TrackingState::Stopped, TrackingMethod::FullTracking),
            ],
            ..Default::default()
        };
        let frame = FrameContext {
            camera: tracking.camera,
            anchor: None,
            tracking: Some(&tracking),
        };
        pass.draw(&mut device, &frame).unwrap();

        assert_eq!(
            device.draw_order(),
            [IMAGE_PROGRAM_LABEL, WIREFRAME_PROGRAM_LABEL]
        );
        let wireframe = device.draws_for(WIREFRAME_PROGRAM_LABEL).next().unwrap();
        assert_eq!(wireframe.topology, Topology::Lines);
        assert_eq!(wireframe.count, 24);
        assert_eq!(wireframe.state.depth_test, DepthTest::Disabled);
        assert_eq!(wireframe.state.line_width, 5.0);
        assert_eq!(
            wireframe.uniforms[1].value,
            UniformValue::Vec4([1.0, 1.0, 0.2, 1.0])
        );
    }
    #[test]
    fn wireframe_only_without_image() {
        let mut device = HeadlessDevice::new();
        let mut pass = BoundingBoxPass::default();
        pass.setup(&mut device).unwrap();
        let tracking = TrackingFrame {
            trackables: vec![trackable(
                1,
                TrackingState::Tracking,
                TrackingMethod::FullTracking,
            )],
            ..Default::default()
        };
        let frame = FrameContext {
            camera: tracking.camera,
            anchor: None,
            tracking: Some(&tracking),
        };
        pass.draw(&mut device, &frame).unwrap();
        assert_eq!(device.draw_order(), [WIREFRAME_PROGRAM_LABEL]);

        pass.release(&mut device);
        assert_eq!(device.live_buffers(), 0);
        assert_eq!(device.live_programs(), 0);
    }
}
