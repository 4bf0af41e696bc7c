//! Decorative image stickers, each pinned upright to its own engine anchor at a fixed size.

use ardraw_core::raster::RasterImage;
use ardraw_core::tracking::{AnchorId, TrackingState};
use ardraw_core::transform::ModelScale;
use smallvec::smallvec;

use super::{
    release_buffer, release_program, FrameContext, PassName, RenderError, RenderPass, SetupError,
    TexturedProgram,
};
use crate::gpu::{
    BufferHandle, DrawCall, GpuDevice, PipelineState, TextureError, TextureHandle, Topology,
    Uniform, UniformValue, VertexInput, Vertices,
};

pub const PROGRAM_LABEL: &str = "decorations";
/// Cosmetic size of a decoration. Unrelated to any measured extent.
pub const DECORATION_SCALE: f32 = 0.3;

/// Upright unit quad in the XY plane, two triangles.
const QUAD: [f32; 18] = [
    -0.5, 0.5, 0.0, //
    0.5, 0.5, 0.0, //
    -0.5, -0.5, 0.0, //
    0.5, 0.5, 0.0, //
    0.5, -0.5, 0.0, //
    -0.5, -0.5, 0.0,
];
const QUAD_UV: [f32; 12] = [
    0.0, 0.0, //
    1.0, 0.0, //
    0.0, 1.0, //
    1.0, 0.0, //
    1.0, 1.0, //
    0.0, 1.0,
];

#[derive(Debug, Default)]
pub struct DecorationsPass {
    program: Option<TexturedProgram>,
    vertices: Option<BufferHandle>,
    texcoords: Option<BufferHandle>,
    decorations: Vec<(AnchorId, TextureHandle)>,
}
impl DecorationsPass {
    /// Pin an image to an anchor. Nothing is added if the upload fails.
    pub fn add(
        &mut self,
        device: &mut dyn GpuDevice,
        anchor: AnchorId,
        image: &RasterImage,
    ) -> Result<(), TextureError> {
        let texture = device.upload_texture(image)?;
        self.decorations.push((anchor, texture));
        log::debug!("Added decoration, {} total", self.decorations.len());
        Ok(())
    }
    /// Remove every decoration and free its texture.
    pub fn clear(&mut self, device: &mut dyn GpuDevice) {
        for (_, texture) in self.decorations.drain(..) {
            device.delete_texture(texture);
        }
    }
    #[must_use]
    pub fn len(&self) -> usize {
        self.decorations.len()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.decorations.is_empty()
    }
}
impl RenderPass for DecorationsPass {
    fn name(&self) -> PassName {
        PassName::Decorations
    }
    fn setup(&mut self, device: &mut dyn GpuDevice) -> Result<(), SetupError> {
        self.program = Some(TexturedProgram::build(device, PROGRAM_LABEL)?);
        self.vertices = Some(device.create_vertex_buffer(&QUAD)?);
        self.texcoords = Some(device.create_vertex_buffer(&QUAD_UV)?);
        Ok(())
    }
    fn is_enabled(&self) -> bool {
        self.program.is_some() && self.vertices.is_some() && self.texcoords.is_some()
    }
    fn draw(
        &mut self,
        device: &mut dyn GpuDevice,
        frame: &FrameContext<'_>,
    ) -> Result<(), RenderError> {
        let (Some(program), Some(vertices), Some(texcoords)) =
            (self.program, self.vertices, self.texcoords)
        else {
            return Ok(());
        };
        let Some(tracking) = frame.tracking else {
            return Ok(());
        };

        for &(anchor, texture) in &self.decorations {
            let Some(snapshot) = tracking
                .anchor(anchor)
                .filter(|snapshot| snapshot.state == TrackingState::Tracking)
            else {
                continue;
            };
            let mvp = frame
                .camera
                .mvp_for(&snapshot.pose, ModelScale::Cosmetic(DECORATION_SCALE));
            device.draw(&DrawCall {
                program: program.handle,
                state: PipelineState::OVERLAY,
                topology: Topology::Triangles,
                attributes: smallvec![
                    VertexInput {
                        location: program.position,
                        components: 3,
                        data: Vertices::Buffer(vertices),
                    },
                    VertexInput {
                        location: program.texcoord,
                        components: 2,
                        data: Vertices::Buffer(texcoords),
                    },
                ],
                uniforms: smallvec![
                    Uniform {
                        location: program.mvp,
                        value: UniformValue::Matrix4(mvp),
                    },
                    Uniform {
                        location: program.texture,
                        value: UniformValue::Texture(texture),
                    },
                    Uniform {
                        location: program.tint,
                        value: UniformValue::Vec4([1.0; 4]),
                    },
                ],
                indices: None,
                count: 6,
            })?;
        }
        Ok(())
    }
    fn release(&mut self, device: &mut dyn GpuDevice) {
        release_program(device, self.program.take().map(|p| p.handle));
        release_buffer(device, &mut self.vertices);
        release_buffer(device, &mut self.texcoords);
        self.clear(device);
    }
}
