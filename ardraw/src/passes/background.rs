//! Camera image, stretched over the whole viewport.

use smallvec::smallvec;

use super::{
    attribute, build_program, release_buffer, release_program, shaders, uniform, FrameContext,
    PassName, RenderError, RenderPass, SetupError,
};
use ardraw_core::raster::RasterImage;

use crate::gpu::{
    AttributeLocation, BufferHandle, DrawCall, GpuDevice, PipelineState, ProgramHandle,
    TextureError, TextureHandle, Topology, Uniform, UniformLocation, UniformValue, VertexInput,
    Vertices,
};

pub const PROGRAM_LABEL: &str = "background";

/// Full-screen strip in normalized device coordinates.
const QUAD: [f32; 8] = [
    -1.0, -1.0, //
    -1.0, 1.0, //
    1.0, -1.0, //
    1.0, 1.0,
];
/// Texcoords when the engine hasn't supplied any, unrotated with the image's origin at the top.
pub const DEFAULT_UV: [[f32; 2]; 4] = [[0.0, 1.0], [0.0, 0.0], [1.0, 1.0], [1.0, 0.0]];

#[derive(Copy, Clone, Debug)]
struct Program {
    handle: ProgramHandle,
    position: AttributeLocation,
    texcoord: AttributeLocation,
    texture: UniformLocation,
}

#[derive(Debug)]
pub struct BackgroundPass {
    program: Option<Program>,
    quad: Option<BufferHandle>,
    camera_texture: Option<TextureHandle>,
    uv: [[f32; 2]; 4],
}
impl Default for BackgroundPass {
    fn default() -> Self {
        Self {
            program: None,
            quad: None,
            camera_texture: None,
            uv: DEFAULT_UV,
        }
    }
}
impl BackgroundPass {
    /// The texture the camera should stream into. Available after setup.
    #[must_use]
    pub fn camera_texture(&self) -> Option<TextureHandle> {
        self.camera_texture
    }
    /// Stream a camera frame into the background texture. Ignored while the pass is disabled.
    pub fn set_camera_frame(
        &mut self,
        device: &mut dyn GpuDevice,
        image: &RasterImage,
    ) -> Result<(), TextureError> {
        match self.camera_texture {
            Some(texture) => device.update_texture(texture, image),
            None => Ok(()),
        }
    }
    /// Take this frame's display-adjusted texcoords, or fall back to the defaults if the engine
    /// couldn't provide any.
    pub fn update_display_uv(&mut self, uv: Option<[[f32; 2]; 4]>) {
        self.uv = uv.unwrap_or(DEFAULT_UV);
    }
    #[must_use]
    pub fn display_uv(&self) -> [[f32; 2]; 4] {
        self.uv
    }
}
impl RenderPass for BackgroundPass {
    fn name(&self) -> PassName {
        PassName::Background
    }
    fn setup(&mut self, device: &mut dyn GpuDevice) -> Result<(), SetupError> {
        let program = build_program(
            device,
            PROGRAM_LABEL,
            shaders::background::VERTEX,
            shaders::background::FRAGMENT,
            |device, handle| {
                Ok(Program {
                    handle,
                    position: attribute(device, handle, PROGRAM_LABEL, "a_Position")?,
                    texcoord: attribute(device, handle, PROGRAM_LABEL, "a_TexCoord")?,
                    texture: uniform(device, handle, PROGRAM_LABEL, "u_Texture")?,
                })
            },
        )?;
        self.program = Some(program);
        self.quad = Some(device.create_vertex_buffer(&QUAD)?);
        self.camera_texture = Some(device.create_camera_texture()?);
        Ok(())
    }
    fn is_enabled(&self) -> bool {
        self.program.is_some() && self.quad.is_some() && self.camera_texture.is_some()
    }
    fn draw(
        &mut self,
        device: &mut dyn GpuDevice,
        _: &FrameContext<'_>,
    ) -> Result<(), RenderError> {
        let (Some(program), Some(quad), Some(texture)) =
            (self.program, self.quad, self.camera_texture)
        else {
            return Ok(());
        };
        let call = DrawCall {
            program: program.handle,
            state: PipelineState::BACKGROUND,
            topology: Topology::TriangleStrip,
            attributes: smallvec![
                VertexInput {
                    location: program.position,
                    components: 2,
                    data: Vertices::Buffer(quad),
                },
                VertexInput {
                    location: program.texcoord,
                    components: 2,
                    data: Vertices::Inline(self.uv.iter().flatten().copied().collect()),
                },
            ],
            uniforms: smallvec![Uniform {
                location: program.texture,
                value: UniformValue::Texture(texture),
            }],
            indices: None,
            count: 4,
        };
        device.draw(&call)?;
        Ok(())
    }
    fn release(&mut self, device: &mut dyn GpuDevice) {
        release_program(device, self.program.take().map(|p| p.handle));
        release_buffer(device, &mut self.quad);
        if let Some(texture) = self.camera_texture.take() {
            device.delete_texture(texture);
        }
    }
}

#[cfg(test)]
mod test {
    use super::{BackgroundPass, DEFAULT_UV, PROGRAM_LABEL};
    use crate::gpu::headless::HeadlessDevice;
    use crate::gpu::{Topology, Vertices};
    use crate::passes::{FrameContext, RenderPass};
    use ardraw_core::{Argb, RasterImage};

    fn frame() -> FrameContext<'static> {
        FrameContext {
            camera: Default::default(),
            anchor: None,
            tracking: None,
        }
    }

    #[test]
    fn draws_full_screen_strip() {
        let mut device = HeadlessDevice::new();
        let mut pass = BackgroundPass::default();
        pass.setup(&mut device).unwrap();
        let uv = [[1.0, 1.0], [1.0, 0.0], [0.0, 1.0], [0.0, 0.0]];
        pass.update_display_uv(Some(uv));
        pass.draw(&mut device, &frame()).unwrap();

        let call = device.draws_for(PROGRAM_LABEL).next().unwrap();
        assert_eq!(call.topology, Topology::TriangleStrip);
        assert_eq!(call.count, 4);
        assert_eq!(
            call.attributes[1].data,
            Vertices::Inline(vec![1.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0])
        );
    }
    #[test]
    fn camera_frames_reuse_texture() {
        let mut device = HeadlessDevice::new();
        let mut pass = BackgroundPass::default();
        let frame_image = RasterImage::new_filled(8, 6, Argb::WHITE).unwrap();
        // Disabled, nothing to stream into.
        pass.set_camera_frame(&mut device, &frame_image).unwrap();

        pass.setup(&mut device).unwrap();
        let texture = pass.camera_texture().unwrap();
        pass.set_camera_frame(&mut device, &frame_image).unwrap();
        let info = device.texture(texture).unwrap();
        assert_eq!([info.width, info.height], [8, 6]);
        assert_eq!(device.live_textures(), 1);
    }
    #[test]
    fn missing_uv_falls_back() {
        let mut pass = BackgroundPass::default();
        pass.update_display_uv(Some([[0.5; 2]; 4]));
        pass.update_display_uv(None);
        assert_eq!(pass.display_uv(), DEFAULT_UV);
    }
    #[test]
    fn release_frees_everything() {
        let mut device = HeadlessDevice::new();
        let mut pass = BackgroundPass::default();
        pass.setup(&mut device).unwrap();
        assert!(pass.camera_texture().is_some());
        pass.release(&mut device);
        assert!(!pass.is_enabled());
        assert_eq!(device.live_textures(), 0);
        assert_eq!(device.live_buffers(), 0);
        assert_eq!(device.live_programs(), 0);
    }
}
