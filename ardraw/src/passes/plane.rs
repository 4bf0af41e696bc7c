//! The overlay itself: the reference image laid over the tracked image, following the anchor.

use ardraw_core::raster::RasterImage;
use ardraw_core::transform::ModelScale;
use smallvec::smallvec;

use super::{
    release_buffer, release_program, FrameContext, PassName, RenderError, RenderPass, SetupError,
    TexturedProgram, PLANE_QUAD, PLANE_QUAD_UV,
};
use crate::gpu::{
    BufferHandle, DrawCall, GpuDevice, PipelineState, TextureError, TextureHandle, Topology,
    Uniform, UniformValue, VertexInput, Vertices,
};

pub const PROGRAM_LABEL: &str = "textured plane";
pub const DEFAULT_OPACITY: f32 = 0.8;

#[derive(Debug)]
pub struct TexturedPlanePass {
    program: Option<TexturedProgram>,
    vertices: Option<BufferHandle>,
    texcoords: Option<BufferHandle>,
    texture: Option<TextureHandle>,
    /// Overlay opacity, so the real drawing shows through.
    opacity: f32,
}
impl Default for TexturedPlanePass {
    fn default() -> Self {
        Self {
            program: None,
            vertices: None,
            texcoords: None,
            texture: None,
            opacity: DEFAULT_OPACITY,
        }
    }
}
impl TexturedPlanePass {
    /// Upload the image to show, replacing (and freeing) any previous one. On failure the pass
    /// has no image and skips drawing until one is set successfully.
    pub fn set_image(
        &mut self,
        device: &mut dyn GpuDevice,
        image: &RasterImage,
    ) -> Result<(), TextureError> {
        if let Some(old) = self.texture.take() {
            device.delete_texture(old);
        }
        let texture = device.upload_texture(image).map_err(|e| {
            log::warn!("Overlay image upload failed: {e}");
            e
        })?;
        self.texture = Some(texture);
        Ok(())
    }
    pub fn clear_image(&mut self, device: &mut dyn GpuDevice) {
        if let Some(old) = self.texture.take() {
            device.delete_texture(old);
        }
    }
    /// Has an image to draw.
    #[must_use]
    pub fn is_image_ready(&self) -> bool {
        self.texture.is_some()
    }
    pub fn set_opacity(&mut self, opacity: f32) {
        if opacity.is_finite() {
            self.opacity = opacity.clamp(0.0, 1.0);
        }
    }
    #[must_use]
    pub fn opacity(&self) -> f32 {
        self.opacity
    }
}
impl RenderPass for TexturedPlanePass {
    fn name(&self) -> PassName {
        PassName::TexturedPlane
    }
    fn setup(&mut self, device: &mut dyn GpuDevice) -> Result<(), SetupError> {
        self.program = Some(TexturedProgram::build(device, PROGRAM_LABEL)?);
        self.vertices = Some(device.create_vertex_buffer(&PLANE_QUAD)?);
        self.texcoords = Some(device.create_vertex_buffer(&PLANE_QUAD_UV)?);
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
        let Some(texture) = self.texture else {
            return Ok(());
        };
        // Stale anchors are kept, just not drawn.
        let Some(anchor) = frame.anchor.filter(|anchor| anchor.is_tracking()) else {
            return Ok(());
        };

        let mvp = frame
            .camera
            .mvp_for(&anchor.pose, ModelScale::Extent(anchor.extent));
        let call = DrawCall {
            program: program.handle,
            state: PipelineState::OVERLAY,
            topology: Topology::TriangleFan,
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
                    value: UniformValue::Vec4([1.0, 1.0, 1.0, self.opacity]),
                },
            ],
            indices: None,
            count: 4,
        };
        device.draw(&call)?;
        Ok(())
    }
    fn release(&mut self, device: &mut dyn GpuDevice) {
        release_program(device, self.program.take().map(|p| p.handle));
        release_buffer(device, &mut self.vertices);
        release_buffer(device, &mut self.texcoords);
        self.clear_image(device);
    }
}

#[cfg(test)]
mod test {
    use super::{TexturedPlanePass, PROGRAM_LABEL};
    use crate::gpu::headless::HeadlessDevice;
    use crate::gpu::{DepthTest, UniformValue};
    use crate::passes::{FrameContext, RenderPass};
    use ardraw_core::tracking::{Anchor, AnchorId, TrackableId, TrackingState};
    use ardraw_core::transform::{ModelScale, PhysicalExtent};
    use ardraw_core::{Argb, Pose, RasterImage};

    fn anchor(state: TrackingState) -> Anchor {
        Anchor {
            id: AnchorId(1),
            trackable: TrackableId(1),
            extent: PhysicalExtent::new(0.21, 0.297),
            pose: Pose::from_translation([0.0, 0.0, -0.5]),
            state,
        }
    }
    fn image() -> RasterImage {
        RasterImage::new_filled(4, 4, Argb::WHITE).unwrap()
    }

    #[test]
    fn draws_tracking_anchor_with_extent() {
        let mut device = HeadlessDevice::new();
        let mut pass = TexturedPlanePass::default();
        pass.setup(&mut device).unwrap();
        pass.set_image(&mut device, &image()).unwrap();

        let anchor = anchor(TrackingState::Tracking);
        let frame = FrameContext {
            camera: Default::default(),
            anchor: Some(&anchor),
            tracking: None,
        };
        pass.draw(&mut device, &frame).unwrap();

        let call = device.draws_for(PROGRAM_LABEL).next().unwrap();
        assert_eq!(call.state.depth_test, DepthTest::LessEqual);
        assert!(call.state.depth_write);
        let expected = frame
            .camera
            .mvp_for(&anchor.pose, ModelScale::Extent(anchor.extent));
        assert_eq!(call.uniforms[0].value, UniformValue::Matrix4(expected));
    }
    #[test]
    fn skips_stale_anchor_and_missing_image() {
        let mut device = HeadlessDevice::new();
        let mut pass = TexturedPlanePass::default();
        pass.setup(&mut device).unwrap();

        let tracking = anchor(TrackingState::Tracking);
        let frame = FrameContext {
            camera: Default::default(),
            anchor: Some(&tracking),
            tracking: None,
        };
        // No image yet.
        pass.draw(&mut device, &frame).unwrap();
        pass.set_image(&mut device, &image()).unwrap();

        let paused = anchor(TrackingState::Paused);
        let frame = FrameContext {
            anchor: Some(&paused),
            ..frame
        };
        pass.draw(&mut device, &frame).unwrap();
        assert_eq!(device.draws_for(PROGRAM_LABEL).count(), 0);
    }
    #[test]
    fn reassigning_image_frees_old_texture() {
        let mut device = HeadlessDevice::new();
        let mut pass = TexturedPlanePass::default();
        pass.setup(&mut device).unwrap();
        pass.set_image(&mut device, &image()).unwrap();
        pass.set_image(&mut device, &image()).unwrap();
        assert_eq!(device.live_textures(), 1);

        // A failed upload leaves the pass without an image, and nothing leaked.
        device.set_max_texture_size(2);
        assert!(pass.set_image(&mut device, &image()).is_err());
        assert!(!pass.is_image_ready());
        assert_eq!(device.live_textures(), 0);
    }
}
