//! # GPU device seam
//!
//! The render passes talk to the GPU only through [`GpuDevice`], a small surface of programs,
//! buffers, textures, clears and self-contained draw calls. Draw calls carry their whole pipeline
//! state and bindings, so there's no bind/unbind bookkeeping between passes.
//!
//! [`wgpu_backend::WgpuDevice`] is the real device. Programs are WGSL, checked by
//! [`reflect`] before they reach any device.

#[cfg(test)]
pub mod headless;
pub mod reflect;
pub mod wgpu_backend;

use std::num::NonZeroU32;

use ardraw_core::raster::RasterImage;
use smallvec::SmallVec;

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct ProgramHandle(pub NonZeroU32);
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct BufferHandle(pub NonZeroU32);
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct TextureHandle(pub NonZeroU32);
/// Shader input `@location`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct AttributeLocation(pub u32);
/// Resource `@binding` within group 0.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct UniformLocation(pub u32);

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, strum::AsRefStr)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ShaderError {
    #[error("{stage:?} shader of {label} failed to compile: {log}")]
    Compile {
        label: String,
        stage: ShaderStage,
        log: String,
    },
    #[error("program {label} failed to link: {log}")]
    Link { label: String, log: String },
    #[error("program {label} has no active {kind} named {name}")]
    MissingSymbol {
        label: String,
        kind: &'static str,
        name: String,
    },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TextureError {
    #[error("texture allocation failed")]
    Allocation,
    #[error("texture {width}x{height} exceeds the maximum size {max}")]
    TooLarge { width: u32, height: u32, max: u32 },
    #[error("texture upload failed: {0}")]
    Upload(String),
    #[error("unknown texture {0:?}")]
    Unknown(TextureHandle),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GpuError {
    #[error("buffer allocation failed")]
    BufferAllocation,
    #[error("draw call rejected: {0}")]
    Draw(String),
    #[error("device lost")]
    DeviceLost,
    #[error("frame readback failed: {0}")]
    Readback(String),
}

bitflags::bitflags! {
    #[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
    pub struct ClearFlags: u8 {
        const COLOR = 0b01;
        const DEPTH = 0b10;
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, strum::AsRefStr)]
pub enum Blend {
    /// Source replaces destination.
    Opaque,
    /// Straight alpha, `src * a + dst * (1 - a)`.
    Alpha,
}
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, strum::AsRefStr)]
pub enum DepthTest {
    Disabled,
    LessEqual,
}

/// Fixed-function state for a draw.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct PipelineState {
    pub blend: Blend,
    pub depth_test: DepthTest,
    pub depth_write: bool,
    /// Only meaningful for line topologies.
    pub line_width: f32,
}
impl PipelineState {
    /// Full-screen camera image. Covers everything, touches no depth.
    pub const BACKGROUND: Self = Self {
        blend: Blend::Opaque,
        depth_test: DepthTest::Disabled,
        depth_write: false,
        line_width: 1.0,
    };
    /// Translucent textures placed in the world.
    pub const OVERLAY: Self = Self {
        blend: Blend::Alpha,
        depth_test: DepthTest::LessEqual,
        depth_write: true,
        line_width: 1.0,
    };
    /// Diagnostic overlays, always visible through geometry.
    pub const WIREFRAME: Self = Self {
        blend: Blend::Alpha,
        depth_test: DepthTest::Disabled,
        depth_write: false,
        line_width: 5.0,
    };
    /// Freehand strokes, always on top.
    pub const STROKES: Self = Self {
        blend: Blend::Alpha,
        depth_test: DepthTest::Disabled,
        depth_write: false,
        line_width: 5.0,
    };
    #[must_use]
    pub fn with_line_width(self, line_width: f32) -> Self {
        Self { line_width, ..self }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, strum::AsRefStr)]
pub enum Topology {
    TriangleStrip,
    TriangleFan,
    Triangles,
    Lines,
    LineStrip,
}

/// Source of a vertex attribute's data.
#[derive(Clone, PartialEq, Debug)]
pub enum Vertices {
    /// A static buffer created at setup.
    Buffer(BufferHandle),
    /// Per-frame data, streamed with the draw.
    Inline(Vec<f32>),
}

#[derive(Clone, PartialEq, Debug)]
pub struct VertexInput {
    pub location: AttributeLocation,
    /// Floats per vertex.
    pub components: u8,
    pub data: Vertices,
}

#[derive(Clone, PartialEq, Debug)]
pub enum UniformValue {
    Matrix4(cgmath::Matrix4<f32>),
    Vec4([f32; 4]),
    /// Sampled through the device's linear, edge-clamped sampler.
    Texture(TextureHandle),
}

#[derive(Clone, PartialEq, Debug)]
pub struct Uniform {
    pub location: UniformLocation,
    pub value: UniformValue,
}

/// Everything needed for one draw.
#[derive(Clone, PartialEq, Debug)]
pub struct DrawCall {
    pub program: ProgramHandle,
    pub state: PipelineState,
    pub topology: Topology,
    pub attributes: SmallVec<[VertexInput; 2]>,
    pub uniforms: SmallVec<[Uniform; 3]>,
    /// Index buffer, if drawing indexed.
    pub indices: Option<BufferHandle>,
    /// Number of vertices, or of indices when indexed.
    pub count: u32,
}

/// The GPU context. Owned by, and only ever used from, the render thread.
pub trait GpuDevice {
    /// Compile and link a program. `label` is for diagnostics only.
    fn compile_program(
        &mut self,
        label: &str,
        vertex: &str,
        fragment: &str,
    ) -> Result<ProgramHandle, ShaderError>;
    fn delete_program(&mut self, program: ProgramHandle);
    fn attribute_location(&self, program: ProgramHandle, name: &str) -> Option<AttributeLocation>;
    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<UniformLocation>;

    fn create_vertex_buffer(&mut self, data: &[f32]) -> Result<BufferHandle, GpuError>;
    fn create_index_buffer(&mut self, data: &[u16]) -> Result<BufferHandle, GpuError>;
    fn delete_buffer(&mut self, buffer: BufferHandle);

    /// Upload an image into a new, linearly filtered, edge-clamped 2D texture.
    fn upload_texture(&mut self, image: &RasterImage) -> Result<TextureHandle, TextureError>;
    /// Allocate the texture camera frames are streamed into. Black until the first frame.
    fn create_camera_texture(&mut self) -> Result<TextureHandle, TextureError>;
    /// Replace a texture's contents, reallocating it if the size changed. The handle stays valid.
    fn update_texture(
        &mut self,
        texture: TextureHandle,
        image: &RasterImage,
    ) -> Result<(), TextureError>;
    fn delete_texture(&mut self, texture: TextureHandle);

    fn clear(&mut self, flags: ClearFlags, color: [f32; 4]);
    fn draw(&mut self, call: &DrawCall) -> Result<(), GpuError>;
}
