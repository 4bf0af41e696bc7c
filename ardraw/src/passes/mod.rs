//! # Render passes
//!
//! One pass per visual layer, drawn by the orchestrator in a fixed order: camera background,
//! anchored overlay plane, decorations, bounding boxes, strokes. Each pass owns its GPU resources,
//! from [`RenderPass::setup`] to [`RenderPass::release`].
//!
//! A pass whose setup failed stays disabled and draws nothing, the others are unaffected.

pub mod background;
pub mod bounding_box;
pub mod decorations;
pub mod plane;
pub mod shaders;
pub mod strokes;

use ardraw_core::tracking::{Anchor, TrackingFrame};
use ardraw_core::transform::CameraMatrices;

use crate::gpu::{
    AttributeLocation, BufferHandle, GpuDevice, GpuError, ProgramHandle, ShaderError,
    TextureError, UniformLocation,
};

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, strum::AsRefStr, strum::EnumIter)]
pub enum PassName {
    Background,
    TexturedPlane,
    Decorations,
    BoundingBoxes,
    Strokes,
}

#[derive(thiserror::Error, Debug)]
pub enum SetupError {
    #[error(transparent)]
    Shader(#[from] ShaderError),
    #[error(transparent)]
    Gpu(#[from] GpuError),
    #[error(transparent)]
    Texture(#[from] TextureError),
}

#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Gpu(#[from] GpuError),
}

/// What a pass gets to see each frame.
#[derive(Copy, Clone, Debug)]
pub struct FrameContext<'a> {
    pub camera: CameraMatrices,
    /// The committed anchor, if any. Not necessarily tracking!
    pub anchor: Option<&'a Anchor>,
    /// `None` when the tracking engine failed to produce a frame.
    pub tracking: Option<&'a TrackingFrame>,
}

pub trait RenderPass {
    fn name(&self) -> PassName;
    /// Allocate programs and static buffers. Called once per surface, on the render thread.
    fn setup(&mut self, device: &mut dyn GpuDevice) -> Result<(), SetupError>;
    /// Set up successfully, and not released since.
    fn is_enabled(&self) -> bool;
    fn draw(
        &mut self,
        device: &mut dyn GpuDevice,
        frame: &FrameContext<'_>,
    ) -> Result<(), RenderError>;
    /// Free every GPU resource this pass owns. The pass is disabled until set up again.
    fn release(&mut self, device: &mut dyn GpuDevice);
}

/// Run setup, logging and leaving the pass disabled on failure.
pub fn setup_or_disable(pass: &mut dyn RenderPass, device: &mut dyn GpuDevice) -> bool {
    match pass.setup(device) {
        Ok(()) => {
            log::debug!("{} pass ready", pass.name().as_ref());
            true
        }
        Err(e) => {
            log::error!("{} pass disabled: {e}", pass.name().as_ref());
            // Free anything allocated before the failure.
            pass.release(device);
            false
        }
    }
}

/// Unit quad in the XZ plane, centered, as a triangle fan. Tracked images lie in this plane.
pub const PLANE_QUAD: [f32; 12] = [
    -0.5, 0.0, -0.5, //
    0.5, 0.0, -0.5, //
    0.5, 0.0, 0.5, //
    -0.5, 0.0, 0.5,
];
/// Texcoords for [`PLANE_QUAD`]. Image top maps to -Z, the far edge of the tracked image.
pub const PLANE_QUAD_UV: [f32; 8] = [
    0.0, 0.0, //
    1.0, 0.0, //
    1.0, 1.0, //
    0.0, 1.0,
];

fn attribute(
    device: &dyn GpuDevice,
    program: ProgramHandle,
    label: &str,
    name: &str,
) -> Result<AttributeLocation, ShaderError> {
    device
        .attribute_location(program, name)
        .ok_or_else(|| ShaderError::MissingSymbol {
            label: label.to_owned(),
            kind: "attribute",
            name: name.to_owned(),
        })
}
fn uniform(
    device: &dyn GpuDevice,
    program: ProgramHandle,
    label: &str,
    name: &str,
) -> Result<UniformLocation, ShaderError> {
    device
        .uniform_location(program, name)
        .ok_or_else(|| ShaderError::MissingSymbol {
            label: label.to_owned(),
            kind: "uniform",
            name: name.to_owned(),
        })
}

/// Compile a program and resolve its symbols, deleting it again if any are missing.
fn build_program<T>(
    device: &mut dyn GpuDevice,
    label: &str,
    vertex: &str,
    fragment: &str,
    resolve: impl FnOnce(&dyn GpuDevice, ProgramHandle) -> Result<T, ShaderError>,
) -> Result<T, ShaderError> {
    let handle = device.compile_program(label, vertex, fragment)?;
    match resolve(device, handle) {
        Ok(program) => Ok(program),
        Err(e) => {
            device.delete_program(handle);
            Err(e)
        }
    }
}

/// [`shaders::textured`], resolved.
#[derive(Copy, Clone, Debug)]
pub struct TexturedProgram {
    pub handle: ProgramHandle,
    pub position: AttributeLocation,
    pub texcoord: AttributeLocation,
    pub mvp: UniformLocation,
    pub texture: UniformLocation,
    pub tint: UniformLocation,
}
impl TexturedProgram {
    pub fn build(device: &mut dyn GpuDevice, label: &str) -> Result<Self, ShaderError> {
        build_program(
            device,
            label,
            shaders::textured::VERTEX,
            shaders::textured::FRAGMENT,
            |device, handle| {
                Ok(Self {
                    handle,
                    position: attribute(device, handle, label, "a_Position")?,
                    texcoord: attribute(device, handle, label, "a_TexCoord")?,
                    mvp: uniform(device, handle, label, "u_Mvp")?,
                    texture: uniform(device, handle, label, "u_Texture")?,
                    tint: uniform(device, handle, label, "u_Tint")?,
                })
            },
        )
    }
}

/// [`shaders::solid`], resolved.
#[derive(Copy, Clone, Debug)]
pub struct SolidProgram {
    pub handle: ProgramHandle,
    pub position: AttributeLocation,
    pub mvp: UniformLocation,
    pub color: UniformLocation,
}
impl SolidProgram {
    pub fn build(device: &mut dyn GpuDevice, label: &str) -> Result<Self, ShaderError> {
        build_program(
            device,
            label,
            shaders::solid::VERTEX,
            shaders::solid::FRAGMENT,
            |device, handle| {
                Ok(Self {
                    handle,
                    position: attribute(device, handle, label, "a_Position")?,
                    mvp: uniform(device, handle, label, "u_Mvp")?,
                    color: uniform(device, handle, label, "u_Color")?,
                })
            },
        )
    }
}

/// Delete a buffer if there is one, leaving `None`.
fn release_buffer(device: &mut dyn GpuDevice, buffer: &mut Option<BufferHandle>) {
    if let Some(buffer) = buffer.take() {
        device.delete_buffer(buffer);
    }
}
fn release_program(device: &mut dyn GpuDevice, program: Option<ProgramHandle>) {
    if let Some(program) = program {
        device.delete_program(program);
    }
}
