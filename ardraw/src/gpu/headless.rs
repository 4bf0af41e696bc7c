//! A [`GpuDevice`] with no GPU behind it, for tests. Shaders go through the same naga front end
//! as on the real device, and draws are checked against the program interface the way wgpu's
//! validation would check them, then recorded for inspection.

use std::num::NonZeroU32;

use ardraw_core::raster::RasterImage;
use hashbrown::{HashMap, HashSet};

use super::reflect::{ProgramInterface, UniformKind};
use super::{
    AttributeLocation, BufferHandle, ClearFlags, DrawCall, GpuDevice, GpuError, ProgramHandle,
    ShaderError, ShaderStage, TextureError, TextureHandle, UniformLocation, UniformValue,
    Vertices,
};

struct ProgramInfo {
    label: String,
    interface: ProgramInterface,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct TextureInfo {
    pub width: u32,
    pub height: u32,
    pub camera: bool,
}

/// A draw call that went through, along with the label of the program it used.
#[derive(Clone, Debug)]
pub struct RecordedDraw {
    pub label: String,
    pub call: DrawCall,
}

pub struct HeadlessDevice {
    next_id: u32,
    max_texture_size: u32,
    programs: HashMap<ProgramHandle, ProgramInfo>,
    /// Size in bytes of each live buffer.
    buffers: HashMap<BufferHandle, usize>,
    textures: HashMap<TextureHandle, TextureInfo>,
    fail_compile: HashSet<String>,
    fail_draws: HashSet<String>,
    draws: Vec<RecordedDraw>,
    clears: Vec<ClearFlags>,
}
impl Default for HeadlessDevice {
    fn default() -> Self {
        Self {
            next_id: 0,
            max_texture_size: 4096,
            programs: HashMap::new(),
            buffers: HashMap::new(),
            textures: HashMap::new(),
            fail_compile: HashSet::new(),
            fail_draws: HashSet::new(),
            draws: Vec::new(),
            clears: Vec::new(),
        }
    }
}
impl HeadlessDevice {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
    /// Make compilation of the program with this label fail, as a driver would on a bad shader.
    pub fn fail_compile(&mut self, label: impl Into<String>) {
        self.fail_compile.insert(label.into());
    }
    /// Make every draw with the program of this label fail.
    pub fn fail_draws(&mut self, label: impl Into<String>) {
        self.fail_draws.insert(label.into());
    }
    pub fn set_max_texture_size(&mut self, max: u32) {
        self.max_texture_size = max;
    }
    fn next_handle(&mut self) -> NonZeroU32 {
        self.next_id = self.next_id.wrapping_add(1);
        NonZeroU32::new(self.next_id).unwrap_or(NonZeroU32::MIN)
    }
    fn check_size(&self, image: &RasterImage) -> Result<(), TextureError> {
        let [width, height] = image.dimensions();
        if width > self.max_texture_size || height > self.max_texture_size {
            return Err(TextureError::TooLarge {
                width,
                height,
                max: self.max_texture_size,
            });
        }
        Ok(())
    }
    #[must_use]
    pub fn draws(&self) -> &[RecordedDraw] {
        &self.draws
    }
    pub fn draws_for<'a>(&'a self, label: &'a str) -> impl Iterator<Item = &'a DrawCall> + 'a {
        self.draws
            .iter()
            .filter(move |draw| draw.label == label)
            .map(|draw| &draw.call)
    }
    /// Labels of recorded draws, in submission order.
    #[must_use]
    pub fn draw_order(&self) -> Vec<&str> {
        self.draws.iter().map(|draw| draw.label.as_str()).collect()
    }
    #[must_use]
    pub fn clears(&self) -> &[ClearFlags] {
        &self.clears
    }
    /// Forget recorded draws and clears, keeping resources alive.
    pub fn reset_frame(&mut self) {
        self.draws.clear();
        self.clears.clear();
    }
    #[must_use]
    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }
    #[must_use]
    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }
    /// Total size of live buffers, in bytes.
    #[must_use]
    pub fn buffer_bytes(&self) -> usize {
        self.buffers.values().sum()
    }
    #[must_use]
    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }
    #[must_use]
    pub fn texture(&self, texture: TextureHandle) -> Option<TextureInfo> {
        self.textures.get(&texture).copied()
    }
    /// Every handle a draw refers to must be alive.
    fn check_handles(&self, call: &DrawCall) -> Result<(), GpuError> {
        for attribute in &call.attributes {
            if let Vertices::Buffer(buffer) = attribute.data {
                if !self.buffers.contains_key(&buffer) {
                    return Err(GpuError::Draw(format!("unknown buffer {buffer:?}")));
                }
            }
        }
        if let Some(indices) = call.indices {
            if !self.buffers.contains_key(&indices) {
                return Err(GpuError::Draw(format!("unknown index buffer {indices:?}")));
            }
        }
        for uniform in &call.uniforms {
            if let UniformValue::Texture(texture) = uniform.value {
                if !self.textures.contains_key(&texture) {
                    return Err(GpuError::Draw(format!("unknown texture {texture:?}")));
                }
            }
        }
        Ok(())
    }
}

impl GpuDevice for HeadlessDevice {
    fn compile_program(
        &mut self,
        label: &str,
        vertex: &str,
        fragment: &str,
    ) -> Result<ProgramHandle, ShaderError> {
        if self.fail_compile.contains(label) {
            return Err(ShaderError::Compile {
                label: label.to_owned(),
                stage: ShaderStage::Vertex,
                log: "compilation failure injected".to_owned(),
            });
        }
        let interface = ProgramInterface::reflect(label, vertex, fragment)?;
        let handle = ProgramHandle(self.next_handle());
        self.programs.insert(
            handle,
            ProgramInfo {
                label: label.to_owned(),
                interface,
            },
        );
        log::trace!("Compiled program {label} as {handle:?}");
        Ok(handle)
    }
    fn delete_program(&mut self, program: ProgramHandle) {
        if self.programs.remove(&program).is_none() {
            log::warn!("Deleted unknown program {program:?}");
        }
    }
    fn attribute_location(&self, program: ProgramHandle, name: &str) -> Option<AttributeLocation> {
        let info = self.programs.get(&program)?.interface.attributes.get(name)?;
        Some(AttributeLocation(info.location))
    }
    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<UniformLocation> {
        let info = self.programs.get(&program)?.interface.uniforms.get(name)?;
        (info.kind != UniformKind::Sampler).then_some(UniformLocation(info.binding))
    }
    fn create_vertex_buffer(&mut self, data: &[f32]) -> Result<BufferHandle, GpuError> {
        if data.is_empty() {
            return Err(GpuError::BufferAllocation);
        }
        let handle = BufferHandle(self.next_handle());
        self.buffers
            .insert(handle, bytemuck::cast_slice::<_, u8>(data).len());
        Ok(handle)
    }
    fn create_index_buffer(&mut self, data: &[u16]) -> Result<BufferHandle, GpuError> {
        if data.is_empty() {
            return Err(GpuError::BufferAllocation);
        }
        let handle = BufferHandle(self.next_handle());
        self.buffers
            .insert(handle, bytemuck::cast_slice::<_, u8>(data).len());
        Ok(handle)
    }
    fn delete_buffer(&mut self, buffer: BufferHandle) {
        if self.buffers.remove(&buffer).is_none() {
            log::warn!("Deleted unknown buffer {buffer:?}");
        }
    }
    fn upload_texture(&mut self, image: &RasterImage) -> Result<TextureHandle, TextureError> {
        self.check_size(image)?;
        let handle = TextureHandle(self.next_handle());
        let [width, height] = image.dimensions();
        self.textures.insert(
            handle,
            TextureInfo {
                width,
                height,
                camera: false,
            },
        );
        Ok(handle)
    }
    fn create_camera_texture(&mut self) -> Result<TextureHandle, TextureError> {
        let handle = TextureHandle(self.next_handle());
        self.textures.insert(
            handle,
            TextureInfo {
                width: 1,
                height: 1,
                camera: true,
            },
        );
        Ok(handle)
    }
    fn update_texture(
        &mut self,
        texture: TextureHandle,
        image: &RasterImage,
    ) -> Result<(), TextureError> {
        self.check_size(image)?;
        let info = self
            .textures
            .get_mut(&texture)
            .ok_or(TextureError::Unknown(texture))?;
        [info.width, info.height] = image.dimensions();
        Ok(())
    }
    fn delete_texture(&mut self, texture: TextureHandle) {
        if self.textures.remove(&texture).is_none() {
            log::warn!("Deleted unknown texture {texture:?}");
        }
    }
    fn clear(&mut self, flags: ClearFlags, _color: [f32; 4]) {
        self.clears.push(flags);
    }
    fn draw(&mut self, call: &DrawCall) -> Result<(), GpuError> {
        let info = self
            .programs
            .get(&call.program)
            .ok_or_else(|| GpuError::Draw(format!("unknown program {:?}", call.program)))?;
        if self.fail_draws.contains(&info.label) {
            return Err(GpuError::Draw(format!("failure injected for {}", info.label)));
        }
        info.interface.check_draw(call)?;
        self.check_handles(call)?;
        let label = info.label.clone();
        self.draws.push(RecordedDraw {
            label,
            call: call.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use smallvec::smallvec;

    use super::HeadlessDevice;
    use crate::gpu::{
        DrawCall, GpuDevice, GpuError, PipelineState, ShaderError, Topology, Uniform,
        UniformValue, VertexInput, Vertices,
    };
    use crate::passes::shaders;
    use ardraw_core::{Argb, RasterImage};

    fn solid(device: &mut HeadlessDevice) -> crate::gpu::ProgramHandle {
        device
            .compile_program("solid", shaders::solid::VERTEX, shaders::solid::FRAGMENT)
            .unwrap()
    }

    #[test]
    fn resolves_declarations() {
        let mut device = HeadlessDevice::new();
        let program = device
            .compile_program(
                "textured",
                shaders::textured::VERTEX,
                shaders::textured::FRAGMENT,
            )
            .unwrap();
        assert!(device.attribute_location(program, "a_TexCoord").is_some());
        assert!(device.uniform_location(program, "u_Tint").is_some());
        assert!(device.uniform_location(program, "u_Missing").is_none());
        // Samplers are the device's business.
        assert!(device.uniform_location(program, "u_Sampler").is_none());
    }
    #[test]
    fn rejects_invalid_sources() {
        let mut device = HeadlessDevice::new();
        let undeclared = "@vertex\nfn main() -> @builtin(position) vec4<f32> {\n    return undefined_thing * 3.0;\n}\n";
        assert!(matches!(
            device.compile_program("undeclared", undeclared, shaders::solid::FRAGMENT),
            Err(ShaderError::Compile { .. })
        ));
        let mistyped = "@group(0) @binding(1) var<uniform> u_Color: vec4<f32>;\n@fragment\nfn main() -> @location(0) vec4<f32> {\n    return vec2<f32>(1.0);\n}\n";
        assert!(matches!(
            device.compile_program("mistyped", shaders::solid::VERTEX, mistyped),
            Err(ShaderError::Compile { .. })
        ));
        assert!(device
            .compile_program("unbalanced", shaders::solid::VERTEX, "@fragment fn main() {")
            .is_err());
        device.fail_compile("injected");
        assert!(device
            .compile_program("injected", shaders::solid::VERTEX, shaders::solid::FRAGMENT)
            .is_err());
        assert_eq!(device.live_programs(), 0);
    }
    #[test]
    fn draws_are_checked_against_the_program() {
        let mut device = HeadlessDevice::new();
        let program = solid(&mut device);
        let position = device.attribute_location(program, "a_Position").unwrap();
        let mvp = device.uniform_location(program, "u_Mvp").unwrap();
        let color = device.uniform_location(program, "u_Color").unwrap();
        let mut call = DrawCall {
            program,
            state: PipelineState::STROKES,
            topology: Topology::LineStrip,
            attributes: smallvec![VertexInput {
                location: position,
                components: 3,
                data: Vertices::Inline(vec![0.0; 6]),
            }],
            uniforms: smallvec![
                Uniform {
                    location: mvp,
                    value: UniformValue::Matrix4(cgmath::SquareMatrix::identity()),
                },
                Uniform {
                    location: color,
                    value: UniformValue::Vec4([1.0; 4]),
                },
            ],
            indices: None,
            count: 2,
        };
        device.draw(&call).unwrap();

        call.attributes[0].components = 2;
        assert!(matches!(device.draw(&call), Err(GpuError::Draw(_))));
        call.attributes[0].components = 3;

        call.uniforms[1].value = UniformValue::Matrix4(cgmath::SquareMatrix::identity());
        assert!(matches!(device.draw(&call), Err(GpuError::Draw(_))));

        call.uniforms.truncate(1);
        assert!(matches!(device.draw(&call), Err(GpuError::Draw(_))));
        assert_eq!(device.draws().len(), 1);
    }
    #[test]
    fn texture_bookkeeping() {
        let mut device = HeadlessDevice::new();
        device.set_max_texture_size(8);
        let small = RasterImage::new_filled(4, 4, Argb::WHITE).unwrap();
        let large = RasterImage::new_filled(16, 4, Argb::WHITE).unwrap();
        let texture = device.upload_texture(&small).unwrap();
        assert!(device.upload_texture(&large).is_err());
        assert!(device.update_texture(texture, &large).is_err());
        assert_eq!(device.live_textures(), 1);
        device.delete_texture(texture);
        assert_eq!(device.live_textures(), 0);
        assert!(device.update_texture(texture, &small).is_err());
    }
    #[test]
    fn buffer_bookkeeping() {
        let mut device = HeadlessDevice::new();
        let vertices = device.create_vertex_buffer(&[0.0; 12]).unwrap();
        let indices = device.create_index_buffer(&[0, 1, 2]).unwrap();
        assert_eq!(device.live_buffers(), 2);
        assert_eq!(device.buffer_bytes(), 12 * 4 + 3 * 2);
        assert!(device.create_vertex_buffer(&[]).is_err());

        device.delete_buffer(vertices);
        device.delete_buffer(indices);
        assert_eq!(device.buffer_bytes(), 0);
    }
}
