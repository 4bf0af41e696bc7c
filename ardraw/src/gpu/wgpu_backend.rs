//! [`GpuDevice`] on top of wgpu.
//!
//! Draws are recorded into one command encoder per frame, between [`WgpuDevice::begin_frame`]
//! and [`WgpuDevice::end_frame`]. Each draw gets its own render pass: a pending [`GpuDevice::clear`]
//! becomes the load op of the next one. Pipelines are built lazily, one per combination of
//! program, fixed-function state and vertex layout, and cached for the life of the program.

use std::borrow::Cow;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ardraw_core::color::Argb;
use ardraw_core::raster::RasterImage;
use hashbrown::HashMap;
use smallvec::SmallVec;
use wgpu::util::DeviceExt;

use super::reflect::{ProgramInterface, UniformKind, BIND_GROUP, ENTRY_POINT};
use super::{
    AttributeLocation, Blend, BufferHandle, ClearFlags, DepthTest, DrawCall, GpuDevice, GpuError,
    ProgramHandle, ShaderError, ShaderStage, TextureError, TextureHandle, Topology,
    UniformLocation, UniformValue, Vertices,
};

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;
/// Format of every sampled texture. Pixels pass through unconverted.
pub const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("no suitable GPU adapter")]
    NoAdapter,
    #[error("device request failed: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
}

struct Program {
    label: String,
    interface: ProgramInterface,
    vertex: wgpu::ShaderModule,
    fragment: wgpu::ShaderModule,
}

struct Buffer {
    buffer: wgpu::Buffer,
    /// Index data is kept CPU-side too, fans get unrolled from it.
    indices: Option<Vec<u16>>,
}

struct Texture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: [u32; 2],
}

struct DepthTarget {
    view: wgpu::TextureView,
    size: [u32; 2],
}

struct Frame {
    target: wgpu::TextureView,
    encoder: wgpu::CommandEncoder,
    clear: Option<(ClearFlags, [f32; 4])>,
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
struct PipelineKey {
    program: ProgramHandle,
    blend: Blend,
    depth_test: DepthTest,
    depth_write: bool,
    topology: wgpu::PrimitiveTopology,
    /// `(location, components)` of each vertex buffer slot, in slot order.
    layout: SmallVec<[(u32, u8); 2]>,
}

pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    color_format: wgpu::TextureFormat,
    sampler: wgpu::Sampler,
    lost: Arc<AtomicBool>,
    next_id: u32,
    programs: HashMap<ProgramHandle, Program>,
    buffers: HashMap<BufferHandle, Buffer>,
    textures: HashMap<TextureHandle, Texture>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    depth: Option<DepthTarget>,
    frame: Option<Frame>,
    warned_line_width: bool,
}
impl WgpuDevice {
    /// Wrap an existing device. Frames will be rendered into targets of `color_format`.
    #[must_use]
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, color_format: wgpu::TextureFormat) -> Self {
        device.on_uncaptured_error(Box::new(|e| log::error!("Uncaptured GPU error: {e}")));
        let lost = Arc::new(AtomicBool::new(false));
        {
            let lost = lost.clone();
            device.set_device_lost_callback(move |reason, message| {
                log::error!("GPU device lost ({reason:?}): {message}");
                lost.store(true, Ordering::Release);
            });
        }
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("ardraw linear clamp"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        Self {
            device,
            queue,
            color_format,
            sampler,
            lost,
            next_id: 0,
            programs: HashMap::new(),
            buffers: HashMap::new(),
            textures: HashMap::new(),
            pipelines: HashMap::new(),
            depth: None,
            frame: None,
            warned_line_width: false,
        }
    }
    /// Open the default adapter without a surface, for offscreen rendering.
    pub fn request(color_format: wgpu::TextureFormat) -> Result<Self, InitError> {
        pollster::block_on(async {
            let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
            let adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::default(),
                    force_fallback_adapter: false,
                    compatible_surface: None,
                })
                .await
                .ok_or(InitError::NoAdapter)?;
            let info = adapter.get_info();
            log::info!("GPU adapter {} ({:?})", info.name, info.backend);

            let (device, queue) = adapter
                .request_device(
                    &wgpu::DeviceDescriptor {
                        label: Some("ardraw"),
                        required_features: wgpu::Features::empty(),
                        required_limits: wgpu::Limits::downlevel_defaults()
                            .using_resolution(adapter.limits()),
                        memory_hints: wgpu::MemoryHints::default(),
                    },
                    None,
                )
                .await?;
            Ok(Self::new(device, queue, color_format))
        })
    }
    #[must_use]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }
    #[must_use]
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }
    fn next_handle(&mut self) -> NonZeroU32 {
        self.next_id = self.next_id.wrapping_add(1);
        NonZeroU32::new(self.next_id).unwrap_or(NonZeroU32::MIN)
    }
    /// Run `f` inside error scopes, returning any validation or out-of-memory error it raised.
    fn scoped<T>(&self, f: impl FnOnce(&wgpu::Device) -> T) -> (T, Option<wgpu::Error>) {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f(&self.device);
        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());
        (value, validation.or(out_of_memory))
    }
    /// Start recording a frame into `target`, of the given size in pixels.
    ///
    /// A frame that was never ended is submitted first.
    pub fn begin_frame(&mut self, target: wgpu::TextureView, size: [u32; 2]) -> Result<(), GpuError> {
        if self.frame.is_some() {
            log::warn!("Frame begun before the previous one ended");
            self.end_frame()?;
        }
        if self.depth.as_ref().map(|depth| depth.size) != Some(size) {
            let texture = self.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("ardraw depth"),
                size: extent(size),
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: DEPTH_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            });
            self.depth = Some(DepthTarget {
                view: texture.create_view(&wgpu::TextureViewDescriptor::default()),
                size,
            });
        }
        let encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("ardraw frame"),
            });
        self.frame = Some(Frame {
            target,
            encoder,
            clear: None,
        });
        Ok(())
    }
    /// Submit everything recorded since [`Self::begin_frame`].
    pub fn end_frame(&mut self) -> Result<(), GpuError> {
        let Some(mut frame) = self.frame.take() else {
            return Ok(());
        };
        if let Some(clear) = frame.clear.take() {
            // Nothing drew after the clear, so it needs a pass of its own.
            if let Some(depth) = &self.depth {
                drop(begin_pass(&mut frame, &depth.view, Some(clear)));
            }
        }
        let ((), error) = self.scoped(|_| {
            self.queue.submit(std::iter::once(frame.encoder.finish()));
        });
        if self.lost.load(Ordering::Acquire) {
            return Err(GpuError::DeviceLost);
        }
        match error {
            Some(e) => Err(GpuError::Draw(e.to_string())),
            None => Ok(()),
        }
    }
    fn pipeline_for(&mut self, key: &PipelineKey) -> Result<(), GpuError> {
        if self.pipelines.contains_key(key) {
            return Ok(());
        }
        let program = self
            .programs
            .get(&key.program)
            .ok_or_else(|| GpuError::Draw(format!("unknown program {:?}", key.program)))?;
        let (pipeline, error) = self.scoped(|device| {
            build_pipeline(device, self.color_format, program, key)
        });
        if let Some(e) = error {
            return Err(GpuError::Draw(format!("{}: {e}", program.label)));
        }
        log::debug!(
            "Built pipeline for {} ({:?}, {})",
            program.label,
            key.topology,
            key.blend.as_ref()
        );
        self.pipelines.insert(key.clone(), pipeline?);
        Ok(())
    }
    fn create_texture(&self, image: &RasterImage, label: &str) -> Result<Texture, TextureError> {
        let [width, height] = image.dimensions();
        let max = self.device.limits().max_texture_dimension_2d;
        if width > max || height > max {
            return Err(TextureError::TooLarge { width, height, max });
        }
        let (texture, error) = self.scoped(|device| {
            device.create_texture_with_data(
                &self.queue,
                &wgpu::TextureDescriptor {
                    label: Some(label),
                    size: extent([width, height]),
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: TEXTURE_FORMAT,
                    usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                    view_formats: &[],
                },
                wgpu::util::TextureDataOrder::LayerMajor,
                &image.to_rgba8_bytes(),
            )
        });
        match error {
            Some(wgpu::Error::OutOfMemory { .. }) => Err(TextureError::Allocation),
            Some(e) => Err(TextureError::Upload(e.to_string())),
            None => Ok(Texture {
                view: texture.create_view(&wgpu::TextureViewDescriptor::default()),
                texture,
                size: [width, height],
            }),
        }
    }
    fn create_buffer(
        &mut self,
        contents: &[u8],
        usage: wgpu::BufferUsages,
        indices: Option<Vec<u16>>,
    ) -> Result<BufferHandle, GpuError> {
        if contents.is_empty() {
            return Err(GpuError::BufferAllocation);
        }
        let (buffer, error) = self.scoped(|device| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: None,
                contents,
                usage,
            })
        });
        if let Some(e) = error {
            log::error!("Buffer allocation failed: {e}");
            return Err(GpuError::BufferAllocation);
        }
        let handle = BufferHandle(self.next_handle());
        self.buffers.insert(handle, Buffer { buffer, indices });
        Ok(handle)
    }
}

fn extent([width, height]: [u32; 2]) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    }
}

fn begin_pass<'encoder>(
    frame: &'encoder mut Frame,
    depth: &wgpu::TextureView,
    clear: Option<(ClearFlags, [f32; 4])>,
) -> wgpu::RenderPass<'encoder> {
    let (flags, [r, g, b, a]) = clear.unwrap_or((ClearFlags::empty(), [0.0; 4]));
    let color_load = if flags.contains(ClearFlags::COLOR) {
        wgpu::LoadOp::Clear(wgpu::Color {
            r: r.into(),
            g: g.into(),
            b: b.into(),
            a: a.into(),
        })
    } else {
        wgpu::LoadOp::Load
    };
    let depth_load = if flags.contains(ClearFlags::DEPTH) {
        wgpu::LoadOp::Clear(1.0)
    } else {
        wgpu::LoadOp::Load
    };
    frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: None,
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: &frame.target,
            resolve_target: None,
            ops: wgpu::Operations {
                load: color_load,
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
            view: depth,
            depth_ops: Some(wgpu::Operations {
                load: depth_load,
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: None,
        }),
        timestamp_writes: None,
        occlusion_query_set: None,
    })
}

fn vertex_format(components: u8) -> Option<wgpu::VertexFormat> {
    match components {
        1 => Some(wgpu::VertexFormat::Float32),
        2 => Some(wgpu::VertexFormat::Float32x2),
        3 => Some(wgpu::VertexFormat::Float32x3),
        4 => Some(wgpu::VertexFormat::Float32x4),
        _ => None,
    }
}

/// Fans aren't a wgpu primitive. Strips and lists map directly.
fn primitive_topology(topology: Topology) -> wgpu::PrimitiveTopology {
    match topology {
        Topology::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
        Topology::TriangleFan | Topology::Triangles => wgpu::PrimitiveTopology::TriangleList,
        Topology::Lines => wgpu::PrimitiveTopology::LineList,
        Topology::LineStrip => wgpu::PrimitiveTopology::LineStrip,
    }
}

/// Indices of a fan over `vertices`, as a triangle list.
fn unroll_fan(vertices: &[u16]) -> Vec<u16> {
    let Some((&hub, rim)) = vertices.split_first() else {
        return Vec::new();
    };
    rim.windows(2)
        .flat_map(|edge| [hub, edge[0], edge[1]])
        .collect()
}

fn blend_state(blend: Blend) -> wgpu::BlendState {
    match blend {
        Blend::Opaque => wgpu::BlendState::REPLACE,
        Blend::Alpha => wgpu::BlendState::ALPHA_BLENDING,
    }
}

fn depth_compare(test: DepthTest) -> wgpu::CompareFunction {
    match test {
        DepthTest::Disabled => wgpu::CompareFunction::Always,
        DepthTest::LessEqual => wgpu::CompareFunction::LessEqual,
    }
}

fn build_pipeline(
    device: &wgpu::Device,
    color_format: wgpu::TextureFormat,
    program: &Program,
    key: &PipelineKey,
) -> Result<wgpu::RenderPipeline, GpuError> {
    let attributes = key
        .layout
        .iter()
        .map(|&(location, components)| {
            let format = vertex_format(components).ok_or_else(|| {
                GpuError::Draw(format!("{components} components at location {location}"))
            })?;
            Ok([wgpu::VertexAttribute {
                format,
                offset: 0,
                shader_location: location,
            }])
        })
        .collect::<Result<Vec<_>, GpuError>>()?;
    let buffers: Vec<_> = key
        .layout
        .iter()
        .zip(&attributes)
        .map(|(&(_, components), attribute)| wgpu::VertexBufferLayout {
            array_stride: u64::from(components) * 4,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: attribute,
        })
        .collect();

    Ok(device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(&program.label),
        layout: None,
        vertex: wgpu::VertexState {
            module: &program.vertex,
            entry_point: ENTRY_POINT,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            buffers: &buffers,
        },
        primitive: wgpu::PrimitiveState {
            topology: key.topology,
            strip_index_format: key
                .topology
                .is_strip()
                .then_some(wgpu::IndexFormat::Uint16),
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            unclipped_depth: false,
            polygon_mode: wgpu::PolygonMode::Fill,
            conservative: false,
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: key.depth_write,
            depth_compare: depth_compare(key.depth_test),
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: &program.fragment,
            entry_point: ENTRY_POINT,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format: color_format,
                blend: Some(blend_state(key.blend)),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        multiview: None,
        cache: None,
    }))
}

impl GpuDevice for WgpuDevice {
    fn compile_program(
        &mut self,
        label: &str,
        vertex: &str,
        fragment: &str,
    ) -> Result<ProgramHandle, ShaderError> {
        let interface = ProgramInterface::reflect(label, vertex, fragment)?;
        let mut modules = [(ShaderStage::Vertex, vertex), (ShaderStage::Fragment, fragment)]
            .into_iter()
            .map(|(stage, source)| {
                let (module, error) = self.scoped(|device| {
                    device.create_shader_module(wgpu::ShaderModuleDescriptor {
                        label: Some(label),
                        source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(source)),
                    })
                });
                match error {
                    Some(e) => Err(ShaderError::Compile {
                        label: label.to_owned(),
                        stage,
                        log: e.to_string(),
                    }),
                    None => Ok(module),
                }
            })
            .collect::<Result<Vec<_>, _>>()?
            .into_iter();
        let (Some(vertex), Some(fragment)) = (modules.next(), modules.next()) else {
            return Err(ShaderError::Link {
                label: label.to_owned(),
                log: "missing stage".to_owned(),
            });
        };

        let handle = ProgramHandle(self.next_handle());
        self.programs.insert(
            handle,
            Program {
                label: label.to_owned(),
                interface,
                vertex,
                fragment,
            },
        );
        log::trace!("Compiled program {label} as {handle:?}");
        Ok(handle)
    }
    fn delete_program(&mut self, program: ProgramHandle) {
        if self.programs.remove(&program).is_none() {
            log::warn!("Deleted unknown program {program:?}");
        }
        self.pipelines.retain(|key, _| key.program != program);
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
        self.create_buffer(bytemuck::cast_slice(data), wgpu::BufferUsages::VERTEX, None)
    }
    fn create_index_buffer(&mut self, data: &[u16]) -> Result<BufferHandle, GpuError> {
        self.create_buffer(
            bytemuck::cast_slice(data),
            wgpu::BufferUsages::INDEX,
            Some(data.to_vec()),
        )
    }
    fn delete_buffer(&mut self, buffer: BufferHandle) {
        match self.buffers.remove(&buffer) {
            Some(buffer) => buffer.buffer.destroy(),
            None => log::warn!("Deleted unknown buffer {buffer:?}"),
        }
    }
    fn upload_texture(&mut self, image: &RasterImage) -> Result<TextureHandle, TextureError> {
        let texture = self.create_texture(image, "ardraw image")?;
        let handle = TextureHandle(self.next_handle());
        self.textures.insert(handle, texture);
        Ok(handle)
    }
    fn create_camera_texture(&mut self) -> Result<TextureHandle, TextureError> {
        let black = RasterImage::new_filled(1, 1, Argb::BLACK)
            .map_err(|e| TextureError::Upload(e.to_string()))?;
        let texture = self.create_texture(&black, "ardraw camera")?;
        let handle = TextureHandle(self.next_handle());
        self.textures.insert(handle, texture);
        Ok(handle)
    }
    fn update_texture(
        &mut self,
        texture: TextureHandle,
        image: &RasterImage,
    ) -> Result<(), TextureError> {
        let current = self
            .textures
            .get(&texture)
            .ok_or(TextureError::Unknown(texture))?;
        if current.size != image.dimensions() {
            let replacement = self.create_texture(image, "ardraw camera")?;
            if let Some(old) = self.textures.insert(texture, replacement) {
                old.texture.destroy();
            }
            return Ok(());
        }
        let [width, height] = current.size;
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &current.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &image.to_rgba8_bytes(),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(height),
            },
            extent(current.size),
        );
        Ok(())
    }
    fn delete_texture(&mut self, texture: TextureHandle) {
        match self.textures.remove(&texture) {
            Some(texture) => texture.texture.destroy(),
            None => log::warn!("Deleted unknown texture {texture:?}"),
        }
    }
    fn clear(&mut self, flags: ClearFlags, color: [f32; 4]) {
        match &mut self.frame {
            Some(frame) => {
                let merged = frame
                    .clear
                    .map_or(flags, |(pending, _)| pending | flags);
                frame.clear = Some((merged, color));
            }
            None => log::warn!("Clear outside of a frame ignored"),
        }
    }
    fn draw(&mut self, call: &DrawCall) -> Result<(), GpuError> {
        if self.lost.load(Ordering::Acquire) {
            return Err(GpuError::DeviceLost);
        }
        if self.frame.is_none() {
            return Err(GpuError::Draw("no frame in progress".to_owned()));
        }
        let unknown_program = || GpuError::Draw(format!("unknown program {:?}", call.program));
        self.programs
            .get(&call.program)
            .ok_or_else(unknown_program)?
            .interface
            .check_draw(call)?;
        if call.count == 0 {
            return Ok(());
        }

        let key = PipelineKey {
            program: call.program,
            blend: call.state.blend,
            depth_test: call.state.depth_test,
            depth_write: call.state.depth_write,
            topology: primitive_topology(call.topology),
            layout: call
                .attributes
                .iter()
                .map(|attribute| (attribute.location.0, attribute.components))
                .collect(),
        };
        self.pipeline_for(&key)?;
        let program = self.programs.get(&call.program).ok_or_else(unknown_program)?;
        let is_line = matches!(call.topology, Topology::Lines | Topology::LineStrip);
        if is_line && call.state.line_width > 1.0 && !self.warned_line_width {
            log::warn!("Wide lines are unsupported, {} draws at 1px", program.label);
            self.warned_line_width = true;
        }

        // Per-draw data lives in short-lived buffers. Fans get a fresh index list.
        let mut inline = Vec::new();
        for attribute in &call.attributes {
            if let Vertices::Inline(data) = &attribute.data {
                inline.push(self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: None,
                    contents: bytemuck::cast_slice(data),
                    usage: wgpu::BufferUsages::VERTEX,
                }));
            }
        }
        let mut vertex_buffers = Vec::with_capacity(call.attributes.len());
        let mut inline_iter = inline.iter();
        for attribute in &call.attributes {
            let buffer = match &attribute.data {
                Vertices::Buffer(handle) => self
                    .buffers
                    .get(handle)
                    .map(|buffer| &buffer.buffer)
                    .ok_or_else(|| GpuError::Draw(format!("unknown buffer {handle:?}")))?,
                Vertices::Inline(_) => inline_iter
                    .next()
                    .ok_or_else(|| GpuError::Draw("inline buffer missing".to_owned()))?,
            };
            vertex_buffers.push(buffer);
        }

        let stored_indices = match call.indices {
            Some(handle) => Some(
                self.buffers
                    .get(&handle)
                    .ok_or_else(|| GpuError::Draw(format!("unknown index buffer {handle:?}")))?,
            ),
            None => None,
        };
        let fan = (call.topology == Topology::TriangleFan).then(|| {
            let vertices: Vec<u16> = match stored_indices.and_then(|b| b.indices.as_deref()) {
                // As OK - count is bounded by the u16 index data it reads.
                Some(indices) => indices.iter().copied().take(call.count as usize).collect(),
                None => (0..u16::try_from(call.count).unwrap_or(u16::MAX)).collect(),
            };
            unroll_fan(&vertices)
        });
        let fan_buffer = fan.as_ref().filter(|fan| !fan.is_empty()).map(|fan| {
            self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: None,
                contents: bytemuck::cast_slice(fan),
                usage: wgpu::BufferUsages::INDEX,
            })
        });
        let (index_buffer, count) = match (&fan, &fan_buffer) {
            (Some(fan), Some(buffer)) => (Some(buffer), u32::try_from(fan.len()).unwrap_or(0)),
            // Fewer than three vertices, nothing to draw.
            (Some(_), None) => return Ok(()),
            (None, _) => (stored_indices.map(|b| &b.buffer), call.count),
        };

        let mut uniform_buffers = Vec::new();
        for uniform in &call.uniforms {
            let contents: &[u8] = match &uniform.value {
                UniformValue::Matrix4(matrix) => {
                    let columns: &[f32; 16] = matrix.as_ref();
                    bytemuck::cast_slice(columns.as_slice())
                }
                UniformValue::Vec4(vector) => bytemuck::cast_slice(vector.as_slice()),
                UniformValue::Texture(_) => continue,
            };
            uniform_buffers.push((
                uniform.location.0,
                self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: None,
                    contents,
                    usage: wgpu::BufferUsages::UNIFORM,
                }),
            ));
        }
        let mut entries = Vec::with_capacity(program.interface.uniforms.len());
        for (binding, buffer) in &uniform_buffers {
            entries.push(wgpu::BindGroupEntry {
                binding: *binding,
                resource: buffer.as_entire_binding(),
            });
        }
        for uniform in &call.uniforms {
            if let UniformValue::Texture(handle) = uniform.value {
                let texture = self
                    .textures
                    .get(&handle)
                    .ok_or_else(|| GpuError::Draw(format!("unknown texture {handle:?}")))?;
                entries.push(wgpu::BindGroupEntry {
                    binding: uniform.location.0,
                    resource: wgpu::BindingResource::TextureView(&texture.view),
                });
            }
        }
        for binding in program.interface.bindings_of(UniformKind::Sampler) {
            entries.push(wgpu::BindGroupEntry {
                binding,
                resource: wgpu::BindingResource::Sampler(&self.sampler),
            });
        }

        let pipeline = self
            .pipelines
            .get(&key)
            .ok_or_else(|| GpuError::Draw(format!("no pipeline for {}", program.label)))?;
        let bind_group = (!entries.is_empty()).then(|| {
            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: None,
                layout: &pipeline.get_bind_group_layout(BIND_GROUP),
                entries: &entries,
            })
        });

        let (Some(frame), Some(depth)) = (self.frame.as_mut(), self.depth.as_ref()) else {
            return Err(GpuError::Draw("no frame in progress".to_owned()));
        };
        let clear = frame.clear.take();
        let mut pass = begin_pass(frame, &depth.view, clear);
        pass.set_pipeline(pipeline);
        if let Some(bind_group) = &bind_group {
            pass.set_bind_group(BIND_GROUP, bind_group, &[]);
        }
        for (slot, buffer) in (0u32..).zip(&vertex_buffers) {
            pass.set_vertex_buffer(slot, buffer.slice(..));
        }
        match index_buffer {
            Some(buffer) => {
                pass.set_index_buffer(buffer.slice(..), wgpu::IndexFormat::Uint16);
                pass.draw_indexed(0..count, 0, 0..1);
            }
            None => pass.draw(0..count, 0..1),
        }
        Ok(())
    }
}

/// A color texture frames can be rendered into and read back from.
pub struct OffscreenTarget {
    texture: wgpu::Texture,
    size: [u32; 2],
}
impl OffscreenTarget {
    pub const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
    const BYTES_PER_PIXEL: u32 = 4;

    #[must_use]
    pub fn new(device: &WgpuDevice, size: [u32; 2]) -> Self {
        let texture = device.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("ardraw offscreen"),
            size: extent(size),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        Self { texture, size }
    }
    #[must_use]
    pub fn size(&self) -> [u32; 2] {
        self.size
    }
    #[must_use]
    pub fn view(&self) -> wgpu::TextureView {
        self.texture
            .create_view(&wgpu::TextureViewDescriptor::default())
    }
    /// Copy the rendered pixels back to the CPU. Blocks until the GPU is done.
    pub fn read(&self, device: &WgpuDevice) -> Result<RasterImage, GpuError> {
        let [width, height] = self.size;
        let row_bytes = width * Self::BYTES_PER_PIXEL;
        let padded_row_bytes = padded_row(row_bytes);
        let readback = device.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("ardraw readback"),
            size: u64::from(padded_row_bytes) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = device
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("ardraw readback"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &readback,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row_bytes),
                    rows_per_image: Some(height),
                },
            },
            extent(self.size),
        );
        device.queue.submit(std::iter::once(encoder.finish()));

        let slice = readback.slice(..);
        let (send, receive) = tokio::sync::oneshot::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            // Receiver only goes away if we've already bailed.
            let _ = send.send(result);
        });
        device.device.poll(wgpu::Maintain::Wait);
        receive
            .blocking_recv()
            .map_err(|e| GpuError::Readback(e.to_string()))?
            .map_err(|e| GpuError::Readback(e.to_string()))?;

        let mapped = slice.get_mapped_range();
        // As OK - rows are at most a few KiB.
        let pixels = mapped
            .chunks_exact(padded_row_bytes as usize)
            .flat_map(|row| row[..row_bytes as usize].chunks_exact(4))
            .map(|p| Argb::from_rgba8([p[0], p[1], p[2], p[3]]))
            .collect();
        drop(mapped);
        readback.unmap();
        RasterImage::from_pixels(width, height, pixels).map_err(|e| GpuError::Readback(e.to_string()))
    }
}

fn padded_row(row_bytes: u32) -> u32 {
    row_bytes.next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
}
