//! Shader interface reflection. Both stages of a program are parsed and validated with naga
//! before any device sees them, and their interfaces are checked against each other. Devices
//! resolve attribute and uniform names through the result.

use hashbrown::HashMap;
use naga::{Binding, Handle, Module, Type, TypeInner, VectorSize};

use super::{DrawCall, GpuError, ShaderError, ShaderStage, UniformValue, Vertices};

/// Every stage's entry point is called this.
pub const ENTRY_POINT: &str = "main";
/// All resources live in this bind group.
pub const BIND_GROUP: u32 = 0;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct AttributeInfo {
    pub location: u32,
    /// Floats per vertex.
    pub components: u8,
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, strum::AsRefStr)]
pub enum UniformKind {
    Matrix4,
    Vec4,
    Texture,
    /// Filled by the device itself, never by a draw call.
    Sampler,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct UniformInfo {
    pub binding: u32,
    pub kind: UniformKind,
}

/// The names a linked program exposes.
#[derive(Clone, Debug, Default)]
pub struct ProgramInterface {
    pub attributes: HashMap<String, AttributeInfo>,
    pub uniforms: HashMap<String, UniformInfo>,
}
impl ProgramInterface {
    /// Compile both WGSL stages and link them.
    pub fn reflect(label: &str, vertex: &str, fragment: &str) -> Result<Self, ShaderError> {
        let vertex_module = compile(label, ShaderStage::Vertex, vertex)?;
        let fragment_module = compile(label, ShaderStage::Fragment, fragment)?;
        let vertex_entry = entry_point(label, ShaderStage::Vertex, &vertex_module)?;
        let fragment_entry = entry_point(label, ShaderStage::Fragment, &fragment_module)?;
        let link_error = |log: String| ShaderError::Link {
            label: label.to_owned(),
            log,
        };

        let mut attributes = HashMap::new();
        for argument in &vertex_entry.function.arguments {
            let (Some(name), Some(Binding::Location { location, .. })) =
                (&argument.name, &argument.binding)
            else {
                continue;
            };
            let components = float_components(&vertex_module.types[argument.ty].inner)
                .ok_or_else(|| link_error(format!("attribute {name} is not a float vector")))?;
            attributes.insert(
                name.clone(),
                AttributeInfo {
                    location: *location,
                    components,
                },
            );
        }

        let written = vertex_entry
            .function
            .result
            .as_ref()
            .map(|result| locations(&vertex_module, result.ty, result.binding.as_ref()))
            .unwrap_or_default();
        for argument in &fragment_entry.function.arguments {
            for location in locations(&fragment_module, argument.ty, argument.binding.as_ref()) {
                if !written.contains(&location) {
                    return Err(link_error(format!(
                        "fragment input at location {location} is never written by the vertex stage"
                    )));
                }
            }
        }

        let mut uniforms: HashMap<String, UniformInfo> = HashMap::new();
        for module in [&vertex_module, &fragment_module] {
            for (_, global) in module.global_variables.iter() {
                let (Some(name), Some(binding)) = (&global.name, &global.binding) else {
                    continue;
                };
                if binding.group != BIND_GROUP {
                    return Err(link_error(format!(
                        "uniform {name} is in group {}, only group {BIND_GROUP} is bound",
                        binding.group
                    )));
                }
                let kind = uniform_kind(&module.types[global.ty].inner)
                    .ok_or_else(|| link_error(format!("uniform {name} has an unsupported type")))?;
                let info = UniformInfo {
                    binding: binding.binding,
                    kind,
                };
                if let Some(existing) = uniforms.get(name) {
                    if *existing != info {
                        return Err(link_error(format!(
                            "uniform {name} is declared differently by the two stages"
                        )));
                    }
                    continue;
                }
                if let Some((other, _)) = uniforms.iter().find(|(_, u)| u.binding == info.binding)
                {
                    return Err(link_error(format!(
                        "uniforms {name} and {other} share binding {}",
                        info.binding
                    )));
                }
                uniforms.insert(name.clone(), info);
            }
        }

        Ok(Self {
            attributes,
            uniforms,
        })
    }
    /// Bindings of every uniform of this kind.
    pub fn bindings_of(&self, kind: UniformKind) -> impl Iterator<Item = u32> + '_ {
        self.uniforms
            .values()
            .filter(move |uniform| uniform.kind == kind)
            .map(|uniform| uniform.binding)
    }
    #[must_use]
    pub fn uniform_at(&self, binding: u32) -> Option<(&str, UniformInfo)> {
        self.uniforms
            .iter()
            .find(|(_, uniform)| uniform.binding == binding)
            .map(|(name, uniform)| (name.as_str(), *uniform))
    }
    /// Check a draw's inputs match this interface. Every attribute and every non-sampler uniform
    /// must be supplied exactly as declared. Whether the handles are alive is the device's job.
    pub fn check_draw(&self, call: &DrawCall) -> Result<(), GpuError> {
        let reject = |log: String| Err(GpuError::Draw(log));
        for attribute in &call.attributes {
            let location = attribute.location.0;
            let Some(info) = self
                .attributes
                .values()
                .find(|info| info.location == location)
            else {
                return reject(format!("no attribute at location {location}"));
            };
            if info.components != attribute.components {
                return reject(format!(
                    "attribute at location {location} takes {} components, given {}",
                    info.components, attribute.components
                ));
            }
            if let Vertices::Inline(data) = &attribute.data {
                if data.len() % usize::from(info.components) != 0 {
                    return reject(format!("ragged vertex data at location {location}"));
                }
            }
        }
        for (name, info) in &self.attributes {
            if !call
                .attributes
                .iter()
                .any(|attribute| attribute.location.0 == info.location)
            {
                return reject(format!("attribute {name} not supplied"));
            }
        }

        for uniform in &call.uniforms {
            let binding = uniform.location.0;
            let Some((name, info)) = self.uniform_at(binding) else {
                return reject(format!("no uniform at binding {binding}"));
            };
            let expected = match uniform.value {
                UniformValue::Matrix4(_) => UniformKind::Matrix4,
                UniformValue::Vec4(_) => UniformKind::Vec4,
                UniformValue::Texture(_) => UniformKind::Texture,
            };
            if info.kind != expected {
                return reject(format!(
                    "uniform {name} is a {}, given a {}",
                    info.kind.as_ref(),
                    expected.as_ref()
                ));
            }
        }
        for (name, info) in &self.uniforms {
            if info.kind != UniformKind::Sampler
                && !call
                    .uniforms
                    .iter()
                    .any(|uniform| uniform.location.0 == info.binding)
            {
                return reject(format!("uniform {name} not bound"));
            }
        }
        Ok(())
    }
}

fn compile(label: &str, stage: ShaderStage, source: &str) -> Result<Module, ShaderError> {
    let error = |log: String| ShaderError::Compile {
        label: label.to_owned(),
        stage,
        log,
    };
    let module = naga::front::wgsl::parse_str(source).map_err(|e| error(e.emit_to_string(source)))?;
    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::empty(),
    )
    .validate(&module)
    .map_err(|e| error(e.emit_to_string(source)))?;
    Ok(module)
}

fn entry_point<'a>(
    label: &str,
    stage: ShaderStage,
    module: &'a Module,
) -> Result<&'a naga::EntryPoint, ShaderError> {
    let naga_stage = match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
    };
    module
        .entry_points
        .iter()
        .find(|entry| entry.name == ENTRY_POINT && entry.stage == naga_stage)
        .ok_or_else(|| ShaderError::Compile {
            label: label.to_owned(),
            stage,
            log: format!("no {} entry point named `{ENTRY_POINT}`", stage.as_ref()),
        })
}

/// User locations carried by a value, either bound directly or as members of a struct.
fn locations(module: &Module, ty: Handle<Type>, binding: Option<&Binding>) -> Vec<u32> {
    match binding {
        Some(Binding::Location { location, .. }) => vec![*location],
        Some(Binding::BuiltIn(_)) => Vec::new(),
        None => match &module.types[ty].inner {
            TypeInner::Struct { members, .. } => members
                .iter()
                .filter_map(|member| match &member.binding {
                    Some(Binding::Location { location, .. }) => Some(*location),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        },
    }
}

fn vector_len(size: VectorSize) -> u8 {
    match size {
        VectorSize::Bi => 2,
        VectorSize::Tri => 3,
        VectorSize::Quad => 4,
    }
}

fn float_components(inner: &TypeInner) -> Option<u8> {
    match inner {
        TypeInner::Scalar(scalar) if scalar.kind == naga::ScalarKind::Float => Some(1),
        TypeInner::Vector { size, scalar } if scalar.kind == naga::ScalarKind::Float => {
            Some(vector_len(*size))
        }
        _ => None,
    }
}

fn uniform_kind(inner: &TypeInner) -> Option<UniformKind> {
    match inner {
        TypeInner::Matrix {
            columns: VectorSize::Quad,
            rows: VectorSize::Quad,
            ..
        } => Some(UniformKind::Matrix4),
        TypeInner::Vector {
            size: VectorSize::Quad,
            ..
        } => Some(UniformKind::Vec4),
        TypeInner::Image { .. } => Some(UniformKind::Texture),
        TypeInner::Sampler { .. } => Some(UniformKind::Sampler),
        _ => None,
    }
}
