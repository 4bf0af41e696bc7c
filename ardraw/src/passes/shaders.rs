//! WGSL sources for every pass. Each stage's entry point is `main`, and every resource lives in
//! bind group 0.
//!
//! Projection matrices follow the GL convention of a `-1..1` clip depth, so world-space vertex
//! stages fold it into the `0..1` range the device clips against.

pub mod background {
    pub const VERTEX: &str = r"
struct Varyings {
    @builtin(position) position: vec4<f32>,
    @location(0) tex_coord: vec2<f32>,
}

@vertex
fn main(@location(0) a_Position: vec2<f32>, @location(1) a_TexCoord: vec2<f32>) -> Varyings {
    var varyings: Varyings;
    varyings.position = vec4<f32>(a_Position, 0.0, 1.0);
    varyings.tex_coord = a_TexCoord;
    return varyings;
}
";
    pub const FRAGMENT: &str = r"
@group(0) @binding(0) var u_Texture: texture_2d<f32>;
@group(0) @binding(1) var u_Sampler: sampler;

@fragment
fn main(@location(0) tex_coord: vec2<f32>) -> @location(0) vec4<f32> {
    return textureSample(u_Texture, u_Sampler, tex_coord);
}
";
}

/// Shared by every textured quad placed in the world.
pub mod textured {
    pub const VERTEX: &str = r"
@group(0) @binding(0) var<uniform> u_Mvp: mat4x4<f32>;

struct Varyings {
    @builtin(position) position: vec4<f32>,
    @location(0) tex_coord: vec2<f32>,
}

@vertex
fn main(@location(0) a_Position: vec3<f32>, @location(1) a_TexCoord: vec2<f32>) -> Varyings {
    let clip = u_Mvp * vec4<f32>(a_Position, 1.0);
    var varyings: Varyings;
    varyings.position = vec4<f32>(clip.xy, (clip.z + clip.w) * 0.5, clip.w);
    varyings.tex_coord = a_TexCoord;
    return varyings;
}
";
    /// `u_Tint` multiplies the texel, straight alpha.
    pub const FRAGMENT: &str = r"
@group(0) @binding(1) var u_Texture: texture_2d<f32>;
@group(0) @binding(2) var u_Sampler: sampler;
@group(0) @binding(3) var<uniform> u_Tint: vec4<f32>;

@fragment
fn main(@location(0) tex_coord: vec2<f32>) -> @location(0) vec4<f32> {
    return textureSample(u_Texture, u_Sampler, tex_coord) * u_Tint;
}
";
}

/// Flat colored geometry: wireframes and strokes.
pub mod solid {
    pub const VERTEX: &str = r"
@group(0) @binding(0) var<uniform> u_Mvp: mat4x4<f32>;

@vertex
fn main(@location(0) a_Position: vec3<f32>) -> @builtin(position) vec4<f32> {
    let clip = u_Mvp * vec4<f32>(a_Position, 1.0);
    return vec4<f32>(clip.xy, (clip.z + clip.w) * 0.5, clip.w);
}
";
    pub const FRAGMENT: &str = r"
@group(0) @binding(1) var<uniform> u_Color: vec4<f32>;

@fragment
fn main() -> @location(0) vec4<f32> {
    return u_Color;
}
";
}

#[cfg(test)]
mod test {
    use crate::gpu::reflect::{ProgramInterface, UniformKind};

    fn sorted<'a>(names: impl Iterator<Item = &'a String>) -> Vec<&'a str> {
        let mut names: Vec<_> = names.map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    #[test]
    fn every_program_links() {
        let background = ProgramInterface::reflect(
            "background",
            super::background::VERTEX,
            super::background::FRAGMENT,
        )
        .unwrap();
        assert_eq!(
            sorted(background.attributes.keys()),
            ["a_Position", "a_TexCoord"]
        );
        assert_eq!(background.attributes["a_Position"].components, 2);
        assert_eq!(sorted(background.uniforms.keys()), ["u_Sampler", "u_Texture"]);

        let textured =
            ProgramInterface::reflect("textured", super::textured::VERTEX, super::textured::FRAGMENT)
                .unwrap();
        assert_eq!(textured.attributes["a_Position"].components, 3);
        assert_eq!(textured.attributes["a_TexCoord"].components, 2);
        assert_eq!(
            sorted(textured.uniforms.keys()),
            ["u_Mvp", "u_Sampler", "u_Texture", "u_Tint"]
        );
        assert_eq!(textured.uniforms["u_Tint"].kind, UniformKind::Vec4);

        let solid =
            ProgramInterface::reflect("solid", super::solid::VERTEX, super::solid::FRAGMENT)
                .unwrap();
        assert_eq!(sorted(solid.attributes.keys()), ["a_Position"]);
        assert_eq!(solid.uniforms["u_Mvp"].kind, UniformKind::Matrix4);
        assert_eq!(solid.uniforms["u_Color"].kind, UniformKind::Vec4);
    }
}
