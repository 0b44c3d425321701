//! GPU device abstraction
//!
//! The renderer never talks to a graphics API directly. Every operation
//! receives a `&mut impl GpuDevice`: a GL-shaped capability surface
//! (buffers, textures, shaders, programs, reflection, uniform upload,
//! vertex attributes, fixed-function state, render targets, draw calls).
//!
//! Object handles are `slotmap` keys minted by the device. Pipeline state
//! reuses the `wgpu` vocabulary (blend state, cull face, index format,
//! texture format, sampler filters) so backends do not have to invent
//! their own enums.

use bitflags::bitflags;
use slotmap::new_key_type;

use crate::errors::Result;
use crate::resources::{ComponentType, DrawMode, Sampler, TextureKind};

new_key_type! {
    pub struct BufferId;
    pub struct TextureId;
    pub struct ShaderId;
    pub struct ProgramId;
    pub struct RenderTargetId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    /// Stage implied by a source name's extension (`.vert` / `.frag`).
    #[must_use]
    pub fn from_source_name(name: &str) -> Option<Self> {
        if name.ends_with(".vert") {
            Some(Self::Vertex)
        } else if name.ends_with(".frag") {
            Some(Self::Fragment)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    Vertex,
    Index,
}

/// Declared GLSL type of a uniform or vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlslType {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Int,
    IVec2,
    IVec3,
    IVec4,
    Bool,
    Mat2,
    Mat3,
    Mat4,
    Sampler2D,
    SamplerCube,
}

impl GlslType {
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "float" => Self::Float,
            "vec2" => Self::Vec2,
            "vec3" => Self::Vec3,
            "vec4" => Self::Vec4,
            "int" => Self::Int,
            "ivec2" => Self::IVec2,
            "ivec3" => Self::IVec3,
            "ivec4" => Self::IVec4,
            "bool" => Self::Bool,
            "mat2" => Self::Mat2,
            "mat3" => Self::Mat3,
            "mat4" => Self::Mat4,
            "sampler2D" => Self::Sampler2D,
            "samplerCube" => Self::SamplerCube,
            _ => return None,
        })
    }

    /// Scalar components per element.
    #[must_use]
    pub fn components(self) -> usize {
        match self {
            Self::Float | Self::Int | Self::Bool | Self::Sampler2D | Self::SamplerCube => 1,
            Self::Vec2 | Self::IVec2 => 2,
            Self::Vec3 | Self::IVec3 => 3,
            Self::Vec4 | Self::IVec4 | Self::Mat2 => 4,
            Self::Mat3 => 9,
            Self::Mat4 => 16,
        }
    }

    /// Whether values of this type are uploaded as integers.
    #[must_use]
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Self::Int
                | Self::IVec2
                | Self::IVec3
                | Self::IVec4
                | Self::Bool
                | Self::Sampler2D
                | Self::SamplerCube
        )
    }

    #[must_use]
    pub fn is_sampler(self) -> bool {
        matches!(self, Self::Sampler2D | Self::SamplerCube)
    }
}

/// One reflected active uniform or attribute, as a GL driver reports it:
/// arrays of basic types appear once as `name[0]` with `size` elements,
/// struct members appear individually as `name.member` / `name[i].member`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveVariable {
    pub name: String,
    pub ty: GlslType,
    pub location: u32,
    pub size: usize,
}

/// Raw uniform payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformData<'a> {
    Floats(&'a [f32]),
    Ints(&'a [i32]),
}

/// How one vertex attribute reads from its buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttributeLayout {
    pub components: u8,
    pub component_type: ComponentType,
    pub normalized: bool,
    pub stride: usize,
    pub offset: usize,
}

/// Pixel data for one texture face.
#[derive(Debug, Clone, Copy)]
pub struct ImageData<'a> {
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    pub pixels: &'a [u8],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureDescriptor {
    pub kind: TextureKind,
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    pub generate_mipmaps: bool,
    pub sampler: Sampler,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearFlags: u8 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

/// The capability surface the renderer drives.
///
/// Creation calls return errors for device-side failures. Shader
/// compilation and program linking report the driver's info log through
/// [`KilnError::ShaderCompile`](crate::errors::KilnError::ShaderCompile) /
/// [`KilnError::ProgramLink`](crate::errors::KilnError::ProgramLink).
pub trait GpuDevice {
    // === Buffers ===
    fn create_buffer(&mut self, target: BufferTarget, data: &[u8]) -> Result<BufferId>;
    fn delete_buffer(&mut self, buffer: BufferId);

    // === Textures ===
    /// `faces` holds one image for 2D textures and six for cube maps.
    fn create_texture(&mut self, desc: &TextureDescriptor, faces: &[ImageData<'_>]) -> Result<TextureId>;
    fn delete_texture(&mut self, texture: TextureId);
    fn bind_texture(&mut self, unit: u32, texture: TextureId);

    // === Shaders & programs ===
    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderId>;
    fn delete_shader(&mut self, shader: ShaderId);
    fn link_program(&mut self, vertex: ShaderId, fragment: ShaderId) -> Result<ProgramId>;
    fn delete_program(&mut self, program: ProgramId);
    fn use_program(&mut self, program: ProgramId);
    fn active_uniforms(&self, program: ProgramId) -> Vec<ActiveVariable>;
    fn active_attributes(&self, program: ProgramId) -> Vec<ActiveVariable>;
    /// Uploads to the currently used program.
    fn upload_uniform(&mut self, location: u32, ty: GlslType, data: UniformData<'_>);

    // === Vertex input ===
    fn enable_vertex_attribute(&mut self, location: u32, buffer: BufferId, layout: &VertexAttributeLayout);
    fn disable_vertex_attribute(&mut self, location: u32);
    fn bind_index_buffer(&mut self, buffer: BufferId);

    // === Fixed-function state ===
    fn set_viewport(&mut self, x: i32, y: i32, width: u32, height: u32);
    fn clear(&mut self, flags: ClearFlags, color: [f32; 4]);
    fn set_depth_test(&mut self, enabled: bool);
    /// `None` disables culling.
    fn set_cull_mode(&mut self, face: Option<wgpu::Face>);
    /// `None` disables blending.
    fn set_blend_state(&mut self, blend: Option<wgpu::BlendState>);

    // === Render targets ===
    fn create_render_target(&mut self, width: u32, height: u32) -> Result<RenderTargetId>;
    fn delete_render_target(&mut self, target: RenderTargetId);
    /// `None` binds the back buffer.
    fn bind_render_target(&mut self, target: Option<RenderTargetId>);
    fn back_buffer_size(&self) -> (u32, u32);

    // === Draw calls ===
    fn draw_arrays(&mut self, mode: DrawMode, first: u32, count: u32);
    fn draw_elements(&mut self, mode: DrawMode, count: u32, format: wgpu::IndexFormat);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_from_extension() {
        assert_eq!(ShaderStage::from_source_name("primitive.vert"), Some(ShaderStage::Vertex));
        assert_eq!(ShaderStage::from_source_name("pbr.frag"), Some(ShaderStage::Fragment));
        assert_eq!(ShaderStage::from_source_name("functions.glsl"), None);
    }

    #[test]
    fn samplers_upload_as_integers() {
        assert!(GlslType::SamplerCube.is_integer());
        assert!(!GlslType::Mat3.is_integer());
        assert_eq!(GlslType::Mat3.components(), 9);
    }
}
