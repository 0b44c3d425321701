//! Document resources: vertex data, materials, textures and images.

pub mod accessor;
pub mod material;
pub mod mesh;
pub mod shader_defines;
pub mod texture;

pub use accessor::{
    Accessor, AccessorData, AccessorReader, Buffer, BufferView, ComponentType, ElementType,
    SparseAccessor,
};
pub use material::{
    AlphaMode, Clearcoat, ExtensionKind, Material, MaterialExtension, NormalTextureInfo,
    OcclusionTextureInfo, PbrMetallicRoughness, PbrSpecularGlossiness, ShadingModel, Sheen,
    Specular, TextureInfo, TextureTransform,
};
pub use mesh::{DrawMode, MAX_MORPH_TARGETS, Mesh, Primitive, Semantic};
pub use shader_defines::ShaderDefines;
pub use texture::{Image, Sampler, Texture, TextureKind, mipmap_compatible};
