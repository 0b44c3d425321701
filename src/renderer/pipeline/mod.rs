//! Shader pipeline
//!
//! - `shader_cache`: source table, permutation keys, lazy compile and link
//! - `binding`: reflected program interface and typed uniform upload
//! - `uniforms`: the [`UniformValue`] tree

pub mod binding;
pub mod shader_cache;
pub mod uniforms;

pub use binding::ShaderProgram;
pub use shader_cache::{
    ShaderCache, VERSION_PREAMBLE, builtin_sources, permutation_hash, program_hash, string_hash,
};
pub use uniforms::UniformValue;
