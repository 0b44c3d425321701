//! Kiln: a glTF raster renderer core.
//!
//! A host loads a [`Document`], calls [`Document::initialize`] once, and then
//! drives frames through [`Renderer::new_frame`] and [`Renderer::draw_scene`].
//! Every GPU call goes through the [`GpuDevice`] trait; [`HeadlessDevice`]
//! records those calls instead of issuing them.
//!
//! - [`scene`]: transform hierarchy, partitioning, bounds
//! - [`animation`]: keyframe channels driving node transforms and weights
//! - [`resources`]: accessors, meshes, materials, textures
//! - [`renderer`]: feature compilation, shader permutations, GPU resources

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::too_many_lines)]

pub mod animation;
pub mod document;
pub mod errors;
pub mod renderer;
pub mod resources;
pub mod scene;

pub use animation::{Animation, AnimationChannel, AnimationSampler, InterpolationMode, TargetPath};
pub use document::{Document, DocumentId};
pub use errors::{KilnError, Result};
pub use renderer::{
    Environment, EnvironmentImages, FrameStats, FrameTarget, GpuDevice, HeadlessDevice,
    MaterialFeatures, RenderSettings, Renderer, ShaderCache, ToneMap,
};
pub use resources::{
    Accessor, AlphaMode, ComponentType, ElementType, Image, Material, Mesh, Primitive, Sampler,
    Semantic, ShaderDefines, Texture,
};
pub use scene::{BoundingBox, Camera, Light, Node, Scene, Transform, scene_bounds};
