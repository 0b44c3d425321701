//! Draw orchestration
//!
//! [`Renderer`] owns every GPU-side cache (shader permutations, programs,
//! buffers, textures, offscreen targets, environment) and sequences one
//! frame:
//!
//! 1. [`Renderer::new_frame`] binds the back buffer or a pooled offscreen
//!    target, sets the viewport and clears it.
//! 2. [`Renderer::draw_scene`] updates world transforms, splits the scene
//!    into opaque and blended passes when needed, and draws every renderable
//!    primitive with the program selected from its vertex and material
//!    features.
//!
//! The GPU is never reached through global state: every operation takes the
//! [`GpuDevice`] explicitly.

pub mod device;
pub mod environment;
pub mod features;
pub mod headless;
pub mod lights;
pub mod pipeline;
pub mod resource_manager;
pub mod settings;
pub mod targets;

use std::collections::BTreeMap;
use std::rc::Rc;

use glam::{Mat4, Vec3};
use log::{debug, warn};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::document::{Document, DocumentId};
use crate::errors::{KilnError, Result};
use crate::resources::{AlphaMode, DrawMode, MAX_MORPH_TARGETS, Semantic, ShaderDefines};
use crate::scene::{Camera, Scene, depth_sort, partition};

pub use device::{ClearFlags, GpuDevice};
pub use environment::{Environment, EnvironmentImages, SheenImages};
pub use features::{MaterialFeatures, TextureBinding, primitive_defines};
pub use headless::HeadlessDevice;
pub use pipeline::{ShaderCache, ShaderProgram, UniformValue};
pub use resource_manager::ResourceManager;
pub use settings::{RenderSettings, ToneMap};
pub use targets::{FrameTarget, RenderTargetPool};

/// Source identifier of the vertex stage.
pub const VERTEX_SHADER: &str = "primitive.vert";
/// Source identifier of the fragment stage.
pub const FRAGMENT_SHADER: &str = "pbr.frag";

/// Counters for the current frame, reset by [`Renderer::new_frame`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub draw_calls: u32,
    /// Primitives not drawn: not renderable, or no program could be built.
    pub skipped: u32,
    /// Draw calls issued with blending enabled.
    pub blended: u32,
    /// 1 for a single pass, 2 when the scene had blended primitives.
    pub passes: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    All,
    Opaque,
    Blend,
}

impl Pass {
    fn accepts(self, mode: AlphaMode) -> bool {
        match self {
            Self::All => true,
            Self::Opaque => mode != AlphaMode::Blend,
            Self::Blend => mode == AlphaMode::Blend,
        }
    }
}

/// Per-draw-scene values shared by every primitive.
struct FrameState {
    view_projection: Mat4,
    camera_position: Vec3,
    lights: Option<UniformValue>,
    environment: Option<Environment>,
    defines: ShaderDefines,
}

/// What a primitive draw needs, copied out of the document so textures can
/// be uploaded through a mutable borrow.
struct DrawItem {
    attributes: BTreeMap<Semantic, usize>,
    targets: Vec<BTreeMap<Semantic, usize>>,
    indices: Option<usize>,
    mode: DrawMode,
    vertex_count: u32,
    alpha_mode: AlphaMode,
    double_sided: bool,
    model: Mat4,
    normal: Mat4,
    joints: Option<(Vec<Mat4>, Vec<Mat4>)>,
    weights: Option<Vec<f32>>,
    vertex_defines: ShaderDefines,
    fragment_defines: ShaderDefines,
    features: Rc<MaterialFeatures>,
}

pub struct Renderer {
    settings: RenderSettings,
    shaders: ShaderCache,
    resources: ResourceManager,
    targets: RenderTargetPool,
    environment: Option<Environment>,
    materials: FxHashMap<(DocumentId, Option<usize>), Rc<MaterialFeatures>>,
    warned: FxHashSet<String>,
    stats: FrameStats,
}

impl Renderer {
    /// Creates a renderer with the built-in shader sources.
    ///
    /// # Errors
    /// Fails if the embedded sources have an include cycle or an unknown include.
    pub fn new(settings: RenderSettings) -> Result<Self> {
        let [width, height] = settings.offscreen_size;
        Ok(Self {
            targets: RenderTargetPool::new(settings.offscreen_pool_size, width, height),
            settings,
            shaders: ShaderCache::with_builtin_sources()?,
            resources: ResourceManager::new(),
            environment: None,
            materials: FxHashMap::default(),
            warned: FxHashSet::default(),
            stats: FrameStats::default(),
        })
    }

    #[must_use]
    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// Replaces the settings. The offscreen pool is rebuilt when its shape changes.
    pub fn set_settings(&mut self, device: &mut impl GpuDevice, settings: RenderSettings) {
        if settings.offscreen_size != self.settings.offscreen_size
            || settings.offscreen_pool_size != self.settings.offscreen_pool_size
        {
            self.targets.destroy(device);
            let [width, height] = settings.offscreen_size;
            self.targets = RenderTargetPool::new(settings.offscreen_pool_size, width, height);
        }
        self.settings = settings;
    }

    #[must_use]
    pub fn shader_cache(&self) -> &ShaderCache {
        &self.shaders
    }

    /// Gives hosts access to register their own shader sources.
    pub fn shader_cache_mut(&mut self) -> &mut ShaderCache {
        &mut self.shaders
    }

    #[must_use]
    pub fn resources(&self) -> &ResourceManager {
        &self.resources
    }

    #[must_use]
    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    #[must_use]
    pub fn environment(&self) -> Option<&Environment> {
        self.environment.as_ref()
    }

    /// Uploads and installs the image-based lighting environment, releasing
    /// the previous one.
    pub fn set_environment(&mut self, device: &mut impl GpuDevice, images: EnvironmentImages) -> Result<()> {
        let environment = Environment::upload(device, images)?;
        if let Some(old) = self.environment.replace(environment) {
            old.destroy(device);
        }
        Ok(())
    }

    // ========================================================================
    // Frame
    // ========================================================================

    /// Binds `target`, sets the viewport to its size and clears color and depth.
    ///
    /// # Errors
    /// [`KilnError::RenderTargetOutOfRange`] for an offscreen index outside the pool.
    pub fn new_frame(&mut self, device: &mut impl GpuDevice, target: FrameTarget) -> Result<()> {
        let (width, height) = match target {
            FrameTarget::BackBuffer => {
                device.bind_render_target(None);
                device.back_buffer_size()
            }
            FrameTarget::Offscreen(index) => {
                let id = self.targets.acquire(device, index)?;
                device.bind_render_target(Some(id));
                self.targets.size()
            }
        };

        device.set_viewport(0, 0, width, height);
        device.clear(ClearFlags::COLOR | ClearFlags::DEPTH, self.settings.clear_color);
        device.set_depth_test(true);
        self.stats = FrameStats::default();
        Ok(())
    }

    /// Draws scene `scene_index` of `document` as seen from `camera`.
    ///
    /// The camera's view-projection must be current. World transforms are
    /// recomputed before drawing. When any primitive is alpha-blended the
    /// non-blended nodes are drawn first, then the blended ones back to
    /// front; otherwise the scene is drawn once in traversal order.
    pub fn draw_scene(
        &mut self,
        device: &mut impl GpuDevice,
        document: &mut Document,
        scene_index: usize,
        camera: &Camera,
    ) -> Result<()> {
        document.initialize()?;
        document.update_world_transforms(scene_index)?;
        let scene = document
            .scenes
            .get(scene_index)
            .cloned()
            .ok_or_else(|| KilnError::out_of_bounds("scene", scene_index))?;

        let frame = self.prepare_frame(document, &scene, camera);

        let blended = partition(document, &scene, AlphaMode::Blend, false);
        if blended.nodes.is_empty() {
            self.stats.passes += 1;
            for node in scene.gather_nodes(&document.nodes) {
                self.draw_node(device, document, node, Pass::All, &frame);
            }
        } else {
            self.stats.passes += 2;
            let opaque = partition(document, &scene, AlphaMode::Blend, true);
            for node in opaque.nodes {
                self.draw_node(device, document, node, Pass::Opaque, &frame);
            }

            let mut order = blended.nodes;
            depth_sort(&mut order, &document.nodes, &frame.view_projection);
            for node in order {
                self.draw_node(device, document, node, Pass::Blend, &frame);
            }
        }

        device.set_blend_state(None);
        Ok(())
    }

    fn prepare_frame(&self, document: &Document, scene: &Scene, camera: &Camera) -> FrameState {
        let mut defines = ShaderDefines::new();
        let environment = self.environment.filter(|_| self.settings.use_ibl);
        self.settings.apply_to_defines(&mut defines, environment.is_some());
        if environment.is_some_and(|env| env.sheen.is_some()) {
            defines.enable("HAS_SHEEN_ENVIRONMENT");
        }

        let lights = self.settings.use_punctual.then(|| {
            let placed = lights::scene_lights(document, scene);
            let values: Vec<UniformValue> = if placed.is_empty() {
                lights::default_lights().into()
            } else {
                placed.iter().map(lights::placed_light_uniform).collect()
            };
            defines.set("LIGHT_COUNT", values.len());
            UniformValue::Array(values)
        });

        FrameState {
            view_projection: *camera.view_projection_matrix(),
            camera_position: camera.position(),
            lights,
            environment,
            defines,
        }
    }

    fn draw_node(
        &mut self,
        device: &mut impl GpuDevice,
        document: &mut Document,
        node: usize,
        pass: Pass,
        frame: &FrameState,
    ) {
        let Some(mesh) = document.nodes.get(node).and_then(|n| n.mesh) else {
            return;
        };
        let Some(count) = document.meshes.get(mesh).map(|m| m.primitives.len()) else {
            return;
        };
        for primitive in 0..count {
            let Some(item) = self.prepare_item(document, node, mesh, primitive, pass, frame) else {
                continue;
            };
            self.draw_item(device, document, &item, frame);
        }
    }

    /// Gathers everything needed to draw one primitive. `None` when the
    /// primitive belongs to another pass or cannot be drawn.
    fn prepare_item(
        &mut self,
        document: &Document,
        node_index: usize,
        mesh_index: usize,
        primitive_index: usize,
        pass: Pass,
        frame: &FrameState,
    ) -> Option<DrawItem> {
        let node = document.nodes.get(node_index)?;
        let mesh = document.meshes.get(mesh_index)?;
        let primitive = mesh.primitives.get(primitive_index)?;
        let material = document.material_for(primitive);

        if !pass.accepts(material.alpha_mode) {
            return None;
        }
        if !primitive.is_renderable() {
            self.stats.skipped += 1;
            return None;
        }

        let features = Rc::clone(
            self.materials
                .entry((document.id(), primitive.material))
                .or_insert_with(|| Rc::new(MaterialFeatures::compile(material))),
        );

        let mut vertex_defines = primitive.defines().clone();

        let skinned = primitive.attributes.contains_key(&Semantic::Joints(0))
            && primitive.attributes.contains_key(&Semantic::Weights(0));
        let joints = match node.skin.filter(|_| skinned) {
            Some(skin_index) => match document.skins.get(skin_index).map(|skin| {
                skin.compute_joint_matrices(&document.nodes, document.reader(), node.inverse_world_matrix())
            }) {
                Some(Ok(matrices)) => Some((matrices.joints, matrices.normals)),
                Some(Err(err)) => {
                    if self.warned.insert(format!("skin:{skin_index}")) {
                        warn!("Skin {skin_index} cannot be evaluated: {err}");
                    }
                    None
                }
                None => None,
            },
            None => None,
        };
        if let Some((matrices, _)) = &joints {
            vertex_defines.enable("USE_SKINNING");
            vertex_defines.set("JOINT_COUNT", matrices.len().max(1));
        }

        let target_count = primitive.targets.len().min(MAX_MORPH_TARGETS);
        let weights = (target_count > 0).then(|| {
            let source = node.weights.as_deref().unwrap_or(&mesh.weights);
            let mut weights = source.to_vec();
            weights.resize(target_count, 0.0);
            weights
        });

        let mut fragment_defines = primitive.defines().clone();
        fragment_defines.merge(&features.defines);
        fragment_defines.merge(&frame.defines);

        let vertex_count = primitive
            .attribute(&Semantic::Position)
            .and_then(|p| document.accessors.get(p))
            .map_or(0, |a| a.count as u32);

        Some(DrawItem {
            attributes: primitive.attributes.clone(),
            targets: primitive.targets.iter().take(target_count).cloned().collect(),
            indices: primitive.indices,
            mode: primitive.mode,
            vertex_count,
            alpha_mode: material.alpha_mode,
            double_sided: material.double_sided,
            model: *node.world_matrix(),
            normal: *node.normal_matrix(),
            joints,
            weights,
            vertex_defines,
            fragment_defines,
            features,
        })
    }

    fn draw_item(
        &mut self,
        device: &mut impl GpuDevice,
        document: &mut Document,
        item: &DrawItem,
        frame: &FrameState,
    ) {
        let vertex_lines: Vec<String> = item.vertex_defines.lines().collect();
        let fragment_lines: Vec<String> = item.fragment_defines.lines().collect();

        let Some(vertex_hash) = self.shaders.select_shader(device, VERTEX_SHADER, &vertex_lines) else {
            self.stats.skipped += 1;
            return;
        };
        let Some(fragment_hash) = self.shaders.select_shader(device, FRAGMENT_SHADER, &fragment_lines) else {
            self.stats.skipped += 1;
            return;
        };
        let Some(program) = self.shaders.get_program(device, vertex_hash, fragment_hash) else {
            self.stats.skipped += 1;
            return;
        };

        device.use_program(program.id());

        // === Uniforms ===
        program.update_uniform(device, "u_ViewProjectionMatrix", &frame.view_projection.into());
        program.update_uniform(device, "u_ModelMatrix", &item.model.into());
        program.update_uniform(device, "u_NormalMatrix", &item.normal.into());
        program.update_uniform(device, "u_Camera", &frame.camera_position.into());
        program.update_uniform(device, "u_Exposure", &self.settings.exposure.into());
        program.update_uniform(device, "u_Gamma", &self.settings.gamma.into());
        if let Some(lights) = &frame.lights {
            program.update_uniform(device, "u_Lights", lights);
        }
        if let Some(environment) = &frame.environment {
            program.update_uniform(device, "u_EnvIntensity", &self.settings.environment_intensity.into());
            program.update_uniform(device, "u_MipCount", &(environment.mip_count as i32).into());
        }
        for (name, value) in &item.features.properties {
            program.update_uniform(device, name, value);
        }
        if let Some((joints, normals)) = &item.joints {
            program.update_uniform(device, "u_jointMatrix", &joints.as_slice().into());
            program.update_uniform(device, "u_jointNormalMatrix", &normals.as_slice().into());
        }
        if let Some(weights) = &item.weights {
            program.update_uniform(device, "u_morphWeights", &UniformValue::FloatArray(weights.clone()));
        }

        // === Fixed-function state ===
        device.set_cull_mode((!item.double_sided).then_some(wgpu::Face::Back));
        device.set_blend_state((item.alpha_mode == AlphaMode::Blend).then_some(BLEND_STATE));

        // === Vertex streams ===
        let mut enabled: SmallVec<[u32; 16]> = SmallVec::new();
        for (semantic, &accessor) in &item.attributes {
            let Some(location) = program.attribute_location(&semantic.attribute_name()) else {
                continue;
            };
            let Some(stream) = self.resources.vertex_buffer(device, document, accessor) else {
                continue;
            };
            device.enable_vertex_attribute(location, stream.buffer, &stream.layout);
            enabled.push(location);
        }
        for (target_index, target) in item.targets.iter().enumerate() {
            for (semantic, &accessor) in target {
                let Some(name) = semantic.target_attribute_name(target_index) else {
                    continue;
                };
                let Some(location) = program.attribute_location(&name) else {
                    continue;
                };
                let Some(stream) = self.resources.vertex_buffer(device, document, accessor) else {
                    continue;
                };
                device.enable_vertex_attribute(location, stream.buffer, &stream.layout);
                enabled.push(location);
            }
        }

        let indices = match item.indices {
            Some(accessor) => match self.resources.index_buffer(device, document, accessor) {
                Some(indices) => {
                    device.bind_index_buffer(indices.buffer);
                    Some(indices)
                }
                None => {
                    for location in enabled {
                        device.disable_vertex_attribute(location);
                    }
                    self.stats.skipped += 1;
                    return;
                }
            },
            None => None,
        };

        // === Textures: material first, then environment ===
        let mut unit = 0u32;
        for binding in &item.features.textures {
            let Some(texture) = self.resources.texture(device, document, binding.texture) else {
                continue;
            };
            if program.uniform_location(&binding.sampler).is_none() {
                continue;
            }
            device.bind_texture(unit, texture);
            program.update_uniform(device, &binding.sampler, &UniformValue::Int(unit as i32));
            unit += 1;
        }
        if let Some(environment) = &frame.environment {
            let mut environment_textures: SmallVec<[(&str, _); 5]> = SmallVec::new();
            environment_textures.push(("u_LambertianEnvSampler", environment.diffuse));
            environment_textures.push(("u_GGXEnvSampler", environment.specular));
            environment_textures.push(("u_GGXLUT", environment.brdf_lut));
            if let Some((cube, lut)) = environment.sheen {
                environment_textures.push(("u_CharlieEnvSampler", cube));
                environment_textures.push(("u_CharlieLUT", lut));
            }
            for (sampler, texture) in environment_textures {
                if !program.has_uniform(sampler) {
                    continue;
                }
                device.bind_texture(unit, texture);
                program.update_uniform(device, sampler, &UniformValue::Int(unit as i32));
                unit += 1;
            }
        }

        // === Draw ===
        match indices {
            Some(indices) => device.draw_elements(item.mode, indices.count, indices.format),
            None => device.draw_arrays(item.mode, 0, item.vertex_count),
        }
        for location in enabled {
            device.disable_vertex_attribute(location);
        }

        self.stats.draw_calls += 1;
        if item.alpha_mode == AlphaMode::Blend {
            self.stats.blended += 1;
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Releases every buffer and texture created for `document`.
    pub fn unload(&mut self, device: &mut impl GpuDevice, document: &Document) {
        let id = document.id();
        self.resources.unload(device, id);
        self.materials.retain(|&(doc, _), _| doc != id);
        debug!("Renderer released document {id:?}");
    }

    /// Releases everything: document resources, shaders, programs, offscreen
    /// targets and the environment.
    pub fn destroy(&mut self, device: &mut impl GpuDevice) {
        self.resources.destroy(device);
        self.shaders.destroy(device);
        self.targets.destroy(device);
        if let Some(environment) = self.environment.take() {
            environment.destroy(device);
        }
        self.materials.clear();
        self.warned.clear();
    }
}

/// Straight alpha, additive, with separate color and alpha factors.
const BLEND_STATE: wgpu::BlendState = wgpu::BlendState {
    color: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::SrcAlpha,
        dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
        operation: wgpu::BlendOperation::Add,
    },
    alpha: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
        operation: wgpu::BlendOperation::Add,
    },
};
