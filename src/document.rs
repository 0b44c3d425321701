//! The in-memory glTF document.
//!
//! A [`Document`] is the flat, index-cross-referenced graph an external
//! loader produces: buffers, accessors, meshes, materials, textures, nodes,
//! scenes and animations, each in its own table. The renderer never parses
//! files; it only consumes this structure.
//!
//! After filling the tables the loader calls [`Document::initialize`] once.
//! That validates the structure, decomposes explicit node matrices, derives
//! per-primitive data (renderable flag, vertex defines, centroid) and
//! synthesizes the default material.

use std::sync::atomic::{AtomicU64, Ordering};

use bytemuck::NoUninit;
use glam::{Mat4, Vec3};
use log::debug;

use crate::animation::Animation;
use crate::errors::{KilnError, Result};
use crate::renderer::features::primitive_defines;
use crate::resources::{
    Accessor, AccessorReader, Buffer, BufferView, ComponentType, ElementType, Image, Material, Mesh,
    Primitive, Sampler, Semantic, Texture,
};
use crate::scene::{Camera, Light, Node, Scene, Skin, compute_world_transforms};

static NEXT_DOCUMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique document identity. GPU resources are keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(u64);

impl DocumentId {
    fn next() -> Self {
        Self(NEXT_DOCUMENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug)]
pub struct Document {
    id: DocumentId,

    pub buffers: Vec<Buffer>,
    pub buffer_views: Vec<BufferView>,
    pub accessors: Vec<Accessor>,
    pub meshes: Vec<Mesh>,
    pub materials: Vec<Material>,
    pub textures: Vec<Texture>,
    pub samplers: Vec<Sampler>,
    pub images: Vec<Image>,
    pub nodes: Vec<Node>,
    pub scenes: Vec<Scene>,
    /// Default scene.
    pub scene: Option<usize>,
    pub cameras: Vec<Camera>,
    pub lights: Vec<Light>,
    pub skins: Vec<Skin>,
    pub animations: Vec<Animation>,
    pub extensions_used: Vec<String>,

    default_material: Material,
    initialized: bool,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: DocumentId::next(),
            buffers: Vec::new(),
            buffer_views: Vec::new(),
            accessors: Vec::new(),
            meshes: Vec::new(),
            materials: Vec::new(),
            textures: Vec::new(),
            samplers: Vec::new(),
            images: Vec::new(),
            nodes: Vec::new(),
            scenes: Vec::new(),
            scene: None,
            cameras: Vec::new(),
            lights: Vec::new(),
            skins: Vec::new(),
            animations: Vec::new(),
            extensions_used: Vec::new(),
            default_material: Material::fallback(),
            initialized: false,
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> DocumentId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// The opaque white metallic-roughness material used by primitives
    /// without a material.
    #[inline]
    #[must_use]
    pub fn default_material(&self) -> &Material {
        &self.default_material
    }

    /// The primitive's material, or the default one.
    #[must_use]
    pub fn material_for(&self, primitive: &Primitive) -> &Material {
        primitive
            .material
            .and_then(|m| self.materials.get(m))
            .unwrap_or(&self.default_material)
    }

    #[inline]
    #[must_use]
    pub fn reader(&self) -> AccessorReader<'_> {
        AccessorReader::new(&self.accessors, &self.buffer_views, &self.buffers)
    }

    /// `scene_index`, or the default scene, or the first one.
    pub fn resolve_scene(&self, scene_index: Option<usize>) -> Result<&Scene> {
        let index = scene_index.or(self.scene).unwrap_or(0);
        self.scenes
            .get(index)
            .ok_or_else(|| KilnError::out_of_bounds("scene", index))
    }

    // ========================================================================
    // Initialization
    // ========================================================================

    /// Validates the document and derives everything the renderer needs.
    ///
    /// Calling it again is a no-op.
    ///
    /// # Errors
    /// - [`KilnError::NoScenes`] when there is no scene
    /// - [`KilnError::IndexOutOfBounds`] for any dangling cross-reference
    /// - [`KilnError::NodeCycle`] when the node graph is not a forest
    pub fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }

        self.validate()?;

        for node in &mut self.nodes {
            node.decompose_matrix();
        }

        let reader = AccessorReader::new(&self.accessors, &self.buffer_views, &self.buffers);
        for mesh in &mut self.meshes {
            for primitive in &mut mesh.primitives {
                primitive.renderable = primitive.attributes.contains_key(&Semantic::Position);
                primitive.defines = primitive_defines(primitive, &self.accessors);
                primitive.centroid = primitive
                    .attribute(&Semantic::Position)
                    .and_then(|position| reader.floats(position).ok())
                    .and_then(centroid);
            }
        }

        self.default_material = Material::fallback();
        self.initialized = true;

        debug!(
            "Document {:?} initialized: {} nodes, {} meshes, {} materials",
            self.id,
            self.nodes.len(),
            self.meshes.len(),
            self.materials.len()
        );
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.scenes.is_empty() {
            return Err(KilnError::NoScenes);
        }

        let check = |context: &str, index: usize, len: usize| -> Result<()> {
            if index < len {
                Ok(())
            } else {
                Err(KilnError::out_of_bounds(context, index))
            }
        };

        if let Some(scene) = self.scene {
            check("default scene", scene, self.scenes.len())?;
        }
        for scene in &self.scenes {
            for &node in &scene.nodes {
                check("scene root node", node, self.nodes.len())?;
            }
        }

        for node in &self.nodes {
            for &child in &node.children {
                check("node child", child, self.nodes.len())?;
            }
            if let Some(mesh) = node.mesh {
                check("node mesh", mesh, self.meshes.len())?;
            }
            if let Some(camera) = node.camera {
                check("node camera", camera, self.cameras.len())?;
            }
            if let Some(light) = node.light {
                check("node light", light, self.lights.len())?;
            }
            if let Some(skin) = node.skin {
                check("node skin", skin, self.skins.len())?;
            }
        }

        for view in &self.buffer_views {
            check("buffer view buffer", view.buffer, self.buffers.len())?;
        }
        for accessor in &self.accessors {
            if let Some(view) = accessor.buffer_view {
                check("accessor buffer view", view, self.buffer_views.len())?;
            }
        }

        for mesh in &self.meshes {
            for primitive in &mesh.primitives {
                let streams = primitive
                    .attributes
                    .values()
                    .chain(primitive.targets.iter().flat_map(|t| t.values()))
                    .chain(primitive.indices.iter());
                for &accessor in streams {
                    check("primitive accessor", accessor, self.accessors.len())?;
                }
                if let Some(material) = primitive.material {
                    check("primitive material", material, self.materials.len())?;
                }
            }
        }

        for material in &self.materials {
            for info in material.texture_references() {
                check("material texture", info.index, self.textures.len())?;
            }
        }
        for texture in &self.textures {
            for &source in &texture.sources {
                check("texture source", source, self.images.len())?;
            }
            if let Some(sampler) = texture.sampler {
                check("texture sampler", sampler, self.samplers.len())?;
            }
        }

        for skin in &self.skins {
            for &joint in &skin.joints {
                check("skin joint", joint, self.nodes.len())?;
            }
            if let Some(ibm) = skin.inverse_bind_matrices {
                check("skin inverse bind matrices", ibm, self.accessors.len())?;
            }
        }

        for animation in &self.animations {
            for sampler in &animation.samplers {
                check("animation input", sampler.input, self.accessors.len())?;
                check("animation output", sampler.output, self.accessors.len())?;
            }
            for channel in &animation.channels {
                check("animation sampler", channel.sampler, animation.samplers.len())?;
                if let Some(node) = channel.target.node {
                    check("animation target node", node, self.nodes.len())?;
                }
            }
        }

        self.check_acyclic()
    }

    /// Iterative three-color DFS over the child links.
    fn check_acyclic(&self) -> Result<()> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            New,
            Open,
            Done,
        }

        let mut marks = vec![Mark::New; self.nodes.len()];

        for start in 0..self.nodes.len() {
            if marks[start] != Mark::New {
                continue;
            }
            // (node, next child slot)
            let mut stack = vec![(start, 0usize)];
            marks[start] = Mark::Open;

            while let Some(top) = stack.last_mut() {
                let node = top.0;
                if let Some(&child) = self.nodes[node].children.get(top.1) {
                    top.1 += 1;
                    match marks[child] {
                        Mark::Open => return Err(KilnError::NodeCycle(child)),
                        Mark::New => {
                            marks[child] = Mark::Open;
                            stack.push((child, 0));
                        }
                        Mark::Done => {}
                    }
                } else {
                    marks[node] = Mark::Done;
                    stack.pop();
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // Per-frame helpers
    // ========================================================================

    /// Applies animation `index` at `time` seconds.
    pub fn advance_animation(&mut self, index: usize, time: f32) -> Result<()> {
        let reader = AccessorReader::new(&self.accessors, &self.buffer_views, &self.buffers);
        let animation = self
            .animations
            .get_mut(index)
            .ok_or_else(|| KilnError::out_of_bounds("animation", index))?;
        animation.advance(&mut self.nodes, &self.meshes, reader, time);
        Ok(())
    }

    /// Applies every animation at `time` seconds.
    pub fn advance_animations(&mut self, time: f32) {
        let reader = AccessorReader::new(&self.accessors, &self.buffer_views, &self.buffers);
        for animation in &mut self.animations {
            animation.advance(&mut self.nodes, &self.meshes, reader, time);
        }
    }

    /// Recomputes world matrices for one scene.
    pub fn update_world_transforms(&mut self, scene_index: usize) -> Result<()> {
        let scene = self
            .scenes
            .get(scene_index)
            .ok_or_else(|| KilnError::out_of_bounds("scene", scene_index))?;
        compute_world_transforms(&mut self.nodes, &scene.nodes, Mat4::IDENTITY)
    }

    /// A copy of the glTF camera attached to `node`, placed at the node's
    /// current world matrix.
    #[must_use]
    pub fn camera_from_node(&self, node: usize, aspect: f32) -> Option<Camera> {
        let node = self.nodes.get(node)?;
        let mut camera = self.cameras.get(node.camera?)?.clone();
        camera.set_aspect(aspect);
        camera.update_view_projection(node.world_matrix());
        Some(camera)
    }

    // ========================================================================
    // Building documents in memory
    // ========================================================================

    fn push_accessor<T: NoUninit>(
        &mut self,
        data: &[T],
        component_type: ComponentType,
        element_type: ElementType,
    ) -> usize {
        let bytes: Vec<u8> = bytemuck::cast_slice(data).to_vec();
        let byte_length = bytes.len();

        self.buffers.push(Buffer::new(bytes));
        self.buffer_views.push(BufferView {
            buffer: self.buffers.len() - 1,
            byte_offset: 0,
            byte_length,
            byte_stride: None,
        });

        let count = data.len() / element_type.components();
        self.accessors.push(Accessor::new(
            Some(self.buffer_views.len() - 1),
            component_type,
            element_type,
            count,
        ));
        self.accessors.len() - 1
    }

    /// Adds a float accessor backed by its own buffer, with per-component
    /// `min`/`max` filled in. Returns its index.
    pub fn push_f32_accessor(&mut self, data: &[f32], element_type: ElementType) -> usize {
        let index = self.push_accessor(data, ComponentType::F32, element_type);

        let arity = element_type.components();
        if !data.is_empty() {
            let mut min = vec![f32::INFINITY; arity];
            let mut max = vec![f32::NEG_INFINITY; arity];
            for element in data.chunks_exact(arity) {
                for (k, &v) in element.iter().enumerate() {
                    min[k] = min[k].min(v);
                    max[k] = max[k].max(v);
                }
            }
            let accessor = &mut self.accessors[index];
            accessor.min = Some(min);
            accessor.max = Some(max);
        }
        index
    }

    /// Adds a scalar `u16` accessor (typically indices).
    pub fn push_u16_accessor(&mut self, data: &[u16]) -> usize {
        self.push_accessor(data, ComponentType::U16, ElementType::Scalar)
    }

    /// Adds a scalar `u32` accessor (typically indices).
    pub fn push_u32_accessor(&mut self, data: &[u32]) -> usize {
        self.push_accessor(data, ComponentType::U32, ElementType::Scalar)
    }
}

fn centroid(positions: &[f32]) -> Option<Vec3> {
    let count = positions.len() / 3;
    if count == 0 {
        return None;
    }
    let sum = positions
        .chunks_exact(3)
        .fold(Vec3::ZERO, |acc, p| acc + Vec3::from_slice(p));
    Some(sum / count as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_node_document() -> Document {
        let mut doc = Document::new();
        doc.nodes.push(Node::new());
        doc.scenes.push(Scene::new(vec![0]));
        doc
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(Document::new().id(), Document::new().id());
    }

    #[test]
    fn empty_document_has_no_scenes() {
        let mut doc = Document::new();
        assert!(matches!(doc.initialize(), Err(KilnError::NoScenes)));
    }

    #[test]
    fn dangling_child_is_rejected() {
        let mut doc = single_node_document();
        doc.nodes[0].children.push(5);
        assert!(matches!(
            doc.initialize(),
            Err(KilnError::IndexOutOfBounds { index: 5, .. })
        ));
    }

    #[test]
    fn cycles_are_rejected() {
        let mut doc = single_node_document();
        doc.nodes.push(Node::new().with_children(vec![0]));
        doc.nodes[0].children.push(1);
        assert!(matches!(doc.initialize(), Err(KilnError::NodeCycle(_))));
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        let mut doc = Document::new();
        doc.nodes.push(Node::new().with_children(vec![1, 2]));
        doc.nodes.push(Node::new().with_children(vec![3]));
        doc.nodes.push(Node::new().with_children(vec![3]));
        doc.nodes.push(Node::new());
        doc.scenes.push(Scene::new(vec![0]));
        assert!(doc.initialize().is_ok());
    }

    #[test]
    fn f32_accessor_records_bounds() {
        let mut doc = Document::new();
        let index = doc.push_f32_accessor(&[0.0, 1.0, 2.0, -1.0, 5.0, 0.5], ElementType::Vec3);
        let accessor = &doc.accessors[index];
        assert_eq!(accessor.count, 2);
        assert_eq!(accessor.min.as_deref(), Some(&[-1.0, 1.0, 0.5][..]));
        assert_eq!(accessor.max.as_deref(), Some(&[0.0, 5.0, 2.0][..]));
    }
}
