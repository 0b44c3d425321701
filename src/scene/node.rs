use glam::{Mat4, Quat, Vec3};

use crate::scene::transform::Transform;

/// A scene graph node.
///
/// Nodes live in the document's flat node table and refer to each other and
/// to meshes, cameras, lights and skins by index. The hierarchy must be a
/// forest; [`Document::initialize`](crate::document::Document::initialize)
/// rejects cycles.
#[derive(Debug, Clone, Default)]
pub struct Node {
    pub name: Option<String>,

    // === Core Hierarchy ===
    pub children: Vec<usize>,

    // === Components ===
    pub mesh: Option<usize>,
    pub camera: Option<usize>,
    pub light: Option<usize>,
    pub skin: Option<usize>,
    /// Morph weights overriding the mesh defaults. Animation writes here.
    pub weights: Option<Vec<f32>>,

    // === Core Spatial Data ===
    pub transform: Transform,
    /// Explicit local matrix from the loader. Decomposed into `transform`
    /// and cleared by document initialization.
    pub matrix: Option<Mat4>,
}

impl Node {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Node with an explicit local matrix, decomposed on initialization.
    #[must_use]
    pub fn with_matrix(matrix: Mat4) -> Self {
        Self {
            matrix: Some(matrix),
            ..Self::default()
        }
    }

    /// Replaces the transform with the decomposition of the explicit matrix,
    /// if there is one.
    pub fn decompose_matrix(&mut self) {
        if let Some(matrix) = self.matrix.take() {
            self.transform = Transform::from_matrix(matrix);
        }
    }

    #[must_use]
    pub fn with_trs(translation: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            transform: Transform::from_trs(translation, rotation, scale),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_mesh(mut self, mesh: usize) -> Self {
        self.mesh = Some(mesh);
        self
    }

    #[must_use]
    pub fn with_children(mut self, children: Vec<usize>) -> Self {
        self.children = children;
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn children(&self) -> &[usize] {
        &self.children
    }

    /// World matrix as of the last hierarchy update.
    #[inline]
    #[must_use]
    pub fn world_matrix(&self) -> &Mat4 {
        self.transform.world_matrix()
    }

    #[inline]
    #[must_use]
    pub fn inverse_world_matrix(&self) -> &Mat4 {
        self.transform.inverse_world_matrix()
    }

    #[inline]
    #[must_use]
    pub fn normal_matrix(&self) -> &Mat4 {
        self.transform.normal_matrix()
    }
}
