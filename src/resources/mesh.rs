use std::collections::BTreeMap;

use glam::Vec3;

use crate::resources::shader_defines::ShaderDefines;

/// Upper bound on morph targets a primitive may feed to the vertex shader.
pub const MAX_MORPH_TARGETS: usize = 8;

/// Vertex attribute semantic, as named by glTF.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Semantic {
    Position,
    Normal,
    Tangent,
    TexCoord(u32),
    Color(u32),
    Joints(u32),
    Weights(u32),
    /// Application specific (`_FOO`) attribute.
    Custom(String),
}

impl Semantic {
    /// Parses a glTF attribute name (`POSITION`, `TEXCOORD_1`, ...).
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        fn set_index(name: &str, prefix: &str) -> Option<u32> {
            name.strip_prefix(prefix)?.parse().ok()
        }

        match name {
            "POSITION" => Self::Position,
            "NORMAL" => Self::Normal,
            "TANGENT" => Self::Tangent,
            _ => {
                if let Some(i) = set_index(name, "TEXCOORD_") {
                    Self::TexCoord(i)
                } else if let Some(i) = set_index(name, "COLOR_") {
                    Self::Color(i)
                } else if let Some(i) = set_index(name, "JOINTS_") {
                    Self::Joints(i)
                } else if let Some(i) = set_index(name, "WEIGHTS_") {
                    Self::Weights(i)
                } else {
                    Self::Custom(name.to_string())
                }
            }
        }
    }

    /// Name of the vertex shader input this semantic binds to.
    #[must_use]
    pub fn attribute_name(&self) -> String {
        match self {
            Self::Position => "a_position".to_string(),
            Self::Normal => "a_normal".to_string(),
            Self::Tangent => "a_tangent".to_string(),
            Self::TexCoord(i) => format!("a_texcoord_{i}"),
            Self::Color(i) => format!("a_color_{i}"),
            Self::Joints(i) => format!("a_joints_{i}"),
            Self::Weights(i) => format!("a_weights_{i}"),
            Self::Custom(name) => format!("a{}", name.to_lowercase()),
        }
    }

    /// Name of the vertex shader input for morph target `target`.
    #[must_use]
    pub fn target_attribute_name(&self, target: usize) -> Option<String> {
        match self {
            Self::Position => Some(format!("a_target_position{target}")),
            Self::Normal => Some(format!("a_target_normal{target}")),
            Self::Tangent => Some(format!("a_target_tangent{target}")),
            _ => None,
        }
    }
}

/// glTF primitive topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DrawMode {
    Points,
    Lines,
    LineLoop,
    LineStrip,
    #[default]
    Triangles,
    TriangleStrip,
    TriangleFan,
}

impl DrawMode {
    #[must_use]
    pub fn from_gl(mode: u32) -> Option<Self> {
        match mode {
            0 => Some(Self::Points),
            1 => Some(Self::Lines),
            2 => Some(Self::LineLoop),
            3 => Some(Self::LineStrip),
            4 => Some(Self::Triangles),
            5 => Some(Self::TriangleStrip),
            6 => Some(Self::TriangleFan),
            _ => None,
        }
    }
}

/// One drawable part of a mesh: a set of vertex streams and one material.
#[derive(Debug, Clone, Default)]
pub struct Primitive {
    pub attributes: BTreeMap<Semantic, usize>,
    pub indices: Option<usize>,
    pub material: Option<usize>,
    pub mode: DrawMode,
    /// Morph targets, each a semantic → accessor map.
    pub targets: Vec<BTreeMap<Semantic, usize>>,

    // === Derived at document initialization ===
    pub(crate) renderable: bool,
    pub(crate) defines: ShaderDefines,
    pub(crate) centroid: Option<Vec3>,
}

impl Primitive {
    #[must_use]
    pub fn new(attributes: BTreeMap<Semantic, usize>) -> Self {
        Self {
            attributes,
            ..Self::default()
        }
    }

    /// `false` when the primitive has no POSITION stream; such primitives are never drawn.
    #[inline]
    #[must_use]
    pub fn is_renderable(&self) -> bool {
        self.renderable
    }

    /// Vertex shader defines derived from the attribute set.
    #[inline]
    #[must_use]
    pub fn defines(&self) -> &ShaderDefines {
        &self.defines
    }

    /// Mean object-space position of the POSITION stream, if computed.
    #[inline]
    #[must_use]
    pub fn centroid(&self) -> Option<Vec3> {
        self.centroid
    }

    #[inline]
    #[must_use]
    pub fn attribute(&self, semantic: &Semantic) -> Option<usize> {
        self.attributes.get(semantic).copied()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub name: Option<String>,
    pub primitives: Vec<Primitive>,
    /// Default morph target weights.
    pub weights: Vec<f32>,
}

impl Mesh {
    #[must_use]
    pub fn new(primitives: Vec<Primitive>) -> Self {
        Self {
            name: None,
            primitives,
            weights: Vec::new(),
        }
    }

    /// Number of morph targets (max over primitives).
    #[must_use]
    pub fn target_count(&self) -> usize {
        self.primitives
            .iter()
            .map(|p| p.targets.len())
            .max()
            .unwrap_or(0)
    }
}
