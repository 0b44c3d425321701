//! Material data as handed over by the loader.
//!
//! Everything here is plain data. The translation into shader defines and
//! uniform values lives in [`crate::renderer::features`].
//!
//! glTF material extensions are modelled as a closed set
//! ([`MaterialExtension`]) with typed payloads. The loader resolves
//! extension names through [`ExtensionKind::from_name`]; unknown extensions
//! are simply not represented.

use glam::{Mat3, Vec2, Vec3, Vec4};

// ============================================================================
// Alpha
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AlphaMode {
    #[default]
    Opaque,
    Mask,
    Blend,
}

impl AlphaMode {
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "OPAQUE" => Some(Self::Opaque),
            "MASK" => Some(Self::Mask),
            "BLEND" => Some(Self::Blend),
            _ => None,
        }
    }
}

// ============================================================================
// Texture references
// ============================================================================

/// KHR_texture_transform payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureTransform {
    pub offset: Vec2,
    pub rotation: f32,
    pub scale: Vec2,
    /// Overrides the UV set of the owning texture reference.
    pub tex_coord: Option<u32>,
}

impl Default for TextureTransform {
    fn default() -> Self {
        Self {
            offset: Vec2::ZERO,
            rotation: 0.0,
            scale: Vec2::ONE,
            tex_coord: None,
        }
    }
}

impl TextureTransform {
    /// UV matrix = rotate(θ) × scale(sx, sy) × translate(ox, oy).
    #[must_use]
    pub fn matrix(&self) -> Mat3 {
        let (s, c) = self.rotation.sin_cos();
        let rotation = Mat3::from_cols(Vec3::new(c, -s, 0.0), Vec3::new(s, c, 0.0), Vec3::Z);
        let scale = Mat3::from_diagonal(Vec3::new(self.scale.x, self.scale.y, 1.0));
        let translation = Mat3::from_cols(
            Vec3::X,
            Vec3::Y,
            Vec3::new(self.offset.x, self.offset.y, 1.0),
        );
        rotation * scale * translation
    }
}

/// Reference from a material slot to a texture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureInfo {
    pub index: usize,
    pub tex_coord: u32,
    pub transform: Option<TextureTransform>,
}

impl TextureInfo {
    #[must_use]
    pub fn new(index: usize) -> Self {
        Self {
            index,
            tex_coord: 0,
            transform: None,
        }
    }

    #[must_use]
    pub fn with_tex_coord(mut self, tex_coord: u32) -> Self {
        self.tex_coord = tex_coord;
        self
    }

    #[must_use]
    pub fn with_transform(mut self, transform: TextureTransform) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Effective UV set after a possible transform override.
    #[must_use]
    pub fn uv_set(&self) -> u32 {
        self.transform
            .and_then(|t| t.tex_coord)
            .unwrap_or(self.tex_coord)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalTextureInfo {
    pub info: TextureInfo,
    pub scale: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OcclusionTextureInfo {
    pub info: TextureInfo,
    pub strength: f32,
}

// ============================================================================
// Shading models
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct PbrMetallicRoughness {
    pub base_color_factor: Vec4,
    pub base_color_texture: Option<TextureInfo>,
    pub metallic_factor: f32,
    pub roughness_factor: f32,
    pub metallic_roughness_texture: Option<TextureInfo>,
}

impl Default for PbrMetallicRoughness {
    fn default() -> Self {
        Self {
            base_color_factor: Vec4::ONE,
            base_color_texture: None,
            metallic_factor: 1.0,
            roughness_factor: 1.0,
            metallic_roughness_texture: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PbrSpecularGlossiness {
    pub diffuse_factor: Vec4,
    pub diffuse_texture: Option<TextureInfo>,
    pub specular_factor: Vec3,
    pub glossiness_factor: f32,
    pub specular_glossiness_texture: Option<TextureInfo>,
}

impl Default for PbrSpecularGlossiness {
    fn default() -> Self {
        Self {
            diffuse_factor: Vec4::ONE,
            diffuse_texture: None,
            specular_factor: Vec3::ONE,
            glossiness_factor: 1.0,
            specular_glossiness_texture: None,
        }
    }
}

/// Mutually exclusive shading models.
#[derive(Debug, Clone, PartialEq)]
pub enum ShadingModel {
    MetallicRoughness(PbrMetallicRoughness),
    SpecularGlossiness(PbrSpecularGlossiness),
    /// KHR_materials_unlit; only the base color part is used.
    Unlit(PbrMetallicRoughness),
}

// ============================================================================
// Extensions
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Clearcoat {
    pub factor: f32,
    pub texture: Option<TextureInfo>,
    pub roughness_factor: f32,
    pub roughness_texture: Option<TextureInfo>,
    pub normal_texture: Option<NormalTextureInfo>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Sheen {
    pub color_factor: Vec3,
    pub color_texture: Option<TextureInfo>,
    pub roughness_factor: f32,
    pub roughness_texture: Option<TextureInfo>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Specular {
    pub factor: f32,
    pub texture: Option<TextureInfo>,
    pub color_factor: Vec3,
    pub color_texture: Option<TextureInfo>,
}

impl Default for Specular {
    fn default() -> Self {
        Self {
            factor: 1.0,
            texture: None,
            color_factor: Vec3::ONE,
            color_texture: None,
        }
    }
}

/// Known material extensions with their typed payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum MaterialExtension {
    Clearcoat(Clearcoat),
    Sheen(Sheen),
    Specular(Specular),
    EmissiveStrength(f32),
    Ior(f32),
}

impl MaterialExtension {
    #[must_use]
    pub fn kind(&self) -> ExtensionKind {
        match self {
            Self::Clearcoat(_) => ExtensionKind::Clearcoat,
            Self::Sheen(_) => ExtensionKind::Sheen,
            Self::Specular(_) => ExtensionKind::Specular,
            Self::EmissiveStrength(_) => ExtensionKind::EmissiveStrength,
            Self::Ior(_) => ExtensionKind::Ior,
        }
    }
}

/// Identifies a supported glTF material extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtensionKind {
    Clearcoat,
    Sheen,
    Specular,
    EmissiveStrength,
    Ior,
    Unlit,
    SpecularGlossiness,
}

const EXTENSION_REGISTRY: &[(&str, ExtensionKind)] = &[
    ("KHR_materials_clearcoat", ExtensionKind::Clearcoat),
    ("KHR_materials_sheen", ExtensionKind::Sheen),
    ("KHR_materials_specular", ExtensionKind::Specular),
    ("KHR_materials_emissive_strength", ExtensionKind::EmissiveStrength),
    ("KHR_materials_ior", ExtensionKind::Ior),
    ("KHR_materials_unlit", ExtensionKind::Unlit),
    ("KHR_materials_pbrSpecularGlossiness", ExtensionKind::SpecularGlossiness),
];

impl ExtensionKind {
    /// Looks up a glTF extension name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        EXTENSION_REGISTRY
            .iter()
            .find(|(n, _)| *n == name)
            .map(|&(_, kind)| kind)
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        EXTENSION_REGISTRY
            .iter()
            .find(|(_, k)| *k == self)
            .map_or("", |&(n, _)| n)
    }
}

// ============================================================================
// Material
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: Option<String>,
    /// `None` falls back to metallic-roughness with default factors.
    pub shading: Option<ShadingModel>,
    pub normal_texture: Option<NormalTextureInfo>,
    pub occlusion_texture: Option<OcclusionTextureInfo>,
    pub emissive_texture: Option<TextureInfo>,
    pub emissive_factor: Vec3,
    pub alpha_mode: AlphaMode,
    pub alpha_cutoff: f32,
    pub double_sided: bool,
    pub extensions: Vec<MaterialExtension>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: None,
            shading: None,
            normal_texture: None,
            occlusion_texture: None,
            emissive_texture: None,
            emissive_factor: Vec3::ZERO,
            alpha_mode: AlphaMode::Opaque,
            alpha_cutoff: 0.5,
            double_sided: false,
            extensions: Vec::new(),
        }
    }
}

impl Material {
    /// The catch-all material used by primitives without a material reference.
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            name: Some("default".to_string()),
            shading: Some(ShadingModel::MetallicRoughness(PbrMetallicRoughness::default())),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn metallic_roughness(pbr: PbrMetallicRoughness) -> Self {
        Self {
            shading: Some(ShadingModel::MetallicRoughness(pbr)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn extension(&self, kind: ExtensionKind) -> Option<&MaterialExtension> {
        self.extensions.iter().find(|ext| ext.kind() == kind)
    }

    #[must_use]
    pub fn clearcoat(&self) -> Option<&Clearcoat> {
        self.extensions.iter().find_map(|ext| match ext {
            MaterialExtension::Clearcoat(c) => Some(c),
            _ => None,
        })
    }

    #[must_use]
    pub fn sheen(&self) -> Option<&Sheen> {
        self.extensions.iter().find_map(|ext| match ext {
            MaterialExtension::Sheen(s) => Some(s),
            _ => None,
        })
    }

    #[must_use]
    pub fn specular(&self) -> Option<&Specular> {
        self.extensions.iter().find_map(|ext| match ext {
            MaterialExtension::Specular(s) => Some(s),
            _ => None,
        })
    }

    /// Every texture reference the material holds, in no particular order.
    #[must_use]
    pub fn texture_references(&self) -> Vec<TextureInfo> {
        let mut refs = Vec::new();
        match &self.shading {
            Some(ShadingModel::MetallicRoughness(pbr) | ShadingModel::Unlit(pbr)) => {
                refs.extend(pbr.base_color_texture);
                refs.extend(pbr.metallic_roughness_texture);
            }
            Some(ShadingModel::SpecularGlossiness(sg)) => {
                refs.extend(sg.diffuse_texture);
                refs.extend(sg.specular_glossiness_texture);
            }
            None => {}
        }
        refs.extend(self.normal_texture.map(|n| n.info));
        refs.extend(self.occlusion_texture.map(|o| o.info));
        refs.extend(self.emissive_texture);
        if let Some(c) = self.clearcoat() {
            refs.extend(c.texture);
            refs.extend(c.roughness_texture);
            refs.extend(c.normal_texture.map(|n| n.info));
        }
        if let Some(s) = self.sheen() {
            refs.extend(s.color_texture);
            refs.extend(s.roughness_texture);
        }
        if let Some(s) = self.specular() {
            refs.extend(s.texture);
            refs.extend(s.color_texture);
        }
        refs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-5;

    #[test]
    fn extension_registry_round_trips() {
        assert_eq!(
            ExtensionKind::from_name("KHR_materials_clearcoat"),
            Some(ExtensionKind::Clearcoat)
        );
        assert_eq!(ExtensionKind::Ior.name(), "KHR_materials_ior");
        assert_eq!(ExtensionKind::from_name("EXT_unknown"), None);
    }

    #[test]
    fn uv_transform_applies_translate_then_scale() {
        let transform = TextureTransform {
            offset: Vec2::new(0.5, 0.25),
            rotation: 0.0,
            scale: Vec2::new(2.0, 4.0),
            tex_coord: None,
        };
        let uv = transform.matrix() * Vec3::new(1.0, 1.0, 1.0);
        // (1 + 0.5) * 2, (1 + 0.25) * 4
        assert!((uv.x - 3.0).abs() < EPSILON);
        assert!((uv.y - 5.0).abs() < EPSILON);
    }

    #[test]
    fn uv_transform_rotation_is_applied_last() {
        let transform = TextureTransform {
            offset: Vec2::new(1.0, 0.0),
            rotation: std::f32::consts::FRAC_PI_2,
            scale: Vec2::ONE,
            tex_coord: Some(1),
        };
        let uv = transform.matrix() * Vec3::new(0.0, 0.0, 1.0);
        // translated to (1, 0), then rotated by the column basis (c, -s), (s, c)
        assert!(uv.x.abs() < EPSILON);
        assert!((uv.y + 1.0).abs() < EPSILON);

        let info = TextureInfo::new(3).with_transform(transform);
        assert_eq!(info.uv_set(), 1);
    }
}
