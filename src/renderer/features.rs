//! Material and primitive feature compilation.
//!
//! Turns plain document data into the two things a shader permutation needs:
//! an ordered define list and the values for the uniforms those defines
//! switch on. The vertex stage is keyed by [`primitive_defines`], the
//! fragment stage by [`MaterialFeatures::compile`].

use std::collections::BTreeMap;

use crate::renderer::pipeline::UniformValue;
use crate::resources::{
    Accessor, AlphaMode, ElementType, MAX_MORPH_TARGETS, Material, MaterialExtension,
    PbrMetallicRoughness, PbrSpecularGlossiness, Primitive, Semantic, ShaderDefines, ShadingModel,
    TextureInfo,
};

// ============================================================================
// Primitive (vertex stage)
// ============================================================================

/// Vertex-stage defines derived from a primitive's attribute streams and
/// morph targets.
#[must_use]
pub fn primitive_defines(primitive: &Primitive, accessors: &[Accessor]) -> ShaderDefines {
    let mut defines = ShaderDefines::new();

    for (semantic, &accessor) in &primitive.attributes {
        let name = match semantic {
            Semantic::Position => "HAS_POSITION_VEC3".to_string(),
            Semantic::Normal => "HAS_NORMAL_VEC3".to_string(),
            Semantic::Tangent => "HAS_TANGENT_VEC4".to_string(),
            Semantic::TexCoord(i) => format!("HAS_TEXCOORD_{i}_VEC2"),
            Semantic::Color(i) => {
                let arity = match accessors.get(accessor).map(|a| a.element_type) {
                    Some(ElementType::Vec3) => "VEC3",
                    _ => "VEC4",
                };
                format!("HAS_COLOR_{i}_{arity}")
            }
            Semantic::Joints(i) => format!("HAS_JOINTS_{i}_VEC4"),
            Semantic::Weights(i) => format!("HAS_WEIGHTS_{i}_VEC4"),
            Semantic::Custom(_) => continue,
        };
        defines.enable(&name);
    }

    let target_count = primitive.targets.len().min(MAX_MORPH_TARGETS);
    if target_count > 0 {
        defines.enable("USE_MORPHING");
        defines.set("WEIGHT_COUNT", target_count);
        for (i, target) in primitive.targets.iter().take(target_count).enumerate() {
            for semantic in target.keys() {
                let stem = match semantic {
                    Semantic::Position => "POSITION",
                    Semantic::Normal => "NORMAL",
                    Semantic::Tangent => "TANGENT",
                    _ => continue,
                };
                defines.enable(&format!("HAS_TARGET_{stem}{i}"));
            }
        }
    }

    defines
}

// ============================================================================
// Material (fragment stage)
// ============================================================================

/// A material texture to bind before drawing.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureBinding {
    /// Sampler uniform, e.g. `u_BaseColorSampler`.
    pub sampler: String,
    /// Index into the document's texture table.
    pub texture: usize,
}

#[derive(Debug, Clone, Copy)]
struct TextureSlot {
    define: &'static str,
    uniform: &'static str,
}

const BASE_COLOR: TextureSlot = TextureSlot { define: "BASE_COLOR", uniform: "BaseColor" };
const METALLIC_ROUGHNESS: TextureSlot = TextureSlot { define: "METALLIC_ROUGHNESS", uniform: "MetallicRoughness" };
const DIFFUSE: TextureSlot = TextureSlot { define: "DIFFUSE", uniform: "Diffuse" };
const SPECULAR_GLOSSINESS: TextureSlot = TextureSlot { define: "SPECULAR_GLOSSINESS", uniform: "SpecularGlossiness" };
const NORMAL: TextureSlot = TextureSlot { define: "NORMAL", uniform: "Normal" };
const OCCLUSION: TextureSlot = TextureSlot { define: "OCCLUSION", uniform: "Occlusion" };
const EMISSIVE: TextureSlot = TextureSlot { define: "EMISSIVE", uniform: "Emissive" };
const CLEARCOAT: TextureSlot = TextureSlot { define: "CLEARCOAT", uniform: "Clearcoat" };
const CLEARCOAT_ROUGHNESS: TextureSlot = TextureSlot { define: "CLEARCOAT_ROUGHNESS", uniform: "ClearcoatRoughness" };
const CLEARCOAT_NORMAL: TextureSlot = TextureSlot { define: "CLEARCOAT_NORMAL", uniform: "ClearcoatNormal" };
const SHEEN_COLOR: TextureSlot = TextureSlot { define: "SHEEN_COLOR", uniform: "SheenColor" };
const SHEEN_ROUGHNESS: TextureSlot = TextureSlot { define: "SHEEN_ROUGHNESS", uniform: "SheenRoughness" };
const SPECULAR: TextureSlot = TextureSlot { define: "SPECULAR", uniform: "Specular" };
const SPECULAR_COLOR: TextureSlot = TextureSlot { define: "SPECULAR_COLOR", uniform: "SpecularColor" };

/// Fragment-stage features of one material.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterialFeatures {
    pub defines: ShaderDefines,
    /// Uniform name → value, uploaded for every draw with this material.
    pub properties: BTreeMap<String, UniformValue>,
    /// Textures in the order they take texture units.
    pub textures: Vec<TextureBinding>,
}

impl MaterialFeatures {
    /// Compiles the defines, uniform properties and texture bindings of `material`.
    ///
    /// A material without a shading model is treated as metallic-roughness
    /// with the glTF default factors.
    #[must_use]
    pub fn compile(material: &Material) -> Self {
        let mut features = Self::default();

        match &material.shading {
            Some(ShadingModel::MetallicRoughness(pbr)) => features.metallic_roughness(pbr),
            Some(ShadingModel::SpecularGlossiness(sg)) => features.specular_glossiness(sg),
            Some(ShadingModel::Unlit(pbr)) => {
                features.defines.enable("MATERIAL_UNLIT");
                features.set("u_BaseColorFactor", pbr.base_color_factor);
                if let Some(info) = &pbr.base_color_texture {
                    features.bind(BASE_COLOR, info);
                }
            }
            None => features.metallic_roughness(&PbrMetallicRoughness::default()),
        }

        if let Some(normal) = &material.normal_texture {
            features.bind(NORMAL, &normal.info);
            features.set("u_NormalScale", normal.scale);
        }
        if let Some(occlusion) = &material.occlusion_texture {
            features.bind(OCCLUSION, &occlusion.info);
            features.set("u_OcclusionStrength", occlusion.strength);
        }
        if let Some(info) = &material.emissive_texture {
            features.bind(EMISSIVE, info);
        }
        features.set("u_EmissiveFactor", material.emissive_factor);

        for extension in &material.extensions {
            features.extension(extension);
        }

        match material.alpha_mode {
            AlphaMode::Mask => {
                features.defines.enable("ALPHAMODE_MASK");
                features.set("u_AlphaCutoff", material.alpha_cutoff);
            }
            AlphaMode::Opaque => features.defines.enable("ALPHAMODE_OPAQUE"),
            AlphaMode::Blend => {}
        }

        features
    }

    fn metallic_roughness(&mut self, pbr: &PbrMetallicRoughness) {
        self.defines.enable("MATERIAL_METALLICROUGHNESS");
        self.set("u_BaseColorFactor", pbr.base_color_factor);
        self.set("u_MetallicFactor", pbr.metallic_factor);
        self.set("u_RoughnessFactor", pbr.roughness_factor);
        if let Some(info) = &pbr.base_color_texture {
            self.bind(BASE_COLOR, info);
        }
        if let Some(info) = &pbr.metallic_roughness_texture {
            self.bind(METALLIC_ROUGHNESS, info);
        }
    }

    fn specular_glossiness(&mut self, sg: &PbrSpecularGlossiness) {
        self.defines.enable("MATERIAL_SPECULARGLOSSINESS");
        self.set("u_DiffuseFactor", sg.diffuse_factor);
        self.set("u_SpecularFactor", sg.specular_factor);
        self.set("u_GlossinessFactor", sg.glossiness_factor);
        if let Some(info) = &sg.diffuse_texture {
            self.bind(DIFFUSE, info);
        }
        if let Some(info) = &sg.specular_glossiness_texture {
            self.bind(SPECULAR_GLOSSINESS, info);
        }
    }

    fn extension(&mut self, extension: &MaterialExtension) {
        match extension {
            MaterialExtension::Clearcoat(clearcoat) => {
                self.defines.enable("MATERIAL_CLEARCOAT");
                self.set("u_ClearcoatFactor", clearcoat.factor);
                self.set("u_ClearcoatRoughnessFactor", clearcoat.roughness_factor);
                if let Some(info) = &clearcoat.texture {
                    self.bind(CLEARCOAT, info);
                }
                if let Some(info) = &clearcoat.roughness_texture {
                    self.bind(CLEARCOAT_ROUGHNESS, info);
                }
                if let Some(normal) = &clearcoat.normal_texture {
                    self.bind(CLEARCOAT_NORMAL, &normal.info);
                    self.set("u_ClearcoatNormalScale", normal.scale);
                }
            }
            MaterialExtension::Sheen(sheen) => {
                self.defines.enable("MATERIAL_SHEEN");
                self.set("u_SheenColorFactor", sheen.color_factor);
                self.set("u_SheenRoughnessFactor", sheen.roughness_factor);
                if let Some(info) = &sheen.color_texture {
                    self.bind(SHEEN_COLOR, info);
                }
                if let Some(info) = &sheen.roughness_texture {
                    self.bind(SHEEN_ROUGHNESS, info);
                }
            }
            MaterialExtension::Specular(specular) => {
                self.defines.enable("MATERIAL_SPECULAR");
                self.set("u_SpecularWeight", specular.factor);
                self.set("u_SpecularColorFactor", specular.color_factor);
                if let Some(info) = &specular.texture {
                    self.bind(SPECULAR, info);
                }
                if let Some(info) = &specular.color_texture {
                    self.bind(SPECULAR_COLOR, info);
                }
            }
            MaterialExtension::EmissiveStrength(strength) => {
                self.defines.enable("MATERIAL_EMISSIVE_STRENGTH");
                self.set("u_EmissiveStrength", *strength);
            }
            MaterialExtension::Ior(ior) => {
                self.defines.enable("MATERIAL_IOR");
                self.set("u_Ior", *ior);
            }
        }
    }

    fn bind(&mut self, slot: TextureSlot, info: &TextureInfo) {
        self.defines.enable(&format!("HAS_{}_MAP", slot.define));
        self.set(&format!("u_{}UVSet", slot.uniform), info.uv_set() as i32);
        if let Some(transform) = &info.transform {
            self.defines.enable(&format!("HAS_{}_UV_TRANSFORM", slot.define));
            self.set(&format!("u_{}UVTransform", slot.uniform), transform.matrix());
        }
        self.textures.push(TextureBinding {
            sampler: format!("u_{}Sampler", slot.uniform),
            texture: info.index,
        });
    }

    fn set(&mut self, name: &str, value: impl Into<UniformValue>) {
        self.properties.insert(name.to_string(), value.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{ComponentType, NormalTextureInfo, TextureTransform};
    use glam::{Vec2, Vec4};

    #[test]
    fn missing_shading_model_gets_default_factors() {
        let features = MaterialFeatures::compile(&Material::default());
        assert!(features.defines.contains("MATERIAL_METALLICROUGHNESS"));
        assert!(features.defines.contains("ALPHAMODE_OPAQUE"));
        assert_eq!(
            features.properties.get("u_BaseColorFactor"),
            Some(&UniformValue::Vec4(Vec4::ONE))
        );
        assert_eq!(features.properties.get("u_MetallicFactor"), Some(&UniformValue::Float(1.0)));
        assert_eq!(features.properties.get("u_RoughnessFactor"), Some(&UniformValue::Float(1.0)));
        assert!(features.textures.is_empty());
    }

    #[test]
    fn texture_slots_register_uv_set_and_sampler() {
        let mut material = Material::default();
        material.normal_texture = Some(NormalTextureInfo {
            info: TextureInfo::new(4).with_tex_coord(1),
            scale: 0.5,
        });
        let features = MaterialFeatures::compile(&material);

        assert!(features.defines.contains("HAS_NORMAL_MAP"));
        assert!(!features.defines.contains("HAS_NORMAL_UV_TRANSFORM"));
        assert_eq!(features.properties.get("u_NormalUVSet"), Some(&UniformValue::Int(1)));
        assert_eq!(features.properties.get("u_NormalScale"), Some(&UniformValue::Float(0.5)));
        assert_eq!(
            features.textures,
            vec![TextureBinding { sampler: "u_NormalSampler".to_string(), texture: 4 }]
        );
    }

    #[test]
    fn uv_transform_overrides_uv_set() {
        let transform = TextureTransform {
            offset: Vec2::new(0.5, 0.0),
            tex_coord: Some(2),
            ..TextureTransform::default()
        };
        let material = Material::metallic_roughness(PbrMetallicRoughness {
            base_color_texture: Some(TextureInfo::new(0).with_transform(transform)),
            ..PbrMetallicRoughness::default()
        });
        let features = MaterialFeatures::compile(&material);

        assert!(features.defines.contains("HAS_BASE_COLOR_UV_TRANSFORM"));
        assert_eq!(features.properties.get("u_BaseColorUVSet"), Some(&UniformValue::Int(2)));
        assert_eq!(
            features.properties.get("u_BaseColorUVTransform"),
            Some(&UniformValue::Mat3(transform.matrix()))
        );
    }

    #[test]
    fn color_arity_follows_accessor() {
        let accessors = vec![
            Accessor::new(None, ComponentType::F32, ElementType::Vec3, 3),
            Accessor::new(None, ComponentType::U8, ElementType::Vec3, 3),
        ];
        let mut primitive = Primitive::default();
        primitive.attributes.insert(Semantic::Position, 0);
        primitive.attributes.insert(Semantic::Color(0), 1);

        let defines = primitive_defines(&primitive, &accessors);
        assert!(defines.contains("HAS_POSITION_VEC3"));
        assert!(defines.contains("HAS_COLOR_0_VEC3"));
        assert!(!defines.contains("USE_MORPHING"));
    }

    #[test]
    fn morph_targets_are_capped() {
        let mut primitive = Primitive::default();
        primitive.attributes.insert(Semantic::Position, 0);
        for _ in 0..MAX_MORPH_TARGETS + 2 {
            primitive.targets.push(BTreeMap::from([(Semantic::Position, 0)]));
        }

        let defines = primitive_defines(&primitive, &[]);
        assert_eq!(defines.get("WEIGHT_COUNT"), Some(MAX_MORPH_TARGETS.to_string().as_str()));
        assert!(defines.contains("HAS_TARGET_POSITION0"));
        assert!(!defines.contains(&format!("HAS_TARGET_POSITION{MAX_MORPH_TARGETS}")));
    }
}
