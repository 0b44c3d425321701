//! Shader cache and binding tests
//!
//! Tests for:
//! - Permutation keys (order independence, duplicates, distinctness)
//! - Compile / link caching and remembered failures
//! - Include resolution
//! - Built-in permutations reflecting the expected interface
//! - Typed uniform upload through struct arrays

use glam::{Mat4, Vec3};

use kiln::errors::KilnError;
use kiln::renderer::headless::{DeviceCommand, RecordedUniform};
use kiln::renderer::pipeline::{ShaderCache, UniformValue, permutation_hash, program_hash};
use kiln::renderer::{FRAGMENT_SHADER, GpuDevice, HeadlessDevice, VERTEX_SHADER};

const DEMO_VERT: &str = "\
uniform mat4 u_ModelMatrix;
in vec3 a_position;
#ifdef HAS_NORMAL_VEC3
in vec3 a_normal;
#endif
void main() {
    gl_Position = u_ModelMatrix * vec4(a_position, 1.0);
}
";

const DEMO_FRAG: &str = "\
#include <common.glsl>
struct Light {
    vec3 color;
    float intensity;
};
uniform Light u_Lights[2];
uniform vec4 u_Tint;
#ifdef BROKEN
#error this permutation does not compile
#endif
out vec4 g_finalColor;
void main() {
    g_finalColor = u_Tint * vec4(u_Lights[0].color, 1.0);
}
";

const COMMON: &str = "float saturate(float x) { return clamp(x, 0.0, 1.0); }\n";

fn demo_cache() -> ShaderCache {
    ShaderCache::new([
        ("demo.vert", DEMO_VERT),
        ("demo.frag", DEMO_FRAG),
        ("common.glsl", COMMON),
    ])
    .expect("demo sources resolve")
}

// ============================================================================
// Permutation keys
// ============================================================================

#[test]
fn select_shader_is_order_independent() {
    let mut device = HeadlessDevice::default();
    let mut cache = demo_cache();

    let ab = cache.select_shader(&mut device, "demo.frag", &["A", "B"]);
    let ba = cache.select_shader(&mut device, "demo.frag", &["B", "A"]);

    assert!(ab.is_some());
    assert_eq!(ab, ba);
    assert_eq!(device.compile_calls(), 1);
    assert_eq!(cache.shader_count(), 1);
}

#[test]
fn different_define_sets_get_different_keys() {
    let sets: [&[&str]; 5] = [&[], &["A"], &["B"], &["A", "B"], &["HAS_NORMAL_VEC3", "A"]];
    let mut keys: Vec<u32> = sets.iter().map(|s| permutation_hash("demo.frag", *s)).collect();
    keys.sort_unstable();
    keys.dedup();
    assert_eq!(keys.len(), sets.len());

    assert_ne!(permutation_hash("demo.frag", &["A"]), permutation_hash("demo.vert", &["A"]));
}

#[test]
fn duplicate_defines_are_ignored() {
    assert_eq!(
        permutation_hash("demo.frag", &["A", "A", "B"]),
        permutation_hash("demo.frag", &["B", "A"])
    );
}

#[test]
fn program_key_depends_on_stage_order() {
    assert_ne!(program_hash(10, 20), program_hash(20, 10));
}

// ============================================================================
// Compile & link caching
// ============================================================================

#[test]
fn compile_failure_is_remembered() {
    let mut device = HeadlessDevice::default();
    let mut cache = demo_cache();

    assert!(cache.select_shader(&mut device, "demo.frag", &["BROKEN"]).is_none());
    assert!(cache.select_shader(&mut device, "demo.frag", &["BROKEN"]).is_none());
    assert_eq!(device.compile_calls(), 1);

    // Other permutations of the same source still compile
    assert!(cache.select_shader(&mut device, "demo.frag", &["OK"]).is_some());
}

#[test]
fn unknown_identifier_yields_none() {
    let mut device = HeadlessDevice::default();
    let mut cache = demo_cache();
    assert!(cache.select_shader(&mut device, "missing.frag", &["A"]).is_none());
    assert_eq!(device.compile_calls(), 0);
}

#[test]
fn programs_link_once_per_pair() {
    let mut device = HeadlessDevice::default();
    let mut cache = demo_cache();

    let vs = cache.select_shader(&mut device, "demo.vert", &["HAS_NORMAL_VEC3"]).unwrap();
    let fs = cache.select_shader(&mut device, "demo.frag", &["A"]).unwrap();

    let first = cache.get_program(&mut device, vs, fs).map(|p| p.id());
    let second = cache.get_program(&mut device, vs, fs).map(|p| p.id());
    assert!(first.is_some());
    assert_eq!(first, second);
    assert_eq!(device.link_calls(), 1);
    assert_eq!(cache.program_count(), 1);
}

#[test]
fn link_failure_is_remembered() {
    let mut device = HeadlessDevice::default();
    let mut cache = demo_cache();
    let vs = cache.select_shader(&mut device, "demo.vert", &[] as &[&str]).unwrap();
    let fs = cache.select_shader(&mut device, "demo.frag", &[] as &[&str]).unwrap();

    device.set_fail_links(true);
    assert!(cache.get_program(&mut device, vs, fs).is_none());
    device.set_fail_links(false);
    assert!(cache.get_program(&mut device, vs, fs).is_none());
    assert_eq!(device.link_calls(), 1);
}

#[test]
fn destroy_releases_device_objects() {
    let mut device = HeadlessDevice::default();
    let mut cache = demo_cache();
    let vs = cache.select_shader(&mut device, "demo.vert", &["A"]).unwrap();
    let fs = cache.select_shader(&mut device, "demo.frag", &["A"]).unwrap();
    assert!(cache.get_program(&mut device, vs, fs).is_some());

    cache.destroy(&mut device);
    assert_eq!(device.live_programs(), 0);
    assert_eq!(device.live_shaders(), 0);
    assert_eq!(cache.shader_count(), 0);
}

// ============================================================================
// Sources
// ============================================================================

#[test]
fn includes_are_spliced_into_sources() {
    let cache = demo_cache();
    let text = cache.source("demo.frag").unwrap();
    assert!(text.contains("float saturate"));
    assert!(!text.contains("#include"));
}

#[test]
fn shared_include_is_spliced_once_and_compiles() {
    let mut device = HeadlessDevice::default();
    let mut cache = demo_cache();
    cache
        .register_source(
            "lighting.glsl",
            "#include <common.glsl>\nvec3 light() { return vec3(saturate(2.0)); }\n",
        )
        .unwrap();
    cache
        .register_source(
            "diamond.frag",
            "#include <common.glsl>\n#include <lighting.glsl>\n\
             out vec4 g_finalColor;\n\
             void main() { g_finalColor = vec4(light(), 1.0); }\n",
        )
        .unwrap();

    let text = cache.source("diamond.frag").unwrap();
    assert_eq!(text.matches("float saturate").count(), 1);
    assert!(cache.select_shader(&mut device, "diamond.frag", &["A"]).is_some());
}

#[test]
fn registering_a_cyclic_source_fails_and_keeps_the_table() {
    let mut cache = demo_cache();
    let result = cache.register_source("common.glsl", "#include <demo.frag>\n");
    assert!(matches!(result, Err(KilnError::ShaderIncludeCycle(_))));
    assert!(cache.source("common.glsl").unwrap().contains("saturate"));
}

#[test]
fn builtin_permutations_compile_and_link() {
    let mut device = HeadlessDevice::default();
    let mut cache = ShaderCache::with_builtin_sources().unwrap();

    let vertex_defines = [
        "HAS_POSITION_VEC3",
        "HAS_NORMAL_VEC3",
        "HAS_TANGENT_VEC4",
        "HAS_TEXCOORD_0_VEC2",
        "HAS_JOINTS_0_VEC4",
        "HAS_WEIGHTS_0_VEC4",
        "USE_SKINNING",
        "JOINT_COUNT 2",
        "USE_MORPHING",
        "WEIGHT_COUNT 1",
        "HAS_TARGET_POSITION0",
    ];
    let fragment_defines = [
        "HAS_POSITION_VEC3",
        "HAS_NORMAL_VEC3",
        "HAS_TANGENT_VEC4",
        "HAS_TEXCOORD_0_VEC2",
        "MATERIAL_METALLICROUGHNESS",
        "HAS_BASE_COLOR_MAP",
        "HAS_NORMAL_MAP",
        "MATERIAL_CLEARCOAT",
        "MATERIAL_SHEEN",
        "ALPHAMODE_MASK",
        "TONEMAP_KHR_PBR_NEUTRAL",
        "USE_PUNCTUAL",
        "LIGHT_COUNT 2",
        "USE_IBL",
    ];

    let vs = cache.select_shader(&mut device, VERTEX_SHADER, &vertex_defines).unwrap();
    let fs = cache.select_shader(&mut device, FRAGMENT_SHADER, &fragment_defines).unwrap();
    let program = cache.get_program(&mut device, vs, fs).unwrap();

    for uniform in [
        "u_ViewProjectionMatrix",
        "u_jointMatrix",
        "u_morphWeights",
        "u_BaseColorFactor",
        "u_BaseColorSampler",
        "u_NormalScale",
        "u_AlphaCutoff",
        "u_ClearcoatFactor",
        "u_SheenColorFactor",
        "u_Lights[1].outerConeCos",
        "u_GGXEnvSampler",
        "u_MipCount",
        "u_Exposure",
    ] {
        assert!(program.has_uniform(uniform), "missing {uniform}");
    }
    assert!(!program.has_uniform("u_DiffuseFactor"));
    assert!(!program.has_uniform("u_CharlieEnvSampler"));

    for attribute in ["a_position", "a_normal", "a_tangent", "a_joints_0", "a_target_position0"] {
        assert!(program.attribute_location(attribute).is_some(), "missing {attribute}");
    }
}

#[test]
fn unlit_and_specular_glossiness_permutations_compile() {
    let mut device = HeadlessDevice::default();
    let mut cache = ShaderCache::with_builtin_sources().unwrap();

    for shading in [
        &["MATERIAL_UNLIT", "ALPHAMODE_OPAQUE", "LINEAR_OUTPUT"][..],
        &["MATERIAL_SPECULARGLOSSINESS", "HAS_DIFFUSE_MAP", "HAS_DIFFUSE_UV_TRANSFORM", "HAS_TEXCOORD_0_VEC2"][..],
        &["MATERIAL_METALLICROUGHNESS", "MATERIAL_SPECULAR", "MATERIAL_IOR", "MATERIAL_EMISSIVE_STRENGTH", "USE_IBL", "HAS_SHEEN_ENVIRONMENT", "MATERIAL_SHEEN"][..],
    ] {
        assert!(
            cache.select_shader(&mut device, FRAGMENT_SHADER, shading).is_some(),
            "{shading:?} failed"
        );
    }
}

// ============================================================================
// Uniform binding
// ============================================================================

#[test]
fn struct_arrays_upload_per_member() {
    let mut device = HeadlessDevice::default();
    let mut cache = demo_cache();
    let vs = cache.select_shader(&mut device, "demo.vert", &["A"]).unwrap();
    let fs = cache.select_shader(&mut device, "demo.frag", &["A"]).unwrap();
    let program = cache.get_program(&mut device, vs, fs).unwrap();
    let id = program.id();

    let light = |color: Vec3, intensity: f32| {
        UniformValue::structure([
            ("color", UniformValue::Vec3(color)),
            ("intensity", UniformValue::Float(intensity)),
        ])
    };
    let lights = UniformValue::Array(vec![light(Vec3::X, 1.0), light(Vec3::Y, 0.5)]);

    device.use_program(id);
    program.update_uniform(&mut device, "u_Lights", &lights);
    program.update_uniform(&mut device, "u_ModelMatrix", &Mat4::IDENTITY.into());

    assert_eq!(
        device.uniform(id, "u_Lights[1].color"),
        Some(&RecordedUniform::Floats(vec![0.0, 1.0, 0.0]))
    );
    assert_eq!(
        device.uniform(id, "u_Lights[1].intensity"),
        Some(&RecordedUniform::Floats(vec![0.5]))
    );
    assert_eq!(
        device.uniform(id, "u_ModelMatrix").and_then(RecordedUniform::floats).map(<[f32]>::len),
        Some(16)
    );
}

#[test]
fn missing_uniform_is_skipped() {
    let mut device = HeadlessDevice::default();
    let mut cache = demo_cache();
    let vs = cache.select_shader(&mut device, "demo.vert", &["A"]).unwrap();
    let fs = cache.select_shader(&mut device, "demo.frag", &["A"]).unwrap();
    let program = cache.get_program(&mut device, vs, fs).unwrap();

    device.clear_commands();
    program.update_uniform(&mut device, "u_DoesNotExist", &UniformValue::Float(1.0));
    program.update_uniform(&mut device, "u_DoesNotExist", &UniformValue::Float(1.0));
    assert!(program.uniform_location("u_DoesNotExist").is_none());
    assert!(
        !device
            .commands()
            .iter()
            .any(|c| matches!(c, DeviceCommand::Uniform { .. }))
    );
}
