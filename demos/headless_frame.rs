//! Renders a small animated scene on the headless device and logs what the
//! renderer did each frame.
//!
//! ```text
//! RUST_LOG=debug cargo run --example headless_frame
//! ```

use std::collections::BTreeMap;

use glam::{Quat, Vec3, Vec4};
use log::info;

use kiln::animation::{Animation, AnimationChannel, AnimationSampler, InterpolationMode, TargetPath};
use kiln::document::Document;
use kiln::renderer::{FrameTarget, HeadlessDevice, RenderSettings, Renderer};
use kiln::resources::{
    AlphaMode, ElementType, Material, Mesh, PbrMetallicRoughness, Primitive, Semantic,
};
use kiln::scene::{Camera, Light, Node, Scene, scene_bounds};

const FRAMES: usize = 4;
const FRAME_TIME: f32 = 0.25;

/// A unit quad in the XY plane, drawn with indices.
fn quad(doc: &mut Document, material: usize) -> usize {
    let positions = doc.push_f32_accessor(
        &[-0.5, -0.5, 0.0, 0.5, -0.5, 0.0, 0.5, 0.5, 0.0, -0.5, 0.5, 0.0],
        ElementType::Vec3,
    );
    let normals = doc.push_f32_accessor(&[0.0_f32, 0.0, 1.0].repeat(4), ElementType::Vec3);
    let uvs = doc.push_f32_accessor(&[0.0, 1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0], ElementType::Vec2);
    let indices = doc.push_u16_accessor(&[0, 1, 2, 0, 2, 3]);

    let mut primitive = Primitive::new(BTreeMap::from([
        (Semantic::Position, positions),
        (Semantic::Normal, normals),
        (Semantic::TexCoord(0), uvs),
    ]));
    primitive.indices = Some(indices);
    primitive.material = Some(material);
    doc.meshes.push(Mesh::new(vec![primitive]));
    doc.meshes.len() - 1
}

fn build_document() -> Document {
    let mut doc = Document::new();

    doc.materials.push(Material::metallic_roughness(PbrMetallicRoughness {
        base_color_factor: Vec4::new(0.8, 0.3, 0.2, 1.0),
        metallic_factor: 0.0,
        roughness_factor: 0.6,
        ..PbrMetallicRoughness::default()
    }));
    doc.materials.push(Material {
        alpha_mode: AlphaMode::Blend,
        double_sided: true,
        ..Material::metallic_roughness(PbrMetallicRoughness {
            base_color_factor: Vec4::new(0.2, 0.4, 1.0, 0.5),
            ..PbrMetallicRoughness::default()
        })
    });

    let solid = quad(&mut doc, 0);
    let glass = quad(&mut doc, 1);

    doc.lights.push(Light::new_directional(Vec3::ONE, 3.0));

    let mut sun = Node::with_trs(Vec3::ZERO, Quat::from_rotation_x(-0.8), Vec3::ONE).with_name("sun");
    sun.light = Some(0);
    doc.nodes.push(Node::with_trs(Vec3::new(0.0, 0.0, -1.0), Quat::IDENTITY, Vec3::ONE).with_mesh(solid).with_name("panel"));
    doc.nodes.push(Node::with_trs(Vec3::new(0.3, 0.2, 0.5), Quat::IDENTITY, Vec3::splat(0.8)).with_mesh(glass).with_name("glass"));
    doc.nodes.push(sun);
    doc.scenes.push(Scene::new(vec![0, 1, 2]));

    // Spin the panel half a turn per second
    let times = doc.push_f32_accessor(&[0.0, 1.0, 2.0], ElementType::Scalar);
    let half = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);
    let mut rotations = Vec::new();
    for q in [Quat::IDENTITY, half, half * half] {
        rotations.extend_from_slice(&q.to_array());
    }
    let values = doc.push_f32_accessor(&rotations, ElementType::Vec4);
    doc.animations.push(Animation::new(
        vec![AnimationSampler::new(times, values, InterpolationMode::Linear)],
        vec![AnimationChannel::new(0, 0, TargetPath::Rotation)],
    ));

    doc
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut device = HeadlessDevice::new(800, 600);
    let mut renderer = Renderer::new(RenderSettings::default())?;
    let mut doc = build_document();

    doc.initialize()?;
    doc.update_world_transforms(0)?;

    let mut camera = Camera::new_perspective(0.9, 800.0 / 600.0, 0.1, Some(100.0));
    if let Some(bounds) = scene_bounds(&doc, &doc.scenes[0]) {
        camera.frame_bounds(bounds.min, bounds.max);
        info!("Scene bounds {:?} .. {:?}", bounds.min, bounds.max);
    }

    for frame in 0..FRAMES {
        doc.advance_animation(0, frame as f32 * FRAME_TIME)?;

        device.clear_commands();
        renderer.new_frame(&mut device, FrameTarget::BackBuffer)?;
        renderer.draw_scene(&mut device, &mut doc, 0, &camera)?;

        let stats = renderer.stats();
        info!(
            "Frame {frame}: {} draws ({} blended, {} skipped) in {} pass(es), {} device commands",
            stats.draw_calls,
            stats.blended,
            stats.skipped,
            stats.passes,
            device.commands().len()
        );
    }

    info!(
        "Cache: {} shader permutations, {} programs, {} buffers",
        renderer.shader_cache().shader_count(),
        renderer.shader_cache().program_count(),
        renderer.resources().buffer_count()
    );

    renderer.unload(&mut device, &doc);
    renderer.destroy(&mut device);
    info!("Released everything; {} live buffers remain", device.live_buffers());
    Ok(())
}
