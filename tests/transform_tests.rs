//! Transform and scene graph tests
//!
//! Tests for:
//! - Transform TRS dirty checking
//! - Explicit node matrix decomposition
//! - Hierarchical world matrix propagation
//! - Alpha-mode partitioning and back-to-front sorting
//! - Scene bounds

use std::collections::BTreeMap;
use std::f32::consts::FRAC_PI_2;

use glam::{Mat4, Quat, Vec3};
use kiln::document::Document;
use kiln::resources::{AlphaMode, ElementType, Material, Mesh, Primitive, Semantic};
use kiln::scene::transform::{Transform, decompose};
use kiln::scene::{Node, Scene, depth_sort, partition, scene_bounds};

// ============================================================================
// Helper
// ============================================================================

const EPSILON: f32 = 1e-5;

fn approx_eq(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

fn vec3_approx(a: Vec3, b: Vec3) -> bool {
    approx_eq(a.x, b.x) && approx_eq(a.y, b.y) && approx_eq(a.z, b.z)
}

fn mat4_approx(a: &Mat4, b: &Mat4) -> bool {
    a.to_cols_array()
        .iter()
        .zip(b.to_cols_array().iter())
        .all(|(x, y)| (x - y).abs() < 1e-4)
}

/// Adds a one-triangle mesh with a material of the given alpha mode.
fn add_triangle_mesh(doc: &mut Document, alpha_mode: AlphaMode) -> usize {
    let positions = doc.push_f32_accessor(
        &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
        ElementType::Vec3,
    );
    doc.materials.push(Material {
        alpha_mode,
        ..Material::fallback()
    });

    let mut primitive = Primitive::new(BTreeMap::from([(Semantic::Position, positions)]));
    primitive.material = Some(doc.materials.len() - 1);
    doc.meshes.push(Mesh::new(vec![primitive]));
    doc.meshes.len() - 1
}

// ============================================================================
// Transform
// ============================================================================

#[test]
fn transform_update_local_matrix_dirty_check() {
    let mut t = Transform::new();

    // First call always recomposes
    assert!(t.update_local_matrix());
    assert!(!t.update_local_matrix());

    t.translation = Vec3::new(1.0, 2.0, 3.0);
    assert!(t.update_local_matrix());
    assert!(!t.update_local_matrix());

    t.rotation = Quat::from_rotation_y(FRAC_PI_2);
    assert!(t.update_local_matrix());

    t.scale = Vec3::splat(2.0);
    assert!(t.update_local_matrix());
    assert!(!t.update_local_matrix());
}

#[test]
fn transform_local_matrix_reflects_trs() {
    let mut t = Transform::from_trs(Vec3::new(10.0, 20.0, 30.0), Quat::IDENTITY, Vec3::splat(2.0));
    t.update_local_matrix();

    let m = t.local_matrix();
    assert!(vec3_approx(m.w_axis.truncate(), Vec3::new(10.0, 20.0, 30.0)));
    assert!(approx_eq(m.x_axis.x, 2.0));
}

#[test]
fn decompose_then_compose_reproduces_matrix() {
    let matrix = Mat4::from_scale_rotation_translation(
        Vec3::new(1.5, 2.0, 0.5),
        Quat::from_euler(glam::EulerRot::XYZ, 0.3, -1.1, 2.4),
        Vec3::new(-4.0, 7.5, 0.25),
    );

    let (translation, rotation, scale) = decompose(&matrix);
    let t = Transform::from_trs(translation, rotation, scale);
    assert!(mat4_approx(&t.compose(), &matrix));
}

#[test]
fn explicit_node_matrix_is_decomposed_on_initialize() -> anyhow::Result<()> {
    let matrix = Mat4::from_scale_rotation_translation(
        Vec3::splat(3.0),
        Quat::from_rotation_z(0.7),
        Vec3::new(1.0, -2.0, 3.0),
    );

    let mut doc = Document::new();
    doc.nodes.push(Node::with_matrix(matrix));
    doc.scenes.push(Scene::new(vec![0]));
    doc.initialize()?;

    assert!(doc.nodes[0].matrix.is_none());
    assert!(vec3_approx(doc.nodes[0].transform.translation, Vec3::new(1.0, -2.0, 3.0)));

    doc.update_world_transforms(0)?;
    assert!(mat4_approx(doc.nodes[0].world_matrix(), &matrix));
    Ok(())
}

// ============================================================================
// Hierarchy
// ============================================================================

#[test]
fn world_matrix_is_parent_times_local_over_three_levels() -> anyhow::Result<()> {
    let mut doc = Document::new();
    doc.nodes.push(
        Node::with_trs(Vec3::new(1.0, 0.0, 0.0), Quat::from_rotation_y(FRAC_PI_2), Vec3::ONE)
            .with_children(vec![1]),
    );
    doc.nodes.push(
        Node::with_trs(Vec3::new(0.0, 2.0, 0.0), Quat::IDENTITY, Vec3::splat(2.0))
            .with_children(vec![2]),
    );
    doc.nodes.push(Node::with_trs(
        Vec3::new(0.0, 0.0, 3.0),
        Quat::from_rotation_x(0.5),
        Vec3::ONE,
    ));
    doc.scenes.push(Scene::new(vec![0]));
    doc.initialize()?;
    doc.update_world_transforms(0)?;

    for (parent, child) in [(0, 1), (1, 2)] {
        let expected = *doc.nodes[parent].world_matrix() * doc.nodes[child].transform.compose();
        assert!(mat4_approx(doc.nodes[child].world_matrix(), &expected));
    }

    // (0,0,3) scaled by 2, lifted by 2, then rotated 90° about Y and moved +X
    let origin = doc.nodes[2].world_matrix().transform_point3(Vec3::ZERO);
    assert!(vec3_approx(origin, Vec3::new(7.0, 2.0, 0.0)));
    Ok(())
}

#[test]
fn moving_a_parent_updates_descendants() -> anyhow::Result<()> {
    let mut doc = Document::new();
    doc.nodes.push(Node::new().with_children(vec![1]));
    doc.nodes.push(Node::with_trs(Vec3::X, Quat::IDENTITY, Vec3::ONE));
    doc.scenes.push(Scene::new(vec![0]));
    doc.initialize()?;
    doc.update_world_transforms(0)?;

    doc.nodes[0].transform.translation = Vec3::new(0.0, 5.0, 0.0);
    doc.update_world_transforms(0)?;

    let origin = doc.nodes[1].world_matrix().w_axis.truncate();
    assert!(vec3_approx(origin, Vec3::new(1.0, 5.0, 0.0)));
    Ok(())
}

#[test]
fn normal_matrix_is_inverse_transpose_of_world() -> anyhow::Result<()> {
    let mut doc = Document::new();
    doc.nodes.push(Node::with_trs(Vec3::ZERO, Quat::from_rotation_z(0.4), Vec3::new(1.0, 3.0, 1.0)));
    doc.scenes.push(Scene::new(vec![0]));
    doc.initialize()?;
    doc.update_world_transforms(0)?;

    let node = &doc.nodes[0];
    let expected = node.world_matrix().inverse().transpose();
    assert!(mat4_approx(node.normal_matrix(), &expected));
    assert!(mat4_approx(node.inverse_world_matrix(), &node.world_matrix().inverse()));
    Ok(())
}

#[test]
fn gather_nodes_is_pre_order() {
    let mut nodes = vec![Node::new(); 5];
    nodes[0].children = vec![1, 3];
    nodes[1].children = vec![2];
    nodes[3].children = vec![4];

    let scene = Scene::new(vec![0]);
    assert_eq!(scene.gather_nodes(&nodes), vec![0, 1, 2, 3, 4]);
    assert!(scene.includes_node(&nodes, 4));
    assert!(!Scene::new(vec![3]).includes_node(&nodes, 2));
}

// ============================================================================
// Partition & sorting
// ============================================================================

#[test]
fn partition_and_its_negation_cover_renderable_nodes() -> anyhow::Result<()> {
    let mut doc = Document::new();
    let opaque = add_triangle_mesh(&mut doc, AlphaMode::Opaque);
    let blended = add_triangle_mesh(&mut doc, AlphaMode::Blend);
    let masked = add_triangle_mesh(&mut doc, AlphaMode::Mask);

    // A mesh whose only primitive has no POSITION stream
    doc.meshes.push(Mesh::new(vec![Primitive::new(BTreeMap::new())]));
    let empty = doc.meshes.len() - 1;

    doc.nodes.push(Node::new().with_mesh(opaque).with_children(vec![1, 2]));
    doc.nodes.push(Node::new().with_mesh(blended).with_children(vec![3]));
    doc.nodes.push(Node::new().with_mesh(masked));
    doc.nodes.push(Node::new().with_mesh(empty));
    doc.nodes.push(Node::new());
    doc.scenes.push(Scene::new(vec![0, 4]));
    doc.initialize()?;

    let scene = doc.scenes[0].clone();
    let blend = partition(&doc, &scene, AlphaMode::Blend, false);
    let rest = partition(&doc, &scene, AlphaMode::Blend, true);

    assert_eq!(blend.nodes, vec![1]);
    assert_eq!(rest.nodes, vec![0, 2]);

    let mut union: Vec<usize> = blend.nodes.iter().chain(&rest.nodes).copied().collect();
    union.sort_unstable();
    assert_eq!(union, vec![0, 1, 2]);
    Ok(())
}

#[test]
fn depth_sort_orders_back_to_front() -> anyhow::Result<()> {
    let mut doc = Document::new();
    for z in [-1.0, -10.0, -5.0] {
        doc.nodes.push(Node::with_trs(Vec3::new(0.0, 0.0, z), Quat::IDENTITY, Vec3::ONE));
    }
    doc.scenes.push(Scene::new(vec![0, 1, 2]));
    doc.initialize()?;
    doc.update_world_transforms(0)?;

    let view_projection = Mat4::perspective_rh_gl(1.0, 1.0, 0.1, 100.0);
    let mut order = vec![0, 1, 2];
    depth_sort(&mut order, &doc.nodes, &view_projection);
    assert_eq!(order, vec![1, 2, 0]);
    Ok(())
}

#[test]
fn scene_bounds_follow_world_matrices() -> anyhow::Result<()> {
    let mut doc = Document::new();
    let mesh = add_triangle_mesh(&mut doc, AlphaMode::Opaque);
    doc.nodes.push(Node::with_trs(Vec3::new(10.0, 0.0, 0.0), Quat::IDENTITY, Vec3::ONE).with_mesh(mesh));
    doc.nodes.push(Node::with_trs(Vec3::new(0.0, -3.0, 0.0), Quat::IDENTITY, Vec3::ONE).with_mesh(mesh));
    doc.scenes.push(Scene::new(vec![0, 1]));
    doc.initialize()?;
    doc.update_world_transforms(0)?;

    let bounds = scene_bounds(&doc, &doc.scenes[0]).expect("scene has geometry");
    assert!(vec3_approx(bounds.min, Vec3::new(0.0, -3.0, 0.0)));
    assert!(vec3_approx(bounds.max, Vec3::new(11.0, 1.0, 0.0)));
    Ok(())
}
