//! Visibility partitioning and depth sorting.
//!
//! The renderer splits a scene into the nodes drawn in the opaque pass and
//! the nodes drawn in the blended pass, then sorts the blended ones back to
//! front.

use glam::Mat4;

use crate::document::Document;
use crate::resources::AlphaMode;
use crate::scene::node::Node;
use crate::scene::scene::Scene;

/// Returns a flat scene holding every node (at any depth below `scene`) that
/// owns a mesh with at least one renderable primitive whose alpha mode
/// matches `mode` (or, with `negate`, differs from it).
///
/// Each qualifying node appears once. Children are visited whether or not
/// their parent qualified. Primitives without a material are judged by the
/// document's default material.
#[must_use]
pub fn partition(document: &Document, scene: &Scene, mode: AlphaMode, negate: bool) -> Scene {
    let mut selected = Vec::new();

    for index in scene.gather_nodes(&document.nodes) {
        let Some(node) = document.nodes.get(index) else {
            continue;
        };
        let Some(mesh) = node.mesh.and_then(|m| document.meshes.get(m)) else {
            continue;
        };

        let matches = mesh.primitives.iter().any(|primitive| {
            primitive.is_renderable()
                && ((document.material_for(primitive).alpha_mode == mode) != negate)
        });

        if matches {
            selected.push(index);
        }
    }

    Scene {
        name: scene.name.clone(),
        nodes: selected,
    }
}

/// Sorts `order` back to front: by the z of `view_projection * world(node)`'s
/// translation, descending. The sort is stable so equal depths keep their
/// relative order.
pub fn depth_sort(order: &mut [usize], nodes: &[Node], view_projection: &Mat4) {
    let depth = |index: usize| {
        nodes
            .get(index)
            .map_or(f32::NEG_INFINITY, |node| (*view_projection * *node.world_matrix()).w_axis.z)
    };

    let mut keyed: Vec<(f32, usize)> = order.iter().map(|&i| (depth(i), i)).collect();
    keyed.sort_by(|a, b| b.0.total_cmp(&a.0));

    for (slot, (_, index)) in order.iter_mut().zip(keyed) {
        *slot = index;
    }
}

#[cfg(test)]
mod tests {
    use glam::{Quat, Vec3};

    use super::*;
    use crate::scene::transform_system::compute_world_transforms;

    #[test]
    fn depth_sort_is_far_to_near_and_stable() {
        let at = |z: f32| Node::with_trs(Vec3::new(0.0, 0.0, z), Quat::IDENTITY, Vec3::ONE);
        let mut nodes = vec![at(1.0), at(5.0), at(1.0), at(3.0)];
        compute_world_transforms(&mut nodes, &[0, 1, 2, 3], Mat4::IDENTITY).unwrap();

        let mut order = vec![0, 1, 2, 3];
        depth_sort(&mut order, &nodes, &Mat4::IDENTITY);
        assert_eq!(order, vec![1, 3, 0, 2]);
    }
}
