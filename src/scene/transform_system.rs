//! Transform System
//!
//! Updates the world matrices of a scene hierarchy. Kept separate from
//! [`Document`](crate::document::Document) so it only borrows the node table
//! and the root list, which lets callers hold other document fields at the
//! same time.
//!
//! The traversal is iterative (explicit stack) so deep hierarchies cannot
//! overflow the call stack. Each node recomposes its local matrix only when
//! its TRS changed, and recomputes its world matrix only when the local
//! matrix or the incoming parent world matrix changed.

use glam::Mat4;

use crate::errors::{KilnError, Result};
use crate::scene::node::Node;

/// Recomputes world, inverse-world and normal matrices for every node
/// reachable from `roots`, in pre-order.
///
/// `world(node) = world(parent) * local(node)`, seeded with `root_transform`
/// for the roots.
///
/// # Errors
/// Returns [`KilnError::IndexOutOfBounds`](crate::errors::KilnError::IndexOutOfBounds)
/// if a root or child index does not exist.
pub fn compute_world_transforms(
    nodes: &mut [Node],
    roots: &[usize],
    root_transform: Mat4,
) -> Result<()> {
    // Work stack: (node index, parent world matrix)
    let mut stack: Vec<(usize, Mat4)> = Vec::with_capacity(64);

    for &root in roots.iter().rev() {
        stack.push((root, root_transform));
    }

    while let Some((index, parent_world)) = stack.pop() {
        let Some(node) = nodes.get_mut(index) else {
            return Err(KilnError::out_of_bounds("scene node", index));
        };

        let local_changed = node.transform.update_local_matrix();
        let parent_changed = node.transform.parent_world != parent_world;

        if local_changed || parent_changed {
            let world = parent_world * *node.transform.local_matrix();
            node.transform.set_world_matrix(parent_world, world);
        }

        let world = *node.transform.world_matrix();
        for &child in node.children.iter().rev() {
            stack.push((child, world));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use glam::{Quat, Vec3};

    use super::*;

    #[test]
    fn unchanged_static_nodes_keep_their_world_matrix() {
        let mut nodes = vec![
            Node::with_trs(Vec3::X, Quat::IDENTITY, Vec3::ONE).with_children(vec![1]),
            Node::with_trs(Vec3::Y, Quat::IDENTITY, Vec3::ONE),
        ];
        compute_world_transforms(&mut nodes, &[0], Mat4::IDENTITY).unwrap();
        assert!(!nodes[1].transform.is_dirty());

        let before = *nodes[1].world_matrix();
        compute_world_transforms(&mut nodes, &[0], Mat4::IDENTITY).unwrap();
        assert_eq!(before, *nodes[1].world_matrix());
    }

    #[test]
    fn root_transform_change_propagates() {
        let mut nodes = vec![Node::new().with_children(vec![1]), Node::new()];
        compute_world_transforms(&mut nodes, &[0], Mat4::IDENTITY).unwrap();

        let shift = Mat4::from_translation(Vec3::Z * 5.0);
        compute_world_transforms(&mut nodes, &[0], shift).unwrap();
        assert_eq!(nodes[1].world_matrix().w_axis.z, 5.0);
    }

    #[test]
    fn bad_child_index_is_an_error() {
        let mut nodes = vec![Node::new().with_children(vec![7])];
        assert!(compute_world_transforms(&mut nodes, &[0], Mat4::IDENTITY).is_err());
    }
}
