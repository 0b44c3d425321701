use crate::scene::node::Node;

/// An ordered list of root node indices.
///
/// Partitions produced by [`partition`](crate::scene::partition::partition)
/// are scenes too, with a flat filtered node list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scene {
    pub name: Option<String>,
    pub nodes: Vec<usize>,
}

impl Scene {
    #[must_use]
    pub fn new(nodes: Vec<usize>) -> Self {
        Self { name: None, nodes }
    }

    /// Every node reachable from the roots, flattened in pre-order.
    ///
    /// Indices that do not exist in `nodes` are kept in the output but their
    /// (missing) children are not visited.
    #[must_use]
    pub fn gather_nodes(&self, nodes: &[Node]) -> Vec<usize> {
        let mut out = Vec::with_capacity(nodes.len());
        let mut stack: Vec<usize> = self.nodes.iter().rev().copied().collect();

        while let Some(index) = stack.pop() {
            out.push(index);
            if let Some(node) = nodes.get(index) {
                stack.extend(node.children.iter().rev());
            }
        }
        out
    }

    /// Whether `target` is one of the roots or one of their descendants.
    #[must_use]
    pub fn includes_node(&self, nodes: &[Node], target: usize) -> bool {
        includes_node(nodes, &self.nodes, target)
    }
}

/// Depth-first search for `target` below (and including) `roots`.
#[must_use]
pub fn includes_node(nodes: &[Node], roots: &[usize], target: usize) -> bool {
    let mut stack: Vec<usize> = roots.to_vec();
    while let Some(index) = stack.pop() {
        if index == target {
            return true;
        }
        if let Some(node) = nodes.get(index) {
            stack.extend_from_slice(&node.children);
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> Vec<Node> {
        // 0 -> (1 -> 3), 2
        vec![
            Node::new().with_children(vec![1, 2]),
            Node::new().with_children(vec![3]),
            Node::new(),
            Node::new(),
        ]
    }

    #[test]
    fn gather_is_pre_order() {
        let scene = Scene::new(vec![0]);
        assert_eq!(scene.gather_nodes(&tree()), vec![0, 1, 3, 2]);
    }

    #[test]
    fn includes_descendants_only() {
        let nodes = tree();
        assert!(includes_node(&nodes, &[1], 3));
        assert!(!includes_node(&nodes, &[1], 2));
        assert!(Scene::new(vec![0]).includes_node(&nodes, 2));
    }
}
