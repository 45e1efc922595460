//! Scenario tests exercising the graph as a whole

mod propagation;
mod registry;
mod skinning;

use super::{SceneGraph, SceneGraphNode};

/// Attach a named empty node under `parent`
fn add_node(graph: &SceneGraph, parent: &SceneGraphNode, name: &str) -> SceneGraphNode {
    graph
        .attach(Some(parent), &SceneGraphNode::named(name))
        .expect("parent belongs to the graph")
}

/// Check parent/child consistency for every node below `root`
fn assert_tree_invariant(root: &SceneGraphNode) {
    for node in root.subtree() {
        if let Some(parent) = node.parent() {
            let occurrences = parent.children().filter(|child| child.ptr_eq(&node)).count();
            assert_eq!(occurrences, 1, "node '{}' listed {} times by its parent", node.name(), occurrences);
        }

        let mut steps = 0;
        let mut current = node.clone();
        while let Some(parent) = current.parent() {
            current = parent;
            steps += 1;
            assert!(steps < 10_000, "parent chain of '{}' does not terminate", node.name());
        }
        assert!(current.ptr_eq(root), "node '{}' does not reach the root", node.name());
    }
}
