//! Pre-order traversal cursor

use super::node::SceneGraphNode;

/// Restartable pre-order cursor over the subtree rooted at a scope node.
///
/// [`next`](Self::next) reports how the depth changed so callers can keep
/// their own per-level state without recursion.
#[derive(Debug, Clone)]
pub struct SceneGraphWalker {
    current: Option<SceneGraphNode>,
    scope: Option<SceneGraphNode>,
}

impl SceneGraphWalker {
    /// Walk the subtree rooted at `node`
    pub fn new(node: &SceneGraphNode) -> Self {
        Self {
            current: Some(node.clone()),
            scope: Some(node.clone()),
        }
    }

    /// Start at `node` and walk until leaving `scope`; with no scope the walk
    /// continues through the rest of the tree.
    pub fn with_scope(node: Option<&SceneGraphNode>, scope: Option<&SceneGraphNode>) -> Self {
        Self {
            current: node.cloned(),
            scope: scope.cloned(),
        }
    }

    /// Node under the cursor, `None` once the walk is finished
    pub fn get(&self) -> Option<&SceneGraphNode> {
        self.current.as_ref()
    }

    /// True while the cursor is on a node
    pub fn is_valid(&self) -> bool {
        self.current.is_some()
    }

    fn at_scope(&self, node: &SceneGraphNode) -> bool {
        self.scope.as_ref().is_some_and(|scope| scope.ptr_eq(node))
    }

    /// Advance in pre-order.
    ///
    /// Descends into the first child when `allow_children` is set. Returns
    /// `1` after descending, otherwise zero minus the number of levels climbed
    /// before a sibling was found or the scope was exhausted.
    pub fn next(&mut self, allow_children: bool) -> i32 {
        let Some(current) = self.current.take() else {
            return 0;
        };

        if allow_children {
            if let Some(child) = current.first_child() {
                self.current = Some(child);
                return 1;
            }
        }

        let mut depth = 0;
        let mut node = current;
        loop {
            if self.at_scope(&node) {
                return depth;
            }
            if let Some(sibling) = node.next_sibling() {
                self.current = Some(sibling);
                return depth;
            }
            match node.parent() {
                Some(parent) => {
                    node = parent;
                    depth -= 1;
                }
                None => return depth - 1,
            }
        }
    }

    /// Move to the parent. Returns `-1`, or `0` if the walk ended at the scope.
    pub fn up(&mut self) -> i32 {
        let Some(current) = self.current.take() else {
            return 0;
        };
        if self.at_scope(&current) {
            return 0;
        }
        self.current = current.parent();
        -1
    }
}

/// Pre-order iterator over a node and all of its descendants
#[derive(Debug, Clone)]
pub struct Subtree {
    walker: SceneGraphWalker,
}

impl Iterator for Subtree {
    type Item = SceneGraphNode;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.walker.get()?.clone();
        self.walker.next(true);
        Some(current)
    }
}

impl SceneGraphNode {
    /// Iterate this node and its descendants in pre-order
    pub fn subtree(&self) -> Subtree {
        Subtree {
            walker: SceneGraphWalker::new(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // root
    // ├── a
    // │   ├── a1
    // │   └── a2
    // └── b
    fn build() -> (SceneGraphNode, Vec<SceneGraphNode>) {
        let root = SceneGraphNode::named("root");
        let a = SceneGraphNode::named("a");
        let b = SceneGraphNode::named("b");
        let a1 = SceneGraphNode::named("a1");
        let a2 = SceneGraphNode::named("a2");
        root.link_child(&b);
        root.link_child(&a);
        a.link_child(&a2);
        a.link_child(&a1);
        (root.clone(), vec![root, a, a1, a2, b])
    }

    #[test]
    fn test_depth_deltas() {
        let (root, _nodes) = build();
        let mut walker = SceneGraphWalker::new(&root);
        let mut visits = Vec::new();
        while let Some(node) = walker.get().cloned() {
            let delta = walker.next(true);
            visits.push((node.name(), delta));
        }
        assert_eq!(
            visits,
            [
                ("root".to_string(), 1),
                ("a".to_string(), 1),
                ("a1".to_string(), 0),
                ("a2".to_string(), -1),
                ("b".to_string(), -1),
            ]
        );
    }

    #[test]
    fn test_skipping_children_stays_in_scope() {
        let (_root, nodes) = build();
        let a = &nodes[1];
        let mut walker = SceneGraphWalker::new(a);
        assert_eq!(walker.next(false), 0);
        assert!(!walker.is_valid());

        let names: Vec<String> = a.subtree().map(|n| n.name()).collect();
        assert_eq!(names, ["a", "a1", "a2"]);
    }

    #[test]
    fn test_up_stops_at_scope() {
        let (root, nodes) = build();
        let mut walker = SceneGraphWalker::with_scope(Some(&nodes[2]), Some(&root));
        assert_eq!(walker.up(), -1);
        assert_eq!(walker.get().map(SceneGraphNode::name).as_deref(), Some("a"));
        assert_eq!(walker.up(), -1);
        assert_eq!(walker.up(), 0);
        assert!(walker.get().is_none());

        let mut unscoped = SceneGraphWalker::with_scope(Some(&nodes[2]), None);
        let mut path = Vec::new();
        while let Some(node) = unscoped.get() {
            path.push(node.name());
            unscoped.up();
        }
        assert_eq!(path, ["a1", "a", "root"]);
    }
}
