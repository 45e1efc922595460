//! Scene graph nodes
//!
//! Nodes own their children through a first-child / next-sibling list and
//! refer back to their parent and graph weakly, so dropping the last outside
//! reference to a detached subtree frees it.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::foundation::math::{Box3, DMat4, DQuat, DVec3, Mat4, Transform};

use super::flags::{DirtyFlags, SceneContentFlags};
use super::graph::{GraphInner, SceneGraph};
use super::leaf::SceneGraphLeaf;

pub(crate) type NodeCell = RefCell<NodeData>;

/// Shared handle to a scene graph node.
///
/// Cloning the handle does not copy the node; equality is identity.
#[derive(Clone)]
pub struct SceneGraphNode(pub(crate) Rc<NodeCell>);

/// Non-owning node handle
#[derive(Clone, Default)]
pub struct WeakNode(Weak<NodeCell>);

pub(crate) struct NodeData {
    pub(crate) name: String,
    pub(crate) translation: DVec3,
    pub(crate) rotation: DQuat,
    pub(crate) scaling: DVec3,
    pub(crate) has_local_transform: bool,
    pub(crate) local_transform: DMat4,
    pub(crate) prev_local_transform: DMat4,
    pub(crate) global_transform: DMat4,
    pub(crate) prev_global_transform: DMat4,
    pub(crate) global_transform_float: Mat4,
    pub(crate) prev_global_transform_float: Mat4,
    pub(crate) global_bounding_box: Box3,
    pub(crate) dirty: DirtyFlags,
    pub(crate) leaf_content: SceneContentFlags,
    pub(crate) subgraph_content: SceneContentFlags,
    pub(crate) leaf: Option<SceneGraphLeaf>,
    pub(crate) parent: Weak<NodeCell>,
    pub(crate) first_child: Option<SceneGraphNode>,
    pub(crate) next_sibling: Option<SceneGraphNode>,
    pub(crate) graph: Weak<GraphInner>,
}

impl Default for NodeData {
    fn default() -> Self {
        let identity = Transform::identity();
        Self {
            name: String::new(),
            translation: identity.translation,
            rotation: identity.rotation,
            scaling: identity.scaling,
            has_local_transform: false,
            local_transform: DMat4::identity(),
            prev_local_transform: DMat4::identity(),
            global_transform: DMat4::identity(),
            prev_global_transform: DMat4::identity(),
            global_transform_float: Mat4::identity(),
            prev_global_transform_float: Mat4::identity(),
            global_bounding_box: Box3::empty(),
            dirty: DirtyFlags::empty(),
            leaf_content: SceneContentFlags::empty(),
            subgraph_content: SceneContentFlags::empty(),
            leaf: None,
            parent: Weak::new(),
            first_child: None,
            next_sibling: None,
            graph: Weak::new(),
        }
    }
}

impl NodeData {
    pub(crate) fn update_local_transform(&mut self) {
        self.local_transform = Transform {
            translation: self.translation,
            rotation: self.rotation,
            scaling: self.scaling,
        }
        .to_matrix();
    }
}

impl Drop for NodeData {
    // Unlinks descendants iteratively so deep or wide subtrees cannot
    // overflow the stack through recursive drops.
    fn drop(&mut self) {
        let mut pending: Vec<SceneGraphNode> = self.first_child.take().into_iter().collect();
        pending.extend(self.next_sibling.take());
        while let Some(node) = pending.pop() {
            if let Ok(cell) = Rc::try_unwrap(node.0) {
                let mut data = cell.into_inner();
                pending.extend(data.first_child.take());
                pending.extend(data.next_sibling.take());
            }
        }
    }
}

impl Default for SceneGraphNode {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for SceneGraphNode {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for SceneGraphNode {}

impl fmt::Debug for SceneGraphNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(data) => f.debug_struct("SceneGraphNode").field("name", &data.name).finish_non_exhaustive(),
            Err(_) => f.write_str("SceneGraphNode(<borrowed>)"),
        }
    }
}

impl fmt::Debug for WeakNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(node) => write!(f, "WeakNode({node:?})"),
            None => f.write_str("WeakNode(<dropped>)"),
        }
    }
}

impl WeakNode {
    /// Empty handle that never upgrades
    pub fn new() -> Self {
        Self::default()
    }

    /// The node, if it is still alive
    pub fn upgrade(&self) -> Option<SceneGraphNode> {
        self.0.upgrade().map(SceneGraphNode)
    }

    /// True if the node has been dropped (or was never set)
    pub fn is_expired(&self) -> bool {
        self.0.strong_count() == 0
    }

    /// True if this handle refers to `node`
    pub fn points_to(&self, node: &SceneGraphNode) -> bool {
        Weak::ptr_eq(&self.0, &Rc::downgrade(&node.0))
    }
}

/// Iterator over a node's children in list order
pub struct Children {
    next: Option<SceneGraphNode>,
}

impl Iterator for Children {
    type Item = SceneGraphNode;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        self.next = current.next_sibling();
        Some(current)
    }
}

impl SceneGraphNode {
    /// Unnamed node with an identity transform
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(NodeData::default())))
    }

    /// Node with a name
    pub fn named(name: impl Into<String>) -> Self {
        let node = Self::new();
        node.0.borrow_mut().name = name.into();
        node
    }

    pub(crate) fn data(&self) -> Ref<'_, NodeData> {
        self.0.borrow()
    }

    pub(crate) fn data_mut(&self) -> RefMut<'_, NodeData> {
        self.0.borrow_mut()
    }

    /// Identity comparison
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Non-owning handle to this node
    pub fn downgrade(&self) -> WeakNode {
        WeakNode(Rc::downgrade(&self.0))
    }

    /// Node name
    pub fn name(&self) -> String {
        self.data().name.clone()
    }

    /// Rename the node
    pub fn set_name(&self, name: impl Into<String>) {
        self.data_mut().name = name.into();
    }

    /// Local translation
    pub fn translation(&self) -> DVec3 {
        self.data().translation
    }

    /// Local rotation
    pub fn rotation(&self) -> DQuat {
        self.data().rotation
    }

    /// Local scaling
    pub fn scaling(&self) -> DVec3 {
        self.data().scaling
    }

    /// True once any TRS component has been set
    pub fn has_local_transform(&self) -> bool {
        self.data().has_local_transform
    }

    /// Local transform as of the last refresh
    pub fn local_transform(&self) -> DMat4 {
        self.data().local_transform
    }

    /// Local transform of the frame before the last refresh
    pub fn prev_local_transform(&self) -> DMat4 {
        self.data().prev_local_transform
    }

    /// Local-to-world transform as of the last refresh
    pub fn local_to_world_transform(&self) -> DMat4 {
        self.data().global_transform
    }

    /// Local-to-world transform of the previous frame
    pub fn prev_local_to_world_transform(&self) -> DMat4 {
        self.data().prev_global_transform
    }

    /// Single-precision local-to-world transform
    pub fn local_to_world_transform_float(&self) -> Mat4 {
        self.data().global_transform_float
    }

    /// Single-precision local-to-world transform of the previous frame
    pub fn prev_local_to_world_transform_float(&self) -> Mat4 {
        self.data().prev_global_transform_float
    }

    /// World-space bounds of the node's leaf and all descendants
    pub fn global_bounding_box(&self) -> Box3 {
        self.data().global_bounding_box
    }

    /// Pending dirty flags
    pub fn dirty_flags(&self) -> DirtyFlags {
        self.data().dirty
    }

    /// Content of this node's own leaf
    pub fn leaf_content(&self) -> SceneContentFlags {
        self.data().leaf_content
    }

    /// Content of the leaf and all descendants
    pub fn subgraph_content(&self) -> SceneContentFlags {
        self.data().subgraph_content
    }

    /// Attached leaf
    pub fn leaf(&self) -> Option<SceneGraphLeaf> {
        self.data().leaf.clone()
    }

    /// Parent node
    pub fn parent(&self) -> Option<Self> {
        self.data().parent.upgrade().map(Self)
    }

    /// First child
    pub fn first_child(&self) -> Option<Self> {
        self.data().first_child.clone()
    }

    /// Next sibling
    pub fn next_sibling(&self) -> Option<Self> {
        self.data().next_sibling.clone()
    }

    /// Iterate direct children
    pub fn children(&self) -> Children {
        Children {
            next: self.first_child(),
        }
    }

    /// Graph the node belongs to
    pub fn graph(&self) -> Option<SceneGraph> {
        self.data().graph.upgrade().map(SceneGraph)
    }

    pub(crate) fn set_graph(&self, graph: Weak<GraphInner>) {
        self.data_mut().graph = graph;
    }

    /// Slash-separated path from the top of the tree, e.g. `/car/wheel`.
    ///
    /// The topmost ancestor is the anchor `/` and does not contribute its
    /// name, so [`SceneGraph::find_node`] resolves the result from the root.
    pub fn path(&self) -> String {
        let mut names = Vec::new();
        let mut current = self.clone();
        while let Some(parent) = current.parent() {
            names.push(current.name());
            current = parent;
        }
        names.reverse();
        format!("/{}", names.join("/"))
    }

    /// Update any subset of translation, rotation and scaling.
    ///
    /// Marks the local transform dirty and flags every ancestor's subgraph as
    /// having transform changes.
    pub fn set_transform(&self, translation: Option<&DVec3>, rotation: Option<&DQuat>, scaling: Option<&DVec3>) {
        {
            let mut data = self.data_mut();
            if let Some(translation) = translation {
                data.translation = *translation;
            }
            if let Some(rotation) = rotation {
                data.rotation = *rotation;
            }
            if let Some(scaling) = scaling {
                data.scaling = *scaling;
            }
            data.dirty |= DirtyFlags::LOCAL_TRANSFORM;
            data.has_local_transform = true;
        }
        self.propagate_dirty_flags(DirtyFlags::SUBGRAPH_TRANSFORMS);
    }

    /// Set the local translation
    pub fn set_translation(&self, translation: &DVec3) {
        self.set_transform(Some(translation), None, None);
    }

    /// Set the local rotation
    pub fn set_rotation(&self, rotation: &DQuat) {
        self.set_transform(None, Some(rotation), None);
    }

    /// Set the local scaling
    pub fn set_scaling(&self, scaling: &DVec3) {
        self.set_transform(None, None, Some(scaling));
    }

    /// Replace the node's leaf.
    ///
    /// The previous leaf loses its node and is unregistered from the graph;
    /// the new one is registered if the node belongs to a graph.
    pub fn set_leaf(&self, leaf: Option<SceneGraphLeaf>) {
        let graph = self.graph();

        let previous = self.data_mut().leaf.take();
        if let Some(previous) = previous {
            previous.set_node(None);
            if let Some(graph) = &graph {
                graph.unregister_leaf(&previous);
            }
        }

        if let Some(leaf) = &leaf {
            let owner = leaf.node().filter(|owner| !owner.ptr_eq(self));
            debug_assert!(owner.is_none(), "leaf is already attached to another node");
            if let Some(owner) = owner {
                log::error!("Leaf is already attached to node '{}'", owner.name());
            }
            leaf.set_node(Some(self));
            if let Some(graph) = &graph {
                graph.register_leaf(leaf);
            }
        }

        {
            let mut data = self.data_mut();
            data.leaf = leaf;
            data.dirty |= DirtyFlags::LEAF;
        }
        self.propagate_dirty_flags(DirtyFlags::SUBGRAPH_STRUCTURE);
    }

    /// Reverse the child list in place
    pub fn reverse_children(&self) {
        let mut current = self.data_mut().first_child.take();
        let mut reversed: Option<Self> = None;
        while let Some(node) = current {
            current = std::mem::replace(&mut node.data_mut().next_sibling, reversed);
            reversed = Some(node);
        }
        self.data_mut().first_child = reversed;
    }

    /// OR `flags` into this node and every ancestor
    pub fn propagate_dirty_flags(&self, flags: DirtyFlags) {
        let mut current = Some(self.clone());
        while let Some(node) = current {
            let mut data = node.data_mut();
            data.dirty |= flags;
            current = data.parent.upgrade().map(Self);
        }
    }

    /// Request a content-flag recomputation for this branch, e.g. after a
    /// material's domain changed.
    pub fn invalidate_content(&self) {
        self.propagate_dirty_flags(DirtyFlags::SUBGRAPH_CONTENT_UPDATE);
    }

    /// Prepend `child` to this node's child list
    pub(crate) fn link_child(&self, child: &Self) {
        let previous_first = self.data_mut().first_child.replace(child.clone());
        let mut data = child.data_mut();
        data.next_sibling = previous_first;
        data.parent = Rc::downgrade(&self.0);
    }

    /// Remove this node from its parent's child list
    pub(crate) fn unlink_from_parent(&self) {
        let Some(parent) = self.parent() else {
            return;
        };
        let next = self.data_mut().next_sibling.take();
        self.data_mut().parent = Weak::new();

        let mut sibling = {
            let mut parent_data = parent.data_mut();
            if parent_data.first_child.as_ref().is_some_and(|first| first.ptr_eq(self)) {
                parent_data.first_child = next;
                return;
            }
            parent_data.first_child.clone()
        };
        while let Some(node) = sibling {
            let mut data = node.data_mut();
            if data.next_sibling.as_ref().is_some_and(|n| n.ptr_eq(self)) {
                data.next_sibling = next;
                return;
            }
            sibling = data.next_sibling.clone();
        }
        log::error!("Node '{}' was not found in its parent's child list", self.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn names(node: &SceneGraphNode) -> Vec<String> {
        node.children().map(|c| c.name()).collect()
    }

    #[test]
    fn test_link_prepends_and_reverse_restores_order() {
        let parent = SceneGraphNode::named("parent");
        for name in ["a", "b", "c"] {
            parent.link_child(&SceneGraphNode::named(name));
        }
        assert_eq!(names(&parent), ["c", "b", "a"]);

        parent.reverse_children();
        assert_eq!(names(&parent), ["a", "b", "c"]);
        assert!(parent.children().all(|c| c.parent().is_some_and(|p| p == parent)));
    }

    #[test]
    fn test_set_transform_marks_all_ancestors() {
        let root = SceneGraphNode::named("root");
        let middle = SceneGraphNode::named("middle");
        let leaf = SceneGraphNode::named("leaf");
        root.link_child(&middle);
        middle.link_child(&leaf);

        leaf.set_scaling(&DVec3::new(2.0, 2.0, 2.0));

        assert!(leaf.has_local_transform());
        assert!(leaf.dirty_flags().contains(DirtyFlags::LOCAL_TRANSFORM | DirtyFlags::SUBGRAPH_TRANSFORMS));
        assert!(middle.dirty_flags().contains(DirtyFlags::SUBGRAPH_TRANSFORMS));
        assert!(root.dirty_flags().contains(DirtyFlags::SUBGRAPH_TRANSFORMS));
        assert!(!root.dirty_flags().contains(DirtyFlags::LOCAL_TRANSFORM));
        assert_relative_eq!(leaf.translation(), DVec3::zeros());
    }

    #[test]
    fn test_unlink_middle_child() {
        let parent = SceneGraphNode::named("parent");
        let children: Vec<_> = ["a", "b", "c"].into_iter().map(SceneGraphNode::named).collect();
        for child in children.iter().rev() {
            parent.link_child(child);
        }

        children[1].unlink_from_parent();
        assert_eq!(names(&parent), ["a", "c"]);
        assert!(children[1].parent().is_none());
        assert!(children[1].next_sibling().is_none());

        children[0].unlink_from_parent();
        assert_eq!(names(&parent), ["c"]);
    }

    #[test]
    fn test_path_skips_topmost_name() {
        let root = SceneGraphNode::named("world");
        let car = SceneGraphNode::named("car");
        let wheel = SceneGraphNode::named("wheel");
        root.link_child(&car);
        car.link_child(&wheel);

        assert_eq!(wheel.path(), "/car/wheel");
        assert_eq!(root.path(), "/");
    }

    #[test]
    fn test_deep_chain_drops_without_recursion() {
        let root = SceneGraphNode::new();
        let mut tail = root.clone();
        for _ in 0..100_000 {
            let next = SceneGraphNode::new();
            tail.link_child(&next);
            tail = next;
        }
        drop(tail);
        drop(root);
    }

    #[test]
    fn test_weak_node_expires() {
        let node = SceneGraphNode::named("temp");
        let weak = node.downgrade();
        assert!(weak.points_to(&node));
        drop(node);
        assert!(weak.is_expired());
        assert!(weak.upgrade().is_none());
    }
}
