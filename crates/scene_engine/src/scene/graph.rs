//! The scene graph: root ownership, leaf registries and structural mutation
//!
//! Subtrees are never shared. Attaching a node that already lives in a graph
//! deep-copies it; attaching a free-standing node moves it in. Every leaf that
//! becomes reachable from the root is registered exactly once, and every leaf
//! that stops being reachable is unregistered.

use std::cell::{Ref, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::foundation::collections::ResourceTracker;

use super::flags::DirtyFlags;
use super::leaf::{LeafKind, SceneGraphLeaf};
use super::material::{Material, MaterialRef};
use super::mesh::{MeshInfo, MeshRef};
use super::node::{NodeCell, SceneGraphNode};
use super::walker::SceneGraphWalker;

/// Receives first-reference and last-release notifications for meshes and
/// materials, e.g. to create and destroy their GPU-side data.
///
/// Callbacks run after the graph has finished updating its registries, so
/// they may query the graph freely.
pub trait SceneGraphListener {
    /// A mesh became referenced by the graph
    fn on_mesh_added(&self, _mesh: &MeshRef) {}

    /// The last instance of a mesh left the graph
    fn on_mesh_removed(&self, _mesh: &MeshRef) {}

    /// A material became referenced by the graph
    fn on_material_added(&self, _material: &MaterialRef) {}

    /// The last geometry using a material left the graph
    fn on_material_removed(&self, _material: &MaterialRef) {}
}

enum RegistryEvent {
    MeshAdded(MeshRef),
    MeshRemoved(MeshRef),
    MaterialAdded(MaterialRef),
    MaterialRemoved(MaterialRef),
}

/// Resources and leaves reachable from the root, by kind
#[derive(Default)]
pub(crate) struct Registry {
    pub(crate) meshes: ResourceTracker<MeshInfo>,
    pub(crate) materials: ResourceTracker<RefCell<Material>>,
    pub(crate) mesh_instances: Vec<SceneGraphLeaf>,
    pub(crate) skinned_mesh_instances: Vec<SceneGraphLeaf>,
    pub(crate) cameras: Vec<SceneGraphLeaf>,
    pub(crate) lights: Vec<SceneGraphLeaf>,
    pub(crate) animations: Vec<SceneGraphLeaf>,
    pub(crate) geometry_count: usize,
    pub(crate) geometry_instances_count: usize,
}

fn remove_leaf(list: &mut Vec<SceneGraphLeaf>, leaf: &SceneGraphLeaf) {
    if let Some(position) = list.iter().position(|existing| existing.ptr_eq(leaf)) {
        list.remove(position);
    }
}

impl Registry {
    fn reference_mesh(&mut self, mesh: &MeshRef, events: &mut Vec<RegistryEvent>) {
        if self.meshes.add_ref(mesh) {
            self.geometry_count += mesh.geometries.len();
            events.push(RegistryEvent::MeshAdded(Rc::clone(mesh)));
        }

        for material in mesh.geometries.iter().filter_map(|geometry| geometry.material.as_ref()) {
            if self.materials.add_ref(material) {
                events.push(RegistryEvent::MaterialAdded(Rc::clone(material)));
            }
        }

        if let Some(prototype) = &mesh.skin_prototype {
            if self.meshes.add_ref(prototype) {
                self.geometry_count += prototype.geometries.len();
                events.push(RegistryEvent::MeshAdded(Rc::clone(prototype)));
            }
        }
    }

    fn release_mesh(&mut self, mesh: &MeshRef, events: &mut Vec<RegistryEvent>) {
        if self.meshes.release(mesh) {
            self.geometry_count = self.geometry_count.saturating_sub(mesh.geometries.len());
            events.push(RegistryEvent::MeshRemoved(Rc::clone(mesh)));
        }

        for material in mesh.geometries.iter().filter_map(|geometry| geometry.material.as_ref()) {
            if self.materials.release(material) {
                events.push(RegistryEvent::MaterialRemoved(Rc::clone(material)));
            }
        }

        if let Some(prototype) = &mesh.skin_prototype {
            if self.meshes.release(prototype) {
                self.geometry_count = self.geometry_count.saturating_sub(prototype.geometries.len());
                events.push(RegistryEvent::MeshRemoved(Rc::clone(prototype)));
            }
        }
    }

    fn register(&mut self, leaf: &SceneGraphLeaf) -> Vec<RegistryEvent> {
        let mut events = Vec::new();
        match &*leaf.kind() {
            LeafKind::MeshInstance(instance) => {
                self.reference_mesh(instance.mesh(), &mut events);
                self.mesh_instances.push(leaf.clone());
            }
            LeafKind::SkinnedMeshInstance(instance) => {
                self.reference_mesh(instance.mesh(), &mut events);
                self.mesh_instances.push(leaf.clone());
                self.skinned_mesh_instances.push(leaf.clone());
            }
            LeafKind::Camera(_) => self.cameras.push(leaf.clone()),
            LeafKind::Light(_) => self.lights.push(leaf.clone()),
            LeafKind::Animation(_) => self.animations.push(leaf.clone()),
            LeafKind::SkinnedMeshReference(_) => {}
        }
        events
    }

    fn unregister(&mut self, leaf: &SceneGraphLeaf) -> Vec<RegistryEvent> {
        let mut events = Vec::new();
        match &*leaf.kind() {
            LeafKind::MeshInstance(instance) => {
                self.release_mesh(instance.mesh(), &mut events);
                remove_leaf(&mut self.mesh_instances, leaf);
            }
            LeafKind::SkinnedMeshInstance(instance) => {
                self.release_mesh(instance.mesh(), &mut events);
                remove_leaf(&mut self.mesh_instances, leaf);
                remove_leaf(&mut self.skinned_mesh_instances, leaf);
            }
            LeafKind::Camera(_) => remove_leaf(&mut self.cameras, leaf),
            LeafKind::Light(_) => remove_leaf(&mut self.lights, leaf),
            LeafKind::Animation(_) => remove_leaf(&mut self.animations, leaf),
            LeafKind::SkinnedMeshReference(_) => {}
        }
        events
    }
}

pub(crate) struct GraphInner {
    pub(crate) root: RefCell<SceneGraphNode>,
    pub(crate) registry: RefCell<Registry>,
    listeners: RefCell<Vec<Rc<dyn SceneGraphListener>>>,
}

/// Shared handle to a scene graph.
///
/// The graph always has a root node. Nodes refer back to the graph weakly;
/// dropping the last handle leaves them free-standing.
#[derive(Clone)]
pub struct SceneGraph(pub(crate) Rc<GraphInner>);

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SceneGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.0.registry.borrow();
        f.debug_struct("SceneGraph")
            .field("meshes", &registry.meshes.len())
            .field("materials", &registry.materials.len())
            .field("mesh_instances", &registry.mesh_instances.len())
            .field("cameras", &registry.cameras.len())
            .field("lights", &registry.lights.len())
            .field("animations", &registry.animations.len())
            .finish_non_exhaustive()
    }
}

fn node_key(node: &SceneGraphNode) -> *const NodeCell {
    Rc::as_ptr(&node.0)
}

impl SceneGraph {
    /// Empty graph with an unnamed root
    pub fn new() -> Self {
        Self(Rc::new_cyclic(|graph: &Weak<GraphInner>| {
            let root = SceneGraphNode::new();
            root.set_graph(graph.clone());
            GraphInner {
                root: RefCell::new(root),
                registry: RefCell::new(Registry::default()),
                listeners: RefCell::new(Vec::new()),
            }
        }))
    }

    /// Identity comparison
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn weak(&self) -> Weak<GraphInner> {
        Rc::downgrade(&self.0)
    }

    /// Current root node
    pub fn root(&self) -> SceneGraphNode {
        self.0.root.borrow().clone()
    }

    /// Subscribe to mesh and material registry changes
    pub fn add_listener(&self, listener: Rc<dyn SceneGraphListener>) {
        self.0.listeners.borrow_mut().push(listener);
    }

    /// Replace the root. Returns the previous root, now detached.
    pub fn set_root_node(&self, root: &SceneGraphNode) -> SceneGraphNode {
        let previous = self.root();
        self.detach(&previous);
        self.attach(None, root);
        previous
    }

    /// Attach `child` under `parent`, or as the new root when `parent` is
    /// `None`, and return the node that ended up in the graph.
    ///
    /// A child that already belongs to a graph is deep-copied and the copy is
    /// returned; references between nodes of the copied subtree (animation
    /// targets, skin joints) are rewritten to the copies. A free-standing
    /// child is moved in as is. When neither side belongs to a graph the two
    /// nodes are simply linked.
    ///
    /// Returns `None` if `parent` belongs to a different graph.
    pub fn attach(&self, parent: Option<&SceneGraphNode>, child: &SceneGraphNode) -> Option<SceneGraphNode> {
        let parent_graph = match parent {
            Some(parent) => parent.graph(),
            None => Some(self.clone()),
        };
        let child_graph = child.graph();

        let Some(parent_graph) = parent_graph else {
            if child_graph.is_none() {
                if let Some(parent) = parent {
                    child.unlink_from_parent();
                    parent.link_child(child);
                }
                return Some(child.clone());
            }
            log::error!("Cannot attach a node that belongs to a graph under a free-standing parent");
            return None;
        };

        if !parent_graph.ptr_eq(self) {
            log::error!("Cannot attach under a node that belongs to a different graph");
            return None;
        }

        let previous_root = parent.is_none().then(|| self.root());

        let attached = if child_graph.is_some() {
            self.copy_subtree(parent, child)
        } else {
            self.move_subtree(parent, child)
        };

        if let Some(previous_root) = previous_root {
            if !previous_root.ptr_eq(&attached) {
                self.release_subtree(&previous_root);
            }
        }

        attached.propagate_dirty_flags(DirtyFlags::SUBGRAPH_STRUCTURE | (child.dirty_flags() & DirtyFlags::SUBGRAPH_MASK));

        Some(attached)
    }

    /// Wrap `leaf` into a new node and attach it under `parent`.
    ///
    /// A leaf that already has a node is cloned first.
    pub fn attach_leaf_node(&self, parent: Option<&SceneGraphNode>, leaf: &SceneGraphLeaf) -> Option<SceneGraphNode> {
        let node = SceneGraphNode::new();
        let leaf = if leaf.node().is_some() { leaf.clone_leaf() } else { leaf.clone() };
        node.set_leaf(Some(leaf));
        self.attach(parent, &node)
    }

    /// Remove `node` and its subtree from the graph and return it.
    ///
    /// Every leaf in the subtree is unregistered from the graph that owns it,
    /// even when called through another graph. Detaching the root leaves a
    /// fresh empty root in its place.
    pub fn detach(&self, node: &SceneGraphNode) -> SceneGraphNode {
        let owner = node.graph();
        if let Some(owner) = &owner {
            if !owner.ptr_eq(self) {
                log::warn!("Detaching node '{}' through a graph that does not own it", node.name());
            }
            owner.release_subtree(node);
        }

        if let Some(parent) = node.parent() {
            parent.propagate_dirty_flags(DirtyFlags::SUBGRAPH_STRUCTURE);
            node.unlink_from_parent();
        }

        if let Some(owner) = owner {
            if owner.root().ptr_eq(node) {
                let root = SceneGraphNode::new();
                root.set_graph(owner.weak());
                root.propagate_dirty_flags(DirtyFlags::SUBGRAPH_STRUCTURE);
                owner.0.root.replace(root);
            }
        }

        node.clone()
    }

    /// Resolve a `/`-separated path.
    ///
    /// Absolute paths start at the root; relative paths start at `context`
    /// and may use `..` to climb. Returns `None` for an empty path or if any
    /// component is missing.
    pub fn find_node(&self, path: &str, context: Option<&SceneGraphNode>) -> Option<SceneGraphNode> {
        if path.is_empty() {
            return None;
        }
        let start = if path.starts_with('/') { Some(self.root()) } else { context.cloned() };
        let Some(mut current) = start else {
            log::error!("Relative node queries without a context node are not supported");
            return None;
        };

        for component in path.split('/').filter(|component| !component.is_empty()) {
            current = if component == ".." {
                current.parent()?
            } else {
                current.children().find(|child| child.data().name == component)?
            };
        }

        Some(current)
    }

    /// Meshes referenced by at least one instance, in first-reference order
    pub fn meshes(&self) -> Vec<MeshRef> {
        self.0.registry.borrow().meshes.iter().cloned().collect()
    }

    /// Materials referenced by at least one geometry, in first-reference order
    pub fn materials(&self) -> Vec<MaterialRef> {
        self.0.registry.borrow().materials.iter().cloned().collect()
    }

    /// Static and skinned mesh instance leaves
    pub fn mesh_instances(&self) -> Vec<SceneGraphLeaf> {
        self.0.registry.borrow().mesh_instances.clone()
    }

    /// Skinned mesh instance leaves
    pub fn skinned_mesh_instances(&self) -> Vec<SceneGraphLeaf> {
        self.0.registry.borrow().skinned_mesh_instances.clone()
    }

    /// Camera leaves
    pub fn cameras(&self) -> Vec<SceneGraphLeaf> {
        self.0.registry.borrow().cameras.clone()
    }

    /// Light leaves
    pub fn lights(&self) -> Vec<SceneGraphLeaf> {
        self.0.registry.borrow().lights.clone()
    }

    /// Animation leaves
    pub fn animations(&self) -> Vec<SceneGraphLeaf> {
        self.0.registry.borrow().animations.clone()
    }

    pub(crate) fn registry(&self) -> Ref<'_, Registry> {
        self.0.registry.borrow()
    }

    /// Total geometries over all registered meshes
    pub fn geometry_count(&self) -> usize {
        self.registry().geometry_count
    }

    /// Total geometries over all mesh instances, as of the last structural refresh
    pub fn geometry_instances_count(&self) -> usize {
        self.registry().geometry_instances_count
    }

    /// True if nodes were attached or detached since the last refresh
    pub fn has_pending_structure_changes(&self) -> bool {
        self.root().dirty_flags().contains(DirtyFlags::SUBGRAPH_STRUCTURE)
    }

    /// True if any transform, current or previous, awaits a refresh
    pub fn has_pending_transform_changes(&self) -> bool {
        self.root()
            .dirty_flags()
            .intersects(DirtyFlags::SUBGRAPH_TRANSFORMS | DirtyFlags::SUBGRAPH_PREV_TRANSFORMS)
    }

    pub(crate) fn register_leaf(&self, leaf: &SceneGraphLeaf) {
        let events = self.0.registry.borrow_mut().register(leaf);
        self.dispatch(events);
    }

    pub(crate) fn unregister_leaf(&self, leaf: &SceneGraphLeaf) {
        let events = self.0.registry.borrow_mut().unregister(leaf);
        self.dispatch(events);
    }

    fn dispatch(&self, events: Vec<RegistryEvent>) {
        if events.is_empty() {
            return;
        }
        let listeners = self.0.listeners.borrow().clone();
        for event in &events {
            for listener in &listeners {
                match event {
                    RegistryEvent::MeshAdded(mesh) => listener.on_mesh_added(mesh),
                    RegistryEvent::MeshRemoved(mesh) => listener.on_mesh_removed(mesh),
                    RegistryEvent::MaterialAdded(material) => listener.on_material_added(material),
                    RegistryEvent::MaterialRemoved(material) => listener.on_material_removed(material),
                }
            }
        }
    }

    fn replace_root(&self, root: SceneGraphNode) {
        self.0.root.replace(root);
    }

    /// Clear graph back-references below `node` and unregister its leaves
    fn release_subtree(&self, node: &SceneGraphNode) {
        for current in node.subtree() {
            current.set_graph(Weak::new());
            if let Some(leaf) = current.leaf() {
                self.unregister_leaf(&leaf);
            }
        }
    }

    fn move_subtree(&self, parent: Option<&SceneGraphNode>, child: &SceneGraphNode) -> SceneGraphNode {
        child.unlink_from_parent();

        for current in child.subtree() {
            current.set_graph(self.weak());
            if let Some(leaf) = current.leaf() {
                self.register_leaf(&leaf);
            }
        }

        match parent {
            Some(parent) => parent.link_child(child),
            None => self.replace_root(child.clone()),
        }
        child.clone()
    }

    fn copy_subtree(&self, parent: Option<&SceneGraphNode>, child: &SceneGraphNode) -> SceneGraphNode {
        // Snapshot the walk first: the copies may land inside the source subtree.
        let mut sources = Vec::new();
        let mut walker = SceneGraphWalker::new(child);
        while let Some(node) = walker.get().cloned() {
            let delta = walker.next(true);
            sources.push((node, delta));
        }

        let mut node_map: HashMap<*const NodeCell, SceneGraphNode> = HashMap::with_capacity(sources.len());
        let mut current_parent = parent.cloned();
        let mut attached: Option<SceneGraphNode> = None;

        for (source, mut delta) in sources {
            let copy = SceneGraphNode::named(source.name());
            {
                let mut data = copy.data_mut();
                data.dirty = source.dirty_flags();
                data.graph = self.weak();
                if let Some(parent) = &current_parent {
                    data.parent = Rc::downgrade(&parent.0);
                }
            }

            if source.has_local_transform() {
                copy.set_transform(Some(&source.translation()), Some(&source.rotation()), Some(&source.scaling()));
            }

            if let Some(leaf) = source.leaf() {
                copy.set_leaf(Some(leaf.clone_leaf()));
            }

            match &current_parent {
                Some(parent) => parent.link_child(&copy),
                None => self.replace_root(copy.clone()),
            }

            node_map.insert(node_key(&source), copy.clone());
            if attached.is_none() {
                attached = Some(copy.clone());
            }

            if delta > 0 {
                current_parent = Some(copy);
            } else {
                // Children were prepended; restore their order when a level is done.
                while delta < 0 {
                    if let Some(finished) = current_parent.take() {
                        finished.reverse_children();
                        current_parent = finished.parent();
                    }
                    delta += 1;
                }
            }
        }

        let Some(attached) = attached else {
            return child.clone();
        };

        for node in attached.subtree() {
            let Some(leaf) = node.leaf() else {
                continue;
            };
            remap_leaf_references(&leaf, &node_map);
        }

        attached
    }
}

/// Point node references held by a freshly copied leaf at the copied nodes
fn remap_leaf_references(leaf: &SceneGraphLeaf, node_map: &HashMap<*const NodeCell, SceneGraphNode>) {
    let remap = |node: Option<SceneGraphNode>| node.and_then(|node| node_map.get(&node_key(&node)).cloned());

    if let Some(mut animation) = leaf.as_animation_mut() {
        for channel in animation.channels_mut() {
            if let Some(target) = remap(channel.target_node()) {
                channel.set_target_node(&target);
            }
        }
        return;
    }

    if let Some(mut skinned) = leaf.as_skinned_mesh_instance_mut() {
        for joint in &mut skinned.joints {
            if let Some(target) = remap(joint.node.upgrade()) {
                joint.node = target.downgrade();
            }
        }
        return;
    }

    let remapped_instance = leaf.as_skinned_mesh_reference().map(|reference| {
        let old_node = reference.instance().upgrade().and_then(|instance| instance.node());
        remap(old_node)
            .and_then(|node| node.leaf())
            .filter(|instance| instance.as_skinned_mesh_instance().is_some())
            .map(|instance| instance.downgrade())
            .unwrap_or_default()
    });
    if let (Some(instance), Some(mut reference)) = (remapped_instance, leaf.as_skinned_mesh_reference_mut()) {
        reference.instance = instance;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::DVec3;
    use crate::scene::light::Light;

    #[test]
    fn test_new_graph_has_root() {
        let graph = SceneGraph::new();
        let root = graph.root();
        assert!(root.graph().is_some_and(|g| g.ptr_eq(&graph)));
        assert!(!graph.has_pending_structure_changes());
    }

    #[test]
    fn test_find_node_absolute_and_relative() {
        let graph = SceneGraph::new();
        let car = graph.attach(Some(&graph.root()), &SceneGraphNode::named("car")).unwrap();
        let wheel = graph.attach(Some(&car), &SceneGraphNode::named("wheel")).unwrap();

        assert_eq!(graph.find_node("/car/wheel", None), Some(wheel.clone()));
        assert_eq!(graph.find_node("wheel", Some(&car)), Some(wheel.clone()));
        assert_eq!(graph.find_node("../wheel", Some(&wheel)), Some(wheel.clone()));
        assert_eq!(graph.find_node("//car///", None), Some(car));
        assert!(graph.find_node("/car/door", None).is_none());
        assert!(graph.find_node("wheel", None).is_none());
    }

    #[test]
    fn test_find_node_empty_path() {
        let graph = SceneGraph::new();
        let car = graph.attach(Some(&graph.root()), &SceneGraphNode::named("car")).unwrap();
        assert!(graph.find_node("", Some(&car)).is_none());
        assert!(graph.find_node("", None).is_none());
        assert_eq!(graph.find_node("/", None), Some(graph.root()));
    }

    #[test]
    fn test_detach_root_leaves_fresh_root() {
        let graph = SceneGraph::new();
        let old_root = graph.root();
        let lamp = graph.attach_leaf_node(Some(&old_root), &SceneGraphLeaf::light(Light::point())).unwrap();
        assert_eq!(graph.lights().len(), 1);

        let detached = graph.detach(&old_root);
        assert_eq!(detached, old_root);
        assert!(graph.lights().is_empty());
        assert!(lamp.graph().is_none());
        assert!(!graph.root().ptr_eq(&old_root));
        assert!(graph.root().graph().is_some());
    }

    #[test]
    fn test_free_standing_nodes_link_without_graph() {
        let graph = SceneGraph::new();
        let parent = SceneGraphNode::named("parent");
        let child = SceneGraphNode::named("child");
        let attached = graph.attach(Some(&parent), &child).unwrap();
        assert_eq!(attached, child);
        assert_eq!(child.parent(), Some(parent));
        assert!(child.graph().is_none());
    }

    #[test]
    fn test_set_root_node_returns_previous_root() {
        let graph = SceneGraph::new();
        let previous = graph.root();
        let scene = SceneGraphNode::named("scene");
        scene.set_translation(&DVec3::new(1.0, 0.0, 0.0));

        assert_eq!(graph.set_root_node(&scene), previous);
        assert_eq!(graph.root(), scene);
        assert!(previous.graph().is_none());
        assert!(graph.has_pending_structure_changes());
        assert!(graph.has_pending_transform_changes());
    }

    #[test]
    fn test_attach_under_foreign_graph_fails() {
        let first = SceneGraph::new();
        let second = SceneGraph::new();
        let orphan = SceneGraphNode::named("orphan");
        assert!(first.attach(Some(&second.root()), &orphan).is_none());
        assert!(orphan.graph().is_none());
        assert!(orphan.parent().is_none());
        assert_eq!(second.root().children().count(), 0);
    }

    #[test]
    fn test_detach_through_foreign_graph_releases_from_owner() {
        let first = SceneGraph::new();
        let second = SceneGraph::new();
        let lamp = second.attach_leaf_node(Some(&second.root()), &SceneGraphLeaf::light(Light::point())).unwrap();
        assert_eq!(second.lights().len(), 1);

        first.detach(&lamp);
        assert!(second.lights().is_empty());
        assert!(lamp.graph().is_none());
        assert!(lamp.parent().is_none());
        assert_eq!(second.root().children().count(), 0);
    }
}
