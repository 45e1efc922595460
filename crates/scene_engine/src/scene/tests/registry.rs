//! Mesh and material registries and their listeners

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::scene::{
    Material, MaterialRef, MeshInfo, MeshRef, SceneGraph, SceneGraphLeaf, SceneGraphListener, SceneGraphNode,
};

#[derive(Default)]
struct CountingListener {
    meshes_added: Cell<usize>,
    meshes_removed: Cell<usize>,
    materials_added: RefCell<Vec<String>>,
    materials_removed: RefCell<Vec<String>>,
}

impl SceneGraphListener for CountingListener {
    fn on_mesh_added(&self, _mesh: &MeshRef) {
        self.meshes_added.set(self.meshes_added.get() + 1);
    }

    fn on_mesh_removed(&self, _mesh: &MeshRef) {
        self.meshes_removed.set(self.meshes_removed.get() + 1);
    }

    fn on_material_added(&self, material: &MaterialRef) {
        self.materials_added.borrow_mut().push(material.borrow().name.clone());
    }

    fn on_material_removed(&self, material: &MaterialRef) {
        self.materials_removed.borrow_mut().push(material.borrow().name.clone());
    }
}

fn listening_graph() -> (SceneGraph, Rc<CountingListener>) {
    let graph = SceneGraph::new();
    let listener = Rc::new(CountingListener::default());
    graph.add_listener(listener.clone());
    (graph, listener)
}

#[test]
fn test_shared_mesh_fires_callbacks_once() {
    for detach_first_instance_first in [true, false] {
        let (graph, listener) = listening_graph();
        let mesh = MeshInfo::cube("crate", 1.0, None).into_ref();

        let a = graph.attach_leaf_node(Some(&graph.root()), &SceneGraphLeaf::mesh_instance(mesh.clone())).unwrap();
        assert_eq!(listener.meshes_added.get(), 1);
        let b = graph.attach_leaf_node(Some(&graph.root()), &SceneGraphLeaf::mesh_instance(mesh.clone())).unwrap();
        assert_eq!(listener.meshes_added.get(), 1);
        assert_eq!(graph.meshes().len(), 1);
        assert_eq!(graph.geometry_count(), 1);

        let (first, second) = if detach_first_instance_first { (a, b) } else { (b, a) };
        graph.detach(&first);
        assert_eq!(listener.meshes_removed.get(), 0);
        graph.detach(&second);
        assert_eq!(listener.meshes_removed.get(), 1);
        assert!(graph.meshes().is_empty());
        assert_eq!(graph.geometry_count(), 0);
    }
}

#[test]
fn test_materials_are_reference_counted_across_meshes() {
    let (graph, listener) = listening_graph();
    let paint = Material::new("paint").into_ref();
    let body = MeshInfo::cube("body", 1.0, Some(paint.clone())).into_ref();
    let door = MeshInfo::cube("door", 0.5, Some(paint.clone())).into_ref();

    let body_node = graph.attach_leaf_node(Some(&graph.root()), &SceneGraphLeaf::mesh_instance(body)).unwrap();
    let door_node = graph.attach_leaf_node(Some(&graph.root()), &SceneGraphLeaf::mesh_instance(door)).unwrap();
    assert_eq!(*listener.materials_added.borrow(), ["paint"]);
    assert_eq!(graph.materials().len(), 1);

    graph.detach(&body_node);
    assert!(listener.materials_removed.borrow().is_empty());
    graph.detach(&door_node);
    assert_eq!(*listener.materials_removed.borrow(), ["paint"]);
    assert!(graph.materials().is_empty());
}

#[test]
fn test_replacing_a_leaf_updates_registries() {
    let (graph, listener) = listening_graph();
    let node = graph.attach(Some(&graph.root()), &SceneGraphNode::named("slot")).unwrap();

    node.set_leaf(Some(SceneGraphLeaf::mesh_instance(MeshInfo::cube("first", 1.0, None).into_ref())));
    node.set_leaf(Some(SceneGraphLeaf::mesh_instance(MeshInfo::cube("second", 1.0, None).into_ref())));
    assert_eq!(listener.meshes_added.get(), 2);
    assert_eq!(listener.meshes_removed.get(), 1);
    assert_eq!(graph.meshes()[0].name, "second");

    node.set_leaf(None);
    assert!(graph.mesh_instances().is_empty());
    assert_eq!(listener.meshes_removed.get(), 2);
}

#[test]
fn test_material_ids_are_dense_after_refresh() {
    let graph = SceneGraph::new();
    let red = Material::new("red").into_ref();
    let blue = Material::new("blue").into_ref();
    let red_node = graph
        .attach_leaf_node(
            Some(&graph.root()),
            &SceneGraphLeaf::mesh_instance(MeshInfo::cube("a", 1.0, Some(red.clone())).into_ref()),
        )
        .unwrap();
    graph.attach_leaf_node(
        Some(&graph.root()),
        &SceneGraphLeaf::mesh_instance(MeshInfo::cube("b", 1.0, Some(blue.clone())).into_ref()),
    );
    graph.refresh(0);
    assert_eq!(red.borrow().material_id, 0);
    assert_eq!(blue.borrow().material_id, 1);

    graph.detach(&red_node);
    graph.refresh(1);
    assert_eq!(blue.borrow().material_id, 0);
}
