//! Skinned instances, joints and cross-graph copies

use super::add_node;
use crate::foundation::math::{DMat4, DVec3};
use crate::scene::{MeshInfo, MeshRef, SceneGraph, SceneGraphLeaf, SceneGraphNode, SkinnedMeshJoint};

struct Character {
    root: SceneGraphNode,
    hip: SceneGraphNode,
    knee: SceneGraphNode,
    body: SceneGraphLeaf,
}

/// character / { hip / knee, body }, with both joints bound to the body skin
fn build_character(prototype: &MeshRef) -> Character {
    let root = SceneGraphNode::named("character");
    let hip = SceneGraphNode::named("hip");
    let knee = SceneGraphNode::named("knee");
    hip.link_child(&knee);
    root.link_child(&hip);

    let body = SceneGraphLeaf::skinned_mesh_instance(prototype);
    if let Some(mut skinned) = body.as_skinned_mesh_instance_mut() {
        for joint in [&hip, &knee] {
            skinned.joints.push(SkinnedMeshJoint {
                node: joint.downgrade(),
                inverse_bind_matrix: DMat4::identity(),
            });
        }
    }
    for joint in [&hip, &knee] {
        joint.set_leaf(Some(SceneGraphLeaf::skinned_mesh_reference(&body)));
    }

    let body_node = SceneGraphNode::named("body");
    body_node.set_leaf(Some(body.clone()));
    root.link_child(&body_node);

    Character { root, hip, knee, body }
}

#[test]
fn test_skinned_instance_registers_prototype() {
    let prototype = MeshInfo::cube("skin", 1.0, None).into_ref();
    let graph = SceneGraph::new();
    let character = build_character(&prototype);
    graph.attach(Some(&graph.root()), &character.root);

    assert_eq!(graph.skinned_mesh_instances().len(), 1);
    assert_eq!(graph.mesh_instances().len(), 1);
    let meshes = graph.meshes();
    assert_eq!(meshes.len(), 2);
    assert!(meshes.iter().any(|mesh| std::rc::Rc::ptr_eq(mesh, &prototype)));
    assert_eq!(graph.geometry_count(), 2);

    graph.detach(&character.root);
    assert!(graph.skinned_mesh_instances().is_empty());
    assert!(graph.mesh_instances().is_empty());
    assert!(graph.meshes().is_empty());
}

#[test]
fn test_cross_graph_copy_rewrites_joints() {
    let prototype = MeshInfo::cube("skin", 1.0, None).into_ref();
    let source = SceneGraph::new();
    let character = build_character(&prototype);
    source.attach(Some(&source.root()), &character.root);

    let target = SceneGraph::new();
    let stage = add_node(&target, &target.root(), "stage");
    let copy = target.attach(Some(&stage), &character.root).unwrap();

    let hip = target.find_node("hip", Some(&copy)).unwrap();
    let knee = target.find_node("hip/knee", Some(&copy)).unwrap();
    let body = target.find_node("body", Some(&copy)).and_then(|node| node.leaf()).unwrap();
    assert!(!body.ptr_eq(&character.body));

    let skinned = body.as_skinned_mesh_instance().unwrap();
    assert!(skinned.joints[0].node.points_to(&hip));
    assert!(skinned.joints[1].node.points_to(&knee));
    assert!(std::rc::Rc::ptr_eq(skinned.prototype_mesh(), &prototype));
    assert!(!std::rc::Rc::ptr_eq(skinned.mesh(), character.body.mesh().as_ref().unwrap()));
    drop(skinned);

    for joint in [&hip, &knee] {
        let reference = joint.leaf().unwrap();
        let instance = reference.as_skinned_mesh_reference().and_then(|r| r.instance().upgrade());
        assert_eq!(instance, Some(body.clone()));
    }

    hip.set_translation(&DVec3::new(0.0, 3.0, 0.0));
    assert_eq!(character.hip.translation(), DVec3::zeros());
    assert!(!character.hip.has_local_transform());
    assert!(character.knee.leaf().is_some());
}

#[test]
fn test_moving_joint_stamps_instance_frame() {
    let prototype = MeshInfo::cube("skin", 1.0, None).into_ref();
    let graph = SceneGraph::new();
    let character = build_character(&prototype);
    graph.attach(Some(&graph.root()), &character.root);
    graph.refresh(1);

    let frame = || character.body.as_skinned_mesh_instance().map(|s| s.last_update_frame_index());
    assert_eq!(frame(), Some(0));

    character.knee.set_rotation(&crate::foundation::math::DQuat::from_axis_angle(&DVec3::x_axis(), 0.5));
    graph.refresh(7);
    assert_eq!(frame(), Some(7));

    graph.refresh(8);
    assert_eq!(frame(), Some(7));
}
