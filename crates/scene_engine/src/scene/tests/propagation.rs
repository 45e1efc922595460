//! Transform, bounds and content propagation across refreshes

use approx::assert_relative_eq;

use super::add_node;
use crate::foundation::math::{affine_translation, DQuat, DVec3, Vec3};
use crate::scene::{
    Material, MaterialDomain, MeshInfo, SceneContentFlags, SceneGraph, SceneGraphLeaf, SceneGraphNode,
};

#[test]
fn test_two_level_translation_chain() {
    let graph = SceneGraph::new();
    let root = graph.root();
    root.set_translation(&DVec3::new(1.0, 0.0, 0.0));
    let child = add_node(&graph, &root, "child");
    child.set_translation(&DVec3::new(0.0, 1.0, 0.0));

    graph.refresh(0);

    assert_relative_eq!(affine_translation(&child.local_to_world_transform()), DVec3::new(1.0, 1.0, 0.0));
    let float = child.local_to_world_transform_float();
    assert_relative_eq!(float[(0, 3)], 1.0);
    assert_relative_eq!(float[(1, 3)], 1.0);
}

#[test]
fn test_rotation_then_translation_order() {
    let graph = SceneGraph::new();
    let arm = add_node(&graph, &graph.root(), "arm");
    arm.set_transform(
        Some(&DVec3::new(0.0, 0.0, 5.0)),
        Some(&DQuat::from_axis_angle(&DVec3::z_axis(), std::f64::consts::FRAC_PI_2)),
        Some(&DVec3::new(2.0, 2.0, 2.0)),
    );
    let hand = add_node(&graph, &arm, "hand");
    hand.set_translation(&DVec3::new(1.0, 0.0, 0.0));

    graph.refresh(0);

    // Scaled by 2, rotated onto +Y, then offset by the arm's translation.
    assert_relative_eq!(
        affine_translation(&hand.local_to_world_transform()),
        DVec3::new(0.0, 2.0, 5.0),
        epsilon = 1e-9
    );
}

#[test]
fn test_second_refresh_keeps_bounds() {
    let graph = SceneGraph::new();
    let root = graph.root();
    let group = add_node(&graph, &root, "group");
    group.set_scaling(&DVec3::new(2.0, 1.0, 1.0));
    for (name, x) in [("left", -3.0), ("right", 4.0)] {
        let node = graph
            .attach_leaf_node(Some(&group), &SceneGraphLeaf::mesh_instance(MeshInfo::cube(name, 1.0, None).into_ref()))
            .unwrap();
        node.set_translation(&DVec3::new(x, 0.0, 0.0));
    }

    graph.refresh(0);
    let before: Vec<_> = root.subtree().map(|node| node.global_bounding_box()).collect();
    graph.refresh(1);
    let after: Vec<_> = root.subtree().map(|node| node.global_bounding_box()).collect();

    assert_eq!(before, after);
    assert_relative_eq!(root.global_bounding_box().min, Vec3::new(-8.0, -1.0, -1.0));
    assert_relative_eq!(root.global_bounding_box().max, Vec3::new(10.0, 1.0, 1.0));
}

#[test]
fn test_moving_a_branch_updates_descendant_bounds() {
    let graph = SceneGraph::new();
    let root = graph.root();
    let branch = add_node(&graph, &root, "branch");
    let item = graph
        .attach_leaf_node(Some(&branch), &SceneGraphLeaf::mesh_instance(MeshInfo::cube("item", 0.5, None).into_ref()))
        .unwrap();
    graph.refresh(0);
    assert_relative_eq!(item.global_bounding_box().center(), Vec3::zeros());

    branch.set_translation(&DVec3::new(0.0, 0.0, -7.0));
    graph.refresh(1);

    assert_relative_eq!(item.global_bounding_box().center(), Vec3::new(0.0, 0.0, -7.0));
    assert_relative_eq!(root.global_bounding_box().center(), Vec3::new(0.0, 0.0, -7.0));
    assert_relative_eq!(item.prev_local_to_world_transform(), SceneGraphNode::new().local_to_world_transform());
}

#[test]
fn test_content_flags_follow_invalidation() {
    let graph = SceneGraph::new();
    let root = graph.root();
    let glass = Material::new("glass").into_ref();
    let pane = graph
        .attach_leaf_node(
            Some(&root),
            &SceneGraphLeaf::mesh_instance(MeshInfo::cube("pane", 1.0, Some(glass.clone())).into_ref()),
        )
        .unwrap();
    graph.refresh(0);
    assert_eq!(root.subgraph_content(), SceneContentFlags::OPAQUE_MESHES);

    glass.borrow_mut().domain = MaterialDomain::AlphaBlended;
    graph.refresh(1);
    assert_eq!(root.subgraph_content(), SceneContentFlags::OPAQUE_MESHES);

    pane.invalidate_content();
    graph.refresh(2);
    assert_eq!(pane.leaf_content(), SceneContentFlags::BLENDED_MESHES);
    assert_eq!(root.subgraph_content(), SceneContentFlags::BLENDED_MESHES);
}
