//! Per-frame propagation of transforms, bounds and content flags
//!
//! The pass walks only the dirty parts of the tree. Per-level state lives on
//! an explicit stack instead of the call stack, so arbitrarily deep graphs are
//! fine.

use crate::foundation::math::Box3;

use super::flags::{DirtyFlags, SceneContentFlags};
use super::graph::SceneGraph;
use super::node::SceneGraphNode;
use super::walker::SceneGraphWalker;

/// Flags inherited from the ancestors of the node being visited
#[derive(Debug, Clone, Copy, Default)]
struct RefreshContext {
    supergraph_transform_updated: bool,
    supergraph_content_update: bool,
}

struct VisitResult {
    transform_updated: bool,
    content_updated: bool,
    descend: bool,
}

fn to_index(index: usize) -> i32 {
    i32::try_from(index).unwrap_or(i32::MAX)
}

/// Merge a finished child into its parent
fn fold_into_parent(parent: &SceneGraphNode, child: &SceneGraphNode, mark_prev_transforms: bool) {
    let (bounds, dirty, content) = {
        let data = child.data();
        (data.global_bounding_box, data.dirty, data.subgraph_content)
    };

    let mut data = parent.data_mut();
    data.global_bounding_box = data.global_bounding_box.union(&bounds);
    if mark_prev_transforms && dirty.contains(DirtyFlags::PREV_TRANSFORM) {
        data.dirty |= DirtyFlags::SUBGRAPH_PREV_TRANSFORMS;
    }
    data.dirty |= dirty & DirtyFlags::SUBGRAPH_MASK;
    data.subgraph_content |= content;
}

fn visit(node: &SceneGraphNode, parent: Option<&SceneGraphNode>, context: RefreshContext, frame_index: u32) -> VisitResult {
    let parent_transform = parent.map(|parent| parent.data().global_transform);
    let mut data = node.data_mut();

    data.prev_local_transform = data.local_transform;
    data.prev_global_transform = data.global_transform;
    data.prev_global_transform_float = data.global_transform_float;

    let transform_updated = data.dirty.contains(DirtyFlags::LOCAL_TRANSFORM);
    let content_updated = data.dirty.contains(DirtyFlags::SUBGRAPH_CONTENT_UPDATE);

    if transform_updated {
        data.update_local_transform();
    }

    data.global_transform = match parent_transform {
        Some(parent_transform) if data.has_local_transform => parent_transform * data.local_transform,
        Some(parent_transform) => parent_transform,
        None => data.local_transform,
    };
    data.global_transform_float = data.global_transform.cast::<f32>();

    if data.dirty.intersects(DirtyFlags::SUBGRAPH_STRUCTURE | DirtyFlags::SUBGRAPH_TRANSFORMS)
        || context.supergraph_transform_updated
    {
        data.global_bounding_box = data
            .leaf
            .as_ref()
            .map_or_else(Box3::empty, |leaf| leaf.local_bounding_box().transformed(&data.global_transform));
    }

    if context.supergraph_content_update
        || data.dirty.intersects(DirtyFlags::SUBGRAPH_STRUCTURE | DirtyFlags::SUBGRAPH_CONTENT_UPDATE)
    {
        data.leaf_content = data
            .leaf
            .as_ref()
            .map_or(SceneContentFlags::empty(), |leaf| leaf.content_flags());
        data.subgraph_content = data.leaf_content;
    }

    // A moving joint schedules its skinned instance for this frame.
    if transform_updated {
        let instance = data
            .leaf
            .as_ref()
            .and_then(|leaf| leaf.as_skinned_mesh_reference().and_then(|reference| reference.instance().upgrade()));
        if let Some(mut skinned) = instance.as_ref().and_then(|instance| instance.as_skinned_mesh_instance_mut()) {
            skinned.last_update_frame_index = frame_index;
        };
    }

    VisitResult {
        transform_updated,
        content_updated,
        descend: data.dirty.intersects(DirtyFlags::SUBGRAPH_MASK)
            || context.supergraph_transform_updated
            || context.supergraph_content_update,
    }
}

impl SceneGraph {
    /// Bring world transforms, bounds and content flags up to date.
    ///
    /// Previous-frame transforms are snapshotted on every visited node. Nodes
    /// whose transform changed are visited again next frame so their previous
    /// transforms catch up. After structural changes, instance, geometry,
    /// mesh and material indices are reassigned densely in registry order.
    pub fn refresh(&self, frame_index: u32) {
        let structure_dirty = self.has_pending_structure_changes();

        let mut context = RefreshContext::default();
        let mut stack: Vec<RefreshContext> = Vec::new();

        let mut walker = SceneGraphWalker::new(&self.root());
        while let Some(current) = walker.get().cloned() {
            let mut parent = current.parent();

            let visited = visit(&current, parent.as_ref(), context, frame_index);
            let mut delta = walker.next(visited.descend);

            current.data_mut().dirty = if visited.transform_updated || context.supergraph_transform_updated {
                DirtyFlags::PREV_TRANSFORM
            } else {
                DirtyFlags::empty()
            };

            if delta > 0 {
                stack.push(context);
                context.supergraph_transform_updated |= visited.transform_updated;
                context.supergraph_content_update |= visited.content_updated;
                continue;
            }

            if let Some(parent) = &parent {
                fold_into_parent(parent, &current, true);
            }

            while delta < 0 {
                delta += 1;
                let Some(saved) = stack.pop() else {
                    context = RefreshContext::default();
                    continue;
                };
                if let Some(finished) = parent.take() {
                    parent = finished.parent();
                    if let Some(parent) = &parent {
                        fold_into_parent(parent, &finished, false);
                    }
                }
                context = saved;
            }
        }

        if structure_dirty {
            self.reassign_indices();
        }
    }

    fn reassign_indices(&self) {
        let mut registry = self.0.registry.borrow_mut();

        let mut geometry_instance_index = 0;
        for (instance_index, leaf) in registry.mesh_instances.iter().enumerate() {
            if let Some(mut instance) = leaf.as_mesh_instance_mut() {
                instance.instance_index = to_index(instance_index);
                instance.geometry_instance_index = to_index(geometry_instance_index);
                geometry_instance_index += instance.mesh().geometries.len();
            }
        }
        registry.geometry_instances_count = geometry_instance_index;

        let mut geometry_index = 0;
        for (mesh_index, mesh) in registry.meshes.iter().enumerate() {
            for geometry in &mesh.geometries {
                geometry.global_geometry_index.set(to_index(geometry_index));
                geometry_index += 1;
            }
            mesh.global_mesh_index.set(to_index(mesh_index));
        }
        debug_assert_eq!(registry.geometry_count, geometry_index);

        for (material_index, material) in registry.materials.iter().enumerate() {
            material.borrow_mut().material_id = to_index(material_index);
        }

        log::debug!(
            "Reassigned indices: {} instances, {} meshes, {} geometries, {} materials",
            registry.mesh_instances.len(),
            registry.meshes.len(),
            geometry_index,
            registry.materials.len()
        );
    }
}
