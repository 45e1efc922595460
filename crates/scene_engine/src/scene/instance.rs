//! Mesh instance leaves

use std::rc::Rc;

use crate::foundation::math::{Box3, DMat4, Vec4};
use crate::render::backend::{BindingSetHandle, BufferHandle};

use super::flags::SceneContentFlags;
use super::leaf::WeakLeaf;
use super::material::MaterialDomain;
use super::mesh::{MeshInfo, MeshRef};
use super::node::WeakNode;

/// Draws a shared mesh at the owning node's transform
#[derive(Debug, Clone)]
pub struct MeshInstance {
    mesh: MeshRef,
    pub(crate) instance_index: i32,
    pub(crate) geometry_instance_index: i32,
}

impl MeshInstance {
    /// Instance of `mesh`
    pub fn new(mesh: MeshRef) -> Self {
        Self {
            mesh,
            instance_index: -1,
            geometry_instance_index: -1,
        }
    }

    /// Drawn mesh
    pub fn mesh(&self) -> &MeshRef {
        &self.mesh
    }

    /// Position among the graph's mesh instances, -1 until the first refresh
    pub fn instance_index(&self) -> i32 {
        self.instance_index
    }

    /// First slot of this instance in the geometry-instance space
    pub fn geometry_instance_index(&self) -> i32 {
        self.geometry_instance_index
    }

    pub(crate) fn local_bounding_box(&self) -> Box3 {
        self.mesh.object_space_bounds
    }

    pub(crate) fn content_flags(&self) -> SceneContentFlags {
        let mut flags = SceneContentFlags::empty();
        for material in self.mesh.geometries.iter().filter_map(|g| g.material.as_ref()) {
            flags |= match material.borrow().domain {
                MaterialDomain::Opaque => SceneContentFlags::OPAQUE_MESHES,
                MaterialDomain::AlphaTested => SceneContentFlags::ALPHA_TESTED_MESHES,
                _ => SceneContentFlags::BLENDED_MESHES,
            };
        }
        flags
    }

    /// Forwards to the material when the mesh has exactly one geometry
    pub(crate) fn set_property(&self, name: &str, value: &Vec4) -> bool {
        match self.mesh.geometries.as_slice() {
            [geometry] => geometry
                .material
                .as_ref()
                .is_some_and(|material| material.borrow_mut().set_property(name, value)),
            _ => false,
        }
    }
}

/// Binding of a skinned mesh to one skeleton node
#[derive(Debug, Clone)]
pub struct SkinnedMeshJoint {
    /// Joint node
    pub node: WeakNode,
    /// Mesh space to joint space in the bind pose
    pub inverse_bind_matrix: DMat4,
}

/// Mesh instance deformed by a skeleton.
///
/// Owns a private copy of the prototype mesh whose vertex buffer receives
/// the output of the skinning pass.
#[derive(Debug, Clone)]
pub struct SkinnedMeshInstance {
    pub(crate) base: MeshInstance,
    prototype_mesh: MeshRef,
    pub(crate) last_update_frame_index: u32,
    /// Skeleton joints, in the order the vertex joint indices refer to
    pub joints: Vec<SkinnedMeshJoint>,
    /// GPU joint matrix array
    pub joint_buffer: Option<BufferHandle>,
    /// Resources of the skinning dispatch
    pub skinning_binding_set: Option<BindingSetHandle>,
    /// False until the first skinning dispatch has run
    pub skinning_initialized: bool,
}

impl SkinnedMeshInstance {
    /// Instance skinned from `prototype`, with no joints yet
    pub fn new(prototype: &MeshRef) -> Self {
        Self {
            base: MeshInstance::new(MeshInfo::skinned_copy(prototype).into_ref()),
            prototype_mesh: Rc::clone(prototype),
            last_update_frame_index: 0,
            joints: Vec::new(),
            joint_buffer: None,
            skinning_binding_set: None,
            skinning_initialized: false,
        }
    }

    /// Mesh-instance view
    pub fn mesh_instance(&self) -> &MeshInstance {
        &self.base
    }

    /// Per-instance skinned mesh
    pub fn mesh(&self) -> &MeshRef {
        self.base.mesh()
    }

    /// Bind-pose mesh
    pub fn prototype_mesh(&self) -> &MeshRef {
        &self.prototype_mesh
    }

    /// Frame at which a joint last moved
    pub fn last_update_frame_index(&self) -> u32 {
        self.last_update_frame_index
    }

    /// Fresh instance of the same prototype sharing the joint list; GPU
    /// resources are not shared.
    pub(crate) fn duplicate(&self) -> Self {
        let mut copy = Self::new(&self.prototype_mesh);
        copy.joints.clone_from(&self.joints);
        copy
    }
}

/// Placed on joint nodes so that moving a joint schedules the instance for skinning
#[derive(Debug, Clone, Default)]
pub struct SkinnedMeshReference {
    pub(crate) instance: WeakLeaf,
}

impl SkinnedMeshReference {
    /// Reference to a skinned instance leaf
    pub fn new(instance: WeakLeaf) -> Self {
        Self { instance }
    }

    /// The referenced instance leaf
    pub fn instance(&self) -> &WeakLeaf {
        &self.instance
    }
}
