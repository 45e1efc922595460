//! Leaf payloads attached to scene graph nodes
//!
//! A leaf is a shared handle around one [`LeafKind`]. Leaves know their node
//! through a weak back-reference that the node maintains in
//! [`SceneGraphNode::set_leaf`].

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::{Rc, Weak};

use serde_json::Value;

use crate::foundation::math::{Box3, Vec4};

use super::animation::SceneGraphAnimation;
use super::camera::SceneCamera;
use super::flags::SceneContentFlags;
use super::instance::{MeshInstance, SkinnedMeshInstance, SkinnedMeshReference};
use super::light::Light;
use super::mesh::MeshRef;
use super::node::{NodeCell, SceneGraphNode};

/// The closed set of leaf types
#[derive(Debug, Clone)]
pub enum LeafKind {
    /// Static mesh
    MeshInstance(MeshInstance),
    /// Mesh deformed by joints
    SkinnedMeshInstance(SkinnedMeshInstance),
    /// Marker on joint nodes pointing at the skinned instance
    SkinnedMeshReference(SkinnedMeshReference),
    /// Camera
    Camera(SceneCamera),
    /// Light
    Light(Light),
    /// Animation
    Animation(SceneGraphAnimation),
}

impl LeafKind {
    /// Human-readable type name
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::MeshInstance(_) => "MeshInstance",
            Self::SkinnedMeshInstance(_) => "SkinnedMeshInstance",
            Self::SkinnedMeshReference(_) => "SkinnedMeshReference",
            Self::Camera(camera) => camera.type_name(),
            Self::Light(light) => light.type_name(),
            Self::Animation(_) => "SceneGraphAnimation",
        }
    }

    fn local_bounding_box(&self) -> Box3 {
        match self {
            Self::MeshInstance(instance) => instance.local_bounding_box(),
            Self::SkinnedMeshInstance(instance) => instance.mesh_instance().local_bounding_box(),
            _ => Box3::empty(),
        }
    }

    fn content_flags(&self) -> SceneContentFlags {
        match self {
            Self::MeshInstance(instance) => instance.content_flags(),
            Self::SkinnedMeshInstance(instance) => instance.mesh_instance().content_flags(),
            Self::SkinnedMeshReference(_) => SceneContentFlags::empty(),
            Self::Camera(_) => SceneContentFlags::CAMERAS,
            Self::Light(_) => SceneContentFlags::LIGHTS,
            Self::Animation(_) => SceneContentFlags::ANIMATIONS,
        }
    }

    fn set_property(&mut self, name: &str, value: &Vec4) -> bool {
        match self {
            Self::MeshInstance(instance) => instance.set_property(name, value),
            Self::SkinnedMeshInstance(instance) => instance.mesh_instance().set_property(name, value),
            Self::Camera(camera) => camera.set_property(name, value),
            Self::Light(light) => light.set_property(name, value),
            Self::SkinnedMeshReference(_) | Self::Animation(_) => false,
        }
    }

    fn load(&mut self, node: &Value) {
        match self {
            Self::Camera(camera) => camera.load(node),
            Self::Light(light) => light.load(node),
            _ => {}
        }
    }

    fn duplicate(&self) -> Self {
        match self {
            Self::MeshInstance(instance) => Self::MeshInstance(MeshInstance::new(Rc::clone(instance.mesh()))),
            Self::SkinnedMeshInstance(instance) => Self::SkinnedMeshInstance(instance.duplicate()),
            other => other.clone(),
        }
    }
}

pub(crate) struct LeafData {
    node: Weak<NodeCell>,
    kind: LeafKind,
}

/// Shared handle to a leaf; equality is identity
#[derive(Clone)]
pub struct SceneGraphLeaf(Rc<RefCell<LeafData>>);

/// Non-owning leaf handle
#[derive(Clone, Default)]
pub struct WeakLeaf(Weak<RefCell<LeafData>>);

impl WeakLeaf {
    /// The leaf, if it is still alive
    pub fn upgrade(&self) -> Option<SceneGraphLeaf> {
        self.0.upgrade().map(SceneGraphLeaf)
    }

    /// True if this handle refers to `leaf`
    pub fn points_to(&self, leaf: &SceneGraphLeaf) -> bool {
        Weak::ptr_eq(&self.0, &Rc::downgrade(&leaf.0))
    }
}

impl fmt::Debug for WeakLeaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.0.strong_count() > 0 { "WeakLeaf" } else { "WeakLeaf(<dropped>)" })
    }
}

impl PartialEq for SceneGraphLeaf {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for SceneGraphLeaf {}

impl fmt::Debug for SceneGraphLeaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(data) => write!(f, "SceneGraphLeaf({})", data.kind.type_name()),
            Err(_) => f.write_str("SceneGraphLeaf(<borrowed>)"),
        }
    }
}

macro_rules! leaf_accessors {
    ($variant:ident, $ty:ty, $get:ident, $get_mut:ident) => {
        #[doc = concat!("Borrow as [`", stringify!($ty), "`] if the leaf is one")]
        pub fn $get(&self) -> Option<Ref<'_, $ty>> {
            Ref::filter_map(self.0.borrow(), |data| match &data.kind {
                LeafKind::$variant(inner) => Some(inner),
                _ => None,
            })
            .ok()
        }

        #[doc = concat!("Mutably borrow as [`", stringify!($ty), "`] if the leaf is one")]
        pub fn $get_mut(&self) -> Option<RefMut<'_, $ty>> {
            RefMut::filter_map(self.0.borrow_mut(), |data| match &mut data.kind {
                LeafKind::$variant(inner) => Some(inner),
                _ => None,
            })
            .ok()
        }
    };
}

impl SceneGraphLeaf {
    /// Wrap a payload into an unattached leaf
    pub fn new(kind: LeafKind) -> Self {
        Self(Rc::new(RefCell::new(LeafData {
            node: Weak::new(),
            kind,
        })))
    }

    /// Instance of a static mesh
    pub fn mesh_instance(mesh: MeshRef) -> Self {
        Self::new(LeafKind::MeshInstance(MeshInstance::new(mesh)))
    }

    /// Skinned instance of `prototype` with no joints yet
    pub fn skinned_mesh_instance(prototype: &MeshRef) -> Self {
        Self::new(LeafKind::SkinnedMeshInstance(SkinnedMeshInstance::new(prototype)))
    }

    /// Joint-node marker for a skinned instance leaf
    pub fn skinned_mesh_reference(instance: &Self) -> Self {
        Self::new(LeafKind::SkinnedMeshReference(SkinnedMeshReference::new(instance.downgrade())))
    }

    /// Camera leaf
    pub fn camera(camera: SceneCamera) -> Self {
        Self::new(LeafKind::Camera(camera))
    }

    /// Light leaf
    pub fn light(light: Light) -> Self {
        Self::new(LeafKind::Light(light))
    }

    /// Animation leaf
    pub fn animation(animation: SceneGraphAnimation) -> Self {
        Self::new(LeafKind::Animation(animation))
    }

    /// Identity comparison
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Non-owning handle
    pub fn downgrade(&self) -> WeakLeaf {
        WeakLeaf(Rc::downgrade(&self.0))
    }

    /// Borrow the payload
    pub fn kind(&self) -> Ref<'_, LeafKind> {
        Ref::map(self.0.borrow(), |data| &data.kind)
    }

    /// Mutably borrow the payload
    pub fn kind_mut(&self) -> RefMut<'_, LeafKind> {
        RefMut::map(self.0.borrow_mut(), |data| &mut data.kind)
    }

    /// Human-readable type name
    pub fn type_name(&self) -> &'static str {
        self.kind().type_name()
    }

    leaf_accessors!(SkinnedMeshInstance, SkinnedMeshInstance, as_skinned_mesh_instance, as_skinned_mesh_instance_mut);
    leaf_accessors!(SkinnedMeshReference, SkinnedMeshReference, as_skinned_mesh_reference, as_skinned_mesh_reference_mut);
    leaf_accessors!(Camera, SceneCamera, as_camera, as_camera_mut);
    leaf_accessors!(Light, Light, as_light, as_light_mut);
    leaf_accessors!(Animation, SceneGraphAnimation, as_animation, as_animation_mut);

    /// Borrow the mesh-instance part of static and skinned instances
    pub fn as_mesh_instance(&self) -> Option<Ref<'_, MeshInstance>> {
        Ref::filter_map(self.0.borrow(), |data| match &data.kind {
            LeafKind::MeshInstance(instance) => Some(instance),
            LeafKind::SkinnedMeshInstance(instance) => Some(&instance.base),
            _ => None,
        })
        .ok()
    }

    pub(crate) fn as_mesh_instance_mut(&self) -> Option<RefMut<'_, MeshInstance>> {
        RefMut::filter_map(self.0.borrow_mut(), |data| match &mut data.kind {
            LeafKind::MeshInstance(instance) => Some(instance),
            LeafKind::SkinnedMeshInstance(instance) => Some(&mut instance.base),
            _ => None,
        })
        .ok()
    }

    /// Drawn mesh of static and skinned instances
    pub fn mesh(&self) -> Option<MeshRef> {
        self.as_mesh_instance().map(|instance| Rc::clone(instance.mesh()))
    }

    /// Owning node
    pub fn node(&self) -> Option<SceneGraphNode> {
        self.0.borrow().node.upgrade().map(SceneGraphNode)
    }

    pub(crate) fn set_node(&self, node: Option<&SceneGraphNode>) {
        self.0.borrow_mut().node = node.map_or_else(Weak::new, |node| Rc::downgrade(&node.0));
    }

    /// Name of the owning node, empty when unattached
    pub fn name(&self) -> String {
        self.node().map(|node| node.name()).unwrap_or_default()
    }

    /// Rename the owning node
    pub fn set_name(&self, name: impl Into<String>) {
        let node = self.node();
        debug_assert!(node.is_some(), "set_name called on a leaf without a node");
        match node {
            Some(node) => node.set_name(name),
            None => log::error!("Cannot name a leaf that is not attached to a node"),
        }
    }

    /// Bounds in the node's local space; empty for leaves without geometry
    pub fn local_bounding_box(&self) -> Box3 {
        self.kind().local_bounding_box()
    }

    /// Content classification of this leaf
    pub fn content_flags(&self) -> SceneContentFlags {
        self.kind().content_flags()
    }

    /// Unattached copy. Mesh instances share the mesh, skinned instances get
    /// their own skinned mesh and keep the joint list, references keep
    /// pointing at the same instance.
    #[must_use]
    pub fn clone_leaf(&self) -> Self {
        Self::new(self.kind().duplicate())
    }

    /// Write a named property; false if the leaf has no such property
    pub fn set_property(&self, name: &str, value: &Vec4) -> bool {
        self.kind_mut().set_property(name, value)
    }

    /// Read type-specific parameters from a scene file node
    pub fn load(&self, node: &Value) {
        self.kind_mut().load(node);
    }

    /// Apply an animation leaf at `time`; false for other leaves
    pub fn apply_animation(&self, time: f32) -> bool {
        // Channels may target this leaf's own node, so apply a detached copy.
        let animation = self.as_animation().map(|animation| SceneGraphAnimation::clone(&animation));
        animation.is_some_and(|animation| animation.apply(time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::camera::PerspectiveCamera;
    use crate::scene::material::{Material, MaterialDomain};
    use crate::scene::mesh::MeshInfo;

    #[test]
    fn test_mesh_content_follows_material_domains() {
        let blended = Material {
            domain: MaterialDomain::TransmissiveAlphaBlended,
            ..Material::new("glass")
        };
        let mesh = MeshInfo::cube("box", 1.0, Some(blended.into_ref())).into_ref();
        let leaf = SceneGraphLeaf::mesh_instance(mesh);
        assert_eq!(leaf.content_flags(), SceneContentFlags::BLENDED_MESHES);
        assert!(!leaf.local_bounding_box().is_empty());

        let camera = SceneGraphLeaf::camera(SceneCamera::Perspective(PerspectiveCamera::default()));
        assert_eq!(camera.content_flags(), SceneContentFlags::CAMERAS);
        assert!(camera.local_bounding_box().is_empty());
    }

    #[test]
    fn test_clone_shares_mesh_but_not_skinned_mesh() {
        let mesh = MeshInfo::cube("box", 1.0, None).into_ref();
        let leaf = SceneGraphLeaf::mesh_instance(Rc::clone(&mesh));
        let copy = leaf.clone_leaf();
        assert!(!copy.ptr_eq(&leaf));
        assert!(copy.mesh().is_some_and(|m| Rc::ptr_eq(&m, &mesh)));

        let skinned = SceneGraphLeaf::skinned_mesh_instance(&mesh);
        let skinned_copy = skinned.clone_leaf();
        let (a, b) = (skinned.mesh().unwrap(), skinned_copy.mesh().unwrap());
        assert!(!Rc::ptr_eq(&a, &b));
        assert!(b.skin_prototype.as_ref().is_some_and(|p| Rc::ptr_eq(p, &mesh)));
    }

    #[test]
    fn test_mesh_instance_forwards_properties_to_single_material() {
        let material = Material::new("paint").into_ref();
        let mesh = MeshInfo::cube("box", 1.0, Some(Rc::clone(&material))).into_ref();
        let leaf = SceneGraphLeaf::mesh_instance(mesh);
        assert!(leaf.set_property("metalness", &Vec4::new(1.0, 0.0, 0.0, 0.0)));
        assert!((material.borrow().metalness - 1.0).abs() < f32::EPSILON);
        assert!(!leaf.set_property("unknown", &Vec4::zeros()));
    }

    #[test]
    fn test_unattached_leaf_has_no_name() {
        let leaf = SceneGraphLeaf::light(Light::point());
        assert!(leaf.node().is_none());
        assert_eq!(leaf.name(), "");
        assert_eq!(leaf.type_name(), "PointLight");
    }
}
