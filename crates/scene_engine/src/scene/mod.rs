//! Scene graph
//!
//! A tree of [`SceneGraphNode`]s, each carrying an optional TRS transform and
//! at most one [`SceneGraphLeaf`] (mesh instance, camera, light, animation or
//! skinning joint marker). The [`SceneGraph`] owns the root, keeps registries
//! of everything reachable from it, and brings world transforms, bounds and
//! content flags up to date in [`SceneGraph::refresh`].
//!
//! Mutation and traversal are single-threaded; handles are `Rc`-based.

pub mod animation;
pub mod camera;
pub mod factory;
pub mod flags;
pub mod graph;
pub mod instance;
pub mod leaf;
pub mod light;
pub mod material;
pub mod mesh;
pub mod node;
pub mod print;
mod refresh;
pub mod walker;

#[cfg(test)]
mod tests;

pub use animation::{AnimationAttribute, SceneGraphAnimation, SceneGraphAnimationChannel};
pub use camera::{OrthographicCamera, PerspectiveCamera, SceneCamera};
pub use factory::{DefaultSceneTypeFactory, SceneTypeFactory};
pub use flags::{DirtyFlags, SceneContentFlags};
pub use graph::{SceneGraph, SceneGraphListener};
pub use instance::{MeshInstance, SkinnedMeshInstance, SkinnedMeshJoint, SkinnedMeshReference};
pub use leaf::{LeafKind, SceneGraphLeaf, WeakLeaf};
pub use light::{DirectionalLight, Light, LightShape, PointLight, SpotLight};
pub use material::{Material, MaterialDomain, MaterialFlags, MaterialRef, MaterialTexture};
pub use mesh::{BufferGroup, BufferGroupRef, BufferRange, MeshGeometry, MeshInfo, MeshRef, VertexAttribute};
pub use node::{SceneGraphNode, WeakNode};
pub use print::{describe_scene_graph, print_scene_graph};
pub use walker::{SceneGraphWalker, Subtree};
