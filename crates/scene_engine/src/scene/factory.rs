//! Construction hooks used by scene loading
//!
//! Applications that extend the built-in leaf types, or want their own
//! material defaults, implement [`SceneTypeFactory`] and hand it to the loader.

use super::camera::{OrthographicCamera, PerspectiveCamera, SceneCamera};
use super::leaf::SceneGraphLeaf;
use super::light::Light;
use super::material::Material;
use super::mesh::{MeshInfo, MeshRef};

/// Creates scene objects by type name
pub trait SceneTypeFactory {
    /// Leaf for a scene file `type` string, or `None` for unknown types
    fn create_leaf(&self, type_name: &str) -> Option<SceneGraphLeaf> {
        let leaf = match type_name {
            "DirectionalLight" => SceneGraphLeaf::light(Light::directional()),
            "PointLight" => SceneGraphLeaf::light(Light::point()),
            "SpotLight" => SceneGraphLeaf::light(Light::spot()),
            "PerspectiveCamera" => SceneGraphLeaf::camera(SceneCamera::Perspective(PerspectiveCamera::default())),
            "OrthographicCamera" => SceneGraphLeaf::camera(SceneCamera::Orthographic(OrthographicCamera::default())),
            _ => return None,
        };
        Some(leaf)
    }

    /// Fresh material with default parameters
    fn create_material(&self, name: &str) -> Material {
        Material::new(name)
    }

    /// Instance leaf for a mesh
    fn create_mesh_instance(&self, mesh: MeshRef) -> SceneGraphLeaf {
        SceneGraphLeaf::mesh_instance(mesh)
    }

    /// Empty mesh to be filled in by an importer
    fn create_mesh(&self, name: &str) -> MeshInfo {
        MeshInfo {
            name: name.to_owned(),
            ..MeshInfo::default()
        }
    }
}

/// Factory for the built-in types only
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultSceneTypeFactory;

impl SceneTypeFactory for DefaultSceneTypeFactory {}
