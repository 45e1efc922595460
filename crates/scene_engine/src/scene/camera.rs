//! Camera leaves

use serde_json::Value;

use crate::foundation::json::{read_f32, read_f32_into};
use crate::foundation::math::{affine_inverse, DMat4, DVec3, Vec4};

use super::leaf::SceneGraphLeaf;

/// Perspective projection parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerspectiveCamera {
    /// Near plane distance
    pub z_near: f32,
    /// Far plane distance; `None` means an infinite projection
    pub z_far: Option<f32>,
    /// Vertical field of view in radians
    pub vertical_fov: f32,
    /// Width over height; `None` follows the viewport
    pub aspect_ratio: Option<f32>,
}

impl Default for PerspectiveCamera {
    fn default() -> Self {
        Self {
            z_near: 1.0,
            z_far: None,
            vertical_fov: 1.0,
            aspect_ratio: None,
        }
    }
}

/// Orthographic projection parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrthographicCamera {
    /// Near plane distance
    pub z_near: f32,
    /// Far plane distance
    pub z_far: f32,
    /// Horizontal half-extent
    pub x_mag: f32,
    /// Vertical half-extent
    pub y_mag: f32,
}

impl Default for OrthographicCamera {
    fn default() -> Self {
        Self {
            z_near: 0.0,
            z_far: 1.0,
            x_mag: 1.0,
            y_mag: 1.0,
        }
    }
}

/// Camera attached to a node; the view looks down the node's -Z axis
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SceneCamera {
    /// Perspective projection
    Perspective(PerspectiveCamera),
    /// Orthographic projection
    Orthographic(OrthographicCamera),
}

impl SceneCamera {
    /// Type name used in scene files
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Perspective(_) => "PerspectiveCamera",
            Self::Orthographic(_) => "OrthographicCamera",
        }
    }

    /// Read parameters from a scene file node
    pub fn load(&mut self, node: &Value) {
        match self {
            Self::Perspective(camera) => {
                read_f32_into(node, "verticalFov", &mut camera.vertical_fov);
                read_f32_into(node, "zNear", &mut camera.z_near);
                if let Some(aspect_ratio) = read_f32(node, "aspectRatio") {
                    camera.aspect_ratio = Some(aspect_ratio);
                }
                if let Some(z_far) = read_f32(node, "zFar") {
                    camera.z_far = Some(z_far);
                }
            }
            Self::Orthographic(camera) => {
                read_f32_into(node, "xMag", &mut camera.x_mag);
                read_f32_into(node, "yMag", &mut camera.y_mag);
                read_f32_into(node, "zNear", &mut camera.z_near);
                read_f32_into(node, "zFar", &mut camera.z_far);
            }
        }
    }

    /// Write a named parameter from its `x` component
    pub fn set_property(&mut self, name: &str, value: &Vec4) -> bool {
        let x = value.x;
        match self {
            Self::Perspective(camera) => match name {
                "zNear" => camera.z_near = x,
                "zFar" => camera.z_far = Some(x),
                "verticalFov" => camera.vertical_fov = x,
                "aspectRatio" => camera.aspect_ratio = Some(x),
                _ => return false,
            },
            Self::Orthographic(camera) => match name {
                "zNear" => camera.z_near = x,
                "zFar" => camera.z_far = x,
                "xMag" => camera.x_mag = x,
                "yMag" => camera.y_mag = x,
                _ => return false,
            },
        }
        true
    }
}

fn flip_z() -> DMat4 {
    DMat4::new_nonuniform_scaling(&DVec3::new(1.0, 1.0, -1.0))
}

impl SceneGraphLeaf {
    /// View space (+Z forward) to world space, identity for unattached leaves
    pub fn view_to_world_matrix(&self) -> DMat4 {
        self.node()
            .map_or_else(DMat4::identity, |node| node.local_to_world_transform() * flip_z())
    }

    /// World space to view space (+Z forward), identity for unattached leaves
    pub fn world_to_view_matrix(&self) -> DMat4 {
        self.node().map_or_else(DMat4::identity, |node| {
            flip_z() * affine_inverse(&node.local_to_world_transform())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use serde_json::json;

    #[test]
    fn test_load_and_set_property() {
        let mut camera = SceneCamera::Perspective(PerspectiveCamera::default());
        camera.load(&json!({ "verticalFov": 0.5, "zFar": 100.0 }));
        assert!(camera.set_property("zNear", &Vec4::new(0.1, 0.0, 0.0, 0.0)));
        assert!(!camera.set_property("xMag", &Vec4::zeros()));

        let SceneCamera::Perspective(perspective) = camera else {
            panic!("camera changed kind");
        };
        assert_relative_eq!(perspective.vertical_fov, 0.5);
        assert_eq!(perspective.z_far, Some(100.0));
        assert_eq!(perspective.aspect_ratio, None);
        assert_relative_eq!(perspective.z_near, 0.1);
    }

    #[test]
    fn test_unattached_camera_matrices_are_identity() {
        let leaf = SceneGraphLeaf::camera(SceneCamera::Orthographic(OrthographicCamera::default()));
        assert_eq!(leaf.view_to_world_matrix(), DMat4::identity());
        assert_eq!(leaf.world_to_view_matrix(), DMat4::identity());
    }
}
