//! Light leaves
//!
//! Lights carry photometric parameters only. Their position and direction
//! come from the owning node, so placing a light means editing that node.

use serde_json::{Map, Value};

use crate::foundation::json::{read_f32_into, read_vec3_into, vec3_to_value};
use crate::foundation::math::{
    affine_inverse, affine_translation, rotation_from_direction, DMat4, DVec3, Matrix3, Point3, Transform,
    Vec3, Vec4,
};
use crate::render::gpu_types::{light_type, LightConstants};

use super::leaf::SceneGraphLeaf;

/// Light at infinity, such as the sun
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    /// Illuminance of lit surfaces, multiplied by the color
    pub irradiance: f32,
    /// Angular diameter of the source in degrees
    pub angular_size: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            irradiance: 1.0,
            angular_size: 0.0,
        }
    }
}

/// Omnidirectional light
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    /// Luminous intensity, multiplied by the color
    pub intensity: f32,
    /// Emitter radius in world units
    pub radius: f32,
    /// Influence range; zero means unbounded
    pub range: f32,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            intensity: 1.0,
            radius: 0.0,
            range: 0.0,
        }
    }
}

/// Cone light
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpotLight {
    /// Luminous intensity along the axis, multiplied by the color
    pub intensity: f32,
    /// Emitter radius in world units
    pub radius: f32,
    /// Influence range; zero means unbounded
    pub range: f32,
    /// Apex angle of the full-intensity cone in degrees
    pub inner_angle: f32,
    /// Apex angle of the lit cone in degrees
    pub outer_angle: f32,
}

impl Default for SpotLight {
    fn default() -> Self {
        Self {
            intensity: 1.0,
            radius: 0.0,
            range: 0.0,
            inner_angle: 180.0,
            outer_angle: 180.0,
        }
    }
}

/// Light type and its shape-specific parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightShape {
    /// See [`DirectionalLight`]
    Directional(DirectionalLight),
    /// See [`PointLight`]
    Point(PointLight),
    /// See [`SpotLight`]
    Spot(SpotLight),
}

/// A light leaf's parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Light {
    /// Linear color
    pub color: Vec3,
    /// Type-specific parameters
    pub shape: LightShape,
}

impl Light {
    /// White light of the given shape
    pub fn new(shape: LightShape) -> Self {
        Self {
            color: Vec3::new(1.0, 1.0, 1.0),
            shape,
        }
    }

    /// White directional light
    pub fn directional() -> Self {
        Self::new(LightShape::Directional(DirectionalLight::default()))
    }

    /// White point light
    pub fn point() -> Self {
        Self::new(LightShape::Point(PointLight::default()))
    }

    /// White spot light
    pub fn spot() -> Self {
        Self::new(LightShape::Spot(SpotLight::default()))
    }

    /// Type name used in scene files
    pub fn type_name(&self) -> &'static str {
        match self.shape {
            LightShape::Directional(_) => "DirectionalLight",
            LightShape::Point(_) => "PointLight",
            LightShape::Spot(_) => "SpotLight",
        }
    }

    /// Read parameters from a scene file node; missing keys keep their value
    pub fn load(&mut self, node: &Value) {
        read_vec3_into(node, "color", &mut self.color);
        match &mut self.shape {
            LightShape::Directional(light) => {
                read_f32_into(node, "irradiance", &mut light.irradiance);
                read_f32_into(node, "angularSize", &mut light.angular_size);
            }
            LightShape::Point(light) => {
                read_f32_into(node, "intensity", &mut light.intensity);
                read_f32_into(node, "radius", &mut light.radius);
                read_f32_into(node, "range", &mut light.range);
            }
            LightShape::Spot(light) => {
                read_f32_into(node, "intensity", &mut light.intensity);
                read_f32_into(node, "innerAngle", &mut light.inner_angle);
                read_f32_into(node, "outerAngle", &mut light.outer_angle);
                read_f32_into(node, "radius", &mut light.radius);
                read_f32_into(node, "range", &mut light.range);
            }
        }
    }

    /// Scene file node describing this light, including its `type`
    pub fn store(&self) -> Value {
        let mut node = Map::new();
        node.insert("type".into(), Value::from(self.type_name()));
        node.insert("color".into(), vec3_to_value(&self.color));
        let mut put = |key: &str, value: f32| {
            node.insert(key.into(), Value::from(f64::from(value)));
        };
        match self.shape {
            LightShape::Directional(light) => {
                put("irradiance", light.irradiance);
                put("angularSize", light.angular_size);
            }
            LightShape::Point(light) => {
                put("intensity", light.intensity);
                put("radius", light.radius);
                put("range", light.range);
            }
            LightShape::Spot(light) => {
                put("intensity", light.intensity);
                put("innerAngle", light.inner_angle);
                put("outerAngle", light.outer_angle);
                put("radius", light.radius);
                put("range", light.range);
            }
        }
        Value::Object(node)
    }

    /// Write a named parameter. `color` takes `xyz`, the rest take `x`.
    pub fn set_property(&mut self, name: &str, value: &Vec4) -> bool {
        if name == "color" {
            self.color = value.xyz();
            return true;
        }
        let x = value.x;
        match &mut self.shape {
            LightShape::Directional(light) => match name {
                "irradiance" => light.irradiance = x,
                "angularSize" => light.angular_size = x,
                _ => return false,
            },
            LightShape::Point(light) => match name {
                "intensity" => light.intensity = x,
                "radius" => light.radius = x,
                "range" => light.range = x,
                _ => return false,
            },
            LightShape::Spot(light) => match name {
                "intensity" => light.intensity = x,
                "radius" => light.radius = x,
                "range" => light.range = x,
                "innerAngle" => light.inner_angle = x,
                "outerAngle" => light.outer_angle = x,
                _ => return false,
            },
        }
        true
    }

    /// Shader constants for a light placed at `position` shining along `direction`
    pub fn fill_light_constants(&self, position: &DVec3, direction: &DVec3) -> LightConstants {
        let inv_range = |range: f32| if range <= 0.0 { 0.0 } else { 1.0 / range };
        let mut constants = LightConstants {
            color: self.color.into(),
            ..LightConstants::default()
        };
        match self.shape {
            LightShape::Directional(light) => {
                constants.light_type = light_type::DIRECTIONAL;
                constants.direction = direction.normalize().cast::<f32>().into();
                constants.angular_size_or_inv_range = light.angular_size.clamp(0.0, 90.0).to_radians();
                constants.intensity = light.irradiance;
            }
            LightShape::Point(light) => {
                constants.light_type = light_type::POINT;
                constants.position = position.cast::<f32>().into();
                constants.radius = light.radius;
                constants.angular_size_or_inv_range = inv_range(light.range);
                constants.intensity = light.intensity;
            }
            LightShape::Spot(light) => {
                constants.light_type = light_type::SPOT;
                constants.direction = direction.cast::<f32>().into();
                constants.position = position.cast::<f32>().into();
                constants.radius = light.radius;
                constants.angular_size_or_inv_range = inv_range(light.range);
                constants.intensity = light.intensity;
                constants.inner_angle = light.inner_angle.to_radians();
                constants.outer_angle = light.outer_angle.to_radians();
            }
        }
        constants
    }
}

impl SceneGraphLeaf {
    /// World-space position of the owning node, zero when unattached
    pub fn world_position(&self) -> DVec3 {
        self.node()
            .map_or_else(DVec3::zeros, |node| affine_translation(&node.local_to_world_transform()))
    }

    /// World-space -Z axis of the owning node, zero when unattached
    pub fn world_direction(&self) -> DVec3 {
        self.node().map_or_else(DVec3::zeros, |node| {
            let world = node.local_to_world_transform();
            -world.fixed_view::<3, 1>(0, 2).into_owned().normalize()
        })
    }

    /// Move the owning node so that its world position becomes `position`.
    ///
    /// Uses the parent's world transform from the last refresh.
    pub fn set_world_position(&self, position: &DVec3) {
        let node = self.node();
        debug_assert!(node.is_some(), "leaves must be attached to set their position");
        let Some(node) = node else {
            log::error!("Leaves must be attached in order to set their position");
            return;
        };
        let parent_to_world = node.parent().map_or_else(DMat4::identity, |p| p.local_to_world_transform());
        let local = affine_inverse(&parent_to_world).transform_point(&Point3::from(*position));
        node.set_translation(&local.coords);
    }

    /// Rotate the owning node so that its world -Z axis points along `direction`
    pub fn set_world_direction(&self, direction: &DVec3) {
        let node = self.node();
        debug_assert!(node.is_some(), "leaves must be attached to set their direction");
        let Some(node) = node else {
            log::error!("Leaves must be attached in order to set their direction");
            return;
        };
        let parent_linear = node.parent().map_or_else(Matrix3::identity, |p| {
            p.local_to_world_transform().fixed_view::<3, 3>(0, 0).into_owned()
        });
        let parent_inverse = parent_linear.try_inverse().unwrap_or_else(|| {
            log::warn!("Singular parent transform for node '{}'", node.name());
            Matrix3::identity()
        });
        let world_rotation = rotation_from_direction(direction).to_rotation_matrix().into_inner();
        let local = (parent_inverse * world_rotation).to_homogeneous();
        let decomposed = Transform::from_matrix(&local);
        node.set_transform(None, Some(&decomposed.rotation), Some(&decomposed.scaling));
    }

    /// Light constants for a light leaf, `None` for other leaves
    pub fn fill_light_constants(&self) -> Option<LightConstants> {
        let light = *self.as_light()?;
        Some(light.fill_light_constants(&self.world_position(), &self.world_direction()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use serde_json::json;

    #[test]
    fn test_store_then_load_preserves_parameters() {
        let mut spot = Light::spot();
        spot.color = Vec3::new(1.0, 0.5, 0.0);
        spot.set_property("outerAngle", &Vec4::new(45.0, 0.0, 0.0, 0.0));
        spot.set_property("range", &Vec4::new(20.0, 0.0, 0.0, 0.0));

        let stored = spot.store();
        assert_eq!(stored["type"], "SpotLight");

        let mut loaded = Light::spot();
        loaded.load(&stored);
        assert_eq!(loaded, spot);
    }

    #[test]
    fn test_unknown_property_is_rejected() {
        let mut light = Light::directional();
        assert!(!light.set_property("range", &Vec4::zeros()));
        assert!(light.set_property("color", &Vec4::new(0.0, 1.0, 0.0, 1.0)));
        assert_eq!(light.color, Vec3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn test_constants_convert_angles_and_range() {
        let mut sun = Light::directional();
        sun.load(&json!({ "angularSize": 120.0, "irradiance": 3.0 }));
        let constants = sun.fill_light_constants(&DVec3::zeros(), &DVec3::new(0.0, -2.0, 0.0));
        assert_eq!(constants.light_type, light_type::DIRECTIONAL);
        assert_relative_eq!(constants.angular_size_or_inv_range, std::f32::consts::FRAC_PI_2);
        assert_relative_eq!(constants.direction[1], -1.0);
        assert_relative_eq!(constants.intensity, 3.0);

        let mut point = Light::point();
        point.load(&json!({ "range": 4.0 }));
        let constants = point.fill_light_constants(&DVec3::new(1.0, 2.0, 3.0), &DVec3::zeros());
        assert_relative_eq!(constants.angular_size_or_inv_range, 0.25);
        assert_relative_eq!(constants.position[2], 3.0);

        let unbounded = Light::point().fill_light_constants(&DVec3::zeros(), &DVec3::zeros());
        assert_relative_eq!(unbounded.angular_size_or_inv_range, 0.0);
    }
}
