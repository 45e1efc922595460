//! Typed reads from loosely structured JSON documents
//!
//! Missing keys and mistyped values read as `None`; callers keep their
//! current value in that case.

use serde_json::Value;

use super::math::{DQuat, DVec3, Quaternion, Vec3};

/// Read a number
pub fn read_f32(node: &Value, key: &str) -> Option<f32> {
    node.get(key)?.as_f64().map(|v| v as f32)
}

/// Read a number into `target` if present
pub fn read_f32_into(node: &Value, key: &str, target: &mut f32) {
    if let Some(value) = read_f32(node, key) {
        *target = value;
    }
}

/// Parse an array of exactly `N` numbers
pub fn parse_array<const N: usize>(value: &Value) -> Option<[f64; N]> {
    let items = value.as_array()?;
    if items.len() != N {
        return None;
    }
    let mut result = [0.0; N];
    for (slot, item) in result.iter_mut().zip(items) {
        *slot = item.as_f64()?;
    }
    Some(result)
}

/// Read a three-component single-precision vector
pub fn read_vec3(node: &Value, key: &str) -> Option<Vec3> {
    read_dvec3(node, key).map(|v| v.cast::<f32>())
}

/// Read a three-component vector into `target` if present
pub fn read_vec3_into(node: &Value, key: &str, target: &mut Vec3) {
    if let Some(value) = read_vec3(node, key) {
        *target = value;
    }
}

/// Read a three-component double-precision vector
pub fn read_dvec3(node: &Value, key: &str) -> Option<DVec3> {
    parse_array::<3>(node.get(key)?).map(DVec3::from)
}

/// Read an XYZW quaternion, normalized
pub fn read_dquat(node: &Value, key: &str) -> Option<DQuat> {
    let [x, y, z, w] = parse_array::<4>(node.get(key)?)?;
    Some(DQuat::new_normalize(Quaternion::new(w, x, y, z)))
}

/// JSON array of a vector's components
pub fn vec3_to_value(v: &Vec3) -> Value {
    Value::from(vec![f64::from(v.x), f64::from(v.y), f64::from(v.z)])
}
