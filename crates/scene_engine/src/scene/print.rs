//! Human-readable dump of a scene graph

use std::fmt::Write;

use crate::foundation::math::{DQuat, DVec3};

use super::animation::{AnimationAttribute, SceneGraphAnimation};
use super::camera::SceneCamera;
use super::leaf::{LeafKind, SceneGraphLeaf};
use super::light::{Light, LightShape};
use super::node::SceneGraphNode;
use super::walker::SceneGraphWalker;

fn describe_light(out: &mut String, light: &Light) {
    let c = light.color;
    let _ = match light.shape {
        LightShape::Directional(d) => write!(
            out,
            "Directional Light (irradiance = {}, r = {}, g = {}, b = {}, angularSize = {})",
            d.irradiance, c.x, c.y, c.z, d.angular_size
        ),
        LightShape::Point(p) => write!(
            out,
            "Point Light (intensity = {}, r = {}, g = {}, b = {}, radius = {}, range = {})",
            p.intensity, c.x, c.y, c.z, p.radius, p.range
        ),
        LightShape::Spot(s) => write!(
            out,
            "Spot Light (intensity = {}, r = {}, g = {}, b = {}, radius = {}, range = {}, innerAngle = {}, outerAngle = {})",
            s.intensity, c.x, c.y, c.z, s.radius, s.range, s.inner_angle, s.outer_angle
        ),
    };
}

fn describe_camera(out: &mut String, camera: &SceneCamera) {
    let _ = match camera {
        SceneCamera::Perspective(p) => {
            write!(out, "Perspective Camera (yFov = {}, zNear = {})", p.vertical_fov, p.z_near)
        }
        SceneCamera::Orthographic(o) => write!(
            out,
            "Orthographic Camera (xMag = {}, yMag = {}, zNear = {})",
            o.x_mag, o.y_mag, o.z_near
        ),
    };
}

fn channel_lines(animation: &SceneGraphAnimation, depth: usize) -> Vec<String> {
    animation
        .channels()
        .iter()
        .map(|channel| {
            let mut line = "  ".repeat(depth + 1);
            match channel.target_node().map(|node| node.name()) {
                Some(name) if name.is_empty() => line.push_str("<Unnamed Target>"),
                Some(name) => line.push_str(&name),
                None if channel.target_material().is_some() => line.push_str("<Material>"),
                None => line.push_str("<No Target>"),
            }
            let attribute = match channel.attribute() {
                AnimationAttribute::Scaling => "Scaling",
                AnimationAttribute::Rotation => "Rotation",
                AnimationAttribute::Translation => "Translation",
                AnimationAttribute::LeafProperty => channel.leaf_property_name(),
            };
            let keyframes = channel.sampler().keyframes();
            let _ = write!(line, " ({attribute}): {} keyframes", keyframes.len());
            if let (Some(first), Some(last)) = (keyframes.first(), keyframes.last()) {
                let _ = write!(line, ", {}s - {}s", first.time, last.time);
            }
            line
        })
        .collect()
}

/// Describe a leaf; animations also return one line per channel.
fn describe_leaf(out: &mut String, leaf: &SceneGraphLeaf, depth: usize) -> Vec<String> {
    out.push_str(": ");
    match &*leaf.kind() {
        LeafKind::MeshInstance(instance) => {
            let mesh = instance.mesh();
            let name = if mesh.name.is_empty() { "Unnamed Mesh" } else { mesh.name.as_str() };
            let _ = write!(out, "{name} ({} geometries)", mesh.geometries.len());
        }
        LeafKind::SkinnedMeshInstance(instance) => {
            let mesh = instance.mesh();
            let name = if mesh.name.is_empty() { "Unnamed Mesh" } else { mesh.name.as_str() };
            let _ = write!(
                out,
                "{name} ({} geometries) - skinned, {} joints",
                mesh.geometries.len(),
                instance.joints.len()
            );
        }
        LeafKind::Animation(animation) => {
            let _ = write!(out, "Animation ({} channels)", animation.channels().len());
            return channel_lines(animation, depth);
        }
        LeafKind::Camera(camera) => describe_camera(out, camera),
        LeafKind::Light(light) => describe_light(out, light),
        LeafKind::SkinnedMeshReference(_) => out.push_str("Joint"),
    }
    Vec::new()
}

/// Lines describing the subtree rooted at `root`, one per node plus one per
/// animation channel, indented two spaces per level.
pub fn describe_scene_graph(root: &SceneGraphNode) -> Vec<String> {
    let mut lines = Vec::new();
    let mut walker = SceneGraphWalker::new(root);
    let mut depth: i32 = 0;

    while let Some(node) = walker.get().cloned() {
        let indent = usize::try_from(depth).unwrap_or(0);
        let mut line = "  ".repeat(indent);

        let name = node.name();
        line.push_str(if name.is_empty() { "<Unnamed>" } else { &name });

        let has_translation = node.translation() != DVec3::zeros();
        let has_rotation = node.rotation() != DQuat::identity();
        let has_scaling = node.scaling() != DVec3::repeat(1.0);
        if has_translation || has_rotation || has_scaling {
            line.push_str(" (");
            if has_translation {
                line.push('T');
            }
            if has_rotation {
                line.push('R');
            }
            if has_scaling {
                line.push('S');
            }
            line.push(')');
        }

        let bounds = node.global_bounding_box();
        if !bounds.is_empty() {
            let _ = write!(
                line,
                " [{}, {}, {} .. {}, {}, {}]",
                bounds.min.x, bounds.min.y, bounds.min.z, bounds.max.x, bounds.max.y, bounds.max.z
            );
        }

        let extra = node.leaf().map(|leaf| describe_leaf(&mut line, &leaf, indent)).unwrap_or_default();
        lines.push(line);
        lines.extend(extra);

        depth += walker.next(true);
    }

    lines
}

/// Log the subtree rooted at `root` at info level
pub fn print_scene_graph(root: &SceneGraphNode) {
    for line in describe_scene_graph(root) {
        log::info!("{line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::graph::SceneGraph;
    use crate::scene::mesh::MeshInfo;

    #[test]
    fn test_describe_indents_by_depth() {
        let graph = SceneGraph::new();
        let root = graph.root();
        root.set_name("world");
        let lamp = graph.attach_leaf_node(Some(&root), &SceneGraphLeaf::light(Light::point())).unwrap();
        lamp.set_name("lamp");
        lamp.set_translation(&DVec3::new(0.0, 2.0, 0.0));
        let body = graph.attach(Some(&root), &SceneGraphNode::named("body")).unwrap();
        graph.attach_leaf_node(Some(&body), &SceneGraphLeaf::mesh_instance(MeshInfo::cube("box", 1.0, None).into_ref()));

        let lines = describe_scene_graph(&root);
        assert_eq!(lines[0], "world");
        assert_eq!(lines[1], "  body");
        assert_eq!(lines[2], "    <Unnamed>: box (1 geometries)");
        assert!(lines[3].starts_with("  lamp (T): Point Light (intensity = 1"));
    }
}
