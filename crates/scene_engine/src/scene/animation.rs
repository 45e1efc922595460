//! Animations that drive node transforms and leaf properties

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::animation::Sampler;
use crate::foundation::math::{DQuat, Quaternion};

use super::material::{Material, MaterialRef};
use super::node::{SceneGraphNode, WeakNode};

/// What an animation channel writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnimationAttribute {
    /// Node scaling from `xyz`
    Scaling,
    /// Node rotation from an `xyzw` quaternion
    Rotation,
    /// Node translation from `xyz`
    Translation,
    /// Named property of the target node's leaf or of the target material
    LeafProperty,
}

impl AnimationAttribute {
    /// Parse the attribute names used in scene files
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "scaling" => Some(Self::Scaling),
            "rotation" => Some(Self::Rotation),
            "translation" => Some(Self::Translation),
            _ => None,
        }
    }
}

/// One sampler bound to one target
#[derive(Debug, Clone)]
pub struct SceneGraphAnimationChannel {
    sampler: Rc<Sampler>,
    target_node: WeakNode,
    target_material: Weak<RefCell<Material>>,
    attribute: AnimationAttribute,
    leaf_property_name: String,
}

impl SceneGraphAnimationChannel {
    /// Channel writing `attribute` on `target_node`
    pub fn new(sampler: Rc<Sampler>, target_node: &SceneGraphNode, attribute: AnimationAttribute) -> Self {
        Self {
            sampler,
            target_node: target_node.downgrade(),
            target_material: Weak::new(),
            attribute,
            leaf_property_name: String::new(),
        }
    }

    /// Channel writing a named property of `material`
    pub fn for_material(sampler: Rc<Sampler>, material: &MaterialRef) -> Self {
        Self {
            sampler,
            target_node: WeakNode::new(),
            target_material: Rc::downgrade(material),
            attribute: AnimationAttribute::LeafProperty,
            leaf_property_name: String::new(),
        }
    }

    /// Keyframe source
    pub fn sampler(&self) -> &Rc<Sampler> {
        &self.sampler
    }

    /// Written attribute
    pub fn attribute(&self) -> AnimationAttribute {
        self.attribute
    }

    /// Target node, if alive
    pub fn target_node(&self) -> Option<SceneGraphNode> {
        self.target_node.upgrade()
    }

    /// Target material, if alive
    pub fn target_material(&self) -> Option<MaterialRef> {
        self.target_material.upgrade()
    }

    /// Retarget to another node
    pub fn set_target_node(&mut self, node: &SceneGraphNode) {
        self.target_node = node.downgrade();
    }

    /// Property written by [`AnimationAttribute::LeafProperty`] channels
    pub fn leaf_property_name(&self) -> &str {
        &self.leaf_property_name
    }

    /// Set the property written by [`AnimationAttribute::LeafProperty`] channels
    pub fn set_leaf_property_name(&mut self, name: impl Into<String>) {
        self.leaf_property_name = name.into();
    }

    /// True while the target still exists
    pub fn is_valid(&self) -> bool {
        if self.attribute == AnimationAttribute::LeafProperty && self.target_material.strong_count() > 0 {
            return true;
        }
        !self.target_node.is_expired()
    }

    /// Sample at `time`, holding the last value past the end, and write the target.
    ///
    /// Returns false if the target is gone or the sampler has no keyframes.
    pub fn apply(&self, time: f32) -> bool {
        let node = self.target_node.upgrade();
        let material = self.target_material.upgrade();
        let target_missing = match self.attribute {
            AnimationAttribute::LeafProperty => node.is_none() && material.is_none(),
            _ => node.is_none(),
        };
        if target_missing {
            return false;
        }

        let Some(value) = self.sampler.evaluate(time, true) else {
            return false;
        };
        let xyz = value.xyz().cast::<f64>();

        match (self.attribute, node) {
            (AnimationAttribute::Scaling, Some(node)) => node.set_scaling(&xyz),
            (AnimationAttribute::Translation, Some(node)) => node.set_translation(&xyz),
            (AnimationAttribute::Rotation, Some(node)) => {
                let q = value.cast::<f64>();
                let quaternion = Quaternion::new(q.w, q.x, q.y, q.z);
                let length = quaternion.norm();
                if length <= 0.0 {
                    log::warn!("Rotation quaternion interpolated to zero, ignoring.");
                } else {
                    node.set_rotation(&DQuat::new_unchecked(quaternion / length));
                }
            }
            (AnimationAttribute::LeafProperty, node) => {
                if let Some(material) = material {
                    let mut material = material.borrow_mut();
                    if !material.set_property(&self.leaf_property_name, &value) {
                        log::warn!(
                            "Cannot set property '{}' on material '{}': the material doesn't support this property.",
                            self.leaf_property_name,
                            material.name
                        );
                    }
                } else if let Some(node) = node {
                    match node.leaf() {
                        Some(leaf) => {
                            if !leaf.set_property(&self.leaf_property_name, &value) {
                                log::warn!(
                                    "Cannot set property '{}' on node '{}': the leaf doesn't support this property.",
                                    self.leaf_property_name,
                                    node.name()
                                );
                            }
                        }
                        None => log::warn!(
                            "Cannot set property '{}' on node '{}' which has no leaf.",
                            self.leaf_property_name,
                            node.name()
                        ),
                    }
                }
            }
            (_, None) => return false,
        }
        true
    }
}

/// Ordered set of channels sharing a timeline
#[derive(Debug, Clone, Default)]
pub struct SceneGraphAnimation {
    channels: Vec<SceneGraphAnimationChannel>,
    duration: f32,
}

impl SceneGraphAnimation {
    /// Animation with no channels
    pub fn new() -> Self {
        Self::default()
    }

    /// Channels in application order
    pub fn channels(&self) -> &[SceneGraphAnimationChannel] {
        &self.channels
    }

    pub(crate) fn channels_mut(&mut self) -> &mut [SceneGraphAnimationChannel] {
        &mut self.channels
    }

    /// Latest sampler end time
    pub fn duration(&self) -> f32 {
        self.duration
    }

    /// Append a channel, extending the duration to cover it
    pub fn add_channel(&mut self, channel: SceneGraphAnimationChannel) {
        self.duration = self.duration.max(channel.sampler.end_time());
        self.channels.push(channel);
    }

    /// Apply every channel at `time`; true if all of them applied
    pub fn apply(&self, time: f32) -> bool {
        self.channels
            .iter()
            .fold(true, |success, channel| channel.apply(time) && success)
    }

    /// True while every channel's target exists
    pub fn is_valid(&self) -> bool {
        self.channels.iter().all(SceneGraphAnimationChannel::is_valid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{InterpolationMode, Keyframe};
    use crate::foundation::math::Vec4;
    use approx::assert_relative_eq;

    fn sampler(values: &[(f32, Vec4)]) -> Rc<Sampler> {
        let mut sampler = Sampler::new(InterpolationMode::Linear);
        for &(time, value) in values {
            sampler.add_keyframe(Keyframe::new(time, value));
        }
        Rc::new(sampler)
    }

    #[test]
    fn test_translation_channel_holds_last_value() {
        let node = SceneGraphNode::named("mover");
        let channel = SceneGraphAnimationChannel::new(
            sampler(&[(0.0, Vec4::zeros()), (2.0, Vec4::new(4.0, 0.0, 0.0, 0.0))]),
            &node,
            AnimationAttribute::Translation,
        );

        assert!(channel.apply(1.0));
        assert_relative_eq!(node.translation().x, 2.0, epsilon = 1e-6);
        assert!(channel.apply(10.0));
        assert_relative_eq!(node.translation().x, 4.0, epsilon = 1e-6);
    }

    #[test]
    fn test_zero_rotation_is_ignored() {
        let node = SceneGraphNode::named("spinner");
        let channel = SceneGraphAnimationChannel::new(
            sampler(&[(0.0, Vec4::zeros())]),
            &node,
            AnimationAttribute::Rotation,
        );
        assert!(channel.apply(0.0));
        assert!(!node.has_local_transform());
    }

    #[test]
    fn test_material_channel_and_validity() {
        let material = Material::new("glow").into_ref();
        let mut channel =
            SceneGraphAnimationChannel::for_material(sampler(&[(0.0, Vec4::new(5.0, 0.0, 0.0, 0.0))]), &material);
        channel.set_leaf_property_name("emissiveIntensity");

        let mut animation = SceneGraphAnimation::new();
        animation.add_channel(channel);
        assert!(animation.is_valid());
        assert!(animation.apply(0.0));
        assert_relative_eq!(material.borrow().emissive_intensity, 5.0);

        drop(material);
        assert!(!animation.is_valid());
        assert!(!animation.apply(0.0));
    }

    #[test]
    fn test_duration_covers_all_channels() {
        let node = SceneGraphNode::new();
        let mut animation = SceneGraphAnimation::new();
        animation.add_channel(SceneGraphAnimationChannel::new(
            sampler(&[(0.0, Vec4::zeros()), (3.0, Vec4::zeros())]),
            &node,
            AnimationAttribute::Scaling,
        ));
        animation.add_channel(SceneGraphAnimationChannel::new(
            sampler(&[(1.0, Vec4::zeros())]),
            &node,
            AnimationAttribute::Translation,
        ));
        assert_relative_eq!(animation.duration(), 3.0);
    }
}
