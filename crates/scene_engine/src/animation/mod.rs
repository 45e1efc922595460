//! Keyframe animation primitives
//!
//! Samplers hold time-sorted keyframes of up to four components and evaluate
//! them with one of several interpolation modes. Scene-level animation
//! channels built on top of them live in [`crate::scene::animation`].

pub mod keyframe;

pub use keyframe::{interpolate, parse_vec4, InterpolationMode, Keyframe, Sampler, Sequence};
