//! # Scene Engine
//!
//! A hierarchical scene graph with incremental transform propagation, and
//! the GPU-side scene tables a renderer draws from.
//!
//! ## Features
//!
//! - **Scene Graph**: TRS nodes with one leaf each, dirty-flag driven refresh
//! - **Registries**: reference-counted meshes and materials with listeners
//! - **Animation**: keyframe samplers bound to node transforms and properties
//! - **Scene Buffers**: bindless geometry, material and instance tables
//! - **Skinning**: per-instance joint matrices and compute dispatch
//! - **Loading**: JSON scene documents and RON model descriptions
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scene_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut scene = Scene::new(
//!         Box::new(HeadlessDevice::new()),
//!         Some(Box::new(HeadlessDescriptorTable::new())),
//!         SceneConfig::default(),
//!     );
//!     scene.load("assets/demo.json")?;
//!     scene.finished_loading(0)?;
//!
//!     for frame in 1..10 {
//!         let mut commands = scene.device_mut().create_command_list();
//!         scene.refresh(commands.as_mut(), frame)?;
//!         scene.device_mut().execute_command_list(commands)?;
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::similar_names,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::must_use_candidate
)]

pub mod animation;
pub mod assets;
pub mod config;
pub mod core;
pub mod foundation;
pub mod render;
pub mod scene;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        animation::{InterpolationMode, Keyframe, Sampler},
        assets::{ImportedModel, ModelImporter, RonModelImporter},
        core::{Config, EngineConfig, SceneConfig},
        foundation::math::{Box3, DMat4, DQuat, DVec3, Mat4, Vec3, Vec4},
        render::{
            CommandList, DescriptorTable, Device, HeadlessDescriptorTable, HeadlessDevice, RenderError, Scene,
            SceneLoadError,
        },
        scene::{
            Light, Material, MaterialDomain, MeshInfo, SceneCamera, SceneGraph, SceneGraphAnimation,
            SceneGraphAnimationChannel, SceneGraphLeaf, SceneGraphNode, SceneTypeFactory,
        },
    };
}
