//! # Unified Configuration System
//!
//! ## Configuration Categories
//!
//! - **Scene Config**: GPU buffer growth, bindless descriptors, skinning dispatch, model loading
//! - **Engine Config**: Application name, logging, headless frame count

use serde::{Deserialize, Serialize};

pub use crate::config::{Config, ConfigError};

/// Default number of elements the scene's mirror arrays grow by.
pub const DEFAULT_ALLOCATION_GRANULARITY: usize = 1024;

/// Default compute thread-group width of the skinning pass.
pub const DEFAULT_SKINNING_GROUP_SIZE: u32 = 256;

/// # Scene Configuration
///
/// Controls how a [`Scene`](crate::render::scene::Scene) sizes its GPU buffers
/// and how models are loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Growth step of the geometry/material/instance arrays
    pub allocation_granularity: usize,
    /// Register mesh buffers in the bindless descriptor table when one is present
    pub enable_bindless: bool,
    /// Vertices processed per skinning thread group
    pub skinning_group_size: u32,
    /// Import model files on the rayon thread pool
    pub parallel_model_loading: bool,
}

impl SceneConfig {
    /// Create a scene configuration with default values
    pub fn new() -> Self {
        Self {
            allocation_granularity: DEFAULT_ALLOCATION_GRANULARITY,
            enable_bindless: true,
            skinning_group_size: DEFAULT_SKINNING_GROUP_SIZE,
            parallel_model_loading: true,
        }
    }

    /// Set the array growth step
    pub fn with_allocation_granularity(mut self, granularity: usize) -> Self {
        self.allocation_granularity = granularity;
        self
    }

    /// Enable or disable bindless descriptor registration
    pub fn with_bindless(mut self, enabled: bool) -> Self {
        self.enable_bindless = enabled;
        self
    }

    /// Enable or disable parallel model import
    pub fn with_parallel_model_loading(mut self, enabled: bool) -> Self {
        self.parallel_model_loading = enabled;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.allocation_granularity == 0 {
            return Err("Allocation granularity must be at least 1".to_string());
        }
        if self.skinning_group_size == 0 {
            return Err("Skinning group size must be at least 1".to_string());
        }
        Ok(())
    }
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl Config for SceneConfig {}

/// # Engine Configuration
///
/// Top-level settings for applications driving a scene.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Application name, used in log output
    pub application_name: String,
    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,
    /// Frames to simulate in headless runs
    pub frame_count: u32,
    /// Seconds advanced per simulated frame
    pub frame_time: f32,
    /// Scene settings
    pub scene: SceneConfig,
}

impl EngineConfig {
    /// Create a new engine configuration
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            log_level: "info".to_string(),
            frame_count: 3,
            frame_time: 1.0 / 60.0,
            scene: SceneConfig::default(),
        }
    }

    /// Set log level
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Set the number of headless frames
    pub fn with_frame_count(mut self, frames: u32) -> Self {
        self.frame_count = frames;
        self
    }

    /// Set custom scene configuration
    pub fn with_scene(mut self, scene: SceneConfig) -> Self {
        self.scene = scene;
        self
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.application_name.is_empty() {
            return Err("Application name cannot be empty".to_string());
        }
        if !(self.frame_time.is_finite() && self.frame_time >= 0.0) {
            return Err("Frame time must be a non-negative number".to_string());
        }
        self.scene.validate()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new("Scene Viewer")
    }
}

impl Config for EngineConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scene.allocation_granularity, 1024);
        assert_eq!(config.scene.skinning_group_size, 256);
    }

    #[test]
    fn test_zero_granularity_rejected() {
        let config = SceneConfig::new().with_allocation_granularity(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip_through_file() {
        let path = std::env::temp_dir().join(format!("scene_engine_config_{}.toml", std::process::id()));
        let config = EngineConfig::new("Test").with_frame_count(7);
        config.save_to_file(&path).unwrap();
        let loaded = EngineConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded.application_name, "Test");
        assert_eq!(loaded.frame_count, 7);
    }

    #[test]
    fn test_unknown_extension_is_unsupported() {
        let err = SceneConfig::load_from_file("settings.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_) | ConfigError::UnsupportedFormat(_)));
    }
}
