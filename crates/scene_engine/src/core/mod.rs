//! # Core Engine Module
//!
//! Shared settings used by the scene, the buffer orchestration layer and the
//! applications built on top of them.

pub mod config;

pub use config::{Config, ConfigError, EngineConfig, SceneConfig};
