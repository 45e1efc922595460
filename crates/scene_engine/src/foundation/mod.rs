//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the engine:
//! - Math types and bounding volumes
//! - Collections and identity-keyed registries
//! - Typed JSON reads
//! - Logging utilities

pub mod collections;
pub mod json;
pub mod logging;
pub mod math;
