//! GPU-facing side of the scene
//!
//! [`scene::Scene`] ties a [`SceneGraph`](crate::scene::SceneGraph) to the
//! buffers a renderer consumes: geometry, material and instance tables plus
//! per-instance skinned vertex buffers. The GPU itself is reached only through
//! the traits in [`backend`].

pub mod backend;
pub mod gpu_types;
pub mod headless;
pub mod loader;
pub mod scene;

pub use backend::{
    BindingItem, BindingSetHandle, BufferDesc, BufferHandle, BufferUsage, CommandList, ComputePipeline,
    DescriptorIndex, DescriptorTable, Device,
};
pub use headless::{HeadlessDescriptorTable, HeadlessDevice, RecordedCommand};
pub use loader::{SceneLoadError, SceneLoadingStats};
pub use scene::Scene;

/// Errors reported by the GPU layer
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// Resource creation or management failed
    ///
    /// Occurs when GPU resources (buffers, binding sets, descriptors) cannot
    /// be created, typically due to memory constraints or invalid sizes.
    #[error("Resource creation failed: {0}")]
    ResourceCreationFailed(String),

    /// A handle does not name a live resource
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Backend-specific error occurred
    ///
    /// Wraps backend-specific errors in a generic form for consistent error
    /// handling across different graphics backends.
    #[error("Backend error: {0}")]
    BackendError(String),
}

/// Result type for rendering operations
pub type RenderResult<T> = Result<T, RenderError>;
