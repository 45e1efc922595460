//! Backend abstraction traits for the GPU layer
//!
//! The scene only needs buffers, binding sets for the skinning pass, a
//! command list to record uploads and dispatches into, and optionally a
//! bindless descriptor table. Concrete graphics APIs implement these traits.

use bitflags::bitflags;

use super::{RenderError, RenderResult};

/// Result type for backend operations
pub type BackendResult<T> = RenderResult<T>;

/// Handle to a buffer owned by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

/// Handle to a set of resource bindings for a compute dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingSetHandle(pub u64);

/// Index of a descriptor in the bindless table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorIndex(pub u32);

impl DescriptorIndex {
    /// Shader-side value of an optional descriptor; `-1` means none
    pub fn shader_index(index: Option<Self>) -> i32 {
        index.map_or(-1, |d| i32::try_from(d.0).unwrap_or(-1))
    }
}

bitflags! {
    /// Ways a buffer may be bound
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferUsage: u32 {
        /// Bound as an index buffer
        const INDEX = 1 << 0;
        /// Bound as a vertex buffer
        const VERTEX = 1 << 1;
        /// Bound as a constant buffer
        const CONSTANT = 1 << 2;
        /// Readable through raw/structured shader views
        const SHADER_RESOURCE = 1 << 3;
        /// Writable from compute shaders
        const UNORDERED_ACCESS = 1 << 4;
    }
}

/// Buffer creation parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDesc {
    /// Size in bytes
    pub byte_size: u64,
    /// Element stride for structured views, zero for raw buffers
    pub struct_stride: u32,
    /// Allowed bindings
    pub usage: BufferUsage,
    /// Name shown in debuggers and logs
    pub debug_name: String,
}

impl BufferDesc {
    /// Describe a buffer of `byte_size` bytes
    pub fn new(debug_name: impl Into<String>, byte_size: u64, usage: BufferUsage) -> Self {
        Self {
            byte_size,
            struct_stride: 0,
            usage,
            debug_name: debug_name.into(),
        }
    }

    /// Set the structured element stride
    pub fn with_struct_stride(mut self, stride: u32) -> Self {
        self.struct_stride = stride;
        self
    }
}

/// One entry of a compute binding set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingItem {
    /// Push constant block of `size` bytes
    PushConstants {
        /// Register slot
        slot: u32,
        /// Block size in bytes
        size: u32,
    },
    /// Read-only raw buffer view
    RawBufferSrv {
        /// Register slot
        slot: u32,
        /// Bound buffer
        buffer: BufferHandle,
    },
    /// Read-write raw buffer view
    RawBufferUav {
        /// Register slot
        slot: u32,
        /// Bound buffer
        buffer: BufferHandle,
    },
}

/// Compute pipelines known to the scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComputePipeline {
    /// Vertex skinning pass
    Skinning,
}

/// Resource factory and submission queue
pub trait Device {
    /// Create a buffer
    fn create_buffer(&mut self, desc: &BufferDesc) -> BackendResult<BufferHandle>;

    /// Create a binding set for a compute pipeline
    fn create_binding_set(
        &mut self,
        pipeline: ComputePipeline,
        items: &[BindingItem],
    ) -> BackendResult<BindingSetHandle>;

    /// Create an open command list
    fn create_command_list(&mut self) -> Box<dyn CommandList>;

    /// Close and submit a command list
    fn execute_command_list(&mut self, command_list: Box<dyn CommandList>) -> BackendResult<()>;
}

/// Recorder for uploads and dispatches
///
/// Data passed to [`CommandList::write_buffer`] is copied at record time.
pub trait CommandList {
    /// Upload `data` into `buffer` starting at `byte_offset`
    fn write_buffer(&mut self, buffer: BufferHandle, data: &[u8], byte_offset: u64) -> BackendResult<()>;

    /// Open a named debug region
    fn begin_marker(&mut self, name: &str);

    /// Close the innermost debug region
    fn end_marker(&mut self);

    /// Bind a compute pipeline and its resources
    fn set_compute_state(&mut self, pipeline: ComputePipeline, bindings: BindingSetHandle);

    /// Set push constants for the bound pipeline
    fn set_push_constants(&mut self, data: &[u8]);

    /// Dispatch `groups_x` thread groups
    fn dispatch(&mut self, groups_x: u32);
}

/// Bindless descriptor table
pub trait DescriptorTable {
    /// Register a raw shader view of `buffer`
    fn create_descriptor(&mut self, buffer: BufferHandle) -> BackendResult<DescriptorIndex>;

    /// Return a descriptor slot to the table
    fn release_descriptor(&mut self, index: DescriptorIndex);
}

/// Checks that a write stays inside a buffer of `byte_size` bytes.
pub fn validate_write(byte_size: u64, data_len: usize, byte_offset: u64) -> BackendResult<()> {
    let end = byte_offset.checked_add(data_len as u64);
    match end {
        Some(end) if end <= byte_size => Ok(()),
        _ => Err(RenderError::BackendError(format!(
            "write of {data_len} bytes at offset {byte_offset} exceeds buffer size {byte_size}"
        ))),
    }
}
