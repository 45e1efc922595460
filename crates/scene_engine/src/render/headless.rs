//! Headless device that keeps buffers in memory and records commands
//!
//! Used by tests and by tools that need scene buffers without a GPU. Writes
//! are applied to the CPU copy immediately, so uploaded data can be read back.

use std::cell::{Ref, RefCell};
use std::rc::Rc;

use slotmap::{Key, KeyData};

use super::backend::{
    validate_write, BackendResult, BindingItem, BindingSetHandle, BufferDesc, BufferHandle, CommandList,
    ComputePipeline, DescriptorIndex, DescriptorTable, Device,
};
use super::RenderError;
use crate::foundation::collections::{new_key_type, FreeList, SlotMap};

new_key_type! {
    struct BufferKey;
}

/// A buffer held in host memory
#[derive(Debug, Clone)]
pub struct HeadlessBuffer {
    /// Creation parameters
    pub desc: BufferDesc,
    /// Current contents
    pub data: Vec<u8>,
}

/// One recorded command-list operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCommand {
    /// Buffer upload
    WriteBuffer {
        /// Target buffer
        buffer: BufferHandle,
        /// Start of the written range
        byte_offset: u64,
        /// Length of the written range
        byte_size: u64,
    },
    /// Debug region opened
    BeginMarker(String),
    /// Debug region closed
    EndMarker,
    /// Compute pipeline bound
    SetComputeState {
        /// Pipeline
        pipeline: ComputePipeline,
        /// Bound resources
        bindings: BindingSetHandle,
    },
    /// Push constant bytes
    PushConstants(Vec<u8>),
    /// Compute dispatch
    Dispatch(u32),
}

#[derive(Default)]
struct HeadlessState {
    buffers: SlotMap<BufferKey, HeadlessBuffer>,
    binding_sets: Vec<(ComputePipeline, Vec<BindingItem>)>,
    commands: Vec<RecordedCommand>,
    submitted_command_lists: usize,
}

fn buffer_key(handle: BufferHandle) -> BufferKey {
    KeyData::from_ffi(handle.0).into()
}

/// In-memory [`Device`]. Clones share the same state.
#[derive(Clone, Default)]
pub struct HeadlessDevice {
    state: Rc<RefCell<HeadlessState>>,
}

impl HeadlessDevice {
    /// Create an empty device
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a live buffer
    pub fn buffer(&self, handle: BufferHandle) -> Option<Ref<'_, HeadlessBuffer>> {
        Ref::filter_map(self.state.borrow(), |state| state.buffers.get(buffer_key(handle))).ok()
    }

    /// Number of buffers created so far
    pub fn buffer_count(&self) -> usize {
        self.state.borrow().buffers.len()
    }

    /// Binding items of a binding set
    pub fn binding_set(&self, handle: BindingSetHandle) -> Option<Vec<BindingItem>> {
        let index = usize::try_from(handle.0).ok()?;
        self.state.borrow().binding_sets.get(index).map(|(_, items)| items.clone())
    }

    /// Everything recorded so far, in order
    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.state.borrow().commands.clone()
    }

    /// Forget recorded commands, keeping resources
    pub fn clear_commands(&self) {
        self.state.borrow_mut().commands.clear();
    }

    /// Number of command lists passed to `execute_command_list`
    pub fn submitted_command_lists(&self) -> usize {
        self.state.borrow().submitted_command_lists
    }
}

impl Device for HeadlessDevice {
    fn create_buffer(&mut self, desc: &BufferDesc) -> BackendResult<BufferHandle> {
        let size = usize::try_from(desc.byte_size)
            .map_err(|_| RenderError::ResourceCreationFailed(format!("buffer '{}' is too large", desc.debug_name)))?;
        let key = self.state.borrow_mut().buffers.insert(HeadlessBuffer {
            desc: desc.clone(),
            data: vec![0; size],
        });
        log::trace!("Created buffer '{}' ({} bytes)", desc.debug_name, desc.byte_size);
        Ok(BufferHandle(key.data().as_ffi()))
    }

    fn create_binding_set(
        &mut self,
        pipeline: ComputePipeline,
        items: &[BindingItem],
    ) -> BackendResult<BindingSetHandle> {
        let mut state = self.state.borrow_mut();
        for item in items {
            if let BindingItem::RawBufferSrv { buffer, .. } | BindingItem::RawBufferUav { buffer, .. } = item {
                if !state.buffers.contains_key(buffer_key(*buffer)) {
                    return Err(RenderError::InvalidHandle(format!("{buffer:?}")));
                }
            }
        }
        state.binding_sets.push((pipeline, items.to_vec()));
        Ok(BindingSetHandle((state.binding_sets.len() - 1) as u64))
    }

    fn create_command_list(&mut self) -> Box<dyn CommandList> {
        Box::new(HeadlessCommandList {
            state: Rc::clone(&self.state),
        })
    }

    fn execute_command_list(&mut self, command_list: Box<dyn CommandList>) -> BackendResult<()> {
        drop(command_list);
        self.state.borrow_mut().submitted_command_lists += 1;
        Ok(())
    }
}

struct HeadlessCommandList {
    state: Rc<RefCell<HeadlessState>>,
}

impl CommandList for HeadlessCommandList {
    fn write_buffer(&mut self, buffer: BufferHandle, data: &[u8], byte_offset: u64) -> BackendResult<()> {
        let mut state = self.state.borrow_mut();
        let target = state
            .buffers
            .get_mut(buffer_key(buffer))
            .ok_or_else(|| RenderError::InvalidHandle(format!("{buffer:?}")))?;
        validate_write(target.desc.byte_size, data.len(), byte_offset)?;
        // Bounds were checked against the buffer size, which fits in usize.
        let start = byte_offset as usize;
        target.data[start..start + data.len()].copy_from_slice(data);
        state.commands.push(RecordedCommand::WriteBuffer {
            buffer,
            byte_offset,
            byte_size: data.len() as u64,
        });
        Ok(())
    }

    fn begin_marker(&mut self, name: &str) {
        self.state.borrow_mut().commands.push(RecordedCommand::BeginMarker(name.to_string()));
    }

    fn end_marker(&mut self) {
        self.state.borrow_mut().commands.push(RecordedCommand::EndMarker);
    }

    fn set_compute_state(&mut self, pipeline: ComputePipeline, bindings: BindingSetHandle) {
        self.state
            .borrow_mut()
            .commands
            .push(RecordedCommand::SetComputeState { pipeline, bindings });
    }

    fn set_push_constants(&mut self, data: &[u8]) {
        self.state.borrow_mut().commands.push(RecordedCommand::PushConstants(data.to_vec()));
    }

    fn dispatch(&mut self, groups_x: u32) {
        self.state.borrow_mut().commands.push(RecordedCommand::Dispatch(groups_x));
    }
}

/// Bindless table backed by a free list
#[derive(Default)]
pub struct HeadlessDescriptorTable {
    slots: FreeList<BufferHandle>,
}

impl HeadlessDescriptorTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer behind a descriptor
    pub fn get(&self, index: DescriptorIndex) -> Option<BufferHandle> {
        self.slots.get(index.0 as usize).copied()
    }

    /// Number of live descriptors
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True if no descriptor is live
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl DescriptorTable for HeadlessDescriptorTable {
    fn create_descriptor(&mut self, buffer: BufferHandle) -> BackendResult<DescriptorIndex> {
        let slot = self.slots.insert(buffer);
        u32::try_from(slot)
            .map(DescriptorIndex)
            .map_err(|_| RenderError::ResourceCreationFailed("descriptor table is full".to_string()))
    }

    fn release_descriptor(&mut self, index: DescriptorIndex) {
        self.slots.remove(index.0 as usize);
    }
}
