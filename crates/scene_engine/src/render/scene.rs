//! Scene buffer and skinning orchestration
//!
//! A [`Scene`] owns a [`SceneGraph`] and keeps CPU mirrors of the
//! shader-visible geometry, material and instance tables in sync with it.
//! Each frame the application calls [`Scene::refresh`] with an open command
//! list; only the tables affected by what changed in the graph are uploaded,
//! each with a single bulk write.
//!
//! Skinned instances are deformed on the GPU: their joint matrices are
//! uploaded and a compute pass writes the instance's own vertex buffer from
//! the prototype mesh's bind-pose vertices.

use std::mem::size_of;
use std::rc::Rc;
use std::sync::Arc;

use crate::assets::{ModelImporter, RonModelImporter};
use crate::core::config::SceneConfig;
use crate::foundation::math::{affine_inverse, affine_to_rows, DMat4};
use crate::scene::{
    BufferGroup, BufferRange, DefaultSceneTypeFactory, MaterialRef, MeshRef, SceneGraph, SceneGraphLeaf,
    SceneGraphNode, SceneTypeFactory, SkinnedMeshInstance, VertexAttribute,
};

use super::backend::{
    BindingItem, BufferDesc, BufferHandle, BufferUsage, CommandList, ComputePipeline, DescriptorIndex,
    DescriptorTable, Device,
};
use super::gpu_types::{
    GeometryData, InstanceData, JointMatrix, MaterialConstants, SkinningConstants, SkinningFlags, INVALID_OFFSET,
};
use super::loader::SceneLoadingStats;
use super::RenderResult;

/// Order in which attribute streams are packed into a mesh vertex buffer
const VERTEX_BUFFER_LAYOUT: [VertexAttribute; 7] = [
    VertexAttribute::Position,
    VertexAttribute::Normal,
    VertexAttribute::Tangent,
    VertexAttribute::TexCoord1,
    VertexAttribute::TexCoord2,
    VertexAttribute::JointWeights,
    VertexAttribute::JointIndices,
];

/// Order of the streams in a skinned instance's output vertex buffer
const SKINNED_BUFFER_LAYOUT: [VertexAttribute; 6] = [
    VertexAttribute::Position,
    VertexAttribute::PrevPosition,
    VertexAttribute::Normal,
    VertexAttribute::Tangent,
    VertexAttribute::TexCoord1,
    VertexAttribute::TexCoord2,
];

/// CPU mirrors of the shader-visible tables
#[derive(Debug, Default)]
struct SceneResources {
    material_data: Vec<MaterialConstants>,
    geometry_data: Vec<GeometryData>,
    instance_data: Vec<InstanceData>,
}

/// Round `count` up to a whole number of `granularity` chunks
fn grow_to(count: usize, granularity: usize) -> usize {
    count.div_ceil(granularity.max(1)) * granularity.max(1)
}

fn byte_offset(offset: u64) -> u32 {
    u32::try_from(offset).unwrap_or_else(|_| {
        log::error!("Vertex buffer offset {offset} does not fit in 32 bits");
        INVALID_OFFSET
    })
}

fn table_slot(index: i32, len: usize) -> Option<usize> {
    usize::try_from(index).ok().filter(|&slot| slot < len)
}

/// A scene graph plus the GPU buffers that describe it to shaders
pub struct Scene {
    pub(super) device: Box<dyn Device>,
    descriptor_table: Option<Box<dyn DescriptorTable>>,
    pub(super) config: SceneConfig,
    pub(super) type_factory: Rc<dyn SceneTypeFactory>,
    pub(super) importer: Arc<dyn ModelImporter>,
    pub(super) loading_stats: Arc<SceneLoadingStats>,
    pub(super) graph: SceneGraph,
    pub(super) models: Vec<Option<SceneGraphNode>>,

    resources: SceneResources,
    geometry_buffer: Option<BufferHandle>,
    material_buffer: Option<BufferHandle>,
    instance_buffer: Option<BufferHandle>,

    structure_changed: bool,
    transforms_changed: bool,
}

impl Scene {
    /// Create an empty scene.
    ///
    /// Bindless tables (geometry and material buffers, per-buffer
    /// descriptors) are maintained only when a descriptor table is supplied
    /// and `config.enable_bindless` is set.
    pub fn new(
        device: Box<dyn Device>,
        descriptor_table: Option<Box<dyn DescriptorTable>>,
        config: SceneConfig,
    ) -> Self {
        Self {
            device,
            descriptor_table,
            config,
            type_factory: Rc::new(DefaultSceneTypeFactory),
            importer: Arc::new(RonModelImporter::new()),
            loading_stats: Arc::new(SceneLoadingStats::default()),
            graph: SceneGraph::new(),
            models: Vec::new(),
            resources: SceneResources::default(),
            geometry_buffer: None,
            material_buffer: None,
            instance_buffer: None,
            structure_changed: false,
            transforms_changed: false,
        }
    }

    /// Use a custom factory for leaves, materials and meshes created while loading
    #[must_use]
    pub fn with_type_factory(mut self, factory: Rc<dyn SceneTypeFactory>) -> Self {
        self.type_factory = factory;
        self
    }

    /// Use a custom model importer
    #[must_use]
    pub fn with_importer(mut self, importer: Arc<dyn ModelImporter>) -> Self {
        self.importer = importer;
        self
    }

    /// The scene graph
    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    /// Scene settings
    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Device the scene's resources live on
    pub fn device_mut(&mut self) -> &mut dyn Device {
        self.device.as_mut()
    }

    /// Progress counters of the current or last load
    pub fn loading_stats(&self) -> Arc<SceneLoadingStats> {
        Arc::clone(&self.loading_stats)
    }

    /// Root nodes of the models loaded by the last [`Scene::load`], by index
    pub fn models(&self) -> &[Option<SceneGraphNode>] {
        &self.models
    }

    /// Bindless geometry table, if bindless resources are enabled
    pub fn geometry_buffer(&self) -> Option<BufferHandle> {
        self.geometry_buffer
    }

    /// Bindless material table, if bindless resources are enabled
    pub fn material_buffer(&self) -> Option<BufferHandle> {
        self.material_buffer
    }

    /// Per-instance transform table
    pub fn instance_buffer(&self) -> Option<BufferHandle> {
        self.instance_buffer
    }

    /// CPU mirror of the geometry table
    pub fn geometry_data(&self) -> &[GeometryData] {
        &self.resources.geometry_data
    }

    /// CPU mirror of the material table
    pub fn material_data(&self) -> &[MaterialConstants] {
        &self.resources.material_data
    }

    /// CPU mirror of the instance table
    pub fn instance_data(&self) -> &[InstanceData] {
        &self.resources.instance_data
    }

    /// True if the last graph refresh saw structural changes
    pub fn structure_changed(&self) -> bool {
        self.structure_changed
    }

    /// True if the last graph refresh saw transform changes
    pub fn transforms_changed(&self) -> bool {
        self.transforms_changed
    }

    /// Start over with an empty graph and no GPU tables.
    ///
    /// The tables are reallocated and refilled from scratch by the next
    /// refresh, so nothing from the previous graph is uploaded again.
    pub(super) fn reset(&mut self) {
        self.graph = SceneGraph::new();
        self.models.clear();
        self.resources = SceneResources::default();
        self.geometry_buffer = None;
        self.material_buffer = None;
        self.instance_buffer = None;
        self.structure_changed = false;
        self.transforms_changed = false;
    }

    fn bindless_enabled(&self) -> bool {
        self.config.enable_bindless && self.descriptor_table.is_some()
    }

    fn create_descriptor(&mut self, buffer: BufferHandle) -> RenderResult<Option<DescriptorIndex>> {
        if !self.config.enable_bindless {
            return Ok(None);
        }
        self.descriptor_table
            .as_mut()
            .map(|table| table.create_descriptor(buffer))
            .transpose()
    }

    /// Create buffers for everything loaded so far and upload the initial
    /// state of the scene on a fresh command list.
    pub fn finished_loading(&mut self, frame_index: u32) -> RenderResult<()> {
        let mut command_list = self.device.create_command_list();
        self.create_mesh_buffers(command_list.as_mut())?;
        self.refresh(command_list.as_mut(), frame_index)?;
        self.device.execute_command_list(command_list)
    }

    /// Refresh the graph, then the buffers that depend on it
    pub fn refresh(&mut self, command_list: &mut dyn CommandList, frame_index: u32) -> RenderResult<()> {
        self.refresh_scene_graph(frame_index);
        self.refresh_buffers(command_list, frame_index)
    }

    /// Propagate graph changes, remembering which kinds of change happened
    pub fn refresh_scene_graph(&mut self, frame_index: u32) {
        // The graph forgets its pending changes once refreshed.
        self.structure_changed = self.graph.has_pending_structure_changes();
        self.transforms_changed = self.graph.has_pending_transform_changes();
        self.graph.refresh(frame_index);
    }

    /// Bring the GPU tables in line with the last graph refresh
    pub fn refresh_buffers(&mut self, command_list: &mut dyn CommandList, frame_index: u32) -> RenderResult<()> {
        if self.structure_changed {
            self.create_mesh_buffers(command_list)?;
        }

        let arrays_allocated = self.grow_arrays()?;
        let materials_changed = self.refresh_materials(command_list, arrays_allocated)?;

        if self.bindless_enabled() && (self.structure_changed || arrays_allocated) {
            for mesh in self.graph.meshes() {
                self.update_geometry(&mesh);
            }
            if let Some(buffer) = self.geometry_buffer {
                command_list.write_buffer(buffer, bytemuck::cast_slice(&self.resources.geometry_data), 0)?;
            }
        }

        if self.structure_changed || self.transforms_changed || arrays_allocated {
            for instance in self.graph.mesh_instances() {
                self.update_instance(&instance);
            }
            if let Some(buffer) = self.instance_buffer {
                command_list.write_buffer(buffer, bytemuck::cast_slice(&self.resources.instance_data), 0)?;
            }
        }

        if self.bindless_enabled() && (materials_changed || self.structure_changed || arrays_allocated) {
            if let Some(buffer) = self.material_buffer {
                command_list.write_buffer(buffer, bytemuck::cast_slice(&self.resources.material_data), 0)?;
            }
        }

        self.update_skinned_meshes(command_list, frame_index)
    }

    /// Grow the mirrors and recreate their buffers when the graph outgrew them
    fn grow_arrays(&mut self) -> RenderResult<bool> {
        let granularity = self.config.allocation_granularity;
        let bindless = self.bindless_enabled();
        let mut allocated = false;

        let geometry_count = self.graph.geometry_count();
        if bindless && geometry_count > self.resources.geometry_data.len() {
            let len = grow_to(geometry_count, granularity);
            self.resources.geometry_data.resize(len, GeometryData::default());
            let desc = BufferDesc::new(
                "BindlessGeometry",
                (size_of::<GeometryData>() * len) as u64,
                BufferUsage::SHADER_RESOURCE | BufferUsage::UNORDERED_ACCESS,
            )
            .with_struct_stride(size_of::<GeometryData>() as u32);
            self.geometry_buffer = Some(self.device.create_buffer(&desc)?);
            allocated = true;
        }

        let material_count = self.graph.materials().len();
        if material_count > self.resources.material_data.len() {
            let len = grow_to(material_count, granularity);
            self.resources.material_data.resize(len, MaterialConstants::default());
            if bindless {
                let desc = BufferDesc::new(
                    "BindlessMaterials",
                    (size_of::<MaterialConstants>() * len) as u64,
                    BufferUsage::SHADER_RESOURCE | BufferUsage::UNORDERED_ACCESS,
                )
                .with_struct_stride(size_of::<MaterialConstants>() as u32);
                self.material_buffer = Some(self.device.create_buffer(&desc)?);
            }
            allocated = true;
        }

        let instance_count = self.graph.mesh_instances().len();
        if instance_count > self.resources.instance_data.len() {
            let len = grow_to(instance_count, granularity);
            self.resources.instance_data.resize(len, InstanceData::default());
            let mut desc = BufferDesc::new(
                "Instances",
                (size_of::<InstanceData>() * len) as u64,
                BufferUsage::VERTEX | BufferUsage::SHADER_RESOURCE | BufferUsage::UNORDERED_ACCESS,
            );
            if bindless {
                desc = desc.with_struct_stride(size_of::<InstanceData>() as u32);
            }
            self.instance_buffer = Some(self.device.create_buffer(&desc)?);
            allocated = true;
        }

        if allocated {
            log::debug!(
                "Scene arrays: {} geometries, {} materials, {} instances",
                self.resources.geometry_data.len(),
                self.resources.material_data.len(),
                self.resources.instance_data.len()
            );
        }
        Ok(allocated)
    }

    /// Refill and upload per-material constants. Returns true if any
    /// material's constants were uploaded.
    fn refresh_materials(&mut self, command_list: &mut dyn CommandList, arrays_allocated: bool) -> RenderResult<bool> {
        let mut materials_changed = false;

        for material in self.graph.materials() {
            let mut material = material.borrow_mut();
            let Some(slot) = table_slot(material.material_id, self.resources.material_data.len()) else {
                log::error!("Material '{}' has no slot in the material table", material.name);
                continue;
            };

            if material.dirty || self.structure_changed || arrays_allocated {
                self.resources.material_data[slot] = material.fill_constant_buffer();
            }

            if material.material_constants.is_none() {
                let desc = BufferDesc::new(
                    material.name.clone(),
                    size_of::<MaterialConstants>() as u64,
                    BufferUsage::CONSTANT,
                );
                material.material_constants = Some(self.device.create_buffer(&desc)?);
                material.dirty = true;
            }

            if material.dirty {
                if let Some(buffer) = material.material_constants {
                    command_list.write_buffer(buffer, bytemuck::bytes_of(&self.resources.material_data[slot]), 0)?;
                }
                material.dirty = false;
                materials_changed = true;
            }
        }

        Ok(materials_changed)
    }

    /// Fill the geometry table entries of one mesh
    fn update_geometry(&mut self, mesh: &MeshRef) {
        let group = mesh.buffer_group();
        let group = group.as_ref().map(|group| group.borrow());

        for geometry in &mesh.geometries {
            let Some(slot) = table_slot(geometry.global_geometry_index.get(), self.resources.geometry_data.len()) else {
                log::error!("Geometry of mesh '{}' has no slot in the geometry table", mesh.name);
                continue;
            };

            let index_offset = u64::from(mesh.index_offset + geometry.index_offset_in_mesh);
            let vertex_offset = u64::from(mesh.vertex_offset + geometry.vertex_offset_in_mesh);
            let attribute_offset = |attribute: VertexAttribute| match &group {
                Some(group) if group.has_attribute(attribute) => byte_offset(
                    vertex_offset * attribute.element_size() + group.vertex_buffer_range(attribute).byte_offset,
                ),
                _ => INVALID_OFFSET,
            };

            let data = GeometryData {
                num_indices: geometry.num_indices,
                num_vertices: geometry.num_vertices,
                index_buffer_index: DescriptorIndex::shader_index(
                    group.as_ref().and_then(|group| group.index_buffer_descriptor),
                ),
                index_offset: byte_offset(index_offset * size_of::<u32>() as u64),
                vertex_buffer_index: DescriptorIndex::shader_index(
                    group.as_ref().and_then(|group| group.vertex_buffer_descriptor),
                ),
                position_offset: attribute_offset(VertexAttribute::Position),
                prev_position_offset: attribute_offset(VertexAttribute::PrevPosition),
                tex_coord1_offset: attribute_offset(VertexAttribute::TexCoord1),
                tex_coord2_offset: attribute_offset(VertexAttribute::TexCoord2),
                normal_offset: attribute_offset(VertexAttribute::Normal),
                tangent_offset: attribute_offset(VertexAttribute::Tangent),
                material_index: geometry
                    .material
                    .as_ref()
                    .map_or(-1, |material| material.borrow().material_id),
            };
            self.resources.geometry_data[slot] = data;
        }
    }

    /// Fill the instance table entry of one mesh instance leaf
    fn update_instance(&mut self, leaf: &SceneGraphLeaf) {
        let Some(node) = leaf.node() else {
            return;
        };
        let Some(instance) = leaf.as_mesh_instance() else {
            return;
        };
        let Some(slot) = table_slot(instance.instance_index(), self.resources.instance_data.len()) else {
            log::error!("Instance on node '{}' has no slot in the instance table", node.name());
            return;
        };

        let mesh = instance.mesh();
        let first_geometry_index = mesh
            .geometries
            .first()
            .map_or(0, |geometry| geometry.global_geometry_index.get());

        self.resources.instance_data[slot] = InstanceData {
            transform: affine_to_rows(&node.local_to_world_transform_float()),
            prev_transform: affine_to_rows(&node.prev_local_to_world_transform_float()),
            first_geometry_instance_index: u32::try_from(instance.geometry_instance_index()).unwrap_or(0),
            first_geometry_index: u32::try_from(first_geometry_index).unwrap_or(0),
            num_geometries: u32::try_from(mesh.geometries.len()).unwrap_or(u32::MAX),
            padding: 0,
        };
    }

    /// Create and upload the GPU buffers of every mesh that lacks them, and
    /// the skinning resources of every skinned instance.
    ///
    /// CPU-side vertex and index arrays are released once uploaded.
    pub fn create_mesh_buffers(&mut self, command_list: &mut dyn CommandList) -> RenderResult<()> {
        for mesh in self.graph.meshes() {
            if let Some(group) = mesh.buffer_group() {
                self.create_group_buffers(&mut group.borrow_mut(), command_list)?;
            }
        }

        for leaf in self.graph.skinned_mesh_instances() {
            if let Some(mut skinned) = leaf.as_skinned_mesh_instance_mut() {
                self.create_skinning_resources(&mut skinned)?;
            }
        }
        Ok(())
    }

    fn create_group_buffers(&mut self, group: &mut BufferGroup, command_list: &mut dyn CommandList) -> RenderResult<()> {
        if !group.index_data.is_empty() && group.index_buffer.is_none() {
            let bytes: &[u8] = bytemuck::cast_slice(&group.index_data);
            let desc = BufferDesc::new(
                "IndexBuffer",
                bytes.len() as u64,
                BufferUsage::INDEX | BufferUsage::SHADER_RESOURCE,
            );
            let buffer = self.device.create_buffer(&desc)?;
            group.index_buffer_descriptor = self.create_descriptor(buffer)?;
            command_list.write_buffer(buffer, bytes, 0)?;
            group.index_buffer = Some(buffer);
            group.index_data = Vec::new();
        }

        if group.vertex_buffer.is_none() {
            let mut byte_size = 0;
            for attribute in VERTEX_BUFFER_LAYOUT {
                let stream_size = group.attribute_len(attribute) as u64 * attribute.element_size();
                if stream_size != 0 {
                    group.set_vertex_buffer_range(attribute, BufferRange::new(byte_size, stream_size));
                    byte_size += stream_size;
                }
            }

            let desc = BufferDesc::new(
                "VertexBuffer",
                byte_size,
                BufferUsage::VERTEX | BufferUsage::SHADER_RESOURCE,
            );
            let buffer = self.device.create_buffer(&desc)?;
            group.vertex_buffer_descriptor = self.create_descriptor(buffer)?;

            for attribute in VERTEX_BUFFER_LAYOUT {
                if group.attribute_len(attribute) == 0 {
                    continue;
                }
                let range = group.vertex_buffer_range(attribute);
                command_list.write_buffer(buffer, &group.attribute_bytes(attribute), range.byte_offset)?;
                group.clear_attribute(attribute);
            }
            group.vertex_buffer = Some(buffer);
        }
        Ok(())
    }

    fn create_skinning_resources(&mut self, skinned: &mut SkinnedMeshInstance) -> RenderResult<()> {
        let prototype = Rc::clone(skinned.prototype_mesh());
        let Some(prototype_group) = prototype.buffer_group() else {
            log::warn!("Skin prototype '{}' has no vertex data, skipping", prototype.name);
            return Ok(());
        };
        let prototype_group = prototype_group.borrow();

        let mesh = Rc::clone(skinned.mesh());
        if mesh.buffer_group().is_none() {
            debug_assert!(prototype_group.has_attribute(VertexAttribute::Position));

            let mut group = BufferGroup::new();
            group.index_buffer = prototype_group.index_buffer;
            group.index_buffer_descriptor = prototype_group.index_buffer_descriptor;

            let total_vertices = u64::from(mesh.total_vertices);
            let mut byte_size = 0;
            for attribute in SKINNED_BUFFER_LAYOUT {
                let always = matches!(attribute, VertexAttribute::Position | VertexAttribute::PrevPosition);
                if always || prototype_group.has_attribute(attribute) {
                    let stream_size = total_vertices * attribute.element_size();
                    group.set_vertex_buffer_range(attribute, BufferRange::new(byte_size, stream_size));
                    byte_size += stream_size;
                }
            }

            let desc = BufferDesc::new(
                "SkinnedVertexBuffer",
                byte_size,
                BufferUsage::VERTEX | BufferUsage::SHADER_RESOURCE | BufferUsage::UNORDERED_ACCESS,
            );
            let buffer = self.device.create_buffer(&desc)?;
            group.vertex_buffer_descriptor = self.create_descriptor(buffer)?;
            group.vertex_buffer = Some(buffer);
            *mesh.buffers.borrow_mut() = Some(group.into_ref());
        }

        if skinned.joint_buffer.is_none() {
            let desc = BufferDesc::new(
                "JointBuffer",
                (size_of::<JointMatrix>() * skinned.joints.len()) as u64,
                BufferUsage::SHADER_RESOURCE,
            );
            skinned.joint_buffer = Some(self.device.create_buffer(&desc)?);
        }

        if skinned.skinning_binding_set.is_none() {
            let output = mesh.buffer_group().and_then(|group| group.borrow().vertex_buffer);
            let (Some(input), Some(joints), Some(output)) = (prototype_group.vertex_buffer, skinned.joint_buffer, output)
            else {
                log::warn!("Skinned mesh '{}' is missing a buffer, skinning disabled", mesh.name);
                return Ok(());
            };
            let items = [
                BindingItem::PushConstants {
                    slot: 0,
                    size: size_of::<SkinningConstants>() as u32,
                },
                BindingItem::RawBufferSrv { slot: 0, buffer: input },
                BindingItem::RawBufferSrv { slot: 1, buffer: joints },
                BindingItem::RawBufferUav { slot: 0, buffer: output },
            ];
            skinned.skinning_binding_set = Some(self.device.create_binding_set(ComputePipeline::Skinning, &items)?);
        }
        Ok(())
    }

    /// Record the skinning pass for every skinned instance whose joints moved
    /// on this frame or the one before.
    ///
    /// The extra frame lets the pass copy the now-stable positions into the
    /// previous-position stream once the skeleton stops moving.
    pub fn update_skinned_meshes(&mut self, command_list: &mut dyn CommandList, frame_index: u32) -> RenderResult<()> {
        let mut marker_placed = false;

        for leaf in self.graph.skinned_mesh_instances() {
            let last_update = match leaf.as_skinned_mesh_instance() {
                Some(skinned) => skinned.last_update_frame_index(),
                None => continue,
            };
            if last_update.saturating_add(1) < frame_index {
                continue;
            }

            if !marker_placed {
                command_list.begin_marker("Skinning");
                marker_placed = true;
            }

            let name = leaf.name();
            if !name.is_empty() {
                command_list.begin_marker(&name);
            }

            let root_world = leaf.node().map_or_else(DMat4::identity, |node| node.local_to_world_transform());
            if let Some(mut skinned) = leaf.as_skinned_mesh_instance_mut() {
                self.skin_instance(&mut skinned, &root_world, command_list)?;
            }

            if !name.is_empty() {
                command_list.end_marker();
            }
        }

        if marker_placed {
            command_list.end_marker();
        }
        Ok(())
    }

    fn skin_instance(
        &self,
        skinned: &mut SkinnedMeshInstance,
        root_world: &DMat4,
        command_list: &mut dyn CommandList,
    ) -> RenderResult<()> {
        let (Some(joint_buffer), Some(binding_set)) = (skinned.joint_buffer, skinned.skinning_binding_set) else {
            log::warn!("Skinned mesh '{}' has no GPU resources yet", skinned.mesh().name);
            return Ok(());
        };
        let prototype = Rc::clone(skinned.prototype_mesh());
        let (Some(prototype_group), Some(skinned_group)) = (prototype.buffer_group(), skinned.mesh().buffer_group())
        else {
            return Ok(());
        };
        let prototype_group = prototype_group.borrow();
        let skinned_group = skinned_group.borrow();

        let world_to_root = affine_inverse(root_world);
        let joint_matrices: Vec<JointMatrix> = skinned
            .joints
            .iter()
            .map(|joint| {
                let joint_world = joint.node.upgrade().map_or_else(DMat4::identity, |node| node.local_to_world_transform());
                (world_to_root * joint_world * joint.inverse_bind_matrix).cast::<f32>().into()
            })
            .collect();
        command_list.write_buffer(joint_buffer, bytemuck::cast_slice(&joint_matrices), 0)?;
        command_list.set_compute_state(ComputePipeline::Skinning, binding_set);

        let mut flags = SkinningFlags::empty();
        flags.set(SkinningFlags::NORMALS, prototype_group.has_attribute(VertexAttribute::Normal));
        flags.set(SkinningFlags::TANGENTS, prototype_group.has_attribute(VertexAttribute::Tangent));
        flags.set(SkinningFlags::TEX_COORD1, prototype_group.has_attribute(VertexAttribute::TexCoord1));
        flags.set(SkinningFlags::TEX_COORD2, prototype_group.has_attribute(VertexAttribute::TexCoord2));
        flags.set(SkinningFlags::FIRST_FRAME, !skinned.skinning_initialized);
        skinned.skinning_initialized = true;

        let vertex_offset = u64::from(prototype.vertex_offset);
        let input = |attribute: VertexAttribute| {
            byte_offset(prototype_group.vertex_buffer_range(attribute).byte_offset + vertex_offset * attribute.element_size())
        };
        let output = |attribute: VertexAttribute| byte_offset(skinned_group.vertex_buffer_range(attribute).byte_offset);

        let constants = SkinningConstants {
            num_vertices: prototype.total_vertices,
            flags: flags.bits(),
            input_position_offset: input(VertexAttribute::Position),
            input_normal_offset: input(VertexAttribute::Normal),
            input_tangent_offset: input(VertexAttribute::Tangent),
            input_tex_coord1_offset: input(VertexAttribute::TexCoord1),
            input_tex_coord2_offset: input(VertexAttribute::TexCoord2),
            input_joint_index_offset: input(VertexAttribute::JointIndices),
            input_joint_weight_offset: input(VertexAttribute::JointWeights),
            output_position_offset: output(VertexAttribute::Position),
            output_prev_position_offset: output(VertexAttribute::PrevPosition),
            output_normal_offset: output(VertexAttribute::Normal),
            output_tangent_offset: output(VertexAttribute::Tangent),
            output_tex_coord1_offset: output(VertexAttribute::TexCoord1),
            output_tex_coord2_offset: output(VertexAttribute::TexCoord2),
            padding: 0,
        };
        command_list.set_push_constants(bytemuck::bytes_of(&constants));
        command_list.dispatch(constants.num_vertices.div_ceil(self.config.skinning_group_size.max(1)));
        Ok(())
    }

    /// Material named `name` among those referenced by the graph
    pub fn find_material(&self, name: &str) -> Option<MaterialRef> {
        self.graph
            .materials()
            .into_iter()
            .find(|material| material.borrow().name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{DVec3, Vec4};
    use crate::render::headless::{HeadlessDescriptorTable, HeadlessDevice, RecordedCommand};
    use crate::scene::{Material, MeshInfo, SceneGraphLeaf, SkinnedMeshJoint};
    use approx::assert_relative_eq;

    fn scene_with(device: &HeadlessDevice, config: SceneConfig) -> Scene {
        Scene::new(
            Box::new(device.clone()),
            Some(Box::new(HeadlessDescriptorTable::new())),
            config,
        )
    }

    fn writes_to(device: &HeadlessDevice, buffer: BufferHandle) -> usize {
        device
            .commands()
            .iter()
            .filter(|command| matches!(command, RecordedCommand::WriteBuffer { buffer: b, .. } if *b == buffer))
            .count()
    }

    #[test]
    fn test_finished_loading_uploads_mesh_and_tables() {
        let device = HeadlessDevice::new();
        let mut scene = scene_with(&device, SceneConfig::new());
        let paint = Material::new("paint").into_ref();
        let mesh = MeshInfo::cube("box", 1.0, Some(Rc::clone(&paint))).into_ref();
        let node = scene
            .graph()
            .attach_leaf_node(Some(&scene.graph().root()), &SceneGraphLeaf::mesh_instance(Rc::clone(&mesh)))
            .unwrap();
        node.set_translation(&DVec3::new(3.0, 0.0, 0.0));

        scene.finished_loading(0).unwrap();
        assert_eq!(device.submitted_command_lists(), 1);

        let group = mesh.buffer_group().unwrap();
        let group = group.borrow();
        assert!(group.index_buffer.is_some() && group.vertex_buffer.is_some());
        assert!(group.index_data.is_empty() && group.position_data.is_empty());
        assert_eq!(group.vertex_buffer_range(VertexAttribute::Position), BufferRange::new(0, 24 * 12));
        assert_eq!(group.vertex_buffer_range(VertexAttribute::Normal), BufferRange::new(24 * 12, 24 * 4));
        assert_eq!(group.vertex_buffer_range(VertexAttribute::TexCoord1).byte_offset, 24 * 20);
        assert!(!group.has_attribute(VertexAttribute::TexCoord2));

        let geometry = scene.geometry_data()[0];
        assert_eq!(geometry.num_indices, 36);
        assert_eq!(geometry.normal_offset, 24 * 12);
        assert_eq!(geometry.tex_coord2_offset, INVALID_OFFSET);
        assert_eq!(geometry.material_index, 0);
        assert_eq!(geometry.vertex_buffer_index, 1);

        let instance = scene.instance_data()[0];
        assert_relative_eq!(instance.transform[3], 3.0);
        assert_eq!(instance.num_geometries, 1);
        assert_eq!(scene.instance_data().len(), 1024);

        let instances = device.buffer(scene.instance_buffer().unwrap()).unwrap();
        assert_eq!(instances.desc.debug_name, "Instances");
        assert_eq!(instances.desc.struct_stride, 112);
        drop(instances);
        assert!(paint.borrow().material_constants.is_some());
        assert!(!paint.borrow().dirty);
    }

    #[test]
    fn test_unchanged_frame_uploads_nothing() {
        let device = HeadlessDevice::new();
        let mut scene = scene_with(&device, SceneConfig::new());
        let paint = Material::new("paint").into_ref();
        let node = scene
            .graph()
            .attach_leaf_node(
                Some(&scene.graph().root()),
                &SceneGraphLeaf::mesh_instance(MeshInfo::cube("box", 1.0, Some(Rc::clone(&paint))).into_ref()),
            )
            .unwrap();
        scene.finished_loading(0).unwrap();
        device.clear_commands();

        let mut list = device.clone().create_command_list();
        scene.refresh(list.as_mut(), 1).unwrap();
        assert!(device.commands().is_empty());

        paint.borrow_mut().set_property("roughness", &Vec4::new(0.8, 0.0, 0.0, 0.0));
        scene.refresh(list.as_mut(), 2).unwrap();
        let constants = paint.borrow().material_constants.unwrap();
        assert_eq!(writes_to(&device, constants), 1);
        assert_eq!(writes_to(&device, scene.material_buffer().unwrap()), 1);
        assert_eq!(writes_to(&device, scene.instance_buffer().unwrap()), 0);
        assert_relative_eq!(scene.material_data()[0].roughness, 0.8);

        device.clear_commands();
        node.set_translation(&DVec3::new(0.0, 1.0, 0.0));
        scene.refresh(list.as_mut(), 3).unwrap();
        assert_eq!(writes_to(&device, scene.instance_buffer().unwrap()), 1);
        assert_eq!(writes_to(&device, scene.geometry_buffer().unwrap()), 0);
        assert_relative_eq!(scene.instance_data()[0].transform[7], 1.0);
        assert_relative_eq!(scene.instance_data()[0].prev_transform[7], 0.0);
    }

    #[test]
    fn test_arrays_grow_by_granularity() {
        let device = HeadlessDevice::new();
        let mut scene = scene_with(&device, SceneConfig::new().with_allocation_granularity(2));
        let mesh = MeshInfo::cube("box", 1.0, None).into_ref();
        for _ in 0..3 {
            scene
                .graph()
                .attach_leaf_node(Some(&scene.graph().root()), &SceneGraphLeaf::mesh_instance(Rc::clone(&mesh)));
        }
        scene.finished_loading(0).unwrap();

        assert_eq!(scene.instance_data().len(), 4);
        assert_eq!(scene.geometry_data().len(), 2);
        assert!(scene.material_data().is_empty());
        assert_eq!(scene.geometry_data()[0].material_index, -1);
        assert_eq!(scene.instance_data()[2].first_geometry_instance_index, 2);
    }

    #[test]
    fn test_without_descriptor_table_no_bindless_tables() {
        let device = HeadlessDevice::new();
        let mut scene = Scene::new(Box::new(device.clone()), None, SceneConfig::new());
        scene
            .graph()
            .attach_leaf_node(
                Some(&scene.graph().root()),
                &SceneGraphLeaf::mesh_instance(MeshInfo::cube("box", 1.0, None).into_ref()),
            );
        scene.finished_loading(0).unwrap();

        assert!(scene.geometry_buffer().is_none());
        assert!(scene.material_buffer().is_none());
        assert!(scene.instance_buffer().is_some());
        assert!(scene.geometry_data().is_empty());
    }

    struct Rig {
        scene: Scene,
        device: HeadlessDevice,
        hip: SceneGraphNode,
        body: SceneGraphLeaf,
    }

    /// character / { hip, body } with the body skinned to the hip
    fn build_rig() -> Rig {
        let device = HeadlessDevice::new();
        let scene = scene_with(&device, SceneConfig::new());
        let prototype = MeshInfo::cube("body", 1.0, None).into_ref();

        let character = SceneGraphNode::named("character");
        let hip = SceneGraphNode::named("hip");
        hip.set_translation(&DVec3::new(0.0, 2.0, 0.0));
        let body_node = SceneGraphNode::named("body");
        body_node.set_translation(&DVec3::new(1.0, 0.0, 0.0));
        let body = SceneGraphLeaf::skinned_mesh_instance(&prototype);
        if let Some(mut skinned) = body.as_skinned_mesh_instance_mut() {
            skinned.joints.push(SkinnedMeshJoint {
                node: hip.downgrade(),
                inverse_bind_matrix: DMat4::identity(),
            });
        }
        hip.set_leaf(Some(SceneGraphLeaf::skinned_mesh_reference(&body)));
        body_node.set_leaf(Some(body.clone()));
        character.link_child(&body_node);
        character.link_child(&hip);
        scene.graph().attach(Some(&scene.graph().root()), &character);

        Rig { scene, device, hip, body }
    }

    fn dispatches(device: &HeadlessDevice) -> Vec<u32> {
        device
            .commands()
            .iter()
            .filter_map(|command| match command {
                RecordedCommand::Dispatch(groups) => Some(*groups),
                _ => None,
            })
            .collect()
    }

    fn last_push_constants(device: &HeadlessDevice) -> SkinningConstants {
        let bytes = device
            .commands()
            .iter()
            .rev()
            .find_map(|command| match command {
                RecordedCommand::PushConstants(bytes) => Some(bytes.clone()),
                _ => None,
            })
            .unwrap();
        bytemuck::pod_read_unaligned(&bytes)
    }

    #[test]
    fn test_skinning_resources_and_first_dispatch() {
        let Rig { mut scene, device, body, .. } = build_rig();
        scene.finished_loading(0).unwrap();

        let skinned = body.as_skinned_mesh_instance().unwrap();
        assert!(skinned.skinning_initialized);
        let group = skinned.mesh().buffer_group().unwrap();
        let group = group.borrow();
        assert_eq!(group.vertex_buffer_range(VertexAttribute::PrevPosition), BufferRange::new(24 * 12, 24 * 12));
        assert_eq!(group.vertex_buffer_range(VertexAttribute::Normal).byte_offset, 24 * 24);
        assert!(!group.has_attribute(VertexAttribute::TexCoord2));
        let prototype_group = skinned.prototype_mesh().buffer_group().unwrap();
        assert_eq!(group.index_buffer, prototype_group.borrow().index_buffer);

        let bindings = device.binding_set(skinned.skinning_binding_set.unwrap()).unwrap();
        assert_eq!(bindings[3], BindingItem::RawBufferUav { slot: 0, buffer: group.vertex_buffer.unwrap() });

        let constants = last_push_constants(&device);
        let flags = SkinningFlags::from_bits_truncate(constants.flags);
        assert_eq!(
            flags,
            SkinningFlags::FIRST_FRAME | SkinningFlags::NORMALS | SkinningFlags::TANGENTS | SkinningFlags::TEX_COORD1
        );
        assert_eq!(constants.num_vertices, 24);
        assert_eq!(constants.output_prev_position_offset, 24 * 12);
        assert_eq!(dispatches(&device), [1]);

        let commands = device.commands();
        let begin = commands.iter().position(|c| *c == RecordedCommand::BeginMarker("Skinning".into()));
        let named = commands.iter().position(|c| *c == RecordedCommand::BeginMarker("body".into()));
        assert!(begin.is_some() && named > begin);
        assert_eq!(commands.last(), Some(&RecordedCommand::EndMarker));

        let joints = device.buffer(skinned.joint_buffer.unwrap()).unwrap();
        let matrix: JointMatrix = bytemuck::pod_read_unaligned(&joints.data[..64]);
        assert_relative_eq!(matrix[3][0], -1.0);
        assert_relative_eq!(matrix[3][1], 2.0);
        assert_relative_eq!(matrix[0][0], 1.0);
    }

    #[test]
    fn test_skinning_runs_one_frame_after_last_motion() {
        let Rig { mut scene, device, hip, .. } = build_rig();
        scene.finished_loading(0).unwrap();
        let mut list = device.clone().create_command_list();

        device.clear_commands();
        scene.refresh(list.as_mut(), 5).unwrap();
        assert!(dispatches(&device).is_empty());

        hip.set_translation(&DVec3::new(0.0, 3.0, 0.0));
        for (frame, expected) in [(6, 1), (7, 1), (8, 0)] {
            device.clear_commands();
            scene.refresh(list.as_mut(), frame).unwrap();
            assert_eq!(dispatches(&device).len(), expected, "frame {frame}");
        }

        hip.set_translation(&DVec3::new(0.0, 4.0, 0.0));
        device.clear_commands();
        scene.refresh(list.as_mut(), 9).unwrap();
        let flags = SkinningFlags::from_bits_truncate(last_push_constants(&device).flags);
        assert!(!flags.contains(SkinningFlags::FIRST_FRAME));
    }

    #[test]
    fn test_grow_to_rounds_up() {
        assert_eq!(grow_to(1, 1024), 1024);
        assert_eq!(grow_to(1024, 1024), 1024);
        assert_eq!(grow_to(1025, 1024), 2048);
        assert_eq!(grow_to(3, 0), 3);
    }
}
