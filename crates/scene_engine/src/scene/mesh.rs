//! Mesh data model
//!
//! A [`MeshInfo`] is shared between every instance that draws it. Vertex and
//! index data live in a [`BufferGroup`], which several meshes of one model may
//! share: each mesh addresses its part of the group through `index_offset` and
//! `vertex_offset`, and each geometry addresses its part of the mesh through
//! the `*_offset_in_mesh` fields.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::foundation::math::{Box3, Vec2, Vec3, Vec4};
use crate::render::backend::{BufferHandle, DescriptorIndex};

use super::material::MaterialRef;

/// Shared mesh
pub type MeshRef = Rc<MeshInfo>;

/// Shared, mutable vertex and index storage
pub type BufferGroupRef = Rc<RefCell<BufferGroup>>;

/// Vertex streams of a [`BufferGroup`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VertexAttribute {
    /// `float3` position
    Position,
    /// `float3` previous-frame position, skinned buffers only
    PrevPosition,
    /// `float2` primary texture coordinate
    TexCoord1,
    /// `float2` secondary texture coordinate
    TexCoord2,
    /// Packed snorm8 normal
    Normal,
    /// Packed snorm8 tangent with handedness in `w`
    Tangent,
    /// Four `u16` joint indices
    JointIndices,
    /// `float4` joint weights
    JointWeights,
}

impl VertexAttribute {
    /// Number of attributes
    pub const COUNT: usize = 8;

    /// All attributes in declaration order
    pub const ALL: [Self; Self::COUNT] = [
        Self::Position,
        Self::PrevPosition,
        Self::TexCoord1,
        Self::TexCoord2,
        Self::Normal,
        Self::Tangent,
        Self::JointIndices,
        Self::JointWeights,
    ];

    /// Size of one element in bytes
    pub const fn element_size(self) -> u64 {
        match self {
            Self::Position | Self::PrevPosition => 12,
            Self::TexCoord1 | Self::TexCoord2 | Self::JointIndices => 8,
            Self::Normal | Self::Tangent => 4,
            Self::JointWeights => 16,
        }
    }

    const fn slot(self) -> usize {
        self as usize
    }
}

/// Byte range of one attribute stream inside a vertex buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferRange {
    /// Offset of the first element
    pub byte_offset: u64,
    /// Size of the stream; zero if absent
    pub byte_size: u64,
}

impl BufferRange {
    /// Range at `byte_offset` spanning `byte_size` bytes
    pub const fn new(byte_offset: u64, byte_size: u64) -> Self {
        Self { byte_offset, byte_size }
    }
}

/// Vertex and index data of one or more meshes.
///
/// The CPU-side arrays are emptied once they have been uploaded.
#[derive(Debug, Default)]
pub struct BufferGroup {
    /// GPU index buffer
    pub index_buffer: Option<BufferHandle>,
    /// GPU vertex buffer holding every attribute stream
    pub vertex_buffer: Option<BufferHandle>,
    /// Bindless slot of the index buffer
    pub index_buffer_descriptor: Option<DescriptorIndex>,
    /// Bindless slot of the vertex buffer
    pub vertex_buffer_descriptor: Option<DescriptorIndex>,
    vertex_buffer_ranges: [BufferRange; VertexAttribute::COUNT],

    /// 32-bit indices
    pub index_data: Vec<u32>,
    /// Positions
    pub position_data: Vec<Vec3>,
    /// Primary texture coordinates
    pub tex_coord1_data: Vec<Vec2>,
    /// Secondary texture coordinates
    pub tex_coord2_data: Vec<Vec2>,
    /// Normals, see [`pack_normal`]
    pub normal_data: Vec<u32>,
    /// Tangents, see [`pack_normal`]
    pub tangent_data: Vec<u32>,
    /// Joint indices
    pub joint_data: Vec<[u16; 4]>,
    /// Joint weights
    pub weight_data: Vec<Vec4>,
}

impl BufferGroup {
    /// Empty group
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap into a shared reference
    pub fn into_ref(self) -> BufferGroupRef {
        Rc::new(RefCell::new(self))
    }

    /// True if the vertex buffer carries this attribute
    pub fn has_attribute(&self, attribute: VertexAttribute) -> bool {
        self.vertex_buffer_ranges[attribute.slot()].byte_size != 0
    }

    /// Byte range of an attribute stream
    pub fn vertex_buffer_range(&self, attribute: VertexAttribute) -> BufferRange {
        self.vertex_buffer_ranges[attribute.slot()]
    }

    /// Set the byte range of an attribute stream
    pub fn set_vertex_buffer_range(&mut self, attribute: VertexAttribute, range: BufferRange) {
        self.vertex_buffer_ranges[attribute.slot()] = range;
    }

    /// Number of CPU-side elements of an attribute
    pub fn attribute_len(&self, attribute: VertexAttribute) -> usize {
        match attribute {
            VertexAttribute::Position => self.position_data.len(),
            VertexAttribute::PrevPosition => 0,
            VertexAttribute::TexCoord1 => self.tex_coord1_data.len(),
            VertexAttribute::TexCoord2 => self.tex_coord2_data.len(),
            VertexAttribute::Normal => self.normal_data.len(),
            VertexAttribute::Tangent => self.tangent_data.len(),
            VertexAttribute::JointIndices => self.joint_data.len(),
            VertexAttribute::JointWeights => self.weight_data.len(),
        }
    }

    /// CPU-side bytes of an attribute stream
    pub fn attribute_bytes(&self, attribute: VertexAttribute) -> Vec<u8> {
        match attribute {
            VertexAttribute::Position => floats_to_bytes(self.position_data.iter().flat_map(|v| v.iter())),
            VertexAttribute::PrevPosition => Vec::new(),
            VertexAttribute::TexCoord1 => floats_to_bytes(self.tex_coord1_data.iter().flat_map(|v| v.iter())),
            VertexAttribute::TexCoord2 => floats_to_bytes(self.tex_coord2_data.iter().flat_map(|v| v.iter())),
            VertexAttribute::Normal => bytemuck::cast_slice(&self.normal_data).to_vec(),
            VertexAttribute::Tangent => bytemuck::cast_slice(&self.tangent_data).to_vec(),
            VertexAttribute::JointIndices => bytemuck::cast_slice(&self.joint_data).to_vec(),
            VertexAttribute::JointWeights => floats_to_bytes(self.weight_data.iter().flat_map(|v| v.iter())),
        }
    }

    /// Release the CPU-side copy of an attribute stream
    pub fn clear_attribute(&mut self, attribute: VertexAttribute) {
        match attribute {
            VertexAttribute::Position => self.position_data = Vec::new(),
            VertexAttribute::PrevPosition => {}
            VertexAttribute::TexCoord1 => self.tex_coord1_data = Vec::new(),
            VertexAttribute::TexCoord2 => self.tex_coord2_data = Vec::new(),
            VertexAttribute::Normal => self.normal_data = Vec::new(),
            VertexAttribute::Tangent => self.tangent_data = Vec::new(),
            VertexAttribute::JointIndices => self.joint_data = Vec::new(),
            VertexAttribute::JointWeights => self.weight_data = Vec::new(),
        }
    }
}

fn floats_to_bytes<'a>(values: impl Iterator<Item = &'a f32>) -> Vec<u8> {
    values.flat_map(|v| v.to_le_bytes()).collect()
}

/// Pack a unit vector and a sign into four snorm8 components
pub fn pack_normal(normal: &Vec3, w: f32) -> u32 {
    let quantize = |x: f32| -> u32 { u32::from((x.clamp(-1.0, 1.0) * 127.0).round() as i8 as u8) };
    quantize(normal.x) | (quantize(normal.y) << 8) | (quantize(normal.z) << 16) | (quantize(w) << 24)
}

/// A range of triangles drawn with one material
#[derive(Debug, Clone, Default)]
pub struct MeshGeometry {
    /// Surface material
    pub material: Option<MaterialRef>,
    /// Bounds in mesh space
    pub object_space_bounds: Box3,
    /// First index relative to the mesh
    pub index_offset_in_mesh: u32,
    /// First vertex relative to the mesh
    pub vertex_offset_in_mesh: u32,
    /// Index count
    pub num_indices: u32,
    /// Vertex count
    pub num_vertices: u32,
    /// Dense index across all meshes of the graph
    pub global_geometry_index: Cell<i32>,
}

/// Geometry shared by mesh instances
#[derive(Debug, Default)]
pub struct MeshInfo {
    /// Mesh name
    pub name: String,
    /// Vertex and index storage
    pub buffers: RefCell<Option<BufferGroupRef>>,
    /// Bind-pose mesh this one is skinned from
    pub skin_prototype: Option<MeshRef>,
    /// Draw ranges
    pub geometries: Vec<MeshGeometry>,
    /// Bounds in mesh space
    pub object_space_bounds: Box3,
    /// First index inside the buffer group
    pub index_offset: u32,
    /// First vertex inside the buffer group
    pub vertex_offset: u32,
    /// Index count across all geometries
    pub total_indices: u32,
    /// Vertex count across all geometries
    pub total_vertices: u32,
    /// Dense index across all meshes of the graph
    pub global_mesh_index: Cell<i32>,
}

impl MeshInfo {
    /// Build a mesh from its geometries, deriving totals and bounds
    pub fn new(name: impl Into<String>, buffers: BufferGroupRef, geometries: Vec<MeshGeometry>) -> Self {
        let object_space_bounds = geometries
            .iter()
            .fold(Box3::empty(), |bounds, geometry| bounds.union(&geometry.object_space_bounds));
        Self {
            name: name.into(),
            buffers: RefCell::new(Some(buffers)),
            total_indices: geometries.iter().map(|g| g.num_indices).sum(),
            total_vertices: geometries.iter().map(|g| g.num_vertices).sum(),
            geometries,
            object_space_bounds,
            ..Self::default()
        }
    }

    /// Per-instance mesh for skinning `prototype`.
    ///
    /// Geometries are copied so their global indices can differ from the
    /// prototype's; the vertex buffer is created later by the scene. Indices
    /// are read from the prototype's index buffer, vertices start at zero in
    /// the per-instance vertex buffer.
    pub fn skinned_copy(prototype: &MeshRef) -> Self {
        Self {
            name: prototype.name.clone(),
            buffers: RefCell::new(None),
            skin_prototype: Some(Rc::clone(prototype)),
            geometries: prototype.geometries.clone(),
            object_space_bounds: prototype.object_space_bounds,
            index_offset: prototype.index_offset,
            total_indices: prototype.total_indices,
            total_vertices: prototype.total_vertices,
            ..Self::default()
        }
    }

    /// Wrap into a shared reference
    pub fn into_ref(self) -> MeshRef {
        Rc::new(self)
    }

    /// Current buffer group, if assigned
    pub fn buffer_group(&self) -> Option<BufferGroupRef> {
        self.buffers.borrow().clone()
    }

    /// Axis-aligned cube of half-size `extent` with normals and texture coordinates
    pub fn cube(name: impl Into<String>, extent: f32, material: Option<MaterialRef>) -> Self {
        const FACES: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
            ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ];
        const CORNERS: [(f32, f32); 4] = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];

        let mut group = BufferGroup::new();
        for (normal, u_axis, v_axis) in FACES {
            let (normal, u_axis, v_axis) = (Vec3::from(normal), Vec3::from(u_axis), Vec3::from(v_axis));
            let base = u32::try_from(group.position_data.len()).unwrap_or(0);
            for (u, v) in CORNERS {
                group.position_data.push((normal + u_axis * u + v_axis * v) * extent);
                group.tex_coord1_data.push(Vec2::new((u + 1.0) * 0.5, (1.0 - v) * 0.5));
                group.normal_data.push(pack_normal(&normal, 0.0));
                group.tangent_data.push(pack_normal(&u_axis, 1.0));
            }
            group.index_data.extend([base, base + 1, base + 2, base + 2, base + 3, base]);
        }

        let geometry = MeshGeometry {
            material,
            object_space_bounds: Box3::from_center_extents(Vec3::zeros(), Vec3::repeat(extent)),
            num_indices: 36,
            num_vertices: 24,
            ..MeshGeometry::default()
        };
        Self::new(name, group.into_ref(), vec![geometry])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::material::Material;

    #[test]
    fn test_cube_totals_and_bounds() {
        let mesh = MeshInfo::cube("cube", 2.0, Some(Material::new("m").into_ref()));
        assert_eq!(mesh.total_indices, 36);
        assert_eq!(mesh.total_vertices, 24);
        assert_eq!(mesh.object_space_bounds.max, Vec3::repeat(2.0));

        let group = mesh.buffer_group().map(|g| g.borrow().position_data.len());
        assert_eq!(group, Some(24));
    }

    #[test]
    fn test_skinned_copy_shares_materials_but_not_geometries() {
        let material = Material::new("skin").into_ref();
        let prototype = MeshInfo::cube("body", 1.0, Some(Rc::clone(&material))).into_ref();
        let copy = MeshInfo::skinned_copy(&prototype);

        assert!(copy.buffer_group().is_none());
        assert!(copy.skin_prototype.as_ref().is_some_and(|p| Rc::ptr_eq(p, &prototype)));
        copy.geometries[0].global_geometry_index.set(5);
        assert_eq!(prototype.geometries[0].global_geometry_index.get(), 0);
        assert!(copy.geometries[0]
            .material
            .as_ref()
            .is_some_and(|m| Rc::ptr_eq(m, &material)));
    }

    #[test]
    fn test_attribute_ranges_mark_presence() {
        let mut group = BufferGroup::new();
        assert!(!group.has_attribute(VertexAttribute::Normal));
        group.set_vertex_buffer_range(VertexAttribute::Normal, BufferRange::new(64, 16));
        assert!(group.has_attribute(VertexAttribute::Normal));
        assert_eq!(group.vertex_buffer_range(VertexAttribute::Normal).byte_offset, 64);
    }

    #[test]
    fn test_pack_normal_quantizes_to_snorm8() {
        assert_eq!(pack_normal(&Vec3::new(1.0, 0.0, -1.0), 1.0), 0x7f81_007f);
    }
}
