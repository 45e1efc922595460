//! Shader-visible data layouts
//!
//! These structs are uploaded verbatim; field order and sizes must match the
//! shader-side declarations.

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};

/// Value stored in optional byte-offset fields when the attribute is absent
pub const INVALID_OFFSET: u32 = u32::MAX;

/// Per-instance data: 3x4 row-major world transforms and geometry ranges
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct InstanceData {
    /// Current local-to-world transform
    pub transform: [f32; 12],
    /// Local-to-world transform of the previous frame
    pub prev_transform: [f32; 12],
    /// First entry of this instance in the geometry-instance space
    pub first_geometry_instance_index: u32,
    /// Global index of the mesh's first geometry
    pub first_geometry_index: u32,
    /// Number of geometries in the mesh
    pub num_geometries: u32,
    /// Padding
    pub padding: u32,
}

/// Per-geometry bindless buffer locations
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct GeometryData {
    /// Index count
    pub num_indices: u32,
    /// Vertex count
    pub num_vertices: u32,
    /// Descriptor of the index buffer, -1 if none
    pub index_buffer_index: i32,
    /// Byte offset of the first index
    pub index_offset: u32,
    /// Descriptor of the vertex buffer, -1 if none
    pub vertex_buffer_index: i32,
    /// Byte offset of the first position
    pub position_offset: u32,
    /// Byte offset of the first previous-frame position
    pub prev_position_offset: u32,
    /// Byte offset of the first primary texture coordinate
    pub tex_coord1_offset: u32,
    /// Byte offset of the first secondary texture coordinate
    pub tex_coord2_offset: u32,
    /// Byte offset of the first packed normal
    pub normal_offset: u32,
    /// Byte offset of the first packed tangent
    pub tangent_offset: u32,
    /// Material slot, -1 if the geometry has no material
    pub material_index: i32,
}

impl Default for GeometryData {
    fn default() -> Self {
        Self {
            num_indices: 0,
            num_vertices: 0,
            index_buffer_index: -1,
            index_offset: 0,
            vertex_buffer_index: -1,
            position_offset: INVALID_OFFSET,
            prev_position_offset: INVALID_OFFSET,
            tex_coord1_offset: INVALID_OFFSET,
            tex_coord2_offset: INVALID_OFFSET,
            normal_offset: INVALID_OFFSET,
            tangent_offset: INVALID_OFFSET,
            material_index: -1,
        }
    }
}

/// Material parameter block
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct MaterialConstants {
    /// Base color (metal-rough) or diffuse color (specular-gloss)
    pub base_or_diffuse_color: [f32; 3],
    /// `MaterialFlags` bits
    pub flags: u32,
    /// Specular color
    pub specular_color: [f32; 3],
    /// Material slot
    pub material_id: i32,
    /// Emissive color premultiplied by intensity
    pub emissive_color: [f32; 3],
    /// `MaterialDomain` discriminant
    pub domain: i32,
    /// Opacity, 1 for non-blended domains
    pub opacity: f32,
    /// Roughness
    pub roughness: f32,
    /// Metalness
    pub metalness: f32,
    /// Normal map strength
    pub normal_texture_scale: f32,
    /// Occlusion map strength
    pub occlusion_strength: f32,
    /// Alpha test threshold; -1 never discards
    pub alpha_cutoff: f32,
    /// Specular transmission
    pub transmission_factor: f32,
    /// Diffuse transmission
    pub diffuse_transmission_factor: f32,
    /// Index of refraction
    pub ior: f32,
    /// Bindless texture slots, -1 if unused
    pub base_or_diffuse_texture_index: i32,
    /// Metal-rough or specular texture slot
    pub metal_rough_or_specular_texture_index: i32,
    /// Emissive texture slot
    pub emissive_texture_index: i32,
    /// Normal texture slot
    pub normal_texture_index: i32,
    /// Occlusion texture slot
    pub occlusion_texture_index: i32,
    /// Transmission texture slot
    pub transmission_texture_index: i32,
    /// Padding
    pub padding: u32,
}

/// Light type discriminants used by [`LightConstants::light_type`]
pub mod light_type {
    /// Directional light
    pub const DIRECTIONAL: i32 = 1;
    /// Spot light
    pub const SPOT: i32 = 2;
    /// Point light
    pub const POINT: i32 = 3;
}

/// Light parameter block
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct LightConstants {
    /// World-space direction the light travels along
    pub direction: [f32; 3],
    /// One of [`light_type`]
    pub light_type: i32,
    /// World-space position
    pub position: [f32; 3],
    /// Emitter radius
    pub radius: f32,
    /// Linear color
    pub color: [f32; 3],
    /// Intensity or irradiance
    pub intensity: f32,
    /// Angular size in radians (directional) or 1 / range (local lights)
    pub angular_size_or_inv_range: f32,
    /// Spot inner cone angle in radians
    pub inner_angle: f32,
    /// Spot outer cone angle in radians
    pub outer_angle: f32,
    /// Padding
    pub padding: u32,
}

bitflags! {
    /// Bits of [`SkinningConstants::flags`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SkinningFlags: u32 {
        /// Output buffer holds no valid positions yet; copy instead of
        /// rotating current into previous
        const FIRST_FRAME = 0x01;
        /// Skin normals
        const NORMALS = 0x02;
        /// Skin tangents
        const TANGENTS = 0x04;
        /// Copy primary texture coordinates
        const TEX_COORD1 = 0x08;
        /// Copy secondary texture coordinates
        const TEX_COORD2 = 0x10;
    }
}

/// Push constants of the skinning pass
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct SkinningConstants {
    /// Vertices to skin
    pub num_vertices: u32,
    /// `SkinningFlags` bits
    pub flags: u32,
    /// Byte offsets into the prototype vertex buffer
    pub input_position_offset: u32,
    /// Prototype normals
    pub input_normal_offset: u32,
    /// Prototype tangents
    pub input_tangent_offset: u32,
    /// Prototype primary texture coordinates
    pub input_tex_coord1_offset: u32,
    /// Prototype secondary texture coordinates
    pub input_tex_coord2_offset: u32,
    /// Prototype joint indices
    pub input_joint_index_offset: u32,
    /// Prototype joint weights
    pub input_joint_weight_offset: u32,
    /// Byte offsets into the skinned vertex buffer
    pub output_position_offset: u32,
    /// Skinned previous-frame positions
    pub output_prev_position_offset: u32,
    /// Skinned normals
    pub output_normal_offset: u32,
    /// Skinned tangents
    pub output_tangent_offset: u32,
    /// Skinned primary texture coordinates
    pub output_tex_coord1_offset: u32,
    /// Skinned secondary texture coordinates
    pub output_tex_coord2_offset: u32,
    /// Padding
    pub padding: u32,
}

/// Column-major 4x4 joint matrix as read by the skinning shader
pub type JointMatrix = [[f32; 4]; 4];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_sizes_are_16_byte_multiples() {
        assert_eq!(std::mem::size_of::<InstanceData>(), 112);
        assert_eq!(std::mem::size_of::<GeometryData>(), 48);
        assert_eq!(std::mem::size_of::<MaterialConstants>(), 112);
        assert_eq!(std::mem::size_of::<LightConstants>(), 64);
        assert_eq!(std::mem::size_of::<SkinningConstants>(), 64);
        assert_eq!(std::mem::size_of::<JointMatrix>(), 64);
    }

    #[test]
    fn test_geometry_defaults_mark_missing_attributes() {
        let data = GeometryData::default();
        assert_eq!(data.material_index, -1);
        assert_eq!(data.normal_offset, INVALID_OFFSET);
        assert_eq!(bytemuck::bytes_of(&data).len(), 48);
    }
}
