//! Surface materials

use std::cell::RefCell;
use std::rc::Rc;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::foundation::math::{Vec3, Vec4};
use crate::render::backend::{BufferHandle, DescriptorIndex};
use crate::render::gpu_types::MaterialConstants;

/// Shared, mutable material
pub type MaterialRef = Rc<RefCell<Material>>;

/// How a material's surface interacts with coverage and transparency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MaterialDomain {
    /// Fully opaque
    #[default]
    Opaque,
    /// Discards pixels below the alpha cutoff
    AlphaTested,
    /// Blended by opacity
    AlphaBlended,
    /// Opaque with specular transmission
    Transmissive,
    /// Alpha-tested with specular transmission
    TransmissiveAlphaTested,
    /// Blended with specular transmission
    TransmissiveAlphaBlended,
}

impl MaterialDomain {
    /// Shader-side discriminant
    pub fn shader_value(self) -> i32 {
        self as i32
    }
}

bitflags! {
    /// Bits of [`MaterialConstants::flags`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MaterialFlags: u32 {
        /// Specular-gloss instead of metal-rough parameterization
        const USE_SPECULAR_GLOSS_MODEL = 0x01;
        /// Sample the base or diffuse texture
        const USE_BASE_OR_DIFFUSE_TEXTURE = 0x02;
        /// Sample the metal-rough or specular texture
        const USE_METAL_ROUGH_OR_SPECULAR_TEXTURE = 0x04;
        /// Sample the emissive texture
        const USE_EMISSIVE_TEXTURE = 0x08;
        /// Sample the normal texture
        const USE_NORMAL_TEXTURE = 0x10;
        /// Sample the occlusion texture
        const USE_OCCLUSION_TEXTURE = 0x20;
        /// Sample the transmission texture
        const USE_TRANSMISSION_TEXTURE = 0x40;
        /// Render back faces
        const DOUBLE_SIDED = 0x80;
        /// Thin-walled transmission
        const THIN_SURFACE = 0x100;
    }
}

/// A texture reference resolved to a bindless slot, with a per-material toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MaterialTexture {
    /// Bindless slot of the loaded texture
    pub descriptor: Option<DescriptorIndex>,
    /// Whether the shader should sample it
    pub enabled: bool,
}

impl MaterialTexture {
    /// A present, enabled texture
    pub fn bound(descriptor: DescriptorIndex) -> Self {
        Self {
            descriptor: Some(descriptor),
            enabled: true,
        }
    }

    fn active_index(&self) -> Option<DescriptorIndex> {
        self.descriptor.filter(|_| self.enabled)
    }
}

/// PBR material parameters
#[derive(Debug, Clone)]
pub struct Material {
    /// Unique name within its model
    pub name: String,
    /// Model file the material came from
    pub model_file_name: String,
    /// Blending domain
    pub domain: MaterialDomain,
    /// Base color or diffuse color
    pub base_or_diffuse_color: Vec3,
    /// Specular color (specular-gloss model)
    pub specular_color: Vec3,
    /// Emissive color
    pub emissive_color: Vec3,
    /// Emissive multiplier
    pub emissive_intensity: f32,
    /// Metalness
    pub metalness: f32,
    /// Roughness
    pub roughness: f32,
    /// Opacity, used by blended domains
    pub opacity: f32,
    /// Alpha test threshold, used by alpha-tested domains
    pub alpha_cutoff: f32,
    /// Specular transmission
    pub transmission_factor: f32,
    /// Diffuse transmission
    pub diffuse_transmission_factor: f32,
    /// Normal map strength
    pub normal_texture_scale: f32,
    /// Occlusion map strength
    pub occlusion_strength: f32,
    /// Index of refraction
    pub ior: f32,
    /// Specular-gloss parameterization
    pub use_specular_gloss_model: bool,
    /// Render back faces
    pub double_sided: bool,
    /// Thin-walled transmission
    pub thin_surface: bool,
    /// Base or diffuse texture
    pub base_or_diffuse_texture: MaterialTexture,
    /// Metal-rough or specular texture
    pub metal_rough_or_specular_texture: MaterialTexture,
    /// Normal texture
    pub normal_texture: MaterialTexture,
    /// Emissive texture
    pub emissive_texture: MaterialTexture,
    /// Occlusion texture
    pub occlusion_texture: MaterialTexture,
    /// Transmission texture
    pub transmission_texture: MaterialTexture,
    /// Per-material constant buffer, created on first buffer refresh
    pub material_constants: Option<BufferHandle>,
    /// Dense index assigned when the graph structure changes
    pub material_id: i32,
    /// Constants need re-uploading
    pub dirty: bool,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: String::new(),
            model_file_name: String::new(),
            domain: MaterialDomain::Opaque,
            base_or_diffuse_color: Vec3::new(1.0, 1.0, 1.0),
            specular_color: Vec3::zeros(),
            emissive_color: Vec3::zeros(),
            emissive_intensity: 1.0,
            metalness: 0.0,
            roughness: 0.0,
            opacity: 1.0,
            alpha_cutoff: 0.5,
            transmission_factor: 0.0,
            diffuse_transmission_factor: 0.0,
            normal_texture_scale: 1.0,
            occlusion_strength: 1.0,
            ior: 1.5,
            use_specular_gloss_model: false,
            double_sided: false,
            thin_surface: false,
            base_or_diffuse_texture: MaterialTexture::default(),
            metal_rough_or_specular_texture: MaterialTexture::default(),
            normal_texture: MaterialTexture::default(),
            emissive_texture: MaterialTexture::default(),
            occlusion_texture: MaterialTexture::default(),
            transmission_texture: MaterialTexture::default(),
            material_constants: None,
            material_id: 0,
            dirty: true,
        }
    }
}

impl Material {
    /// Create a named material with default parameters
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Wrap into a shared reference
    pub fn into_ref(self) -> MaterialRef {
        Rc::new(RefCell::new(self))
    }

    /// Write a named parameter, as driven by animation channels.
    ///
    /// Returns false if the material has no such parameter. A successful
    /// write marks the material dirty.
    pub fn set_property(&mut self, name: &str, value: &Vec4) -> bool {
        let xyz = value.xyz();
        let x = value.x;
        let flag = x > 0.5;
        match name {
            "baseOrDiffuseColor" => self.base_or_diffuse_color = xyz,
            "specularColor" => self.specular_color = xyz,
            "emissiveColor" => self.emissive_color = xyz,
            "emissiveIntensity" => self.emissive_intensity = x,
            "metalness" => self.metalness = x,
            "roughness" => self.roughness = x,
            "opacity" => self.opacity = x,
            "alphaCutoff" => self.alpha_cutoff = x,
            "transmissionFactor" => self.transmission_factor = x,
            "diffuseTransmissionFactor" => self.diffuse_transmission_factor = x,
            "normalTextureScale" => self.normal_texture_scale = x,
            "occlusionStrength" => self.occlusion_strength = x,
            "ior" => self.ior = x,
            "enableBaseOrDiffuseTexture" => self.base_or_diffuse_texture.enabled = flag,
            "enableMetalRoughOrSpecularTexture" => self.metal_rough_or_specular_texture.enabled = flag,
            "enableNormalTexture" => self.normal_texture.enabled = flag,
            "enableEmissiveTexture" => self.emissive_texture.enabled = flag,
            "enableOcclusionTexture" => self.occlusion_texture.enabled = flag,
            "enableTransmissionTexture" => self.transmission_texture.enabled = flag,
            _ => return false,
        }
        self.dirty = true;
        true
    }

    /// Pack the shader-visible parameter block
    pub fn fill_constant_buffer(&self) -> MaterialConstants {
        let mut flags = MaterialFlags::empty();
        flags.set(MaterialFlags::USE_SPECULAR_GLOSS_MODEL, self.use_specular_gloss_model);
        flags.set(MaterialFlags::DOUBLE_SIDED, self.double_sided);
        flags.set(MaterialFlags::THIN_SURFACE, self.thin_surface);

        let mut texture_index = |texture: &MaterialTexture, flag: MaterialFlags| {
            let index = texture.active_index();
            flags.set(flag, index.is_some());
            DescriptorIndex::shader_index(index)
        };
        let base_or_diffuse_texture_index =
            texture_index(&self.base_or_diffuse_texture, MaterialFlags::USE_BASE_OR_DIFFUSE_TEXTURE);
        let metal_rough_or_specular_texture_index = texture_index(
            &self.metal_rough_or_specular_texture,
            MaterialFlags::USE_METAL_ROUGH_OR_SPECULAR_TEXTURE,
        );
        let emissive_texture_index = texture_index(&self.emissive_texture, MaterialFlags::USE_EMISSIVE_TEXTURE);
        let normal_texture_index = texture_index(&self.normal_texture, MaterialFlags::USE_NORMAL_TEXTURE);
        let occlusion_texture_index = texture_index(&self.occlusion_texture, MaterialFlags::USE_OCCLUSION_TEXTURE);
        let transmission_texture_index =
            texture_index(&self.transmission_texture, MaterialFlags::USE_TRANSMISSION_TEXTURE);

        let opacity = match self.domain {
            MaterialDomain::AlphaBlended | MaterialDomain::TransmissiveAlphaBlended => self.opacity,
            _ => 1.0,
        };
        let alpha_cutoff = match self.domain {
            MaterialDomain::AlphaTested | MaterialDomain::TransmissiveAlphaTested => self.alpha_cutoff,
            // discard only fully transparent pixels
            MaterialDomain::AlphaBlended | MaterialDomain::TransmissiveAlphaBlended => 0.0,
            MaterialDomain::Opaque | MaterialDomain::Transmissive => -1.0,
        };

        MaterialConstants {
            base_or_diffuse_color: self.base_or_diffuse_color.into(),
            flags: flags.bits(),
            specular_color: self.specular_color.into(),
            material_id: self.material_id,
            emissive_color: (self.emissive_color * self.emissive_intensity).into(),
            domain: self.domain.shader_value(),
            opacity,
            roughness: self.roughness,
            metalness: self.metalness,
            normal_texture_scale: self.normal_texture_scale,
            occlusion_strength: self.occlusion_strength,
            alpha_cutoff,
            transmission_factor: self.transmission_factor,
            diffuse_transmission_factor: self.diffuse_transmission_factor,
            ior: self.ior,
            base_or_diffuse_texture_index,
            metal_rough_or_specular_texture_index,
            emissive_texture_index,
            normal_texture_index,
            occlusion_texture_index,
            transmission_texture_index,
            padding: 0,
        }
    }
}
