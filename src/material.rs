use crate::aliases::Vec3;
use crate::bsdf::medium::MediumParameters;
use crate::bsdf::ShaderTag;

/// Index into the scalar attribute table of a material.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum ScalarAttribute {
    Roughness = 0,
    Metallic,
    SpecularTint,
    Anisotropic,
    Sheen,
    SheenTint,
    Clearcoat,
    ClearcoatGloss,
    Ior,
    Transmission,
    Specular,
    Flatness,
}

pub const SCALAR_ATTRIBUTE_COUNT: usize = 12;

pub mod material_flags {
    pub const ALPHA_TESTED: u32 = 1 << 0;
    pub const DISPLACEMENT_ENABLED: u32 = 1 << 1;
    pub const PRESERVE_RAY_DIFFERENTIALS: u32 = 1 << 2;
    pub const THIN_SURFACE: u32 = 1 << 3;
    pub const EMISSIVE: u32 = 1 << 4;
}

pub const INVALID_TEXTURE: u32 = u32::MAX;

/// Runtime material. Persisted as a `MaterialRecord` inside the model meta
/// blob; texture slots index into the owning model's texture array.
#[derive(Clone, Debug)]
pub struct Material {
    pub base_color: Vec3,
    pub emissive: Vec3,
    pub albedo_texture: u32,
    pub normal_texture: u32,
    /// Packed texture: roughness in G, metallic in B.
    pub roughness_metallic_texture: u32,
    pub displacement_texture: u32,
    pub displacement_scale: f32,
    pub scalar_attributes: [f32; SCALAR_ATTRIBUTE_COUNT],
    pub shader: ShaderTag,
    pub flags: u32,
    pub medium: MediumParameters,
}

impl Material {
    pub fn scalar(&self, attribute: ScalarAttribute) -> f32 {
        self.scalar_attributes[attribute as usize]
    }
    pub fn set_scalar(&mut self, attribute: ScalarAttribute, value: f32) {
        self.scalar_attributes[attribute as usize] = value;
    }
    pub fn has_flag(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }
    pub fn is_emissive(&self) -> bool {
        self.has_flag(material_flags::EMISSIVE)
    }
}

impl Default for Material {
    /// The material substituted when a mesh's material hash has no match:
    /// gray Disney solid, ior 1.5.
    fn default() -> Self {
        let mut scalar_attributes = [0.0f32; SCALAR_ATTRIBUTE_COUNT];
        scalar_attributes[ScalarAttribute::Roughness as usize] = 0.6;
        scalar_attributes[ScalarAttribute::Ior as usize] = 1.5;
        scalar_attributes[ScalarAttribute::Specular as usize] = 0.5;
        Material {
            base_color: Vec3::new(0.6, 0.6, 0.6),
            emissive: Vec3::zeros(),
            albedo_texture: INVALID_TEXTURE,
            normal_texture: INVALID_TEXTURE,
            roughness_metallic_texture: INVALID_TEXTURE,
            displacement_texture: INVALID_TEXTURE,
            displacement_scale: 0.0,
            scalar_attributes,
            shader: ShaderTag::DisneySolid,
            flags: 0,
            medium: MediumParameters::vacuum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_material_matches_fallback_contract() {
        let m = Material::default();
        assert_eq!(m.base_color, Vec3::new(0.6, 0.6, 0.6));
        assert_eq!(m.shader, ShaderTag::DisneySolid);
        assert_eq!(m.scalar(ScalarAttribute::Ior), 1.5);
        assert!(!m.is_emissive());
    }

    #[test]
    fn scalar_table_round_trips() {
        let mut m = Material::default();
        m.set_scalar(ScalarAttribute::Clearcoat, 0.75);
        assert_eq!(m.scalar(ScalarAttribute::Clearcoat), 0.75);
    }
}
