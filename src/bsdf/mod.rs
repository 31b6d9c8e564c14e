//! The shader family. Dispatch is a closed match over the material's
//! shader tag so lobe code stays inlinable; every variant exposes the same
//! capability set {sample, evaluate, pdf}. Directions are world-space at
//! the boundary and converted into the shading frame internally.

pub mod disney;
pub mod fresnel;
pub mod ggx;
pub mod medium;
pub mod transparent;

use crate::aliases::Vec3;
use crate::sampling::SamplerSession;
use crate::surface::SurfaceParameters;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum ShaderTag {
    DisneySolid = 0,
    DisneyThin = 1,
    TransparentGgx = 2,
}

impl ShaderTag {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(ShaderTag::DisneySolid),
            1 => Some(ShaderTag::DisneyThin),
            2 => Some(ShaderTag::TransparentGgx),
            _ => None,
        }
    }
}

pub mod lobe_flags {
    pub const DIFFUSE: u32 = 1 << 0;
    pub const SPECULAR: u32 = 1 << 1;
    pub const TRANSMISSION: u32 = 1 << 2;
    /// Dirac lobe: pdf is reported as 1 and the sample must be excluded
    /// from MIS partner pdfs.
    pub const DELTA: u32 = 1 << 3;
}

/// Outcome of importance-sampling a shader.
#[derive(Clone, Copy, Debug)]
pub struct BsdfSample {
    /// Sampled direction, world space, unit length.
    pub wi: Vec3,
    /// BSDF value at (wo, wi); for delta lobes the full weight with the
    /// cosine and pdf already folded in.
    pub reflectance: Vec3,
    /// Solid-angle pdf; 1.0 for delta lobes by convention.
    pub pdf: f32,
    pub flags: u32,
}

impl BsdfSample {
    pub fn is_delta(&self) -> bool {
        self.flags & lobe_flags::DELTA != 0
    }
    pub fn is_transmission(&self) -> bool {
        self.flags & lobe_flags::TRANSMISSION != 0
    }
}

/// Cosines closer to zero than this are clamped before any division.
pub const COS_EPSILON: f32 = 1e-6;

/// Draw a direction from the surface's shader. `None` means the sample is
/// invalid (grazing wo, rejected direction) and the path ends.
pub fn sample(
    surface: &SurfaceParameters,
    wo: &Vec3,
    sampler: &mut SamplerSession,
) -> Option<BsdfSample> {
    match surface.shader {
        ShaderTag::DisneySolid => disney::sample_solid(surface, wo, sampler),
        ShaderTag::DisneyThin => disney::sample_thin(surface, wo, sampler),
        ShaderTag::TransparentGgx => transparent::sample(surface, wo, sampler),
    }
}

/// Evaluate reflectance and pdf for a fixed pair of directions; used by
/// next-event estimation. Delta lobes evaluate to zero.
pub fn evaluate(surface: &SurfaceParameters, wo: &Vec3, wi: &Vec3) -> (Vec3, f32) {
    match surface.shader {
        ShaderTag::DisneySolid => disney::evaluate_solid(surface, wo, wi),
        ShaderTag::DisneyThin => disney::evaluate_thin(surface, wo, wi),
        ShaderTag::TransparentGgx => transparent::evaluate(surface, wo, wi),
    }
}

/// Analytic pdf only.
pub fn pdf(surface: &SurfaceParameters, wo: &Vec3, wi: &Vec3) -> f32 {
    match surface.shader {
        ShaderTag::DisneySolid => disney::evaluate_solid(surface, wo, wi).1,
        ShaderTag::DisneyThin => disney::evaluate_thin(surface, wo, wi).1,
        ShaderTag::TransparentGgx => transparent::evaluate(surface, wo, wi).1,
    }
}
