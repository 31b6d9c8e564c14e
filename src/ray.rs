use crate::aliases::Vec3;
use crate::bsdf::medium::MediumParameters;

/// Auxiliary rays one pixel over in x and y, used to estimate texture
/// filter widths at hit points.
#[derive(Clone, Copy, Debug)]
pub struct RayDifferential {
    pub rx_origin: Vec3,
    pub rx_direction: Vec3,
    pub ry_origin: Vec3,
    pub ry_direction: Vec3,
}

/// A path vertex in flight. Immutable once pushed onto the ray stack.
#[derive(Clone, Copy)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
    pub differentials: Option<RayDifferential>,
    pub throughput: Vec3,
    pub pixel_index: u32,
    pub bounce_count: u32,
    pub medium: Option<MediumParameters>,
    /// Solid-angle pdf of the BSDF sample that produced this ray; 0 marks
    /// primary rays and delta lobes, which take full weight on emissive
    /// hits instead of an MIS balance.
    pub prev_bsdf_pdf: f32,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3, throughput: Vec3, pixel_index: u32, bounce_count: u32) -> Self {
        Ray {
            origin,
            direction,
            differentials: None,
            throughput,
            pixel_index,
            bounce_count,
            medium: None,
            prev_bsdf_pdf: 0.0,
        }
    }
    pub fn with_differentials(mut self, differentials: RayDifferential) -> Self {
        self.differentials = Some(differentials);
        self
    }
    pub fn with_medium(mut self, medium: Option<MediumParameters>) -> Self {
        self.medium = medium;
        self
    }
    pub fn evaluate(&self, t: f32) -> Vec3 {
        self.origin + t * self.direction
    }
}
