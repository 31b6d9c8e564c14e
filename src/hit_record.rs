use crate::aliases::{Vec2, Vec3};
use crate::ray::{Ray, RayDifferential};

/// Raw intersection state handed from the traversal backend to the shading
/// layer, plus the path state carried over from the parent ray.
#[derive(Clone, Copy)]
pub struct HitParameters {
    pub position: Vec3,
    /// Unit vector from the hit point back toward the ray origin.
    pub view_direction: Vec3,
    pub throughput: Vec3,
    pub pixel_index: u32,
    pub bounce_count: u32,
    pub geom_id: u32,
    pub prim_id: u32,
    pub barys: Vec2,
    pub differentials: Option<RayDifferential>,
}

impl HitParameters {
    pub fn new(ray: &Ray, t: f32, geom_id: u32, prim_id: u32, barys: Vec2) -> Self {
        HitParameters {
            position: ray.evaluate(t),
            view_direction: -ray.direction.normalize(),
            throughput: ray.throughput,
            pixel_index: ray.pixel_index,
            bounce_count: ray.bounce_count,
            geom_id,
            prim_id,
            barys,
            differentials: ray.differentials,
        }
    }
}
