//! Contract for the ray/traversal collaborator. The path-tracing kernel
//! only depends on the `TraversalScene` trait; geometry registration goes
//! through `SceneBuilder`. A reference BVH implementation lives in `bvh`
//! so the renderer runs without an external acceleration library.

pub mod bvh;

use crate::aliases::{Vec2, Vec3};
use std::sync::Arc;

/// Candidate-hit filter, invoked from traversal threads. Arguments are
/// (geom_id, prim_id, barys); returning false rejects the candidate and
/// traversal continues behind it. Must only touch immutable scene data.
pub type FilterFn = Arc<dyn Fn(u32, u32, Vec2) -> bool + Send + Sync>;

/// Normal-directed displacement amount at (geom_id, prim_id, barys).
pub type DisplacementFn = Arc<dyn Fn(u32, u32, Vec2) -> f32 + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GeometryKind {
    Triangles,
    Quads,
    /// Subdivision mesh with a displacement callback; `indices_per_face`
    /// faces read through `face_index_counts`.
    Subdivision,
    /// Round B-spline curves; control points are xyz + radius.
    RoundBsplineCurves,
}

/// Shared-buffer description of one geometry. Buffers are borrowed; the
/// backend copies what it needs at commit time.
pub struct GeometryDesc<'a> {
    pub kind: GeometryKind,
    pub indices: &'a [u32],
    pub indices_per_face: u32,
    pub face_index_counts: &'a [u32],
    pub positions: &'a [[f32; 3]],
    pub curve_vertices: &'a [[f32; 4]],
    pub intersect_filter: Option<FilterFn>,
    pub displacement: Option<DisplacementFn>,
    pub tessellation_rate: f32,
}

impl<'a> Default for GeometryDesc<'a> {
    fn default() -> Self {
        GeometryDesc {
            kind: GeometryKind::Triangles,
            indices: &[],
            indices_per_face: 3,
            face_index_counts: &[],
            positions: &[],
            curve_vertices: &[],
            intersect_filter: None,
            displacement: None,
            tessellation_rate: 0.0,
        }
    }
}

/// Hit record produced by the backend.
#[derive(Clone, Copy, Debug)]
pub struct RawHit {
    pub t: f32,
    pub geom_id: u32,
    pub prim_id: u32,
    /// Barycentric / patch coordinates of the hit.
    pub u: f32,
    pub v: f32,
    pub geometric_normal: Vec3,
}

pub trait TraversalScene: Send + Sync {
    fn intersect(&self, origin: &Vec3, direction: &Vec3, t_near: f32, t_far: f32)
        -> Option<RawHit>;
    fn occluded(&self, origin: &Vec3, direction: &Vec3, t_near: f32, t_far: f32) -> bool;
}

/// Factory for traversal scenes. One device per process.
pub struct TraversalDevice {
    _private: (),
}

impl TraversalDevice {
    pub fn new() -> Self {
        TraversalDevice { _private: () }
    }
    pub fn new_scene(&self) -> SceneBuilder<'_> {
        SceneBuilder {
            geometries: Vec::new(),
        }
    }
}

impl Default for TraversalDevice {
    fn default() -> Self {
        Self::new()
    }
}

/// Accumulates geometry registrations until `commit` builds the
/// acceleration structure. Geometry ids are assigned by attach order.
pub struct SceneBuilder<'a> {
    geometries: Vec<(u32, GeometryDesc<'a>)>,
}

impl<'a> SceneBuilder<'a> {
    pub fn attach_geometry_by_id(&mut self, geom_id: u32, desc: GeometryDesc<'a>) {
        self.geometries.push((geom_id, desc));
    }
    pub fn commit(self) -> crate::error::Result<Arc<dyn TraversalScene>> {
        bvh::BvhScene::build(self.geometries).map(|s| Arc::new(s) as Arc<dyn TraversalScene>)
    }
}
