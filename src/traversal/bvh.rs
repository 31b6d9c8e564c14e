//! Reference implementation of the traversal contract: an SAH-built BVH
//! over triangles, quads (as triangle pairs) and curve segments (as
//! capsules). Subdivision geometries are displaced at commit time by the
//! registered callback; the tessellation rate is accepted but the base
//! mesh is not refined further.

use crate::aabb::Aabb;
use crate::aliases::{Vec2, Vec3};
use crate::error::{Error, Result};
use crate::traversal::{FilterFn, GeometryDesc, GeometryKind, RawHit, TraversalScene};

struct Triangle {
    v0: Vec3,
    v1: Vec3,
    v2: Vec3,
    /// Second half of a quad: remap barycentrics to (1-u, 1-v).
    flip_uv: bool,
}

struct Capsule {
    p0: Vec3,
    p1: Vec3,
    radius: f32,
}

enum PrimShape {
    Triangle(Triangle),
    Capsule(Capsule),
}

struct Prim {
    shape: PrimShape,
    aabb: Aabb,
    geom_id: u32,
    prim_id: u32,
    filter: Option<FilterFn>,
}

enum Node {
    Leaf {
        prims: Vec<u32>,
    },
    Inner {
        aabb: Aabb,
        axis: usize,
        left: Box<Node>,
        right: Box<Node>,
    },
}

pub struct BvhScene {
    prims: Vec<Prim>,
    root: Node,
}

impl BvhScene {
    pub fn build(geometries: Vec<(u32, GeometryDesc<'_>)>) -> Result<Self> {
        let mut prims = Vec::new();
        for (geom_id, desc) in &geometries {
            match desc.kind {
                GeometryKind::Triangles | GeometryKind::Quads | GeometryKind::Subdivision => {
                    collect_mesh_prims(*geom_id, desc, &mut prims)?;
                }
                GeometryKind::RoundBsplineCurves => {
                    collect_curve_prims(*geom_id, desc, &mut prims)?;
                }
            }
        }
        let order: Vec<u32> = (0..prims.len() as u32).collect();
        let root = build_node(&prims, order);
        Ok(BvhScene { prims, root })
    }

    fn hit_prim(&self, index: usize, origin: &Vec3, direction: &Vec3, t_near: f32, t_far: f32) -> Option<RawHit> {
        let prim = &self.prims[index];
        let candidate = match &prim.shape {
            PrimShape::Triangle(tri) => intersect_triangle(tri, origin, direction, t_near, t_far),
            PrimShape::Capsule(cap) => intersect_capsule(cap, origin, direction, t_near, t_far),
        }?;
        let hit = RawHit {
            t: candidate.0,
            geom_id: prim.geom_id,
            prim_id: prim.prim_id,
            u: candidate.1,
            v: candidate.2,
            geometric_normal: candidate.3,
        };
        if let Some(filter) = &prim.filter {
            if !filter(hit.geom_id, hit.prim_id, Vec2::new(hit.u, hit.v)) {
                return None;
            }
        }
        Some(hit)
    }

    fn hit_node(&self, node: &Node, origin: &Vec3, direction: &Vec3, t_near: f32, t_far: f32) -> Option<RawHit> {
        match node {
            Node::Leaf { prims } => {
                let mut best: Option<RawHit> = None;
                let mut limit = t_far;
                for &i in prims {
                    if let Some(hit) = self.hit_prim(i as usize, origin, direction, t_near, limit) {
                        limit = hit.t;
                        best = Some(hit);
                    }
                }
                best
            }
            Node::Inner {
                aabb,
                axis,
                left,
                right,
            } => {
                if !aabb.hit(origin, direction, t_near, t_far) {
                    return None;
                }
                let (first, second) = if direction[*axis] >= 0.0 {
                    (left, right)
                } else {
                    (right, left)
                };
                match self.hit_node(first, origin, direction, t_near, t_far) {
                    Some(hit_first) => self
                        .hit_node(second, origin, direction, t_near, hit_first.t)
                        .or(Some(hit_first)),
                    None => self.hit_node(second, origin, direction, t_near, t_far),
                }
            }
        }
    }
}

impl TraversalScene for BvhScene {
    fn intersect(&self, origin: &Vec3, direction: &Vec3, t_near: f32, t_far: f32) -> Option<RawHit> {
        self.hit_node(&self.root, origin, direction, t_near, t_far)
    }
    fn occluded(&self, origin: &Vec3, direction: &Vec3, t_near: f32, t_far: f32) -> bool {
        self.hit_node(&self.root, origin, direction, t_near, t_far)
            .is_some()
    }
}

fn collect_mesh_prims(geom_id: u32, desc: &GeometryDesc<'_>, prims: &mut Vec<Prim>) -> Result<()> {
    let per_face = desc.indices_per_face as usize;
    if per_face != 3 && per_face != 4 {
        return Err(Error::BackendError(format!(
            "unsupported indices per face: {}",
            per_face
        )));
    }
    if desc.indices.len() % per_face != 0 {
        return Err(Error::BackendError(
            "index count not a multiple of face arity".to_string(),
        ));
    }
    let face_count = desc.indices.len() / per_face;
    for face in 0..face_count {
        let idx = &desc.indices[face * per_face..(face + 1) * per_face];
        let mut corners = Vec::with_capacity(per_face);
        for &i in idx {
            let p = desc
                .positions
                .get(i as usize)
                .ok_or_else(|| Error::BackendError(format!("index {} out of range", i)))?;
            corners.push(Vec3::new(p[0], p[1], p[2]));
        }
        if let Some(displacement) = &desc.displacement {
            displace_corners(geom_id, face as u32, per_face, &mut corners, displacement);
        }
        let prim_id = face as u32;
        if per_face == 3 {
            push_triangle(prims, geom_id, prim_id, corners[0], corners[1], corners[2], false, desc);
        } else {
            // Quad split along the v0-v2 diagonal; the second half
            // reports flipped patch coordinates.
            push_triangle(prims, geom_id, prim_id, corners[0], corners[1], corners[3], false, desc);
            push_triangle(prims, geom_id, prim_id, corners[2], corners[3], corners[1], true, desc);
        }
    }
    Ok(())
}

fn displace_corners(
    geom_id: u32,
    face: u32,
    per_face: usize,
    corners: &mut [Vec3],
    displacement: &crate::traversal::DisplacementFn,
) {
    let normal = (corners[1] - corners[0])
        .cross(&(corners[per_face - 1] - corners[0]))
        .normalize();
    let corner_barys: [Vec2; 4] = [
        Vec2::new(0.0, 0.0),
        Vec2::new(1.0, 0.0),
        Vec2::new(1.0, 1.0),
        Vec2::new(0.0, 1.0),
    ];
    for (k, corner) in corners.iter_mut().enumerate() {
        let amount = displacement(geom_id, face, corner_barys[k]);
        *corner += amount * normal;
    }
}

#[allow(clippy::too_many_arguments)]
fn push_triangle(
    prims: &mut Vec<Prim>,
    geom_id: u32,
    prim_id: u32,
    v0: Vec3,
    v1: Vec3,
    v2: Vec3,
    flip_uv: bool,
    desc: &GeometryDesc<'_>,
) {
    prims.push(Prim {
        aabb: Aabb::from_points(&[v0, v1, v2]),
        shape: PrimShape::Triangle(Triangle { v0, v1, v2, flip_uv }),
        geom_id,
        prim_id,
        filter: desc.intersect_filter.clone(),
    });
}

fn collect_curve_prims(geom_id: u32, desc: &GeometryDesc<'_>, prims: &mut Vec<Prim>) -> Result<()> {
    for (segment, &start) in desc.indices.iter().enumerate() {
        let start = start as usize;
        let p0 = desc
            .curve_vertices
            .get(start)
            .ok_or_else(|| Error::BackendError(format!("curve index {} out of range", start)))?;
        let p1 = desc
            .curve_vertices
            .get(start + 1)
            .ok_or_else(|| Error::BackendError(format!("curve index {} out of range", start + 1)))?;
        let a = Vec3::new(p0[0], p0[1], p0[2]);
        let b = Vec3::new(p1[0], p1[1], p1[2]);
        let radius = p0[3].max(p1[3]);
        let mut aabb = Aabb::from_points(&[a, b]);
        aabb.min -= Vec3::new(radius, radius, radius);
        aabb.max += Vec3::new(radius, radius, radius);
        prims.push(Prim {
            aabb,
            shape: PrimShape::Capsule(Capsule { p0: a, p1: b, radius }),
            geom_id,
            prim_id: segment as u32,
            filter: desc.intersect_filter.clone(),
        });
    }
    Ok(())
}

const LEAF_SIZE: usize = 4;

fn build_node(prims: &[Prim], mut order: Vec<u32>) -> Node {
    if order.len() <= LEAF_SIZE {
        return Node::Leaf { prims: order };
    }
    // SAH sweep: pick the (axis, split index) minimizing
    // area(left) * n_left + area(right) * n_right.
    let mut best = (0usize, 0usize, f32::MAX);
    for axis in 0..3 {
        order.sort_unstable_by(|&a, &b| {
            prims[a as usize]
                .aabb
                .compare_center(&prims[b as usize].aabb, axis)
        });
        let areas = consecutive_united_areas(prims, &order);
        for i in 1..order.len() {
            let cost = areas[i].0 * i as f32 + areas[i].1 * (order.len() - i) as f32;
            if cost < best.2 {
                best = (axis, i, cost);
            }
        }
    }
    let (axis, split, _) = best;
    if split == 0 {
        return Node::Leaf { prims: order };
    }
    order.sort_unstable_by(|&a, &b| {
        prims[a as usize]
            .aabb
            .compare_center(&prims[b as usize].aabb, axis)
    });
    let right_order = order.split_off(split);
    let left = build_node(prims, order);
    let right = build_node(prims, right_order);
    let aabb = Aabb::unite(&node_aabb(prims, &left), &node_aabb(prims, &right));
    Node::Inner {
        aabb,
        axis,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn node_aabb(prims: &[Prim], node: &Node) -> Aabb {
    match node {
        Node::Leaf { prims: indices } => {
            let mut aabb = Aabb::empty();
            for &i in indices {
                aabb = Aabb::unite(&aabb, &prims[i as usize].aabb);
            }
            aabb
        }
        Node::Inner { aabb, .. } => *aabb,
    }
}

/// Prefix/suffix united surface areas: areas[i] is
/// (area of boxes [0,i)), area of boxes [i, len)).
fn consecutive_united_areas(prims: &[Prim], order: &[u32]) -> Vec<(f32, f32)> {
    let mut areas = vec![(0.0f32, 0.0f32); order.len() + 1];
    let mut front = Aabb::empty();
    let mut back = Aabb::empty();
    for i in 0..order.len() {
        front = Aabb::unite(&front, &prims[order[i] as usize].aabb);
        back = Aabb::unite(&back, &prims[order[order.len() - i - 1] as usize].aabb);
        areas[i + 1].0 = front.area();
        areas[order.len() - (i + 1)].1 = back.area();
    }
    areas
}

type Candidate = (f32, f32, f32, Vec3);

fn intersect_triangle(
    tri: &Triangle,
    origin: &Vec3,
    direction: &Vec3,
    t_near: f32,
    t_far: f32,
) -> Option<Candidate> {
    // Moller-Trumbore.
    let e1 = tri.v1 - tri.v0;
    let e2 = tri.v2 - tri.v0;
    let pvec = direction.cross(&e2);
    let det = e1.dot(&pvec);
    if det.abs() < 1e-12 {
        return None;
    }
    let inv_det = 1.0 / det;
    let tvec = origin - tri.v0;
    let u = tvec.dot(&pvec) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let qvec = tvec.cross(&e1);
    let v = direction.dot(&qvec) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = e2.dot(&qvec) * inv_det;
    if t <= t_near || t >= t_far {
        return None;
    }
    let normal = e1.cross(&e2).normalize();
    let (u, v) = if tri.flip_uv { (1.0 - u, 1.0 - v) } else { (u, v) };
    Some((t, u, v, normal))
}

fn intersect_capsule(
    cap: &Capsule,
    origin: &Vec3,
    direction: &Vec3,
    t_near: f32,
    t_far: f32,
) -> Option<Candidate> {
    let axis = cap.p1 - cap.p0;
    let len2 = axis.norm_squared();
    if len2 < 1e-12 {
        return None;
    }
    // Infinite cylinder around the axis, then clamp to the segment and
    // test the spherical caps.
    let d = direction;
    let m = origin - cap.p0;
    let nd = axis.dot(d) / len2;
    let nm = axis.dot(&m) / len2;
    let q = d - axis * nd;
    let r = m - axis * nm;
    let a = q.norm_squared();
    let b = 2.0 * q.dot(&r);
    let c = r.norm_squared() - cap.radius * cap.radius;
    let mut best: Option<Candidate> = None;
    if a > 1e-12 {
        let disc = b * b - 4.0 * a * c;
        if disc >= 0.0 {
            let sqrt_disc = disc.sqrt();
            for t in [(-b - sqrt_disc) / (2.0 * a), (-b + sqrt_disc) / (2.0 * a)] {
                if t <= t_near || t >= t_far {
                    continue;
                }
                let s = nm + t * nd; // axis parameter at the hit
                if (0.0..=1.0).contains(&s) {
                    let hit = origin + t * d;
                    let on_axis = cap.p0 + s * axis;
                    let normal = (hit - on_axis).normalize();
                    best = Some((t, s, 0.0, normal));
                    break;
                }
            }
        }
    }
    for (cap_center, s) in [(cap.p0, 0.0f32), (cap.p1, 1.0f32)] {
        if let Some(t) = intersect_sphere(&cap_center, cap.radius, origin, direction, t_near, t_far)
        {
            if best.map_or(true, |bst| t < bst.0) {
                let hit = origin + t * direction;
                let normal = (hit - cap_center).normalize();
                best = Some((t, s, 0.0, normal));
            }
        }
    }
    best
}

fn intersect_sphere(
    center: &Vec3,
    radius: f32,
    origin: &Vec3,
    direction: &Vec3,
    t_near: f32,
    t_far: f32,
) -> Option<f32> {
    let oc = origin - center;
    let a = direction.norm_squared();
    let b = 2.0 * oc.dot(direction);
    let c = oc.norm_squared() - radius * radius;
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return None;
    }
    let sqrt_disc = disc.sqrt();
    for t in [(-b - sqrt_disc) / (2.0 * a), (-b + sqrt_disc) / (2.0 * a)] {
        if t > t_near && t < t_far {
            return Some(t);
        }
    }
    None
}
