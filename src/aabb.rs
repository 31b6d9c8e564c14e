use crate::aliases::Vec3;
use crate::util::{max_vec3, min_vec3};
use itertools::iproduct;

/// Axis-Aligned Bounding Box
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: &Vec3, max: &Vec3) -> Self {
        Aabb {
            min: *min,
            max: *max,
        }
    }
    pub fn empty() -> Self {
        Aabb::new(
            &Vec3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY),
            &Vec3::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
        )
    }
    pub fn is_empty(&self) -> bool {
        self.min[0] > self.max[0]
    }
    /// Slab test against a ray segment [t_min, t_max].
    pub fn hit(&self, origin: &Vec3, direction: &Vec3, t_min: f32, t_max: f32) -> bool {
        let mut t_min_int = t_min;
        let mut t_max_int = t_max;
        for a in 0..3 {
            let inv_d = 1.0 / direction[a];
            let mut t0 = (self.min[a] - origin[a]) * inv_d;
            let mut t1 = (self.max[a] - origin[a]) * inv_d;
            if inv_d < 0.0 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_min_int = f32::max(t_min_int, t0);
            t_max_int = f32::min(t_max_int, t1);
            if t_min_int > t_max_int {
                return false;
            }
        }
        true
    }
    pub fn unite(lhs: &Aabb, rhs: &Aabb) -> Aabb {
        Aabb::new(&min_vec3(&lhs.min, &rhs.min), &max_vec3(&lhs.max, &rhs.max))
    }
    pub fn append_point(&mut self, point: Vec3) {
        self.min = min_vec3(&self.min, &point);
        self.max = max_vec3(&self.max, &point);
    }
    pub fn from_points(pts: &[Vec3]) -> Self {
        let mut ret = Self::empty();
        for pt in pts {
            ret.append_point(*pt);
        }
        ret
    }
    pub fn center(&self) -> Vec3 {
        0.5 * (self.min + self.max)
    }
    /// Center and radius of the tightest sphere around the box.
    pub fn bounding_sphere(&self) -> (Vec3, f32) {
        if self.is_empty() {
            return (Vec3::zeros(), 0.0);
        }
        let center = self.center();
        (center, (self.max - center).norm())
    }
    pub fn longest_extent(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        let d = self.max - self.min;
        d[0].max(d[1]).max(d[2])
    }
    pub fn vertices(&self) -> Vec<Vec3> {
        let self_min_max: [&Vec3; 2] = [&self.min, &self.max];
        iproduct!(0..2, 0..2, 0..2)
            .map(|(ix, iy, iz)| {
                Vec3::new(
                    self_min_max[ix][0],
                    self_min_max[iy][1],
                    self_min_max[iz][2],
                )
            })
            .collect()
    }
    pub fn area(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        let diff = self.max - self.min;
        debug_assert!(diff[0] >= 0.0 && diff[1] >= 0.0 && diff[2] >= 0.0);
        2.0 * (diff[0] * diff[1] + diff[1] * diff[2] + diff[2] * diff[0])
    }
    pub fn compare_center(&self, rhs: &Aabb, axis: usize) -> std::cmp::Ordering {
        debug_assert!(!self.is_empty() && !rhs.is_empty());
        let lhs_center: f32 = 0.5 * (self.min + self.max)[axis];
        let rhs_center: f32 = 0.5 * (rhs.min + rhs.max)[axis];
        lhs_center
            .partial_cmp(&rhs_center)
            .unwrap_or(std::cmp::Ordering::Equal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slab_test() {
        let b = Aabb::new(&Vec3::new(-1.0, -1.0, -1.0), &Vec3::new(1.0, 1.0, 1.0));
        assert!(b.hit(
            &Vec3::new(0.0, 0.0, -5.0),
            &Vec3::new(0.0, 0.0, 1.0),
            0.0,
            f32::MAX
        ));
        assert!(!b.hit(
            &Vec3::new(0.0, 0.0, -5.0),
            &Vec3::new(0.0, 0.0, -1.0),
            0.0,
            f32::MAX
        ));
        assert!(!b.hit(
            &Vec3::new(0.0, 5.0, -5.0),
            &Vec3::new(0.0, 0.0, 1.0),
            0.0,
            f32::MAX
        ));
    }

    #[test]
    fn bounding_sphere_encloses_corners() {
        let b = Aabb::new(&Vec3::new(0.0, 0.0, 0.0), &Vec3::new(2.0, 2.0, 2.0));
        let (center, radius) = b.bounding_sphere();
        for v in b.vertices() {
            assert!((v - center).norm() <= radius + 1e-5);
        }
    }

    #[test]
    fn empty_box_unites_to_identity() {
        let b = Aabb::new(&Vec3::new(0.0, 0.0, 0.0), &Vec3::new(1.0, 1.0, 1.0));
        let u = Aabb::unite(&Aabb::empty(), &b);
        assert_eq!(u, b);
    }
}
