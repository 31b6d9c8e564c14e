use crate::aliases::Vec3;
use std::ops::Index;

/// Orthonormal basis, 0=u (tangent), 1=v (bitangent), 2=w (normal).
pub struct Onb {
    axis: [Vec3; 3],
}

impl Onb {
    /// Build an orthonormal basis with w specified.
    /// w_dir is not required to be normalized.
    pub fn build_from_w(w_dir: &Vec3) -> Self {
        let w = w_dir.normalize();
        let another_dir = if w[0].abs() > 0.9 {
            Vec3::new(0.0, 1.0, 0.0)
        } else {
            Vec3::new(1.0, 0.0, 0.0)
        };
        let v = w.cross(&another_dir).normalize();
        let u = v.cross(&w);
        Onb { axis: [u, v, w] }
    }
    /// Build a shading frame from a normal and a candidate tangent.
    /// The tangent is re-orthogonalized against the normal (Gram-Schmidt);
    /// falls back to `build_from_w` when they are near-parallel.
    pub fn build_from_normal_tangent(normal: &Vec3, tangent: &Vec3) -> Self {
        let w = normal.normalize();
        let projected = tangent - tangent.dot(&w) * w;
        if projected.norm_squared() < 1e-8 {
            return Self::build_from_w(&w);
        }
        let u = projected.normalize();
        let v = w.cross(&u);
        Onb { axis: [u, v, w] }
    }
    pub fn u(&self) -> &Vec3 {
        &self.axis[0]
    }
    pub fn v(&self) -> &Vec3 {
        &self.axis[1]
    }
    pub fn w(&self) -> &Vec3 {
        &self.axis[2]
    }
    pub fn local_to_world(&self, uvw: &Vec3) -> Vec3 {
        uvw[0] * self.u() + uvw[1] * self.v() + uvw[2] * self.w()
    }
    pub fn world_to_local(&self, dir: &Vec3) -> Vec3 {
        Vec3::new(dir.dot(self.u()), dir.dot(self.v()), dir.dot(self.w()))
    }
}

impl Index<usize> for Onb {
    type Output = Vec3;
    fn index(&self, index: usize) -> &Vec3 {
        &self.axis[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_is_orthonormal() {
        let onb = Onb::build_from_w(&Vec3::new(0.3, -0.8, 0.2));
        assert!((onb.u().norm() - 1.0).abs() < 1e-5);
        assert!((onb.v().norm() - 1.0).abs() < 1e-5);
        assert!((onb.w().norm() - 1.0).abs() < 1e-5);
        assert!(onb.u().dot(onb.v()).abs() < 1e-5);
        assert!(onb.u().dot(onb.w()).abs() < 1e-5);
        assert!(onb.v().dot(onb.w()).abs() < 1e-5);
    }

    #[test]
    fn tangent_is_reorthogonalized() {
        let n = Vec3::new(0.0, 1.0, 0.0);
        let skewed = Vec3::new(1.0, 0.5, 0.0);
        let onb = Onb::build_from_normal_tangent(&n, &skewed);
        assert!(onb.u().dot(&n).abs() < 1e-6);
        assert!((onb.u() - Vec3::new(1.0, 0.0, 0.0)).norm() < 1e-5);
    }

    #[test]
    fn round_trips_between_spaces() {
        let onb = Onb::build_from_w(&Vec3::new(0.1, 0.9, -0.4));
        let d = Vec3::new(0.3, -0.5, 0.8).normalize();
        let back = onb.local_to_world(&onb.world_to_local(&d));
        assert!((back - d).norm() < 1e-5);
    }
}
