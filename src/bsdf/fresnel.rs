use crate::aliases::Vec3;
use crate::util::lerp;

/// (1 - cos)^5 term shared by the Schlick approximations.
pub fn schlick_weight(cos_theta: f32) -> f32 {
    let m = (1.0 - cos_theta).clamp(0.0, 1.0);
    m * m * m * m * m
}

pub fn schlick(f0: f32, cos_theta: f32) -> f32 {
    lerp(f0, 1.0, schlick_weight(cos_theta))
}

pub fn schlick_vec3(f0: &Vec3, cos_theta: f32) -> Vec3 {
    let w = schlick_weight(cos_theta);
    f0 + (Vec3::new(1.0, 1.0, 1.0) - f0) * w
}

/// Reflectance at normal incidence for a dielectric interface.
pub fn schlick_r0_from_ior(ior: f32) -> f32 {
    let r = (ior - 1.0) / (ior + 1.0);
    r * r
}

/// Exact dielectric Fresnel reflectance for unpolarized light.
/// `cos_theta_i` is against the normal on the incident side; `eta` is the
/// relative index of refraction eta_i / eta_t. Returns 1.0 under total
/// internal reflection.
pub fn dielectric(cos_theta_i: f32, eta: f32) -> f32 {
    let cos_i = cos_theta_i.clamp(0.0, 1.0);
    let sin2_t = eta * eta * (1.0 - cos_i * cos_i);
    if sin2_t >= 1.0 {
        return 1.0;
    }
    let cos_t = (1.0 - sin2_t).sqrt();
    let r_parallel = (cos_i - eta * cos_t) / (cos_i + eta * cos_t);
    let r_perpendicular = (eta * cos_i - cos_t) / (eta * cos_i + cos_t);
    0.5 * (r_parallel * r_parallel + r_perpendicular * r_perpendicular)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schlick_matches_endpoints() {
        assert!((schlick(0.04, 1.0) - 0.04).abs() < 1e-6);
        assert!((schlick(0.04, 0.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn dielectric_normal_incidence_matches_r0() {
        // Air to glass, ior 1.5.
        let exact = dielectric(1.0, 1.0 / 1.5);
        let r0 = schlick_r0_from_ior(1.5);
        assert!((exact - r0).abs() < 1e-4);
    }

    #[test]
    fn total_internal_reflection_saturates() {
        // Glass to air past the critical angle (~41.8 degrees).
        let cos_i = 40.0f32.to_radians().cos();
        assert!(dielectric(cos_i, 1.5) < 1.0 || cos_i < 0.75);
        let cos_past = 80.0f32.to_radians().cos();
        assert_eq!(dielectric(cos_past, 1.5), 1.0);
    }

    #[test]
    fn grazing_reflectance_approaches_one() {
        assert!(dielectric(1e-4, 1.0 / 1.5) > 0.98);
    }
}
