use crate::aliases::{RandGen, Vec3};
use crate::sampling::{uniform_sphere_direction, UNIFORM_SPHERE_PDF};

/// Environment illumination evaluated on ray miss, and samplable for
/// next-event estimation.
pub trait Background: Send + Sync {
    fn radiance(&self, direction: &Vec3) -> Vec3;
    /// Draw a world-space direction toward the environment with its
    /// solid-angle pdf.
    fn sample(&self, rng: &mut RandGen) -> (Vec3, f32) {
        (uniform_sphere_direction(rng), UNIFORM_SPHERE_PDF)
    }
    fn pdf(&self, _direction: &Vec3) -> f32 {
        UNIFORM_SPHERE_PDF
    }
    /// False for a black environment; lets the light sampler skip it.
    fn is_emissive(&self) -> bool {
        true
    }
}

pub struct UniformBackground {
    color: Vec3,
}

impl UniformBackground {
    pub fn new(color: &Vec3) -> Self {
        Self { color: *color }
    }
    pub fn black() -> Self {
        Self {
            color: Vec3::zeros(),
        }
    }
}

impl Background for UniformBackground {
    fn radiance(&self, _direction: &Vec3) -> Vec3 {
        self.color
    }
    fn is_emissive(&self) -> bool {
        self.color.norm_squared() > 0.0
    }
}

/// Vertical gradient sky.
pub struct GradientBackground {
    horizon: Vec3,
    zenith: Vec3,
}

impl GradientBackground {
    pub fn new(horizon: &Vec3, zenith: &Vec3) -> Self {
        Self {
            horizon: *horizon,
            zenith: *zenith,
        }
    }
}

impl Background for GradientBackground {
    fn radiance(&self, direction: &Vec3) -> Vec3 {
        let t = 0.5 * (direction.normalize()[1] + 1.0);
        (1.0 - t) * self.horizon + t * self.zenith
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn uniform_background_pdf_integrates_to_one() {
        let bg = UniformBackground::new(&Vec3::new(1.0, 1.0, 1.0));
        let mut rng = RandGen::seed_from_u64(1);
        let (dir, pdf) = bg.sample(&mut rng);
        assert!((dir.norm() - 1.0).abs() < 1e-4);
        assert!((pdf * 4.0 * std::f32::consts::PI - 1.0).abs() < 1e-5);
        assert_eq!(pdf, bg.pdf(&dir));
    }

    #[test]
    fn black_background_is_not_emissive() {
        assert!(!UniformBackground::black().is_emissive());
        assert!(UniformBackground::new(&Vec3::new(0.5, 0.5, 0.5)).is_emissive());
    }
}
