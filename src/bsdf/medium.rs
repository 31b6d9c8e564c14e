use crate::aliases::Vec3;
use crate::sampling::{uniform_sphere_direction, UNIFORM_SPHERE_PDF};
use crate::sampling::SamplerSession;

/// Homogeneous isotropic participating medium.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MediumParameters {
    /// Absorption coefficient per unit distance.
    pub sigma_a: Vec3,
    /// Scattering coefficient per unit distance.
    pub sigma_s: Vec3,
}

impl MediumParameters {
    pub fn new(sigma_a: Vec3, sigma_s: Vec3) -> Self {
        MediumParameters { sigma_a, sigma_s }
    }
    pub fn vacuum() -> Self {
        MediumParameters {
            sigma_a: Vec3::zeros(),
            sigma_s: Vec3::zeros(),
        }
    }
    /// Extinction sigma_t = sigma_a + sigma_s.
    pub fn sigma_t(&self) -> Vec3 {
        self.sigma_a + self.sigma_s
    }
    pub fn mean_sigma_t(&self) -> f32 {
        let t = self.sigma_t();
        (t[0] + t[1] + t[2]) / 3.0
    }
    pub fn is_vacuum(&self) -> bool {
        self.mean_sigma_t() <= 0.0
    }
}

/// Draw a free-flight distance from the exponential distribution with rate
/// equal to the mean extinction. Returns (distance, pdf at that distance).
pub fn sample_distance(medium: &MediumParameters, sampler: &mut SamplerSession) -> (f32, f32) {
    let sigma = medium.mean_sigma_t();
    debug_assert!(sigma > 0.0);
    let u = sampler.uniform_f32().min(0.999_999);
    let distance = -(1.0 - u).ln() / sigma;
    let pdf = sigma * (-sigma * distance).exp();
    (distance, pdf)
}

/// Probability that the free flight exceeds `distance`; the weight for
/// paths that reach the next surface without scattering.
pub fn surface_passthrough_probability(medium: &MediumParameters, distance: f32) -> f32 {
    (-medium.mean_sigma_t() * distance).exp()
}

/// Isotropic phase function: uniform over the sphere.
pub fn sample_scatter_direction(sampler: &mut SamplerSession) -> (Vec3, f32) {
    (uniform_sphere_direction(sampler.rng()), UNIFORM_SPHERE_PDF)
}

pub fn scatter_direction_pdf(_wo: &Vec3, _wi: &Vec3) -> f32 {
    UNIFORM_SPHERE_PDF
}

/// Beer-Lambert transmittance over `distance`.
pub fn transmission(medium: &MediumParameters, distance: f32) -> Vec3 {
    let t = medium.sigma_t();
    Vec3::new(
        (-t[0] * distance).exp(),
        (-t[1] * distance).exp(),
        (-t[2] * distance).exp(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_medium() -> MediumParameters {
        MediumParameters::new(Vec3::new(0.5, 0.5, 0.5), Vec3::new(1.5, 1.5, 1.5))
    }

    #[test]
    fn transmission_is_beer_lambert() {
        let m = test_medium();
        let tr = transmission(&m, 2.0);
        let expected = (-2.0f32 * 2.0).exp();
        assert!((tr[0] - expected).abs() < 1e-6);
        assert!((transmission(&m, 0.0)[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn mean_free_path_matches_extinction() {
        let m = test_medium();
        let mut sampler = SamplerSession::new(0, 0);
        const N: usize = 50000;
        let mut sum = 0.0f64;
        for _ in 0..N {
            let (d, pdf) = sample_distance(&m, &mut sampler);
            assert!(pdf > 0.0);
            sum += d as f64;
        }
        let mean = sum / N as f64;
        let expected = 1.0 / m.mean_sigma_t() as f64;
        assert!((mean - expected).abs() / expected < 0.05);
    }

    #[test]
    fn scatter_direction_pdf_integrates_to_one() {
        // Uniform sphere pdf times the sphere area.
        let pdf = scatter_direction_pdf(&Vec3::x(), &Vec3::y());
        assert!((pdf * 4.0 * std::f32::consts::PI - 1.0).abs() < 1e-6);
    }

    #[test]
    fn vacuum_detection() {
        assert!(MediumParameters::vacuum().is_vacuum());
        assert!(!test_medium().is_vacuum());
    }
}
