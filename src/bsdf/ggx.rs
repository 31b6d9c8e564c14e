//! GGX microfacet distribution in the shading frame (normal = +z), with the
//! Heitz visible-normal sampling routine, plus the GTR1 distribution used by
//! the clearcoat lobe.

use crate::aliases::{Vec2, Vec3};
use std::f32::consts::PI;

pub const MIN_ALPHA: f32 = 1e-3;

/// Anisotropic alpha pair from the Disney roughness/anisotropic controls.
pub fn anisotropic_alpha(roughness: f32, anisotropic: f32) -> (f32, f32) {
    let aspect = (1.0 - 0.9 * anisotropic).sqrt();
    let a2 = roughness * roughness;
    ((a2 / aspect).max(MIN_ALPHA), (a2 * aspect).max(MIN_ALPHA))
}

/// Anisotropic GGX normal distribution, evaluated at half vector `h`.
pub fn ggx_d(h: &Vec3, ax: f32, ay: f32) -> f32 {
    let term = h[0] * h[0] / (ax * ax) + h[1] * h[1] / (ay * ay) + h[2] * h[2];
    if term <= 0.0 {
        return 0.0;
    }
    1.0 / (PI * ax * ay * term * term)
}

/// Smith masking for one direction (height-correlated form is not needed;
/// the separable form matches the sampling routine).
pub fn smith_g1(v: &Vec3, ax: f32, ay: f32) -> f32 {
    let cos2 = v[2] * v[2];
    if cos2 <= 0.0 {
        return 0.0;
    }
    let tan2 = ((v[0] * ax).powi(2) + (v[1] * ay).powi(2)) / cos2;
    2.0 / (1.0 + (1.0 + tan2).sqrt())
}

pub fn smith_g2(wo: &Vec3, wi: &Vec3, ax: f32, ay: f32) -> f32 {
    smith_g1(wo, ax, ay) * smith_g1(wi, ax, ay)
}

/// Sample a visible GGX normal for outgoing direction `wo` (Heitz 2018).
/// `wo` must be in the upper hemisphere.
pub fn sample_ggx_vndf(wo: &Vec3, ax: f32, ay: f32, u: Vec2) -> Vec3 {
    // Stretch to the hemisphere configuration.
    let vh = Vec3::new(ax * wo[0], ay * wo[1], wo[2]).normalize();

    // Orthonormal basis around vh.
    let lensq = vh[0] * vh[0] + vh[1] * vh[1];
    let t1 = if lensq > 0.0 {
        Vec3::new(-vh[1], vh[0], 0.0) / lensq.sqrt()
    } else {
        Vec3::new(1.0, 0.0, 0.0)
    };
    let t2 = vh.cross(&t1);

    // Parameterization of the projected area.
    let r = u[0].sqrt();
    let phi = 2.0 * PI * u[1];
    let p1 = r * phi.cos();
    let mut p2 = r * phi.sin();
    let s = 0.5 * (1.0 + vh[2]);
    p2 = (1.0 - s) * (1.0 - p1 * p1).max(0.0).sqrt() + s * p2;

    let p3 = (1.0 - p1 * p1 - p2 * p2).max(0.0).sqrt();
    let nh = p1 * t1 + p2 * t2 + p3 * vh;

    // Unstretch.
    Vec3::new(ax * nh[0], ay * nh[1], nh[2].max(1e-6)).normalize()
}

/// Solid-angle pdf of `sample_ggx_vndf` mapped through the reflection
/// jacobian: G1(wo) D(h) / (4 |cos theta_o|).
pub fn ggx_vndf_reflection_pdf(wo: &Vec3, h: &Vec3, ax: f32, ay: f32) -> f32 {
    // The |wo.h| of the visible-normal density cancels against the
    // reflection jacobian 1/(4 |wo.h|).
    let cos_o = wo[2].abs().max(1e-6);
    smith_g1(wo, ax, ay) * ggx_d(h, ax, ay) / (4.0 * cos_o)
}

/// GTR1 distribution (Burley), used for the clearcoat lobe.
pub fn gtr1(cos_h: f32, alpha: f32) -> f32 {
    if alpha >= 1.0 {
        return 1.0 / PI;
    }
    let a2 = alpha * alpha;
    let t = 1.0 + (a2 - 1.0) * cos_h * cos_h;
    (a2 - 1.0) / (PI * a2.ln() * t)
}

/// Sample a GTR1 half vector (pdf is D * cos over the hemisphere).
pub fn sample_gtr1(alpha: f32, u: Vec2) -> Vec3 {
    let a2 = (alpha * alpha).max(1e-6);
    let cos2 = (1.0 - a2.powf(1.0 - u[0])) / (1.0 - a2);
    let cos_h = cos2.clamp(0.0, 1.0).sqrt();
    let sin_h = (1.0 - cos_h * cos_h).max(0.0).sqrt();
    let phi = 2.0 * PI * u[1];
    Vec3::new(sin_h * phi.cos(), sin_h * phi.sin(), cos_h)
}

pub fn gtr1_reflection_pdf(wo: &Vec3, h: &Vec3, alpha: f32) -> f32 {
    let woh = wo.dot(h).abs().max(1e-6);
    gtr1(h[2], alpha) * h[2].abs() / (4.0 * woh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::SamplerSession;

    #[test]
    fn ggx_d_integrates_to_one_over_projected_area() {
        // Integral of D(h) cos(h) over the hemisphere is 1.
        const N: usize = 100_000;
        let mut sampler = SamplerSession::new(3, 0);
        let (ax, ay) = anisotropic_alpha(0.5, 0.0);
        let mut integral = 0.0f64;
        for _ in 0..N {
            let h = crate::sampling::random_in_cone(0.0, sampler.rng());
            if h[2] <= 0.0 {
                continue;
            }
            integral += (ggx_d(&h, ax, ay) * h[2]) as f64;
        }
        // Uniform hemisphere sampling: measure 2 pi.
        integral *= 2.0 * PI as f64 / N as f64;
        println!("[ggx_d integral] {}", integral);
        assert!((integral - 1.0).abs() < 0.05);
    }

    #[test]
    fn vndf_samples_are_upper_hemisphere_unit_vectors() {
        let mut sampler = SamplerSession::new(4, 0);
        let wo = Vec3::new(0.4, -0.2, 0.6).normalize();
        let (ax, ay) = anisotropic_alpha(0.3, 0.4);
        for _ in 0..2000 {
            let u = sampler.uniform_2d();
            let h = sample_ggx_vndf(&wo, ax, ay, u);
            assert!((h.norm() - 1.0).abs() < 1e-4);
            assert!(h[2] > 0.0);
        }
    }

    #[test]
    fn vndf_pdf_consistency() {
        // E[f/pdf] for f = D*G1*|wo.h|/cos_o over reflected directions
        // equals the directional albedo of the distribution (<= 1).
        let mut sampler = SamplerSession::new(5, 0);
        let wo = Vec3::new(0.3, 0.1, 0.9).normalize();
        let (ax, ay) = anisotropic_alpha(0.6, 0.0);
        const N: usize = 50_000;
        let mut sum = 0.0f64;
        for _ in 0..N {
            let u = sampler.uniform_2d();
            let h = sample_ggx_vndf(&wo, ax, ay, u);
            let pdf = ggx_vndf_reflection_pdf(&wo, &h, ax, ay);
            if pdf <= 0.0 {
                continue;
            }
            let d = ggx_d(&h, ax, ay);
            let g1 = smith_g1(&wo, ax, ay);
            let value = d * g1 * wo.dot(&h).abs() / (wo[2].abs() * 4.0 * wo.dot(&h).abs());
            sum += (value / pdf) as f64;
        }
        let mean = sum / N as f64;
        println!("[vndf pdf consistency] {}", mean);
        assert!((mean - 1.0).abs() < 0.02);
    }

    #[test]
    fn gtr1_sampling_matches_density() {
        let mut sampler = SamplerSession::new(6, 0);
        let alpha = 0.2f32;
        const N: usize = 50_000;
        // chi-square style check: fraction of samples below the median
        // cosine predicted by integrating D * cos.
        let mut below = 0usize;
        let probe = 0.9f32;
        for _ in 0..N {
            let h = sample_gtr1(alpha, sampler.uniform_2d());
            if h[2] < probe {
                below += 1;
            }
        }
        // Closed form from inverting sample_gtr1: cos_h decreases with u,
        // so P(cos_h < probe) = ln(1 - (1 - a2) probe^2) / ln(a2).
        let a2 = alpha * alpha;
        let expected = ((1.0 - (1.0 - a2) * probe * probe).ln() / a2.ln()).clamp(0.0, 1.0);
        let observed = below as f32 / N as f32;
        println!("[gtr1 cdf] observed {} expected {}", observed, expected);
        assert!((observed - expected).abs() < 0.02);
    }
}
