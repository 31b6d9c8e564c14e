//! Disney-style shading family: the solid variant (diffuse + subsurface
//! approximation + sheen + GGX specular + clearcoat) and the thin variant
//! which adds a diffuse transmission lobe with no refraction bend.

use crate::aliases::Vec3;
use crate::bsdf::fresnel::{schlick_vec3, schlick_weight};
use crate::bsdf::ggx::{
    anisotropic_alpha, ggx_d, ggx_vndf_reflection_pdf, gtr1, gtr1_reflection_pdf, sample_ggx_vndf,
    sample_gtr1, smith_g1, smith_g2,
};
use crate::bsdf::{lobe_flags, BsdfSample, COS_EPSILON};
use crate::sampling::{cosine_hemisphere_pdf, random_cosine_direction, SamplerSession};
use crate::surface::SurfaceParameters;
use crate::util::{lerp, lerp_vec3, luminance};
use std::f32::consts::PI;

const MIN_PDF: f32 = 1e-6;
const CLEARCOAT_ALPHA_G: f32 = 0.25;

/// Lobe selection probabilities and shared terms, derived once per
/// evaluation from the surface attributes.
struct LobeWeights {
    ax: f32,
    ay: f32,
    clearcoat_alpha: f32,
    f0: Vec3,
    p_diffuse: f32,
    p_specular: f32,
    p_clearcoat: f32,
    p_transmission: f32,
}

fn lobe_weights(surface: &SurfaceParameters, thin: bool) -> LobeWeights {
    let (ax, ay) = anisotropic_alpha(surface.roughness.max(0.02), surface.anisotropic);
    let clearcoat_alpha = lerp(0.1, 0.001, surface.clearcoat_gloss);

    let tint = tint_color(&surface.base_color);
    let dielectric_f0 =
        0.08 * surface.specular * lerp_vec3(&Vec3::new(1.0, 1.0, 1.0), &tint, surface.specular_tint);
    let f0 = lerp_vec3(&dielectric_f0, &surface.base_color, surface.metallic);

    let transmission_weight = if thin {
        surface.transmission * (1.0 - surface.metallic)
    } else {
        0.0
    };
    let mut w_diffuse = (1.0 - surface.metallic) * (1.0 - transmission_weight);
    let w_specular = 1.0;
    let w_clearcoat = 0.25 * surface.clearcoat;
    let w_transmission = transmission_weight;
    if w_diffuse < 0.0 {
        w_diffuse = 0.0;
    }
    let total = w_diffuse + w_specular + w_clearcoat + w_transmission;
    LobeWeights {
        ax,
        ay,
        clearcoat_alpha,
        f0,
        p_diffuse: w_diffuse / total,
        p_specular: w_specular / total,
        p_clearcoat: w_clearcoat / total,
        p_transmission: w_transmission / total,
    }
}

fn tint_color(base_color: &Vec3) -> Vec3 {
    let lum = luminance(base_color);
    if lum > 0.0 {
        base_color / lum
    } else {
        Vec3::new(1.0, 1.0, 1.0)
    }
}

/// Burley diffuse with the Hanrahan-Krueger subsurface approximation mixed
/// in by `flatness`. Symmetric in (wo, wi).
fn diffuse_term(surface: &SurfaceParameters, cos_o: f32, cos_i: f32, cos_d: f32) -> f32 {
    let fl = schlick_weight(cos_i);
    let fv = schlick_weight(cos_o);
    let fd90 = 0.5 + 2.0 * surface.roughness * cos_d * cos_d;
    let fd = lerp(1.0, fd90, fl) * lerp(1.0, fd90, fv);

    let fss90 = surface.roughness * cos_d * cos_d;
    let fss = lerp(1.0, fss90, fl) * lerp(1.0, fss90, fv);
    let ss = 1.25 * (fss * (1.0 / (cos_o + cos_i) - 0.5) + 0.5);

    lerp(fd, ss, surface.flatness) / PI
}

fn sheen_term(surface: &SurfaceParameters, cos_d: f32) -> Vec3 {
    if surface.sheen <= 0.0 {
        return Vec3::zeros();
    }
    let tint = tint_color(&surface.base_color);
    let color = lerp_vec3(&Vec3::new(1.0, 1.0, 1.0), &tint, surface.sheen_tint);
    surface.sheen * schlick_weight(cos_d) * color
}

/// Reflection-side evaluation shared by solid and thin: returns
/// (reflectance, pdf) in the shading frame. `wo` and `wi` both upper
/// hemisphere.
fn evaluate_reflection(
    surface: &SurfaceParameters,
    weights: &LobeWeights,
    wo: &Vec3,
    wi: &Vec3,
) -> (Vec3, f32) {
    let cos_o = wo[2];
    let cos_i = wi[2];
    let h = (wo + wi).normalize();
    let cos_d = wi.dot(&h);

    let mut f = Vec3::zeros();
    let mut pdf = 0.0f32;

    if weights.p_diffuse > 0.0 {
        let diffuse_scale = (1.0 - surface.metallic)
            * if weights.p_transmission > 0.0 {
                1.0 - surface.transmission
            } else {
                1.0
            };
        f += diffuse_scale * diffuse_term(surface, cos_o, cos_i, cos_d) * surface.base_color;
        f += (1.0 - surface.metallic) * sheen_term(surface, cos_d) / PI;
        pdf += weights.p_diffuse * cosine_hemisphere_pdf(cos_i);
    }

    // GGX specular with Schlick Fresnel.
    let d = ggx_d(&h, weights.ax, weights.ay);
    let g = smith_g2(wo, wi, weights.ax, weights.ay);
    let fr = schlick_vec3(&weights.f0, cos_d);
    f += d * g / (4.0 * cos_o * cos_i) * fr;
    pdf += weights.p_specular * ggx_vndf_reflection_pdf(wo, &h, weights.ax, weights.ay);

    if surface.clearcoat > 0.0 {
        let dc = gtr1(h[2], weights.clearcoat_alpha);
        let fc = lerp(0.04, 1.0, schlick_weight(cos_d));
        let gc = smith_g2(wo, wi, CLEARCOAT_ALPHA_G, CLEARCOAT_ALPHA_G);
        f += Vec3::new(1.0, 1.0, 1.0) * 0.25 * surface.clearcoat * dc * fc * gc
            / (4.0 * cos_o * cos_i);
        pdf += weights.p_clearcoat * gtr1_reflection_pdf(wo, &h, weights.clearcoat_alpha);
    }

    (f, pdf)
}

/// Thin transmission: diffuse through the sheet, direction bent back along
/// the normal rather than refracted.
fn evaluate_thin_transmission(
    surface: &SurfaceParameters,
    weights: &LobeWeights,
    wi: &Vec3,
) -> (Vec3, f32) {
    let color = Vec3::new(
        surface.base_color[0].max(0.0).sqrt(),
        surface.base_color[1].max(0.0).sqrt(),
        surface.base_color[2].max(0.0).sqrt(),
    );
    let f = surface.transmission * (1.0 - surface.metallic) / PI * color;
    let pdf = weights.p_transmission * cosine_hemisphere_pdf(-wi[2]);
    (f, pdf)
}

fn sample_impl(
    surface: &SurfaceParameters,
    wo_world: &Vec3,
    sampler: &mut SamplerSession,
    thin: bool,
) -> Option<BsdfSample> {
    let frame = surface.frame();
    let wo = frame.world_to_local(wo_world);
    if wo[2] < COS_EPSILON {
        return None;
    }
    let weights = lobe_weights(surface, thin);

    let pick = sampler.uniform_f32();
    let (wi, flags) = if pick < weights.p_diffuse {
        (random_cosine_direction(sampler.rng()), lobe_flags::DIFFUSE)
    } else if pick < weights.p_diffuse + weights.p_specular {
        let h = sample_ggx_vndf(&wo, weights.ax, weights.ay, sampler.uniform_2d());
        let wi = 2.0 * wo.dot(&h) * h - wo;
        if wi[2] <= COS_EPSILON {
            return None;
        }
        (wi.normalize(), lobe_flags::SPECULAR)
    } else if thin && pick >= weights.p_diffuse + weights.p_specular + weights.p_clearcoat {
        // Thin transmission: cosine lobe on the far side.
        let d = random_cosine_direction(sampler.rng());
        (
            Vec3::new(d[0], d[1], -d[2]),
            lobe_flags::DIFFUSE | lobe_flags::TRANSMISSION,
        )
    } else {
        let h = sample_gtr1(weights.clearcoat_alpha, sampler.uniform_2d());
        let wi = 2.0 * wo.dot(&h) * h - wo;
        if wi[2] <= COS_EPSILON {
            return None;
        }
        (wi.normalize(), lobe_flags::SPECULAR)
    };

    let (f, pdf) = if wi[2] > 0.0 {
        evaluate_reflection(surface, &weights, &wo, &wi)
    } else if thin {
        evaluate_thin_transmission(surface, &weights, &wi)
    } else {
        return None;
    };
    if pdf < MIN_PDF {
        return None;
    }
    Some(BsdfSample {
        wi: frame.local_to_world(&wi),
        reflectance: f,
        pdf,
        flags,
    })
}

fn evaluate_impl(
    surface: &SurfaceParameters,
    wo_world: &Vec3,
    wi_world: &Vec3,
    thin: bool,
) -> (Vec3, f32) {
    let frame = surface.frame();
    let wo = frame.world_to_local(wo_world);
    let wi = frame.world_to_local(wi_world);
    if wo[2] < COS_EPSILON {
        return (Vec3::zeros(), 0.0);
    }
    let weights = lobe_weights(surface, thin);
    if wi[2] >= COS_EPSILON {
        evaluate_reflection(surface, &weights, &wo, &wi)
    } else if thin && wi[2] <= -COS_EPSILON {
        evaluate_thin_transmission(surface, &weights, &wi)
    } else {
        (Vec3::zeros(), 0.0)
    }
}

pub fn sample_solid(
    surface: &SurfaceParameters,
    wo: &Vec3,
    sampler: &mut SamplerSession,
) -> Option<BsdfSample> {
    sample_impl(surface, wo, sampler, false)
}

pub fn sample_thin(
    surface: &SurfaceParameters,
    wo: &Vec3,
    sampler: &mut SamplerSession,
) -> Option<BsdfSample> {
    sample_impl(surface, wo, sampler, true)
}

pub fn evaluate_solid(surface: &SurfaceParameters, wo: &Vec3, wi: &Vec3) -> (Vec3, f32) {
    evaluate_impl(surface, wo, wi, false)
}

pub fn evaluate_thin(surface: &SurfaceParameters, wo: &Vec3, wi: &Vec3) -> (Vec3, f32) {
    evaluate_impl(surface, wo, wi, true)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::bsdf::medium::MediumParameters;
    use crate::bsdf::ShaderTag;
    use crate::surface::{SurfaceDifferentials, SurfaceParameters};

    pub(crate) fn test_surface(shader: ShaderTag) -> SurfaceParameters {
        SurfaceParameters {
            position: Vec3::zeros(),
            geometric_normal: Vec3::z(),
            perturbed_normal: Vec3::z(),
            tangent: Vec3::x(),
            bitangent: Vec3::y(),
            view_direction: Vec3::z(),
            uv: crate::aliases::Vec2::zeros(),
            base_color: Vec3::new(0.8, 0.8, 0.8),
            emissive: Vec3::zeros(),
            roughness: 0.5,
            metallic: 0.0,
            specular_tint: 0.0,
            anisotropic: 0.0,
            sheen: 0.0,
            sheen_tint: 0.5,
            clearcoat: 0.0,
            clearcoat_gloss: 0.5,
            ior: 1.5,
            transmission: 0.0,
            specular: 0.5,
            flatness: 0.0,
            shader,
            material_flags: 0,
            interior_medium: MediumParameters::vacuum(),
            differentials: SurfaceDifferentials::default(),
            rx_direction: None,
            ry_direction: None,
            entering: true,
            ior_ratio: 1.0 / 1.5,
            primitive_scale: 1.0,
        }
    }

    fn hemisphere_dir(sampler: &mut SamplerSession) -> Vec3 {
        loop {
            let d = crate::sampling::uniform_sphere_direction(sampler.rng());
            if d[2] > 0.0 {
                return d;
            }
        }
    }

    #[test]
    fn solid_conserves_energy() {
        // White furnace style bound: integral of f * cos over the
        // hemisphere stays at or below one for a non-transmissive lobe set.
        let surface = test_surface(ShaderTag::DisneySolid);
        let wo = Vec3::new(0.3, 0.0, 0.95).normalize();
        let mut sampler = SamplerSession::new(11, 0);
        const N: usize = 60_000;
        let mut integral = Vec3::zeros();
        for _ in 0..N {
            let wi = hemisphere_dir(&mut sampler);
            let (f, _) = evaluate_solid(&surface, &wo, &wi);
            integral += f * wi[2];
        }
        integral *= 2.0 * PI / N as f32;
        println!("[solid energy] {:?}", integral);
        for c in 0..3 {
            assert!(integral[c] <= 1.02, "channel {} = {}", c, integral[c]);
        }
    }

    #[test]
    fn solid_sample_pdf_consistency() {
        // E[f cos / pdf] from importance sampling matches the brute-force
        // hemispherical integral.
        let surface = test_surface(ShaderTag::DisneySolid);
        let wo = Vec3::new(0.2, -0.1, 0.9).normalize();
        let mut sampler = SamplerSession::new(12, 0);
        const N: usize = 80_000;
        let mut importance = Vec3::zeros();
        let mut valid = 0usize;
        for _ in 0..N {
            if let Some(s) = sample_solid(&surface, &wo, &mut sampler) {
                let frame = surface.frame();
                let cos_i = frame.world_to_local(&s.wi)[2].max(0.0);
                importance += s.reflectance * cos_i / s.pdf;
                valid += 1;
            }
        }
        importance /= N as f32;
        assert!(valid > N * 9 / 10);

        let mut brute = Vec3::zeros();
        for _ in 0..N {
            let wi = hemisphere_dir(&mut sampler);
            let (f, _) = evaluate_solid(&surface, &wo, &wi);
            brute += f * wi[2];
        }
        brute *= 2.0 * PI / N as f32;

        println!("[consistency] importance {:?} brute {:?}", importance, brute);
        for c in 0..3 {
            assert!(
                (importance[c] - brute[c]).abs() < 0.03 + 0.05 * brute[c],
                "channel {}: {} vs {}",
                c,
                importance[c],
                brute[c]
            );
        }
    }

    #[test]
    fn solid_is_reciprocal() {
        let mut surface = test_surface(ShaderTag::DisneySolid);
        surface.sheen = 0.5;
        surface.clearcoat = 0.6;
        surface.metallic = 0.3;
        let mut sampler = SamplerSession::new(13, 0);
        for _ in 0..64 {
            let a = hemisphere_dir(&mut sampler);
            let b = hemisphere_dir(&mut sampler);
            let (f_ab, _) = evaluate_solid(&surface, &a, &b);
            let (f_ba, _) = evaluate_solid(&surface, &b, &a);
            let lhs = f_ab * b[2];
            let rhs = f_ba * a[2];
            for c in 0..3 {
                let denom = lhs[c].abs().max(rhs[c].abs()).max(1e-3);
                assert!(
                    ((lhs[c] - rhs[c]).abs() / denom) < 1e-2,
                    "{} vs {}",
                    lhs[c],
                    rhs[c]
                );
            }
        }
    }

    #[test]
    fn thin_transmits_to_the_far_side() {
        let mut surface = test_surface(ShaderTag::DisneyThin);
        surface.transmission = 1.0;
        let wo = Vec3::new(0.0, 0.0, 1.0);
        let mut sampler = SamplerSession::new(14, 0);
        let mut transmitted = 0usize;
        let mut total = 0usize;
        for _ in 0..4000 {
            if let Some(s) = sample_thin(&surface, &wo, &mut sampler) {
                total += 1;
                if s.is_transmission() {
                    transmitted += 1;
                    assert!(s.wi[2] < 0.0);
                }
            }
        }
        assert!(total > 3000);
        // transmission = 1, metallic = 0: roughly 1/(1 + 1) of samples
        // take the transmission lobe.
        let frac = transmitted as f32 / total as f32;
        assert!(frac > 0.3 && frac < 0.7, "fraction {}", frac);
    }

    #[test]
    fn grazing_wo_is_rejected() {
        let surface = test_surface(ShaderTag::DisneySolid);
        let wo = Vec3::new(1.0, 0.0, 0.0);
        let mut sampler = SamplerSession::new(15, 0);
        assert!(sample_solid(&surface, &wo, &mut sampler).is_none());
        let (f, pdf) = evaluate_solid(&surface, &wo, &Vec3::z());
        assert_eq!(pdf, 0.0);
        assert_eq!(f, Vec3::zeros());
    }
}
