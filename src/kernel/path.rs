//! Per-tile path-tracing driver: primary ray generation, the LIFO bounce
//! loop with free-flight sampling in participating media, next-event
//! estimation with balance-heuristic MIS, russian-roulette termination,
//! and bounce-ray construction.

use crate::aliases::Vec3;
use crate::bsdf::{self, medium};
use crate::config::RenderConfig;
use crate::framebuffer::Tile;
use crate::hit_record::HitParameters;
use crate::kernel::{
    create_reflection_bounce_ray, create_refraction_bounce_ray, KernelContext, TileResult,
};
use crate::ray::Ray;
use crate::sampling::SamplerSession;
use crate::scene::RenderScene;
use crate::surface::calculate_surface_params;
use crate::util::max_component;
use std::sync::atomic::{AtomicBool, Ordering};

const ROULETTE_MIN_SURVIVAL: f32 = 0.05;
const SHADOW_RAY_MARGIN: f32 = 1.0 - 1e-3;

/// Render one tile at full sample count. Cancellation is polled between
/// pixels; a cancelled tile is returned incomplete.
pub fn trace_tile(
    scene: &RenderScene,
    config: &RenderConfig,
    tile: Tile,
    worker_id: usize,
    cancel: &AtomicBool,
) -> TileResult {
    let mut ctx = KernelContext::new(tile, config.image_width, config, worker_id);
    let mut incomplete = false;

    'samples: for sample_index in 0..config.samples_per_pixel {
        let mut sampler = SamplerSession::new(tile.index, sample_index);
        for y in tile.y0..tile.y1 {
            for x in tile.x0..tile.x1 {
                if cancel.load(Ordering::Relaxed) {
                    incomplete = true;
                    break 'samples;
                }
                let pixel_index = y * config.image_width + x;
                let jitter = sampler.image_jitter(pixel_index);
                let mut primary = scene.camera.generate_ray(x, y, jitter, pixel_index);
                if !config.preserve_ray_differentials {
                    // Global gate over the per-material flag: without it no
                    // ray carries differentials at all.
                    primary.differentials = None;
                }
                ctx.insert_ray(primary);
                while let Some(ray) = ctx.pop_ray() {
                    process_ray(scene, config, &mut ctx, &mut sampler, ray);
                }
                ctx.stats.paths_traced += 1;
            }
        }
    }

    let tile_copy = tile;
    let (pixels, stats) = ctx.into_pixels();
    TileResult {
        tile: tile_copy,
        pixels,
        incomplete,
        stats,
    }
}

fn process_ray(
    scene: &RenderScene,
    config: &RenderConfig,
    ctx: &mut KernelContext,
    sampler: &mut SamplerSession,
    ray: Ray,
) {
    let hit = scene
        .bound
        .scene
        .intersect(&ray.origin, &ray.direction, 0.0, f32::MAX);

    // Free-flight through a participating medium: either scatter before
    // the surface, or transmit up to it.
    let mut throughput = ray.throughput;
    if let Some(med) = ray.medium.filter(|m| !m.is_vacuum()) {
        let (distance, distance_pdf) = medium::sample_distance(&med, sampler);
        let t_surface = hit.map(|h| h.t).unwrap_or(f32::MAX);
        if distance < t_surface {
            let transmittance = medium::transmission(&med, distance);
            let weight = transmittance.component_mul(&med.sigma_s) / distance_pdf;
            let mut scatter_throughput = throughput.component_mul(&weight);
            if !roulette_survives(config, ray.bounce_count, &mut scatter_throughput, sampler) {
                return;
            }
            let (direction, _) = medium::sample_scatter_direction(sampler);
            let mut scatter = Ray::new(
                ray.evaluate(distance),
                direction,
                scatter_throughput,
                ray.pixel_index,
                ray.bounce_count + 1,
            );
            scatter.medium = Some(med);
            ctx.insert_ray(scatter);
            return;
        }
        // Reached the surface: weight by transmittance over the survival
        // probability of the flight.
        let pass = medium::surface_passthrough_probability(&med, t_surface);
        if pass <= 0.0 {
            return;
        }
        throughput = throughput.component_mul(&medium::transmission(&med, t_surface)) / pass;
    }

    let raw = match hit {
        Some(raw) => raw,
        None => {
            // Environment contribution, MIS-weighted against the light
            // sampler when the previous bounce was a finite lobe.
            let radiance = scene.background.radiance(&ray.direction);
            if radiance.norm_squared() > 0.0 {
                let weight = if ray.prev_bsdf_pdf > 0.0 {
                    let light_pdf = scene
                        .lights
                        .pdf_toward_environment(scene.background.as_ref(), &ray.direction);
                    ray.prev_bsdf_pdf / (ray.prev_bsdf_pdf + light_pdf)
                } else {
                    1.0
                };
                let mut miss_ray = ray;
                miss_ray.throughput = throughput;
                ctx.accumulate_from_ray(&miss_ray, &(weight * radiance));
            }
            return;
        }
    };

    let mut hit_params = HitParameters::new(&ray, raw.t, raw.geom_id, raw.prim_id, crate::aliases::Vec2::new(raw.u, raw.v));
    hit_params.throughput = throughput;

    let surface = match calculate_surface_params(&scene.model, &scene.bound, &hit_params, &raw) {
        Some(surface) => surface,
        None => {
            ctx.stats.non_finite_dropped += 1;
            return;
        }
    };

    // Emissive surfaces: front faces only, weighted against the light
    // sampler's chance of having found the same point.
    if surface.emissive.norm_squared() > 0.0 && surface.entering {
        let weight = if ray.prev_bsdf_pdf > 0.0 {
            let light_pdf = scene.lights.pdf_toward_hit(
                &ray.origin,
                &surface.position,
                &surface.geometric_normal,
                raw.geom_id,
                raw.prim_id,
            );
            ray.prev_bsdf_pdf / (ray.prev_bsdf_pdf + light_pdf)
        } else {
            1.0
        };
        ctx.accumulate_from_hit(&hit_params, &(weight * surface.emissive));
    }

    let wo = hit_params.view_direction;

    // Next-event estimation.
    if scene.lights.has_lights() {
        if let Some(light_sample) =
            scene
                .lights
                .sample(&surface.position, scene.background.as_ref(), sampler.rng())
        {
            if light_sample.pdf > 0.0 {
                let (f, bsdf_pdf) = bsdf::evaluate(&surface, &wo, &light_sample.direction);
                if f.norm_squared() > 0.0 {
                    let origin = surface.offset_ray_origin(&light_sample.direction);
                    let t_far = if light_sample.is_environment {
                        f32::MAX
                    } else {
                        light_sample.distance * SHADOW_RAY_MARGIN
                    };
                    ctx.stats.shadow_rays += 1;
                    if !scene
                        .bound
                        .scene
                        .occluded(&origin, &light_sample.direction, 0.0, t_far)
                    {
                        let cos = light_sample
                            .direction
                            .dot(&surface.perturbed_normal)
                            .abs();
                        let weight = light_sample.pdf / (light_sample.pdf + bsdf_pdf);
                        let contribution = f.component_mul(&light_sample.radiance)
                            * (cos * weight / light_sample.pdf);
                        ctx.accumulate_from_hit(&hit_params, &contribution);
                    }
                }
            }
        }
    }

    // Continuation via the shader's importance sampler.
    let sample = match bsdf::sample(&surface, &wo, sampler) {
        Some(sample) => sample,
        None => return,
    };

    let factor = if sample.is_delta() {
        // Delta convention: reflectance already carries the full weight.
        sample.reflectance
    } else {
        let cos = sample.wi.dot(&surface.perturbed_normal).abs();
        sample.reflectance * (cos / sample.pdf)
    };
    let mut bounce_throughput = hit_params.throughput.component_mul(&factor);

    if !roulette_survives(config, ray.bounce_count, &mut bounce_throughput, sampler) {
        return;
    }

    let mut bounce = if sample.is_transmission() && !crosses_as_thin(&surface) {
        create_refraction_bounce_ray(
            &surface,
            &hit_params,
            &sample.wi,
            &bounce_throughput,
            surface.ior_ratio,
        )
    } else {
        create_reflection_bounce_ray(&surface, &hit_params, &sample.wi, &bounce_throughput)
    };
    if !sample.is_transmission() || crosses_as_thin(&surface) {
        // Reflections and thin-sheet transmissions stay in the current
        // medium; only a real interface crossing switched it above.
        bounce.medium = ray.medium;
    }
    bounce.prev_bsdf_pdf = if sample.is_delta() { 0.0 } else { sample.pdf };
    ctx.insert_ray(bounce);
}

/// Thin-surface transmission does not cross into an interior medium.
fn crosses_as_thin(surface: &crate::surface::SurfaceParameters) -> bool {
    use crate::material::material_flags::THIN_SURFACE;
    surface.material_flags & THIN_SURFACE != 0
        || surface.shader == crate::bsdf::ShaderTag::DisneyThin
}

/// Russian roulette once the bounce count has reached the configured
/// start: survive with probability `q = clamp(max(throughput), 0.05, 1)`
/// and divide the throughput by `q` to stay unbiased.
fn roulette_survives(
    config: &RenderConfig,
    bounce_count: u32,
    throughput: &mut Vec3,
    sampler: &mut SamplerSession,
) -> bool {
    if bounce_count < config.roulette_start {
        return true;
    }
    let q = max_component(throughput).clamp(ROULETTE_MIN_SURVIVAL, 1.0);
    if sampler.uniform_f32() >= q {
        return false;
    }
    *throughput /= q;
    true
}
