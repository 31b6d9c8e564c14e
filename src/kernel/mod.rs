//! Per-worker kernel state and the render orchestration. `insert_ray` is
//! the only mutator of the ray stack; `accumulate_*` are the only writers
//! into the pixel accumulator.

pub mod path;

use crate::aliases::Vec3;
use crate::config::RenderConfig;
use crate::error::Result;
use crate::framebuffer::{make_tiles, Framebuffer, Tile};
use crate::hit_record::HitParameters;
use crate::ray::{Ray, RayDifferential};
use crate::scene::RenderScene;
use crate::surface::SurfaceParameters;
use crate::util::is_finite_vec3;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::channel;
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, Default)]
pub struct KernelStats {
    pub paths_traced: u64,
    pub shadow_rays: u64,
    pub rays_discarded_at_bound: u64,
    pub non_finite_dropped: u64,
}

impl KernelStats {
    pub fn merge(&mut self, other: &KernelStats) {
        self.paths_traced += other.paths_traced;
        self.shadow_rays += other.shadow_rays;
        self.rays_discarded_at_bound += other.rays_discarded_at_bound;
        self.non_finite_dropped += other.non_finite_dropped;
    }
}

/// Transient per-worker state for one tile.
pub struct KernelContext {
    tile: Tile,
    image_width: u32,
    pixels: Vec<Vec3>,
    ray_stack: Vec<Ray>,
    ray_stack_capacity: usize,
    max_path_length: u32,
    worker_id: usize,
    pub stats: KernelStats,
}

impl KernelContext {
    pub fn new(tile: Tile, image_width: u32, config: &RenderConfig, worker_id: usize) -> Self {
        let capacity = config.ray_stack_capacity as usize;
        KernelContext {
            pixels: vec![Vec3::zeros(); tile.pixel_count()],
            tile,
            image_width,
            ray_stack: Vec::with_capacity(capacity),
            ray_stack_capacity: capacity,
            max_path_length: config.max_path_length,
            worker_id,
            stats: KernelStats::default(),
        }
    }

    /// Sole mutator of the ray stack. Rays whose bounce count has reached
    /// the path-length bound are discarded (tracked); a full stack is a
    /// configuration fault and panics with diagnostics.
    pub fn insert_ray(&mut self, ray: Ray) {
        if ray.bounce_count >= self.max_path_length {
            self.stats.rays_discarded_at_bound += 1;
            return;
        }
        assert!(
            self.ray_stack.len() < self.ray_stack_capacity,
            "ray stack overflow: capacity {} exceeded on worker {} (pixel {}, bounce {})",
            self.ray_stack_capacity,
            self.worker_id,
            ray.pixel_index,
            ray.bounce_count
        );
        self.ray_stack.push(ray);
    }

    pub fn pop_ray(&mut self) -> Option<Ray> {
        self.ray_stack.pop()
    }

    pub fn ray_stack_len(&self) -> usize {
        self.ray_stack.len()
    }

    fn local_pixel(&self, pixel_index: u32) -> Option<usize> {
        let x = pixel_index % self.image_width;
        let y = pixel_index / self.image_width;
        if x < self.tile.x0 || x >= self.tile.x1 || y < self.tile.y0 || y >= self.tile.y1 {
            return None;
        }
        let tile_width = self.tile.x1 - self.tile.x0;
        Some(((y - self.tile.y0) * tile_width + (x - self.tile.x0)) as usize)
    }

    fn accumulate(&mut self, pixel_index: u32, throughput: &Vec3, value: &Vec3) {
        let contribution = throughput.component_mul(value);
        if !is_finite_vec3(&contribution)
            || contribution[0] < 0.0
            || contribution[1] < 0.0
            || contribution[2] < 0.0
        {
            self.stats.non_finite_dropped += 1;
            return;
        }
        if let Some(local) = self.local_pixel(pixel_index) {
            self.pixels[local] += contribution;
        } else {
            debug_assert!(false, "pixel {} outside worker tile", pixel_index);
        }
    }

    /// Add `ray.throughput * value` into the ray's pixel.
    pub fn accumulate_from_ray(&mut self, ray: &Ray, value: &Vec3) {
        self.accumulate(ray.pixel_index, &ray.throughput, value);
    }

    /// Add `hit.throughput * value` into the hit's pixel. Must agree with
    /// `accumulate_from_ray` for equal throughputs.
    pub fn accumulate_from_hit(&mut self, hit: &HitParameters, value: &Vec3) {
        self.accumulate(hit.pixel_index, &hit.throughput, value);
    }

    pub fn into_pixels(self) -> (Vec<Vec3>, KernelStats) {
        (self.pixels, self.stats)
    }
}

/// Reflection continuation, differentials transformed analytically when the
/// material preserves them and the inbound ray carried them.
pub fn create_reflection_bounce_ray(
    surface: &SurfaceParameters,
    hit: &HitParameters,
    wi: &Vec3,
    throughput: &Vec3,
) -> Ray {
    let origin = surface.offset_ray_origin(wi);
    let mut ray = Ray::new(origin, *wi, *throughput, hit.pixel_index, hit.bounce_count + 1);
    if surface.preserves_ray_differentials() {
        if let Some(differentials) = reflect_differentials(surface, hit, wi, &origin) {
            ray = ray.with_differentials(differentials);
        }
    }
    ray
}

/// Refraction continuation; crosses the interface, so the medium switches
/// to the interior (entering) or back to vacuum (leaving).
pub fn create_refraction_bounce_ray(
    surface: &SurfaceParameters,
    hit: &HitParameters,
    wi: &Vec3,
    throughput: &Vec3,
    ior_ratio: f32,
) -> Ray {
    let origin = surface.offset_ray_origin(wi);
    let mut ray = Ray::new(origin, *wi, *throughput, hit.pixel_index, hit.bounce_count + 1);
    let interior = surface.interior_medium;
    ray.medium = if surface.entering && !interior.is_vacuum() {
        Some(interior)
    } else {
        None
    };
    if surface.preserves_ray_differentials() {
        if let Some(differentials) = refract_differentials(surface, hit, wi, &origin, ior_ratio) {
            ray = ray.with_differentials(differentials);
        }
    }
    ray
}

/// Igehy-style reflected direction differentials. Origins collapse onto
/// the offset origin; the directional terms carry the footprint.
fn reflect_differentials(
    surface: &SurfaceParameters,
    hit: &HitParameters,
    wi: &Vec3,
    origin: &Vec3,
) -> Option<RayDifferential> {
    let rx = surface.rx_direction?;
    let ry = surface.ry_direction?;
    let n = surface.perturbed_normal;
    let d = -hit.view_direction; // incident direction
    let diff = &surface.differentials;

    let transform = |aux: &Vec3, duv: &crate::aliases::Vec2| -> Vec3 {
        let dndx = diff.dndu * duv[0] + diff.dndv * duv[1];
        let ddx = aux - d;
        let d_dn_dx = ddx.dot(&n) + d.dot(&dndx);
        (wi + ddx - 2.0 * (d.dot(&n) * dndx + d_dn_dx * n)).normalize()
    };
    Some(RayDifferential {
        rx_origin: *origin,
        rx_direction: transform(&rx, &diff.duvdx),
        ry_origin: *origin,
        ry_direction: transform(&ry, &diff.duvdy),
    })
}

/// Refracted differentials; zeroed out (None) at grazing incidence where
/// the transmitted cosine falls under the epsilon guard.
fn refract_differentials(
    surface: &SurfaceParameters,
    hit: &HitParameters,
    wi: &Vec3,
    origin: &Vec3,
    ior_ratio: f32,
) -> Option<RayDifferential> {
    let rx = surface.rx_direction?;
    let ry = surface.ry_direction?;
    let n = surface.perturbed_normal;
    let d = -hit.view_direction;
    let diff = &surface.differentials;

    let cos_i = -d.dot(&n);
    let cos_t = -wi.dot(&n).abs();
    if cos_i.abs() < 1e-6 || cos_t.abs() < 1e-6 {
        return None;
    }
    let eta = ior_ratio;
    let mu = eta * cos_i - cos_t.abs();

    let transform = |aux: &Vec3, duv: &crate::aliases::Vec2| -> Vec3 {
        let dndx = diff.dndu * duv[0] + diff.dndv * duv[1];
        let ddx = aux - d;
        let d_dn_dx = ddx.dot(&n) + d.dot(&dndx);
        let dmudx = (eta - (eta * eta * d.dot(&n)) / wi.dot(&n)) * d_dn_dx;
        (wi + eta * ddx - (mu * dndx + dmudx * n)).normalize()
    };
    Some(RayDifferential {
        rx_origin: *origin,
        rx_direction: transform(&rx, &diff.duvdx),
        ry_origin: *origin,
        ry_direction: transform(&ry, &diff.duvdy),
    })
}

/// Result of one worker finishing (or abandoning) a tile.
pub struct TileResult {
    pub tile: Tile,
    pub pixels: Vec<Vec3>,
    pub incomplete: bool,
    pub stats: KernelStats,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SessionSummary {
    pub incomplete_tiles: u32,
    pub stats: KernelStats,
}

/// Render the scene over worker threads pulling tiles from a shared
/// queue. Deterministic for a fixed config regardless of worker count:
/// sampler state is keyed by (tile, sample), not by thread.
pub fn render(
    scene: &RenderScene,
    config: &RenderConfig,
    cancel: &AtomicBool,
) -> Result<(Framebuffer, SessionSummary)> {
    config.validate()?;
    let tiles = make_tiles(config.image_width, config.image_height, config.tile_size);
    let worker_count = config.effective_worker_count().min(tiles.len().max(1));
    let next_tile = AtomicUsize::new(0);

    let mut framebuffer = Framebuffer::new(config.image_width, config.image_height);
    let mut summary = SessionSummary::default();

    crossbeam::scope(|scope| {
        let (tx, rx) = channel::<TileResult>();
        for worker_id in 0..worker_count {
            let tx = tx.clone();
            let tiles = &tiles;
            let next_tile = &next_tile;
            scope.spawn(move |_| loop {
                let t = next_tile.fetch_add(1, Ordering::Relaxed);
                if t >= tiles.len() {
                    break;
                }
                let result = path::trace_tile(scene, config, tiles[t], worker_id, cancel);
                if tx.send(result).is_err() {
                    break;
                }
            });
        }
        drop(tx); // the receive loop ends when every worker is done

        while let Ok(result) = rx.recv() {
            if result.incomplete {
                summary.incomplete_tiles += 1;
            }
            summary.stats.merge(&result.stats);
            framebuffer.write_tile(&result.tile, &result.pixels);
        }
    })
    .map_err(|_| crate::error::Error::BackendError("render worker panicked".to_string()))?;

    if summary.incomplete_tiles > 0 {
        warn!(
            incomplete = summary.incomplete_tiles,
            "render cancelled with partial tiles"
        );
    }
    info!(
        paths = summary.stats.paths_traced,
        shadow_rays = summary.stats.shadow_rays,
        dropped = summary.stats.non_finite_dropped,
        "render complete"
    );
    Ok((framebuffer, summary))
}
