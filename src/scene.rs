//! Render-session scene: the bound model, the light list harvested from
//! emissive geometry, the environment, and the camera.

use crate::aliases::{RandGen, Vec3};
use crate::background::Background;
use crate::camera::Camera;
use crate::config::RenderConfig;
use crate::error::Result;
use crate::material::material_flags;
use crate::model::{bind_traversal, BoundScene, ModelResource};
use crate::traversal::TraversalDevice;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;

struct LightTriangle {
    p0: Vec3,
    e1: Vec3,
    e2: Vec3,
    normal: Vec3,
    area: f32,
}

/// An emissive face: one triangle, or a quad as a triangle pair.
pub struct AreaLight {
    tris: Vec<LightTriangle>,
    pub radiance: Vec3,
    pub total_area: f32,
}

/// Result of sampling direct lighting from a point.
pub struct LightSample {
    pub direction: Vec3,
    pub distance: f32,
    pub radiance: Vec3,
    /// Solid-angle pdf, including the light-selection probability.
    pub pdf: f32,
    /// True when the sample points at the environment (occlusion ray is
    /// unbounded).
    pub is_environment: bool,
}

/// Uniform selection over area lights and the (samplable) environment.
pub struct LightSampler {
    lights: Vec<AreaLight>,
    by_face: HashMap<(u32, u32), usize>,
    environment_emissive: bool,
}

impl LightSampler {
    /// Harvest emissive mesh faces into area lights.
    pub fn from_model(model: &ModelResource, environment_emissive: bool) -> Result<Self> {
        let views = model.geometry_views()?;
        let mut lights = Vec::new();
        let mut by_face = HashMap::new();

        for (geom_id, mesh) in model.meshes.iter().enumerate() {
            let material = model.find_material(mesh.material_hash);
            if !material.has_flag(material_flags::EMISSIVE) {
                continue;
            }
            let arity = mesh.indices_per_face as usize;
            let face_count = mesh.index_count as usize / arity;
            for face in 0..face_count {
                let (idx, _) = model.face_indices(mesh, face as u32)?;
                let p = |i: usize| Vec3::from(views.positions[idx[i] as usize]);
                let mut tris = Vec::new();
                tris.push(light_triangle(p(0), p(1), p(2)));
                if arity == 4 {
                    tris.push(light_triangle(p(0), p(2), p(3)));
                }
                let total_area = tris.iter().map(|t| t.area).sum();
                by_face.insert((geom_id as u32, face as u32), lights.len());
                lights.push(AreaLight {
                    tris,
                    radiance: material.emissive,
                    total_area,
                });
            }
        }
        Ok(LightSampler {
            lights,
            by_face,
            environment_emissive,
        })
    }

    fn strategy_count(&self) -> usize {
        self.lights.len() + usize::from(self.environment_emissive)
    }

    pub fn has_lights(&self) -> bool {
        self.strategy_count() > 0
    }

    /// Sample one direct-lighting strategy from `from`.
    pub fn sample(
        &self,
        from: &Vec3,
        background: &dyn Background,
        rng: &mut RandGen,
    ) -> Option<LightSample> {
        let count = self.strategy_count();
        if count == 0 {
            return None;
        }
        let select_pdf = 1.0 / count as f32;
        let choice = (rng.gen::<f32>() * count as f32) as usize;
        if choice >= self.lights.len() {
            let (direction, pdf) = background.sample(rng);
            return Some(LightSample {
                direction,
                distance: f32::MAX,
                radiance: background.radiance(&direction),
                pdf: pdf * select_pdf,
                is_environment: true,
            });
        }

        let light = &self.lights[choice];
        let (point, normal) = light.sample_point(rng);
        let to_light = point - from;
        let dist2 = to_light.norm_squared();
        if dist2 < 1e-12 {
            return None;
        }
        let distance = dist2.sqrt();
        let direction = to_light / distance;
        let cos_light = normal.dot(&(-direction));
        if cos_light <= 1e-6 {
            // Behind the emitter.
            return None;
        }
        // Area pdf converted to solid angle.
        let pdf = select_pdf * dist2 / (cos_light * light.total_area);
        Some(LightSample {
            direction,
            distance,
            radiance: light.radiance,
            pdf,
            is_environment: false,
        })
    }

    /// Solid-angle pdf of having light-sampled the point that a BSDF ray
    /// actually hit; the MIS partner term for emissive hits.
    pub fn pdf_toward_hit(
        &self,
        from: &Vec3,
        hit_position: &Vec3,
        hit_normal: &Vec3,
        geom_id: u32,
        prim_id: u32,
    ) -> f32 {
        let index = match self.by_face.get(&(geom_id, prim_id)) {
            Some(i) => *i,
            None => return 0.0,
        };
        let light = &self.lights[index];
        let to_light = hit_position - from;
        let dist2 = to_light.norm_squared();
        let cos_light = hit_normal.dot(&(-to_light.normalize())).abs();
        if cos_light <= 1e-6 {
            return 0.0;
        }
        dist2 / (cos_light * light.total_area * self.strategy_count() as f32)
    }

    /// MIS partner pdf for a BSDF ray that escaped to the environment.
    pub fn pdf_toward_environment(&self, background: &dyn Background, direction: &Vec3) -> f32 {
        if !self.environment_emissive {
            return 0.0;
        }
        background.pdf(direction) / self.strategy_count() as f32
    }
}

impl AreaLight {
    fn sample_point(&self, rng: &mut RandGen) -> (Vec3, Vec3) {
        // Pick a triangle by area, then uniform barycentrics.
        let mut pick = rng.gen::<f32>() * self.total_area;
        let mut tri = &self.tris[0];
        for t in &self.tris {
            if pick < t.area {
                tri = t;
                break;
            }
            pick -= t.area;
        }
        let r1 = rng.gen::<f32>().sqrt();
        let r2 = rng.gen::<f32>();
        let point = tri.p0 + r1 * ((1.0 - r2) * tri.e1 + r2 * tri.e2);
        (point, tri.normal)
    }
}

fn light_triangle(p0: Vec3, p1: Vec3, p2: Vec3) -> LightTriangle {
    let e1 = p1 - p0;
    let e2 = p2 - p0;
    let cross = e1.cross(&e2);
    LightTriangle {
        p0,
        e1,
        e2,
        normal: cross.normalize(),
        area: 0.5 * cross.norm(),
    }
}

pub struct RenderScene {
    pub model: Arc<ModelResource>,
    pub bound: BoundScene,
    pub lights: LightSampler,
    pub background: Arc<dyn Background>,
    pub camera: Camera,
}

impl RenderScene {
    pub fn new(
        model: Arc<ModelResource>,
        device: &TraversalDevice,
        config: &RenderConfig,
        background: Arc<dyn Background>,
    ) -> Result<Self> {
        let bound = bind_traversal(
            &model,
            device,
            config.enable_displacement,
            config.tessellation_rate,
        )?;
        let lights = LightSampler::from_model(&model, background.is_emissive())?;
        let camera = Camera::new(&model.camera, config.image_width, config.image_height);
        Ok(RenderScene {
            model,
            bound,
            lights,
            background,
            camera,
        })
    }
}
