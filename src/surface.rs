//! Resolves the shading state at a hit: interpolated attributes, the
//! re-orthogonalized tangent frame, texture lookups driven by ray
//! differentials, and the material's scalar table.

use crate::aliases::{Vec2, Vec3};
use crate::bsdf::medium::MediumParameters;
use crate::bsdf::ShaderTag;
use crate::hit_record::HitParameters;
use crate::material::{Material, ScalarAttribute};
use crate::model::{interpolate_patch_vec2, interpolate_patch_vec3, BoundScene, ModelResource};
use crate::onb::Onb;
use crate::traversal::RawHit;

#[derive(Clone, Copy, Debug, Default)]
pub struct SurfaceDifferentials {
    pub duvdx: Vec2,
    pub duvdy: Vec2,
    pub dndu: Vec3,
    pub dndv: Vec3,
}

impl SurfaceDifferentials {
    fn zeroed() -> Self {
        SurfaceDifferentials {
            duvdx: Vec2::zeros(),
            duvdy: Vec2::zeros(),
            dndu: Vec3::zeros(),
            dndv: Vec3::zeros(),
        }
    }
}

pub struct SurfaceParameters {
    pub position: Vec3,
    pub geometric_normal: Vec3,
    /// Shading normal after vertex interpolation and normal mapping.
    pub perturbed_normal: Vec3,
    pub tangent: Vec3,
    pub bitangent: Vec3,
    pub view_direction: Vec3,
    pub uv: Vec2,
    pub base_color: Vec3,
    pub emissive: Vec3,
    pub roughness: f32,
    pub metallic: f32,
    pub specular_tint: f32,
    pub anisotropic: f32,
    pub sheen: f32,
    pub sheen_tint: f32,
    pub clearcoat: f32,
    pub clearcoat_gloss: f32,
    pub ior: f32,
    pub transmission: f32,
    pub specular: f32,
    pub flatness: f32,
    pub shader: ShaderTag,
    pub material_flags: u32,
    /// Medium on the far side of the surface (interior when entering).
    pub interior_medium: MediumParameters,
    pub differentials: SurfaceDifferentials,
    pub rx_direction: Option<Vec3>,
    pub ry_direction: Option<Vec3>,
    /// True when the ray arrived from the outside (along the geometric
    /// normal's halfspace).
    pub entering: bool,
    /// Relative index of refraction eta_incident / eta_transmitted for the
    /// current crossing direction.
    pub ior_ratio: f32,
    /// Characteristic primitive size driving the self-intersection offset.
    pub primitive_scale: f32,
}

impl SurfaceParameters {
    pub fn frame(&self) -> Onb {
        Onb::build_from_normal_tangent(&self.perturbed_normal, &self.tangent)
    }

    /// Spawn origin biased off the surface along the geometric normal;
    /// the sign follows the side `direction` leaves through, so both
    /// reflection and refraction rays clear the surface.
    pub fn offset_ray_origin(&self, direction: &Vec3) -> Vec3 {
        let magnitude = (1e-4 * self.primitive_scale).max(1e-5);
        let sign = if direction.dot(&self.geometric_normal) >= 0.0 {
            1.0
        } else {
            -1.0
        };
        self.position + sign * magnitude * self.geometric_normal
    }

    pub fn preserves_ray_differentials(&self) -> bool {
        self.material_flags & crate::material::material_flags::PRESERVE_RAY_DIFFERENTIALS != 0
            && self.rx_direction.is_some()
    }
}

/// Build the full shading state for a hit. Returns `None` when the
/// geometry id does not resolve (stale handle), which callers treat as a
/// dropped sample.
pub fn calculate_surface_params(
    model: &ModelResource,
    bound: &BoundScene,
    hit: &HitParameters,
    raw: &RawHit,
) -> Option<SurfaceParameters> {
    let user_data = bound.user_data.get(hit.geom_id as usize)?;
    let material = model.material_at(user_data.material_index);

    if (hit.geom_id as usize) < bound.mesh_count {
        build_mesh_surface(model, hit, raw, material)
    } else {
        Some(build_curve_surface(hit, raw, material))
    }
}

fn build_mesh_surface(
    model: &ModelResource,
    hit: &HitParameters,
    raw: &RawHit,
    material: &Material,
) -> Option<SurfaceParameters> {
    let mesh = model.meshes.get(hit.geom_id as usize)?;
    let views = model.geometry_views().ok()?;
    let (idx, arity) = model.face_indices(mesh, hit.prim_id).ok()?;

    let position_at = |i: usize| Vec3::from(views.positions[idx[i] as usize]);
    let geometric_normal = orient_toward(&raw.geometric_normal, &hit.view_direction);

    // Shading normal: interpolated vertex normals when present.
    let mut shading_normal = if views.normals.is_empty() {
        geometric_normal
    } else {
        let normal_at = |i: usize| Vec3::from(views.normals[idx[i] as usize]);
        interpolate_patch_vec3(&hit.barys, arity, normal_at).normalize()
    };
    shading_normal = orient_toward(&shading_normal, &hit.view_direction);

    let uv = if views.uvs.is_empty() {
        hit.barys
    } else {
        let uv_at = |i: usize| Vec2::from(views.uvs[idx[i] as usize]);
        interpolate_patch_vec2(&hit.barys, arity, uv_at)
    };

    let tangent = if views.tangents.is_empty() {
        *Onb::build_from_w(&shading_normal).u()
    } else {
        let t = views.tangents[idx[0] as usize];
        Vec3::new(t[0], t[1], t[2])
    };

    // Attribute derivatives over the first triangle of the face.
    let (dpdu, dpdv, dndu, dndv) = attribute_derivatives(
        &position_at,
        &|i| {
            if views.normals.is_empty() {
                geometric_normal
            } else {
                Vec3::from(views.normals[idx[i] as usize])
            }
        },
        &|i| {
            if views.uvs.is_empty() {
                corner_uv(arity, i)
            } else {
                Vec2::from(views.uvs[idx[i] as usize])
            }
        },
    );

    let mut differentials = SurfaceDifferentials {
        duvdx: Vec2::zeros(),
        duvdy: Vec2::zeros(),
        dndu,
        dndv,
    };
    let mut rx_direction = None;
    let mut ry_direction = None;
    if let Some(rd) = &hit.differentials {
        let (duvdx, duvdy) = uv_screen_derivatives(
            &hit.position,
            &geometric_normal,
            &dpdu,
            &dpdv,
            &rd.rx_origin,
            &rd.rx_direction,
            &rd.ry_origin,
            &rd.ry_direction,
        );
        differentials.duvdx = duvdx;
        differentials.duvdy = duvdy;
        rx_direction = Some(rd.rx_direction);
        ry_direction = Some(rd.ry_direction);
    }

    // Textured attributes.
    let mut base_color = material.base_color;
    if let Some(texture) = model.texture(material.albedo_texture) {
        let sample = texture.sample(&uv, &differentials.duvdx, &differentials.duvdy);
        base_color = Vec3::new(
            base_color[0] * sample[0],
            base_color[1] * sample[1],
            base_color[2] * sample[2],
        );
    }
    let mut roughness = material.scalar(ScalarAttribute::Roughness);
    let mut metallic = material.scalar(ScalarAttribute::Metallic);
    if let Some(texture) = model.texture(material.roughness_metallic_texture) {
        let sample = texture.sample(&uv, &differentials.duvdx, &differentials.duvdy);
        roughness = sample[1];
        metallic = sample[2];
    }
    if let Some(texture) = model.texture(material.normal_texture) {
        let sample = texture.sample(&uv, &differentials.duvdx, &differentials.duvdy);
        let frame = Onb::build_from_normal_tangent(&shading_normal, &tangent);
        let mapped = Vec3::new(
            2.0 * sample[0] - 1.0,
            2.0 * sample[1] - 1.0,
            (2.0 * sample[2] - 1.0).max(1e-3),
        );
        shading_normal = frame.local_to_world(&mapped).normalize();
        shading_normal = orient_toward(&shading_normal, &hit.view_direction);
    }

    let entering = raw.geometric_normal.dot(&hit.view_direction) >= 0.0;
    let ior = material.scalar(ScalarAttribute::Ior).max(1.0);
    let ior_ratio = if entering { 1.0 / ior } else { ior };

    let primitive_scale = face_scale(&position_at, arity);
    let frame = Onb::build_from_normal_tangent(&shading_normal, &tangent);

    Some(SurfaceParameters {
        position: hit.position,
        geometric_normal,
        perturbed_normal: shading_normal,
        tangent: *frame.u(),
        bitangent: *frame.v(),
        view_direction: hit.view_direction,
        uv,
        base_color,
        emissive: material.emissive,
        roughness,
        metallic,
        specular_tint: material.scalar(ScalarAttribute::SpecularTint),
        anisotropic: material.scalar(ScalarAttribute::Anisotropic),
        sheen: material.scalar(ScalarAttribute::Sheen),
        sheen_tint: material.scalar(ScalarAttribute::SheenTint),
        clearcoat: material.scalar(ScalarAttribute::Clearcoat),
        clearcoat_gloss: material.scalar(ScalarAttribute::ClearcoatGloss),
        ior,
        transmission: material.scalar(ScalarAttribute::Transmission),
        specular: material.scalar(ScalarAttribute::Specular),
        flatness: material.scalar(ScalarAttribute::Flatness),
        shader: material.shader,
        material_flags: material.flags,
        interior_medium: material.medium,
        differentials,
        rx_direction,
        ry_direction,
        entering,
        ior_ratio,
        primitive_scale,
    })
}

fn build_curve_surface(hit: &HitParameters, raw: &RawHit, material: &Material) -> SurfaceParameters {
    let normal = orient_toward(&raw.geometric_normal, &hit.view_direction);
    let frame = Onb::build_from_w(&normal);
    SurfaceParameters {
        position: hit.position,
        geometric_normal: normal,
        perturbed_normal: normal,
        tangent: *frame.u(),
        bitangent: *frame.v(),
        view_direction: hit.view_direction,
        uv: hit.barys,
        base_color: material.base_color,
        emissive: material.emissive,
        roughness: material.scalar(ScalarAttribute::Roughness),
        metallic: material.scalar(ScalarAttribute::Metallic),
        specular_tint: material.scalar(ScalarAttribute::SpecularTint),
        anisotropic: material.scalar(ScalarAttribute::Anisotropic),
        sheen: material.scalar(ScalarAttribute::Sheen),
        sheen_tint: material.scalar(ScalarAttribute::SheenTint),
        clearcoat: material.scalar(ScalarAttribute::Clearcoat),
        clearcoat_gloss: material.scalar(ScalarAttribute::ClearcoatGloss),
        ior: material.scalar(ScalarAttribute::Ior).max(1.0),
        transmission: material.scalar(ScalarAttribute::Transmission),
        specular: material.scalar(ScalarAttribute::Specular),
        flatness: material.scalar(ScalarAttribute::Flatness),
        shader: material.shader,
        material_flags: material.flags,
        interior_medium: material.medium,
        differentials: SurfaceDifferentials::zeroed(),
        rx_direction: None,
        ry_direction: None,
        entering: true,
        ior_ratio: 1.0 / material.scalar(ScalarAttribute::Ior).max(1.0),
        primitive_scale: 1.0,
    }
}

fn orient_toward(normal: &Vec3, view_direction: &Vec3) -> Vec3 {
    if normal.dot(view_direction) < 0.0 {
        -normal
    } else {
        *normal
    }
}

fn corner_uv(arity: usize, corner: usize) -> Vec2 {
    if arity == 3 {
        [Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0)][corner]
    } else {
        [
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
        ][corner]
    }
}

/// dpdu/dpdv and dndu/dndv from the first triangle of the face.
fn attribute_derivatives(
    position_at: &impl Fn(usize) -> Vec3,
    normal_at: &impl Fn(usize) -> Vec3,
    uv_at: &impl Fn(usize) -> Vec2,
) -> (Vec3, Vec3, Vec3, Vec3) {
    let p0 = position_at(0);
    let e1 = position_at(1) - p0;
    let e2 = position_at(2) - p0;
    let duv1 = uv_at(1) - uv_at(0);
    let duv2 = uv_at(2) - uv_at(0);
    let det = duv1[0] * duv2[1] - duv1[1] * duv2[0];
    if det.abs() < 1e-12 {
        let frame = Onb::build_from_w(&e1.cross(&e2));
        return (*frame.u(), *frame.v(), Vec3::zeros(), Vec3::zeros());
    }
    let inv_det = 1.0 / det;
    let dpdu = (duv2[1] * e1 - duv1[1] * e2) * inv_det;
    let dpdv = (-duv2[0] * e1 + duv1[0] * e2) * inv_det;
    let n0 = normal_at(0);
    let dn1 = normal_at(1) - n0;
    let dn2 = normal_at(2) - n0;
    let dndu = (duv2[1] * dn1 - duv1[1] * dn2) * inv_det;
    let dndv = (-duv2[0] * dn1 + duv1[0] * dn2) * inv_det;
    (dpdu, dpdv, dndu, dndv)
}

/// Screen-space uv derivatives: intersect the auxiliary rays with the
/// tangent plane and project the position deltas onto (dpdu, dpdv).
#[allow(clippy::too_many_arguments)]
fn uv_screen_derivatives(
    position: &Vec3,
    normal: &Vec3,
    dpdu: &Vec3,
    dpdv: &Vec3,
    rx_origin: &Vec3,
    rx_direction: &Vec3,
    ry_origin: &Vec3,
    ry_direction: &Vec3,
) -> (Vec2, Vec2) {
    let plane_delta = |o: &Vec3, d: &Vec3| -> Option<Vec3> {
        let denom = normal.dot(d);
        if denom.abs() < 1e-9 {
            return None;
        }
        let t = normal.dot(&(position - o)) / denom;
        Some(o + t * d - position)
    };
    let solve = |dp: Vec3| -> Vec2 {
        // Least squares through the 2x2 normal equations.
        let a00 = dpdu.dot(dpdu);
        let a01 = dpdu.dot(dpdv);
        let a11 = dpdv.dot(dpdv);
        let b0 = dpdu.dot(&dp);
        let b1 = dpdv.dot(&dp);
        let det = a00 * a11 - a01 * a01;
        if det.abs() < 1e-12 {
            return Vec2::zeros();
        }
        Vec2::new((a11 * b0 - a01 * b1) / det, (a00 * b1 - a01 * b0) / det)
    };
    let duvdx = plane_delta(rx_origin, rx_direction).map_or(Vec2::zeros(), &solve);
    let duvdy = plane_delta(ry_origin, ry_direction).map_or(Vec2::zeros(), &solve);
    (duvdx, duvdy)
}

fn face_scale(position_at: &impl Fn(usize) -> Vec3, arity: usize) -> f32 {
    let mut longest: f32 = 0.0;
    for i in 0..arity {
        let a = position_at(i);
        let b = position_at((i + 1) % arity);
        longest = longest.max((b - a).norm());
    }
    longest.max(1e-4)
}
