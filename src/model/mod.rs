//! Runtime model resource: attaches the baked meta and geometry blobs,
//! loads referenced textures, and binds the geometry to the traversal
//! backend. After `bind_traversal` returns the resource is immutable and
//! may be shared by every worker.

pub mod records;

use crate::aabb::Aabb;
use crate::aliases::{Mat4, Vec2, Vec3};
use crate::blob::{asset_file_path, Blob};
use crate::error::{Error, Result};
use crate::material::{material_flags, Material, INVALID_TEXTURE};
use crate::bsdf::medium::MediumParameters;
use crate::bsdf::ShaderTag;
use crate::texture::{ColorSpace, TextureResource};
use crate::traversal::{
    DisplacementFn, FilterFn, GeometryDesc, GeometryKind, SceneBuilder, TraversalDevice,
    TraversalScene,
};
use records::*;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Borrowed views over the geometry blob buffers, resolved once per use.
pub struct GeometryViews<'a> {
    pub indices: [&'a [u32]; MESH_INDEX_TYPE_COUNT],
    pub face_index_counts: &'a [u32],
    pub positions: &'a [[f32; 3]],
    pub normals: &'a [[f32; 3]],
    pub tangents: &'a [[f32; 4]],
    pub uvs: &'a [[f32; 2]],
    pub material_indices: &'a [u32],
    pub curve_indices: &'a [u32],
    pub curve_vertices: &'a [[f32; 4]],
}

pub mod geometry_flags {
    pub const HAS_NORMALS: u32 = 1 << 0;
    pub const HAS_TANGENTS: u32 = 1 << 1;
    pub const HAS_UVS: u32 = 1 << 2;
}

/// Per-geometry data recorded while binding; indexed by geometry id.
pub struct GeometryUserData {
    pub flags: u32,
    /// Index into the model material array; `None` selects the default
    /// material.
    pub material_index: Option<usize>,
    pub world_to_local: Mat4,
    pub aabb: Aabb,
}

/// A committed traversal scene plus the per-geometry user data blocks.
pub struct BoundScene {
    pub scene: Arc<dyn TraversalScene>,
    pub user_data: Vec<GeometryUserData>,
    pub mesh_count: usize,
}

#[derive(Debug)]
pub struct ModelResource {
    pub name: String,
    meta: Blob,
    geometry: Blob,
    geometry_root: GeometryRoot,
    pub camera: CameraRecord,
    pub aabb: Aabb,
    pub bounding_sphere: (Vec3, f32),
    pub meshes: Vec<MeshMetaRecord>,
    pub curves: Vec<CurveMetaRecord>,
    pub materials: Vec<Material>,
    pub material_hashes: Vec<u32>,
    pub texture_names: Vec<String>,
    pub textures: Vec<TextureResource>,
    pub default_material: Material,
}

impl ModelResource {
    /// Load and attach the meta and geometry blobs for `asset_name`.
    pub fn read(asset_root: &Path, asset_name: &str) -> Result<Self> {
        let meta_path = asset_file_path(asset_root, MODEL_META_TYPE, MODEL_DATA_VERSION, asset_name);
        let geometry_path = asset_file_path(
            asset_root,
            MODEL_GEOMETRY_TYPE,
            MODEL_DATA_VERSION,
            asset_name,
        );
        let meta_bytes = read_asset_file(&meta_path)?;
        let geometry_bytes = read_asset_file(&geometry_path)?;

        let meta = Blob::attach(&meta_bytes, MODEL_META_TYPE, MODEL_DATA_VERSION)?;
        let geometry = Blob::attach(&geometry_bytes, MODEL_GEOMETRY_TYPE, MODEL_DATA_VERSION)?;

        let root: MetaRoot = *meta.root()?;
        let geometry_root: GeometryRoot = *geometry.root()?;

        let texture_names: Vec<String> = meta
            .slice::<TextureNameRecord>(root.texture_names_offset, root.texture_count as usize)?
            .iter()
            .map(|r| r.as_str().to_string())
            .collect();
        let material_records =
            meta.slice::<MaterialRecord>(root.materials_offset, root.material_count as usize)?;
        let materials = material_records
            .iter()
            .map(material_from_record)
            .collect::<Result<Vec<_>>>()?;
        let material_hashes: Vec<u32> = meta
            .slice::<u32>(root.material_hashes_offset, root.material_count as usize)?
            .to_vec();
        let meshes: Vec<MeshMetaRecord> = meta
            .slice::<MeshMetaRecord>(root.meshes_offset, root.mesh_count as usize)?
            .to_vec();
        let curves: Vec<CurveMetaRecord> = meta
            .slice::<CurveMetaRecord>(root.curves_offset, root.curve_count as usize)?
            .to_vec();

        debug_assert!(material_hashes.windows(2).all(|w| w[0] <= w[1]));

        let aabb = Aabb::new(
            &Vec3::from(root.aabb_min),
            &Vec3::from(root.aabb_max),
        );
        let sphere = (
            Vec3::new(
                root.bounding_sphere[0],
                root.bounding_sphere[1],
                root.bounding_sphere[2],
            ),
            root.bounding_sphere[3],
        );

        let model = ModelResource {
            name: asset_name.to_string(),
            meta,
            geometry,
            geometry_root,
            camera: root.camera,
            aabb,
            bounding_sphere: sphere,
            meshes,
            curves,
            materials,
            material_hashes,
            texture_names,
            textures: Vec::new(),
            default_material: Material::default(),
        };
        // Resolve every view once so later accessors cannot fail.
        model.geometry_views()?;
        info!(
            asset = asset_name,
            meshes = model.meshes.len(),
            curves = model.curves.len(),
            materials = model.materials.len(),
            "model resource attached"
        );
        Ok(model)
    }

    /// Load every referenced texture. Called once before binding; textures
    /// are immutable afterwards.
    pub fn initialize(&mut self, texture_root: &Path) -> Result<()> {
        self.textures.clear();
        for slot in 0..self.texture_names.len() {
            let path = texture_root.join(format!("{}.png", self.texture_names[slot]));
            let texture = TextureResource::read(&path, self.texture_color_space(slot as u32))?;
            self.textures.push(texture);
        }
        Ok(())
    }

    /// Slot classification for the gamma decode: a texture referenced by
    /// any data slot (normal, roughness-metallic, displacement) is linear;
    /// everything else is treated as an sRGB color map.
    pub fn texture_color_space(&self, slot: u32) -> ColorSpace {
        for material in &self.materials {
            if material.normal_texture == slot
                || material.roughness_metallic_texture == slot
                || material.displacement_texture == slot
            {
                return ColorSpace::Linear;
            }
        }
        ColorSpace::Srgb
    }

    pub fn geometry_views(&self) -> Result<GeometryViews<'_>> {
        let g = &self.geometry_root;
        Ok(GeometryViews {
            indices: [
                self.geometry
                    .slice(g.index_offsets[0], g.index_counts[0] as usize)?,
                self.geometry
                    .slice(g.index_offsets[1], g.index_counts[1] as usize)?,
            ],
            face_index_counts: self
                .geometry
                .slice(g.face_index_counts_offset, g.face_index_count as usize)?,
            positions: self
                .geometry
                .slice(g.positions_offset, g.position_count as usize)?,
            normals: self
                .geometry
                .slice(g.normals_offset, g.normal_count as usize)?,
            tangents: self
                .geometry
                .slice(g.tangents_offset, g.tangent_count as usize)?,
            uvs: self.geometry.slice(g.uvs_offset, g.uv_count as usize)?,
            material_indices: self
                .geometry
                .slice(g.material_indices_offset, g.material_index_count as usize)?,
            curve_indices: self
                .geometry
                .slice(g.curve_indices_offset, g.curve_index_count as usize)?,
            curve_vertices: self
                .geometry
                .slice(g.curve_vertices_offset, g.curve_vertex_count as usize)?,
        })
    }

    /// Binary search over the sorted hash array; `None` means the default
    /// material stands in.
    pub fn material_index(&self, hash: u32) -> Option<usize> {
        self.material_hashes.binary_search(&hash).ok()
    }

    pub fn material_at(&self, index: Option<usize>) -> &Material {
        match index {
            Some(i) => &self.materials[i],
            None => &self.default_material,
        }
    }

    pub fn find_material(&self, hash: u32) -> &Material {
        self.material_at(self.material_index(hash))
    }

    pub fn texture(&self, slot: u32) -> Option<&TextureResource> {
        if slot == INVALID_TEXTURE {
            return None;
        }
        self.textures.get(slot as usize)
    }

    fn mesh_for_geom(&self, geom_id: u32) -> Option<&MeshMetaRecord> {
        self.meshes.get(geom_id as usize)
    }

    /// Vertex indices of one face, `arity` entries valid.
    pub fn face_indices(&self, mesh: &MeshMetaRecord, prim_id: u32) -> Result<([u32; 4], usize)> {
        let arity = mesh.indices_per_face as usize;
        let views = self.geometry_views()?;
        let buffer = views.indices[index_type_for(mesh.indices_per_face)];
        let base = mesh.index_offset as usize + prim_id as usize * arity;
        if base + arity > buffer.len() {
            return Err(Error::corrupt(format!(
                "face {} out of range for mesh {:08x}",
                prim_id, mesh.name_hash
            )));
        }
        let mut out = [0u32; 4];
        out[..arity].copy_from_slice(&buffer[base..base + arity]);
        Ok((out, arity))
    }

    /// Interpolated uv at patch coordinates (u, v) of a face.
    pub fn interpolate_uv(&self, mesh: &MeshMetaRecord, prim_id: u32, barys: Vec2) -> Result<Vec2> {
        let views = self.geometry_views()?;
        if views.uvs.is_empty() {
            return Ok(barys);
        }
        let (idx, arity) = self.face_indices(mesh, prim_id)?;
        let uv_at = |i: usize| {
            let t = views.uvs[idx[i] as usize];
            Vec2::new(t[0], t[1])
        };
        Ok(interpolate_patch_vec2(&barys, arity, uv_at))
    }

    /// Alpha-test predicate installed as the traversal intersection
    /// filter: sample the albedo alpha at the candidate hit.
    pub fn passes_alpha_test(&self, geom_id: u32, prim_id: u32, barys: Vec2) -> bool {
        let mesh = match self.mesh_for_geom(geom_id) {
            Some(m) => m,
            None => return true,
        };
        let material = self.find_material(mesh.material_hash);
        if !material.has_flag(material_flags::ALPHA_TESTED) {
            return true;
        }
        let texture = match self.texture(material.albedo_texture) {
            Some(t) => t,
            None => return true,
        };
        let uv = match self.interpolate_uv(mesh, prim_id, barys) {
            Ok(uv) => uv,
            Err(_) => return true,
        };
        texture.sample_bilinear(&uv)[3] >= ALPHA_TEST_THRESHOLD
    }

    /// Normal-directed displacement amount at the candidate location.
    pub fn displacement_amount(&self, geom_id: u32, prim_id: u32, barys: Vec2) -> f32 {
        let mesh = match self.mesh_for_geom(geom_id) {
            Some(m) => m,
            None => return 0.0,
        };
        let material = self.find_material(mesh.material_hash);
        let texture = match self.texture(material.displacement_texture) {
            Some(t) => t,
            None => return 0.0,
        };
        let uv = match self.interpolate_uv(mesh, prim_id, barys) {
            Ok(uv) => uv,
            Err(_) => return 0.0,
        };
        texture.sample_bilinear(&uv)[0] * material.displacement_scale
    }

    /// Release held resources. Traversal handles are released when the
    /// bound scene drops; this exists so sessions have an explicit
    /// teardown point on every exit path.
    pub fn shutdown(self) {
        info!(asset = %self.name, "model resource shut down");
        drop(self);
    }
}

pub const ALPHA_TEST_THRESHOLD: f32 = 0.5;

/// Load a set of assets for one render session. A failing asset is fatal
/// for that asset only: it is skipped and reported next to the successes
/// so the session summary can list it.
pub fn read_model_set(
    asset_root: &Path,
    asset_names: &[&str],
) -> (Vec<ModelResource>, Vec<(String, Error)>) {
    let mut models = Vec::new();
    let mut failures = Vec::new();
    for name in asset_names {
        match ModelResource::read(asset_root, name) {
            Ok(model) => models.push(model),
            Err(e) => {
                warn!(asset = %name, error = %e, "skipping asset");
                failures.push((name.to_string(), e));
            }
        }
    }
    (models, failures)
}

fn read_asset_file(path: &Path) -> Result<Vec<u8>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(Error::MissingAsset(path.to_path_buf()))
        }
        Err(e) => Err(e.into()),
    }
}

fn material_from_record(record: &MaterialRecord) -> Result<Material> {
    let shader = ShaderTag::from_u32(record.shader).ok_or_else(|| {
        Error::corrupt(format!("unknown shader tag {}", record.shader))
    })?;
    Ok(Material {
        base_color: Vec3::from(record.base_color),
        emissive: Vec3::from(record.emissive),
        albedo_texture: record.albedo_texture,
        normal_texture: record.normal_texture,
        roughness_metallic_texture: record.roughness_metallic_texture,
        displacement_texture: record.displacement_texture,
        displacement_scale: record.displacement_scale,
        scalar_attributes: record.scalar_attributes,
        shader,
        flags: record.flags,
        medium: MediumParameters::new(Vec3::from(record.sigma_a), Vec3::from(record.sigma_s)),
    })
}

/// Interpolate a per-vertex attribute over a triangle (barycentric) or a
/// quad (bilinear patch coordinates).
pub fn interpolate_patch_vec2(barys: &Vec2, arity: usize, at: impl Fn(usize) -> Vec2) -> Vec2 {
    let (u, v) = (barys[0], barys[1]);
    if arity == 3 {
        (1.0 - u - v) * at(0) + u * at(1) + v * at(2)
    } else {
        let bottom = at(0) * (1.0 - u) + at(1) * u;
        let top = at(3) * (1.0 - u) + at(2) * u;
        bottom * (1.0 - v) + top * v
    }
}

pub fn interpolate_patch_vec3(barys: &Vec2, arity: usize, at: impl Fn(usize) -> Vec3) -> Vec3 {
    let (u, v) = (barys[0], barys[1]);
    if arity == 3 {
        (1.0 - u - v) * at(0) + u * at(1) + v * at(2)
    } else {
        let bottom = at(0) * (1.0 - u) + at(1) * u;
        let top = at(3) * (1.0 - u) + at(2) * u;
        bottom * (1.0 - v) + top * v
    }
}

/// Register every mesh and curve of `model` with the traversal backend.
/// Alpha-tested materials install the intersection filter; displacement
/// promotes the mesh to a subdivision geometry when the build-time gate is
/// on.
pub fn bind_traversal(
    model: &Arc<ModelResource>,
    device: &TraversalDevice,
    enable_displacement: bool,
    tessellation_rate: f32,
) -> Result<BoundScene> {
    let views = model.geometry_views()?;
    let mut builder: SceneBuilder<'_> = device.new_scene();
    let mut user_data = Vec::with_capacity(model.meshes.len() + model.curves.len());

    let attribute_flags = (if views.normals.is_empty() {
        0
    } else {
        geometry_flags::HAS_NORMALS
    }) | (if views.tangents.is_empty() {
        0
    } else {
        geometry_flags::HAS_TANGENTS
    }) | (if views.uvs.is_empty() {
        0
    } else {
        geometry_flags::HAS_UVS
    });

    for (geom_id, mesh) in model.meshes.iter().enumerate() {
        let material_index = model.material_index(mesh.material_hash);
        let material = model.material_at(material_index);
        let has_displacement =
            material.has_flag(material_flags::DISPLACEMENT_ENABLED) && enable_displacement;
        let has_alpha_test = material.has_flag(material_flags::ALPHA_TESTED);

        let index_type = index_type_for(mesh.indices_per_face);
        let start = mesh.index_offset as usize;
        let end = start + mesh.index_count as usize;
        let indices = views.indices[index_type].get(start..end).ok_or_else(|| {
            Error::corrupt(format!("mesh index range [{start}, {end}) out of bounds"))
        })?;

        let kind = if has_displacement {
            GeometryKind::Subdivision
        } else if mesh.indices_per_face == 4 {
            GeometryKind::Quads
        } else {
            GeometryKind::Triangles
        };

        let face_start = start / mesh.indices_per_face as usize;
        let face_end = end / mesh.indices_per_face as usize;
        let face_index_counts = if has_displacement {
            views
                .face_index_counts
                .get(face_start..face_end)
                .unwrap_or(&[])
        } else {
            &[]
        };

        let intersect_filter: Option<FilterFn> = if has_alpha_test {
            let model = Arc::clone(model);
            Some(Arc::new(move |geom_id, prim_id, barys| {
                model.passes_alpha_test(geom_id, prim_id, barys)
            }))
        } else {
            None
        };
        let displacement: Option<DisplacementFn> = if has_displacement {
            let model = Arc::clone(model);
            Some(Arc::new(move |geom_id, prim_id, barys| {
                model.displacement_amount(geom_id, prim_id, barys)
            }))
        } else {
            None
        };

        builder.attach_geometry_by_id(
            geom_id as u32,
            GeometryDesc {
                kind,
                indices,
                indices_per_face: mesh.indices_per_face,
                face_index_counts,
                positions: views.positions,
                curve_vertices: &[],
                intersect_filter,
                displacement,
                tessellation_rate,
            },
        );

        let mut aabb = Aabb::empty();
        for &i in indices {
            if let Some(p) = views.positions.get(i as usize) {
                aabb.append_point(Vec3::new(p[0], p[1], p[2]));
            }
        }
        user_data.push(GeometryUserData {
            flags: attribute_flags,
            material_index,
            world_to_local: Mat4::identity(),
            aabb,
        });
    }

    for (curve_index, curve) in model.curves.iter().enumerate() {
        let geom_id = (model.meshes.len() + curve_index) as u32;
        let material_index = model.material_index(curve.name_hash);
        let start = curve.index_offset as usize;
        let end = start + curve.index_count as usize;
        let indices = views.curve_indices.get(start..end).ok_or_else(|| {
            Error::corrupt(format!("curve index range [{start}, {end}) out of bounds"))
        })?;
        builder.attach_geometry_by_id(
            geom_id,
            GeometryDesc {
                kind: GeometryKind::RoundBsplineCurves,
                indices,
                indices_per_face: 2,
                positions: &[],
                curve_vertices: views.curve_vertices,
                ..Default::default()
            },
        );
        let mut aabb = Aabb::empty();
        for v in views.curve_vertices {
            aabb.append_point(Vec3::new(v[0], v[1], v[2]));
        }
        user_data.push(GeometryUserData {
            flags: attribute_flags,
            material_index,
            world_to_local: Mat4::identity(),
            aabb,
        });
    }

    let scene = builder.commit().map_err(|e| {
        Error::BackendError(format!("scene commit failed for {}: {}", model.name, e))
    })?;
    debug!(asset = %model.name, geometries = user_data.len(), "traversal scene committed");
    Ok(BoundScene {
        scene,
        user_data,
        mesh_count: model.meshes.len(),
    })
}
