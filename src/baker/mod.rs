//! Transforms an imported model into the baked meta and geometry blobs.
//! Outputs are written atomically (temp file + rename) and recorded on the
//! build context as dependency-tracked tuples.

use crate::aabb::Aabb;
use crate::aliases::{Vec2, Vec3, Vec4};
use crate::blob::{asset_file_path, name_hash, BlobWriter, HEADER_SIZE};
use crate::error::{Error, Result};
use crate::material::Material;
use crate::model::records::*;
use crate::model::ModelResource;
use crate::onb::Onb;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Clone, Debug)]
pub struct ImportedCamera {
    pub position: Vec3,
    pub look_at: Vec3,
    pub up: Vec3,
    pub vertical_fov_degrees: f32,
    pub lens_radius: f32,
    pub focus_distance: f32,
}

impl Default for ImportedCamera {
    fn default() -> Self {
        ImportedCamera {
            position: Vec3::new(0.0, 0.0, 5.0),
            look_at: Vec3::zeros(),
            up: Vec3::y(),
            vertical_fov_degrees: 45.0,
            lens_radius: 0.0,
            focus_distance: 1.0,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ImportedMesh {
    pub name: String,
    pub material_name: String,
    pub indices_per_face: u32,
    /// Mesh-local vertex indices; globalized while building.
    pub indices: Vec<u32>,
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub tangents: Vec<Vec4>,
    pub uvs: Vec<Vec2>,
}

#[derive(Clone, Debug, Default)]
pub struct ImportedCurve {
    pub name: String,
    /// Control points, xyz + radius.
    pub control_points: Vec<Vec4>,
}

#[derive(Clone, Debug)]
pub struct ImportedModel {
    pub name: String,
    pub camera: ImportedCamera,
    pub meshes: Vec<ImportedMesh>,
    pub curves: Vec<ImportedCurve>,
    pub materials: Vec<(String, Material)>,
    pub textures: Vec<String>,
}

/// Merged, bake-ready arrays mirroring the blob layout.
pub struct BuiltModel {
    pub camera: CameraRecord,
    pub aabb: Aabb,
    pub texture_names: Vec<TextureNameRecord>,
    pub materials: Vec<MaterialRecord>,
    pub material_hashes: Vec<u32>,
    pub meshes: Vec<MeshMetaRecord>,
    pub curves: Vec<CurveMetaRecord>,
    pub indices: [Vec<u32>; MESH_INDEX_TYPE_COUNT],
    pub face_index_counts: Vec<u32>,
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub tangents: Vec<[f32; 4]>,
    pub uvs: Vec<[f32; 2]>,
    pub material_indices: Vec<u32>,
    pub curve_indices: Vec<u32>,
    pub curve_vertices: Vec<[f32; 4]>,
}

/// Merge the imported meshes and curves into the shared buffers, sort
/// materials by name hash for the runtime binary search, and generate any
/// missing vertex normals.
pub fn build_model(imported: &ImportedModel) -> Result<BuiltModel> {
    // Materials sorted by hash.
    let mut keyed: Vec<(u32, MaterialRecord)> = imported
        .materials
        .iter()
        .map(|(name, material)| (name_hash(name), material_to_record(material)))
        .collect();
    keyed.sort_by_key(|(hash, _)| *hash);
    for pair in keyed.windows(2) {
        if pair[0].0 == pair[1].0 {
            return Err(Error::NumericInvalid(format!(
                "material hash collision: {:08x}",
                pair[0].0
            )));
        }
    }
    let material_hashes: Vec<u32> = keyed.iter().map(|(h, _)| *h).collect();
    let materials: Vec<MaterialRecord> = keyed.iter().map(|(_, m)| *m).collect();

    let any_uvs = imported.meshes.iter().any(|m| !m.uvs.is_empty());
    let any_tangents = imported.meshes.iter().any(|m| !m.tangents.is_empty());

    let mut built = BuiltModel {
        camera: camera_to_record(&imported.camera),
        aabb: Aabb::empty(),
        texture_names: imported
            .textures
            .iter()
            .map(|n| TextureNameRecord::from_str(n))
            .collect(),
        materials,
        material_hashes,
        meshes: Vec::new(),
        curves: Vec::new(),
        indices: [Vec::new(), Vec::new()],
        face_index_counts: Vec::new(),
        positions: Vec::new(),
        normals: Vec::new(),
        tangents: Vec::new(),
        uvs: Vec::new(),
        material_indices: Vec::new(),
        curve_indices: Vec::new(),
        curve_vertices: Vec::new(),
    };

    for mesh in &imported.meshes {
        let arity = mesh.indices_per_face as usize;
        if arity != 3 && arity != 4 {
            return Err(Error::NumericInvalid(format!(
                "mesh {} has unsupported face arity {}",
                mesh.name, arity
            )));
        }
        if mesh.indices.len() % arity != 0 {
            return Err(Error::NumericInvalid(format!(
                "mesh {} index count {} not a multiple of {}",
                mesh.name,
                mesh.indices.len(),
                arity
            )));
        }
        let vertex_offset = built.positions.len() as u32;
        let index_type = index_type_for(mesh.indices_per_face);
        let index_offset = built.indices[index_type].len() as u32;

        for p in &mesh.positions {
            built.aabb.append_point(*p);
            built.positions.push([p[0], p[1], p[2]]);
        }
        let normals = if mesh.normals.is_empty() {
            generate_smooth_normals(&mesh.positions, &mesh.indices, arity)
        } else {
            mesh.normals.clone()
        };
        for n in &normals {
            built.normals.push([n[0], n[1], n[2]]);
        }
        if any_tangents {
            if mesh.tangents.is_empty() {
                for n in &normals {
                    let u = *Onb::build_from_w(n).u();
                    built.tangents.push([u[0], u[1], u[2], 1.0]);
                }
            } else {
                for t in &mesh.tangents {
                    built.tangents.push([t[0], t[1], t[2], t[3]]);
                }
            }
        }
        if any_uvs {
            if mesh.uvs.is_empty() {
                built.uvs.extend(std::iter::repeat([0.0, 0.0]).take(mesh.positions.len()));
            } else {
                for uv in &mesh.uvs {
                    built.uvs.push([uv[0], uv[1]]);
                }
            }
        }

        for &i in &mesh.indices {
            if i as usize >= mesh.positions.len() {
                return Err(Error::NumericInvalid(format!(
                    "mesh {} index {} out of range",
                    mesh.name, i
                )));
            }
            built.indices[index_type].push(vertex_offset + i);
        }

        let material_hash = name_hash(&mesh.material_name);
        let material_index = built
            .material_hashes
            .binary_search(&material_hash)
            .map(|i| i as u32)
            .unwrap_or(u32::MAX);
        let face_count = mesh.indices.len() / arity;
        for _ in 0..face_count {
            built.face_index_counts.push(mesh.indices_per_face);
            built.material_indices.push(material_index);
        }

        built.meshes.push(MeshMetaRecord {
            index_count: mesh.indices.len() as u32,
            index_offset,
            vertex_count: mesh.positions.len() as u32,
            vertex_offset,
            material_hash,
            indices_per_face: mesh.indices_per_face,
            name_hash: name_hash(&mesh.name),
            _pad: 0,
        });
    }

    for curve in &imported.curves {
        if curve.control_points.len() < 2 {
            return Err(Error::NumericInvalid(format!(
                "curve {} needs at least two control points",
                curve.name
            )));
        }
        let index_offset = built.curve_indices.len() as u32;
        let vertex_base = built.curve_vertices.len() as u32;
        for segment in 0..curve.control_points.len() - 1 {
            built.curve_indices.push(vertex_base + segment as u32);
        }
        for cp in &curve.control_points {
            built.aabb.append_point(Vec3::new(cp[0], cp[1], cp[2]));
            built.curve_vertices.push([cp[0], cp[1], cp[2], cp[3]]);
        }
        built.curves.push(CurveMetaRecord {
            index_offset,
            index_count: (curve.control_points.len() - 1) as u32,
            name_hash: name_hash(&curve.name),
            _pad: 0,
        });
    }

    Ok(built)
}

/// Area-weighted vertex normals for meshes imported without them.
fn generate_smooth_normals(positions: &[Vec3], indices: &[u32], arity: usize) -> Vec<Vec3> {
    let mut normals = vec![Vec3::zeros(); positions.len()];
    for face in indices.chunks_exact(arity) {
        let p0 = positions[face[0] as usize];
        let p1 = positions[face[1] as usize];
        let p2 = positions[face[arity - 1] as usize];
        let cross = (p1 - p0).cross(&(p2 - p0));
        for &i in face {
            normals[i as usize] += cross;
        }
    }
    for n in &mut normals {
        let len = n.norm();
        *n = if len > 1e-12 { *n / len } else { Vec3::z() };
    }
    normals
}

fn camera_to_record(camera: &ImportedCamera) -> CameraRecord {
    CameraRecord {
        position: [camera.position[0], camera.position[1], camera.position[2]],
        _pad0: 0.0,
        look_at: [camera.look_at[0], camera.look_at[1], camera.look_at[2]],
        _pad1: 0.0,
        up: [camera.up[0], camera.up[1], camera.up[2]],
        vertical_fov_degrees: camera.vertical_fov_degrees,
        lens_radius: camera.lens_radius,
        focus_distance: camera.focus_distance,
        _pad2: [0.0, 0.0],
    }
}

fn material_to_record(material: &Material) -> MaterialRecord {
    MaterialRecord {
        base_color: [
            material.base_color[0],
            material.base_color[1],
            material.base_color[2],
        ],
        _pad0: 0.0,
        emissive: [
            material.emissive[0],
            material.emissive[1],
            material.emissive[2],
        ],
        _pad1: 0.0,
        sigma_a: [
            material.medium.sigma_a[0],
            material.medium.sigma_a[1],
            material.medium.sigma_a[2],
        ],
        _pad2: 0.0,
        sigma_s: [
            material.medium.sigma_s[0],
            material.medium.sigma_s[1],
            material.medium.sigma_s[2],
        ],
        _pad3: 0.0,
        scalar_attributes: material.scalar_attributes,
        shader: material.shader as u32,
        flags: material.flags,
        albedo_texture: material.albedo_texture,
        normal_texture: material.normal_texture,
        roughness_metallic_texture: material.roughness_metallic_texture,
        displacement_texture: material.displacement_texture,
        displacement_scale: material.displacement_scale,
        _pad4: 0,
    }
}

/// One baked artifact recorded on the build context.
#[derive(Clone, Debug)]
pub struct BakedOutput {
    pub type_name: &'static str,
    pub version: u64,
    pub name: String,
    pub path: PathBuf,
    pub size: usize,
}

/// Tracks dependencies and outputs for one bake invocation.
pub struct BuildContext {
    pub asset_root: PathBuf,
    pub outputs: Vec<BakedOutput>,
    pub content_dependencies: Vec<PathBuf>,
}

impl BuildContext {
    pub fn new(asset_root: &Path) -> Self {
        BuildContext {
            asset_root: asset_root.to_path_buf(),
            outputs: Vec::new(),
            content_dependencies: Vec::new(),
        }
    }

    pub fn add_file_dependency(&mut self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(Error::MissingAsset(path.to_path_buf()));
        }
        self.content_dependencies.push(path.to_path_buf());
        Ok(())
    }

    /// Write a baked blob atomically: temp file in the target directory,
    /// then rename. No partial file survives a failure.
    pub fn create_output(
        &mut self,
        type_name: &'static str,
        version: u64,
        name: &str,
        bytes: &[u8],
    ) -> Result<PathBuf> {
        let path = asset_file_path(&self.asset_root, type_name, version, name);
        let dir = path
            .parent()
            .ok_or_else(|| Error::corrupt("output path has no parent"))?;
        std::fs::create_dir_all(dir)?;
        let mut temp = tempfile::NamedTempFile::new_in(dir)?;
        temp.write_all(bytes)?;
        temp.persist(&path)
            .map_err(|e| Error::Io(e.error))?;
        info!(
            kind = type_name,
            name,
            size = bytes.len(),
            path = %path.display(),
            "baked output written"
        );
        self.outputs.push(BakedOutput {
            type_name,
            version,
            name: name.to_string(),
            path: path.clone(),
            size: bytes.len(),
        });
        Ok(path)
    }
}

/// Bake the meta and geometry blobs for `built` under `name`.
pub fn bake_model(ctx: &mut BuildContext, built: &BuiltModel, name: &str) -> Result<()> {
    let meta = bake_meta_blob(built);
    ctx.create_output(MODEL_META_TYPE, MODEL_DATA_VERSION, name, &meta)?;
    let geometry = bake_geometry_blob(built);
    ctx.create_output(MODEL_GEOMETRY_TYPE, MODEL_DATA_VERSION, name, &geometry)?;
    Ok(())
}

pub fn bake_meta_blob(built: &BuiltModel) -> Vec<u8> {
    let presize = built.texture_names.len() * std::mem::size_of::<TextureNameRecord>()
        + built.materials.len() * std::mem::size_of::<MaterialRecord>()
        + built.meshes.len() * std::mem::size_of::<MeshMetaRecord>()
        + built.curves.len() * std::mem::size_of::<CurveMetaRecord>()
        + std::mem::size_of::<MetaRoot>()
        + 1024; // slack for alignment padding
    let mut writer = BlobWriter::new(MODEL_META_TYPE, MODEL_DATA_VERSION);
    writer.reserve(presize);

    // The fixed section reproduces MetaRoot field by field; the promised
    // pointers land exactly on the offset fields.
    writer.write_pod(&built.camera);
    let (sphere_center, sphere_radius) = built.aabb.bounding_sphere();
    let aabb = if built.aabb.is_empty() {
        Aabb::new(&Vec3::zeros(), &Vec3::zeros())
    } else {
        built.aabb
    };
    writer.write_pod(&[aabb.min[0], aabb.min[1], aabb.min[2], 0.0f32]);
    writer.write_pod(&[aabb.max[0], aabb.max[1], aabb.max[2], 0.0f32]);
    writer.write_pod(&[
        sphere_center[0],
        sphere_center[1],
        sphere_center[2],
        sphere_radius,
    ]);
    writer.write_u32(built.texture_names.len() as u32);
    writer.write_u32(built.materials.len() as u32);
    writer.write_u32(built.meshes.len() as u32);
    writer.write_u32(built.curves.len() as u32);
    writer.write_u32(built.positions.len() as u32);
    writer.write_u32(built.curve_vertices.len() as u32);
    writer.write_u32(built.indices[0].len() as u32);
    writer.write_u32(built.indices[1].len() as u32);

    let texture_site = writer.promise_pointer();
    let material_site = writer.promise_pointer();
    let hash_site = writer.promise_pointer();
    let mesh_site = writer.promise_pointer();
    let curve_site = writer.promise_pointer();
    writer.write(&[0u8; 8]); // MetaRoot tail padding

    writer.commit_pointer(texture_site, bytemuck::cast_slice(&built.texture_names));
    writer.commit_pointer(material_site, bytemuck::cast_slice(&built.materials));
    writer.commit_pointer(hash_site, bytemuck::cast_slice(&built.material_hashes));
    writer.commit_pointer(mesh_site, bytemuck::cast_slice(&built.meshes));
    writer.commit_pointer(curve_site, bytemuck::cast_slice(&built.curves));
    writer.finish(HEADER_SIZE)
}

pub fn bake_geometry_blob(built: &BuiltModel) -> Vec<u8> {
    let data_size: usize = built.indices.iter().map(|v| v.len() * 4).sum::<usize>()
        + built.face_index_counts.len() * 4
        + built.positions.len() * 12
        + built.normals.len() * 12
        + built.tangents.len() * 16
        + built.uvs.len() * 8
        + built.material_indices.len() * 4
        + built.curve_indices.len() * 4
        + built.curve_vertices.len() * 16
        + std::mem::size_of::<GeometryRoot>()
        + 1024; // slack for alignment padding
    let mut writer = BlobWriter::new(MODEL_GEOMETRY_TYPE, MODEL_DATA_VERSION);
    writer.reserve(data_size);

    writer.write_u64(built.indices[0].len() as u64);
    writer.write_u64(built.indices[1].len() as u64);
    writer.write_u64(built.face_index_counts.len() as u64);
    writer.write_u64(built.positions.len() as u64);
    writer.write_u64(built.normals.len() as u64);
    writer.write_u64(built.tangents.len() as u64);
    writer.write_u64(built.uvs.len() as u64);
    writer.write_u64(built.material_indices.len() as u64);
    writer.write_u64(built.curve_indices.len() as u64);
    writer.write_u64(built.curve_vertices.len() as u64);

    let sites = [
        writer.promise_pointer(),
        writer.promise_pointer(),
        writer.promise_pointer(),
        writer.promise_pointer(),
        writer.promise_pointer(),
        writer.promise_pointer(),
        writer.promise_pointer(),
        writer.promise_pointer(),
        writer.promise_pointer(),
        writer.promise_pointer(),
    ];
    let mut sites = sites.into_iter();
    writer.commit_pointer(sites.next().unwrap(), bytemuck::cast_slice(&built.indices[0]));
    writer.commit_pointer(sites.next().unwrap(), bytemuck::cast_slice(&built.indices[1]));
    writer.commit_pointer(
        sites.next().unwrap(),
        bytemuck::cast_slice(&built.face_index_counts),
    );
    writer.commit_pointer(sites.next().unwrap(), bytemuck::cast_slice(&built.positions));
    writer.commit_pointer(sites.next().unwrap(), bytemuck::cast_slice(&built.normals));
    writer.commit_pointer(sites.next().unwrap(), bytemuck::cast_slice(&built.tangents));
    writer.commit_pointer(sites.next().unwrap(), bytemuck::cast_slice(&built.uvs));
    writer.commit_pointer(
        sites.next().unwrap(),
        bytemuck::cast_slice(&built.material_indices),
    );
    writer.commit_pointer(
        sites.next().unwrap(),
        bytemuck::cast_slice(&built.curve_indices),
    );
    writer.commit_pointer(
        sites.next().unwrap(),
        bytemuck::cast_slice(&built.curve_vertices),
    );
    writer.finish(HEADER_SIZE)
}

/// Reconstruct bake-ready arrays from an attached resource; the rebake of
/// an untouched model is byte-identical to its source blobs.
pub fn rebuild_from_resource(model: &ModelResource) -> Result<BuiltModel> {
    let views = model.geometry_views()?;
    let materials = model
        .materials
        .iter()
        .map(material_to_record)
        .collect();
    Ok(BuiltModel {
        camera: model.camera,
        aabb: model.aabb,
        texture_names: model
            .texture_names
            .iter()
            .map(|n| TextureNameRecord::from_str(n))
            .collect(),
        materials,
        material_hashes: model.material_hashes.clone(),
        meshes: model.meshes.clone(),
        curves: model.curves.clone(),
        indices: [views.indices[0].to_vec(), views.indices[1].to_vec()],
        face_index_counts: views.face_index_counts.to_vec(),
        positions: views.positions.to_vec(),
        normals: views.normals.to_vec(),
        tangents: views.tangents.to_vec(),
        uvs: views.uvs.to_vec(),
        material_indices: views.material_indices.to_vec(),
        curve_indices: views.curve_indices.to_vec(),
        curve_vertices: views.curve_vertices.to_vec(),
    })
}
