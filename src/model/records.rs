//! POD records persisted inside the model meta and geometry blobs. Field
//! layout is part of the on-disk format; bump `MODEL_DATA_VERSION` when it
//! changes.

use bytemuck::{Pod, Zeroable};

pub const MODEL_META_TYPE: &str = "ModelResource";
pub const MODEL_GEOMETRY_TYPE: &str = "ModelGeometryResource";
pub const MODEL_DATA_VERSION: u64 = 2;

/// Number of mesh index layouts: triangle lists and quad lists.
pub const MESH_INDEX_TYPE_COUNT: usize = 2;

pub const TRIANGLE_INDEX_TYPE: usize = 0;
pub const QUAD_INDEX_TYPE: usize = 1;

pub fn index_type_for(indices_per_face: u32) -> usize {
    if indices_per_face == 4 {
        QUAD_INDEX_TYPE
    } else {
        TRIANGLE_INDEX_TYPE
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct CameraRecord {
    pub position: [f32; 3],
    pub _pad0: f32,
    pub look_at: [f32; 3],
    pub _pad1: f32,
    pub up: [f32; 3],
    pub vertical_fov_degrees: f32,
    pub lens_radius: f32,
    pub focus_distance: f32,
    pub _pad2: [f32; 2],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct MeshMetaRecord {
    pub index_count: u32,
    /// Element offset into the index buffer selected by `indices_per_face`.
    pub index_offset: u32,
    pub vertex_count: u32,
    /// Element offset into the shared vertex buffers.
    pub vertex_offset: u32,
    pub material_hash: u32,
    pub indices_per_face: u32,
    pub name_hash: u32,
    pub _pad: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct CurveMetaRecord {
    pub index_offset: u32,
    pub index_count: u32,
    pub name_hash: u32,
    pub _pad: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct MaterialRecord {
    pub base_color: [f32; 3],
    pub _pad0: f32,
    pub emissive: [f32; 3],
    pub _pad1: f32,
    pub sigma_a: [f32; 3],
    pub _pad2: f32,
    pub sigma_s: [f32; 3],
    pub _pad3: f32,
    pub scalar_attributes: [f32; 12],
    pub shader: u32,
    pub flags: u32,
    pub albedo_texture: u32,
    pub normal_texture: u32,
    pub roughness_metallic_texture: u32,
    pub displacement_texture: u32,
    pub displacement_scale: f32,
    pub _pad4: u32,
}

/// Fixed-width texture resource name, NUL padded ASCII.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct TextureNameRecord(pub [u8; 64]);

impl TextureNameRecord {
    pub fn from_str(name: &str) -> Self {
        let mut bytes = [0u8; 64];
        let src = name.as_bytes();
        let n = src.len().min(63);
        bytes[..n].copy_from_slice(&src[..n]);
        TextureNameRecord(bytes)
    }
    pub fn as_str(&self) -> &str {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(64);
        std::str::from_utf8(&self.0[..end]).unwrap_or("")
    }
}

impl std::fmt::Debug for TextureNameRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TextureNameRecord({:?})", self.as_str())
    }
}

/// Root of the meta blob.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct MetaRoot {
    pub camera: CameraRecord,
    pub aabb_min: [f32; 3],
    pub _pad0: f32,
    pub aabb_max: [f32; 3],
    pub _pad1: f32,
    /// xyz center, w radius.
    pub bounding_sphere: [f32; 4],
    pub texture_count: u32,
    pub material_count: u32,
    pub mesh_count: u32,
    pub curve_count: u32,
    pub total_vertex_count: u32,
    pub total_curve_vertex_count: u32,
    pub index_counts: [u32; MESH_INDEX_TYPE_COUNT],
    pub texture_names_offset: u64,
    pub materials_offset: u64,
    pub material_hashes_offset: u64,
    pub meshes_offset: u64,
    pub curves_offset: u64,
    pub _pad2: [u8; 8],
}

/// Root of the geometry blob. Counts are in elements of the buffer's
/// record type, offsets are blob-absolute.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct GeometryRoot {
    pub index_counts: [u64; MESH_INDEX_TYPE_COUNT],
    pub face_index_count: u64,
    pub position_count: u64,
    pub normal_count: u64,
    pub tangent_count: u64,
    pub uv_count: u64,
    pub material_index_count: u64,
    pub curve_index_count: u64,
    pub curve_vertex_count: u64,
    pub index_offsets: [u64; MESH_INDEX_TYPE_COUNT],
    pub face_index_counts_offset: u64,
    pub positions_offset: u64,
    pub normals_offset: u64,
    pub tangents_offset: u64,
    pub uvs_offset: u64,
    pub material_indices_offset: u64,
    pub curve_indices_offset: u64,
    pub curve_vertices_offset: u64,
}
