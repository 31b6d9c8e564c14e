//! Position-independent binary blob format shared by baked assets and their
//! runtime. A blob is a contiguous byte buffer: a fixed header, a root
//! structure, and embedded buffers referenced through 64-bit offsets
//! relative to the start of the blob. All multi-byte scalars are
//! little-endian; bulk buffers are aligned to 16 bytes.

pub mod reader;
pub mod writer;

pub use reader::Blob;
pub use writer::{BlobWriter, PointerSite};

use bytemuck::{Pod, Zeroable};
use std::path::{Path, PathBuf};
use xxhash_rust::xxh32::xxh32;
use xxhash_rust::xxh64::xxh64;

pub const BLOB_MAGIC: [u8; 4] = *b"LMBB";
pub const HEADER_SIZE: u64 = 48;
pub const BUFFER_ALIGNMENT: u64 = 16;

/// magic(4) | type-tag(8) | version(8) | payload-size(8) | root-offset(8),
/// zero padded to a 16-byte multiple.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct BlobHeader {
    pub magic: [u8; 4],
    pub _pad0: [u8; 4],
    pub type_tag: u64,
    pub version: u64,
    pub payload_size: u64,
    pub root_offset: u64,
    pub _pad1: [u8; 8],
}

const _: () = assert!(std::mem::size_of::<BlobHeader>() as u64 == HEADER_SIZE);

/// 64-bit tag identifying the data type a blob carries.
pub fn type_tag(type_name: &str) -> u64 {
    xxh64(type_name.as_bytes(), 0)
}

/// 32-bit hash used for material and asset names.
pub fn name_hash(name: &str) -> u32 {
    xxh32(name.as_bytes(), 0)
}

/// `<root>/<typeTag>_<version>/<assetHash>.bin`
pub fn asset_file_path(root: &Path, type_name: &str, version: u64, asset_name: &str) -> PathBuf {
    root.join(format!("{:016x}_{}", type_tag(type_name), version))
        .join(format!("{:08x}.bin", name_hash(asset_name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_pod_and_padded_to_sixteen() {
        assert_eq!(std::mem::size_of::<BlobHeader>(), 48);
        assert_eq!(std::mem::size_of::<BlobHeader>() % 16, 0);
    }

    #[test]
    fn type_tags_are_stable_and_distinct() {
        assert_eq!(type_tag("model"), type_tag("model"));
        assert_ne!(type_tag("model"), type_tag("model-geometry"));
    }

    #[test]
    fn asset_paths_follow_layout() {
        let p = asset_file_path(Path::new("/assets"), "model", 3, "cornell");
        let s = p.to_string_lossy();
        assert!(s.starts_with("/assets/"));
        assert!(s.contains("_3/"));
        assert!(s.ends_with(".bin"));
    }
}
