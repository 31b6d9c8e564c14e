use crate::blob::{type_tag, BlobHeader, BLOB_MAGIC, BUFFER_ALIGNMENT, HEADER_SIZE};
use crate::util::align_up;
use byteorder::{ByteOrder, LittleEndian};
use bytemuck::Pod;

/// A recorded relocation site: the byte position of a promised 64-bit
/// pointer field. Consumed exactly once by `commit_pointer`.
#[must_use]
pub struct PointerSite(u64);

struct PendingPointer {
    site: u64,
    alignment: u64,
    data: Vec<u8>,
}

/// Streaming writer for the blob format. Fixed-section bytes are written at
/// the cursor; pointee buffers are queued by `commit_pointer` and appended
/// after the fixed section when `finish` runs, patching each recorded site
/// with the absolute offset of its pointee.
pub struct BlobWriter {
    tag: u64,
    version: u64,
    bytes: Vec<u8>,
    pending: Vec<PendingPointer>,
}

impl BlobWriter {
    pub fn new(type_name: &str, version: u64) -> Self {
        BlobWriter {
            tag: type_tag(type_name),
            version,
            bytes: vec![0u8; HEADER_SIZE as usize],
            pending: Vec::new(),
        }
    }

    /// Pre-size the backing buffer; `expected_payload` should include the
    /// summed pointee sizes plus slack for alignment padding.
    pub fn reserve(&mut self, expected_payload: usize) {
        self.bytes.reserve(expected_payload);
    }

    pub fn position(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn write(&mut self, data: &[u8]) {
        self.bytes.extend_from_slice(data);
    }

    pub fn write_pod<T: Pod>(&mut self, value: &T) {
        self.bytes.extend_from_slice(bytemuck::bytes_of(value));
    }

    pub fn write_u32(&mut self, value: u32) {
        let mut buf = [0u8; 4];
        LittleEndian::write_u32(&mut buf, value);
        self.write(&buf);
    }

    pub fn write_u64(&mut self, value: u64) {
        let mut buf = [0u8; 8];
        LittleEndian::write_u64(&mut buf, value);
        self.write(&buf);
    }

    /// Record the cursor as a relocation site and emit a placeholder
    /// 64-bit offset.
    pub fn promise_pointer(&mut self) -> PointerSite {
        let site = self.position();
        self.write_u64(0);
        PointerSite(site)
    }

    /// Queue `data` as the pointee for `site`, to begin at a 16-byte
    /// boundary. Empty data leaves the site as a null offset.
    pub fn commit_pointer(&mut self, site: PointerSite, data: &[u8]) {
        self.commit_pointer_aligned(site, data, BUFFER_ALIGNMENT)
    }

    pub fn commit_pointer_aligned(&mut self, site: PointerSite, data: &[u8], alignment: u64) {
        debug_assert!(alignment.is_power_of_two());
        self.pending.push(PendingPointer {
            site: site.0,
            alignment,
            data: data.to_vec(),
        });
    }

    /// Append all queued pointees (zero padded to their alignment), patch
    /// the relocation sites, fill in the header, and return the finished
    /// blob. `root_offset` is the absolute offset of the root structure,
    /// normally `HEADER_SIZE`.
    pub fn finish(mut self, root_offset: u64) -> Vec<u8> {
        for pending in std::mem::take(&mut self.pending) {
            let offset = if pending.data.is_empty() {
                0
            } else {
                let aligned = align_up(self.bytes.len() as u64, pending.alignment);
                self.bytes.resize(aligned as usize, 0);
                self.bytes.extend_from_slice(&pending.data);
                aligned
            };
            LittleEndian::write_u64(
                &mut self.bytes[pending.site as usize..pending.site as usize + 8],
                offset,
            );
        }
        // The payload always ends on an alignment boundary so blobs can be
        // concatenated or mapped in aligned pages.
        let padded = align_up(self.bytes.len() as u64, BUFFER_ALIGNMENT);
        self.bytes.resize(padded as usize, 0);

        let header = BlobHeader {
            magic: BLOB_MAGIC,
            _pad0: [0; 4],
            type_tag: self.tag,
            version: self.version,
            payload_size: self.bytes.len() as u64 - HEADER_SIZE,
            root_offset,
            _pad1: [0; 8],
        };
        self.bytes[..HEADER_SIZE as usize].copy_from_slice(bytemuck::bytes_of(&header));
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::Blob;

    #[test]
    fn pointees_land_on_alignment_boundaries() {
        let mut writer = BlobWriter::new("test", 1);
        writer.write(&[1u8; 3]); // misalign the cursor
        let site = writer.promise_pointer();
        writer.commit_pointer(site, &[7u8; 10]);
        let bytes = writer.finish(HEADER_SIZE);

        let site_pos = HEADER_SIZE as usize + 3;
        let offset = LittleEndian::read_u64(&bytes[site_pos..site_pos + 8]);
        assert_eq!(offset % BUFFER_ALIGNMENT, 0);
        assert_eq!(&bytes[offset as usize..offset as usize + 10], &[7u8; 10]);
    }

    #[test]
    fn empty_pointee_stays_null() {
        let mut writer = BlobWriter::new("test", 1);
        let site = writer.promise_pointer();
        writer.commit_pointer(site, &[]);
        let bytes = writer.finish(HEADER_SIZE);
        let offset = LittleEndian::read_u64(&bytes[HEADER_SIZE as usize..HEADER_SIZE as usize + 8]);
        assert_eq!(offset, 0);
    }

    #[test]
    fn identical_content_writes_identical_bytes() {
        let build = || {
            let mut writer = BlobWriter::new("test", 2);
            writer.write_u32(42);
            let site = writer.promise_pointer();
            writer.commit_pointer(site, &[1, 2, 3, 4, 5]);
            writer.finish(HEADER_SIZE)
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn finished_blob_attaches() {
        let mut writer = BlobWriter::new("roundtrip", 9);
        writer.write_u64(0xdead_beef);
        let bytes = writer.finish(HEADER_SIZE);
        let blob = Blob::attach(&bytes, "roundtrip", 9).unwrap();
        assert_eq!(blob.header().version, 9);
    }
}
