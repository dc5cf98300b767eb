//! ESF region codec: 256 chunks (a 16x16 grid) packed into one
//! append-only file, bit-exact per the design's header/slot-table/
//! per-chunk-header layout.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crc32fast::Hasher as Crc32;

use crate::buffer::{ByteBuffer, ByteOrder};
use crate::constants::{
    CHUNKS_PER_REGION, ESF_CHUNK_HEADER_SIZE, ESF_COMPRESSION_NONE, ESF_COMPRESSION_RLE,
    ESF_FORMAT_VERSION, ESF_HEADER_RESERVED, ESF_HEADER_SIZE, ESF_MAGIC,
    ESF_MAX_REASONABLE_CHUNK_SIZE, ESF_SLOT_TABLE_SIZE, REGION_SIZE_X, REGION_SIZE_Y,
};
use crate::error::CodecError;
use crate::rle;

/// Given world-chunk coordinates, the region they belong to.
pub fn region_of(chunk_x: i32, chunk_y: i32) -> (i32, i32) {
    (
        chunk_x.div_euclid(REGION_SIZE_X),
        chunk_y.div_euclid(REGION_SIZE_Y),
    )
}

/// Local slot coordinates (0..16, 0..16) within a region.
pub fn local_of(chunk_x: i32, chunk_y: i32, region_x: i32, region_y: i32) -> (usize, usize) {
    (
        (chunk_x - region_x * REGION_SIZE_X) as usize,
        (chunk_y - region_y * REGION_SIZE_Y) as usize,
    )
}

pub fn region_file_name(region_x: i32, region_y: i32) -> String {
    format!("r.{region_x}.{region_y}.esf")
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    offset: u32,
    size: u32,
}

impl Slot {
    const EMPTY: Slot = Slot { offset: 0, size: 0 };

    fn is_empty(&self) -> bool {
        self.offset == 0
    }
}

/// A cached, writable handle onto one `.esf` file.
pub struct EsfRegionFile {
    file: File,
    path: PathBuf,
    region_x: i32,
    region_y: i32,
    chunk_count: u32,
    slots: [Slot; CHUNKS_PER_REGION],
    dirty: bool,
}

impl EsfRegionFile {
    pub fn open_or_create(dir: &Path, region_x: i32, region_y: i32) -> Result<Self, CodecError> {
        let path = dir.join(region_file_name(region_x, region_y));
        let is_new = !path.exists();

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        if is_new {
            let mut region = Self {
                file,
                path,
                region_x,
                region_y,
                chunk_count: 0,
                slots: [Slot::EMPTY; CHUNKS_PER_REGION],
                dirty: true,
            };
            region.flush()?;
            return Ok(region);
        }

        let mut header_bytes = vec![0u8; ESF_HEADER_SIZE];
        file.read_exact(&mut header_bytes)?;
        let mut header = ByteBuffer::from_vec(header_bytes, ByteOrder::Little);

        let magic = header.read_u32()?;
        if magic != ESF_MAGIC {
            return Err(CodecError::InvalidMagic {
                expected: ESF_MAGIC as u64,
                found: magic as u64,
            });
        }
        let version = header.read_u32()?;
        if version != ESF_FORMAT_VERSION {
            return Err(CodecError::UnsupportedVersion(version));
        }
        let header_region_x = header.read_i32()?;
        let header_region_y = header.read_i32()?;
        if header_region_x != region_x || header_region_y != region_y {
            return Err(CodecError::InvalidCoordinates(header_region_x, header_region_y));
        }
        let chunk_count = header.read_u32()?;
        let _file_size = header.read_u32()?;
        let _timestamp = header.read_i64()?;
        let stored_crc = header.read_u32()?;

        let mut slot_bytes = vec![0u8; ESF_SLOT_TABLE_SIZE];
        file.read_exact(&mut slot_bytes)?;
        let mut slot_buf = ByteBuffer::from_vec(slot_bytes, ByteOrder::Little);
        let mut slots = [Slot::EMPTY; CHUNKS_PER_REGION];
        for slot in slots.iter_mut() {
            let offset = slot_buf.read_u32()?;
            let size = slot_buf.read_u32()?;
            *slot = Slot { offset, size };
        }

        let mut data = Vec::new();
        file.seek(SeekFrom::Start((ESF_HEADER_SIZE + ESF_SLOT_TABLE_SIZE) as u64))?;
        file.read_to_end(&mut data)?;
        let mut hasher = Crc32::new();
        hasher.update(&data);
        let computed_crc = hasher.finalize();
        if computed_crc != stored_crc {
            return Err(CodecError::CrcMismatch {
                expected: stored_crc,
                computed: computed_crc,
            });
        }

        Ok(Self {
            file,
            path: dir.join(region_file_name(region_x, region_y)),
            region_x,
            region_y,
            chunk_count,
            slots,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn slot_index(&self, chunk_x: i32, chunk_y: i32) -> Result<usize, CodecError> {
        let (lx, ly) = local_of(chunk_x, chunk_y, self.region_x, self.region_y);
        if lx >= REGION_SIZE_X as usize || ly >= REGION_SIZE_Y as usize {
            return Err(CodecError::InvalidCoordinates(chunk_x, chunk_y));
        }
        Ok(ly * REGION_SIZE_X as usize + lx)
    }

    pub fn has_chunk(&self, chunk_x: i32, chunk_y: i32) -> bool {
        match self.slot_index(chunk_x, chunk_y) {
            Ok(idx) => !self.slots[idx].is_empty(),
            Err(_) => false,
        }
    }

    /// Decode the stored block-id grid for a chunk.
    pub fn read_chunk(&mut self, chunk_x: i32, chunk_y: i32) -> Result<Vec<u8>, CodecError> {
        let slot_idx = self.slot_index(chunk_x, chunk_y)?;
        let slot = self.slots[slot_idx];
        if slot.is_empty() {
            return Err(CodecError::ChunkNotFound(chunk_x, chunk_y));
        }

        self.file.seek(SeekFrom::Start(slot.offset as u64))?;
        let mut header_bytes = vec![0u8; ESF_CHUNK_HEADER_SIZE];
        self.file.read_exact(&mut header_bytes)?;
        let mut header = ByteBuffer::from_vec(header_bytes, ByteOrder::Little);

        let header_x = header.read_i32()?;
        let header_y = header.read_i32()?;
        if header_x != chunk_x || header_y != chunk_y {
            return Err(CodecError::CorruptedHeader(format!(
                "slot ({chunk_x},{chunk_y}) points at chunk header for ({header_x},{header_y})"
            )));
        }
        let uncompressed_size = header.read_u32()?;
        let compressed_size = header.read_u32()?;
        let compression_type = header.read_u32()?;

        if uncompressed_size > ESF_MAX_REASONABLE_CHUNK_SIZE {
            return Err(CodecError::CorruptedHeader(format!(
                "uncompressed_size {uncompressed_size} exceeds sanity cap"
            )));
        }

        let mut payload = vec![0u8; compressed_size as usize];
        self.file.read_exact(&mut payload)?;

        match compression_type {
            t if t == ESF_COMPRESSION_RLE => {
                let ids32 = rle::decompress(&payload)?;
                Ok(ids32.into_iter().map(|v| v as u8).collect())
            }
            t if t == ESF_COMPRESSION_NONE => Ok(payload),
            other => Err(CodecError::CompressionError(format!(
                "unknown compression type {other}"
            ))),
        }
    }

    /// Append a chunk's block-id grid and update the slot table. Does not
    /// compact previously occupied bytes (append-only policy).
    pub fn write_chunk(
        &mut self,
        chunk_x: i32,
        chunk_y: i32,
        ids: &[u8],
        compress: bool,
    ) -> Result<(), CodecError> {
        let slot_idx = self.slot_index(chunk_x, chunk_y)?;

        let (compression_type, payload) = if compress {
            let ids32: Vec<u32> = ids.iter().map(|&b| b as u32).collect();
            (ESF_COMPRESSION_RLE, rle::compress(&ids32))
        } else {
            (ESF_COMPRESSION_NONE, ids.to_vec())
        };

        let mut chunk_header = ByteBuffer::with_order(ByteOrder::Little);
        chunk_header.write_i32(chunk_x);
        chunk_header.write_i32(chunk_y);
        chunk_header.write_u32(ids.len() as u32);
        chunk_header.write_u32(payload.len() as u32);
        chunk_header.write_u32(compression_type);

        let offset = self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(&chunk_header.release())?;
        self.file.write_all(&payload)?;

        let was_empty = self.slots[slot_idx].is_empty();
        self.slots[slot_idx] = Slot {
            offset: offset as u32,
            size: (ESF_CHUNK_HEADER_SIZE + payload.len()) as u32,
        };
        if was_empty {
            self.chunk_count += 1;
        }
        self.dirty = true;
        Ok(())
    }

    /// Rewrite the header and slot table with a fresh CRC and timestamp.
    pub fn flush(&mut self) -> Result<(), CodecError> {
        if !self.dirty {
            return Ok(());
        }

        self.file.seek(SeekFrom::Start((ESF_HEADER_SIZE + ESF_SLOT_TABLE_SIZE) as u64))?;
        let mut data = Vec::new();
        self.file.read_to_end(&mut data)?;
        let mut hasher = Crc32::new();
        hasher.update(&data);
        let crc = hasher.finalize();

        let file_size = ESF_HEADER_SIZE + ESF_SLOT_TABLE_SIZE + data.len();
        let timestamp = chrono::Utc::now().timestamp();

        let mut header = ByteBuffer::with_order(ByteOrder::Little);
        header.write_u32(ESF_MAGIC);
        header.write_u32(ESF_FORMAT_VERSION);
        header.write_i32(self.region_x);
        header.write_i32(self.region_y);
        header.write_u32(self.chunk_count);
        header.write_u32(file_size as u32);
        header.write_i64(timestamp);
        header.write_u32(crc);
        header.write_bytes(&[0u8; ESF_HEADER_RESERVED]);

        let mut slot_table = ByteBuffer::with_order(ByteOrder::Little);
        for slot in &self.slots {
            slot_table.write_u32(slot.offset);
            slot_table.write_u32(slot.size);
        }

        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&header.release())?;
        self.file.write_all(&slot_table.release())?;
        self.file.flush()?;
        self.dirty = false;
        Ok(())
    }

    pub fn chunk_count(&self) -> u32 {
        self.chunk_count
    }
}

impl Drop for EsfRegionFile {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn region_and_local_coord_math() {
        assert_eq!(region_of(0, 0), (0, 0));
        assert_eq!(region_of(15, 15), (0, 0));
        assert_eq!(region_of(16, 0), (1, 0));
        assert_eq!(region_of(-1, 0), (-1, 0));
        assert_eq!(region_of(-16, -16), (-1, -1));

        let (lx, ly) = local_of(-1, -1, -1, -1);
        assert_eq!((lx, ly), (15, 15));
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let mut region = EsfRegionFile::open_or_create(dir.path(), 0, 0).unwrap();

        let mut a = vec![0u8; 32768];
        a[1234] = 1;
        let b = vec![7u8; 32768];

        region.write_chunk(0, 0, &a, true).unwrap();
        region.write_chunk(15, 15, &b, true).unwrap();
        region.flush().unwrap();

        let path = region.path().to_path_buf();
        drop(region);

        let mut reopened = EsfRegionFile::open_or_create(dir.path(), 0, 0).unwrap();
        assert_eq!(reopened.path(), path);
        assert_eq!(reopened.chunk_count(), 2);
        assert_eq!(reopened.read_chunk(0, 0).unwrap(), a);
        assert_eq!(reopened.read_chunk(15, 15).unwrap(), b);
        assert!(matches!(
            reopened.read_chunk(1, 1),
            Err(CodecError::ChunkNotFound(1, 1))
        ));
    }

    #[test]
    fn uncompressed_path_round_trips() {
        let dir = tempdir().unwrap();
        let mut region = EsfRegionFile::open_or_create(dir.path(), 2, -3).unwrap();
        let ids: Vec<u8> = (0..32768u32).map(|i| (i % 250) as u8).collect();
        region.write_chunk(32, -48, &ids, false).unwrap();
        assert_eq!(region.read_chunk(32, -48).unwrap(), ids);
    }
}
