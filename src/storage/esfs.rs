//! ESFS single-chunk codec: one file per chunk, `[block_id:u8][run_length:u8]`
//! pairs. Distinct from the ESF region codec's RLE variant, which uses
//! 32-bit values and a 16-bit run length — the two must not be conflated.

use std::fs;
use std::path::Path;

use crate::buffer::{ByteBuffer, ByteOrder};
use crate::constants::{
    CHUNK_VOLUME, ESFS_CHUNK_BITS_X, ESFS_CHUNK_BITS_Y, ESFS_CHUNK_BITS_Z, ESFS_FORMAT_VERSION,
    ESFS_HEADER_SIZE, ESFS_MAGIC, ESFS_MAX_RUN_LENGTH,
};
use crate::error::CodecError;

pub fn esfs_file_name(chunk_x: i32, chunk_y: i32) -> String {
    format!("c.{chunk_x}.{chunk_y}.esfs")
}

fn encode(ids: &[u8]) -> Vec<u8> {
    let mut out = ByteBuffer::with_order(ByteOrder::Little);
    out.write_bytes(&ESFS_MAGIC);
    out.write_u8(ESFS_FORMAT_VERSION);
    out.write_u8(ESFS_CHUNK_BITS_X);
    out.write_u8(ESFS_CHUNK_BITS_Y);
    out.write_u8(ESFS_CHUNK_BITS_Z);

    let mut i = 0;
    while i < ids.len() {
        let value = ids[i];
        let mut j = i + 1;
        while j < ids.len() && ids[j] == value && (j - i) < ESFS_MAX_RUN_LENGTH {
            j += 1;
        }
        out.write_u8(value);
        out.write_u8((j - i) as u8);
        i = j;
    }
    out.release()
}

fn decode(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut buf = ByteBuffer::from_vec(data.to_vec(), ByteOrder::Little);
    let magic = buf.read_bytes(4)?;
    if magic != ESFS_MAGIC {
        let found = u32::from_be_bytes([magic[0], magic[1], magic[2], magic[3]]);
        let expected = u32::from_be_bytes(ESFS_MAGIC);
        return Err(CodecError::InvalidMagic {
            expected: expected as u64,
            found: found as u64,
        });
    }
    let version = buf.read_u8()?;
    if version != ESFS_FORMAT_VERSION {
        return Err(CodecError::UnsupportedVersion(version as u32));
    }
    let bits_x = buf.read_u8()?;
    let bits_y = buf.read_u8()?;
    let bits_z = buf.read_u8()?;
    if bits_x != ESFS_CHUNK_BITS_X || bits_y != ESFS_CHUNK_BITS_Y || bits_z != ESFS_CHUNK_BITS_Z {
        return Err(CodecError::CorruptedHeader(format!(
            "chunk-bits ({bits_x},{bits_y},{bits_z}) do not match this build's chunk dimensions"
        )));
    }

    let mut ids = Vec::with_capacity(CHUNK_VOLUME);
    while ids.len() < CHUNK_VOLUME {
        let value = buf.read_u8()?;
        let length = buf.read_u8()? as usize;
        if length == 0 {
            return Err(CodecError::CompressionError(
                "zero-length run in ESFS stream".to_string(),
            ));
        }
        ids.extend(std::iter::repeat(value).take(length));
    }

    if ids.len() != CHUNK_VOLUME {
        return Err(CodecError::CorruptedHeader(format!(
            "ESFS frame decoded {} blocks, expected {CHUNK_VOLUME}",
            ids.len()
        )));
    }

    Ok(ids)
}

/// Write one chunk's block-id grid to its own `.esfs` file.
pub fn write_chunk_file(dir: &Path, chunk_x: i32, chunk_y: i32, ids: &[u8]) -> Result<(), CodecError> {
    debug_assert_eq!(ids.len(), CHUNK_VOLUME);
    let path = dir.join(esfs_file_name(chunk_x, chunk_y));
    fs::write(path, encode(ids))?;
    Ok(())
}

/// Read a chunk's block-id grid back from its `.esfs` file.
pub fn read_chunk_file(dir: &Path, chunk_x: i32, chunk_y: i32) -> Result<Vec<u8>, CodecError> {
    let path = dir.join(esfs_file_name(chunk_x, chunk_y));
    let data = fs::read(path)?;
    decode(&data)
}

pub fn chunk_file_exists(dir: &Path, chunk_x: i32, chunk_y: i32) -> bool {
    dir.join(esfs_file_name(chunk_x, chunk_y)).exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn encode_decode_round_trips() {
        let mut ids = vec![0u8; CHUNK_VOLUME];
        for (i, id) in ids.iter_mut().enumerate() {
            *id = (i % 3) as u8;
        }
        let encoded = encode(&ids);
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded, ids);
    }

    #[test]
    fn run_longer_than_255_splits() {
        let ids = vec![9u8; CHUNK_VOLUME];
        let encoded = encode(&ids);
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded, ids);
        assert!(encoded.len() > ESFS_HEADER_SIZE + 2);
    }

    #[test]
    fn file_round_trip() {
        let dir = tempdir().unwrap();
        let ids: Vec<u8> = (0..CHUNK_VOLUME).map(|i| (i % 5) as u8).collect();
        write_chunk_file(dir.path(), 3, -7, &ids).unwrap();
        assert!(chunk_file_exists(dir.path(), 3, -7));
        let decoded = read_chunk_file(dir.path(), 3, -7).unwrap();
        assert_eq!(decoded, ids);
    }

    #[test]
    fn rejects_wrong_magic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(esfs_file_name(0, 0));
        fs::write(&path, b"XXXX\x01\x04\x04\x07").unwrap();
        assert!(matches!(
            read_chunk_file(dir.path(), 0, 0),
            Err(CodecError::InvalidMagic { .. })
        ));
    }
}
