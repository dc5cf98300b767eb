//! Run-length compression for 32-bit block-state ID arrays, used by the
//! ESF region codec. Frame layout: an 8-byte header (magic, version,
//! original size) followed by either the raw payload or packed runs of
//! `{length: u16, value: u32}`.
//!
//! This is distinct from the narrower 1-byte-id/1-byte-run variant used
//! inside ESFS (see `storage::esfs`) — the two must never be conflated.

use crate::buffer::{ByteBuffer, ByteOrder};
use crate::constants::{
    RLE_FORMAT_VERSION, RLE_HEADER_SIZE, RLE_MAGIC, RLE_MIN_WORTHWHILE_RATIO, RLE_RUN_ENTRY_SIZE,
};
use crate::error::CodecError;

struct Run {
    length: u16,
    value: u32,
}

fn build_runs(ids: &[u32]) -> Vec<Run> {
    let mut runs = Vec::new();
    let mut i = 0;
    while i < ids.len() {
        let value = ids[i];
        let mut j = i + 1;
        while j < ids.len() && ids[j] == value && (j - i) < u16::MAX as usize {
            j += 1;
        }
        runs.push(Run {
            length: (j - i) as u16,
            value,
        });
        i = j;
    }
    runs
}

/// Upper bound on the compressed size of `count` IDs, header included.
pub fn max_compressed_size(count: usize) -> usize {
    RLE_HEADER_SIZE + count * RLE_RUN_ENTRY_SIZE
}

/// Fraction of runs relative to element count; lower means more compressible.
/// Does not allocate.
pub fn estimate_ratio(ids: &[u32]) -> f64 {
    if ids.is_empty() {
        return 1.0;
    }
    let mut runs = 1usize;
    for w in ids.windows(2) {
        if w[0] != w[1] {
            runs += 1;
        }
    }
    (runs * RLE_RUN_ENTRY_SIZE) as f64 / (ids.len() * std::mem::size_of::<u32>()) as f64
}

/// Compress a sequence of 32-bit block IDs into an RLE frame.
pub fn compress(ids: &[u32]) -> Vec<u8> {
    let original_size_bytes = (ids.len() * std::mem::size_of::<u32>()) as u32;
    let mut out = ByteBuffer::with_order(ByteOrder::Little);
    out.write_u16(RLE_MAGIC);
    out.write_u16(RLE_FORMAT_VERSION);
    out.write_u32(original_size_bytes);

    let ratio = estimate_ratio(ids);
    if ratio >= RLE_MIN_WORTHWHILE_RATIO {
        for &id in ids {
            out.write_u32(id);
        }
        return out.release();
    }

    for run in build_runs(ids) {
        out.write_u16(run.length);
        out.write_u32(run.value);
    }
    out.release()
}

/// Whether `compress` would store `ids` raw rather than run-encoded.
pub fn would_store_raw(ids: &[u32]) -> bool {
    estimate_ratio(ids) >= RLE_MIN_WORTHWHILE_RATIO
}

/// Decompress an RLE frame back into the original ID sequence.
pub fn decompress(data: &[u8]) -> Result<Vec<u32>, CodecError> {
    let mut buf = ByteBuffer::from_vec(data.to_vec(), ByteOrder::Little);
    let magic = buf.read_u16()?;
    if magic != RLE_MAGIC {
        return Err(CodecError::InvalidMagic {
            expected: RLE_MAGIC as u64,
            found: magic as u64,
        });
    }
    let version = buf.read_u16()?;
    if version != RLE_FORMAT_VERSION {
        return Err(CodecError::UnsupportedVersion(version as u32));
    }
    let original_size_bytes = buf.read_u32()? as usize;
    let count = original_size_bytes / std::mem::size_of::<u32>();

    let remaining = buf.remaining();
    let mut out = Vec::with_capacity(count);

    if remaining == original_size_bytes {
        for _ in 0..count {
            out.push(buf.read_u32()?);
        }
        return Ok(out);
    }

    while out.len() < count {
        let length = buf.read_u16()?;
        let value = buf.read_u32()?;
        if length == 0 {
            return Err(CodecError::CompressionError(
                "zero-length run in RLE stream".to_string(),
            ));
        }
        for _ in 0..length {
            out.push(value);
        }
    }

    if out.len() != count {
        return Err(CodecError::CorruptedHeader(format!(
            "RLE frame decoded {} values, expected {}",
            out.len(),
            count
        )));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_mixed_runs() {
        let ids = vec![1, 1, 1, 1, 2, 2, 3, 3, 3, 3, 3, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        let frame = compress(&ids);
        assert_eq!(&frame[0..2], &RLE_MAGIC.to_le_bytes());
        let decoded = decompress(&frame).unwrap();
        assert_eq!(decoded, ids);
    }

    #[test]
    fn round_trips_empty_sequence() {
        let ids: Vec<u32> = Vec::new();
        let frame = compress(&ids);
        assert_eq!(decompress(&frame).unwrap(), ids);
    }

    #[test]
    fn round_trips_all_distinct_falls_back_to_raw() {
        let ids: Vec<u32> = (0..64).collect();
        assert!(would_store_raw(&ids));
        let frame = compress(&ids);
        assert_eq!(decompress(&frame).unwrap(), ids);
    }

    #[test]
    fn splits_runs_longer_than_u16_max() {
        let len = u16::MAX as usize + 10;
        let ids = vec![7u32; len];
        let frame = compress(&ids);
        let decoded = decompress(&frame).unwrap();
        assert_eq!(decoded.len(), len);
        assert!(decoded.iter().all(|&v| v == 7));
    }

    #[test]
    fn rejects_bad_magic() {
        let mut frame = compress(&[1, 2, 3]);
        frame[0] ^= 0xFF;
        assert!(matches!(
            decompress(&frame),
            Err(CodecError::InvalidMagic { .. })
        ));
    }

    #[test]
    fn max_compressed_size_is_an_upper_bound() {
        let ids = vec![5u32; 1000];
        let frame = compress(&ids);
        assert!(frame.len() <= max_compressed_size(ids.len()));
    }
}
