//! Centralized magic numbers and format versions.
//!
//! Every on-disk format constant lives here so bumping a version or a
//! dimension is a single, auditable edit instead of a grep-and-pray.

/// Chunk width along X, in blocks.
pub const CHUNK_SIZE_X: usize = 16;
/// Chunk width along Y, in blocks.
pub const CHUNK_SIZE_Y: usize = 16;
/// Chunk height along Z, in blocks.
pub const CHUNK_SIZE_Z: usize = 128;
/// Total blocks in one chunk (16 * 16 * 128).
pub const CHUNK_VOLUME: usize = CHUNK_SIZE_X * CHUNK_SIZE_Y * CHUNK_SIZE_Z;

/// Bit widths used by the ESFS header to describe chunk dimensions.
pub const ESFS_CHUNK_BITS_X: u8 = 4;
pub const ESFS_CHUNK_BITS_Y: u8 = 4;
pub const ESFS_CHUNK_BITS_Z: u8 = 7;

/// Region grid dimensions: 16x16 chunks per region file.
pub const REGION_SIZE_X: i32 = 16;
pub const REGION_SIZE_Y: i32 = 16;
pub const CHUNKS_PER_REGION: usize = (REGION_SIZE_X * REGION_SIZE_Y) as usize;

/// ESF region file magic, ASCII "ESF1".
pub const ESF_MAGIC: u32 = 0x4553_4631;
/// Current ESF format version.
pub const ESF_FORMAT_VERSION: u32 = 1;
/// Header size in bytes.
pub const ESF_HEADER_SIZE: usize = 64;
/// Slot table entry size: {offset: u32, size: u32}.
pub const ESF_SLOT_ENTRY_SIZE: usize = 8;
/// Slot table size in bytes (256 entries).
pub const ESF_SLOT_TABLE_SIZE: usize = CHUNKS_PER_REGION * ESF_SLOT_ENTRY_SIZE;
/// Per-chunk header size in bytes.
pub const ESF_CHUNK_HEADER_SIZE: usize = 20;
/// Reserved bytes at the tail of the region header.
pub const ESF_HEADER_RESERVED: usize = 28;
/// Compression type tags in the per-chunk header.
pub const ESF_COMPRESSION_RLE: u32 = 0;
pub const ESF_COMPRESSION_NONE: u32 = 255;
/// Sanity cap on an individual chunk payload; guards against corrupt headers
/// causing an enormous allocation.
pub const ESF_MAX_REASONABLE_CHUNK_SIZE: u32 = 16 * 1024 * 1024;

/// ESFS single-chunk file magic, ASCII "ESFS".
pub const ESFS_MAGIC: [u8; 4] = *b"ESFS";
pub const ESFS_FORMAT_VERSION: u8 = 1;
pub const ESFS_HEADER_SIZE: usize = 8;
/// Max run length for the ESFS block-id RLE variant (u8 run counter).
pub const ESFS_MAX_RUN_LENGTH: usize = u8::MAX as usize;

/// RLE (ESF variant) frame magic, ASCII-ish "RL".
pub const RLE_MAGIC: u16 = 0x524C;
pub const RLE_FORMAT_VERSION: u16 = 1;
pub const RLE_HEADER_SIZE: usize = 8;
/// Size of one packed run entry: {length: u16, value: u32}.
pub const RLE_RUN_ENTRY_SIZE: usize = 6;
/// Below this ratio (compressed/original), storing raw beats run-encoding.
pub const RLE_MIN_WORTHWHILE_RATIO: f64 = 0.9;

/// Light channel range, inclusive.
pub const MAX_LIGHT_LEVEL: u8 = 15;

/// Sliding-window tuning, grounded on the source's `World::UpdateNearbyChunks`.
pub const MAX_ACTIVATIONS_PER_FRAME: usize = 4;
pub const DEACTIVATION_RANGE_BONUS: i32 = 2;
pub const DEFAULT_ACTIVATION_RANGE: i32 = 8;

/// How many chunks may be concurrently in flight per job kind.
pub const MAX_CONCURRENT_GENERATE_JOBS: usize = 4;
pub const MAX_CONCURRENT_LOAD_JOBS: usize = 4;
pub const MAX_CONCURRENT_SAVE_JOBS: usize = 4;

/// Mesh rebuilds drained from the dirty queue per tick.
pub const MAX_MESH_REBUILDS_PER_FRAME: usize = 8;

/// Default world metadata format version.
pub const WORLD_META_VERSION: u32 = 1;
