//! Error taxonomy. Each subsystem gets its own `thiserror` enum; they are
//! unified under [`EngineError`] via `#[from]` so callers that don't care
//! about the distinction can just propagate with `?`.

use thiserror::Error;

/// Byte buffer read failures.
#[derive(Debug, Error)]
pub enum BufferError {
    #[error("buffer underflow: cursor {cursor}, size {size}, requested {requested}")]
    Underflow {
        cursor: usize,
        size: usize,
        requested: usize,
    },
}

/// Shared by the RLE, ESF and ESFS codecs.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid magic: expected {expected:#x}, found {found:#x}")]
    InvalidMagic { expected: u64, found: u64 },
    #[error("unsupported format version: {0}")]
    UnsupportedVersion(u32),
    #[error("corrupted header: {0}")]
    CorruptedHeader(String),
    #[error("invalid chunk index {0}, must be in 0..256")]
    InvalidChunkIndex(usize),
    #[error("compression error: {0}")]
    CompressionError(String),
    #[error("invalid coordinates ({0}, {1})")]
    InvalidCoordinates(i32, i32),
    #[error("chunk not found at ({0}, {1})")]
    ChunkNotFound(i32, i32),
    #[error("CRC mismatch: expected {expected:#x}, computed {computed:#x}")]
    CrcMismatch { expected: u32, computed: u32 },
    #[error("buffer error: {0}")]
    Buffer(#[from] BufferError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// World orchestrator errors: bad state transitions, missing capabilities.
#[derive(Debug, Error)]
pub enum WorldError {
    #[error("illegal chunk state transition at ({x}, {y}): {from:?} -> {to:?}")]
    IllegalTransition {
        x: i32,
        y: i32,
        from: crate::chunk::ChunkState,
        to: crate::chunk::ChunkState,
    },
    #[error("chunk ({0}, {1}) is not active")]
    ChunkNotActive(i32, i32),
    #[error("required capability missing: {0}")]
    CapabilityMissing(&'static str),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Storage configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for field '{field}': {reason}")]
    InvalidField { field: String, reason: String },
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse YAML: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Crate-level umbrella error.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Buffer(#[from] BufferError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    World(#[from] WorldError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
