//! Infinite voxel world streaming and persistence engine: a sliding
//! chunk activation window, region/single-chunk on-disk codecs, RLE
//! block compression, a job-scheduled generate/load/save pipeline, and
//! deferred BFS lighting. The core never touches rendering, physics or
//! input; it is driven entirely through the capability traits in
//! [`capability`] and the public API on [`world::World`].

pub mod buffer;
pub mod capability;
pub mod chunk;
pub mod constants;
pub mod error;
pub mod lighting;
pub mod logging;
pub mod reference;
pub mod rle;
pub mod scheduler;
pub mod storage;
pub mod world;
pub mod xml;

/// Commonly paired imports for a consumer wiring up a world.
pub mod prelude {
    pub use crate::capability::{BlockRegistry, BlockState, PlacementContext, Storage, TerrainGenerator, TimeProvider};
    pub use crate::chunk::{BlockIterator, Chunk, ChunkBuffer, ChunkState, Direction};
    pub use crate::world::raycast::RaycastHit;
    pub use crate::world::World;

    pub use glam::Vec3;
}

/// Current engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
