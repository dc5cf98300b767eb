//! Capability traits: externally supplied interfaces the core consumes but
//! never implements. A caller wires up a block catalogue, a terrain
//! generator, a storage backend, and a clock; the core only ever talks to
//! them through these seams.

use glam::Vec3;

use crate::chunk::{BlockIterator, ChunkBuffer, Direction};

/// Everything known about a place-block interaction: which block was
/// aimed at, which face and block were actually clicked (they differ
/// when the click lands on a replaceable block like a slab), and the
/// block the player is holding. Passed to [`BlockState::merge_placement`]
/// so shape-aware blocks (slabs, stairs) can decide how to combine.
pub struct PlacementContext<S: BlockState> {
    pub target: BlockIterator,
    pub clicked: BlockIterator,
    pub face: Direction,
    pub hit_point: Vec3,
    pub look_dir: Vec3,
    pub held_block: S,
}

/// An opaque, comparable handle identifying a block variant. Owned
/// externally by a [`BlockRegistry`]; the core only asks a handful of
/// yes/no/numeric questions of it.
pub trait BlockState: Clone + PartialEq + Send + Sync + 'static {
    /// True if this block fully occludes light and raycasts (an immediate
    /// DDA hit).
    fn is_full_opaque(&self) -> bool;

    /// Light emitted by this block, 0..=15.
    fn emits_light(&self) -> u8;

    /// How much this block attenuates light passing through it, 0..=15.
    fn opacity(&self) -> u8;

    /// Stable numeric id used by the ESF/ESFS codecs. Air is conventionally
    /// id 0.
    fn numeric_id(&self) -> u8;

    /// Whether this is the canonical "air" state (`numeric_id() == 0`).
    fn is_air(&self) -> bool {
        self.numeric_id() == 0
    }

    /// Whether a placement may overwrite this block outright (e.g. water,
    /// tall grass) without the player first digging it. Default: only air.
    fn can_be_replaced(&self, ctx: &PlacementContext<Self>) -> bool
    where
        Self: Sized,
    {
        let _ = ctx;
        self.is_air()
    }

    /// Attempt to merge this (held) block into `existing`, the block
    /// currently occupying the clicked position (the slab/stairs
    /// double-block case). Only consulted when `existing.can_be_replaced`
    /// already holds; `None` means no merge is possible and the caller
    /// should fall through to ordinary placement.
    fn merge_placement(&self, existing: &Self, ctx: &PlacementContext<Self>) -> Option<Self>
    where
        Self: Sized,
    {
        let _ = (existing, ctx);
        None
    }
}

/// Resolves numeric IDs to/from block states. Implementations are expected
/// to be cheap to clone (an `Arc` around a lookup table, typically) since
/// jobs carry a handle across threads.
pub trait BlockRegistry: Send + Sync + 'static {
    type State: BlockState;

    /// The canonical air state, used to initialise empty chunks.
    fn air(&self) -> Self::State;

    /// Resolve a numeric id to a state; unknown ids should resolve to
    /// `None` so callers can fall back to air with a warning.
    fn resolve(&self, id: u8) -> Option<Self::State>;

    /// Inverse of `resolve`.
    fn id_of(&self, state: &Self::State) -> u8 {
        state.numeric_id()
    }
}

/// Fills a freshly created chunk buffer with terrain. Pure function of
/// chunk coordinates and seed; the core never inspects the algorithm.
pub trait TerrainGenerator<S: BlockState>: Send + Sync + 'static {
    fn generate(&self, chunk_x: i32, chunk_y: i32, seed: u64) -> ChunkBuffer<S>;
}

/// Persists and retrieves raw block-id grids for chunks. The core only
/// moves `u8` ids (see [`BlockRegistry`]) through this interface, never
/// the block states themselves, so storage backends stay decoupled from
/// whatever registry is in play.
pub trait Storage: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    fn chunk_exists(&self, chunk_x: i32, chunk_y: i32) -> bool;

    /// Returns the decoded, z-major block-id grid (`CHUNK_VOLUME` entries).
    fn load_chunk(&self, chunk_x: i32, chunk_y: i32) -> Result<Vec<u8>, Self::Error>;

    fn save_chunk(&self, chunk_x: i32, chunk_y: i32, ids: &[u8]) -> Result<(), Self::Error>;

    /// Flush any buffered writes (region headers, caches) to disk.
    fn flush(&self) -> Result<(), Self::Error>;
}

/// Supplies the current in-game time for sky-darken calculations.
pub trait TimeProvider: Send + Sync + 'static {
    /// Celestial angle in `[0, 1)`; 0.0/1.0 is midnight, 0.5 is noon.
    fn celestial_angle(&self) -> f32;
}
