//! The voxel chunk buffer: a fixed 16x16x128 column of block states plus
//! packed lighting, and the lifecycle state machine that the world
//! orchestrator drives around it.

pub mod iterator;

pub use iterator::{BlockIterator, Direction};

use log::warn;

use crate::capability::{BlockRegistry, BlockState};
use crate::constants::{CHUNK_SIZE_X, CHUNK_SIZE_Y, CHUNK_SIZE_Z, CHUNK_VOLUME, MAX_LIGHT_LEVEL};

/// `(z << 8) | (y << 4) | x` — z-major so vertical columns are contiguous,
/// matching the region codec's top-down scan order.
pub fn index_of(x: usize, y: usize, z: usize) -> usize {
    debug_assert!(x < CHUNK_SIZE_X && y < CHUNK_SIZE_Y && z < CHUNK_SIZE_Z);
    (z << 8) | (y << 4) | x
}

pub fn coords_of(index: usize) -> (usize, usize, usize) {
    let x = index & 0xF;
    let y = (index >> 4) & 0xF;
    let z = index >> 8;
    (x, y, z)
}

/// Minimal fixed-size bitset over `CHUNK_VOLUME` blocks.
#[derive(Debug, Clone)]
struct BlockBitset {
    words: Box<[u64]>,
}

impl BlockBitset {
    fn new() -> Self {
        Self {
            words: vec![0u64; CHUNK_VOLUME.div_ceil(64)].into_boxed_slice(),
        }
    }

    fn get(&self, index: usize) -> bool {
        (self.words[index / 64] >> (index % 64)) & 1 != 0
    }

    fn set(&mut self, index: usize, value: bool) {
        let word = &mut self.words[index / 64];
        if value {
            *word |= 1 << (index % 64);
        } else {
            *word &= !(1 << (index % 64));
        }
    }
}

/// Every lawful state a chunk can occupy. Transitions are enumerated and
/// enforced by `World`; nothing outside that module may assign `state`
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkState {
    Inactive,
    CheckingDisk,
    PendingLoad,
    Loading,
    PendingGenerate,
    Generating,
    PendingSave,
    Saving,
    Active,
    PendingUnload,
}

impl ChunkState {
    /// The fixed transition table from ss4.8 of the design. `false` for any
    /// pair not listed here means the transition is illegal.
    pub fn can_transition_to(self, to: ChunkState) -> bool {
        use ChunkState::*;
        matches!(
            (self, to),
            (Inactive, CheckingDisk)
                | (CheckingDisk, PendingLoad)
                | (CheckingDisk, PendingGenerate)
                | (PendingLoad, Loading)
                | (PendingGenerate, Generating)
                | (Loading, Active)
                | (Loading, PendingGenerate)
                | (Generating, Active)
                | (Generating, PendingUnload)
                | (Active, PendingSave)
                | (Active, Inactive)
                | (Active, PendingUnload)
                | (PendingSave, Saving)
                | (Saving, Active)
                | (PendingUnload, Inactive)
        )
    }
}

/// The 16x16x128 voxel grid plus packed lighting. Generic over the block
/// state type so callers may plug in their own registry's handle.
#[derive(Clone)]
pub struct ChunkBuffer<S: BlockState> {
    blocks: Vec<S>,
    /// bits 4-7 sky light, bits 0-3 block light.
    lighting: Vec<u8>,
    is_sky: BlockBitset,
    lighting_dirty: BlockBitset,
    mesh_dirty: bool,
}

impl<S: BlockState> ChunkBuffer<S> {
    pub fn filled_with(air: S) -> Self {
        Self {
            blocks: vec![air; CHUNK_VOLUME],
            lighting: vec![0u8; CHUNK_VOLUME],
            is_sky: BlockBitset::new(),
            lighting_dirty: BlockBitset::new(),
            mesh_dirty: true,
        }
    }

    pub fn get(&self, index: usize) -> &S {
        &self.blocks[index]
    }

    pub fn set_raw(&mut self, index: usize, state: S) {
        self.blocks[index] = state;
    }

    pub fn sky_light(&self, index: usize) -> u8 {
        self.lighting[index] >> 4
    }

    pub fn set_sky_light(&mut self, index: usize, level: u8) {
        debug_assert!(level <= MAX_LIGHT_LEVEL);
        let block = self.lighting[index] & 0x0F;
        self.lighting[index] = (level << 4) | block;
    }

    pub fn block_light(&self, index: usize) -> u8 {
        self.lighting[index] & 0x0F
    }

    pub fn set_block_light(&mut self, index: usize, level: u8) {
        debug_assert!(level <= MAX_LIGHT_LEVEL);
        let sky = self.lighting[index] & 0xF0;
        self.lighting[index] = sky | (level & 0x0F);
    }

    pub fn is_sky(&self, index: usize) -> bool {
        self.is_sky.get(index)
    }

    pub fn set_is_sky(&mut self, index: usize, value: bool) {
        self.is_sky.set(index, value);
    }

    pub fn is_lighting_dirty(&self, index: usize) -> bool {
        self.lighting_dirty.get(index)
    }

    pub fn set_lighting_dirty(&mut self, index: usize, value: bool) {
        self.lighting_dirty.set(index, value);
    }

    pub fn needs_mesh_rebuild(&self) -> bool {
        self.mesh_dirty
    }

    pub fn mark_mesh_dirty(&mut self) {
        self.mesh_dirty = true;
    }

    pub fn clear_mesh_dirty(&mut self) {
        self.mesh_dirty = false;
    }

    /// Highest z at which the column is opaque, if any.
    pub fn top_opaque_z(&self, x: usize, y: usize) -> Option<usize> {
        for z in (0..CHUNK_SIZE_Z).rev() {
            if self.blocks[index_of(x, y, z)].is_full_opaque() {
                return Some(z);
            }
        }
        None
    }

    /// Recompute the `is_sky` bitset and seed sky light for a whole column;
    /// used on generate/load before the lighting engine takes over.
    pub fn recompute_sky_column(&mut self, x: usize, y: usize) {
        let top = self.top_opaque_z(x, y);
        for z in (0..CHUNK_SIZE_Z).rev() {
            let idx = index_of(x, y, z);
            let open = match top {
                Some(top_z) => z > top_z,
                None => true,
            };
            self.set_is_sky(idx, open);
            if open {
                self.set_sky_light(idx, MAX_LIGHT_LEVEL);
            }
        }
    }

    pub fn seed_block_light_sources(&mut self) {
        for idx in 0..CHUNK_VOLUME {
            let emission = self.blocks[idx].emits_light();
            if emission > 0 {
                self.set_block_light(idx, emission);
            }
        }
    }

    /// Serialise to a flat numeric-id grid, for the save path. The caller
    /// is expected to have already deep-cloned this buffer if it needs to
    /// keep mutating the live chunk while the snapshot is written to disk.
    pub fn to_id_grid<R: BlockRegistry<State = S>>(&self, registry: &R) -> Vec<u8> {
        self.blocks.iter().map(|s| registry.id_of(s)).collect()
    }

    /// Decode a flat id grid read back from storage. `chunk_x`/`chunk_y`
    /// are only used to identify the chunk in the warning logged for any
    /// id the registry doesn't recognise (corrupted or stale save data).
    pub fn from_id_grid<R: BlockRegistry<State = S>>(
        ids: &[u8],
        registry: &R,
        chunk_x: i32,
        chunk_y: i32,
    ) -> Self {
        debug_assert_eq!(ids.len(), CHUNK_VOLUME);
        let mut buffer = Self::filled_with(registry.air());
        for (idx, &id) in ids.iter().enumerate() {
            let state = registry.resolve(id).unwrap_or_else(|| {
                warn!(
                    target: "voxelstrata::chunk",
                    "chunk ({chunk_x}, {chunk_y}): unknown block id {id} at index {idx}, using air"
                );
                registry.air()
            });
            buffer.set_raw(idx, state);
        }
        for x in 0..CHUNK_SIZE_X {
            for y in 0..CHUNK_SIZE_Y {
                buffer.recompute_sky_column(x, y);
            }
        }
        buffer.seed_block_light_sources();
        buffer
    }
}

/// One resident chunk: its coordinates, lifecycle state, and voxel data.
pub struct Chunk<S: BlockState> {
    pub chunk_x: i32,
    pub chunk_y: i32,
    pub state: ChunkState,
    pub modified: bool,
    /// Set only by [`Self::set_block_by_player`], never by programmatic
    /// writes (generation, load deserialisation). Lets a `PlayerModifiedOnly`
    /// save strategy skip persisting chunks that are only ever regenerated
    /// deterministically from the seed.
    pub player_modified: bool,
    pub generated: bool,
    pub buffer: ChunkBuffer<S>,
    /// Opaque renderer-side mesh handle; the core never interprets it.
    pub mesh_token: Option<u64>,
}

impl<S: BlockState> Chunk<S> {
    pub fn new_empty(chunk_x: i32, chunk_y: i32, air: S) -> Self {
        Self {
            chunk_x,
            chunk_y,
            state: ChunkState::Inactive,
            modified: false,
            player_modified: false,
            generated: false,
            buffer: ChunkBuffer::filled_with(air),
            mesh_token: None,
        }
    }

    pub fn try_transition(&mut self, to: ChunkState) -> bool {
        if self.state.can_transition_to(to) {
            self.state = to;
            true
        } else {
            false
        }
    }

    /// Write a block without any of the player-facing side effects
    /// (lighting dirty marks, neighbour notifications). Used by terrain
    /// generation and load deserialisation.
    pub fn set_block_programmatic(&mut self, index: usize, state: S) {
        let was_opaque = self.buffer.get(index).is_full_opaque();
        self.buffer.set_raw(index, state.clone());
        let is_opaque = state.is_full_opaque();
        if was_opaque != is_opaque {
            let (x, y, _) = coords_of(index);
            self.buffer.recompute_sky_column(x, y);
        }
        self.buffer.mark_mesh_dirty();
        self.modified = true;
    }

    /// Write a block via the player path: same as programmatic, but marks
    /// this block and its six neighbours dirty for the lighting engine.
    /// Returns the local index so the caller can enqueue neighbours.
    pub fn set_block_by_player(&mut self, index: usize, state: S) {
        self.set_block_programmatic(index, state);
        self.buffer.set_lighting_dirty(index, true);
        self.player_modified = true;
    }

    pub fn is_active(&self) -> bool {
        self.state == ChunkState::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, PartialEq, Eq)]
    struct TestState {
        id: u8,
        opaque: bool,
        emission: u8,
    }

    impl BlockState for TestState {
        fn is_full_opaque(&self) -> bool {
            self.opaque
        }
        fn emits_light(&self) -> u8 {
            self.emission
        }
        fn opacity(&self) -> u8 {
            if self.opaque {
                15
            } else {
                0
            }
        }
        fn numeric_id(&self) -> u8 {
            self.id
        }
    }

    fn air() -> TestState {
        TestState {
            id: 0,
            opaque: false,
            emission: 0,
        }
    }

    fn stone() -> TestState {
        TestState {
            id: 1,
            opaque: true,
            emission: 0,
        }
    }

    #[test]
    fn index_round_trips_through_coords() {
        for x in [0usize, 5, 15] {
            for y in [0usize, 5, 15] {
                for z in [0usize, 64, 127] {
                    let idx = index_of(x, y, z);
                    assert_eq!(coords_of(idx), (x, y, z));
                }
            }
        }
    }

    #[test]
    fn empty_column_is_all_sky() {
        let mut chunk = Chunk::new_empty(0, 0, air());
        chunk.buffer.recompute_sky_column(4, 4);
        for z in 0..CHUNK_SIZE_Z {
            let idx = index_of(4, 4, z);
            assert!(chunk.buffer.is_sky(idx));
            assert_eq!(chunk.buffer.sky_light(idx), MAX_LIGHT_LEVEL);
        }
    }

    #[test]
    fn opaque_block_caps_sky_below_it() {
        let mut chunk = Chunk::new_empty(0, 0, air());
        let idx = index_of(4, 4, 64);
        chunk.set_block_programmatic(idx, stone());
        assert!(!chunk.buffer.is_sky(idx));
        assert!(chunk.buffer.is_sky(index_of(4, 4, 65)));
        assert!(!chunk.buffer.is_sky(index_of(4, 4, 0)));
    }

    #[test]
    fn legal_state_transitions_enforced() {
        let mut chunk = Chunk::new_empty(0, 0, air());
        assert!(chunk.try_transition(ChunkState::CheckingDisk));
        assert!(chunk.try_transition(ChunkState::PendingGenerate));
        assert!(!chunk.try_transition(ChunkState::Saving));
        assert!(chunk.try_transition(ChunkState::Generating));
        assert!(chunk.try_transition(ChunkState::Active));
    }

    #[test]
    fn id_grid_round_trips() {
        struct Registry;
        impl BlockRegistry for Registry {
            type State = TestState;
            fn air(&self) -> TestState {
                air()
            }
            fn resolve(&self, id: u8) -> Option<TestState> {
                match id {
                    0 => Some(air()),
                    1 => Some(stone()),
                    _ => None,
                }
            }
        }

        let mut chunk = Chunk::new_empty(0, 0, air());
        chunk.set_block_programmatic(index_of(1, 1, 1), stone());
        let registry = Registry;
        let ids = chunk.buffer.to_id_grid(&registry);
        let rebuilt = ChunkBuffer::from_id_grid(&ids, &registry, 0, 0);
        assert_eq!(rebuilt.get(index_of(1, 1, 1)).id, 1);
        assert_eq!(rebuilt.get(index_of(0, 0, 0)).id, 0);
    }
}
