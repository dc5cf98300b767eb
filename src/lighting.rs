//! Deferred BFS lighting: two coupled propagators (block light, sky
//! light) running over `BlockIterator`s so they naturally cross chunk
//! boundaries. Budget-limited per tick to keep frame time bounded; the
//! mesh rebuild queue does not wait for lighting to settle.

use std::collections::{HashMap, VecDeque};

use crate::capability::BlockState;
use crate::chunk::{BlockIterator, Chunk};
use crate::constants::{CHUNK_SIZE_X, CHUNK_SIZE_Y, MAX_LIGHT_LEVEL};

const DEFAULT_BUDGET_PER_TICK: usize = 4096;

/// A dirty queue per light kind, draining a bounded number of entries
/// each tick and re-enqueueing neighbours when a value changes.
pub struct LightingEngine {
    block_dirty: VecDeque<BlockIterator>,
    sky_dirty: VecDeque<BlockIterator>,
    budget_per_tick: usize,
}

impl Default for LightingEngine {
    fn default() -> Self {
        Self::new(DEFAULT_BUDGET_PER_TICK)
    }
}

impl LightingEngine {
    pub fn new(budget_per_tick: usize) -> Self {
        Self {
            block_dirty: VecDeque::new(),
            sky_dirty: VecDeque::new(),
            budget_per_tick,
        }
    }

    pub fn mark_block_dirty(&mut self, iter: BlockIterator) {
        self.block_dirty.push_back(iter);
    }

    pub fn mark_sky_dirty(&mut self, iter: BlockIterator) {
        self.sky_dirty.push_back(iter);
    }

    /// Mark both light kinds dirty at once; the common case for a
    /// player-triggered block change.
    pub fn mark_dirty(&mut self, iter: BlockIterator) {
        self.mark_block_dirty(iter);
        self.mark_sky_dirty(iter);
    }

    /// Seed a freshly generated/loaded chunk: `is_sky`/sky-light columns
    /// and block-light emission sources are expected to already be set on
    /// the buffer (see `ChunkBuffer::recompute_sky_column` /
    /// `seed_block_light_sources`); this only marks the boundary ring
    /// dirty so propagation reconciles with neighbours.
    pub fn seed_chunk_borders(&mut self, chunk_x: i32, chunk_y: i32) {
        for y in 0..CHUNK_SIZE_Y {
            for x in [0usize, CHUNK_SIZE_X - 1] {
                self.mark_border_column(chunk_x, chunk_y, x, y);
            }
        }
        for x in 0..CHUNK_SIZE_X {
            for y in [0usize, CHUNK_SIZE_Y - 1] {
                self.mark_border_column(chunk_x, chunk_y, x, y);
            }
        }
    }

    fn mark_border_column(&mut self, chunk_x: i32, chunk_y: i32, x: usize, y: usize) {
        for z in 0..crate::constants::CHUNK_SIZE_Z {
            let iter = BlockIterator::from_local(chunk_x, chunk_y, x, y, z);
            self.mark_dirty(iter);
        }
    }

    /// Drop any dirty-queue entries pointing into a chunk about to be
    /// unloaded, so the queues never reference memory that no longer
    /// exists.
    pub fn drop_chunk(&mut self, chunk_x: i32, chunk_y: i32) {
        self.block_dirty
            .retain(|it| !(it.chunk_x == chunk_x && it.chunk_y == chunk_y));
        self.sky_dirty
            .retain(|it| !(it.chunk_x == chunk_x && it.chunk_y == chunk_y));
    }

    pub fn pending_count(&self) -> usize {
        self.block_dirty.len() + self.sky_dirty.len()
    }

    /// Run one tick's worth of propagation against the live chunk index.
    pub fn tick<S: BlockState>(&mut self, chunks: &mut HashMap<(i32, i32), Chunk<S>>) {
        let block_budget = self.budget_per_tick;
        for _ in 0..block_budget {
            let Some(iter) = self.block_dirty.pop_front() else {
                break;
            };
            self.process_block(chunks, iter);
        }

        let sky_budget = self.budget_per_tick;
        for _ in 0..sky_budget {
            let Some(iter) = self.sky_dirty.pop_front() else {
                break;
            };
            self.process_sky(chunks, iter);
        }
    }

    fn process_block<S: BlockState>(
        &mut self,
        chunks: &mut HashMap<(i32, i32), Chunk<S>>,
        iter: BlockIterator,
    ) {
        let Some(chunk) = chunks.get(&(iter.chunk_x, iter.chunk_y)) else {
            return;
        };
        let own_emission = chunk.buffer.get(iter.index).emits_light();
        let own_opacity = chunk.buffer.get(iter.index).opacity().max(1);
        let stored = chunk.buffer.block_light(iter.index);

        let mut best = 0u8;
        for (_, neighbour) in iter.neighbours() {
            if let Some(n_chunk) = chunks.get(&(neighbour.chunk_x, neighbour.chunk_y)) {
                let n_light = n_chunk.buffer.block_light(neighbour.index);
                best = best.max(n_light.saturating_sub(own_opacity));
            }
        }
        let computed = best.max(own_emission).min(MAX_LIGHT_LEVEL);

        if computed != stored {
            if let Some(chunk) = chunks.get_mut(&(iter.chunk_x, iter.chunk_y)) {
                chunk.buffer.set_block_light(iter.index, computed);
                chunk.buffer.mark_mesh_dirty();
            }
            for (_, neighbour) in iter.neighbours() {
                self.block_dirty.push_back(neighbour);
            }
        }
    }

    fn process_sky<S: BlockState>(
        &mut self,
        chunks: &mut HashMap<(i32, i32), Chunk<S>>,
        iter: BlockIterator,
    ) {
        let Some(chunk) = chunks.get(&(iter.chunk_x, iter.chunk_y)) else {
            return;
        };
        let is_sky = chunk.buffer.is_sky(iter.index);
        let own_opacity = chunk.buffer.get(iter.index).opacity().max(1);
        let stored = chunk.buffer.sky_light(iter.index);

        let computed = if is_sky {
            MAX_LIGHT_LEVEL
        } else {
            let mut best = 0u8;
            for (_, neighbour) in iter.neighbours() {
                if let Some(n_chunk) = chunks.get(&(neighbour.chunk_x, neighbour.chunk_y)) {
                    let n_light = n_chunk.buffer.sky_light(neighbour.index);
                    best = best.max(n_light.saturating_sub(own_opacity));
                }
            }
            best.min(MAX_LIGHT_LEVEL)
        };

        if computed != stored {
            if let Some(chunk) = chunks.get_mut(&(iter.chunk_x, iter.chunk_y)) {
                chunk.buffer.set_sky_light(iter.index, computed);
                chunk.buffer.mark_mesh_dirty();
            }
            for (_, neighbour) in iter.neighbours() {
                self.sky_dirty.push_back(neighbour);
            }
        }
    }
}

/// `floor((1 - clamp(1 - (cos(angle*2pi)*2 + 0.2), 0, 1)) * 11)`, range
/// 0..=11. Computed once per frame from the celestial angle and stored;
/// rendering reads it as an offset against raw sky light.
pub fn sky_darken_factor(celestial_angle: f32) -> u8 {
    let raw_brightness = 1.0 - ((celestial_angle * std::f32::consts::TAU).cos() * 2.0 + 0.2);
    let sky_brightness = raw_brightness.clamp(0.0, 1.0);
    ((1.0 - sky_brightness) * 11.0).floor() as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::index_of;

    #[derive(Clone, PartialEq)]
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

    fn torch() -> TestState {
        TestState {
            id: 2,
            opaque: false,
            emission: 14,
        }
    }

    #[test]
    fn block_light_propagates_and_attenuates() {
        let mut chunks = HashMap::new();
        let mut chunk = Chunk::new_empty(0, 0, air());
        let source_idx = index_of(8, 8, 8);
        chunk.buffer.set_raw(source_idx, torch());
        chunk.buffer.set_block_light(source_idx, 14);
        chunks.insert((0, 0), chunk);

        let mut engine = LightingEngine::new(1024);
        engine.mark_block_dirty(BlockIterator::new(0, 0, source_idx));
        for _ in 0..4 {
            engine.tick(&mut chunks);
        }

        let chunk = chunks.get(&(0, 0)).unwrap();
        let east_idx = index_of(9, 8, 8);
        assert_eq!(chunk.buffer.block_light(east_idx), 13);
        let far_idx = index_of(8, 8, 8 + 13);
        assert!(chunk.buffer.block_light(far_idx) <= 1);
    }

    #[test]
    fn sky_column_stays_lit_at_max() {
        let mut chunks = HashMap::new();
        let mut chunk = Chunk::new_empty(0, 0, air());
        chunk.buffer.recompute_sky_column(4, 4);
        chunks.insert((0, 0), chunk);

        let mut engine = LightingEngine::new(1024);
        let top = index_of(4, 4, crate::constants::CHUNK_SIZE_Z - 1);
        engine.mark_sky_dirty(BlockIterator::new(0, 0, top));
        engine.tick(&mut chunks);

        let chunk = chunks.get(&(0, 0)).unwrap();
        assert_eq!(chunk.buffer.sky_light(top), MAX_LIGHT_LEVEL);
    }

    #[test]
    fn drop_chunk_clears_its_dirty_entries() {
        let mut engine = LightingEngine::new(16);
        engine.mark_dirty(BlockIterator::new(1, 1, 0));
        engine.mark_dirty(BlockIterator::new(2, 2, 0));
        engine.drop_chunk(1, 1);
        assert_eq!(engine.pending_count(), 2);
    }

    #[test]
    fn sky_darken_is_zero_at_noon() {
        assert_eq!(sky_darken_factor(0.5), 0);
    }

    #[test]
    fn sky_darken_is_near_max_at_midnight() {
        assert!(sky_darken_factor(0.0) >= 10);
    }
}
