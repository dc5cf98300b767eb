//! The world orchestrator: owns the chunk index, drives the sliding
//! activation window, hands work to the job scheduler, and folds
//! completions back in. This is the one piece of the crate that knows
//! about all the other pieces; everything else only knows its own
//! corner.

pub mod raycast;

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use glam::Vec3;
use log::{info, warn};

use crate::capability::{BlockRegistry, BlockState, PlacementContext, Storage, TerrainGenerator, TimeProvider};
use crate::chunk::{BlockIterator, Chunk, ChunkState, Direction};
use crate::constants::{
    CHUNK_SIZE_X, CHUNK_SIZE_Y, CHUNK_SIZE_Z, DEACTIVATION_RANGE_BONUS, DEFAULT_ACTIVATION_RANGE,
    MAX_ACTIVATIONS_PER_FRAME, MAX_CONCURRENT_GENERATE_JOBS, MAX_CONCURRENT_LOAD_JOBS,
    MAX_CONCURRENT_SAVE_JOBS, MAX_MESH_REBUILDS_PER_FRAME, WORLD_META_VERSION,
};
use crate::lighting::{sky_darken_factor, LightingEngine};
use crate::scheduler::{CompletedJob, JobScheduler};
use crate::storage::SaveStrategy;
use crate::xml::WorldMetadata;
use raycast::RaycastHit;

const LOG_TARGET: &str = "voxelstrata::world";

/// Whether `chunk` is due for a save under `strategy`. A free function
/// (rather than a `&self` method) so callers can copy `self.save_strategy`
/// out before taking a mutable borrow of the chunk it's judging.
fn chunk_due_for_save<S: BlockState>(strategy: SaveStrategy, chunk: &Chunk<S>) -> bool {
    match strategy {
        SaveStrategy::All => true,
        SaveStrategy::ModifiedOnly => chunk.modified,
        SaveStrategy::PlayerModifiedOnly => chunk.player_modified,
    }
}

/// Converts a world block coordinate to the chunk/local-index pair a
/// `BlockIterator` needs. `None` when `z` falls outside the fixed
/// vertical extent; there is never a chunk above or below another.
fn iter_for_block(x: i32, y: i32, z: i32) -> Option<BlockIterator> {
    if z < 0 || z >= CHUNK_SIZE_Z as i32 {
        return None;
    }
    let chunk_x = x.div_euclid(CHUNK_SIZE_X as i32);
    let chunk_y = y.div_euclid(CHUNK_SIZE_Y as i32);
    let local_x = x.rem_euclid(CHUNK_SIZE_X as i32) as usize;
    let local_y = y.rem_euclid(CHUNK_SIZE_Y as i32) as usize;
    Some(BlockIterator::from_local(chunk_x, chunk_y, local_x, local_y, z as usize))
}

/// Owns one voxel world: chunk storage, streaming, lighting and the
/// public API a game loop drives it through. Generic over the four
/// capability seams it was handed at construction time.
pub struct World<S, G, R, St, T>
where
    S: BlockState,
    G: TerrainGenerator<S>,
    R: BlockRegistry<State = S>,
    St: Storage,
    T: TimeProvider,
{
    world_name: String,
    seed: u64,
    base_path: PathBuf,
    spawn_point: (i32, i32, i32),

    chunks: HashMap<(i32, i32), Chunk<S>>,
    generate_queue: VecDeque<(i32, i32)>,
    load_queue: VecDeque<(i32, i32)>,
    save_queue: VecDeque<(i32, i32)>,
    mesh_queue: VecDeque<(i32, i32)>,
    mesh_queued: HashSet<(i32, i32)>,
    ready_meshes: Vec<(i32, i32)>,

    generating_in_flight: usize,
    loading_in_flight: usize,
    saving_in_flight: usize,

    player_pos: Vec3,
    activation_range: i32,
    save_strategy: SaveStrategy,

    generator: Arc<G>,
    registry: Arc<R>,
    storage: Arc<St>,
    time_provider: Arc<T>,

    scheduler: JobScheduler<S>,
    lighting: LightingEngine,
    sky_darken: u8,

    shutting_down: bool,
}

impl<S, G, R, St, T> World<S, G, R, St, T>
where
    S: BlockState,
    G: TerrainGenerator<S>,
    R: BlockRegistry<State = S>,
    St: Storage,
    T: TimeProvider,
{
    pub fn new(
        world_name: impl Into<String>,
        seed: u64,
        base_path: impl Into<PathBuf>,
        generator: Arc<G>,
        registry: Arc<R>,
        storage: Arc<St>,
        time_provider: Arc<T>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            world_name: world_name.into(),
            seed,
            base_path: base_path.into(),
            spawn_point: (0, 0, 64),
            chunks: HashMap::new(),
            generate_queue: VecDeque::new(),
            load_queue: VecDeque::new(),
            save_queue: VecDeque::new(),
            mesh_queue: VecDeque::new(),
            mesh_queued: HashSet::new(),
            ready_meshes: Vec::new(),
            generating_in_flight: 0,
            loading_in_flight: 0,
            saving_in_flight: 0,
            player_pos: Vec3::ZERO,
            activation_range: DEFAULT_ACTIVATION_RANGE,
            save_strategy: SaveStrategy::ModifiedOnly,
            generator,
            registry,
            storage,
            time_provider,
            scheduler: JobScheduler::new(rayon::current_num_threads().max(2))?,
            lighting: LightingEngine::default(),
            sky_darken: 0,
            shutting_down: false,
        })
    }

    pub fn set_player_position(&mut self, pos: Vec3) {
        self.player_pos = pos;
    }

    pub fn set_chunk_activation_range(&mut self, range: i32) {
        self.activation_range = range.max(0);
    }

    /// Governs which active chunks `save_world` and eviction persist:
    /// `All` saves everything, `ModifiedOnly` (the default) saves chunks
    /// touched by generation/load/player edits, `PlayerModifiedOnly` saves
    /// only chunks a player has actually edited, leaving untouched
    /// terrain to be regenerated deterministically from the seed.
    pub fn set_save_strategy(&mut self, strategy: SaveStrategy) {
        self.save_strategy = strategy;
    }

    pub fn spawn_point(&self) -> (i32, i32, i32) {
        self.spawn_point
    }

    pub fn set_spawn_point(&mut self, spawn: (i32, i32, i32)) {
        self.spawn_point = spawn;
    }

    pub fn loaded_chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn sky_darken(&self) -> u8 {
        self.sky_darken
    }

    fn player_chunk(&self) -> (i32, i32) {
        (
            (self.player_pos.x / CHUNK_SIZE_X as f32).floor() as i32,
            (self.player_pos.y / CHUNK_SIZE_Y as f32).floor() as i32,
        )
    }

    /// Every chunk coordinate inside `activation_range`, nearest first.
    fn calculate_needed_chunks(&self) -> Vec<(i32, i32)> {
        let (pcx, pcy) = self.player_chunk();
        let r = self.activation_range;
        let mut coords = Vec::new();
        for dx in -r..=r {
            for dy in -r..=r {
                if dx * dx + dy * dy <= r * r {
                    coords.push((pcx + dx, pcy + dy));
                }
            }
        }
        coords.sort_by_key(|&(cx, cy)| (cx - pcx).pow(2) + (cy - pcy).pow(2));
        coords
    }

    fn in_any_pending_queue(&self, coord: (i32, i32)) -> bool {
        self.generate_queue.contains(&coord)
            || self.load_queue.contains(&coord)
            || self.save_queue.contains(&coord)
    }

    /// Activate newly-in-range chunks (checking disk presence to route
    /// them to load or generate) up to the per-frame activation cap, then
    /// evict the chunks that have drifted the farthest out of range.
    fn update_nearby_chunks(&mut self) {
        let needed = self.calculate_needed_chunks();
        let mut activated = 0usize;
        for coord in needed {
            if activated >= MAX_ACTIVATIONS_PER_FRAME {
                break;
            }
            if self.chunks.contains_key(&coord) || self.in_any_pending_queue(coord) {
                continue;
            }
            self.activate_chunk(coord);
            activated += 1;
        }
        self.unload_farthest_chunks();
    }

    fn activate_chunk(&mut self, coord: (i32, i32)) {
        let (cx, cy) = coord;
        let mut chunk = Chunk::new_empty(cx, cy, self.registry.air());
        chunk.try_transition(ChunkState::CheckingDisk);
        if self.storage.chunk_exists(cx, cy) {
            chunk.try_transition(ChunkState::PendingLoad);
            self.load_queue.push_back(coord);
        } else {
            chunk.try_transition(ChunkState::PendingGenerate);
            self.generate_queue.push_back(coord);
        }
        self.chunks.insert(coord, chunk);
    }

    /// Eviction rate scales with how far the resident count has
    /// overshot the steady-state target, so a sudden teleport drains
    /// the backlog faster than ordinary drift.
    fn unload_farthest_chunks(&mut self) {
        let target = self.calculate_needed_chunks().len().max(1);
        let loaded = self.chunks.len();
        let budget = if loaded as f64 > 1.5 * target as f64 {
            4
        } else if loaded as f64 > 1.2 * target as f64 {
            2
        } else {
            1
        };
        for _ in 0..budget {
            if !self.unload_farthest_chunk() {
                break;
            }
        }
    }

    fn farthest_chunk(&self) -> Option<(i32, i32, i32)> {
        let (pcx, pcy) = self.player_chunk();
        self.chunks
            .keys()
            .map(|&(cx, cy)| (cx, cy, (cx - pcx).pow(2) + (cy - pcy).pow(2)))
            .max_by_key(|&(_, _, dist_sq)| dist_sq)
    }

    fn unload_farthest_chunk(&mut self) -> bool {
        let deactivation_sq = (self.activation_range + DEACTIVATION_RANGE_BONUS).pow(2);
        let Some((cx, cy, dist_sq)) = self.farthest_chunk() else {
            return false;
        };
        if dist_sq <= deactivation_sq {
            return false;
        }
        self.cancel_pending_jobs_for((cx, cy));
        self.unload_chunk(cx, cy);
        true
    }

    fn cancel_pending_jobs_for(&mut self, coord: (i32, i32)) {
        self.generate_queue.retain(|c| *c != coord);
        self.load_queue.retain(|c| *c != coord);
        self.save_queue.retain(|c| *c != coord);
    }

    /// Active chunks due for a save under the current [`SaveStrategy`]
    /// are queued for one and get picked up again next tick once the
    /// save completes and `modified` clears; everything else drops
    /// immediately. A chunk mid-generate is marked `PendingUnload` and
    /// freed as soon as its job lands.
    fn unload_chunk(&mut self, cx: i32, cy: i32) {
        let coord = (cx, cy);
        let strategy = self.save_strategy;
        let Some(chunk) = self.chunks.get_mut(&coord) else {
            return;
        };
        match chunk.state {
            ChunkState::Active => {
                if chunk_due_for_save(strategy, chunk) {
                    if chunk.try_transition(ChunkState::PendingSave) {
                        self.save_queue.push_back(coord);
                    }
                } else if chunk.try_transition(ChunkState::Inactive) {
                    self.lighting.drop_chunk(cx, cy);
                    self.chunks.remove(&coord);
                }
            }
            ChunkState::Generating => {
                chunk.try_transition(ChunkState::PendingUnload);
            }
            _ => {
                self.lighting.drop_chunk(cx, cy);
                self.chunks.remove(&coord);
            }
        }
    }

    /// Drop queued jobs whose target has drifted out of the
    /// deactivation ring since being queued, and free the chunk entry
    /// entirely if it never got past the checking/pending stage.
    fn remove_distant_jobs(&mut self) {
        let (pcx, pcy) = self.player_chunk();
        let max_dist_sq = (self.activation_range + DEACTIVATION_RANGE_BONUS).pow(2);

        let mut dropped = Vec::new();
        for queue in [&mut self.generate_queue, &mut self.load_queue, &mut self.save_queue] {
            let mut kept = VecDeque::with_capacity(queue.len());
            while let Some(coord) = queue.pop_front() {
                let dx = coord.0 - pcx;
                let dy = coord.1 - pcy;
                if dx * dx + dy * dy > max_dist_sq {
                    dropped.push(coord);
                } else {
                    kept.push_back(coord);
                }
            }
            *queue = kept;
        }

        for coord in dropped {
            if let Some(chunk) = self.chunks.get(&coord) {
                if matches!(
                    chunk.state,
                    ChunkState::PendingGenerate | ChunkState::PendingLoad | ChunkState::CheckingDisk
                ) {
                    self.lighting.drop_chunk(coord.0, coord.1);
                    self.chunks.remove(&coord);
                }
            }
        }
    }

    fn process_job_queues(&mut self) {
        while self.loading_in_flight < MAX_CONCURRENT_LOAD_JOBS {
            let Some(coord) = self.load_queue.pop_front() else {
                break;
            };
            let Some(chunk) = self.chunks.get_mut(&coord) else {
                continue;
            };
            if !chunk.try_transition(ChunkState::Loading) {
                continue;
            }
            self.loading_in_flight += 1;
            self.scheduler
                .submit_load(coord.0, coord.1, self.storage.clone(), self.registry.clone());
        }
        while self.generating_in_flight < MAX_CONCURRENT_GENERATE_JOBS {
            let Some(coord) = self.generate_queue.pop_front() else {
                break;
            };
            let Some(chunk) = self.chunks.get_mut(&coord) else {
                continue;
            };
            if !chunk.try_transition(ChunkState::Generating) {
                continue;
            }
            self.generating_in_flight += 1;
            self.scheduler
                .submit_generate(coord.0, coord.1, self.generator.clone(), self.seed);
        }
        while self.saving_in_flight < MAX_CONCURRENT_SAVE_JOBS {
            let Some(coord) = self.save_queue.pop_front() else {
                break;
            };
            let Some(chunk) = self.chunks.get_mut(&coord) else {
                continue;
            };
            if !chunk.try_transition(ChunkState::Saving) {
                continue;
            }
            let ids = chunk.buffer.to_id_grid(self.registry.as_ref());
            self.saving_in_flight += 1;
            self.scheduler.submit_save(coord.0, coord.1, self.storage.clone(), ids);
        }
    }

    fn process_completed_jobs(&mut self) {
        for job in self.scheduler.retrieve_completed() {
            match job {
                CompletedJob::Generate { chunk_x, chunk_y, buffer } => {
                    self.generating_in_flight = self.generating_in_flight.saturating_sub(1);
                    self.integrate_generated(chunk_x, chunk_y, buffer, true);
                }
                CompletedJob::Load { chunk_x, chunk_y, result } => {
                    self.loading_in_flight = self.loading_in_flight.saturating_sub(1);
                    match result {
                        Ok(buffer) => self.integrate_generated(chunk_x, chunk_y, buffer, false),
                        Err(err) => {
                            warn!(
                                target: LOG_TARGET,
                                "load failed for ({chunk_x}, {chunk_y}): {err}, generating instead"
                            );
                            let coord = (chunk_x, chunk_y);
                            if let Some(chunk) = self.chunks.get_mut(&coord) {
                                if chunk.state == ChunkState::Loading
                                    && chunk.try_transition(ChunkState::PendingGenerate)
                                {
                                    self.generate_queue.push_back(coord);
                                }
                            }
                        }
                    }
                }
                CompletedJob::Save { chunk_x, chunk_y, result } => {
                    self.saving_in_flight = self.saving_in_flight.saturating_sub(1);
                    let coord = (chunk_x, chunk_y);
                    if let Some(chunk) = self.chunks.get_mut(&coord) {
                        if chunk.state == ChunkState::Saving {
                            match result {
                                Ok(()) => {
                                    chunk.modified = false;
                                    chunk.player_modified = false;
                                }
                                Err(err) => warn!(
                                    target: LOG_TARGET,
                                    "save failed for ({chunk_x}, {chunk_y}): {err}"
                                ),
                            }
                            chunk.try_transition(ChunkState::Active);
                        }
                    }
                }
            }
        }
    }

    /// Fold a completed generate/load job back into the chunk index.
    /// If the chunk drifted to `PendingUnload` while the job was in
    /// flight, or its state no longer matches what this job expects
    /// (a stale completion racing a more recent transition), the
    /// result is discarded rather than applied.
    fn integrate_generated(&mut self, chunk_x: i32, chunk_y: i32, buffer: crate::chunk::ChunkBuffer<S>, generated_fresh: bool) {
        let coord = (chunk_x, chunk_y);
        let expected = if generated_fresh {
            ChunkState::Generating
        } else {
            ChunkState::Loading
        };

        let current_state = match self.chunks.get(&coord) {
            Some(chunk) => chunk.state,
            None => return,
        };

        if current_state == ChunkState::PendingUnload {
            self.lighting.drop_chunk(chunk_x, chunk_y);
            self.chunks.remove(&coord);
            return;
        }

        if current_state != expected {
            return;
        }

        if let Some(chunk) = self.chunks.get_mut(&coord) {
            chunk.buffer = buffer;
            chunk.generated = true;
            chunk.modified = generated_fresh;
            chunk.try_transition(ChunkState::Active);
        }

        self.lighting.seed_chunk_borders(chunk_x, chunk_y);
        self.schedule_mesh_rebuild(coord);
    }

    fn schedule_mesh_rebuild(&mut self, coord: (i32, i32)) {
        if let Some(chunk) = self.chunks.get_mut(&coord) {
            chunk.buffer.mark_mesh_dirty();
        }
        if self.mesh_queued.insert(coord) {
            self.mesh_queue.push_back(coord);
        }
    }

    /// Pull the nearest-to-player dirty chunks off the mesh queue, up
    /// to the per-tick cap, and promote them to `ready_meshes` if they
    /// are still active and actually still dirty.
    fn update_chunk_meshes(&mut self) {
        let (pcx, pcy) = self.player_chunk();
        let mut scratch: Vec<(i32, i32)> = self.mesh_queue.drain(..).collect();
        let cap = MAX_MESH_REBUILDS_PER_FRAME.min(scratch.len());
        if cap > 0 && cap < scratch.len() {
            scratch.select_nth_unstable_by(cap - 1, |a, b| {
                let da = (a.0 - pcx).pow(2) + (a.1 - pcy).pow(2);
                let db = (b.0 - pcx).pow(2) + (b.1 - pcy).pow(2);
                da.cmp(&db)
            });
        }
        let (ready, rest) = scratch.split_at(cap);
        for &coord in ready {
            self.mesh_queued.remove(&coord);
            if let Some(chunk) = self.chunks.get_mut(&coord) {
                if chunk.is_active() && chunk.buffer.needs_mesh_rebuild() {
                    chunk.buffer.clear_mesh_dirty();
                    self.ready_meshes.push(coord);
                }
            }
        }
        for &coord in rest {
            self.mesh_queue.push_back(coord);
        }
    }

    /// Consumer-facing pull: rendering calls this once per frame and
    /// rebuilds meshes for whatever chunks come back. The core never
    /// builds or owns mesh data itself.
    pub fn drain_ready_meshes(&mut self) -> Vec<(i32, i32)> {
        std::mem::take(&mut self.ready_meshes)
    }

    /// One tick of the world: stream chunks in/out, pump the job
    /// queues, fold back completions, propagate lighting, and surface
    /// newly-dirty meshes. A no-op once `prepare_shutdown` has run.
    pub fn update(&mut self, _dt: f32) {
        if self.shutting_down {
            return;
        }
        self.update_nearby_chunks();
        self.process_job_queues();
        self.remove_distant_jobs();
        self.process_completed_jobs();
        self.lighting.tick(&mut self.chunks);
        self.sky_darken = sky_darken_factor(self.time_provider.celestial_angle());
        self.update_chunk_meshes();
    }

    pub fn get_block_state(&self, x: i32, y: i32, z: i32) -> Option<S> {
        let iter = iter_for_block(x, y, z)?;
        let chunk = self.chunks.get(&(iter.chunk_x, iter.chunk_y))?;
        if !chunk.is_active() {
            return None;
        }
        Some(chunk.buffer.get(iter.index).clone())
    }

    pub fn set_block_state(&mut self, x: i32, y: i32, z: i32, state: S) -> bool {
        let Some(iter) = iter_for_block(x, y, z) else {
            return false;
        };
        self.write_block(iter, state)
    }

    fn write_block(&mut self, iter: BlockIterator, state: S) -> bool {
        let coord = (iter.chunk_x, iter.chunk_y);
        let Some(chunk) = self.chunks.get_mut(&coord) else {
            return false;
        };
        if !chunk.is_active() {
            return false;
        }
        chunk.set_block_by_player(iter.index, state);
        self.mark_lighting_dirty(iter);
        self.schedule_mesh_rebuild(coord);
        self.notify_neighbours(iter);
        true
    }

    fn mark_lighting_dirty(&mut self, iter: BlockIterator) {
        self.lighting.mark_dirty(iter);
        for (_, n) in iter.neighbours() {
            self.lighting.mark_dirty(n);
        }
    }

    /// Shape-aware blocks (a slab's other half, a torch's attachment
    /// face) can depend on a neighbour's occupancy; rather than a
    /// generic per-block callback trait, this marks the six
    /// surrounding chunks' meshes dirty so a rebuild picks up the
    /// change. Lighting already re-walks from `mark_lighting_dirty`.
    fn notify_neighbours(&mut self, iter: BlockIterator) {
        let own = (iter.chunk_x, iter.chunk_y);
        for (_, n) in iter.neighbours() {
            let coord = (n.chunk_x, n.chunk_y);
            if coord != own {
                self.schedule_mesh_rebuild(coord);
            }
        }
    }

    pub fn get_sky_light(&self, x: i32, y: i32, z: i32) -> Option<u8> {
        let iter = iter_for_block(x, y, z)?;
        let chunk = self.chunks.get(&(iter.chunk_x, iter.chunk_y))?;
        if !chunk.is_active() {
            return None;
        }
        Some(chunk.buffer.sky_light(iter.index))
    }

    pub fn get_block_light(&self, x: i32, y: i32, z: i32) -> Option<u8> {
        let iter = iter_for_block(x, y, z)?;
        let chunk = self.chunks.get(&(iter.chunk_x, iter.chunk_y))?;
        if !chunk.is_active() {
            return None;
        }
        Some(chunk.buffer.block_light(iter.index))
    }

    pub fn get_is_sky(&self, x: i32, y: i32, z: i32) -> Option<bool> {
        let iter = iter_for_block(x, y, z)?;
        let chunk = self.chunks.get(&(iter.chunk_x, iter.chunk_y))?;
        if !chunk.is_active() {
            return None;
        }
        Some(chunk.buffer.is_sky(iter.index))
    }

    pub fn get_top_block_z(&self, x: i32, y: i32) -> Option<usize> {
        let chunk_x = x.div_euclid(CHUNK_SIZE_X as i32);
        let chunk_y = y.div_euclid(CHUNK_SIZE_Y as i32);
        let local_x = x.rem_euclid(CHUNK_SIZE_X as i32) as usize;
        let local_y = y.rem_euclid(CHUNK_SIZE_Y as i32) as usize;
        let chunk = self.chunks.get(&(chunk_x, chunk_y))?;
        if !chunk.is_active() {
            return None;
        }
        chunk.buffer.top_opaque_z(local_x, local_y)
    }

    pub fn get_top_block(&self, x: i32, y: i32) -> Option<S> {
        let z = self.get_top_block_z(x, y)?;
        self.get_block_state(x, y, z as i32)
    }

    pub fn raycast_vs_blocks(&self, origin: Vec3, direction: Vec3, max_len: f32) -> RaycastHit<S> {
        raycast::raycast_vs_blocks(origin, direction, max_len, |iter| {
            let chunk = self.chunks.get(&(iter.chunk_x, iter.chunk_y))?;
            if !chunk.is_active() {
                return None;
            }
            Some(chunk.buffer.get(iter.index).clone())
        })
    }

    /// Replace the block at `iter` with air, if it isn't air already.
    pub fn dig_block(&mut self, iter: BlockIterator) -> bool {
        let coord = (iter.chunk_x, iter.chunk_y);
        let already_air = match self.chunks.get(&coord) {
            Some(chunk) if chunk.is_active() => chunk.buffer.get(iter.index).is_air(),
            _ => return false,
        };
        if already_air {
            return false;
        }
        let air = self.registry.air();
        self.write_block(iter, air)
    }

    /// Place `state` at `iter` if it is currently empty/replaceable.
    /// For shape-aware merge behaviour (slabs stacking into a full
    /// block) use [`Self::place_block_contextual`] instead.
    pub fn place_block(&mut self, iter: BlockIterator, state: S) -> bool {
        let coord = (iter.chunk_x, iter.chunk_y);
        let existing = match self.chunks.get(&coord) {
            Some(chunk) if chunk.is_active() => chunk.buffer.get(iter.index).clone(),
            _ => return false,
        };
        let ctx = PlacementContext {
            target: iter,
            clicked: iter,
            face: Direction::Up,
            hit_point: Vec3::ZERO,
            look_dir: Vec3::ZERO,
            held_block: state.clone(),
        };
        if !existing.can_be_replaced(&ctx) {
            return false;
        }
        self.write_block(iter, state)
    }

    /// Full contextual placement: tries to merge into the clicked
    /// block first (slab-on-slab), then falls back to placing against
    /// the target face.
    pub fn place_block_contextual(&mut self, ctx: PlacementContext<S>) -> bool {
        let clicked_coord = (ctx.clicked.chunk_x, ctx.clicked.chunk_y);
        let clicked_state = match self.chunks.get(&clicked_coord) {
            Some(chunk) if chunk.is_active() => chunk.buffer.get(ctx.clicked.index).clone(),
            _ => return false,
        };

        if clicked_state.can_be_replaced(&ctx) {
            if let Some(merged) = ctx.held_block.merge_placement(&clicked_state, &ctx) {
                return self.write_block(ctx.clicked, merged);
            }
        }

        let target_coord = (ctx.target.chunk_x, ctx.target.chunk_y);
        let target_state = match self.chunks.get(&target_coord) {
            Some(chunk) if chunk.is_active() => chunk.buffer.get(ctx.target.index).clone(),
            _ => return false,
        };
        if !target_state.can_be_replaced(&ctx) {
            return false;
        }
        self.write_block(ctx.target, ctx.held_block.clone())
    }

    fn metadata_path(&self) -> PathBuf {
        self.base_path.join("world.xml")
    }

    /// Write every active chunk due for a save under the current
    /// [`SaveStrategy`] to storage, flush the backend, and persist world
    /// metadata. Does not wait for in-flight async saves queued by a
    /// previous tick; call [`Self::close_world`] for a full
    /// drain-and-save on shutdown.
    pub fn save_world(&mut self) -> anyhow::Result<()> {
        let strategy = self.save_strategy;
        let coords: Vec<(i32, i32)> = self.chunks.keys().copied().collect();
        for coord in coords {
            let due = matches!(
                self.chunks.get(&coord),
                Some(chunk) if chunk.state == ChunkState::Active && chunk_due_for_save(strategy, chunk)
            );
            if !due {
                continue;
            }
            let ids = {
                let chunk = self.chunks.get(&coord).expect("checked above");
                chunk.buffer.to_id_grid(self.registry.as_ref())
            };
            self.storage.save_chunk(coord.0, coord.1, &ids)?;
            if let Some(chunk) = self.chunks.get_mut(&coord) {
                chunk.modified = false;
                chunk.player_modified = false;
            }
        }
        self.storage.flush()?;

        let metadata = WorldMetadata {
            name: self.world_name.clone(),
            seed: self.seed,
            version: WORLD_META_VERSION,
            last_played: chrono::Utc::now().timestamp(),
            spawn: self.spawn_point,
        };
        metadata.write_to_file(&self.metadata_path())?;
        Ok(())
    }

    /// Load `world.xml` if present, adopting its seed and spawn point.
    /// A brand new world simply keeps the values it was constructed
    /// with.
    pub fn load_world(&mut self) -> anyhow::Result<()> {
        let path = self.metadata_path();
        if path.exists() {
            let metadata = WorldMetadata::read_from_file(&path)?;
            info!(target: LOG_TARGET, "loaded world metadata for '{}'", metadata.name);
            self.seed = metadata.seed;
            self.spawn_point = metadata.spawn;
        }
        Ok(())
    }

    /// Stop admitting new streaming work. Subsequent `update` calls
    /// become no-ops; in-flight jobs still need draining via
    /// [`Self::wait_for_pending_tasks`].
    pub fn prepare_shutdown(&mut self) {
        info!(
            target: LOG_TARGET,
            "preparing shutdown: {} generate, {} load, {} save pending",
            self.generate_queue.len(),
            self.load_queue.len(),
            self.save_queue.len(),
        );
        self.shutting_down = true;
    }

    /// Spin until every queued job has been submitted, executed, and
    /// folded back in. Intended for shutdown; not something a live
    /// frame loop should call.
    pub fn wait_for_pending_tasks(&mut self) {
        loop {
            self.process_job_queues();
            self.process_completed_jobs();
            if self.generate_queue.is_empty() && self.load_queue.is_empty() && self.save_queue.is_empty() {
                break;
            }
            std::thread::yield_now();
        }
        while self.scheduler.has_executing_tasks() {
            std::thread::yield_now();
        }
        self.process_completed_jobs();
    }

    /// Orderly shutdown: stop streaming, drain every in-flight job,
    /// then save.
    pub fn close_world(&mut self) -> anyhow::Result<()> {
        self.prepare_shutdown();
        self.wait_for_pending_tasks();
        self.save_world()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkBuffer;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    #[derive(Clone, PartialEq)]
    struct TestState(u8);

    impl BlockState for TestState {
        fn is_full_opaque(&self) -> bool {
            self.0 == 1
        }
        fn emits_light(&self) -> u8 {
            0
        }
        fn opacity(&self) -> u8 {
            if self.0 == 1 {
                15
            } else {
                0
            }
        }
        fn numeric_id(&self) -> u8 {
            self.0
        }
    }

    fn air() -> TestState {
        TestState(0)
    }
    fn stone() -> TestState {
        TestState(1)
    }

    struct TestRegistry;
    impl BlockRegistry for TestRegistry {
        type State = TestState;
        fn air(&self) -> TestState {
            air()
        }
        fn resolve(&self, id: u8) -> Option<TestState> {
            Some(TestState(id))
        }
    }

    struct FlatGenerator;
    impl TerrainGenerator<TestState> for FlatGenerator {
        fn generate(&self, _chunk_x: i32, _chunk_y: i32, _seed: u64) -> ChunkBuffer<TestState> {
            let mut buf = ChunkBuffer::filled_with(air());
            for x in 0..CHUNK_SIZE_X {
                for y in 0..CHUNK_SIZE_Y {
                    buf.set_raw(crate::chunk::index_of(x, y, 0), stone());
                    buf.recompute_sky_column(x, y);
                }
            }
            buf
        }
    }

    struct NullStorage;
    impl Storage for NullStorage {
        type Error = std::io::Error;
        fn chunk_exists(&self, _chunk_x: i32, _chunk_y: i32) -> bool {
            false
        }
        fn load_chunk(&self, chunk_x: i32, chunk_y: i32) -> Result<Vec<u8>, Self::Error> {
            Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no chunk ({chunk_x}, {chunk_y})"),
            ))
        }
        fn save_chunk(&self, _chunk_x: i32, _chunk_y: i32, _ids: &[u8]) -> Result<(), Self::Error> {
            Ok(())
        }
        fn flush(&self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    struct FixedTime(AtomicU64);
    impl TimeProvider for FixedTime {
        fn celestial_angle(&self) -> f32 {
            (self.0.load(Ordering::Relaxed) as f32) / 1000.0
        }
    }

    type TestWorld = World<TestState, FlatGenerator, TestRegistry, NullStorage, FixedTime>;

    fn make_world(dir: &std::path::Path) -> TestWorld {
        World::new(
            "test-world",
            1234,
            dir,
            Arc::new(FlatGenerator),
            Arc::new(TestRegistry),
            Arc::new(NullStorage),
            Arc::new(FixedTime(AtomicU64::new(0))),
        )
        .unwrap()
    }

    #[test]
    fn needed_chunk_count_matches_circle_of_radius_two() {
        let dir = tempfile::tempdir().unwrap();
        let mut world = make_world(dir.path());
        world.set_chunk_activation_range(2);
        assert_eq!(world.calculate_needed_chunks().len(), 13);
    }

    #[test]
    fn activation_streams_chunks_in_and_generates_terrain() {
        let dir = tempfile::tempdir().unwrap();
        let mut world = make_world(dir.path());
        world.set_chunk_activation_range(1);
        world.set_player_position(Vec3::new(8.0, 8.0, 10.0));

        for _ in 0..200 {
            world.update(1.0 / 20.0);
            if world.get_block_state(8, 8, 0) == Some(stone()) {
                break;
            }
            std::thread::yield_now();
        }

        assert_eq!(world.get_block_state(8, 8, 0), Some(stone()));
        assert_eq!(world.get_top_block_z(8, 8), Some(0));
    }

    #[test]
    fn distant_chunks_eventually_evict() {
        let dir = tempfile::tempdir().unwrap();
        let mut world = make_world(dir.path());
        world.set_chunk_activation_range(0);
        world.set_player_position(Vec3::new(8.0, 8.0, 10.0));
        for _ in 0..100 {
            world.update(1.0 / 20.0);
            std::thread::yield_now();
        }
        assert!(world.loaded_chunk_count() >= 1);

        world.set_player_position(Vec3::new(8000.0, 8000.0, 10.0));
        for _ in 0..200 {
            world.update(1.0 / 20.0);
            std::thread::yield_now();
        }
        assert!(!world.chunks.contains_key(&(0, 0)));
    }

    #[test]
    fn dig_and_place_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut world = make_world(dir.path());
        world.set_chunk_activation_range(0);
        world.set_player_position(Vec3::new(8.0, 8.0, 10.0));
        for _ in 0..200 {
            world.update(1.0 / 20.0);
            if world.get_block_state(8, 8, 0) == Some(stone()) {
                break;
            }
            std::thread::yield_now();
        }

        let iter = iter_for_block(8, 8, 0).unwrap();
        assert!(world.dig_block(iter));
        assert_eq!(world.get_block_state(8, 8, 0), Some(air()));
        assert!(!world.dig_block(iter));

        assert!(world.place_block(iter, stone()));
        assert_eq!(world.get_block_state(8, 8, 0), Some(stone()));
    }

    #[test]
    fn sky_darken_is_wired_through_time_provider() {
        let dir = tempfile::tempdir().unwrap();
        let mut world = make_world(dir.path());
        world.update(0.0);
        assert_eq!(world.sky_darken(), sky_darken_factor(0.0));
    }

    struct RecordingStorage {
        saves: AtomicUsize,
    }
    impl RecordingStorage {
        fn new() -> Self {
            Self {
                saves: AtomicUsize::new(0),
            }
        }
    }
    impl Storage for RecordingStorage {
        type Error = std::io::Error;
        fn chunk_exists(&self, _chunk_x: i32, _chunk_y: i32) -> bool {
            false
        }
        fn load_chunk(&self, chunk_x: i32, chunk_y: i32) -> Result<Vec<u8>, Self::Error> {
            Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no chunk ({chunk_x}, {chunk_y})"),
            ))
        }
        fn save_chunk(&self, _chunk_x: i32, _chunk_y: i32, _ids: &[u8]) -> Result<(), Self::Error> {
            self.saves.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
        fn flush(&self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    type RecordingWorld = World<TestState, FlatGenerator, TestRegistry, RecordingStorage, FixedTime>;

    fn make_recording_world(dir: &std::path::Path) -> (RecordingWorld, Arc<RecordingStorage>) {
        let storage = Arc::new(RecordingStorage::new());
        let world = World::new(
            "test-world",
            1234,
            dir,
            Arc::new(FlatGenerator),
            Arc::new(TestRegistry),
            storage.clone(),
            Arc::new(FixedTime(AtomicU64::new(0))),
        )
        .unwrap();
        (world, storage)
    }

    #[test]
    fn player_modified_only_skips_chunks_the_player_never_touched() {
        let dir = tempfile::tempdir().unwrap();
        let (mut world, storage) = make_recording_world(dir.path());
        world.set_chunk_activation_range(0);
        world.set_save_strategy(SaveStrategy::PlayerModifiedOnly);
        world.set_player_position(Vec3::new(8.0, 8.0, 10.0));
        for _ in 0..200 {
            world.update(1.0 / 20.0);
            if world.get_block_state(8, 8, 0) == Some(stone()) {
                break;
            }
            std::thread::yield_now();
        }

        world.save_world().unwrap();
        assert_eq!(storage.saves.load(Ordering::Relaxed), 0);

        let iter = iter_for_block(8, 8, 0).unwrap();
        assert!(world.dig_block(iter));
        world.save_world().unwrap();
        assert_eq!(storage.saves.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn save_strategy_all_saves_every_active_chunk_even_if_clean() {
        let dir = tempfile::tempdir().unwrap();
        let (mut world, storage) = make_recording_world(dir.path());
        world.set_chunk_activation_range(0);
        world.set_save_strategy(SaveStrategy::All);
        world.set_player_position(Vec3::new(8.0, 8.0, 10.0));
        for _ in 0..200 {
            world.update(1.0 / 20.0);
            if world.get_block_state(8, 8, 0) == Some(stone()) {
                break;
            }
            std::thread::yield_now();
        }

        world.save_world().unwrap();
        assert_eq!(storage.saves.load(Ordering::Relaxed), 1);

        // Second save with nothing new written still saves under `All`.
        world.save_world().unwrap();
        assert_eq!(storage.saves.load(Ordering::Relaxed), 2);
    }
}
