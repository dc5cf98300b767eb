//! Job scheduler bridge: hands chunk generate/load/save work to a `rayon`
//! pool and hands results back to the main thread over a bounded channel,
//! mirroring the original engine's scheduler/task dispatch but replacing
//! dynamic-cast job dispatch with an enum.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender};
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::capability::{BlockRegistry, BlockState, Storage, TerrainGenerator};
use crate::chunk::ChunkBuffer;

/// A finished generate/load/save job, ready for the main thread to fold
/// back into the chunk index.
pub enum CompletedJob<S: BlockState> {
    Generate {
        chunk_x: i32,
        chunk_y: i32,
        buffer: ChunkBuffer<S>,
    },
    Load {
        chunk_x: i32,
        chunk_y: i32,
        result: Result<ChunkBuffer<S>, String>,
    },
    Save {
        chunk_x: i32,
        chunk_y: i32,
        result: Result<(), String>,
    },
}

impl<S: BlockState> CompletedJob<S> {
    pub fn coords(&self) -> (i32, i32) {
        match self {
            CompletedJob::Generate { chunk_x, chunk_y, .. }
            | CompletedJob::Load { chunk_x, chunk_y, .. }
            | CompletedJob::Save { chunk_x, chunk_y, .. } => (*chunk_x, *chunk_y),
        }
    }
}

const COMPLETION_QUEUE_CAPACITY: usize = 1024;

/// Owns the worker pool and completion channel for one world. Generic over
/// the same capability types the world uses, so job closures can be typed
/// without trait objects.
pub struct JobScheduler<S: BlockState> {
    pool: ThreadPool,
    sender: Sender<CompletedJob<S>>,
    receiver: Receiver<CompletedJob<S>>,
    executing: Arc<AtomicUsize>,
}

impl<S: BlockState> JobScheduler<S> {
    pub fn new(num_threads: usize) -> anyhow::Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads.max(1))
            .thread_name(|i| format!("voxelstrata-worker-{i}"))
            .build()?;
        let (sender, receiver) = bounded(COMPLETION_QUEUE_CAPACITY);
        Ok(Self {
            pool,
            sender,
            receiver,
            executing: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn has_executing_tasks(&self) -> bool {
        self.executing.load(Ordering::Acquire) > 0
    }

    pub fn pending_completions(&self) -> usize {
        self.receiver.len()
    }

    /// Drain every job that finished since the last call. Never blocks.
    pub fn retrieve_completed(&self) -> Vec<CompletedJob<S>> {
        self.receiver.try_iter().collect()
    }

    pub fn submit_generate<G>(&self, chunk_x: i32, chunk_y: i32, generator: Arc<G>, seed: u64)
    where
        G: TerrainGenerator<S>,
    {
        let sender = self.sender.clone();
        let executing = self.executing.clone();
        executing.fetch_add(1, Ordering::AcqRel);
        self.pool.spawn(move || {
            let buffer = generator.generate(chunk_x, chunk_y, seed);
            let _ = sender.send(CompletedJob::Generate {
                chunk_x,
                chunk_y,
                buffer,
            });
            executing.fetch_sub(1, Ordering::AcqRel);
        });
    }

    pub fn submit_load<St, R>(&self, chunk_x: i32, chunk_y: i32, storage: Arc<St>, registry: Arc<R>)
    where
        St: Storage,
        R: BlockRegistry<State = S>,
    {
        let sender = self.sender.clone();
        let executing = self.executing.clone();
        executing.fetch_add(1, Ordering::AcqRel);
        self.pool.spawn(move || {
            let result = storage
                .load_chunk(chunk_x, chunk_y)
                .map_err(|e| e.to_string())
                .map(|ids| ChunkBuffer::from_id_grid(&ids, registry.as_ref(), chunk_x, chunk_y));
            let _ = sender.send(CompletedJob::Load {
                chunk_x,
                chunk_y,
                result,
            });
            executing.fetch_sub(1, Ordering::AcqRel);
        });
    }

    pub fn submit_save<St>(&self, chunk_x: i32, chunk_y: i32, storage: Arc<St>, ids: Vec<u8>)
    where
        St: Storage,
    {
        let sender = self.sender.clone();
        let executing = self.executing.clone();
        executing.fetch_add(1, Ordering::AcqRel);
        self.pool.spawn(move || {
            let result = storage
                .save_chunk(chunk_x, chunk_y, &ids)
                .map_err(|e| e.to_string());
            let _ = sender.send(CompletedJob::Save {
                chunk_x,
                chunk_y,
                result,
            });
            executing.fetch_sub(1, Ordering::AcqRel);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::BlockState as _;
    use std::sync::atomic::AtomicBool;
    use std::time::{Duration, Instant};

    #[derive(Clone, PartialEq)]
    struct TestState(u8);

    impl BlockState for TestState {
        fn is_full_opaque(&self) -> bool {
            self.0 != 0
        }
        fn emits_light(&self) -> u8 {
            0
        }
        fn opacity(&self) -> u8 {
            if self.0 == 0 {
                0
            } else {
                15
            }
        }
        fn numeric_id(&self) -> u8 {
            self.0
        }
    }

    struct TestGenerator;
    impl TerrainGenerator<TestState> for TestGenerator {
        fn generate(&self, chunk_x: i32, chunk_y: i32, _seed: u64) -> ChunkBuffer<TestState> {
            let mut buf = ChunkBuffer::filled_with(TestState(0));
            if chunk_x == chunk_y {
                buf.mark_mesh_dirty();
            }
            buf
        }
    }

    fn wait_for(scheduler: &JobScheduler<TestState>, timeout: Duration) -> Vec<CompletedJob<TestState>> {
        let deadline = Instant::now() + timeout;
        loop {
            let jobs = scheduler.retrieve_completed();
            if !jobs.is_empty() || Instant::now() > deadline {
                return jobs;
            }
            std::thread::yield_now();
        }
    }

    #[test]
    fn generate_job_round_trips_through_channel() {
        let scheduler: JobScheduler<TestState> = JobScheduler::new(2).unwrap();
        let generator = Arc::new(TestGenerator);
        scheduler.submit_generate(3, 3, generator, 42);

        let jobs = wait_for(&scheduler, Duration::from_secs(2));
        assert_eq!(jobs.len(), 1);
        match &jobs[0] {
            CompletedJob::Generate { chunk_x, chunk_y, buffer } => {
                assert_eq!((*chunk_x, *chunk_y), (3, 3));
                assert!(buffer.needs_mesh_rebuild());
            }
            _ => panic!("expected a Generate completion"),
        }
        assert!(!scheduler.has_executing_tasks());
    }

    #[test]
    fn executing_flag_clears_after_completion_drains() {
        let scheduler: JobScheduler<TestState> = JobScheduler::new(1).unwrap();
        let generator = Arc::new(TestGenerator);
        let started = Arc::new(AtomicBool::new(false));
        let _ = started;
        scheduler.submit_generate(0, 0, generator, 1);
        let _ = wait_for(&scheduler, Duration::from_secs(2));
        assert!(!scheduler.has_executing_tasks());
    }
}
