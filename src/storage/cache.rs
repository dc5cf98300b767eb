//! LRU cache of open region-file handles, so the ESF backend doesn't hold
//! every region in the world open at once. Evicting a dirty handle flushes
//! it before closing, matching the original engine's `ChunkFileManager`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::CodecError;
use crate::storage::esf::EsfRegionFile;

struct Entry {
    region: EsfRegionFile,
    last_used: u64,
}

/// Bounded cache keyed by region coordinates. Not `Send`-free: callers
/// share one instance behind a lock since region I/O happens off the main
/// thread in job workers.
pub struct RegionCache {
    dir: PathBuf,
    max_regions: usize,
    entries: Mutex<HashMap<(i32, i32), Entry>>,
    clock: Mutex<u64>,
}

impl RegionCache {
    pub fn new(dir: PathBuf, max_regions: usize) -> Self {
        Self {
            dir,
            max_regions: max_regions.max(1),
            entries: Mutex::new(HashMap::new()),
            clock: Mutex::new(0),
        }
    }

    fn tick(&self) -> u64 {
        let mut clock = self.clock.lock();
        *clock += 1;
        *clock
    }

    /// Run `f` against the region handle for `(region_x, region_y)`,
    /// opening it if not already cached and evicting the least-recently-
    /// used entry if the cache is full.
    pub fn with_region<T>(
        &self,
        region_x: i32,
        region_y: i32,
        f: impl FnOnce(&mut EsfRegionFile) -> Result<T, CodecError>,
    ) -> Result<T, CodecError> {
        let mut entries = self.entries.lock();
        let key = (region_x, region_y);

        if !entries.contains_key(&key) {
            if entries.len() >= self.max_regions {
                if let Some(lru_key) = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.last_used)
                    .map(|(k, _)| *k)
                {
                    if let Some(mut evicted) = entries.remove(&lru_key) {
                        evicted.region.flush()?;
                    }
                }
            }
            let region = EsfRegionFile::open_or_create(&self.dir, region_x, region_y)?;
            entries.insert(
                key,
                Entry {
                    region,
                    last_used: 0,
                },
            );
        }

        let last_used = self.tick();
        let entry = entries.get_mut(&key).expect("just inserted or present");
        entry.last_used = last_used;
        f(&mut entry.region)
    }

    /// Flush every cached handle; called on auto-save and shutdown.
    pub fn flush_all(&self) -> Result<(), CodecError> {
        let mut entries = self.entries.lock();
        for entry in entries.values_mut() {
            entry.region.flush()?;
        }
        Ok(())
    }

    pub fn cached_region_count(&self) -> usize {
        self.entries.lock().len()
    }
}

pub fn ensure_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn evicts_least_recently_used_region() {
        let dir = tempdir().unwrap();
        let cache = RegionCache::new(dir.path().to_path_buf(), 2);

        let ids = vec![1u8; crate::constants::CHUNK_VOLUME];
        cache
            .with_region(0, 0, |r| r.write_chunk(0, 0, &ids, true))
            .unwrap();
        cache
            .with_region(1, 0, |r| r.write_chunk(16, 0, &ids, true))
            .unwrap();
        assert_eq!(cache.cached_region_count(), 2);

        // Touch (0,0) so (1,0) becomes LRU.
        cache.with_region(0, 0, |r| Ok(r.chunk_count())).unwrap();
        cache
            .with_region(2, 0, |r| r.write_chunk(32, 0, &ids, true))
            .unwrap();

        assert_eq!(cache.cached_region_count(), 2);
        // (1,0) was evicted but its data survived the flush-on-evict.
        let reread = cache.with_region(1, 0, |r| r.read_chunk(16, 0)).unwrap();
        assert_eq!(reread, ids);
    }
}
