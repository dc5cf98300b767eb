//! Storage backends: the ESF region codec and ESFS single-chunk codec,
//! wired behind one `FileStorage` that implements the `Storage`
//! capability and picks a format from `ChunkStorageConfig`.

pub mod cache;
pub mod config;
pub mod esf;
pub mod esfs;

use std::path::PathBuf;

pub use config::{
    AutoSaveConfig, CacheConfig, ChunkStorageConfig, CompressionConfig, PathsConfig,
    SaveStrategy, StorageFormat,
};

use crate::capability::Storage;
use crate::error::CodecError;
use cache::RegionCache;
use esf::region_of;

/// On-disk backend selecting between ESF and ESFS per `StorageFormat`.
pub struct FileStorage {
    dir: PathBuf,
    format: StorageFormat,
    compress: bool,
    regions: Option<RegionCache>,
}

impl FileStorage {
    pub fn new(config: &ChunkStorageConfig) -> std::io::Result<Self> {
        let dir = PathBuf::from(&config.paths.base_save_path);
        cache::ensure_dir(&dir)?;

        let regions = match config.storage_format {
            StorageFormat::Esf => Some(RegionCache::new(dir.clone(), config.cache.max_regions)),
            StorageFormat::Esfs => None,
        };

        Ok(Self {
            dir,
            format: config.storage_format,
            compress: config.compression.enabled,
            regions,
        })
    }
}

impl Storage for FileStorage {
    type Error = CodecError;

    fn chunk_exists(&self, chunk_x: i32, chunk_y: i32) -> bool {
        match self.format {
            StorageFormat::Esf => {
                let (rx, ry) = region_of(chunk_x, chunk_y);
                match &self.regions {
                    Some(cache) => cache
                        .with_region(rx, ry, |r| Ok(r.has_chunk(chunk_x, chunk_y)))
                        .unwrap_or(false),
                    None => false,
                }
            }
            StorageFormat::Esfs => esfs::chunk_file_exists(&self.dir, chunk_x, chunk_y),
        }
    }

    fn load_chunk(&self, chunk_x: i32, chunk_y: i32) -> Result<Vec<u8>, CodecError> {
        match self.format {
            StorageFormat::Esf => {
                let (rx, ry) = region_of(chunk_x, chunk_y);
                let cache = self
                    .regions
                    .as_ref()
                    .expect("region cache present for Esf format");
                cache.with_region(rx, ry, |r| r.read_chunk(chunk_x, chunk_y))
            }
            StorageFormat::Esfs => esfs::read_chunk_file(&self.dir, chunk_x, chunk_y),
        }
    }

    fn save_chunk(&self, chunk_x: i32, chunk_y: i32, ids: &[u8]) -> Result<(), CodecError> {
        match self.format {
            StorageFormat::Esf => {
                let (rx, ry) = region_of(chunk_x, chunk_y);
                let cache = self
                    .regions
                    .as_ref()
                    .expect("region cache present for Esf format");
                cache.with_region(rx, ry, |r| {
                    r.write_chunk(chunk_x, chunk_y, ids, self.compress)
                })
            }
            StorageFormat::Esfs => esfs::write_chunk_file(&self.dir, chunk_x, chunk_y, ids),
        }
    }

    fn flush(&self) -> Result<(), CodecError> {
        if let Some(cache) = &self.regions {
            cache.flush_all()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn esf_backend_round_trips() {
        let dir = tempdir().unwrap();
        let mut config = ChunkStorageConfig::default();
        config.paths.base_save_path = dir.path().to_string_lossy().into_owned();
        config.storage_format = StorageFormat::Esf;

        let storage = FileStorage::new(&config).unwrap();
        let ids = vec![3u8; crate::constants::CHUNK_VOLUME];

        assert!(!storage.chunk_exists(0, 0));
        storage.save_chunk(0, 0, &ids).unwrap();
        storage.flush().unwrap();
        assert!(storage.chunk_exists(0, 0));
        assert_eq!(storage.load_chunk(0, 0).unwrap(), ids);
    }

    #[test]
    fn esfs_backend_round_trips() {
        let dir = tempdir().unwrap();
        let mut config = ChunkStorageConfig::default();
        config.paths.base_save_path = dir.path().to_string_lossy().into_owned();
        config.storage_format = StorageFormat::Esfs;

        let storage = FileStorage::new(&config).unwrap();
        let ids = vec![5u8; crate::constants::CHUNK_VOLUME];

        storage.save_chunk(2, -2, &ids).unwrap();
        assert!(storage.chunk_exists(2, -2));
        assert_eq!(storage.load_chunk(2, -2).unwrap(), ids);
    }
}
