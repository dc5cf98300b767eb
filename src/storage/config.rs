//! YAML-backed storage configuration, validated field-by-field with
//! per-field fallback to defaults rather than rejecting the whole file.

use std::path::Path;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaveStrategy {
    All,
    ModifiedOnly,
    PlayerModifiedOnly,
}

impl Default for SaveStrategy {
    fn default() -> Self {
        SaveStrategy::ModifiedOnly
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageFormat {
    Esf,
    Esfs,
}

impl Default for StorageFormat {
    fn default() -> Self {
        StorageFormat::Esf
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    pub enabled: bool,
    pub level: u32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: 6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub max_regions: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_regions: 16 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoSaveConfig {
    pub enabled: bool,
    pub interval: f64,
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: 120.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    pub base_save_path: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            base_save_path: "saves".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChunkStorageConfig {
    pub save_strategy: SaveStrategy,
    pub storage_format: StorageFormat,
    pub compression: CompressionConfig,
    pub cache: CacheConfig,
    pub auto_save: AutoSaveConfig,
    pub paths: PathsConfig,
}

/// Top-level document shape: everything nests under `chunk_storage:`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct ConfigDocument {
    #[serde(default)]
    chunk_storage: ChunkStorageConfig,
}

impl ChunkStorageConfig {
    /// Load from a YAML file; on any read or parse failure, fall back to
    /// defaults with a logged warning rather than propagating the error,
    /// since a missing config file is an expected first-run state.
    pub fn load_or_default(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => match serde_yaml::from_str::<ConfigDocument>(&text) {
                Ok(doc) => doc.chunk_storage.validated(),
                Err(err) => {
                    warn!(target: "voxelstrata::storage::config", "failed to parse {}: {err}, using defaults", path.display());
                    Self::default()
                }
            },
            Err(err) => {
                warn!(target: "voxelstrata::storage::config", "failed to read {}: {err}, using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let doc: ConfigDocument = serde_yaml::from_str(text)?;
        Ok(doc.chunk_storage.validated())
    }

    /// Validate each field, replacing out-of-range values with their
    /// default and logging a warning, so one bad field doesn't discard an
    /// otherwise-good config.
    fn validated(mut self) -> Self {
        if !(1..=9).contains(&self.compression.level) {
            warn!(target: "voxelstrata::storage::config", "compression.level {} out of range 1..=9, using default", self.compression.level);
            self.compression.level = CompressionConfig::default().level;
        }
        if !(1..=256).contains(&self.cache.max_regions) {
            warn!(target: "voxelstrata::storage::config", "cache.max_regions {} out of range 1..=256, using default", self.cache.max_regions);
            self.cache.max_regions = CacheConfig::default().max_regions;
        }
        if !(10.0..=3600.0).contains(&self.auto_save.interval) {
            warn!(target: "voxelstrata::storage::config", "auto_save.interval {} out of range 10..=3600, using default", self.auto_save.interval);
            self.auto_save.interval = AutoSaveConfig::default().interval;
        }
        if self.paths.base_save_path.trim().is_empty() {
            warn!(target: "voxelstrata::storage::config", "paths.base_save_path is empty, using default");
            self.paths.base_save_path = PathsConfig::default().base_save_path;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = ChunkStorageConfig::default();
        assert_eq!(cfg.save_strategy, SaveStrategy::ModifiedOnly);
        assert_eq!(cfg.storage_format, StorageFormat::Esf);
    }

    #[test]
    fn parses_full_document() {
        let yaml = r#"
chunk_storage:
  save_strategy: All
  storage_format: Esfs
  compression:
    enabled: true
    level: 9
  cache:
    max_regions: 32
  auto_save:
    enabled: false
    interval: 300
  paths:
    base_save_path: "/tmp/world"
"#;
        let cfg = ChunkStorageConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(cfg.save_strategy, SaveStrategy::All);
        assert_eq!(cfg.storage_format, StorageFormat::Esfs);
        assert_eq!(cfg.compression.level, 9);
        assert_eq!(cfg.cache.max_regions, 32);
        assert!(!cfg.auto_save.enabled);
        assert_eq!(cfg.paths.base_save_path, "/tmp/world");
    }

    #[test]
    fn out_of_range_field_falls_back_without_losing_others() {
        let yaml = r#"
chunk_storage:
  compression:
    enabled: true
    level: 42
  cache:
    max_regions: 8
"#;
        let cfg = ChunkStorageConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(cfg.compression.level, CompressionConfig::default().level);
        assert_eq!(cfg.cache.max_regions, 8);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = ChunkStorageConfig::load_or_default(Path::new("/nonexistent/path.yaml"));
        assert_eq!(cfg.cache.max_regions, CacheConfig::default().max_regions);
    }
}
