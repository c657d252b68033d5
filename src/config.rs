// src/config.rs

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

use crate::engine::mixer::DEFAULT_MIN_WIDTH_SCALE;

/// Points in every cached outline and in the composite.
pub const DEFAULT_RESOLUTION: usize = 50;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub resolution: usize,
    /// Narrowest share of the output a short track is squeezed into
    pub min_width_scale: f32,
    /// `None` keeps every decoded source for the life of the process
    pub cache_capacity: Option<usize>,
    /// Worker threads for an owned runtime; tokio's default when `None`
    pub worker_threads: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_RESOLUTION,
            min_width_scale: DEFAULT_MIN_WIDTH_SCALE,
            cache_capacity: None,
            worker_threads: None,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.resolution > 0, "resolution must be at least 1");
        ensure!(
            self.min_width_scale > 0.0 && self.min_width_scale <= 1.0,
            "min_width_scale must be in (0, 1], got {}",
            self.min_width_scale
        );
        ensure!(
            self.cache_capacity != Some(0),
            "cache_capacity must be at least 1 when set"
        );
        ensure!(
            self.worker_threads != Some(0),
            "worker_threads must be at least 1 when set"
        );
        Ok(())
    }

    pub fn save_to_disk(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn load_from_disk(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.resolution, 50);
        assert_eq!(config.min_width_scale, 0.1);
        assert_eq!(config.cache_capacity, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_disk_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trackline.json");
        let config = PipelineConfig {
            resolution: 64,
            cache_capacity: Some(32),
            ..Default::default()
        };

        config.save_to_disk(&path).unwrap();
        assert_eq!(PipelineConfig::load_from_disk(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.json");
        std::fs::write(&path, r#"{ "cache_capacity": 8 }"#).unwrap();

        let config = PipelineConfig::load_from_disk(&path).unwrap();
        assert_eq!(config.resolution, DEFAULT_RESOLUTION);
        assert_eq!(config.cache_capacity, Some(8));
    }

    #[test]
    fn test_rejects_zero_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{ "resolution": 0 }"#).unwrap();

        assert!(PipelineConfig::load_from_disk(&path).is_err());
    }
}
