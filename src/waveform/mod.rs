// src/waveform/mod.rs
pub mod terminal;

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::decoder::{linear_interpolate, DecodeError, SampleDecoder};

/// Identity of an audio source, used as the cache key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceKey(PathBuf);

impl SourceKey {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    /// Canonicalizes the path when the file exists, so two spellings of the
    /// same file share one cache slot.
    pub fn resolve(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Self(path.canonicalize().unwrap_or_else(|_| path.to_path_buf()))
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl From<PathBuf> for SourceKey {
    fn from(path: PathBuf) -> Self {
        Self(path)
    }
}

impl From<&Path> for SourceKey {
    fn from(path: &Path) -> Self {
        Self(path.to_path_buf())
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Fixed-resolution outline of one source.
#[derive(Clone, Debug, PartialEq)]
pub struct WaveformCacheEntry {
    /// Source samples interpolated down to the cache resolution
    pub resampled_values: Vec<f32>,
    /// Sample count before interpolation, used for relative track widths
    pub original_sample_count: usize,
}

impl WaveformCacheEntry {
    pub fn from_samples(samples: &[f32], resolution: usize) -> Self {
        Self {
            resampled_values: linear_interpolate(samples, resolution),
            original_sample_count: samples.len(),
        }
    }
}

type EntryCell = Arc<OnceCell<Arc<WaveformCacheEntry>>>;

struct Slot {
    cell: EntryCell,
    last_used: u64,
}

#[derive(Default)]
struct CacheState {
    slots: HashMap<SourceKey, Slot>,
    tick: u64,
}

/// Per-source cache of decoded and resampled waveforms.
///
/// Each key decodes at most once at a time: concurrent requests for the same
/// uncached source wait on the one in-flight decode and share its result.
/// A failed decode leaves nothing behind, so the next request retries.
///
/// Unbounded unless a capacity is given, in which case the least recently
/// used entry is evicted once the bound is exceeded.
pub struct WaveformCache {
    resolution: usize,
    capacity: Option<usize>,
    state: Mutex<CacheState>,
}

impl WaveformCache {
    pub fn new(resolution: usize) -> Self {
        Self::with_capacity(resolution, None)
    }

    pub fn with_capacity(resolution: usize, capacity: Option<usize>) -> Self {
        Self {
            resolution,
            capacity,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn resolution(&self) -> usize {
        self.resolution
    }

    /// Returns the cached entry for `source`, decoding it first if needed.
    ///
    /// Decoding runs on tokio's blocking pool.
    pub async fn get_or_compute(
        &self,
        source: &SourceKey,
        decoder: Arc<dyn SampleDecoder>,
    ) -> Result<Arc<WaveformCacheEntry>, DecodeError> {
        let cell = self.slot(source);
        let resolution = self.resolution;

        let result = cell
            .get_or_try_init(|| async {
                let key = source.clone();
                let samples = tokio::task::spawn_blocking(move || decoder.decode(&key))
                    .await
                    .map_err(|e| DecodeError::Aborted {
                        path: source.to_string(),
                        reason: e.to_string(),
                    })??;

                log::info!(
                    "🎵 [Cache] {} decoded: {} samples -> {} points",
                    source,
                    samples.len(),
                    resolution
                );
                Ok::<_, DecodeError>(Arc::new(WaveformCacheEntry::from_samples(
                    &samples, resolution,
                )))
            })
            .await;

        match result {
            Ok(entry) => {
                let entry = entry.clone();
                self.evict_over_capacity(source);
                Ok(entry)
            }
            Err(e) => {
                self.discard_failed(source, &cell);
                Err(e)
            }
        }
    }

    /// Peeks at a finished entry without decoding or touching recency.
    pub fn get(&self, source: &SourceKey) -> Option<Arc<WaveformCacheEntry>> {
        self.lock()
            .slots
            .get(source)
            .and_then(|slot| slot.cell.get().cloned())
    }

    pub fn contains(&self, source: &SourceKey) -> bool {
        self.get(source).is_some()
    }

    /// Number of finished entries.
    pub fn len(&self) -> usize {
        self.lock()
            .slots
            .values()
            .filter(|slot| slot.cell.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().slots.clear();
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot(&self, source: &SourceKey) -> EntryCell {
        let mut state = self.lock();
        state.tick += 1;
        let tick = state.tick;
        let slot = state.slots.entry(source.clone()).or_insert_with(|| Slot {
            cell: Arc::new(OnceCell::new()),
            last_used: tick,
        });
        slot.last_used = tick;
        slot.cell.clone()
    }

    fn discard_failed(&self, source: &SourceKey, cell: &EntryCell) {
        let mut state = self.lock();
        let stale = state
            .slots
            .get(source)
            .is_some_and(|slot| Arc::ptr_eq(&slot.cell, cell) && !slot.cell.initialized());
        if stale {
            state.slots.remove(source);
        }
    }

    fn evict_over_capacity(&self, keep: &SourceKey) {
        let Some(capacity) = self.capacity else {
            return;
        };
        let mut state = self.lock();
        loop {
            let finished = state
                .slots
                .values()
                .filter(|slot| slot.cell.initialized())
                .count();
            if finished <= capacity {
                break;
            }
            let victim = state
                .slots
                .iter()
                .filter(|(key, slot)| *key != keep && slot.cell.initialized())
                .min_by_key(|(_, slot)| slot.last_used)
                .map(|(key, _)| key.clone());
            match victim {
                Some(key) => {
                    log::debug!("[Cache] evicting {}", key);
                    state.slots.remove(&key);
                }
                None => break,
            }
        }
    }
}
