// src/engine/track.rs

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sample::Sample;
use crate::waveform::SourceKey;

/// Identifier for a track.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrackId(pub Uuid);

impl TrackId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TrackId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of the 2D volume/tempo control for one track.
///
/// `volume` scales the track's amplitude, `tempo` its horizontal width.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct VolumeTempo {
    pub volume: f32,
    pub tempo: f32,
}

impl Default for VolumeTempo {
    fn default() -> Self {
        Self {
            volume: 1.0,
            tempo: 1.0,
        }
    }
}

/// A user layer: one sample source plus its own volume and tempo.
#[derive(Clone, Debug, PartialEq)]
pub struct Track {
    pub id: TrackId,
    pub name: String,
    pub source: Option<SourceKey>,
    pub volume_tempo: Option<VolumeTempo>,
}

impl Track {
    pub fn new(name: impl Into<String>, source: Option<SourceKey>) -> Self {
        Self {
            id: TrackId::new(),
            name: name.into(),
            source,
            volume_tempo: None,
        }
    }

    pub fn from_sample(sample: &Sample) -> Self {
        Self::new(sample.name.clone(), sample.source.clone())
    }

    pub fn with_volume_tempo(mut self, volume: f32, tempo: f32) -> Self {
        self.volume_tempo = Some(VolumeTempo { volume, tempo });
        self
    }

    pub fn volume(&self) -> Option<f32> {
        self.volume_tempo.map(|vt| vt.volume)
    }

    pub fn tempo(&self) -> Option<f32> {
        self.volume_tempo.map(|vt| vt.tempo)
    }

    /// Copy with the given fields replaced. The id is kept, so the copy
    /// updates the same layer in the pipeline.
    pub fn update(
        &self,
        name: Option<String>,
        sample: Option<&Sample>,
        volume_tempo: Option<VolumeTempo>,
    ) -> Self {
        Self {
            id: self.id,
            name: name.unwrap_or_else(|| self.name.clone()),
            source: match sample {
                Some(s) => s.source.clone(),
                None => self.source.clone(),
            },
            volume_tempo: volume_tempo.or(self.volume_tempo),
        }
    }
}
