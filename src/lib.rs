// src/lib.rs

pub mod config;
pub mod decoder;
pub mod engine;
pub mod sample;
pub mod waveform;

pub use config::PipelineConfig;
pub use decoder::{DecodeError, SampleDecoder, SymphoniaDecoder};
pub use engine::{Composite, Track, TrackId, TrackLineGenerator, TrackVectorStore, VolumeTempo};
pub use sample::{Sample, SampleLibrary};
pub use waveform::{SourceKey, WaveformCache, WaveformCacheEntry}; // convenience
