// src/decoder/mod.rs

pub mod dsp;
pub mod resample;

use std::fs::File;
use std::io;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use thiserror::Error;

use crate::waveform::SourceKey;

pub use resample::linear_interpolate;

/// Why a source could not be turned into samples.
///
/// None of these are fatal: the pipeline drops the update and the track
/// simply contributes nothing to the composite.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("unsupported audio in {path}: {reason}")]
    Unsupported { path: String, reason: String },

    #[error("no audio track in {0}")]
    NoTrack(String),

    #[error("no samples decoded from {0}")]
    Empty(String),

    /// The blocking decode task panicked or was cancelled
    #[error("decode task for {path} did not finish: {reason}")]
    Aborted { path: String, reason: String },
}

/// Reads a whole source into first-channel PCM.
pub trait SampleDecoder: Send + Sync {
    fn decode(&self, source: &SourceKey) -> Result<Vec<f32>, DecodeError>;
}

/// File decoder backed by symphonia's default probe and codec registry.
#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaDecoder;

impl SampleDecoder for SymphoniaDecoder {
    fn decode(&self, source: &SourceKey) -> Result<Vec<f32>, DecodeError> {
        let path = source.path();
        let display = path.display().to_string();

        let file = File::open(path).map_err(|e| DecodeError::Io {
            path: display.clone(),
            source: e,
        })?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| unsupported(&display, e))?;
        let mut format = probed.format;

        let track = format
            .default_track()
            .ok_or_else(|| DecodeError::NoTrack(display.clone()))?;
        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let mut decoder = get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| unsupported(&display, e))?;

        let mut sample_buf: Option<SampleBuffer<f32>> = None;
        let mut out = Vec::<f32>::new();

        loop {
            let packet = match format.next_packet() {
                Ok(p) => p,
                Err(_) => break,
            };
            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(d) => d,
                Err(SymphoniaError::DecodeError(e)) => {
                    log::debug!("skipping corrupt packet in {}: {}", display, e);
                    continue;
                }
                Err(SymphoniaError::IoError(_)) => continue,
                Err(e) => return Err(unsupported(&display, e)),
            };

            let spec = *decoded.spec();
            let channels = spec.channels.count();

            if sample_buf
                .as_ref()
                .is_none_or(|b| b.capacity() < decoded.capacity())
            {
                sample_buf = Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
            }
            let Some(buf) = sample_buf.as_mut() else {
                continue;
            };
            buf.copy_interleaved_ref(decoded);

            dsp::append_first_channel(&mut out, buf.samples(), channels);
        }

        if out.is_empty() {
            return Err(DecodeError::Empty(display));
        }

        log::debug!("📊 [Decoder] {} -> {} samples", display, out.len());
        Ok(out)
    }
}

fn unsupported(path: &str, err: SymphoniaError) -> DecodeError {
    DecodeError::Unsupported {
        path: path.to_string(),
        reason: err.to_string(),
    }
}
