// src/engine/mixer.rs

use std::collections::BTreeMap;

use serde::Serialize;

use super::track::TrackId;
use crate::decoder::linear_interpolate;

/// Tempo scales below this are clamped so widths stay finite.
pub const MIN_TEMPO_SCALE: f32 = 0.01;

/// Narrowest slice of the output any active track is given.
pub const DEFAULT_MIN_WIDTH_SCALE: f32 = 0.1;

/// Merged outline of every active track.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Composite {
    /// Spread between the highest and lowest accumulated value before
    /// normalization. Zero means nothing audible (or no tracks).
    pub peak: f32,
    /// Normalized to `[0, 1]` when `peak > 0`, raw otherwise.
    pub values: Vec<f32>,
}

impl Composite {
    pub fn silent(resolution: usize) -> Self {
        Self {
            peak: 0.0,
            values: vec![0.0; resolution],
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Clone, Debug)]
struct TrackVector {
    values: Vec<f32>,
    x_scale: f32,
    y_scale: f32,
    length: usize,
}

impl TrackVector {
    fn new(values: Vec<f32>, length: usize) -> Self {
        Self {
            values,
            x_scale: 1.0,
            y_scale: 1.0,
            length,
        }
    }

    /// Visual width at this track's own tempo.
    fn width(&self) -> f32 {
        self.length as f32 / self.x_scale
    }
}

/// One scaled outline per active track, folded into a single composite.
///
/// Every mutation recomputes the whole composite; the cost is
/// O(tracks × resolution). Entries are visited in id order, so identical
/// inputs always give bit-identical output.
pub struct TrackVectorStore {
    resolution: usize,
    min_width_scale: f32,
    vectors: BTreeMap<TrackId, TrackVector>,
}

impl TrackVectorStore {
    pub fn new(resolution: usize) -> Self {
        Self::with_min_width_scale(resolution, DEFAULT_MIN_WIDTH_SCALE)
    }

    pub fn with_min_width_scale(resolution: usize, min_width_scale: f32) -> Self {
        Self {
            resolution,
            min_width_scale: min_width_scale.clamp(0.0, 1.0),
            vectors: BTreeMap::new(),
        }
    }

    pub fn resolution(&self) -> usize {
        self.resolution
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn contains(&self, id: TrackId) -> bool {
        self.vectors.contains_key(&id)
    }

    /// Inserts or refreshes the outline for `id` and returns the new composite.
    ///
    /// `values` and `length` always overwrite. A scale left as `None` keeps
    /// whatever the track had before (1.0 for a new track).
    pub fn update(
        &mut self,
        id: TrackId,
        values: Vec<f32>,
        x_scale: Option<f32>,
        y_scale: Option<f32>,
        length: usize,
    ) -> Composite {
        let vector = self
            .vectors
            .entry(id)
            .or_insert_with(|| TrackVector::new(Vec::new(), length));

        vector.values = values;
        vector.length = length;

        if let Some(y) = y_scale {
            if y.is_finite() {
                vector.y_scale = y;
            } else {
                log::warn!("[Mixer] ignoring volume {} for track {}", y, id);
            }
        }
        if let Some(x) = x_scale {
            if x.is_finite() {
                vector.x_scale = x.max(MIN_TEMPO_SCALE);
            } else {
                log::warn!("[Mixer] ignoring tempo {} for track {}", x, id);
            }
        }

        self.composite()
    }

    /// Drops `id` (absent ids are fine) and returns the new composite.
    pub fn remove(&mut self, id: TrackId) -> Composite {
        self.vectors.remove(&id);
        self.composite()
    }

    /// Fraction of the output width the track's pattern repeats over.
    pub fn width_scale(&self, id: TrackId) -> Option<f32> {
        let vector = self.vectors.get(&id)?;
        Some(self.scale_for(vector, self.max_width()))
    }

    fn max_width(&self) -> f32 {
        self.vectors
            .values()
            .map(TrackVector::width)
            .fold(0.0f32, f32::max)
    }

    fn scale_for(&self, vector: &TrackVector, max_width: f32) -> f32 {
        if max_width <= 0.0 {
            return 1.0;
        }
        (vector.width() / max_width).clamp(self.min_width_scale, 1.0)
    }

    /// Folds every track into one outline of `resolution` points.
    ///
    /// Each track is interpolated to its share of the width, then tiled
    /// from index 0 across the full output and scaled by its volume.
    /// The running min/max (both starting at 0) are tracked over every
    /// partial sum, and the result is normalized against their spread.
    pub fn composite(&self) -> Composite {
        let mut out = vec![0.0f32; self.resolution];
        if self.vectors.is_empty() {
            return Composite {
                peak: 0.0,
                values: out,
            };
        }

        let max_width = self.max_width();
        let mut max_y = 0.0f32;
        let mut min_y = 0.0f32;

        for vector in self.vectors.values() {
            let scale = self.scale_for(vector, max_width);
            let interp_len = (self.resolution as f32 * scale).round() as usize;
            let interpolated = linear_interpolate(&vector.values, interp_len);
            if interpolated.is_empty() {
                continue;
            }

            for (k, slot) in out.iter_mut().enumerate() {
                *slot += interpolated[k % interpolated.len()] * vector.y_scale;
                max_y = max_y.max(*slot);
                min_y = min_y.min(*slot);
            }
        }

        let peak = max_y - min_y;
        if peak > 0.0 {
            for v in &mut out {
                *v = (*v - min_y) / peak;
            }
        }

        Composite { peak, values: out }
    }
}
