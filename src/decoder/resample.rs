// src/decoder/resample.rs

/// Linearly interpolates `values` onto `target_len` output points.
///
/// Source sample `i` is placed at position `i * target_len / (count - 1)`,
/// and output point `n` takes the value on the segment that brackets `n`.
/// Points beyond the last source position repeat the last value.
///
/// A single sample has no interval to spread over, so it comes back as-is
/// whatever `target_len` is. Empty input gives empty output.
pub fn linear_interpolate(values: &[f32], target_len: usize) -> Vec<f32> {
    match values.len() {
        0 => return Vec::new(),
        1 => return vec![values[0]],
        _ => {}
    }

    let last = values.len() - 1;
    let spacing = target_len as f32 / last as f32;

    (0..target_len)
        .map(|n| {
            let pos = n as f32 / spacing;
            let m = pos.floor() as usize;
            if m >= last {
                return values[last];
            }
            let t = pos - m as f32;
            values[m] + (values[m + 1] - values[m]) * t
        })
        .collect()
}
