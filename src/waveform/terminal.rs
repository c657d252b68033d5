// src/waveform/terminal.rs

use crate::decoder::linear_interpolate;

/// Draws normalized magnitudes as bars mirrored around the middle row.
///
/// `values` are stretched to `width` columns first; each value in `[0, 1]`
/// covers that fraction of the half-height above and below the centre.
pub fn render_composite(values: &[f32], width: usize, height: usize) -> Vec<String> {
    let h = height.max(3);
    let columns = if values.len() > 1 {
        linear_interpolate(values, width.max(1))
    } else {
        values.to_vec()
    };

    let mut lines = vec![vec![' '; columns.len()]; h];
    let mid = h / 2;
    let half_span = (h - 1) as f32 / 2.0;

    for (x, &v) in columns.iter().enumerate() {
        let reach = (v.clamp(0.0, 1.0) * half_span).round() as usize;
        let top = mid.saturating_sub(reach);
        let bottom = (mid + reach).min(h - 1);
        for row in lines.iter_mut().take(bottom + 1).skip(top) {
            row[x] = '█';
        }
    }
    lines.into_iter().map(|row| row.into_iter().collect()).collect()
}
