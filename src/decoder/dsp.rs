// src/decoder/dsp.rs

/// Appends channel 0 of an interleaved block to `out`.
pub fn append_first_channel(out: &mut Vec<f32>, interleaved: &[f32], channels: usize) {
    if channels <= 1 {
        out.extend_from_slice(interleaved);
        return;
    }
    let frames = interleaved.len() / channels;
    out.reserve(frames);
    for frame in interleaved.chunks_exact(channels) {
        out.push(frame[0]);
    }
}
