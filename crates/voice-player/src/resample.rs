//! Chunk sample-rate conversion.
//!
//! Chunks arrive at whatever rate the synthesis provider produced; the output stream runs at a
//! fixed device rate. Each chunk is converted once, off the audio thread, with Rubato's sinc
//! resampler. The frame count is fixed to `round(frames * ratio)` so the chunk's duration (and
//! therefore the timeline arithmetic) is unchanged.

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters, SincInterpolationType,
    WindowFunction, calculate_cutoff,
};

use crate::chunk::DecodedChunk;

/// Input block size for the one-shot conversion loop.
const CHUNK_FRAMES: usize = 1024;

/// Number of output frames a conversion produces.
pub fn converted_frames(frames: usize, src_rate: u32, dst_rate: u32) -> usize {
    if src_rate == 0 {
        return 0;
    }
    (frames as f64 * dst_rate as f64 / src_rate as f64).round() as usize
}

/// Convert a chunk's samples to `dst_rate`.
pub fn resample_chunk(chunk: &DecodedChunk, dst_rate: u32) -> Result<Arc<[f32]>> {
    resample_interleaved(
        chunk.samples(),
        chunk.channels() as usize,
        chunk.sample_rate(),
        dst_rate,
    )
    .with_context(|| format!("resample {} Hz -> {dst_rate} Hz", chunk.sample_rate()))
}

/// Convert interleaved `samples` from `src_rate` to `dst_rate`.
///
/// Returns the input unchanged when the rates already match.
pub fn resample_interleaved(
    samples: &Arc<[f32]>,
    channels: usize,
    src_rate: u32,
    dst_rate: u32,
) -> Result<Arc<[f32]>> {
    if src_rate == dst_rate || samples.is_empty() {
        return Ok(samples.clone());
    }
    let channels = channels.max(1);
    let in_frames = samples.len() / channels;
    let want_frames = converted_frames(in_frames, src_rate, dst_rate);
    let f_ratio = dst_rate as f64 / src_rate as f64;

    let sinc_len = 128;
    let window = WindowFunction::BlackmanHarris2;
    let params = SincInterpolationParameters {
        sinc_len,
        f_cutoff: calculate_cutoff(sinc_len, window),
        interpolation: SincInterpolationType::Cubic,
        oversampling_factor: 256,
        window,
    };

    let mut resampler = Async::<f32>::new_sinc(
        f_ratio,
        1.1,
        &params,
        CHUNK_FRAMES,
        channels,
        FixedAsync::Input,
    )
    .context("create resampler")?;

    let out_block_frames = resampler.output_frames_max();
    let mut out_block = vec![0.0f32; out_block_frames * channels];
    let mut out = Vec::with_capacity((want_frames + out_block_frames) * channels);

    let mut indexing = Indexing {
        input_offset: 0,
        output_offset: 0,
        active_channels_mask: None,
        partial_len: None,
    };

    // Feed the chunk, then silence until the filter delay has been flushed.
    let padded_frames = in_frames + CHUNK_FRAMES;
    let mut pos = 0usize;
    while pos < padded_frames && out.len() < want_frames * channels {
        let mut block = vec![0.0f32; CHUNK_FRAMES * channels];
        let take = in_frames.saturating_sub(pos).min(CHUNK_FRAMES);
        if take > 0 {
            let from = pos * channels;
            block[..take * channels].copy_from_slice(&samples[from..from + take * channels]);
        }

        let input = InterleavedSlice::new(&block, channels, CHUNK_FRAMES)
            .map_err(|e| anyhow!("interleaved slice (input): {e}"))?;
        let mut output = InterleavedSlice::new_mut(&mut out_block, channels, out_block_frames)
            .map_err(|e| anyhow!("interleaved slice (output): {e}"))?;

        indexing.input_offset = 0;
        indexing.output_offset = 0;
        let (_nbr_in, nbr_out) = resampler
            .process_into_buffer(&input, &mut output, Some(&indexing))
            .context("resample block")?;

        out.extend_from_slice(&out_block[..nbr_out * channels]);
        pos += CHUNK_FRAMES;
    }

    out.resize(want_frames * channels, 0.0);
    Ok(out.into())
}
