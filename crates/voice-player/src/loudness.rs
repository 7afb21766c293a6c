//! Best-effort loudness leveling across chunks.
//!
//! Each scheduled chunk is measured with a sparse RMS over channel 0 and the master gain is
//! steered toward `target_rms / rms`, clamped to a narrow band.

use crate::chunk::DecodedChunk;
use crate::config::LoudnessConfig;

/// Approximate RMS of channel 0, sampling every `stride_frames` frame.
///
/// Returns 0.0 for an empty chunk.
pub fn sparse_rms(chunk: &DecodedChunk, stride_frames: usize) -> f32 {
    let channels = chunk.channels() as usize;
    if channels == 0 {
        return 0.0;
    }
    let step = stride_frames.max(1) * channels;
    let samples = chunk.samples();

    let mut sum = 0.0f64;
    let mut count = 0usize;
    let mut idx = 0usize;
    while idx < samples.len() {
        let s = samples[idx] as f64;
        sum += s * s;
        count += 1;
        idx += step;
    }
    if count == 0 {
        return 0.0;
    }
    (sum / count as f64).sqrt() as f32
}

/// Stateful gain estimator.
///
/// With `smoothing < 1.0` successive corrections are blended with an exponential moving
/// average; at `1.0` every chunk is judged on its own.
#[derive(Debug)]
pub struct LoudnessNormalizer {
    cfg: LoudnessConfig,
    average: Option<f32>,
}

impl LoudnessNormalizer {
    pub fn new(cfg: LoudnessConfig) -> Self {
        Self { cfg, average: None }
    }

    /// Gain multiplier for a chunk, or `None` when leveling is disabled.
    pub fn observe(&mut self, chunk: &DecodedChunk) -> Option<f32> {
        if !self.cfg.enabled {
            return None;
        }
        let rms = sparse_rms(chunk, self.cfg.stride_frames).max(self.cfg.rms_floor);
        let raw = (self.cfg.target_rms / rms).clamp(self.cfg.min_gain, self.cfg.max_gain);
        let gain = match self.average {
            Some(prev) => prev + self.cfg.smoothing * (raw - prev),
            None => raw,
        };
        self.average = Some(gain);
        tracing::trace!(rms, gain, "loudness estimate");
        Some(gain)
    }

    /// Forget the cross-chunk history (new utterance).
    pub fn reset(&mut self) {
        self.average = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant_chunk(level: f32, frames: usize, channels: u16) -> DecodedChunk {
        DecodedChunk::new(vec![level; frames * channels as usize], channels, 48_000)
    }

    #[test]
    fn sparse_rms_of_constant_signal() {
        let chunk = constant_chunk(0.5, 4_096, 1);
        assert!((sparse_rms(&chunk, 256) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn sparse_rms_reads_channel_zero_only() {
        let mut samples = Vec::new();
        for _ in 0..1_024 {
            samples.push(0.25f32);
            samples.push(1.0f32);
        }
        let chunk = DecodedChunk::new(samples, 2, 48_000);
        assert!((sparse_rms(&chunk, 256) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn gain_tracks_target_within_band() {
        let mut norm = LoudnessNormalizer::new(LoudnessConfig::default());
        let gain = norm.observe(&constant_chunk(0.1, 2_048, 1)).unwrap();
        assert!((gain - 1.25).abs() < 1e-5);
    }

    #[test]
    fn silence_clamps_to_max_gain() {
        let mut norm = LoudnessNormalizer::new(LoudnessConfig::default());
        let gain = norm.observe(&constant_chunk(0.0, 2_048, 1)).unwrap();
        assert_eq!(gain, 2.5);
    }

    #[test]
    fn loud_chunk_clamps_to_min_gain() {
        let mut norm = LoudnessNormalizer::new(LoudnessConfig::default());
        let gain = norm.observe(&constant_chunk(0.9, 2_048, 1)).unwrap();
        assert_eq!(gain, 0.5);
    }

    #[test]
    fn smoothing_blends_successive_chunks() {
        let mut cfg = LoudnessConfig::default();
        cfg.smoothing = 0.5;
        let mut norm = LoudnessNormalizer::new(cfg);
        let first = norm.observe(&constant_chunk(0.125, 2_048, 1)).unwrap();
        assert!((first - 1.0).abs() < 1e-5);
        let second = norm.observe(&constant_chunk(0.0625, 2_048, 1)).unwrap();
        assert!((second - 1.5).abs() < 1e-5);
    }

    #[test]
    fn disabled_normalizer_reports_nothing() {
        let mut cfg = LoudnessConfig::default();
        cfg.enabled = false;
        let mut norm = LoudnessNormalizer::new(cfg);
        assert!(norm.observe(&constant_chunk(0.1, 512, 1)).is_none());
    }
}
