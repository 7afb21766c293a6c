//! Decoded audio chunks, the unit the engine schedules.

use std::sync::Arc;

use thiserror::Error;

/// Reasons a chunk is refused at the `enqueue` boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChunkError {
    #[error("chunk has no samples")]
    Empty,
    #[error("chunk has zero channels")]
    NoChannels,
    #[error("chunk has a zero sample rate")]
    NoSampleRate,
    #[error("{samples} samples do not divide into {channels} channels")]
    RaggedFrames { samples: usize, channels: u16 },
    #[error("invalid chunk duration {0}s")]
    BadDuration(f64),
    #[error("declared duration {declared}s exceeds the {actual}s of samples")]
    DurationExceedsSamples { declared: f64, actual: f64 },
}

/// One decoded PCM fragment.
///
/// Samples are interleaved `f32` and shared behind an [`Arc`], so the chunk can be handed to
/// the output device without copying and is never mutated after construction.
#[derive(Clone, Debug)]
pub struct DecodedChunk {
    samples: Arc<[f32]>,
    channels: u16,
    sample_rate: u32,
    duration_secs: f64,
}

impl DecodedChunk {
    /// Build a chunk whose duration is derived from the frame count.
    pub fn new(samples: impl Into<Arc<[f32]>>, channels: u16, sample_rate: u32) -> Self {
        let samples = samples.into();
        let duration_secs = if channels == 0 || sample_rate == 0 {
            0.0
        } else {
            (samples.len() / channels as usize) as f64 / sample_rate as f64
        };
        Self {
            samples,
            channels,
            sample_rate,
            duration_secs,
        }
    }

    /// Build a chunk with a duration reported by the decoder.
    ///
    /// Some decoders report the playable duration separately from the buffer length (padding,
    /// priming frames); the scheduler trusts the reported value. It may be shorter than the
    /// samples, never longer by more than one frame.
    pub fn with_duration(
        samples: impl Into<Arc<[f32]>>,
        channels: u16,
        sample_rate: u32,
        duration_secs: f64,
    ) -> Self {
        Self {
            samples: samples.into(),
            channels,
            sample_rate,
            duration_secs,
        }
    }

    pub fn samples(&self) -> &Arc<[f32]> {
        &self.samples
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_secs
    }

    /// Number of interleaved frames held by the chunk.
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    /// Check the chunk can be scheduled.
    pub fn validate(&self) -> Result<(), ChunkError> {
        if self.channels == 0 {
            return Err(ChunkError::NoChannels);
        }
        if self.sample_rate == 0 {
            return Err(ChunkError::NoSampleRate);
        }
        if self.samples.is_empty() {
            return Err(ChunkError::Empty);
        }
        if self.samples.len() % self.channels as usize != 0 {
            return Err(ChunkError::RaggedFrames {
                samples: self.samples.len(),
                channels: self.channels,
            });
        }
        if !(self.duration_secs.is_finite() && self.duration_secs > 0.0) {
            return Err(ChunkError::BadDuration(self.duration_secs));
        }
        let actual = self.frames() as f64 / self.sample_rate as f64;
        if self.duration_secs > actual + 1.0 / self.sample_rate as f64 {
            return Err(ChunkError::DurationExceedsSamples {
                declared: self.duration_secs,
                actual,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_is_derived_from_frames() {
        let chunk = DecodedChunk::new(vec![0.0f32; 48_000 * 2], 2, 48_000);
        assert_eq!(chunk.frames(), 48_000);
        assert!((chunk.duration_secs() - 1.0).abs() < 1e-12);
        assert!(chunk.validate().is_ok());
    }

    #[test]
    fn validate_rejects_malformed_chunks() {
        assert_eq!(
            DecodedChunk::new(Vec::<f32>::new(), 1, 48_000).validate(),
            Err(ChunkError::Empty)
        );
        assert_eq!(
            DecodedChunk::new(vec![0.0f32; 4], 0, 48_000).validate(),
            Err(ChunkError::NoChannels)
        );
        assert_eq!(
            DecodedChunk::new(vec![0.0f32; 4], 1, 0).validate(),
            Err(ChunkError::NoSampleRate)
        );
        assert_eq!(
            DecodedChunk::new(vec![0.0f32; 3], 2, 48_000).validate(),
            Err(ChunkError::RaggedFrames {
                samples: 3,
                channels: 2
            })
        );
        assert_eq!(
            DecodedChunk::with_duration(vec![0.0f32; 4], 1, 48_000, -0.5).validate(),
            Err(ChunkError::BadDuration(-0.5))
        );
        assert!(matches!(
            DecodedChunk::with_duration(vec![0.0f32; 4], 1, 48_000, f64::NAN).validate(),
            Err(ChunkError::BadDuration(_))
        ));
    }

    #[test]
    fn declared_duration_may_trim_but_not_extend() {
        let trimmed = DecodedChunk::with_duration(vec![0.0f32; 1_000], 1, 1_000, 0.9);
        assert!(trimmed.validate().is_ok());
        let within_a_frame = DecodedChunk::with_duration(vec![0.0f32; 1_000], 1, 1_000, 1.0005);
        assert!(within_a_frame.validate().is_ok());
        assert_eq!(
            DecodedChunk::with_duration(vec![0.0f32; 500], 1, 1_000, 1.0).validate(),
            Err(ChunkError::DurationExceedsSamples {
                declared: 1.0,
                actual: 0.5
            })
        );
    }

    #[test]
    fn clones_share_sample_storage() {
        let chunk = DecodedChunk::new(vec![0.25f32; 8], 1, 8_000);
        let copy = chunk.clone();
        assert!(Arc::ptr_eq(chunk.samples(), copy.samples()));
    }
}
