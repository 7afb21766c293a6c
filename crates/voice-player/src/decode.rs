//! File decode for local playback.
//!
//! Uses Symphonia to:
//! - probe the input container/codec
//! - decode every packet into interleaved `f32` samples held in memory
//! - cut the result into [`DecodedChunk`]s of varying length, the way a streaming
//!   synthesizer delivers them

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::chunk::DecodedChunk;

/// A fully decoded source.
#[derive(Clone, Debug)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
    /// Codec name (best-effort).
    pub codec: Option<String>,
}

impl DecodedAudio {
    pub fn frames(&self) -> usize {
        self.samples.len() / (self.channels.max(1) as usize)
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// Decode the whole file at `path`.
pub fn decode_file(path: &Path) -> Result<DecodedAudio> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .with_context(|| format!("probe {}", path.display()))?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| anyhow!("No default audio track"))?;
    let track_id = track.id;
    let codec_params: CodecParameters = track.codec_params.clone();

    let channels = codec_params
        .channels
        .ok_or_else(|| anyhow!("Unknown channels"))?
        .count();
    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| anyhow!("Unknown sample rate"))?;
    let channels = u16::try_from(channels).context("channel count")?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .context("create decoder")?;

    let mut samples = Vec::new();
    let mut skipped = 0usize;
    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(e).context("read packet"),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(msg)) => {
                skipped += 1;
                tracing::debug!(%msg, "skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(e).context("decode packet"),
        };

        let mut sample_buf = SampleBuffer::<f32>::new(decoded.frames() as u64, *decoded.spec());
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sample_buf.samples());
    }

    let audio = DecodedAudio {
        samples,
        channels,
        sample_rate,
        codec: codec_name_from_params(&codec_params),
    };
    tracing::info!(
        path = %path.display(),
        codec = audio.codec.as_deref().unwrap_or("unknown"),
        channels,
        sample_rate,
        duration_secs = audio.duration_secs(),
        skipped,
        "decoded source"
    );
    Ok(audio)
}

/// Cut `audio` into consecutive chunks.
///
/// `next_len_ms` is asked for the length of each chunk in turn; the last chunk takes whatever
/// remains. Lengths of zero are treated as one millisecond.
pub fn split_into_chunks(
    audio: &DecodedAudio,
    mut next_len_ms: impl FnMut() -> u32,
) -> Vec<DecodedChunk> {
    let channels = audio.channels.max(1) as usize;
    let total = audio.frames();
    let mut chunks = Vec::new();
    let mut pos = 0usize;
    while pos < total {
        let ms = next_len_ms().max(1) as u64;
        let frames = ((ms * audio.sample_rate as u64) / 1_000).max(1) as usize;
        let end = (pos + frames).min(total);
        let slice = &audio.samples[pos * channels..end * channels];
        chunks.push(DecodedChunk::new(slice.to_vec(), audio.channels, audio.sample_rate));
        pos = end;
    }
    chunks
}

fn codec_name_from_params(params: &CodecParameters) -> Option<String> {
    use symphonia::core::codecs::*;
    let name = match params.codec {
        CODEC_TYPE_FLAC => "FLAC",
        CODEC_TYPE_MP3 => "MP3",
        CODEC_TYPE_AAC => "AAC",
        CODEC_TYPE_VORBIS => "VORBIS",
        CODEC_TYPE_OPUS => "OPUS",
        CODEC_TYPE_PCM_S16LE | CODEC_TYPE_PCM_S16BE => "PCM_S16",
        CODEC_TYPE_PCM_S24LE | CODEC_TYPE_PCM_S24BE => "PCM_S24",
        CODEC_TYPE_PCM_S32LE | CODEC_TYPE_PCM_S32BE => "PCM_S32",
        CODEC_TYPE_PCM_F32LE | CODEC_TYPE_PCM_F32BE => "PCM_F32",
        _ => return None,
    };
    Some(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audio(frames: usize, channels: u16, rate: u32) -> DecodedAudio {
        DecodedAudio {
            samples: (0..frames * channels as usize).map(|i| i as f32).collect(),
            channels,
            sample_rate: rate,
            codec: None,
        }
    }

    #[test]
    fn split_covers_every_frame_in_order() {
        let src = audio(1_000, 2, 1_000);
        let chunks = split_into_chunks(&src, || 300);
        let lens: Vec<usize> = chunks.iter().map(|c| c.frames()).collect();
        assert_eq!(lens, vec![300, 300, 300, 100]);

        let joined: Vec<f32> = chunks
            .iter()
            .flat_map(|c| c.samples().iter().copied())
            .collect();
        assert_eq!(joined, src.samples);
    }

    #[test]
    fn split_uses_each_requested_length() {
        let src = audio(48_000, 1, 48_000);
        let mut lens = [100u32, 250, 400].into_iter().cycle();
        let chunks = split_into_chunks(&src, || lens.next().unwrap_or(100));
        assert!((chunks[0].duration_secs() - 0.1).abs() < 1e-9);
        assert!((chunks[1].duration_secs() - 0.25).abs() < 1e-9);
        assert!((chunks[2].duration_secs() - 0.4).abs() < 1e-9);
        let total: f64 = chunks.iter().map(|c| c.duration_secs()).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn split_treats_zero_length_as_one_ms() {
        let src = audio(10, 1, 1_000);
        assert_eq!(split_into_chunks(&src, || 0).len(), 10);
    }

    #[test]
    fn codec_name_maps_known_codecs() {
        let mut params = CodecParameters::new();
        params.codec = symphonia::core::codecs::CODEC_TYPE_FLAC;
        assert_eq!(codec_name_from_params(&params), Some("FLAC".to_string()));
        assert!(codec_name_from_params(&CodecParameters::new()).is_none());
    }

    #[test]
    fn decode_file_reports_missing_path() {
        let err = decode_file(Path::new("/nonexistent/voice.wav")).unwrap_err();
        assert!(format!("{err:#}").contains("open"));
    }
}
