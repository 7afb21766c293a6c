//! Rendering side of the timeline.
//!
//! The mixer holds every voice committed by the engine, each with its own start frame and fade
//! envelope, sums the voices active at each output frame and runs the sum through the output
//! chain. It is driven by absolute frame positions supplied by the output callback, which is
//! what makes the frame counter usable as the device clock.

use std::sync::Arc;

use crate::chain::{GainRamp, OutputChain};
use crate::config::OutputChainConfig;
use crate::envelope::Envelope;

struct Voice {
    id: u64,
    samples: Arc<[f32]>,
    channels: usize,
    start_frame: i64,
    frames: i64,
    envelope: Envelope,
}

impl Voice {
    fn end_frame(&self) -> i64 {
        self.start_frame + self.frames
    }
}

pub struct Mixer {
    sample_rate: u32,
    channels: usize,
    voices: Vec<Voice>,
    chain: OutputChain,
    frame: Vec<f32>,
}

impl Mixer {
    pub fn new(cfg: &OutputChainConfig, sample_rate: u32, channels: usize) -> Self {
        let channels = channels.max(1);
        Self {
            sample_rate,
            channels,
            voices: Vec::new(),
            chain: OutputChain::new(cfg, sample_rate, channels),
            frame: vec![0.0; channels],
        }
    }

    /// Voices not yet fully rendered.
    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    /// Add a voice whose samples are already at the mixer's rate.
    pub fn add_voice(
        &mut self,
        id: u64,
        samples: Arc<[f32]>,
        channels: usize,
        start: f64,
        envelope: Envelope,
    ) {
        let channels = channels.max(1);
        let frames = (samples.len() / channels) as i64;
        let start_frame = (start * self.sample_rate as f64).round() as i64;
        self.voices.push(Voice {
            id,
            samples,
            channels,
            start_frame,
            frames,
            envelope,
        });
    }

    pub fn ramp_master_gain(&mut self, ramp: GainRamp) {
        self.chain.ramp_master_gain(ramp);
    }

    /// Drop every voice and the chain's signal history. Returns how many voices were cut.
    pub fn clear(&mut self) -> usize {
        let n = self.voices.len();
        self.voices.clear();
        self.chain.reset();
        n
    }

    /// Render interleaved frames starting at absolute frame `first_frame`.
    pub fn render(&mut self, out: &mut [f32], first_frame: u64) {
        let channels = self.channels;
        let rate = self.sample_rate.max(1) as f64;
        let frames = out.len() / channels;

        for i in 0..frames {
            let abs = first_frame as i64 + i as i64;
            let t = abs as f64 / rate;
            self.frame.fill(0.0);

            for voice in &self.voices {
                let local = abs - voice.start_frame;
                if local < 0 || local >= voice.frames {
                    continue;
                }
                let gain = voice.envelope.gain_at(t);
                if gain <= 0.0 {
                    continue;
                }
                let base = local as usize * voice.channels;
                let src = &voice.samples[base..base + voice.channels];
                for (ch, acc) in self.frame.iter_mut().enumerate() {
                    *acc += gain * mapped_sample(src, channels, ch);
                }
            }

            self.chain.process_frame(&mut self.frame, t);
            out[i * channels..(i + 1) * channels].copy_from_slice(&self.frame);
        }
        // Trailing samples that do not form a whole frame.
        out[frames * channels..].fill(0.0);

        let next = first_frame as i64 + frames as i64;
        self.voices.retain(|v| {
            let keep = v.end_frame() > next;
            if !keep {
                tracing::trace!(id = v.id, "voice finished");
            }
            keep
        });
        self.chain.end_block(next as f64 / rate);
    }
}

/// Read the sample for output channel `dst_ch` from one source frame.
///
/// - mono → many: duplicate channel 0
/// - stereo → mono: average L/R
/// - otherwise: clamp to the last available source channel
fn mapped_sample(src: &[f32], dst_channels: usize, dst_ch: usize) -> f32 {
    match (src.len(), dst_channels) {
        (1, _) => src[0],
        (2, 1) => 0.5 * (src[0] + src[1]),
        (n, _) => src[dst_ch.min(n - 1)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CompressorConfig, ShelfConfig};

    /// Chain configuration that leaves samples untouched, so mixing can be checked exactly.
    fn transparent() -> OutputChainConfig {
        OutputChainConfig {
            compressor: CompressorConfig {
                threshold_db: 0.0,
                knee_db: 0.0,
                ratio: 1.0,
                ..CompressorConfig::default()
            },
            presence: ShelfConfig {
                frequency_hz: 6_000.0,
                gain_db: 0.0,
            },
            initial_gain: 1.0,
        }
    }

    fn constant(level: f32, frames: usize) -> Arc<[f32]> {
        vec![level; frames].into()
    }

    #[test]
    fn renders_silence_without_voices() {
        let mut mixer = Mixer::new(&OutputChainConfig::default(), 1_000, 2);
        let mut out = vec![1.0f32; 64];
        mixer.render(&mut out, 0);
        assert!(out.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn voice_starts_at_its_frame() {
        let mut mixer = Mixer::new(&transparent(), 1_000, 1);
        let env = Envelope::new(0.010, 0.100, 0.0);
        mixer.add_voice(0, constant(0.5, 100), 1, 0.010, env);

        let mut out = vec![0.0f32; 20];
        mixer.render(&mut out, 0);
        assert!(out[..10].iter().all(|s| *s == 0.0));
        assert!(out[10..].iter().all(|s| (*s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn overlapping_fades_sum_to_unity() {
        let mut mixer = Mixer::new(&transparent(), 1_000, 1);
        let a = Envelope::new(0.0, 0.100, 0.008);
        let b = Envelope::new(a.fade_out_start(), 0.100, 0.008);
        mixer.add_voice(0, constant(0.5, 100), 1, 0.0, a);
        mixer.add_voice(1, constant(0.5, 100), 1, b.start(), b);

        let mut out = vec![0.0f32; 150];
        mixer.render(&mut out, 0);
        for (i, s) in out.iter().enumerate().take(150).skip(10) {
            assert!((*s - 0.5).abs() < 1e-4, "frame {i}: {s}");
        }
    }

    #[test]
    fn finished_voices_are_dropped() {
        let mut mixer = Mixer::new(&transparent(), 1_000, 1);
        mixer.add_voice(0, constant(0.5, 10), 1, 0.0, Envelope::new(0.0, 0.010, 0.0));
        let mut out = vec![0.0f32; 32];
        mixer.render(&mut out, 0);
        assert_eq!(mixer.active_voices(), 0);
    }

    #[test]
    fn mono_voice_fills_both_output_channels() {
        let mut mixer = Mixer::new(&transparent(), 1_000, 2);
        mixer.add_voice(0, constant(0.25, 10), 1, 0.0, Envelope::new(0.0, 0.010, 0.0));
        let mut out = vec![0.0f32; 4];
        mixer.render(&mut out, 0);
        assert!(out.iter().all(|s| (*s - 0.25).abs() < 1e-6), "{out:?}");
    }

    #[test]
    fn clear_cuts_all_voices() {
        let mut mixer = Mixer::new(&transparent(), 1_000, 1);
        mixer.add_voice(0, constant(0.5, 100), 1, 0.0, Envelope::new(0.0, 0.1, 0.0));
        assert_eq!(mixer.clear(), 1);
        let mut out = vec![1.0f32; 8];
        mixer.render(&mut out, 0);
        assert!(out.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn mapped_sample_rules() {
        assert_eq!(mapped_sample(&[0.3], 2, 1), 0.3);
        assert!((mapped_sample(&[0.2, 0.4], 1, 0) - 0.3).abs() < 1e-6);
        assert_eq!(mapped_sample(&[0.2, 0.4], 2, 1), 0.4);
        assert_eq!(mapped_sample(&[0.1, 0.2, 0.3], 6, 5), 0.3);
    }
}
