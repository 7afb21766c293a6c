//! Tuning parameters for the scheduling engine and the output chain.
//!
//! Every struct implements [`Default`] with the values the engine was tuned with and
//! deserializes with `#[serde(default)]`, so a TOML file only needs the keys it overrides.

use serde::Deserialize;

/// Lowest accepted jitter-buffer target in seconds.
pub const MIN_TARGET_BUFFER_SECS: f64 = 0.2;
/// Highest accepted jitter-buffer target in seconds.
pub const MAX_TARGET_BUFFER_SECS: f64 = 0.6;

/// Clamp a requested lookahead into the safe band.
///
/// Non-finite input falls back to the default target.
pub fn clamp_target_buffer(secs: f64) -> f64 {
    if !secs.is_finite() {
        return EngineConfig::default().target_buffer_secs;
    }
    secs.clamp(MIN_TARGET_BUFFER_SECS, MAX_TARGET_BUFFER_SECS)
}

/// Engine configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How far ahead of the device clock the cursor is kept (seconds).
    pub target_buffer_secs: f64,
    /// Overlap between consecutive chunks (seconds).
    pub crossfade_secs: f64,
    /// The cursor is considered stale when it is less than this far ahead of now.
    pub min_lead_secs: f64,
    /// Distance from now a stale cursor is snapped to.
    pub guard_secs: f64,
    /// Play one zero-length buffer on the first successful unlock.
    ///
    /// Only needed on hosts that gate output behind a user gesture.
    pub prime_on_unlock: bool,
    pub loudness: LoudnessConfig,
    pub output: OutputChainConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            target_buffer_secs: 0.35,
            crossfade_secs: 0.008,
            min_lead_secs: 0.01,
            guard_secs: 0.02,
            prime_on_unlock: false,
            loudness: LoudnessConfig::default(),
            output: OutputChainConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Return a copy with out-of-range values pulled back into range.
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        self.target_buffer_secs = clamp_target_buffer(self.target_buffer_secs);
        if !(self.crossfade_secs.is_finite() && self.crossfade_secs >= 0.0) {
            self.crossfade_secs = defaults.crossfade_secs;
        }
        if !(self.min_lead_secs.is_finite() && self.min_lead_secs >= 0.0) {
            self.min_lead_secs = defaults.min_lead_secs;
        }
        if !(self.guard_secs.is_finite() && self.guard_secs >= self.min_lead_secs) {
            self.guard_secs = self.min_lead_secs.max(defaults.guard_secs);
        }
        self.loudness = self.loudness.sanitized();
        self.output = self.output.sanitized();
        self
    }
}

/// Loudness normalizer settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LoudnessConfig {
    /// Disable to leave the master gain at its initial value.
    pub enabled: bool,
    /// Target RMS (linear). 0.125 is roughly -18 dBFS.
    pub target_rms: f32,
    pub min_gain: f32,
    pub max_gain: f32,
    /// RMS floor used before dividing, so silence never blows up the gain.
    pub rms_floor: f32,
    /// Frame stride used when sampling channel 0.
    pub stride_frames: usize,
    /// Time constant of the master gain approach (seconds).
    pub time_constant_secs: f64,
    /// Weight of the newest chunk in the cross-chunk moving average.
    ///
    /// `1.0` disables cross-chunk smoothing: each chunk sets its own gain.
    pub smoothing: f32,
}

impl Default for LoudnessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            target_rms: 0.125,
            min_gain: 0.5,
            max_gain: 2.5,
            rms_floor: 1e-6,
            stride_frames: 256,
            time_constant_secs: 0.03,
            smoothing: 1.0,
        }
    }
}

impl LoudnessConfig {
    fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if !(self.target_rms.is_finite() && self.target_rms > 0.0) {
            self.target_rms = defaults.target_rms;
        }
        if !(self.min_gain > 0.0 && self.max_gain.is_finite() && self.max_gain >= self.min_gain) {
            self.min_gain = defaults.min_gain;
            self.max_gain = defaults.max_gain;
        }
        if !(self.rms_floor > 0.0) {
            self.rms_floor = defaults.rms_floor;
        }
        self.stride_frames = self.stride_frames.max(1);
        if !(self.time_constant_secs.is_finite() && self.time_constant_secs > 0.0) {
            self.time_constant_secs = defaults.time_constant_secs;
        }
        if !(self.smoothing > 0.0 && self.smoothing <= 1.0) {
            self.smoothing = defaults.smoothing;
        }
        self
    }
}

/// Fixed output chain parameters.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct OutputChainConfig {
    pub compressor: CompressorConfig,
    pub presence: ShelfConfig,
    /// Master gain before the normalizer makes any correction.
    pub initial_gain: f32,
}

impl Default for OutputChainConfig {
    fn default() -> Self {
        Self {
            compressor: CompressorConfig::default(),
            presence: ShelfConfig::default(),
            initial_gain: 1.0,
        }
    }
}

impl OutputChainConfig {
    /// Return a copy whose initial gain is finite and positive.
    pub fn sanitized(mut self) -> Self {
        if !(self.initial_gain.is_finite() && self.initial_gain > 0.0) {
            self.initial_gain = Self::default().initial_gain;
        }
        self
    }
}

/// Gentle leveling compressor.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CompressorConfig {
    pub threshold_db: f32,
    pub knee_db: f32,
    pub ratio: f32,
    pub attack_secs: f32,
    pub release_secs: f32,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            threshold_db: -24.0,
            knee_db: 30.0,
            ratio: 3.0,
            attack_secs: 0.003,
            release_secs: 0.25,
        }
    }
}

/// High-shelf presence boost.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ShelfConfig {
    pub frequency_hz: f32,
    pub gain_db: f32,
}

impl Default for ShelfConfig {
    fn default() -> Self {
        Self {
            frequency_hz: 6_000.0,
            gain_db: 2.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_target_buffer_enforces_band() {
        assert_eq!(clamp_target_buffer(0.05), 0.2);
        assert_eq!(clamp_target_buffer(0.45), 0.45);
        assert_eq!(clamp_target_buffer(3.0), 0.6);
        assert_eq!(clamp_target_buffer(f64::NAN), 0.35);
    }

    #[test]
    fn sanitized_repairs_invalid_values() {
        let mut cfg = EngineConfig::default();
        cfg.target_buffer_secs = 10.0;
        cfg.crossfade_secs = -1.0;
        cfg.guard_secs = 0.0;
        cfg.loudness.stride_frames = 0;
        cfg.loudness.smoothing = 0.0;

        let cfg = cfg.sanitized();
        assert_eq!(cfg.target_buffer_secs, 0.6);
        assert_eq!(cfg.crossfade_secs, 0.008);
        assert!(cfg.guard_secs >= cfg.min_lead_secs);
        assert_eq!(cfg.loudness.stride_frames, 1);
        assert_eq!(cfg.loudness.smoothing, 1.0);
    }

    #[test]
    fn sanitized_rejects_nan_and_negative_gains() {
        let mut cfg = EngineConfig::default();
        cfg.loudness.target_rms = f32::NAN;
        cfg.loudness.max_gain = f32::INFINITY;
        cfg.output.initial_gain = -2.0;

        let cfg = cfg.sanitized();
        assert_eq!(cfg.loudness.target_rms, 0.125);
        assert_eq!(cfg.loudness.max_gain, 2.5);
        assert_eq!(cfg.output.initial_gain, 1.0);

        let chain = OutputChainConfig {
            initial_gain: f32::NAN,
            ..OutputChainConfig::default()
        };
        assert_eq!(chain.sanitized().initial_gain, 1.0);
    }
}
