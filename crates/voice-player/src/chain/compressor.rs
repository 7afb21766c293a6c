//! Feed-forward soft-knee compressor with linked channels.

use crate::config::CompressorConfig;

const LEVEL_FLOOR: f32 = 1e-9;

#[derive(Debug)]
pub struct Compressor {
    threshold_db: f32,
    knee_db: f32,
    ratio: f32,
    attack_coeff: f32,
    release_coeff: f32,
    /// Smoothed gain reduction in dB (always <= 0).
    reduction_db: f32,
}

fn smoothing_coeff(time_secs: f32, sample_rate: u32) -> f32 {
    if time_secs <= 0.0 || sample_rate == 0 {
        return 0.0;
    }
    (-1.0 / (time_secs * sample_rate as f32)).exp()
}

impl Compressor {
    pub fn new(cfg: &CompressorConfig, sample_rate: u32) -> Self {
        Self {
            threshold_db: cfg.threshold_db,
            knee_db: cfg.knee_db.max(0.0),
            ratio: cfg.ratio.max(1.0),
            attack_coeff: smoothing_coeff(cfg.attack_secs, sample_rate),
            release_coeff: smoothing_coeff(cfg.release_secs, sample_rate),
            reduction_db: 0.0,
        }
    }

    /// Static curve: output level for an input level, both in dB.
    pub fn curve_db(&self, level_db: f32) -> f32 {
        let over = level_db - self.threshold_db;
        let slope = 1.0 / self.ratio - 1.0;
        if self.knee_db > 0.0 && 2.0 * over.abs() <= self.knee_db {
            let x = over + self.knee_db / 2.0;
            level_db + slope * x * x / (2.0 * self.knee_db)
        } else if over > 0.0 {
            self.threshold_db + over / self.ratio
        } else {
            level_db
        }
    }

    /// Process one interleaved frame in place.
    pub fn process_frame(&mut self, frame: &mut [f32]) {
        let peak = frame.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        let level_db = 20.0 * peak.max(LEVEL_FLOOR).log10();
        let wanted = self.curve_db(level_db) - level_db;

        let coeff = if wanted < self.reduction_db {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.reduction_db = coeff * self.reduction_db + (1.0 - coeff) * wanted;

        let gain = 10f32.powf(self.reduction_db / 20.0);
        for s in frame.iter_mut() {
            *s *= gain;
        }
    }

    /// Current gain reduction in dB.
    pub fn reduction_db(&self) -> f32 {
        self.reduction_db
    }

    pub fn reset(&mut self) {
        self.reduction_db = 0.0;
    }
}
