//! Per-chunk fade envelopes.
//!
//! An envelope rises linearly from 0 to 1 over the fade-in, holds 1 during the sustain and
//! falls linearly back to 0 over the fade-out. It is evaluated by the rendering side as a gain
//! stage in front of the output chain; the chunk's samples are never touched.

/// Gain curve for one scheduled chunk, in device-clock seconds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Envelope {
    start: f64,
    end: f64,
    fade: f64,
}

impl Envelope {
    /// Build an envelope for a chunk playing over `[start, start + duration)`.
    ///
    /// The fade length is `crossfade`, clamped to half the chunk so fade-in and fade-out never
    /// overlap. A chunk shorter than two crossfades is one rise followed by one fall with no
    /// sustain region.
    pub fn new(start: f64, duration: f64, crossfade: f64) -> Self {
        let duration = duration.max(0.0);
        let fade = crossfade.max(0.0).min(duration / 2.0);
        Self {
            start,
            end: start + duration,
            fade,
        }
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    /// Effective fade length after clamping.
    pub fn fade(&self) -> f64 {
        self.fade
    }

    /// Length of the flat region at unity gain. Never negative.
    pub fn sustain(&self) -> f64 {
        (self.end - self.start - 2.0 * self.fade).max(0.0)
    }

    /// Instant the fade-out begins.
    pub fn fade_out_start(&self) -> f64 {
        self.end - self.fade
    }

    /// Gain at device time `t`.
    pub fn gain_at(&self, t: f64) -> f32 {
        if t < self.start || t >= self.end {
            return 0.0;
        }
        if self.fade <= 0.0 {
            return 1.0;
        }
        let rise = (t - self.start) / self.fade;
        let fall = (self.end - t) / self.fade;
        rise.min(fall).clamp(0.0, 1.0) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn ramps_and_sustain() {
        let env = Envelope::new(1.0, 1.0, 0.008);
        assert_eq!(env.gain_at(0.5), 0.0);
        assert_eq!(env.gain_at(1.0), 0.0);
        assert!(approx(env.gain_at(1.004), 0.5));
        assert_eq!(env.gain_at(1.5), 1.0);
        assert!(approx(env.gain_at(1.996), 0.5));
        assert_eq!(env.gain_at(2.0), 0.0);
        assert!((env.sustain() - 0.984).abs() < 1e-9);
    }

    #[test]
    fn short_chunk_has_no_sustain() {
        let env = Envelope::new(0.0, 0.005, 0.008);
        assert!((env.fade() - 0.0025).abs() < 1e-12);
        assert_eq!(env.sustain(), 0.0);
        assert!(approx(env.gain_at(0.0025), 1.0));
        assert!(env.gain_at(0.004) < 1.0);
        assert!(env.gain_at(0.004) > 0.0);
    }

    #[test]
    fn overlapping_fades_are_complementary() {
        let a = Envelope::new(0.0, 1.0, 0.008);
        let b = Envelope::new(a.fade_out_start(), 1.0, 0.008);
        for step in 0..8 {
            let t = a.fade_out_start() + step as f64 * 0.001 + 0.0005;
            assert!(approx(a.gain_at(t) + b.gain_at(t), 1.0), "t={t}");
        }
    }

    #[test]
    fn zero_crossfade_is_a_hard_gate() {
        let env = Envelope::new(0.0, 0.5, 0.0);
        assert_eq!(env.gain_at(0.0), 1.0);
        assert_eq!(env.gain_at(0.25), 1.0);
        assert_eq!(env.gain_at(0.5), 0.0);
    }
}
