//! High-shelf biquad (RBJ cookbook, shelf slope 1).

use std::f32::consts::PI;

use crate::config::ShelfConfig;

#[derive(Clone, Copy, Debug, Default)]
struct ChannelState {
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

#[derive(Debug)]
pub struct HighShelf {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    state: Vec<ChannelState>,
}

impl HighShelf {
    pub fn new(cfg: &ShelfConfig, sample_rate: u32, channels: usize) -> Self {
        let fs = sample_rate.max(1) as f32;
        // Keep the corner below Nyquist for low output rates.
        let f0 = cfg.frequency_hz.clamp(10.0, fs * 0.45);
        let a = 10f32.powf(cfg.gain_db / 40.0);
        let w0 = 2.0 * PI * f0 / fs;
        let (sin, cos) = w0.sin_cos();
        let alpha = sin / 2.0 * 2f32.sqrt();
        let sqrt_a2 = 2.0 * a.sqrt() * alpha;

        let b0 = a * ((a + 1.0) + (a - 1.0) * cos + sqrt_a2);
        let b1 = -2.0 * a * ((a - 1.0) + (a + 1.0) * cos);
        let b2 = a * ((a + 1.0) + (a - 1.0) * cos - sqrt_a2);
        let a0 = (a + 1.0) - (a - 1.0) * cos + sqrt_a2;
        let a1 = 2.0 * ((a - 1.0) - (a + 1.0) * cos);
        let a2 = (a + 1.0) - (a - 1.0) * cos - sqrt_a2;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
            state: vec![ChannelState::default(); channels.max(1)],
        }
    }

    /// Filter one interleaved frame in place.
    pub fn process_frame(&mut self, frame: &mut [f32]) {
        for (s, st) in frame.iter_mut().zip(self.state.iter_mut()) {
            let x = *s;
            let y = self.b0 * x + self.b1 * st.x1 + self.b2 * st.x2 - self.a1 * st.y1 - self.a2 * st.y2;
            st.x2 = st.x1;
            st.x1 = x;
            st.y2 = st.y1;
            st.y1 = y;
            *s = y;
        }
    }

    pub fn reset(&mut self) {
        self.state.fill(ChannelState::default());
    }
}
