//! Fixed output processing graph.
//!
//! compressor → high-shelf presence boost → master gain → device
//!
//! The graph is built once per output stream and survives `stop()`; only the master gain
//! moves at runtime, and only through [`GainRamp`]s.

mod compressor;
mod gain;
mod shelf;

pub use compressor::Compressor;
pub use gain::{GainAutomation, GainRamp};
pub use shelf::HighShelf;

use crate::config::OutputChainConfig;

#[derive(Debug)]
pub struct OutputChain {
    compressor: Compressor,
    presence: HighShelf,
    master: GainAutomation,
}

impl OutputChain {
    pub fn new(cfg: &OutputChainConfig, sample_rate: u32, channels: usize) -> Self {
        let cfg = cfg.clone().sanitized();
        Self {
            compressor: Compressor::new(&cfg.compressor, sample_rate),
            presence: HighShelf::new(&cfg.presence, sample_rate, channels),
            master: GainAutomation::new(cfg.initial_gain),
        }
    }

    /// Run one interleaved output frame at device time `t` through the graph.
    pub fn process_frame(&mut self, frame: &mut [f32], t: f64) {
        self.compressor.process_frame(frame);
        self.presence.process_frame(frame);
        let gain = self.master.value_at(t);
        for s in frame.iter_mut() {
            *s *= gain;
        }
    }

    pub fn ramp_master_gain(&mut self, ramp: GainRamp) {
        self.master.apply(ramp);
    }

    pub fn master_gain_target(&self) -> f32 {
        self.master.target()
    }

    /// Forget compressor and filter history so a cut-off voice does not ring into the next one.
    ///
    /// The master gain is left where it is.
    pub fn reset(&mut self) {
        self.compressor.reset();
        self.presence.reset();
    }

    /// Housekeeping once per render block.
    pub fn end_block(&mut self, t: f64) {
        self.master.settle(t);
    }
}
