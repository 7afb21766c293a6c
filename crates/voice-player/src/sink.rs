//! Seams between the engine and whatever renders audio.
//!
//! The engine never talks to an audio API directly. It reads a [`DeviceClock`] and hands
//! [`ScheduledVoice`]s and [`GainRamp`]s to an [`OutputDevice`]. The cpal implementation lives
//! in [`crate::output`]; tests inject a fake with a manual clock.

use anyhow::Result;

use crate::chain::GainRamp;
use crate::chunk::DecodedChunk;
use crate::envelope::Envelope;

/// Rendering state reported by the device or the host platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceState {
    /// The device clock is advancing and audio reaches the speakers.
    Running,
    /// The platform paused rendering (backgrounding, power management, lost device).
    Suspended,
}

/// Source of device time, in seconds.
///
/// The value must not advance while the device is not rendering.
pub trait DeviceClock {
    fn now(&self) -> f64;
}

/// A chunk committed to the device timeline.
#[derive(Clone, Debug)]
pub struct ScheduledVoice {
    /// Monotonic id, in scheduling order.
    pub id: u64,
    pub chunk: DecodedChunk,
    /// Device-clock instant the first sample plays.
    pub start: f64,
    pub envelope: Envelope,
}

/// Output device as seen by the engine.
///
/// Methods take `&self` so a device can be shared between the engine and the code that waits
/// on a resume without holding the engine lock.
pub trait OutputDevice: DeviceClock + Send + Sync {
    /// Whether the device is currently rendering.
    fn is_rendering(&self) -> bool;

    /// Ask the device to start or resume rendering. Returns once it is rendering.
    fn resume(&self) -> Result<()>;

    /// Play a zero-length buffer to satisfy hosts that gate output behind a first interaction.
    fn prime(&self) -> Result<()>;

    /// Commit a voice to the timeline.
    ///
    /// On error the voice was not committed and the engine leaves its cursor where it was.
    fn start_voice(&self, voice: ScheduledVoice) -> Result<()>;

    /// Schedule a master gain change.
    fn ramp_master_gain(&self, ramp: GainRamp);

    /// Silence and discard every committed voice.
    fn cancel_voices(&self);
}
