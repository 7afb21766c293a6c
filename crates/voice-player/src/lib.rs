//! Gapless playback of streamed speech chunks.
//!
//! Decoded PCM fragments arrive one by one (typically from a streaming synthesizer). The
//! [`Engine`] buffers them, schedules each against the device clock with a short crossfade so
//! consecutive chunks join without gaps or clicks, steers a master gain toward a steady
//! loudness and survives the output device being locked or suspended by the platform.
//!
//! The engine talks to audio hardware only through [`OutputDevice`]; [`CpalOutput`] is the
//! cpal implementation.

pub mod chain;
pub mod chunk;
pub mod config;
pub mod decode;
pub mod device;
pub mod engine;
pub mod envelope;
pub mod loudness;
pub mod mixer;
pub mod output;
pub mod playback;
pub mod queue;
pub mod resample;
pub mod scheduler;
pub mod shared;
pub mod sink;
pub mod status;
pub mod suspension;

pub use chunk::{ChunkError, DecodedChunk};
pub use config::EngineConfig;
pub use engine::{Admission, Engine, EngineError};
pub use output::{CpalOutput, CpalOutputOptions};
pub use shared::{SharedEngine, Ticker, spawn_ticker};
pub use sink::{DeviceClock, DeviceState, OutputDevice, ScheduledVoice};
pub use status::{EngineCounters, EngineStatus};
pub use suspension::GuardState;
