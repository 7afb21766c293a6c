//! Playback stage (CPAL output stream).
//!
//! Builds the CPAL output stream and provides the real-time audio callback.
//! The callback:
//! - renders the shared [`Mixer`] into a local `f32` scratch buffer
//! - advances the frame counter that serves as the device clock
//! - converts `f32` samples to the device sample format

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Result, anyhow};
use cpal::traits::DeviceTrait;

use crate::mixer::Mixer;

/// Shared handles the output callback reads and advances.
#[derive(Clone)]
pub struct PlaybackHandles {
    pub mixer: Arc<Mutex<Mixer>>,
    /// Frames produced since the stream was built. Frozen while the stream is paused.
    pub rendered_frames: Arc<AtomicU64>,
}

/// Build a CPAL output stream that renders `handles.mixer`.
///
/// `on_error` is called from CPAL's error thread; the stream is unusable afterwards.
pub fn build_output_stream<E>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    handles: PlaybackHandles,
    on_error: E,
) -> Result<cpal::Stream>
where
    E: FnMut(cpal::StreamError) + Send + 'static,
{
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32, E>(device, config, handles, on_error),
        cpal::SampleFormat::I16 => build_stream::<i16, E>(device, config, handles, on_error),
        cpal::SampleFormat::I32 => build_stream::<i32, E>(device, config, handles, on_error),
        cpal::SampleFormat::U16 => build_stream::<u16, E>(device, config, handles, on_error),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

fn build_stream<T, E>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    handles: PlaybackHandles,
    on_error: E,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
    E: FnMut(cpal::StreamError) + Send + 'static,
{
    let channels_out = (config.channels as usize).max(1);
    let PlaybackHandles {
        mixer,
        rendered_frames,
    } = handles;
    let mut scratch: Vec<f32> = Vec::new();

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            let frames = data.len() / channels_out;
            scratch.resize(data.len(), 0.0);

            let first = rendered_frames.load(Ordering::Relaxed);
            {
                let mut mixer = mixer.lock().unwrap_or_else(PoisonError::into_inner);
                mixer.render(&mut scratch, first);
            }
            rendered_frames.fetch_add(frames as u64, Ordering::Relaxed);

            for (dst, src) in data.iter_mut().zip(scratch.iter()) {
                *dst = <T as cpal::Sample>::from_sample::<f32>(src.clamp(-1.0, 1.0));
            }
        },
        on_error,
        None,
    )?;

    Ok(stream)
}
