//! cpal-backed [`OutputDevice`].
//!
//! A `cpal::Stream` is not `Send` on every host, so a dedicated device thread builds and owns
//! it and executes [`DeviceCommand`]s received over a crossbeam channel. The engine only sees
//! the shared [`Mixer`], the frame counter that serves as the clock, and the rendering flag.
//! Rendering transitions and stream errors are published as [`DeviceState`] events.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};

use crate::chain::GainRamp;
use crate::config::OutputChainConfig;
use crate::device;
use crate::envelope::Envelope;
use crate::mixer::Mixer;
use crate::playback::{self, PlaybackHandles};
use crate::resample;
use crate::sink::{DeviceClock, DeviceState, OutputDevice, ScheduledVoice};

/// How long a caller waits for the device thread to answer a command.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

/// Preferred output rate when none is configured.
pub const DEFAULT_OUTPUT_RATE: u32 = 48_000;

/// Options for opening the cpal output.
#[derive(Clone, Debug, Default)]
pub struct CpalOutputOptions {
    /// Case-insensitive substring of the device name; default device when unset.
    pub device: Option<String>,
    /// Preferred stream rate; [`DEFAULT_OUTPUT_RATE`] when unset.
    pub sample_rate: Option<u32>,
    pub chain: OutputChainConfig,
}

/// Commands accepted by the device thread.
#[derive(Debug)]
enum DeviceCommand {
    Resume { reply: Sender<Result<()>> },
    Suspend { reply: Sender<Result<()>> },
    Shutdown,
}

/// What the device thread reports once the stream is built.
struct Opened {
    name: String,
    sample_rate: u32,
    channels: usize,
    sample_format: cpal::SampleFormat,
    mixer: Arc<Mutex<Mixer>>,
}

pub struct CpalOutput {
    name: String,
    sample_rate: u32,
    channels: usize,
    mixer: Arc<Mutex<Mixer>>,
    rendered_frames: Arc<AtomicU64>,
    rendering: Arc<AtomicBool>,
    cmd_tx: Sender<DeviceCommand>,
    events_rx: Receiver<DeviceState>,
    join: Option<thread::JoinHandle<()>>,
}

impl CpalOutput {
    /// Open the output device. The stream is built paused; nothing plays until
    /// [`OutputDevice::resume`].
    pub fn open(opts: CpalOutputOptions) -> Result<Self> {
        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded::<DeviceCommand>();
        let (events_tx, events_rx) = crossbeam_channel::unbounded::<DeviceState>();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<Opened>>(1);
        let rendered_frames = Arc::new(AtomicU64::new(0));
        let rendering = Arc::new(AtomicBool::new(false));

        let thread_frames = rendered_frames.clone();
        let thread_rendering = rendering.clone();
        let join = thread::Builder::new()
            .name("voice-output".into())
            .spawn(move || {
                device_thread(
                    opts,
                    thread_frames,
                    thread_rendering,
                    cmd_rx,
                    events_tx,
                    ready_tx,
                )
            })
            .context("spawn output thread")?;

        let opened = match ready_rx.recv() {
            Ok(result) => result?,
            Err(_) => return Err(anyhow!("output thread exited before opening the stream")),
        };
        tracing::info!(
            device = %opened.name,
            sample_rate = opened.sample_rate,
            channels = opened.channels,
            sample_format = ?opened.sample_format,
            "output stream ready (paused)"
        );

        Ok(Self {
            name: opened.name,
            sample_rate: opened.sample_rate,
            channels: opened.channels,
            mixer: opened.mixer,
            rendered_frames,
            rendering,
            cmd_tx,
            events_rx,
            join: Some(join),
        })
    }

    pub fn device_name(&self) -> &str {
        &self.name
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Rendering transitions and stream failures, in order.
    pub fn events(&self) -> Receiver<DeviceState> {
        self.events_rx.clone()
    }

    /// Pause the stream the way a platform would when backgrounding the app.
    pub fn suspend(&self) -> Result<()> {
        self.request(|reply| DeviceCommand::Suspend { reply })
    }

    fn request(&self, make: impl FnOnce(Sender<Result<()>>) -> DeviceCommand) -> Result<()> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.cmd_tx
            .send(make(reply_tx))
            .map_err(|_| anyhow!("output thread is gone"))?;
        reply_rx
            .recv_timeout(COMMAND_TIMEOUT)
            .map_err(|_| anyhow!("output thread did not answer"))?
    }

    fn mixer(&self) -> MutexGuard<'_, Mixer> {
        self.mixer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DeviceClock for CpalOutput {
    fn now(&self) -> f64 {
        self.rendered_frames.load(Ordering::Relaxed) as f64 / self.sample_rate.max(1) as f64
    }
}

impl OutputDevice for CpalOutput {
    fn is_rendering(&self) -> bool {
        self.rendering.load(Ordering::Relaxed)
    }

    fn resume(&self) -> Result<()> {
        self.request(|reply| DeviceCommand::Resume { reply })
    }

    fn prime(&self) -> Result<()> {
        let at = self.now();
        self.mixer()
            .add_voice(u64::MAX, Arc::from(Vec::<f32>::new()), 1, at, Envelope::new(at, 0.0, 0.0));
        tracing::debug!(at, "output primed");
        Ok(())
    }

    fn start_voice(&self, voice: ScheduledVoice) -> Result<()> {
        let chunk = &voice.chunk;
        let samples = resample::resample_chunk(chunk, self.sample_rate)?;
        self.mixer().add_voice(
            voice.id,
            samples,
            chunk.channels() as usize,
            voice.start,
            voice.envelope,
        );
        Ok(())
    }

    fn ramp_master_gain(&self, ramp: GainRamp) {
        self.mixer().ramp_master_gain(ramp);
    }

    fn cancel_voices(&self) {
        let cut = self.mixer().clear();
        tracing::debug!(cut, "voices cancelled");
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(DeviceCommand::Shutdown);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

fn open_stream(
    opts: &CpalOutputOptions,
    rendered_frames: Arc<AtomicU64>,
    rendering: Arc<AtomicBool>,
    events_tx: Sender<DeviceState>,
) -> Result<(cpal::Stream, Opened)> {
    let host = cpal::default_host();
    let device = device::pick_device(&host, opts.device.as_deref())?;
    let name = device
        .description()
        .map(|d| d.name().to_string())
        .unwrap_or_else(|_| "<unknown>".to_string());
    let config = device::pick_output_config(
        &device,
        Some(opts.sample_rate.unwrap_or(DEFAULT_OUTPUT_RATE)),
    )?;
    let mut stream_config: cpal::StreamConfig = config.clone().into();
    if let Some(buf) = device::pick_buffer_size(&config) {
        stream_config.buffer_size = buf;
    }

    let sample_rate = stream_config.sample_rate;
    let channels = stream_config.channels as usize;
    let mixer = Arc::new(Mutex::new(Mixer::new(&opts.chain, sample_rate, channels)));

    let handles = PlaybackHandles {
        mixer: mixer.clone(),
        rendered_frames,
    };
    let on_error = move |err: cpal::StreamError| {
        tracing::warn!("stream error: {err}");
        if rendering.swap(false, Ordering::Relaxed) {
            let _ = events_tx.send(DeviceState::Suspended);
        }
    };
    let stream = playback::build_output_stream(
        &device,
        &stream_config,
        config.sample_format(),
        handles,
        on_error,
    )
    .context("build output stream")?;
    if let Err(err) = stream.pause() {
        tracing::debug!("initial pause not supported: {err}");
    }

    Ok((
        stream,
        Opened {
            name,
            sample_rate,
            channels,
            sample_format: config.sample_format(),
            mixer,
        },
    ))
}

fn device_thread(
    opts: CpalOutputOptions,
    rendered_frames: Arc<AtomicU64>,
    rendering: Arc<AtomicBool>,
    cmd_rx: Receiver<DeviceCommand>,
    events_tx: Sender<DeviceState>,
    ready_tx: Sender<Result<Opened>>,
) {
    let stream = match open_stream(&opts, rendered_frames, rendering.clone(), events_tx.clone()) {
        Ok((stream, opened)) => {
            let _ = ready_tx.send(Ok(opened));
            stream
        }
        Err(err) => {
            let _ = ready_tx.send(Err(err));
            return;
        }
    };

    while let Ok(cmd) = cmd_rx.recv() {
        match cmd {
            DeviceCommand::Resume { reply } => {
                let result = stream.play().context("start output stream");
                if result.is_ok() && !rendering.swap(true, Ordering::Relaxed) {
                    tracing::info!("output rendering");
                    let _ = events_tx.send(DeviceState::Running);
                }
                let _ = reply.send(result);
            }
            DeviceCommand::Suspend { reply } => {
                let result = stream.pause().context("pause output stream");
                if result.is_ok() && rendering.swap(false, Ordering::Relaxed) {
                    tracing::info!("output suspended");
                    let _ = events_tx.send(DeviceState::Suspended);
                }
                let _ = reply.send(result);
            }
            DeviceCommand::Shutdown => break,
        }
    }

    let _ = stream.pause();
    tracing::debug!("output thread stopped");
}
