//! `voice-play` command implementations.
//!
//! `play` wires the pieces together the way a speech client would:
//! - a producer thread feeds decoded chunks with random arrival jitter
//! - a ticker thread drives the engine heartbeat and forwards device events
//! - an optional thread pauses the device to simulate a platform suspension
//! - the main thread reports status until the timeline has played out or Ctrl-C arrives

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use rand::Rng;
use voice_player::decode::{self, DecodedAudio};
use voice_player::device;
use voice_player::{
    Admission, CpalOutput, CpalOutputOptions, DecodedChunk, DeviceClock, SharedEngine,
    spawn_ticker,
};

use crate::cli::PlayArgs;
use crate::config::PlayerConfig;

const TICK_INTERVAL: Duration = Duration::from_millis(10);
const POLL_INTERVAL: Duration = Duration::from_millis(50);
const STATUS_EVERY: Duration = Duration::from_secs(1);

/// Print output devices of the default host.
pub fn run_devices(json: bool) -> Result<()> {
    let host = cpal::default_host();
    let devices = device::list_devices(&host)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }
    for d in devices {
        let marker = if d.is_default { " (default)" } else { "" };
        match (d.default_rate, d.default_channels) {
            (Some(rate), Some(ch)) => {
                println!("#{}: {}{marker} [{rate} Hz, {ch} ch]", d.index, d.name)
            }
            _ => println!("#{}: {}{marker}", d.index, d.name),
        }
    }
    Ok(())
}

pub fn run_play(args: &PlayArgs) -> Result<()> {
    let cfg = PlayerConfig::resolve(args)?;

    let audio = decode::decode_file(&args.path).context("decode input")?;
    let chunks = cut_chunks(&audio, args.min_chunk_ms, args.max_chunk_ms);
    tracing::info!(chunks = chunks.len(), "source split into chunks");

    let output = Arc::new(CpalOutput::open(CpalOutputOptions {
        device: cfg.device.clone(),
        sample_rate: cfg.sample_rate,
        chain: cfg.engine.output.clone(),
    })?);
    tracing::info!(
        device = %output.device_name(),
        sample_rate = output.sample_rate(),
        channels = output.channels(),
        "output device"
    );

    let engine = SharedEngine::new(cfg.engine.clone(), output.clone());
    let ticker = spawn_ticker(engine.clone(), TICK_INTERVAL, Some(output.events()));

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        let engine = engine.clone();
        let _ = ctrlc::set_handler(move || {
            if !stop.swap(true, Ordering::SeqCst) {
                tracing::info!("interrupted; stopping playback");
                engine.stop();
            }
        });
    }

    // Stands in for the first user gesture.
    if let Err(err) = engine.unlock() {
        tracing::warn!("{err}");
    }

    let producer_done = Arc::new(AtomicBool::new(false));
    let producer = spawn_producer(
        engine.clone(),
        chunks,
        args.jitter_ms,
        stop.clone(),
        producer_done.clone(),
    );

    let suspender = args.suspend_after.map(|after| {
        spawn_suspender(
            engine.clone(),
            output.clone(),
            Duration::from_secs_f64(after.max(0.0)),
            Duration::from_secs_f64(args.suspend_for.max(0.0)),
            stop.clone(),
        )
    });

    let mut last_report = Instant::now();
    loop {
        thread::sleep(POLL_INTERVAL);
        if stop.load(Ordering::SeqCst) {
            break;
        }
        let status = engine.status();
        if last_report.elapsed() >= STATUS_EVERY {
            last_report = Instant::now();
            tracing::info!(
                state = ?status.state,
                now = status.now,
                ahead = status.buffered_ahead_secs,
                queued = status.queued_chunks,
                held = status.held_chunks,
                underruns = status.counters.underruns,
                "status"
            );
        }
        let drained = status.queued_chunks == 0 && status.held_chunks == 0;
        if producer_done.load(Ordering::SeqCst) && drained && output.now() >= status.scheduled_until
        {
            tracing::info!("playback finished");
            break;
        }
    }

    stop.store(true, Ordering::SeqCst);
    let _ = producer.join();
    if let Some(suspender) = suspender {
        let _ = suspender.join();
    }
    ticker.stop();

    println!("{}", serde_json::to_string_pretty(&engine.status())?);
    Ok(())
}

/// Cut `audio` into chunks with lengths drawn uniformly from `[min_ms, max_ms]`.
fn cut_chunks(audio: &DecodedAudio, min_ms: u32, max_ms: u32) -> Vec<DecodedChunk> {
    let (lo, hi) = chunk_bounds(min_ms, max_ms);
    let mut rng = rand::thread_rng();
    decode::split_into_chunks(audio, || rng.gen_range(lo..=hi))
}

fn chunk_bounds(min_ms: u32, max_ms: u32) -> (u32, u32) {
    let lo = min_ms.max(1);
    (lo, max_ms.max(lo))
}

fn spawn_producer(
    engine: SharedEngine<CpalOutput>,
    chunks: Vec<DecodedChunk>,
    jitter_ms: u64,
    stop: Arc<AtomicBool>,
    done: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut rng = rand::thread_rng();
        for (i, chunk) in chunks.into_iter().enumerate() {
            if stop.load(Ordering::SeqCst) {
                break;
            }
            if jitter_ms > 0 {
                thread::sleep(Duration::from_millis(rng.gen_range(0..=jitter_ms)));
            }
            if let Admission::Rejected(err) = engine.enqueue(chunk) {
                tracing::warn!(index = i, error = %err, "chunk rejected");
            }
        }
        done.store(true, Ordering::SeqCst);
        tracing::debug!("producer finished");
    })
}

fn spawn_suspender(
    engine: SharedEngine<CpalOutput>,
    output: Arc<CpalOutput>,
    after: Duration,
    hold: Duration,
    stop: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        if !sleep_unless_stopped(after, &stop) {
            return;
        }
        tracing::info!(secs = hold.as_secs_f64(), "simulating platform suspension");
        if let Err(err) = output.suspend() {
            tracing::warn!("suspend failed: {err:#}");
            return;
        }
        if !sleep_unless_stopped(hold, &stop) {
            return;
        }
        tracing::info!("simulating resume");
        if let Err(err) = engine.unlock() {
            tracing::warn!("{err}");
        }
    })
}

/// Sleep in small steps. Returns `false` if `stop` was raised meanwhile.
fn sleep_unless_stopped(total: Duration, stop: &AtomicBool) -> bool {
    let deadline = Instant::now() + total;
    while Instant::now() < deadline {
        if stop.load(Ordering::SeqCst) {
            return false;
        }
        thread::sleep(POLL_INTERVAL.min(deadline.saturating_duration_since(Instant::now())));
    }
    !stop.load(Ordering::SeqCst)
}
