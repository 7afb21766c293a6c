//! The scheduling engine.
//!
//! One [`Engine`] owns one playback timeline:
//! - arriving chunks pass the suspension guard (or wait in its holding area)
//! - the jitter buffer holds them until the cursor is less than the target lookahead ahead
//! - the timeline places each one with a crossfade overlap and hands it to the device
//! - the loudness normalizer steers the master gain per chunk
//!
//! All methods take `&mut self`; wrap the engine in [`crate::shared::SharedEngine`] when
//! `enqueue`, `tick` and device events come from different threads.

use std::sync::Arc;

use thiserror::Error;

use crate::chain::GainRamp;
use crate::chunk::{ChunkError, DecodedChunk};
use crate::config::{EngineConfig, clamp_target_buffer};
use crate::loudness::LoudnessNormalizer;
use crate::queue::ChunkQueue;
use crate::scheduler::Timeline;
use crate::sink::{DeviceState, OutputDevice, ScheduledVoice};
use crate::status::{EngineCounters, EngineStatus};
use crate::suspension::{GuardState, SuspensionGuard, UnlockPlan};

/// Recoverable device-level failures.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The device refused to start rendering. Held audio is kept for the next attempt.
    #[error("device unlock failed: {0:#}")]
    Unlock(anyhow::Error),
}

/// Where an enqueued chunk went.
#[derive(Clone, Debug, PartialEq)]
pub enum Admission {
    /// Appended to the jitter buffer (and possibly scheduled right away).
    Queued,
    /// Parked until the device renders again.
    Held,
    /// Malformed; dropped without touching the timeline.
    Rejected(ChunkError),
}

pub struct Engine<D: OutputDevice> {
    cfg: EngineConfig,
    device: Arc<D>,
    timeline: Timeline,
    queue: ChunkQueue,
    guard: SuspensionGuard,
    loudness: LoudnessNormalizer,
    target_buffer_secs: f64,
    next_voice_id: u64,
    counters: EngineCounters,
    /// Chunks scheduled since construction or the last `stop()`.
    scheduled_since_reset: u64,
    /// The current stall has already been counted.
    starved: bool,
    last_gain: Option<f32>,
}

impl<D: OutputDevice> Engine<D> {
    pub fn new(cfg: EngineConfig, device: Arc<D>) -> Self {
        let cfg = cfg.sanitized();
        let now = device.now();
        tracing::debug!(
            target_buffer_secs = cfg.target_buffer_secs,
            crossfade_secs = cfg.crossfade_secs,
            prime_on_unlock = cfg.prime_on_unlock,
            "engine created"
        );
        Self {
            timeline: Timeline::new(now, cfg.crossfade_secs, cfg.min_lead_secs, cfg.guard_secs),
            queue: ChunkQueue::new(),
            guard: SuspensionGuard::new(cfg.prime_on_unlock),
            loudness: LoudnessNormalizer::new(cfg.loudness.clone()),
            target_buffer_secs: cfg.target_buffer_secs,
            next_voice_id: 0,
            counters: EngineCounters::default(),
            scheduled_since_reset: 0,
            starved: false,
            last_gain: None,
            device,
            cfg,
        }
    }

    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    pub fn state(&self) -> GuardState {
        self.guard.state()
    }

    pub fn scheduled_until(&self) -> f64 {
        self.timeline.scheduled_until()
    }

    pub fn target_buffer_secs(&self) -> f64 {
        self.target_buffer_secs
    }

    /// Chunks in the jitter buffer.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Chunks in the holding area.
    pub fn held(&self) -> usize {
        self.guard.held()
    }

    pub fn counters(&self) -> EngineCounters {
        self.counters
    }

    /// Accept a chunk in playback order.
    pub fn enqueue(&mut self, chunk: DecodedChunk) -> Admission {
        if let Err(err) = chunk.validate() {
            self.counters.chunks_rejected += 1;
            tracing::warn!(error = %err, "rejected malformed chunk");
            return Admission::Rejected(err);
        }

        match self.guard.admit(chunk) {
            Some(chunk) => {
                self.queue.push(chunk);
                self.drain();
                Admission::Queued
            }
            None => {
                tracing::debug!(
                    state = ?self.guard.state(),
                    held = self.guard.held(),
                    "device not rendering; chunk held"
                );
                Admission::Held
            }
        }
    }

    /// Schedule queued chunks until the lookahead is met or the queue is empty.
    ///
    /// Returns how many chunks were scheduled.
    pub fn drain(&mut self) -> usize {
        if !self.guard.is_running() {
            return 0;
        }

        let mut scheduled = 0;
        loop {
            let now = self.device.now();
            if self.timeline.ahead_of(now) >= self.target_buffer_secs {
                break;
            }
            let Some(chunk) = self.queue.pop() else {
                self.note_starvation(now);
                break;
            };
            if self.schedule(chunk, now) {
                scheduled += 1;
            }
        }
        scheduled
    }

    /// Heartbeat from the host; keeps draining when no new chunks arrive.
    pub fn tick(&mut self) {
        self.drain();
    }

    /// Start rendering after a user interaction. Idempotent.
    pub fn unlock(&mut self) -> Result<(), EngineError> {
        let plan = self.begin_unlock();
        if plan == UnlockPlan::AlreadyRunning {
            return Ok(());
        }
        let result = resume_device(self.device.as_ref(), plan);
        self.finish_unlock(plan, result)
    }

    pub(crate) fn begin_unlock(&mut self) -> UnlockPlan {
        self.guard.begin_unlock()
    }

    pub(crate) fn finish_unlock(
        &mut self,
        plan: UnlockPlan,
        result: anyhow::Result<()>,
    ) -> Result<(), EngineError> {
        match result {
            Ok(()) => {
                let was_running = self.guard.is_running();
                let mut held = self.guard.complete_unlock();
                if !was_running {
                    tracing::info!(flushed = held.len(), "device unlocked");
                }
                self.starved = false;
                self.queue.append(&mut held);
                self.drain();
                Ok(())
            }
            Err(err) => {
                self.guard.abort_unlock(plan);
                tracing::warn!(
                    error = %format!("{err:#}"),
                    state = ?self.guard.state(),
                    held = self.guard.held(),
                    "device unlock failed"
                );
                Err(EngineError::Unlock(err))
            }
        }
    }

    /// Apply a rendering-state notification from the device or host.
    pub fn on_device_state(&mut self, state: DeviceState) {
        let before = self.guard.state();
        match self.guard.on_device_state(state) {
            Some(mut held) => {
                tracing::info!(from = ?before, flushed = held.len(), "device rendering");
                self.starved = false;
                self.queue.append(&mut held);
                self.drain();
            }
            None => {
                if before != self.guard.state() {
                    tracing::info!(
                        from = ?before,
                        to = ?self.guard.state(),
                        "device state changed"
                    );
                }
            }
        }
    }

    /// Change the lookahead target. Returns the clamped value in effect.
    pub fn set_target_buffer(&mut self, secs: f64) -> f64 {
        self.target_buffer_secs = clamp_target_buffer(secs);
        tracing::info!(target_buffer_secs = self.target_buffer_secs, "jitter buffer target set");
        self.drain();
        self.target_buffer_secs
    }

    /// Discard all unplayed audio and reset the cursor just ahead of now.
    ///
    /// The output chain stays in place for the next utterance.
    pub fn stop(&mut self) {
        let now = self.device.now();
        let queued = self.queue.clear();
        let held = self.guard.clear();
        self.device.cancel_voices();
        self.timeline.reset(now);
        self.loudness.reset();
        self.counters.chunks_discarded += (queued + held) as u64;
        self.scheduled_since_reset = 0;
        self.starved = false;
        tracing::info!(queued, held, "playback stopped");
    }

    pub fn status(&self) -> EngineStatus {
        let now = self.device.now();
        EngineStatus {
            state: self.guard.state(),
            now,
            scheduled_until: self.timeline.scheduled_until(),
            buffered_ahead_secs: self.timeline.ahead_of(now).max(0.0),
            target_buffer_secs: self.target_buffer_secs,
            queued_chunks: self.queue.len(),
            queued_secs: self.queue.buffered_secs(),
            held_chunks: self.guard.held(),
            held_secs: self.guard.held_secs(),
            master_gain_target: self.last_gain,
            counters: self.counters,
        }
    }

    /// Commit one chunk to the device. Returns `false` if the device refused it, in which case
    /// the cursor has not moved.
    fn schedule(&mut self, chunk: DecodedChunk, now: f64) -> bool {
        let placement = self.timeline.plan(chunk.duration_secs(), now);
        let id = self.next_voice_id;
        if let Err(err) = self.device.start_voice(ScheduledVoice {
            id,
            chunk: chunk.clone(),
            start: placement.start,
            envelope: placement.envelope,
        }) {
            self.counters.chunks_failed += 1;
            tracing::warn!(id, error = %format!("{err:#}"), "device refused chunk; slot reused");
            return false;
        }
        self.next_voice_id += 1;
        self.timeline.commit(&placement);

        if placement.resynced && self.scheduled_since_reset > 0 && !self.starved {
            self.counters.resyncs += 1;
            tracing::debug!(
                now,
                start = placement.start,
                "cursor fell behind device clock; resynced"
            );
        }
        if let Some(gain) = self.loudness.observe(&chunk) {
            self.device.ramp_master_gain(GainRamp {
                target: gain,
                at: now,
                time_constant: self.cfg.loudness.time_constant_secs,
            });
            self.last_gain = Some(gain);
        }

        tracing::debug!(
            id,
            start = placement.start,
            duration = chunk.duration_secs(),
            fade = placement.envelope.fade(),
            next_cursor = placement.next_cursor,
            "chunk scheduled"
        );
        self.counters.chunks_scheduled += 1;
        self.scheduled_since_reset += 1;
        self.starved = false;
        true
    }

    fn note_starvation(&mut self, now: f64) {
        if self.starved || self.scheduled_since_reset == 0 {
            return;
        }
        if self.timeline.ahead_of(now) <= 0.0 {
            self.starved = true;
            self.counters.underruns += 1;
            tracing::debug!(
                now,
                scheduled_until = self.timeline.scheduled_until(),
                "jitter buffer underrun"
            );
        }
    }
}

/// Bring the device to a rendering state for `plan`.
///
/// Runs without any engine borrow so a shared engine can keep accepting chunks meanwhile.
pub(crate) fn resume_device<D: OutputDevice + ?Sized>(
    device: &D,
    plan: UnlockPlan,
) -> anyhow::Result<()> {
    let UnlockPlan::Resume { prime } = plan else {
        return Ok(());
    };
    if !device.is_rendering() {
        device.resume()?;
    }
    if prime {
        device.prime()?;
    }
    Ok(())
}
