//! Thread-safe engine handle and the host heartbeat.
//!
//! [`SharedEngine`] serializes every queue/cursor mutation behind one mutex. The only slow
//! operation, resuming the device in `unlock()`, runs with the lock released so producers can
//! keep enqueueing (their chunks go to the holding area until the resume lands).

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

use crate::chunk::DecodedChunk;
use crate::config::EngineConfig;
use crate::engine::{Admission, Engine, EngineError, resume_device};
use crate::sink::{DeviceState, OutputDevice};
use crate::status::EngineStatus;
use crate::suspension::UnlockPlan;

pub struct SharedEngine<D: OutputDevice> {
    inner: Arc<Mutex<Engine<D>>>,
    device: Arc<D>,
}

impl<D: OutputDevice> Clone for SharedEngine<D> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            device: self.device.clone(),
        }
    }
}

impl<D: OutputDevice> SharedEngine<D> {
    pub fn new(cfg: EngineConfig, device: Arc<D>) -> Self {
        Self::from_engine(Engine::new(cfg, device))
    }

    pub fn from_engine(engine: Engine<D>) -> Self {
        let device = engine.device().clone();
        Self {
            inner: Arc::new(Mutex::new(engine)),
            device,
        }
    }

    /// Lock the engine, recovering from poisoning.
    pub fn lock(&self) -> MutexGuard<'_, Engine<D>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn enqueue(&self, chunk: DecodedChunk) -> Admission {
        self.lock().enqueue(chunk)
    }

    pub fn tick(&self) {
        self.lock().tick();
    }

    pub fn unlock(&self) -> Result<(), EngineError> {
        let plan = self.lock().begin_unlock();
        if plan == UnlockPlan::AlreadyRunning {
            return Ok(());
        }
        let result = resume_device(self.device.as_ref(), plan);
        self.lock().finish_unlock(plan, result)
    }

    pub fn on_device_state(&self, state: DeviceState) {
        self.lock().on_device_state(state);
    }

    pub fn set_target_buffer(&self, secs: f64) -> f64 {
        self.lock().set_target_buffer(secs)
    }

    pub fn stop(&self) {
        self.lock().stop();
    }

    pub fn status(&self) -> EngineStatus {
        self.lock().status()
    }
}

/// Background heartbeat: calls `tick()` every `interval` and forwards device events.
///
/// Dropping the handle stops and joins the thread.
pub struct Ticker {
    stop_tx: Option<Sender<()>>,
    join: Option<thread::JoinHandle<()>>,
}

pub fn spawn_ticker<D: OutputDevice + 'static>(
    engine: SharedEngine<D>,
    interval: Duration,
    events: Option<Receiver<DeviceState>>,
) -> Ticker {
    let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
    let join = thread::spawn(move || {
        let ticks = crossbeam_channel::tick(interval);
        let never = crossbeam_channel::never();
        let events = events.unwrap_or_else(crossbeam_channel::never);
        let mut events_open = true;

        loop {
            let events_rx = if events_open { &events } else { &never };
            crossbeam_channel::select! {
                recv(stop_rx) -> _ => break,
                recv(ticks) -> _ => engine.tick(),
                recv(events_rx) -> event => match event {
                    Ok(state) => engine.on_device_state(state),
                    Err(_) => {
                        tracing::debug!("device event channel closed");
                        events_open = false;
                    }
                },
            }
        }
        tracing::debug!("ticker stopped");
    });

    Ticker {
        stop_tx: Some(stop_tx),
        join: Some(join),
    }
}

impl Ticker {
    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}
