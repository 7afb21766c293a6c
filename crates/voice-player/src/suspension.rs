//! Device rendering state machine and the holding area.
//!
//! ```text
//! Locked ──unlock──▶ Unlocking ──ok──▶ Running ◀──resume event── Suspended
//!   ▲                   │                 │                          ▲
//!   └──────failure──────┘                 └────suspend event─────────┘
//! ```
//!
//! Outside `Running` arriving chunks are parked in the holding area. Entering `Running` hands
//! the parked chunks back, oldest first, so the caller can append them to the jitter buffer.

use crate::chunk::DecodedChunk;
use crate::queue::ChunkQueue;
use crate::sink::DeviceState;

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardState {
    /// The device has not been unlocked by a user interaction yet.
    Locked,
    /// An unlock request is in flight.
    Unlocking,
    /// The device is rendering.
    Running,
    /// The platform paused the device after it had been running.
    Suspended,
}

/// What an `unlock()` call has to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnlockPlan {
    /// Already running: nothing to do.
    AlreadyRunning,
    /// Resume the device; prime it first when `prime` is set.
    Resume { prime: bool },
}

#[derive(Debug)]
pub struct SuspensionGuard {
    state: GuardState,
    /// State to fall back to if the in-flight unlock fails.
    fallback: GuardState,
    holding: ChunkQueue,
    prime_on_unlock: bool,
    primed: bool,
}

impl SuspensionGuard {
    pub fn new(prime_on_unlock: bool) -> Self {
        Self {
            state: GuardState::Locked,
            fallback: GuardState::Locked,
            holding: ChunkQueue::new(),
            prime_on_unlock,
            primed: false,
        }
    }

    pub fn state(&self) -> GuardState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == GuardState::Running
    }

    pub fn held(&self) -> usize {
        self.holding.len()
    }

    pub fn held_secs(&self) -> f64 {
        self.holding.buffered_secs()
    }

    /// Route an arriving chunk: returned when the device is running, parked otherwise.
    pub fn admit(&mut self, chunk: DecodedChunk) -> Option<DecodedChunk> {
        if self.is_running() {
            return Some(chunk);
        }
        self.holding.push(chunk);
        None
    }

    pub fn begin_unlock(&mut self) -> UnlockPlan {
        match self.state {
            GuardState::Running => UnlockPlan::AlreadyRunning,
            // A concurrent unlock is already priming; this one only retries the resume.
            GuardState::Unlocking => UnlockPlan::Resume { prime: false },
            previous => {
                self.fallback = previous;
                self.state = GuardState::Unlocking;
                let prime = self.prime_on_unlock && !self.primed;
                if prime {
                    self.primed = true;
                }
                UnlockPlan::Resume { prime }
            }
        }
    }

    /// The device confirmed it is rendering. Returns the parked chunks to flush.
    pub fn complete_unlock(&mut self) -> ChunkQueue {
        self.enter_running()
    }

    /// The unlock failed: fall back and keep everything parked.
    pub fn abort_unlock(&mut self, plan: UnlockPlan) {
        if let UnlockPlan::Resume { prime: true } = plan {
            self.primed = false;
        }
        if self.state == GuardState::Unlocking {
            self.state = self.fallback;
        }
    }

    /// Apply a device notification. Returns parked chunks when it resumed rendering.
    pub fn on_device_state(&mut self, device: DeviceState) -> Option<ChunkQueue> {
        match (self.state, device) {
            (GuardState::Running, DeviceState::Running) => None,
            (_, DeviceState::Running) => Some(self.enter_running()),
            (GuardState::Running, DeviceState::Suspended) => {
                self.state = GuardState::Suspended;
                None
            }
            (GuardState::Unlocking, DeviceState::Suspended) => {
                self.fallback = GuardState::Suspended;
                None
            }
            (_, DeviceState::Suspended) => None,
        }
    }

    /// Drop everything parked, returning how many chunks were discarded.
    pub fn clear(&mut self) -> usize {
        self.holding.clear()
    }

    fn enter_running(&mut self) -> ChunkQueue {
        if self.state == GuardState::Running {
            return ChunkQueue::new();
        }
        self.state = GuardState::Running;
        std::mem::take(&mut self.holding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(frames: usize) -> DecodedChunk {
        DecodedChunk::new(vec![0.0f32; frames], 1, 1_000)
    }

    #[test]
    fn starts_locked_and_parks_chunks() {
        let mut g = SuspensionGuard::new(false);
        assert_eq!(g.state(), GuardState::Locked);
        assert!(g.admit(chunk(10)).is_none());
        assert_eq!(g.held(), 1);
    }

    #[test]
    fn unlock_flushes_in_arrival_order() {
        let mut g = SuspensionGuard::new(false);
        g.admit(chunk(1));
        g.admit(chunk(2));
        assert_eq!(g.begin_unlock(), UnlockPlan::Resume { prime: false });
        assert_eq!(g.state(), GuardState::Unlocking);
        assert!(g.admit(chunk(3)).is_none());

        let mut flushed = g.complete_unlock();
        assert!(g.is_running());
        assert_eq!(g.held(), 0);
        let order: Vec<usize> = std::iter::from_fn(|| flushed.pop()).map(|c| c.frames()).collect();
        assert_eq!(order, vec![1, 2, 3]);
        assert!(g.admit(chunk(4)).is_some());
    }

    #[test]
    fn failed_unlock_falls_back_and_keeps_chunks() {
        let mut g = SuspensionGuard::new(true);
        g.admit(chunk(1));
        let plan = g.begin_unlock();
        assert_eq!(plan, UnlockPlan::Resume { prime: true });
        g.abort_unlock(plan);
        assert_eq!(g.state(), GuardState::Locked);
        assert_eq!(g.held(), 1);
        // Priming is attempted again on the next try.
        assert_eq!(g.begin_unlock(), UnlockPlan::Resume { prime: true });
    }

    #[test]
    fn primes_only_once() {
        let mut g = SuspensionGuard::new(true);
        assert_eq!(g.begin_unlock(), UnlockPlan::Resume { prime: true });
        g.complete_unlock();
        assert_eq!(g.begin_unlock(), UnlockPlan::AlreadyRunning);
        g.on_device_state(DeviceState::Suspended);
        assert_eq!(g.begin_unlock(), UnlockPlan::Resume { prime: false });
    }

    #[test]
    fn suspend_and_resume_events() {
        let mut g = SuspensionGuard::new(false);
        g.begin_unlock();
        g.complete_unlock();

        assert!(g.on_device_state(DeviceState::Suspended).is_none());
        assert_eq!(g.state(), GuardState::Suspended);
        assert!(g.admit(chunk(7)).is_none());

        let flushed = g.on_device_state(DeviceState::Running).unwrap();
        assert_eq!(flushed.len(), 1);
        assert!(g.is_running());
        assert!(g.on_device_state(DeviceState::Running).is_none());
    }

    #[test]
    fn suspend_while_locked_stays_locked() {
        let mut g = SuspensionGuard::new(false);
        g.on_device_state(DeviceState::Suspended);
        assert_eq!(g.state(), GuardState::Locked);
    }

    #[test]
    fn suspend_during_unlock_changes_fallback() {
        let mut g = SuspensionGuard::new(false);
        g.begin_unlock();
        g.complete_unlock();
        g.on_device_state(DeviceState::Suspended);
        let plan = g.begin_unlock();
        g.abort_unlock(plan);
        assert_eq!(g.state(), GuardState::Suspended);
    }

    #[test]
    fn clear_discards_parked_chunks() {
        let mut g = SuspensionGuard::new(false);
        g.admit(chunk(1));
        g.admit(chunk(1));
        assert_eq!(g.clear(), 2);
        assert_eq!(g.held(), 0);
    }
}
