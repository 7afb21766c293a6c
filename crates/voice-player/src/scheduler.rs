//! Timeline placement of chunks on the device clock.
//!
//! The scheduler owns the playback cursor: the instant at which everything already committed
//! will have finished. Each chunk starts at the cursor and the cursor then advances by the
//! chunk's duration minus its fade, so the next chunk begins inside the current chunk's
//! fade-out and the two crossfade instead of butting edge to edge.

use crate::envelope::Envelope;

/// Where a chunk landed on the timeline.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    pub start: f64,
    pub envelope: Envelope,
    /// Cursor value after this chunk.
    pub next_cursor: f64,
    /// The cursor had fallen behind the clock and was snapped forward.
    pub resynced: bool,
}

#[derive(Debug)]
pub struct Timeline {
    scheduled_until: f64,
    crossfade: f64,
    min_lead: f64,
    guard: f64,
}

impl Timeline {
    pub fn new(now: f64, crossfade: f64, min_lead: f64, guard: f64) -> Self {
        Self {
            scheduled_until: now,
            crossfade: crossfade.max(0.0),
            min_lead: min_lead.max(0.0),
            guard: guard.max(0.0),
        }
    }

    pub fn scheduled_until(&self) -> f64 {
        self.scheduled_until
    }

    /// Seconds of committed audio ahead of `now` (negative once the cursor is in the past).
    pub fn ahead_of(&self, now: f64) -> f64 {
        self.scheduled_until - now
    }

    /// Work out where a chunk of `duration` seconds would land. The cursor does not move
    /// until the placement is [`commit`](Self::commit)ted.
    pub fn plan(&self, duration: f64, now: f64) -> Placement {
        let resynced = self.scheduled_until < now + self.min_lead;
        let start = if resynced {
            now + self.guard
        } else {
            self.scheduled_until
        };
        let envelope = Envelope::new(start, duration, self.crossfade);
        // The fade is clamped to half the chunk, so this never moves the cursor backwards.
        let next_cursor = start + duration.max(0.0) - envelope.fade();

        Placement {
            start,
            envelope,
            next_cursor,
            resynced,
        }
    }

    /// Advance the cursor past a planned chunk.
    pub fn commit(&mut self, placement: &Placement) {
        self.scheduled_until = placement.next_cursor;
    }

    /// Drop everything committed and restart just ahead of `now`.
    pub fn reset(&mut self, now: f64) {
        self.scheduled_until = now + self.guard;
    }
}
