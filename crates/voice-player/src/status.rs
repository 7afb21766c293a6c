use serde::Serialize;

use crate::suspension::GuardState;

/// Running totals kept by the engine.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct EngineCounters {
    /// Chunks committed to the device timeline.
    pub chunks_scheduled: u64,
    /// Chunks refused at the enqueue boundary.
    pub chunks_rejected: u64,
    /// Chunks discarded by `stop()` (queued and held).
    pub chunks_discarded: u64,
    /// Chunks the device could not take; the next chunk reuses their slot.
    pub chunks_failed: u64,
    /// Times the committed audio ran out with nothing queued.
    pub underruns: u64,
    /// Times the cursor had fallen behind the device clock and was snapped forward.
    pub resyncs: u64,
}

/// Point-in-time view of the engine, for logs and diagnostics.
#[derive(Clone, Debug, Serialize)]
pub struct EngineStatus {
    pub state: GuardState,
    /// Device clock at the time of the snapshot (seconds).
    pub now: f64,
    /// Playback cursor (seconds).
    pub scheduled_until: f64,
    /// Committed audio ahead of the device clock; zero once it has all played.
    pub buffered_ahead_secs: f64,
    pub target_buffer_secs: f64,
    pub queued_chunks: usize,
    pub queued_secs: f64,
    pub held_chunks: usize,
    pub held_secs: f64,
    /// Last gain requested by the loudness normalizer.
    pub master_gain_target: Option<f32>,
    #[serde(flatten)]
    pub counters: EngineCounters,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_with_flat_counters() {
        let status = EngineStatus {
            state: GuardState::Running,
            now: 1.0,
            scheduled_until: 1.35,
            buffered_ahead_secs: 0.35,
            target_buffer_secs: 0.35,
            queued_chunks: 2,
            queued_secs: 0.8,
            held_chunks: 0,
            held_secs: 0.0,
            master_gain_target: Some(1.25),
            counters: EngineCounters {
                chunks_scheduled: 4,
                ..Default::default()
            },
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "running");
        assert_eq!(json["chunks_scheduled"], 4);
        assert_eq!(json["queued_chunks"], 2);
    }
}
