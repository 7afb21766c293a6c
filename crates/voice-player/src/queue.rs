//! FIFO of decoded chunks waiting to be placed on the timeline.
//!
//! Used both as the jitter buffer and as the holding area for chunks that arrive while the
//! device is not rendering. Ordering is strict arrival order; nothing is ever reordered,
//! skipped or duplicated.

use std::collections::VecDeque;

use crate::chunk::DecodedChunk;

#[derive(Debug, Default)]
pub struct ChunkQueue {
    chunks: VecDeque<DecodedChunk>,
    buffered_secs: f64,
}

impl ChunkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Total duration of queued audio in seconds.
    pub fn buffered_secs(&self) -> f64 {
        self.buffered_secs
    }

    pub fn push(&mut self, chunk: DecodedChunk) {
        self.buffered_secs += chunk.duration_secs();
        self.chunks.push_back(chunk);
    }

    pub fn pop(&mut self) -> Option<DecodedChunk> {
        let chunk = self.chunks.pop_front()?;
        self.buffered_secs = if self.chunks.is_empty() {
            0.0
        } else {
            (self.buffered_secs - chunk.duration_secs()).max(0.0)
        };
        Some(chunk)
    }

    /// Move every chunk of `other` to the tail of `self`, preserving order.
    pub fn append(&mut self, other: &mut ChunkQueue) {
        self.buffered_secs += other.buffered_secs;
        self.chunks.append(&mut other.chunks);
        other.buffered_secs = 0.0;
    }

    /// Discard everything, returning how many chunks were dropped.
    pub fn clear(&mut self) -> usize {
        let n = self.chunks.len();
        self.chunks.clear();
        self.buffered_secs = 0.0;
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(frames: usize) -> DecodedChunk {
        DecodedChunk::new(vec![0.0f32; frames], 1, 1_000)
    }

    #[test]
    fn pops_in_arrival_order() {
        let mut q = ChunkQueue::new();
        q.push(chunk(100));
        q.push(chunk(200));
        q.push(chunk(300));
        assert_eq!(q.pop().unwrap().frames(), 100);
        assert_eq!(q.pop().unwrap().frames(), 200);
        assert_eq!(q.pop().unwrap().frames(), 300);
        assert!(q.pop().is_none());
    }

    #[test]
    fn tracks_buffered_duration() {
        let mut q = ChunkQueue::new();
        q.push(chunk(250));
        q.push(chunk(500));
        assert!((q.buffered_secs() - 0.75).abs() < 1e-12);
        q.pop();
        assert!((q.buffered_secs() - 0.5).abs() < 1e-12);
        q.pop();
        assert_eq!(q.buffered_secs(), 0.0);
    }

    #[test]
    fn append_moves_all_chunks_in_order() {
        let mut q = ChunkQueue::new();
        let mut held = ChunkQueue::new();
        q.push(chunk(1));
        held.push(chunk(2));
        held.push(chunk(3));

        q.append(&mut held);
        assert!(held.is_empty());
        assert_eq!(held.buffered_secs(), 0.0);
        assert_eq!(q.len(), 3);
        let order: Vec<usize> = std::iter::from_fn(|| q.pop()).map(|c| c.frames()).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn clear_reports_dropped_count() {
        let mut q = ChunkQueue::new();
        q.push(chunk(10));
        q.push(chunk(10));
        assert_eq!(q.clear(), 2);
        assert!(q.is_empty());
        assert_eq!(q.buffered_secs(), 0.0);
    }
}
