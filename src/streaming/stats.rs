//! Stream statistics snapshot

use super::frame_queue::FrameQueue;

/// Counters describing stream health
///
/// Overruns, underruns and dropped writes are expected under load and are
/// only ever reported here, never raised as errors.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StreamStats {
    /// Blocks handed to `play_samples` while running
    pub blocks_received: u64,
    /// Encoded frames accepted by the queue
    pub frames_queued: u64,
    /// Frames evicted by the drop-oldest policy
    pub overruns: u64,
    /// Consumer requests padded with silence
    pub underruns: u64,
    /// Frames a push-mode device refused
    pub dropped_writes: u64,
    /// Bytes delivered to the device (silence padding excluded)
    pub bytes_delivered: u64,
    /// Blocks dropped for a malformed length
    pub invalid_blocks: u64,
    /// Blocks dropped because conversion failed
    pub conversion_failures: u64,
    /// Frames currently queued
    pub queue_depth: usize,
    /// Queue depth as a fraction of its bound (0.0 to 1.0)
    pub fill_percentage: f32,
}

impl StreamStats {
    /// Fill the queue-owned counters from `queue`
    pub(crate) fn with_queue(mut self, queue: &FrameQueue) -> Self {
        self.frames_queued = queue.frames_pushed();
        self.overruns = queue.overruns();
        self.underruns = queue.underruns();
        self.dropped_writes = queue.dropped_writes();
        self.bytes_delivered = queue.bytes_delivered();
        self.queue_depth = queue.len();
        self.fill_percentage = queue.fill_percentage();
        self
    }
}
