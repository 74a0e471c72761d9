//! Streaming between the emulation loop and the audio device
//!
//! This module holds the bounded frame queue shared by producer and consumer,
//! the sink adapters that drain it, and the statistics they report.

pub mod frame_queue;
pub mod sink;
pub mod stats;

pub use frame_queue::{FrameQueue, PullReport, PushOutcome};
pub use sink::{PullCallback, PullSink, PushSink, PushWriter, SinkAdapter, SinkMode, WriteError};
pub use stats::StreamStats;

/// Default sample rate when neither config nor producer provides one (44.1 kHz)
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Default queue bound in frames (~250ms at 60 frames per second)
pub const DEFAULT_MAX_QUEUE_DEPTH: usize = 15;

/// Longest the writer thread idles on an empty queue before rechecking for
/// shutdown, in milliseconds
pub const WRITER_IDLE_WAIT_MILLIS: u64 = 5;

/// Longest a pull callback waits for the queue lock, in microseconds
pub const PULL_LOCK_TIMEOUT_MICROS: u64 = 200;

/// Added latency of a full queue, in milliseconds
///
/// `frame_rate` is the producer cadence (blocks per second).
pub fn queue_latency_ms(max_depth: usize, frame_rate: f32) -> f32 {
    (max_depth as f32 / frame_rate) * 1000.0
}
