//! Sink adapters: push-mode writer thread and pull-mode callback
//!
//! A backend exposes its device in one of two shapes:
//! - [`PushSink`]: a non-blocking `write` that may refuse data when the
//!   device buffer is full. A [`PushWriter`] thread drains the frame queue
//!   into it.
//! - [`PullSink`]: the device runs its own clock and asks for bytes through a
//!   [`PullCallback`], which reads the frame queue without ever blocking.

use super::frame_queue::{FrameQueue, PullReport};
use super::{PULL_LOCK_TIMEOUT_MICROS, WRITER_IDLE_WAIT_MILLIS};
use crate::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

/// Why a push-mode write did not complete
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum WriteError {
    /// Device buffer is full; the frame is discarded
    #[error("device buffer full")]
    WouldBlock,
    /// Device rejected the write
    #[error("write failed: {0}")]
    Failed(String),
}

/// Device accepting encoded bytes through a non-blocking write
pub trait PushSink: Send {
    /// Hand one frame to the device without blocking
    fn write(&mut self, bytes: &[u8]) -> std::result::Result<(), WriteError>;

    /// Release the device; called once from the writer thread on shutdown
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Device that pulls bytes on its own clock
pub trait PullSink {
    /// Register the callback and start the device clock
    fn start(&mut self, callback: PullCallback) -> Result<()>;

    /// Apply post-mix gain in [0, 1], if the device supports it
    fn set_volume(&mut self, _volume: f32) {}

    /// Unregister the callback and stop the device
    fn stop(&mut self);
}

/// Device shape returned by a backend when it opens
pub enum SinkMode {
    /// Non-blocking write device
    Push(Box<dyn PushSink>),
    /// Callback-driven device
    Pull(Box<dyn PullSink>),
}

impl std::fmt::Debug for SinkMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkMode::Push(_) => f.write_str("SinkMode::Push"),
            SinkMode::Pull(_) => f.write_str("SinkMode::Pull"),
        }
    }
}

/// Handle given to pull sinks for fetching audio
///
/// `fill` is safe to call from a realtime thread: it copies from memory
/// only, bounds its wait on the queue lock, and never panics. Anything it
/// cannot serve becomes silence plus an underrun.
#[derive(Debug, Clone)]
pub struct PullCallback {
    queue: Arc<FrameQueue>,
    bytes_per_frame: usize,
}

impl PullCallback {
    /// Callback reading from `queue`, with `bytes_per_frame` bytes per sample frame
    pub fn new(queue: Arc<FrameQueue>, bytes_per_frame: usize) -> Self {
        Self {
            queue,
            bytes_per_frame,
        }
    }

    /// Bytes needed to serve `frame_count` sample frames
    pub fn bytes_for(&self, frame_count: usize) -> usize {
        frame_count * self.bytes_per_frame
    }

    /// Bytes per sample frame in the negotiated format
    pub fn bytes_per_frame(&self) -> usize {
        self.bytes_per_frame
    }

    /// Fill `out` completely with queued audio or silence
    pub fn fill(&self, out: &mut [u8]) -> PullReport {
        self.queue
            .try_pull_into(out, Duration::from_micros(PULL_LOCK_TIMEOUT_MICROS))
    }
}

/// Background thread draining the frame queue into a [`PushSink`]
///
/// Frames the sink refuses are counted as dropped writes and discarded;
/// a write is never retried. An empty queue parks the thread until the next
/// push, close or idle timeout.
pub struct PushWriter {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PushWriter {
    /// Start the writer thread
    pub fn spawn(mut sink: Box<dyn PushSink>, queue: Arc<FrameQueue>) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);

        let handle = std::thread::Builder::new()
            .name("pcm-bridge-writer".into())
            .spawn(move || {
                let idle = Duration::from_millis(WRITER_IDLE_WAIT_MILLIS);
                while flag.load(Ordering::Acquire) {
                    if let Some(frame) = queue.pop_frame_timeout(idle) {
                        if sink.write(frame.as_bytes()).is_err() {
                            queue.record_dropped_write();
                        }
                    }
                }
                if let Err(err) = sink.close() {
                    warn!("Failed to close push sink: {err}");
                }
                debug!("Push writer stopped");
            })?;

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    /// Whether the thread is still draining
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stop the thread and wait for it to release the sink
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Push writer thread panicked");
            }
        }
    }
}

impl Drop for PushWriter {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Running sink, whichever shape the backend provided
pub enum SinkAdapter {
    /// Writer thread feeding a push device
    Push(PushWriter),
    /// Callback device
    Pull(Box<dyn PullSink>),
}

impl SinkAdapter {
    /// Start consuming `queue` through the given sink
    pub fn start(mode: SinkMode, queue: Arc<FrameQueue>, bytes_per_frame: usize) -> Result<Self> {
        match mode {
            SinkMode::Push(sink) => Ok(SinkAdapter::Push(PushWriter::spawn(sink, queue)?)),
            SinkMode::Pull(mut sink) => {
                sink.start(PullCallback::new(queue, bytes_per_frame))?;
                Ok(SinkAdapter::Pull(sink))
            }
        }
    }

    /// Forward a volume change to the device
    pub fn set_volume(&mut self, volume: f32) {
        if let SinkAdapter::Pull(sink) = self {
            sink.set_volume(volume);
        }
    }

    /// Stop the consumer; no queue access happens from it afterwards
    pub fn stop(&mut self) {
        match self {
            SinkAdapter::Push(writer) => writer.stop(),
            SinkAdapter::Pull(sink) => sink.stop(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::EncodedFrame;
    use parking_lot::Mutex;
    use std::time::Instant;

    struct CollectSink {
        written: Arc<Mutex<Vec<u8>>>,
        refuse_every: Option<usize>,
        calls: usize,
        closed: Arc<AtomicBool>,
    }

    impl PushSink for CollectSink {
        fn write(&mut self, bytes: &[u8]) -> std::result::Result<(), WriteError> {
            self.calls += 1;
            if let Some(n) = self.refuse_every {
                if self.calls % n == 0 {
                    return Err(WriteError::WouldBlock);
                }
            }
            self.written.lock().extend_from_slice(bytes);
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            self.closed.store(true, Ordering::Release);
            Ok(())
        }
    }

    fn wait_until(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_push_writer_delivers_in_order() {
        let queue = Arc::new(FrameQueue::new(16));
        let written = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let sink = CollectSink {
            written: Arc::clone(&written),
            refuse_every: None,
            calls: 0,
            closed: Arc::clone(&closed),
        };

        let mut writer = PushWriter::spawn(Box::new(sink), Arc::clone(&queue)).unwrap();
        for tag in 1..=8u8 {
            queue.push(EncodedFrame::from_bytes(vec![tag; 4]));
        }
        wait_until(|| written.lock().len() == 32);
        writer.stop();

        let expected: Vec<u8> = (1..=8u8).flat_map(|t| [t; 4]).collect();
        assert_eq!(*written.lock(), expected);
        assert!(closed.load(Ordering::Acquire));
        assert!(!writer.is_running());
        assert_eq!(queue.dropped_writes(), 0);
    }

    #[test]
    fn test_push_writer_counts_refused_frames() {
        let queue = Arc::new(FrameQueue::new(16));
        let written = Arc::new(Mutex::new(Vec::new()));
        let sink = CollectSink {
            written: Arc::clone(&written),
            refuse_every: Some(2),
            calls: 0,
            closed: Arc::new(AtomicBool::new(false)),
        };

        let mut writer = PushWriter::spawn(Box::new(sink), Arc::clone(&queue)).unwrap();
        for tag in 1..=6u8 {
            queue.push(EncodedFrame::from_bytes(vec![tag; 2]));
        }
        wait_until(|| queue.dropped_writes() == 3 && queue.is_empty());
        writer.stop();

        assert_eq!(queue.dropped_writes(), 3);
        assert_eq!(*written.lock(), vec![1, 1, 3, 3, 5, 5]);
    }

    #[test]
    fn test_idle_push_writer_stops_promptly() {
        let queue = Arc::new(FrameQueue::new(4));
        let sink = CollectSink {
            written: Arc::new(Mutex::new(Vec::new())),
            refuse_every: None,
            calls: 0,
            closed: Arc::new(AtomicBool::new(false)),
        };

        let mut writer = PushWriter::spawn(Box::new(sink), Arc::clone(&queue)).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        let start = Instant::now();
        writer.stop();
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(!writer.is_running());
    }

    #[test]
    fn test_pull_callback_fills_silence_when_starved() {
        let queue = Arc::new(FrameQueue::new(4));
        let callback = PullCallback::new(Arc::clone(&queue), 4);
        assert_eq!(callback.bytes_for(3), 12);

        queue.push(EncodedFrame::from_bytes(vec![9; 4]));
        let mut out = vec![0xFF; callback.bytes_for(2)];
        let report = callback.fill(&mut out);

        assert_eq!(report.delivered, 4);
        assert!(report.underrun);
        assert_eq!(out, vec![9, 9, 9, 9, 0, 0, 0, 0]);
        assert_eq!(queue.underruns(), 1);
    }

    #[test]
    fn test_pull_callback_after_close_is_silent() {
        let queue = Arc::new(FrameQueue::new(4));
        let callback = PullCallback::new(Arc::clone(&queue), 2);
        queue.push(EncodedFrame::from_bytes(vec![1; 4]));
        queue.close();

        let mut out = vec![0xFF; 4];
        let report = callback.fill(&mut out);
        assert_eq!(report.delivered, 0);
        assert_eq!(out, vec![0; 4]);
    }
}
