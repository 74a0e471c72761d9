//! Bounded frame queue between the emulation thread and the audio sink
//!
//! The queue decouples two independently clocked sides:
//! - Producer: the emulation loop pushes one encoded frame per video frame
//! - Consumer: the sink pulls arbitrary byte counts on its own clock
//!
//! Neither side ever waits for the other. A push into a full queue evicts the
//! oldest frame (latency is bounded at the cost of a dropped frame), and a
//! pull from a starved queue is padded with silence. Frames can be split at
//! byte granularity; whatever a pull leaves of the front frame stays queued.
//!
//! All frame storage sits behind a single `parking_lot::Mutex`. Counters are
//! atomics so statistics can be read without touching the audio path. A
//! `Condvar` lets a push-mode writer sleep until a frame arrives.

use crate::sample::EncodedFrame;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Result of a push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Frame appended
    Queued,
    /// Queue was full; the oldest frame was dropped to make room
    EvictedOldest,
    /// Queue is closed; the frame was discarded
    Closed,
}

/// Result of a pull into a caller buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PullReport {
    /// Bytes copied from queued frames; the rest of the buffer is silence
    pub delivered: usize,
    /// Whether the request could not be fully served
    pub underrun: bool,
}

#[derive(Debug, Default)]
struct QueueCounters {
    frames_pushed: AtomicU64,
    overruns: AtomicU64,
    underruns: AtomicU64,
    bytes_delivered: AtomicU64,
    dropped_writes: AtomicU64,
}

#[derive(Debug)]
struct QueueInner {
    frames: VecDeque<EncodedFrame>,
    /// Bytes already consumed from the front frame
    head_offset: usize,
    open: bool,
}

/// Thread-safe bounded FIFO of encoded frames
///
/// # Thread Safety
/// - One producer (the caller of `play_samples`)
/// - One consumer (a sink callback or a writer thread)
/// - Every access to frame storage and the open flag happens under one lock,
///   held only for in-memory copies
#[derive(Debug)]
pub struct FrameQueue {
    inner: Mutex<QueueInner>,
    /// Signalled on push and close
    frame_ready: Condvar,
    max_depth: usize,
    counters: QueueCounters,
}

impl FrameQueue {
    /// Create an open queue holding at most `max_depth` frames
    ///
    /// A depth of zero is raised to one.
    pub fn new(max_depth: usize) -> Self {
        let max_depth = max_depth.max(1);
        FrameQueue {
            inner: Mutex::new(QueueInner {
                frames: VecDeque::with_capacity(max_depth + 1),
                head_offset: 0,
                open: true,
            }),
            frame_ready: Condvar::new(),
            max_depth,
            counters: QueueCounters::default(),
        }
    }

    /// Maximum number of frames held at once
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Number of frames currently queued (a partially consumed frame counts)
    pub fn len(&self) -> usize {
        self.inner.lock().frames.len()
    }

    /// Whether no frames are queued
    pub fn is_empty(&self) -> bool {
        self.inner.lock().frames.is_empty()
    }

    /// Bytes waiting to be delivered
    pub fn buffered_bytes(&self) -> usize {
        let inner = self.inner.lock();
        inner.frames.iter().map(EncodedFrame::len).sum::<usize>() - inner.head_offset
    }

    /// Queue depth as a fraction of `max_depth` (0.0 to 1.0)
    pub fn fill_percentage(&self) -> f32 {
        (self.len() as f32) / (self.max_depth as f32)
    }

    /// Whether the queue accepts and delivers frames
    pub fn is_open(&self) -> bool {
        self.inner.lock().open
    }

    /// Append a frame, evicting the oldest one if the queue is full
    pub fn push(&self, frame: EncodedFrame) -> PushOutcome {
        if frame.is_empty() {
            return PushOutcome::Queued;
        }

        let mut inner = self.inner.lock();
        if !inner.open {
            return PushOutcome::Closed;
        }

        let outcome = if inner.frames.len() >= self.max_depth {
            inner.frames.pop_front();
            inner.head_offset = 0;
            self.counters.overruns.fetch_add(1, Ordering::Relaxed);
            PushOutcome::EvictedOldest
        } else {
            PushOutcome::Queued
        };

        inner.frames.push_back(frame);
        drop(inner);
        self.frame_ready.notify_one();

        self.counters.frames_pushed.fetch_add(1, Ordering::Relaxed);
        outcome
    }

    /// Pull exactly `n` bytes, zero-filling any shortfall
    ///
    /// Allocates the returned buffer; audio callbacks should use
    /// [`pull_into`](Self::pull_into) instead.
    pub fn pull(&self, n: usize) -> Vec<u8> {
        let mut out = vec![0u8; n];
        self.pull_into(&mut out);
        out
    }

    /// Fill `out` from the front of the queue, zero-filling any shortfall
    ///
    /// A shortfall counts as one underrun regardless of its size. A closed
    /// queue fills silence without recording an underrun.
    pub fn pull_into(&self, out: &mut [u8]) -> PullReport {
        let mut inner = self.inner.lock();
        self.pull_locked(&mut inner, out)
    }

    /// Like [`pull_into`](Self::pull_into) but gives up after `timeout`
    ///
    /// When the lock cannot be taken in time the buffer is filled with
    /// silence and an underrun is recorded.
    pub fn try_pull_into(&self, out: &mut [u8], timeout: Duration) -> PullReport {
        match self.inner.try_lock_for(timeout) {
            Some(mut inner) => self.pull_locked(&mut inner, out),
            None => {
                out.fill(0);
                self.counters.underruns.fetch_add(1, Ordering::Relaxed);
                PullReport {
                    delivered: 0,
                    underrun: true,
                }
            }
        }
    }

    fn pull_locked(&self, inner: &mut QueueInner, out: &mut [u8]) -> PullReport {
        if !inner.open {
            out.fill(0);
            return PullReport {
                delivered: 0,
                underrun: false,
            };
        }

        let mut filled = 0;
        while filled < out.len() {
            let Some(front) = inner.frames.front() else {
                break;
            };
            let available = &front.as_bytes()[inner.head_offset..];
            let take = available.len().min(out.len() - filled);
            out[filled..filled + take].copy_from_slice(&available[..take]);
            filled += take;

            if take == available.len() {
                inner.frames.pop_front();
                inner.head_offset = 0;
            } else {
                inner.head_offset += take;
            }
        }

        let underrun = filled < out.len();
        if underrun {
            out[filled..].fill(0);
            self.counters.underruns.fetch_add(1, Ordering::Relaxed);
        }
        self.counters
            .bytes_delivered
            .fetch_add(filled as u64, Ordering::Relaxed);

        PullReport {
            delivered: filled,
            underrun,
        }
    }

    /// Remove the front frame whole (minus any bytes already pulled)
    ///
    /// Used by push-mode writers that hand complete frames to the device.
    pub fn pop_frame(&self) -> Option<EncodedFrame> {
        let inner = self.inner.lock();
        self.take_front(inner)
    }

    /// Like [`pop_frame`](Self::pop_frame) but waits up to `timeout` for a
    /// frame when the queue is empty
    ///
    /// Returns early on push or close.
    pub fn pop_frame_timeout(&self, timeout: Duration) -> Option<EncodedFrame> {
        let mut inner = self.inner.lock();
        if inner.open && inner.frames.is_empty() {
            self.frame_ready.wait_for(&mut inner, timeout);
        }
        self.take_front(inner)
    }

    fn take_front(&self, mut inner: MutexGuard<'_, QueueInner>) -> Option<EncodedFrame> {
        if !inner.open {
            return None;
        }
        let frame = inner.frames.pop_front()?;
        let offset = std::mem::take(&mut inner.head_offset);
        drop(inner);

        let frame = if offset > 0 {
            let mut bytes = frame.into_bytes();
            bytes.drain(..offset);
            EncodedFrame::from_bytes(bytes)
        } else {
            frame
        };
        self.counters
            .bytes_delivered
            .fetch_add(frame.len() as u64, Ordering::Relaxed);
        Some(frame)
    }

    /// Record a frame the sink refused (push mode)
    pub fn record_dropped_write(&self) {
        self.counters.dropped_writes.fetch_add(1, Ordering::Relaxed);
    }

    /// Discard all queued frames
    pub fn flush(&self) {
        let mut inner = self.inner.lock();
        inner.frames.clear();
        inner.head_offset = 0;
    }

    /// Stop accepting and delivering frames, discarding what is queued
    ///
    /// Once this returns, no consumer will read frame storage until
    /// [`reopen`](Self::reopen) is called.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.open = false;
        inner.frames.clear();
        inner.head_offset = 0;
        drop(inner);
        self.frame_ready.notify_all();
    }

    /// Accept frames again after [`close`](Self::close)
    pub fn reopen(&self) {
        self.inner.lock().open = true;
    }

    /// Frames accepted by `push`
    pub fn frames_pushed(&self) -> u64 {
        self.counters.frames_pushed.load(Ordering::Relaxed)
    }

    /// Frames evicted by the drop-oldest policy
    pub fn overruns(&self) -> u64 {
        self.counters.overruns.load(Ordering::Relaxed)
    }

    /// Pulls that had to be padded with silence
    pub fn underruns(&self) -> u64 {
        self.counters.underruns.load(Ordering::Relaxed)
    }

    /// Bytes handed to the consumer (silence padding excluded)
    pub fn bytes_delivered(&self) -> u64 {
        self.counters.bytes_delivered.load(Ordering::Relaxed)
    }

    /// Frames refused by a push-mode sink
    pub fn dropped_writes(&self) -> u64 {
        self.counters.dropped_writes.load(Ordering::Relaxed)
    }
}
