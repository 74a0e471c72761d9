//! Shared test backend whose device clock is driven by the test

#![allow(dead_code)]

use parking_lot::Mutex;
use pcm_bridge::{
    AudioBackend, PullCallback, PullSink, Result, SampleBlock, SinkMode, StreamParams,
    VolumeControl,
};
use std::sync::Arc;

/// Slot holding the callback registered by the driver
pub type CallbackSlot = Arc<Mutex<Option<PullCallback>>>;

/// Pull-mode backend that hands its callback to the test
#[derive(Default)]
pub struct ClockedBackend {
    pub slot: CallbackSlot,
}

impl ClockedBackend {
    pub fn new() -> (Self, CallbackSlot) {
        let backend = ClockedBackend::default();
        let slot = Arc::clone(&backend.slot);
        (backend, slot)
    }
}

struct ClockedSink {
    slot: CallbackSlot,
}

impl PullSink for ClockedSink {
    fn start(&mut self, callback: PullCallback) -> Result<()> {
        *self.slot.lock() = Some(callback);
        Ok(())
    }

    fn stop(&mut self) {
        self.slot.lock().take();
    }
}

impl AudioBackend for ClockedBackend {
    fn name(&self) -> &'static str {
        "clocked"
    }

    fn volume_control(&self) -> VolumeControl {
        VolumeControl::Unsupported
    }

    fn open(&mut self, requested: &StreamParams) -> Result<(StreamParams, SinkMode)> {
        let sink = ClockedSink {
            slot: Arc::clone(&self.slot),
        };
        Ok((*requested, SinkMode::Pull(Box::new(sink))))
    }
}

/// Sample frames per emulator block
pub const BLOCK_FRAMES: usize = 256;

/// Stereo block tagged so every sample frame is unique and ordered:
/// left carries the block index, right the frame index within the block
pub fn tagged_block(index: u16) -> SampleBlock {
    let samples = (0..BLOCK_FRAMES as i16)
        .flat_map(|frame| [index as i16, frame])
        .collect();
    SampleBlock::int16(samples, 2).expect("valid stereo block")
}

/// Decode delivered stereo 16-bit bytes into (block, frame) tags
pub fn decode_tags(bytes: &[u8]) -> Vec<(i16, i16)> {
    bytes
        .chunks_exact(4)
        .map(|b| {
            (
                i16::from_le_bytes([b[0], b[1]]),
                i16::from_le_bytes([b[2], b[3]]),
            )
        })
        .collect()
}
