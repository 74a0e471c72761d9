//! Backend that accepts audio and discards it

use super::{AudioBackend, VolumeControl};
use crate::config::StreamParams;
use crate::streaming::{PushSink, SinkMode, WriteError};
use crate::Result;

/// Push backend with no device behind it
///
/// Useful for headless runs: the emulator keeps running and the stream
/// statistics stay meaningful.
#[derive(Debug, Default)]
pub struct NullBackend;

impl NullBackend {
    /// Create the backend
    pub fn new() -> Self {
        NullBackend
    }
}

struct NullSink;

impl PushSink for NullSink {
    fn write(&mut self, _bytes: &[u8]) -> std::result::Result<(), WriteError> {
        Ok(())
    }
}

impl AudioBackend for NullBackend {
    fn name(&self) -> &'static str {
        "null"
    }

    fn volume_control(&self) -> VolumeControl {
        VolumeControl::Unsupported
    }

    fn open(&mut self, requested: &StreamParams) -> Result<(StreamParams, SinkMode)> {
        Ok((*requested, SinkMode::Push(Box::new(NullSink))))
    }
}
