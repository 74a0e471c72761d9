//! Real-time playback backend using rodio
//!
//! The device pulls audio through a rodio [`Source`] that asks the
//! [`PullCallback`] for one period at a time and decodes it to `i16`.

use super::{AudioBackend, Capability, VolumeControl};
use crate::config::StreamParams;
use crate::sample::BitDepth;
use crate::streaming::{PullCallback, PullSink, SinkMode};
use crate::{BridgeError, Result};
use rodio::cpal::traits::{DeviceTrait, HostTrait};
use rodio::{OutputStream, OutputStreamHandle, Sink, Source};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub(super) fn probe_default_output() -> Capability {
    match rodio::cpal::default_host().default_output_device() {
        Some(_) => Capability::Available,
        None => Capability::Unavailable("no audio output device available".into()),
    }
}

fn find_device(name: &str) -> Result<rodio::Device> {
    let host = rodio::cpal::default_host();
    if name == "default" {
        return host.default_output_device().ok_or_else(|| {
            BridgeError::DeviceInitFailure("no default output device".into())
        });
    }

    let mut devices = host
        .output_devices()
        .map_err(|e| BridgeError::DeviceInitFailure(format!("Failed to list devices: {e}")))?;
    devices
        .find(|d| d.name().map(|n| n == name).unwrap_or(false))
        .ok_or_else(|| BridgeError::DeviceInitFailure(format!("output device '{name}' not found")))
}

/// Pick the parameters the device will actually run at
///
/// Output is always 16-bit. If the device has no config matching the
/// requested rate and channel count, its default config wins.
fn negotiate(device: &rodio::Device, requested: &StreamParams) -> StreamParams {
    let mut effective = StreamParams {
        bit_depth: BitDepth::Sixteen,
        ..*requested
    };

    let supported = device
        .supported_output_configs()
        .map(|configs| {
            configs.into_iter().any(|range| {
                range.channels() == requested.channels
                    && range.min_sample_rate().0 <= requested.sample_rate
                    && requested.sample_rate <= range.max_sample_rate().0
            })
        })
        .unwrap_or(false);

    if !supported {
        if let Ok(default) = device.default_output_config() {
            effective.sample_rate = default.sample_rate().0;
            effective.channels = default.channels();
        }
    }
    effective
}

/// Pull backend playing on a system output device
#[derive(Debug)]
pub struct PlaybackBackend {
    device_name: String,
}

impl PlaybackBackend {
    /// Backend for the named output device ("default" for the system default)
    pub fn new(device_name: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
        }
    }
}

impl AudioBackend for PlaybackBackend {
    fn name(&self) -> &'static str {
        "playback"
    }

    fn volume_control(&self) -> VolumeControl {
        VolumeControl::Native
    }

    fn open(&mut self, requested: &StreamParams) -> Result<(StreamParams, SinkMode)> {
        let device = find_device(&self.device_name)?;
        let effective = negotiate(&device, requested);

        let (stream, handle) = OutputStream::try_from_device(&device).map_err(|e| {
            BridgeError::DeviceInitFailure(format!("Failed to create audio stream: {e}"))
        })?;

        let sink = PlaybackSink {
            _stream: stream,
            handle,
            sink: None,
            stopped: Arc::new(AtomicBool::new(false)),
            params: effective,
        };
        Ok((effective, SinkMode::Pull(Box::new(sink))))
    }
}

struct PlaybackSink {
    _stream: OutputStream,
    handle: OutputStreamHandle,
    sink: Option<Sink>,
    stopped: Arc<AtomicBool>,
    params: StreamParams,
}

impl PullSink for PlaybackSink {
    fn start(&mut self, callback: PullCallback) -> Result<()> {
        let sink = Sink::try_new(&self.handle).map_err(|e| {
            BridgeError::DeviceInitFailure(format!("Failed to create audio sink: {e}"))
        })?;

        sink.append(DeviceSource::new(
            callback,
            &self.params,
            Arc::clone(&self.stopped),
        ));
        self.sink = Some(sink);
        debug!("Playback sink started");
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) {
        if let Some(sink) = &self.sink {
            sink.set_volume(volume);
        }
    }

    fn stop(&mut self) {
        self.stopped.store(true, Ordering::Release);
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
    }
}

impl Drop for PlaybackSink {
    fn drop(&mut self) {
        if self.sink.is_some() {
            warn!("Playback sink dropped without stop");
            self.stop();
        }
    }
}

/// rodio source serving 16-bit samples from the pull callback
struct DeviceSource {
    callback: PullCallback,
    /// One device period of encoded bytes
    buffer: Vec<u8>,
    /// Read position in `buffer`, in bytes
    pos: usize,
    sample_rate: u32,
    channels: u16,
    stopped: Arc<AtomicBool>,
}

impl DeviceSource {
    fn new(callback: PullCallback, params: &StreamParams, stopped: Arc<AtomicBool>) -> Self {
        let period_bytes = callback.bytes_for(params.period_size.max(1) as usize);
        DeviceSource {
            callback,
            buffer: vec![0; period_bytes],
            pos: period_bytes, // Start by reading a new period
            sample_rate: params.sample_rate,
            channels: params.channels,
            stopped,
        }
    }
}

impl Iterator for DeviceSource {
    type Item = i16;

    fn next(&mut self) -> Option<i16> {
        if self.stopped.load(Ordering::Acquire) {
            return None;
        }

        if self.pos + 2 > self.buffer.len() {
            self.callback.fill(&mut self.buffer);
            self.pos = 0;
        }

        let sample = i16::from_le_bytes([self.buffer[self.pos], self.buffer[self.pos + 1]]);
        self.pos += 2;
        Some(sample)
    }
}

impl Source for DeviceSource {
    fn current_frame_len(&self) -> Option<usize> {
        let remaining = self.buffer.len().saturating_sub(self.pos) / 2;
        if remaining > 0 {
            Some(remaining)
        } else {
            Some(self.buffer.len() / 2)
        }
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}
