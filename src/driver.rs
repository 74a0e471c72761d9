//! Driver facade: one lifecycle for every backend
//!
//! ```text
//! play_samples ─▶ convert (+ auto-gain, software volume) ─▶ FrameQueue ─▶ SinkAdapter ─▶ device
//! ```
//!
//! The facade owns the queue and the sink adapter. Per-block failures never
//! reach the caller: audio is best effort and the emulation loop must keep
//! running even with no device at all.

use crate::backend::{create_backend, AudioBackend, VolumeControl};
use crate::config::{DriverConfig, StreamParams};
use crate::convert::convert_scaled;
use crate::gain::{GainNormalizer, GainState};
use crate::sample::{SampleBlock, SampleEncoding};
use crate::streaming::{FrameQueue, SinkAdapter, StreamStats};
use crate::{BridgeError, Result};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Lifecycle state of a driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// Constructed, or a previous `init` failed
    Uninitialized,
    /// Device open and consuming
    Running,
    /// Closed; `init` may open it again
    Closed,
}

/// Per-instance diagnostic bookkeeping
///
/// Each failure class is logged once per driver; later occurrences only
/// bump the counters.
#[derive(Debug, Default)]
struct Diagnostics {
    invalid_block_logged: bool,
    conversion_failure_logged: bool,
    invalid_blocks: u64,
    conversion_failures: u64,
}

impl Diagnostics {
    fn record(&mut self, err: &BridgeError) {
        match err {
            BridgeError::InvalidSampleBlock { .. } => {
                self.invalid_blocks += 1;
                if !self.invalid_block_logged {
                    self.invalid_block_logged = true;
                    warn!("Dropping malformed sample block: {err}");
                }
            }
            _ => {
                self.conversion_failures += 1;
                if !self.conversion_failure_logged {
                    self.conversion_failure_logged = true;
                    error!("Error converting samples: {err}");
                }
            }
        }
    }
}

/// Audio driver composing conversion, gain, queue and sink
pub struct AudioDriver {
    config: DriverConfig,
    backend: Box<dyn AudioBackend>,
    state: DriverState,
    queue: Arc<FrameQueue>,
    adapter: Option<SinkAdapter>,
    effective: Option<StreamParams>,
    gain: Option<GainNormalizer>,
    volume: f32,
    blocks_received: u64,
    diagnostics: Diagnostics,
}

impl AudioDriver {
    /// Create a driver for the backend named in `config`
    ///
    /// Fails with [`BridgeError::BackendUnavailable`] if that backend is not
    /// compiled in or has no device, and with [`BridgeError::ConfigError`]
    /// for invalid settings.
    pub fn new(config: DriverConfig) -> Result<Self> {
        config.validate()?;
        let backend = create_backend(&config)?;
        Ok(Self::build(config, backend))
    }

    /// Create a driver around an explicit backend
    pub fn with_backend(config: DriverConfig, backend: Box<dyn AudioBackend>) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, backend))
    }

    fn build(config: DriverConfig, backend: Box<dyn AudioBackend>) -> Self {
        AudioDriver {
            queue: Arc::new(FrameQueue::new(config.max_queue_depth)),
            volume: config.volume.clamp(0.0, 1.0),
            config,
            backend,
            state: DriverState::Uninitialized,
            adapter: None,
            effective: None,
            gain: None,
            blocks_received: 0,
            diagnostics: Diagnostics::default(),
        }
    }

    /// Open the device, returning `false` on failure
    ///
    /// `requested_rate` is the producer's sample rate (0 to use the
    /// configured rate). Calling this while running succeeds without
    /// reconfiguring anything.
    pub fn init(&mut self, requested_rate: u32) -> bool {
        match self.try_init(requested_rate) {
            Ok(_) => true,
            Err(err) => {
                error!(backend = self.backend.name(), "Failed to initialize audio: {err}");
                false
            }
        }
    }

    /// Open the device, returning the effective stream parameters
    ///
    /// The backend may adjust rate, channels or bit depth; callers must use
    /// the returned values, not the requested ones.
    pub fn try_init(&mut self, requested_rate: u32) -> Result<StreamParams> {
        if let (DriverState::Running, Some(effective)) = (self.state, self.effective) {
            return Ok(effective);
        }

        let requested = self.config.requested_params(requested_rate);
        let (effective, mode) = self.backend.open(&requested)?;
        if effective.channels == 0 || effective.sample_rate == 0 {
            return Err(BridgeError::DeviceInitFailure(format!(
                "{} backend negotiated unusable parameters: {effective:?}",
                self.backend.name()
            )));
        }

        self.queue.flush();
        self.queue.reopen();
        let mut adapter = match SinkAdapter::start(
            mode,
            Arc::clone(&self.queue),
            effective.output_format().bytes_per_frame(),
        ) {
            Ok(adapter) => adapter,
            Err(err) => {
                self.queue.close();
                return Err(err);
            }
        };
        if self.backend.volume_control() == VolumeControl::Native {
            adapter.set_volume(self.volume);
        }

        log_negotiation(self.backend.name(), &requested, &effective);
        info!(
            backend = self.backend.name(),
            device = %self.config.device,
            sample_rate = effective.sample_rate,
            channels = effective.channels,
            bits = effective.bit_depth.bits(),
            period = effective.period_size,
            volume = self.volume,
            "Audio initialized"
        );

        self.adapter = Some(adapter);
        self.effective = Some(effective);
        self.gain = self.config.auto_gain.then(GainNormalizer::new);
        self.state = DriverState::Running;
        Ok(effective)
    }

    /// Queue one block for playback
    ///
    /// A no-op unless running. Never blocks and never fails: a full queue
    /// drops its oldest frame, and a block that cannot be converted is
    /// dropped and counted.
    pub fn play_samples(&mut self, block: &SampleBlock) {
        if self.state != DriverState::Running || block.is_empty() {
            return;
        }
        let Some(effective) = self.effective else {
            return;
        };
        self.blocks_received += 1;

        let mut scale = match self.gain.as_mut() {
            Some(gain) if gain.is_settled() => gain.gain(),
            Some(gain) => gain.observe(block.peak()),
            None => 1.0,
        };
        if self.backend.volume_control() == VolumeControl::Software {
            scale *= self.volume;
        }

        match convert_scaled(block, effective.output_format(), scale) {
            Ok(frame) => {
                self.queue.push(frame);
            }
            Err(err) => self.diagnostics.record(&err),
        }
    }

    /// Queue raw little-endian PCM bytes
    ///
    /// Malformed input (a partial sample or partial sample frame) is dropped
    /// and counted like any other per-block failure.
    pub fn play_bytes(&mut self, encoding: SampleEncoding, channels: u16, bytes: &[u8]) {
        if self.state != DriverState::Running || bytes.is_empty() {
            return;
        }
        match SampleBlock::from_le_bytes(encoding, channels, bytes) {
            Ok(block) => self.play_samples(&block),
            Err(err) => {
                self.blocks_received += 1;
                self.diagnostics.record(&err);
            }
        }
    }

    /// Set output volume, clamped to [0, 1]
    ///
    /// Ignored (beyond being remembered) by backends without gain control.
    pub fn set_volume(&mut self, volume: f32) {
        if volume.is_nan() {
            return;
        }
        self.volume = volume.clamp(0.0, 1.0);

        match self.backend.volume_control() {
            VolumeControl::Unsupported => {
                debug!(backend = self.backend.name(), "Volume control not supported");
            }
            VolumeControl::Software => {}
            VolumeControl::Native => {
                if let Some(adapter) = self.adapter.as_mut() {
                    adapter.set_volume(self.volume);
                }
            }
        }
    }

    /// Stop the device and discard queued audio
    ///
    /// Safe to call repeatedly. When it returns, the sink no longer reads
    /// the queue.
    pub fn close(&mut self) {
        if self.state != DriverState::Running {
            return;
        }

        if let Some(mut adapter) = self.adapter.take() {
            adapter.stop();
        }
        self.queue.close();
        self.effective = None;
        self.state = DriverState::Closed;

        let stats = self.stats();
        info!(
            backend = self.backend.name(),
            blocks = stats.blocks_received,
            overruns = stats.overruns,
            underruns = stats.underruns,
            dropped_writes = stats.dropped_writes,
            "Audio closed"
        );
    }

    /// Lifecycle state
    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Whether the device is open
    pub fn is_running(&self) -> bool {
        self.state == DriverState::Running
    }

    /// Parameters negotiated by the last successful `init`, while running
    pub fn effective_params(&self) -> Option<StreamParams> {
        self.effective
    }

    /// Requested configuration
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Backend name
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Current volume in [0, 1]
    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Auto-gain state, when enabled and running
    pub fn gain_state(&self) -> Option<GainState> {
        self.gain.as_ref().map(GainNormalizer::state)
    }

    /// Snapshot of stream counters
    pub fn stats(&self) -> StreamStats {
        StreamStats {
            blocks_received: self.blocks_received,
            invalid_blocks: self.diagnostics.invalid_blocks,
            conversion_failures: self.diagnostics.conversion_failures,
            ..Default::default()
        }
        .with_queue(&self.queue)
    }
}

impl Drop for AudioDriver {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for AudioDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioDriver")
            .field("backend", &self.backend.name())
            .field("state", &self.state)
            .field("effective", &self.effective)
            .field("volume", &self.volume)
            .finish_non_exhaustive()
    }
}

fn log_negotiation(backend: &str, requested: &StreamParams, effective: &StreamParams) {
    if requested.sample_rate != effective.sample_rate {
        warn!(
            backend,
            "Sample rate mismatch: using {}Hz instead of {}Hz",
            effective.sample_rate,
            requested.sample_rate
        );
    }
    if requested.channels != effective.channels {
        warn!(
            backend,
            "Channel count mismatch: using {} channels instead of {}",
            effective.channels,
            requested.channels
        );
    }
    if requested.bit_depth != effective.bit_depth {
        warn!(
            backend,
            "Bit depth mismatch: using {}-bit instead of {}-bit",
            effective.bit_depth.bits(),
            requested.bit_depth.bits()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendKind;
    use crate::sample::BitDepth;
    use crate::streaming::{PullCallback, PullSink, SinkMode};
    use parking_lot::Mutex;

    /// Pull backend whose "device" is driven by the test
    #[derive(Default)]
    struct ManualBackend {
        callback: Arc<Mutex<Option<PullCallback>>>,
        volume: Arc<Mutex<Option<f32>>>,
        opens: Arc<Mutex<u32>>,
        fail: bool,
        force_rate: Option<u32>,
        control: Option<VolumeControl>,
    }

    struct ManualSink {
        callback: Arc<Mutex<Option<PullCallback>>>,
        volume: Arc<Mutex<Option<f32>>>,
    }

    impl PullSink for ManualSink {
        fn start(&mut self, callback: PullCallback) -> Result<()> {
            *self.callback.lock() = Some(callback);
            Ok(())
        }

        fn set_volume(&mut self, volume: f32) {
            *self.volume.lock() = Some(volume);
        }

        fn stop(&mut self) {
            self.callback.lock().take();
        }
    }

    impl AudioBackend for ManualBackend {
        fn name(&self) -> &'static str {
            "manual"
        }

        fn volume_control(&self) -> VolumeControl {
            self.control.unwrap_or(VolumeControl::Native)
        }

        fn open(&mut self, requested: &StreamParams) -> Result<(StreamParams, SinkMode)> {
            if self.fail {
                return Err(BridgeError::DeviceInitFailure("rejected".into()));
            }
            *self.opens.lock() += 1;
            let mut effective = *requested;
            if let Some(rate) = self.force_rate {
                effective.sample_rate = rate;
            }
            let sink = ManualSink {
                callback: Arc::clone(&self.callback),
                volume: Arc::clone(&self.volume),
            };
            Ok((effective, SinkMode::Pull(Box::new(sink))))
        }
    }

    fn driver_with(backend: ManualBackend, config: DriverConfig) -> AudioDriver {
        AudioDriver::with_backend(config, Box::new(backend)).unwrap()
    }

    fn pull(callback: &Arc<Mutex<Option<PullCallback>>>, n: usize) -> Vec<u8> {
        let guard = callback.lock();
        let cb = guard.as_ref().expect("callback registered");
        let mut out = vec![0xEE; n];
        cb.fill(&mut out);
        out
    }

    #[test]
    fn test_play_before_init_is_noop() {
        let mut driver = driver_with(ManualBackend::default(), DriverConfig::default());
        let block = SampleBlock::int16(vec![1, 2], 2).unwrap();
        driver.play_samples(&block);
        assert_eq!(driver.state(), DriverState::Uninitialized);
        assert_eq!(driver.stats().blocks_received, 0);
        assert!(driver.effective_params().is_none());
    }

    #[test]
    fn test_init_and_stream() {
        let backend = ManualBackend::default();
        let callback = Arc::clone(&backend.callback);
        let mut driver = driver_with(backend, DriverConfig::default());

        assert!(driver.init(48_000));
        assert!(driver.is_running());
        assert_eq!(driver.effective_params().unwrap().sample_rate, 48_000);

        let block = SampleBlock::int16(vec![1, -1, 2, -2], 2).unwrap();
        driver.play_samples(&block);

        let out = pull(&callback, 8);
        let expected: Vec<u8> = [1i16, -1, 2, -2].iter().flat_map(|s| s.to_le_bytes()).collect();
        assert_eq!(out, expected);
        assert_eq!(driver.stats().blocks_received, 1);
    }

    #[test]
    fn test_init_while_running_is_idempotent() {
        let backend = ManualBackend::default();
        let opens = Arc::clone(&backend.opens);
        let mut driver = driver_with(backend, DriverConfig::default());

        let first = driver.try_init(32_000).unwrap();
        let second = driver.try_init(96_000).unwrap();
        assert_eq!(first, second);
        assert_eq!(*opens.lock(), 1);
    }

    #[test]
    fn test_failed_init_stays_uninitialized() {
        let backend = ManualBackend {
            fail: true,
            ..Default::default()
        };
        let mut driver = driver_with(backend, DriverConfig::default());
        assert!(!driver.init(44_100));
        assert_eq!(driver.state(), DriverState::Uninitialized);

        driver.play_samples(&SampleBlock::int16(vec![5], 1).unwrap());
        assert_eq!(driver.stats().frames_queued, 0);
    }

    #[test]
    fn test_effective_params_reflect_negotiation() {
        let backend = ManualBackend {
            force_rate: Some(44_100),
            ..Default::default()
        };
        let mut driver = driver_with(backend, DriverConfig::default());
        let effective = driver.try_init(50_000).unwrap();
        assert_eq!(effective.sample_rate, 44_100);
        assert_eq!(driver.effective_params(), Some(effective));
    }

    #[test]
    fn test_close_is_idempotent_and_unregisters() {
        let backend = ManualBackend::default();
        let callback = Arc::clone(&backend.callback);
        let mut driver = driver_with(backend, DriverConfig::default());
        driver.init(44_100);
        driver.play_samples(&SampleBlock::int16(vec![7, 7], 2).unwrap());

        driver.close();
        driver.close();
        assert_eq!(driver.state(), DriverState::Closed);
        assert!(callback.lock().is_none());
        assert_eq!(driver.stats().queue_depth, 0);

        driver.play_samples(&SampleBlock::int16(vec![7, 7], 2).unwrap());
        assert_eq!(driver.stats().frames_queued, 1);
    }

    #[test]
    fn test_close_before_init_is_safe() {
        let mut driver = driver_with(ManualBackend::default(), DriverConfig::default());
        driver.close();
        assert_eq!(driver.state(), DriverState::Uninitialized);
    }

    #[test]
    fn test_reinit_after_close_resets_gain() {
        let config = DriverConfig {
            auto_gain: true,
            ..DriverConfig::default()
        };
        let mut driver = driver_with(ManualBackend::default(), config);
        driver.init(44_100);
        driver.play_samples(&SampleBlock::int16(vec![32_000, 32_000], 2).unwrap());
        assert!(driver.gain_state().unwrap().is_locked());

        driver.close();
        assert!(driver.init(44_100));
        assert!(!driver.gain_state().unwrap().is_locked());
    }

    #[test]
    fn test_auto_gain_attenuates_hot_input() {
        let backend = ManualBackend::default();
        let callback = Arc::clone(&backend.callback);
        let config = DriverConfig {
            auto_gain: true,
            channels: 1,
            ..DriverConfig::default()
        };
        let mut driver = driver_with(backend, config);
        driver.init(44_100);

        driver.play_samples(&SampleBlock::int16(vec![32_767, -32_767], 1).unwrap());
        let out = pull(&callback, 4);
        assert_eq!(i16::from_le_bytes([out[0], out[1]]), 16_384);
        assert_eq!(i16::from_le_bytes([out[2], out[3]]), -16_384);
    }

    #[test]
    fn test_settled_gain_keeps_applying_locked_factor() {
        let backend = ManualBackend::default();
        let callback = Arc::clone(&backend.callback);
        let config = DriverConfig {
            auto_gain: true,
            channels: 1,
            ..DriverConfig::default()
        };
        let mut driver = driver_with(backend, config);
        driver.init(44_100);

        driver.play_samples(&SampleBlock::int16(vec![32_767], 1).unwrap());
        let locked = driver.gain_state().unwrap();
        assert!(locked.is_locked());

        driver.play_samples(&SampleBlock::int16(vec![32_767, 1_000], 1).unwrap());
        assert_eq!(driver.gain_state().unwrap(), locked);

        let out = pull(&callback, 6);
        assert_eq!(i16::from_le_bytes([out[2], out[3]]), 16_384);
        assert_eq!(i16::from_le_bytes([out[4], out[5]]), 500);
    }

    #[test]
    fn test_software_volume_scales_samples() {
        let backend = ManualBackend {
            control: Some(VolumeControl::Software),
            ..Default::default()
        };
        let callback = Arc::clone(&backend.callback);
        let config = DriverConfig {
            channels: 1,
            ..DriverConfig::default()
        };
        let mut driver = driver_with(backend, config);
        driver.init(44_100);
        driver.set_volume(0.5);

        driver.play_samples(&SampleBlock::int16(vec![1000], 1).unwrap());
        let out = pull(&callback, 2);
        assert_eq!(i16::from_le_bytes([out[0], out[1]]), 500);
    }

    #[test]
    fn test_native_volume_is_clamped_and_forwarded() {
        let backend = ManualBackend::default();
        let volume = Arc::clone(&backend.volume);
        let mut driver = driver_with(backend, DriverConfig::default());
        driver.init(44_100);

        driver.set_volume(3.0);
        assert_eq!(driver.volume(), 1.0);
        assert_eq!(*volume.lock(), Some(1.0));

        driver.set_volume(-1.0);
        assert_eq!(*volume.lock(), Some(0.0));
    }

    #[test]
    fn test_malformed_bytes_are_counted() {
        let mut driver = driver_with(ManualBackend::default(), DriverConfig::default());
        driver.init(44_100);

        driver.play_bytes(SampleEncoding::Int16, 2, &[1, 0, 2]);
        driver.play_bytes(SampleEncoding::Int16, 2, &[1, 0, 2, 0, 3, 0]);
        driver.play_bytes(SampleEncoding::Int16, 2, &[1, 0, 2, 0]);

        let stats = driver.stats();
        assert_eq!(stats.invalid_blocks, 2);
        assert_eq!(stats.frames_queued, 1);
        assert!(driver.diagnostics.invalid_block_logged);
    }

    #[test]
    fn test_24bit_output() {
        let backend = ManualBackend::default();
        let callback = Arc::clone(&backend.callback);
        let config = DriverConfig {
            bit_depth: BitDepth::TwentyFour,
            channels: 1,
            ..DriverConfig::default()
        };
        let mut driver = driver_with(backend, config);
        driver.init(48_000);

        driver.play_samples(&SampleBlock::int16(vec![-1], 1).unwrap());
        let out = pull(&callback, 3);
        assert_eq!(crate::convert::unpack_i24([out[0], out[1], out[2]]), -256);
    }

    #[test]
    fn test_null_backend_from_config() {
        let config = DriverConfig::default().with_backend(BackendKind::Null);
        let mut driver = AudioDriver::new(config).unwrap();
        assert_eq!(driver.backend_name(), "null");
        assert!(driver.init(0));
        assert_eq!(driver.effective_params().unwrap().sample_rate, 44_100);
        driver.play_samples(&SampleBlock::float32(vec![0.5, -0.5], 2).unwrap());
        driver.close();
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = DriverConfig {
            channels: 0,
            ..DriverConfig::default()
        };
        assert!(matches!(
            AudioDriver::with_backend(config, Box::new(ManualBackend::default())),
            Err(BridgeError::ConfigError(_))
        ));
    }
}
