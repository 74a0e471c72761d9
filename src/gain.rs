//! One-shot peak-based gain correction
//!
//! Some cores emit much hotter output than others. The normalizer watches the
//! first few non-silent blocks, and if one of them peaks well above the target
//! level it locks a fixed attenuation factor for the rest of the session.
//!
//! # Limitations
//!
//! This is a heuristic, not an adaptive AGC. Once the observation window has
//! closed (or a factor has been locked) the state is frozen: a later change
//! in loudness is never corrected. Only attenuation is applied; quiet input is
//! never amplified. The state resets only when the driver is re-initialized.

/// Default peak level to normalize toward (half of 16-bit full scale)
pub const DEFAULT_TARGET_PEAK: i32 = 16_384;

/// Number of non-silent blocks inspected before the window closes
pub const DEFAULT_OBSERVATION_WINDOW: u32 = 10;

/// Peak must exceed `target * ratio` to trigger a correction
pub const DEFAULT_THRESHOLD_RATIO: f32 = 1.5;

/// Mutable gain tracking state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainState {
    /// Peak that triggered the correction, once locked
    pub detected_peak: Option<i32>,
    /// Peak level the correction aims for
    pub target_peak: i32,
    /// Non-silent blocks inspected so far
    pub samples_observed: u32,
    /// Largest peak seen during the observation window
    pub max_observed: i32,
}

impl GainState {
    /// Fresh state aiming for `target_peak`
    pub fn new(target_peak: i32) -> Self {
        Self {
            detected_peak: None,
            target_peak,
            samples_observed: 0,
            max_observed: 0,
        }
    }

    /// Whether a correction factor has been locked
    pub fn is_locked(&self) -> bool {
        self.detected_peak.is_some()
    }

    /// Correction factor in (0, 1]; 1.0 until locked
    pub fn gain(&self) -> f32 {
        match self.detected_peak {
            Some(peak) if peak > 0 => (self.target_peak as f32 / peak as f32).min(1.0),
            _ => 1.0,
        }
    }
}

/// Peak-tracking gain normalizer
#[derive(Debug, Clone)]
pub struct GainNormalizer {
    state: GainState,
    window: u32,
    threshold_ratio: f32,
}

impl GainNormalizer {
    /// Normalizer with the default target, window and threshold
    pub fn new() -> Self {
        Self::with_params(
            DEFAULT_TARGET_PEAK,
            DEFAULT_OBSERVATION_WINDOW,
            DEFAULT_THRESHOLD_RATIO,
        )
    }

    /// Normalizer with explicit tuning
    pub fn with_params(target_peak: i32, window: u32, threshold_ratio: f32) -> Self {
        Self {
            state: GainState::new(target_peak.max(1)),
            window,
            threshold_ratio,
        }
    }

    /// Feed the peak of one block and get the factor to apply to it
    ///
    /// `peak` is the block's absolute peak in the signed 16-bit domain (see
    /// [`SampleBlock::peak`](crate::SampleBlock::peak)). Silent blocks are
    /// ignored. The block that triggers the lock is itself attenuated.
    pub fn observe(&mut self, peak: i32) -> f32 {
        if peak <= 0 || self.is_settled() {
            return self.state.gain();
        }

        self.state.samples_observed += 1;
        self.state.max_observed = self.state.max_observed.max(peak);

        let threshold = self.state.target_peak as f32 * self.threshold_ratio;
        if peak as f32 > threshold {
            self.state.detected_peak = Some(self.state.max_observed);
            tracing::info!(
                peak = self.state.max_observed,
                target = self.state.target_peak,
                gain = self.state.gain(),
                "auto-gain locked"
            );
        } else if self.state.samples_observed == self.window {
            tracing::debug!(
                max_peak = self.state.max_observed,
                "auto-gain window closed without correction"
            );
        }

        self.state.gain()
    }

    /// Whether the state is frozen (locked, or window closed)
    ///
    /// Once settled, [`observe`](Self::observe) ignores its input, so callers
    /// can skip measuring the peak.
    pub fn is_settled(&self) -> bool {
        self.state.is_locked() || self.state.samples_observed >= self.window
    }

    /// Current factor in (0, 1]
    pub fn gain(&self) -> f32 {
        self.state.gain()
    }

    /// Snapshot of the tracking state
    pub fn state(&self) -> GainState {
        self.state
    }
}

impl Default for GainNormalizer {
    fn default() -> Self {
        Self::new()
    }
}
