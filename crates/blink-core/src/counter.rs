//! Hysteresis blink counter.
//!
//! Converts the per-frame openness ratio into discrete blink events: a
//! blink is committed when the eye reopens after at least
//! [`MIN_CONSEC_FRAMES`] consecutive below-threshold frames.

/// Openness ratios below this count as a closed eye.
pub const EAR_THRESHOLD: f32 = 0.21;

/// Closed-eye frames required before a reopen commits a blink.
pub const MIN_CONSEC_FRAMES: u32 = 2;

#[derive(Debug, Default)]
pub struct BlinkCounter {
    below_threshold_frames: u32,
    blink_count: u64,
    /// Set while no valid sample has arrived since a detection gap;
    /// the pre-gap streak is stale and discarded at the next sample.
    gap_since_last_sample: bool,
}

impl BlinkCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one frame's worth of signal. `None` marks a detection
    /// gap: the counter is left untouched, but the running streak will
    /// not be carried into the frames after the gap.
    ///
    /// Returns true when this frame commits a blink.
    pub fn advance(&mut self, sample: Option<f32>) -> bool {
        let Some(sample) = sample else {
            self.gap_since_last_sample = true;
            return false;
        };
        if self.gap_since_last_sample {
            self.below_threshold_frames = 0;
            self.gap_since_last_sample = false;
        }
        self.update(sample)
    }

    fn update(&mut self, sample: f32) -> bool {
        if sample < EAR_THRESHOLD {
            self.below_threshold_frames += 1;
            return false;
        }
        let committed = self.below_threshold_frames >= MIN_CONSEC_FRAMES;
        if committed {
            self.blink_count += 1;
        }
        self.below_threshold_frames = 0;
        committed
    }

    /// Total blinks committed this session. Never decreases.
    pub fn blink_count(&self) -> u64 {
        self.blink_count
    }
}
