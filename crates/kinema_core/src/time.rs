/// Millisecond clock feeding the animation pass.
///
/// The host hands in real frame deltas; the clock accumulates them into a
/// monotonically increasing "time since animation start". When a constant
/// delta is configured the real delta is ignored, which makes recordings and
/// tests deterministic.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationClock {
    /// Accumulated animation time in milliseconds
    pub elapsed_ms: f64,
    /// Delta applied by the most recent tick, in milliseconds
    pub delta_ms: f64,
    /// Total number of ticks
    pub frame_count: u64,
}

impl Default for AnimationClock {
    fn default() -> Self {
        Self::new()
    }
}

impl AnimationClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            elapsed_ms: 0.0,
            delta_ms: 0.0,
            frame_count: 0,
        }
    }

    /// Advances the clock and returns the new elapsed time.
    ///
    /// `constant_delta_ms` overrides `real_delta_ms` when set; `time_scale`
    /// multiplies whichever delta is used. Negative deltas are treated as zero
    /// so the clock never runs backwards.
    pub fn tick(&mut self, real_delta_ms: f64, constant_delta_ms: Option<f64>, time_scale: f64) -> f64 {
        let delta = constant_delta_ms.unwrap_or(real_delta_ms) * time_scale;
        self.delta_ms = delta.max(0.0);
        self.elapsed_ms += self.delta_ms;
        self.frame_count += 1;
        self.elapsed_ms
    }

    /// Restarts the clock from zero.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
