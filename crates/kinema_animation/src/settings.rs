//! Animation Settings
//!
//! Runtime knobs for the animation pass. These replace process-wide flags: the
//! [`Animator`](crate::Animator) owns one [`AnimationSettings`] and threads it
//! through evaluation explicitly.
//!
//! ```rust,ignore
//! use kinema_animation::{AnimationSettings, MatrixInterpolation};
//!
//! // Deterministic 16 ms steps, cheap matrix blending
//! let settings = AnimationSettings {
//!     constant_delta_time: Some(16.0),
//!     matrix_interpolation: MatrixInterpolation::Linear,
//!     ..Default::default()
//! };
//! ```

use serde::{Deserialize, Serialize};

/// Strategy used whenever two matrices are interpolated or blended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MatrixInterpolation {
    /// Decompose into scale / rotation / translation, blend each part and
    /// recompose. Correct under non-uniform scale; more expensive.
    #[default]
    Decompose,
    /// Interpolate the 16 components directly.
    Linear,
    /// Do not interpolate: hold the start key until the next key is reached.
    None,
}

/// Configuration for the animation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationSettings {
    /// Matrix interpolation and blending strategy.
    pub matrix_interpolation: MatrixInterpolation,
    /// When set, every tick advances the clock by this many milliseconds
    /// regardless of the real frame delta.
    pub constant_delta_time: Option<f32>,
    /// Global multiplier applied to elapsed time.
    pub animation_time_scale: f32,
    /// When `false` the tick is skipped entirely.
    pub animations_enabled: bool,
}

impl Default for AnimationSettings {
    fn default() -> Self {
        Self {
            matrix_interpolation: MatrixInterpolation::Decompose,
            constant_delta_time: None,
            animation_time_scale: 1.0,
            animations_enabled: true,
        }
    }
}

impl AnimationSettings {
    /// The fixed step used for deterministic recording.
    pub const RECORDING_DELTA_MS: f32 = 16.0;

    /// Settings that advance exactly [`Self::RECORDING_DELTA_MS`] per tick.
    #[must_use]
    pub fn deterministic() -> Self {
        Self {
            constant_delta_time: Some(Self::RECORDING_DELTA_MS),
            ..Self::default()
        }
    }
}
