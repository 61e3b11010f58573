//! Error Types
//!
//! This module defines the error type used throughout the engine.
//!
//! # Overview
//!
//! [`KinemaError`] covers the structural failures that must be rejected
//! immediately:
//! - Curves constructed without keys or with mistyped key values
//! - Property paths that do not resolve on the target they are bound to
//! - Unknown ranges, bones or targets referenced by name or handle
//!
//! Numeric edge cases hit while ticking (a singular matrix during a
//! world-space bone edit, a target removed mid-animation) are logged and
//! skipped instead, so a single bad target never halts the whole pass.
//!
//! ```rust,ignore
//! use kinema_core::errors::{KinemaError, Result};
//!
//! fn bind() -> Result<()> {
//!     Err(KinemaError::PropertyNotFound { path: "position".into(), target: "node".into() })
//! }
//! ```

use thiserror::Error;

/// The main error type for the Kinema engine.
#[derive(Error, Debug)]
pub enum KinemaError {
    // ========================================================================
    // Curve Construction Errors
    // ========================================================================
    /// A curve must hold at least one key.
    #[error("Curve '{name}' has no keys")]
    EmptyCurve {
        /// Curve name
        name: String,
    },

    /// A key value does not match the curve's declared data type.
    #[error("Curve '{curve}' expects {expected} keys but key {index} holds {found}")]
    KeyTypeMismatch {
        curve: String,
        index: usize,
        expected: &'static str,
        found: &'static str,
    },

    /// A named range was not found on the curve or skeleton.
    #[error("Unknown range '{0}'")]
    UnknownRange(String),

    /// A frame range whose bounds are not finite.
    #[error("Invalid frame range: {from} -> {to}")]
    InvalidFrameRange { from: f32, to: f32 },

    // ========================================================================
    // Binding Errors
    // ========================================================================
    /// The target does not expose the requested property path.
    #[error("Property '{path}' not found on target {target}")]
    PropertyNotFound { path: String, target: String },

    /// The curve's value type differs from the property's type.
    #[error("Property '{path}' on target {target} holds {expected} values but the curve provides {found}")]
    PropertyTypeMismatch {
        path: String,
        target: String,
        expected: &'static str,
        found: &'static str,
    },

    /// The target handle no longer refers to a live object.
    #[error("Unknown animation target: {0}")]
    UnknownTarget(String),

    /// No bone with the given name or index exists in the skeleton.
    #[error("Unknown bone: {0}")]
    UnknownBone(String),

    // ========================================================================
    // Numeric Errors
    // ========================================================================
    /// A matrix required for a world-space edit could not be inverted.
    #[error("Matrix is not invertible: {0}")]
    SingularMatrix(String),

    // ========================================================================
    // Serialization Errors
    // ========================================================================
    /// JSON parsing error.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Serialized data that is structurally valid JSON but semantically wrong.
    #[error("Invalid serialized data: {0}")]
    InvalidData(String),
}

/// Alias for `Result<T, KinemaError>`.
pub type Result<T> = std::result::Result<T, KinemaError>;
