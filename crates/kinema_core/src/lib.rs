//! Kinema Core
//!
//! Foundational types shared by every Kinema crate:
//!
//! - [`Color3`], [`Color4`], [`Size`]: animatable value types that `glam` does not provide
//! - [`NodeHandle`], [`SkeletonKey`]: slotmap keys identifying animation targets
//! - [`KinemaError`]: the engine-wide error enum
//! - [`AnimationClock`]: the per-frame millisecond clock driving playback

pub mod color;
pub mod errors;
pub mod time;

pub use color::{Color3, Color4, Size};
pub use errors::{KinemaError, Result};
pub use time::AnimationClock;

use slotmap::new_key_type;

new_key_type! {
    /// Handle to a transform node stored in a scene.
    pub struct NodeHandle;
    /// Handle to a skeleton stored in a scene.
    pub struct SkeletonKey;
}
