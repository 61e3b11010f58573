//! Kinema Animation
//!
//! Keyframe curves and the machinery that plays them back:
//!
//! - [`Curve`]: typed keyframes with tangents, easing, named ranges and frame events
//! - [`RuntimeCurveState`]: one curve bound to its targets with a playback cursor
//! - [`Playback`]: a set of runtime states sharing a timeline, speed and weight
//! - [`PlaybackGroup`]: curves started and stopped together
//! - [`LateBindingCompositor`]: per-property blending of weighted and additive writes
//! - [`Animator`]: owns playbacks and runs the tick and resolve phases
//!
//! Targets are opaque to this crate. Anything implementing [`AnimationHost`]
//! can resolve property paths and receive writes.

mod values;

pub mod animator;
pub mod binding;
pub mod compositor;
pub mod curve;
pub mod easing;
pub mod group;
pub mod playback;
pub mod runtime;
pub mod serialize;
pub mod settings;

pub use animator::{Animator, AnimatorEvent, GroupHandle, PlaybackHandle};
pub use binding::{AnimationHost, AnimationPropertiesOverride, PropertyKey, PropertyPath, TargetId, WriteMode};
pub use compositor::{Contribution, LateBindingCompositor, LateBindingHolder};
pub use curve::{AdditiveOptions, Curve, CurveEvent, CurveRange, EventAction, KeyInterpolation, Keyframe, KeyframeCursor, LoopMode};
pub use easing::{Easing, EasingFunction, EasingMode};
pub use group::{PlaybackGroup, TargetedCurve};
pub use playback::{Playback, PlaybackOptions, PlaybackState};
pub use runtime::{AnimateContext, RuntimeCurveState, SyncInfo, Timeline};
pub use serialize::{CurveDocument, KeyDocument, RangeDocument};
pub use settings::{AnimationSettings, MatrixInterpolation};
pub use values::{AnimationValue, Blendable, DataType, Interpolatable, component_lerp, decompose_lerp};
