//! # Kinema
//!
//! Keyframe and skeletal animation evaluation.
//!
//! Curves are played by an [`Animator`] against any [`AnimationHost`]. The
//! bundled [`Scene`] is such a host: it stores transform nodes and skeletons
//! and turns bone poses into the flattened skinning buffer.
//!
//! ```rust,ignore
//! use kinema::prelude::*;
//!
//! let mut scene = Scene::new();
//! let mut node = TransformNode::new("box");
//! node.animations.push(Arc::new(slide_curve));
//! let handle = scene.add_node(node);
//!
//! scene.begin_animation(TargetId::Node(handle), 0.0, 30.0, true, 1.0)?;
//! loop {
//!     for event in scene.update(16.0) { /* ... */ }
//! }
//! ```
//!
//! Sub-crates are re-exported under their short names for callers that want
//! the full module paths.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub use kinema_animation as animation;
pub use kinema_core as core;
pub use kinema_scene as scene;

pub use kinema_core::{Color3, Color4, KinemaError, NodeHandle, Result, Size, SkeletonKey};

pub use kinema_animation::{
    AdditiveOptions, AnimationHost, AnimationPropertiesOverride, AnimationSettings, AnimationValue, Animator,
    AnimatorEvent, Curve, CurveEvent, CurveRange, DataType, Easing, EasingFunction, EasingMode, GroupHandle,
    KeyInterpolation, Keyframe, LateBindingCompositor, LoopMode, MatrixInterpolation, Playback, PlaybackGroup,
    PlaybackHandle, PlaybackOptions, PlaybackState, PropertyKey, PropertyPath, RuntimeCurveState, TargetId, WriteMode,
};

pub use kinema_scene::{
    Bone, BoneProperty, MaterialProps, NodeProperty, Scene, Skeleton, SkeletonDocument, Space, Transform, TransformNode,
};

pub use glam;

/// Everything needed to build and play animations.
pub mod prelude {
    pub use std::sync::Arc;

    pub use glam::{Mat4, Quat, Vec2, Vec3};

    pub use crate::{
        AnimationHost, AnimationSettings, AnimationValue, Animator, AnimatorEvent, Color3, Color4, Curve, DataType,
        Easing, EasingFunction, EasingMode, KinemaError, Keyframe, LoopMode, PlaybackGroup, PlaybackOptions, Scene,
        Skeleton, Space, TargetId, TransformNode,
    };
}
