//! Kinema Scene
//!
//! The targets animations write into:
//!
//! - [`TransformNode`]: a hierarchy node with a [`Transform`] and a few animatable attributes
//! - [`Skeleton`] and [`Bone`]: a bone tree producing the flattened skinning buffer
//! - [`Scene`]: storage for both, and the [`AnimationHost`](kinema_animation::AnimationHost)
//!   its animator resolves property paths against
//!
//! A frame is `animate` then `update_matrix_world` then `prepare_skeletons`,
//! which [`Scene::update`] runs in that order.

pub mod bone;
pub mod node;
pub mod property;
pub mod scene;
pub mod skeleton;
pub mod transform;
pub mod transform_system;

pub use bone::{Bone, Space};
pub use node::{MaterialProps, TransformNode};
pub use property::{BoneProperty, NodeProperty};
pub use scene::Scene;
pub use skeleton::{BoneDocument, Skeleton, SkeletonDocument};
pub use transform::Transform;
