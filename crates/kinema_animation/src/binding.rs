use std::fmt;

use kinema_core::{NodeHandle, Result, SkeletonKey};
use smallvec::SmallVec;

use crate::curve::LoopMode;
use crate::values::{AnimationValue, DataType};

/// Identifies the object a curve writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetId {
    /// A transform node in the scene graph.
    Node(NodeHandle),
    /// A bone inside a skeleton, addressed by its index in the skeleton.
    Bone { skeleton: SkeletonKey, index: u32 },
    /// Any other host object (materials, morph target managers, ...).
    External(u64),
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetId::Node(handle) => write!(f, "node {handle:?}"),
            TargetId::Bone { skeleton, index } => write!(f, "bone #{index} of skeleton {skeleton:?}"),
            TargetId::External(id) => write!(f, "external object {id}"),
        }
    }
}

/// Dot-separated property path (`"position"`, `"material.albedoColor"`).
///
/// Split once at construction; hosts walk `segments()` when resolving.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyPath {
    raw: String,
    segments: SmallVec<[Box<str>; 3]>,
}

impl PropertyPath {
    #[must_use]
    pub fn new(path: &str) -> Self {
        Self {
            raw: path.to_string(),
            segments: path.split('.').filter(|s| !s.is_empty()).map(Box::from).collect(),
        }
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    #[inline]
    #[must_use]
    pub fn segments(&self) -> &[Box<str>] {
        &self.segments
    }

    /// Last path segment, the property actually written.
    #[must_use]
    pub fn leaf(&self) -> &str {
        self.segments.last().map_or("", |s| s.as_ref())
    }
}

impl From<&str> for PropertyPath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Precompiled property accessor.
///
/// Produced once by [`AnimationHost::resolve_property`] at bind time; the
/// encoding is private to the host. Every later read and write goes through
/// the key instead of re-walking the string path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertyKey(pub u32);

/// Per-target overrides of the curve's own blending and loop settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimationPropertiesOverride {
    pub enable_blending: bool,
    pub blending_speed: f32,
    pub loop_mode: Option<LoopMode>,
}

impl Default for AnimationPropertiesOverride {
    fn default() -> Self {
        Self {
            enable_blending: false,
            blending_speed: 0.01,
            loop_mode: None,
        }
    }
}

/// How an evaluated value reaches its target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WriteMode {
    /// Write straight onto the property during the tick.
    Direct,
    /// Register with the late-binding compositor at this weight.
    Weighted(f32),
}

impl WriteMode {
    #[inline]
    #[must_use]
    pub fn weight(self) -> Option<f32> {
        match self {
            WriteMode::Direct => None,
            WriteMode::Weighted(w) => Some(w),
        }
    }
}

/// The object graph an animation pass reads from and writes into.
///
/// Implemented by the scene. Property resolution failures surface as errors
/// at bind time; after that, reads and writes on a vanished target are
/// silently ignored by the host.
pub trait AnimationHost {
    /// Compiles `path` into an accessor for `target`.
    fn resolve_property(&self, target: TargetId, path: &PropertyPath) -> Result<PropertyKey>;

    /// The value type an accessor accepts. Hosts that return `None` skip the
    /// bind-time type check.
    fn property_data_type(&self, _target: TargetId, _key: PropertyKey) -> Option<DataType> {
        None
    }

    /// Reads the current value behind an accessor.
    fn read_property(&self, target: TargetId, key: PropertyKey) -> Option<AnimationValue>;

    /// Writes a value through an accessor and marks the target dirty.
    fn write_property(&mut self, target: TargetId, key: PropertyKey, value: &AnimationValue);

    /// Target-level override of blending and loop settings, if any.
    fn properties_override(&self, _target: TargetId) -> Option<AnimationPropertiesOverride> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_is_split_once() {
        let path = PropertyPath::new("material.albedoColor");
        assert_eq!(path.segments().len(), 2);
        assert_eq!(path.leaf(), "albedoColor");
        assert_eq!(path.as_str(), "material.albedoColor");
    }

    #[test]
    fn write_mode_weight() {
        assert_eq!(WriteMode::Direct.weight(), None);
        assert_eq!(WriteMode::Weighted(0.5).weight(), Some(0.5));
    }
}
