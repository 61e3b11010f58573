use std::sync::Arc;

use kinema_animation::{AnimationPropertiesOverride, AnimationValue, Curve};
use kinema_core::{Color3, NodeHandle};

use crate::property::NodeProperty;
use crate::transform::Transform;

/// Minimal material surface exposed to animation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialProps {
    pub diffuse_color: Color3,
    pub alpha: f32,
}

impl Default for MaterialProps {
    fn default() -> Self {
        Self {
            diffuse_color: Color3::WHITE,
            alpha: 1.0,
        }
    }
}

/// A scene node that animations can target.
///
/// Carries its hierarchy links, a [`Transform`], a few animatable render
/// attributes and the curves attached to it for
/// [`Scene::begin_animation`](crate::Scene::begin_animation).
#[derive(Debug, Clone)]
pub struct TransformNode {
    pub name: String,
    /// Stable string id, used to resolve serialized bone links.
    pub id: String,

    pub(crate) parent: Option<NodeHandle>,
    pub(crate) children: Vec<NodeHandle>,

    pub transform: Transform,
    pub visibility: f32,
    pub material: Option<MaterialProps>,
    pub morph_influences: Vec<f32>,

    /// Curves played by [`Scene::begin_animation`](crate::Scene::begin_animation).
    pub animations: Vec<Arc<Curve>>,
    pub animation_override: Option<AnimationPropertiesOverride>,
}

impl TransformNode {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            id: name.to_string(),
            parent: None,
            children: Vec::new(),
            transform: Transform::new(),
            visibility: 1.0,
            material: None,
            morph_influences: Vec::new(),
            animations: Vec::new(),
            animation_override: None,
        }
    }

    #[must_use]
    pub fn with_material(mut self, material: MaterialProps) -> Self {
        self.material = Some(material);
        self
    }

    #[must_use]
    pub fn with_morph_targets(mut self, count: usize) -> Self {
        self.morph_influences = vec![0.0; count];
        self
    }

    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<NodeHandle> {
        self.parent
    }

    #[inline]
    #[must_use]
    pub fn children(&self) -> &[NodeHandle] {
        &self.children
    }

    /// Whether `property` exists on this particular node.
    #[must_use]
    pub fn has_property(&self, property: NodeProperty) -> bool {
        match property {
            NodeProperty::DiffuseColor | NodeProperty::Alpha => self.material.is_some(),
            NodeProperty::MorphInfluence(i) => usize::from(i) < self.morph_influences.len(),
            _ => true,
        }
    }

    #[must_use]
    pub fn read(&self, property: NodeProperty) -> Option<AnimationValue> {
        let value = match property {
            NodeProperty::Position => self.transform.position.into(),
            NodeProperty::Rotation => self.transform.rotation_euler().into(),
            NodeProperty::RotationQuaternion => self.transform.rotation.into(),
            NodeProperty::Scaling => self.transform.scale.into(),
            NodeProperty::Visibility => self.visibility.into(),
            NodeProperty::DiffuseColor => self.material?.diffuse_color.into(),
            NodeProperty::Alpha => self.material?.alpha.into(),
            NodeProperty::MorphInfluence(i) => (*self.morph_influences.get(usize::from(i))?).into(),
        };
        Some(value)
    }

    /// Writes `value` into `property`. Values of the wrong shape are ignored.
    pub fn write(&mut self, property: NodeProperty, value: &AnimationValue) {
        match (property, *value) {
            (NodeProperty::Position, AnimationValue::Vector3(v)) => self.transform.position = v,
            (NodeProperty::Rotation, AnimationValue::Vector3(v)) => self.transform.set_rotation_euler(v),
            (NodeProperty::RotationQuaternion, AnimationValue::Quaternion(q)) => self.transform.rotation = q,
            (NodeProperty::Scaling, AnimationValue::Vector3(v)) => self.transform.scale = v,
            (NodeProperty::Visibility, AnimationValue::Float(f)) => self.visibility = f,
            (NodeProperty::DiffuseColor, AnimationValue::Color3(c)) => {
                if let Some(material) = &mut self.material {
                    material.diffuse_color = c;
                }
            }
            (NodeProperty::Alpha, AnimationValue::Float(f)) => {
                if let Some(material) = &mut self.material {
                    material.alpha = f;
                }
            }
            (NodeProperty::MorphInfluence(i), AnimationValue::Float(f)) => {
                if let Some(slot) = self.morph_influences.get_mut(usize::from(i)) {
                    *slot = f;
                }
            }
            (property, value) => log::warn!(
                "Node '{}': {} value cannot be written to {property:?}",
                self.name,
                value.data_type().name()
            ),
        }
    }
}

impl Default for TransformNode {
    fn default() -> Self {
        Self::new("node")
    }
}
