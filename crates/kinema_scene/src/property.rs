//! Compiled property accessors.
//!
//! Paths such as `"position"` or `"morphTargets.2.influence"` are parsed once
//! at bind time into a small enum and packed into a
//! [`PropertyKey`](kinema_animation::PropertyKey). Reads and writes then
//! dispatch on the enum without touching the string again.

use kinema_animation::{DataType, PropertyKey, PropertyPath};

const MORPH_BASE: u32 = 0x100;

/// Animatable properties of a [`TransformNode`](crate::TransformNode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeProperty {
    Position,
    /// Euler angles, `(pitch, yaw, roll)`.
    Rotation,
    RotationQuaternion,
    Scaling,
    Visibility,
    DiffuseColor,
    Alpha,
    MorphInfluence(u16),
}

impl NodeProperty {
    #[must_use]
    pub fn parse(path: &PropertyPath) -> Option<Self> {
        let segments = path.segments();
        let property = match segments {
            [single] => match &**single {
                "position" => Self::Position,
                "rotation" => Self::Rotation,
                "rotationQuaternion" => Self::RotationQuaternion,
                "scaling" => Self::Scaling,
                "visibility" => Self::Visibility,
                _ => return None,
            },
            [owner, leaf] if &**owner == "material" => match &**leaf {
                "diffuseColor" => Self::DiffuseColor,
                "alpha" => Self::Alpha,
                _ => return None,
            },
            [owner, index, leaf] if &**owner == "morphTargets" && &**leaf == "influence" => {
                Self::MorphInfluence(index.parse().ok()?)
            }
            _ => return None,
        };
        Some(property)
    }

    #[must_use]
    pub fn key(self) -> PropertyKey {
        PropertyKey(match self {
            Self::Position => 0,
            Self::Rotation => 1,
            Self::RotationQuaternion => 2,
            Self::Scaling => 3,
            Self::Visibility => 4,
            Self::DiffuseColor => 5,
            Self::Alpha => 6,
            Self::MorphInfluence(index) => MORPH_BASE + u32::from(index),
        })
    }

    #[must_use]
    pub fn from_key(key: PropertyKey) -> Option<Self> {
        Some(match key.0 {
            0 => Self::Position,
            1 => Self::Rotation,
            2 => Self::RotationQuaternion,
            3 => Self::Scaling,
            4 => Self::Visibility,
            5 => Self::DiffuseColor,
            6 => Self::Alpha,
            k if k >= MORPH_BASE => Self::MorphInfluence(u16::try_from(k - MORPH_BASE).ok()?),
            _ => return None,
        })
    }

    #[must_use]
    pub fn data_type(self) -> DataType {
        match self {
            Self::Position | Self::Rotation | Self::Scaling => DataType::Vector3,
            Self::RotationQuaternion => DataType::Quaternion,
            Self::Visibility | Self::Alpha | Self::MorphInfluence(_) => DataType::Float,
            Self::DiffuseColor => DataType::Color3,
        }
    }
}

/// Animatable properties of a [`Bone`](crate::Bone).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoneProperty {
    /// The full local matrix.
    Matrix,
    Position,
    RotationQuaternion,
    Scaling,
}

impl BoneProperty {
    #[must_use]
    pub fn parse(path: &PropertyPath) -> Option<Self> {
        match path.as_str() {
            "_matrix" | "matrix" => Some(Self::Matrix),
            "position" => Some(Self::Position),
            "rotationQuaternion" => Some(Self::RotationQuaternion),
            "scaling" => Some(Self::Scaling),
            _ => None,
        }
    }

    #[must_use]
    pub fn key(self) -> PropertyKey {
        PropertyKey(match self {
            Self::Matrix => 0,
            Self::Position => 1,
            Self::RotationQuaternion => 2,
            Self::Scaling => 3,
        })
    }

    #[must_use]
    pub fn from_key(key: PropertyKey) -> Option<Self> {
        match key.0 {
            0 => Some(Self::Matrix),
            1 => Some(Self::Position),
            2 => Some(Self::RotationQuaternion),
            3 => Some(Self::Scaling),
            _ => None,
        }
    }

    #[must_use]
    pub fn data_type(self) -> DataType {
        match self {
            Self::Matrix => DataType::Matrix,
            Self::Position | Self::Scaling => DataType::Vector3,
            Self::RotationQuaternion => DataType::Quaternion,
        }
    }
}
