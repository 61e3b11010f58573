//! Curve JSON layout.
//!
//! ```json
//! {
//!   "name": "walk", "property": "position", "framePerSecond": 30,
//!   "dataType": 1, "loopBehavior": 1,
//!   "enableBlending": false, "blendingSpeed": 0.01,
//!   "keys": [{ "frame": 0, "values": [0, 0, 0] }],
//!   "ranges": [{ "name": "idle", "from": 0, "to": 30 }]
//! }
//! ```
//!
//! A key's `values` holds the value components, then the in-tangent and
//! out-tangent components (`null` when absent), then the interpolation code.
//! Matrix keys never carry tangents, so their interpolation code follows the
//! 16 matrix components directly.

use kinema_core::{KinemaError, Result};
use serde::{Deserialize, Serialize};

use crate::curve::{Curve, KeyInterpolation, Keyframe, LoopMode};
use crate::values::{AnimationValue, DataType};

const INTERPOLATION_STEP: f32 = 1.0;

impl DataType {
    /// Numeric code used in the JSON layout.
    #[must_use]
    pub fn code(self) -> u32 {
        match self {
            DataType::Float => 0,
            DataType::Vector3 => 1,
            DataType::Quaternion => 2,
            DataType::Matrix => 3,
            DataType::Color3 => 4,
            DataType::Vector2 => 5,
            DataType::Size => 6,
            DataType::Color4 => 7,
        }
    }

    #[must_use]
    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            0 => DataType::Float,
            1 => DataType::Vector3,
            2 => DataType::Quaternion,
            3 => DataType::Matrix,
            4 => DataType::Color3,
            5 => DataType::Vector2,
            6 => DataType::Size,
            7 => DataType::Color4,
            _ => return None,
        })
    }
}

impl LoopMode {
    #[must_use]
    pub fn code(self) -> u32 {
        match self {
            LoopMode::Relative => 0,
            LoopMode::Cycle => 1,
            LoopMode::Constant => 2,
            LoopMode::Yoyo => 4,
        }
    }

    #[must_use]
    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            0 => LoopMode::Relative,
            1 => LoopMode::Cycle,
            2 => LoopMode::Constant,
            4 => LoopMode::Yoyo,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyDocument {
    pub frame: f32,
    pub values: Vec<Option<f32>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeDocument {
    pub name: String,
    pub from: f32,
    pub to: f32,
}

/// Serialized form of a [`Curve`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurveDocument {
    pub name: String,
    pub property: String,
    pub frame_per_second: f32,
    pub data_type: u32,
    #[serde(default = "default_loop_behavior")]
    pub loop_behavior: u32,
    #[serde(default)]
    pub enable_blending: bool,
    #[serde(default = "default_blending_speed")]
    pub blending_speed: f32,
    pub keys: Vec<KeyDocument>,
    #[serde(default)]
    pub ranges: Vec<RangeDocument>,
}

fn default_loop_behavior() -> u32 {
    LoopMode::Cycle.code()
}

fn default_blending_speed() -> f32 {
    0.01
}

impl Curve {
    #[must_use]
    pub fn to_document(&self) -> CurveDocument {
        let data_type = self.data_type();
        let n = data_type.component_count();
        let keys = self
            .keys()
            .iter()
            .map(|key| {
                let mut values: Vec<Option<f32>> = key.value.to_components().into_iter().map(Some).collect();
                let step = key.interpolation == KeyInterpolation::Step;
                if data_type != DataType::Matrix {
                    let has_tangents = key.in_tangent.is_some() || key.out_tangent.is_some();
                    if has_tangents || step {
                        push_tangent(&mut values, key.in_tangent.as_ref(), n);
                        push_tangent(&mut values, key.out_tangent.as_ref(), n);
                    }
                }
                if step {
                    values.push(Some(INTERPOLATION_STEP));
                }
                KeyDocument { frame: key.frame, values }
            })
            .collect();

        CurveDocument {
            name: self.name.clone(),
            property: self.target_property().to_string(),
            frame_per_second: self.frames_per_second,
            data_type: data_type.code(),
            loop_behavior: self.loop_mode.code(),
            enable_blending: self.enable_blending,
            blending_speed: self.blending_speed,
            keys,
            ranges: self
                .ranges()
                .into_iter()
                .map(|(name, r)| RangeDocument {
                    name: name.to_string(),
                    from: r.from,
                    to: r.to,
                })
                .collect(),
        }
    }

    pub fn from_document(doc: &CurveDocument) -> Result<Self> {
        let data_type = DataType::from_code(doc.data_type)
            .ok_or_else(|| KinemaError::InvalidData(format!("unknown dataType {}", doc.data_type)))?;
        let loop_mode = LoopMode::from_code(doc.loop_behavior)
            .ok_or_else(|| KinemaError::InvalidData(format!("unknown loopBehavior {}", doc.loop_behavior)))?;
        let n = data_type.component_count();

        let mut keys = Vec::with_capacity(doc.keys.len());
        for key in &doc.keys {
            let value = read_group(&key.values, 0, n, data_type).ok_or_else(|| {
                KinemaError::InvalidData(format!("key at frame {} of '{}' is truncated", key.frame, doc.name))
            })?;
            let mut keyframe = Keyframe::new(key.frame, value);
            let interpolation_slot = if data_type == DataType::Matrix {
                n
            } else {
                keyframe.in_tangent = read_group(&key.values, n, n, data_type);
                keyframe.out_tangent = read_group(&key.values, 2 * n, n, data_type);
                3 * n
            };
            if key.values.get(interpolation_slot).copied().flatten() == Some(INTERPOLATION_STEP) {
                keyframe.interpolation = KeyInterpolation::Step;
            }
            keys.push(keyframe);
        }

        let mut curve = Curve::new(&doc.name, &doc.property, doc.frame_per_second, data_type, loop_mode, keys)?;
        curve.enable_blending = doc.enable_blending;
        curve.blending_speed = doc.blending_speed;
        for range in &doc.ranges {
            curve.create_range(&range.name, range.from, range.to);
        }
        Ok(curve)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_document())?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let doc: CurveDocument = serde_json::from_str(json)?;
        Self::from_document(&doc)
    }
}

fn push_tangent(values: &mut Vec<Option<f32>>, tangent: Option<&AnimationValue>, n: usize) {
    match tangent {
        Some(t) => values.extend(t.to_components().into_iter().map(Some)),
        None => values.extend(std::iter::repeat_n(None, n)),
    }
}

/// Reads `n` components starting at `start`; any missing or null entry
/// yields `None`.
fn read_group(values: &[Option<f32>], start: usize, n: usize, data_type: DataType) -> Option<AnimationValue> {
    let slice = values.get(start..start + n)?;
    let components: Option<Vec<f32>> = slice.iter().copied().collect();
    AnimationValue::from_components(data_type, &components?)
}
