use std::fmt;
use std::sync::Arc;

use glam::Mat4;
use kinema_core::{KinemaError, Result};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::binding::PropertyPath;
use crate::easing::Easing;
use crate::settings::MatrixInterpolation;
use crate::values::{AnimationValue, DataType};

/// What happens to the value once playback wraps past `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LoopMode {
    /// Each completed loop adds `value(to) - value(from)` on top.
    Relative,
    /// Restart from `from` every loop.
    #[default]
    Cycle,
    /// Freeze at `value(to)` once the first loop completes.
    Constant,
    /// Ping-pong between `from` and `to`.
    Yoyo,
}

/// Per-key interpolation toward the next key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum KeyInterpolation {
    #[default]
    Linear,
    /// Hold this key's value until the next key; tangents are ignored.
    Step,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keyframe {
    pub frame: f32,
    pub value: AnimationValue,
    pub in_tangent: Option<AnimationValue>,
    pub out_tangent: Option<AnimationValue>,
    pub interpolation: KeyInterpolation,
    /// Overrides the curve's easing for the segment starting at this key.
    pub easing: Option<Easing>,
}

impl Keyframe {
    #[must_use]
    pub fn new(frame: f32, value: impl Into<AnimationValue>) -> Self {
        Self {
            frame,
            value: value.into(),
            in_tangent: None,
            out_tangent: None,
            interpolation: KeyInterpolation::Linear,
            easing: None,
        }
    }

    /// A key that holds its value until the next key.
    #[must_use]
    pub fn step(frame: f32, value: impl Into<AnimationValue>) -> Self {
        Self {
            interpolation: KeyInterpolation::Step,
            ..Self::new(frame, value)
        }
    }

    #[must_use]
    pub fn with_tangents(mut self, in_tangent: impl Into<AnimationValue>, out_tangent: impl Into<AnimationValue>) -> Self {
        self.in_tangent = Some(in_tangent.into());
        self.out_tangent = Some(out_tangent.into());
        self
    }

    #[must_use]
    pub fn with_easing(mut self, easing: Easing) -> Self {
        self.easing = Some(easing);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurveRange {
    pub from: f32,
    pub to: f32,
}

/// Callback fired when playback crosses a frame.
pub type EventAction = Arc<dyn Fn(f32) + Send + Sync>;

/// Keyframe event declared on a curve.
///
/// Each runtime instance clones the event list, so `only_once` removal and
/// the done flags are local to one playback of the curve.
#[derive(Clone)]
pub struct CurveEvent {
    pub frame: f32,
    pub action: EventAction,
    pub only_once: bool,
}

impl CurveEvent {
    pub fn new(frame: f32, action: impl Fn(f32) + Send + Sync + 'static) -> Self {
        Self {
            frame,
            action: Arc::new(action),
            only_once: false,
        }
    }

    #[must_use]
    pub fn once(mut self) -> Self {
        self.only_once = true;
        self
    }
}

impl fmt::Debug for CurveEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CurveEvent")
            .field("frame", &self.frame)
            .field("only_once", &self.only_once)
            .finish_non_exhaustive()
    }
}

/// Evaluation cursor for one playback of a curve.
///
/// `key` caches the index of the last start key so monotonic playback scans
/// only a step or two per call. The loop fields are refreshed by the runtime
/// state every tick before evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyframeCursor {
    pub key: isize,
    pub repeat_count: i32,
    pub loop_mode: LoopMode,
    pub offset_value: Option<AnimationValue>,
    pub high_limit_value: Option<AnimationValue>,
}

impl KeyframeCursor {
    #[must_use]
    pub fn new(loop_mode: LoopMode) -> Self {
        Self {
            key: 0,
            repeat_count: 0,
            loop_mode,
            offset_value: None,
            high_limit_value: None,
        }
    }
}

/// Options for [`Curve::make_additive`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdditiveOptions {
    /// Frame whose value becomes the additive reference pose.
    pub reference_frame: f32,
    /// Named range limiting the converted keys; wins over `from_frame`/`to_frame`.
    pub range: Option<String>,
    pub from_frame: Option<f32>,
    pub to_frame: Option<f32>,
    /// Drop keys outside the converted span and shift the rest to start at 0.
    pub clip_keys: bool,
}

/// A named, typed sequence of keyframes.
#[derive(Debug, Clone)]
pub struct Curve {
    pub name: String,
    property_path: PropertyPath,
    pub frames_per_second: f32,
    data_type: DataType,
    pub loop_mode: LoopMode,
    keys: Vec<Keyframe>,
    ranges: FxHashMap<String, CurveRange>,
    events: Vec<CurveEvent>,
    pub easing: Option<Easing>,
    pub enable_blending: bool,
    pub blending_speed: f32,
}

impl Curve {
    /// Creates a curve and validates its keys.
    ///
    /// Keys are sorted by frame. An empty key list or a key whose value type
    /// differs from `data_type` is rejected.
    pub fn new(
        name: &str,
        property: &str,
        frames_per_second: f32,
        data_type: DataType,
        loop_mode: LoopMode,
        keys: Vec<Keyframe>,
    ) -> Result<Self> {
        let mut curve = Self {
            name: name.to_string(),
            property_path: PropertyPath::new(property),
            frames_per_second,
            data_type,
            loop_mode,
            keys: Vec::new(),
            ranges: FxHashMap::default(),
            events: Vec::new(),
            easing: None,
            enable_blending: false,
            blending_speed: 0.01,
        };
        curve.set_keys(keys)?;
        Ok(curve)
    }

    /// Replaces all keys, validating them like [`Curve::new`].
    pub fn set_keys(&mut self, mut keys: Vec<Keyframe>) -> Result<()> {
        if keys.is_empty() {
            return Err(KinemaError::EmptyCurve { name: self.name.clone() });
        }
        for (index, key) in keys.iter().enumerate() {
            if !key.frame.is_finite() {
                return Err(KinemaError::InvalidFrameRange {
                    from: key.frame,
                    to: key.frame,
                });
            }
            let typed = [Some(key.value), key.in_tangent, key.out_tangent];
            for value in typed.into_iter().flatten() {
                if value.data_type() != self.data_type {
                    return Err(KinemaError::KeyTypeMismatch {
                        curve: self.name.clone(),
                        index,
                        expected: self.data_type.name(),
                        found: value.data_type().name(),
                    });
                }
            }
        }
        keys.sort_by(|a, b| a.frame.total_cmp(&b.frame));
        self.keys = keys;
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn keys(&self) -> &[Keyframe] {
        &self.keys
    }

    #[inline]
    #[must_use]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    #[inline]
    #[must_use]
    pub fn property_path(&self) -> &PropertyPath {
        &self.property_path
    }

    #[inline]
    #[must_use]
    pub fn target_property(&self) -> &str {
        self.property_path.as_str()
    }

    #[must_use]
    pub fn first_frame(&self) -> f32 {
        self.keys.first().map_or(0.0, |k| k.frame)
    }

    #[must_use]
    pub fn highest_frame(&self) -> f32 {
        self.keys.last().map_or(0.0, |k| k.frame)
    }

    /// Copy of the curve with a frame-0 key holding the first value, when the
    /// first key starts later than frame 0.
    #[must_use]
    pub fn with_leading_frame_zero(&self) -> Self {
        let mut repaired = self.clone();
        if let Some(first) = repaired.keys.first().copied()
            && first.frame > 0.0
        {
            repaired.keys.insert(0, Keyframe::new(0.0, first.value));
        }
        repaired
    }

    // ------------------------------------------------------------------
    // Ranges
    // ------------------------------------------------------------------

    /// Declares a named range. An existing range with that name is kept.
    pub fn create_range(&mut self, name: &str, from: f32, to: f32) {
        self.ranges.entry(name.to_string()).or_insert(CurveRange { from, to });
    }

    /// Removes a named range and, with `delete_frames`, every key inside it.
    ///
    /// Deleting frames that would leave the curve empty is rejected.
    pub fn delete_range(&mut self, name: &str, delete_frames: bool) -> Result<()> {
        let Some(range) = self.ranges.get(name).copied() else {
            return Ok(());
        };
        if delete_frames {
            let kept: Vec<Keyframe> = self
                .keys
                .iter()
                .filter(|k| k.frame < range.from || k.frame > range.to)
                .copied()
                .collect();
            if kept.is_empty() {
                return Err(KinemaError::EmptyCurve { name: self.name.clone() });
            }
            self.keys = kept;
        }
        self.ranges.remove(name);
        Ok(())
    }

    #[must_use]
    pub fn range(&self, name: &str) -> Option<CurveRange> {
        self.ranges.get(name).copied()
    }

    /// Ranges sorted by name.
    #[must_use]
    pub fn ranges(&self) -> Vec<(&str, CurveRange)> {
        let mut out: Vec<_> = self.ranges.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        out.sort_by(|a, b| a.0.cmp(b.0));
        out
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Adds an event, keeping the list ordered by frame.
    pub fn add_event(&mut self, event: CurveEvent) {
        let index = self.events.partition_point(|e| e.frame <= event.frame);
        self.events.insert(index, event);
    }

    /// Removes every event declared at `frame`.
    pub fn remove_events(&mut self, frame: f32) {
        self.events.retain(|e| e.frame != frame);
    }

    #[must_use]
    pub fn events(&self) -> &[CurveEvent] {
        &self.events
    }

    // ------------------------------------------------------------------
    // Evaluation
    // ------------------------------------------------------------------

    /// Stateless evaluation at `frame` with constant (non-repeating) semantics.
    #[must_use]
    pub fn evaluate(&self, frame: f32) -> AnimationValue {
        self.evaluate_with(frame, MatrixInterpolation::Decompose)
    }

    #[must_use]
    pub fn evaluate_with(&self, frame: f32, matrix_mode: MatrixInterpolation) -> AnimationValue {
        let mut cursor = KeyframeCursor::new(LoopMode::Constant);
        self.interpolate(frame, &mut cursor, matrix_mode)
    }

    /// Core key lookup and interpolation.
    ///
    /// The cursor's `key` is scanned backward while it overshoots `frame`,
    /// then forward while the next key has been reached.
    pub fn interpolate(&self, frame: f32, cursor: &mut KeyframeCursor, matrix_mode: MatrixInterpolation) -> AnimationValue {
        if cursor.loop_mode == LoopMode::Constant
            && cursor.repeat_count > 0
            && let Some(high) = cursor.high_limit_value
        {
            return high;
        }

        let keys = &self.keys;
        let len = keys.len() as isize;
        if len == 1 {
            return keys[0].value;
        }

        let mut key = cursor.key.clamp(-1, len - 1);
        while key >= 0 && frame < keys[key as usize].frame {
            key -= 1;
        }
        while key + 1 < len && frame >= keys[(key + 1) as usize].frame {
            key += 1;
        }
        cursor.key = key;

        if key < 0 {
            return keys[0].value;
        }
        if key + 1 >= len {
            return keys[(len - 1) as usize].value;
        }

        let start = &keys[key as usize];
        let end = &keys[(key + 1) as usize];

        if start.interpolation == KeyInterpolation::Step {
            return start.value;
        }

        let frame_delta = end.frame - start.frame;
        let mut gradient = (frame - start.frame) / frame_delta;
        if let Some(easing) = start.easing.or(self.easing) {
            gradient = easing.ease(gradient);
        }

        let value = match (start.out_tangent, end.in_tangent) {
            (Some(out_tangent), Some(in_tangent)) if self.data_type != DataType::Matrix => {
                AnimationValue::cubic(&start.value, &out_tangent, &in_tangent, &end.value, gradient, frame_delta)
            }
            _ => start.value.lerp(&end.value, gradient, matrix_mode),
        };

        match (cursor.loop_mode, self.data_type) {
            (LoopMode::Relative, dt) if dt != DataType::Matrix => match cursor.offset_value {
                Some(offset) if cursor.repeat_count != 0 => value.add(&offset.scale(cursor.repeat_count as f32)),
                _ => value,
            },
            _ => value,
        }
    }

    // ------------------------------------------------------------------
    // Editing
    // ------------------------------------------------------------------

    /// Ensures a key exists at `frame` and returns its index.
    ///
    /// A new key takes the value the curve currently evaluates to at `frame`.
    pub fn create_key_for_frame(&mut self, frame: f32) -> usize {
        if let Some(index) = self.keys.iter().position(|k| k.frame == frame) {
            return index;
        }
        let value = self.evaluate(frame);
        let index = self.keys.partition_point(|k| k.frame < frame);
        self.keys.insert(index, Keyframe::new(frame, value));
        index
    }

    /// Converts the curve in place into an additive curve relative to the
    /// value at `options.reference_frame`.
    pub fn make_additive(&mut self, options: &AdditiveOptions) -> Result<()> {
        let first = self.keys[0];
        let last = self.keys[self.keys.len() - 1];

        let (from, to) = if let Some(range_name) = &options.range {
            let range = self
                .range(range_name)
                .ok_or_else(|| KinemaError::UnknownRange(range_name.clone()))?;
            (range.from, range.to)
        } else {
            (
                options.from_frame.unwrap_or(first.frame),
                options.to_frame.unwrap_or(last.frame),
            )
        };
        if from > to {
            return Err(KinemaError::InvalidFrameRange { from, to });
        }

        let reference_frame = options.reference_frame.max(0.0);
        let reference = if self.keys.len() == 1 || reference_frame <= first.frame {
            first.value
        } else if reference_frame >= last.frame {
            last.value
        } else {
            self.evaluate(reference_frame)
        };

        let start_index = if from == first.frame { 0 } else { self.create_key_for_frame(from) };
        let end_index = if to == last.frame {
            self.keys.len() - 1
        } else {
            self.create_key_for_frame(to)
        };

        let delta = AdditiveReference::new(reference);
        for key in &mut self.keys[start_index..=end_index] {
            key.value = delta.apply(&key.value);
        }

        if options.clip_keys {
            let start_frame = self.keys[start_index].frame;
            let mut clipped: Vec<Keyframe> = self.keys[start_index..=end_index].to_vec();
            for key in &mut clipped {
                key.frame -= start_frame;
            }
            self.keys = clipped;
        }
        Ok(())
    }

    /// Additive copy of this curve; the original is untouched.
    pub fn to_additive(&self, options: &AdditiveOptions, name: Option<&str>) -> Result<Self> {
        let mut copy = self.clone();
        if let Some(name) = name {
            copy.name = name.to_string();
        }
        copy.make_additive(options)?;
        Ok(copy)
    }
}

/// Reference pose subtracted from every key during additive conversion.
enum AdditiveReference {
    Value(AnimationValue),
    /// Conjugated, normalized rotation.
    Rotation(glam::Quat),
    Matrix {
        scale: glam::Vec3,
        rotation_conjugate: glam::Quat,
        translation: glam::Vec3,
    },
}

impl AdditiveReference {
    fn new(reference: AnimationValue) -> Self {
        match reference {
            AnimationValue::Quaternion(q) => AdditiveReference::Rotation(q.normalize().conjugate()),
            AnimationValue::Matrix(m) => {
                let (scale, rotation, translation) = m.to_scale_rotation_translation();
                AdditiveReference::Matrix {
                    scale,
                    rotation_conjugate: rotation.normalize().conjugate(),
                    translation,
                }
            }
            other => AdditiveReference::Value(other),
        }
    }

    fn apply(&self, value: &AnimationValue) -> AnimationValue {
        match (self, value) {
            (AdditiveReference::Rotation(conj), AnimationValue::Quaternion(q)) => AnimationValue::Quaternion(*conj * *q),
            (
                AdditiveReference::Matrix {
                    scale,
                    rotation_conjugate,
                    translation,
                },
                AnimationValue::Matrix(m),
            ) => {
                let (key_scale, key_rotation, key_translation) = m.to_scale_rotation_translation();
                AnimationValue::Matrix(Mat4::from_scale_rotation_translation(
                    key_scale / *scale,
                    *rotation_conjugate * key_rotation,
                    key_translation - *translation,
                ))
            }
            (AdditiveReference::Value(reference), v) => v.subtract(reference),
            (_, v) => *v,
        }
    }
}
