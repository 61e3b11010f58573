//! Late binding: weighted writes to one property are collected during the
//! tick and resolved into a single write afterwards.
//!
//! Override contributions are normalized by their total weight. When that
//! total stays below 1 the property's original value fills the remainder.
//! Additive contributions are applied on top at their own weight and are
//! never normalized against the overrides.

use glam::{Mat4, Quat, Vec3};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::binding::{AnimationHost, PropertyKey, TargetId};
use crate::settings::MatrixInterpolation;
use crate::values::AnimationValue;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contribution {
    pub value: AnimationValue,
    pub weight: f32,
}

/// Accumulator for one `(target, property)` pair during a tick.
#[derive(Debug, Clone)]
pub struct LateBindingHolder {
    pub target: TargetId,
    pub key: PropertyKey,
    pub total_weight: f32,
    pub total_additive_weight: f32,
    pub overrides: SmallVec<[Contribution; 4]>,
    pub additives: SmallVec<[Contribution; 2]>,
    pub original_value: AnimationValue,
}

impl LateBindingHolder {
    fn new(target: TargetId, key: PropertyKey, original_value: AnimationValue) -> Self {
        Self {
            target,
            key,
            total_weight: 0.0,
            total_additive_weight: 0.0,
            overrides: SmallVec::new(),
            additives: SmallVec::new(),
            original_value,
        }
    }

    /// Blends every contribution into the final value.
    #[must_use]
    pub fn resolve(&self, matrix_mode: MatrixInterpolation) -> AnimationValue {
        match self.original_value {
            AnimationValue::Quaternion(original) => AnimationValue::Quaternion(self.resolve_quaternion(original)),
            AnimationValue::Matrix(original) if matrix_mode == MatrixInterpolation::Decompose => {
                AnimationValue::Matrix(self.resolve_matrix(original))
            }
            _ => self.resolve_linear(),
        }
    }

    fn resolve_linear(&self) -> AnimationValue {
        let (mut result, normalizer, skip) = if self.total_weight < 1.0 {
            let base = if self.overrides.is_empty() {
                self.original_value
            } else {
                self.original_value.scale(1.0 - self.total_weight)
            };
            (base, 1.0, 0)
        } else {
            let first = self.overrides[0];
            (first.value.scale(first.weight / self.total_weight), self.total_weight, 1)
        };

        for c in &self.overrides[skip..] {
            let scale = c.weight / normalizer;
            if scale != 0.0 {
                result = c.value.scale_and_add(scale, &result);
            }
        }
        for c in &self.additives {
            if c.weight != 0.0 {
                result = c.value.scale_and_add(c.weight, &result);
            }
        }
        result
    }

    fn resolve_quaternion(&self, original: Quat) -> Quat {
        if self.total_weight == 0.0 && self.total_additive_weight == 0.0 {
            return original;
        }

        let mut result = if self.total_weight == 0.0 {
            original
        } else if self.overrides.len() == 1 {
            let only = quat_of(&self.overrides[0].value, original);
            original.slerp(only, self.total_weight.min(1.0))
        } else {
            let mut weighted: SmallVec<[(Quat, f32); 5]> = SmallVec::new();
            if self.total_weight < 1.0 {
                weighted.push((original, 1.0 - self.total_weight));
            }
            weighted.extend(self.overrides.iter().map(|c| (quat_of(&c.value, original), c.weight)));
            slerp_chain(&weighted)
        };

        for c in &self.additives {
            if c.weight == 0.0 {
                continue;
            }
            let additive = quat_of(&c.value, Quat::IDENTITY);
            result = result.slerp(result * additive, c.weight);
        }
        result.normalize()
    }

    fn resolve_matrix(&self, original: Mat4) -> Mat4 {
        if self.total_weight == 0.0 && self.total_additive_weight == 0.0 {
            return original;
        }

        let (mut scale, mut rotation, mut translation) = if self.total_weight == 0.0 {
            original.to_scale_rotation_translation()
        } else {
            let mut parts: SmallVec<[(Vec3, Quat, Vec3, f32); 5]> = SmallVec::new();
            let normalizer = self.total_weight.max(1.0);
            if self.total_weight < 1.0 {
                let (s, r, t) = original.to_scale_rotation_translation();
                parts.push((s, r, t, 1.0 - self.total_weight));
            }
            for c in &self.overrides {
                let m = c.value.as_mat4().unwrap_or(original);
                let (s, r, t) = m.to_scale_rotation_translation();
                parts.push((s, r, t, c.weight / normalizer));
            }

            if parts.len() == 1 && parts[0].3 == 1.0 && self.total_additive_weight == 0.0 {
                return self.overrides[0].value.as_mat4().unwrap_or(original);
            }

            let mut scale = Vec3::ZERO;
            let mut translation = Vec3::ZERO;
            let mut rotations: SmallVec<[(Quat, f32); 5]> = SmallVec::new();
            for &(s, r, t, w) in &parts {
                scale += s * w;
                translation += t * w;
                rotations.push((r, w));
            }
            (scale, slerp_chain(&rotations), translation)
        };

        for c in &self.additives {
            if c.weight == 0.0 {
                continue;
            }
            let Some(m) = c.value.as_mat4() else { continue };
            let (s, r, t) = m.to_scale_rotation_translation();
            scale = scale.lerp(scale * s, c.weight);
            rotation = rotation.slerp(rotation * r, c.weight);
            translation += t * c.weight;
        }

        Mat4::from_scale_rotation_translation(scale, rotation.normalize(), translation)
    }
}

fn quat_of(value: &AnimationValue, fallback: Quat) -> Quat {
    value.as_quat().unwrap_or(fallback)
}

/// Pairwise spherical blend. Each step slerps the running result toward the
/// next rotation by that rotation's share of the mass accumulated so far.
fn slerp_chain(weighted: &[(Quat, f32)]) -> Quat {
    let Some(&(first, first_weight)) = weighted.first() else {
        return Quat::IDENTITY;
    };
    let mut result = first;
    let mut accumulated = first_weight;
    for &(q, w) in &weighted[1..] {
        accumulated += w;
        if accumulated > 0.0 && w > 0.0 {
            result = result.slerp(q, w / accumulated);
        }
    }
    result
}

/// Per-tick registry of late-bound writes.
///
/// Holders are kept in registration order so resolution is deterministic.
#[derive(Debug, Default)]
pub struct LateBindingCompositor {
    holders: Vec<LateBindingHolder>,
    index: FxHashMap<(TargetId, PropertyKey), usize>,
}

impl LateBindingCompositor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a weighted contribution for `(target, key)`.
    ///
    /// `original_value` is only used when this is the first contribution to
    /// the property in the current tick.
    pub fn register(
        &mut self,
        target: TargetId,
        key: PropertyKey,
        value: AnimationValue,
        weight: f32,
        is_additive: bool,
        original_value: AnimationValue,
    ) {
        let slot = *self.index.entry((target, key)).or_insert_with(|| {
            self.holders.push(LateBindingHolder::new(target, key, original_value));
            self.holders.len() - 1
        });
        let holder = &mut self.holders[slot];
        let contribution = Contribution { value, weight };
        if is_additive {
            holder.total_additive_weight += weight;
            holder.additives.push(contribution);
        } else {
            holder.total_weight += weight;
            holder.overrides.push(contribution);
        }
    }

    #[must_use]
    pub fn holder(&self, target: TargetId, key: PropertyKey) -> Option<&LateBindingHolder> {
        self.index.get(&(target, key)).map(|&i| &self.holders[i])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.holders.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.holders.is_empty()
    }

    /// Writes one blended value per registered property, then clears.
    pub fn resolve(&mut self, host: &mut dyn AnimationHost, matrix_mode: MatrixInterpolation) {
        if self.holders.is_empty() {
            return;
        }
        log::trace!("Resolving {} late-bound properties", self.holders.len());
        for holder in &self.holders {
            let value = holder.resolve(matrix_mode);
            host.write_property(holder.target, holder.key, &value);
        }
        self.clear();
    }

    pub fn clear(&mut self) {
        self.holders.clear();
        self.index.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    const TARGET: TargetId = TargetId::External(1);
    const KEY: PropertyKey = PropertyKey(0);

    fn float_holder(original: f32, overrides: &[(f32, f32)], additives: &[(f32, f32)]) -> AnimationValue {
        let mut compositor = LateBindingCompositor::new();
        for &(v, w) in overrides {
            compositor.register(TARGET, KEY, v.into(), w, false, original.into());
        }
        for &(v, w) in additives {
            compositor.register(TARGET, KEY, v.into(), w, true, original.into());
        }
        compositor.holder(TARGET, KEY).unwrap().resolve(MatrixInterpolation::Decompose)
    }

    #[test]
    fn partial_weights_keep_original_share() {
        let v = float_holder(10.0, &[(2.0, 0.25), (4.0, 0.25)], &[]).as_float().unwrap();
        assert!((v - (10.0 * 0.5 + 2.0 * 0.25 + 4.0 * 0.25)).abs() < 1e-5);
    }

    #[test]
    fn excess_weights_are_renormalized() {
        let v = float_holder(10.0, &[(2.0, 1.0), (4.0, 3.0)], &[]).as_float().unwrap();
        assert!((v - (2.0 * 0.25 + 4.0 * 0.75)).abs() < 1e-5);
    }

    #[test]
    fn zero_weight_resolves_to_original() {
        let v = float_holder(7.0, &[(2.0, 0.0)], &[]).as_float().unwrap();
        assert_eq!(v, 7.0);
    }

    #[test]
    fn additive_is_not_normalized() {
        let v = float_holder(1.0, &[(2.0, 2.0)], &[(3.0, 0.5)]).as_float().unwrap();
        assert!((v - (2.0 + 1.5)).abs() < 1e-5);
    }

    #[test]
    fn quaternion_single_override_slerps_from_original() {
        let mut compositor = LateBindingCompositor::new();
        let target = Quat::from_rotation_y(FRAC_PI_2);
        compositor.register(TARGET, KEY, target.into(), 0.5, false, Quat::IDENTITY.into());
        let q = compositor.holder(TARGET, KEY).unwrap().resolve(MatrixInterpolation::Decompose);
        let q = q.as_quat().unwrap();
        assert!(q.angle_between(Quat::from_rotation_y(FRAC_PI_2 * 0.5)) < 1e-4);
    }

    #[test]
    fn quaternion_mix_is_normalized() {
        let rotations = [
            Quat::from_rotation_x(0.3),
            Quat::from_rotation_y(1.2),
            Quat::from_rotation_z(-2.0),
        ];
        for weights in [[0.1, 0.2, 0.3], [1.0, 1.0, 1.0], [0.0, 0.7, 2.5], [0.5, 0.0, 0.0]] {
            for additive_weight in [0.0, 0.4, 1.0] {
                let mut compositor = LateBindingCompositor::new();
                let original = Quat::from_rotation_x(-0.8);
                for (q, w) in rotations.iter().zip(weights) {
                    compositor.register(TARGET, KEY, (*q).into(), w, false, original.into());
                }
                compositor.register(
                    TARGET,
                    KEY,
                    Quat::from_rotation_z(0.6).into(),
                    additive_weight,
                    true,
                    original.into(),
                );
                let q = compositor.holder(TARGET, KEY).unwrap().resolve(MatrixInterpolation::Decompose);
                assert!((q.as_quat().unwrap().length() - 1.0).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn matrix_full_weight_override_is_exact() {
        let mut compositor = LateBindingCompositor::new();
        let m = Mat4::from_scale_rotation_translation(Vec3::splat(2.0), Quat::from_rotation_z(0.4), Vec3::X);
        compositor.register(TARGET, KEY, m.into(), 1.0, false, Mat4::IDENTITY.into());
        let resolved = compositor.holder(TARGET, KEY).unwrap().resolve(MatrixInterpolation::Decompose);
        assert_eq!(resolved, AnimationValue::Matrix(m));
    }

    #[test]
    fn matrix_half_weight_blends_translation() {
        let mut compositor = LateBindingCompositor::new();
        let m = Mat4::from_translation(Vec3::new(4.0, 0.0, 0.0));
        compositor.register(TARGET, KEY, m.into(), 0.5, false, Mat4::IDENTITY.into());
        let resolved = compositor
            .holder(TARGET, KEY)
            .unwrap()
            .resolve(MatrixInterpolation::Decompose)
            .as_mat4()
            .unwrap();
        assert!((resolved.w_axis.x - 2.0).abs() < 1e-5);
    }
}
