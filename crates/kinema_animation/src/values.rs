use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
use kinema_core::{Color3, Color4, Size};
use serde::{Deserialize, Serialize};

use crate::settings::MatrixInterpolation;

/// Data type tag carried by every curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Float,
    Vector2,
    Vector3,
    Quaternion,
    Matrix,
    Color3,
    Color4,
    Size,
}

impl DataType {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            DataType::Float => "Float",
            DataType::Vector2 => "Vector2",
            DataType::Vector3 => "Vector3",
            DataType::Quaternion => "Quaternion",
            DataType::Matrix => "Matrix",
            DataType::Color3 => "Color3",
            DataType::Color4 => "Color4",
            DataType::Size => "Size",
        }
    }

    /// Number of float components one value of this type occupies when flattened.
    #[must_use]
    pub fn component_count(self) -> usize {
        match self {
            DataType::Float => 1,
            DataType::Vector2 | DataType::Size => 2,
            DataType::Vector3 | DataType::Color3 => 3,
            DataType::Quaternion | DataType::Color4 => 4,
            DataType::Matrix => 16,
        }
    }
}

/// Shape-erased animated value.
///
/// A closed union over the supported data types. Generic code matches on the
/// variant and calls the per-type [`Interpolatable`] / [`Blendable`]
/// implementation instead of probing values for capabilities at runtime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnimationValue {
    Float(f32),
    Vector2(Vec2),
    Vector3(Vec3),
    Quaternion(Quat),
    Matrix(Mat4),
    Color3(Color3),
    Color4(Color4),
    Size(Size),
}

/// Linear and Hermite interpolation for one concrete value type.
///
/// `interpolate_linear` does not clamp `t`; callers clamp the frame to the
/// key range before computing the gradient.
pub trait Interpolatable: Copy {
    fn interpolate_linear(start: Self, end: Self, t: f32) -> Self;

    /// Hermite interpolation. Tangents are expressed per frame and scaled by
    /// `dt`, the frame distance between the two keys.
    fn interpolate_cubic(v0: Self, out_tangent0: Self, in_tangent1: Self, v1: Self, t: f32, dt: f32)
    -> Self;
}

/// Arithmetic needed by loop offsets, additive layers and weighted sums.
pub trait Blendable: Interpolatable {
    const ZERO: Self;

    fn subtract(self, other: Self) -> Self;

    fn add(self, other: Self) -> Self;

    fn scale(self, factor: f32) -> Self;

    /// `acc + self * factor`
    fn scale_and_add(self, factor: f32, acc: Self) -> Self {
        acc.add(self.scale(factor))
    }
}

#[inline]
fn hermite_basis(t: f32) -> (f32, f32, f32, f32) {
    let t2 = t * t;
    let t3 = t2 * t;

    let s2 = -2.0 * t3 + 3.0 * t2;
    let s3 = t3 - t2;
    let s0 = 1.0 - s2;
    let s1 = s3 - t2 + t;
    (s0, s1, s2, s3)
}

impl Interpolatable for f32 {
    fn interpolate_linear(start: Self, end: Self, t: f32) -> Self {
        start + (end - start) * t
    }

    fn interpolate_cubic(v0: Self, out_tangent0: Self, in_tangent1: Self, v1: Self, t: f32, dt: f32) -> Self {
        let (s0, s1, s2, s3) = hermite_basis(t);
        let m0 = out_tangent0 * dt;
        let m1 = in_tangent1 * dt;
        s0 * v0 + s1 * m0 + s2 * v1 + s3 * m1
    }
}

impl Blendable for f32 {
    const ZERO: Self = 0.0;

    fn subtract(self, other: Self) -> Self {
        self - other
    }

    fn add(self, other: Self) -> Self {
        self + other
    }

    fn scale(self, factor: f32) -> Self {
        self * factor
    }
}

macro_rules! impl_vector_like {
    ($ty:ty, $zero:expr) => {
        impl Interpolatable for $ty {
            fn interpolate_linear(start: Self, end: Self, t: f32) -> Self {
                start + (end - start) * t
            }

            fn interpolate_cubic(
                v0: Self,
                out_tangent0: Self,
                in_tangent1: Self,
                v1: Self,
                t: f32,
                dt: f32,
            ) -> Self {
                let (s0, s1, s2, s3) = hermite_basis(t);
                let m0 = out_tangent0 * dt;
                let m1 = in_tangent1 * dt;
                v0 * s0 + m0 * s1 + v1 * s2 + m1 * s3
            }
        }

        impl Blendable for $ty {
            const ZERO: Self = $zero;

            fn subtract(self, other: Self) -> Self {
                self - other
            }

            fn add(self, other: Self) -> Self {
                self + other
            }

            fn scale(self, factor: f32) -> Self {
                self * factor
            }
        }
    };
}

impl_vector_like!(Vec2, Vec2::ZERO);
impl_vector_like!(Vec3, Vec3::ZERO);
impl_vector_like!(Color3, Color3::BLACK);
impl_vector_like!(Color4, Color4::TRANSPARENT);
impl_vector_like!(Size, Size::ZERO);

impl Interpolatable for Quat {
    fn interpolate_linear(start: Self, end: Self, t: f32) -> Self {
        start.slerp(end, t)
    }

    fn interpolate_cubic(v0: Self, out_tangent0: Self, in_tangent1: Self, v1: Self, t: f32, dt: f32) -> Self {
        let (s0, s1, s2, s3) = hermite_basis(t);

        let v0_v = Vec4::from(v0);
        let v1_v = Vec4::from(v1);
        let m0_v = Vec4::from(out_tangent0) * dt;
        let m1_v = Vec4::from(in_tangent1) * dt;

        let result = v0_v * s0 + m0_v * s1 + v1_v * s2 + m1_v * s3;

        Quat::from_vec4(result).normalize()
    }
}

// Component-wise: relative loop offsets on quaternions accumulate raw
// component deltas, matching how the offsets are later added back.
impl Blendable for Quat {
    const ZERO: Self = Quat::from_xyzw(0.0, 0.0, 0.0, 0.0);

    fn subtract(self, other: Self) -> Self {
        self - other
    }

    fn add(self, other: Self) -> Self {
        self + other
    }

    fn scale(self, factor: f32) -> Self {
        self * factor
    }
}

/// Decomposes both matrices into scale / rotation / translation, interpolates
/// each part and recomposes.
#[must_use]
pub fn decompose_lerp(start: &Mat4, end: &Mat4, t: f32) -> Mat4 {
    let (s0, r0, p0) = start.to_scale_rotation_translation();
    let (s1, r1, p1) = end.to_scale_rotation_translation();
    Mat4::from_scale_rotation_translation(s0.lerp(s1, t), r0.slerp(r1, t), p0.lerp(p1, t))
}

/// Plain component-wise interpolation of the 16 matrix entries.
#[must_use]
pub fn component_lerp(start: &Mat4, end: &Mat4, t: f32) -> Mat4 {
    *start + (*end - *start) * t
}

impl Interpolatable for Mat4 {
    fn interpolate_linear(start: Self, end: Self, t: f32) -> Self {
        decompose_lerp(&start, &end, t)
    }

    // Matrix keys carry no usable tangents; cubic keys fall back to the
    // decomposed blend.
    fn interpolate_cubic(v0: Self, _out_tangent0: Self, _in_tangent1: Self, v1: Self, t: f32, _dt: f32) -> Self {
        decompose_lerp(&v0, &v1, t)
    }
}

impl Blendable for Mat4 {
    const ZERO: Self = Mat4::ZERO;

    fn subtract(self, other: Self) -> Self {
        self - other
    }

    fn add(self, other: Self) -> Self {
        self + other
    }

    fn scale(self, factor: f32) -> Self {
        self * factor
    }
}

macro_rules! dispatch_binary {
    ($a:expr, $b:expr, |$x:ident, $y:ident| $body:expr, $fallback:expr) => {
        match ($a, $b) {
            (AnimationValue::Float($x), AnimationValue::Float($y)) => AnimationValue::Float($body),
            (AnimationValue::Vector2($x), AnimationValue::Vector2($y)) => AnimationValue::Vector2($body),
            (AnimationValue::Vector3($x), AnimationValue::Vector3($y)) => AnimationValue::Vector3($body),
            (AnimationValue::Quaternion($x), AnimationValue::Quaternion($y)) => {
                AnimationValue::Quaternion($body)
            }
            (AnimationValue::Matrix($x), AnimationValue::Matrix($y)) => AnimationValue::Matrix($body),
            (AnimationValue::Color3($x), AnimationValue::Color3($y)) => AnimationValue::Color3($body),
            (AnimationValue::Color4($x), AnimationValue::Color4($y)) => AnimationValue::Color4($body),
            (AnimationValue::Size($x), AnimationValue::Size($y)) => AnimationValue::Size($body),
            _ => $fallback,
        }
    };
}

impl AnimationValue {
    #[must_use]
    pub fn data_type(&self) -> DataType {
        match self {
            AnimationValue::Float(_) => DataType::Float,
            AnimationValue::Vector2(_) => DataType::Vector2,
            AnimationValue::Vector3(_) => DataType::Vector3,
            AnimationValue::Quaternion(_) => DataType::Quaternion,
            AnimationValue::Matrix(_) => DataType::Matrix,
            AnimationValue::Color3(_) => DataType::Color3,
            AnimationValue::Color4(_) => DataType::Color4,
            AnimationValue::Size(_) => DataType::Size,
        }
    }

    /// Additive identity of the given type (zero offset).
    #[must_use]
    pub fn zero(data_type: DataType) -> Self {
        match data_type {
            DataType::Float => AnimationValue::Float(0.0),
            DataType::Vector2 => AnimationValue::Vector2(Vec2::ZERO),
            DataType::Vector3 => AnimationValue::Vector3(Vec3::ZERO),
            DataType::Quaternion => AnimationValue::Quaternion(<Quat as Blendable>::ZERO),
            DataType::Matrix => AnimationValue::Matrix(Mat4::ZERO),
            DataType::Color3 => AnimationValue::Color3(Color3::BLACK),
            DataType::Color4 => AnimationValue::Color4(Color4::TRANSPARENT),
            DataType::Size => AnimationValue::Size(Size::ZERO),
        }
    }

    /// Interpolates between two values of the same type.
    ///
    /// Mismatched variants degrade to returning `end` unchanged.
    #[must_use]
    pub fn lerp(&self, end: &Self, t: f32, matrix_mode: MatrixInterpolation) -> Self {
        if let (AnimationValue::Matrix(a), AnimationValue::Matrix(b)) = (self, end) {
            return AnimationValue::Matrix(match matrix_mode {
                MatrixInterpolation::Decompose => decompose_lerp(a, b, t),
                MatrixInterpolation::Linear => component_lerp(a, b, t),
                MatrixInterpolation::None => *a,
            });
        }
        dispatch_binary!(*self, *end, |x, y| Interpolatable::interpolate_linear(x, y, t), *end)
    }

    /// Hermite interpolation between two keys; `dt` is the frame distance.
    #[must_use]
    pub fn cubic(v0: &Self, out_tangent0: &Self, in_tangent1: &Self, v1: &Self, t: f32, dt: f32) -> Self {
        use AnimationValue as V;
        match (*v0, *out_tangent0, *in_tangent1, *v1) {
            (V::Float(a), V::Float(b), V::Float(c), V::Float(d)) => V::Float(f32::interpolate_cubic(a, b, c, d, t, dt)),
            (V::Vector2(a), V::Vector2(b), V::Vector2(c), V::Vector2(d)) => {
                V::Vector2(Vec2::interpolate_cubic(a, b, c, d, t, dt))
            }
            (V::Vector3(a), V::Vector3(b), V::Vector3(c), V::Vector3(d)) => {
                V::Vector3(Vec3::interpolate_cubic(a, b, c, d, t, dt))
            }
            (V::Quaternion(a), V::Quaternion(b), V::Quaternion(c), V::Quaternion(d)) => {
                V::Quaternion(Quat::interpolate_cubic(a, b, c, d, t, dt))
            }
            (V::Matrix(a), V::Matrix(b), V::Matrix(c), V::Matrix(d)) => V::Matrix(Mat4::interpolate_cubic(a, b, c, d, t, dt)),
            (V::Color3(a), V::Color3(b), V::Color3(c), V::Color3(d)) => {
                V::Color3(Color3::interpolate_cubic(a, b, c, d, t, dt))
            }
            (V::Color4(a), V::Color4(b), V::Color4(c), V::Color4(d)) => {
                V::Color4(Color4::interpolate_cubic(a, b, c, d, t, dt))
            }
            (V::Size(a), V::Size(b), V::Size(c), V::Size(d)) => V::Size(Size::interpolate_cubic(a, b, c, d, t, dt)),
            _ => v0.lerp(v1, t, MatrixInterpolation::Decompose),
        }
    }

    /// `self - other`; mismatched variants return `self`.
    #[must_use]
    pub fn subtract(&self, other: &Self) -> Self {
        dispatch_binary!(*self, *other, |x, y| Blendable::subtract(x, y), *self)
    }

    /// `self + other`; mismatched variants return `self`.
    #[must_use]
    pub fn add(&self, other: &Self) -> Self {
        dispatch_binary!(*self, *other, |x, y| Blendable::add(x, y), *self)
    }

    #[must_use]
    pub fn scale(&self, factor: f32) -> Self {
        match *self {
            AnimationValue::Float(v) => AnimationValue::Float(v.scale(factor)),
            AnimationValue::Vector2(v) => AnimationValue::Vector2(v.scale(factor)),
            AnimationValue::Vector3(v) => AnimationValue::Vector3(v.scale(factor)),
            AnimationValue::Quaternion(v) => AnimationValue::Quaternion(Blendable::scale(v, factor)),
            AnimationValue::Matrix(v) => AnimationValue::Matrix(Blendable::scale(v, factor)),
            AnimationValue::Color3(v) => AnimationValue::Color3(v.scale(factor)),
            AnimationValue::Color4(v) => AnimationValue::Color4(v.scale(factor)),
            AnimationValue::Size(v) => AnimationValue::Size(v.scale(factor)),
        }
    }

    /// `acc + self * factor`
    #[must_use]
    pub fn scale_and_add(&self, factor: f32, acc: &Self) -> Self {
        acc.add(&self.scale(factor))
    }

    /// Flattens the value into its float components.
    #[must_use]
    pub fn to_components(&self) -> Vec<f32> {
        match self {
            AnimationValue::Float(v) => vec![*v],
            AnimationValue::Vector2(v) => v.to_array().to_vec(),
            AnimationValue::Vector3(v) => v.to_array().to_vec(),
            AnimationValue::Quaternion(v) => v.to_array().to_vec(),
            AnimationValue::Matrix(v) => v.to_cols_array().to_vec(),
            AnimationValue::Color3(v) => v.to_array().to_vec(),
            AnimationValue::Color4(v) => v.to_array().to_vec(),
            AnimationValue::Size(v) => v.to_array().to_vec(),
        }
    }

    /// Rebuilds a value of `data_type` from flattened components.
    #[must_use]
    pub fn from_components(data_type: DataType, c: &[f32]) -> Option<Self> {
        if c.len() < data_type.component_count() {
            return None;
        }
        Some(match data_type {
            DataType::Float => AnimationValue::Float(c[0]),
            DataType::Vector2 => AnimationValue::Vector2(Vec2::from_slice(c)),
            DataType::Vector3 => AnimationValue::Vector3(Vec3::from_slice(c)),
            DataType::Quaternion => AnimationValue::Quaternion(Quat::from_slice(c)),
            DataType::Matrix => AnimationValue::Matrix(Mat4::from_cols_slice(c)),
            DataType::Color3 => AnimationValue::Color3(Color3::from_slice(c)?),
            DataType::Color4 => AnimationValue::Color4(Color4::from_slice(c)?),
            DataType::Size => AnimationValue::Size(Size::from_slice(c)?),
        })
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f32> {
        match self {
            AnimationValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_vec3(&self) -> Option<Vec3> {
        match self {
            AnimationValue::Vector3(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_quat(&self) -> Option<Quat> {
        match self {
            AnimationValue::Quaternion(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_mat4(&self) -> Option<Mat4> {
        match self {
            AnimationValue::Matrix(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<f32> for AnimationValue {
    fn from(v: f32) -> Self {
        AnimationValue::Float(v)
    }
}

impl From<Vec2> for AnimationValue {
    fn from(v: Vec2) -> Self {
        AnimationValue::Vector2(v)
    }
}

impl From<Vec3> for AnimationValue {
    fn from(v: Vec3) -> Self {
        AnimationValue::Vector3(v)
    }
}

impl From<Quat> for AnimationValue {
    fn from(v: Quat) -> Self {
        AnimationValue::Quaternion(v)
    }
}

impl From<Mat4> for AnimationValue {
    fn from(v: Mat4) -> Self {
        AnimationValue::Matrix(v)
    }
}

impl From<Color3> for AnimationValue {
    fn from(v: Color3) -> Self {
        AnimationValue::Color3(v)
    }
}

impl From<Color4> for AnimationValue {
    fn from(v: Color4) -> Self {
        AnimationValue::Color4(v)
    }
}

impl From<Size> for AnimationValue {
    fn from(v: Size) -> Self {
        AnimationValue::Size(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn cubic_with_zero_tangents_hits_endpoints() {
        let v = f32::interpolate_cubic(0.0, 0.0, 0.0, 10.0, 0.0, 1.0);
        assert_eq!(v, 0.0);
        let v = f32::interpolate_cubic(0.0, 0.0, 0.0, 10.0, 1.0, 1.0);
        assert_eq!(v, 10.0);
    }

    #[test]
    fn interpolator_does_not_clamp_gradient() {
        assert_eq!(f32::interpolate_linear(0.0, 10.0, 1.5), 15.0);
    }

    #[test]
    fn cubic_quaternion_is_normalized() {
        let q0 = Quat::IDENTITY;
        let q1 = Quat::from_rotation_x(FRAC_PI_2);
        let q = Quat::interpolate_cubic(q0, q1, q1, q1, 0.3, 2.0);
        assert!((q.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn decompose_lerp_keeps_rotation_rigid() {
        let a = Mat4::from_scale_rotation_translation(Vec3::ONE, Quat::IDENTITY, Vec3::ZERO);
        let b = Mat4::from_scale_rotation_translation(Vec3::ONE, Quat::from_rotation_z(FRAC_PI_2), Vec3::X);
        let m = decompose_lerp(&a, &b, 0.5);
        let (scale, _, translation) = m.to_scale_rotation_translation();
        assert!((scale - Vec3::ONE).length() < 1e-5);
        assert!((translation - Vec3::new(0.5, 0.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn mismatched_lerp_returns_right_hand_value() {
        let a = AnimationValue::Float(1.0);
        let b = AnimationValue::Vector3(Vec3::ONE);
        assert_eq!(a.lerp(&b, 0.5, MatrixInterpolation::Decompose), b);
    }

    #[test]
    fn components_round_trip_for_color4() {
        let v = AnimationValue::Color4(Color4::new(0.1, 0.2, 0.3, 0.4));
        let back = AnimationValue::from_components(DataType::Color4, &v.to_components());
        assert_eq!(back, Some(v));
    }
}
