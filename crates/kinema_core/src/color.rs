//! Color and size value types.
//!
//! `glam` covers vectors, quaternions and matrices. Colors and 2D sizes are
//! animatable too, so they get small `#[repr(C)]` structs with the handful of
//! arithmetic operations blending needs.

use std::ops::{Add, Mul, Sub};

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// RGB color with linear float components.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable, Serialize, Deserialize)]
pub struct Color3 {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color3 {
    pub const BLACK: Self = Self::new(0.0, 0.0, 0.0);
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0);

    #[must_use]
    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    #[must_use]
    pub fn lerp(self, end: Self, t: f32) -> Self {
        self + (end - self) * t
    }

    #[must_use]
    pub fn to_array(self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }

    #[must_use]
    pub fn from_slice(s: &[f32]) -> Option<Self> {
        match s {
            [r, g, b, ..] => Some(Self::new(*r, *g, *b)),
            _ => None,
        }
    }
}

impl Add for Color3 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.r + rhs.r, self.g + rhs.g, self.b + rhs.b)
    }
}

impl Sub for Color3 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.r - rhs.r, self.g - rhs.g, self.b - rhs.b)
    }
}

impl Mul<f32> for Color3 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self::new(self.r * rhs, self.g * rhs, self.b * rhs)
    }
}

/// RGBA color with linear float components.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable, Serialize, Deserialize)]
pub struct Color4 {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color4 {
    pub const TRANSPARENT: Self = Self::new(0.0, 0.0, 0.0, 0.0);
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0, 1.0);

    #[must_use]
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    #[must_use]
    pub fn lerp(self, end: Self, t: f32) -> Self {
        self + (end - self) * t
    }

    #[must_use]
    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    #[must_use]
    pub fn from_slice(s: &[f32]) -> Option<Self> {
        match s {
            [r, g, b, a, ..] => Some(Self::new(*r, *g, *b, *a)),
            _ => None,
        }
    }
}

impl From<Color3> for Color4 {
    fn from(c: Color3) -> Self {
        Self::new(c.r, c.g, c.b, 1.0)
    }
}

impl From<Color3> for Vec3 {
    fn from(c: Color3) -> Self {
        Vec3::new(c.r, c.g, c.b)
    }
}

impl From<Vec3> for Color3 {
    fn from(v: Vec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

impl From<Color4> for Vec4 {
    fn from(c: Color4) -> Self {
        Vec4::new(c.r, c.g, c.b, c.a)
    }
}

impl From<Vec4> for Color4 {
    fn from(v: Vec4) -> Self {
        Self::new(v.x, v.y, v.z, v.w)
    }
}

impl Add for Color4 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.r + rhs.r, self.g + rhs.g, self.b + rhs.b, self.a + rhs.a)
    }
}

impl Sub for Color4 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.r - rhs.r, self.g - rhs.g, self.b - rhs.b, self.a - rhs.a)
    }
}

impl Mul<f32> for Color4 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self::new(self.r * rhs, self.g * rhs, self.b * rhs, self.a * rhs)
    }
}

/// 2D extent (sprite or texture size).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const ZERO: Self = Self::new(0.0, 0.0);

    #[must_use]
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    #[must_use]
    pub fn lerp(self, end: Self, t: f32) -> Self {
        self + (end - self) * t
    }

    #[must_use]
    pub fn to_array(self) -> [f32; 2] {
        [self.width, self.height]
    }

    #[must_use]
    pub fn from_slice(s: &[f32]) -> Option<Self> {
        match s {
            [w, h, ..] => Some(Self::new(*w, *h)),
            _ => None,
        }
    }
}

impl Add for Size {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.width + rhs.width, self.height + rhs.height)
    }
}

impl Sub for Size {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.width - rhs.width, self.height - rhs.height)
    }
}

impl Mul<f32> for Size {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self::new(self.width * rhs, self.height * rhs)
    }
}

impl From<Size> for Vec2 {
    fn from(s: Size) -> Self {
        Vec2::new(s.width, s.height)
    }
}

impl From<Vec2> for Size {
    fn from(v: Vec2) -> Self {
        Self::new(v.x, v.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color3_lerp_midpoint() {
        let c = Color3::BLACK.lerp(Color3::new(1.0, 0.5, 0.0), 0.5);
        assert_eq!(c, Color3::new(0.5, 0.25, 0.0));
    }

    #[test]
    fn color4_from_color3_is_opaque() {
        let c: Color4 = Color3::new(0.1, 0.2, 0.3).into();
        assert_eq!(c.a, 1.0);
    }

    #[test]
    fn color_vector_conversions_keep_components() {
        let v: Vec4 = Color4::new(0.1, 0.2, 0.3, 0.4).into();
        assert_eq!(v, Vec4::new(0.1, 0.2, 0.3, 0.4));
        assert_eq!(Color3::from(Vec3::new(1.0, 0.0, 0.5)), Color3::new(1.0, 0.0, 0.5));
        assert_eq!(Vec2::from(Size::new(4.0, 3.0)), Vec2::new(4.0, 3.0));
    }

    #[test]
    fn size_from_short_slice_is_none() {
        assert!(Size::from_slice(&[1.0]).is_none());
        assert_eq!(Size::from_slice(&[2.0, 3.0]), Some(Size::new(2.0, 3.0)));
    }
}
