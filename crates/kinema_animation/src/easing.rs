//! Easing functions applied to the key-to-key gradient.

use std::f32::consts::{FRAC_PI_2, PI, TAU};

use serde::{Deserialize, Serialize};

/// How the ease-in core curve is mapped onto the gradient.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EasingMode {
    #[default]
    EaseIn,
    EaseOut,
    EaseInOut,
}

/// Easing curve shape.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum EasingFunction {
    Circle,
    Back { amplitude: f32 },
    Bounce { bounces: f32, bounciness: f32 },
    Cubic,
    Elastic { oscillations: f32, springiness: f32 },
    Exponential { exponent: f32 },
    Power { power: f32 },
    Quadratic,
    Quartic,
    Quintic,
    Sine,
    Bezier { x1: f32, y1: f32, x2: f32, y2: f32 },
}

/// An easing function together with its mode.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Easing {
    pub function: EasingFunction,
    pub mode: EasingMode,
}

impl Easing {
    #[must_use]
    pub fn new(function: EasingFunction, mode: EasingMode) -> Self {
        Self { function, mode }
    }

    /// Apply the easing to a gradient in `[0, 1]`.
    #[must_use]
    pub fn ease(&self, gradient: f32) -> f32 {
        match self.mode {
            EasingMode::EaseIn => self.ease_in_core(gradient),
            EasingMode::EaseOut => 1.0 - self.ease_in_core(1.0 - gradient),
            EasingMode::EaseInOut => {
                if gradient >= 0.5 {
                    (1.0 - self.ease_in_core((1.0 - gradient) * 2.0)) * 0.5 + 0.5
                } else {
                    self.ease_in_core(gradient * 2.0) * 0.5
                }
            }
        }
    }

    fn ease_in_core(&self, g: f32) -> f32 {
        match self.function {
            EasingFunction::Circle => {
                let g = g.clamp(0.0, 1.0);
                1.0 - (1.0 - g * g).sqrt()
            }
            EasingFunction::Back { amplitude } => {
                let num = amplitude.max(0.0);
                g.powi(3) - g * num * (PI * g).sin()
            }
            EasingFunction::Bounce { bounces, bounciness } => bounce(g, bounces, bounciness),
            EasingFunction::Cubic => g * g * g,
            EasingFunction::Elastic {
                oscillations,
                springiness,
            } => {
                let oscillations = oscillations.max(0.0);
                let springiness = springiness.max(0.0);
                let num = if springiness == 0.0 {
                    g
                } else {
                    ((springiness * g).exp() - 1.0) / (springiness.exp() - 1.0)
                };
                num * ((TAU * oscillations + FRAC_PI_2) * g).sin()
            }
            EasingFunction::Exponential { exponent } => {
                if exponent <= 0.0 {
                    g
                } else {
                    ((exponent * g).exp() - 1.0) / (exponent.exp() - 1.0)
                }
            }
            EasingFunction::Power { power } => g.powf(power.max(0.0)),
            EasingFunction::Quadratic => g * g,
            EasingFunction::Quartic => g.powi(4),
            EasingFunction::Quintic => g.powi(5),
            EasingFunction::Sine => 1.0 - (FRAC_PI_2 * (1.0 - g)).sin(),
            EasingFunction::Bezier { x1, y1, x2, y2 } => cubic_bezier_ease(g, x1, y1, x2, y2),
        }
    }
}

fn bounce(g: f32, bounces: f32, bounciness: f32) -> f32 {
    let y = bounces.max(0.0);
    let bounciness = if bounciness <= 1.0 { 1.001 } else { bounciness };
    let num9 = bounciness.powf(y);
    let num5 = 1.0 - bounciness;
    let num4 = (1.0 - num9) / num5 + num9 * 0.5;
    let num15 = g * num4;
    let num65 = (-num15 * (1.0 - bounciness) + 1.0).ln() / bounciness.ln();
    let num3 = num65.floor();
    let num13 = num3 + 1.0;
    let num8 = (1.0 - bounciness.powf(num3)) / (num5 * num4);
    let num12 = (1.0 - bounciness.powf(num13)) / (num5 * num4);
    let num7 = (num8 + num12) * 0.5;
    let num6 = g - num7;
    let num2 = num7 - num8;
    (-(1.0 / bounciness).powf(y - num3) / (num2 * num2)) * (num6 - num2) * (num6 + num2)
}

/// Cubic bezier easing with control points `(x1, y1)` and `(x2, y2)`.
///
/// Newton-Raphson with a bisection fallback, computed in f64.
fn cubic_bezier_ease(t: f32, x1: f32, y1: f32, x2: f32, y2: f32) -> f32 {
    if t <= 0.0 {
        return 0.0;
    }
    if t >= 1.0 {
        return 1.0;
    }

    let x = f64::from(t);
    let (x1, y1, x2, y2) = (f64::from(x1), f64::from(y1), f64::from(x2), f64::from(y2));

    let mut p = x;
    for _ in 0..8 {
        let err = bezier_sample(p, x1, x2) - x;
        if err.abs() < 1e-7 {
            return bezier_sample(p, y1, y2) as f32;
        }
        let slope = bezier_slope(p, x1, x2);
        if slope.abs() < 1e-7 {
            break;
        }
        p -= err / slope;
    }

    let mut lo = 0.0_f64;
    let mut hi = 1.0_f64;
    p = x;
    for _ in 0..20 {
        let val = bezier_sample(p, x1, x2);
        if (val - x).abs() < 1e-7 {
            break;
        }
        if val < x {
            lo = p;
        } else {
            hi = p;
        }
        p = (lo + hi) * 0.5;
    }

    bezier_sample(p, y1, y2) as f32
}

#[inline]
fn bezier_sample(t: f64, p1: f64, p2: f64) -> f64 {
    let a = 1.0 - 3.0 * p2 + 3.0 * p1;
    let b = 3.0 * p2 - 6.0 * p1;
    let c = 3.0 * p1;
    ((a * t + b) * t + c) * t
}

#[inline]
fn bezier_slope(t: f64, p1: f64, p2: f64) -> f64 {
    let a = 1.0 - 3.0 * p2 + 3.0 * p1;
    let b = 3.0 * p2 - 6.0 * p1;
    let c = 3.0 * p1;
    (3.0 * a * t + 2.0 * b) * t + c
}
