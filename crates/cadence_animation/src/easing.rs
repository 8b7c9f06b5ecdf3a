//! Easing curves
//!
//! Every curve maps normalized progress in `0..=1` to eased progress. The
//! curve families are a closed set: each variant carries its parameters and
//! can describe itself as a compositor-native curve via
//! [`EasingFunction::native_curve`].

use std::f64::consts::PI;

/// Which end of the curve the easing applies to
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum EasingMode {
    EaseIn,
    #[default]
    EaseOut,
    EaseInOut,
}

/// A parameterized easing curve
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EasingFunction {
    /// `1 - sqrt(1 - t²)`
    Circle { mode: EasingMode },
    /// Pulls back by `amplitude` before moving
    Back { mode: EasingMode, amplitude: f64 },
    /// `(e^(exponent·t) - 1) / (e^exponent - 1)`
    Exponential { mode: EasingMode, exponent: f64 },
    /// `t^power`
    Power { mode: EasingMode, power: f64 },
    Quadratic { mode: EasingMode },
    Cubic { mode: EasingMode },
    Quartic { mode: EasingMode },
    Quintic { mode: EasingMode },
    /// Damped oscillation
    Elastic {
        mode: EasingMode,
        oscillations: u32,
        springiness: f64,
    },
    /// Decaying bounces
    Bounce {
        mode: EasingMode,
        bounces: u32,
        bounciness: f64,
    },
    Sine { mode: EasingMode },
}

impl EasingFunction {
    pub fn circle(mode: EasingMode) -> Self {
        Self::Circle { mode }
    }

    pub fn back(mode: EasingMode) -> Self {
        Self::Back {
            mode,
            amplitude: 1.0,
        }
    }

    pub fn exponential(mode: EasingMode) -> Self {
        Self::Exponential {
            mode,
            exponent: 2.0,
        }
    }

    pub fn power(mode: EasingMode, power: f64) -> Self {
        Self::Power { mode, power }
    }

    pub fn elastic(mode: EasingMode) -> Self {
        Self::Elastic {
            mode,
            oscillations: 3,
            springiness: 3.0,
        }
    }

    pub fn bounce(mode: EasingMode) -> Self {
        Self::Bounce {
            mode,
            bounces: 3,
            bounciness: 2.0,
        }
    }

    pub fn sine(mode: EasingMode) -> Self {
        Self::Sine { mode }
    }

    pub fn mode(&self) -> EasingMode {
        match *self {
            Self::Circle { mode }
            | Self::Back { mode, .. }
            | Self::Exponential { mode, .. }
            | Self::Power { mode, .. }
            | Self::Quadratic { mode }
            | Self::Cubic { mode }
            | Self::Quartic { mode }
            | Self::Quintic { mode }
            | Self::Elastic { mode, .. }
            | Self::Bounce { mode, .. }
            | Self::Sine { mode } => mode,
        }
    }

    /// Apply the curve, honoring the easing mode
    pub fn ease(&self, t: f64) -> f64 {
        match self.mode() {
            EasingMode::EaseIn => self.ease_in(t),
            EasingMode::EaseOut => 1.0 - self.ease_in(1.0 - t),
            EasingMode::EaseInOut => {
                if t < 0.5 {
                    self.ease_in(t * 2.0) * 0.5
                } else {
                    (1.0 - self.ease_in((1.0 - t) * 2.0)) * 0.5 + 0.5
                }
            }
        }
    }

    /// The ease-in form of the curve
    fn ease_in(&self, t: f64) -> f64 {
        match *self {
            Self::Circle { .. } => {
                let t = t.clamp(0.0, 1.0);
                1.0 - (1.0 - t * t).sqrt()
            }
            Self::Back { amplitude, .. } => {
                let amplitude = amplitude.max(0.0);
                t * t * t - t * amplitude * (PI * t).sin()
            }
            Self::Exponential { exponent, .. } => {
                if exponent.abs() < f64::EPSILON {
                    t
                } else {
                    ((exponent * t).exp() - 1.0) / (exponent.exp() - 1.0)
                }
            }
            Self::Power { power, .. } => t.powf(power.max(0.0)),
            Self::Quadratic { .. } => t * t,
            Self::Cubic { .. } => t * t * t,
            Self::Quartic { .. } => t * t * t * t,
            Self::Quintic { .. } => t * t * t * t * t,
            Self::Elastic {
                oscillations,
                springiness,
                ..
            } => {
                let springiness = springiness.max(0.0);
                let expo = if springiness < f64::EPSILON {
                    t
                } else {
                    ((springiness * t).exp() - 1.0) / (springiness.exp() - 1.0)
                };
                expo * ((2.0 * PI * oscillations as f64 + PI * 0.5) * t).sin()
            }
            Self::Bounce {
                bounces,
                bounciness,
                ..
            } => bounce_in(t, bounces as f64, bounciness),
            Self::Sine { .. } => 1.0 - (PI * 0.5 * (1.0 - t)).sin(),
        }
    }

    /// Parameter set of the equivalent compositor-native curve
    pub fn native_curve(&self) -> NativeCurve {
        match *self {
            Self::Circle { mode } => NativeCurve::Circle { mode },
            Self::Back { mode, amplitude } => NativeCurve::Back {
                mode,
                amplitude: amplitude.max(0.0) as f32,
            },
            Self::Exponential { mode, exponent } => NativeCurve::Exponential {
                mode,
                exponent: exponent as f32,
            },
            Self::Power { mode, power } => NativeCurve::Power {
                mode,
                power: power.max(0.0) as f32,
            },
            Self::Quadratic { mode } => NativeCurve::Power { mode, power: 2.0 },
            Self::Cubic { mode } => NativeCurve::Power { mode, power: 3.0 },
            Self::Quartic { mode } => NativeCurve::Power { mode, power: 4.0 },
            Self::Quintic { mode } => NativeCurve::Power { mode, power: 5.0 },
            Self::Elastic {
                mode,
                oscillations,
                springiness,
            } => NativeCurve::Elastic {
                mode,
                oscillations,
                springiness: springiness.max(0.0) as f32,
            },
            Self::Bounce {
                mode,
                bounces,
                bounciness,
            } => NativeCurve::Bounce {
                mode,
                bounces,
                bounciness: bounciness as f32,
            },
            Self::Sine { mode } => NativeCurve::Sine { mode },
        }
    }
}

fn bounce_in(t: f64, bounces: f64, bounciness: f64) -> f64 {
    // bounciness of exactly 1 makes the geometric series degenerate
    let bounciness = if bounciness < 1.0 || (bounciness - 1.0).abs() < 1e-9 {
        1.001
    } else {
        bounciness
    };
    let pow = bounciness.powf(bounces);
    let one_minus_bounciness = 1.0 - bounciness;

    let sum_of_units = (1.0 - pow) / one_minus_bounciness + pow * 0.5;
    let unit_at_t = t * sum_of_units;

    let bounce_at_t = (-unit_at_t * one_minus_bounciness + 1.0).ln() / bounciness.ln();
    let start = bounce_at_t.floor();
    let end = start + 1.0;

    let start_time = (1.0 - bounciness.powf(start)) / (one_minus_bounciness * sum_of_units);
    let end_time = (1.0 - bounciness.powf(end)) / (one_minus_bounciness * sum_of_units);

    let mid_time = (start_time + end_time) * 0.5;
    let time_relative_to_peak = t - mid_time;
    let radius = mid_time - start_time;
    let amplitude = (1.0 / bounciness).powf(bounces - start);

    (-amplitude / (radius * radius)) * (time_relative_to_peak - radius) * (time_relative_to_peak + radius)
}

/// Compositor-native curve description
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NativeCurve {
    Back {
        mode: EasingMode,
        amplitude: f32,
    },
    Bounce {
        mode: EasingMode,
        bounces: u32,
        bounciness: f32,
    },
    Circle {
        mode: EasingMode,
    },
    Elastic {
        mode: EasingMode,
        oscillations: u32,
        springiness: f32,
    },
    Exponential {
        mode: EasingMode,
        exponent: f32,
    },
    Power {
        mode: EasingMode,
        power: f32,
    },
    Sine {
        mode: EasingMode,
    },
}

// ============================================================================
// Key splines
// ============================================================================

/// Cubic Bézier progress curve from (0,0) to (1,1)
///
/// The two control points are constrained to the unit square on the x axis
/// so the curve stays a function of time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KeySpline {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl KeySpline {
    pub const LINEAR: KeySpline = KeySpline {
        x1: 0.0,
        y1: 0.0,
        x2: 1.0,
        y2: 1.0,
    };

    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            x1: x1.clamp(0.0, 1.0),
            y1,
            x2: x2.clamp(0.0, 1.0),
            y2,
        }
    }

    fn bezier(p1: f64, p2: f64, s: f64) -> f64 {
        let inv = 1.0 - s;
        3.0 * inv * inv * s * p1 + 3.0 * inv * s * s * p2 + s * s * s
    }

    fn bezier_slope(p1: f64, p2: f64, s: f64) -> f64 {
        let inv = 1.0 - s;
        3.0 * inv * inv * p1 + 6.0 * inv * s * (p2 - p1) + 3.0 * s * s * (1.0 - p2)
    }

    /// Curve parameter whose x coordinate equals `t`
    fn solve_parameter(&self, t: f64) -> f64 {
        let mut s = t;
        for _ in 0..8 {
            let x = Self::bezier(self.x1, self.x2, s) - t;
            if x.abs() < 1e-7 {
                return s;
            }
            let slope = Self::bezier_slope(self.x1, self.x2, s);
            if slope.abs() < 1e-6 {
                break;
            }
            s -= x / slope;
        }

        // Newton did not converge, fall back to bisection
        let (mut lo, mut hi) = (0.0, 1.0);
        s = t;
        for _ in 0..64 {
            let x = Self::bezier(self.x1, self.x2, s);
            if (x - t).abs() < 1e-7 {
                break;
            }
            if x < t {
                lo = s;
            } else {
                hi = s;
            }
            s = (lo + hi) * 0.5;
        }
        s
    }

    /// Eased progress for linear progress `t`
    pub fn progress(&self, t: f64) -> f64 {
        if t <= 0.0 {
            return 0.0;
        }
        if t >= 1.0 {
            return 1.0;
        }
        let s = self.solve_parameter(t);
        Self::bezier(self.y1, self.y2, s)
    }
}

impl Default for KeySpline {
    fn default() -> Self {
        Self::LINEAR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_MODES: [EasingMode; 3] = [EasingMode::EaseIn, EasingMode::EaseOut, EasingMode::EaseInOut];

    fn curves(mode: EasingMode) -> Vec<EasingFunction> {
        vec![
            EasingFunction::circle(mode),
            EasingFunction::back(mode),
            EasingFunction::exponential(mode),
            EasingFunction::power(mode, 2.5),
            EasingFunction::Quadratic { mode },
            EasingFunction::Cubic { mode },
            EasingFunction::Quartic { mode },
            EasingFunction::Quintic { mode },
            EasingFunction::elastic(mode),
            EasingFunction::bounce(mode),
            EasingFunction::sine(mode),
        ]
    }

    #[test]
    fn test_curves_hit_endpoints() {
        for mode in ALL_MODES {
            for curve in curves(mode) {
                assert!(curve.ease(0.0).abs() < 1e-3, "{:?} at 0", curve);
                assert!((curve.ease(1.0) - 1.0).abs() < 1e-3, "{:?} at 1", curve);
            }
        }
    }

    #[test]
    fn test_ease_in_out_is_symmetric() {
        for curve in curves(EasingMode::EaseInOut) {
            assert!((curve.ease(0.5) - 0.5).abs() < 1e-3, "{:?}", curve);
            let a = curve.ease(0.2);
            let b = curve.ease(0.8);
            assert!((a + b - 1.0).abs() < 1e-6, "{:?}", curve);
        }
    }

    #[test]
    fn test_known_values() {
        let quad = EasingFunction::Quadratic {
            mode: EasingMode::EaseIn,
        };
        assert!((quad.ease(0.5) - 0.25).abs() < 1e-9);

        let quad_out = EasingFunction::Quadratic {
            mode: EasingMode::EaseOut,
        };
        assert!((quad_out.ease(0.5) - 0.75).abs() < 1e-9);

        let sine = EasingFunction::sine(EasingMode::EaseIn);
        assert!((sine.ease(0.5) - (1.0 - (PI * 0.25).sin())).abs() < 1e-9);

        // Back pulls below zero before moving forward
        let back = EasingFunction::back(EasingMode::EaseIn);
        assert!(back.ease(0.3) < 0.0);
    }

    #[test]
    fn test_native_curve_projection() {
        let cubic = EasingFunction::Cubic {
            mode: EasingMode::EaseInOut,
        };
        assert_eq!(
            cubic.native_curve(),
            NativeCurve::Power {
                mode: EasingMode::EaseInOut,
                power: 3.0
            }
        );

        let bounce = EasingFunction::bounce(EasingMode::EaseOut);
        assert_eq!(
            bounce.native_curve(),
            NativeCurve::Bounce {
                mode: EasingMode::EaseOut,
                bounces: 3,
                bounciness: 2.0
            }
        );
    }

    #[test]
    fn test_key_spline() {
        let linear = KeySpline::LINEAR;
        for i in 0..=10 {
            let t = i as f64 / 10.0;
            assert!((linear.progress(t) - t).abs() < 1e-5);
        }

        let ease = KeySpline::new(0.42, 0.0, 0.58, 1.0);
        assert!((ease.progress(0.5) - 0.5).abs() < 1e-4);
        assert!(ease.progress(0.25) < 0.25);
        assert!(ease.progress(0.75) > 0.75);

        // Steep curves still resolve monotonically
        let steep = KeySpline::new(0.0, 1.0, 0.0, 1.0);
        let mut last = 0.0;
        for i in 0..=20 {
            let p = steep.progress(i as f64 / 20.0);
            assert!(p + 1e-9 >= last);
            last = p;
        }
    }
}
