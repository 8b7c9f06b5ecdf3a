//! Animatable value types
//!
//! Provides traits and implementations for values that can be animated,
//! including linear interpolation for points and colors and the dynamic
//! blending of [`AnimValue`]s used by the animation state machine.

use cadence_core::{AnimValue, Color, ObjectValue, Point};

/// Trait for values that can be linearly interpolated
pub trait Interpolate: Clone {
    /// Linearly interpolate between self and other by factor t (0.0 to 1.0)
    fn lerp(&self, other: &Self, t: f32) -> Self;

    /// Check if two values are approximately equal
    fn approx_eq(&self, other: &Self, epsilon: f32) -> bool;
}

/// Trait for values that support `By` offsets
pub trait Additive: Clone {
    fn add(&self, other: &Self) -> Self;
}

// ============================================================================
// f32 Implementation
// ============================================================================

impl Interpolate for f32 {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        self + (other - self) * t
    }

    fn approx_eq(&self, other: &Self, epsilon: f32) -> bool {
        (self - other).abs() < epsilon
    }
}

impl Additive for f32 {
    fn add(&self, other: &Self) -> Self {
        self + other
    }
}

// ============================================================================
// Point Implementation
// ============================================================================

impl Interpolate for Point {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        Point::new(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
        )
    }

    fn approx_eq(&self, other: &Self, epsilon: f32) -> bool {
        (self.x - other.x).abs() < epsilon && (self.y - other.y).abs() < epsilon
    }
}

impl Additive for Point {
    fn add(&self, other: &Self) -> Self {
        Point::new(self.x + other.x, self.y + other.y)
    }
}

// ============================================================================
// Color Implementation
// ============================================================================

impl Interpolate for Color {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        Color::lerp(self, other, t)
    }

    fn approx_eq(&self, other: &Self, epsilon: f32) -> bool {
        (self.r - other.r).abs() < epsilon
            && (self.g - other.g).abs() < epsilon
            && (self.b - other.b).abs() < epsilon
            && (self.a - other.a).abs() < epsilon
    }
}

impl Additive for Color {
    fn add(&self, other: &Self) -> Self {
        Color::rgba(
            self.r + other.r,
            self.g + other.g,
            self.b + other.b,
            self.a + other.a,
        )
    }
}

// ============================================================================
// Dynamic values
// ============================================================================

/// Blend two dynamic values of the same kind.
///
/// Object values do not interpolate: `from` is held until progress reaches 1.
/// Returns `None` when the kinds differ.
pub fn interpolate(from: &AnimValue, to: &AnimValue, t: f32) -> Option<AnimValue> {
    match (from, to) {
        (AnimValue::Double(a), AnimValue::Double(b)) => Some(AnimValue::Double(a.lerp(b, t))),
        (AnimValue::Color(a), AnimValue::Color(b)) => Some(AnimValue::Color(a.lerp(b, t))),
        (AnimValue::Point(a), AnimValue::Point(b)) => Some(AnimValue::Point(a.lerp(b, t))),
        (AnimValue::Object(a), AnimValue::Object(b)) => Some(AnimValue::Object(discrete(a, b, t))),
        _ => None,
    }
}

fn discrete(from: &ObjectValue, to: &ObjectValue, t: f32) -> ObjectValue {
    if t >= 1.0 {
        to.clone()
    } else {
        from.clone()
    }
}

/// Sum of two dynamic values of the same interpolating kind
pub fn add(a: &AnimValue, b: &AnimValue) -> Option<AnimValue> {
    match (a, b) {
        (AnimValue::Double(a), AnimValue::Double(b)) => Some(AnimValue::Double(a.add(b))),
        (AnimValue::Color(a), AnimValue::Color(b)) => Some(AnimValue::Color(a.add(b))),
        (AnimValue::Point(a), AnimValue::Point(b)) => Some(AnimValue::Point(a.add(b))),
        _ => None,
    }
}

/// Approximate equality of two dynamic values
pub fn approx_eq(a: &AnimValue, b: &AnimValue, epsilon: f32) -> bool {
    match (a, b) {
        (AnimValue::Double(a), AnimValue::Double(b)) => a.approx_eq(b, epsilon),
        (AnimValue::Color(a), AnimValue::Color(b)) => a.approx_eq(b, epsilon),
        (AnimValue::Point(a), AnimValue::Point(b)) => a.approx_eq(b, epsilon),
        (AnimValue::Object(a), AnimValue::Object(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_interpolation() {
        assert!((0.0_f32.lerp(&1.0, 0.5) - 0.5).abs() < 1e-6);
        assert!((10.0_f32.lerp(&20.0, 0.25) - 12.5).abs() < 1e-6);
    }

    #[test]
    fn test_point_interpolation() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(10.0, 20.0);
        let mid = a.lerp(&b, 0.5);

        assert!((mid.x - 5.0).abs() < 1e-6);
        assert!((mid.y - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_dynamic_interpolation() {
        let v = interpolate(&AnimValue::Double(0.0), &AnimValue::Double(100.0), 0.25).unwrap();
        assert!(approx_eq(&v, &AnimValue::Double(25.0), 1e-4));

        let c = interpolate(
            &AnimValue::Color(Color::BLACK),
            &AnimValue::Color(Color::WHITE),
            0.5,
        )
        .unwrap();
        assert!(approx_eq(&c, &AnimValue::Color(Color::rgb(0.5, 0.5, 0.5)), 1e-4));

        assert!(interpolate(&AnimValue::Double(0.0), &AnimValue::Color(Color::RED), 0.5).is_none());
    }

    #[test]
    fn test_object_values_are_discrete() {
        let from = AnimValue::Object(ObjectValue::from("a"));
        let to = AnimValue::Object(ObjectValue::from("b"));

        assert_eq!(interpolate(&from, &to, 0.99), Some(from.clone()));
        assert_eq!(interpolate(&from, &to, 1.0), Some(to.clone()));
        assert!(add(&from, &to).is_none());
    }

    #[test]
    fn test_add() {
        let sum = add(&AnimValue::Point(Point::new(1.0, 2.0)), &AnimValue::Point(Point::new(3.0, 4.0)));
        assert_eq!(sum, Some(AnimValue::Point(Point::new(4.0, 6.0))));
    }
}
