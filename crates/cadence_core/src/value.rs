//! Animatable value types
//!
//! Every property an animation can drive holds one of the variants of
//! [`AnimValue`]. The declared [`ValueKind`] of a property is checked
//! against the value kind of the animation that targets it.

use std::fmt;
use std::sync::Arc;

// ============================================================================
// Primitive value types
// ============================================================================

/// RGBA color with linear float channels
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);
    pub const RED: Color = Color::rgb(1.0, 0.0, 0.0);
    pub const GREEN: Color = Color::rgb(0.0, 1.0, 0.0);
    pub const BLUE: Color = Color::rgb(0.0, 0.0, 1.0);
    pub const TRANSPARENT: Color = Color::rgba(0.0, 0.0, 0.0, 0.0);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn from_hex(hex: u32) -> Self {
        let r = ((hex >> 16) & 0xFF) as f32 / 255.0;
        let g = ((hex >> 8) & 0xFF) as f32 / 255.0;
        let b = (hex & 0xFF) as f32 / 255.0;
        Self::rgb(r, g, b)
    }

    pub fn to_array(&self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// Linear interpolation between two colors.
    ///
    /// `t` is not clamped: overshooting easing curves produce
    /// extrapolated channels.
    pub fn lerp(a: &Color, b: &Color, t: f32) -> Color {
        Color {
            r: a.r + (b.r - a.r) * t,
            g: a.g + (b.g - a.g) * t,
            b: a.b + (b.b - a.b) * t,
            a: a.a + (b.a - a.a) * t,
        }
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::TRANSPARENT
    }
}

/// 2D point
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Non-interpolating property value (visibility flags, text, enum ordinals)
#[derive(Clone, Debug, PartialEq)]
pub enum ObjectValue {
    Bool(bool),
    Int(i64),
    Text(Arc<str>),
}

impl From<bool> for ObjectValue {
    fn from(value: bool) -> Self {
        ObjectValue::Bool(value)
    }
}

impl From<i64> for ObjectValue {
    fn from(value: i64) -> Self {
        ObjectValue::Int(value)
    }
}

impl From<&str> for ObjectValue {
    fn from(value: &str) -> Self {
        ObjectValue::Text(Arc::from(value))
    }
}

// ============================================================================
// Dynamic value
// ============================================================================

/// The declared type of a property or animation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Double,
    Color,
    Point,
    Object,
}

impl ValueKind {
    /// Whether values of this kind can be blended continuously
    pub fn is_interpolating(self) -> bool {
        !matches!(self, ValueKind::Object)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Double => "Double",
            ValueKind::Color => "Color",
            ValueKind::Point => "Point",
            ValueKind::Object => "Object",
        };
        f.write_str(name)
    }
}

/// A property value of any animatable kind
#[derive(Clone, Debug, PartialEq)]
pub enum AnimValue {
    Double(f32),
    Color(Color),
    Point(Point),
    Object(ObjectValue),
}

impl AnimValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            AnimValue::Double(_) => ValueKind::Double,
            AnimValue::Color(_) => ValueKind::Color,
            AnimValue::Point(_) => ValueKind::Point,
            AnimValue::Object(_) => ValueKind::Object,
        }
    }

    /// The zero value of a kind, used when a property has no default
    pub fn zero(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Double => AnimValue::Double(0.0),
            ValueKind::Color => AnimValue::Color(Color::TRANSPARENT),
            ValueKind::Point => AnimValue::Point(Point::ZERO),
            ValueKind::Object => AnimValue::Object(ObjectValue::Bool(false)),
        }
    }

    pub fn as_double(&self) -> Option<f32> {
        match self {
            AnimValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_color(&self) -> Option<Color> {
        match self {
            AnimValue::Color(c) => Some(*c),
            _ => None,
        }
    }

    pub fn as_point(&self) -> Option<Point> {
        match self {
            AnimValue::Point(p) => Some(*p),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectValue> {
        match self {
            AnimValue::Object(o) => Some(o),
            _ => None,
        }
    }
}

impl From<f32> for AnimValue {
    fn from(value: f32) -> Self {
        AnimValue::Double(value)
    }
}

impl From<Color> for AnimValue {
    fn from(value: Color) -> Self {
        AnimValue::Color(value)
    }
}

impl From<Point> for AnimValue {
    fn from(value: Point) -> Self {
        AnimValue::Point(value)
    }
}

impl From<ObjectValue> for AnimValue {
    fn from(value: ObjectValue) -> Self {
        AnimValue::Object(value)
    }
}
