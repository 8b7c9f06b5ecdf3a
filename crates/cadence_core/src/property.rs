//! Property metadata
//!
//! Animations address a property by [`PropertyIndex`]. The registry maps an
//! index to its declared value kind, the kind of target that owns it, its
//! default value, and the compositor channel (if any) that can animate it
//! without main-thread participation.

use std::borrow::Cow;

use crate::target::TargetKind;
use crate::value::{AnimValue, Color, Point, ValueKind};

/// Index of a property in the [`PropertyRegistry`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyIndex(pub u32);

impl PropertyIndex {
    pub const OPACITY: PropertyIndex = PropertyIndex(0);
    pub const CANVAS_LEFT: PropertyIndex = PropertyIndex(1);
    pub const CANVAS_TOP: PropertyIndex = PropertyIndex(2);
    pub const TRANSLATE_X: PropertyIndex = PropertyIndex(3);
    pub const TRANSLATE_Y: PropertyIndex = PropertyIndex(4);
    pub const SCALE_X: PropertyIndex = PropertyIndex(5);
    pub const SCALE_Y: PropertyIndex = PropertyIndex(6);
    pub const ROTATION: PropertyIndex = PropertyIndex(7);
    pub const TRANSFORM_CENTER: PropertyIndex = PropertyIndex(8);
    pub const PROJECTION_ROTATION_Y: PropertyIndex = PropertyIndex(9);
    pub const TRANSLATE_Z: PropertyIndex = PropertyIndex(10);
    pub const LOCAL_CLIP_OFFSET: PropertyIndex = PropertyIndex(11);
    pub const CLIP_OFFSET: PropertyIndex = PropertyIndex(12);
    pub const BRUSH_COLOR: PropertyIndex = PropertyIndex(13);
    pub const TRANSITION_OPACITY: PropertyIndex = PropertyIndex(14);
    pub const TRANSITION_CLIP_SCALE: PropertyIndex = PropertyIndex(15);
    pub const WIDTH: PropertyIndex = PropertyIndex(16);
    pub const FONT_SIZE: PropertyIndex = PropertyIndex(17);
    pub const VISIBILITY: PropertyIndex = PropertyIndex(18);
    pub const TEXT: PropertyIndex = PropertyIndex(19);
}

/// Compositor channel an animated property maps onto.
///
/// A visual keeps one composition requirement per channel while any
/// independent animation drives that channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndependentAnimationType {
    Offset,
    Transform,
    Projection,
    Transform3D,
    Opacity,
    LocalClip,
    ElementClip,
    BrushColor,
    TransitionOpacity,
    TransitionClip,
}

impl IndependentAnimationType {
    pub const COUNT: usize = 10;

    pub const ALL: [IndependentAnimationType; Self::COUNT] = [
        IndependentAnimationType::Offset,
        IndependentAnimationType::Transform,
        IndependentAnimationType::Projection,
        IndependentAnimationType::Transform3D,
        IndependentAnimationType::Opacity,
        IndependentAnimationType::LocalClip,
        IndependentAnimationType::ElementClip,
        IndependentAnimationType::BrushColor,
        IndependentAnimationType::TransitionOpacity,
        IndependentAnimationType::TransitionClip,
    ];

    /// Dense index used for per-type counters
    pub fn index(self) -> usize {
        self as usize
    }

    /// Single-bit mask for per-type bitsets
    pub fn bit(self) -> u16 {
        1 << self.index()
    }
}

/// Metadata of one animatable property
#[derive(Clone, Debug)]
pub struct PropertyInfo {
    pub name: Cow<'static, str>,
    pub value_kind: ValueKind,
    /// Kind of object that declares the property (`None` = any object)
    pub owner: Option<TargetKind>,
    pub default_value: AnimValue,
    /// Compositor channel, `None` for properties that always animate on the UI thread
    pub independent: Option<IndependentAnimationType>,
}

impl PropertyInfo {
    pub fn new(name: impl Into<Cow<'static, str>>, default_value: AnimValue) -> Self {
        Self {
            name: name.into(),
            value_kind: default_value.kind(),
            owner: None,
            default_value,
            independent: None,
        }
    }

    pub fn owned_by(mut self, owner: TargetKind) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn independent(mut self, ty: IndependentAnimationType) -> Self {
        self.independent = Some(ty);
        self
    }

    /// Whether an object of `kind` declares this property
    pub fn applies_to(&self, kind: TargetKind) -> bool {
        self.owner.map_or(true, |owner| owner == kind)
    }
}

/// Table of known properties
#[derive(Clone, Debug)]
pub struct PropertyRegistry {
    properties: Vec<PropertyInfo>,
}

impl PropertyRegistry {
    /// Registry pre-populated with the builtin properties in `PropertyIndex` order
    pub fn new() -> Self {
        use IndependentAnimationType as Ia;
        use TargetKind as K;

        let double = |name: &'static str, default: f32| {
            PropertyInfo::new(name, AnimValue::Double(default))
        };

        let properties = vec![
            double("Opacity", 1.0).owned_by(K::Element).independent(Ia::Opacity),
            double("Canvas.Left", 0.0).owned_by(K::Element).independent(Ia::Offset),
            double("Canvas.Top", 0.0).owned_by(K::Element).independent(Ia::Offset),
            double("TranslateX", 0.0).owned_by(K::Transform).independent(Ia::Transform),
            double("TranslateY", 0.0).owned_by(K::Transform).independent(Ia::Transform),
            double("ScaleX", 1.0).owned_by(K::Transform).independent(Ia::Transform),
            double("ScaleY", 1.0).owned_by(K::Transform).independent(Ia::Transform),
            double("Rotation", 0.0).owned_by(K::Transform).independent(Ia::Transform),
            PropertyInfo::new("Center", AnimValue::Point(Point::ZERO))
                .owned_by(K::Transform)
                .independent(Ia::Transform),
            double("RotationY", 0.0).owned_by(K::Projection).independent(Ia::Projection),
            double("TranslateZ", 0.0)
                .owned_by(K::Transform3D)
                .independent(Ia::Transform3D),
            PropertyInfo::new("LocalClip.Offset", AnimValue::Point(Point::ZERO))
                .owned_by(K::Geometry)
                .independent(Ia::LocalClip),
            PropertyInfo::new("Clip.Offset", AnimValue::Point(Point::ZERO))
                .owned_by(K::Element)
                .independent(Ia::ElementClip),
            PropertyInfo::new("Color", AnimValue::Color(Color::TRANSPARENT))
                .owned_by(K::Brush)
                .independent(Ia::BrushColor),
            double("TransitionOpacity", 1.0)
                .owned_by(K::TransitionTarget)
                .independent(Ia::TransitionOpacity),
            double("TransitionClipScale", 1.0)
                .owned_by(K::TransitionTarget)
                .independent(Ia::TransitionClip),
            double("Width", 0.0).owned_by(K::Element),
            double("FontSize", 14.0).owned_by(K::Element),
            PropertyInfo::new("Visibility", AnimValue::Object(true.into())).owned_by(K::Element),
            PropertyInfo::new("Text", AnimValue::Object("".into())).owned_by(K::Element),
        ];

        Self { properties }
    }

    /// Register a custom property and return its index
    pub fn register(&mut self, info: PropertyInfo) -> PropertyIndex {
        let index = PropertyIndex(self.properties.len() as u32);
        tracing::trace!("registered property {} as {:?}", info.name, index);
        self.properties.push(info);
        index
    }

    pub fn get(&self, index: PropertyIndex) -> Option<&PropertyInfo> {
        self.properties.get(index.0 as usize)
    }

    /// Look up a property by its registered name
    pub fn find(&self, name: &str) -> Option<PropertyIndex> {
        self.properties
            .iter()
            .position(|p| p.name == name)
            .map(|i| PropertyIndex(i as u32))
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

impl Default for PropertyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_indices_match_table() {
        let registry = PropertyRegistry::new();
        assert_eq!(registry.find("Opacity"), Some(PropertyIndex::OPACITY));
        assert_eq!(registry.find("Color"), Some(PropertyIndex::BRUSH_COLOR));
        assert_eq!(registry.find("Text"), Some(PropertyIndex::TEXT));
        assert_eq!(
            registry.find("TransitionClipScale"),
            Some(PropertyIndex::TRANSITION_CLIP_SCALE)
        );

        let rotation_y = registry.get(PropertyIndex::PROJECTION_ROTATION_Y).unwrap();
        assert_eq!(rotation_y.independent, Some(IndependentAnimationType::Projection));
        assert_eq!(rotation_y.value_kind, ValueKind::Double);
    }

    #[test]
    fn test_register_custom_property() {
        let mut registry = PropertyRegistry::new();
        let builtin = registry.len();
        let index = registry.register(PropertyInfo::new("Blur", AnimValue::Double(0.0)));
        assert_eq!(index.0 as usize, builtin);
        assert!(registry.get(index).unwrap().applies_to(TargetKind::Brush));
    }

    #[test]
    fn test_ia_type_bits_are_distinct() {
        let mut seen = 0u16;
        for ty in IndependentAnimationType::ALL {
            assert_eq!(seen & ty.bit(), 0);
            seen |= ty.bit();
        }
        assert_eq!(seen.count_ones() as usize, IndependentAnimationType::COUNT);
    }
}
