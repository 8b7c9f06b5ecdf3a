//! Property animations
//!
//! An [`Animation`] is the leaf of a timing tree that writes values into one
//! property of one target. Its content is either a From/To/By description
//! with an optional easing curve, a key frame collection, or a pointer key
//! frame collection.
//!
//! Besides the authored content, an animation carries the runtime state the
//! scheduler maintains between `begin` and `finalize`: the resolved target,
//! the base value it interpolates from, the value it computed last, whether
//! it controls its (target, property) pair, and its compositor conversion.

use cadence_core::{AnimValue, PropertyIndex, TargetId, ValueKind};

use crate::composition::{CompositionAnimation, CompositionAnimationConversionResult, CompositorAnimationId};
use crate::easing::EasingFunction;
use crate::error::{AnimationError, Result};
use crate::keyframe::{resolve_segment, KeyFrameCollection, PointerKeyFrameCollection};
use crate::values;

/// Duration of From/To/By animations without an explicit duration
pub const DEFAULT_NATURAL_DURATION: f64 = 1.0;

/// How an animation finds its target
#[derive(Clone, Debug, PartialEq)]
pub enum AnimationTarget {
    Id(TargetId),
    /// Looked up in the target tree when the animation begins
    Name(String),
}

impl From<TargetId> for AnimationTarget {
    fn from(id: TargetId) -> Self {
        AnimationTarget::Id(id)
    }
}

impl From<&str> for AnimationTarget {
    fn from(name: &str) -> Self {
        AnimationTarget::Name(name.to_owned())
    }
}

impl From<String> for AnimationTarget {
    fn from(name: String) -> Self {
        AnimationTarget::Name(name)
    }
}

/// What an animation interpolates
#[derive(Clone, Debug)]
pub enum AnimationContent {
    FromToBy {
        from: Option<AnimValue>,
        to: Option<AnimValue>,
        by: Option<AnimValue>,
        easing: Option<EasingFunction>,
    },
    KeyFrames(KeyFrameCollection),
    /// Double key frames positioned by pointer value
    PointerKeyFrames(PointerKeyFrameCollection),
}

impl Default for AnimationContent {
    fn default() -> Self {
        AnimationContent::FromToBy {
            from: None,
            to: None,
            by: None,
            easing: None,
        }
    }
}

/// A leaf timeline animating one property
#[derive(Clone, Debug)]
pub struct Animation {
    target: AnimationTarget,
    property: PropertyIndex,
    content: AnimationContent,

    pub(crate) resolved_target: Option<TargetId>,
    pub(crate) base_value: Option<AnimValue>,
    pub(crate) current_value: Option<AnimValue>,
    pub(crate) begun: bool,
    pub(crate) has_control: bool,
    pub(crate) has_handoff: bool,
    pub(crate) is_independent: bool,
    /// The "not independent" diagnostic was emitted since begin
    pub(crate) reported_dependent: bool,
    /// The held value was written after the active period ended
    pub(crate) final_value_applied: bool,
    /// Conversion was dropped because the target left the tree
    pub(crate) detached: bool,
    pub(crate) conversion: Option<std::result::Result<CompositionAnimation, CompositionAnimationConversionResult>>,
    pub(crate) compositor_animation: Option<CompositorAnimationId>,
    /// Compositor animation of the predecessor this one continues from
    pub(crate) handoff_from: Option<CompositorAnimationId>,
}

impl Animation {
    /// From/To/By animation with no operands yet
    pub fn new(target: impl Into<AnimationTarget>, property: PropertyIndex) -> Self {
        Self::with_content(target, property, AnimationContent::default())
    }

    pub fn key_frames(target: impl Into<AnimationTarget>, property: PropertyIndex, frames: KeyFrameCollection) -> Self {
        Self::with_content(target, property, AnimationContent::KeyFrames(frames))
    }

    pub fn pointer_key_frames(
        target: impl Into<AnimationTarget>,
        property: PropertyIndex,
        frames: PointerKeyFrameCollection,
    ) -> Self {
        Self::with_content(target, property, AnimationContent::PointerKeyFrames(frames))
    }

    pub fn with_content(target: impl Into<AnimationTarget>, property: PropertyIndex, content: AnimationContent) -> Self {
        Self {
            target: target.into(),
            property,
            content,
            resolved_target: None,
            base_value: None,
            current_value: None,
            begun: false,
            has_control: false,
            has_handoff: false,
            is_independent: false,
            reported_dependent: false,
            final_value_applied: false,
            detached: false,
            conversion: None,
            compositor_animation: None,
            handoff_from: None,
        }
    }

    fn ensure_from_to_by(&mut self) {
        if !matches!(self.content, AnimationContent::FromToBy { .. }) {
            self.content = AnimationContent::default();
        }
    }

    pub fn with_from(mut self, value: impl Into<AnimValue>) -> Self {
        self.ensure_from_to_by();
        if let AnimationContent::FromToBy { from, .. } = &mut self.content {
            *from = Some(value.into());
        }
        self
    }

    pub fn with_to(mut self, value: impl Into<AnimValue>) -> Self {
        self.ensure_from_to_by();
        if let AnimationContent::FromToBy { to, .. } = &mut self.content {
            *to = Some(value.into());
        }
        self
    }

    pub fn with_by(mut self, value: impl Into<AnimValue>) -> Self {
        self.ensure_from_to_by();
        if let AnimationContent::FromToBy { by, .. } = &mut self.content {
            *by = Some(value.into());
        }
        self
    }

    pub fn with_easing(mut self, easing: EasingFunction) -> Self {
        self.ensure_from_to_by();
        if let AnimationContent::FromToBy { easing: slot, .. } = &mut self.content {
            *slot = Some(easing);
        }
        self
    }

    pub fn target(&self) -> &AnimationTarget {
        &self.target
    }

    pub fn property(&self) -> PropertyIndex {
        self.property
    }

    pub fn content(&self) -> &AnimationContent {
        &self.content
    }

    /// Replace the content; the scheduler must be told the animation changed
    pub(crate) fn content_mut(&mut self) -> &mut AnimationContent {
        &mut self.content
    }

    /// Value kind produced by the content, `None` when it cannot be determined
    pub fn value_kind(&self) -> Option<ValueKind> {
        match &self.content {
            AnimationContent::FromToBy { from, to, by, .. } => {
                let mut kinds = [from, to, by].into_iter().flatten().map(AnimValue::kind);
                let first = kinds.next()?;
                kinds.all(|k| k == first).then_some(first)
            }
            AnimationContent::KeyFrames(frames) => frames.value_kind(),
            AnimationContent::PointerKeyFrames(_) => Some(ValueKind::Double),
        }
    }

    /// Kind of the first operand, used to report mixed operand kinds
    fn first_operand_kind(&self) -> Option<ValueKind> {
        match &self.content {
            AnimationContent::FromToBy { from, to, by, .. } => {
                [from, to, by].into_iter().flatten().map(AnimValue::kind).next()
            }
            AnimationContent::KeyFrames(frames) => frames.frames().first().map(|f| f.value.kind()),
            AnimationContent::PointerKeyFrames(_) => Some(ValueKind::Double),
        }
    }

    /// Check the content against the declared type of the animated property
    pub fn validate(&self, property_name: &str, expected: ValueKind) -> Result<()> {
        if let AnimationContent::KeyFrames(frames) = &self.content {
            if let Some(index) = frames.first_invalid_key_time() {
                return Err(AnimationError::InvalidKeyTime { index });
            }
        }
        let found = match self.value_kind() {
            Some(kind) => kind,
            // An operand-less animation animates nothing but is valid
            None if self.first_operand_kind().is_none() => return Ok(()),
            None => {
                return Err(AnimationError::IncompatibleValueType {
                    property: property_name.to_owned(),
                    expected,
                    found: self.first_operand_kind().unwrap_or(expected),
                })
            }
        };
        if found != expected {
            return Err(AnimationError::IncompatibleValueType {
                property: property_name.to_owned(),
                expected,
                found,
            });
        }
        if let AnimationContent::FromToBy { by: Some(_), .. } = &self.content {
            if !found.is_interpolating() {
                return Err(AnimationError::IncompatibleValueType {
                    property: property_name.to_owned(),
                    expected,
                    found,
                });
            }
        }
        Ok(())
    }

    /// Duration implied by the content
    pub fn natural_duration(&self) -> f64 {
        match &self.content {
            AnimationContent::FromToBy { .. } | AnimationContent::PointerKeyFrames(_) => DEFAULT_NATURAL_DURATION,
            AnimationContent::KeyFrames(frames) => frames.natural_duration().unwrap_or(DEFAULT_NATURAL_DURATION),
        }
    }

    /// Discrete content always ticks on the UI thread
    pub fn is_discrete(&self) -> bool {
        self.value_kind() == Some(ValueKind::Object)
    }

    pub fn resolved_target(&self) -> Option<TargetId> {
        self.resolved_target
    }

    pub fn base_value(&self) -> Option<&AnimValue> {
        self.base_value.as_ref()
    }

    /// Value computed on the most recent tick
    pub fn current_value(&self) -> Option<&AnimValue> {
        self.current_value.as_ref()
    }

    pub fn has_control(&self) -> bool {
        self.has_control
    }

    pub fn has_handoff(&self) -> bool {
        self.has_handoff
    }

    pub fn is_independent(&self) -> bool {
        self.is_independent
    }

    pub fn conversion(&self) -> Option<&std::result::Result<CompositionAnimation, CompositionAnimationConversionResult>> {
        self.conversion.as_ref()
    }

    pub fn compositor_animation(&self) -> Option<CompositorAnimationId> {
        self.compositor_animation
    }

    /// Interpolation operands of From/To/By content
    fn operands(&self, base: &AnimValue) -> Option<(AnimValue, AnimValue)> {
        let AnimationContent::FromToBy { from, to, by, .. } = &self.content else {
            return None;
        };
        let pair = match (from, to, by) {
            (Some(from), Some(to), _) => (from.clone(), to.clone()),
            (Some(from), None, Some(by)) => (from.clone(), values::add(from, by)?),
            (Some(from), None, None) => (from.clone(), base.clone()),
            (None, Some(to), _) => (base.clone(), to.clone()),
            (None, None, Some(by)) => (base.clone(), values::add(base, by)?),
            (None, None, None) => (base.clone(), base.clone()),
        };
        Some(pair)
    }

    /// Compute the value at normalized `progress` of a simple duration of
    /// `simple` seconds and remember it as the current value
    pub fn compute_value(&mut self, progress: f64, simple: f64) -> Option<AnimValue> {
        let base = self.base_value.clone()?;
        let value = if let AnimationContent::FromToBy { easing, .. } = &self.content {
            let eased = easing.map_or(progress, |e| e.ease(progress));
            let (from, to) = self.operands(&base)?;
            values::interpolate(&from, &to, eased as f32)
        } else {
            match &mut self.content {
                AnimationContent::KeyFrames(frames) => frames.interpolate(&base, progress, simple),
                AnimationContent::PointerKeyFrames(frames) => {
                    match resolve_segment(frames.sorted_collection(), &base, progress) {
                        Some(segment) => segment.value(),
                        None => Some(base.clone()),
                    }
                }
                AnimationContent::FromToBy { .. } => None,
            }
        }?;
        self.current_value = Some(value.clone());
        Some(value)
    }

    /// Forget everything learned since the last begin
    pub(crate) fn reset_runtime(&mut self) {
        self.resolved_target = None;
        self.base_value = None;
        self.current_value = None;
        self.begun = false;
        self.has_control = false;
        self.has_handoff = false;
        self.is_independent = false;
        self.reported_dependent = false;
        self.final_value_applied = false;
        self.detached = false;
        self.conversion = None;
    }
}
