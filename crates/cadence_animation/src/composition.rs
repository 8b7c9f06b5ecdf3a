//! Compositor conversion
//!
//! A compositor runs declarative key frame animations on its own clock. Each
//! such animation has one delay, one iteration duration, one iteration count
//! and one direction. A timing tree, however, can stack begin times, speed
//! ratios, repeats and reverses on every level. The
//! [`CompositionConversionContext`] folds those levels top-down and either
//! produces a [`CompositionAnimation`] for a leaf or reports why the chain
//! cannot be flattened.
//!
//! Conversion failures are ordinary control flow: the animation keeps
//! ticking on the UI thread instead.

use std::fmt;

use cadence_core::{AnimValue, PropertyIndex, TargetId, ValueKind};
use rustc_hash::FxHashMap;

use crate::animation::{Animation, AnimationContent};
use crate::easing::{EasingFunction, KeySpline, NativeCurve};
use crate::keyframe::KeyFrameKind;
use crate::timeline::{self, TimelineArena, TimelineId, TimelineKind};
use crate::timing::{FillBehavior, RepeatBehavior, TimingProperties};
use crate::values;

/// Largest begin time or duration a compositor animation can express (24 days)
pub const MAX_TIME: f64 = 24.0 * 24.0 * 60.0 * 60.0;

/// Shortest iteration a compositor animation can express
pub const MIN_DURATION: f64 = 0.001;

const EPSILON: f64 = 1e-6;

/// Why a timing chain cannot be handed to the compositor
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompositionAnimationConversionResult {
    /// A begin time or duration is negative or beyond [`MAX_TIME`]
    TimeOutOfRange,
    ZeroDuration,
    InfiniteDuration,
    MultipleReverses,
    MultipleRepeats,
    /// A repeat and a reverse apply to different durations
    RepeatDurationMismatch,
    FractionalRepeatCount,
    KeyTimeOutOfRange,
    /// An ancestor ends before a descendant's active period does
    AncestorClipsDuration,
    UnsupportedValueType,
    InvalidSpeedRatio,
    NeverBegins,
    UnresolvedTarget,
    IndependentAnimationsDisabled,
}

impl fmt::Display for CompositionAnimationConversionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::TimeOutOfRange => "time out of range",
            Self::ZeroDuration => "zero duration",
            Self::InfiniteDuration => "infinite duration",
            Self::MultipleReverses => "multiple reverses",
            Self::MultipleRepeats => "multiple repeats",
            Self::RepeatDurationMismatch => "repeat and reverse durations differ",
            Self::FractionalRepeatCount => "fractional repeat count",
            Self::KeyTimeOutOfRange => "key time out of range",
            Self::AncestorClipsDuration => "ancestor clips duration",
            Self::UnsupportedValueType => "unsupported value type",
            Self::InvalidSpeedRatio => "invalid speed ratio",
            Self::NeverBegins => "never begins",
            Self::UnresolvedTarget => "unresolved target",
            Self::IndependentAnimationsDisabled => "independent animations disabled",
        };
        f.write_str(text)
    }
}

pub type ConversionResult<T> = Result<T, CompositionAnimationConversionResult>;

// ============================================================================
// Compositor animation description
// ============================================================================

/// Progress curve of one compositor key frame segment
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NativeEasing {
    Linear,
    CubicBezier { x1: f32, y1: f32, x2: f32, y2: f32 },
    /// Jumps at the end of the segment
    Step,
    Curve(NativeCurve),
}

pub fn create_linear_easing_function() -> NativeEasing {
    NativeEasing::Linear
}

pub fn create_spline_easing_function(spline: &KeySpline) -> NativeEasing {
    NativeEasing::CubicBezier {
        x1: spline.x1 as f32,
        y1: spline.y1 as f32,
        x2: spline.x2 as f32,
        y2: spline.y2 as f32,
    }
}

pub fn create_discrete_easing_function() -> NativeEasing {
    NativeEasing::Step
}

pub fn create_other_easing_function(easing: &EasingFunction) -> NativeEasing {
    NativeEasing::Curve(easing.native_curve())
}

fn easing_for_kind(kind: &KeyFrameKind) -> NativeEasing {
    match kind {
        KeyFrameKind::Linear => create_linear_easing_function(),
        KeyFrameKind::Discrete => create_discrete_easing_function(),
        KeyFrameKind::Spline(spline) => create_spline_easing_function(spline),
        KeyFrameKind::Easing(easing) => create_other_easing_function(easing),
    }
}

/// Key frame value as seen by the compositor
#[derive(Clone, Debug, PartialEq)]
pub enum CompositionValue {
    Value(AnimValue),
    /// The property's value when the compositor animation starts
    Starting,
    /// Starting value plus an offset
    StartingPlus(AnimValue),
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompositionKeyFrame {
    pub progress: f32,
    pub value: CompositionValue,
    /// Curve of the segment ending at this frame
    pub easing: NativeEasing,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum IterationCount {
    /// May be fractional for duration-based repeats
    Count(f64),
    Forever,
}

impl IterationCount {
    fn scale(self, factor: f64) -> Self {
        match self {
            IterationCount::Count(n) => IterationCount::Count(n * factor),
            IterationCount::Forever => IterationCount::Forever,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Normal,
    Alternate,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StopBehavior {
    #[default]
    LeaveCurrentValue,
    SetToInitialValue,
}

/// A declarative key frame animation the compositor runs on its own clock
#[derive(Clone, Debug, PartialEq)]
pub struct CompositionAnimation {
    pub value_kind: ValueKind,
    pub key_frames: Vec<CompositionKeyFrame>,
    /// Seconds per iteration
    pub duration: f64,
    /// Seconds before the first iteration
    pub delay: f64,
    pub iteration_count: IterationCount,
    pub direction: Direction,
    pub stop_behavior: StopBehavior,
}

impl CompositionAnimation {
    /// Animation with no key frames
    pub fn empty(value_kind: ValueKind) -> Self {
        Self {
            value_kind,
            key_frames: Vec::new(),
            duration: MIN_DURATION,
            delay: 0.0,
            iteration_count: IterationCount::Count(1.0),
            direction: Direction::Normal,
            stop_behavior: StopBehavior::LeaveCurrentValue,
        }
    }

    /// Two-frame linear animation between fixed values
    pub fn linear(from: AnimValue, to: AnimValue) -> Self {
        let mut animation = Self::empty(from.kind());
        animation.insert_key_frame(0.0, CompositionValue::Value(from), NativeEasing::Linear);
        animation.insert_key_frame(1.0, CompositionValue::Value(to), NativeEasing::Linear);
        animation
    }

    pub fn insert_key_frame(&mut self, progress: f32, value: CompositionValue, easing: NativeEasing) {
        self.key_frames.push(CompositionKeyFrame {
            progress,
            value,
            easing,
        });
    }

    /// Normalized progresses of all key frames
    pub fn key_frame_progresses(&self) -> Vec<f32> {
        self.key_frames.iter().map(|k| k.progress).collect()
    }
}

// ============================================================================
// Conversion context
// ============================================================================

/// Established repeat, measured in global seconds
#[derive(Clone, Copy, Debug, PartialEq)]
struct Repeat {
    count: IterationCount,
    period: f64,
}

/// Timing algebra accumulated while walking from a root toward a leaf.
///
/// All times are global seconds: begin times and spans are divided by the
/// product of the speed ratios above them.
#[derive(Clone, Debug, PartialEq)]
pub struct CompositionConversionContext {
    speed_ratio: f64,
    /// Begin time before any repeat or reverse, becomes the delay
    begin_outside: f64,
    /// Begin time inside the repeated period, a leading hold
    begin_inside: f64,
    /// Span of the current level's simple duration
    available: f64,
    repeat: Option<Repeat>,
    /// Forward span of an established reverse
    reverse: Option<f64>,
    dirty: bool,
}

impl Default for CompositionConversionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl CompositionConversionContext {
    pub fn new() -> Self {
        Self {
            speed_ratio: 1.0,
            begin_outside: 0.0,
            begin_inside: 0.0,
            available: f64::INFINITY,
            repeat: None,
            reverse: None,
            dirty: false,
        }
    }

    pub fn speed_ratio(&self) -> f64 {
        self.speed_ratio
    }

    pub fn delay(&self) -> f64 {
        self.begin_outside
    }

    /// Whether a level on the current path changed since the last conversion
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self, dirty: bool) {
        self.dirty |= dirty;
    }

    /// Fold one level's begin time, speed ratio and durations (in the
    /// level's own time space) into the context
    pub fn apply_begin_time_speed_ratio_and_duration(
        &mut self,
        begin: f64,
        speed_ratio: f64,
        simple_duration: f64,
        active_duration: f64,
    ) -> ConversionResult<()> {
        if !speed_ratio.is_finite() || speed_ratio <= 0.0 {
            return Err(CompositionAnimationConversionResult::InvalidSpeedRatio);
        }
        if !begin.is_finite() || begin < 0.0 {
            return Err(CompositionAnimationConversionResult::TimeOutOfRange);
        }

        let begin = begin / self.speed_ratio;
        let level_speed = self.speed_ratio * speed_ratio;
        let active_span = active_duration / level_speed;
        if begin + active_span > self.available + EPSILON {
            return Err(CompositionAnimationConversionResult::AncestorClipsDuration);
        }

        if self.repeat.is_some() || self.reverse.is_some() {
            self.begin_inside += begin;
        } else {
            self.begin_outside += begin;
        }
        self.speed_ratio = level_speed;
        self.available = simple_duration / level_speed;
        Ok(())
    }

    /// Fold one level's repeat behavior and auto-reverse, after its
    /// begin time and duration were applied
    pub fn set_repeat_and_reverse(&mut self, repeat: RepeatBehavior, auto_reverse: bool) -> ConversionResult<()> {
        use CompositionAnimationConversionResult as Failure;

        let forward = self.available;
        let repeats = !repeat.is_single();

        match (repeats, auto_reverse) {
            (false, false) => Ok(()),
            (false, true) => {
                if self.reverse.is_some() {
                    return Err(Failure::MultipleReverses);
                }
                match self.repeat {
                    Some(outer) => {
                        // An outer repeat whose period is exactly this forward
                        // and reverse pass folds into one alternating count
                        if (outer.period - 2.0 * forward).abs() > EPSILON || self.begin_inside > EPSILON {
                            return Err(Failure::RepeatDurationMismatch);
                        }
                        self.repeat = Some(Repeat {
                            count: outer.count.scale(2.0),
                            period: outer.period,
                        });
                    }
                    None => {
                        self.repeat = Some(Repeat {
                            count: IterationCount::Count(2.0),
                            period: 2.0 * forward,
                        });
                    }
                }
                self.reverse = Some(forward);
                Ok(())
            }
            (true, reverse) => {
                if self.reverse.is_some() {
                    return Err(if reverse {
                        Failure::MultipleReverses
                    } else {
                        Failure::RepeatDurationMismatch
                    });
                }
                if self.repeat.is_some() {
                    return Err(Failure::MultipleRepeats);
                }
                let passes = if reverse { 2.0 } else { 1.0 };
                let count = match repeat {
                    RepeatBehavior::Count(n) => {
                        let n = n * passes;
                        if n <= 0.0 {
                            return Err(Failure::ZeroDuration);
                        }
                        if (n - n.round()).abs() > EPSILON {
                            return Err(Failure::FractionalRepeatCount);
                        }
                        IterationCount::Count(n.round())
                    }
                    RepeatBehavior::Duration(total) => {
                        // Counted in forward passes: the reverse doubling does not apply
                        let total = total / self.speed_ratio;
                        if !total.is_finite() || total <= 0.0 || forward <= 0.0 {
                            return Err(Failure::ZeroDuration);
                        }
                        IterationCount::Count(total / forward)
                    }
                    RepeatBehavior::Forever => IterationCount::Forever,
                };
                self.repeat = Some(Repeat {
                    count,
                    period: forward * passes,
                });
                if reverse {
                    self.reverse = Some(forward);
                }
                Ok(())
            }
        }
    }

    /// Iteration span, count and direction of the flattened animation
    fn iteration_layout(&self) -> (f64, IterationCount, Direction) {
        match (self.reverse, self.repeat) {
            (Some(forward), Some(repeat)) => (forward, repeat.count, Direction::Alternate),
            (Some(forward), None) => (forward, IterationCount::Count(2.0), Direction::Alternate),
            (None, Some(repeat)) => (repeat.period, repeat.count, Direction::Normal),
            (None, None) => (self.available, IterationCount::Count(1.0), Direction::Normal),
        }
    }

    /// Iteration span after validation and minimum-duration coercion
    pub fn final_duration(&self) -> ConversionResult<f64> {
        let (span, _, _) = self.iteration_layout();
        if span.is_infinite() {
            return Err(CompositionAnimationConversionResult::InfiniteDuration);
        }
        if !(span > 0.0) {
            return Err(CompositionAnimationConversionResult::ZeroDuration);
        }
        if span > MAX_TIME {
            return Err(CompositionAnimationConversionResult::TimeOutOfRange);
        }
        Ok(span.max(MIN_DURATION))
    }

    /// Map a leaf-local key time in seconds to normalized iteration progress
    pub fn get_normalized_key_time(&self, time: f64) -> ConversionResult<f32> {
        let duration = self.final_duration()?;
        let normalized = (self.begin_inside + time / self.speed_ratio) / duration;
        if !(-EPSILON..=1.0 + EPSILON).contains(&normalized) {
            return Err(CompositionAnimationConversionResult::KeyTimeOutOfRange);
        }
        Ok(normalized.clamp(0.0, 1.0) as f32)
    }

    /// Write the flattened timing into a compositor animation
    pub fn apply_properties(&self, animation: &mut CompositionAnimation) -> ConversionResult<()> {
        let duration = self.final_duration()?;
        if !(0.0..=MAX_TIME).contains(&self.begin_outside) {
            return Err(CompositionAnimationConversionResult::TimeOutOfRange);
        }
        let (_, count, direction) = self.iteration_layout();
        animation.duration = duration;
        animation.delay = self.begin_outside;
        animation.iteration_count = count;
        animation.direction = direction;
        Ok(())
    }

    /// Fold a whole level: begin time (offset by a sequential predecessor),
    /// speed ratio, durations, repeat and reverse
    pub fn apply_timing(&mut self, timing: &TimingProperties, offset: f64, simple_duration: f64) -> ConversionResult<()> {
        let begin = timing
            .begin_time
            .ok_or(CompositionAnimationConversionResult::NeverBegins)?;
        self.apply_begin_time_speed_ratio_and_duration(
            begin + offset,
            timing.speed_ratio,
            simple_duration,
            timing.active_duration(simple_duration),
        )?;
        self.set_repeat_and_reverse(timing.repeat, timing.auto_reverse)
    }

    /// Build the compositor animation of a leaf whose own timing was applied last
    pub fn convert_animation(
        &self,
        animation: &Animation,
        simple_duration: f64,
        fill: FillBehavior,
    ) -> ConversionResult<CompositionAnimation> {
        use CompositionAnimationConversionResult as Failure;

        let kind = animation.value_kind().ok_or(Failure::UnsupportedValueType)?;
        if !kind.is_interpolating() {
            return Err(Failure::UnsupportedValueType);
        }
        let mut out = CompositionAnimation::empty(kind);

        match animation.content() {
            AnimationContent::FromToBy { from, to, by, easing } => {
                let start = self.get_normalized_key_time(0.0)?;
                let end = self.get_normalized_key_time(simple_duration)?;
                let (first, last) = match (from, to, by) {
                    (Some(from), Some(to), _) => (CompositionValue::Value(from.clone()), CompositionValue::Value(to.clone())),
                    (Some(from), None, Some(by)) => {
                        let sum = values::add(from, by).ok_or(Failure::UnsupportedValueType)?;
                        (CompositionValue::Value(from.clone()), CompositionValue::Value(sum))
                    }
                    (Some(from), None, None) => {
                        let base = animation.base_value().ok_or(Failure::UnresolvedTarget)?;
                        (CompositionValue::Value(from.clone()), CompositionValue::Value(base.clone()))
                    }
                    (None, Some(to), _) => (CompositionValue::Starting, CompositionValue::Value(to.clone())),
                    (None, None, Some(by)) => (CompositionValue::Starting, CompositionValue::StartingPlus(by.clone())),
                    (None, None, None) => (CompositionValue::Starting, CompositionValue::Starting),
                };
                let curve = easing
                    .as_ref()
                    .map_or_else(create_linear_easing_function, create_other_easing_function);
                out.insert_key_frame(start, first, create_linear_easing_function());
                out.insert_key_frame(end, last, curve);
            }
            AnimationContent::KeyFrames(frames) => {
                let sorted = frames.sorted_view(simple_duration);
                if sorted.first().map_or(true, |f| f.percent > 0.0) {
                    out.insert_key_frame(
                        self.get_normalized_key_time(0.0)?,
                        CompositionValue::Starting,
                        create_linear_easing_function(),
                    );
                }
                for frame in &sorted {
                    let progress = self.get_normalized_key_time(frame.percent * simple_duration)?;
                    out.insert_key_frame(progress, CompositionValue::Value(frame.value.clone()), easing_for_kind(&frame.kind));
                }
            }
            AnimationContent::PointerKeyFrames(frames) => {
                for frame in frames.sorted_view() {
                    let progress = self.get_normalized_key_time(frame.percent * simple_duration)?;
                    out.insert_key_frame(progress, CompositionValue::Value(frame.value), create_linear_easing_function());
                }
            }
        }

        // Hold the first value through a leading begin time inside a repeat
        if let Some(first) = out.key_frames.first().cloned() {
            if first.progress > 0.0 {
                out.key_frames.insert(
                    0,
                    CompositionKeyFrame {
                        progress: 0.0,
                        value: first.value,
                        easing: create_linear_easing_function(),
                    },
                );
            }
        }

        self.apply_properties(&mut out)?;
        out.stop_behavior = match fill {
            FillBehavior::HoldEnd => StopBehavior::LeaveCurrentValue,
            FillBehavior::Stop => StopBehavior::SetToInitialValue,
        };
        Ok(out)
    }
}

/// Convert every animation below `root`, in subtree order
pub(crate) fn convert_timeline_tree(
    timelines: &TimelineArena,
    root: TimelineId,
) -> Vec<(TimelineId, ConversionResult<CompositionAnimation>)> {
    let mut out = Vec::new();
    convert_node(
        timelines,
        root,
        0.0,
        CompositionConversionContext::new(),
        &mut out,
    );
    out
}

fn convert_node(
    timelines: &TimelineArena,
    id: TimelineId,
    offset: f64,
    mut context: CompositionConversionContext,
    out: &mut Vec<(TimelineId, ConversionResult<CompositionAnimation>)>,
) {
    let Some(node) = timelines.get(id) else {
        return;
    };
    let simple = timeline::simple_duration(timelines, id);
    context.mark_dirty(node.dirty);
    let applied = context.apply_timing(&node.timing, offset, simple);

    match &node.kind {
        TimelineKind::Group { children, .. } => {
            let offsets = timeline::child_offsets(timelines, id);
            for (&child, &child_offset) in children.iter().zip(offsets.iter()) {
                match applied {
                    Ok(()) => convert_node(timelines, child, child_offset, context.clone(), out),
                    Err(failure) => {
                        for leaf in timeline::subtree(timelines, child) {
                            if timelines[leaf].as_animation().is_some() {
                                out.push((leaf, Err(failure)));
                            }
                        }
                    }
                }
            }
        }
        TimelineKind::Animation(animation) => {
            let result = applied.and_then(|()| context.convert_animation(animation, simple, node.timing.fill_behavior));
            tracing::trace!("conversion of {:?}: {:?}", id, result.as_ref().map(|a| a.duration));
            out.push((id, result));
        }
        TimelineKind::Timer(_) => {}
    }
}

// ============================================================================
// Compositor interface
// ============================================================================

/// Handle to an animation running on the compositor
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CompositorAnimationId(pub u64);

/// The retained-mode compositor animations are handed to
pub trait Compositor {
    /// Start `animation` on a target property, `elapsed` seconds into it
    fn start_animation(
        &mut self,
        target: TargetId,
        property: PropertyIndex,
        animation: &CompositionAnimation,
        elapsed: f64,
    ) -> CompositorAnimationId;

    fn stop_animation(&mut self, id: CompositorAnimationId);

    fn pause_animation(&mut self, id: CompositorAnimationId);

    fn resume_animation(&mut self, id: CompositorAnimationId);
}

/// An animation started on a [`RecordingCompositor`]
#[derive(Clone, Debug, PartialEq)]
pub struct RunningAnimation {
    pub target: TargetId,
    pub property: PropertyIndex,
    pub animation: CompositionAnimation,
    pub elapsed: f64,
    pub paused: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompositorOperation {
    Start(CompositorAnimationId),
    Stop(CompositorAnimationId),
    Pause(CompositorAnimationId),
    Resume(CompositorAnimationId),
}

/// In-memory compositor that records what it is asked to do
#[derive(Debug, Default)]
pub struct RecordingCompositor {
    next_id: u64,
    running: FxHashMap<CompositorAnimationId, RunningAnimation>,
    operations: Vec<CompositorOperation>,
}

impl RecordingCompositor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn running(&self) -> &FxHashMap<CompositorAnimationId, RunningAnimation> {
        &self.running
    }

    pub fn get(&self, id: CompositorAnimationId) -> Option<&RunningAnimation> {
        self.running.get(&id)
    }

    /// Animation currently running on a target property
    pub fn find(&self, target: TargetId, property: PropertyIndex) -> Option<(CompositorAnimationId, &RunningAnimation)> {
        self.running
            .iter()
            .find(|(_, running)| running.target == target && running.property == property)
            .map(|(id, running)| (*id, running))
    }

    pub fn operations(&self) -> &[CompositorOperation] {
        &self.operations
    }
}

impl Compositor for RecordingCompositor {
    fn start_animation(
        &mut self,
        target: TargetId,
        property: PropertyIndex,
        animation: &CompositionAnimation,
        elapsed: f64,
    ) -> CompositorAnimationId {
        self.next_id += 1;
        let id = CompositorAnimationId(self.next_id);
        self.running.insert(
            id,
            RunningAnimation {
                target,
                property,
                animation: animation.clone(),
                elapsed,
                paused: false,
            },
        );
        self.operations.push(CompositorOperation::Start(id));
        id
    }

    fn stop_animation(&mut self, id: CompositorAnimationId) {
        if self.running.remove(&id).is_some() {
            self.operations.push(CompositorOperation::Stop(id));
        }
    }

    fn pause_animation(&mut self, id: CompositorAnimationId) {
        if let Some(running) = self.running.get_mut(&id) {
            running.paused = true;
            self.operations.push(CompositorOperation::Pause(id));
        }
    }

    fn resume_animation(&mut self, id: CompositorAnimationId) {
        if let Some(running) = self.running.get_mut(&id) {
            running.paused = false;
            self.operations.push(CompositorOperation::Resume(id));
        }
    }
}
