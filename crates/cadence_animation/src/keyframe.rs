//! Key frames
//!
//! A [`KeyFrameCollection`] stores key frames in declaration order and
//! lazily builds a sorted view for a given animation duration. Each entry of
//! the sorted view carries the frame's normalized percent; the sort is
//! stable, so frames sharing a time keep their declaration order.
//!
//! [`resolve_segment`] turns a sorted view plus normalized progress into a
//! pair of operands and a segment-local progress.

use cadence_core::{AnimValue, ValueKind};

use crate::easing::{EasingFunction, KeySpline};
use crate::values;

/// When a key frame is reached
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum KeyTime {
    /// No time was authored; the frame is ignored
    #[default]
    Unset,
    /// Seconds from the start of the animation
    Time(f64),
    /// Fraction of the animation's duration
    Percent(f64),
}

impl KeyTime {
    /// Normalized position of this key time within `duration` seconds
    pub fn percent(&self, duration: f64) -> Option<f64> {
        match *self {
            KeyTime::Unset => None,
            KeyTime::Percent(p) => Some(p),
            KeyTime::Time(t) => Some(if duration > 0.0 { t / duration } else { 0.0 }),
        }
    }
}

/// How progress is shaped inside the segment that ends at a key frame
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum KeyFrameKind {
    #[default]
    Linear,
    /// Holds the previous value until the frame's time
    Discrete,
    Spline(KeySpline),
    Easing(EasingFunction),
}

impl KeyFrameKind {
    /// Segment-local progress after shaping
    pub fn effective_progress(&self, t: f64) -> f64 {
        match self {
            KeyFrameKind::Linear => t,
            KeyFrameKind::Discrete => 0.0,
            KeyFrameKind::Spline(spline) => spline.progress(t),
            KeyFrameKind::Easing(easing) => easing.ease(t),
        }
    }
}

/// A value reached at a key time
#[derive(Clone, Debug, PartialEq)]
pub struct KeyFrame {
    pub key_time: KeyTime,
    pub value: AnimValue,
    pub kind: KeyFrameKind,
}

impl KeyFrame {
    pub fn new(key_time: KeyTime, value: impl Into<AnimValue>, kind: KeyFrameKind) -> Self {
        Self {
            key_time,
            value: value.into(),
            kind,
        }
    }

    pub fn linear(key_time: KeyTime, value: impl Into<AnimValue>) -> Self {
        Self::new(key_time, value, KeyFrameKind::Linear)
    }

    pub fn discrete(key_time: KeyTime, value: impl Into<AnimValue>) -> Self {
        Self::new(key_time, value, KeyFrameKind::Discrete)
    }
}

/// Entry of a sorted key frame view
#[derive(Clone, Debug, PartialEq)]
pub struct SortedKeyFrame {
    pub percent: f64,
    pub value: AnimValue,
    pub kind: KeyFrameKind,
}

/// Ordered set of key frames
#[derive(Clone, Debug, Default)]
pub struct KeyFrameCollection {
    frames: Vec<KeyFrame>,
    sorted: Vec<SortedKeyFrame>,
    /// Duration the sorted view was built for, `None` when stale
    sorted_for: Option<f64>,
}

impl KeyFrameCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_frames(frames: impl IntoIterator<Item = KeyFrame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
            sorted: Vec::new(),
            sorted_for: None,
        }
    }

    pub fn push(&mut self, frame: KeyFrame) {
        self.frames.push(frame);
        self.mark_unsorted();
    }

    pub fn remove(&mut self, index: usize) -> Option<KeyFrame> {
        if index >= self.frames.len() {
            return None;
        }
        self.mark_unsorted();
        Some(self.frames.remove(index))
    }

    pub fn clear(&mut self) {
        self.frames.clear();
        self.mark_unsorted();
    }

    /// Frames in declaration order
    pub fn frames(&self) -> &[KeyFrame] {
        &self.frames
    }

    /// Mutable access to one frame; invalidates the sorted view
    pub fn frame_mut(&mut self, index: usize) -> Option<&mut KeyFrame> {
        self.mark_unsorted();
        self.frames.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn mark_unsorted(&mut self) {
        self.sorted_for = None;
    }

    /// Value kind shared by every frame, `None` for mixed or empty collections
    pub fn value_kind(&self) -> Option<ValueKind> {
        let first = self.frames.first()?.value.kind();
        self.frames
            .iter()
            .all(|f| f.value.kind() == first)
            .then_some(first)
    }

    /// Index of the first frame with a negative or non-finite key time
    pub fn first_invalid_key_time(&self) -> Option<usize> {
        self.frames.iter().position(|f| match f.key_time {
            KeyTime::Unset => false,
            KeyTime::Time(t) => !t.is_finite() || t < 0.0,
            KeyTime::Percent(p) => !p.is_finite() || !(0.0..=1.0).contains(&p),
        })
    }

    /// Duration implied by the latest time-based key time.
    ///
    /// Unset key times are skipped rather than reported, and percent key
    /// times imply no duration of their own.
    pub fn natural_duration(&self) -> Option<f64> {
        self.frames
            .iter()
            .filter_map(|f| match f.key_time {
                KeyTime::Time(t) if t.is_finite() => Some(t),
                _ => None,
            })
            .reduce(f64::max)
    }

    /// Frames sorted ascending by percent for an animation of `duration` seconds
    pub fn sorted_collection(&mut self, duration: f64) -> &[SortedKeyFrame] {
        if self.sorted_for != Some(duration) {
            self.sorted = self.sorted_view(duration);
            self.sorted_for = Some(duration);
        }
        &self.sorted
    }

    /// Uncached sorted view, frames with unset key times left out
    pub fn sorted_view(&self, duration: f64) -> Vec<SortedKeyFrame> {
        let mut sorted: Vec<SortedKeyFrame> = self
            .frames
            .iter()
            .filter_map(|f| {
                f.key_time.percent(duration).map(|percent| SortedKeyFrame {
                    percent,
                    value: f.value.clone(),
                    kind: f.kind,
                })
            })
            .collect();
        // Vec::sort_by is stable: equal percents keep declaration order
        sorted.sort_by(|a, b| a.percent.total_cmp(&b.percent));
        sorted
    }

    /// Interpolated value at normalized `progress`
    pub fn interpolate(&mut self, base: &AnimValue, progress: f64, duration: f64) -> Option<AnimValue> {
        let sorted = self.sorted_collection(duration);
        match resolve_segment(sorted, base, progress) {
            Some(segment) => segment.value(),
            None => Some(base.clone()),
        }
    }
}

// ============================================================================
// Pointer key frames
// ============================================================================

/// A key frame positioned by a pointer value rather than by time
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointerKeyFrame {
    pub pointer_value: f64,
    pub value: f32,
}

/// Key frames whose normalized positions derive from pointer value order
#[derive(Clone, Debug, Default)]
pub struct PointerKeyFrameCollection {
    frames: Vec<PointerKeyFrame>,
    sorted: Vec<SortedKeyFrame>,
    is_sorted: bool,
}

impl PointerKeyFrameCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, pointer_value: f64, value: f32) {
        self.frames.push(PointerKeyFrame {
            pointer_value,
            value,
        });
        self.is_sorted = false;
    }

    pub fn frames(&self) -> &[PointerKeyFrame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Pointer range covered by the frames
    pub fn pointer_range(&self) -> Option<(f64, f64)> {
        let min = self.frames.iter().map(|f| f.pointer_value).reduce(f64::min)?;
        let max = self.frames.iter().map(|f| f.pointer_value).reduce(f64::max)?;
        Some((min, max))
    }

    /// Frames sorted by pointer value, percent spanning the pointer range
    pub fn sorted_collection(&mut self) -> &[SortedKeyFrame] {
        if !self.is_sorted {
            self.sorted = self.sorted_view();
            self.is_sorted = true;
        }
        &self.sorted
    }

    /// Uncached sorted view
    pub fn sorted_view(&self) -> Vec<SortedKeyFrame> {
        let (min, max) = self.pointer_range().unwrap_or((0.0, 0.0));
        let span = max - min;
        let mut ordered: Vec<&PointerKeyFrame> = self.frames.iter().collect();
        ordered.sort_by(|a, b| a.pointer_value.total_cmp(&b.pointer_value));
        ordered
            .into_iter()
            .map(|f| SortedKeyFrame {
                percent: if span > 0.0 {
                    (f.pointer_value - min) / span
                } else {
                    0.0
                },
                value: AnimValue::Double(f.value),
                kind: KeyFrameKind::Linear,
            })
            .collect()
    }

    /// Value for a raw pointer position, clamped to the covered range
    pub fn value_at_pointer(&mut self, pointer_value: f64) -> Option<f32> {
        let (min, max) = self.pointer_range()?;
        let progress = if max > min {
            ((pointer_value - min) / (max - min)).clamp(0.0, 1.0)
        } else {
            1.0
        };
        let first = AnimValue::Double(self.frames.first()?.value);
        let sorted = self.sorted_collection();
        resolve_segment(sorted, &first, progress)?
            .value()
            .and_then(|v| v.as_double())
    }
}

// ============================================================================
// Segment resolution
// ============================================================================

/// The key frame segment containing a given progress
#[derive(Clone, Debug, PartialEq)]
pub struct Segment {
    pub from: AnimValue,
    pub to: AnimValue,
    /// Index of the sorted frame the segment ends at (`len` once past the last frame)
    pub index: usize,
    /// Progress inside the segment before shaping
    pub local_progress: f64,
    /// Progress after the ending frame's interpolation kind
    pub effective_progress: f64,
}

impl Segment {
    /// Blend of the segment operands
    pub fn value(&self) -> Option<AnimValue> {
        values::interpolate(&self.from, &self.to, self.effective_progress as f32)
    }
}

/// Locate the segment of `sorted` that contains `progress`.
///
/// Interpolation starts from `base` when the first frame is not at zero.
/// Past the last frame the last value is held. Returns `None` only for an
/// empty view.
pub fn resolve_segment(sorted: &[SortedKeyFrame], base: &AnimValue, progress: f64) -> Option<Segment> {
    let first = sorted.first()?;

    let mut from = base.clone();
    let mut to = first.value.clone();
    let mut consumed = 0.0;
    let mut index = 0;

    while index < sorted.len() && sorted[index].percent <= progress {
        consumed = sorted[index].percent;
        from = to;
        index += 1;
        to = match sorted.get(index) {
            Some(next) => next.value.clone(),
            None => from.clone(),
        };
    }

    let (span, kind) = match sorted.get(index) {
        Some(frame) => (frame.percent - consumed, frame.kind),
        None => {
            let remaining = 1.0 - consumed;
            let span = if remaining > 0.0 { remaining } else { 1.0 };
            (span, KeyFrameKind::Linear)
        }
    };

    let local_progress = if span > 0.0 {
        ((progress - consumed) / span).clamp(0.0, 1.0)
    } else {
        1.0
    };
    let effective_progress = kind.effective_progress(local_progress);

    Some(Segment {
        from,
        to,
        index,
        local_progress,
        effective_progress,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::easing::EasingMode;
    use cadence_core::ObjectValue;

    fn double(v: &AnimValue) -> f32 {
        v.as_double().unwrap()
    }

    #[test]
    fn test_three_frame_resolution() {
        let mut frames = KeyFrameCollection::from_frames([
            KeyFrame::linear(KeyTime::Percent(0.0), 0.0_f32),
            KeyFrame::linear(KeyTime::Percent(0.5), 100.0_f32),
            KeyFrame::linear(KeyTime::Percent(1.0), 50.0_f32),
        ]);
        let base = AnimValue::Double(-1.0);
        let sorted = frames.sorted_collection(1.0).to_vec();

        let segment = resolve_segment(&sorted, &base, 0.75).unwrap();
        assert_eq!(segment.index, 2);
        assert!((segment.local_progress - 0.5).abs() < 1e-9);
        assert!((double(&segment.value().unwrap()) - 75.0).abs() < 1e-4);
    }

    #[test]
    fn test_sorted_view_is_stable() {
        let mut frames = KeyFrameCollection::from_frames([
            KeyFrame::linear(KeyTime::Time(2.0), 3.0_f32),
            KeyFrame::linear(KeyTime::Time(1.0), 1.0_f32),
            KeyFrame::linear(KeyTime::Time(1.0), 2.0_f32),
            KeyFrame::linear(KeyTime::Time(0.0), 0.0_f32),
        ]);
        let sorted = frames.sorted_collection(2.0);
        let percents: Vec<f64> = sorted.iter().map(|f| f.percent).collect();
        assert_eq!(percents, vec![0.0, 0.5, 0.5, 1.0]);
        let order: Vec<f32> = sorted.iter().map(|f| double(&f.value)).collect();
        assert_eq!(order, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_duplicate_times_resolve_to_later_frame() {
        let mut frames = KeyFrameCollection::from_frames([
            KeyFrame::linear(KeyTime::Percent(0.0), 0.0_f32),
            KeyFrame::linear(KeyTime::Percent(0.5), 10.0_f32),
            KeyFrame::linear(KeyTime::Percent(0.5), 20.0_f32),
            KeyFrame::linear(KeyTime::Percent(1.0), 20.0_f32),
        ]);
        let base = AnimValue::Double(0.0);

        let before = frames.interpolate(&base, 0.25, 1.0).unwrap();
        assert!((double(&before) - 5.0).abs() < 1e-4);

        let at = frames.interpolate(&base, 0.5, 1.0).unwrap();
        assert!((double(&at) - 20.0).abs() < 1e-4);
    }

    #[test]
    fn test_first_segment_starts_from_base() {
        let mut frames = KeyFrameCollection::from_frames([KeyFrame::linear(KeyTime::Time(1.0), 100.0_f32)]);
        let base = AnimValue::Double(20.0);

        let v = frames.interpolate(&base, 0.5, 2.0).unwrap();
        // first frame sits at 0.5, so progress 0.5 reaches it exactly
        assert!((double(&v) - 100.0).abs() < 1e-4);

        let v = frames.interpolate(&base, 0.25, 2.0).unwrap();
        assert!((double(&v) - 60.0).abs() < 1e-4);
    }

    #[test]
    fn test_resolution_is_total() {
        let mut frames = KeyFrameCollection::from_frames([
            KeyFrame::linear(KeyTime::Percent(0.3), 1.0_f32),
            KeyFrame::discrete(KeyTime::Percent(0.6), 2.0_f32),
            KeyFrame::new(
                KeyTime::Percent(0.9),
                3.0_f32,
                KeyFrameKind::Easing(EasingFunction::sine(EasingMode::EaseOut)),
            ),
        ]);
        let base = AnimValue::Double(0.0);
        let sorted = frames.sorted_collection(1.0).to_vec();

        for i in 0..=100 {
            let p = i as f64 / 100.0;
            let segment = resolve_segment(&sorted, &base, p).unwrap();
            assert!(segment.index <= sorted.len());
            assert!(segment.value().is_some());
        }

        let end = resolve_segment(&sorted, &base, 1.0).unwrap();
        assert!((double(&end.value().unwrap()) - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_discrete_holds_previous_value() {
        let mut frames = KeyFrameCollection::from_frames([
            KeyFrame::discrete(KeyTime::Percent(0.0), 1.0_f32),
            KeyFrame::discrete(KeyTime::Percent(0.5), 2.0_f32),
        ]);
        let base = AnimValue::Double(0.0);
        assert_eq!(double(&frames.interpolate(&base, 0.49, 1.0).unwrap()), 1.0);
        assert_eq!(double(&frames.interpolate(&base, 0.5, 1.0).unwrap()), 2.0);
    }

    #[test]
    fn test_object_frames() {
        let mut frames = KeyFrameCollection::from_frames([
            KeyFrame::discrete(KeyTime::Time(0.0), ObjectValue::Bool(true)),
            KeyFrame::discrete(KeyTime::Time(1.0), ObjectValue::Bool(false)),
        ]);
        let base = AnimValue::Object(ObjectValue::Bool(true));
        assert_eq!(
            frames.interpolate(&base, 0.9, 1.0),
            Some(AnimValue::Object(ObjectValue::Bool(true)))
        );
        assert_eq!(
            frames.interpolate(&base, 1.0, 1.0),
            Some(AnimValue::Object(ObjectValue::Bool(false)))
        );
    }

    #[test]
    fn test_unset_key_times_are_ignored() {
        let mut frames = KeyFrameCollection::from_frames([
            KeyFrame::linear(KeyTime::Unset, 500.0_f32),
            KeyFrame::linear(KeyTime::Time(2.0), 10.0_f32),
        ]);
        assert_eq!(frames.natural_duration(), Some(2.0));
        assert_eq!(frames.first_invalid_key_time(), None);
        assert_eq!(frames.sorted_collection(2.0).len(), 1);
    }

    #[test]
    fn test_sorted_view_invalidation() {
        let mut frames = KeyFrameCollection::new();
        frames.push(KeyFrame::linear(KeyTime::Time(1.0), 1.0_f32));
        assert_eq!(frames.sorted_collection(1.0).len(), 1);

        frames.push(KeyFrame::linear(KeyTime::Time(0.5), 0.5_f32));
        let sorted = frames.sorted_collection(1.0);
        assert_eq!(sorted.len(), 2);
        assert_eq!(sorted[0].percent, 0.5);

        // Rebuilt when the duration changes
        let sorted = frames.sorted_collection(2.0);
        assert_eq!(sorted[1].percent, 0.5);
    }

    #[test]
    fn test_pointer_frames_order_by_value() {
        let mut frames = PointerKeyFrameCollection::new();
        frames.push(200.0, 1.0);
        frames.push(100.0, 0.0);
        frames.push(150.0, 0.25);

        let percents: Vec<f64> = frames.sorted_collection().iter().map(|f| f.percent).collect();
        assert_eq!(percents, vec![0.0, 0.5, 1.0]);

        assert!((frames.value_at_pointer(125.0).unwrap() - 0.125).abs() < 1e-5);
        assert!((frames.value_at_pointer(175.0).unwrap() - 0.625).abs() < 1e-5);
        assert_eq!(frames.value_at_pointer(500.0), Some(1.0));
    }
}
