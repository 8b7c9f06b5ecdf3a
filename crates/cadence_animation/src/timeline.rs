//! Timelines
//!
//! A timing tree is made of [`Timeline`] nodes stored in a slotmap arena
//! owned by the [`TimeManager`](crate::scheduler::TimeManager). Groups
//! reference their children by [`TimelineId`]; children point back at their
//! timing parent. Leaves are animations or dispatcher timers.

use std::cell::Cell;

use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;

use crate::animation::Animation;
use crate::timing::{ClockSample, ClockState, Duration, FillBehavior, RepeatBehavior, TimingProperties};

new_key_type! {
    /// Handle to a timeline owned by a time manager
    pub struct TimelineId;
}

/// How a group schedules its children
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GroupKind {
    /// Children share the group's clock (storyboard)
    #[default]
    Parallel,
    /// Each child starts when the previous one ends
    Sequential,
}

/// Periodic tick source
#[derive(Clone, Debug, PartialEq)]
pub struct DispatcherTimer {
    /// Seconds between ticks
    pub interval: f64,
    pub(crate) fired: u64,
}

impl DispatcherTimer {
    pub fn new(interval: f64) -> Self {
        Self { interval, fired: 0 }
    }

    /// Ticks delivered since the timer started
    pub fn fired(&self) -> u64 {
        self.fired
    }
}

/// What a timeline does
#[derive(Clone, Debug)]
pub enum TimelineKind {
    Group {
        kind: GroupKind,
        children: SmallVec<[TimelineId; 4]>,
    },
    Animation(Box<Animation>),
    Timer(DispatcherTimer),
}

/// Interactive clock of a root timeline
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RootClock {
    /// Scheduler time at which root time zero occurred
    origin: f64,
    paused_at: Option<f64>,
}

impl RootClock {
    pub fn started_at(now: f64) -> Self {
        Self {
            origin: now,
            paused_at: None,
        }
    }

    /// Root time at scheduler time `now`
    pub fn time(&self, now: f64) -> f64 {
        self.paused_at.unwrap_or(now - self.origin)
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    pub fn pause(&mut self, now: f64) {
        if self.paused_at.is_none() {
            self.paused_at = Some(now - self.origin);
        }
    }

    pub fn resume(&mut self, now: f64) {
        if let Some(paused) = self.paused_at.take() {
            self.origin = now - paused;
        }
    }

    pub fn seek(&mut self, now: f64, time: f64) {
        match self.paused_at {
            Some(_) => self.paused_at = Some(time),
            None => self.origin = now - time,
        }
    }
}

/// A node of a timing tree
#[derive(Clone, Debug)]
pub struct Timeline {
    pub(crate) timing: TimingProperties,
    pub(crate) kind: TimelineKind,
    pub(crate) parent: Option<TimelineId>,
    pub(crate) clock: ClockSample,
    /// Compositor conversion must be redone
    pub(crate) dirty: bool,
    pub(crate) root_clock: Option<RootClock>,
    pub(crate) completed: bool,
    /// Resolved simple duration, cleared by [`mark_dirty`]
    pub(crate) simple: Cell<Option<f64>>,
}

impl Timeline {
    fn new(kind: TimelineKind) -> Self {
        Self {
            timing: TimingProperties::default(),
            kind,
            parent: None,
            clock: ClockSample::NOT_STARTED,
            dirty: true,
            root_clock: None,
            completed: false,
            simple: Cell::new(None),
        }
    }

    /// Group whose children share its clock
    pub fn parallel() -> Self {
        Self::group(GroupKind::Parallel)
    }

    /// Group whose children run one after another
    pub fn sequential() -> Self {
        Self::group(GroupKind::Sequential)
    }

    pub fn group(kind: GroupKind) -> Self {
        Self::new(TimelineKind::Group {
            kind,
            children: SmallVec::new(),
        })
    }

    pub fn animation(animation: Animation) -> Self {
        Self::new(TimelineKind::Animation(Box::new(animation)))
    }

    /// Timer raising a tick event every `interval` seconds
    pub fn timer(interval: f64) -> Self {
        let mut timeline = Self::new(TimelineKind::Timer(DispatcherTimer::new(interval)));
        timeline.timing.duration = Duration::Forever;
        timeline
    }

    pub fn with_begin_time(mut self, begin: impl Into<Option<f64>>) -> Self {
        self.timing.begin_time = begin.into();
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.timing.duration = duration;
        self
    }

    pub fn with_repeat(mut self, repeat: RepeatBehavior) -> Self {
        self.timing.repeat = repeat;
        self
    }

    pub fn with_auto_reverse(mut self, auto_reverse: bool) -> Self {
        self.timing.auto_reverse = auto_reverse;
        self
    }

    pub fn with_speed_ratio(mut self, speed_ratio: f64) -> Self {
        self.timing.speed_ratio = speed_ratio;
        self
    }

    pub fn with_fill_behavior(mut self, fill: FillBehavior) -> Self {
        self.timing.fill_behavior = fill;
        self
    }

    pub fn with_timing(mut self, timing: TimingProperties) -> Self {
        self.timing = timing;
        self
    }

    pub fn timing(&self) -> &TimingProperties {
        &self.timing
    }

    pub fn kind(&self) -> &TimelineKind {
        &self.kind
    }

    pub fn parent(&self) -> Option<TimelineId> {
        self.parent
    }

    pub fn state(&self) -> ClockState {
        self.clock.state
    }

    pub fn clock(&self) -> &ClockSample {
        &self.clock
    }

    pub fn children(&self) -> &[TimelineId] {
        match &self.kind {
            TimelineKind::Group { children, .. } => children,
            _ => &[],
        }
    }

    pub fn as_animation(&self) -> Option<&Animation> {
        match &self.kind {
            TimelineKind::Animation(animation) => Some(&**animation),
            _ => None,
        }
    }

    pub(crate) fn as_animation_mut(&mut self) -> Option<&mut Animation> {
        match &mut self.kind {
            TimelineKind::Animation(animation) => Some(&mut **animation),
            _ => None,
        }
    }

    pub fn is_timer(&self) -> bool {
        matches!(self.kind, TimelineKind::Timer(_))
    }

    pub fn root_clock(&self) -> Option<&RootClock> {
        self.root_clock.as_ref()
    }
}

// ============================================================================
// Arena helpers
// ============================================================================

pub(crate) type TimelineArena = SlotMap<TimelineId, Timeline>;

/// Duration implied by a timeline's content
pub(crate) fn natural_duration(timelines: &TimelineArena, id: TimelineId) -> f64 {
    let Some(timeline) = timelines.get(id) else {
        return 0.0;
    };
    match &timeline.kind {
        TimelineKind::Animation(animation) => animation.natural_duration(),
        TimelineKind::Timer(_) => f64::INFINITY,
        TimelineKind::Group {
            kind: GroupKind::Parallel,
            children,
        } => children
            .iter()
            .filter_map(|&child| child_end(timelines, child))
            .fold(0.0, f64::max),
        TimelineKind::Group {
            kind: GroupKind::Sequential,
            children,
        } => children.iter().fold(0.0, |offset, &child| {
            offset + child_end(timelines, child).unwrap_or(0.0)
        }),
    }
}

/// Simple duration after resolving `Automatic`
pub(crate) fn simple_duration(timelines: &TimelineArena, id: TimelineId) -> f64 {
    let Some(timeline) = timelines.get(id) else {
        return 0.0;
    };
    if let Some(cached) = timeline.simple.get() {
        return cached;
    }
    let simple = match timeline.timing.duration {
        Duration::Automatic => natural_duration(timelines, id),
        other => other.resolve(0.0),
    };
    timeline.simple.set(Some(simple));
    simple
}

/// End of a child's active period in its parent's time
fn child_end(timelines: &TimelineArena, id: TimelineId) -> Option<f64> {
    let timeline = timelines.get(id)?;
    timeline.timing.end_time(simple_duration(timelines, id))
}

/// Start offset of each child of a group, relative to the group's simple time
pub(crate) fn child_offsets(timelines: &TimelineArena, id: TimelineId) -> SmallVec<[f64; 4]> {
    let Some(timeline) = timelines.get(id) else {
        return SmallVec::new();
    };
    match &timeline.kind {
        TimelineKind::Group {
            kind: GroupKind::Sequential,
            children,
        } => {
            let mut offset = 0.0;
            children
                .iter()
                .map(|&child| {
                    let start = offset;
                    offset += child_end(timelines, child).unwrap_or(0.0);
                    start
                })
                .collect()
        }
        TimelineKind::Group { children, .. } => children.iter().map(|_| 0.0).collect(),
        _ => SmallVec::new(),
    }
}

/// `id` and all of its descendants, parents before children
pub(crate) fn subtree(timelines: &TimelineArena, id: TimelineId) -> Vec<TimelineId> {
    let mut out = Vec::new();
    let mut stack = vec![id];
    while let Some(next) = stack.pop() {
        let Some(timeline) = timelines.get(next) else {
            continue;
        };
        out.push(next);
        stack.extend(timeline.children().iter().rev().copied());
    }
    out
}

/// Topmost ancestor of `id`
pub(crate) fn root_of(timelines: &TimelineArena, mut id: TimelineId) -> TimelineId {
    while let Some(parent) = timelines.get(id).and_then(|t| t.parent) {
        id = parent;
    }
    id
}

/// Flag `id` and its ancestors for conversion and drop their cached
/// simple durations
pub(crate) fn mark_dirty(timelines: &mut TimelineArena, id: TimelineId) {
    let mut next = Some(id);
    while let Some(current) = next {
        let Some(timeline) = timelines.get_mut(current) else {
            break;
        };
        timeline.dirty = true;
        timeline.simple.set(None);
        next = timeline.parent;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::Animation;
    use cadence_core::{PropertyIndex, TargetTree};

    fn leaf(arena: &mut TimelineArena, duration: f64) -> TimelineId {
        let mut tree = TargetTree::new();
        let target = tree.create_root();
        let animation = Animation::new(target, PropertyIndex::OPACITY).with_to(0.0_f32);
        arena.insert(Timeline::animation(animation).with_duration(Duration::Time(duration)))
    }

    fn group(arena: &mut TimelineArena, group: Timeline, children: &[TimelineId]) -> TimelineId {
        let id = arena.insert(group);
        for &child in children {
            arena[child].parent = Some(id);
            if let TimelineKind::Group { children: list, .. } = &mut arena[id].kind {
                list.push(child);
            }
        }
        id
    }

    #[test]
    fn test_parallel_natural_duration() {
        let mut arena = TimelineArena::with_key();
        let a = leaf(&mut arena, 1.0);
        let b = leaf(&mut arena, 2.0);
        arena[b].timing.begin_time = Some(0.5);
        let root = group(&mut arena, Timeline::parallel(), &[a, b]);
        assert_eq!(natural_duration(&arena, root), 2.5);
    }

    #[test]
    fn test_sequential_offsets() {
        let mut arena = TimelineArena::with_key();
        let a = leaf(&mut arena, 1.0);
        let b = leaf(&mut arena, 2.0);
        let c = leaf(&mut arena, 0.5);
        arena[c].timing.speed_ratio = 0.5;
        let root = group(&mut arena, Timeline::sequential(), &[a, b, c]);

        assert_eq!(child_offsets(&arena, root).as_slice(), &[0.0, 1.0, 3.0]);
        assert_eq!(natural_duration(&arena, root), 4.0);
    }

    #[test]
    fn test_reversed_repeated_child() {
        let mut arena = TimelineArena::with_key();
        let a = leaf(&mut arena, 1.0);
        arena[a].timing.auto_reverse = true;
        let root = group(&mut arena, Timeline::parallel().with_repeat(RepeatBehavior::Count(3.0)), &[a]);

        assert_eq!(simple_duration(&arena, root), 2.0);
        assert_eq!(arena[root].timing.active_duration(2.0), 6.0);
    }

    #[test]
    fn test_subtree_and_dirty() {
        let mut arena = TimelineArena::with_key();
        let a = leaf(&mut arena, 1.0);
        let inner = group(&mut arena, Timeline::parallel(), &[a]);
        let root = group(&mut arena, Timeline::parallel(), &[inner]);

        assert_eq!(subtree(&arena, root), vec![root, inner, a]);
        assert_eq!(root_of(&arena, a), root);

        for timeline in arena.values_mut() {
            timeline.dirty = false;
        }
        mark_dirty(&mut arena, a);
        assert!(arena[root].dirty && arena[inner].dirty && arena[a].dirty);
    }

    #[test]
    fn test_simple_duration_cached_until_dirty() {
        let mut arena = TimelineArena::with_key();
        let a = leaf(&mut arena, 1.0);
        let b = leaf(&mut arena, 2.0);
        let inner = group(&mut arena, Timeline::sequential(), &[a, b]);
        let root = group(&mut arena, Timeline::parallel(), &[inner]);
        assert_eq!(simple_duration(&arena, root), 3.0);
        assert_eq!(arena[inner].simple.get(), Some(3.0));

        arena[b].timing.duration = Duration::Time(4.0);
        assert_eq!(simple_duration(&arena, root), 3.0);

        mark_dirty(&mut arena, b);
        assert_eq!(arena[inner].simple.get(), None);
        assert_eq!(simple_duration(&arena, root), 5.0);
        assert_eq!(child_offsets(&arena, inner).as_slice(), &[0.0, 1.0]);
    }

    #[test]
    fn test_root_clock() {
        let mut clock = RootClock::started_at(10.0);
        assert_eq!(clock.time(12.0), 2.0);

        clock.pause(12.0);
        assert_eq!(clock.time(20.0), 2.0);
        clock.resume(20.0);
        assert_eq!(clock.time(21.0), 3.0);

        clock.seek(21.0, 0.5);
        assert_eq!(clock.time(22.0), 1.5);
    }
}
