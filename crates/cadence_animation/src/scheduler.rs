//! Time manager
//!
//! Owns every timing tree and advances the live ones once per frame.
//!
//! Root timelines are kept in a live list, newest first. Each tick walks the
//! list from its head; a "new timelines only" pass stops at the node that was
//! the head when the previous pass started, so roots added mid-frame get
//! ticked in the same frame without ticking anyone twice. Removing a root
//! during the walk moves any walk marker that points at it to its successor.
//!
//! Per root, a tick runs up to three phases:
//!
//! 1. compositor conversion of the subtree when it changed (only when a
//!    compositor is attached to the tick)
//! 2. clock sampling and value application for every node
//! 3. starting and stopping compositor animations to match the decisions
//!    made in phase 2
//!
//! ```ignore
//! let mut manager = TimeManager::new(SchedulerConfig::default());
//! let storyboard = manager.insert(Timeline::parallel());
//! let fade = manager.insert(Timeline::animation(
//!     Animation::new(element, PropertyIndex::OPACITY).with_to(0.0_f32),
//! ));
//! manager.add_child(storyboard, fade)?;
//! manager.begin(storyboard, &mut tree)?;
//!
//! // every frame
//! manager.tick(TickParams::frame(), &mut tree, Some(&mut compositor), &mut frames);
//! ```

use std::time::Instant;

use cadence_core::{PropertyIndex, TargetId, TargetTree};
use rustc_hash::{FxHashMap, FxHashSet};
use slotmap::SlotMap;
use smallvec::SmallVec;

use crate::animation::{Animation, AnimationContent, AnimationTarget};
use crate::composition::{self, CompositionAnimationConversionResult, Compositor, CompositorAnimationId};
use crate::config::SchedulerConfig;
use crate::error::{AnimationError, Result};
use crate::frame::FrameScheduler;
use crate::independent::{self, Classification, DependentReason, IndependentTargetSet};
use crate::registry::AnimationRegistry;
use crate::timeline::{self, RootClock, Timeline, TimelineId, TimelineKind};
use crate::timing::{self, ClockSample, ClockState, TimingProperties};

// ============================================================================
// Events and tick parameters
// ============================================================================

/// Notifications raised while ticking, drained with [`TimeManager::drain_events`]
#[derive(Clone, Debug, PartialEq)]
pub enum TimelineEvent {
    /// A root timeline finished its active period
    Completed(TimelineId),
    /// A dispatcher timer is due
    TimerTick(TimelineId),
    /// The live list went from empty to non-empty
    HasAnimations,
    /// No finite animation is active any more
    AnimationsComplete,
    /// An animation moved to or from the compositor
    IndependentAnimationSetChanged,
    /// An animation failed to begin inside a tick
    Error(AnimationError),
}

/// What a call to [`TimeManager::tick`] should do
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickParams {
    /// Only tick roots added since the previous pass, without advancing time
    pub new_timelines_only: bool,
    /// Collect and diff the visuals that need composition nodes
    pub want_ia_targets: bool,
    /// Only advance dispatcher timers
    pub timers_only: bool,
}

impl TickParams {
    /// Regular frame tick
    pub fn frame() -> Self {
        Self {
            want_ia_targets: true,
            ..Self::default()
        }
    }

    /// Catch-up pass for roots added during the current frame
    pub fn new_timelines_only() -> Self {
        Self {
            new_timelines_only: true,
            ..Self::default()
        }
    }

    pub fn timers_only() -> Self {
        Self {
            timers_only: true,
            ..Self::default()
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickResult {
    /// The last finite animation stopped being active during this tick
    pub check_for_animations_complete: bool,
    pub has_active_finite_animations: bool,
}

/// Per-root state threaded through one subtree walk
#[derive(Debug, Default)]
struct TickContext {
    want_ia_targets: bool,
    timers_only: bool,
    /// The root is active or paused
    root_running: bool,
    /// Some node needs the very next frame
    needs_frame: bool,
    /// Root seconds until the next scheduled state change
    next_wakeup: Option<f64>,
    has_active_finite: bool,
}

impl TickContext {
    fn wake_after(&mut self, delay: f64) {
        if delay.is_finite() && delay >= 0.0 {
            self.next_wakeup = Some(self.next_wakeup.map_or(delay, |d| d.min(delay)));
        }
    }
}

/// Compositor calls queued outside a tick, flushed after the walk
#[derive(Clone, Copy, Debug)]
enum PendingOp {
    Stop(CompositorAnimationId),
    Pause(CompositorAnimationId),
    Resume(CompositorAnimationId),
}

// ============================================================================
// Live list
// ============================================================================

#[derive(Clone, Copy, Debug)]
struct LiveNode {
    timeline: TimelineId,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Doubly linked list of live roots over a slot vector
#[derive(Debug, Default)]
struct LiveList {
    nodes: Vec<Option<LiveNode>>,
    free: Vec<usize>,
    slots: FxHashMap<TimelineId, usize>,
    head: Option<usize>,
    /// Head when the current pass started
    snapshot_head: Option<usize>,
    /// Head when the previous pass started
    previous_head: Option<usize>,
    /// Next node of the walk in progress
    walk_next: Option<usize>,
}

impl LiveList {
    fn len(&self) -> usize {
        self.slots.len()
    }

    fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn contains(&self, timeline: TimelineId) -> bool {
        self.slots.contains_key(&timeline)
    }

    fn get(&self, slot: usize) -> Option<&LiveNode> {
        self.nodes.get(slot)?.as_ref()
    }

    fn push_front(&mut self, timeline: TimelineId) -> usize {
        let node = LiveNode {
            timeline,
            prev: None,
            next: self.head,
        };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                slot
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        };
        if let Some(old_head) = self.head.and_then(|h| self.nodes[h].as_mut()) {
            old_head.prev = Some(slot);
        }
        self.head = Some(slot);
        self.slots.insert(timeline, slot);
        slot
    }

    fn remove(&mut self, timeline: TimelineId) -> bool {
        let Some(slot) = self.slots.remove(&timeline) else {
            return false;
        };
        let Some(node) = self.nodes[slot].take() else {
            return false;
        };
        match node.prev.and_then(|p| self.nodes[p].as_mut()) {
            Some(prev) => prev.next = node.next,
            None => self.head = node.next,
        }
        if let Some(next) = node.next.and_then(|n| self.nodes[n].as_mut()) {
            next.prev = node.prev;
        }
        for marker in [&mut self.snapshot_head, &mut self.previous_head, &mut self.walk_next] {
            if *marker == Some(slot) {
                *marker = node.next;
            }
        }
        self.free.push(slot);
        true
    }

    /// Live roots, newest first
    fn timelines(&self) -> Vec<TimelineId> {
        let mut out = Vec::with_capacity(self.len());
        let mut cursor = self.head;
        while let Some(node) = cursor.and_then(|slot| self.get(slot)) {
            out.push(node.timeline);
            cursor = node.next;
        }
        out
    }
}

// ============================================================================
// Time manager
// ============================================================================

/// Scheduler of timing trees
#[derive(Debug)]
pub struct TimeManager {
    config: SchedulerConfig,
    timelines: SlotMap<TimelineId, Timeline>,
    live: LiveList,
    registry: AnimationRegistry,
    ia_targets: IndependentTargetSet,
    events: Vec<TimelineEvent>,
    /// Compositor work queued outside a tick
    pending_ops: Vec<PendingOp>,
    time_override: Option<f64>,
    started: Instant,
    /// Logical time of the current frame
    time: f64,
    had_active_finite: bool,
}

impl Default for TimeManager {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl TimeManager {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            timelines: SlotMap::with_key(),
            live: LiveList::default(),
            registry: AnimationRegistry::new(),
            ia_targets: IndependentTargetSet::new(),
            events: Vec::new(),
            pending_ops: Vec::new(),
            time_override: None,
            started: Instant::now(),
            time: 0.0,
            had_active_finite: false,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    // =========================================================================
    // Time
    // =========================================================================

    /// Substitute a fixed wall clock reading in seconds (tests and tooling)
    pub fn set_time_override(&mut self, time: Option<f64>) {
        self.time_override = time;
    }

    fn slow_motion_factor(&self) -> f64 {
        let factor = self.config.slow_motion_factor;
        if factor.is_finite() && factor > 0.0 {
            factor
        } else {
            1.0
        }
    }

    fn current_time(&self) -> f64 {
        if self.config.lock_time_to_zero {
            return 0.0;
        }
        let wall = self
            .time_override
            .unwrap_or_else(|| self.started.elapsed().as_secs_f64());
        wall / self.slow_motion_factor()
    }

    fn refresh_time(&mut self) -> f64 {
        self.time = self.current_time();
        self.time
    }

    /// Logical time of the most recent tick
    pub fn time(&self) -> f64 {
        self.time
    }

    // =========================================================================
    // Timing trees
    // =========================================================================

    /// Take ownership of a timeline; it stays inert until begun or added
    pub fn insert(&mut self, mut timeline: Timeline) -> TimelineId {
        timeline.parent = None;
        timeline.simple.set(None);
        self.timelines.insert(timeline)
    }

    /// Append `child` (a detached root) to the group `parent`
    pub fn add_child(&mut self, parent: TimelineId, child: TimelineId) -> Result<()> {
        if !self.timelines.contains_key(parent) || !self.timelines.contains_key(child) {
            return Err(AnimationError::UnknownTimeline);
        }
        if self.timelines[child].parent.is_some()
            || self.live.contains(child)
            || timeline::root_of(&self.timelines, parent) == child
        {
            return Err(AnimationError::InvalidChild);
        }
        let TimelineKind::Group { children, .. } = &mut self.timelines[parent].kind else {
            return Err(AnimationError::InvalidChild);
        };
        children.push(child);
        self.timelines[child].parent = Some(parent);
        timeline::mark_dirty(&mut self.timelines, parent);
        Ok(())
    }

    /// Stop and drop a timeline and everything below it
    pub fn destroy(&mut self, id: TimelineId, tree: &mut TargetTree) -> bool {
        if !self.timelines.contains_key(id) {
            return false;
        }
        self.remove_timeline(id, tree);
        for node in timeline::subtree(&self.timelines, id) {
            self.finalize_iteration(node, tree);
        }
        if let Some(parent) = self.timelines[id].parent {
            if let TimelineKind::Group { children, .. } = &mut self.timelines[parent].kind {
                children.retain(|c| *c != id);
            }
            timeline::mark_dirty(&mut self.timelines, parent);
        }
        for node in timeline::subtree(&self.timelines, id) {
            self.timelines.remove(node);
        }
        true
    }

    pub fn get(&self, id: TimelineId) -> Option<&Timeline> {
        self.timelines.get(id)
    }

    pub fn animation(&self, id: TimelineId) -> Option<&Animation> {
        self.timelines.get(id).and_then(Timeline::as_animation)
    }

    /// Change timing properties; the compositor conversion is redone
    pub fn update_timing(&mut self, id: TimelineId, update: impl FnOnce(&mut TimingProperties)) -> Result<()> {
        let node = self.timelines.get_mut(id).ok_or(AnimationError::UnknownTimeline)?;
        update(&mut node.timing);
        timeline::mark_dirty(&mut self.timelines, id);
        Ok(())
    }

    /// Change what an animation interpolates; the compositor conversion is redone
    pub fn update_animation(&mut self, id: TimelineId, update: impl FnOnce(&mut AnimationContent)) -> Result<()> {
        let animation = self
            .timelines
            .get_mut(id)
            .and_then(Timeline::as_animation_mut)
            .ok_or(AnimationError::UnknownTimeline)?;
        update(animation.content_mut());
        timeline::mark_dirty(&mut self.timelines, id);
        Ok(())
    }

    // =========================================================================
    // Live list
    // =========================================================================

    /// Start ticking a root timeline; its animations begin lazily
    pub fn add_timeline(&mut self, root: TimelineId) -> Result<()> {
        let now = self.refresh_time();
        let node = self.timelines.get_mut(root).ok_or(AnimationError::UnknownTimeline)?;
        if node.parent.is_some() {
            return Err(AnimationError::NotARoot);
        }
        if self.live.contains(root) {
            return Ok(());
        }
        node.root_clock = Some(RootClock::started_at(now));
        node.clock = ClockSample::NOT_STARTED;
        node.completed = false;

        if self.live.is_empty() {
            self.events.push(TimelineEvent::HasAnimations);
        }
        self.live.push_front(root);
        tracing::debug!("timeline {:?} added at {:.3}s ({} live)", root, now, self.live.len());
        Ok(())
    }

    /// Stop ticking a root timeline and release everything it controls
    pub fn remove_timeline(&mut self, root: TimelineId, tree: &mut TargetTree) -> bool {
        if !self.live.remove(root) {
            return false;
        }
        for id in timeline::subtree(&self.timelines, root) {
            self.finalize_iteration(id, tree);
        }
        if let Some(node) = self.timelines.get_mut(root) {
            node.root_clock = None;
        }
        tracing::debug!("timeline {:?} removed ({} live)", root, self.live.len());
        true
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn is_live(&self, root: TimelineId) -> bool {
        self.live.contains(root)
    }

    // =========================================================================
    // Storyboard control
    // =========================================================================

    /// Validate a timing tree, begin all of its animations and start ticking it
    ///
    /// Restarts the tree if it is already live.
    pub fn begin(&mut self, root: TimelineId, tree: &mut TargetTree) -> Result<()> {
        let policy = self.config.error_policy;
        self.begin_tree(root, tree).map_err(|error| policy.check(error))
    }

    fn begin_tree(&mut self, root: TimelineId, tree: &mut TargetTree) -> Result<()> {
        let node = self.timelines.get(root).ok_or(AnimationError::UnknownTimeline)?;
        if node.parent.is_some() {
            return Err(AnimationError::NotARoot);
        }

        let nodes = timeline::subtree(&self.timelines, root);
        let mut claimed = FxHashSet::default();
        let mut resolved = Vec::new();
        for &id in &nodes {
            let Some(animation) = self.timelines[id].as_animation() else {
                continue;
            };
            let target = self.resolve_target(id, tree)?;
            let property = animation.property();
            if !claimed.insert((target, property)) {
                return Err(AnimationError::ConflictingAnimations {
                    property: property_name(tree, property),
                });
            }
            resolved.push((id, target));
        }

        self.remove_timeline(root, tree);
        for &id in &nodes {
            let node = &mut self.timelines[id];
            node.clock = ClockSample::NOT_STARTED;
            node.completed = false;
            node.dirty = true;
            match &mut node.kind {
                TimelineKind::Animation(animation) => animation.reset_runtime(),
                TimelineKind::Timer(timer) => timer.fired = 0,
                TimelineKind::Group { .. } => {}
            }
        }
        for (id, target) in resolved {
            self.on_begin(id, target, tree);
        }
        self.add_timeline(root)
    }

    /// Stop a root timeline; held values are released
    pub fn stop(&mut self, root: TimelineId, tree: &mut TargetTree) -> Result<()> {
        if !self.timelines.contains_key(root) {
            return Err(AnimationError::UnknownTimeline);
        }
        self.remove_timeline(root, tree);
        for id in timeline::subtree(&self.timelines, root) {
            self.timelines[id].clock.state = ClockState::Stopped;
        }
        Ok(())
    }

    pub fn pause(&mut self, root: TimelineId) -> Result<()> {
        let now = self.refresh_time();
        self.root_clock_mut(root)?.pause(now);
        self.queue_subtree_ops(root, PendingOp::Pause);
        Ok(())
    }

    pub fn resume(&mut self, root: TimelineId) -> Result<()> {
        let now = self.refresh_time();
        self.root_clock_mut(root)?.resume(now);
        self.queue_subtree_ops(root, PendingOp::Resume);
        Ok(())
    }

    /// Move a root timeline to `time` seconds after its start
    pub fn seek(&mut self, root: TimelineId, time: f64) -> Result<()> {
        let now = self.refresh_time();
        self.root_clock_mut(root)?.seek(now, time.max(0.0));
        for id in timeline::subtree(&self.timelines, root) {
            if let Some(animation) = self.timelines[id].as_animation_mut() {
                animation.final_value_applied = false;
                // Restarted at the new offset by the next tick
                if let Some(running) = animation.compositor_animation.take() {
                    self.pending_ops.push(PendingOp::Stop(running));
                }
            }
        }
        Ok(())
    }

    /// Jump to the end of the active period
    pub fn skip_to_fill(&mut self, root: TimelineId) -> Result<()> {
        let simple = timeline::simple_duration(&self.timelines, root);
        let node = self.timelines.get(root).ok_or(AnimationError::UnknownTimeline)?;
        match node.timing.end_time(simple) {
            Some(end) if end.is_finite() => self.seek(root, end),
            _ => Ok(()),
        }
    }

    pub fn get_current_state(&self, id: TimelineId) -> Option<ClockState> {
        self.timelines.get(id).map(|t| t.clock.state)
    }

    /// Position within the simple duration as of the last tick
    pub fn get_current_time(&self, id: TimelineId) -> Option<f64> {
        self.timelines.get(id).map(|t| t.clock.local_time)
    }

    fn root_clock_mut(&mut self, root: TimelineId) -> Result<&mut RootClock> {
        let node = self.timelines.get_mut(root).ok_or(AnimationError::UnknownTimeline)?;
        node.root_clock.as_mut().ok_or(AnimationError::NotARoot)
    }

    fn queue_subtree_ops(&mut self, root: TimelineId, op: fn(CompositorAnimationId) -> PendingOp) {
        for id in timeline::subtree(&self.timelines, root) {
            if let Some(running) = self.timelines[id].as_animation().and_then(Animation::compositor_animation) {
                self.pending_ops.push(op(running));
            }
        }
    }

    // =========================================================================
    // Registry and automation
    // =========================================================================

    /// Animation controlling a target property
    pub fn get_animation_on_property(&self, target: TargetId, property: PropertyIndex) -> Option<TimelineId> {
        self.registry.get_animation_on_property(target, property)
    }

    pub fn ia_targets(&self) -> &IndependentTargetSet {
        &self.ia_targets
    }

    /// Any live root that is running or waiting to begin
    pub fn has_active_animations(&self) -> bool {
        self.live.timelines().into_iter().any(|root| {
            matches!(
                self.get_current_state(root),
                Some(ClockState::Active | ClockState::NotStarted)
            )
        })
    }

    /// Stop every live root and forget all controllers
    pub fn stop_all_timelines_after_test(&mut self, tree: &mut TargetTree) {
        for root in self.live.timelines() {
            let _ = self.stop(root, tree);
        }
        self.registry.clear();
        self.ia_targets.clear(tree);
        self.had_active_finite = false;
        tracing::debug!("all timelines stopped");
    }

    pub fn events(&self) -> &[TimelineEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<TimelineEvent> {
        std::mem::take(&mut self.events)
    }

    // =========================================================================
    // Animation lifecycle
    // =========================================================================

    fn resolve_target(&self, id: TimelineId, tree: &TargetTree) -> Result<TargetId> {
        let animation = self
            .timelines
            .get(id)
            .and_then(Timeline::as_animation)
            .ok_or(AnimationError::UnknownTimeline)?;

        let target = match animation.target() {
            AnimationTarget::Id(target) => tree
                .contains(*target)
                .then_some(*target)
                .ok_or_else(|| AnimationError::UnresolvedTarget {
                    name: format!("{:?}", target),
                })?,
            AnimationTarget::Name(name) => tree
                .find_by_name(name)
                .ok_or_else(|| AnimationError::UnresolvedTarget { name: name.clone() })?,
        };

        let property = animation.property();
        let info = tree.property(property).ok_or_else(|| AnimationError::UnresolvedProperty {
            property: format!("{:?}", property),
        })?;
        if let Some(kind) = tree.kind(target) {
            if !info.applies_to(kind) {
                return Err(AnimationError::UnresolvedProperty {
                    property: info.name.to_string(),
                });
            }
        }
        animation.validate(&info.name, info.value_kind)?;
        Ok(target)
    }

    /// Take control of the target property, continuing from a running
    /// predecessor when there is one
    fn on_begin(&mut self, id: TimelineId, target: TargetId, tree: &TargetTree) {
        let Some(property) = self.animation(id).map(Animation::property) else {
            return;
        };

        let mut handoff = None;
        let predecessor = self
            .registry
            .get_animation_on_property(target, property)
            .filter(|p| *p != id);
        if let Some(predecessor) = predecessor {
            let simple = timeline::simple_duration(&self.timelines, predecessor);
            if let Some(node) = self.timelines.get_mut(predecessor) {
                let running = node.clock.state == ClockState::Active && simple > 0.0;
                if let Some(previous) = node.as_animation_mut() {
                    match previous.current_value.clone() {
                        Some(value) if running => {
                            handoff = Some((value, previous.compositor_animation.take()));
                        }
                        _ => {
                            if let Some(stale) = previous.compositor_animation.take() {
                                self.pending_ops.push(PendingOp::Stop(stale));
                            }
                        }
                    }
                    previous.has_control = false;
                }
            }
        }

        self.registry.set_animation_on_property(target, property, id);
        let Some(animation) = self.timelines.get_mut(id).and_then(Timeline::as_animation_mut) else {
            return;
        };
        match handoff {
            Some((value, running)) => {
                animation.base_value = Some(value);
                animation.has_handoff = true;
                animation.handoff_from = running;
            }
            None => {
                animation.base_value = tree.effective_value(target, property);
                animation.has_handoff = false;
            }
        }
        animation.resolved_target = Some(target);
        animation.has_control = true;
        animation.begun = true;
        animation.reported_dependent = false;
        animation.final_value_applied = false;
        tracing::debug!(
            "animation {:?} began on {:?} {:?} (handoff: {})",
            id,
            target,
            property,
            animation.has_handoff
        );
    }

    /// Begin an animation reached by the clock before anyone began it
    fn begin_lazily(&mut self, id: TimelineId, tree: &TargetTree) -> Result<()> {
        let target = self.resolve_target(id, tree)?;
        self.on_begin(id, target, tree);
        Ok(())
    }

    /// Release the target property and any compositor work
    fn finalize_iteration(&mut self, id: TimelineId, tree: &mut TargetTree) {
        let Some(animation) = self.timelines.get_mut(id).and_then(Timeline::as_animation_mut) else {
            return;
        };
        if !animation.begun {
            return;
        }
        animation.begun = false;

        if let Some(target) = animation.resolved_target {
            let property = animation.property();
            self.registry.clear_animation_on_property(target, property, id);
            if animation.has_control {
                tree.clear_animated_value(target, property);
            }
        }
        animation.has_control = false;
        animation.has_handoff = false;
        for running in [animation.compositor_animation.take(), animation.handoff_from.take()]
            .into_iter()
            .flatten()
        {
            self.pending_ops.push(PendingOp::Stop(running));
        }
        if std::mem::take(&mut animation.is_independent) {
            self.events.push(TimelineEvent::IndependentAnimationSetChanged);
        }
        tracing::debug!("animation {:?} finalized", id);
    }

    fn finalize_subtree(&mut self, id: TimelineId, tree: &mut TargetTree) {
        for node in timeline::subtree(&self.timelines, id) {
            self.finalize_iteration(node, tree);
            self.timelines[node].clock.state = ClockState::Stopped;
        }
    }

    // =========================================================================
    // Tick
    // =========================================================================

    /// Advance the live timing trees by one frame
    ///
    /// Values of dependent animations are written into `tree`. Independent
    /// animations are handed to `compositor`; without a compositor nothing is
    /// converted and every animation ticks here.
    pub fn tick(
        &mut self,
        params: TickParams,
        tree: &mut TargetTree,
        mut compositor: Option<&mut dyn Compositor>,
        frames: &mut dyn FrameScheduler,
    ) -> TickResult {
        if !params.new_timelines_only {
            self.refresh_time();
        }

        let mut has_active_finite = false;
        let mut visited = 0usize;

        self.live.snapshot_head = self.live.head;
        let mut cursor = self.live.head;
        while let Some(slot) = cursor {
            if params.new_timelines_only && Some(slot) == self.live.previous_head {
                break;
            }
            let Some(node) = self.live.get(slot).copied() else {
                break;
            };
            self.live.walk_next = node.next;
            has_active_finite |= self.tick_root(node.timeline, params, tree, compositor.as_deref_mut(), frames);
            visited += 1;
            cursor = self.live.walk_next;
        }
        self.live.walk_next = None;
        self.live.previous_head = self.live.snapshot_head;

        if let Some(compositor) = compositor {
            for op in self.pending_ops.drain(..) {
                match op {
                    PendingOp::Stop(id) => compositor.stop_animation(id),
                    PendingOp::Pause(id) => compositor.pause_animation(id),
                    PendingOp::Resume(id) => compositor.resume_animation(id),
                }
            }
        }

        let full = !params.new_timelines_only && !params.timers_only;
        if full {
            self.registry.prune(tree);
            if params.want_ia_targets {
                self.ia_targets.update_ia_targets(tree);
            }
        }

        let mut result = TickResult {
            check_for_animations_complete: false,
            has_active_finite_animations: has_active_finite,
        };
        if full {
            result.check_for_animations_complete = self.had_active_finite && !has_active_finite;
            self.had_active_finite = has_active_finite;
            if result.check_for_animations_complete {
                self.events.push(TimelineEvent::AnimationsComplete);
            }
        }

        tracing::trace!(
            "tick at {:.3}s: {} of {} timelines visited{}",
            self.time,
            visited,
            self.live.len(),
            if params.new_timelines_only { " (new only)" } else { "" }
        );
        result
    }

    /// Advance dispatcher timers only
    pub fn tick_timers(&mut self, tree: &mut TargetTree, frames: &mut dyn FrameScheduler) -> TickResult {
        self.tick(TickParams::timers_only(), tree, None, frames)
    }

    /// Tick one root; returns whether a finite animation is active below it
    fn tick_root(
        &mut self,
        root: TimelineId,
        params: TickParams,
        tree: &mut TargetTree,
        compositor: Option<&mut (dyn Compositor + '_)>,
        frames: &mut dyn FrameScheduler,
    ) -> bool {
        let Some(node) = self.timelines.get(root) else {
            self.live.remove(root);
            return false;
        };
        let Some(clock) = node.root_clock else {
            return false;
        };
        let root_time = clock.time(self.time);
        let paused = clock.is_paused();

        if compositor.is_some() && !params.timers_only && node.dirty {
            self.convert_root(root);
        }

        let simple = timeline::simple_duration(&self.timelines, root);
        let root_state = timing::sample(&self.timelines[root].timing, root_time, simple).state;
        let mut ctx = TickContext {
            want_ia_targets: params.want_ia_targets,
            timers_only: params.timers_only,
            root_running: root_state == ClockState::Active || paused,
            ..TickContext::default()
        };
        self.tick_timeline(root, root_time, 1.0, &mut ctx, tree);

        if let Some(compositor) = compositor {
            self.reconcile_compositor(root, root_time, paused, compositor);
        }

        if !paused {
            if ctx.needs_frame {
                frames.request_frame();
            } else if let Some(delay) = ctx.next_wakeup {
                frames.request_frame_after(delay * self.slow_motion_factor());
            }
        }

        if !params.timers_only {
            let node = &mut self.timelines[root];
            let state = node.clock.state;
            if matches!(state, ClockState::Filling | ClockState::Stopped) && !node.completed {
                node.completed = true;
                self.events.push(TimelineEvent::Completed(root));
                tracing::debug!("timeline {:?} completed", root);
            }
            if state == ClockState::Stopped {
                self.remove_timeline(root, tree);
            }
        }
        ctx.has_active_finite
    }

    fn tick_timeline(
        &mut self,
        id: TimelineId,
        parent_time: f64,
        scale: f64,
        ctx: &mut TickContext,
        tree: &mut TargetTree,
    ) {
        let simple = timeline::simple_duration(&self.timelines, id);
        let Some(node) = self.timelines.get_mut(id) else {
            return;
        };
        if ctx.timers_only && node.as_animation().is_some() {
            return;
        }

        let sample = timing::sample(&node.timing, parent_time, simple);
        let previous = std::mem::replace(&mut node.clock, sample).state;
        if let Some(delay) = node.timing.time_to_next_transition(parent_time, simple) {
            ctx.wake_after(delay / scale);
        }
        let local_scale = scale * node.timing.effective_speed_ratio();
        let finite = node.timing.active_duration(simple).is_finite();

        match &node.kind {
            TimelineKind::Group { children, .. } => {
                if sample.state == ClockState::Stopped {
                    if previous != ClockState::Stopped {
                        self.finalize_subtree(id, tree);
                    }
                    return;
                }
                let children: SmallVec<[TimelineId; 4]> = children.clone();
                let offsets = timeline::child_offsets(&self.timelines, id);
                let local = if sample.state == ClockState::NotStarted {
                    f64::NEG_INFINITY
                } else {
                    sample.local_time
                };
                for (child, offset) in children.into_iter().zip(offsets) {
                    self.tick_timeline(child, local - offset, local_scale, ctx, tree);
                }
            }
            TimelineKind::Animation(_) => {
                if sample.state == ClockState::Active && finite {
                    ctx.has_active_finite = true;
                }
                self.tick_animation(id, sample, previous, simple, ctx, tree);
            }
            TimelineKind::Timer(_) => self.tick_timer(id, sample, local_scale, ctx),
        }
    }

    fn tick_animation(
        &mut self,
        id: TimelineId,
        sample: ClockSample,
        previous: ClockState,
        simple: f64,
        ctx: &mut TickContext,
        tree: &mut TargetTree,
    ) {
        let state = sample.state;
        match state {
            ClockState::NotStarted => return,
            ClockState::Stopped => {
                if previous != ClockState::Stopped {
                    self.finalize_iteration(id, tree);
                }
                return;
            }
            ClockState::Active | ClockState::Filling => {}
        }

        if !self.animation(id).map_or(false, |a| a.begun) {
            if let Err(error) = self.begin_lazily(id, tree) {
                let error = self.config.error_policy.check(error);
                self.events.push(TimelineEvent::Error(error));
                // Stays inert until begun again
                if let Some(animation) = self.timelines.get_mut(id).and_then(Timeline::as_animation_mut) {
                    animation.begun = true;
                }
                return;
            }
        }

        let on_ui_thread = self.should_tick_on_ui_thread(id, simple, state, ctx, tree);
        let Some(animation) = self.timelines.get_mut(id).and_then(Timeline::as_animation_mut) else {
            return;
        };

        let independent = !on_ui_thread;
        if animation.is_independent != independent {
            animation.is_independent = independent;
            tracing::debug!(
                "animation {:?} now ticks on the {}",
                id,
                if independent { "compositor" } else { "UI thread" }
            );
            self.events.push(TimelineEvent::IndependentAnimationSetChanged);
        }

        let held = state == ClockState::Filling && animation.final_value_applied;
        if state == ClockState::Active {
            animation.final_value_applied = false;
        }
        if !held {
            // Computed even when independent so a successor can hand off from it
            let value = animation.compute_value(sample.progress, simple);
            if on_ui_thread && animation.has_control {
                if let (Some(target), Some(value)) = (animation.resolved_target, value) {
                    tree.set_animated_value(target, animation.property(), value);
                }
                if state == ClockState::Filling {
                    animation.final_value_applied = true;
                }
            }
        }

        if on_ui_thread && (state == ClockState::Active || previous == ClockState::Active) {
            ctx.needs_frame = true;
        }
    }

    fn tick_timer(&mut self, id: TimelineId, sample: ClockSample, scale: f64, ctx: &mut TickContext) {
        if sample.state != ClockState::Active {
            return;
        }
        let Some(TimelineKind::Timer(timer)) = self.timelines.get_mut(id).map(|t| &mut t.kind) else {
            return;
        };
        let interval = if timer.interval > 0.0 { timer.interval } else { 1.0 };
        let due = (sample.local_time / interval).floor() as u64;
        if due > timer.fired {
            timer.fired = due;
            self.events.push(TimelineEvent::TimerTick(id));
            tracing::trace!("timer {:?} fired ({} total)", id, due);
        }
        let next = (due + 1) as f64 * interval - sample.local_time;
        ctx.wake_after(next / scale);
    }

    /// Decide whether an animation's value is produced here this tick
    fn should_tick_on_ui_thread(
        &mut self,
        id: TimelineId,
        simple: f64,
        state: ClockState,
        ctx: &TickContext,
        tree: &TargetTree,
    ) -> bool {
        if !self.config.independent_animations_enabled || simple <= 0.0 {
            return true;
        }
        let discard_on_detach = self.config.discard_composition_on_detach;
        let Some(animation) = self.timelines.get_mut(id).and_then(Timeline::as_animation_mut) else {
            return true;
        };
        if animation.is_discrete() {
            return true;
        }
        let Some(target) = animation.resolved_target else {
            return true;
        };

        match independent::classify(tree, target, animation.property()) {
            Classification::Dependent(reason) => {
                if !animation.reported_dependent {
                    animation.reported_dependent = true;
                    tracing::debug!("animation {:?} on {:?} is not independent: {:?}", id, target, reason);
                }
                if reason == DependentReason::Detached && discard_on_detach && !animation.detached {
                    animation.detached = true;
                    animation.conversion = None;
                    if let Some(running) = animation.compositor_animation.take() {
                        self.pending_ops.push(PendingOp::Stop(running));
                    }
                    tracing::debug!("animation {:?} dropped its conversion on detach", id);
                }
                true
            }
            Classification::Independent { visual, ty } => {
                if std::mem::take(&mut animation.detached) {
                    // Reconverted by the next tick
                    timeline::mark_dirty(&mut self.timelines, id);
                    return true;
                }
                if !matches!(animation.conversion, Some(Ok(_))) {
                    return true;
                }
                // Held value is written here once after the root stops running
                if state == ClockState::Filling && !ctx.root_running && !animation.final_value_applied {
                    return true;
                }
                if ctx.want_ia_targets {
                    self.ia_targets.collect_ia_target(visual, ty);
                }
                false
            }
        }
    }

    // =========================================================================
    // Compositor
    // =========================================================================

    fn convert_root(&mut self, root: TimelineId) {
        let results = if self.config.independent_animations_enabled {
            composition::convert_timeline_tree(&self.timelines, root)
        } else {
            timeline::subtree(&self.timelines, root)
                .into_iter()
                .filter(|&id| self.timelines[id].as_animation().is_some())
                .map(|id| (id, Err(CompositionAnimationConversionResult::IndependentAnimationsDisabled)))
                .collect()
        };
        for (id, result) in results {
            let Some(animation) = self.timelines.get_mut(id).and_then(Timeline::as_animation_mut) else {
                continue;
            };
            // Detached targets are reconverted when they come back
            if animation.detached || animation.conversion.as_ref() == Some(&result) {
                continue;
            }
            if let Some(running) = animation.compositor_animation.take() {
                self.pending_ops.push(PendingOp::Stop(running));
            }
            if let Err(reason) = &result {
                tracing::trace!("animation {:?} stays on the UI thread: {}", id, reason);
            }
            animation.conversion = Some(result);
        }
        for id in timeline::subtree(&self.timelines, root) {
            self.timelines[id].dirty = false;
        }
    }

    /// Start compositor animations for independent animations and stop the
    /// ones that fell back to the UI thread
    fn reconcile_compositor(&mut self, root: TimelineId, root_time: f64, paused: bool, compositor: &mut dyn Compositor) {
        for id in timeline::subtree(&self.timelines, root) {
            let Some(animation) = self.timelines.get_mut(id).and_then(Timeline::as_animation_mut) else {
                continue;
            };
            let run = animation.is_independent && animation.has_control;
            match (animation.compositor_animation, run) {
                (None, true) => {
                    let (Some(target), Some(Ok(description))) = (animation.resolved_target, animation.conversion.as_ref())
                    else {
                        continue;
                    };
                    let running = compositor.start_animation(target, animation.property(), description, root_time);
                    if paused {
                        compositor.pause_animation(running);
                    }
                    animation.compositor_animation = Some(running);
                    if let Some(previous) = animation.handoff_from.take() {
                        compositor.stop_animation(previous);
                    }
                    tracing::debug!("animation {:?} started on the compositor as {:?}", id, running);
                }
                (Some(running), false) => {
                    compositor.stop_animation(running);
                    animation.compositor_animation = None;
                }
                _ => {}
            }
            if !animation.is_independent {
                if let Some(previous) = animation.handoff_from.take() {
                    compositor.stop_animation(previous);
                }
            }
        }
    }
}

fn property_name(tree: &TargetTree, property: PropertyIndex) -> String {
    tree.property(property)
        .map(|info| info.name.to_string())
        .unwrap_or_else(|| format!("{:?}", property))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::{CompositorOperation, RecordingCompositor};
    use crate::error::ErrorPolicy;
    use crate::frame::FrameRequests;
    use crate::timing::{Duration, FillBehavior};
    use cadence_core::{AnimValue, IndependentAnimationType, TargetKind};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Harness {
        manager: TimeManager,
        tree: TargetTree,
        compositor: RecordingCompositor,
        frames: FrameRequests,
        element: TargetId,
    }

    impl Harness {
        fn new(config: SchedulerConfig) -> Self {
            let mut tree = TargetTree::new();
            let root = tree.create_root();
            let element = tree.create_child(root, TargetKind::Element);
            let mut manager = TimeManager::new(config);
            manager.set_time_override(Some(0.0));
            Self {
                manager,
                tree,
                compositor: RecordingCompositor::new(),
                frames: FrameRequests::new(),
                element,
            }
        }

        /// Frame tick with the compositor attached
        fn at(&mut self, time: f64) -> TickResult {
            self.manager.set_time_override(Some(time));
            let compositor: &mut dyn Compositor = &mut self.compositor;
            self.manager
                .tick(TickParams::frame(), &mut self.tree, Some(compositor), &mut self.frames)
        }

        /// Frame tick without a compositor
        fn ui_at(&mut self, time: f64) -> TickResult {
            self.manager.set_time_override(Some(time));
            self.manager
                .tick(TickParams::frame(), &mut self.tree, None, &mut self.frames)
        }

        fn storyboard(&mut self, leaves: Vec<Timeline>) -> (TimelineId, Vec<TimelineId>) {
            let root = self.manager.insert(Timeline::parallel());
            let ids = leaves
                .into_iter()
                .map(|leaf| {
                    let id = self.manager.insert(leaf);
                    self.manager.add_child(root, id).unwrap();
                    id
                })
                .collect();
            (root, ids)
        }

        fn value(&self, target: TargetId, property: PropertyIndex) -> f32 {
            self.tree
                .effective_value(target, property)
                .and_then(|v| v.as_double())
                .unwrap()
        }
    }

    fn ramp(target: TargetId, property: PropertyIndex, from: f32, to: f32, seconds: f64) -> Timeline {
        Timeline::animation(Animation::new(target, property).with_from(from).with_to(to))
            .with_duration(Duration::Time(seconds))
    }

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn test_dependent_animation_writes_values() {
        let mut h = Harness::new(SchedulerConfig::default());
        let el = h.element;
        let (root, _) = h.storyboard(vec![ramp(el, PropertyIndex::WIDTH, 0.0, 10.0, 1.0)]);
        h.manager.begin(root, &mut h.tree).unwrap();

        h.at(0.0);
        let result = h.at(0.5);
        assert!(result.has_active_finite_animations);
        assert!(approx(h.value(el, PropertyIndex::WIDTH), 5.0));
        assert!(h.frames.immediate() > 0);
        assert!(h.compositor.running().is_empty());

        let result = h.at(1.5);
        assert!(result.check_for_animations_complete);
        assert!(approx(h.value(el, PropertyIndex::WIDTH), 10.0));
        assert_eq!(h.manager.get_current_state(root), Some(ClockState::Filling));

        let events = h.manager.drain_events();
        assert_eq!(events.first(), Some(&TimelineEvent::HasAnimations));
        assert!(events.contains(&TimelineEvent::Completed(root)));
        assert!(events.contains(&TimelineEvent::AnimationsComplete));
        // Held roots stay live but are no longer active
        assert!(h.manager.is_live(root));
        assert!(!h.manager.has_active_animations());
    }

    #[derive(Clone, Default)]
    struct NotIndependentCounter(Arc<AtomicUsize>);

    struct MessageVisitor(String);

    impl tracing::field::Visit for MessageVisitor {
        fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
            if field.name() == "message" {
                self.0 = format!("{:?}", value);
            }
        }
    }

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for NotIndependentCounter {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
            let mut visitor = MessageVisitor(String::new());
            event.record(&mut visitor);
            if visitor.0.contains("not independent") {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn test_detached_target_reports_once_and_ticks_on_ui_thread() {
        use tracing_subscriber::layer::SubscriberExt;

        let counter = NotIndependentCounter::default();
        let subscriber = tracing_subscriber::registry().with(counter.clone());

        tracing::subscriber::with_default(subscriber, || {
            let mut h = Harness::new(SchedulerConfig::default());
            let detached = h.tree.create(TargetKind::Element);
            let (root, leaves) = h.storyboard(vec![ramp(detached, PropertyIndex::OPACITY, 0.0, 1.0, 1.0)]);
            h.manager.begin(root, &mut h.tree).unwrap();

            for time in [0.0, 0.1, 0.2, 0.3] {
                h.at(time);
            }
            let animation = h.manager.animation(leaves[0]).unwrap();
            assert!(!animation.is_independent());
            assert!(h.compositor.running().is_empty());
            assert!(approx(h.value(detached, PropertyIndex::OPACITY), 0.3));
        });

        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_independent_animation_runs_on_compositor() {
        let mut h = Harness::new(SchedulerConfig::default());
        let el = h.element;
        let (root, leaves) = h.storyboard(vec![ramp(el, PropertyIndex::OPACITY, 0.0, 1.0, 2.0)]);
        h.manager.begin(root, &mut h.tree).unwrap();

        h.at(0.0);
        let animation = h.manager.animation(leaves[0]).unwrap();
        assert!(animation.is_independent());
        assert!(matches!(animation.conversion(), Some(Ok(_))));
        let (_, running) = h.compositor.find(el, PropertyIndex::OPACITY).unwrap();
        assert!((running.animation.duration - 2.0).abs() < 1e-9);
        // The compositor owns the visual value
        assert!(!h.tree.is_animated(el, PropertyIndex::OPACITY));
        assert!(h
            .tree
            .get(el)
            .unwrap()
            .requires_composition(IndependentAnimationType::Opacity));
        assert!(h
            .manager
            .drain_events()
            .contains(&TimelineEvent::IndependentAnimationSetChanged));
        // Only the end of the active period needs a wake-up
        assert_eq!(h.frames.immediate(), 0);
        assert_eq!(h.frames.next_delay(), Some(2.0));

        h.manager.stop(root, &mut h.tree).unwrap();
        h.at(0.5);
        assert!(h.compositor.running().is_empty());
        assert!(!h
            .tree
            .get(el)
            .unwrap()
            .requires_composition(IndependentAnimationType::Opacity));
    }

    #[test]
    fn test_filling_transition_ticks_once_on_ui_thread() {
        let mut h = Harness::new(SchedulerConfig::default());
        let el = h.element;
        let (root, leaves) = h.storyboard(vec![ramp(el, PropertyIndex::OPACITY, 0.0, 0.5, 1.0)]);
        h.manager.begin(root, &mut h.tree).unwrap();

        h.at(0.0);
        assert!(h.manager.animation(leaves[0]).unwrap().is_independent());

        h.at(1.5);
        assert!(!h.manager.animation(leaves[0]).unwrap().is_independent());
        assert!(approx(h.value(el, PropertyIndex::OPACITY), 0.5));
        assert!(h.compositor.running().is_empty());

        h.at(2.0);
        assert!(h.manager.animation(leaves[0]).unwrap().is_independent());
        assert_eq!(h.compositor.running().len(), 1);
    }

    #[test]
    fn test_filled_leaf_resyncs_when_root_stops_running() {
        let mut h = Harness::new(SchedulerConfig::default());
        let el = h.element;
        let other = h.tree.create_child(h.tree.root().unwrap(), TargetKind::Element);
        let (root, leaves) = h.storyboard(vec![
            ramp(el, PropertyIndex::OPACITY, 0.0, 0.5, 1.0),
            ramp(other, PropertyIndex::OPACITY, 0.0, 0.5, 2.0),
        ]);
        h.manager.begin(root, &mut h.tree).unwrap();

        h.at(0.0);
        // Filling while the longer sibling keeps the root active
        h.at(1.5);
        assert_eq!(h.manager.get_current_state(leaves[0]), Some(ClockState::Filling));
        assert!(h.manager.animation(leaves[0]).unwrap().is_independent());
        assert!(!h.tree.is_animated(el, PropertyIndex::OPACITY));

        h.at(2.5);
        assert_eq!(h.manager.get_current_state(root), Some(ClockState::Filling));
        for &leaf in &leaves {
            assert!(!h.manager.animation(leaf).unwrap().is_independent());
        }
        assert!(approx(h.value(el, PropertyIndex::OPACITY), 0.5));
        assert!(approx(h.value(other, PropertyIndex::OPACITY), 0.5));

        h.at(3.0);
        for &leaf in &leaves {
            assert!(h.manager.animation(leaf).unwrap().is_independent());
        }
        assert_eq!(h.compositor.running().len(), 2);
    }

    #[test]
    fn test_detached_sibling_leaves_running_animations_alone() {
        let mut h = Harness::new(SchedulerConfig::default());
        let el = h.element;
        let detached = h.tree.create(TargetKind::Element);
        let (root, leaves) = h.storyboard(vec![
            ramp(el, PropertyIndex::OPACITY, 0.0, 1.0, 2.0),
            ramp(detached, PropertyIndex::OPACITY, 0.0, 1.0, 2.0),
        ]);
        h.manager.begin(root, &mut h.tree).unwrap();

        for time in [0.0, 0.1, 0.2, 0.3, 0.4] {
            h.at(time);
        }
        let starts = |h: &Harness| {
            h.compositor
                .operations()
                .iter()
                .filter(|op| matches!(op, CompositorOperation::Start(_)))
                .count()
        };
        assert_eq!(starts(&h), 1);
        assert!(!h
            .compositor
            .operations()
            .iter()
            .any(|op| matches!(op, CompositorOperation::Stop(_))));
        let (healthy, _) = h.compositor.find(el, PropertyIndex::OPACITY).unwrap();
        assert!(h.manager.animation(leaves[1]).unwrap().conversion().is_none());

        // Reattached targets are reconverted on the following tick
        h.tree.set_parent(detached, h.tree.root());
        h.at(0.5);
        h.at(0.6);
        assert!(h.manager.animation(leaves[1]).unwrap().is_independent());
        assert_eq!(starts(&h), 2);
        assert_eq!(h.compositor.find(el, PropertyIndex::OPACITY).unwrap().0, healthy);
    }

    #[test]
    fn test_handoff_continues_from_running_predecessor() {
        let mut h = Harness::new(SchedulerConfig::default());
        let el = h.element;
        let (first_root, first) = h.storyboard(vec![ramp(el, PropertyIndex::OPACITY, 0.0, 1.0, 2.0)]);
        h.manager.begin(first_root, &mut h.tree).unwrap();
        h.at(0.0);
        h.at(1.0);
        let (first_running, _) = h.compositor.find(el, PropertyIndex::OPACITY).unwrap();

        let (second_root, second) = h.storyboard(vec![Timeline::animation(
            Animation::new(el, PropertyIndex::OPACITY).with_to(0.0_f32),
        )
        .with_duration(Duration::Time(1.0))]);
        h.manager.begin(second_root, &mut h.tree).unwrap();

        let successor = h.manager.animation(second[0]).unwrap();
        assert!(successor.has_handoff());
        assert!(successor.has_control());
        assert_eq!(successor.base_value(), Some(&AnimValue::Double(0.5)));
        assert!(!h.manager.animation(first[0]).unwrap().has_control());
        assert_eq!(
            h.manager.get_animation_on_property(el, PropertyIndex::OPACITY),
            Some(second[0])
        );

        h.at(1.0);
        assert!(h.compositor.get(first_running).is_none());
        let (running, _) = h.compositor.find(el, PropertyIndex::OPACITY).unwrap();
        assert_ne!(running, first_running);
        assert_eq!(h.compositor.running().len(), 1);
    }

    #[test]
    fn test_single_controller_on_ui_thread() {
        let mut h = Harness::new(SchedulerConfig::default());
        let el = h.element;
        let (first_root, first) = h.storyboard(vec![ramp(el, PropertyIndex::WIDTH, 0.0, 10.0, 2.0)]);
        h.manager.begin(first_root, &mut h.tree).unwrap();
        h.ui_at(0.0);
        h.ui_at(1.0);
        assert!(approx(h.value(el, PropertyIndex::WIDTH), 5.0));

        let (second_root, _) = h.storyboard(vec![Timeline::animation(
            Animation::new(el, PropertyIndex::WIDTH).with_to(0.0_f32),
        )
        .with_duration(Duration::Time(1.0))]);
        h.manager.begin(second_root, &mut h.tree).unwrap();

        h.ui_at(1.5);
        // The predecessor keeps ticking but no longer writes
        assert!(approx(h.value(el, PropertyIndex::WIDTH), 2.5));
        assert_eq!(h.manager.get_current_state(first[0]), Some(ClockState::Active));
    }

    #[test]
    fn test_begin_validation() {
        let mut h = Harness::new(SchedulerConfig::default());
        let el = h.element;

        let (conflict, _) = h.storyboard(vec![
            ramp(el, PropertyIndex::WIDTH, 0.0, 1.0, 1.0),
            ramp(el, PropertyIndex::WIDTH, 1.0, 0.0, 1.0),
        ]);
        assert_eq!(
            h.manager.begin(conflict, &mut h.tree),
            Err(AnimationError::ConflictingAnimations {
                property: "Width".into()
            })
        );
        assert!(!h.manager.is_live(conflict));

        let (missing, _) = h.storyboard(vec![Timeline::animation(
            Animation::new("missing", PropertyIndex::WIDTH).with_to(1.0_f32),
        )]);
        assert_eq!(
            h.manager.begin(missing, &mut h.tree),
            Err(AnimationError::UnresolvedTarget {
                name: "missing".into()
            })
        );

        let (wrong_owner, _) = h.storyboard(vec![ramp(el, PropertyIndex::TRANSLATE_X, 0.0, 1.0, 1.0)]);
        assert_eq!(
            h.manager.begin(wrong_owner, &mut h.tree),
            Err(AnimationError::UnresolvedProperty {
                property: "TranslateX".into()
            })
        );

        h.tree.set_name(el, "panel");
        let (named, leaves) = h.storyboard(vec![Timeline::animation(
            Animation::new("panel", PropertyIndex::WIDTH).with_to(1.0_f32),
        )]);
        h.manager.begin(named, &mut h.tree).unwrap();
        assert_eq!(h.manager.animation(leaves[0]).unwrap().resolved_target(), Some(el));
    }

    #[test]
    #[should_panic(expected = "animation error")]
    fn test_fail_fast_policy_panics() {
        let mut h = Harness::new(SchedulerConfig::default().with_error_policy(ErrorPolicy::FailFast));
        let (root, _) = h.storyboard(vec![Timeline::animation(
            Animation::new("missing", PropertyIndex::WIDTH).with_to(1.0_f32),
        )]);
        let _ = h.manager.begin(root, &mut h.tree);
    }

    #[test]
    fn test_lazy_begin_error_becomes_event() {
        let mut h = Harness::new(SchedulerConfig::default());
        let (root, _) = h.storyboard(vec![Timeline::animation(
            Animation::new("missing", PropertyIndex::WIDTH).with_to(1.0_f32),
        )]);
        h.manager.add_timeline(root).unwrap();
        h.ui_at(0.0);
        h.ui_at(0.1);

        let errors: Vec<_> = h
            .manager
            .drain_events()
            .into_iter()
            .filter(|e| matches!(e, TimelineEvent::Error(_)))
            .collect();
        assert_eq!(
            errors,
            vec![TimelineEvent::Error(AnimationError::UnresolvedTarget {
                name: "missing".into()
            })]
        );
    }

    #[test]
    fn test_new_timelines_only_pass() {
        let mut h = Harness::new(SchedulerConfig::default());
        let el = h.element;
        let (first_root, first) = h.storyboard(vec![ramp(el, PropertyIndex::WIDTH, 0.0, 10.0, 2.0)]);
        h.manager.begin(first_root, &mut h.tree).unwrap();
        h.ui_at(0.0);

        h.manager.set_time_override(Some(0.5));
        let (second_root, second) = h.storyboard(vec![ramp(el, PropertyIndex::FONT_SIZE, 0.0, 10.0, 1.0)]);
        h.manager.begin(second_root, &mut h.tree).unwrap();
        h.manager
            .tick(TickParams::new_timelines_only(), &mut h.tree, None, &mut h.frames);

        assert_eq!(h.manager.get_current_state(second[0]), Some(ClockState::Active));
        assert!(approx(h.value(el, PropertyIndex::FONT_SIZE), 0.0));
        // The existing root was not ticked again
        assert_eq!(h.manager.get_current_time(first[0]), Some(0.0));

        h.ui_at(0.5);
        assert_eq!(h.manager.get_current_time(first[0]), Some(0.5));
        assert!(approx(h.value(el, PropertyIndex::WIDTH), 2.5));
    }

    #[test]
    fn test_live_list_marker_fixup() {
        let mut ids: SlotMap<TimelineId, ()> = SlotMap::with_key();
        let (a, b, c) = (ids.insert(()), ids.insert(()), ids.insert(()));

        let mut list = LiveList::default();
        let slot_a = list.push_front(a);
        let slot_b = list.push_front(b);
        list.push_front(c);
        assert_eq!(list.timelines(), vec![c, b, a]);

        list.walk_next = Some(slot_b);
        list.previous_head = Some(slot_b);
        list.snapshot_head = Some(slot_a);
        assert!(list.remove(b));
        assert_eq!(list.walk_next, Some(slot_a));
        assert_eq!(list.previous_head, Some(slot_a));
        assert_eq!(list.timelines(), vec![c, a]);

        assert!(list.remove(a));
        assert_eq!(list.walk_next, None);
        assert_eq!(list.snapshot_head, None);
        assert!(!list.remove(a));

        // Freed slots are reused
        let d = ids.insert(());
        assert_eq!(list.push_front(d), slot_a);
        assert_eq!(list.timelines(), vec![d, c]);
    }

    #[test]
    fn test_timers() {
        let mut h = Harness::new(SchedulerConfig::default());
        let timer = h.manager.insert(Timeline::timer(0.25));
        h.manager.add_timeline(timer).unwrap();

        h.ui_at(0.0);
        assert_eq!(h.frames.next_delay(), Some(0.25));
        h.manager.drain_events();
        h.frames.clear();

        h.manager.set_time_override(Some(0.6));
        h.manager.tick_timers(&mut h.tree, &mut h.frames);
        assert_eq!(h.manager.drain_events(), vec![TimelineEvent::TimerTick(timer)]);
        assert!((h.frames.next_delay().unwrap() - 0.15).abs() < 1e-9);

        // Nothing new is due
        h.ui_at(0.7);
        assert!(h.manager.drain_events().is_empty());
        assert!(h.manager.has_active_animations());
    }

    #[test]
    fn test_pause_resume_seek_stop() {
        let mut h = Harness::new(SchedulerConfig::default());
        let el = h.element;
        let (root, leaves) = h.storyboard(vec![ramp(el, PropertyIndex::WIDTH, 0.0, 10.0, 1.0)]);
        h.manager.begin(root, &mut h.tree).unwrap();
        h.ui_at(0.0);
        h.ui_at(0.5);

        h.manager.pause(root).unwrap();
        h.frames.clear();
        h.ui_at(0.8);
        assert!(approx(h.value(el, PropertyIndex::WIDTH), 5.0));
        assert!(!h.frames.has_request());

        h.manager.resume(root).unwrap();
        h.ui_at(1.0);
        assert!(approx(h.value(el, PropertyIndex::WIDTH), 7.0));

        h.manager.seek(root, 0.25).unwrap();
        h.ui_at(1.0);
        assert!(approx(h.value(el, PropertyIndex::WIDTH), 2.5));

        h.manager.skip_to_fill(root).unwrap();
        h.ui_at(1.0);
        assert!(approx(h.value(el, PropertyIndex::WIDTH), 10.0));
        assert_eq!(h.manager.get_current_state(leaves[0]), Some(ClockState::Filling));

        h.manager.stop(root, &mut h.tree).unwrap();
        assert!(!h.tree.is_animated(el, PropertyIndex::WIDTH));
        assert_eq!(h.manager.get_current_state(root), Some(ClockState::Stopped));
        assert_eq!(h.manager.get_animation_on_property(el, PropertyIndex::WIDTH), None);
        assert!(!h.manager.has_active_animations());
    }

    #[test]
    fn test_stop_fill_releases_value_and_removes_root() {
        let mut h = Harness::new(SchedulerConfig::default());
        let el = h.element;
        let root = h
            .manager
            .insert(Timeline::parallel().with_fill_behavior(FillBehavior::Stop));
        let leaf = h.manager.insert(ramp(el, PropertyIndex::WIDTH, 0.0, 10.0, 1.0));
        h.manager.add_child(root, leaf).unwrap();
        h.manager.begin(root, &mut h.tree).unwrap();

        h.ui_at(0.5);
        assert!(h.tree.is_animated(el, PropertyIndex::WIDTH));
        h.ui_at(1.5);
        assert!(!h.tree.is_animated(el, PropertyIndex::WIDTH));
        assert!(!h.manager.is_live(root));
        assert_eq!(h.manager.live_count(), 0);
        assert!(h.manager.drain_events().contains(&TimelineEvent::Completed(root)));
    }

    #[test]
    fn test_timing_change_reconverts() {
        let mut h = Harness::new(SchedulerConfig::default());
        let el = h.element;
        let (root, leaves) = h.storyboard(vec![ramp(el, PropertyIndex::OPACITY, 0.0, 1.0, 1.0)]);
        h.manager.begin(root, &mut h.tree).unwrap();
        h.at(0.0);
        let (before, _) = h.compositor.find(el, PropertyIndex::OPACITY).unwrap();

        h.manager
            .update_timing(leaves[0], |timing| timing.duration = Duration::Time(4.0))
            .unwrap();
        h.at(0.1);
        let (after, running) = h.compositor.find(el, PropertyIndex::OPACITY).unwrap();
        assert_ne!(before, after);
        assert!((running.animation.duration - 4.0).abs() < 1e-9);
        assert!(h.compositor.get(before).is_none());
    }

    #[test]
    fn test_independence_disabled_and_slow_motion() {
        let config = SchedulerConfig::default()
            .with_independent_animations(false)
            .with_slow_motion_factor(2.0);
        let mut h = Harness::new(config);
        let el = h.element;
        let (root, leaves) = h.storyboard(vec![ramp(el, PropertyIndex::OPACITY, 0.0, 1.0, 1.0)]);
        h.manager.begin(root, &mut h.tree).unwrap();

        h.at(0.0);
        h.at(1.0);
        assert!(h.compositor.running().is_empty());
        assert!(approx(h.value(el, PropertyIndex::OPACITY), 0.5));
        assert_eq!(
            h.manager.animation(leaves[0]).unwrap().conversion(),
            Some(&Err(CompositionAnimationConversionResult::IndependentAnimationsDisabled))
        );
    }

    #[test]
    fn test_lock_time_to_zero() {
        let mut h = Harness::new(SchedulerConfig::default().with_lock_time_to_zero(true));
        let el = h.element;
        let (root, _) = h.storyboard(vec![ramp(el, PropertyIndex::WIDTH, 0.0, 10.0, 1.0)]);
        h.manager.begin(root, &mut h.tree).unwrap();
        h.ui_at(5.0);
        assert!(approx(h.value(el, PropertyIndex::WIDTH), 0.0));
        assert_eq!(h.manager.time(), 0.0);
    }

    #[test]
    fn test_stop_all_after_test() {
        let mut h = Harness::new(SchedulerConfig::default());
        let el = h.element;
        let (a, _) = h.storyboard(vec![ramp(el, PropertyIndex::WIDTH, 0.0, 10.0, 1.0)]);
        let (b, _) = h.storyboard(vec![ramp(el, PropertyIndex::OPACITY, 0.0, 1.0, 1.0)]);
        h.manager.begin(a, &mut h.tree).unwrap();
        h.manager.begin(b, &mut h.tree).unwrap();
        h.at(0.2);
        assert!(h.manager.has_active_animations());

        h.manager.stop_all_timelines_after_test(&mut h.tree);
        assert_eq!(h.manager.live_count(), 0);
        assert!(!h.manager.has_active_animations());
        assert!(!h.tree.is_animated(el, PropertyIndex::WIDTH));
        assert_eq!(h.tree.get(el).unwrap().composition_bits(), 0);
    }

    #[test]
    fn test_destroy_and_hierarchy_errors() {
        let mut h = Harness::new(SchedulerConfig::default());
        let el = h.element;
        let (root, leaves) = h.storyboard(vec![ramp(el, PropertyIndex::WIDTH, 0.0, 10.0, 1.0)]);
        assert_eq!(h.manager.add_child(leaves[0], root), Err(AnimationError::InvalidChild));
        assert_eq!(h.manager.add_child(root, leaves[0]), Err(AnimationError::InvalidChild));
        assert_eq!(h.manager.add_timeline(leaves[0]), Err(AnimationError::NotARoot));

        h.manager.begin(root, &mut h.tree).unwrap();
        h.ui_at(0.5);
        assert!(h.manager.destroy(root, &mut h.tree));
        assert!(h.manager.get(leaves[0]).is_none());
        assert!(!h.tree.is_animated(el, PropertyIndex::WIDTH));
        assert_eq!(h.manager.live_count(), 0);
    }
}
