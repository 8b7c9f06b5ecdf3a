//! (target, property) → animation registry
//!
//! At most one animation controls a given property of a given target. The
//! registry records that controller so a newly beginning animation can find
//! the one it replaces. Keys hold weak target handles; entries whose target
//! has been destroyed are pruned lazily.

use cadence_core::{PropertyIndex, TargetId, TargetTree};
use rustc_hash::FxHashMap;

use crate::timeline::TimelineId;

#[derive(Debug, Default)]
pub struct AnimationRegistry {
    entries: FxHashMap<(TargetId, PropertyIndex), TimelineId>,
}

impl AnimationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_animation_on_property(&self, target: TargetId, property: PropertyIndex) -> Option<TimelineId> {
        self.entries.get(&(target, property)).copied()
    }

    /// Record `animation` as the controller, returning the one it replaced
    pub fn set_animation_on_property(
        &mut self,
        target: TargetId,
        property: PropertyIndex,
        animation: TimelineId,
    ) -> Option<TimelineId> {
        self.entries.insert((target, property), animation)
    }

    /// Remove the entry if it still belongs to `animation`
    pub fn clear_animation_on_property(
        &mut self,
        target: TargetId,
        property: PropertyIndex,
        animation: TimelineId,
    ) -> bool {
        if self.get_animation_on_property(target, property) == Some(animation) {
            self.entries.remove(&(target, property));
            true
        } else {
            false
        }
    }

    /// Drop entries whose target no longer exists
    pub fn prune(&mut self, tree: &TargetTree) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(target, _), _| tree.contains(*target));
        let pruned = before - self.entries.len();
        if pruned > 0 {
            tracing::trace!("pruned {} expired registry entries", pruned);
        }
        pruned
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
