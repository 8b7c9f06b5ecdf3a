//! Independent animation classification
//!
//! An animation is independent when the compositor can drive it on its own
//! clock. [`classify`] walks from the animated object toward the tree root;
//! any realization-dependent ancestor vetoes independence, a transition
//! target placeholder grants it, and an object that never reaches the root
//! is detached and stays dependent.
//!
//! Visuals driven by independent animations need their own composition
//! node. [`IndependentTargetSet`] collects (visual, channel) pairs each frame
//! and diffs them against the previous frame, notifying the tree only on
//! edges.

use cadence_core::{IndependentAnimationType, PropertyIndex, TargetId, TargetKind, TargetTree};
use rustc_hash::FxHashMap;

/// Why an animation has to tick on the UI thread
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DependentReason {
    /// The target no longer exists
    UnresolvedTarget,
    /// The property has no compositor channel
    NoCompositorChannel,
    /// An ancestor must be re-rendered whenever the value changes
    RealizationDependent(TargetId),
    /// The target is not connected to the live tree
    Detached,
    /// No visual owns the target
    NoVisual,
}

/// Outcome of [`classify`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Classification {
    Independent {
        /// Visual whose composition node receives the animation
        visual: TargetId,
        ty: IndependentAnimationType,
    },
    Dependent(DependentReason),
}

impl Classification {
    pub fn is_independent(&self) -> bool {
        matches!(self, Classification::Independent { .. })
    }
}

/// Decide whether animating `property` on `target` can run on the compositor
pub fn classify(tree: &TargetTree, target: TargetId, property: PropertyIndex) -> Classification {
    if !tree.contains(target) {
        return Classification::Dependent(DependentReason::UnresolvedTarget);
    }
    let Some(ty) = tree.property(property).and_then(|info| info.independent) else {
        return Classification::Dependent(DependentReason::NoCompositorChannel);
    };

    let mut visual = None;
    let mut last = target;
    for (id, node) in tree.ancestors(target) {
        if node.is_realization_dependent() {
            return Classification::Dependent(DependentReason::RealizationDependent(id));
        }
        if visual.is_none() && node.kind().is_visual() {
            visual = Some(id);
        }
        if node.kind() == TargetKind::TransitionTarget {
            // Placeholders live outside the public tree
            return Classification::Independent {
                visual: visual.unwrap_or(id),
                ty,
            };
        }
        last = id;
    }

    if tree.root() != Some(last) {
        return Classification::Dependent(DependentReason::Detached);
    }
    match visual {
        Some(visual) => Classification::Independent { visual, ty },
        None => Classification::Dependent(DependentReason::NoVisual),
    }
}

/// Number of independent animations per channel on one visual
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TypeCounts([u16; IndependentAnimationType::COUNT]);

impl TypeCounts {
    pub fn increment(&mut self, ty: IndependentAnimationType) {
        let count = &mut self.0[ty.index()];
        *count = count.saturating_add(1);
    }

    pub fn count(&self, ty: IndependentAnimationType) -> u16 {
        self.0[ty.index()]
    }

    pub fn has(&self, ty: IndependentAnimationType) -> bool {
        self.count(ty) > 0
    }

    /// Channels with a non-zero count as an `IndependentAnimationType::bit()` set
    pub fn bits(&self) -> u16 {
        IndependentAnimationType::ALL
            .iter()
            .filter(|ty| self.has(**ty))
            .fold(0, |bits, ty| bits | ty.bit())
    }
}

/// Two generations of independent animation targets
#[derive(Debug, Default)]
pub struct IndependentTargetSet {
    /// Collected during the current frame
    pending: FxHashMap<TargetId, TypeCounts>,
    /// Result of the previous frame
    processed: FxHashMap<TargetId, TypeCounts>,
}

impl IndependentTargetSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collect_ia_target(&mut self, visual: TargetId, ty: IndependentAnimationType) {
        self.pending.entry(visual).or_default().increment(ty);
    }

    pub fn pending(&self) -> &FxHashMap<TargetId, TypeCounts> {
        &self.pending
    }

    pub fn processed(&self) -> &FxHashMap<TargetId, TypeCounts> {
        &self.processed
    }

    /// Notify targets whose channels changed since the previous frame and
    /// make this frame's collection the new baseline. Returns the number of
    /// notifications sent.
    pub fn update_ia_targets(&mut self, tree: &mut TargetTree) -> usize {
        let mut previous = std::mem::take(&mut self.processed);
        let mut pending = std::mem::take(&mut self.pending);
        // Targets may have been destroyed since they were collected
        pending.retain(|target, _| tree.contains(*target));

        let mut edges = 0;
        for (&target, counts) in &pending {
            let before = previous.remove(&target).unwrap_or_default();
            edges += notify_edges(tree, target, &before, counts);
        }
        for (target, before) in previous {
            if tree.contains(target) {
                edges += notify_edges(tree, target, &before, &TypeCounts::default());
            }
        }

        self.processed = pending;
        edges
    }

    /// Release every composition requirement held by the previous frame
    pub fn clear(&mut self, tree: &mut TargetTree) -> usize {
        self.pending.clear();
        self.update_ia_targets(tree)
    }
}

fn notify_edges(tree: &mut TargetTree, target: TargetId, before: &TypeCounts, now: &TypeCounts) -> usize {
    let mut edges = 0;
    for ty in IndependentAnimationType::ALL {
        match (before.has(ty), now.has(ty)) {
            (false, true) => tree.set_requires_composition(target, ty),
            (true, false) => tree.unset_requires_composition(target, ty),
            _ => continue,
        }
        tracing::trace!("composition requirement {:?} on {:?}: {}", ty, target, now.has(ty));
        edges += 1;
    }
    edges
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::CompositionNotification;
    use IndependentAnimationType as Ia;

    #[test]
    fn test_attached_element_is_independent() {
        let mut tree = TargetTree::new();
        let root = tree.create_root();
        let el = tree.create_child(root, TargetKind::Element);
        let transform = tree.create_child(el, TargetKind::Transform);

        assert_eq!(
            classify(&tree, transform, PropertyIndex::TRANSLATE_X),
            Classification::Independent {
                visual: el,
                ty: Ia::Transform
            }
        );
        assert_eq!(
            classify(&tree, el, PropertyIndex::WIDTH),
            Classification::Dependent(DependentReason::NoCompositorChannel)
        );
    }

    #[test]
    fn test_realization_dependent_ancestor_vetoes() {
        let mut tree = TargetTree::new();
        let root = tree.create_root();
        let cached = tree.create_child(root, TargetKind::Element);
        let el = tree.create_child(cached, TargetKind::Element);
        tree.set_realization_dependent(cached, true);

        assert_eq!(
            classify(&tree, el, PropertyIndex::OPACITY),
            Classification::Dependent(DependentReason::RealizationDependent(cached))
        );
    }

    #[test]
    fn test_detached_and_transition_targets() {
        let mut tree = TargetTree::new();
        tree.create_root();
        let detached = tree.create(TargetKind::Element);
        assert_eq!(
            classify(&tree, detached, PropertyIndex::OPACITY),
            Classification::Dependent(DependentReason::Detached)
        );

        let placeholder = tree.create(TargetKind::TransitionTarget);
        assert!(classify(&tree, placeholder, PropertyIndex::TRANSITION_OPACITY).is_independent());
    }

    #[test]
    fn test_cyclic_reparent_keeps_classification() {
        let mut tree = TargetTree::new();
        let root = tree.create_root();
        let a = tree.create_child(root, TargetKind::Element);
        let b = tree.create_child(a, TargetKind::Element);

        assert!(!tree.set_parent(a, Some(b)));
        assert_eq!(
            classify(&tree, b, PropertyIndex::OPACITY),
            Classification::Independent {
                visual: b,
                ty: Ia::Opacity
            }
        );

        // Moving the root under a detached object leaves everything detached
        let loose = tree.create(TargetKind::Element);
        assert!(tree.set_parent(root, Some(loose)));
        assert!(!tree.set_parent(loose, Some(b)));
        assert_eq!(
            classify(&tree, b, PropertyIndex::OPACITY),
            Classification::Dependent(DependentReason::Detached)
        );
    }

    fn bits_of(tree: &TargetTree, target: TargetId) -> u16 {
        tree.get(target).map(|n| n.composition_bits()).unwrap_or(0)
    }

    #[test]
    fn test_diff_is_symmetric_difference() {
        let mut tree = TargetTree::new();
        let root = tree.create_root();
        let a = tree.create_child(root, TargetKind::Element);
        let b = tree.create_child(root, TargetKind::Element);
        let c = tree.create_child(root, TargetKind::Element);

        let mut set = IndependentTargetSet::new();
        set.collect_ia_target(a, Ia::Opacity);
        set.collect_ia_target(a, Ia::Opacity);
        set.collect_ia_target(a, Ia::Transform);
        set.collect_ia_target(b, Ia::Offset);
        assert_eq!(set.update_ia_targets(&mut tree), 3);
        tree.take_composition_notifications();

        // Frame 2: a keeps Opacity, drops Transform, gains Offset; b drops out; c appears
        set.collect_ia_target(a, Ia::Opacity);
        set.collect_ia_target(a, Ia::Offset);
        set.collect_ia_target(c, Ia::BrushColor);
        assert_eq!(set.update_ia_targets(&mut tree), 4);

        let mut edges = tree.take_composition_notifications();
        edges.sort_by_key(|e| (e.ty.index(), e.required));
        let expected = [
            (b, Ia::Offset, false),
            (a, Ia::Offset, true),
            (a, Ia::Transform, false),
            (c, Ia::BrushColor, true),
        ];
        for (target, ty, required) in expected {
            assert!(edges.contains(&CompositionNotification { target, ty, required }));
        }

        assert_eq!(bits_of(&tree, a), Ia::Opacity.bit() | Ia::Offset.bit());
        assert_eq!(bits_of(&tree, b), 0);
        assert_eq!(bits_of(&tree, c), Ia::BrushColor.bit());

        // An unchanged frame sends nothing
        set.collect_ia_target(a, Ia::Opacity);
        set.collect_ia_target(a, Ia::Offset);
        set.collect_ia_target(c, Ia::BrushColor);
        assert_eq!(set.update_ia_targets(&mut tree), 0);
    }

    #[test]
    fn test_destroyed_target_is_tolerated() {
        let mut tree = TargetTree::new();
        let root = tree.create_root();
        let a = tree.create_child(root, TargetKind::Element);

        let mut set = IndependentTargetSet::new();
        set.collect_ia_target(a, Ia::Opacity);
        tree.remove(a);
        assert_eq!(set.update_ia_targets(&mut tree), 0);
        assert!(set.processed().is_empty());
    }

    #[test]
    fn test_clear_releases_everything() {
        let mut tree = TargetTree::new();
        let root = tree.create_root();
        let mut set = IndependentTargetSet::new();
        set.collect_ia_target(root, Ia::Opacity);
        set.update_ia_targets(&mut tree);

        assert_eq!(set.clear(&mut tree), 1);
        assert_eq!(bits_of(&tree, root), 0);
    }
}
