//! Animation targets
//!
//! The [`TargetTree`] is the narrow view of the element tree that the
//! animation engine talks to: it resolves targets, stores base and animated
//! property values, exposes the ancestor chain for independence
//! classification, and receives composition requirement notifications.
//!
//! Targets are addressed through [`TargetId`], a generation-checked handle.
//! Removing a target invalidates every copy of its id, so an animation that
//! outlives its target simply fails to resolve it.

use rustc_hash::FxHashMap;
use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;

use crate::property::{IndependentAnimationType, PropertyIndex, PropertyInfo, PropertyRegistry};
use crate::value::AnimValue;

new_key_type! {
    /// Weak, generation-checked handle to an animation target
    pub struct TargetId;
}

/// Kind of object a target represents
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TargetKind {
    /// A visual element in the tree
    Element,
    /// A 2D render transform attached to an element
    Transform,
    /// A perspective projection attached to an element
    Projection,
    /// A 3D transform attached to an element
    Transform3D,
    /// A solid color brush used by an element
    Brush,
    /// A clip geometry attached to an element
    Geometry,
    /// Placeholder for content that is not part of the public visual tree
    TransitionTarget,
}

impl TargetKind {
    /// Whether this kind has its own composition visual
    pub fn is_visual(self) -> bool {
        matches!(self, TargetKind::Element | TargetKind::TransitionTarget)
    }
}

#[derive(Clone, Debug)]
struct PropertySlot {
    base: AnimValue,
    animated: Option<AnimValue>,
}

/// A single object in the target tree
#[derive(Clone, Debug)]
pub struct TargetNode {
    kind: TargetKind,
    name: Option<String>,
    parent: Option<TargetId>,
    children: SmallVec<[TargetId; 4]>,
    values: FxHashMap<PropertyIndex, PropertySlot>,
    /// Content must be re-rendered on the UI thread when it changes
    /// (bitmap caches, text realizations)
    realization_dependent: bool,
    /// Bitset of `IndependentAnimationType::bit()` composition requirements
    composition: u16,
}

impl TargetNode {
    fn new(kind: TargetKind) -> Self {
        Self {
            kind,
            name: None,
            parent: None,
            children: SmallVec::new(),
            values: FxHashMap::default(),
            realization_dependent: false,
            composition: 0,
        }
    }

    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn parent(&self) -> Option<TargetId> {
        self.parent
    }

    pub fn children(&self) -> &[TargetId] {
        &self.children
    }

    pub fn is_realization_dependent(&self) -> bool {
        self.realization_dependent
    }

    pub fn requires_composition(&self, ty: IndependentAnimationType) -> bool {
        self.composition & ty.bit() != 0
    }

    /// Raw composition requirement bitset
    pub fn composition_bits(&self) -> u16 {
        self.composition
    }
}

/// A composition requirement edge delivered to a target
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompositionNotification {
    pub target: TargetId,
    pub ty: IndependentAnimationType,
    pub required: bool,
}

/// The objects animations can target
#[derive(Debug)]
pub struct TargetTree {
    nodes: SlotMap<TargetId, TargetNode>,
    properties: PropertyRegistry,
    root: Option<TargetId>,
    notifications: Vec<CompositionNotification>,
}

impl TargetTree {
    pub fn new() -> Self {
        Self::with_properties(PropertyRegistry::new())
    }

    pub fn with_properties(properties: PropertyRegistry) -> Self {
        Self {
            nodes: SlotMap::with_key(),
            properties,
            root: None,
            notifications: Vec::new(),
        }
    }

    pub fn properties(&self) -> &PropertyRegistry {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut PropertyRegistry {
        &mut self.properties
    }

    pub fn property(&self, index: PropertyIndex) -> Option<&PropertyInfo> {
        self.properties.get(index)
    }

    // =========================================================================
    // Structure
    // =========================================================================

    /// Create the live root element
    pub fn create_root(&mut self) -> TargetId {
        let id = self.nodes.insert(TargetNode::new(TargetKind::Element));
        self.root = Some(id);
        id
    }

    pub fn root(&self) -> Option<TargetId> {
        self.root
    }

    /// Create a detached object
    pub fn create(&mut self, kind: TargetKind) -> TargetId {
        self.nodes.insert(TargetNode::new(kind))
    }

    /// Create an object attached under `parent`
    pub fn create_child(&mut self, parent: TargetId, kind: TargetKind) -> TargetId {
        let id = self.create(kind);
        self.set_parent(id, Some(parent));
        id
    }

    pub fn set_name(&mut self, id: TargetId, name: impl Into<String>) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.name = Some(name.into());
        }
    }

    /// Find a live object by name
    pub fn find_by_name(&self, name: &str) -> Option<TargetId> {
        self.nodes
            .iter()
            .find(|(_, node)| node.name.as_deref() == Some(name))
            .map(|(id, _)| id)
    }

    /// Re-parent an object, `None` detaches it
    ///
    /// Returns `false` and leaves the tree unchanged when `parent` is `id`
    /// itself or one of its descendants.
    pub fn set_parent(&mut self, id: TargetId, parent: Option<TargetId>) -> bool {
        let Some(old_parent) = self.nodes.get(id).map(|n| n.parent) else {
            return false;
        };
        if let Some(p) = parent {
            if self.ancestors(p).any(|(ancestor, _)| ancestor == id) {
                tracing::warn!("rejected re-parenting {:?} under its descendant {:?}", id, p);
                return false;
            }
        }
        if let Some(old) = old_parent.and_then(|p| self.nodes.get_mut(p)) {
            old.children.retain(|c| *c != id);
        }
        let parent = parent.filter(|p| self.nodes.contains_key(*p));
        if let Some(new) = parent.and_then(|p| self.nodes.get_mut(p)) {
            new.children.push(id);
        }
        if let Some(node) = self.nodes.get_mut(id) {
            node.parent = parent;
        }
        true
    }

    /// Destroy an object; its children are detached, not destroyed
    pub fn remove(&mut self, id: TargetId) -> bool {
        let Some(node) = self.nodes.remove(id) else {
            return false;
        };
        if let Some(parent) = node.parent.and_then(|p| self.nodes.get_mut(p)) {
            parent.children.retain(|c| *c != id);
        }
        for child in node.children {
            if let Some(child) = self.nodes.get_mut(child) {
                child.parent = None;
            }
        }
        if self.root == Some(id) {
            self.root = None;
        }
        tracing::trace!("target {:?} destroyed", id);
        true
    }

    pub fn contains(&self, id: TargetId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Resolve a weak handle; `None` once the object is gone
    pub fn get(&self, id: TargetId) -> Option<&TargetNode> {
        self.nodes.get(id)
    }

    pub fn parent(&self, id: TargetId) -> Option<TargetId> {
        self.nodes.get(id).and_then(|n| n.parent)
    }

    pub fn kind(&self, id: TargetId) -> Option<TargetKind> {
        self.nodes.get(id).map(|n| n.kind)
    }

    /// Walk from `id` toward the root, starting with `id` itself
    pub fn ancestors(&self, id: TargetId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.nodes.contains_key(id).then_some(id),
            remaining: self.nodes.len(),
        }
    }

    pub fn set_realization_dependent(&mut self, id: TargetId, dependent: bool) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.realization_dependent = dependent;
        }
    }

    // =========================================================================
    // Property values
    // =========================================================================

    fn default_value(&self, property: PropertyIndex) -> Option<AnimValue> {
        self.properties.get(property).map(|p| p.default_value.clone())
    }

    /// Set the non-animated value of a property
    pub fn set_value(&mut self, id: TargetId, property: PropertyIndex, value: AnimValue) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.values
                .entry(property)
                .and_modify(|slot| slot.base = value.clone())
                .or_insert(PropertySlot {
                    base: value,
                    animated: None,
                });
        }
    }

    /// The non-animated value of a property
    pub fn base_value(&self, id: TargetId, property: PropertyIndex) -> Option<AnimValue> {
        let node = self.nodes.get(id)?;
        match node.values.get(&property) {
            Some(slot) => Some(slot.base.clone()),
            None => self.default_value(property),
        }
    }

    /// The animated value of a property, if an animation has written one
    pub fn animated_value(&self, id: TargetId, property: PropertyIndex) -> Option<AnimValue> {
        self.nodes
            .get(id)?
            .values
            .get(&property)
            .and_then(|slot| slot.animated.clone())
    }

    /// The animated value if present, otherwise the base value
    pub fn effective_value(&self, id: TargetId, property: PropertyIndex) -> Option<AnimValue> {
        self.animated_value(id, property)
            .or_else(|| self.base_value(id, property))
    }

    pub fn is_animated(&self, id: TargetId, property: PropertyIndex) -> bool {
        self.animated_value(id, property).is_some()
    }

    pub fn set_animated_value(&mut self, id: TargetId, property: PropertyIndex, value: AnimValue) {
        let Some(default) = self.default_value(property) else {
            return;
        };
        if let Some(node) = self.nodes.get_mut(id) {
            node.values
                .entry(property)
                .or_insert(PropertySlot {
                    base: default,
                    animated: None,
                })
                .animated = Some(value);
        }
    }

    /// Drop the animated value so the base value shows through again
    pub fn clear_animated_value(&mut self, id: TargetId, property: PropertyIndex) {
        if let Some(slot) = self
            .nodes
            .get_mut(id)
            .and_then(|n| n.values.get_mut(&property))
        {
            slot.animated = None;
        }
    }

    // =========================================================================
    // Composition requirements
    // =========================================================================

    /// Ask the target for its own composition visual on channel `ty`
    pub fn set_requires_composition(&mut self, id: TargetId, ty: IndependentAnimationType) {
        self.update_composition(id, ty, true);
    }

    /// Release the composition requirement on channel `ty`
    pub fn unset_requires_composition(&mut self, id: TargetId, ty: IndependentAnimationType) {
        self.update_composition(id, ty, false);
    }

    fn update_composition(&mut self, id: TargetId, ty: IndependentAnimationType, required: bool) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        if (node.composition & ty.bit() != 0) == required {
            return;
        }
        if required {
            node.composition |= ty.bit();
        } else {
            node.composition &= !ty.bit();
        }
        // An undrained opposite edge cancels out
        match self
            .notifications
            .iter()
            .position(|n| n.target == id && n.ty == ty)
        {
            Some(pending) => {
                self.notifications.swap_remove(pending);
            }
            None => self.notifications.push(CompositionNotification {
                target: id,
                ty,
                required,
            }),
        }
    }

    /// Drain the composition requirement edges delivered since the last call
    ///
    /// Edges are coalesced per (target, channel), so an undrained queue holds
    /// at most one entry for each.
    pub fn take_composition_notifications(&mut self) -> Vec<CompositionNotification> {
        std::mem::take(&mut self.notifications)
    }
}

impl Default for TargetTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over a target and its ancestors
pub struct Ancestors<'a> {
    tree: &'a TargetTree,
    next: Option<TargetId>,
    /// Steps left before a parent cycle is assumed
    remaining: usize,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = (TargetId, &'a TargetNode);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        if self.remaining == 0 {
            self.next = None;
            return None;
        }
        self.remaining -= 1;
        let node = self.tree.nodes.get(id)?;
        self.next = node.parent;
        Some((id, node))
    }
}
