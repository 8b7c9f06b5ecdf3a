//! Cadence Core
//!
//! Primitives shared between the Cadence animation engine and the element
//! tree it animates:
//!
//! - **Values**: animatable value types (`f32`, [`Color`], [`Point`], [`ObjectValue`])
//! - **Properties**: property metadata and compositor channel mapping
//! - **Targets**: the generation-checked target tree animations write into

pub mod property;
pub mod target;
pub mod value;

pub use property::{IndependentAnimationType, PropertyIndex, PropertyInfo, PropertyRegistry};
pub use target::{Ancestors, CompositionNotification, TargetId, TargetKind, TargetNode, TargetTree};
pub use value::{AnimValue, Color, ObjectValue, Point, ValueKind};
