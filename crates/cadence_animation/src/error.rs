//! Animation error types

use cadence_core::ValueKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Authoring errors reported when an animation begins
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnimationError {
    /// The target object could not be resolved
    #[error("cannot resolve animation target '{name}'")]
    UnresolvedTarget { name: String },

    /// The target does not declare the animated property
    #[error("cannot resolve target property '{property}'")]
    UnresolvedProperty { property: String },

    /// The property's declared type differs from the animation's value type
    #[error("property '{property}' is of type {expected}, animation produces {found}")]
    IncompatibleValueType {
        property: String,
        expected: ValueKind,
        found: ValueKind,
    },

    /// A key frame carries a negative, non-finite or out of range key time
    #[error("invalid key time on key frame {index}")]
    InvalidKeyTime { index: usize },

    /// Two animations in one timing tree target the same property
    #[error("multiple animations in the same timing tree target '{property}'")]
    ConflictingAnimations { property: String },

    /// The timeline id does not refer to a live timeline
    #[error("unknown timeline")]
    UnknownTimeline,

    /// The operation requires a root timeline
    #[error("timeline is not a root timeline")]
    NotARoot,

    /// The parent is not a group, or the child already belongs to a tree
    #[error("timeline cannot be added as a child of this timeline")]
    InvalidChild,
}

pub type Result<T> = std::result::Result<T, AnimationError>;

/// What happens when a begin-time error is detected
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorPolicy {
    /// Return the error to the caller
    #[default]
    Raise,
    /// Abort immediately
    FailFast,
}

impl ErrorPolicy {
    /// Apply the policy to an error
    ///
    /// # Panics
    ///
    /// Panics under [`ErrorPolicy::FailFast`].
    pub fn check(self, error: AnimationError) -> AnimationError {
        match self {
            ErrorPolicy::Raise => {
                tracing::debug!("animation error raised: {}", error);
                error
            }
            ErrorPolicy::FailFast => panic!("animation error: {error}"),
        }
    }
}

/// Errors when loading a [`SchedulerConfig`](crate::config::SchedulerConfig)
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to parse scheduler config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid scheduler config: {0}")]
    Invalid(String),
}
