//! Cadence Animation Engine
//!
//! Declarative timing trees, property interpolation and compositor offload.
//!
//! # Features
//!
//! - **Timing Trees**: parallel and sequential groups with begin time, repeat,
//!   auto-reverse, speed ratio and fill behavior
//! - **Animations**: From/To/By, key frame and pointer key frame content over
//!   doubles, colors, points and discrete objects
//! - **Easing**: standard easing modes and cubic key splines
//! - **Handoff**: a new animation on a property continues from the running one
//! - **Independent Animations**: eligible animations are converted into
//!   compositor key frame animations and run off the UI thread
//! - **Dispatcher Timers**: periodic ticks on the same clock
//!
//! The [`TimeManager`] owns all timelines and is ticked by the host once per
//! frame; it writes values into a [`cadence_core::TargetTree`], drives a
//! [`Compositor`] and asks a [`FrameScheduler`] for the next frame.

pub mod animation;
pub mod composition;
pub mod config;
pub mod easing;
pub mod error;
pub mod frame;
pub mod independent;
pub mod keyframe;
pub mod registry;
pub mod scheduler;
pub mod timeline;
pub mod timing;
pub mod values;

pub use animation::{Animation, AnimationContent, AnimationTarget};
pub use composition::{
    CompositionAnimation, CompositionAnimationConversionResult, CompositionConversionContext,
    CompositionKeyFrame, CompositionValue, Compositor, CompositorAnimationId, CompositorOperation,
    NativeEasing, RecordingCompositor, RunningAnimation,
};
pub use config::SchedulerConfig;
pub use easing::{EasingFunction, EasingMode, KeySpline};
pub use error::{AnimationError, ConfigError, ErrorPolicy, Result};
pub use frame::{FrameRequests, FrameScheduler};
pub use independent::{classify, Classification, DependentReason, IndependentTargetSet};
pub use keyframe::{
    KeyFrame, KeyFrameCollection, KeyFrameKind, KeyTime, PointerKeyFrame, PointerKeyFrameCollection,
};
pub use registry::AnimationRegistry;
pub use scheduler::{TickParams, TickResult, TimeManager, TimelineEvent};
pub use timeline::{DispatcherTimer, GroupKind, Timeline, TimelineId, TimelineKind};
pub use timing::{ClockSample, ClockState, Duration, FillBehavior, RepeatBehavior, TimingProperties};
pub use values::{Additive, Interpolate};
