//! Timing model
//!
//! Every timeline carries a set of [`TimingProperties`]. Given the parent's
//! current time and the timeline's simple duration, [`sample`] computes the
//! clock state, the position within the simple duration and the normalized
//! progress.
//!
//! Time flows through three spaces:
//! - parent time: the clock of the timing parent
//! - active time: `(parent - begin) * speed`, bounded by the active duration
//! - simple time: position within one forward pass, reflected while reversing

use serde::{Deserialize, Serialize};

/// Length of one forward pass of a timeline
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum Duration {
    /// Derived from the timeline's content
    #[default]
    Automatic,
    Forever,
    /// Seconds
    Time(f64),
}

impl Duration {
    /// Resolve against the content's natural duration
    pub fn resolve(self, natural: f64) -> f64 {
        match self {
            Duration::Automatic => natural,
            Duration::Forever => f64::INFINITY,
            Duration::Time(t) => t,
        }
    }
}

/// How often the simple duration repeats
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum RepeatBehavior {
    /// Number of iterations, may be fractional
    Count(f64),
    /// Total active time in seconds
    Duration(f64),
    Forever,
}

impl Default for RepeatBehavior {
    fn default() -> Self {
        RepeatBehavior::Count(1.0)
    }
}

impl RepeatBehavior {
    /// A single iteration, i.e. no repetition at all
    pub fn is_single(&self) -> bool {
        matches!(self, RepeatBehavior::Count(c) if *c == 1.0)
    }
}

/// What a timeline does after its active duration ends
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillBehavior {
    /// Hold the final value until stopped
    #[default]
    HoldEnd,
    /// Stop and release the animated value
    Stop,
}

/// Clock state of a timeline
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ClockState {
    #[default]
    NotStarted,
    Active,
    Filling,
    Stopped,
}

impl ClockState {
    /// Active or filling
    pub fn is_running(self) -> bool {
        matches!(self, ClockState::Active | ClockState::Filling)
    }
}

/// Timing properties shared by every timeline kind
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingProperties {
    /// Offset from the parent's start, `None` never begins
    pub begin_time: Option<f64>,
    pub duration: Duration,
    pub repeat: RepeatBehavior,
    pub auto_reverse: bool,
    pub speed_ratio: f64,
    pub fill_behavior: FillBehavior,
}

impl Default for TimingProperties {
    fn default() -> Self {
        Self {
            begin_time: Some(0.0),
            duration: Duration::Automatic,
            repeat: RepeatBehavior::Count(1.0),
            auto_reverse: false,
            speed_ratio: 1.0,
            fill_behavior: FillBehavior::HoldEnd,
        }
    }
}

impl TimingProperties {
    /// Speed ratio used by the clock; invalid ratios run at normal speed
    pub fn effective_speed_ratio(&self) -> f64 {
        if self.speed_ratio.is_finite() && self.speed_ratio > 0.0 {
            self.speed_ratio
        } else {
            1.0
        }
    }

    /// One forward pass plus the reverse pass when auto-reversing
    pub fn iteration_duration(&self, simple: f64) -> f64 {
        if self.auto_reverse {
            simple * 2.0
        } else {
            simple
        }
    }

    /// Total active time in the timeline's own time space
    pub fn active_duration(&self, simple: f64) -> f64 {
        let iteration = self.iteration_duration(simple);
        match self.repeat {
            RepeatBehavior::Count(n) => {
                if n <= 0.0 {
                    0.0
                } else if iteration.is_infinite() {
                    f64::INFINITY
                } else {
                    iteration * n
                }
            }
            RepeatBehavior::Duration(d) => d.max(0.0),
            RepeatBehavior::Forever => f64::INFINITY,
        }
    }

    /// Active duration measured in parent time
    pub fn active_span(&self, simple: f64) -> f64 {
        self.active_duration(simple) / self.effective_speed_ratio()
    }

    /// Parent time at which the active period ends
    pub fn end_time(&self, simple: f64) -> Option<f64> {
        self.begin_time.map(|begin| begin + self.active_span(simple))
    }

    /// Parent time until the next state change, if one is scheduled
    pub fn time_to_next_transition(&self, parent_time: f64, simple: f64) -> Option<f64> {
        let begin = self.begin_time?;
        if parent_time < begin {
            return Some(begin - parent_time);
        }
        let end = begin + self.active_span(simple);
        (end.is_finite() && parent_time < end).then(|| end - parent_time)
    }
}

/// Result of sampling a clock
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClockSample {
    pub state: ClockState,
    /// Position within the simple duration in seconds
    pub local_time: f64,
    /// `local_time` normalized by the simple duration
    pub progress: f64,
    pub iteration: u32,
    pub is_reversed: bool,
}

impl ClockSample {
    pub const NOT_STARTED: ClockSample = ClockSample {
        state: ClockState::NotStarted,
        local_time: 0.0,
        progress: 0.0,
        iteration: 0,
        is_reversed: false,
    };
}

/// Sample a clock at `parent_time` for a timeline whose simple duration is `simple`
pub fn sample(timing: &TimingProperties, parent_time: f64, simple: f64) -> ClockSample {
    let Some(begin) = timing.begin_time else {
        return ClockSample::NOT_STARTED;
    };
    if parent_time < begin {
        return ClockSample::NOT_STARTED;
    }

    let elapsed = (parent_time - begin) * timing.effective_speed_ratio();
    let active = timing.active_duration(simple);
    let finished = active.is_finite() && elapsed >= active;
    let state = match (finished, timing.fill_behavior) {
        (false, _) => ClockState::Active,
        (true, FillBehavior::HoldEnd) => ClockState::Filling,
        (true, FillBehavior::Stop) => ClockState::Stopped,
    };

    if simple <= 0.0 {
        // Zero-length content jumps straight to its end value
        return ClockSample {
            state,
            local_time: 0.0,
            progress: if timing.auto_reverse { 0.0 } else { 1.0 },
            iteration: 0,
            is_reversed: timing.auto_reverse,
        };
    }

    let t = if finished { active } else { elapsed };
    let iteration_duration = timing.iteration_duration(simple);
    let (mut iteration, mut position) = if iteration_duration.is_finite() {
        let iteration = (t / iteration_duration).floor();
        (iteration, t - iteration * iteration_duration)
    } else {
        (0.0, t)
    };
    if finished && position <= 0.0 && t > 0.0 {
        // The end of the last iteration, not the start of the next one
        iteration -= 1.0;
        position = iteration_duration;
    }

    let (local_time, is_reversed) = if timing.auto_reverse && position > simple {
        (iteration_duration - position, true)
    } else {
        (position, false)
    };
    let progress = if simple.is_finite() {
        (local_time / simple).clamp(0.0, 1.0)
    } else {
        0.0
    };

    ClockSample {
        state,
        local_time,
        progress,
        iteration: iteration.max(0.0) as u32,
        is_reversed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timing() -> TimingProperties {
        TimingProperties::default()
    }

    #[test]
    fn test_basic_clock() {
        let t = timing();
        let s = sample(&t, 0.5, 2.0);
        assert_eq!(s.state, ClockState::Active);
        assert!((s.progress - 0.25).abs() < 1e-9);

        let s = sample(&t, 2.0, 2.0);
        assert_eq!(s.state, ClockState::Filling);
        assert_eq!(s.progress, 1.0);
    }

    #[test]
    fn test_begin_time() {
        let mut t = timing();
        t.begin_time = Some(1.0);
        assert_eq!(sample(&t, 0.5, 1.0).state, ClockState::NotStarted);
        assert_eq!(sample(&t, 1.5, 1.0).state, ClockState::Active);

        t.begin_time = None;
        assert_eq!(sample(&t, 100.0, 1.0).state, ClockState::NotStarted);
    }

    #[test]
    fn test_auto_reverse_and_repeat() {
        let mut t = timing();
        t.auto_reverse = true;
        t.repeat = RepeatBehavior::Count(3.0);
        assert_eq!(t.active_duration(1.0), 6.0);

        let s = sample(&t, 1.5, 1.0);
        assert!(s.is_reversed);
        assert!((s.progress - 0.5).abs() < 1e-9);

        let s = sample(&t, 2.25, 1.0);
        assert_eq!(s.iteration, 1);
        assert!((s.progress - 0.25).abs() < 1e-9);

        let s = sample(&t, 10.0, 1.0);
        assert_eq!(s.state, ClockState::Filling);
        assert_eq!(s.progress, 0.0);
    }

    #[test]
    fn test_repeat_duration_ignores_reverse_doubling() {
        let mut t = timing();
        t.auto_reverse = true;
        t.repeat = RepeatBehavior::Duration(6.0);
        assert_eq!(t.active_duration(1.0), 6.0);
        assert_eq!(t.end_time(1.0), Some(6.0));
    }

    #[test]
    fn test_speed_ratio() {
        let mut t = timing();
        t.speed_ratio = 2.0;
        assert_eq!(t.active_span(2.0), 1.0);
        let s = sample(&t, 0.5, 2.0);
        assert!((s.progress - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_fill_stop() {
        let mut t = timing();
        t.fill_behavior = FillBehavior::Stop;
        assert_eq!(sample(&t, 1.0, 1.0).state, ClockState::Stopped);
    }

    #[test]
    fn test_zero_duration() {
        let t = timing();
        let s = sample(&t, 0.0, 0.0);
        assert_eq!(s.state, ClockState::Filling);
        assert_eq!(s.progress, 1.0);
    }

    #[test]
    fn test_forever() {
        let t = timing();
        let s = sample(&t, 1e6, f64::INFINITY);
        assert_eq!(s.state, ClockState::Active);
        assert_eq!(s.local_time, 1e6);
        assert_eq!(t.time_to_next_transition(1e6, f64::INFINITY), None);
    }

    #[test]
    fn test_next_transition() {
        let mut t = timing();
        t.begin_time = Some(2.0);
        assert_eq!(t.time_to_next_transition(0.5, 1.0), Some(1.5));
        assert_eq!(t.time_to_next_transition(2.5, 1.0), Some(0.5));
        assert_eq!(t.time_to_next_transition(3.5, 1.0), None);
    }
}
