//! Frame requests
//!
//! The scheduler never drives its own loop. After each tick it asks the host
//! for another frame, either right away (something is animating on the UI
//! thread) or after a delay (the next timer is due, or only compositor-driven
//! and not-yet-started work remains).

/// Host hook for scheduling the next tick
pub trait FrameScheduler {
    /// Tick again on the next frame
    fn request_frame(&mut self);

    /// Tick again once `delay` seconds have passed
    fn request_frame_after(&mut self, delay: f64);
}

/// Frame scheduler that records requests, for hosts that poll and for tests
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameRequests {
    immediate: u32,
    delayed: Vec<f64>,
}

impl FrameRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of next-frame requests since the last clear
    pub fn immediate(&self) -> u32 {
        self.immediate
    }

    pub fn delayed(&self) -> &[f64] {
        &self.delayed
    }

    /// Shortest requested delay, zero when a next-frame request is pending
    pub fn next_delay(&self) -> Option<f64> {
        if self.immediate > 0 {
            return Some(0.0);
        }
        self.delayed.iter().copied().reduce(f64::min)
    }

    pub fn has_request(&self) -> bool {
        self.immediate > 0 || !self.delayed.is_empty()
    }

    pub fn clear(&mut self) {
        self.immediate = 0;
        self.delayed.clear();
    }
}

impl FrameScheduler for FrameRequests {
    fn request_frame(&mut self) {
        self.immediate += 1;
    }

    fn request_frame_after(&mut self, delay: f64) {
        if delay <= 0.0 {
            self.request_frame();
        } else {
            self.delayed.push(delay);
        }
    }
}
