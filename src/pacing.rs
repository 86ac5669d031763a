//! Frame-rate pacing for the capture loop.
//!
//! The pacer throttles writes to the target rate without a fixed tick: after
//! every written frame the loop sleeps until a deadline that was armed at the
//! start of the first poll following the previous write. Polls that do not
//! produce a frame never sleep, so the loop busy-polls until all sources
//! deliver.

use std::num::NonZeroU32;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Nothing written yet.
    Idle,
    /// A frame was just written; sleep until the deadline.
    Captured(Instant),
    /// Polling for the next frame with the deadline already armed.
    Armed(Instant),
}

/// Throttles the capture loop to a target frame rate.
#[derive(Debug, Clone)]
pub struct Pacer {
    period: Duration,
    state: State,
}

impl Pacer {
    /// Create a pacer for `fps` frames per second.
    #[must_use]
    pub fn new(fps: NonZeroU32) -> Self {
        Self {
            period: Duration::from_nanos(1_000_000_000 / u64::from(fps.get())),
            state: State::Idle,
        }
    }

    /// Target interval between written frames.
    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Mark the start of a poll. Arms the deadline after a write.
    pub fn begin_poll(&mut self, now: Instant) {
        if matches!(self.state, State::Captured(_)) {
            self.state = State::Armed(now + self.period);
        }
    }

    /// Record that a frame was written at `now`.
    pub fn record_capture(&mut self, now: Instant) {
        self.state = match self.state {
            State::Idle => State::Captured(now + self.period),
            State::Armed(deadline) | State::Captured(deadline) => State::Captured(deadline),
        };
    }

    /// Deadline to sleep until at the end of this poll, if any.
    #[must_use]
    pub const fn sleep_deadline(&self) -> Option<Instant> {
        match self.state {
            State::Captured(deadline) => Some(deadline),
            State::Idle | State::Armed(_) => None,
        }
    }

    /// Sleep until the deadline, if this poll wrote a frame.
    pub fn wait(&self) {
        if let Some(deadline) = self.sleep_deadline() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if !remaining.is_zero() {
                std::thread::sleep(remaining);
            }
        }
    }
}
