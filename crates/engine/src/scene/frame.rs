//! Frame inputs
//!
//! The scheduler does not read the clock or the input devices itself; a
//! [`FrameSource`] hands it one [`FrameInput`] per frame.

use crate::foundation::time::Timer;
use crate::input::InputSnapshot;
use std::collections::VecDeque;

/// Everything the outside world contributes to one frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameInput {
    /// Seconds since the previous frame
    pub delta: f32,
    /// Input state latched at frame start
    pub input: InputSnapshot,
}

impl FrameInput {
    /// Input with no active actions
    pub fn new(delta: f32) -> Self {
        Self {
            delta,
            input: InputSnapshot::new(),
        }
    }

    /// Builder pattern: set the input snapshot
    pub fn with_input(mut self, input: InputSnapshot) -> Self {
        self.input = input;
        self
    }
}

/// Supplies frame inputs
pub trait FrameSource {
    /// Input for the next frame
    fn next_frame(&mut self) -> FrameInput;
}

/// Wall-clock deltas, no input devices
pub struct SystemFrameSource {
    timer: Timer,
}

impl SystemFrameSource {
    /// Deltas clamped to `max_delta` seconds
    pub fn new(max_delta: f32) -> Self {
        Self {
            timer: Timer::new(max_delta),
        }
    }
}

impl FrameSource for SystemFrameSource {
    fn next_frame(&mut self) -> FrameInput {
        FrameInput::new(self.timer.tick())
    }
}

/// Fixed delta with optionally scripted input, for tests and headless runs
#[derive(Debug, Clone)]
pub struct FixedFrameSource {
    delta: f32,
    scripted: VecDeque<InputSnapshot>,
}

impl FixedFrameSource {
    /// Every frame advances `delta` seconds
    pub fn new(delta: f32) -> Self {
        Self {
            delta,
            scripted: VecDeque::new(),
        }
    }

    /// Builder pattern: use `input` for the next unscripted frame
    pub fn then(mut self, input: InputSnapshot) -> Self {
        self.scripted.push_back(input);
        self
    }
}

impl FrameSource for FixedFrameSource {
    fn next_frame(&mut self) -> FrameInput {
        let input = self.scripted.pop_front().unwrap_or_default();
        FrameInput::new(self.delta).with_input(input)
    }
}
