//! interpreter.rs
//! Turns the pointer sample stream into discrete control events.
//!
//! Three channels, evaluated per sample in this order:
//! 1. circle: segment deltas on the 8-sector ring drive the volume
//! 2. swipe: a single left/right swipe drives transport
//! 3. smart circle: a confirmed 4-way selection drives a fixed command
//!
//! Swipe and smart channels are muted whenever volume mode is active after
//! the circle step of the same sample.

use log::{debug, warn};

use crate::control::events::ControlEvent;
use crate::protocol::codec::{GestureEvent, GestureSample};

pub const SEGMENTS: i32 = 8;
const HALF_RING: i32 = SEGMENTS / 2;
pub const DEFAULT_VOLUME_STEP: i32 = 2;

/// Signed shortest rotation from `from` to `to` on the 8-sector ring, in [-4, 4].
///
/// A naive difference of exactly ±4 keeps its sign, so
/// `segment_diff(a, b) == -segment_diff(b, a)` for every pair.
pub fn segment_diff(from: u8, to: u8) -> i32 {
    let d = to as i32 - from as i32;
    if d > HALF_RING {
        d - SEGMENTS
    } else if d < -HALF_RING {
        d + SEGMENTS
    } else {
        d
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Not tracking a circle.
    Idle,
    /// Circle detected, reference segment recorded, no volume change yet.
    CircleArmed,
    /// At least one segment change drove the volume.
    VolumeTracking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterpreterState {
    pub volume_mode_active: bool,
    pub last_segment: u8,
    pub phase: Phase,
}

impl Default for InterpreterState {
    fn default() -> Self {
        Self {
            volume_mode_active: false,
            last_segment: 0,
            phase: Phase::Idle,
        }
    }
}

impl InterpreterState {
    fn reset(&mut self) {
        self.volume_mode_active = false;
        self.phase = Phase::Idle;
    }
}

#[derive(Debug, Clone)]
pub struct GestureInterpreter {
    state: InterpreterState,
    volume_step: i32,
    /// Minimum |turns| before the circle arms or tracks; `None` = no gate.
    min_turns: Option<u32>,
}

impl Default for GestureInterpreter {
    fn default() -> Self {
        Self::new(DEFAULT_VOLUME_STEP, None)
    }
}

impl GestureInterpreter {
    pub fn new(volume_step: i32, min_turns: Option<u32>) -> Self {
        Self {
            state: InterpreterState::default(),
            volume_step,
            min_turns,
        }
    }

    pub fn state(&self) -> InterpreterState {
        self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    /// Feeds one sample from the controlling service. Events come back in
    /// emission order.
    pub fn interpret(&mut self, sample: &GestureSample) -> Vec<ControlEvent> {
        let mut out = Vec::new();

        self.step_circle(sample, &mut out);

        if self.state.volume_mode_active {
            if !sample.events.is_empty() {
                debug!("[Interpreter] Ignoring {:?} while changing volume", sample.events);
            }
            return out;
        }

        if let Some(ev) = swipe_command(&sample.events) {
            out.push(ev);
        }

        let smart = &sample.circle.smart;
        if smart.enabled && smart.action_select {
            match smart.action_segment {
                0 => out.push(ControlEvent::Play),
                1 => out.push(ControlEvent::Next),
                2 => out.push(ControlEvent::Stop),
                3 => out.push(ControlEvent::Previous),
                other => warn!("[Interpreter] Smart circle action segment {} out of range", other),
            }
        }

        out
    }

    fn step_circle(&mut self, sample: &GestureSample, out: &mut Vec<ControlEvent>) {
        let circle = &sample.circle;
        if !circle.active || circle.direction == 0 {
            self.state.reset();
            return;
        }

        if let Some(min) = self.min_turns {
            if circle.turns.unsigned_abs() < min {
                return;
            }
        }

        let segment = clamp_segment(circle.segment);

        if !self.state.volume_mode_active {
            // Arming sample only records the reference segment.
            self.state.last_segment = segment;
            self.state.volume_mode_active = true;
            self.state.phase = Phase::CircleArmed;
            debug!("[Interpreter] Volume mode armed at segment {}", segment);
            return;
        }

        if segment != self.state.last_segment {
            let diff = segment_diff(self.state.last_segment, segment);
            out.push(ControlEvent::VolumeDelta(diff * self.volume_step));
            self.state.last_segment = segment;
            self.state.phase = Phase::VolumeTracking;
        }
    }
}

fn clamp_segment(raw: i32) -> u8 {
    if (0..SEGMENTS).contains(&raw) {
        raw as u8
    } else {
        warn!("[Interpreter] Circle segment {} outside 0..=7, clamping", raw);
        raw.clamp(0, SEGMENTS - 1) as u8
    }
}

/// Exactly one swipe tag maps to a transport command; anything else is ignored.
fn swipe_command(events: &[GestureEvent]) -> Option<ControlEvent> {
    match events {
        [GestureEvent::RightSwipe] => Some(ControlEvent::TransportAdvance),
        [GestureEvent::LeftSwipe] => Some(ControlEvent::TransportRetreat),
        [] => None,
        other => {
            debug!("[Interpreter] Unmapped gesture events {:?}", other);
            None
        }
    }
}
