//! gesture_script.rs
//! Deterministic pointer frame sequences for the mock sensor service.
//!
//! A script is built from steps (idle, circle rotation, swipe, smart-circle
//! selection) and replayed frame by frame. Cursor positions follow the
//! gesture so a monitor shows something plausible.

use std::f64::consts::TAU;

use crate::control::interpreter::SEGMENTS;
use crate::protocol::codec::{CircleState, GestureEvent, GestureSample, SmartCircle};

const CENTER: f64 = 0.5;
const RADIUS: f64 = 0.2;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GestureScript {
    frames: Vec<GestureSample>,
}

impl GestureScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// `n` frames with the hand resting at the center.
    pub fn idle(mut self, n: usize) -> Self {
        for _ in 0..n {
            self.frames.push(resting());
        }
        self
    }

    /// Circle starting at `start`, moving `steps` segments (sign = direction),
    /// followed by a release frame.
    ///
    /// The first frame only arms volume mode; each following frame moves one
    /// segment.
    pub fn circle(mut self, start: u8, steps: i32) -> Self {
        let direction = steps.signum();
        let start = start as i32 % SEGMENTS;

        for i in 0..=steps.abs() {
            let travelled = i * direction;
            let segment = (start + travelled).rem_euclid(SEGMENTS);
            let angle = TAU * segment as f64 / SEGMENTS as f64;

            self.frames.push(GestureSample {
                x: CENTER + RADIUS * angle.cos(),
                y: CENTER + RADIUS * angle.sin(),
                active: true,
                events: Vec::new(),
                circle: CircleState {
                    active: direction != 0,
                    direction,
                    segment,
                    turns: travelled / SEGMENTS,
                    smart: SmartCircle::default(),
                },
            });
        }
        self.frames.push(resting());
        self
    }

    pub fn swipe(mut self, event: GestureEvent) -> Self {
        let dx = match event {
            GestureEvent::RightSwipe => RADIUS,
            GestureEvent::LeftSwipe => -RADIUS,
            GestureEvent::Other(_) => 0.0,
        };
        self.frames.push(GestureSample {
            x: CENTER + dx,
            y: CENTER,
            active: true,
            events: vec![event],
            circle: CircleState::default(),
        });
        self
    }

    /// Confirmed smart-circle selection of `segment` (0..=3).
    pub fn smart(mut self, segment: i32) -> Self {
        let mut frame = resting();
        frame.circle.smart = SmartCircle {
            enabled: true,
            action_select: true,
            action_segment: segment,
        };
        self.frames.push(frame);
        self
    }

    /// Volume up a little, down a little, skip, pause via swipe, resume.
    pub fn demo() -> Self {
        Self::new()
            .idle(10)
            .circle(0, 4)
            .idle(10)
            .circle(4, -2)
            .idle(10)
            .swipe(GestureEvent::RightSwipe)
            .idle(10)
            .swipe(GestureEvent::LeftSwipe)
            .idle(10)
            .smart(0)
            .idle(10)
    }

    pub fn frames(&self) -> &[GestureSample] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

fn resting() -> GestureSample {
    GestureSample {
        x: CENTER,
        y: CENTER,
        active: true,
        ..GestureSample::default()
    }
}
