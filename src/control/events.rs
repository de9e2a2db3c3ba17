//! Abstract control events handed from the interpreter to the command sink.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlEvent {
    /// Relative volume change, resolved against the current volume by the sink.
    VolumeDelta(i32),
    /// Right swipe: forward semantics depend on playback state.
    TransportAdvance,
    /// Left swipe: backward semantics depend on playback state.
    TransportRetreat,
    Play,
    Next,
    Stop,
    Previous,
}

impl fmt::Display for ControlEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlEvent::VolumeDelta(d) => write!(f, "VolumeDelta({})", d),
            ControlEvent::TransportAdvance => f.write_str("TransportAdvance"),
            ControlEvent::TransportRetreat => f.write_str("TransportRetreat"),
            ControlEvent::Play => f.write_str("Play"),
            ControlEvent::Next => f.write_str("Next"),
            ControlEvent::Stop => f.write_str("Stop"),
            ControlEvent::Previous => f.write_str("Previous"),
        }
    }
}
