//! sink.rs
//! Applies control events to a media backend.
//!
//! The backend only exposes primitive calls; the sink owns the resolution
//! rules (volume clamping, swipe direction vs playback state).

use log::info;

use crate::control::events::ControlEvent;
use crate::utils::error::{ClientError, Result};

pub const VOLUME_MIN: i32 = 0;
pub const VOLUME_MAX: i32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Playing,
    Paused,
    /// No active player.
    Inactive,
}

/// Primitive calls into a media player. Implementations bound every call
/// with a timeout.
pub trait MediaBackend: Send {
    fn name(&self) -> &'static str;
    fn get_volume(&mut self) -> Result<i32>;
    fn set_volume(&mut self, volume: i32) -> Result<()>;
    fn playback_state(&mut self) -> Result<PlaybackState>;
    fn next(&mut self) -> Result<()>;
    fn previous(&mut self) -> Result<()>;
    fn play(&mut self) -> Result<()>;
    fn pause(&mut self) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
}

/// The concrete command a control event resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Volume(i32),
    Next,
    Previous,
    Play,
    Pause,
    Stop,
}

pub struct CommandSink {
    backend: Box<dyn MediaBackend>,
}

impl CommandSink {
    pub fn new(backend: Box<dyn MediaBackend>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Startup reachability check.
    pub fn probe(&mut self) -> Result<PlaybackState> {
        self.backend
            .playback_state()
            .map_err(|e| ClientError::BackendUnavailable(format!("{}: {}", self.backend.name(), e)))
    }

    pub fn apply(&mut self, event: ControlEvent) -> Result<Applied> {
        let applied = match event {
            ControlEvent::VolumeDelta(delta) => {
                let current = self.backend.get_volume()?;
                let volume = (current + delta).clamp(VOLUME_MIN, VOLUME_MAX);
                self.backend.set_volume(volume)?;
                Applied::Volume(volume)
            }
            ControlEvent::TransportAdvance => match self.backend.playback_state()? {
                PlaybackState::Playing => self.run(Applied::Next)?,
                PlaybackState::Paused => self.run(Applied::Play)?,
                PlaybackState::Inactive => return Err(ClientError::NoActivePlayer),
            },
            ControlEvent::TransportRetreat => match self.backend.playback_state()? {
                PlaybackState::Playing => self.run(Applied::Pause)?,
                PlaybackState::Paused => self.run(Applied::Previous)?,
                PlaybackState::Inactive => return Err(ClientError::NoActivePlayer),
            },
            ControlEvent::Play => self.run(Applied::Play)?,
            ControlEvent::Next => self.run(Applied::Next)?,
            ControlEvent::Stop => self.run(Applied::Stop)?,
            ControlEvent::Previous => self.run(Applied::Previous)?,
        };

        match applied {
            Applied::Volume(v) => info!("[Sink] {}: volume changed to {}%", self.backend.name(), v),
            other => info!("[Sink] {}: playback -> {:?}", self.backend.name(), other),
        }
        Ok(applied)
    }

    fn run(&mut self, cmd: Applied) -> Result<Applied> {
        match cmd {
            Applied::Next => self.backend.next()?,
            Applied::Previous => self.backend.previous()?,
            Applied::Play => self.backend.play()?,
            Applied::Pause => self.backend.pause()?,
            Applied::Stop => self.backend.stop()?,
            Applied::Volume(v) => self.backend.set_volume(v)?,
        }
        Ok(cmd)
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        GetVolume,
        SetVolume(i32),
        State,
        Next,
        Previous,
        Play,
        Pause,
        Stop,
    }

    /// In-memory player recording every call.
    #[derive(Clone)]
    pub struct FakeBackend {
        pub calls: Arc<Mutex<Vec<Call>>>,
        pub volume: Arc<Mutex<i32>>,
        pub state: Arc<Mutex<PlaybackState>>,
        pub unreachable: bool,
    }

    impl FakeBackend {
        pub fn new(volume: i32, state: PlaybackState) -> Self {
            Self {
                calls: Arc::new(Mutex::new(Vec::new())),
                volume: Arc::new(Mutex::new(volume)),
                state: Arc::new(Mutex::new(state)),
                unreachable: false,
            }
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().clone()
        }

        fn call(&self, c: Call) -> Result<()> {
            if self.unreachable {
                return Err(ClientError::Backend("connection refused".into()));
            }
            self.calls.lock().push(c);
            Ok(())
        }
    }

    impl MediaBackend for FakeBackend {
        fn name(&self) -> &'static str {
            "fake"
        }
        fn get_volume(&mut self) -> Result<i32> {
            self.call(Call::GetVolume)?;
            Ok(*self.volume.lock())
        }
        fn set_volume(&mut self, volume: i32) -> Result<()> {
            self.call(Call::SetVolume(volume))?;
            *self.volume.lock() = volume;
            Ok(())
        }
        fn playback_state(&mut self) -> Result<PlaybackState> {
            self.call(Call::State)?;
            Ok(*self.state.lock())
        }
        fn next(&mut self) -> Result<()> {
            self.call(Call::Next)
        }
        fn previous(&mut self) -> Result<()> {
            self.call(Call::Previous)
        }
        fn play(&mut self) -> Result<()> {
            self.call(Call::Play)?;
            *self.state.lock() = PlaybackState::Playing;
            Ok(())
        }
        fn pause(&mut self) -> Result<()> {
            self.call(Call::Pause)?;
            *self.state.lock() = PlaybackState::Paused;
            Ok(())
        }
        fn stop(&mut self) -> Result<()> {
            self.call(Call::Stop)
        }
    }
}
