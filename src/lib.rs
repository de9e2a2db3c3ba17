//! Gesture client for AirPointr-style sensor services.
//!
//! Discovers sensor services on the LAN, keeps a registration alive with the
//! controlling one and turns its pointer stream into media player commands.

pub mod advanced;
pub mod control;
pub mod protocol;
pub mod session;
pub mod utils;
