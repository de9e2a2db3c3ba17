
// Control: pointer stream -> control events -> media backend
// gesture interpretation, command resolution, Kodi/MPD backends and the receive loop
pub mod events;
pub mod interpreter;
pub mod sink;
pub mod kodi;
pub mod mpd;
pub mod receiver;
