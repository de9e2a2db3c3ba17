
// Development tooling: a scripted stand-in for the sensor service
pub mod gesture_script;
pub mod mock_service;
