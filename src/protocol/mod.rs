
// Protocol: sensor service discovery and keep-alive
// wire codec, service registry, UDP socket plumbing and the heartbeat timer
pub mod codec;
pub mod registry;
pub mod socket;
pub mod heartbeat;
