//! error.rs
//! Error taxonomy for the gesture client.
//!
//! - `DecodeError`: packet rejected by the wire codec, dropped by the caller.
//! - `ClientError`: everything else (socket, license, backend, configuration).

use std::{io, net::SocketAddr};
use thiserror::Error;

use crate::protocol::codec::LicenseStatus;

/// Raised by the wire codec. Never fatal: the packet is logged and dropped.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Payload does not start with `{`.
    #[error("not a JSON blob")]
    NotJson,

    /// JSON is unparsable or a recognised message misses a required field.
    #[error("malformed {kind} message: {reason}")]
    Malformed { kind: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum ClientError {
    /// Socket send/receive failure.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Pointer data from a service whose license does not allow control input.
    #[error("service {address} reports license '{license}', pointer output is invalid")]
    ProtocolInvariant {
        address: SocketAddr,
        license: LicenseStatus,
    },

    /// Media backend unreachable (fatal at startup only).
    #[error("media backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Media backend answered with an error or an unexpected payload.
    #[error("media backend error: {0}")]
    Backend(String),

    #[error("no active player, playback control is not available")]
    NoActivePlayer,

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;
