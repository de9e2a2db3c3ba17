//! config.rs
//! Startup configuration, read once from an optional TOML file.
//!
//! Every section falls back to the stock client constants, so an empty file
//! (or no file at all) talks to a local sensor service on the default ports.

use serde::Deserialize;
use std::{
    fs,
    net::{IpAddr, SocketAddr, ToSocketAddrs},
    path::Path,
    time::Duration,
};

use crate::utils::error::{ClientError, Result};

pub const DEFAULT_DISCOVERY_PORT: u16 = 8980;
pub const DEFAULT_GESTURE_PORT: u16 = 8981;
pub const DEFAULT_KODI_PORT: u16 = 8080;
pub const DEFAULT_MPD_PORT: u16 = 6600;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub network: NetworkConfig,
    pub service: ServiceConfig,
    pub session: SessionConfig,
    pub backend: BackendConfig,
    pub logging: LoggingConfig,
    pub trace: TraceConfig,
}

/// Local socket settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Interface to bind ("0.0.0.0" on unix, the ethernet interface IP on windows).
    pub bind_address: IpAddr,
    /// Port the sensor services broadcast their announcements to.
    pub discovery_port: u16,
    /// Gesture port of a loopback service (it never shows up in a broadcast).
    pub gesture_port: u16,
    /// Upper bound for a blocking `recv_from`.
    pub read_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::from([0, 0, 0, 0]),
            discovery_port: DEFAULT_DISCOVERY_PORT,
            gesture_port: DEFAULT_GESTURE_PORT,
            read_timeout_ms: 500,
        }
    }
}

impl NetworkConfig {
    pub fn read_timeout(&self) -> Duration {
        // zero would mean "block forever" to the socket
        Duration::from_millis(self.read_timeout_ms.max(1))
    }
}

/// The single sensor service trusted to drive playback and volume.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub host: Option<IpAddr>,
    /// Only consulted when `host` is absent.
    pub hostname: Option<String>,
}

impl ServiceConfig {
    /// Resolves the controlling service to an IP, once, at startup.
    /// Neither key set means a service on this machine.
    pub fn resolve(&self) -> Result<IpAddr> {
        if let Some(ip) = self.host {
            return Ok(ip);
        }
        let Some(hostname) = self.hostname.as_deref() else {
            return Ok(IpAddr::from([127, 0, 0, 1]));
        };

        let mut addrs = (hostname, 0)
            .to_socket_addrs()
            .map_err(|e| ClientError::Config(format!("cannot resolve '{}': {}", hostname, e)))?;

        addrs
            .find(SocketAddr::is_ipv4)
            .map(|a| a.ip())
            .ok_or_else(|| ClientError::Config(format!("'{}' has no IPv4 address", hostname)))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub heartbeat_period_secs: u64,
    pub expiry_secs: u64,
    /// Minimum |turns| before a circle drives the volume; 0 disables the gate.
    pub min_turns: u32,
    /// Volume points per circle segment.
    pub volume_step: i32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_period_secs: 15,
            expiry_secs: 10,
            min_turns: 0,
            volume_step: 2,
        }
    }
}

impl SessionConfig {
    /// At least one second; zero would spin the heartbeat thread.
    pub fn heartbeat_period(&self) -> Duration {
        Duration::from_secs(self.heartbeat_period_secs.max(1))
    }

    pub fn expiry(&self) -> Duration {
        Duration::from_secs(self.expiry_secs)
    }

    pub fn turns_gate(&self) -> Option<u32> {
        (self.min_turns > 0).then_some(self.min_turns)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Kodi,
    Mpd,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub host: String,
    /// Falls back to the backend's stock port.
    pub port: Option<u16>,
    /// Kodi webserver user; `kodi` when only a password is set.
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Kodi,
            host: "localhost".into(),
            port: None,
            username: None,
            password: None,
            timeout_ms: 2_000,
        }
    }
}

impl BackendConfig {
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(match self.kind {
            BackendKind::Kodi => DEFAULT_KODI_PORT,
            BackendKind::Mpd => DEFAULT_MPD_PORT,
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".into() }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    pub csv_path: Option<String>,
}

impl Config {
    /// Loads `path` if given, defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => {
                let text = fs::read_to_string(p).map_err(|e| {
                    ClientError::Config(format!("cannot read {}: {}", p.display(), e))
                })?;
                Self::from_toml(&text)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| ClientError::Config(e.to_string()))
    }
}
