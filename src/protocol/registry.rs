//! registry.rs
//! Known sensor services keyed by network address.
//!
//! - Records are created by the first Discovery or Pointer message from an address.
//! - Non-loopback records expire once unseen for the expiry window.
//! - Exactly one IP (static configuration) is trusted to drive control events.

use parking_lot::Mutex;
use std::{
    collections::HashMap,
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::{Duration, Instant},
};
use log::{debug, info};

use crate::protocol::codec::{LicenseStatus, Message};
use crate::utils::error::{ClientError, Result};

pub const DEFAULT_EXPIRY: Duration = Duration::from_secs(10);

pub type SharedRegistry = Arc<Mutex<ServiceRegistry>>;

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRecord {
    pub address: SocketAddr,
    pub hostname: Option<String>,
    pub last_seen: Instant,
    /// Set once a pointer message arrived from this service.
    pub active: bool,
    pub license: LicenseStatus,
}

impl ServiceRecord {
    fn new(address: SocketAddr, now: Instant) -> Self {
        Self {
            address,
            hostname: None,
            last_seen: now,
            active: false,
            license: LicenseStatus::Demo,
        }
    }

    fn touch(&mut self, now: Instant) {
        self.last_seen = self.last_seen.max(now);
    }

    pub fn is_loopback(&self) -> bool {
        self.address.ip().is_loopback()
    }
}

/// What the caller has to do after `observe`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// First announcement from this address; `register` asks for an immediate
    /// registration datagram to `address`.
    NewService { address: SocketAddr, register: bool },
    /// Known service, liveness refreshed.
    Refreshed,
    /// Pointer data with a valid license; `controlling` tells whether it may
    /// reach the gesture interpreter.
    Pointer { controlling: bool },
    /// Nothing to update (operation results).
    Ignored,
}

#[derive(Debug)]
pub struct ServiceRegistry {
    records: HashMap<SocketAddr, ServiceRecord>,
    controlling: IpAddr,
    expiry: Duration,
}

impl ServiceRegistry {
    pub fn new(controlling: IpAddr, expiry: Duration) -> Self {
        Self {
            records: HashMap::new(),
            controlling,
            expiry,
        }
    }

    pub fn shared(self) -> SharedRegistry {
        Arc::new(Mutex::new(self))
    }

    /// Inserts a service that will never announce itself (loopback).
    pub fn insert_synthetic(&mut self, address: SocketAddr, now: Instant) {
        self.records
            .entry(address)
            .or_insert_with(|| ServiceRecord::new(address, now));
    }

    /// Whether `address` belongs to the configured controlling service.
    pub fn is_controlling(&self, address: SocketAddr) -> bool {
        address.ip() == self.controlling
    }

    pub fn controlling_ip(&self) -> IpAddr {
        self.controlling
    }

    /// Upserts the record for `from` according to `message`.
    ///
    /// Fails with `ProtocolInvariant` when pointer data arrives under a license
    /// that forbids control input; the record is still updated.
    pub fn observe(&mut self, from: SocketAddr, message: &Message, now: Instant) -> Result<Observation> {
        match message {
            Message::Discovery(d) => {
                // Announcements come from an ephemeral port; the service listens
                // on the advertised udp port.
                let address = d
                    .control_port()
                    .map(|port| SocketAddr::new(from.ip(), port))
                    .unwrap_or(from);

                if let Some(rec) = self.records.get_mut(&address) {
                    rec.touch(now);
                    if rec.hostname.is_none() {
                        rec.hostname = Some(d.hostname.clone());
                    }
                    return Ok(Observation::Refreshed);
                }

                let mut rec = ServiceRecord::new(address, now);
                rec.hostname = Some(d.hostname.clone());
                self.records.insert(address, rec);

                let register = self.is_controlling(address);
                info!(
                    "[Registry] New service '{}' at {} (services: {:?}){}",
                    d.hostname,
                    address,
                    d.services,
                    if register { " [controlling]" } else { "" }
                );
                Ok(Observation::NewService { address, register })
            }

            Message::Pointer(p) => {
                // Pointer data is matched by IP: the stream may come from a
                // different port than the announcement.
                let mut matched = false;
                for rec in self.records.values_mut().filter(|r| r.address.ip() == from.ip()) {
                    rec.touch(now);
                    rec.active = true;
                    rec.license = p.license.clone();
                    matched = true;
                }
                if !matched {
                    let mut rec = ServiceRecord::new(from, now);
                    rec.active = true;
                    rec.license = p.license.clone();
                    self.records.insert(from, rec);
                    debug!("[Registry] Pointer stream from unannounced service {}", from);
                }

                if !p.license.permits_control() {
                    return Err(ClientError::ProtocolInvariant {
                        address: from,
                        license: p.license.clone(),
                    });
                }
                Ok(Observation::Pointer {
                    controlling: self.is_controlling(from),
                })
            }

            Message::OperationResult(_) => {
                for rec in self.records.values_mut().filter(|r| r.address.ip() == from.ip()) {
                    rec.touch(now);
                }
                Ok(Observation::Ignored)
            }
        }
    }

    /// Drops every non-loopback record unseen for longer than the expiry window.
    /// Returns the removed addresses.
    pub fn sweep(&mut self, now: Instant) -> Vec<SocketAddr> {
        let expiry = self.expiry;
        let stale: Vec<SocketAddr> = self
            .records
            .values()
            .filter(|r| !r.is_loopback() && now.saturating_duration_since(r.last_seen) > expiry)
            .map(|r| r.address)
            .collect();

        for addr in &stale {
            self.records.remove(addr);
            info!("[Registry] Service {} expired", addr);
        }
        stale
    }

    /// Addresses that get a keep-alive `register`: every active record, and
    /// also the controlling service's record while it is still inactive.
    /// The second part is an extension over a plain active-only keep-alive;
    /// a controlling service that missed the first `register` gets another.
    pub fn heartbeat_targets(&self) -> Vec<SocketAddr> {
        let mut targets: Vec<SocketAddr> = self
            .records
            .values()
            .filter(|r| r.active || self.is_controlling(r.address))
            .map(|r| r.address)
            .collect();
        targets.sort();
        targets
    }

    pub fn active_addresses(&self) -> Vec<SocketAddr> {
        let mut out: Vec<SocketAddr> = self
            .records
            .values()
            .filter(|r| r.active)
            .map(|r| r.address)
            .collect();
        out.sort();
        out
    }

    pub fn get(&self, address: SocketAddr) -> Option<&ServiceRecord> {
        self.records.get(&address)
    }

    /// Records ordered by address.
    pub fn snapshot(&self) -> Vec<ServiceRecord> {
        let mut out: Vec<ServiceRecord> = self.records.values().cloned().collect();
        out.sort_by_key(|r| r.address);
        out
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
