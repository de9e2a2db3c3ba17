//! heartbeat.rs
//! Periodic registry sweep + keep-alive registration.
//!
//! Runs on its own thread so it keeps firing when no datagram ever arrives
//! (a UDP socket with nothing pending never wakes the receive loop).
//! Each tick: expire stale services, then re-send `register` to every
//! heartbeat target taken from the same locked snapshot.

use crossbeam::channel::{bounded, RecvTimeoutError, Sender};
use std::{
    io,
    net::SocketAddr,
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use log::{debug, info};

use crate::protocol::{
    registry::SharedRegistry,
    socket::{register, Outbound},
};
use crate::utils::trace::{EventRecorder, TraceEvent};

pub const DEFAULT_PERIOD: Duration = Duration::from_secs(15);

/// Result of one tick, mostly for tests.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub expired: Vec<SocketAddr>,
    pub registered: Vec<SocketAddr>,
    pub failed: Vec<SocketAddr>,
}

pub struct HeartbeatScheduler {
    period: Duration,
    registry: SharedRegistry,
    outbound: Arc<dyn Outbound>,
    recorder: Arc<EventRecorder>,
}

/// Stops the heartbeat thread when `stop` is called or the handle is dropped.
pub struct HeartbeatHandle {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl HeartbeatHandle {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Dropping the sender disconnects the channel and wakes the thread.
        self.stop_tx.take();
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for HeartbeatHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl HeartbeatScheduler {
    pub fn new(
        period: Duration,
        registry: SharedRegistry,
        outbound: Arc<dyn Outbound>,
        recorder: Arc<EventRecorder>,
    ) -> Self {
        Self { period, registry, outbound, recorder }
    }

    /// Fires once immediately, then every `period` until stopped.
    pub fn spawn(self) -> io::Result<HeartbeatHandle> {
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("heartbeat".into())
            .spawn(move || {
                info!("[Heartbeat] Started, period {:?}", self.period);
                loop {
                    self.tick(Instant::now());
                    match stop_rx.recv_timeout(self.period) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                info!("[Heartbeat] Stopped");
            })?;

        Ok(HeartbeatHandle { stop_tx: Some(stop_tx), handle: Some(handle) })
    }

    /// Sweep, then keep-alive. The registry lock covers sweep and target
    /// selection; datagrams go out after it is released.
    pub fn tick(&self, now: Instant) -> TickReport {
        let (expired, targets, listing) = {
            let mut reg = self.registry.lock();
            let expired = reg.sweep(now);
            (expired, reg.heartbeat_targets(), reg.snapshot())
        };

        for addr in &expired {
            self.recorder.record(TraceEvent::ServiceExpired { addr: *addr });
        }

        if listing.is_empty() {
            info!("[Heartbeat] No sensor services discovered");
        } else {
            info!("[Heartbeat] Discovered sensor services:");
            for rec in &listing {
                if rec.active {
                    info!(
                        "[Heartbeat]   {} | license: {} | (active)",
                        rec.address, rec.license
                    );
                } else {
                    info!("[Heartbeat]   {}", rec.address);
                }
            }
        }

        let mut report = TickReport { expired, ..TickReport::default() };
        for target in targets {
            let sent = register(self.outbound.as_ref(), target);
            self.recorder.record(TraceEvent::Heartbeat { addr: target, sent });
            if sent {
                debug!("[Heartbeat] register -> {}", target);
                report.registered.push(target);
            } else {
                report.failed.push(target);
            }
        }
        report
    }
}
