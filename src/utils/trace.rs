//! Session tracing: what the client saw and what it did.
//!
//! - **EventRecorder:** lock-free queue (4K capacity) drained by an optional
//!   background CSV exporter. Producers never block; a full queue drops.
//! - **Counters:** atomics summarised at shutdown.

use crossbeam_queue::ArrayQueue;
use serde::Serialize;
use std::{
    fs::File,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread,
    time::{Duration, Instant},
};
use log::{error, info};

const TRACE_QUEUE_CAPACITY: usize = 4_096;
const EXPORTER_POLL_MS: u64 = 20;
const FLUSH_EVERY: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum TraceEvent {
    ServiceDiscovered { addr: SocketAddr },
    ServiceExpired { addr: SocketAddr },
    Heartbeat { addr: SocketAddr, sent: bool },
    PacketDropped { from: SocketAddr, reason: String },
    LicenseRejected { from: SocketAddr, license: String },
    ControlEmitted { event: String },
    CommandApplied { event: String, outcome: String },
    CommandFailed { event: String, error: String },
}

impl TraceEvent {
    fn kind(&self) -> &'static str {
        match self {
            TraceEvent::ServiceDiscovered { .. } => "service_discovered",
            TraceEvent::ServiceExpired { .. } => "service_expired",
            TraceEvent::Heartbeat { .. } => "heartbeat",
            TraceEvent::PacketDropped { .. } => "packet_dropped",
            TraceEvent::LicenseRejected { .. } => "license_rejected",
            TraceEvent::ControlEmitted { .. } => "control_emitted",
            TraceEvent::CommandApplied { .. } => "command_applied",
            TraceEvent::CommandFailed { .. } => "command_failed",
        }
    }

    fn subject_detail(&self) -> (String, String) {
        match self {
            TraceEvent::ServiceDiscovered { addr } | TraceEvent::ServiceExpired { addr } => {
                (addr.to_string(), String::new())
            }
            TraceEvent::Heartbeat { addr, sent } => (addr.to_string(), sent.to_string()),
            TraceEvent::PacketDropped { from, reason } => (from.to_string(), reason.clone()),
            TraceEvent::LicenseRejected { from, license } => (from.to_string(), license.clone()),
            TraceEvent::ControlEmitted { event } => (event.clone(), String::new()),
            TraceEvent::CommandApplied { event, outcome } => (event.clone(), outcome.clone()),
            TraceEvent::CommandFailed { event, error } => (event.clone(), error.clone()),
        }
    }
}

#[derive(Debug, Serialize)]
struct TraceRow<'a> {
    ts_ms: u64,
    event: &'a str,
    subject: String,
    detail: String,
}

/// Running totals, readable at any time.
#[derive(Debug, Default)]
pub struct TraceCounters {
    pub packets: AtomicU64,
    pub dropped_packets: AtomicU64,
    pub control_events: AtomicU64,
    pub failed_commands: AtomicU64,
    pub heartbeats: AtomicU64,
    pub dropped_traces: AtomicU64,
}

pub struct EventRecorder {
    queue: Arc<ArrayQueue<(u64, TraceEvent)>>,
    run_start: Instant,
    exporting: Arc<AtomicBool>,
    pub counters: TraceCounters,
}

impl Default for EventRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventRecorder {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(ArrayQueue::new(TRACE_QUEUE_CAPACITY)),
            run_start: Instant::now(),
            exporting: Arc::new(AtomicBool::new(false)),
            counters: TraceCounters::default(),
        }
    }

    /// Appends event to queue (lock-free). Drops if nobody exports or the queue is full.
    #[inline]
    pub fn record(&self, event: TraceEvent) {
        match &event {
            TraceEvent::PacketDropped { .. } | TraceEvent::LicenseRejected { .. } => {
                self.counters.dropped_packets.fetch_add(1, Ordering::Relaxed);
            }
            TraceEvent::ControlEmitted { .. } => {
                self.counters.control_events.fetch_add(1, Ordering::Relaxed);
            }
            TraceEvent::CommandFailed { .. } => {
                self.counters.failed_commands.fetch_add(1, Ordering::Relaxed);
            }
            TraceEvent::Heartbeat { .. } => {
                self.counters.heartbeats.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }

        if !self.exporting.load(Ordering::Relaxed) {
            return;
        }
        if self.queue.push((self.now_ms(), event)).is_err() {
            self.counters.dropped_traces.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn count_packet(&self) {
        self.counters.packets.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn now_ms(&self) -> u64 {
        self.run_start.elapsed().as_millis() as u64
    }

    /// Spawns the thread draining the queue into `output_csv`.
    /// Exits once `stop_exporter` was called and the queue is empty.
    pub fn start_exporter(&self, output_csv: String) -> thread::JoinHandle<()> {
        let queue = self.queue.clone();
        let exporting = self.exporting.clone();
        exporting.store(true, Ordering::Release);

        thread::spawn(move || {
            let file = match File::create(&output_csv) {
                Ok(f) => f,
                Err(e) => {
                    error!("[Trace] Cannot create {}: {}", output_csv, e);
                    exporting.store(false, Ordering::Release);
                    return;
                }
            };
            let mut writer = csv::Writer::from_writer(file);
            let mut since_flush = 0usize;

            loop {
                match queue.pop() {
                    Some((ts_ms, event)) => {
                        let (subject, detail) = event.subject_detail();
                        let row = TraceRow { ts_ms, event: event.kind(), subject, detail };
                        if let Err(e) = writer.serialize(row) {
                            error!("[Trace] Write failed: {}", e);
                        }
                        since_flush += 1;
                        if since_flush >= FLUSH_EVERY {
                            let _ = writer.flush();
                            since_flush = 0;
                        }
                    }
                    None => {
                        if !exporting.load(Ordering::Acquire) {
                            break;
                        }
                        let _ = writer.flush();
                        since_flush = 0;
                        thread::sleep(Duration::from_millis(EXPORTER_POLL_MS));
                    }
                }
            }

            let _ = writer.flush();
            info!("[Trace] Exporter finished: {}", output_csv);
        })
    }

    pub fn stop_exporter(&self) {
        self.exporting.store(false, Ordering::Release);
    }

    /// One-line summary for the shutdown log.
    pub fn summary(&self) -> String {
        let c = &self.counters;
        format!(
            "packets={} dropped={} control_events={} failed_commands={} heartbeats={} dropped_traces={}",
            c.packets.load(Ordering::Relaxed),
            c.dropped_packets.load(Ordering::Relaxed),
            c.control_events.load(Ordering::Relaxed),
            c.failed_commands.load(Ordering::Relaxed),
            c.heartbeats.load(Ordering::Relaxed),
            c.dropped_traces.load(Ordering::Relaxed),
        )
    }
}
