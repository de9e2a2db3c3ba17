//! receiver.rs
//! Receive loop: decodes datagrams, updates the registry and hands pointer
//! samples from the controlling service to the interpreter and sink.
//!
//! - a decode failure drops the packet, never the loop
//! - a pointer sample under an invalid license is dropped with a warning
//! - sink failures are logged per event; the stream keeps flowing

use std::{
    io,
    net::{SocketAddr, UdpSocket},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};
use log::{debug, info, warn};

use crate::control::{
    events::ControlEvent,
    interpreter::GestureInterpreter,
    sink::{Applied, CommandSink},
};
use crate::protocol::{
    codec::{decode, GestureSample, Message},
    registry::{Observation, SharedRegistry},
    socket::{register, Outbound},
};
use crate::utils::error::ClientError;
use crate::utils::trace::{EventRecorder, TraceEvent};

/// Largest UDP payload over IPv4.
const MAX_DATAGRAM: usize = 65_507;

pub struct Dispatcher {
    registry: SharedRegistry,
    interpreter: GestureInterpreter,
    /// `None` in monitor mode.
    sink: Option<CommandSink>,
    outbound: Arc<dyn Outbound>,
    recorder: Arc<EventRecorder>,
    monitor: bool,
}

impl Dispatcher {
    pub fn new(
        registry: SharedRegistry,
        interpreter: GestureInterpreter,
        sink: Option<CommandSink>,
        outbound: Arc<dyn Outbound>,
        recorder: Arc<EventRecorder>,
    ) -> Self {
        let monitor = sink.is_none();
        Self { registry, interpreter, sink, outbound, recorder, monitor }
    }

    /// Processes one datagram. Returns the control events it produced, in
    /// emission order, whether or not the sink accepted them.
    pub fn handle_datagram(&mut self, payload: &[u8], from: SocketAddr, now: Instant) -> Vec<ControlEvent> {
        self.recorder.count_packet();

        let messages = match decode(payload) {
            Ok(m) => m,
            Err(e) => {
                debug!("[Receiver] Dropping packet from {}: {}", from, e);
                self.recorder.record(TraceEvent::PacketDropped { from, reason: e.to_string() });
                return Vec::new();
            }
        };

        let mut emitted = Vec::new();
        for message in &messages {
            // lock only for the registry update
            let observation = self.registry.lock().observe(from, message, now);

            match observation {
                Ok(Observation::NewService { address, register: wanted }) => {
                    self.recorder.record(TraceEvent::ServiceDiscovered { addr: address });
                    if wanted {
                        info!("[Receiver] Registering with controlling service {}", address);
                        register(self.outbound.as_ref(), address);
                    }
                }
                Ok(Observation::Pointer { controlling }) => {
                    let Message::Pointer(pointer) = message else {
                        continue;
                    };
                    if self.monitor {
                        log_sample(from, &pointer.sample);
                    }
                    if controlling {
                        emitted.extend(self.drive(&pointer.sample));
                    }
                }
                Ok(Observation::Refreshed) | Ok(Observation::Ignored) => {}
                Err(ClientError::ProtocolInvariant { address, license }) => {
                    warn!("[Receiver] {} sent pointer data with license '{}', ignoring", address, license);
                    self.recorder.record(TraceEvent::LicenseRejected {
                        from: address,
                        license: license.to_string(),
                    });
                }
                Err(e) => warn!("[Receiver] Registry update for {} failed: {}", from, e),
            }

            if let Message::OperationResult(result) = message {
                info!(
                    "[Receiver] {} --> {}",
                    result.op,
                    if result.success { "success" } else { "fail" }
                );
            }
        }
        emitted
    }

    fn drive(&mut self, sample: &GestureSample) -> Vec<ControlEvent> {
        let events = self.interpreter.interpret(sample);
        for &event in &events {
            self.recorder.record(TraceEvent::ControlEmitted { event: event.to_string() });
            let Some(sink) = self.sink.as_mut() else {
                info!("[Receiver] {}", event);
                continue;
            };
            match sink.apply(event) {
                Ok(applied) => self.recorder.record(TraceEvent::CommandApplied {
                    event: event.to_string(),
                    outcome: describe(applied),
                }),
                Err(ClientError::NoActivePlayer) => {
                    info!("[Receiver] {} skipped: no active player", event);
                }
                Err(e) => {
                    warn!("[Receiver] {} failed on {}: {}", event, sink.backend_name(), e);
                    self.recorder.record(TraceEvent::CommandFailed {
                        event: event.to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }
        events
    }

    /// Blocks on `socket` until `running` goes false. The socket's read
    /// timeout bounds how long shutdown waits.
    pub fn run(&mut self, socket: &UdpSocket, running: &AtomicBool) {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        info!("[Receiver] Started");

        while running.load(Ordering::Relaxed) {
            match socket.recv_from(&mut buf) {
                Ok((n, from)) => {
                    self.handle_datagram(&buf[..n], from, Instant::now());
                }
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
                Err(e) => warn!("[Receiver] recv failed: {}", e),
            }
        }
        info!("[Receiver] Stopped");
    }
}

fn describe(applied: Applied) -> String {
    match applied {
        Applied::Volume(v) => format!("volume={}", v),
        other => format!("{:?}", other).to_lowercase(),
    }
}

fn log_sample(from: SocketAddr, s: &GestureSample) {
    let c = &s.circle;
    info!(
        "[Monitor] {} x={:.3} y={:.3} active={} events={:?} circle(active={} dir={} seg={} turns={}) smart(enabled={} select={} seg={})",
        from,
        s.x,
        s.y,
        s.active,
        s.events,
        c.active,
        c.direction,
        c.segment,
        c.turns,
        c.smart.enabled,
        c.smart.action_select,
        c.smart.action_segment,
    );
}
