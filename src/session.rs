//! session.rs
//! Wires socket, registry, heartbeat and receive loop into one running client.
//!
//! Threads:
//! - `heartbeat`: sweep + keep-alive every period
//! - `receiver`: blocking receive loop, bounded by the socket read timeout
//! - trace exporter (optional)

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::Instant,
};
use log::{error, info};

use crate::control::{interpreter::GestureInterpreter, receiver::Dispatcher, sink::CommandSink};
use crate::protocol::{
    heartbeat::{HeartbeatHandle, HeartbeatScheduler},
    registry::{ServiceRegistry, SharedRegistry},
    socket::{bind_client_socket, register, unregister},
};
use crate::utils::{config::Config, error::Result, trace::EventRecorder};

pub struct Session {
    registry: SharedRegistry,
    socket: Arc<UdpSocket>,
    recorder: Arc<EventRecorder>,
    running: Arc<AtomicBool>,
    heartbeat: Option<HeartbeatHandle>,
    receiver: Option<JoinHandle<()>>,
    exporter: Option<JoinHandle<()>>,
    local_addr: SocketAddr,
}

impl Session {
    /// Binds the discovery socket and starts all session threads.
    /// `sink == None` runs in monitor mode.
    pub fn start(config: &Config, sink: Option<CommandSink>) -> Result<Self> {
        let controlling = config.service.resolve()?;
        let net = &config.network;

        let socket = Arc::new(bind_client_socket(
            SocketAddr::new(net.bind_address, net.discovery_port),
            net.read_timeout(),
        )?);
        let local_addr = socket.local_addr()?;

        let recorder = Arc::new(EventRecorder::new());
        let registry = ServiceRegistry::new(controlling, config.session.expiry()).shared();

        // Broadcasts never travel over loopback: a local service has to be
        // seeded and registered by hand.
        if controlling.is_loopback() {
            let local = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), net.gesture_port);
            registry.lock().insert_synthetic(local, Instant::now());
            register(socket.as_ref(), local);
            info!("[Session] Registered with local service {}", local);
        }

        let heartbeat = HeartbeatScheduler::new(
            config.session.heartbeat_period(),
            registry.clone(),
            socket.clone(),
            recorder.clone(),
        )
        .spawn()?;

        let running = Arc::new(AtomicBool::new(true));
        let monitor = sink.is_none();
        let mut dispatcher = Dispatcher::new(
            registry.clone(),
            GestureInterpreter::new(config.session.volume_step, config.session.turns_gate()),
            sink,
            socket.clone(),
            recorder.clone(),
        );

        let receiver = {
            let socket = socket.clone();
            let running = running.clone();
            thread::Builder::new()
                .name("receiver".into())
                .spawn(move || dispatcher.run(&socket, &running))?
        };

        // Started last: a failed start leaves no exporter thread behind.
        // Events recorded so far wait in the queue.
        let exporter = config
            .trace
            .csv_path
            .as_ref()
            .map(|path| recorder.start_exporter(path.clone()));

        info!(
            "[Session] Started on {} (controlling service {}{})",
            local_addr,
            controlling,
            if monitor { ", monitor mode" } else { "" }
        );

        Ok(Self {
            registry,
            socket,
            recorder,
            running,
            heartbeat: Some(heartbeat),
            receiver: Some(receiver),
            exporter,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn recorder(&self) -> Arc<EventRecorder> {
        self.recorder.clone()
    }

    /// Stops the heartbeat and receive loop, then unregisters from every
    /// active service.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(hb) = self.heartbeat.take() {
            hb.stop();
        }

        self.running.store(false, Ordering::Relaxed);
        if let Some(h) = self.receiver.take() {
            if h.join().is_err() {
                error!("[Session] Receiver thread panicked");
            }
        }

        let active = self.registry.lock().active_addresses();
        for addr in active {
            if unregister(self.socket.as_ref(), addr) {
                info!("[Session] Unregistered from {}", addr);
            }
        }

        if let Some(h) = self.exporter.take() {
            self.recorder.stop_exporter();
            let _ = h.join();
        }

        info!("[Session] Stopped: {}", self.recorder.summary());
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.receiver.is_some() {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{path::Path, time::Duration};

    fn config_on(port: u16, csv: &Path) -> Config {
        let mut config = Config::default();
        config.network.bind_address = IpAddr::V4(Ipv4Addr::LOCALHOST);
        config.network.discovery_port = port;
        config.network.read_timeout_ms = 20;
        config.service.host = Some(IpAddr::from([192, 168, 1, 20]));
        config.trace.csv_path = Some(csv.display().to_string());
        config
    }

    #[test]
    fn failed_start_leaves_no_trace_exporter() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("trace.csv");
        // held without address reuse, so the session cannot share the port
        let squatter = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = squatter.local_addr().unwrap().port();

        assert!(Session::start(&config_on(port, &csv), None).is_err());
        thread::sleep(Duration::from_millis(100));
        assert!(!csv.exists());
    }

    #[test]
    fn trace_file_is_written_for_a_started_session() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("trace.csv");

        let session = Session::start(&config_on(0, &csv), None).unwrap();
        session.shutdown();
        assert!(csv.exists());
    }
}
