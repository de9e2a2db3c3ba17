//! mock_service.rs
//! Stand-in for a sensor service, for development without the hardware.
//!
//! - announces itself with Discovery broadcasts to a target address
//! - answers `register` / `unregister` with an operation result
//! - streams a scripted pointer sequence to registered clients, one frame
//!   per period (SpinSleeper paced, small cursor jitter)

use parking_lot::Mutex;
use rand::random_range;
use spin_sleep::{SpinSleeper, SpinStrategy};
use std::{
    io,
    net::{SocketAddr, UdpSocket},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use log::{debug, info, warn};

use crate::advanced::gesture_script::GestureScript;
use crate::protocol::{
    codec::{
        encode_discovery, encode_operation, encode_pointer, DiscoveryMessage, LicenseStatus,
        OperationResult, PointerMessage, REGISTER, UNREGISTER,
    },
    socket::{bind_client_socket, Outbound},
};

#[derive(Debug, Clone)]
pub struct MockServiceConfig {
    pub bind: SocketAddr,
    /// Where Discovery announcements go (broadcast or a single client).
    pub announce_to: SocketAddr,
    pub hostname: String,
    pub license: LicenseStatus,
    pub frame_period: Duration,
    pub announce_every: Duration,
    /// Max cursor offset added to x and y, 0 disables.
    pub jitter: f64,
    /// Restart the script once it ran out.
    pub repeat: bool,
}

impl Default for MockServiceConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], crate::utils::config::DEFAULT_GESTURE_PORT)),
            announce_to: SocketAddr::from(([255, 255, 255, 255], crate::utils::config::DEFAULT_DISCOVERY_PORT)),
            hostname: "mock-sensor".into(),
            license: LicenseStatus::Demo,
            frame_period: Duration::from_millis(20),
            announce_every: Duration::from_secs(2),
            jitter: 0.002,
            repeat: false,
        }
    }
}

pub struct MockService {
    config: MockServiceConfig,
    socket: Arc<UdpSocket>,
    clients: Arc<Mutex<Vec<SocketAddr>>>,
}

pub struct MockHandle {
    running: Arc<AtomicBool>,
    clients: Arc<Mutex<Vec<SocketAddr>>>,
    frames_sent: Arc<AtomicUsize>,
    local_addr: SocketAddr,
    handles: Vec<JoinHandle<()>>,
}

impl MockHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn clients(&self) -> Vec<SocketAddr> {
        self.clients.lock().clone()
    }

    pub fn frames_sent(&self) -> usize {
        self.frames_sent.load(Ordering::Relaxed)
    }

    pub fn stop(mut self) {
        self.running.store(false, Ordering::Relaxed);
        for h in self.handles.drain(..) {
            let _ = h.join();
        }
        info!("[MockService] Stopped");
    }
}

impl MockService {
    pub fn bind(config: MockServiceConfig) -> io::Result<Self> {
        let socket = Arc::new(bind_client_socket(config.bind, Duration::from_millis(100))?);
        Ok(Self {
            config,
            socket,
            clients: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn spawn(self, script: GestureScript) -> io::Result<MockHandle> {
        let local_addr = self.socket.local_addr()?;
        let running = Arc::new(AtomicBool::new(true));
        let frames_sent = Arc::new(AtomicUsize::new(0));

        let responder = {
            let socket = self.socket.clone();
            let clients = self.clients.clone();
            let running = running.clone();
            thread::Builder::new()
                .name("mock-responder".into())
                .spawn(move || respond(&socket, &clients, &running))?
        };

        let streamer = {
            let ctx = Streamer {
                config: self.config.clone(),
                socket: self.socket.clone(),
                clients: self.clients.clone(),
                running: running.clone(),
                frames_sent: frames_sent.clone(),
                local_port: local_addr.port(),
            };
            thread::Builder::new()
                .name("mock-streamer".into())
                .spawn(move || ctx.run(script))?
        };

        info!(
            "[MockService] '{}' on {}, announcing to {}",
            self.config.hostname, local_addr, self.config.announce_to
        );

        Ok(MockHandle {
            running,
            clients: self.clients,
            frames_sent,
            local_addr,
            handles: vec![responder, streamer],
        })
    }
}

/// Handles registration requests until stopped.
fn respond(socket: &UdpSocket, clients: &Mutex<Vec<SocketAddr>>, running: &AtomicBool) {
    let mut buf = [0u8; 512];
    while running.load(Ordering::Relaxed) {
        let (n, from) = match socket.recv_from(&mut buf) {
            Ok(r) => r,
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => continue,
            Err(e) => {
                warn!("[MockService] recv failed: {}", e);
                continue;
            }
        };

        let op = match &buf[..n] {
            p if p == REGISTER => {
                let mut list = clients.lock();
                if !list.contains(&from) {
                    info!("[MockService] Client {} registered", from);
                    list.push(from);
                }
                "register"
            }
            p if p == UNREGISTER => {
                clients.lock().retain(|c| *c != from);
                info!("[MockService] Client {} unregistered", from);
                "unregister"
            }
            other => {
                debug!("[MockService] Ignoring {} bytes from {}", other.len(), from);
                continue;
            }
        };

        let reply = encode_operation(&OperationResult { op: op.into(), success: true });
        socket.send_datagram(&reply, from).ok();
    }
}

struct Streamer {
    config: MockServiceConfig,
    socket: Arc<UdpSocket>,
    clients: Arc<Mutex<Vec<SocketAddr>>>,
    running: Arc<AtomicBool>,
    frames_sent: Arc<AtomicUsize>,
    local_port: u16,
}

impl Streamer {
    fn run(&self, script: GestureScript) {
        let period = self.config.frame_period;
        let sleeper = SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread);

        let announcement = encode_discovery(&DiscoveryMessage {
            hostname: self.config.hostname.clone(),
            services: vec![format!("udp:{}", self.local_port)],
        });

        let mut next_deadline = Instant::now();
        let mut next_announce = Instant::now();
        let mut cursor = 0usize;

        while self.running.load(Ordering::Relaxed) {
            let now = Instant::now();
            if now < next_deadline {
                sleeper.sleep(next_deadline - now);
            }
            next_deadline += period;

            if Instant::now() >= next_announce {
                if let Err(e) = self.socket.send_datagram(&announcement, self.config.announce_to) {
                    debug!("[MockService] Announcement failed: {}", e);
                }
                next_announce += self.config.announce_every;
            }

            let clients = self.clients.lock().clone();
            // the script only advances while somebody listens
            if clients.is_empty() {
                continue;
            }
            if cursor >= script.len() {
                if !self.config.repeat || script.is_empty() {
                    continue;
                }
                cursor = 0;
            }

            let mut sample = script.frames()[cursor].clone();
            cursor += 1;
            if self.config.jitter > 0.0 {
                let j = self.config.jitter;
                sample.x += random_range(-j..j);
                sample.y += random_range(-j..j);
            }

            let frame = encode_pointer(&PointerMessage {
                license: self.config.license.clone(),
                sample,
            });
            for client in clients {
                if self.socket.send_datagram(&frame, client).is_ok() {
                    self.frames_sent.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }
}
