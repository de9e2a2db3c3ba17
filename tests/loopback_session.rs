//! End-to-end over loopback UDP: a running Session against the mock sensor
//! service, with an in-memory media player.

use parking_lot::Mutex;
use std::{
    net::{SocketAddr, UdpSocket},
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use airpointr_client::advanced::{
    gesture_script::GestureScript,
    mock_service::{MockHandle, MockService, MockServiceConfig},
};
use airpointr_client::control::sink::{CommandSink, MediaBackend, PlaybackState};
use airpointr_client::protocol::codec::LicenseStatus;
use airpointr_client::session::Session;
use airpointr_client::utils::{config::Config, error::Result};

#[derive(Debug, Default)]
struct Player {
    volume: i32,
    stopped: bool,
    commands: Vec<&'static str>,
}

#[derive(Clone)]
struct SharedPlayer(Arc<Mutex<Player>>);

impl MediaBackend for SharedPlayer {
    fn name(&self) -> &'static str {
        "test-player"
    }
    fn get_volume(&mut self) -> Result<i32> {
        Ok(self.0.lock().volume)
    }
    fn set_volume(&mut self, volume: i32) -> Result<()> {
        let mut p = self.0.lock();
        p.volume = volume;
        p.commands.push("setvol");
        Ok(())
    }
    fn playback_state(&mut self) -> Result<PlaybackState> {
        Ok(if self.0.lock().stopped { PlaybackState::Paused } else { PlaybackState::Playing })
    }
    fn next(&mut self) -> Result<()> {
        self.0.lock().commands.push("next");
        Ok(())
    }
    fn previous(&mut self) -> Result<()> {
        self.0.lock().commands.push("previous");
        Ok(())
    }
    fn play(&mut self) -> Result<()> {
        self.0.lock().commands.push("play");
        Ok(())
    }
    fn pause(&mut self) -> Result<()> {
        self.0.lock().commands.push("pause");
        Ok(())
    }
    fn stop(&mut self) -> Result<()> {
        let mut p = self.0.lock();
        p.stopped = true;
        p.commands.push("stop");
        Ok(())
    }
}

fn start_mock(license: LicenseStatus, script: GestureScript) -> (MockHandle, UdpSocket) {
    // announcements are not needed: the loopback service is seeded at startup
    let announce_sink = UdpSocket::bind("127.0.0.1:0").unwrap();
    let config = MockServiceConfig {
        bind: "127.0.0.1:0".parse().unwrap(),
        announce_to: announce_sink.local_addr().unwrap(),
        license,
        frame_period: Duration::from_millis(10),
        jitter: 0.001,
        ..MockServiceConfig::default()
    };
    let handle = MockService::bind(config).unwrap().spawn(script).unwrap();
    (handle, announce_sink)
}

fn client_config(gesture_port: u16) -> Config {
    Config::from_toml(&format!(
        r#"
        [network]
        bind_address = "127.0.0.1"
        discovery_port = 0
        gesture_port = {}
        read_timeout_ms = 50

        [service]
        host = "127.0.0.1"
        "#,
        gesture_port
    ))
    .unwrap()
}

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    cond()
}

#[test]
fn scripted_gestures_reach_the_player() {
    let script = GestureScript::new().idle(2).circle(0, -1).idle(2).smart(2);
    let (mock, _announce) = start_mock(LicenseStatus::Licensed, script);

    let player = SharedPlayer(Arc::new(Mutex::new(Player { volume: 50, ..Player::default() })));
    let sink = CommandSink::new(Box::new(player.clone()));
    let session = Session::start(&client_config(mock.local_addr().port()), Some(sink)).unwrap();

    assert!(
        wait_until(Duration::from_secs(5), || player.0.lock().commands.contains(&"stop")),
        "player saw {:?}",
        player.0.lock().commands
    );
    {
        let p = player.0.lock();
        assert_eq!(p.volume, 48);
        assert_eq!(p.commands, vec!["setvol", "stop"]);
    }

    let service: SocketAddr = SocketAddr::new("127.0.0.1".parse().unwrap(), mock.local_addr().port());
    let rec = session.registry().lock().get(service).cloned().unwrap();
    assert!(rec.active);
    assert_eq!(rec.license, LicenseStatus::Licensed);

    let client = session.local_addr();
    assert!(mock.clients().contains(&client));

    session.shutdown();
    assert!(wait_until(Duration::from_secs(2), || !mock.clients().contains(&client)));
    mock.stop();
}

#[test]
fn expired_license_never_drives_the_player() {
    let script = GestureScript::new().circle(0, 3).smart(0);
    let (mock, _announce) = start_mock(LicenseStatus::Invalid("expired".into()), script);

    let player = SharedPlayer(Arc::new(Mutex::new(Player { volume: 50, ..Player::default() })));
    let sink = CommandSink::new(Box::new(player.clone()));
    let session = Session::start(&client_config(mock.local_addr().port()), Some(sink)).unwrap();

    assert!(wait_until(Duration::from_secs(5), || mock.frames_sent() >= 6));
    thread::sleep(Duration::from_millis(100));

    assert!(player.0.lock().commands.is_empty());
    assert_eq!(player.0.lock().volume, 50);

    let service = SocketAddr::new("127.0.0.1".parse().unwrap(), mock.local_addr().port());
    let rec = session.registry().lock().get(service).cloned().unwrap();
    assert!(rec.active);
    assert_eq!(rec.license, LicenseStatus::Invalid("expired".into()));

    session.shutdown();
    mock.stop();
}

#[test]
fn monitor_mode_registers_without_a_backend() {
    let (mock, _announce) = start_mock(LicenseStatus::Demo, GestureScript::new().idle(5));
    let session = Session::start(&client_config(mock.local_addr().port()), None).unwrap();

    assert!(wait_until(Duration::from_secs(5), || mock.frames_sent() >= 5));
    assert!(wait_until(Duration::from_secs(2), || {
        session.recorder().counters.packets.load(std::sync::atomic::Ordering::Relaxed) >= 5
    }));

    session.shutdown();
    mock.stop();
}
