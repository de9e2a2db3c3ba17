//! Kodi backend against a minimal JSON-RPC server on a local TcpListener.

use parking_lot::Mutex;
use serde_json::{json, Value};
use std::{
    io::{Read, Write},
    net::{TcpListener, TcpStream},
    sync::Arc,
    thread,
    time::Duration,
};

use airpointr_client::control::{
    events::ControlEvent,
    kodi::KodiBackend,
    sink::{Applied, CommandSink, MediaBackend, PlaybackState},
};
use airpointr_client::utils::error::ClientError;

#[derive(Default)]
struct FakeKodi {
    volume: i64,
    /// `None` = no active player.
    speed: Option<f64>,
    /// Required `Authorization` header value; `None` accepts anyone.
    auth: Option<&'static str>,
    requests: Vec<(String, Value)>,
    rejected: usize,
}

/// Returns the `Authorization` header (if any) and the JSON body.
fn read_request(stream: &mut TcpStream) -> (Option<String>, Value) {
    let mut raw = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let n = stream.read(&mut buf).unwrap();
        raw.extend_from_slice(&buf[..n]);
        if let Some(split) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&raw[..split]).to_string();
            let header = |name: &str| {
                head.lines().find_map(|l| {
                    let (k, v) = l.split_once(':')?;
                    k.trim().eq_ignore_ascii_case(name).then(|| v.trim().to_string())
                })
            };
            let len: usize = header("content-length").map(|v| v.parse().unwrap()).unwrap_or(0);
            let auth = header("authorization");
            while raw.len() < split + 4 + len {
                let n = stream.read(&mut buf).unwrap();
                raw.extend_from_slice(&buf[..n]);
            }
            return (auth, serde_json::from_slice(&raw[split + 4..split + 4 + len]).unwrap());
        }
        assert!(n > 0, "client closed before sending a request");
    }
}

fn answer(kodi: &mut FakeKodi, method: &str, params: &Value) -> Value {
    match method {
        "Application.GetProperties" => json!({ "volume": kodi.volume }),
        "Application.SetVolume" => {
            kodi.volume = params["volume"].as_i64().unwrap();
            json!(kodi.volume)
        }
        "Player.GetActivePlayers" => match kodi.speed {
            Some(_) => json!([{ "playerid": 1, "type": "audio" }]),
            None => json!([]),
        },
        "Player.GetProperties" => json!({ "speed": kodi.speed.unwrap_or(0.0) }),
        _ => json!("OK"),
    }
}

fn reply(stream: &mut TcpStream, status: &str, body: &str) {
    let raw = format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    stream.write_all(raw.as_bytes()).unwrap();
}

/// Serves one request per connection until the test process exits.
fn serve(fake: FakeKodi) -> (u16, Arc<Mutex<FakeKodi>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let state = Arc::new(Mutex::new(fake));

    let shared = state.clone();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            let (auth, req) = read_request(&mut stream);

            let required = shared.lock().auth;
            if required.is_some() && auth.as_deref() != required {
                shared.lock().rejected += 1;
                reply(&mut stream, "401 Unauthorized", "");
                continue;
            }

            let method = req["method"].as_str().unwrap().to_string();
            let result = {
                let mut kodi = shared.lock();
                kodi.requests.push((method.clone(), req["params"].clone()));
                answer(&mut kodi, &method, &req["params"])
            };
            let body = json!({ "id": req["id"], "jsonrpc": "2.0", "result": result }).to_string();
            reply(&mut stream, "200 OK", &body);
        }
    });
    (port, state)
}

fn player(volume: i64, speed: Option<f64>) -> FakeKodi {
    FakeKodi { volume, speed, ..FakeKodi::default() }
}

fn methods(state: &Mutex<FakeKodi>) -> Vec<String> {
    state.lock().requests.iter().map(|(m, _)| m.clone()).collect()
}

fn backend(port: u16) -> KodiBackend {
    KodiBackend::new("127.0.0.1", port, None, None, Duration::from_secs(2)).unwrap()
}

#[test]
fn volume_round_trip() {
    let (port, state) = serve(player(42, Some(1.0)));
    let mut kodi = backend(port);
    assert_eq!(kodi.get_volume().unwrap(), 42);
    kodi.set_volume(17).unwrap();
    assert_eq!(state.lock().volume, 17);
    assert_eq!(
        state.lock().requests[1],
        ("Application.SetVolume".to_string(), json!({ "volume": 17 }))
    );
}

#[test]
fn playback_state_follows_player_speed() {
    let (port, state) = serve(player(50, Some(1.0)));
    assert_eq!(backend(port).playback_state().unwrap(), PlaybackState::Playing);

    state.lock().speed = Some(0.0);
    assert_eq!(backend(port).playback_state().unwrap(), PlaybackState::Paused);

    state.lock().speed = None;
    assert_eq!(backend(port).playback_state().unwrap(), PlaybackState::Inactive);
}

#[test]
fn skipping_back_goes_to_previous_twice() {
    let (port, state) = serve(player(50, Some(0.0)));
    let mut sink = CommandSink::new(Box::new(backend(port)));

    // paused: retreat means previous track
    assert_eq!(sink.apply(ControlEvent::TransportRetreat).unwrap(), Applied::Previous);

    let gotos: Vec<Value> = state
        .lock()
        .requests
        .iter()
        .filter(|(m, _)| m == "Player.GoTo")
        .map(|(_, p)| p.clone())
        .collect();
    assert_eq!(gotos, vec![json!({ "playerid": 1, "to": "previous" }); 2]);
}

#[test]
fn volume_delta_goes_through_the_sink() {
    let (port, state) = serve(player(99, Some(1.0)));
    let mut sink = CommandSink::new(Box::new(backend(port)));
    assert_eq!(sink.apply(ControlEvent::VolumeDelta(4)).unwrap(), Applied::Volume(100));
    assert_eq!(methods(&state), vec!["Application.GetProperties", "Application.SetVolume"]);
}

#[test]
fn transport_without_player_is_reported() {
    let (port, _state) = serve(player(50, None));
    let mut kodi = backend(port);
    assert!(matches!(kodi.next(), Err(ClientError::NoActivePlayer)));
}

#[test]
fn refused_connection_is_backend_unavailable() {
    let port = {
        let l = TcpListener::bind("127.0.0.1:0").unwrap();
        l.local_addr().unwrap().port()
    };
    let mut sink = CommandSink::new(Box::new(backend(port)));
    assert!(matches!(sink.probe(), Err(ClientError::BackendUnavailable(_))));
}

#[test]
fn credentials_go_out_as_basic_auth() {
    // base64("kodi:secret")
    let (port, state) = serve(FakeKodi {
        volume: 30,
        speed: Some(1.0),
        auth: Some("Basic a29kaTpzZWNyZXQ="),
        ..FakeKodi::default()
    });

    let mut anonymous = backend(port);
    assert!(matches!(anonymous.get_volume(), Err(ClientError::Backend(m)) if m.contains("401")));
    assert_eq!(state.lock().rejected, 1);

    let mut kodi = KodiBackend::new("127.0.0.1", port, Some("kodi".into()), Some("secret".into()), Duration::from_secs(2)).unwrap();
    assert_eq!(kodi.get_volume().unwrap(), 30);
    assert_eq!(CommandSink::new(Box::new(kodi)).probe().unwrap(), PlaybackState::Playing);
    assert_eq!(state.lock().rejected, 1);
}
