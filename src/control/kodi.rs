//! kodi.rs
//! Kodi media center over JSON-RPC 2.0 (HTTP POST /jsonrpc).
//!
//! Every call is bounded by the configured timeout, so a hung Kodi never
//! stalls the receive loop for long.
//! Requires "Allow remote control via HTTP" in Kodi's webserver settings.

use reqwest::blocking::Client;
use serde_json::{json, Value};
use std::time::Duration;
use log::debug;

use crate::control::sink::{MediaBackend, PlaybackState};
use crate::utils::error::{ClientError, Result};

/// Kodi's stock webserver user.
pub const DEFAULT_USER: &str = "kodi";

pub struct KodiBackend {
    client: Client,
    url: String,
    /// HTTP basic auth, username and password.
    auth: Option<(String, String)>,
    next_id: u64,
}

impl KodiBackend {
    /// Credentials apply when either part is set; a bare password goes with
    /// the stock `kodi` user.
    pub fn new(
        host: &str,
        port: u16,
        username: Option<String>,
        password: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .no_proxy()
            .build()
            .map_err(|e| ClientError::BackendUnavailable(format!("http client init failed: {}", e)))?;

        let auth = match (username, password) {
            (None, None) => None,
            (user, pass) => Some((
                user.unwrap_or_else(|| DEFAULT_USER.to_string()),
                pass.unwrap_or_default(),
            )),
        };

        Ok(Self {
            client,
            url: format!("http://{}:{}/jsonrpc", host, port),
            auth,
            next_id: 1,
        })
    }

    /// One JSON-RPC round trip; returns the `result` member.
    pub fn call(&mut self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id;
        self.next_id += 1;

        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id,
        });

        let mut request = self.client.post(self.url.as_str()).json(&body);
        if let Some((user, pass)) = &self.auth {
            request = request.basic_auth(user, Some(pass));
        }

        let reply = request
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json::<Value>())
            .map_err(|e| self.http_error(e))?;

        debug!("[Kodi] {} -> {}", method, reply);
        rpc_result(reply)
    }

    fn http_error(&self, e: reqwest::Error) -> ClientError {
        if let Some(status) = e.status() {
            ClientError::Backend(format!("kodi answered HTTP {}", status))
        } else if e.is_decode() {
            ClientError::Backend(format!("invalid JSON-RPC body: {}", e))
        } else {
            ClientError::BackendUnavailable(format!("kodi at {}: {}", self.url, e))
        }
    }

    fn active_player(&mut self) -> Result<Option<i64>> {
        let players = self.call("Player.GetActivePlayers", json!({}))?;
        Ok(players
            .as_array()
            .and_then(|a| a.first())
            .and_then(|p| p.get("playerid"))
            .and_then(Value::as_i64))
    }

    fn require_player(&mut self) -> Result<i64> {
        self.active_player()?.ok_or(ClientError::NoActivePlayer)
    }

    fn goto(&mut self, to: &str) -> Result<()> {
        let playerid = self.require_player()?;
        self.call("Player.GoTo", json!({ "playerid": playerid, "to": to }))?;
        Ok(())
    }

    fn play_pause(&mut self, play: bool) -> Result<()> {
        let playerid = self.require_player()?;
        self.call("Player.PlayPause", json!({ "playerid": playerid, "play": play }))?;
        Ok(())
    }
}

impl MediaBackend for KodiBackend {
    fn name(&self) -> &'static str {
        "kodi"
    }

    fn get_volume(&mut self) -> Result<i32> {
        let res = self.call("Application.GetProperties", json!({ "properties": ["volume"] }))?;
        res.get("volume")
            .and_then(Value::as_i64)
            .map(|v| v as i32)
            .ok_or_else(|| ClientError::Backend(format!("no volume in {}", res)))
    }

    fn set_volume(&mut self, volume: i32) -> Result<()> {
        self.call("Application.SetVolume", json!({ "volume": volume }))?;
        Ok(())
    }

    fn playback_state(&mut self) -> Result<PlaybackState> {
        let Some(playerid) = self.active_player()? else {
            return Ok(PlaybackState::Inactive);
        };
        let props = self.call(
            "Player.GetProperties",
            json!({ "playerid": playerid, "properties": ["speed"] }),
        )?;
        let speed = props.get("speed").and_then(Value::as_f64).unwrap_or(0.0);
        Ok(if speed != 0.0 { PlaybackState::Playing } else { PlaybackState::Paused })
    }

    fn next(&mut self) -> Result<()> {
        self.goto("next")
    }

    /// The first `previous` only rewinds to the start of the current item.
    fn previous(&mut self) -> Result<()> {
        self.goto("previous")?;
        self.goto("previous")
    }

    fn play(&mut self) -> Result<()> {
        self.play_pause(true)
    }

    fn pause(&mut self) -> Result<()> {
        self.play_pause(false)
    }

    fn stop(&mut self) -> Result<()> {
        let playerid = self.require_player()?;
        self.call("Player.Stop", json!({ "playerid": playerid }))?;
        Ok(())
    }
}

/// Extracts the `result` member of a JSON-RPC reply.
pub fn rpc_result(body: Value) -> Result<Value> {
    if let Some(err) = body.get("error") {
        return Err(ClientError::Backend(format!("JSON-RPC error: {}", err)));
    }
    match body {
        Value::Object(mut members) => members
            .remove("result")
            .ok_or_else(|| ClientError::Backend("JSON-RPC reply without result".into())),
        other => Err(ClientError::Backend(format!("JSON-RPC reply is not an object: {}", other))),
    }
}
