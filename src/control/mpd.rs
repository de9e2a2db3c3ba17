//! mpd.rs
//! Music Player Daemon over its persistent TCP line protocol.
//!
//! - Greeting `OK MPD <version>`, optional `password`.
//! - Every command answers with `key: value` lines closed by `OK` or `ACK ...`.
//! - A broken connection is dropped; the next command reconnects. The failed
//!   command itself is not replayed.

use std::{
    io::{BufRead, BufReader, Write},
    net::{SocketAddr, TcpStream, ToSocketAddrs},
    time::Duration,
};
use log::{debug, info, warn};

use crate::control::sink::{MediaBackend, PlaybackState};
use crate::utils::error::{ClientError, Result};

struct Connection {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

pub struct MpdBackend {
    addr: SocketAddr,
    password: Option<String>,
    timeout: Duration,
    conn: Option<Connection>,
}

impl MpdBackend {
    pub fn new(host: &str, port: u16, password: Option<String>, timeout: Duration) -> Result<Self> {
        let addr = (host, port)
            .to_socket_addrs()
            .map_err(|e| ClientError::BackendUnavailable(format!("cannot resolve {}: {}", host, e)))?
            .next()
            .ok_or_else(|| ClientError::BackendUnavailable(format!("no address for {}", host)))?;

        Ok(Self { addr, password, timeout, conn: None })
    }

    fn connect(&self) -> Result<Connection> {
        let unavailable = |e: std::io::Error| {
            ClientError::BackendUnavailable(format!("mpd at {}: {}", self.addr, e))
        };

        let stream = TcpStream::connect_timeout(&self.addr, self.timeout).map_err(unavailable)?;
        stream.set_read_timeout(Some(self.timeout)).map_err(unavailable)?;
        stream.set_write_timeout(Some(self.timeout)).map_err(unavailable)?;
        let writer = stream.try_clone().map_err(unavailable)?;
        let mut conn = Connection { reader: BufReader::new(stream), writer };

        let mut greeting = String::new();
        conn.reader.read_line(&mut greeting).map_err(unavailable)?;
        if !greeting.starts_with("OK MPD") {
            return Err(ClientError::BackendUnavailable(format!(
                "unexpected greeting '{}'",
                greeting.trim_end()
            )));
        }
        info!("[Mpd] Connected to {} ({})", self.addr, greeting.trim_end());

        if let Some(pw) = &self.password {
            writeln!(conn.writer, "password {}", quote(pw)).map_err(unavailable)?;
            read_response(&mut conn.reader)?;
        }
        Ok(conn)
    }

    /// Sends one command and collects its `key: value` pairs.
    pub fn command(&mut self, line: &str) -> Result<Vec<(String, String)>> {
        if self.conn.is_none() {
            self.conn = Some(self.connect()?);
        }
        let Some(conn) = self.conn.as_mut() else {
            return Err(ClientError::BackendUnavailable("mpd not connected".into()));
        };

        let result = writeln!(conn.writer, "{}", line)
            .map_err(ClientError::from)
            .and_then(|_| read_response(&mut conn.reader));

        match result {
            // ACK leaves the connection usable
            Err(ClientError::Backend(msg)) => Err(ClientError::Backend(msg)),
            Err(e) => {
                warn!("[Mpd] Connection lost during '{}': {}", line, e);
                self.conn = None;
                Err(ClientError::BackendUnavailable(e.to_string()))
            }
            ok => ok,
        }
    }

    fn status(&mut self) -> Result<Vec<(String, String)>> {
        self.command("status")
    }
}

/// Reads response lines up to `OK`; `ACK` turns into a backend error.
pub fn read_response<R: BufRead>(reader: &mut R) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Err(ClientError::Transport(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "mpd closed the connection",
            )));
        }
        let line = line.trim_end();
        if line == "OK" {
            return Ok(pairs);
        }
        if let Some(ack) = line.strip_prefix("ACK ") {
            return Err(ClientError::Backend(ack.to_string()));
        }
        match line.split_once(": ") {
            Some((k, v)) => pairs.push((k.to_string(), v.to_string())),
            None => debug!("[Mpd] Unparsed line '{}'", line),
        }
    }
}

fn lookup<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

fn quote(arg: &str) -> String {
    format!("\"{}\"", arg.replace('\\', "\\\\").replace('"', "\\\""))
}

impl MediaBackend for MpdBackend {
    fn name(&self) -> &'static str {
        "mpd"
    }

    fn get_volume(&mut self) -> Result<i32> {
        let status = self.status()?;
        let volume = lookup(&status, "volume")
            .and_then(|v| v.parse::<i32>().ok())
            .ok_or_else(|| ClientError::Backend("status carries no volume".into()))?;
        if volume < 0 {
            return Err(ClientError::Backend("mpd has no mixer (volume -1)".into()));
        }
        Ok(volume)
    }

    fn set_volume(&mut self, volume: i32) -> Result<()> {
        self.command(&format!("setvol {}", volume)).map(|_| ())
    }

    /// `stop` counts as paused: `play` resumes from either.
    fn playback_state(&mut self) -> Result<PlaybackState> {
        let status = self.status()?;
        Ok(match lookup(&status, "state") {
            Some("play") => PlaybackState::Playing,
            Some("pause") | Some("stop") => PlaybackState::Paused,
            _ => PlaybackState::Inactive,
        })
    }

    fn next(&mut self) -> Result<()> {
        self.command("next").map(|_| ())
    }

    fn previous(&mut self) -> Result<()> {
        self.command("previous").map(|_| ())
    }

    fn play(&mut self) -> Result<()> {
        self.command("play").map(|_| ())
    }

    fn pause(&mut self) -> Result<()> {
        self.command("pause 1").map(|_| ())
    }

    fn stop(&mut self) -> Result<()> {
        self.command("stop").map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn collects_pairs_until_ok() {
        let mut r = Cursor::new("volume: 37\nstate: pause\nsong: 4\nOK\nvolume: 1\n");
        let pairs = read_response(&mut r).unwrap();
        assert_eq!(lookup(&pairs, "volume"), Some("37"));
        assert_eq!(lookup(&pairs, "state"), Some("pause"));
        assert_eq!(pairs.len(), 3);
    }

    #[test]
    fn ack_is_backend_error() {
        let mut r = Cursor::new("ACK [3@0] {password} incorrect password\n");
        assert!(matches!(read_response(&mut r), Err(ClientError::Backend(m)) if m.contains("incorrect password")));
    }

    #[test]
    fn eof_is_transport_error() {
        let mut r = Cursor::new("volume: 10\n");
        assert!(matches!(read_response(&mut r), Err(ClientError::Transport(_))));
    }

    #[test]
    fn password_is_quoted() {
        assert_eq!(quote(r#"a"b\c"#), r#""a\"b\\c""#);
    }
}
