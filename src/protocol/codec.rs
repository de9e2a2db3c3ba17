//! codec.rs
//! Wire codec for the sensor service's UDP payloads.
//!
//! A datagram is a JSON object. `type` selects Discovery or Pointer, and an
//! `op` key additionally marks it as an operation result, so a single packet
//! may decode into more than one message.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::utils::error::DecodeError;

/// Outbound keep-alive / registration payload.
pub const REGISTER: &[u8] = b"register";
/// Outbound teardown payload.
pub const UNREGISTER: &[u8] = b"unregister";

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Discovery(DiscoveryMessage),
    Pointer(PointerMessage),
    OperationResult(OperationResult),
}

/// Broadcast announcement of a sensor service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryMessage {
    pub hostname: String,
    /// Entries such as `udp:8981`.
    pub services: Vec<String>,
}

impl DiscoveryMessage {
    /// Port taken from the first `udp:` entry.
    pub fn control_port(&self) -> Option<u16> {
        self.services
            .iter()
            .find_map(|s| s.strip_prefix("udp:"))
            .and_then(|p| p.trim().parse().ok())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LicenseStatus {
    Demo,
    Licensed,
    /// Expired demo or anything the service reports that we do not know.
    Invalid(String),
}

impl LicenseStatus {
    /// Whether pointer data under this status may drive control events.
    pub fn permits_control(&self) -> bool {
        matches!(self, LicenseStatus::Demo | LicenseStatus::Licensed)
    }
}

impl From<String> for LicenseStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "demo" => LicenseStatus::Demo,
            "licensed" => LicenseStatus::Licensed,
            _ => LicenseStatus::Invalid(s),
        }
    }
}

impl From<LicenseStatus> for String {
    fn from(l: LicenseStatus) -> Self {
        l.to_string()
    }
}

impl fmt::Display for LicenseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LicenseStatus::Demo => f.write_str("demo"),
            LicenseStatus::Licensed => f.write_str("licensed"),
            LicenseStatus::Invalid(s) => f.write_str(s),
        }
    }
}

/// Discrete swipe tags carried in `events`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum GestureEvent {
    RightSwipe,
    LeftSwipe,
    Other(String),
}

impl From<String> for GestureEvent {
    fn from(s: String) -> Self {
        match s.as_str() {
            "rwipe" => GestureEvent::RightSwipe,
            "lwipe" => GestureEvent::LeftSwipe,
            _ => GestureEvent::Other(s),
        }
    }
}

impl From<GestureEvent> for String {
    fn from(e: GestureEvent) -> Self {
        match e {
            GestureEvent::RightSwipe => "rwipe".into(),
            GestureEvent::LeftSwipe => "lwipe".into(),
            GestureEvent::Other(s) => s,
        }
    }
}

/// 4-way selector layered on the circle gesture.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmartCircle {
    pub enabled: bool,
    pub action_select: bool,
    pub action_segment: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircleState {
    pub active: bool,
    /// Rotation sense, 0 = none.
    pub direction: i32,
    /// Sector 0..=7 around the circle.
    pub segment: i32,
    pub turns: i32,
    pub smart: SmartCircle,
}

/// One hand-tracking sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GestureSample {
    pub x: f64,
    pub y: f64,
    pub active: bool,
    pub events: Vec<GestureEvent>,
    pub circle: CircleState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointerMessage {
    pub license: LicenseStatus,
    #[serde(flatten)]
    pub sample: GestureSample,
}

/// Reply to a `register` / `unregister` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    pub op: String,
    pub success: bool,
}

/// Decodes one datagram into every message kind it carries.
///
/// An object with neither a known `type` nor an `op` decodes to an empty list.
pub fn decode(raw: &[u8]) -> Result<Vec<Message>, DecodeError> {
    if raw.first() != Some(&b'{') {
        return Err(DecodeError::NotJson);
    }

    let value: Value = serde_json::from_slice(raw).map_err(|e| DecodeError::Malformed {
        kind: "json",
        reason: e.to_string(),
    })?;

    let mut out = Vec::with_capacity(2);

    match value.get("type").and_then(Value::as_str) {
        Some("discovery") => out.push(Message::Discovery(typed(&value, "discovery")?)),
        Some("pointer") => out.push(Message::Pointer(typed(&value, "pointer")?)),
        _ => {}
    }

    if value.get("op").is_some() {
        out.push(Message::OperationResult(typed(&value, "operation")?));
    }

    Ok(out)
}

fn typed<T: for<'de> Deserialize<'de>>(value: &Value, kind: &'static str) -> Result<T, DecodeError> {
    T::deserialize(value).map_err(|e| DecodeError::Malformed {
        kind,
        reason: e.to_string(),
    })
}

/// Encodes a pointer frame the way the service puts it on the wire.
pub fn encode_pointer(msg: &PointerMessage) -> Vec<u8> {
    let mut value = serde_json::to_value(msg).unwrap_or(Value::Null);
    if let Value::Object(map) = &mut value {
        map.insert("type".into(), Value::from("pointer"));
    }
    value.to_string().into_bytes()
}

pub fn encode_discovery(msg: &DiscoveryMessage) -> Vec<u8> {
    let mut value = serde_json::to_value(msg).unwrap_or(Value::Null);
    if let Value::Object(map) = &mut value {
        map.insert("type".into(), Value::from("discovery"));
    }
    value.to_string().into_bytes()
}

pub fn encode_operation(msg: &OperationResult) -> Vec<u8> {
    serde_json::to_vec(msg).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const POINTER: &str = r#"{"type":"pointer","license":"demo","x":0.25,"y":0.75,"active":true,
        "events":["rwipe"],
        "circle":{"active":true,"direction":1,"segment":3,"turns":1,
                  "smart":{"enabled":false,"actionSelect":false,"actionSegment":0}}}"#;

    #[test]
    fn rejects_payload_without_leading_brace() {
        assert!(matches!(decode(b"register"), Err(DecodeError::NotJson)));
        assert!(matches!(decode(b""), Err(DecodeError::NotJson)));
        assert!(matches!(decode(b" {}"), Err(DecodeError::NotJson)));
    }

    #[test]
    fn broken_json_is_malformed() {
        let err = decode(b"{\"type\":").unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { kind: "json", .. }));
    }

    #[test]
    fn decodes_pointer_sample() {
        let msgs = decode(POINTER.as_bytes()).unwrap();
        assert_eq!(msgs.len(), 1);
        let Message::Pointer(p) = &msgs[0] else { panic!("expected pointer") };
        assert_eq!(p.license, LicenseStatus::Demo);
        assert_eq!(p.sample.events, vec![GestureEvent::RightSwipe]);
        assert_eq!(p.sample.circle.segment, 3);
        assert_eq!(p.sample.circle.direction, 1);
        assert!((p.sample.x - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn pointer_missing_circle_is_malformed() {
        let raw = br#"{"type":"pointer","license":"demo","x":0.1,"y":0.2,"active":true,"events":[]}"#;
        let err = decode(raw).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { kind: "pointer", .. }));
    }

    #[test]
    fn discovery_exposes_first_udp_port() {
        let raw = br#"{"type":"discovery","hostname":"raspberrypi3","services":["tcp:9000","udp:8981","udp:9999"],"version":"1.2"}"#;
        let msgs = decode(raw).unwrap();
        let Message::Discovery(d) = &msgs[0] else { panic!("expected discovery") };
        assert_eq!(d.hostname, "raspberrypi3");
        assert_eq!(d.control_port(), Some(8981));
    }

    #[test]
    fn discovery_without_hostname_is_malformed() {
        let err = decode(br#"{"type":"discovery","services":[]}"#).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { kind: "discovery", .. }));
    }

    #[test]
    fn op_co_present_with_type_yields_both_messages() {
        let raw = br#"{"type":"discovery","hostname":"pi","services":["udp:8981"],"op":"register","success":true}"#;
        let msgs = decode(raw).unwrap();
        assert_eq!(msgs.len(), 2);
        assert!(matches!(msgs[0], Message::Discovery(_)));
        assert_eq!(
            msgs[1],
            Message::OperationResult(OperationResult { op: "register".into(), success: true })
        );
    }

    #[test]
    fn op_without_type_is_operation_only() {
        let msgs = decode(br#"{"op":"unregister","success":false}"#).unwrap();
        assert_eq!(msgs.len(), 1);
        assert!(matches!(&msgs[0], Message::OperationResult(r) if !r.success));
    }

    #[test]
    fn unknown_type_decodes_to_nothing() {
        assert!(decode(br#"{"type":"status","uptime":3}"#).unwrap().is_empty());
    }

    #[test]
    fn unknown_license_and_event_tags_are_preserved() {
        let raw = POINTER.replace("\"demo\"", "\"expired\"").replace("rwipe", "push");
        let msgs = decode(raw.as_bytes()).unwrap();
        let Message::Pointer(p) = &msgs[0] else { panic!("expected pointer") };
        assert_eq!(p.license, LicenseStatus::Invalid("expired".into()));
        assert!(!p.license.permits_control());
        assert_eq!(p.sample.events, vec![GestureEvent::Other("push".into())]);
    }

    #[test]
    fn encoded_pointer_is_readable_by_decode() {
        let msgs = decode(POINTER.as_bytes()).unwrap();
        let Message::Pointer(p) = &msgs[0] else { panic!("expected pointer") };
        let wire = encode_pointer(p);
        assert_eq!(wire[0], b'{');
        assert_eq!(decode(&wire).unwrap(), msgs);
    }
}
