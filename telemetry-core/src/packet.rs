// Engine.IO v4 / Socket.IO v5 text frame codec used on both relay hops.
// Invariants: text frames only; packets for namespaces other than "/" and acks decode to Noop.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PacketError {
    #[error("empty frame")]
    Empty,
    #[error("unknown engine packet type {0:?}")]
    UnknownEngineType(char),
    #[error("unknown socket packet type {0:?}")]
    UnknownSocketType(char),
    #[error("binary attachments are not supported")]
    Binary,
    #[error("event frame without a name")]
    MalformedEvent,
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
    pub ping_timeout: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Packet {
    Open(OpenHandshake),
    Close,
    Ping(String),
    Pong(String),
    Noop,
    Connect(Option<Value>),
    Disconnect,
    Event { name: String, data: Value },
    ConnectError(Value),
}

impl Packet {
    pub fn event(name: impl Into<String>, data: Value) -> Self {
        Packet::Event {
            name: name.into(),
            data,
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Packet::Open(handshake) => format!(
                "0{}",
                serde_json::to_value(handshake).unwrap_or(Value::Null)
            ),
            Packet::Close => "1".to_string(),
            Packet::Ping(payload) => format!("2{payload}"),
            Packet::Pong(payload) => format!("3{payload}"),
            Packet::Noop => "6".to_string(),
            Packet::Connect(None) => "40".to_string(),
            Packet::Connect(Some(auth)) => format!("40{auth}"),
            Packet::Disconnect => "41".to_string(),
            Packet::Event { name, data } => {
                let args = Value::Array(vec![Value::String(name.clone()), data.clone()]);
                format!("42{args}")
            }
            Packet::ConnectError(data) => format!("44{data}"),
        }
    }
}

pub fn decode(frame: &str) -> Result<Packet, PacketError> {
    let mut chars = frame.chars();
    let kind = chars.next().ok_or(PacketError::Empty)?;
    let rest = chars.as_str();
    match kind {
        '0' => Ok(Packet::Open(serde_json::from_str(rest)?)),
        '1' => Ok(Packet::Close),
        '2' => Ok(Packet::Ping(rest.to_string())),
        '3' => Ok(Packet::Pong(rest.to_string())),
        '4' => decode_socket(rest),
        '6' => Ok(Packet::Noop),
        other => Err(PacketError::UnknownEngineType(other)),
    }
}

fn decode_socket(frame: &str) -> Result<Packet, PacketError> {
    let mut chars = frame.chars();
    let kind = chars.next().ok_or(PacketError::Empty)?;
    let mut rest = chars.as_str();

    if rest.starts_with('/') {
        let (namespace, tail) = rest.split_once(',').unwrap_or((rest, ""));
        if namespace != "/" {
            return Ok(Packet::Noop);
        }
        rest = tail;
    }

    match kind {
        '0' if rest.is_empty() => Ok(Packet::Connect(None)),
        '0' => Ok(Packet::Connect(Some(serde_json::from_str(rest)?))),
        '1' => Ok(Packet::Disconnect),
        '2' => decode_event(rest.trim_start_matches(|c: char| c.is_ascii_digit())),
        '3' => Ok(Packet::Noop),
        '4' if rest.is_empty() => Ok(Packet::ConnectError(Value::Null)),
        '4' => Ok(Packet::ConnectError(serde_json::from_str(rest)?)),
        '5' | '6' => Err(PacketError::Binary),
        other => Err(PacketError::UnknownSocketType(other)),
    }
}

fn decode_event(body: &str) -> Result<Packet, PacketError> {
    let args: Vec<Value> = serde_json::from_str(body)?;
    let mut args = args.into_iter();
    let name = match args.next() {
        Some(Value::String(name)) => name,
        _ => return Err(PacketError::MalformedEvent),
    };
    Ok(Packet::Event {
        name,
        data: args.next().unwrap_or(Value::Null),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_open_handshake() {
        let packet = decode(
            r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#,
        )
        .unwrap();
        match packet {
            Packet::Open(handshake) => {
                assert_eq!(handshake.sid, "abc");
                assert_eq!(handshake.ping_interval, 25_000);
                assert_eq!(handshake.ping_timeout, 20_000);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn ping_payload_is_echoed_in_pong() {
        let packet = decode("2probe").unwrap();
        assert_eq!(packet, Packet::Ping("probe".to_string()));
        assert_eq!(Packet::Pong("probe".to_string()).encode(), "3probe");
        assert_eq!(decode("2").unwrap(), Packet::Ping(String::new()));
    }

    #[test]
    fn decodes_connect_ack_and_error() {
        assert_eq!(
            decode(r#"40{"sid":"s1"}"#).unwrap(),
            Packet::Connect(Some(json!({ "sid": "s1" })))
        );
        assert_eq!(decode("40").unwrap(), Packet::Connect(None));
        assert_eq!(
            decode(r#"44{"message":"Not authorized"}"#).unwrap(),
            Packet::ConnectError(json!({ "message": "Not authorized" }))
        );
    }

    #[test]
    fn event_with_ack_id_keeps_first_argument() {
        let packet = decode(r#"4217["relay:viewers",{"viewerCount":3,"requestControls":true},"extra"]"#)
            .unwrap();
        assert_eq!(
            packet,
            Packet::event(
                "relay:viewers",
                json!({ "viewerCount": 3, "requestControls": true })
            )
        );
    }

    #[test]
    fn event_encodes_as_json_array() {
        let packet = Packet::event("relay:register", json!({ "sessionId": "s-1" }));
        let frame = packet.encode();
        assert_eq!(frame, r#"42["relay:register",{"sessionId":"s-1"}]"#);
        assert_eq!(decode(&frame).unwrap(), packet);
    }

    #[test]
    fn event_without_payload_has_null_data() {
        assert_eq!(
            decode(r#"42["status"]"#).unwrap(),
            Packet::event("status", Value::Null)
        );
    }

    #[test]
    fn foreign_namespace_and_acks_are_ignored() {
        assert_eq!(decode(r#"42/admin,["x",1]"#).unwrap(), Packet::Noop);
        assert_eq!(decode("433[]").unwrap(), Packet::Noop);
        assert_eq!(
            decode(r#"42/,["telemetry",{}]"#).unwrap(),
            Packet::event("telemetry", json!({}))
        );
    }

    #[test]
    fn rejects_malformed_frames() {
        assert!(matches!(decode(""), Err(PacketError::Empty)));
        assert!(matches!(decode("9"), Err(PacketError::UnknownEngineType('9'))));
        assert!(matches!(decode("42[1,2]"), Err(PacketError::MalformedEvent)));
        assert!(matches!(decode("42{not json"), Err(PacketError::Json(_))));
        assert!(matches!(decode(r#"451-["x",{}]"#), Err(PacketError::Binary)));
    }
}
