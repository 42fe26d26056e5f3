//! Engine.IO v4 / Socket.IO v5 text packets, websocket transport only.
//!
//! An Engine.IO packet is a one-digit type followed by its payload. Socket.IO
//! packets ride inside Engine.IO `message` packets (type `4`) and carry their
//! own one-digit type, an optional `/namespace,` prefix and a JSON body.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_NAMESPACE: &str = "/";

const ENGINE_OPEN: char = '0';
const ENGINE_CLOSE: char = '1';
const ENGINE_PING: char = '2';
const ENGINE_PONG: char = '3';
const ENGINE_MESSAGE: char = '4';
const ENGINE_NOOP: char = '6';

const SOCKET_CONNECT: char = '0';
const SOCKET_DISCONNECT: char = '1';
const SOCKET_EVENT: char = '2';
const SOCKET_CONNECT_ERROR: char = '4';

/// Payload of the Engine.IO open packet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInfo {
    pub sid: String,
    #[serde(default)]
    pub ping_interval: u64,
    #[serde(default)]
    pub ping_timeout: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(OpenInfo),
    Close,
    Ping,
    Pong,
    Noop,
    Connect { namespace: String, data: Option<Value> },
    Disconnect { namespace: String },
    ConnectError { namespace: String, message: String },
    Event { namespace: String, name: String, data: Value },
    Unknown(String),
}

pub fn ping() -> String {
    ENGINE_PING.to_string()
}

pub fn pong() -> String {
    ENGINE_PONG.to_string()
}

pub fn open(info: &OpenInfo) -> Result<String, serde_json::Error> {
    Ok(format!("{}{}", ENGINE_OPEN, serde_json::to_string(info)?))
}

pub fn connect(namespace: &str) -> String {
    format!("{}{}{}", ENGINE_MESSAGE, SOCKET_CONNECT, namespace_prefix(namespace))
}

pub fn connect_ack(namespace: &str, sid: &str) -> String {
    format!(
        "{}{}{}{}",
        ENGINE_MESSAGE,
        SOCKET_CONNECT,
        namespace_prefix(namespace),
        serde_json::json!({ "sid": sid })
    )
}

pub fn disconnect(namespace: &str) -> String {
    format!("{}{}{}", ENGINE_MESSAGE, SOCKET_DISCONNECT, namespace_prefix(namespace))
}

/// `42["name",payload]`, namespace-prefixed when not the default one
pub fn event<T: Serialize + ?Sized>(
    namespace: &str,
    name: &str,
    payload: &T,
) -> Result<String, serde_json::Error> {
    Ok(format!(
        "{}{}{}{}",
        ENGINE_MESSAGE,
        SOCKET_EVENT,
        namespace_prefix(namespace),
        serde_json::to_string(&(name, payload))?
    ))
}

fn namespace_prefix(namespace: &str) -> String {
    if namespace == DEFAULT_NAMESPACE || namespace.is_empty() {
        String::new()
    } else {
        format!("{},", namespace)
    }
}

pub fn decode(text: &str) -> Packet {
    let mut chars = text.chars();
    let kind = chars.next();
    let body = chars.as_str();

    match kind {
        Some(ENGINE_OPEN) => serde_json::from_str(body)
            .map(Packet::Open)
            .unwrap_or_else(|_| Packet::Unknown(text.to_string())),
        Some(ENGINE_CLOSE) => Packet::Close,
        Some(ENGINE_PING) => Packet::Ping,
        Some(ENGINE_PONG) => Packet::Pong,
        Some(ENGINE_NOOP) => Packet::Noop,
        Some(ENGINE_MESSAGE) => decode_message(body).unwrap_or_else(|| Packet::Unknown(text.to_string())),
        _ => Packet::Unknown(text.to_string()),
    }
}

fn decode_message(body: &str) -> Option<Packet> {
    let mut chars = body.chars();
    let kind = chars.next()?;
    let (namespace, data) = split_namespace(chars.as_str());

    match kind {
        SOCKET_CONNECT => {
            let data = if data.is_empty() {
                None
            } else {
                Some(serde_json::from_str(data).ok()?)
            };
            Some(Packet::Connect { namespace, data })
        }
        SOCKET_DISCONNECT => Some(Packet::Disconnect { namespace }),
        SOCKET_EVENT => {
            // Optional ack id precedes the array
            let data = data.trim_start_matches(|c: char| c.is_ascii_digit());
            let mut args: Vec<Value> = serde_json::from_str(data).ok()?;
            if args.is_empty() {
                return None;
            }
            let name = args.remove(0).as_str()?.to_string();
            let data = args.into_iter().next().unwrap_or(Value::Null);
            Some(Packet::Event { namespace, name, data })
        }
        SOCKET_CONNECT_ERROR => {
            let message = match serde_json::from_str::<Value>(data) {
                Ok(Value::Object(object)) => object
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| data.to_string()),
                Ok(Value::String(message)) => message,
                _ => data.to_string(),
            };
            Some(Packet::ConnectError { namespace, message })
        }
        _ => None,
    }
}

fn split_namespace(rest: &str) -> (String, &str) {
    if !rest.starts_with('/') {
        return (DEFAULT_NAMESPACE.to_string(), rest);
    }
    match rest.find(',') {
        Some(idx) => (rest[..idx].to_string(), &rest[idx + 1..]),
        None => (rest.to_string(), ""),
    }
}
