//! Turns captured JPEG bytes into text-safe frame payloads.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bytes::Bytes;
use serde::ser::{Serialize, SerializeMap, Serializer};

/// One encoded frame, emitted as `{ "<label>": "<base64 jpeg>" }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub label: String,
    pub payload: Bytes,
}

impl Frame {
    pub fn payload_str(&self) -> &str {
        // Only ever built from base64 output
        std::str::from_utf8(&self.payload).unwrap_or_default()
    }
}

impl Serialize for Frame {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.label, self.payload_str())?;
        map.end()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FrameEncoder;

impl FrameEncoder {
    pub fn new() -> Self {
        Self
    }

    pub fn encode(&self, label: &str, jpeg: &[u8]) -> Frame {
        Frame {
            label: label.to_string(),
            payload: Bytes::from(BASE64.encode(jpeg)),
        }
    }

    pub fn decode(&self, payload: &str) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64.decode(payload)
    }
}
