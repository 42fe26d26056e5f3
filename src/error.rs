//! Error types for the robot-side streamer

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Malformed or incomplete handshake payload.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("handshake payload is empty")]
    Empty,

    #[error("handshake payload is truncated")]
    Truncated,

    #[error("handshake payload exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("handshake payload is not a valid JSON object: {0}")]
    Malformed(serde_json::Error),

    #[error("handshake payload has no receiving port field")]
    MissingField,

    #[error("receiving port {0} is not a valid port number")]
    InvalidPort(String),

    #[error("timed out waiting for the handshake payload")]
    Timeout,
}

#[derive(Error, Debug)]
pub enum HandshakeError {
    #[error("failed to bind handshake listener: {0}")]
    Bind(#[source] std::io::Error),

    #[error("failed to accept handshake connection: {0}")]
    Accept(#[source] std::io::Error),

    #[error("failed to read handshake payload: {0}")]
    Read(#[source] std::io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Failure to establish or keep the outbound streaming session.
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("invalid session url: {0}")]
    InvalidUrl(String),

    #[error("failed to connect: {0}")]
    Connect(#[source] tungstenite::Error),

    #[error("timed out connecting to the viewer")]
    Timeout,

    #[error("unexpected handshake from viewer: {0}")]
    Handshake(String),

    #[error("viewer rejected the namespace connection: {0}")]
    Rejected(String),

    #[error("session is closed")]
    Closed,

    #[error("transport error: {0}")]
    Transport(#[from] tungstenite::Error),

    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A camera device that cannot be opened or stops producing frames.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("failed to open camera {index}: {source}")]
    Open {
        index: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to configure camera: {0}")]
    Configure(String),

    #[error("camera does not support the requested format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to read frame: {0}")]
    Read(#[from] std::io::Error),

    #[error("camera returned an empty frame")]
    EmptyFrame,

    #[error("built without camera support")]
    Unavailable,
}

#[derive(Error, Debug)]
pub enum StreamerError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("capture task failed: {0}")]
    Task(String),
}

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("session failed: {0}")]
    Connection(#[from] ConnectionError),
}
