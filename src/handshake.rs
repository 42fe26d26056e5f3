//! One-shot handshake through which the viewer announces where to stream.
//!
//! The viewer connects to the robot's well-known port, writes a single JSON
//! object such as `{"recievingPort": 5000}` and closes the connection. No
//! acknowledgment is written back. The destination is the viewer's peer
//! address combined with the announced port.

use log::{debug, info, warn};
use serde_json::Value;
use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket};

use crate::config::HandshakeConfig;
use crate::error::{HandshakeError, ProtocolError};

/// Field name as sent by the viewer (spelling is part of the wire format)
pub const RECEIVING_PORT_FIELD: &str = "recievingPort";

/// Where the viewer listens for the event session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Destination {
    pub address: IpAddr,
    pub port: u16,
}

impl Destination {
    pub fn new(address: IpAddr, port: u16) -> Self {
        Self { address, port }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.socket_addr())
    }
}

/// The viewer's announcement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeRequest {
    pub receiving_port: u16,
}

impl HandshakeRequest {
    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        if payload.iter().all(u8::is_ascii_whitespace) {
            return Err(ProtocolError::Empty);
        }

        let value: Value = serde_json::from_slice(payload).map_err(|e| {
            if e.is_eof() {
                ProtocolError::Truncated
            } else {
                ProtocolError::Malformed(e)
            }
        })?;

        let port = value
            .as_object()
            .and_then(|object| object.get(RECEIVING_PORT_FIELD))
            .ok_or(ProtocolError::MissingField)?;

        let receiving_port = port
            .as_u64()
            .and_then(|p| u16::try_from(p).ok())
            .filter(|p| *p > 0)
            .ok_or_else(|| ProtocolError::InvalidPort(port.to_string()))?;

        Ok(Self { receiving_port })
    }
}

/// Accepts exactly one viewer connection and resolves its destination
pub struct HandshakeListener {
    listener: TcpListener,
    max_payload_bytes: usize,
    read_timeout: Duration,
}

impl HandshakeListener {
    pub async fn bind(config: &HandshakeConfig) -> Result<Self, HandshakeError> {
        let ip: IpAddr = config.listen_address.parse().map_err(|e| {
            HandshakeError::Bind(io::Error::new(io::ErrorKind::InvalidInput, e))
        })?;
        let addr = SocketAddr::new(ip, config.listen_port);

        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4(),
            SocketAddr::V6(_) => TcpSocket::new_v6(),
        }
        .map_err(HandshakeError::Bind)?;
        socket.set_reuseaddr(true).map_err(HandshakeError::Bind)?;
        socket.bind(addr).map_err(HandshakeError::Bind)?;
        let listener = socket.listen(1).map_err(HandshakeError::Bind)?;

        info!("Robot is listening for the viewer handshake on {}", addr);

        Ok(Self {
            listener,
            max_payload_bytes: config.max_payload_bytes,
            read_timeout: config.read_timeout(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Waits for one connection; the listening socket is closed as soon as
    /// it has been accepted, so later connection attempts are refused.
    pub async fn resolve(self) -> Result<Destination, HandshakeError> {
        let Self {
            listener,
            max_payload_bytes,
            read_timeout,
        } = self;

        let (mut stream, peer) = listener.accept().await.map_err(HandshakeError::Accept)?;
        drop(listener);
        debug!("Handshake connection from {}", peer);

        let request = tokio::time::timeout(
            read_timeout,
            read_request(&mut stream, max_payload_bytes),
        )
        .await
        .map_err(|_| ProtocolError::Timeout)?;

        if let Err(e) = stream.shutdown().await {
            debug!("Closing handshake connection from {}: {}", peer, e);
        }

        let request = request.inspect_err(|e| {
            warn!("Rejected handshake from {}: {}", peer, e);
        })?;

        let destination = Destination::new(peer.ip(), request.receiving_port);
        info!("Destination resolved: {}", destination);
        Ok(destination)
    }
}

/// Binds the configured port and resolves a single destination
pub async fn resolve(config: &HandshakeConfig) -> Result<Destination, HandshakeError> {
    HandshakeListener::bind(config).await?.resolve().await
}

/// Reads until a complete object has arrived or the peer stops writing.
async fn read_request<R>(reader: &mut R, limit: usize) -> Result<HandshakeRequest, HandshakeError>
where
    R: AsyncRead + Unpin,
{
    let mut payload = Vec::with_capacity(limit.min(1024));
    let mut chunk = [0u8; 512];

    loop {
        let n = reader.read(&mut chunk).await.map_err(HandshakeError::Read)?;
        if n == 0 {
            return Ok(HandshakeRequest::parse(&payload)?);
        }

        if payload.len() + n > limit {
            return Err(ProtocolError::TooLarge { limit }.into());
        }
        payload.extend_from_slice(&chunk[..n]);

        match HandshakeRequest::parse(&payload) {
            Ok(request) => return Ok(request),
            Err(ProtocolError::Empty | ProtocolError::Truncated) => continue,
            Err(e) => return Err(e.into()),
        }
    }
}
