//! Persistent outbound event session to the viewer.
//!
//! A single writer task owns the websocket. Emitters hand it fully encoded
//! packets through a bounded queue and wait until their packet has been
//! written, so concurrent emissions never share the wire mid-packet and each
//! caller observes its own write failures.

pub mod packet;

use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, trace, warn};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use crate::config::SessionConfig;
use crate::error::ConnectionError;
use crate::handshake::Destination;
use packet::{OpenInfo, Packet};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

enum Command {
    Emit {
        packet: String,
        done: oneshot::Sender<Result<(), ConnectionError>>,
    },
    Close,
}

pub struct StreamSession {
    destination: Destination,
    namespace: String,
    state: Arc<watch::Sender<SessionState>>,
    commands: mpsc::Sender<Command>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl StreamSession {
    pub async fn open(
        destination: Destination,
        config: &SessionConfig,
    ) -> Result<Self, ConnectionError> {
        let (state, _) = watch::channel(SessionState::Disconnected);
        let state = Arc::new(state);
        state.send_replace(SessionState::Connecting);

        let url = session_url(&destination, &config.path);
        if !config.path.starts_with('/') {
            state.send_replace(SessionState::Disconnected);
            return Err(ConnectionError::InvalidUrl(url));
        }
        info!("Connecting to viewer at {}", url);

        let (ws, open) = match tokio::time::timeout(
            config.connect_timeout(),
            establish(&url, &config.namespace),
        )
        .await
        {
            Ok(Ok(established)) => established,
            Ok(Err(e)) => {
                state.send_replace(SessionState::Disconnected);
                return Err(e);
            }
            Err(_) => {
                state.send_replace(SessionState::Disconnected);
                return Err(ConnectionError::Timeout);
            }
        };

        let (commands, command_rx) = mpsc::channel(config.queue_capacity.max(1));
        state.send_replace(SessionState::Connected);

        let writer = tokio::spawn(run_writer(
            ws,
            command_rx,
            Arc::clone(&state),
            config.namespace.clone(),
            liveness_window(&open),
        ));

        info!("Connected to viewer at {}", destination);

        Ok(Self {
            destination,
            namespace: config.namespace.clone(),
            state,
            commands,
            writer: Mutex::new(Some(writer)),
        })
    }

    pub fn destination(&self) -> Destination {
        self.destination
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Sends one event and waits until it has been written to the viewer.
    pub async fn emit<T>(&self, event: &str, payload: &T) -> Result<(), ConnectionError>
    where
        T: Serialize + ?Sized,
    {
        if !self.is_connected() {
            return Err(ConnectionError::Closed);
        }

        let packet = packet::event(&self.namespace, event, payload)?;
        let (done, written) = oneshot::channel();

        self.commands
            .send(Command::Emit { packet, done })
            .await
            .map_err(|_| ConnectionError::Closed)?;

        written.await.map_err(|_| ConnectionError::Closed)?
    }

    /// Disconnects from the viewer. Safe to call more than once.
    pub async fn close(&self) {
        let Some(writer) = self.writer.lock().await.take() else {
            return;
        };

        self.state.send_replace(SessionState::Disconnected);

        // Fails only if the writer already stopped on its own
        let _ = self.commands.send(Command::Close).await;

        if let Err(e) = writer.await {
            warn!("Session writer task ended abnormally: {}", e);
        }

        info!("Session to {} closed", self.destination);
    }
}

impl fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSession")
            .field("destination", &self.destination)
            .field("namespace", &self.namespace)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.get_mut().take() {
            writer.abort();
        }
    }
}

pub fn session_url(destination: &Destination, path: &str) -> String {
    format!(
        "ws://{}{}?EIO=4&transport=websocket",
        destination.socket_addr(),
        path
    )
}

/// How long the viewer may stay silent before the session is considered
/// dead. `None` when the viewer did not announce its ping timing.
fn liveness_window(open: &OpenInfo) -> Option<Duration> {
    let millis = open.ping_interval + open.ping_timeout;
    (millis > 0).then(|| Duration::from_millis(millis))
}

/// Opens the websocket and joins the namespace
async fn establish(url: &str, namespace: &str) -> Result<(WsStream, OpenInfo), ConnectionError> {
    let (mut ws, _response) = connect_async(url)
        .await
        .map_err(ConnectionError::Connect)?;

    let open = match next_packet(&mut ws).await? {
        Packet::Open(open) => open,
        other => {
            return Err(ConnectionError::Handshake(format!(
                "expected open packet, got {:?}",
                other
            )))
        }
    };
    debug!(
        "Engine session {} opened (ping interval {} ms)",
        open.sid, open.ping_interval
    );

    ws.send(Message::text(packet::connect(namespace))).await?;

    loop {
        match next_packet(&mut ws).await? {
            Packet::Connect { namespace: ns, .. } if ns == namespace => return Ok((ws, open)),
            Packet::ConnectError { message, .. } => return Err(ConnectionError::Rejected(message)),
            Packet::Ping => ws.send(Message::text(packet::pong())).await?,
            Packet::Close => return Err(ConnectionError::Closed),
            other => trace!("Ignoring packet while joining namespace: {:?}", other),
        }
    }
}

async fn next_packet(ws: &mut WsStream) -> Result<Packet, ConnectionError> {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return Ok(packet::decode(text.as_str())),
            Some(Ok(Message::Close(_))) | None => return Err(ConnectionError::Closed),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(ConnectionError::Transport(e)),
        }
    }
}

async fn run_writer(
    ws: WsStream,
    mut commands: mpsc::Receiver<Command>,
    state: Arc<watch::Sender<SessionState>>,
    namespace: String,
    liveness: Option<Duration>,
) {
    let (mut sink, mut stream) = ws.split();

    let silence = tokio::time::sleep(liveness.unwrap_or_default());
    tokio::pin!(silence);

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Emit { packet, done }) => {
                    match sink.send(Message::text(packet)).await {
                        Ok(()) => {
                            let _ = done.send(Ok(()));
                        }
                        Err(e) => {
                            error!("Failed to write to viewer: {}", e);
                            let _ = done.send(Err(ConnectionError::Transport(e)));
                            break;
                        }
                    }
                }
                Some(Command::Close) | None => {
                    if let Err(e) = sink.send(Message::text(packet::disconnect(&namespace))).await {
                        debug!("Viewer gone before disconnect packet: {}", e);
                    }
                    if let Err(e) = sink.close().await {
                        debug!("Error closing websocket: {}", e);
                    }
                    break;
                }
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => match packet::decode(text.as_str()) {
                    Packet::Ping => {
                        if let Some(window) = liveness {
                            silence.as_mut().reset(Instant::now() + window);
                        }
                        if let Err(e) = sink.send(Message::text(packet::pong())).await {
                            error!("Failed to answer viewer ping: {}", e);
                            break;
                        }
                    }
                    Packet::Close => {
                        warn!("Viewer closed the engine session");
                        break;
                    }
                    Packet::Disconnect { namespace: ns } if ns == namespace => {
                        warn!("Viewer disconnected namespace {}", ns);
                        break;
                    }
                    other => trace!("Ignoring packet from viewer: {:?}", other),
                },
                Some(Ok(Message::Close(frame))) => {
                    warn!("Viewer closed the connection: {:?}", frame);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!("Connection to viewer lost: {}", e);
                    break;
                }
                None => {
                    warn!("Connection to viewer ended");
                    break;
                }
            },
            _ = &mut silence, if liveness.is_some() => {
                error!("Viewer sent no ping within {:?}, dropping the session", liveness.unwrap_or_default());
                break;
            }
        }
    }

    state.send_replace(SessionState::Disconnected);
    debug!("Session writer stopped");
}
