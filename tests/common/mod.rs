//! Test doubles: a Socket.IO viewer and scriptable camera drivers.

#![allow(dead_code)]

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use std::collections::{HashMap, HashSet};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{accept_async, tungstenite::Message};

use robot_camera_streamer::session::packet::{self, OpenInfo, Packet};
use robot_camera_streamer::{CameraConfig, CameraDriver, CaptureError, FrameEncoder, FrameSource};

#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    Frame {
        label: String,
        jpeg: Vec<u8>,
        at: Instant,
    },
    Malformed(String),
    Disconnect,
}

/// Accepts one streaming client and records what it emits
pub struct FakeViewer {
    pub addr: SocketAddr,
    events: mpsc::UnboundedReceiver<ViewerEvent>,
    handle: JoinHandle<()>,
}

impl FakeViewer {
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, events) = mpsc::unbounded_channel();

        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let open = OpenInfo {
                sid: "viewer".to_string(),
                ping_interval: 25000,
                ping_timeout: 20000,
            };
            ws.send(Message::text(packet::open(&open).unwrap()))
                .await
                .unwrap();

            let encoder = FrameEncoder::new();
            while let Some(Ok(msg)) = ws.next().await {
                let Message::Text(text) = msg else { continue };
                let event = match packet::decode(text.as_str()) {
                    Packet::Connect { namespace, .. } => {
                        let ack = packet::connect_ack(&namespace, "socket");
                        ws.send(Message::text(ack)).await.unwrap();
                        continue;
                    }
                    Packet::Event { name, data, .. } if name == "frame" => {
                        match data.as_object().filter(|o| o.len() == 1) {
                            Some(object) => {
                                let (label, body) = object.iter().next().unwrap();
                                match body.as_str().map(|b| encoder.decode(b)) {
                                    Some(Ok(jpeg)) => ViewerEvent::Frame {
                                        label: label.clone(),
                                        jpeg,
                                        at: Instant::now(),
                                    },
                                    _ => ViewerEvent::Malformed(text.as_str().to_string()),
                                }
                            }
                            None => ViewerEvent::Malformed(text.as_str().to_string()),
                        }
                    }
                    Packet::Disconnect { .. } => ViewerEvent::Disconnect,
                    Packet::Pong => continue,
                    _ => ViewerEvent::Malformed(text.as_str().to_string()),
                };
                if tx.send(event).is_err() {
                    break;
                }
            }
        });

        Self {
            addr,
            events,
            handle,
        }
    }

    /// Everything received until the client went away
    pub async fn finish(mut self) -> Vec<ViewerEvent> {
        let mut received = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(event) = self.events.recv().await {
                received.push(event);
            }
        })
        .await
        .expect("viewer connection was not closed");
        self.handle.await.unwrap();
        received
    }
}

pub fn frames_for(events: &[ViewerEvent], wanted: &str) -> Vec<Vec<u8>> {
    events
        .iter()
        .filter_map(|event| match event {
            ViewerEvent::Frame { label, jpeg, .. } if label == wanted => Some(jpeg.clone()),
            _ => None,
        })
        .collect()
}

/// When each of `wanted`'s frames reached the viewer
pub fn arrivals_for(events: &[ViewerEvent], wanted: &str) -> Vec<Instant> {
    events
        .iter()
        .filter_map(|event| match event {
            ViewerEvent::Frame { label, at, .. } if label == wanted => Some(*at),
            _ => None,
        })
        .collect()
}

/// Accepts TCP connections and never speaks, so the websocket upgrade hangs
pub async fn spawn_silent_viewer() -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    (addr, handle)
}

/// Plays the viewer's side of the handshake
pub async fn announce(handshake: SocketAddr, payload: &str) {
    let mut client = TcpStream::connect(handshake).await.unwrap();
    client.write_all(payload.as_bytes()).await.unwrap();
    client.shutdown().await.unwrap();
}

#[derive(Default)]
struct DriverState {
    open: AtomicUsize,
    opened_total: AtomicUsize,
    fail_open: Mutex<HashSet<u32>>,
    fail_after: Mutex<HashMap<u32, u64>>,
    stall_after: Mutex<HashMap<u32, (u64, Duration)>>,
    captures: Mutex<HashMap<String, Vec<Instant>>>,
}

/// Camera driver whose devices produce `jpeg:<label>:<n>` frames
#[derive(Clone, Default)]
pub struct FakeDriver {
    state: Arc<DriverState>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_open(self, index: u32) -> Self {
        self.state.fail_open.lock().unwrap().insert(index);
        self
    }

    /// Device `index` errors once it has produced `frames` frames
    pub fn fail_after(self, index: u32, frames: u64) -> Self {
        self.state.fail_after.lock().unwrap().insert(index, frames);
        self
    }

    /// Device `index` blocks for `stall` once it has produced `frames` frames
    pub fn stall_after(self, index: u32, frames: u64, stall: Duration) -> Self {
        self.state
            .stall_after
            .lock()
            .unwrap()
            .insert(index, (frames, stall));
        self
    }

    pub fn open_devices(&self) -> usize {
        self.state.open.load(Ordering::SeqCst)
    }

    pub fn opened_total(&self) -> usize {
        self.state.opened_total.load(Ordering::SeqCst)
    }

    pub fn capture_times(&self, label: &str) -> Vec<Instant> {
        self.state
            .captures
            .lock()
            .unwrap()
            .get(label)
            .cloned()
            .unwrap_or_default()
    }
}

impl CameraDriver for FakeDriver {
    type Source = FakeCamera;

    fn open(&self, config: &CameraConfig) -> Result<FakeCamera, CaptureError> {
        if self.state.fail_open.lock().unwrap().contains(&config.device_index) {
            return Err(CaptureError::Open {
                index: config.device_index,
                source: io::Error::new(io::ErrorKind::NotFound, "no such device"),
            });
        }

        self.state.open.fetch_add(1, Ordering::SeqCst);
        self.state.opened_total.fetch_add(1, Ordering::SeqCst);

        Ok(FakeCamera {
            label: config.label.clone(),
            captured: 0,
            fail_after: self
                .state
                .fail_after
                .lock()
                .unwrap()
                .get(&config.device_index)
                .copied(),
            stall_after: self
                .state
                .stall_after
                .lock()
                .unwrap()
                .get(&config.device_index)
                .copied(),
            state: Arc::clone(&self.state),
        })
    }
}

pub struct FakeCamera {
    label: String,
    captured: u64,
    fail_after: Option<u64>,
    stall_after: Option<(u64, Duration)>,
    state: Arc<DriverState>,
}

impl FrameSource for FakeCamera {
    fn capture(&mut self) -> Result<Bytes, CaptureError> {
        if self.fail_after.is_some_and(|limit| self.captured >= limit) {
            return Err(CaptureError::Read(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "device unplugged",
            )));
        }

        if let Some((frames, stall)) = self.stall_after {
            if self.captured >= frames {
                std::thread::sleep(stall);
            }
        }

        self.captured += 1;
        self.state
            .captures
            .lock()
            .unwrap()
            .entry(self.label.clone())
            .or_default()
            .push(Instant::now());

        Ok(Bytes::from(format!("jpeg:{}:{}", self.label, self.captured)))
    }
}

impl Drop for FakeCamera {
    fn drop(&mut self) {
        self.state.open.fetch_sub(1, Ordering::SeqCst);
    }
}
