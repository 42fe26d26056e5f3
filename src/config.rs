//! Configuration for the robot-side streamer

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub handshake: HandshakeConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default = "default_cameras")]
    pub cameras: Vec<CameraConfig>,

    /// How long streamers get to observe an interrupt before being aborted
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            handshake: HandshakeConfig::default(),
            session: SessionConfig::default(),
            cameras: default_cameras(),
            shutdown_grace_ms: default_shutdown_grace(),
        }
    }
}

/// Where the robot waits for the viewer to announce its receiving port
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeConfig {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Upper bound on the announcement size
    #[serde(default = "default_max_payload")]
    pub max_payload_bytes: usize,

    /// Applies once a client is connected; accepting waits forever
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            listen_port: default_listen_port(),
            max_payload_bytes: default_max_payload(),
            read_timeout_ms: default_read_timeout(),
        }
    }
}

impl HandshakeConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Outbound event session to the viewer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Socket.IO endpoint path on the viewer
    #[serde(default = "default_session_path")]
    pub path: String,

    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Emissions buffered ahead of the writer
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            path: default_session_path(),
            namespace: default_namespace(),
            connect_timeout_ms: default_connect_timeout(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl SessionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Per-camera configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CameraConfig {
    /// Video device index, `/dev/video<index>` on Linux
    pub device_index: u32,

    /// Key under which this camera's frames are emitted
    pub label: String,

    #[serde(default = "default_frame_interval")]
    pub frame_interval_ms: u64,

    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,
}

impl CameraConfig {
    pub fn new(device_index: u32, label: impl Into<String>) -> Self {
        Self {
            device_index,
            label: label.into(),
            frame_interval_ms: default_frame_interval(),
            width: default_width(),
            height: default_height(),
        }
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

// Default value functions
fn default_listen_address() -> String {
    "0.0.0.0".to_string()
}
fn default_listen_port() -> u16 {
    3000
}
fn default_max_payload() -> usize {
    1024
}
fn default_read_timeout() -> u64 {
    5000
}
fn default_session_path() -> String {
    "/socket.io/".to_string()
}
fn default_namespace() -> String {
    "/".to_string()
}
fn default_connect_timeout() -> u64 {
    5000
}
fn default_queue_capacity() -> usize {
    16
}
fn default_shutdown_grace() -> u64 {
    2000
}
fn default_frame_interval() -> u64 {
    100
}
fn default_width() -> u32 {
    640
}
fn default_height() -> u32 {
    480
}
fn default_cameras() -> Vec<CameraConfig> {
    vec![
        CameraConfig::new(0, "left_frame"),
        CameraConfig::new(2, "right_frame"),
    ]
}

impl Config {
    /// Loads configuration from TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Loads configuration from TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.handshake.max_payload_bytes == 0 {
            return Err(ConfigError::Invalid(
                "handshake.max_payload_bytes must be > 0".to_string(),
            ));
        }

        if !self.session.path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "session.path must start with '/', got {:?}",
                self.session.path
            )));
        }

        if !self.session.namespace.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "session.namespace must start with '/', got {:?}",
                self.session.namespace
            )));
        }

        if self.session.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "session.queue_capacity must be > 0".to_string(),
            ));
        }

        if self.cameras.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one camera must be configured".to_string(),
            ));
        }

        let mut labels = HashSet::new();
        for cam in &self.cameras {
            Self::validate_camera(cam)?;
            if !labels.insert(cam.label.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate camera label {:?}",
                    cam.label
                )));
            }
        }

        Ok(())
    }

    fn validate_camera(cam: &CameraConfig) -> Result<(), ConfigError> {
        if cam.label.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "camera {}: label must not be empty",
                cam.device_index
            )));
        }

        if cam.width == 0 || cam.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "{}: width and height must be > 0",
                cam.label
            )));
        }

        if cam.frame_interval_ms == 0 {
            return Err(ConfigError::Invalid(format!(
                "{}: frame_interval_ms must be > 0",
                cam.label
            )));
        }

        Ok(())
    }
}
