//! Robot-side camera streaming agent.
//!
//! The robot waits for a viewer to announce its receiving port over a short
//! TCP handshake, connects back to it with a Socket.IO session and streams
//! every configured camera concurrently as `frame` events carrying
//! base64-encoded JPEG images.
//!
//! ```no_run
//! use robot_camera_streamer::{Config, Orchestrator, Shutdown, V4lDriver};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let orchestrator = Orchestrator::new(Config::default(), V4lDriver);
//! let reports = orchestrator.run(Shutdown::new()).await?;
//! # Ok(())
//! # }
//! ```

pub mod camera;
pub mod config;
pub mod error;
pub mod handshake;
pub mod orchestrator;
pub mod processing;
pub mod session;
pub mod shutdown;
pub mod streaming;

// Re-exports for convenience
pub use camera::{CameraDriver, FrameSource, V4lDriver};
pub use config::{CameraConfig, Config, HandshakeConfig, SessionConfig};
pub use error::{CaptureError, ConnectionError, HandshakeError, OrchestratorError, ProtocolError, StreamerError};
pub use handshake::{Destination, HandshakeListener, HandshakeRequest};
pub use orchestrator::Orchestrator;
pub use processing::{Frame, FrameEncoder};
pub use session::{SessionState, StreamSession};
pub use shutdown::Shutdown;
pub use streaming::{CameraStreamer, StreamerOutcome, StreamerReport, StreamerStats};
