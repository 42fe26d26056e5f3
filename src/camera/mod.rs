//! Camera devices.
//!
//! A [`CameraDriver`] opens devices; the [`FrameSource`] it returns owns the
//! device exclusively and releases it when dropped.

use bytes::Bytes;

use crate::config::CameraConfig;
use crate::error::CaptureError;

#[cfg(feature = "camera")]
mod v4l2;

#[cfg(feature = "camera")]
pub use v4l2::{V4lCamera, V4lDriver};

/// An opened camera producing compressed (JPEG) frames
pub trait FrameSource: Send + 'static {
    /// Blocks until the next frame is available.
    fn capture(&mut self) -> Result<Bytes, CaptureError>;
}

pub trait CameraDriver: Send + Sync + 'static {
    type Source: FrameSource;

    /// Opens and configures the device named by `config.device_index`.
    fn open(&self, config: &CameraConfig) -> Result<Self::Source, CaptureError>;
}

/// Stand-in used when the crate is built without Video4Linux support
#[cfg(not(feature = "camera"))]
#[derive(Debug, Default, Clone, Copy)]
pub struct V4lDriver;

#[cfg(not(feature = "camera"))]
pub enum NoCamera {}

#[cfg(not(feature = "camera"))]
impl FrameSource for NoCamera {
    fn capture(&mut self) -> Result<Bytes, CaptureError> {
        match *self {}
    }
}

#[cfg(not(feature = "camera"))]
impl CameraDriver for V4lDriver {
    type Source = NoCamera;

    fn open(&self, config: &CameraConfig) -> Result<NoCamera, CaptureError> {
        log::error!(
            "Cannot open camera {} ({}): built without camera support",
            config.device_index,
            config.label
        );
        Err(CaptureError::Unavailable)
    }
}
