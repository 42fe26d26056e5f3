use bytes::Bytes;
use log::{debug, info, warn};
use v4l::{
    buffer::Type,
    io::{mmap::Stream as MmapStream, traits::CaptureStream},
    video::Capture,
    Device, Format, FourCC,
};

use super::{CameraDriver, FrameSource};
use crate::config::CameraConfig;
use crate::error::CaptureError;

const MJPEG: &[u8; 4] = b"MJPG";
const BUFFER_COUNT: u32 = 4;

/// Opens `/dev/video<index>` through Video4Linux
#[derive(Debug, Default, Clone, Copy)]
pub struct V4lDriver;

impl CameraDriver for V4lDriver {
    type Source = V4lCamera;

    fn open(&self, config: &CameraConfig) -> Result<V4lCamera, CaptureError> {
        V4lCamera::open(config)
    }
}

pub struct V4lCamera {
    // Dropped before the device
    stream: MmapStream<'static>,
    _device: Device,
    index: u32,
}

impl V4lCamera {
    pub fn open(config: &CameraConfig) -> Result<Self, CaptureError> {
        let index = config.device_index;
        let device = Device::new(index as usize)
            .map_err(|source| CaptureError::Open { index, source })?;

        // The driver compresses, so frames come out ready to send
        let requested = Format::new(config.width, config.height, FourCC::new(MJPEG));
        let fmt = device
            .set_format(&requested)
            .map_err(|e| CaptureError::Configure(e.to_string()))?;

        if fmt.fourcc != FourCC::new(MJPEG) {
            return Err(CaptureError::UnsupportedFormat(format!(
                "camera {} offers {} instead of MJPG",
                index, fmt.fourcc
            )));
        }
        if fmt.width != config.width || fmt.height != config.height {
            warn!(
                "Camera {} adjusted resolution from {}x{} to {}x{}",
                index, config.width, config.height, fmt.width, fmt.height
            );
        }
        info!("Camera format set for {} ({}): {}", index, config.label, fmt);

        let stream = MmapStream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT)
            .map_err(|e| CaptureError::Configure(e.to_string()))?;

        Ok(Self {
            stream,
            _device: device,
            index,
        })
    }
}

impl FrameSource for V4lCamera {
    fn capture(&mut self) -> Result<Bytes, CaptureError> {
        let (buf, meta) = self.stream.next()?;
        let used = (meta.bytesused as usize).min(buf.len());
        if used == 0 {
            return Err(CaptureError::EmptyFrame);
        }
        Ok(Bytes::copy_from_slice(&buf[..used]))
    }
}

impl Drop for V4lCamera {
    fn drop(&mut self) {
        debug!("Releasing camera {}", self.index);
    }
}
