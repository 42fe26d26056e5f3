//! Per-camera capture, encode and emit loop.

use log::{debug, error, info};
use std::sync::Arc;
use std::time::Instant;

use super::stats::{StatsCounters, StreamerStats};
use crate::camera::{CameraDriver, FrameSource};
use crate::config::CameraConfig;
use crate::error::{CaptureError, StreamerError};
use crate::processing::FrameEncoder;
use crate::session::StreamSession;
use crate::shutdown::Shutdown;

/// Event name carrying camera frames
pub const FRAME_EVENT: &str = "frame";

const PROGRESS_EVERY: u64 = 100;

#[derive(Debug)]
pub enum StreamerOutcome {
    /// Stopped because shutdown was requested
    Normal,
    Error(StreamerError),
    /// Killed after ignoring shutdown for the grace period, or panicked
    Aborted,
}

impl StreamerOutcome {
    pub fn is_error(&self) -> bool {
        !matches!(self, StreamerOutcome::Normal)
    }
}

#[derive(Debug)]
pub struct StreamerReport {
    pub label: String,
    pub stats: StreamerStats,
    pub outcome: StreamerOutcome,
}

pub struct CameraStreamer<D> {
    config: CameraConfig,
    driver: Arc<D>,
    encoder: FrameEncoder,
    counters: Arc<StatsCounters>,
}

impl<D: CameraDriver> CameraStreamer<D> {
    pub fn new(config: CameraConfig, driver: Arc<D>) -> Self {
        Self {
            config,
            driver,
            encoder: FrameEncoder::new(),
            counters: Arc::new(StatsCounters::default()),
        }
    }

    pub fn label(&self) -> &str {
        &self.config.label
    }

    pub fn stats(&self) -> StreamerStats {
        self.counters.snapshot()
    }

    /// Live counters, readable after the streamer has been moved into a task
    pub fn counters(&self) -> Arc<StatsCounters> {
        Arc::clone(&self.counters)
    }

    /// Streams until `shutdown` is triggered or a capture or session error
    /// occurs. The device is held only for the duration of this call.
    pub async fn run(self, session: Arc<StreamSession>, shutdown: Shutdown) -> StreamerReport {
        info!(
            "Starting camera streamer {} on device {} ({}x{}, every {} ms)",
            self.config.label,
            self.config.device_index,
            self.config.width,
            self.config.height,
            self.config.frame_interval_ms
        );

        let outcome = match self.stream(&session, &shutdown).await {
            Ok(()) => StreamerOutcome::Normal,
            Err(e) => {
                error!("Camera streamer {} failed: {}", self.config.label, e);
                StreamerOutcome::Error(e)
            }
        };

        let stats = self.stats();
        info!(
            "Camera streamer {} stopped after {} frames",
            self.config.label, stats.frames_sent
        );

        StreamerReport {
            label: self.config.label,
            stats,
            outcome,
        }
    }

    async fn stream(&self, session: &StreamSession, shutdown: &Shutdown) -> Result<(), StreamerError> {
        let driver = Arc::clone(&self.driver);
        let config = self.config.clone();
        let mut source = tokio::task::spawn_blocking(move || driver.open(&config))
            .await
            .map_err(|e| StreamerError::Task(e.to_string()))??;

        debug!("Camera {} acquired", self.config.label);

        let interval = self.config.frame_interval();
        let mut last_progress = (Instant::now(), StreamerStats::default());

        while !shutdown.is_triggered() {
            // Capture blocks on the device, so it runs off the async workers
            let (returned, captured) = tokio::task::spawn_blocking(move || {
                let captured = source.capture();
                (source, captured)
            })
            .await
            .map_err(|e| StreamerError::Task(e.to_string()))?;
            source = returned;

            let jpeg = captured?;
            if jpeg.is_empty() {
                return Err(CaptureError::EmptyFrame.into());
            }
            self.counters.record_capture();

            let frame = self.encoder.encode(&self.config.label, &jpeg);
            session.emit(FRAME_EVENT, &frame).await?;
            self.counters.record_sent(frame.payload.len());

            let stats = self.counters.snapshot();
            if stats.frames_sent % PROGRESS_EVERY == 0 {
                let elapsed = last_progress.0.elapsed().as_secs_f64();
                info!(
                    "Camera {}: {} frames sent, {:.1} fps, {:.0} kbps",
                    self.config.label,
                    stats.frames_sent,
                    stats.calculate_fps(&last_progress.1, elapsed),
                    stats.calculate_bitrate_kbps(&last_progress.1, elapsed)
                );
                last_progress = (Instant::now(), stats);
            }

            tokio::select! {
                _ = shutdown.triggered() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        Ok(())
    }
}
