mod stats;
mod streamer;

pub use stats::{StatsCounters, StreamerStats};
pub use streamer::{CameraStreamer, StreamerOutcome, StreamerReport, FRAME_EVENT};
