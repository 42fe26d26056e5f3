//! Resolves the viewer, opens the session and supervises one streamer per
//! camera.
//!
//! Streamers are independent failure domains: a camera that stops producing
//! frames ends its own streamer only. The session is closed once every
//! streamer has stopped, or once an interrupt has been given the configured
//! grace period to take effect.

use log::{error, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::{Id, JoinError, JoinSet};

use crate::camera::CameraDriver;
use crate::config::Config;
use crate::error::OrchestratorError;
use crate::handshake::HandshakeListener;
use crate::session::StreamSession;
use crate::shutdown::Shutdown;
use crate::streaming::{CameraStreamer, StatsCounters, StreamerOutcome, StreamerReport};

pub struct Orchestrator<D> {
    config: Config,
    driver: Arc<D>,
}

impl<D: CameraDriver> Orchestrator<D> {
    pub fn new(config: Config, driver: D) -> Self {
        Self {
            config,
            driver: Arc::new(driver),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn run(&self, shutdown: Shutdown) -> Result<Vec<StreamerReport>, OrchestratorError> {
        let listener = HandshakeListener::bind(&self.config.handshake).await?;
        self.run_with_listener(listener, shutdown).await
    }

    /// Same as [`Orchestrator::run`] with an already bound listener.
    pub async fn run_with_listener(
        &self,
        listener: HandshakeListener,
        shutdown: Shutdown,
    ) -> Result<Vec<StreamerReport>, OrchestratorError> {
        let destination = tokio::select! {
            resolved = listener.resolve() => resolved?,
            _ = shutdown.triggered() => {
                info!("Interrupted before the viewer announced itself");
                return Ok(Vec::new());
            }
        };
        info!("destination: {}", destination);

        let session = tokio::select! {
            opened = StreamSession::open(destination, &self.config.session) => Arc::new(opened?),
            _ = shutdown.triggered() => {
                info!("Interrupted while connecting to {}", destination);
                return Ok(Vec::new());
            }
        };

        let reports = self.supervise(&session, &shutdown).await;

        session.close().await;
        Ok(reports)
    }

    async fn supervise(&self, session: &Arc<StreamSession>, shutdown: &Shutdown) -> Vec<StreamerReport> {
        let mut streamers = JoinSet::new();
        // Streamers that have not reported yet, by task
        let mut pending = HashMap::new();
        for camera in &self.config.cameras {
            let streamer = CameraStreamer::new(camera.clone(), Arc::clone(&self.driver));
            let tracked = (camera.label.clone(), streamer.counters());
            let task = streamers.spawn(streamer.run(Arc::clone(session), shutdown.clone()));
            pending.insert(task.id(), tracked);
        }

        let mut reports = Vec::with_capacity(self.config.cameras.len());

        loop {
            tokio::select! {
                joined = streamers.join_next_with_id() => match joined {
                    Some(joined) => collect(joined, &mut pending, &mut reports),
                    None => {
                        info!("All camera streamers stopped");
                        report_unfinished(pending, &mut reports);
                        return reports;
                    }
                },
                _ = shutdown.triggered() => break,
            }
        }

        let grace = self.config.shutdown_grace();
        info!(
            "interrupted. Waiting up to {:?} for {} camera streamer(s)",
            grace,
            streamers.len()
        );

        let drained = tokio::time::timeout(grace, async {
            while let Some(joined) = streamers.join_next_with_id().await {
                collect(joined, &mut pending, &mut reports);
            }
        })
        .await;

        if drained.is_err() {
            warn!("Aborting {} camera streamer(s) that ignored shutdown", streamers.len());
            streamers.shutdown().await;
        }

        report_unfinished(pending, &mut reports);
        reports
    }
}

type Pending = HashMap<Id, (String, Arc<StatsCounters>)>;

fn collect(
    joined: Result<(Id, StreamerReport), JoinError>,
    pending: &mut Pending,
    reports: &mut Vec<StreamerReport>,
) {
    match joined {
        Ok((id, report)) => {
            pending.remove(&id);
            match &report.outcome {
                StreamerOutcome::Normal => info!("Camera streamer {} finished", report.label),
                StreamerOutcome::Error(e) => {
                    error!("Camera streamer {} ended with error: {}", report.label, e)
                }
                StreamerOutcome::Aborted => {}
            }
            reports.push(report);
        }
        // Left in `pending`, reported as aborted
        Err(e) => error!("Camera streamer task failed: {}", e),
    }
}

/// Streamers that were aborted or panicked never produced a report
fn report_unfinished(pending: Pending, reports: &mut Vec<StreamerReport>) {
    for (label, counters) in pending.into_values() {
        error!("Camera streamer {} did not stop cleanly", label);
        reports.push(StreamerReport {
            label,
            stats: counters.snapshot(),
            outcome: StreamerOutcome::Aborted,
        });
    }
}
