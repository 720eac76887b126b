//! The poll loop: probe the microphone, report the status as a heartbeat.

use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use micwatch_client::{Event, HeartbeatSink};
use micwatch_core::{Config, MicStatus};
use micwatch_probe::{ProbeResult, Unsupported};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::statusline::StatusLine;

/// A blocking microphone probe, run off the async runtime.
pub type ProbeFn = Arc<dyn Fn() -> Result<ProbeResult, Unsupported> + Send + Sync>;

/// What a single poll did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick {
    /// A heartbeat with this status was sent
    Reported { status: MicStatus, label: String },
    /// Detection is impossible here, nothing was sent
    Unsupported(Unsupported),
}

/// Periodically probes the microphone and sends heartbeats to a sink.
pub struct Watcher<S> {
    sink: S,
    bucket_id: String,
    probe: ProbeFn,
    poll_time: Duration,
    pulsetime: f64,
}

impl<S: HeartbeatSink> Watcher<S> {
    pub fn new(sink: S, bucket_id: impl Into<String>, probe: ProbeFn, config: &Config) -> Self {
        Self {
            sink,
            bucket_id: bucket_id.into(),
            probe,
            poll_time: config.poll_time(),
            pulsetime: config.pulsetime(),
        }
    }

    /// Run the blocking probe off the async runtime.
    async fn probe(&self) -> anyhow::Result<Result<ProbeResult, Unsupported>> {
        let probe = self.probe.clone();
        tokio::task::spawn_blocking(move || probe())
            .await
            .context("Microphone probe task failed")
    }

    async fn report(&self, status: MicStatus) -> anyhow::Result<()> {
        let event = Event::with_title(Utc::now(), status.title());
        self.sink
            .heartbeat(&self.bucket_id, &event, self.pulsetime)
            .await
            .with_context(|| format!("Failed to send heartbeat via {}", self.sink.name()))
    }

    /// Probe once and send the matching heartbeat.
    pub async fn tick(&self) -> anyhow::Result<Tick> {
        let result = match self.probe().await? {
            Ok(result) => result,
            Err(unsupported) => return Ok(Tick::Unsupported(unsupported)),
        };

        let status = MicStatus::from(result.active);
        self.report(status).await?;
        Ok(Tick::Reported {
            status,
            label: result.label,
        })
    }

    /// Poll until `shutdown` completes. The status line follows the probe even
    /// when the heartbeat fails. Failed polls are logged and the loop carries
    /// on with the next interval.
    pub async fn run_until<W, F>(&self, status_line: &mut StatusLine<W>, shutdown: F)
    where
        W: Write,
        F: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(self.poll_time);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let mut last_status = None;
        let mut warned_unsupported = false;

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = interval.tick() => {}
            }

            let result = match self.probe().await {
                Ok(Ok(result)) => result,
                Ok(Err(unsupported)) => {
                    if !warned_unsupported {
                        warn!("{}, not reporting microphone status", unsupported);
                        warned_unsupported = true;
                    }
                    continue;
                }
                Err(e) => {
                    error!(error = ?e, "Failed to probe microphone");
                    continue;
                }
            };

            let status = MicStatus::from(result.active);
            if last_status != Some(status) {
                info!(status = %status, label = %result.label, "Microphone status changed");
                last_status = Some(status);
            }
            if let Err(e) = status_line.print(status.title()) {
                warn!("Failed to print status line: {}", e);
            }

            if let Err(e) = self.report(status).await {
                error!(error = ?e, "Failed to report microphone status");
            }
        }

        if let Err(e) = status_line.finish() {
            warn!("Failed to finish status line: {}", e);
        }
    }
}
