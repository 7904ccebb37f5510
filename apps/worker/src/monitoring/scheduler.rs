use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::executor::{MonitoringExecutor, PipelineResult};
use crate::logs::{LogError, LogWriter};
use crate::store::{CHECKS, RecordStore};

/// Intervals of the two periodic loops
#[derive(Debug, Clone, Copy)]
pub struct ScheduleConfig {
    pub check_interval: Duration,
    pub rotation_interval: Duration,
}

/// Counters for one check cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub checks: usize,
    pub processed: usize,
    pub skipped: usize,
    pub alerts: usize,
}

/// Counters for one rotation cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RotationReport {
    pub streams: usize,
    pub rotated: usize,
    pub empty: usize,
    pub failed: usize,
}

/// Monitoring scheduler - drives the check cycle and the log rotation cycle
pub struct MonitoringScheduler {
    store: Arc<dyn RecordStore>,
    executor: Arc<MonitoringExecutor>,
    logs: Arc<LogWriter>,
    config: ScheduleConfig,
    shutdown: CancellationToken,
}

/// Running loops of a started scheduler
pub struct SchedulerHandle {
    shutdown: CancellationToken,
    checks: JoinHandle<()>,
    rotation: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Cancel both loops and wait for the cycle in progress to finish
    pub async fn stop(self) {
        self.shutdown.cancel();
        for (name, handle) in [("check", self.checks), ("rotation", self.rotation)] {
            if let Err(e) = handle.await {
                error!("{} loop ended abnormally: {}", name, e);
            }
        }
    }
}

impl MonitoringScheduler {
    pub fn new(
        store: Arc<dyn RecordStore>,
        executor: Arc<MonitoringExecutor>,
        logs: Arc<LogWriter>,
        config: ScheduleConfig,
    ) -> Self {
        Self { store, executor, logs, config, shutdown: CancellationToken::new() }
    }

    /// Start both loops; the first cycle of each runs immediately
    pub fn start(self: Arc<Self>) -> SchedulerHandle {
        let checks = tokio::spawn(Arc::clone(&self).check_loop());
        let rotation = tokio::spawn(Arc::clone(&self).rotation_loop());

        SchedulerHandle { shutdown: self.shutdown.clone(), checks, rotation }
    }

    async fn check_loop(self: Arc<Self>) {
        let mut timer = interval(self.config.check_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = timer.tick() => {
                    let report = self.run_check_cycle().await;
                    info!(
                        checks = report.checks,
                        processed = report.processed,
                        skipped = report.skipped,
                        alerts = report.alerts,
                        "check cycle finished"
                    );
                }
            }
        }

        debug!("check loop stopped");
    }

    async fn rotation_loop(self: Arc<Self>) {
        let mut timer = interval(self.config.rotation_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = timer.tick() => {
                    let report = self.run_rotation_cycle().await;
                    info!(
                        streams = report.streams,
                        rotated = report.rotated,
                        failed = report.failed,
                        "log rotation finished"
                    );
                }
            }
        }

        debug!("rotation loop stopped");
    }

    /// Run every stored check once, concurrently.
    ///
    /// Returns only after all pipelines of this cycle are done, so the next
    /// cycle can never overlap a check that is still running.
    pub async fn run_check_cycle(&self) -> CycleReport {
        let ids = match self.store.list(CHECKS).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!("could not list checks, skipping cycle: {}", e);
                return CycleReport::default();
            }
        };

        if ids.is_empty() {
            debug!("no checks to process");
        }

        let mut report = CycleReport { checks: ids.len(), ..CycleReport::default() };
        let mut pipelines = JoinSet::new();
        for id in ids {
            let executor = Arc::clone(&self.executor);
            pipelines.spawn(async move { executor.execute_check(&id).await });
        }

        while let Some(joined) = pipelines.join_next().await {
            match joined {
                Ok(PipelineResult::Processed(processed)) => {
                    report.processed += 1;
                    if processed.notified {
                        report.alerts += 1;
                    }
                }
                Ok(PipelineResult::Skipped) => report.skipped += 1,
                Err(e) => {
                    error!("check pipeline panicked: {}", e);
                    report.skipped += 1;
                }
            }
        }

        report
    }

    /// Compress and truncate every live log stream
    pub async fn run_rotation_cycle(&self) -> RotationReport {
        let streams = match self.logs.list(false).await {
            Ok(streams) => streams,
            Err(e) => {
                warn!("could not list log streams, skipping rotation: {}", e);
                return RotationReport::default();
            }
        };

        let mut report = RotationReport { streams: streams.len(), ..RotationReport::default() };
        let mut rotations = JoinSet::new();
        for stream in streams {
            let logs = Arc::clone(&self.logs);
            rotations.spawn(async move {
                let archive = format!("{}-{}", stream, chrono::Utc::now().timestamp_millis());
                let result = logs.rotate(&stream, &archive).await;
                (stream, archive, result)
            });
        }

        while let Some(joined) = rotations.join_next().await {
            match joined {
                Ok((stream, archive, Ok(()))) => {
                    debug!(stream = %stream, archive = %archive, "log stream rotated");
                    report.rotated += 1;
                }
                Ok((stream, _, Err(LogError::Empty(_)))) => {
                    debug!(stream = %stream, "log stream empty, nothing to rotate");
                    report.empty += 1;
                }
                Ok((stream, _, Err(e))) => {
                    warn!(stream = %stream, "failed to rotate log stream: {}", e);
                    report.failed += 1;
                }
                Err(e) => {
                    error!("log rotation task panicked: {}", e);
                    report.failed += 1;
                }
            }
        }

        report
    }
}
