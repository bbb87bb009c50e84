// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Recurring trophy sync.

use crate::services::sync::{SyncEngine, SyncReport};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// How a scheduled run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(SyncReport),
    /// A previous run was still in flight.
    Skipped,
    /// The run hit the ceiling and was abandoned; finished users keep their progress.
    TimedOut,
    /// The run task panicked or was cancelled.
    Aborted,
}

/// Shortest period the timer loop accepts.
const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Drives [`SyncEngine::sync_all`] on a fixed interval.
#[derive(Clone)]
pub struct SyncScheduler {
    engine: Arc<SyncEngine>,
    interval: Duration,
    run_timeout: Duration,
}

impl SyncScheduler {
    /// `interval` is raised to at least one second.
    pub fn new(engine: Arc<SyncEngine>, interval: Duration, run_timeout: Duration) -> Self {
        if interval < MIN_INTERVAL {
            tracing::warn!(
                interval_ms = interval.as_millis() as u64,
                "Sync interval too short, using one second"
            );
        }
        Self {
            engine,
            interval: interval.max(MIN_INTERVAL),
            run_timeout,
        }
    }

    /// Start the timer loop. The first run starts immediately.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(
                interval_secs = self.interval.as_secs(),
                run_timeout_secs = self.run_timeout.as_secs(),
                "Trophy sync scheduler started"
            );

            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                interval.tick().await;
                self.run_once().await;
            }
        })
    }

    /// Run one sync in its own task, bounded by the run timeout.
    ///
    /// Never panics; a panicking run is logged and reported as `Aborted`.
    pub async fn run_once(&self) -> RunOutcome {
        let engine = Arc::clone(&self.engine);
        let run_timeout = self.run_timeout;

        let handle =
            tokio::spawn(async move { tokio::time::timeout(run_timeout, engine.sync_all()).await });

        match handle.await {
            Ok(Ok(report)) if report.already_running => RunOutcome::Skipped,
            Ok(Ok(report)) => RunOutcome::Completed(report),
            Ok(Err(_)) => {
                tracing::warn!(
                    timeout_secs = run_timeout.as_secs(),
                    "Trophy sync run exceeded time limit, abandoned"
                );
                RunOutcome::TimedOut
            }
            Err(e) => {
                tracing::error!(error = %e, "Trophy sync run aborted");
                RunOutcome::Aborted
            }
        }
    }
}
