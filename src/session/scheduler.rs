//! Periodic background work: inactivity sweep and title generation

use chrono::{DateTime, Utc};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use super::{
    session::SessionManager,
    title::{TitleGenerator, TitleTickReport},
    types::now,
};

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub deactivated: Vec<String>,
    pub titles: TitleTickReport,
}

/// Drives the sweep and title generation on a fixed interval
#[derive(Clone)]
pub struct SessionScheduler {
    manager: Arc<SessionManager>,
    titles: Option<Arc<TitleGenerator>>,
    interval: Duration,
}

impl SessionScheduler {
    pub fn new(manager: Arc<SessionManager>, titles: Option<Arc<TitleGenerator>>) -> Self {
        let interval = manager.settings().tick_interval;
        Self {
            manager,
            titles,
            interval,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run one tick as of `now`. Errors are logged, never returned.
    pub async fn run_tick(&self, now: DateTime<Utc>) -> TickReport {
        let deactivated = match self.manager.sweep_idle(now).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "Inactivity sweep failed");
                Vec::new()
            }
        };

        let titles = match &self.titles {
            Some(titles) => titles.tick().await,
            None => TitleTickReport::default(),
        };

        TickReport { deactivated, titles }
    }

    /// Spawn the background worker
    pub fn start(&self) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let scheduler = self.clone();

        let join = tokio::spawn(async move {
            let mut ticker = interval(scheduler.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(interval = ?scheduler.interval, "Session scheduler started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = scheduler.run_tick(now()).await;
                        debug!(
                            deactivated = report.deactivated.len(),
                            titled = report.titles.generated,
                            "Scheduler tick"
                        );
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }

            info!("Session scheduler stopped");
        });

        SchedulerHandle { shutdown_tx, join }
    }
}

/// Handle to a running scheduler
pub struct SchedulerHandle {
    shutdown_tx: mpsc::Sender<()>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Signal the worker and wait for it to finish its current tick
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.join.await {
            warn!(error = %e, "Session scheduler task ended abnormally");
        }
    }
}
