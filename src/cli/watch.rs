use anyhow::{Context, Result};
use clap::Args;
use humantime::Duration as HumanDuration;
use tracing::info;

use super::root::Services;
use crate::config::Config;
use crate::session::{EventSender, SessionEvent, SessionScheduler};

/// Run the background scheduler until interrupted
#[derive(Args, Debug)]
pub struct WatchCommand {
    /// Override the tick interval, e.g. "2s"
    #[arg(short = 'i', long = "interval")]
    pub interval: Option<HumanDuration>,
}

impl WatchCommand {
    pub async fn execute(&self, mut config: Config) -> Result<()> {
        if let Some(interval) = self.interval {
            config.tick_interval = interval.into();
        }

        let (events, mut event_rx) = EventSender::channel();
        let services = Services::open(config, events).await?;

        // Log lifecycle events as they happen
        let event_logger = tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                log_event(&event);
            }
        });

        let scheduler = SessionScheduler::new(services.manager.clone(), services.titles.clone());
        let handle = scheduler.start();

        wait_for_shutdown().await?;

        handle.stop().await;
        services.manager.database().flush().await?;
        event_logger.abort();

        info!("Watch finished");
        Ok(())
    }
}

fn log_event(event: &SessionEvent) {
    match event {
        SessionEvent::Deactivated { session_id } => info!(session_id = %session_id, "Session went idle"),
        SessionEvent::Titled {
            session_id,
            title: Some(title),
        } => info!(session_id = %session_id, title = %title, "Session titled"),
        SessionEvent::Titled {
            session_id,
            title: None,
        } => info!(session_id = %session_id, "Session could not be titled"),
        other => tracing::debug!(event = ?other, "Session event"),
    }
}

async fn wait_for_shutdown() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
        let mut sigterm = signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;

        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down gracefully");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down gracefully");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl+C")?;
        info!("Received Ctrl+C, shutting down gracefully");
    }

    Ok(())
}
