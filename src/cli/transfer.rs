use anyhow::{Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::root::Services;
use crate::session::{ExportPayload, ImportSummary};

/// Write every session to a JSON file
#[derive(Args, Debug)]
pub struct ExportCommand {
    /// Output file; defaults to sessions-<timestamp>.json in the current directory
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
}

impl ExportCommand {
    pub async fn execute(&self, services: &Services) -> Result<()> {
        let payload = services.manager.database().export_all().await?;
        let path = self.output.clone().unwrap_or_else(|| {
            PathBuf::from(format!(
                "sessions-{}.json",
                payload.exported_at.format("%Y%m%d-%H%M%S")
            ))
        });

        write_export(&path, &payload).await?;
        println!(
            "Exported {} session(s) to {}",
            payload.sessions.len(),
            path.display()
        );
        Ok(())
    }
}

/// Load sessions from an export file
#[derive(Args, Debug)]
pub struct ImportCommand {
    /// Export file to read
    pub file: PathBuf,
}

impl ImportCommand {
    pub async fn execute(&self, services: &Services) -> Result<()> {
        let summary = import_file(services, &self.file).await?;
        debug!(records = summary.total(), "Import finished");
        println!(
            "Imported {} session(s) and {} chat log(s) from {}",
            summary.sessions,
            summary.chat_logs,
            self.file.display()
        );
        Ok(())
    }
}

pub async fn write_export(path: &Path, payload: &ExportPayload) -> Result<()> {
    let json = serde_json::to_string_pretty(payload).context("Failed to serialize sessions")?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), sessions = payload.sessions.len(), "Wrote session export");
    Ok(())
}

pub async fn read_export(path: &Path) -> Result<ExportPayload> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("{} is not a session export", path.display()))
}

pub async fn import_file(services: &Services, path: &Path) -> Result<ImportSummary> {
    let payload = read_export(path).await?;
    let summary = services
        .manager
        .database()
        .import_all(payload)
        .await
        .with_context(|| format!("Failed to import {}", path.display()))?;
    Ok(summary)
}
