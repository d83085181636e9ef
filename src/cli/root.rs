use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::{path::PathBuf, sync::Arc};
use tracing::{debug, info, warn};

use super::{
    transfer::{ExportCommand, ImportCommand},
    watch::WatchCommand,
};
use crate::commands::{CommandContext, CommandHandler, CommandOutput, DeleteTarget, SessionCommand};
use crate::config::Config;
use crate::llm::ProviderFactory;
use crate::session::{now, EventSender, SessionManager, TitleGenerator, TitleSettings};

/// Colloquy - conversation sessions between players and characters
#[derive(Parser, Debug)]
#[command(
    name = "colloquy",
    version,
    about = "Inspect and maintain conversation sessions",
    long_about = r#"Colloquy stores conversation sessions between pairs of participants,
titles them in the background and lets you search, export and prune them.

Examples:
  colloquy history 10                 # Ten most recent sessions
  colloquy search launch              # Sessions about launches
  colloquy export -o backup.json      # Dump every session
  colloquy delete old 30              # Prune sessions idle for a month
  colloquy watch                      # Run sweeps and titling until Ctrl-C"#
)]
pub struct Cli {
    /// Directory holding the session database
    #[arg(short = 'D', long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short = 'd', long = "debug", global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the most recently active sessions
    History {
        /// How many sessions to show
        limit: Option<usize>,
    },

    /// Search session titles and keywords
    Search {
        #[arg(required = true)]
        query: Vec<String>,
    },

    /// Write every session to a JSON file
    Export(ExportCommand),

    /// Load sessions from an export file
    Import(ImportCommand),

    /// Delete sessions
    Delete {
        #[command(subcommand)]
        target: DeleteCommand,
    },

    /// Deactivate sessions idle past the inactivity timeout
    Sweep,

    /// Generate titles for every eligible session once
    Titles,

    /// Run the background scheduler until interrupted
    Watch(WatchCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum DeleteCommand {
    /// Delete every session
    All,
    /// Delete one session by id
    Session { id: String },
    /// Delete entries START..=END of `history` (1-based)
    Range { start: usize, end: usize },
    /// Delete sessions idle for more than DAYS days
    Old { days: u32 },
}

impl From<DeleteCommand> for DeleteTarget {
    fn from(command: DeleteCommand) -> Self {
        match command {
            DeleteCommand::All => DeleteTarget::All,
            DeleteCommand::Session { id } => DeleteTarget::Session(id),
            DeleteCommand::Range { start, end } => DeleteTarget::Range { start, end },
            DeleteCommand::Old { days } => DeleteTarget::OlderThan { days },
        }
    }
}

/// Opened session store plus the optional title generator
pub struct Services {
    pub config: Config,
    pub manager: Arc<SessionManager>,
    pub titles: Option<Arc<TitleGenerator>>,
}

impl Services {
    pub async fn open(config: Config, events: EventSender) -> Result<Self> {
        config.validate()?;

        let manager = SessionManager::new(&config.data_dir, config.session_settings())
            .await
            .with_context(|| format!("Failed to open sessions in {}", config.data_dir.display()))?
            .with_events(events.clone());
        let manager = Arc::new(manager);

        let titles = ProviderFactory::create_generator(config.provider_config())?.map(|generator| {
            info!(provider = generator.name(), model = generator.model(), "Title generation enabled");
            Arc::new(
                TitleGenerator::new(
                    manager.database().clone(),
                    generator,
                    TitleSettings::from(manager.settings()),
                )
                .with_events(events),
            )
        });

        Ok(Self {
            config,
            manager,
            titles,
        })
    }

    pub fn command_handler(&self) -> CommandHandler {
        CommandHandler::new(self.manager.clone(), self.titles.clone())
            .with_history_limit(self.config.history_limit)
    }

    /// Run a session command and print its text
    pub async fn run_command(&self, command: SessionCommand) -> Result<()> {
        match self
            .command_handler()
            .execute(command, &CommandContext::default())
            .await
        {
            Ok(CommandOutput::Text(text)) => println!("{}", text),
            Ok(CommandOutput::Export { json, .. }) => println!("{}", json),
            Ok(CommandOutput::Error(message)) => return Err(anyhow!(message)),
            Err(e) => {
                let message = e.user_message();
                return Err(anyhow::Error::new(e).context(message));
            }
        }
        Ok(())
    }
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        if self.debug {
            debug!("Debug logging enabled");
        }

        let mut config = Config::init().await?;
        if let Some(data_dir) = self.data_dir {
            config.data_dir = data_dir;
        }
        debug!(data_dir = %config.data_dir.display(), "Configuration initialized");

        match self.command {
            Commands::History { limit } => {
                let services = Services::open(config, EventSender::default()).await?;
                services.run_command(SessionCommand::History { limit }).await
            }
            Commands::Search { query } => {
                let services = Services::open(config, EventSender::default()).await?;
                services
                    .run_command(SessionCommand::Search {
                        query: query.join(" "),
                    })
                    .await
            }
            Commands::Delete { target } => {
                let services = Services::open(config, EventSender::default()).await?;
                services.run_command(SessionCommand::Delete(target.into())).await
            }
            Commands::Export(export) => {
                let services = Services::open(config, EventSender::default()).await?;
                export.execute(&services).await
            }
            Commands::Import(import) => {
                let services = Services::open(config, EventSender::default()).await?;
                import.execute(&services).await
            }
            Commands::Sweep => {
                let services = Services::open(config, EventSender::default()).await?;
                let deactivated = services.manager.sweep_idle(now()).await?;
                println!("Deactivated {} idle session(s).", deactivated.len());
                Ok(())
            }
            Commands::Titles => {
                let services = Services::open(config, EventSender::default()).await?;
                let Some(titles) = &services.titles else {
                    warn!("Title generation is disabled (provider = none)");
                    return Ok(());
                };
                let report = titles.tick().await;
                println!(
                    "Titled {}, failed {}, skipped {}.",
                    report.generated, report.failed, report.skipped
                );
                Ok(())
            }
            Commands::Watch(watch) => watch.execute(config).await,
        }
    }
}
