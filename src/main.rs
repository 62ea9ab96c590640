use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{try_auto_sync, ConfigCommand, RecordCommand, SettingsCommand, SyncCommand};
use daybook::config::Config;
use daybook::db::{init_db, RecordRepository, SqliteStore};
use daybook::sync::{ChangeNotifier, HttpPeer, SyncOrchestrator};

#[derive(Parser)]
#[command(name = "daybook")]
#[command(version)]
#[command(about = "Offline-first productivity data with peer sync", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage records (tasks, notes, habits, ...)
    Record(RecordCommand),

    /// Read and change settings
    Settings(SettingsCommand),

    /// Manage configuration
    Config(ConfigCommand),

    /// Sync with remote server
    Sync(SyncCommand),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "daybook=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config)?;

    let command = match cli.command {
        Some(Commands::Config(cmd)) => return cmd.run(&config),
        Some(command) => command,
        None => {
            println!("Use --help to see available commands");
            return Ok(());
        }
    };

    let pool = init_db(config.database_path.value.clone()).await?;
    let store = Arc::new(SqliteStore::new(pool));
    let notifier = ChangeNotifier::new();
    let repo = RecordRepository::new(store.clone(), notifier.clone());
    let peer = HttpPeer::new(Duration::from_secs(config.sync.timeout_secs))?;
    let orchestrator =
        SyncOrchestrator::new(store, Arc::new(peer), config.sync.clone(), notifier);

    let wrote = match &command {
        Commands::Record(cmd) => {
            cmd.run(&repo).await?;
            cmd.command.is_write()
        }
        Commands::Settings(cmd) => {
            cmd.run(&repo).await?;
            cmd.command.is_write()
        }
        Commands::Sync(cmd) => {
            cmd.run(&orchestrator, &repo, &config).await?;
            false
        }
        Commands::Config(_) => false,
    };

    // Auto-sync AFTER write commands (only if command succeeded)
    if wrote {
        try_auto_sync(&config, &orchestrator).await;
    }

    Ok(())
}
