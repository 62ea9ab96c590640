//! Sync CLI commands.

use clap::{Args, Subcommand};

use daybook::config::Config;
use daybook::db::RecordRepository;
use daybook::sync::{
    HttpPeer, NodeConfig, RemotePeer, SkipReason, SyncError, SyncOrchestrator, SyncOutcome,
};

/// Sync with the configured server
#[derive(Args)]
pub struct SyncCommand {
    #[command(subcommand)]
    command: Option<SyncSubcommand>,
}

#[derive(Subcommand)]
enum SyncSubcommand {
    /// Show sync configuration and server status
    Status,
}

impl SyncCommand {
    pub async fn run(
        &self,
        orchestrator: &SyncOrchestrator,
        repo: &RecordRepository,
        config: &Config,
    ) -> Result<(), SyncError> {
        match &self.command {
            None => self.sync(orchestrator).await,
            Some(SyncSubcommand::Status) => self.status(repo, config).await,
        }
    }

    async fn sync(&self, orchestrator: &SyncOrchestrator) -> Result<(), SyncError> {
        println!("Syncing with server...");

        match orchestrator.run_sync_cycle().await? {
            SyncOutcome::Completed(report) => {
                if report.changed {
                    println!("✓ updated");
                } else {
                    println!("✓ up to date");
                }
                println!(
                    "  {} record(s), {} deletion(s) known",
                    report.records, report.tombstones
                );
            }
            SyncOutcome::Skipped(reason) => {
                println!("Skipped: {}", reason);
                if reason != SkipReason::ServerRole {
                    println!();
                    print_setup_hint();
                }
            }
            SyncOutcome::AlreadyRunning => println!("A sync is already in progress"),
        }
        Ok(())
    }

    async fn status(&self, repo: &RecordRepository, config: &Config) -> Result<(), SyncError> {
        let node = NodeConfig::resolve(&config.sync, &repo.settings().await);

        println!("Sync Configuration");
        println!("==================");
        println!();
        println!("Role:      {}", node.role);
        println!(
            "Server:    {}",
            node.server_url.as_deref().unwrap_or("(not set)")
        );
        println!("Enabled:   {}", if node.enabled { "yes" } else { "no" });
        println!("Interval:  {}s", node.interval.as_secs());
        println!(
            "Auto-sync: {}",
            if config.sync.auto_sync {
                "enabled"
            } else {
                "disabled"
            }
        );
        println!();

        let server_url = match node.target() {
            Ok(url) => url.to_string(),
            Err(reason) => {
                println!("Status: not syncing ({})", reason);
                if reason != SkipReason::ServerRole {
                    println!();
                    print_setup_hint();
                }
                return Ok(());
            }
        };

        print!("Server status: ");
        let peer = HttpPeer::new(node.timeout)?;
        match peer.fetch(&server_url).await {
            Ok(snapshot) => println!("✓ connected ({} record(s))", snapshot.record_count()),
            Err(SyncError::Network(_)) => println!("✗ unreachable"),
            Err(e) => println!("✗ error: {}", e),
        }

        Ok(())
    }
}

fn print_setup_hint() {
    println!("To enable sync, add to your config file:");
    println!();
    println!("  sync:");
    println!("    enabled: true");
    println!("    server_url: \"http://localhost:8080\"");
    println!();
    println!("Or set environment variables:");
    println!("  DAYBOOK_SYNC_ENABLED=true");
    println!("  DAYBOOK_SYNC_URL");
}

/// Runs a sync cycle after a write when `auto_sync` is enabled.
///
/// Skips are silent and failures are only reported, so the CLI keeps working
/// offline.
pub async fn try_auto_sync(config: &Config, orchestrator: &SyncOrchestrator) {
    if !config.sync.auto_sync {
        return;
    }

    match orchestrator.run_sync_cycle().await {
        Ok(_) => {}
        Err(e) => eprintln!("Auto-sync: {}", e),
    }
}
