use clap::{Args, Subcommand, ValueEnum};

use daybook::config::Config;

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

impl ConfigCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => {
                        println!("Configuration");
                        println!("=============\n");

                        if let Some(path) = &config.config_file {
                            println!("Config file: {}", path.display());
                        } else {
                            println!(
                                "Config file: {} (not found)",
                                Config::default_config_path().display()
                            );
                        }
                        println!();

                        println!(
                            "database_path: {}",
                            config.database_path.value.display()
                        );
                        println!("  source: {}", config.database_path.source);
                        println!();

                        let sync = &config.sync;
                        println!("sync:");
                        println!("  role: {}", sync.role);
                        println!(
                            "  server_url: {}",
                            sync.server_url.as_deref().unwrap_or("(not set)")
                        );
                        println!("  enabled: {}", sync.enabled);
                        println!("  interval_secs: {}", sync.interval_secs);
                        println!("  timeout_secs: {}", sync.timeout_secs);
                        println!("  auto_sync: {}", sync.auto_sync);
                        println!();

                        println!("server:");
                        println!("  port: {}", config.server.port);
                        println!("  max_body_bytes: {}", config.server.max_body_bytes);
                    }
                }
                Ok(())
            }
        }
    }
}
