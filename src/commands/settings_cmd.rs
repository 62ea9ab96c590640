use clap::{Args, Subcommand};
use serde_json::Value;

use daybook::db::RecordRepository;
use daybook::models::Settings;

#[derive(Args)]
pub struct SettingsCommand {
    #[command(subcommand)]
    pub command: SettingsSubcommand,
}

#[derive(Subcommand)]
pub enum SettingsSubcommand {
    /// Show one setting, or all of them
    Get {
        /// Settings key
        key: Option<String>,
    },

    /// Set a setting to a JSON value (bare words are stored as strings)
    Set {
        /// Settings key
        key: String,

        /// New value, e.g. 25, true, "dark" or {"a": 1}
        value: String,
    },

    /// Remove a setting
    Unset {
        /// Settings key
        key: String,
    },
}

impl SettingsSubcommand {
    pub fn is_write(&self) -> bool {
        !matches!(self, SettingsSubcommand::Get { .. })
    }
}

impl SettingsCommand {
    pub async fn run(&self, repo: &RecordRepository) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            SettingsSubcommand::Get { key: Some(key) } => {
                let settings = repo.settings().await;
                match settings.get(key) {
                    Some(value) if !value.is_null() => {
                        println!("{}", value);
                        Ok(())
                    }
                    _ => Err(format!("Setting not found: {}", key).into()),
                }
            }

            SettingsSubcommand::Get { key: None } => {
                let settings = repo.settings().await;
                let set: Vec<_> = settings.iter().filter(|(_, v)| !v.is_null()).collect();
                if set.is_empty() {
                    println!("No settings");
                    return Ok(());
                }
                for (key, value) in set {
                    let scope = if Settings::is_node_local(key) {
                        "  (this node only)"
                    } else {
                        ""
                    };
                    println!("{} = {}{}", key, value, scope);
                }
                Ok(())
            }

            SettingsSubcommand::Set { key, value } => {
                if key.trim().is_empty() {
                    return Err("Settings key cannot be empty".into());
                }
                let value = parse_value(value);
                repo.set_setting(key, value.clone()).await?;
                println!("{} = {}", key, value);
                Ok(())
            }

            SettingsSubcommand::Unset { key } => {
                if repo.remove_setting(key).await? {
                    println!("Removed {}", key);
                } else {
                    println!("{} was not set", key);
                }
                Ok(())
            }
        }
    }
}

fn parse_value(input: &str) -> Value {
    serde_json::from_str(input).unwrap_or_else(|_| Value::String(input.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("25"), json!(25));
        assert_eq!(parse_value("true"), json!(true));
        assert_eq!(parse_value("\"dark\""), json!("dark"));
        assert_eq!(parse_value("dark"), json!("dark"));
        assert_eq!(parse_value(r#"{"a": 1}"#), json!({"a": 1}));
    }
}
