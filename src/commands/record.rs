use clap::{Args, Subcommand, ValueEnum};
use serde_json::Value;
use uuid::Uuid;

use daybook::db::RecordRepository;
use daybook::models::{timestamp, Collection, Record};

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Args)]
pub struct RecordCommand {
    #[command(subcommand)]
    pub command: RecordSubcommand,
}

#[derive(Subcommand)]
pub enum RecordSubcommand {
    /// List the records of a collection
    List {
        /// Collection name (e.g. tasks, notes, pomodoroSessions)
        collection: Collection,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Create or replace a record from a JSON object
    Put {
        /// Collection name
        collection: Collection,

        /// Record as a JSON object; an id is generated when missing
        json: String,
    },

    /// Delete a record and remember the deletion for sync
    Delete {
        /// Collection name
        collection: Collection,

        /// Record id
        id: String,
    },
}

impl RecordSubcommand {
    pub fn is_write(&self) -> bool {
        !matches!(self, RecordSubcommand::List { .. })
    }
}

impl RecordCommand {
    pub async fn run(&self, repo: &RecordRepository) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            RecordSubcommand::List { collection, format } => {
                let records = repo.list(*collection).await;

                if records.is_empty() {
                    println!("No {} found", collection);
                    return Ok(());
                }

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&records)?);
                    }
                    OutputFormat::Text => {
                        println!("{:<36}  {:<24}  SUMMARY", "ID", "UPDATED");
                        println!("{}", "-".repeat(80));
                        for record in &records {
                            let updated = record
                                .updated_at
                                .as_ref()
                                .map(timestamp::format)
                                .unwrap_or_else(|| "-".to_string());
                            println!("{:<36}  {:<24}  {}", record.id, updated, summary(record));
                        }
                        println!("\nTotal: {} record(s)", records.len());
                    }
                }
                Ok(())
            }

            RecordSubcommand::Put { collection, json } => {
                let record = parse_record(json)?;
                let saved = repo.upsert(*collection, record).await?;
                println!("Saved {} record {}", collection, saved.id);
                Ok(())
            }

            RecordSubcommand::Delete { collection, id } => {
                if repo.delete(*collection, id).await? {
                    println!("Deleted {} record {}", collection, id);
                } else {
                    println!("No {} record {}; deletion recorded anyway", collection, id);
                }
                Ok(())
            }
        }
    }
}

/// Parses a record from user input, generating an id if none is given.
fn parse_record(input: &str) -> Result<Record, String> {
    let mut value: Value =
        serde_json::from_str(input).map_err(|e| format!("Invalid JSON: {}", e))?;
    let object = value
        .as_object_mut()
        .ok_or_else(|| "Record must be a JSON object".to_string())?;

    match object.get("id") {
        None | Some(Value::Null) => {
            object.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
        }
        Some(Value::String(id)) if !id.trim().is_empty() => {}
        Some(_) => return Err("Record id must be a non-empty string".to_string()),
    }

    serde_json::from_value(value).map_err(|e| format!("Invalid record: {}", e))
}

/// First human-readable field of a record, truncated for table output.
fn summary(record: &Record) -> String {
    let text = ["title", "name", "front", "body"]
        .iter()
        .find_map(|key| record.field(key).and_then(Value::as_str))
        .unwrap_or("");
    if text.chars().count() > 40 {
        format!("{}...", text.chars().take(37).collect::<String>())
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_record_generates_id() {
        let record = parse_record(r#"{"title": "Buy milk"}"#).unwrap();
        assert!(Uuid::parse_str(&record.id).is_ok());
        assert_eq!(record.field("title"), Some(&json!("Buy milk")));
    }

    #[test]
    fn test_parse_record_keeps_given_id_and_timestamps() {
        let record =
            parse_record(r#"{"id": "t-1", "createdAt": 1000, "done": true}"#).unwrap();
        assert_eq!(record.id, "t-1");
        assert_eq!(record.created_at, timestamp::from_millis(1000));
        assert_eq!(record.field("done"), Some(&json!(true)));
    }

    #[test]
    fn test_parse_record_rejects_bad_input() {
        assert!(parse_record("[]").is_err());
        assert!(parse_record("{oops").is_err());
        assert!(parse_record(r#"{"id": 7}"#).is_err());
        assert!(parse_record(r#"{"id": "  "}"#).is_err());
    }

    #[test]
    fn test_summary_truncates() {
        let record = Record::with_id("x").with_field("title", "a".repeat(50));
        assert_eq!(summary(&record), format!("{}...", "a".repeat(37)));

        let card = Record::with_id("y").with_field("front", "hola");
        assert_eq!(summary(&card), "hola");
    }
}
