mod config_cmd;
mod record;
mod settings_cmd;
mod sync_cmd;

pub use config_cmd::ConfigCommand;
pub use record::RecordCommand;
pub use settings_cmd::SettingsCommand;
pub use sync_cmd::{try_auto_sync, SyncCommand};
