mod collection;
mod deletion;
mod record;
mod settings;
mod snapshot;
pub mod timestamp;

pub use collection::Collection;
pub use deletion::{Deletion, DeletionLog};
pub use record::Record;
pub use settings::{Settings, NODE_LOCAL_KEYS, UPDATED_AT_KEY};
pub use snapshot::{Snapshot, SnapshotError};
