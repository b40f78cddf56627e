pub mod event_store;
pub mod kv;
pub mod snapshot;

pub use event_store::SqliteEventStore;
pub use kv::{ConfigBucket, SqliteKv};
pub use snapshot::{LoadedSnapshot, SnapshotPayload, SnapshotStore};
