//! In-process implementation of the `store_api` backend contract.
//!
//! Used by the chat client's CLI and by tests. Documents live in memory and
//! can optionally be mirrored to a JSON file.

pub mod auth;
pub mod events;
pub mod persist;
pub mod store;

pub use auth::MemoryAuth;
pub use store::MemoryStore;

use directories::ProjectDirs;
use std::path::PathBuf;

/// Default location of the persisted document snapshot.
pub fn default_data_file() -> Option<PathBuf> {
    let proj = ProjectDirs::from("org", "friendchat", "friendchat")?;
    Some(proj.data_dir().join("documents.json"))
}

/// Current time as epoch milliseconds.
pub fn now_millis() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
