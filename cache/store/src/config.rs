//! Store configuration: file path, open mode, corruption and durability
//! policies.

use serde::Deserialize;
use std::path::PathBuf;

/// Recovery behavior when the database file fails to open cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CorruptionPolicy {
    /// Terminate the whole process. For deployments where a damaged cache
    /// must never be silently discarded.
    Exit,
    /// Move the damaged file aside under a new name and start fresh.
    #[default]
    Rename,
    /// Delete the damaged file and start fresh.
    Replace,
}

/// Durability level, trading write latency for crash-durability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncLevel {
    /// No forced flush.
    Off,
    /// Flush on commit.
    #[default]
    Normal,
    /// Full flush including directory metadata.
    Full,
}

impl SyncLevel {
    /// The `PRAGMA synchronous` statement selecting this level.
    pub fn pragma(self) -> &'static str {
        match self {
            SyncLevel::Off => PRAGMA_SYNC_OFF,
            SyncLevel::Normal => PRAGMA_SYNC_NORMAL,
            SyncLevel::Full => PRAGMA_SYNC_FULL,
        }
    }
}

pub(crate) const PRAGMA_SYNC_OFF: &str = "PRAGMA synchronous = OFF";
pub(crate) const PRAGMA_SYNC_NORMAL: &str = "PRAGMA synchronous = NORMAL";
pub(crate) const PRAGMA_SYNC_FULL: &str = "PRAGMA synchronous = FULL";

/// Configuration for opening a [`Store`](crate::Store).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Path of the database file.
    pub path: PathBuf,

    /// Open the store read-only. The file must already exist and no schema
    /// bootstrap is attempted.
    #[serde(default)]
    pub read_only: bool,

    /// Recovery behavior on a damaged file.
    #[serde(default)]
    pub corruption: CorruptionPolicy,

    /// Durability level.
    #[serde(default)]
    pub sync: SyncLevel,
}

impl StoreConfig {
    /// Configuration with default policies for the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        StoreConfig {
            path: path.into(),
            read_only: false,
            corruption: CorruptionPolicy::default(),
            sync: SyncLevel::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::new("/tmp/cache.db");
        assert!(!config.read_only);
        assert_eq!(config.corruption, CorruptionPolicy::Rename);
        assert_eq!(config.sync, SyncLevel::Normal);
    }

    #[test]
    fn test_sync_pragmas() {
        assert_eq!(SyncLevel::Off.pragma(), "PRAGMA synchronous = OFF");
        assert_eq!(SyncLevel::Normal.pragma(), "PRAGMA synchronous = NORMAL");
        assert_eq!(SyncLevel::Full.pragma(), "PRAGMA synchronous = FULL");
    }
}
