//! Error types for WPAcceptance

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the WPAcceptance error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised before an environment exists: snapshot backend,
/// WordPress path discovery and project configuration.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config write error: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("Could not connect to WP Snapshots repository.")]
    Connection { reason: String },

    #[error("This does not seem to be a WordPress installation. No wp-config.php found in directory tree.")]
    PathNotFound { searched_from: PathBuf },

    #[error("Snapshot {id} is not in the local cache")]
    SnapshotNotFound { id: String },

    #[error("Could not download snapshot. Does it exist?")]
    SnapshotDownload { id: String, reason: String },

    #[error("Could not create snapshot: {0}")]
    SnapshotCreate(String),

    #[error("wpsnapshots not found. Install with: composer global require 10up/wpsnapshots")]
    SnapshotToolNotFound,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Underlying detail that is kept out of the user-facing message
    pub fn detail(&self) -> Option<&str> {
        match self {
            Error::Connection { reason } => Some(reason),
            Error::SnapshotDownload { reason, .. } => Some(reason),
            _ => None,
        }
    }
}
