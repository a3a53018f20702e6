//! WPAcceptance Common Library
//!
//! Configuration, snapshot provider contract, WordPress path discovery and
//! the error type shared by the environment crate and the CLI.

pub mod config;
pub mod error;
pub mod snapshot;
pub mod wordpress;

pub use config::{BrowserKind, BrowserSettings, EnvironmentSettings, HarnessConfig, HostingContext, ProjectConfig};
pub use error::{Error, Result};
pub use snapshot::{CreateSnapshot, Snapshot, SnapshotMeta, SnapshotProvider, WpSnapshotsProvider};
pub use wordpress::{find_wordpress_path, resolve_wordpress_path};

/// WPAcceptance version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
