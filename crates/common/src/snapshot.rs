//! Snapshot provider contract and the wpsnapshots adapter
//!
//! Snapshots are produced and stored by the external `wpsnapshots` tool.
//! This module only reads its local cache layout and shells out to it:
//!
//! ```text
//! <snapshots_dir>/
//!   config.json            repository configuration
//!   <id>/meta.json         creation metadata
//!   <id>/data.sql.gz       database dump
//!   <id>/files.tar.gz      wp-content tree (optional)
//! ```

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::HarnessConfig;
use crate::error::{Error, Result};

pub const DB_DUMP_FILE: &str = "data.sql.gz";
pub const FILES_ARCHIVE: &str = "files.tar.gz";
pub const META_FILE: &str = "meta.json";
pub const REPOSITORY_CONFIG_FILE: &str = "config.json";

/// A cached, immutable snapshot
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub id: String,
    pub dir: PathBuf,
    pub meta: SnapshotMeta,
}

impl Snapshot {
    pub fn db_dump(&self) -> PathBuf {
        self.dir.join(DB_DUMP_FILE)
    }

    /// File archive, if the snapshot carries one
    pub fn files_archive(&self) -> Option<PathBuf> {
        let path = self.dir.join(FILES_ARCHIVE);
        path.is_file().then_some(path)
    }

    /// Home URL the site was captured with
    pub fn site_url(&self) -> Option<&str> {
        self.meta
            .sites
            .first()
            .and_then(|s| s.home.as_deref().or(s.siteurl.as_deref()))
    }
}

/// Metadata written by wpsnapshots next to the dump
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotMeta {
    pub project: String,
    pub description: String,
    pub author: Option<SnapshotAuthor>,
    pub repository: Option<String>,
    pub multisite: bool,
    pub sites: Vec<SnapshotSite>,
    pub table_prefix: Option<String>,
    pub wp_version: Option<String>,
    /// Unix timestamp
    pub created: Option<i64>,
}

impl SnapshotMeta {
    pub fn created_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.created
            .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotAuthor {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotSite {
    pub blog_id: Option<u64>,
    pub domain: Option<String>,
    pub path: Option<String>,
    #[serde(alias = "site_url")]
    pub siteurl: Option<String>,
    #[serde(alias = "home_url")]
    pub home: Option<String>,
}

/// Request to capture a new snapshot from a live install
#[derive(Debug, Clone)]
pub struct CreateSnapshot {
    pub path: PathBuf,
    pub db_host: Option<String>,
    pub db_name: Option<String>,
    pub db_user: Option<String>,
    pub db_password: Option<String>,
    pub project: String,
    pub description: String,
    pub scrub: bool,
    pub exclude_uploads: bool,
}

impl CreateSnapshot {
    /// Defaults used by the run command when no snapshot id is given
    pub fn for_run(path: PathBuf) -> Self {
        Self {
            path,
            db_host: None,
            db_name: None,
            db_user: None,
            db_password: None,
            project: "WPAcceptance Snapshot".to_string(),
            description: "WPAcceptance project".to_string(),
            scrub: true,
            exclude_uploads: true,
        }
    }

    /// Command line arguments for `wpsnapshots create`
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "create".to_string(),
            format!("--path={}", self.path.display()),
        ];

        let creds = [
            ("db_host", &self.db_host),
            ("db_name", &self.db_name),
            ("db_user", &self.db_user),
            ("db_password", &self.db_password),
        ];
        for (flag, value) in creds {
            if let Some(v) = value {
                args.push(format!("--{}={}", flag, v));
            }
        }

        args.push(format!("--slug={}", slugify(&self.project)));
        args.push(format!("--description={}", self.description));

        if !self.scrub {
            args.push("--no_scrub".to_string());
        }
        if self.exclude_uploads {
            args.push("--exclude_uploads".to_string());
        }
        args
    }
}

fn slugify(s: &str) -> String {
    s.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Source of snapshots for the run command
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    /// Check the snapshot repository is reachable/configured
    async fn connect(&self) -> Result<()>;

    /// Whether the snapshot is already in the local cache
    fn is_cached(&self, id: &str) -> bool;

    /// Load a cached snapshot
    fn resolve(&self, id: &str) -> Result<Snapshot>;

    /// Fetch a snapshot by id into the local cache
    async fn download(&self, id: &str) -> Result<Snapshot>;

    /// Capture a new snapshot from a live install
    async fn create(&self, request: &CreateSnapshot) -> Result<Snapshot>;
}

/// Snapshot provider backed by the `wpsnapshots` CLI and its cache directory
pub struct WpSnapshotsProvider {
    snapshots_dir: PathBuf,
    binary: PathBuf,
}

impl WpSnapshotsProvider {
    pub fn new(config: &HarnessConfig) -> Self {
        Self {
            snapshots_dir: config.snapshots_dir.clone(),
            binary: config.wpsnapshots_bin.clone(),
        }
    }

    fn snapshot_dir(&self, id: &str) -> PathBuf {
        self.snapshots_dir.join(id)
    }

    /// Run a wpsnapshots subcommand and return its combined output
    async fn run_tool(&self, args: &[String]) -> Result<std::result::Result<String, String>> {
        debug!("Running {} {}", self.binary.display(), args.join(" "));

        let output = Command::new(&self.binary)
            .args(args)
            .env("WPSNAPSHOTS_DIR", &self.snapshots_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::SnapshotToolNotFound
                } else {
                    Error::Io(e)
                }
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if output.status.success() {
            Ok(Ok(format!("{}{}", stdout, stderr)))
        } else {
            Ok(Err(if stderr.trim().is_empty() { stdout } else { stderr }))
        }
    }
}

#[async_trait]
impl SnapshotProvider for WpSnapshotsProvider {
    async fn connect(&self) -> Result<()> {
        let path = self.snapshots_dir.join(REPOSITORY_CONFIG_FILE);
        let content = tokio::fs::read_to_string(&path).await.map_err(|e| Error::Connection {
            reason: format!("{}: {}", path.display(), e),
        })?;
        let value: serde_json::Value =
            serde_json::from_str(&content).map_err(|e| Error::Connection {
                reason: format!("{}: {}", path.display(), e),
            })?;

        if has_repository(&value) {
            debug!("Snapshot repository configured in {}", path.display());
            Ok(())
        } else {
            Err(Error::Connection {
                reason: format!("no repository configured in {}", path.display()),
            })
        }
    }

    fn is_cached(&self, id: &str) -> bool {
        self.snapshot_dir(id).join(DB_DUMP_FILE).is_file()
    }

    fn resolve(&self, id: &str) -> Result<Snapshot> {
        if !self.is_cached(id) {
            return Err(Error::SnapshotNotFound { id: id.to_string() });
        }

        let dir = self.snapshot_dir(id);
        let meta_path = dir.join(META_FILE);
        let meta = if meta_path.is_file() {
            serde_json::from_str(&std::fs::read_to_string(&meta_path)?)?
        } else {
            SnapshotMeta::default()
        };

        Ok(Snapshot {
            id: id.to_string(),
            dir,
            meta,
        })
    }

    async fn download(&self, id: &str) -> Result<Snapshot> {
        info!("Downloading snapshot {}...", id);

        let args = vec!["download".to_string(), id.to_string()];
        match self.run_tool(&args).await? {
            Ok(_) => self.resolve(id).map_err(|e| Error::SnapshotDownload {
                id: id.to_string(),
                reason: e.to_string(),
            }),
            Err(output) => Err(Error::SnapshotDownload {
                id: id.to_string(),
                reason: output.trim().to_string(),
            }),
        }
    }

    async fn create(&self, request: &CreateSnapshot) -> Result<Snapshot> {
        match self.run_tool(&request.to_args()).await? {
            Ok(output) => {
                let id = parse_snapshot_id(&output).ok_or_else(|| {
                    Error::SnapshotCreate("no snapshot id in wpsnapshots output".to_string())
                })?;
                self.resolve(&id)
            }
            Err(output) => Err(Error::SnapshotCreate(output.trim().to_string())),
        }
    }
}

fn has_repository(value: &serde_json::Value) -> bool {
    let nested = value
        .get("repositories")
        .and_then(|r| r.as_object())
        .map(|r| !r.is_empty())
        .unwrap_or(false);
    let flat = value
        .get("repository")
        .and_then(|r| r.as_str())
        .map(|r| !r.is_empty())
        .unwrap_or(false);
    nested || flat
}

/// Extract the last 32-character hex id from wpsnapshots output
pub fn parse_snapshot_id(output: &str) -> Option<String> {
    let re = Regex::new(r"\b([0-9a-f]{32})\b").ok()?;
    re.captures_iter(output)
        .last()
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
