//! Harness and project configuration
//!
//! Two layers:
//! - [`HarnessConfig`] is resolved once from the process environment at
//!   startup (hosting context, snapshot cache location) and threaded into
//!   the snapshot provider.
//! - [`ProjectConfig`] lives next to the WordPress install as
//!   `wpacceptance.toml` and describes images, timeouts and browser settings.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// File name of the per-project configuration
pub const PROJECT_CONFIG_FILE: &str = "wpacceptance.toml";

/// Hosted CI context the harness is running in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostingContext {
    Local,
    GitLab { project_dir: PathBuf },
}

impl HostingContext {
    /// Detect the hosting context from an environment lookup
    pub fn detect(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let is_gitlab = lookup("GITLAB_CI")
            .map(|v| v == "true")
            .unwrap_or(false);

        match lookup("CI_PROJECT_DIR") {
            Some(dir) if is_gitlab && !dir.is_empty() => HostingContext::GitLab {
                project_dir: PathBuf::from(dir),
            },
            _ => HostingContext::Local,
        }
    }

    /// Snapshot cache directory this context redirects to, if any
    pub fn snapshots_dir(&self) -> Option<PathBuf> {
        match self {
            HostingContext::Local => None,
            HostingContext::GitLab { project_dir } => Some(project_dir.join(".wpsnapshots")),
        }
    }
}

/// Process-level configuration, resolved once and never mutated mid-run
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub hosting: HostingContext,

    /// Where the snapshot provider keeps its cache and repository config
    pub snapshots_dir: PathBuf,

    /// Path to the wpsnapshots executable
    pub wpsnapshots_bin: PathBuf,
}

impl HarnessConfig {
    /// Resolve from the real process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve from an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let hosting = HostingContext::detect(&lookup);

        // Hosted CI wins over WPSNAPSHOTS_DIR so caches land inside the job workspace
        let snapshots_dir = hosting
            .snapshots_dir()
            .or_else(|| lookup("WPSNAPSHOTS_DIR").filter(|d| !d.is_empty()).map(PathBuf::from))
            .unwrap_or_else(default_snapshots_dir);

        let wpsnapshots_bin = lookup("WPACCEPTANCE_WPSNAPSHOTS_BIN")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("wpsnapshots"));

        Self {
            hosting,
            snapshots_dir,
            wpsnapshots_bin,
        }
    }
}

/// Default snapshot cache location
pub fn default_snapshots_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".wpsnapshots")
}

/// Project configuration stored in `wpacceptance.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name
    pub name: String,

    /// Snapshot to test against when `--snapshot_id` is not given
    #[serde(default)]
    pub snapshot_id: Option<String>,

    /// Directory with YAML test cases, relative to the config file
    #[serde(default = "default_tests_dir")]
    pub tests_dir: PathBuf,

    /// Directory for results and screenshots, relative to the config file
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default)]
    pub environment: EnvironmentSettings,

    #[serde(default)]
    pub browser: BrowserSettings,
}

fn default_tests_dir() -> PathBuf {
    PathBuf::from("tests")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("test-results")
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: "wpacceptance".to_string(),
            snapshot_id: None,
            tests_dir: default_tests_dir(),
            output_dir: default_output_dir(),
            environment: EnvironmentSettings::default(),
            browser: BrowserSettings::default(),
        }
    }
}

/// How an environment is built from a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentSettings {
    /// Image serving WordPress over HTTP on port 80
    pub wordpress_image: String,

    /// Database image; loads `*.sql.gz` from its init directory
    pub mysql_image: String,

    pub db_name: String,
    pub db_user: String,
    pub db_password: String,

    /// Seconds to wait for the site to answer health checks
    pub startup_timeout_secs: u64,

    /// Rewrite the snapshot's site URL to the environment URL
    pub rewrite_urls: bool,
}

impl Default for EnvironmentSettings {
    fn default() -> Self {
        Self {
            wordpress_image: "wordpress:php8.2-apache".to_string(),
            mysql_image: "mysql:8.0".to_string(),
            db_name: "wordpress".to_string(),
            db_user: "wordpress".to_string(),
            db_password: "password".to_string(),
            startup_timeout_secs: 120,
            rewrite_urls: true,
        }
    }
}

/// Browser family requested from the WebDriver server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    #[default]
    Chrome,
    Firefox,
}

impl BrowserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserKind::Chrome => "chrome",
            BrowserKind::Firefox => "firefox",
        }
    }
}

impl std::str::FromStr for BrowserKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "chrome" | "chromium" => Ok(BrowserKind::Chrome),
            "firefox" => Ok(BrowserKind::Firefox),
            other => Err(Error::InvalidConfig(format!("unknown browser '{}'", other))),
        }
    }
}

/// WebDriver session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// WebDriver server (chromedriver, geckodriver or Selenium)
    pub webdriver_url: String,
    pub browser: BrowserKind,
    pub headless: bool,

    /// Polling budget for `get_element` and `wait` steps
    pub implicit_wait_ms: u64,

    pub window_width: u32,
    pub window_height: u32,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            webdriver_url: "http://127.0.0.1:4444".to_string(),
            browser: BrowserKind::Chrome,
            headless: true,
            implicit_wait_ms: 5000,
            window_width: 1280,
            window_height: 720,
        }
    }
}

impl ProjectConfig {
    /// Load configuration from file, falling back to defaults when absent
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.environment.startup_timeout_secs == 0 {
            return Err(Error::InvalidConfig(
                "environment.startup_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.name.trim().is_empty() {
            return Err(Error::InvalidConfig("name must not be empty".to_string()));
        }
        Ok(())
    }

    /// Tests directory resolved against the project root
    pub fn tests_path(&self, root: &Path) -> PathBuf {
        root.join(&self.tests_dir)
    }

    /// Output directory resolved against the project root
    pub fn output_path(&self, root: &Path) -> PathBuf {
        root.join(&self.output_dir)
    }
}
