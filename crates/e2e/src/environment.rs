//! Environment lifecycle - one disposable WordPress instance per snapshot
//!
//! ```text
//! Uninitialized -> Provisioning -> Running -> Destroyed
//!                        |                       ^
//!                        +-----------------------+   (provisioning failed)
//! ```
//!
//! An environment is a network, a MySQL container that loads the snapshot
//! dump on first boot and a WordPress container serving the snapshot's
//! file tree. Every resource is labelled with the environment id so a later
//! process can reap what a killed run left behind.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use url::Url;
use wpacceptance_common::snapshot::DB_DUMP_FILE;
use wpacceptance_common::{EnvironmentSettings, Snapshot};

use crate::container::{ContainerDriver, ContainerSpec, Mount, LABEL_ENVIRONMENT, LABEL_SNAPSHOT};
use crate::error::{E2eError, E2eResult};

/// Port WordPress listens on inside its container
const WORDPRESS_PORT: u16 = 80;

const MYSQL_INIT_DIR: &str = "/docker-entrypoint-initdb.d";
const ROOT_USER: &str = "root";
const WP_CONTENT_DIR: &str = "/var/www/html/wp-content";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentState {
    Uninitialized,
    Provisioning,
    Running,
    Destroyed,
}

impl EnvironmentState {
    fn can_transition_to(self, next: EnvironmentState) -> bool {
        use EnvironmentState::*;
        matches!(
            (self, next),
            (Uninitialized, Provisioning)
                | (Uninitialized, Destroyed)
                | (Provisioning, Running)
                | (Provisioning, Destroyed)
                | (Running, Destroyed)
        )
    }
}

impl fmt::Display for EnvironmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EnvironmentState::Uninitialized => "uninitialized",
            EnvironmentState::Provisioning => "provisioning",
            EnvironmentState::Running => "running",
            EnvironmentState::Destroyed => "destroyed",
        };
        f.write_str(s)
    }
}

/// Database credentials used inside the environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbCredentials {
    pub host: String,
    pub name: String,
    pub user: String,
    pub password: String,
}

/// Values that replace the project's environment defaults for one run
#[derive(Debug, Clone, Default)]
pub struct CredentialOverrides {
    pub db_name: Option<String>,
    pub db_user: Option<String>,
    pub db_password: Option<String>,
}

/// How to build an environment
#[derive(Debug, Clone)]
pub struct EnvironmentOptions {
    pub settings: EnvironmentSettings,
    pub overrides: CredentialOverrides,
    pub startup_timeout: Duration,
    pub poll_interval: Duration,
}

impl EnvironmentOptions {
    pub fn new(settings: EnvironmentSettings) -> Self {
        let startup_timeout = Duration::from_secs(settings.startup_timeout_secs);
        Self {
            settings,
            overrides: CredentialOverrides::default(),
            startup_timeout,
            poll_interval: Duration::from_millis(100),
        }
    }

    pub fn with_overrides(mut self, overrides: CredentialOverrides) -> Self {
        self.overrides = overrides;
        self
    }
}

/// Something the environment created and must release
#[derive(Debug, Clone, PartialEq, Eq)]
enum Resource {
    Network(String),
    Container(String),
}

/// A running (or once-running) WordPress instance
pub struct Environment {
    id: String,
    snapshot_id: String,
    state: EnvironmentState,
    driver: Arc<dyn ContainerDriver>,
    resources: Vec<Resource>,
    files_dir: Option<TempDir>,
    base_url: Option<Url>,
    credentials: DbCredentials,
}

impl Environment {
    fn new(driver: Arc<dyn ContainerDriver>, snapshot_id: &str, options: &EnvironmentOptions) -> Self {
        let id = environment_id(snapshot_id);
        let settings = &options.settings;
        let overrides = &options.overrides;

        let credentials = DbCredentials {
            host: format!("wpa-{}-mysql", id),
            name: overrides.db_name.clone().unwrap_or_else(|| settings.db_name.clone()),
            user: overrides.db_user.clone().unwrap_or_else(|| settings.db_user.clone()),
            password: overrides
                .db_password
                .clone()
                .unwrap_or_else(|| settings.db_password.clone()),
        };

        Self {
            id,
            snapshot_id: snapshot_id.to_string(),
            state: EnvironmentState::Uninitialized,
            driver,
            resources: Vec::new(),
            files_dir: None,
            base_url: None,
            credentials,
        }
    }

    /// Provision an environment from a snapshot and wait until it answers.
    ///
    /// On any failure every resource created so far is released before the
    /// error is returned.
    pub async fn provision(
        driver: Arc<dyn ContainerDriver>,
        snapshot: &Snapshot,
        options: &EnvironmentOptions,
    ) -> E2eResult<Self> {
        let mut env = Self::new(driver, &snapshot.id, options);
        env.transition(EnvironmentState::Provisioning)?;

        info!("Provisioning environment {} from snapshot {}", env.id, snapshot.id);

        match env.bring_up(snapshot, options).await {
            Ok(()) => {
                env.transition(EnvironmentState::Running)?;
                info!("Environment {} is running at {}", env.id, env.display_url());
                Ok(env)
            }
            Err(e) => {
                error!("Provisioning environment {} failed: {}", env.id, e);
                env.destroy().await;
                Err(match e {
                    E2eError::Provision(_) => e,
                    other => E2eError::Provision(other.to_string()),
                })
            }
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn snapshot_id(&self) -> &str {
        &self.snapshot_id
    }

    pub fn state(&self) -> EnvironmentState {
        self.state
    }

    pub fn credentials(&self) -> &DbCredentials {
        &self.credentials
    }

    /// Root address of the site; only available while running
    pub fn base_url(&self) -> E2eResult<&Url> {
        match (&self.base_url, self.state) {
            (Some(url), EnvironmentState::Running) => Ok(url),
            _ => Err(E2eError::NotRunning {
                id: self.id.clone(),
                state: self.state.to_string(),
            }),
        }
    }

    fn display_url(&self) -> String {
        self.base_url
            .as_ref()
            .map(Url::to_string)
            .unwrap_or_default()
    }

    fn network_name(&self) -> String {
        format!("wpa-{}", self.id)
    }

    fn db_container(&self) -> String {
        format!("wpa-{}-mysql", self.id)
    }

    fn wordpress_container(&self) -> String {
        format!("wpa-{}-wordpress", self.id)
    }

    fn labels(&self) -> Vec<(String, String)> {
        vec![
            (LABEL_ENVIRONMENT.to_string(), self.id.clone()),
            (LABEL_SNAPSHOT.to_string(), self.snapshot_id.clone()),
        ]
    }

    fn transition(&mut self, next: EnvironmentState) -> E2eResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(E2eError::InvalidStateTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        debug!("Environment {}: {} -> {}", self.id, self.state, next);
        self.state = next;
        Ok(())
    }

    async fn bring_up(&mut self, snapshot: &Snapshot, options: &EnvironmentOptions) -> E2eResult<()> {
        let settings = &options.settings;
        let network = self.network_name();

        // Track before creating so a half-created resource is still removed
        self.resources.push(Resource::Network(network.clone()));
        self.driver.create_network(&network, &self.labels()).await?;

        let db = self.db_container();
        let db_spec = ContainerSpec {
            name: db.clone(),
            image: settings.mysql_image.clone(),
            network: Some(network.clone()),
            env: mysql_env(&self.credentials),
            labels: self.labels(),
            mounts: vec![Mount {
                host: snapshot.db_dump(),
                container: format!("{}/{}", MYSQL_INIT_DIR, DB_DUMP_FILE),
                read_only: true,
            }],
            publish: None,
        };
        self.resources.push(Resource::Container(db.clone()));
        self.driver.run_container(&db_spec).await?;
        debug!("Database container {} started", db);

        let mut mounts = Vec::new();
        if let Some(archive) = snapshot.files_archive() {
            let dir = extract_files(&archive).await?;
            mounts.push(Mount {
                host: dir.path().to_path_buf(),
                container: WP_CONTENT_DIR.to_string(),
                read_only: false,
            });
            self.files_dir = Some(dir);
        }

        let mut wp_env = vec![
            ("WORDPRESS_DB_HOST".to_string(), self.credentials.host.clone()),
            ("WORDPRESS_DB_NAME".to_string(), self.credentials.name.clone()),
            ("WORDPRESS_DB_USER".to_string(), self.credentials.user.clone()),
            ("WORDPRESS_DB_PASSWORD".to_string(), self.credentials.password.clone()),
        ];
        if let Some(prefix) = &snapshot.meta.table_prefix {
            wp_env.push(("WORDPRESS_TABLE_PREFIX".to_string(), prefix.clone()));
        }

        let wp = self.wordpress_container();
        let wp_spec = ContainerSpec {
            name: wp.clone(),
            image: settings.wordpress_image.clone(),
            network: Some(network),
            env: wp_env,
            labels: self.labels(),
            mounts,
            publish: Some(WORDPRESS_PORT),
        };
        self.resources.push(Resource::Container(wp.clone()));
        self.driver.run_container(&wp_spec).await?;

        let port = self.driver.host_port(&wp, WORDPRESS_PORT).await?;
        let base_url = Url::parse(&format!("http://127.0.0.1:{}/", port))?;

        wait_for_healthy(&base_url, options.startup_timeout, options.poll_interval).await?;

        if settings.rewrite_urls {
            if let Some(old) = snapshot.site_url() {
                self.rewrite_site_url(old, &base_url, snapshot).await;
            }
        }

        self.base_url = Some(base_url);
        Ok(())
    }

    /// Point `home`/`siteurl` at the environment so WordPress stops redirecting
    async fn rewrite_site_url(&self, old: &str, new: &Url, snapshot: &Snapshot) {
        let prefix = snapshot.meta.table_prefix.as_deref().unwrap_or("wp_");
        let new = new.as_str().trim_end_matches('/');
        let sql = format!(
            "UPDATE {}options SET option_value = '{}' WHERE option_name IN ('home', 'siteurl');",
            prefix,
            new.replace('\'', "''")
        );
        let cmd = vec![
            "mysql".to_string(),
            format!("--user={}", self.credentials.user),
            format!("--password={}", self.credentials.password),
            self.credentials.name.clone(),
            "--execute".to_string(),
            sql,
        ];

        match self.driver.exec(&self.db_container(), &cmd).await {
            Ok(_) => info!("Rewrote site URL {} -> {}", old, new),
            Err(e) => warn!("Could not rewrite site URL {}: {}", old, e),
        }
    }

    /// Release every resource. Idempotent and never fails; removal errors
    /// are logged.
    pub async fn destroy(&mut self) {
        if self.state == EnvironmentState::Destroyed {
            debug!("Environment {} already destroyed", self.id);
            return;
        }

        info!("Destroying environment {}", self.id);

        // Containers were pushed after the network, so reverse order frees them first
        for resource in std::mem::take(&mut self.resources).into_iter().rev() {
            let result = match &resource {
                Resource::Container(name) => self.driver.remove_container(name).await,
                Resource::Network(name) => self.driver.remove_network(name).await,
            };
            if let Err(e) = result {
                warn!("Failed to remove {:?}: {}", resource, e);
            }
        }

        if let Some(dir) = self.files_dir.take() {
            if let Err(e) = dir.close() {
                warn!("Failed to remove extracted snapshot files: {}", e);
            }
        }

        self.base_url = None;
        self.state = EnvironmentState::Destroyed;
    }
}

impl Drop for Environment {
    fn drop(&mut self) {
        if self.state == EnvironmentState::Destroyed || self.resources.is_empty() {
            return;
        }

        warn!(
            "Environment {} dropped while {}; removing resources",
            self.id, self.state
        );
        for resource in self.resources.drain(..).rev() {
            debug!("Blocking removal of {:?} from drop", resource);
            match resource {
                Resource::Container(name) => self.driver.remove_container_blocking(&name),
                Resource::Network(name) => self.driver.remove_network_blocking(&name),
            }
        }
        self.state = EnvironmentState::Destroyed;
    }
}

/// What [`reap`] removed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReapReport {
    pub containers: Vec<String>,
    pub networks: Vec<String>,
}

impl ReapReport {
    pub fn is_empty(&self) -> bool {
        self.containers.is_empty() && self.networks.is_empty()
    }
}

/// Remove resources left behind by other processes.
///
/// With an id only that environment is reaped; without one every
/// harness-labelled container and network is removed.
pub async fn reap(driver: &dyn ContainerDriver, environment_id: Option<&str>) -> E2eResult<ReapReport> {
    let label = match environment_id {
        Some(id) => format!("{}={}", LABEL_ENVIRONMENT, id),
        None => LABEL_ENVIRONMENT.to_string(),
    };

    let mut report = ReapReport::default();

    for name in driver.list_containers(&label).await? {
        driver.remove_container(&name).await?;
        info!("Removed container {}", name);
        report.containers.push(name);
    }

    for name in driver.list_networks(&label).await? {
        driver.remove_network(&name).await?;
        info!("Removed network {}", name);
        report.networks.push(name);
    }

    Ok(report)
}

/// Poll the site until it answers with a non-server-error status
pub async fn wait_for_healthy(url: &Url, timeout: Duration, interval: Duration) -> E2eResult<usize> {
    // WordPress redirects to the snapshot's original host until the URL is rewritten
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .build()?;

    let start = Instant::now();
    let mut attempts = 0;

    while start.elapsed() < timeout {
        attempts += 1;

        match client.get(url.clone()).send().await {
            Ok(resp) if resp.status().as_u16() < 500 => {
                debug!("Health check passed after {} attempts ({})", attempts, resp.status());
                return Ok(attempts);
            }
            Ok(resp) => {
                debug!("Health check returned {}", resp.status());
            }
            Err(e) => {
                if attempts == 1 {
                    info!("Waiting for WordPress to start...");
                }
                // Connection refused is expected while containers boot
                if !e.is_connect() && !e.is_timeout() {
                    warn!("Health check error: {}", e);
                }
            }
        }

        sleep(interval).await;
    }

    Err(E2eError::HealthCheckTimeout {
        attempts,
        seconds: timeout.as_secs(),
    })
}

async fn extract_files(archive: &Path) -> E2eResult<TempDir> {
    let archive = archive.to_path_buf();
    tokio::task::spawn_blocking(move || -> E2eResult<TempDir> {
        let dir = tempfile::Builder::new().prefix("wpacceptance-").tempdir()?;
        let file = std::fs::File::open(&archive)?;
        let decoder = flate2::read::GzDecoder::new(file);
        tar::Archive::new(decoder).unpack(dir.path())?;
        debug!("Extracted {} into {}", archive.display(), dir.path().display());
        Ok(dir)
    })
    .await
    .map_err(|e| E2eError::Provision(format!("file extraction task failed: {}", e)))?
}

/// Environment for the MySQL image's first-boot setup.
///
/// The image refuses `MYSQL_USER=root`; root only gets a password.
fn mysql_env(credentials: &DbCredentials) -> Vec<(String, String)> {
    let mut env = vec![
        ("MYSQL_DATABASE".to_string(), credentials.name.clone()),
        ("MYSQL_ROOT_PASSWORD".to_string(), credentials.password.clone()),
    ];
    if credentials.user != ROOT_USER {
        env.push(("MYSQL_USER".to_string(), credentials.user.clone()));
        env.push(("MYSQL_PASSWORD".to_string(), credentials.password.clone()));
    }
    env
}

/// `<snapshot prefix>-<random>`, safe for container names
fn environment_id(snapshot_id: &str) -> String {
    let prefix: String = snapshot_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(8)
        .collect::<String>()
        .to_ascii_lowercase();
    let suffix = &uuid::Uuid::new_v4().simple().to_string()[..8];
    if prefix.is_empty() {
        suffix.to_string()
    } else {
        format!("{}-{}", prefix, suffix)
    }
}
