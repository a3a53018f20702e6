//! The `run` sequence: snapshot -> environment -> browser -> tests -> teardown
//!
//! Everything before provisioning may abort freely because nothing exists
//! yet. Once an environment is running, the browser phase is awaited to
//! completion (or interrupted) and the environment is destroyed before any
//! error is surfaced.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use wpacceptance_common::config::PROJECT_CONFIG_FILE;
use wpacceptance_common::{
    resolve_wordpress_path, BrowserSettings, CreateSnapshot, ProjectConfig, Snapshot, SnapshotProvider,
};

use crate::browser::{BrowserSession, ScreenshotArtifact};
use crate::container::ContainerDriver;
use crate::environment::{Environment, EnvironmentOptions};
use crate::error::{E2eError, E2eResult};
use crate::runner::{write_results, TestRunner, TestSuiteResult};
use crate::spec::TestSpec;
use crate::webdriver::BrowserLauncher;

/// Invocation options of the run command
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub snapshot_id: Option<String>,
    /// Explicit WordPress directory; otherwise discovered from `cwd`
    pub path: Option<PathBuf>,
    pub cwd: PathBuf,
    pub db_host: Option<String>,
    pub db_name: Option<String>,
    pub db_user: Option<String>,
    pub db_password: Option<String>,
    /// Only run test cases carrying this tag
    pub tag: Option<String>,
    /// Only run the test case with this name
    pub test_name: Option<String>,
    /// Overrides the project's WebDriver URL
    pub webdriver_url: Option<String>,
}

/// Outcome of a completed run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub wordpress_path: PathBuf,
    pub snapshot_id: String,
    pub environment_id: String,
    pub diagnostic_screenshot: ScreenshotArtifact,
    pub suite: TestSuiteResult,
    pub results_path: PathBuf,
}

/// What the browser phase produces while the environment is up
struct PhaseOutput {
    diagnostic_screenshot: ScreenshotArtifact,
    suite: TestSuiteResult,
    results_path: PathBuf,
}

/// Sequences one end-to-end run over injected collaborators
pub struct Orchestrator {
    snapshots: Arc<dyn SnapshotProvider>,
    containers: Arc<dyn ContainerDriver>,
    browsers: Arc<dyn BrowserLauncher>,
}

impl Orchestrator {
    pub fn new(
        snapshots: Arc<dyn SnapshotProvider>,
        containers: Arc<dyn ContainerDriver>,
        browsers: Arc<dyn BrowserLauncher>,
    ) -> Self {
        Self {
            snapshots,
            containers,
            browsers,
        }
    }

    /// Execute the run command.
    ///
    /// `shutdown` resolving during the browser phase interrupts the tests;
    /// the environment is still destroyed before returning.
    pub async fn run<F>(&self, options: &RunOptions, shutdown: F) -> E2eResult<RunReport>
    where
        F: Future<Output = ()> + Send,
    {
        self.snapshots.connect().await?;

        let wordpress_path = resolve_wordpress_path(options.path.as_deref(), &options.cwd)?;
        info!("WordPress installation: {}", wordpress_path.display());

        let config = ProjectConfig::load(&wordpress_path.join(PROJECT_CONFIG_FILE))?;
        let snapshot = self.resolve_snapshot(options, &config, &wordpress_path).await?;

        info!("Creating environment...");
        // The --db_* flags describe the source site; the environment's
        // database comes from the project settings alone
        let env_options = EnvironmentOptions::new(config.environment.clone());
        let mut environment =
            Environment::provision(self.containers.clone(), &snapshot, &env_options).await?;

        let outcome = self
            .browser_phase(&environment, &config, &wordpress_path, options, shutdown)
            .await;

        environment.destroy().await;

        let output = outcome?;
        Ok(RunReport {
            wordpress_path,
            snapshot_id: snapshot.id,
            environment_id: environment.id().to_string(),
            diagnostic_screenshot: output.diagnostic_screenshot,
            suite: output.suite,
            results_path: output.results_path,
        })
    }

    /// Use `--snapshot_id` (or the project's pinned id), downloading it only
    /// when uncached; otherwise capture a fresh snapshot.
    async fn resolve_snapshot(
        &self,
        options: &RunOptions,
        config: &ProjectConfig,
        wordpress_path: &Path,
    ) -> E2eResult<Snapshot> {
        let requested = options
            .snapshot_id
            .clone()
            .or_else(|| config.snapshot_id.clone())
            .filter(|id| !id.trim().is_empty());

        if let Some(id) = requested {
            if self.snapshots.is_cached(&id) {
                info!("Using cached snapshot {}", id);
                return Ok(self.snapshots.resolve(&id)?);
            }
            return Ok(self.snapshots.download(&id).await?);
        }

        info!("Creating snapshot...");
        let mut request = CreateSnapshot::for_run(wordpress_path.to_path_buf());
        request.db_host = options.db_host.clone();
        request.db_name = options.db_name.clone();
        request.db_user = options.db_user.clone();
        request.db_password = options.db_password.clone();

        let snapshot = self.snapshots.create(&request).await?;
        info!("Snapshot ID is {}", snapshot.id);
        Ok(snapshot)
    }

    async fn browser_phase<F>(
        &self,
        environment: &Environment,
        config: &ProjectConfig,
        wordpress_path: &Path,
        options: &RunOptions,
        shutdown: F,
    ) -> E2eResult<PhaseOutput>
    where
        F: Future<Output = ()> + Send,
    {
        let mut settings: BrowserSettings = config.browser.clone();
        if let Some(url) = &options.webdriver_url {
            settings.webdriver_url = url.clone();
        }

        let client = self.browsers.launch(&settings).await?;
        let session = BrowserSession::for_environment(
            client,
            environment,
            Duration::from_millis(settings.implicit_wait_ms),
        )?;

        let result = tokio::select! {
            result = exercise(&session, config, wordpress_path, options, environment) => result,
            _ = shutdown => {
                warn!("Interrupted, cleaning up environment {}", environment.id());
                Err(E2eError::Interrupted)
            }
        };

        // The session must be gone before the environment is destroyed
        if let Err(e) = session.close().await {
            warn!("Failed to close browser session: {}", e);
        }

        result
    }
}

async fn exercise(
    session: &BrowserSession,
    config: &ProjectConfig,
    wordpress_path: &Path,
    options: &RunOptions,
    environment: &Environment,
) -> E2eResult<PhaseOutput> {
    let output_dir = config.output_path(wordpress_path);
    let screenshot_dir = output_dir.join("screenshots");

    session.go_to("/").await?;
    let diagnostic_screenshot = session.save_screenshot(&screenshot_dir, "diagnostic").await?;

    let specs = select_specs(
        TestSpec::load_all(&config.tests_path(wordpress_path))?,
        options.tag.as_deref(),
        options.test_name.as_deref(),
    )?;

    let runner = TestRunner::new(&screenshot_dir);
    let mut suite = runner.run_specs(session, &specs).await;
    suite.environment_id = environment.id().to_string();
    suite.snapshot_id = environment.snapshot_id().to_string();

    let results_path = write_results(&output_dir, &suite)?;

    Ok(PhaseOutput {
        diagnostic_screenshot,
        suite,
        results_path,
    })
}

fn select_specs(specs: Vec<TestSpec>, tag: Option<&str>, name: Option<&str>) -> E2eResult<Vec<TestSpec>> {
    let selected: Vec<TestSpec> = specs
        .into_iter()
        .filter(|s| tag.map_or(true, |t| s.tags.iter().any(|st| st == t)))
        .filter(|s| name.map_or(true, |n| s.name == n))
        .collect();

    if let Some(n) = name {
        if selected.is_empty() {
            return Err(E2eError::SpecParse(format!("Test not found: {}", n)));
        }
    }
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::TestStep;

    fn spec(name: &str, tags: &[&str]) -> TestSpec {
        TestSpec {
            name: name.to_string(),
            description: String::new(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            steps: vec![TestStep::Navigate { url: "/".to_string() }],
        }
    }

    #[test]
    fn test_select_specs() {
        let specs = vec![spec("home", &["smoke"]), spec("search", &[])];

        assert_eq!(select_specs(specs.clone(), None, None).unwrap().len(), 2);
        let smoke = select_specs(specs.clone(), Some("smoke"), None).unwrap();
        assert_eq!(smoke[0].name, "home");
        assert_eq!(select_specs(specs.clone(), None, Some("search")).unwrap().len(), 1);
        assert!(select_specs(specs, None, Some("missing")).is_err());
    }
}
