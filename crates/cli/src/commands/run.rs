//! Run the acceptance tests against a fresh environment

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use tracing::{debug, info};
use wpacceptance_common::{HarnessConfig, WpSnapshotsProvider};
use wpacceptance_e2e::{ContainerRuntime, Orchestrator, RunOptions, ThirtyfourLauncher};

use crate::output;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Snapshot to test against; a new snapshot is created when omitted
    #[arg(long = "snapshot_id")]
    pub snapshot_id: Option<String>,

    /// WordPress root; discovered from the current directory when omitted
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Database host of the site being snapshotted
    #[arg(long = "db_host")]
    pub db_host: Option<String>,

    #[arg(long = "db_name")]
    pub db_name: Option<String>,

    #[arg(long = "db_user")]
    pub db_user: Option<String>,

    #[arg(long = "db_password")]
    pub db_password: Option<String>,

    /// Run only tests with this tag
    #[arg(long)]
    pub tag: Option<String>,

    /// Run only the test with this name
    #[arg(long)]
    pub name: Option<String>,

    /// WebDriver server URL
    #[arg(long, env = "WPACCEPTANCE_WEBDRIVER_URL")]
    pub webdriver: Option<String>,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    fn into_options(self, cwd: PathBuf) -> RunOptions {
        RunOptions {
            snapshot_id: self.snapshot_id,
            path: self.path,
            cwd,
            db_host: self.db_host,
            db_name: self.db_name,
            db_user: self.db_user,
            db_password: self.db_password,
            tag: self.tag,
            test_name: self.name,
            webdriver_url: self.webdriver,
        }
    }
}

pub async fn execute(args: RunArgs, runtime: Option<ContainerRuntime>) -> anyhow::Result<()> {
    let harness = HarnessConfig::from_env();
    debug!(
        "Hosting context {:?}, snapshots in {}",
        harness.hosting,
        harness.snapshots_dir.display()
    );

    let containers = super::container_driver(runtime)?;
    debug!("Using {} for containers", containers.runtime().command());

    let orchestrator = Orchestrator::new(
        Arc::new(WpSnapshotsProvider::new(&harness)),
        Arc::new(containers),
        Arc::new(ThirtyfourLauncher),
    );

    let json = args.json;
    let options = args.into_options(std::env::current_dir()?);

    let report = orchestrator.run(&options, interrupted()).await?;
    info!("Environment {} destroyed", report.environment_id);

    if json {
        println!("{}", serde_json::to_string_pretty(&report.suite)?);
    } else {
        output::print_results(&report.suite);
        println!("Results: {}", report.results_path.display());
    }

    if !report.suite.success() {
        anyhow::bail!(
            "{} of {} tests failed",
            report.suite.failed,
            report.suite.total
        );
    }

    output::print_success("Done.");
    Ok(())
}

/// Resolves on Ctrl-C. If the handler cannot be installed the run is
/// simply not interruptible.
async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}
