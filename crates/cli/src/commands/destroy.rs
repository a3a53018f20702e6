//! Remove environments left behind by interrupted runs

use clap::Args;
use wpacceptance_e2e::{reap, ContainerRuntime};

use crate::output;

#[derive(Args, Debug)]
pub struct DestroyArgs {
    /// Environment id reported by `run`
    #[arg(required_unless_present = "all", conflicts_with = "all")]
    pub env_id: Option<String>,

    /// Remove every WPAcceptance environment
    #[arg(long)]
    pub all: bool,
}

pub async fn execute(args: DestroyArgs, runtime: Option<ContainerRuntime>) -> anyhow::Result<()> {
    let driver = super::container_driver(runtime)?;
    let report = reap(&driver, args.env_id.as_deref()).await?;

    if report.is_empty() {
        output::print_info("Nothing to destroy.");
        return Ok(());
    }

    for name in report.containers.iter().chain(&report.networks) {
        println!("  {}", name);
    }
    output::print_success(&format!(
        "Removed {} container(s) and {} network(s).",
        report.containers.len(),
        report.networks.len()
    ));
    Ok(())
}
