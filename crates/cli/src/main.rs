//! WPAcceptance CLI - Main Entry Point
//!
//! Runs browser acceptance tests for a WordPress site against a disposable
//! environment built from a snapshot of it.

use clap::{Parser, Subcommand};
use wpacceptance_e2e::ContainerRuntime;

mod commands;
mod output;

use commands::{destroy, init, run};

/// WPAcceptance - Acceptance Tests for WordPress Sites
#[derive(Parser)]
#[command(name = "wpacceptance")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Container runtime: docker or podman (detected when omitted)
    #[arg(long, global = true, env = "WPACCEPTANCE_RUNTIME")]
    runtime: Option<ContainerRuntime>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write wpacceptance.toml and a sample test into a WordPress project
    Init(init::InitArgs),

    /// Snapshot the site, start an environment and run the tests
    Run(run::RunArgs),

    /// Remove environments left behind by interrupted runs
    Destroy(destroy::DestroyArgs),

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Init(args) => init::execute(args),
        Commands::Run(args) => run::execute(args, cli.runtime).await,
        Commands::Destroy(args) => destroy::execute(args, cli.runtime).await,
        Commands::Version => {
            println!("WPAcceptance v{}", wpacceptance_common::VERSION);
            Ok(())
        }
    };

    if let Err(e) = result {
        output::report_error(&e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_destroy_requires_id_or_all() {
        assert!(Cli::try_parse_from(["wpacceptance", "destroy"]).is_err());
        assert!(Cli::try_parse_from(["wpacceptance", "destroy", "--all"]).is_ok());
        assert!(Cli::try_parse_from(["wpacceptance", "destroy", "abc-123", "--all"]).is_err());
    }

    #[test]
    fn test_global_runtime_flag() {
        let cli = Cli::try_parse_from(["wpacceptance", "run", "--runtime", "podman"]).unwrap();
        assert_eq!(cli.runtime, Some(ContainerRuntime::Podman));
        assert!(Cli::try_parse_from(["wpacceptance", "run", "--runtime", "lxc"]).is_err());
    }
}
