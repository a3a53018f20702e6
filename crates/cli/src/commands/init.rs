//! Scaffold a project config and sample test case

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use tracing::info;
use wpacceptance_common::config::PROJECT_CONFIG_FILE;
use wpacceptance_common::{resolve_wordpress_path, ProjectConfig};
use wpacceptance_e2e::SAMPLE_SPEC;

use crate::output;

const SAMPLE_SPEC_FILE: &str = "home-page.yml";

#[derive(Args, Debug)]
pub struct InitArgs {
    /// WordPress root; discovered from the current directory when omitted
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Project name; defaults to the directory name
    #[arg(long)]
    pub name: Option<String>,

    /// Overwrite an existing config
    #[arg(long)]
    pub force: bool,
}

/// Files written by [`scaffold`]
#[derive(Debug)]
pub struct Scaffolded {
    pub config: PathBuf,
    /// `None` when a test case with that name already existed
    pub sample: Option<PathBuf>,
}

pub fn execute(args: InitArgs) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;
    let root = resolve_wordpress_path(args.path.as_deref(), &cwd)?;

    let written = scaffold(&root, args.name, args.force)?;

    output::print_success(&format!("Wrote {}", written.config.display()));
    match written.sample {
        Some(path) => output::print_success(&format!("Wrote {}", path.display())),
        None => output::print_info("Sample test already present, left untouched"),
    }
    Ok(())
}

/// Write `wpacceptance.toml` and a sample test case under `root`
pub fn scaffold(root: &Path, name: Option<String>, force: bool) -> anyhow::Result<Scaffolded> {
    let config_path = root.join(PROJECT_CONFIG_FILE);
    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists. Use --force to overwrite it.",
            config_path.display()
        );
    }

    let name = name
        .or_else(|| {
            root.file_name()
                .map(|n| n.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| ProjectConfig::default().name);

    let config = ProjectConfig {
        name,
        ..Default::default()
    };
    config.save(&config_path)?;
    info!("Wrote {}", config_path.display());

    let tests_dir = config.tests_path(root);
    std::fs::create_dir_all(&tests_dir)
        .with_context(|| format!("creating {}", tests_dir.display()))?;

    let sample_path = tests_dir.join(SAMPLE_SPEC_FILE);
    let sample = if sample_path.exists() {
        None
    } else {
        std::fs::write(&sample_path, SAMPLE_SPEC)
            .with_context(|| format!("writing {}", sample_path.display()))?;
        Some(sample_path)
    };

    Ok(Scaffolded {
        config: config_path,
        sample,
    })
}
