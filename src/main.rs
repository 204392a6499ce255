//! ci-deploy: publish CI build artifacts to a static package repository
//!
//! Runs at the end of a CI job. Decides whether the build should be
//! deployed, then pushes the artifacts and refreshed index pages.

use anyhow::{Context, Result};
use clap::Parser;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ci_deploy::app::resolve_repo_dir;
use ci_deploy::domain::{CiRegistry, EnvSnapshot};
use ci_deploy::services::SystemRunner;
use ci_deploy::{DeployConfig, Deployer};

#[derive(Parser, Debug)]
#[command(name = "ci-deploy", version, about = "Publish CI build artifacts to a package repository")]
struct Cli {
    /// Source checkout root (defaults to the CI working directory)
    #[arg(long, env = "CI_DEPLOY_REPO_DIR")]
    repo_dir: Option<PathBuf>,

    /// Check the gate and list artifacts without touching anything
    #[arg(long)]
    dry_run: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

/// Initialize logging; RUST_LOG takes precedence over `-v`
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let env = EnvSnapshot::from_process();
    let config_root = resolve_repo_dir(&CiRegistry::default(), &env, cli.repo_dir.clone())
        .context("Cannot resolve the repository directory")?;
    let config = DeployConfig::load(Some(&config_root)).with_context(|| {
        format!("Failed to load configuration from {}", config_root.display())
    })?;

    let outcome = Deployer::new(config, env, Arc::new(SystemRunner))
        .repo_dir(cli.repo_dir)
        .dry_run(cli.dry_run)
        .run()?;

    tracing::info!("{}", outcome);
    Ok(())
}

// Returning instead of exiting lets the key and agent guards clean up.
fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
