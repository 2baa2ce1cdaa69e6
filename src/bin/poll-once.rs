use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use release_watch::config;
use release_watch::github::GitHubClient;
use release_watch::notify::BarkNotifier;
use release_watch::poll::{ErrorPolicy, Poller};
use release_watch::store;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Check every watched repository once and exit; for cron-style timers"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log failing repositories and continue instead of exiting non-zero on the first one
    #[arg(long)]
    keep_going: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let policy = if args.keep_going {
        ErrorPolicy::SkipRow
    } else {
        ErrorPolicy::Abort
    };
    let poller = Poller::new(
        store::connect(&cfg).await?,
        Arc::new(GitHubClient::from_config(&cfg)?),
        Arc::new(BarkNotifier::from_config(&cfg)?),
        policy,
    );

    let report = poller.run().await?;
    info!(
        checked = report.checked,
        no_release = report.no_release,
        unchanged = report.unchanged,
        updated = report.updated,
        failed = report.failed,
        "poll finished"
    );
    Ok(())
}
