use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use release_watch::config;
use release_watch::github::GitHubClient;
use release_watch::notify::BarkNotifier;
use release_watch::poll::{ErrorPolicy, Poller};
use release_watch::server::{self, AppState};
use release_watch::store;

#[derive(Debug, Parser)]
#[command(author, version, about = "Watch GitHub releases and push a notification for each new one")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
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

    let store = store::connect(&cfg).await?;
    let source = Arc::new(GitHubClient::from_config(&cfg)?);
    let notifier = Arc::new(BarkNotifier::from_config(&cfg)?);
    let poller = Arc::new(Poller::new(
        store.clone(),
        source,
        notifier,
        ErrorPolicy::SkipRow,
    ));

    // Scheduled polls; a tick that lands on a running check is skipped.
    if cfg.app.poll_interval_secs > 0 {
        let every = Duration::from_secs(cfg.app.poll_interval_secs);
        let scheduled = poller.clone();
        info!(?every, "scheduling release checks");
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                scheduled.run_detached().await;
            }
        });
    } else {
        info!("in-process schedule disabled; waiting for manual triggers");
    }

    server::run_server(&cfg.server.bind, AppState { store, poller }).await
}
