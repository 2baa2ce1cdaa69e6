//! The poll-and-diff loop: one pass over the watchlist, one repository at a
//! time.

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info, instrument, warn};

use crate::github::ReleaseSource;
use crate::model::{Notification, WatchedRepo};
use crate::notify::Notifier;
use crate::store::WatchlistStore;

/// What a failing row does to the rest of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Log the failure and keep checking the remaining rows.
    SkipRow,
    /// Stop the run at the first failing row.
    Abort,
}

#[derive(Debug, Error)]
pub enum PollError {
    #[error("a release check is already running")]
    AlreadyRunning,
    #[error("failed to list watchlist: {0:#}")]
    Store(anyhow::Error),
    #[error("release check for {owner}/{repo} failed: {source:#}")]
    Row {
        owner: String,
        repo: String,
        source: anyhow::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    NoRelease,
    Unchanged,
    Updated { tag: String, notified: bool },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PollReport {
    pub checked: usize,
    pub no_release: usize,
    pub unchanged: usize,
    pub updated: usize,
    pub failed: usize,
}

pub struct Poller {
    store: Arc<dyn WatchlistStore>,
    source: Arc<dyn ReleaseSource>,
    notifier: Arc<dyn Notifier>,
    policy: ErrorPolicy,
    running: Arc<Mutex<()>>,
}

/// Exclusive right to run a release check; released on drop.
pub type RunPermit = OwnedMutexGuard<()>;

impl Poller {
    pub fn new(
        store: Arc<dyn WatchlistStore>,
        source: Arc<dyn ReleaseSource>,
        notifier: Arc<dyn Notifier>,
        policy: ErrorPolicy,
    ) -> Self {
        Self {
            store,
            source,
            notifier,
            policy,
            running: Arc::new(Mutex::new(())),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.try_lock().is_err()
    }

    /// Claim the poller before starting a run, so a caller can report
    /// [`PollError::AlreadyRunning`] synchronously and hand the permit to a
    /// spawned task.
    pub fn try_start(&self) -> Result<RunPermit, PollError> {
        self.running
            .clone()
            .try_lock_owned()
            .map_err(|_| PollError::AlreadyRunning)
    }

    /// Check every watched repository once. Concurrent calls on the same
    /// poller fail fast with [`PollError::AlreadyRunning`].
    pub async fn run(&self) -> Result<PollReport, PollError> {
        let permit = self.try_start()?;
        self.run_with(permit).await
    }

    /// Run under a permit obtained from [`Poller::try_start`].
    #[instrument(skip_all)]
    pub async fn run_with(&self, _permit: RunPermit) -> Result<PollReport, PollError> {
        info!("starting release poll");
        let rows = self.store.list().await.map_err(PollError::Store)?;
        info!(count = rows.len(), "fetched watchlist");

        let mut report = PollReport::default();
        for row in rows {
            report.checked += 1;
            match self.check_row(&row).await {
                Ok(RowOutcome::NoRelease) => report.no_release += 1,
                Ok(RowOutcome::Unchanged) => report.unchanged += 1,
                Ok(RowOutcome::Updated { .. }) => report.updated += 1,
                Err(err) => {
                    report.failed += 1;
                    if self.policy == ErrorPolicy::Abort {
                        return Err(PollError::Row {
                            owner: row.owner,
                            repo: row.repo,
                            source: err,
                        });
                    }
                    error!(repo = %row.full_name(), error = ?err, "release check failed");
                }
            }
        }

        info!(
            checked = report.checked,
            updated = report.updated,
            failed = report.failed,
            "release poll finished"
        );
        Ok(report)
    }

    /// Run once and log the outcome, for the schedule, which has nowhere to
    /// return an error.
    pub async fn run_detached(&self) {
        log_outcome(self.run().await);
    }

    /// Compare one row against its latest release and record a new tag.
    #[instrument(skip_all, fields(repo = %row.full_name()))]
    pub async fn check_row(&self, row: &WatchedRepo) -> Result<RowOutcome> {
        let Some(release) = self.source.latest_release(&row.owner, &row.repo).await? else {
            info!("no releases; skipping");
            return Ok(RowOutcome::NoRelease);
        };

        info!(
            latest = %release.tag_name,
            seen = row.latest_tag.as_deref().unwrap_or("none"),
            "fetched latest release"
        );
        if row.latest_tag.as_deref() == Some(release.tag_name.as_str()) {
            return Ok(RowOutcome::Unchanged);
        }

        let notification = Notification::for_release(row, &release);
        let notified = match self.notifier.notify(&notification).await {
            Ok(()) => true,
            Err(err) => {
                warn!(error = ?err, "push notification failed");
                false
            }
        };

        self.store
            .update_tag(&row.id, &release.tag_name, Utc::now())
            .await?;
        info!(tag = %release.tag_name, "recorded new release");

        Ok(RowOutcome::Updated {
            tag: release.tag_name,
            notified,
        })
    }
}

/// Log the result of a run nobody awaits.
pub fn log_outcome(outcome: Result<PollReport, PollError>) {
    match outcome {
        Ok(_) => {}
        Err(PollError::AlreadyRunning) => info!("release check already running; skipping"),
        Err(err) => error!(error = %err, "release check failed"),
    }
}
