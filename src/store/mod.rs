//! Watchlist persistence.
//!
//! Two backends implement [`WatchlistStore`]:
//! - `sqlite`: embedded relational store with parameterized statements.
//! - `nocodb`: generic REST records endpoint authenticated with a token header.
//!
//! The backend is picked once at startup from `store.backend`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

use crate::config::{Config, StoreBackend};
use crate::model::{NewWatchedRepo, RepoId, WatchedRepo};

pub mod nocodb;
pub mod sqlite;

pub use nocodb::NocoDbStore;
pub use sqlite::SqliteStore;

#[async_trait]
pub trait WatchlistStore: Send + Sync {
    async fn list(&self) -> Result<Vec<WatchedRepo>>;

    async fn insert(&self, new: &NewWatchedRepo) -> Result<WatchedRepo>;

    async fn update_tag(&self, id: &RepoId, tag: &str, at: DateTime<Utc>) -> Result<()>;

    /// Returns `false` when no row had that id.
    async fn delete(&self, id: &RepoId) -> Result<bool>;
}

/// Open the configured backend.
pub async fn connect(cfg: &Config) -> Result<Arc<dyn WatchlistStore>> {
    match cfg.store.backend {
        StoreBackend::Sqlite => {
            let url = cfg.database_url();
            info!(%url, "using sqlite watchlist");
            let store = SqliteStore::connect(&url).await?;
            store.run_migrations().await?;
            Ok(Arc::new(store))
        }
        StoreBackend::Nocodb => {
            let nocodb = cfg
                .store
                .nocodb
                .as_ref()
                .context("store.nocodb missing for nocodb backend")?;
            info!(url = %nocodb.records_url, "using nocodb watchlist");
            Ok(Arc::new(NocoDbStore::from_config(nocodb)?))
        }
    }
}
