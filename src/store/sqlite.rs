use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;
use tracing::instrument;

use super::WatchlistStore;
use crate::model::{NewWatchedRepo, RepoId, WatchedRepo};

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

#[derive(Debug, FromRow)]
struct RepoRow {
    id: i64,
    owner: String,
    repo: String,
    latest_tag: Option<String>,
    updated_at: Option<DateTime<Utc>>,
}

impl From<RepoRow> for WatchedRepo {
    fn from(row: RepoRow) -> Self {
        WatchedRepo {
            id: RepoId::from(row.id),
            owner: row.owner,
            repo: row.repo,
            latest_tag: row.latest_tag,
            updated_at: row.updated_at,
        }
    }
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let normalized = prepare_sqlite_url(database_url);
        let options = SqliteConnectOptions::from_str(&normalized)
            .with_context(|| format!("invalid sqlite url: {normalized}"))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// For file-backed URLs, expand a leading `~/` and create the parent
/// directory. In-memory and non-sqlite URLs pass through untouched.
fn prepare_sqlite_url(url: &str) -> String {
    let Some(rest) = url.strip_prefix("sqlite:") else {
        return url.to_string();
    };
    if rest.starts_with(":memory") {
        return url.to_string();
    }

    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(tail), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), tail),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    match query_part {
        Some(q) => format!("sqlite://{expanded}?{q}"),
        None => format!("sqlite://{expanded}"),
    }
}

fn sqlite_id(id: &RepoId) -> Result<i64> {
    id.as_i64()
        .ok_or_else(|| anyhow!("sqlite row ids are integers, got {:?}", id.as_str()))
}

#[async_trait]
impl WatchlistStore for SqliteStore {
    #[instrument(skip_all)]
    async fn list(&self) -> Result<Vec<WatchedRepo>> {
        let rows: Vec<RepoRow> = sqlx::query_as(
            "SELECT id, owner, repo, latest_tag, updated_at FROM repos ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(WatchedRepo::from).collect())
    }

    #[instrument(skip_all, fields(owner = %new.owner, repo = %new.repo))]
    async fn insert(&self, new: &NewWatchedRepo) -> Result<WatchedRepo> {
        let row: RepoRow = sqlx::query_as(
            "INSERT INTO repos (owner, repo, updated_at) VALUES (?, ?, ?) \
             RETURNING id, owner, repo, latest_tag, updated_at",
        )
        .bind(&new.owner)
        .bind(&new.repo)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    #[instrument(skip_all, fields(%id, tag))]
    async fn update_tag(&self, id: &RepoId, tag: &str, at: DateTime<Utc>) -> Result<()> {
        let id = sqlite_id(id)?;
        let done = sqlx::query("UPDATE repos SET latest_tag = ?, updated_at = ? WHERE id = ?")
            .bind(tag)
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if done.rows_affected() == 0 {
            return Err(anyhow!("repo {id} no longer exists"));
        }
        Ok(())
    }

    #[instrument(skip_all, fields(%id))]
    async fn delete(&self, id: &RepoId) -> Result<bool> {
        let Some(id) = id.as_i64() else {
            return Ok(false);
        };
        let done = sqlx::query("DELETE FROM repos WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }
}
