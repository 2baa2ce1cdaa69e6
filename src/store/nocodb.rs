use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;
use tracing::{debug, instrument};

use super::WatchlistStore;
use crate::config::NocoDb;
use crate::model::{NewWatchedRepo, RepoId, WatchedRepo};

/// Watchlist kept in a NocoDB table, addressed through its records endpoint.
#[derive(Clone)]
pub struct NocoDbStore {
    http: Client,
    records_url: Url,
    token: String,
}

impl fmt::Debug for NocoDbStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NocoDbStore")
            .field("records_url", &self.records_url)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct ListResponse {
    #[serde(default)]
    list: Vec<NocoRow>,
}

#[derive(Deserialize)]
struct NocoRow {
    #[serde(alias = "Id")]
    id: RepoId,
    owner: String,
    repo: String,
    #[serde(default)]
    latest_tag: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
}

impl From<NocoRow> for WatchedRepo {
    fn from(row: NocoRow) -> Self {
        WatchedRepo {
            id: row.id,
            owner: row.owner,
            repo: row.repo,
            latest_tag: row.latest_tag.filter(|t| !t.is_empty()),
            updated_at: row.updated_at.as_deref().and_then(parse_timestamp),
        }
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%:z"))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

impl NocoDbStore {
    pub fn from_config(cfg: &NocoDb) -> Result<Self> {
        let records_url = Url::parse(&cfg.records_url).context("invalid store.nocodb.records_url")?;
        Self::new(records_url, cfg.token.clone())
    }

    pub fn new(records_url: Url, token: String) -> Result<Self> {
        let http = Client::builder()
            .user_agent("release-watch")
            .no_proxy()
            .build()
            .context("failed to build NocoDB HTTP client")?;
        Ok(Self {
            http,
            records_url,
            token,
        })
    }

    async fn call(&self, method: Method, body: Option<&Value>) -> Result<Value> {
        let mut req = self
            .http
            .request(method.clone(), self.records_url.clone())
            .header("xc-token", &self.token);
        if let Some(body) = body {
            req = req.json(body);
        }
        debug!(%method, url = %self.records_url, "nocodb request");
        let res = req.send().await.context("failed to reach NocoDB")?;
        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(NocoStatus { method, status, body: text }.into());
        }
        let text = res.text().await.context("failed to read NocoDB response")?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).context("invalid NocoDB response JSON")
    }
}

#[derive(Debug, Error)]
#[error("NocoDB {method} {status} {body}")]
struct NocoStatus {
    method: Method,
    status: StatusCode,
    body: String,
}

/// The insert endpoint answers `{"Id": n}` (or `{"id": n}`), sometimes wrapped
/// in a one-element array.
fn inserted_id(payload: &Value) -> Option<RepoId> {
    let obj = match payload {
        Value::Array(items) => items.first()?,
        other => other,
    };
    let raw = obj.get("Id").or_else(|| obj.get("id"))?;
    serde_json::from_value(raw.clone()).ok()
}

#[async_trait]
impl WatchlistStore for NocoDbStore {
    #[instrument(skip_all)]
    async fn list(&self) -> Result<Vec<WatchedRepo>> {
        let payload = self.call(Method::GET, None).await?;
        let parsed: ListResponse =
            serde_json::from_value(payload).context("unexpected NocoDB list shape")?;
        Ok(parsed.list.into_iter().map(WatchedRepo::from).collect())
    }

    #[instrument(skip_all, fields(owner = %new.owner, repo = %new.repo))]
    async fn insert(&self, new: &NewWatchedRepo) -> Result<WatchedRepo> {
        let now = Utc::now();
        let body = json!({
            "owner": new.owner,
            "repo": new.repo,
            "updated_at": now.to_rfc3339(),
        });
        let payload = self.call(Method::POST, Some(&body)).await?;
        let id = inserted_id(&payload)
            .ok_or_else(|| anyhow!("NocoDB insert returned no id: {payload}"))?;
        Ok(WatchedRepo {
            id,
            owner: new.owner.clone(),
            repo: new.repo.clone(),
            latest_tag: None,
            updated_at: Some(now),
        })
    }

    #[instrument(skip_all, fields(%id, tag))]
    async fn update_tag(&self, id: &RepoId, tag: &str, at: DateTime<Utc>) -> Result<()> {
        let body = json!({
            "records": [{
                "id": id,
                "latest_tag": tag,
                "updated_at": at.to_rfc3339(),
            }]
        });
        self.call(Method::PATCH, Some(&body)).await?;
        Ok(())
    }

    #[instrument(skip_all, fields(%id))]
    async fn delete(&self, id: &RepoId) -> Result<bool> {
        let body = json!({ "id": id });
        match self.call(Method::DELETE, Some(&body)).await {
            Ok(_) => Ok(true),
            Err(err) => {
                let not_found = matches!(
                    err.downcast_ref::<NocoStatus>(),
                    Some(s) if s.status == StatusCode::NOT_FOUND
                );
                if not_found {
                    Ok(false)
                } else {
                    Err(err)
                }
            }
        }
    }
}
