//! Management HTTP surface: watchlist CRUD plus a manual poll trigger.

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::error::ApiError;
use crate::model::{NewWatchedRepo, RepoId, WatchedRepo};
use crate::poll::{self, Poller};
use crate::store::WatchlistStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn WatchlistStore>,
    pub poller: Arc<Poller>,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route(
            "/repos",
            get(list_repos).post(add_repo).delete(delete_repo),
        )
        .route("/trigger", post(trigger))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(bind: &str, state: AppState) -> Result<()> {
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address {bind}"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "management API listening");

    axum::serve(listener, create_app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(?err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

#[derive(Debug, Deserialize)]
pub struct AddRepoRequest {
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub repo: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteRepoRequest {
    #[serde(default)]
    pub id: Option<RepoId>,
}

/// Bodies are JSON whatever `Content-Type` says, so `curl -d` works.
fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body)
        .map_err(|err| ApiError::BadRequest(format!("Invalid JSON body: {err}")))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

async fn list_repos(State(state): State<AppState>) -> Result<Json<Vec<WatchedRepo>>, ApiError> {
    Ok(Json(state.store.list().await?))
}

async fn add_repo(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let req: AddRepoRequest = parse_body(&body)?;
    let (Some(owner), Some(repo)) = (non_blank(req.owner), non_blank(req.repo)) else {
        return Err(ApiError::BadRequest("Missing owner or repo".into()));
    };

    let row = state.store.insert(&NewWatchedRepo { owner, repo }).await?;
    info!(id = %row.id, repo = %row.full_name(), "added to watchlist");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "repo": row })),
    ))
}

async fn delete_repo(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let req: DeleteRepoRequest = parse_body(&body)?;
    let Some(id) = req.id.filter(|id| !id.is_blank()) else {
        return Err(ApiError::BadRequest("Missing id".into()));
    };

    if !state.store.delete(&id).await? {
        return Err(ApiError::NotFound(format!("No watched repo with id {id}")));
    }
    info!(%id, "removed from watchlist");
    Ok(Json(json!({ "success": true, "id": id })))
}

async fn trigger(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let permit = state
        .poller
        .try_start()
        .map_err(|_| ApiError::Conflict("Release check already running.".into()))?;
    let poller = state.poller.clone();
    tokio::spawn(async move { poll::log_outcome(poller.run_with(permit).await) });
    Ok((StatusCode::OK, "Triggered release check manually."))
}

async fn not_found() -> ApiError {
    ApiError::NotFound("Not Found".into())
}
