use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::error::AppError;
use crate::run_guard::{RunGuard, StatusSnapshot};
use crate::sync::{SyncEngine, SyncReport};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SyncEngine>,
    pub guard: RunGuard,
    pub secret: Arc<str>,
}

impl AppState {
    pub fn new(engine: SyncEngine, secret: &str) -> Self {
        Self {
            engine: Arc::new(engine),
            guard: RunGuard::new(),
            secret: Arc::from(secret),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(status))
        .route("/health", get(health))
        .route("/sync", get(trigger).post(trigger))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    service: &'static str,
    version: &'static str,
    #[serde(flatten)]
    status: StatusSnapshot,
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        status: state.guard.snapshot(),
    })
}

async fn health() -> Json<Value> {
    Json(json!({"ok": true}))
}

#[derive(Debug, Default, Deserialize)]
struct KeyParams {
    key: Option<String>,
}

/// Compare digests so the comparison time does not depend on how much of the key matched.
fn key_matches(secret: &str, provided: &str) -> bool {
    if secret.is_empty() {
        return false;
    }
    Sha256::digest(secret.as_bytes()) == Sha256::digest(provided.as_bytes())
}

/// The key comes from `?key=` first, then from a JSON body `{"key": "..."}`.
fn provided_key(query: KeyParams, body: &[u8]) -> Option<String> {
    query.key.or_else(|| {
        serde_json::from_slice::<KeyParams>(body)
            .ok()
            .and_then(|b| b.key)
    })
}

async fn trigger(
    State(state): State<AppState>,
    Query(query): Query<KeyParams>,
    body: Bytes,
) -> Result<Json<SyncReport>, AppError> {
    let key = provided_key(query, &body).unwrap_or_default();
    if !key_matches(&state.secret, &key) {
        warn!("sync trigger rejected: bad key");
        return Err(AppError::Unauthorized);
    }

    let ticket = state.guard.try_begin().inspect_err(|_| {
        info!("sync trigger rejected: run already in progress");
    })?;
    let result = state.engine.run().await;
    if let Err(e) = &result {
        tracing::error!(error = %e, "sync run aborted");
    }
    ticket.finish(&result);
    result.map(Json)
}
