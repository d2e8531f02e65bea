//! HTTP routes.

use crate::error::ApiError;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chatflow_core::AccountId;
use chatflow_engine::WebhookProcessor;
use chrono::Utc;
use serde_json::{Value as JsonValue, json};
use std::str::FromStr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, instrument};

/// Shared state of the HTTP routes.
#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<WebhookProcessor>,
}

impl AppState {
    /// Creates the state.
    #[must_use]
    pub fn new(processor: WebhookProcessor) -> Self {
        Self {
            processor: Arc::new(processor),
        }
    }
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhooks/{account_id}/{token}", post(webhook))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

#[instrument(skip(state, token, body))]
async fn webhook(
    State(state): State<AppState>,
    Path((account_id, token)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<JsonValue>, ApiError> {
    let Ok(account_id) = AccountId::from_str(&account_id) else {
        debug!("malformed account id");
        return Err(ApiError::Unauthorized);
    };
    let payload = serde_json::from_slice::<JsonValue>(&body).unwrap_or_else(|e| {
        debug!(error = %e, "webhook body is not JSON");
        JsonValue::Null
    });

    let outcome = state
        .processor
        .handle(account_id, &token, &payload, Utc::now())
        .await?;
    Ok(Json(json!({"status": outcome.as_str()})))
}
