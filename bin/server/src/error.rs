//! HTTP error responses for the webhook endpoint.
//!
//! Error bodies never carry internal details; those go to the log.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chatflow_engine::WebhookError;
use rootcause::Report;
use serde_json::json;
use std::fmt;

/// Errors the webhook endpoint answers with.
#[derive(Debug)]
pub enum ApiError {
    /// Unknown account or webhook token.
    Unauthorized,
    /// A failure the provider should retry.
    Internal { details: String },
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::Internal { details } => write!(f, "internal error: {details}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<Report<WebhookError>> for ApiError {
    fn from(report: Report<WebhookError>) -> Self {
        match report.current_context() {
            WebhookError::Unauthorized => Self::Unauthorized,
            WebhookError::Persistence { .. } => Self::Internal {
                details: report.to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "unauthorized"})),
            )
                .into_response(),
            Self::Internal { details } => {
                tracing::error!(%details, "webhook failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": "internal error"})),
                )
                    .into_response()
            }
        }
    }
}
