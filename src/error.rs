// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid request signature")]
    Unauthorized,

    #[error("Command not permitted: {0}")]
    Forbidden(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Trophy API error: {0}")]
    TrophyApi(String),

    #[error("Discord API error: {0}")]
    Discord(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Message carried by `TrophyApi` when the API answered 429.
    pub const TROPHY_RATE_LIMIT: &'static str = "Rate limit exceeded";
    /// Message carried by `TrophyApi` when the access token was rejected.
    pub const TROPHY_TOKEN_ERROR: &'static str = "Invalid or expired access token";

    /// True when the trophy API rejected the access or refresh token.
    pub fn is_token_error(&self) -> bool {
        match self {
            AppError::TrophyApi(msg) => {
                msg == Self::TROPHY_TOKEN_ERROR || msg.contains("invalid_grant")
            }
            _ => false,
        }
    }

    /// True when the trophy API asked us to back off.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, AppError::TrophyApi(msg) if msg == Self::TROPHY_RATE_LIMIT)
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "invalid_signature", None),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", Some(msg.clone())),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::TrophyApi(msg) => {
                (StatusCode::BAD_GATEWAY, "trophy_api_error", Some(msg.clone()))
            }
            AppError::Discord(msg) => (StatusCode::BAD_GATEWAY, "discord_error", Some(msg.clone())),
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers and services
pub type Result<T> = std::result::Result<T, AppError>;
