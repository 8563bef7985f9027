//! Error types for the Galaxy server.
//!
//! Every handler returns `Result<_, ApiError>`, so a failure anywhere in the
//! request path ends up as a JSON error body with a conventional status code
//! instead of a hung or empty response.
//!
//! # Status Mapping
//!
//! | Variant | Status | Code |
//! |---------|--------|------|
//! | [`ApiError::Validation`] | 400 | `invalid_request` |
//! | [`ApiError::Unauthorized`] | 401 | `unauthorized` |
//! | [`ApiError::Forbidden`] | 403 | `forbidden` |
//! | [`ApiError::NotFound`] | 404 | `not_found` |
//! | [`ApiError::Conflict`] | 409 | `conflict` |
//! | [`ApiError::PayloadTooLarge`] | 413 | `payload_too_large` |
//! | [`ApiError::Store`] | 500 (409 for duplicate ids) | `store_failure` |
//! | [`ApiError::Internal`] | 500 | `internal_error` |
//!
//! Server-side failures are logged with their cause; the client only ever
//! sees a generic message for them.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

use crate::store::StoreError;

/// Message returned to clients for any server-side failure.
const GENERIC_SERVER_MESSAGE: &str = "internal server error";

/// Errors surfaced by route handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or invalid credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated, but not allowed to touch the requested resource.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Lookup by id found nothing.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed identifier, body or query.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The request collides with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Request body exceeded the configured limit.
    #[error("payload too large")]
    PayloadTooLarge,

    /// The document store failed.
    #[error("store failure: {0}")]
    Store(#[from] StoreError),

    /// Unexpected failure that is not the client's fault.
    #[error("internal server error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human readable message.
    pub error: String,
    /// Machine readable error code.
    pub code: String,
}

impl ApiError {
    /// Creates a new unauthorized error.
    ///
    /// # Example
    ///
    /// ```rust
    /// use galaxy_server::error::ApiError;
    ///
    /// let err = ApiError::unauthorized("missing token");
    /// assert!(matches!(err, ApiError::Unauthorized(_)));
    /// ```
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    /// Creates a new forbidden error.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    /// Creates a new not found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Creates a new validation error.
    ///
    /// # Example
    ///
    /// ```rust
    /// use galaxy_server::error::ApiError;
    ///
    /// let err = ApiError::validation("missing 'email' field");
    /// assert!(matches!(err, ApiError::Validation(_)));
    /// ```
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a new internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// HTTP status code for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) | Self::Store(StoreError::Duplicate(_)) => StatusCode::CONFLICT,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Store(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine readable code placed in the response body.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Validation(_) => "invalid_request",
            Self::Conflict(_) | Self::Store(StoreError::Duplicate(_)) => "conflict",
            Self::PayloadTooLarge => "payload_too_large",
            Self::Store(_) => "store_failure",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Returns `true` if this error indicates a client-side problem.
    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }

    /// Message safe to show to the client.
    fn public_message(&self) -> String {
        match self {
            Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::NotFound(msg)
            | Self::Validation(msg)
            | Self::Conflict(msg) => msg.clone(),
            Self::PayloadTooLarge => "payload too large".to_string(),
            Self::Store(StoreError::Duplicate(id)) => format!("record {id} already exists"),
            Self::Store(_) | Self::Internal(_) => GENERIC_SERVER_MESSAGE.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        } else {
            debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        let body = ErrorResponse {
            error: self.public_message(),
            code: self.code().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return Self::PayloadTooLarge;
        }
        Self::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        if rejection.status().is_server_error() {
            return Self::Internal(rejection.body_text());
        }
        Self::Validation(rejection.body_text())
    }
}

/// A specialized Result type for handler operations.
pub type Result<T> = std::result::Result<T, ApiError>;
