//! Shared error vocabulary for the coordinator.
//!
//! Components return `Result<T, CoordinatorError>` (or a component-local
//! result struct for operations that need to carry a richer success
//! payload, e.g. `PolicyReviewResult`). Infra-level failures that should
//! abort the calling transaction use `anyhow` directly, matching the
//! teacher's `Context`-chained style.

use axum::{http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

/// The error taxonomy from spec §7, carried as a typed result rather than
/// a thrown exception.
#[derive(Debug, Clone)]
pub enum CoordinatorError {
    /// Schema violations, forbidden-field detections, raw-data detections.
    Validation(Vec<String>),
    /// Wrong state for the requested operation (e.g. stamp on a
    /// non-screening request, double-release, double-dispute).
    Precondition(String),
    /// Rate limit exceeded; not audit-worthy.
    RateLimited { retry_after: DateTime<Utc> },
    /// Unknown id.
    NotFound(String),
    /// An external collaborator (escrow account, node registry) failed.
    ExternalDependency(String),
    /// A cryptographic check failed to verify; never a panic.
    CryptoVerificationFailed,
    /// Storage I/O failure; fatal to the calling transaction.
    Storage(String),
}

impl std::fmt::Display for CoordinatorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoordinatorError::Validation(codes) => write!(f, "validation failed: {}", codes.join(",")),
            CoordinatorError::Precondition(reason) => write!(f, "precondition failed: {reason}"),
            CoordinatorError::RateLimited { retry_after } => {
                write!(f, "rate limited until {retry_after}")
            }
            CoordinatorError::NotFound(what) => write!(f, "not found: {what}"),
            CoordinatorError::ExternalDependency(what) => write!(f, "external dependency failure: {what}"),
            CoordinatorError::CryptoVerificationFailed => write!(f, "cryptographic verification failed"),
            CoordinatorError::Storage(what) => write!(f, "storage failure: {what}"),
        }
    }
}

impl std::error::Error for CoordinatorError {}

impl From<anyhow::Error> for CoordinatorError {
    fn from(err: anyhow::Error) -> Self {
        CoordinatorError::Storage(err.to_string())
    }
}

impl From<rusqlite::Error> for CoordinatorError {
    fn from(err: rusqlite::Error) -> Self {
        CoordinatorError::Storage(err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    codes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<DateTime<Utc>>,
}

impl IntoResponse for CoordinatorError {
    fn into_response(self) -> axum::response::Response {
        let (status, error, message, codes, retry_after) = match &self {
            CoordinatorError::Validation(codes) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_failed",
                "request failed validation".to_string(),
                Some(codes.clone()),
                None,
            ),
            CoordinatorError::Precondition(reason) => (
                StatusCode::CONFLICT,
                "precondition_failed",
                reason.clone(),
                None,
                None,
            ),
            CoordinatorError::RateLimited { retry_after } => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                "too many requests".to_string(),
                None,
                Some(*retry_after),
            ),
            CoordinatorError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                "not_found",
                what.clone(),
                None,
                None,
            ),
            CoordinatorError::ExternalDependency(what) => (
                StatusCode::BAD_GATEWAY,
                "external_dependency_failure",
                what.clone(),
                None,
                None,
            ),
            CoordinatorError::CryptoVerificationFailed => (
                StatusCode::FORBIDDEN,
                "crypto_verification_failed",
                "cryptographic verification failed".to_string(),
                None,
                None,
            ),
            CoordinatorError::Storage(what) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "storage_failure",
                what.clone(),
                None,
                None,
            ),
        };

        let body = ErrorBody {
            error: error.to_string(),
            message,
            codes,
            retry_after,
        };
        (status, Json(json!(body))).into_response()
    }
}

pub type CoordinatorResult<T> = Result<T, CoordinatorError>;
