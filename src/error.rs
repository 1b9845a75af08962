//! # Error Handling
//!
//! This module provides unified error handling for the Attribution Engine: the domain
//! [`AttributionError`] taxonomy returned by the core services, and the HTTP-facing
//! [`ApiError`] rendered as problem+json with trace ID propagation.

use axum::{
    extract::rejection::JsonRejection,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use sea_orm::DbErr;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;

use crate::telemetry;

/// Unified API error response structure
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    /// HTTP status code for the response
    #[serde(skip_serializing, skip_deserializing)]
    pub status: StatusCode,
    /// Error code for programmatic handling
    pub code: Box<str>,
    /// Human-readable error message
    pub message: Box<str>,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Box<serde_json::Value>>,
    /// Suggested retry delay in seconds (optional)
    pub retry_after: Option<u64>,
    /// Correlation trace ID for debugging (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Box<str>>,
}

impl ApiError {
    /// Create a new API error with the given status code and message
    pub fn new<S: Into<String>>(status: StatusCode, code: S, message: S) -> Self {
        Self {
            status,
            code: code.into().into_boxed_str(),
            message: message.into().into_boxed_str(),
            details: None,
            retry_after: None,
            trace_id: Self::current_trace_id(),
        }
    }

    /// Add details to the error
    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(Box::new(details.into()));
        self
    }

    /// Set retry after delay
    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    /// Extract current trace ID from the active tracing span (falls back to generated correlation ID)
    fn current_trace_id() -> Option<Box<str>> {
        telemetry::current_trace_id()
            .map(|trace_id| trace_id.into_boxed_str())
            .or_else(|| {
                // Fallback: generate a correlation ID for basic client-server log correlation
                Some(format!("corr-{}", &uuid::Uuid::new_v4().to_string()[..8]).into_boxed_str())
            })
    }
}

/// Returns true when the database rejected a write because of a unique constraint.
pub(crate) fn is_unique_violation(error: &DbErr) -> bool {
    use sea_orm::RuntimeErr;

    const PG_UNIQUE: &str = "23505";
    const SQLITE_DUPLICATE_CODES: &[&str] = &["1555", "2067"];

    let runtime_err = match error {
        DbErr::Query(RuntimeErr::SqlxError(sqlx_err))
        | DbErr::Exec(RuntimeErr::SqlxError(sqlx_err)) => sqlx_err,
        _ => return false,
    };

    let Some(db_error) = runtime_err.as_database_error() else {
        return false;
    };

    if db_error.is_unique_violation() {
        return true;
    }

    if let Some(code) = db_error.code() {
        let code_str = code.as_ref();
        if code_str == PG_UNIQUE || SQLITE_DUPLICATE_CODES.contains(&code_str) {
            return true;
        }
    }

    false
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/problem+json"),
        );

        // Add Retry-After header if present
        if let Some(retry_after) = self.retry_after
            && let Ok(header_value) = HeaderValue::from_str(&retry_after.to_string())
        {
            headers.insert("retry-after", header_value);
        }

        (self.status, headers, axum::Json(self)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        // Log the full error for debugging
        tracing::error!("Internal error: {:?}", error);

        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "An internal error occurred",
        )
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let message = match rejection {
            JsonRejection::JsonDataError(err) => format!("Invalid JSON: {}", err),
            JsonRejection::JsonSyntaxError(err) => format!("JSON syntax error: {}", err),
            JsonRejection::MissingJsonContentType(_) => {
                "Missing 'Content-Type: application/json' header".to_string()
            }
            _ => "Invalid request body".to_string(),
        };

        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", &message)
    }
}

impl From<DbErr> for ApiError {
    fn from(error: DbErr) -> Self {
        if let DbErr::Conn(connection_err) = &error {
            tracing::error!("Database connection error: {:?}", connection_err);
            return service_unavailable("Database service unavailable");
        }
        AttributionError::from(error).into()
    }
}

/// Create a service unavailable error (503)
pub fn service_unavailable(message: &str) -> ApiError {
    ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", message)
}

/// Create an unauthorized error (401)
pub fn unauthorized(message: Option<&str>) -> ApiError {
    let msg = message.unwrap_or("Authentication required");
    ApiError::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg)
}

/// Create an unauthorized error (401) with explicit trace_id
pub fn unauthorized_with_trace_id(message: Option<&str>, trace_id: String) -> ApiError {
    let msg = message.unwrap_or("Authentication required");
    let mut error = ApiError::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg);
    error.trace_id = Some(trace_id.into_boxed_str());
    error
}

/// Create a validation error with field details
pub fn validation_error(message: &str, field_errors: serde_json::Value) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message).with_details(field_errors)
}

/// Errors surfaced by the attribution core (identity, ingestion, runs).
#[derive(Debug, Error)]
pub enum AttributionError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("transaction failure while {context}: {source}")]
    TransactionFailure {
        context: &'static str,
        #[source]
        source: DbErr,
    },
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result alias used across the core services.
pub type EngineResult<T> = Result<T, AttributionError>;

impl AttributionError {
    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn not_found<K: ToString>(entity: &'static str, key: K) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    /// Maps a begin/commit/rollback failure, keeping what the caller was doing.
    pub fn transaction(context: &'static str) -> impl FnOnce(DbErr) -> Self {
        move |source| Self::TransactionFailure { context, source }
    }
}

impl From<DbErr> for AttributionError {
    fn from(error: DbErr) -> Self {
        if is_unique_violation(&error) {
            return Self::Conflict("resource already exists".to_string());
        }

        match error {
            DbErr::RecordNotFound(record) => Self::NotFound {
                entity: "record",
                key: record,
            },
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for AttributionError {
    fn from(error: serde_json::Error) -> Self {
        Self::Internal(format!("serialization error: {}", error))
    }
}

impl From<AttributionError> for ApiError {
    fn from(error: AttributionError) -> Self {
        match error {
            AttributionError::InvalidInput(message) => {
                ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED".to_string(), message)
            }
            AttributionError::NotFound { entity, key } => ApiError::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND".to_string(),
                format!("{} not found", entity),
            )
            .with_details(json!({ "entity": entity, "key": key })),
            AttributionError::Conflict(message) => {
                ApiError::new(StatusCode::CONFLICT, "CONFLICT".to_string(), message)
            }
            AttributionError::TransactionFailure { context, source } => {
                tracing::error!(error = ?source, context, "Transaction failure");
                ApiError::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "TRANSACTION_FAILED",
                    "The write could not be committed; retry the request",
                )
                .with_retry_after(1)
            }
            AttributionError::Internal(message) => {
                tracing::error!(error = %message, "Internal attribution error");
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "An internal error occurred",
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use serde_json::json;

    #[test]
    fn test_api_error_basic() {
        let error = ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "Test error message",
        );

        assert_eq!(error.code, Box::from("VALIDATION_FAILED"));
        assert_eq!(error.message, Box::from("Test error message"));
        assert_eq!(error.details, None);
        assert_eq!(error.retry_after, None);
    }

    #[test]
    fn test_service_unavailable() {
        let error = service_unavailable("Database service unavailable");
        assert_eq!(error.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(error.code.as_ref(), "SERVICE_UNAVAILABLE");
    }

    #[test]
    fn test_from_anyhow() {
        let anyhow_error = anyhow::anyhow!("Something went wrong");
        let api_error: ApiError = anyhow_error.into();

        assert_eq!(api_error.code, Box::from("INTERNAL_SERVER_ERROR"));
        assert_eq!(api_error.message, Box::from("An internal error occurred"));
    }

    #[test]
    fn test_content_type_header() {
        let error = ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", "Test error");

        let response = error.into_response();

        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/problem+json"
        );
    }

    #[test]
    fn test_trace_id_generation() {
        let error = ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Test error",
        );

        assert!(error.trace_id.is_some());
        let trace_id = error.trace_id.unwrap();
        assert!(trace_id.starts_with("corr-"));
        assert_eq!(trace_id.len(), 13); // "corr-" + 8 chars
    }

    #[test]
    fn test_database_error_mapping() {
        let db_error = sea_orm::DbErr::RecordNotFound("test_record".to_string());
        let api_error: ApiError = db_error.into();

        assert_eq!(api_error.status, StatusCode::NOT_FOUND);
        assert_eq!(api_error.code, Box::from("NOT_FOUND"));
        assert_eq!(api_error.details.expect("details")["key"], "test_record");
    }

    #[test]
    fn test_validation_error_with_details() {
        let field_errors = json!({ "identifiers": "At least one identifier is required" });

        let validation_error = validation_error("Validation failed", field_errors.clone());

        assert_eq!(validation_error.status, StatusCode::BAD_REQUEST);
        assert_eq!(validation_error.code, Box::from("VALIDATION_FAILED"));
        assert_eq!(validation_error.details, Some(Box::new(field_errors)));
    }

    #[test]
    fn test_attribution_error_status_mapping() {
        let cases: Vec<(AttributionError, StatusCode, &str)> = vec![
            (
                AttributionError::invalid("identifiers must not be empty"),
                StatusCode::BAD_REQUEST,
                "VALIDATION_FAILED",
            ),
            (
                AttributionError::not_found("channel", "pigeon"),
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
            ),
            (
                AttributionError::Conflict("run is already running".to_string()),
                StatusCode::CONFLICT,
                "CONFLICT",
            ),
            (
                AttributionError::transaction("committing ingest")(DbErr::Custom(
                    "connection reset".to_string(),
                )),
                StatusCode::SERVICE_UNAVAILABLE,
                "TRANSACTION_FAILED",
            ),
            (
                AttributionError::Internal("boom".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
            ),
        ];

        for (error, status, code) in cases {
            let api_error: ApiError = error.into();
            assert_eq!(api_error.status, status);
            assert_eq!(api_error.code.as_ref(), code);
        }
    }

    #[test]
    fn test_not_found_details_name_the_entity() {
        let api_error: ApiError = AttributionError::not_found("currency", "XYZ").into();
        let details = api_error.details.expect("details present");
        assert_eq!(details["entity"], "currency");
        assert_eq!(details["key"], "XYZ");
    }

    #[test]
    fn test_transaction_failure_sets_retry_after() {
        let api_error: ApiError =
            AttributionError::transaction("committing run")(DbErr::Custom("x".to_string())).into();
        assert_eq!(api_error.retry_after, Some(1));
        let response = api_error.into_response();
        assert_eq!(response.headers().get("retry-after").unwrap(), "1");
    }

    #[test]
    fn test_connection_error_is_unavailable() {
        let api_error: ApiError =
            DbErr::Conn(sea_orm::RuntimeErr::Internal("refused".to_string())).into();
        assert_eq!(api_error.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_db_err_converts_to_internal() {
        let error: AttributionError = DbErr::Custom("broken".to_string()).into();
        assert!(matches!(error, AttributionError::Internal(_)));
    }
}
