//! # Authentication and Tenant Resolution
//!
//! Operator bearer authentication plus `X-Tenant-Id` resolution for every `/api/v1` route.
//! Downstream handlers receive the tenant through [`TenantExtension`]; every identity,
//! ingestion, and run operation is scoped by it.

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{ApiError, unauthorized, unauthorized_with_trace_id, validation_error};
use crate::server::AppState;
use crate::telemetry::TraceContext;

/// Header carrying the tenant every `/api/v1` request acts for.
pub const TENANT_HEADER: &str = "X-Tenant-Id";

/// Tenant ID wrapper for type safety
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TenantId(pub Uuid);

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Marker type for authenticated operator requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatorAuth;

/// Extractor for tenant ID from request extensions
#[derive(Debug, Clone)]
pub struct TenantExtension(pub TenantId);

impl FromRef<AppState> for Arc<AppConfig> {
    fn from_ref(app_state: &AppState) -> Self {
        Arc::clone(&app_state.config)
    }
}

/// Authentication middleware that validates bearer tokens and tenant headers
pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let trace_id = request
        .extensions()
        .get::<TraceContext>()
        .map(|ctx| ctx.trace_id.clone());

    let headers = request.headers();
    let token = extract_bearer_token(headers, trace_id.as_deref())?;
    validate_token(&config, token)?;

    let tenant = TenantId::from_headers(headers)?;
    tracing::debug!(tenant_id = %tenant, "Authenticated operator request");

    request.extensions_mut().insert(TenantExtension(tenant));
    request.extensions_mut().insert(OperatorAuth);

    Ok(next.run(request).await)
}

fn extract_bearer_token<'a>(
    headers: &'a HeaderMap,
    trace_id: Option<&str>,
) -> Result<&'a str, ApiError> {
    let reject = |message: &str| match trace_id {
        Some(trace_id) => unauthorized_with_trace_id(Some(message), trace_id.to_string()),
        None => unauthorized(Some(message)),
    };

    let header = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| reject("Missing Authorization header"))?
        .to_str()
        .map_err(|_| reject("Invalid Authorization header"))?;

    header
        .strip_prefix("Bearer ")
        .ok_or_else(|| reject("Authorization header must use Bearer scheme"))
}

fn validate_token(config: &AppConfig, token: &str) -> Result<(), ApiError> {
    let is_valid = config
        .operator_tokens
        .iter()
        .any(|configured| ConstantTimeEq::ct_eq(token.as_bytes(), configured.as_bytes()).into());

    if is_valid {
        Ok(())
    } else {
        Err(unauthorized(Some("Invalid bearer token")))
    }
}

impl TenantId {
    /// Reads the tenant from `X-Tenant-Id`; surrounding whitespace is ignored.
    fn from_headers(headers: &HeaderMap) -> Result<Self, ApiError> {
        let reject = |message: &str, detail: &str| {
            validation_error(message, serde_json::json!({ TENANT_HEADER: detail }))
        };

        let raw = headers
            .get(TENANT_HEADER)
            .ok_or_else(|| reject("Missing required header", "Required header is missing"))?
            .to_str()
            .map_err(|_| reject("Invalid tenant header", "Header must be valid UTF-8"))?;

        raw.trim()
            .parse::<Uuid>()
            .map(TenantId)
            .map_err(|_| reject("Invalid tenant ID", "Must be a valid UUID"))
    }
}

/// OpenAPI header parameter for X-Tenant-Id
#[derive(Debug, Serialize, Deserialize, IntoParams, utoipa::ToSchema)]
#[into_params(parameter_in = Header)]
pub struct TenantHeader {
    /// Tenant identifier (UUID) that scopes the request to a specific tenant
    #[serde(rename = "X-Tenant-Id")]
    #[param(rename = "X-Tenant-Id", value_type = String)]
    pub tenant_id: String,
}

impl<S> FromRequestParts<S> for TenantExtension
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<TenantExtension>().cloned().ok_or_else(|| {
            validation_error(
                "Tenant context missing",
                serde_json::json!({ TENANT_HEADER: "Tenant context not present" }),
            )
        })
    }
}

impl<S> FromRequestParts<S> for OperatorAuth
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<OperatorAuth>() {
            Some(auth) => Ok(*auth),
            None => Err(unauthorized(Some("Operator authentication required"))),
        }
    }
}
