//! # Conversion API Handlers

use axum::{
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};

use crate::auth::{OperatorAuth, TenantExtension, TenantHeader};
use crate::error::ApiError;
use crate::ingestion::{IngestConversionRequest, IngestConversionResponse};
use crate::server::AppState;

/// Ingest a revenue-generating conversion event
#[utoipa::path(
    post,
    path = "/api/v1/conversions",
    security(("bearer_auth" = [])),
    params(TenantHeader),
    request_body = IngestConversionRequest,
    responses(
        (status = 201, description = "Conversion stored", body = IngestConversionResponse),
        (status = 400, description = "Invalid payload", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 404, description = "Unknown event source or currency", body = ApiError)
    ),
    tag = "ingestion"
)]
pub async fn ingest_conversion(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    TenantExtension(tenant): TenantExtension,
    payload: Result<Json<IngestConversionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<IngestConversionResponse>), ApiError> {
    let Json(request) = payload?;
    let response = state.ingestion.ingest_conversion(tenant.0, request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}
