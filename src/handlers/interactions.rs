//! # Interaction API Handlers
//!
//! Ingestion of interactions (calls, chats, ad clicks) and lifecycle updates keyed by the
//! originating platform's interaction id.

use axum::{
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};

use crate::auth::{OperatorAuth, TenantExtension, TenantHeader};
use crate::error::ApiError;
use crate::ingestion::{
    IngestInteractionRequest, IngestInteractionResponse, InteractionView, UpdateInteractionRequest,
};
use crate::server::AppState;

/// Ingest an interaction and resolve its customer
#[utoipa::path(
    post,
    path = "/api/v1/interactions",
    security(("bearer_auth" = [])),
    params(TenantHeader),
    request_body = IngestInteractionRequest,
    responses(
        (status = 201, description = "Interaction stored", body = IngestInteractionResponse),
        (status = 400, description = "Invalid payload", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 404, description = "Unknown channel", body = ApiError),
        (status = 409, description = "Interaction already ingested", body = ApiError)
    ),
    tag = "ingestion"
)]
pub async fn ingest_interaction(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    TenantExtension(tenant): TenantExtension,
    payload: Result<Json<IngestInteractionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<IngestInteractionResponse>), ApiError> {
    let Json(request) = payload?;
    let response = state.ingestion.ingest_interaction(tenant.0, request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Apply lifecycle updates (end time, transcript, intent) to an interaction
#[utoipa::path(
    patch,
    path = "/api/v1/interactions/{external_interaction_id}",
    security(("bearer_auth" = [])),
    params(
        TenantHeader,
        ("external_interaction_id" = String, Path, description = "Interaction id assigned by the originating platform")
    ),
    request_body = UpdateInteractionRequest,
    responses(
        (status = 200, description = "Updated interaction", body = InteractionView),
        (status = 400, description = "Invalid payload", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 404, description = "Interaction not found", body = ApiError)
    ),
    tag = "ingestion"
)]
pub async fn update_interaction(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    TenantExtension(tenant): TenantExtension,
    Path(external_interaction_id): Path<String>,
    payload: Result<Json<UpdateInteractionRequest>, JsonRejection>,
) -> Result<Json<InteractionView>, ApiError> {
    let Json(update) = payload?;
    let updated = state
        .ingestion
        .update_interaction(tenant.0, &external_interaction_id, update)
        .await?;
    Ok(Json(updated.into()))
}
