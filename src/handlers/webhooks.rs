//! # Webhook Handlers
//!
//! Telephony platforms push call lifecycle events here; each event becomes an interaction
//! ingest or update for the tenant named in `X-Tenant-Id`.

use axum::{
    extract::{State, rejection::JsonRejection},
    response::Json,
};

use crate::auth::{OperatorAuth, TenantExtension, TenantHeader};
use crate::error::ApiError;
use crate::ingestion::{CallEvent, CallEventResponse};
use crate::server::AppState;

/// Receive a call lifecycle event
#[utoipa::path(
    post,
    path = "/api/v1/webhooks/calls",
    security(("bearer_auth" = [])),
    params(TenantHeader),
    request_body = CallEvent,
    responses(
        (status = 200, description = "Event processed", body = CallEventResponse),
        (status = 400, description = "Unsupported event type or invalid payload", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 404, description = "Call not yet started", body = ApiError),
        (status = 409, description = "Call already started", body = ApiError)
    ),
    tag = "webhooks"
)]
pub async fn call_event(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    TenantExtension(tenant): TenantExtension,
    payload: Result<Json<CallEvent>, JsonRejection>,
) -> Result<Json<CallEventResponse>, ApiError> {
    let Json(event) = payload?;
    let response = state.ingestion.handle_call_event(tenant.0, event).await?;
    Ok(Json(response))
}
