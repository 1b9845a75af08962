//! # Customer API Handlers

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::auth::{OperatorAuth, TenantExtension, TenantHeader};
use crate::error::ApiError;
use crate::identity::CustomerJourney;
use crate::server::AppState;

/// Optional time bounds for the journey view (inclusive, RFC3339)
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct JourneyQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Identifiers, interactions, and conversions of one customer
#[utoipa::path(
    get,
    path = "/api/v1/customers/{customer_id}/journey",
    security(("bearer_auth" = [])),
    params(
        TenantHeader,
        ("customer_id" = Uuid, Path, description = "Customer identifier"),
        JourneyQuery
    ),
    responses(
        (status = 200, description = "Customer journey", body = CustomerJourney),
        (status = 400, description = "Invalid time bounds", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 404, description = "Customer not found", body = ApiError)
    ),
    tag = "customers"
)]
pub async fn customer_journey(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    TenantExtension(tenant): TenantExtension,
    Path(customer_id): Path<Uuid>,
    Query(query): Query<JourneyQuery>,
) -> Result<Json<CustomerJourney>, ApiError> {
    let journey = state
        .identity
        .customer_journey(tenant.0, customer_id, query.from, query.to)
        .await?;
    Ok(Json(journey))
}
