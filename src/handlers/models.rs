//! # Attribution Model Handlers

use axum::{extract::State, response::Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{OperatorAuth, TenantHeader};
use crate::error::ApiError;
use crate::models::attribution_model;
use crate::server::AppState;

/// Attribution model as exposed by the API
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ModelInfo {
    pub id: Uuid,
    /// Registry code, e.g. `TIME_DECAY`
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub params: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl From<attribution_model::Model> for ModelInfo {
    fn from(model: attribution_model::Model) -> Self {
        Self {
            id: model.id,
            code: model.code,
            name: model.name,
            description: model.description,
            params: model.params,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ModelsResponse {
    pub models: Vec<ModelInfo>,
}

/// List the available attribution models
#[utoipa::path(
    get,
    path = "/api/v1/attribution/models",
    security(("bearer_auth" = [])),
    params(TenantHeader),
    responses(
        (status = 200, description = "Attribution models", body = ModelsResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError)
    ),
    tag = "attribution"
)]
pub async fn list_models(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
) -> Result<Json<ModelsResponse>, ApiError> {
    let models = state.runs.list_models().await?;
    Ok(Json(ModelsResponse {
        models: models.into_iter().map(ModelInfo::from).collect(),
    }))
}
