//! # Attribution Run Handlers
//!
//! Run creation, execution (background or synchronous), status polling, and the result
//! and summary read side.

use axum::{
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::{OperatorAuth, TenantExtension, TenantHeader};
use crate::engine::controller::DEFAULT_RUNS_LIMIT;
use crate::engine::{CreateRunRequest, ErrorSummaryEntry, RunStatus, RunSummary};
use crate::error::{ApiError, AttributionError, validation_error};
use crate::handlers::types::{ListResponse, PaginatedResponse};
use crate::models::{attribution_result, attribution_run};
use crate::server::AppState;

/// Attribution run as exposed by the API
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RunView {
    pub id: Uuid,
    pub model_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    #[schema(value_type = Object)]
    pub config: JsonValue,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub conversions_total: i32,
    pub conversions_attributed: i32,
    pub conversions_without_journey: i32,
    pub conversions_failed: i32,
    pub results_written: i32,
    pub errors: Vec<ErrorSummaryEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<attribution_run::Model> for RunView {
    fn from(model: attribution_run::Model) -> Self {
        Self {
            errors: model
                .error_summary
                .and_then(|summary| serde_json::from_value(summary).ok())
                .unwrap_or_default(),
            id: model.id,
            model_id: model.model_id,
            name: model.name,
            description: model.description,
            config: model.config,
            status: model.status,
            started_at: model.started_at.map(|at| at.with_timezone(&Utc)),
            completed_at: model.completed_at.map(|at| at.with_timezone(&Utc)),
            conversions_total: model.conversions_total,
            conversions_attributed: model.conversions_attributed,
            conversions_without_journey: model.conversions_without_journey,
            conversions_failed: model.conversions_failed,
            results_written: model.results_written,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

/// One credited touchpoint of a conversion
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AttributionResultView {
    pub id: Uuid,
    pub conversion_event_id: Uuid,
    pub interaction_id: Uuid,
    pub customer_id: Uuid,
    pub agent_id: Option<Uuid>,
    pub team_id: Option<Uuid>,
    pub vendor_id: Option<Uuid>,
    pub channel_id: Option<Uuid>,
    pub model_id: Uuid,
    pub attribution_weight: f64,
    pub attributed_amount: f64,
    pub is_primary_touch: bool,
    pub created_at: DateTime<Utc>,
}

impl From<attribution_result::Model> for AttributionResultView {
    fn from(model: attribution_result::Model) -> Self {
        Self {
            id: model.id,
            conversion_event_id: model.conversion_event_id,
            interaction_id: model.interaction_id,
            customer_id: model.customer_id,
            agent_id: model.agent_id,
            team_id: model.team_id,
            vendor_id: model.vendor_id,
            channel_id: model.channel_id,
            model_id: model.model_id,
            attribution_weight: model.attribution_weight,
            attributed_amount: model.attributed_amount,
            is_primary_touch: model.is_primary_touch,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

/// Query parameters for listing runs
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListRunsQuery {
    /// Filter by status (pending, running, completed, failed)
    pub status: Option<String>,
    /// Maximum number of runs to return (default: 20, max: 100)
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ExecuteRunQuery {
    /// Block until the run finishes instead of scheduling it
    pub wait: Option<bool>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListResultsQuery {
    /// Opaque cursor from a previous page
    pub cursor: Option<String>,
    /// Page size (default: 100, max: 500)
    pub limit: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ScheduledRunResponse {
    pub run_id: Uuid,
    pub status: String,
}

/// Create a pending attribution run
#[utoipa::path(
    post,
    path = "/api/v1/attribution/runs",
    security(("bearer_auth" = [])),
    params(TenantHeader),
    request_body = CreateRunRequest,
    responses(
        (status = 201, description = "Run created", body = RunView),
        (status = 400, description = "Invalid run configuration", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 404, description = "Unknown model code or channel", body = ApiError)
    ),
    tag = "attribution"
)]
pub async fn create_run(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    TenantExtension(tenant): TenantExtension,
    payload: Result<Json<CreateRunRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RunView>), ApiError> {
    let Json(request) = payload?;
    let run = state.runs.create_run(tenant.0, request).await?;
    Ok((StatusCode::CREATED, Json(run.into())))
}

/// List runs, newest first
#[utoipa::path(
    get,
    path = "/api/v1/attribution/runs",
    security(("bearer_auth" = [])),
    params(TenantHeader, ListRunsQuery),
    responses(
        (status = 200, description = "Runs for the tenant", body = ListResponse<RunView>),
        (status = 400, description = "Invalid query parameters", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError)
    ),
    tag = "attribution"
)]
pub async fn list_runs(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    TenantExtension(tenant): TenantExtension,
    Query(query): Query<ListRunsQuery>,
) -> Result<Json<ListResponse<RunView>>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<RunStatus>)
        .transpose()
        .map_err(|_| {
            validation_error(
                "Invalid status",
                serde_json::json!({
                    "status": "Must be one of: pending, running, completed, failed"
                }),
            )
        })?;

    let (runs, total) = state
        .runs
        .list_runs(tenant.0, status, query.limit, query.offset)
        .await?;
    Ok(Json(ListResponse {
        limit: query.limit.unwrap_or(DEFAULT_RUNS_LIMIT),
        offset: query.offset.unwrap_or(0),
        total,
        data: runs.into_iter().map(RunView::from).collect(),
    }))
}

/// Fetch one run, including its outcome counters
#[utoipa::path(
    get,
    path = "/api/v1/attribution/runs/{run_id}",
    security(("bearer_auth" = [])),
    params(TenantHeader, ("run_id" = Uuid, Path, description = "Run identifier")),
    responses(
        (status = 200, description = "Run", body = RunView),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 404, description = "Run not found", body = ApiError)
    ),
    tag = "attribution"
)]
pub async fn get_run(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    TenantExtension(tenant): TenantExtension,
    Path(run_id): Path<Uuid>,
) -> Result<Json<RunView>, ApiError> {
    let run = state.runs.get_run(tenant.0, run_id).await?;
    Ok(Json(run.into()))
}

/// Execute a run in the background, or synchronously with `wait=true`
#[utoipa::path(
    post,
    path = "/api/v1/attribution/runs/{run_id}/execute",
    security(("bearer_auth" = [])),
    params(TenantHeader, ("run_id" = Uuid, Path, description = "Run identifier"), ExecuteRunQuery),
    responses(
        (status = 200, description = "Run finished (wait=true)", body = RunView),
        (status = 202, description = "Run scheduled", body = ScheduledRunResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 404, description = "Run not found", body = ApiError),
        (status = 409, description = "Run already running", body = ApiError)
    ),
    tag = "attribution"
)]
pub async fn execute_run(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    TenantExtension(tenant): TenantExtension,
    Path(run_id): Path<Uuid>,
    Query(query): Query<ExecuteRunQuery>,
) -> Result<Response, ApiError> {
    let run = state.runs.get_run(tenant.0, run_id).await?;
    if run.status == RunStatus::Running.as_str() {
        return Err(AttributionError::Conflict(format!(
            "attribution run {run_id} is already running"
        ))
        .into());
    }

    if query.wait.unwrap_or(false) {
        state.dispatcher.execute_now(tenant.0, run_id).await?;
        let run = state.runs.get_run(tenant.0, run_id).await?;
        return Ok(Json(RunView::from(run)).into_response());
    }

    state.dispatcher.schedule(tenant.0, run_id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(ScheduledRunResponse {
            run_id,
            status: "scheduled".to_string(),
        }),
    )
        .into_response())
}

/// Page through a run's results ordered by creation
#[utoipa::path(
    get,
    path = "/api/v1/attribution/runs/{run_id}/results",
    security(("bearer_auth" = [])),
    params(TenantHeader, ("run_id" = Uuid, Path, description = "Run identifier"), ListResultsQuery),
    responses(
        (status = 200, description = "Result page", body = PaginatedResponse<AttributionResultView>),
        (status = 400, description = "Invalid cursor or limit", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 404, description = "Run not found", body = ApiError)
    ),
    tag = "attribution"
)]
pub async fn list_results(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    TenantExtension(tenant): TenantExtension,
    Path(run_id): Path<Uuid>,
    Query(query): Query<ListResultsQuery>,
) -> Result<Json<PaginatedResponse<AttributionResultView>>, ApiError> {
    let page = state
        .runs
        .list_results(tenant.0, run_id, query.cursor.as_deref(), query.limit)
        .await?;
    Ok(Json(PaginatedResponse::new(
        page.results
            .into_iter()
            .map(AttributionResultView::from)
            .collect(),
        page.next_cursor,
    )))
}

/// Attributed revenue grouped by agent, team, vendor, and channel
#[utoipa::path(
    get,
    path = "/api/v1/attribution/runs/{run_id}/summary",
    security(("bearer_auth" = [])),
    params(TenantHeader, ("run_id" = Uuid, Path, description = "Run identifier")),
    responses(
        (status = 200, description = "Run summary", body = RunSummary),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 404, description = "Run not found", body = ApiError)
    ),
    tag = "attribution"
)]
pub async fn run_summary(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    TenantExtension(tenant): TenantExtension,
    Path(run_id): Path<Uuid>,
) -> Result<Json<RunSummary>, ApiError> {
    let summary = state.runs.run_summary(tenant.0, run_id).await?;
    Ok(Json(summary))
}
