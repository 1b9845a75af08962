//! # Attribution Run Repository
//!
//! Lifecycle writes for `attribution_runs`. The `running` transition is a conditional
//! update so two executors can never own the same run. A `running` run whose `started_at`
//! is older than the lease is treated as abandoned and can be claimed again.

use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, sea_query::Expr,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::engine::outcome::{RunOutcome, RunStatus};
use crate::error::EngineResult;
use crate::models::{AttributionRun, attribution_run};

/// Fields needed to create a pending run.
#[derive(Debug, Clone)]
pub struct NewRun {
    pub tenant_id: Uuid,
    pub model_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub config: JsonValue,
}

/// Repository for attribution run database operations
#[derive(Debug, Clone)]
pub struct AttributionRunRepository {
    db: DatabaseConnection,
}

impl AttributionRunRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create(&self, run: NewRun) -> EngineResult<attribution_run::Model> {
        let now = Utc::now().fixed_offset();
        let model = attribution_run::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(run.tenant_id),
            model_id: Set(run.model_id),
            name: Set(run.name),
            description: Set(run.description),
            config: Set(run.config),
            status: Set(RunStatus::Pending.as_str().to_string()),
            started_at: Set(None),
            completed_at: Set(None),
            conversions_total: Set(0),
            conversions_attributed: Set(0),
            conversions_without_journey: Set(0),
            conversions_failed: Set(0),
            results_written: Set(0),
            error_summary: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = model.insert(&self.db).await?;
        tracing::info!(
            tenant_id = %created.tenant_id,
            run_id = %created.id,
            "Attribution run created"
        );
        Ok(created)
    }

    /// Find a run by ID, ensuring it belongs to the specified tenant
    pub async fn find_by_tenant(
        &self,
        tenant_id: Uuid,
        run_id: Uuid,
    ) -> EngineResult<Option<attribution_run::Model>> {
        Ok(AttributionRun::find_by_id(run_id)
            .filter(attribution_run::Column::TenantId.eq(tenant_id))
            .one(&self.db)
            .await?)
    }

    /// Newest runs first, optionally filtered by status.
    pub async fn list_by_tenant(
        &self,
        tenant_id: Uuid,
        status: Option<RunStatus>,
        limit: u64,
        offset: u64,
    ) -> EngineResult<(Vec<attribution_run::Model>, u64)> {
        let mut query =
            AttributionRun::find().filter(attribution_run::Column::TenantId.eq(tenant_id));

        if let Some(status) = status {
            query = query.filter(attribution_run::Column::Status.eq(status.as_str()));
        }

        let total = query.clone().count(&self.db).await?;
        let runs = query
            .order_by_desc(attribution_run::Column::CreatedAt)
            .order_by_desc(attribution_run::Column::Id)
            .offset(offset)
            .limit(limit)
            .all(&self.db)
            .await?;

        Ok((runs, total))
    }

    /// Moves the run to `running` unless another executor holds a live lease on it;
    /// returns whether this caller won.
    pub async fn claim(
        &self,
        tenant_id: Uuid,
        run_id: Uuid,
        lease: Duration,
    ) -> EngineResult<bool> {
        let now = Utc::now().fixed_offset();
        let lease_expired_before = now - lease;
        let result = AttributionRun::update_many()
            .col_expr(
                attribution_run::Column::Status,
                Expr::value(RunStatus::Running.as_str()),
            )
            .col_expr(attribution_run::Column::StartedAt, Expr::value(now))
            .col_expr(
                attribution_run::Column::CompletedAt,
                Expr::value(Option::<chrono::DateTime<chrono::FixedOffset>>::None),
            )
            .col_expr(attribution_run::Column::ConversionsTotal, Expr::value(0))
            .col_expr(attribution_run::Column::ConversionsAttributed, Expr::value(0))
            .col_expr(attribution_run::Column::ConversionsWithoutJourney, Expr::value(0))
            .col_expr(attribution_run::Column::ConversionsFailed, Expr::value(0))
            .col_expr(attribution_run::Column::ResultsWritten, Expr::value(0))
            .col_expr(
                attribution_run::Column::ErrorSummary,
                Expr::value(Option::<JsonValue>::None),
            )
            .col_expr(attribution_run::Column::UpdatedAt, Expr::value(now))
            .filter(attribution_run::Column::Id.eq(run_id))
            .filter(attribution_run::Column::TenantId.eq(tenant_id))
            .filter(
                Condition::any()
                    .add(attribution_run::Column::Status.ne(RunStatus::Running.as_str()))
                    .add(attribution_run::Column::StartedAt.is_null())
                    .add(attribution_run::Column::StartedAt.lt(lease_expired_before)),
            )
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected == 1)
    }

    pub async fn record_total(&self, run_id: Uuid, conversions_total: u32) -> EngineResult<()> {
        AttributionRun::update_many()
            .col_expr(
                attribution_run::Column::ConversionsTotal,
                Expr::value(to_i32(conversions_total)),
            )
            .col_expr(
                attribution_run::Column::UpdatedAt,
                Expr::value(Utc::now().fixed_offset()),
            )
            .filter(attribution_run::Column::Id.eq(run_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Persists the final status and outcome counters.
    pub async fn finalize(
        &self,
        run_id: Uuid,
        outcome: &RunOutcome,
    ) -> EngineResult<attribution_run::Model> {
        let run = AttributionRun::find_by_id(run_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| crate::error::AttributionError::not_found("attribution_run", run_id))?;

        let now = Utc::now().fixed_offset();
        let mut active: attribution_run::ActiveModel = run.into();
        active.status = Set(outcome.final_status().as_str().to_string());
        active.completed_at = Set(Some(now));
        active.conversions_total = Set(to_i32(outcome.conversions_total));
        active.conversions_attributed = Set(to_i32(outcome.conversions_attributed));
        active.conversions_without_journey = Set(to_i32(outcome.conversions_without_journey));
        active.conversions_failed = Set(to_i32(outcome.conversions_failed));
        active.results_written = Set(to_i32(outcome.results_written));
        active.error_summary = Set(outcome.error_summary());
        active.updated_at = Set(now);

        Ok(active.update(&self.db).await?)
    }

    /// Marks a run failed without outcome counters, e.g. when setup or finalization fails.
    pub async fn mark_failed(&self, run_id: Uuid, error_summary: JsonValue) -> EngineResult<()> {
        let now = Utc::now().fixed_offset();
        AttributionRun::update_many()
            .col_expr(
                attribution_run::Column::Status,
                Expr::value(RunStatus::Failed.as_str()),
            )
            .col_expr(attribution_run::Column::CompletedAt, Expr::value(now))
            .col_expr(attribution_run::Column::ErrorSummary, Expr::value(error_summary))
            .col_expr(attribution_run::Column::UpdatedAt, Expr::value(now))
            .filter(attribution_run::Column::Id.eq(run_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }
}

fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}
