//! # Attribution Result Repository
//!
//! Result rows are replaced per `(run, conversion)` so re-executing a run never
//! accumulates duplicates.

use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, TransactionTrait,
};
use uuid::Uuid;

use crate::cursor::ResultCursor;
use crate::error::{AttributionError, EngineResult};
use crate::models::{AttributionResult, attribution_result};

/// Repository for attribution result database operations
#[derive(Debug, Clone)]
pub struct AttributionResultRepository {
    db: DatabaseConnection,
}

impl AttributionResultRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Deletes any rows from a previous execution of this run for the conversion and
    /// inserts the new set in one transaction. Only begin and commit failures surface as
    /// [`AttributionError::TransactionFailure`]; statement errors keep their own mapping.
    pub async fn replace_for_conversion(
        &self,
        run_id: Uuid,
        conversion_event_id: Uuid,
        rows: Vec<attribution_result::ActiveModel>,
    ) -> EngineResult<usize> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(AttributionError::transaction("begin result replacement"))?;

        AttributionResult::delete_many()
            .filter(attribution_result::Column::AttributionRunId.eq(run_id))
            .filter(attribution_result::Column::ConversionEventId.eq(conversion_event_id))
            .exec(&txn)
            .await?;

        let written = rows.len();
        if !rows.is_empty() {
            AttributionResult::insert_many(rows)
                .exec_without_returning(&txn)
                .await?;
        }

        txn.commit()
            .await
            .map_err(AttributionError::transaction("commit attribution results"))?;

        Ok(written)
    }

    /// Keyset page ordered by `(created_at, id)`. Fetches one extra row so the caller
    /// can tell whether another page exists.
    pub async fn page(
        &self,
        run_id: Uuid,
        after: Option<ResultCursor>,
        limit: u64,
    ) -> EngineResult<(Vec<attribution_result::Model>, bool)> {
        let mut query = AttributionResult::find()
            .filter(attribution_result::Column::AttributionRunId.eq(run_id));

        if let Some(cursor) = after {
            let created_at = cursor.created_at.fixed_offset();
            query = query.filter(
                Condition::any()
                    .add(attribution_result::Column::CreatedAt.gt(created_at))
                    .add(
                        Condition::all()
                            .add(attribution_result::Column::CreatedAt.eq(created_at))
                            .add(attribution_result::Column::Id.gt(cursor.id)),
                    ),
            );
        }

        let mut rows = query
            .order_by_asc(attribution_result::Column::CreatedAt)
            .order_by_asc(attribution_result::Column::Id)
            .limit(limit + 1)
            .all(&self.db)
            .await?;

        let has_more = rows.len() as u64 > limit;
        rows.truncate(limit as usize);
        Ok((rows, has_more))
    }

    pub async fn all_for_run(&self, run_id: Uuid) -> EngineResult<Vec<attribution_result::Model>> {
        Ok(AttributionResult::find()
            .filter(attribution_result::Column::AttributionRunId.eq(run_id))
            .order_by_asc(attribution_result::Column::CreatedAt)
            .order_by_asc(attribution_result::Column::Id)
            .all(&self.db)
            .await?)
    }
}
