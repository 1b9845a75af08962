//! AttributionRun entity model
//!
//! This module contains the SeaORM entity model for the attribution_runs table. A run is
//! one batch execution of a weighting model over a tenant's conversions, moving through
//! `pending -> running -> completed | failed`.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;

/// AttributionRun entity with lifecycle status and outcome counters
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "attribution_runs")]
pub struct Model {
    /// Unique identifier for the run (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Tenant identifier for multi-tenancy
    pub tenant_id: Uuid,

    /// Attribution model applied by this run
    pub model_id: Uuid,

    /// Operator-supplied run name
    pub name: String,

    pub description: Option<String>,

    /// Serialized, validated `RunConfig`
    #[sea_orm(column_type = "JsonBinary")]
    pub config: JsonValue,

    /// pending / running / completed / failed
    pub status: String,

    /// Timestamp when the latest execution started
    pub started_at: Option<DateTimeWithTimeZone>,

    /// Timestamp when the latest execution finished
    pub completed_at: Option<DateTimeWithTimeZone>,

    /// Conversions matched by the run filters
    pub conversions_total: i32,

    /// Conversions that produced at least one result row
    pub conversions_attributed: i32,

    /// Conversions with no interaction inside the window
    pub conversions_without_journey: i32,

    /// Conversions whose attribution failed
    pub conversions_failed: i32,

    /// Result rows written by the latest execution
    pub results_written: i32,

    /// Captured per-conversion error summaries
    #[sea_orm(column_type = "JsonBinary")]
    pub error_summary: Option<JsonValue>,

    /// Timestamp when the run was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the run was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::attribution_result::Entity")]
    Results,
}

impl Related<super::attribution_result::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Results.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
