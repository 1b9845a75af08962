//! AttributionModel entity model
//!
//! Persisted mirror of the static weighting-model registry. Runs reference a row here
//! by id; the weighting behaviour itself lives in [`crate::engine::registry`].

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "attribution_models")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Registry code (e.g. `LINEAR`)
    #[sea_orm(unique)]
    pub code: String,

    pub name: String,

    pub description: Option<String>,

    /// Model parameters (e.g. the decay rate for TIME_DECAY)
    #[sea_orm(column_type = "JsonBinary")]
    pub params: Option<JsonValue>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
