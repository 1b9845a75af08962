//! ConversionEvent entity model
//!
//! Monetizable outcomes (purchase, renewal, ...) attributed by runs. Rows are immutable
//! once created and always belong to a resolved customer.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "conversion_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub tenant_id: Uuid,

    pub customer_id: Uuid,

    pub event_source_id: Uuid,

    /// Identifier assigned by the source system
    pub external_event_id: String,

    /// purchase / renewal / upgrade ...
    pub event_type: String,

    pub product_id: Option<Uuid>,

    pub currency_id: Uuid,

    #[sea_orm(column_type = "Double")]
    pub amount_decimal: f64,

    pub occurred_at: DateTimeWithTimeZone,

    #[sea_orm(column_type = "JsonBinary")]
    pub raw_payload: Option<JsonValue>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
