//! Interaction entity model
//!
//! This module contains the SeaORM entity model for the interactions table: calls, chats
//! and other customer-facing touchpoints. Rows are created by ingestion and later updated
//! by lifecycle events keyed by `(tenant_id, external_interaction_id)`.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;

/// Interaction entity representing one customer touchpoint
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "interactions")]
pub struct Model {
    /// Unique identifier for the interaction (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Tenant identifier for multi-tenancy
    pub tenant_id: Uuid,

    /// Resolved customer; null until identifiers are known
    pub customer_id: Option<Uuid>,

    /// Identifier assigned by the originating platform, unique per tenant
    pub external_interaction_id: String,

    /// Channel the interaction happened on
    pub channel_id: Uuid,

    /// Vendor handling the interaction, when the vendor code resolved
    pub vendor_id: Option<Uuid>,

    /// Timestamp when the interaction started
    pub started_at: DateTimeWithTimeZone,

    /// Timestamp when the interaction ended
    pub ended_at: Option<DateTimeWithTimeZone>,

    /// Derived from `ended_at - started_at`
    pub duration_seconds: Option<i32>,

    /// inbound / outbound
    pub direction: Option<String>,

    pub language: Option<String>,

    /// Location of the transcript (URL or object key)
    pub transcript_location: Option<String>,

    pub primary_intent: Option<String>,

    #[sea_orm(column_type = "JsonBinary")]
    pub secondary_intents: Option<JsonValue>,

    pub outcome_prediction: Option<String>,

    #[sea_orm(column_type = "Double")]
    pub purchase_probability: Option<f64>,

    /// Raw payload metadata from the originating platform
    #[sea_orm(column_type = "JsonBinary")]
    pub raw_metadata: Option<JsonValue>,

    /// Timestamp when the interaction was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the interaction was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::interaction_participant::Entity")]
    Participants,
}

impl Related<super::interaction_participant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Participants.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
