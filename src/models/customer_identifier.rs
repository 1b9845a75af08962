//! CustomerIdentifier entity model
//!
//! Raw identifiers (phone, email, external ids) attached to a customer. Within a tenant a
//! `(type, value)` pair belongs to at most one customer; the storage layer enforces this
//! with a unique index on `(tenant_id, type, value)`.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "customer_identifiers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Denormalized tenant id backing the uniqueness constraint
    pub tenant_id: Uuid,

    pub customer_id: Uuid,

    /// Identifier kind: phone, email, external_id, ...
    #[sea_orm(column_name = "type")]
    pub identifier_type: String,

    /// Normalized identifier value
    pub value: String,

    /// System that reported the identifier
    pub source_system: Option<String>,

    pub is_primary: bool,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::customer::Entity",
        from = "Column::CustomerId",
        to = "super::customer::Column::Id"
    )]
    Customer,
}

impl Related<super::customer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Customer.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
