//! Customer entity model
//!
//! This module contains the SeaORM entity model for the customers table. A customer is an
//! opaque unified identity; everything that describes it lives in `customer_identifiers`.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

/// Customer entity representing a resolved identity within one tenant
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "customers")]
pub struct Model {
    /// Unique identifier for the customer (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Tenant identifier for multi-tenancy
    pub tenant_id: Uuid,

    /// Timestamp when the customer was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the customer was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::customer_identifier::Entity")]
    Identifiers,
}

impl Related<super::customer_identifier::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Identifiers.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
