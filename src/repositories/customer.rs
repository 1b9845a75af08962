//! # Customer Repository
//!
//! Storage operations behind identity resolution. Write helpers are generic over
//! [`ConnectionTrait`] so the identity store can run them inside its transaction.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, sea_query::OnConflict,
};
use uuid::Uuid;

use crate::error::EngineResult;
use crate::models::{Customer, CustomerIdentifier, customer, customer_identifier};

/// Repository for customers and their identifiers
#[derive(Debug, Clone)]
pub struct CustomerRepository {
    db: DatabaseConnection,
}

impl CustomerRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Find a customer by ID, ensuring it belongs to the specified tenant
    pub async fn find_by_tenant(
        &self,
        tenant_id: Uuid,
        customer_id: Uuid,
    ) -> EngineResult<Option<customer::Model>> {
        Ok(Customer::find_by_id(customer_id)
            .filter(customer::Column::TenantId.eq(tenant_id))
            .one(&self.db)
            .await?)
    }

    /// Identifiers for a customer, primary first then oldest first.
    pub async fn identifiers_for(
        &self,
        customer_id: Uuid,
    ) -> EngineResult<Vec<customer_identifier::Model>> {
        Ok(CustomerIdentifier::find()
            .filter(customer_identifier::Column::CustomerId.eq(customer_id))
            .order_by_desc(customer_identifier::Column::IsPrimary)
            .order_by_asc(customer_identifier::Column::CreatedAt)
            .order_by_asc(customer_identifier::Column::Id)
            .all(&self.db)
            .await?)
    }

    pub async fn find_identifier<C: ConnectionTrait>(
        conn: &C,
        tenant_id: Uuid,
        identifier_type: &str,
        value: &str,
    ) -> EngineResult<Option<customer_identifier::Model>> {
        Ok(CustomerIdentifier::find()
            .filter(customer_identifier::Column::TenantId.eq(tenant_id))
            .filter(customer_identifier::Column::IdentifierType.eq(identifier_type))
            .filter(customer_identifier::Column::Value.eq(value))
            .one(conn)
            .await?)
    }

    pub async fn find_customer<C: ConnectionTrait>(
        conn: &C,
        customer_id: Uuid,
    ) -> EngineResult<Option<customer::Model>> {
        Ok(Customer::find_by_id(customer_id).one(conn).await?)
    }

    pub async fn insert_customer<C: ConnectionTrait>(
        conn: &C,
        tenant_id: Uuid,
    ) -> EngineResult<customer::Model> {
        let now = Utc::now().fixed_offset();
        let customer = customer::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(tenant_id),
            created_at: Set(now),
            updated_at: Set(now),
        };
        Ok(customer.insert(conn).await?)
    }

    /// Inserts the identifier unless `(tenant_id, type, value)` is already taken.
    ///
    /// Returns `false` when another customer already owns the identifier.
    pub async fn insert_identifier_if_absent<C: ConnectionTrait>(
        conn: &C,
        tenant_id: Uuid,
        customer_id: Uuid,
        identifier_type: &str,
        value: &str,
        source_system: Option<&str>,
        is_primary: bool,
    ) -> EngineResult<bool> {
        let identifier = customer_identifier::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(tenant_id),
            customer_id: Set(customer_id),
            identifier_type: Set(identifier_type.to_string()),
            value: Set(value.to_string()),
            source_system: Set(source_system.map(str::to_string)),
            is_primary: Set(is_primary),
            created_at: Set(Utc::now().fixed_offset()),
        };

        let inserted = CustomerIdentifier::insert(identifier)
            .on_conflict(
                OnConflict::columns([
                    customer_identifier::Column::TenantId,
                    customer_identifier::Column::IdentifierType,
                    customer_identifier::Column::Value,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(conn)
            .await?;

        Ok(inserted > 0)
    }
}
