//! # Conversion Repository

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder,
};
use uuid::Uuid;

use crate::error::EngineResult;
use crate::models::{ConversionEvent, conversion_event};

/// Repository for conversion event database operations
#[derive(Debug, Clone)]
pub struct ConversionRepository {
    db: DatabaseConnection,
}

impl ConversionRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn insert<C: ConnectionTrait>(
        conn: &C,
        conversion: conversion_event::ActiveModel,
    ) -> EngineResult<conversion_event::Model> {
        Ok(conversion.insert(conn).await?)
    }

    /// Looks up a conversion by its upstream id within one event source.
    pub async fn find_by_external_id(
        &self,
        tenant_id: Uuid,
        event_source_id: Uuid,
        external_event_id: &str,
    ) -> EngineResult<Option<conversion_event::Model>> {
        Ok(ConversionEvent::find()
            .filter(conversion_event::Column::TenantId.eq(tenant_id))
            .filter(conversion_event::Column::EventSourceId.eq(event_source_id))
            .filter(conversion_event::Column::ExternalEventId.eq(external_event_id))
            .one(&self.db)
            .await?)
    }

    /// Conversions a run should attribute, ordered by `(occurred_at, id)`.
    pub async fn list_eligible(
        &self,
        tenant_id: Uuid,
        event_types: &[String],
        min_purchase_amount: f64,
    ) -> EngineResult<Vec<conversion_event::Model>> {
        let mut query = ConversionEvent::find()
            .filter(conversion_event::Column::TenantId.eq(tenant_id))
            .filter(conversion_event::Column::AmountDecimal.gte(min_purchase_amount));

        if !event_types.is_empty() {
            query = query.filter(conversion_event::Column::EventType.is_in(event_types.to_vec()));
        }

        Ok(query
            .order_by_asc(conversion_event::Column::OccurredAt)
            .order_by_asc(conversion_event::Column::Id)
            .all(&self.db)
            .await?)
    }

    /// A customer's conversions with `from <= occurred_at <= to`, oldest first.
    pub async fn list_for_customer(
        &self,
        tenant_id: Uuid,
        customer_id: Uuid,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> EngineResult<Vec<conversion_event::Model>> {
        let mut query = ConversionEvent::find()
            .filter(conversion_event::Column::TenantId.eq(tenant_id))
            .filter(conversion_event::Column::CustomerId.eq(customer_id));

        if let Some(from) = from {
            query = query.filter(conversion_event::Column::OccurredAt.gte(from.fixed_offset()));
        }
        if let Some(to) = to {
            query = query.filter(conversion_event::Column::OccurredAt.lte(to.fixed_offset()));
        }

        Ok(query
            .order_by_asc(conversion_event::Column::OccurredAt)
            .order_by_asc(conversion_event::Column::Id)
            .all(&self.db)
            .await?)
    }
}
