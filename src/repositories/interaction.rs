//! # Interaction Repository
//!
//! Storage for interactions and their participants. Interactions are keyed per tenant by
//! `external_interaction_id`; journeys read them per customer ordered by `(started_at, id)`.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder,
};
use uuid::Uuid;

use crate::error::EngineResult;
use crate::models::{Interaction, InteractionParticipant, interaction, interaction_participant};

/// Repository for interaction database operations
#[derive(Debug, Clone)]
pub struct InteractionRepository {
    db: DatabaseConnection,
}

impl InteractionRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn find_by_external_id(
        &self,
        tenant_id: Uuid,
        external_interaction_id: &str,
    ) -> EngineResult<Option<interaction::Model>> {
        Ok(Interaction::find()
            .filter(interaction::Column::TenantId.eq(tenant_id))
            .filter(interaction::Column::ExternalInteractionId.eq(external_interaction_id))
            .one(&self.db)
            .await?)
    }

    /// Inserts an interaction and its participants on the caller's connection.
    pub async fn insert_with_participants<C: ConnectionTrait>(
        conn: &C,
        interaction: interaction::ActiveModel,
        participants: Vec<interaction_participant::ActiveModel>,
    ) -> EngineResult<interaction::Model> {
        let created = interaction.insert(conn).await?;
        if !participants.is_empty() {
            InteractionParticipant::insert_many(participants)
                .exec_without_returning(conn)
                .await?;
        }
        Ok(created)
    }

    pub async fn update(&self, changes: interaction::ActiveModel) -> EngineResult<interaction::Model> {
        Ok(changes.update(&self.db).await?)
    }

    /// A customer's interactions with `window_start <= started_at <= window_end`,
    /// ordered by `(started_at, id)`.
    pub async fn list_for_customer(
        &self,
        tenant_id: Uuid,
        customer_id: Uuid,
        window_start: Option<DateTime<Utc>>,
        window_end: Option<DateTime<Utc>>,
        channel_ids: &[Uuid],
    ) -> EngineResult<Vec<interaction::Model>> {
        let mut query = Interaction::find()
            .filter(interaction::Column::TenantId.eq(tenant_id))
            .filter(interaction::Column::CustomerId.eq(customer_id));

        if let Some(start) = window_start {
            query = query.filter(interaction::Column::StartedAt.gte(start.fixed_offset()));
        }
        if let Some(end) = window_end {
            query = query.filter(interaction::Column::StartedAt.lte(end.fixed_offset()));
        }
        if !channel_ids.is_empty() {
            query = query.filter(interaction::Column::ChannelId.is_in(channel_ids.to_vec()));
        }

        Ok(query
            .order_by_asc(interaction::Column::StartedAt)
            .order_by_asc(interaction::Column::Id)
            .all(&self.db)
            .await?)
    }

    /// Participants of the given interactions, ordered by `(created_at, id)`.
    pub async fn participants_for(
        &self,
        interaction_ids: &[Uuid],
    ) -> EngineResult<Vec<interaction_participant::Model>> {
        if interaction_ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(InteractionParticipant::find()
            .filter(interaction_participant::Column::InteractionId.is_in(interaction_ids.to_vec()))
            .order_by_asc(interaction_participant::Column::CreatedAt)
            .order_by_asc(interaction_participant::Column::Id)
            .all(&self.db)
            .await?)
    }
}
