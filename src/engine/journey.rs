//! # Journey Builder
//!
//! A journey is the ordered set of a customer's interactions inside the attribution
//! window of one conversion. Both window ends are inclusive and ties on `started_at` are
//! broken by interaction id, so the order is total and repeatable across executions.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineResult;
use crate::repositories::{InteractionRepository, ReferenceDataRepository};

/// Participant type whose agent receives credit for an interaction.
pub const AGENT_PARTICIPANT: &str = "agent";

/// One interaction of a journey, with the organisational context credit flows to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Touchpoint {
    pub interaction_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub channel_id: Uuid,
    pub agent_id: Option<Uuid>,
    pub team_id: Option<Uuid>,
    pub vendor_id: Option<Uuid>,
    pub purchase_probability: Option<f64>,
}

/// Loads journeys from interaction storage
#[derive(Clone)]
pub struct JourneyBuilder {
    interactions: InteractionRepository,
    references: ReferenceDataRepository,
}

impl JourneyBuilder {
    pub fn new(interactions: InteractionRepository, references: ReferenceDataRepository) -> Self {
        Self {
            interactions,
            references,
        }
    }

    /// Touchpoints with `window_start <= started_at <= window_end`, ascending.
    ///
    /// An empty `channel_ids` slice means every channel.
    pub async fn build_journey(
        &self,
        tenant_id: Uuid,
        customer_id: Uuid,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        channel_ids: &[Uuid],
    ) -> EngineResult<Vec<Touchpoint>> {
        let interactions = self
            .interactions
            .list_for_customer(
                tenant_id,
                customer_id,
                Some(window_start),
                Some(window_end),
                channel_ids,
            )
            .await?;
        if interactions.is_empty() {
            return Ok(Vec::new());
        }

        let interaction_ids: Vec<Uuid> = interactions.iter().map(|row| row.id).collect();
        let participants = self.interactions.participants_for(&interaction_ids).await?;

        // Participants arrive ordered by (created_at, id); the first agent wins.
        let mut credited_agent: HashMap<Uuid, Uuid> = HashMap::new();
        for participant in participants {
            if participant.participant_type != AGENT_PARTICIPANT {
                continue;
            }
            if let Some(agent_id) = participant.agent_id {
                credited_agent
                    .entry(participant.interaction_id)
                    .or_insert(agent_id);
            }
        }

        let agent_ids: Vec<Uuid> = credited_agent.values().copied().collect();
        let agents = self.references.agents_by_ids(tenant_id, &agent_ids).await?;

        let mut touchpoints: Vec<Touchpoint> = interactions
            .into_iter()
            .map(|row| {
                let agent = credited_agent
                    .get(&row.id)
                    .and_then(|agent_id| agents.get(agent_id));
                Touchpoint {
                    interaction_id: row.id,
                    started_at: row.started_at.with_timezone(&Utc),
                    channel_id: row.channel_id,
                    agent_id: agent.map(|agent| agent.id),
                    team_id: agent.and_then(|agent| agent.team_id),
                    vendor_id: agent.and_then(|agent| agent.vendor_id).or(row.vendor_id),
                    purchase_probability: row.purchase_probability,
                }
            })
            .collect();

        touchpoints.sort_by(|a, b| {
            a.started_at
                .cmp(&b.started_at)
                .then_with(|| a.interaction_id.cmp(&b.interaction_id))
        });
        Ok(touchpoints)
    }
}
