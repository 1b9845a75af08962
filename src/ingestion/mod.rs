//! # Event Ingestion
//!
//! Normalizes interaction and conversion payloads, resolves the customer through the
//! [`IdentityStore`], and persists each event with its children in one transaction.
//! Reference lookups and duplicate checks happen before identity resolution so a payload
//! naming an unknown channel, source, or currency, or repeating an external id, never
//! creates a customer. Identity resolution commits on its own: a customer resolved for an
//! event whose insert later fails stays in place, carrying the identifiers that were seen.

pub mod call_events;
pub mod requests;

use chrono::{DateTime, Utc};
use sea_orm::{DatabaseConnection, Set, TransactionTrait};
use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

use crate::error::{AttributionError, EngineResult};
use crate::identity::IdentityStore;
use crate::models::{conversion_event, interaction, interaction_participant};
use crate::repositories::{ConversionRepository, InteractionRepository, ReferenceDataRepository};

pub use call_events::{CallEvent, CallEventKind, CallEventResponse};
pub use requests::{
    IngestConversionRequest, IngestConversionResponse, IngestInteractionRequest,
    IngestInteractionResponse, InteractionView, ParticipantRequest, UpdateInteractionRequest,
};

/// Writes interactions and conversions for a tenant
#[derive(Clone)]
pub struct IngestionService {
    db: DatabaseConnection,
    identity: IdentityStore,
    references: ReferenceDataRepository,
    interactions: InteractionRepository,
    conversions: ConversionRepository,
}

impl IngestionService {
    pub fn new(
        db: DatabaseConnection,
        identity: IdentityStore,
        references: ReferenceDataRepository,
    ) -> Self {
        Self {
            interactions: InteractionRepository::new(db.clone()),
            conversions: ConversionRepository::new(db.clone()),
            db,
            identity,
            references,
        }
    }

    #[instrument(
        skip(self, request),
        fields(tenant_id = %tenant_id, external_interaction_id = %request.external_interaction_id)
    )]
    pub async fn ingest_interaction(
        &self,
        tenant_id: Uuid,
        request: IngestInteractionRequest,
    ) -> EngineResult<IngestInteractionResponse> {
        let external_id = request.external_interaction_id.trim().to_string();
        if external_id.is_empty() {
            return Err(AttributionError::invalid(
                "external_interaction_id must not be blank",
            ));
        }
        validate_probability(request.purchase_probability)?;
        let duration_seconds = duration_between(request.started_at, request.ended_at)?;

        let channel = self.references.require_channel(&request.channel).await?;
        let vendor_id = match non_blank(request.vendor_code.as_deref()) {
            Some(code) => self
                .references
                .vendor_by_code(tenant_id, code)
                .await?
                .map(|vendor| vendor.id),
            None => None,
        };

        if self
            .interactions
            .find_by_external_id(tenant_id, &external_id)
            .await?
            .is_some()
        {
            return Err(AttributionError::Conflict(format!(
                "interaction '{external_id}' already exists"
            )));
        }

        let customer_id = if request.customer_identifiers.is_empty() {
            None
        } else {
            Some(
                self.identity
                    .resolve(tenant_id, &request.customer_identifiers)
                    .await?
                    .id,
            )
        };

        let now = Utc::now().fixed_offset();
        let interaction_id = Uuid::new_v4();

        let mut participants = Vec::with_capacity(request.participants.len());
        for participant in &request.participants {
            let participant_type = participant.participant_type.trim().to_lowercase();
            if participant_type.is_empty() {
                return Err(AttributionError::invalid(
                    "participant_type must not be blank",
                ));
            }
            let agent_id = match non_blank(participant.external_agent_id.as_deref()) {
                Some(external_agent_id) => self
                    .references
                    .agent_by_external_id(tenant_id, external_agent_id)
                    .await?
                    .map(|agent| agent.id),
                None => None,
            };
            participants.push(interaction_participant::ActiveModel {
                id: Set(Uuid::new_v4()),
                interaction_id: Set(interaction_id),
                participant_type: Set(participant_type),
                agent_id: Set(agent_id),
                role: Set(participant.role.clone()),
                metadata: Set(participant.metadata.clone()),
                created_at: Set(now),
            });
        }

        let model = interaction::ActiveModel {
            id: Set(interaction_id),
            tenant_id: Set(tenant_id),
            customer_id: Set(customer_id),
            external_interaction_id: Set(external_id),
            channel_id: Set(channel.id),
            vendor_id: Set(vendor_id),
            started_at: Set(request.started_at.fixed_offset()),
            ended_at: Set(request.ended_at.map(|at| at.fixed_offset())),
            duration_seconds: Set(duration_seconds),
            direction: Set(request.direction),
            language: Set(request.language),
            transcript_location: Set(request.transcript_url),
            primary_intent: Set(request.primary_intent),
            secondary_intents: Set(secondary_intents_json(&request.secondary_intents)),
            outcome_prediction: Set(request.outcome_prediction),
            purchase_probability: Set(request.purchase_probability),
            raw_metadata: Set(request.raw_metadata),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let txn = self
            .db
            .begin()
            .await
            .map_err(AttributionError::transaction("begin interaction ingest"))?;
        let created =
            InteractionRepository::insert_with_participants(&txn, model, participants).await?;
        txn.commit()
            .await
            .map_err(AttributionError::transaction("commit interaction ingest"))?;

        metrics::counter!(
            "attribution_interactions_ingested_total",
            "channel" => channel.name.clone()
        )
        .increment(1);
        tracing::info!(interaction_id = %created.id, channel = %channel.name, "Interaction ingested");

        Ok(IngestInteractionResponse {
            interaction_id: created.id,
            customer_id,
        })
    }

    /// Applies lifecycle updates to an interaction identified by its external id.
    #[instrument(skip(self, update), fields(tenant_id = %tenant_id, external_interaction_id = %external_interaction_id))]
    pub async fn update_interaction(
        &self,
        tenant_id: Uuid,
        external_interaction_id: &str,
        update: UpdateInteractionRequest,
    ) -> EngineResult<interaction::Model> {
        validate_probability(update.purchase_probability)?;

        let existing = self
            .interactions
            .find_by_external_id(tenant_id, external_interaction_id.trim())
            .await?
            .ok_or_else(|| AttributionError::not_found("interaction", external_interaction_id))?;

        if update.is_empty() {
            return Ok(existing);
        }

        let started_at = existing.started_at.with_timezone(&Utc);
        let mut active: interaction::ActiveModel = existing.into();

        if let Some(ended_at) = update.ended_at {
            active.duration_seconds = Set(duration_between(started_at, Some(ended_at))?);
            active.ended_at = Set(Some(ended_at.fixed_offset()));
        }
        if let Some(transcript) = update.transcript_url {
            active.transcript_location = Set(Some(transcript));
        }
        if let Some(intent) = update.primary_intent {
            active.primary_intent = Set(Some(intent));
        }
        if let Some(intents) = update.secondary_intents {
            active.secondary_intents = Set(secondary_intents_json(&intents));
        }
        if let Some(probability) = update.purchase_probability {
            active.purchase_probability = Set(Some(probability));
        }
        if let Some(outcome) = update.outcome_prediction {
            active.outcome_prediction = Set(Some(outcome));
        }
        active.updated_at = Set(Utc::now().fixed_offset());

        let updated = self.interactions.update(active).await?;
        tracing::info!(interaction_id = %updated.id, "Interaction updated");
        Ok(updated)
    }

    #[instrument(
        skip(self, request),
        fields(tenant_id = %tenant_id, external_event_id = %request.external_event_id)
    )]
    pub async fn ingest_conversion(
        &self,
        tenant_id: Uuid,
        request: IngestConversionRequest,
    ) -> EngineResult<IngestConversionResponse> {
        if request.customer_identifiers.is_empty() {
            return Err(AttributionError::invalid(
                "at least one customer identifier is required",
            ));
        }
        let external_event_id = request.external_event_id.trim().to_string();
        if external_event_id.is_empty() {
            return Err(AttributionError::invalid("external_event_id must not be blank"));
        }
        let event_type = request.event_type.trim().to_string();
        if event_type.is_empty() {
            return Err(AttributionError::invalid("event_type must not be blank"));
        }
        if !request.amount_decimal.is_finite() || request.amount_decimal < 0.0 {
            return Err(AttributionError::invalid(
                "amount_decimal must be a finite, non-negative number",
            ));
        }

        let event_source = self
            .references
            .require_event_source(&request.event_source)
            .await?;
        let currency = self.references.require_currency(&request.currency).await?;
        let product_id = match non_blank(request.product_external_id.as_deref()) {
            Some(external_product_id) => self
                .references
                .product_by_external_id(tenant_id, external_product_id)
                .await?
                .map(|product| product.id),
            None => None,
        };

        if self
            .conversions
            .find_by_external_id(tenant_id, event_source.id, &external_event_id)
            .await?
            .is_some()
        {
            return Err(AttributionError::Conflict(format!(
                "conversion '{external_event_id}' already exists"
            )));
        }

        let customer = self
            .identity
            .resolve(tenant_id, &request.customer_identifiers)
            .await?;

        let model = conversion_event::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(tenant_id),
            customer_id: Set(customer.id),
            event_source_id: Set(event_source.id),
            external_event_id: Set(external_event_id),
            event_type: Set(event_type.clone()),
            product_id: Set(product_id),
            currency_id: Set(currency.id),
            amount_decimal: Set(request.amount_decimal),
            occurred_at: Set(request.occurred_at.fixed_offset()),
            raw_payload: Set(request.raw_payload),
            created_at: Set(Utc::now().fixed_offset()),
        };

        let txn = self
            .db
            .begin()
            .await
            .map_err(AttributionError::transaction("begin conversion ingest"))?;
        let created = ConversionRepository::insert(&txn, model).await?;
        txn.commit()
            .await
            .map_err(AttributionError::transaction("commit conversion ingest"))?;

        metrics::counter!(
            "attribution_conversions_ingested_total",
            "event_type" => event_type
        )
        .increment(1);
        tracing::info!(conversion_event_id = %created.id, customer_id = %customer.id, "Conversion ingested");

        Ok(IngestConversionResponse {
            conversion_event_id: created.id,
            customer_id: customer.id,
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn validate_probability(probability: Option<f64>) -> EngineResult<()> {
    match probability {
        Some(p) if !(0.0..=1.0).contains(&p) => Err(AttributionError::invalid(
            "purchase_probability must be between 0 and 1",
        )),
        _ => Ok(()),
    }
}

/// Whole seconds between start and end; an end before the start is rejected.
fn duration_between(
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
) -> EngineResult<Option<i32>> {
    let Some(ended_at) = ended_at else {
        return Ok(None);
    };
    if ended_at < started_at {
        return Err(AttributionError::invalid("ended_at must not be before started_at"));
    }
    let seconds = (ended_at - started_at).num_seconds();
    Ok(Some(i32::try_from(seconds).unwrap_or(i32::MAX)))
}

fn secondary_intents_json(intents: &[String]) -> Option<serde_json::Value> {
    if intents.is_empty() {
        None
    } else {
        Some(json!({ "intents": intents }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn duration_is_whole_seconds() {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
        let end = start + chrono::Duration::milliseconds(90_900);
        assert_eq!(duration_between(start, Some(end)).unwrap(), Some(90));
        assert_eq!(duration_between(start, None).unwrap(), None);
    }

    #[test]
    fn end_before_start_is_rejected() {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
        let end = start - chrono::Duration::seconds(1);
        assert!(matches!(
            duration_between(start, Some(end)),
            Err(AttributionError::InvalidInput(_))
        ));
    }

    #[test]
    fn probability_must_be_a_fraction() {
        assert!(validate_probability(None).is_ok());
        assert!(validate_probability(Some(0.0)).is_ok());
        assert!(validate_probability(Some(1.0)).is_ok());
        assert!(validate_probability(Some(1.01)).is_err());
        assert!(validate_probability(Some(-0.1)).is_err());
        assert!(validate_probability(Some(f64::NAN)).is_err());
    }

    #[test]
    fn secondary_intents_are_wrapped() {
        assert_eq!(secondary_intents_json(&[]), None);
        assert_eq!(
            secondary_intents_json(&["pricing".to_string()]),
            Some(json!({ "intents": ["pricing"] }))
        );
    }
}
