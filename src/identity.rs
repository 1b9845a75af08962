//! # Identity Store
//!
//! Resolves raw customer identifiers (phone, email, external ids) reported by different
//! channels to a single durable customer per tenant.
//!
//! There is no coordinator: the `(tenant_id, type, value)` unique constraint decides which
//! writer owns an identifier, and a losing writer rolls back and re-reads the winner.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sea_orm::{DatabaseConnection, TransactionTrait};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AttributionError, EngineResult};
use crate::models::customer;
use crate::repositories::{
    ConversionRepository, CustomerRepository, InteractionRepository, ReferenceDataRepository,
};

/// Attempts made before an identifier race is reported as a conflict.
pub const MAX_RESOLVE_ATTEMPTS: usize = 3;

/// A raw identifier as reported by an ingestion payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct IdentifierInput {
    /// Identifier kind, e.g. `phone`, `email`, `external_id`
    #[serde(rename = "type")]
    pub identifier_type: String,
    pub value: String,
    /// System that reported the identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_system: Option<String>,
    #[serde(default)]
    pub is_primary: bool,
}

impl IdentifierInput {
    pub fn new(identifier_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            identifier_type: identifier_type.into(),
            value: value.into(),
            source_system: None,
            is_primary: false,
        }
    }
}

/// Canonical `(type, value)` form used for lookups and inserts.
pub fn normalize_identifier(identifier_type: &str, value: &str) -> (String, String) {
    let identifier_type = identifier_type.trim().to_lowercase();
    let value = value.trim();

    let value = match identifier_type.as_str() {
        "email" => value.to_lowercase(),
        "phone" => {
            let digits: String = value.chars().filter(char::is_ascii_digit).collect();
            if value.starts_with('+') {
                format!("+{digits}")
            } else {
                digits
            }
        }
        _ => value.to_string(),
    };

    (identifier_type, value)
}

/// Validates, normalizes, and collapses duplicates while keeping request order.
///
/// When no identifier is flagged primary the first one becomes primary.
pub fn prepare_identifiers(identifiers: &[IdentifierInput]) -> EngineResult<Vec<IdentifierInput>> {
    if identifiers.is_empty() {
        return Err(AttributionError::invalid(
            "at least one customer identifier is required",
        ));
    }

    let mut prepared: Vec<IdentifierInput> = Vec::with_capacity(identifiers.len());
    let mut positions: HashMap<(String, String), usize> = HashMap::new();

    for (index, raw) in identifiers.iter().enumerate() {
        let (identifier_type, value) = normalize_identifier(&raw.identifier_type, &raw.value);
        if identifier_type.is_empty() {
            return Err(AttributionError::invalid(format!(
                "customer_identifiers[{index}].type must not be blank"
            )));
        }
        if value.is_empty() || (identifier_type == "phone" && value.trim_start_matches('+').is_empty())
        {
            return Err(AttributionError::invalid(format!(
                "customer_identifiers[{index}].value must not be blank"
            )));
        }

        let key = (identifier_type.clone(), value.clone());
        if let Some(&existing) = positions.get(&key) {
            let entry = &mut prepared[existing];
            entry.is_primary |= raw.is_primary;
            if entry.source_system.is_none() {
                entry.source_system = raw.source_system.clone();
            }
            continue;
        }

        positions.insert(key, prepared.len());
        prepared.push(IdentifierInput {
            identifier_type,
            value,
            source_system: raw
                .source_system
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            is_primary: raw.is_primary,
        });
    }

    if !prepared.iter().any(|identifier| identifier.is_primary)
        && let Some(first) = prepared.first_mut()
    {
        first.is_primary = true;
    }

    Ok(prepared)
}

/// Identifier as returned by the journey view.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IdentifierView {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub identifier_type: String,
    pub value: String,
    pub source_system: Option<String>,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JourneyParticipant {
    pub participant_type: String,
    pub agent_id: Option<Uuid>,
    pub role: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JourneyInteraction {
    pub id: Uuid,
    pub external_interaction_id: String,
    pub channel_id: Uuid,
    pub channel_name: String,
    pub vendor_id: Option<Uuid>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i32>,
    pub direction: Option<String>,
    pub primary_intent: Option<String>,
    pub outcome_prediction: Option<String>,
    pub purchase_probability: Option<f64>,
    pub participants: Vec<JourneyParticipant>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JourneyConversion {
    pub id: Uuid,
    pub external_event_id: String,
    pub event_type: String,
    pub event_source: String,
    pub currency: String,
    pub amount_decimal: f64,
    pub product_id: Option<Uuid>,
    pub occurred_at: DateTime<Utc>,
}

/// Everything known about one customer, ordered by time.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CustomerJourney {
    pub customer_id: Uuid,
    pub identifiers: Vec<IdentifierView>,
    pub interactions: Vec<JourneyInteraction>,
    pub conversions: Vec<JourneyConversion>,
}

/// Identity resolution and the customer read model
#[derive(Clone)]
pub struct IdentityStore {
    db: DatabaseConnection,
    customers: CustomerRepository,
    references: ReferenceDataRepository,
    interactions: InteractionRepository,
    conversions: ConversionRepository,
}

impl IdentityStore {
    pub fn new(db: DatabaseConnection, references: ReferenceDataRepository) -> Self {
        Self {
            customers: CustomerRepository::new(db.clone()),
            interactions: InteractionRepository::new(db.clone()),
            conversions: ConversionRepository::new(db.clone()),
            references,
            db,
        }
    }

    /// Returns the customer owning the first matching identifier, creating one with all
    /// supplied identifiers when none match.
    ///
    /// Identifiers are only written for a newly created customer. A match, including the
    /// winner re-read after losing a concurrent creation, is returned as is and the other
    /// supplied identifiers are not attached to it; there is no merge.
    #[instrument(skip(self, identifiers), fields(tenant_id = %tenant_id, identifiers = identifiers.len()))]
    pub async fn resolve(
        &self,
        tenant_id: Uuid,
        identifiers: &[IdentifierInput],
    ) -> EngineResult<customer::Model> {
        let identifiers = prepare_identifiers(identifiers)?;

        for attempt in 1..=MAX_RESOLVE_ATTEMPTS {
            if let Some(existing) = self.lookup(tenant_id, &identifiers).await? {
                return Ok(existing);
            }

            let txn = self
                .db
                .begin()
                .await
                .map_err(AttributionError::transaction("begin customer creation"))?;

            let customer = CustomerRepository::insert_customer(&txn, tenant_id).await?;
            let mut lost_race = false;
            for identifier in &identifiers {
                let inserted = CustomerRepository::insert_identifier_if_absent(
                    &txn,
                    tenant_id,
                    customer.id,
                    &identifier.identifier_type,
                    &identifier.value,
                    identifier.source_system.as_deref(),
                    identifier.is_primary,
                )
                .await?;
                if !inserted {
                    lost_race = true;
                    break;
                }
            }

            if lost_race {
                txn.rollback()
                    .await
                    .map_err(AttributionError::transaction("roll back customer creation"))?;
                tracing::debug!(attempt, "Identifier claimed concurrently; re-reading winner");
                continue;
            }

            txn.commit()
                .await
                .map_err(AttributionError::transaction("commit customer creation"))?;

            metrics::counter!("attribution_customers_created_total").increment(1);
            tracing::info!(customer_id = %customer.id, "Created customer");
            return Ok(customer);
        }

        tracing::warn!(
            attempts = MAX_RESOLVE_ATTEMPTS,
            "Identity resolution kept losing identifier races"
        );
        Err(AttributionError::Conflict(
            "customer identity could not be resolved after concurrent updates".to_string(),
        ))
    }

    async fn lookup(
        &self,
        tenant_id: Uuid,
        identifiers: &[IdentifierInput],
    ) -> EngineResult<Option<customer::Model>> {
        for identifier in identifiers {
            let found = CustomerRepository::find_identifier(
                &self.db,
                tenant_id,
                &identifier.identifier_type,
                &identifier.value,
            )
            .await?;

            if let Some(found) = found {
                let customer = CustomerRepository::find_customer(&self.db, found.customer_id)
                    .await?
                    .ok_or_else(|| {
                        AttributionError::Internal(format!(
                            "identifier {} references missing customer {}",
                            found.id, found.customer_id
                        ))
                    })?;
                return Ok(Some(customer));
            }
        }
        Ok(None)
    }

    /// Identifiers, interactions, and conversions of one customer within `[from, to]`.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, customer_id = %customer_id))]
    pub async fn customer_journey(
        &self,
        tenant_id: Uuid,
        customer_id: Uuid,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> EngineResult<CustomerJourney> {
        if let (Some(from), Some(to)) = (from, to)
            && from > to
        {
            return Err(AttributionError::invalid("'from' must not be after 'to'"));
        }

        let customer = self
            .customers
            .find_by_tenant(tenant_id, customer_id)
            .await?
            .ok_or_else(|| AttributionError::not_found("customer", customer_id))?;

        let identifiers = self
            .customers
            .identifiers_for(customer.id)
            .await?
            .into_iter()
            .map(|row| IdentifierView {
                id: row.id,
                identifier_type: row.identifier_type,
                value: row.value,
                source_system: row.source_system,
                is_primary: row.is_primary,
                created_at: row.created_at.with_timezone(&Utc),
            })
            .collect();

        let interactions = self
            .interactions
            .list_for_customer(tenant_id, customer.id, from, to, &[])
            .await?;
        let interaction_ids: Vec<Uuid> = interactions.iter().map(|row| row.id).collect();
        let mut participants: HashMap<Uuid, Vec<JourneyParticipant>> = HashMap::new();
        for participant in self.interactions.participants_for(&interaction_ids).await? {
            participants
                .entry(participant.interaction_id)
                .or_default()
                .push(JourneyParticipant {
                    participant_type: participant.participant_type,
                    agent_id: participant.agent_id,
                    role: participant.role,
                });
        }

        let channel_ids: Vec<Uuid> = interactions.iter().map(|row| row.channel_id).collect();
        let channels = self.references.channels_by_ids(&channel_ids).await?;

        let interactions = interactions
            .into_iter()
            .map(|row| JourneyInteraction {
                channel_name: channels
                    .get(&row.channel_id)
                    .map(|channel| channel.name.clone())
                    .unwrap_or_default(),
                participants: participants.remove(&row.id).unwrap_or_default(),
                id: row.id,
                external_interaction_id: row.external_interaction_id,
                channel_id: row.channel_id,
                vendor_id: row.vendor_id,
                started_at: row.started_at.with_timezone(&Utc),
                ended_at: row.ended_at.map(|at| at.with_timezone(&Utc)),
                duration_seconds: row.duration_seconds,
                direction: row.direction,
                primary_intent: row.primary_intent,
                outcome_prediction: row.outcome_prediction,
                purchase_probability: row.purchase_probability,
            })
            .collect();

        let conversions = self
            .conversions
            .list_for_customer(tenant_id, customer.id, from, to)
            .await?;
        let source_ids: Vec<Uuid> = conversions.iter().map(|row| row.event_source_id).collect();
        let currency_ids: Vec<Uuid> = conversions.iter().map(|row| row.currency_id).collect();
        let sources = self.references.event_sources_by_ids(&source_ids).await?;
        let currencies = self.references.currencies_by_ids(&currency_ids).await?;

        let conversions = conversions
            .into_iter()
            .map(|row| JourneyConversion {
                event_source: sources
                    .get(&row.event_source_id)
                    .map(|source| source.name.clone())
                    .unwrap_or_default(),
                currency: currencies
                    .get(&row.currency_id)
                    .map(|currency| currency.code.clone())
                    .unwrap_or_default(),
                id: row.id,
                external_event_id: row.external_event_id,
                event_type: row.event_type,
                amount_decimal: row.amount_decimal,
                product_id: row.product_id,
                occurred_at: row.occurred_at.with_timezone(&Utc),
            })
            .collect();

        Ok(CustomerJourney {
            customer_id: customer.id,
            identifiers,
            interactions,
            conversions,
        })
    }
}
