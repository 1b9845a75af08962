//! Request and response payloads for interaction and conversion ingestion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::identity::IdentifierInput;
use crate::models::interaction;

/// A participant of an interaction (agent, customer, bot).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ParticipantRequest {
    /// `agent`, `customer`, or `bot`
    pub participant_type: String,
    /// Agent id in the originating platform; resolved per tenant
    #[serde(default)]
    pub external_agent_id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<JsonValue>,
}

/// Body of `POST /api/v1/interactions`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IngestInteractionRequest {
    pub external_interaction_id: String,
    /// Channel name, e.g. `call`, `chat`, `ad_click`
    pub channel: String,
    #[serde(default)]
    pub vendor_code: Option<String>,
    #[serde(default)]
    pub customer_identifiers: Vec<IdentifierInput>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub participants: Vec<ParticipantRequest>,
    #[serde(default)]
    pub transcript_url: Option<String>,
    #[serde(default)]
    pub primary_intent: Option<String>,
    #[serde(default)]
    pub secondary_intents: Vec<String>,
    #[serde(default)]
    pub outcome_prediction: Option<String>,
    /// Probability in `[0, 1]` that the interaction leads to a purchase
    #[serde(default)]
    pub purchase_probability: Option<f64>,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub raw_metadata: Option<JsonValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IngestInteractionResponse {
    pub interaction_id: Uuid,
    pub customer_id: Option<Uuid>,
}

/// Body of `PATCH /api/v1/interactions/{external_interaction_id}`. Absent fields are left
/// untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateInteractionRequest {
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub transcript_url: Option<String>,
    #[serde(default)]
    pub primary_intent: Option<String>,
    #[serde(default)]
    pub secondary_intents: Option<Vec<String>>,
    #[serde(default)]
    pub purchase_probability: Option<f64>,
    #[serde(default)]
    pub outcome_prediction: Option<String>,
}

impl UpdateInteractionRequest {
    pub fn is_empty(&self) -> bool {
        self.ended_at.is_none()
            && self.transcript_url.is_none()
            && self.primary_intent.is_none()
            && self.secondary_intents.is_none()
            && self.purchase_probability.is_none()
            && self.outcome_prediction.is_none()
    }
}

/// Body of `POST /api/v1/conversions`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IngestConversionRequest {
    /// Event source name, e.g. `crm`, `billing`
    pub event_source: String,
    pub external_event_id: String,
    pub customer_identifiers: Vec<IdentifierInput>,
    /// `purchase`, `renewal`, `upgrade`, ...
    pub event_type: String,
    #[serde(default)]
    pub product_external_id: Option<String>,
    /// ISO-4217 currency code
    pub currency: String,
    pub amount_decimal: f64,
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub raw_payload: Option<JsonValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IngestConversionResponse {
    pub conversion_event_id: Uuid,
    pub customer_id: Uuid,
}

/// Interaction as returned after an update.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InteractionView {
    pub id: Uuid,
    pub external_interaction_id: String,
    pub customer_id: Option<Uuid>,
    pub channel_id: Uuid,
    pub vendor_id: Option<Uuid>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i32>,
    pub direction: Option<String>,
    pub language: Option<String>,
    pub transcript_location: Option<String>,
    pub primary_intent: Option<String>,
    pub secondary_intents: Vec<String>,
    pub outcome_prediction: Option<String>,
    pub purchase_probability: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

impl From<interaction::Model> for InteractionView {
    fn from(model: interaction::Model) -> Self {
        Self {
            secondary_intents: model
                .secondary_intents
                .as_ref()
                .and_then(|value| value.get("intents"))
                .and_then(JsonValue::as_array)
                .map(|intents| {
                    intents
                        .iter()
                        .filter_map(|intent| intent.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default(),
            id: model.id,
            external_interaction_id: model.external_interaction_id,
            customer_id: model.customer_id,
            channel_id: model.channel_id,
            vendor_id: model.vendor_id,
            started_at: model.started_at.with_timezone(&Utc),
            ended_at: model.ended_at.map(|at| at.with_timezone(&Utc)),
            duration_seconds: model.duration_seconds,
            direction: model.direction,
            language: model.language,
            transcript_location: model.transcript_location,
            primary_intent: model.primary_intent,
            outcome_prediction: model.outcome_prediction,
            purchase_probability: model.purchase_probability,
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}
