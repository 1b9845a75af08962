//! Telephony call events.
//!
//! Call platforms report a call as a sequence of events keyed by `call_id`. The first
//! event creates the interaction; later events update it in place.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{IngestInteractionRequest, IngestionService, UpdateInteractionRequest};
use crate::error::{AttributionError, EngineResult};
use crate::identity::IdentifierInput;

const CALL_CHANNEL: &str = "call";
const DEFAULT_DIRECTION: &str = "inbound";
const DEFAULT_LANGUAGE: &str = "en";

/// Body of `POST /api/v1/webhooks/calls`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CallEvent {
    /// `call.started`, `call.ended`, `call.transcript.updated`, or `call.intent.detected`
    pub event_type: String,
    /// Platform call id; used as the interaction's external id
    pub call_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub data: Map<String, JsonValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallEventKind {
    Started,
    Ended,
    TranscriptUpdated,
    IntentDetected,
}

impl FromStr for CallEventKind {
    type Err = AttributionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "call.started" | "call.start" => Ok(Self::Started),
            "call.ended" | "call.end" => Ok(Self::Ended),
            "call.transcript.updated" => Ok(Self::TranscriptUpdated),
            "call.intent.detected" => Ok(Self::IntentDetected),
            other => Err(AttributionError::invalid(format!(
                "unsupported call event type '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CallEventResponse {
    pub status: String,
    pub interaction_id: Uuid,
    pub customer_id: Option<Uuid>,
}

impl CallEvent {
    fn string(&self, key: &str) -> Option<String> {
        self.data
            .get(key)
            .and_then(JsonValue::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }

    /// An RFC 3339 timestamp from `data`, falling back to the event timestamp.
    fn time(&self, key: &str) -> DateTime<Utc> {
        self.data
            .get(key)
            .and_then(JsonValue::as_str)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|at| at.with_timezone(&Utc))
            .unwrap_or(self.timestamp)
    }

    fn identifiers(&self) -> Vec<IdentifierInput> {
        let mut identifiers = Vec::new();
        if let Some(phone) = self.string("phone_number") {
            identifiers.push(IdentifierInput::new("phone", phone));
        }
        if let Some(email) = self.string("email") {
            identifiers.push(IdentifierInput::new("email", email));
        }
        identifiers
    }

    fn secondary_intents(&self) -> Option<Vec<String>> {
        let intents: Vec<String> = self
            .data
            .get("secondary_intents")?
            .as_array()?
            .iter()
            .filter_map(|intent| intent.as_str().map(str::to_string))
            .collect();
        (!intents.is_empty()).then_some(intents)
    }
}

impl IngestionService {
    /// Maps a call event onto interaction ingestion or a lifecycle update.
    #[instrument(skip(self, event), fields(tenant_id = %tenant_id, call_id = %event.call_id, event_type = %event.event_type))]
    pub async fn handle_call_event(
        &self,
        tenant_id: Uuid,
        event: CallEvent,
    ) -> EngineResult<CallEventResponse> {
        let kind: CallEventKind = event.event_type.parse()?;
        if event.call_id.trim().is_empty() {
            return Err(AttributionError::invalid("call_id must not be blank"));
        }

        if kind == CallEventKind::Started {
            let request = IngestInteractionRequest {
                external_interaction_id: event.call_id.clone(),
                channel: CALL_CHANNEL.to_string(),
                vendor_code: event.string("vendor_code"),
                customer_identifiers: event.identifiers(),
                started_at: event.time("started_at"),
                ended_at: None,
                direction: Some(
                    event
                        .string("direction")
                        .unwrap_or_else(|| DEFAULT_DIRECTION.to_string()),
                ),
                language: Some(
                    event
                        .string("language")
                        .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
                ),
                participants: Vec::new(),
                transcript_url: None,
                primary_intent: None,
                secondary_intents: Vec::new(),
                outcome_prediction: None,
                purchase_probability: None,
                raw_metadata: Some(JsonValue::Object(event.data.clone())),
            };
            let created = self.ingest_interaction(tenant_id, request).await?;
            return Ok(CallEventResponse {
                status: "processed".to_string(),
                interaction_id: created.interaction_id,
                customer_id: created.customer_id,
            });
        }

        let update = match kind {
            CallEventKind::Ended => UpdateInteractionRequest {
                ended_at: Some(event.time("ended_at")),
                transcript_url: event.string("transcript_url"),
                outcome_prediction: event.string("outcome"),
                ..Default::default()
            },
            CallEventKind::TranscriptUpdated => UpdateInteractionRequest {
                transcript_url: event.string("transcript_url"),
                ..Default::default()
            },
            CallEventKind::IntentDetected => UpdateInteractionRequest {
                primary_intent: event.string("primary_intent"),
                secondary_intents: event.secondary_intents(),
                purchase_probability: event
                    .data
                    .get("purchase_probability")
                    .and_then(JsonValue::as_f64),
                ..Default::default()
            },
            CallEventKind::Started => UpdateInteractionRequest::default(),
        };

        let updated = self
            .update_interaction(tenant_id, &event.call_id, update)
            .await?;
        Ok(CallEventResponse {
            status: "processed".to_string(),
            interaction_id: updated.id,
            customer_id: updated.customer_id,
        })
    }
}
