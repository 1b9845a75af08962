//! Test utilities for database testing.
//!
//! Sets up in-memory SQLite databases with migrations and reference data applied, plus
//! request builders shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use attribution_engine::{
    config::AppConfig,
    db,
    engine::{CreateRunRequest, RunConfigInput},
    models::attribution_run,
    identity::IdentifierInput,
    ingestion::{IngestConversionRequest, IngestInteractionRequest, ParticipantRequest},
    seeds::seed_reference_data,
    server::AppState,
};
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ConnectionTrait, DatabaseConnection, Set, Statement};
use uuid::Uuid;

pub const TEST_TOKEN: &str = "test-operator-token";

/// Configuration pointing at a private in-memory SQLite database.
pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".to_string(),
        operator_tokens: vec![TEST_TOKEN.to_string()],
        ..AppConfig::default()
    }
}

/// Sets up an in-memory SQLite database with all migrations applied and reference data
/// seeded.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = db::init_pool(&test_config()).await?;
    db::run_migrations(&db).await?;
    seed_reference_data(&db).await?;
    Ok(db)
}

/// Application state over a fresh seeded database.
pub async fn setup_test_state() -> Result<AppState> {
    let db = setup_test_db().await?;
    Ok(AppState::new(db, Arc::new(test_config())))
}

/// Parses an RFC 3339 timestamp.
pub fn at(timestamp: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(timestamp)
        .expect("valid RFC 3339 timestamp")
        .with_timezone(&Utc)
}

pub fn phone(value: &str) -> IdentifierInput {
    IdentifierInput::new("phone", value)
}

pub fn email(value: &str) -> IdentifierInput {
    IdentifierInput::new("email", value)
}

pub fn interaction_request(
    external_id: &str,
    channel: &str,
    identifiers: Vec<IdentifierInput>,
    started_at: &str,
) -> IngestInteractionRequest {
    IngestInteractionRequest {
        external_interaction_id: external_id.to_string(),
        channel: channel.to_string(),
        vendor_code: None,
        customer_identifiers: identifiers,
        started_at: at(started_at),
        ended_at: None,
        direction: None,
        language: None,
        participants: Vec::new(),
        transcript_url: None,
        primary_intent: None,
        secondary_intents: Vec::new(),
        outcome_prediction: None,
        purchase_probability: None,
        raw_metadata: None,
    }
}

pub fn agent_participant(external_agent_id: &str) -> ParticipantRequest {
    ParticipantRequest {
        participant_type: "agent".to_string(),
        external_agent_id: Some(external_agent_id.to_string()),
        role: Some("primary".to_string()),
        metadata: None,
    }
}

pub fn conversion_request(
    external_id: &str,
    identifiers: Vec<IdentifierInput>,
    amount: f64,
    occurred_at: &str,
) -> IngestConversionRequest {
    IngestConversionRequest {
        event_source: "crm".to_string(),
        external_event_id: external_id.to_string(),
        customer_identifiers: identifiers,
        event_type: "purchase".to_string(),
        product_external_id: None,
        currency: "USD".to_string(),
        amount_decimal: amount,
        occurred_at: at(occurred_at),
        raw_payload: None,
    }
}

pub fn run_request(model_code: &str, window_hours: u32) -> CreateRunRequest {
    CreateRunRequest {
        model_code: model_code.to_string(),
        name: format!("{model_code} run"),
        description: None,
        config: Some(RunConfigInput {
            time_window_hours: Some(window_hours),
            ..RunConfigInput::default()
        }),
    }
}

/// Creates a run and returns its id.
pub async fn create_run(
    state: &AppState,
    tenant_id: Uuid,
    model_code: &str,
    window_hours: u32,
) -> Result<Uuid> {
    let run = state
        .runs
        .create_run(tenant_id, run_request(model_code, window_hours))
        .await?;
    Ok(run.id)
}

/// Overwrites an interaction's metadata with text that is not valid JSON, so loading the
/// row fails.
pub async fn corrupt_interaction_metadata(
    db: &DatabaseConnection,
    interaction_id: Uuid,
) -> Result<()> {
    let backend = db.get_database_backend();
    db.execute(Statement::from_sql_and_values(
        backend,
        "UPDATE interactions SET raw_metadata = '{not json' WHERE id = ?",
        [interaction_id.into()],
    ))
    .await?;
    Ok(())
}

/// Leaves a run looking as if an executor claimed it at `started_at` and then died.
pub async fn leave_run_running_since(
    db: &DatabaseConnection,
    run_id: Uuid,
    started_at: DateTime<Utc>,
) -> Result<()> {
    attribution_run::ActiveModel {
        id: Set(run_id),
        status: Set("running".to_string()),
        started_at: Set(Some(started_at.fixed_offset())),
        completed_at: Set(None),
        ..Default::default()
    }
    .update(db)
    .await?;
    Ok(())
}
