//! Identity resolution and customer journey tests against in-memory SQLite.

use anyhow::Result;
use attribution_engine::{error::AttributionError, identity::IdentifierInput};
use uuid::Uuid;

#[path = "test_utils/mod.rs"]
mod test_utils;
use test_utils::{
    at, conversion_request, email, interaction_request, phone, setup_test_state,
};

#[tokio::test]
async fn resolving_same_identifier_twice_returns_same_customer() -> Result<()> {
    let state = setup_test_state().await?;
    let tenant = Uuid::new_v4();

    let first = state.identity.resolve(tenant, &[phone("+1 (555) 010-0001")]).await?;
    let second = state.identity.resolve(tenant, &[phone("+15550100001")]).await?;

    assert_eq!(first.id, second.id);
    Ok(())
}

#[tokio::test]
async fn any_matching_identifier_resolves_existing_customer() -> Result<()> {
    let state = setup_test_state().await?;
    let tenant = Uuid::new_v4();

    let created = state
        .identity
        .resolve(tenant, &[phone("+15550100002"), email("Jane@Example.com")])
        .await?;
    let by_email = state
        .identity
        .resolve(tenant, &[email("jane@example.com"), phone("+15550109999")])
        .await?;

    assert_eq!(created.id, by_email.id);
    Ok(())
}

#[tokio::test]
async fn disjoint_identifiers_create_distinct_customers() -> Result<()> {
    let state = setup_test_state().await?;
    let tenant = Uuid::new_v4();

    let a = state.identity.resolve(tenant, &[phone("+15550100003")]).await?;
    let b = state.identity.resolve(tenant, &[email("other@example.com")]).await?;

    assert_ne!(a.id, b.id);
    Ok(())
}

#[tokio::test]
async fn same_value_under_different_types_stays_distinct() -> Result<()> {
    let state = setup_test_state().await?;
    let tenant = Uuid::new_v4();

    let as_external = state
        .identity
        .resolve(tenant, &[IdentifierInput::new("external_id", "12345")])
        .await?;
    let as_phone = state.identity.resolve(tenant, &[phone("12345")]).await?;

    assert_ne!(as_external.id, as_phone.id);
    Ok(())
}

#[tokio::test]
async fn identifiers_are_scoped_per_tenant() -> Result<()> {
    let state = setup_test_state().await?;

    let a = state.identity.resolve(Uuid::new_v4(), &[phone("+15550100004")]).await?;
    let b = state.identity.resolve(Uuid::new_v4(), &[phone("+15550100004")]).await?;

    assert_ne!(a.id, b.id);
    assert_ne!(a.tenant_id, b.tenant_id);
    Ok(())
}

#[tokio::test]
async fn empty_identifier_list_is_rejected() -> Result<()> {
    let state = setup_test_state().await?;

    let err = state.identity.resolve(Uuid::new_v4(), &[]).await.unwrap_err();
    assert!(matches!(err, AttributionError::InvalidInput(_)));
    Ok(())
}

#[tokio::test]
async fn concurrent_resolution_converges_on_one_customer() -> Result<()> {
    let state = setup_test_state().await?;
    let tenant = Uuid::new_v4();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let identity = state.identity.clone();
        handles.push(tokio::spawn(async move {
            identity.resolve(tenant, &[phone("+15550100005")]).await
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await??.id);
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);
    Ok(())
}

#[tokio::test]
async fn journey_lists_identifiers_interactions_and_conversions() -> Result<()> {
    let state = setup_test_state().await?;
    let tenant = Uuid::new_v4();
    let who = vec![phone("+15550100006"), email("journey@example.com")];

    let chat = state
        .ingestion
        .ingest_interaction(
            tenant,
            interaction_request("chat-1", "chat", who.clone(), "2025-03-01T09:00:00Z"),
        )
        .await?;
    state
        .ingestion
        .ingest_interaction(
            tenant,
            interaction_request("call-1", "call", who.clone(), "2025-03-01T11:00:00Z"),
        )
        .await?;
    let conversion = state
        .ingestion
        .ingest_conversion(
            tenant,
            conversion_request("deal-1", who.clone(), 250.0, "2025-03-01T12:00:00Z"),
        )
        .await?;

    let customer_id = chat.customer_id.expect("customer resolved");
    assert_eq!(conversion.customer_id, customer_id);

    let journey = state
        .identity
        .customer_journey(tenant, customer_id, None, None)
        .await?;

    assert_eq!(journey.identifiers.len(), 2);
    assert_eq!(journey.identifiers.iter().filter(|i| i.is_primary).count(), 1);
    let channels: Vec<&str> = journey
        .interactions
        .iter()
        .map(|i| i.channel_name.as_str())
        .collect();
    assert_eq!(channels, vec!["chat", "call"]);
    assert_eq!(journey.conversions.len(), 1);
    assert_eq!(journey.conversions[0].event_source, "crm");
    assert_eq!(journey.conversions[0].currency, "USD");
    Ok(())
}

#[tokio::test]
async fn journey_window_filters_by_time() -> Result<()> {
    let state = setup_test_state().await?;
    let tenant = Uuid::new_v4();
    let who = vec![phone("+15550100007")];

    let early = state
        .ingestion
        .ingest_interaction(
            tenant,
            interaction_request("web-1", "web", who.clone(), "2025-02-01T09:00:00Z"),
        )
        .await?;
    state
        .ingestion
        .ingest_interaction(
            tenant,
            interaction_request("web-2", "web", who.clone(), "2025-03-01T09:00:00Z"),
        )
        .await?;
    let customer_id = early.customer_id.expect("customer resolved");

    let journey = state
        .identity
        .customer_journey(
            tenant,
            customer_id,
            Some(at("2025-02-15T00:00:00Z")),
            Some(at("2025-03-15T00:00:00Z")),
        )
        .await?;

    assert_eq!(journey.interactions.len(), 1);
    assert_eq!(journey.interactions[0].external_interaction_id, "web-2");
    Ok(())
}

#[tokio::test]
async fn journey_rejects_inverted_window_and_unknown_customer() -> Result<()> {
    let state = setup_test_state().await?;
    let tenant = Uuid::new_v4();

    let inverted = state
        .identity
        .customer_journey(
            tenant,
            Uuid::new_v4(),
            Some(at("2025-03-02T00:00:00Z")),
            Some(at("2025-03-01T00:00:00Z")),
        )
        .await
        .unwrap_err();
    assert!(matches!(inverted, AttributionError::InvalidInput(_)));

    let missing = state
        .identity
        .customer_journey(tenant, Uuid::new_v4(), None, None)
        .await
        .unwrap_err();
    assert!(matches!(missing, AttributionError::NotFound { entity: "customer", .. }));
    Ok(())
}

#[tokio::test]
async fn customers_of_other_tenants_are_not_visible() -> Result<()> {
    let state = setup_test_state().await?;
    let owner = Uuid::new_v4();

    let customer = state.identity.resolve(owner, &[phone("+15550100008")]).await?;
    let err = state
        .identity
        .customer_journey(Uuid::new_v4(), customer.id, None, None)
        .await
        .unwrap_err();

    assert!(matches!(err, AttributionError::NotFound { .. }));
    Ok(())
}
