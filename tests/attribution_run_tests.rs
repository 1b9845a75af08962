//! End-to-end attribution run tests: ingestion through execution and reporting.

use anyhow::Result;
use attribution_engine::{
    engine::{RunConfigInput, RunStatus},
    error::AttributionError,
    identity::IdentifierInput,
    models::attribution_result,
    repositories::AttributionResultRepository,
    server::AppState,
};
use sea_orm::Set;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[path = "test_utils/mod.rs"]
mod test_utils;
use test_utils::{
    agent_participant, conversion_request, corrupt_interaction_metadata, create_run,
    interaction_request, leave_run_running_since, phone, run_request, setup_test_state,
};

async fn touch(
    state: &AppState,
    tenant: Uuid,
    external_id: &str,
    channel: &str,
    who: &[IdentifierInput],
    started_at: &str,
) -> Result<Uuid> {
    Ok(state
        .ingestion
        .ingest_interaction(
            tenant,
            interaction_request(external_id, channel, who.to_vec(), started_at),
        )
        .await?
        .interaction_id)
}

async fn convert(
    state: &AppState,
    tenant: Uuid,
    external_id: &str,
    who: &[IdentifierInput],
    amount: f64,
    occurred_at: &str,
) -> Result<Uuid> {
    Ok(state
        .ingestion
        .ingest_conversion(
            tenant,
            conversion_request(external_id, who.to_vec(), amount, occurred_at),
        )
        .await?
        .conversion_event_id)
}

async fn results_of(
    state: &AppState,
    tenant: Uuid,
    run_id: Uuid,
) -> Result<Vec<attribution_result::Model>> {
    Ok(state
        .runs
        .list_results(tenant, run_id, None, Some(500))
        .await?
        .results)
}

#[tokio::test]
async fn first_touch_single_interaction_gets_full_credit() -> Result<()> {
    let state = setup_test_state().await?;
    let tenant = Uuid::new_v4();
    let who = [phone("+15550300001")];

    let interaction = touch(&state, tenant, "call-1", "call", &who, "2025-03-01T09:00:00Z").await?;
    convert(&state, tenant, "deal-1", &who, 100.0, "2025-03-01T12:00:00Z").await?;

    let run_id = create_run(&state, tenant, "FIRST_TOUCH", 72).await?;
    let outcome = state
        .runs
        .execute_run(tenant, run_id, CancellationToken::new())
        .await?;
    assert_eq!(outcome.conversions_attributed, 1);
    assert_eq!(outcome.results_written, 1);

    let results = results_of(&state, tenant, run_id).await?;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].interaction_id, interaction);
    assert!((results[0].attribution_weight - 1.0).abs() < 1e-9);
    assert!((results[0].attributed_amount - 100.0).abs() < 1e-9);
    assert!(results[0].is_primary_touch);

    let run = state.runs.get_run(tenant, run_id).await?;
    assert_eq!(run.status, "completed");
    assert!(run.started_at.is_some());
    assert!(run.completed_at.is_some());
    Ok(())
}

#[tokio::test]
async fn linear_splits_credit_evenly() -> Result<()> {
    let state = setup_test_state().await?;
    let tenant = Uuid::new_v4();
    let who = [phone("+15550300002")];

    touch(&state, tenant, "chat-1", "chat", &who, "2025-03-01T08:00:00Z").await?;
    touch(&state, tenant, "call-1", "call", &who, "2025-03-01T10:00:00Z").await?;
    convert(&state, tenant, "deal-1", &who, 200.0, "2025-03-01T12:00:00Z").await?;

    let run_id = create_run(&state, tenant, "LINEAR", 72).await?;
    state
        .runs
        .execute_run(tenant, run_id, CancellationToken::new())
        .await?;

    let results = results_of(&state, tenant, run_id).await?;
    assert_eq!(results.len(), 2);
    for row in &results {
        assert!((row.attribution_weight - 0.5).abs() < 1e-9);
        assert!((row.attributed_amount - 100.0).abs() < 1e-9);
        assert!(!row.is_primary_touch);
    }
    let weight_sum: f64 = results.iter().map(|row| row.attribution_weight).sum();
    assert!((weight_sum - 1.0).abs() < 1e-9);
    Ok(())
}

#[tokio::test]
async fn time_decay_favours_later_touches() -> Result<()> {
    let state = setup_test_state().await?;
    let tenant = Uuid::new_v4();
    let who = [phone("+15550300003")];

    let first = touch(&state, tenant, "ad-1", "ad_click", &who, "2025-03-01T06:00:00Z").await?;
    let second = touch(&state, tenant, "web-1", "web", &who, "2025-03-01T08:00:00Z").await?;
    let third = touch(&state, tenant, "call-1", "call", &who, "2025-03-01T10:00:00Z").await?;
    convert(&state, tenant, "deal-1", &who, 90.0, "2025-03-01T12:00:00Z").await?;

    let run_id = create_run(&state, tenant, "TIME_DECAY", 72).await?;
    state
        .runs
        .execute_run(tenant, run_id, CancellationToken::new())
        .await?;

    let results = results_of(&state, tenant, run_id).await?;
    let weight_of = |id: Uuid| {
        results
            .iter()
            .find(|row| row.interaction_id == id)
            .map(|row| row.attribution_weight)
            .expect("row for interaction")
    };
    assert!(weight_of(first) < weight_of(second));
    assert!(weight_of(second) < weight_of(third));
    let total: f64 = results.iter().map(|row| row.attributed_amount).sum();
    assert!((total - 90.0).abs() < 1e-9);
    Ok(())
}

#[tokio::test]
async fn conversion_without_journey_writes_nothing_and_completes() -> Result<()> {
    let state = setup_test_state().await?;
    let tenant = Uuid::new_v4();

    convert(&state, tenant, "deal-1", &[phone("+15550300004")], 50.0, "2025-03-01T12:00:00Z").await?;

    let run_id = create_run(&state, tenant, "LAST_TOUCH", 72).await?;
    let outcome = state
        .runs
        .execute_run(tenant, run_id, CancellationToken::new())
        .await?;

    assert_eq!(outcome.conversions_total, 1);
    assert_eq!(outcome.conversions_without_journey, 1);
    assert_eq!(outcome.results_written, 0);
    assert!(results_of(&state, tenant, run_id).await?.is_empty());
    assert_eq!(state.runs.get_run(tenant, run_id).await?.status, "completed");
    Ok(())
}

#[tokio::test]
async fn journey_window_is_inclusive_at_both_ends() -> Result<()> {
    let state = setup_test_state().await?;
    let tenant = Uuid::new_v4();
    let who = [phone("+15550300005")];

    touch(&state, tenant, "too-early", "web", &who, "2025-03-01T10:59:59Z").await?;
    let at_start = touch(&state, tenant, "at-start", "web", &who, "2025-03-01T11:00:00Z").await?;
    let at_end = touch(&state, tenant, "at-end", "call", &who, "2025-03-01T12:00:00Z").await?;
    touch(&state, tenant, "too-late", "call", &who, "2025-03-01T12:00:01Z").await?;
    convert(&state, tenant, "deal-1", &who, 10.0, "2025-03-01T12:00:00Z").await?;

    let run_id = create_run(&state, tenant, "LINEAR", 1).await?;
    state
        .runs
        .execute_run(tenant, run_id, CancellationToken::new())
        .await?;

    let mut attributed: Vec<Uuid> = results_of(&state, tenant, run_id)
        .await?
        .into_iter()
        .map(|row| row.interaction_id)
        .collect();
    attributed.sort();
    let mut expected = vec![at_start, at_end];
    expected.sort();
    assert_eq!(attributed, expected);
    Ok(())
}

#[tokio::test]
async fn channel_allow_list_restricts_journey() -> Result<()> {
    let state = setup_test_state().await?;
    let tenant = Uuid::new_v4();
    let who = [phone("+15550300006")];

    touch(&state, tenant, "ad-1", "ad_click", &who, "2025-03-01T09:00:00Z").await?;
    let call = touch(&state, tenant, "call-1", "call", &who, "2025-03-01T10:00:00Z").await?;
    convert(&state, tenant, "deal-1", &who, 40.0, "2025-03-01T12:00:00Z").await?;

    let mut request = run_request("FIRST_TOUCH", 72);
    request.config = Some(RunConfigInput {
        include_channels: Some(vec!["call".to_string()]),
        ..RunConfigInput::default()
    });
    let run = state.runs.create_run(tenant, request).await?;
    state
        .runs
        .execute_run(tenant, run.id, CancellationToken::new())
        .await?;

    let results = results_of(&state, tenant, run.id).await?;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].interaction_id, call);
    Ok(())
}

#[tokio::test]
async fn create_run_validates_model_and_config() -> Result<()> {
    let state = setup_test_state().await?;
    let tenant = Uuid::new_v4();

    let err = state
        .runs
        .create_run(tenant, run_request("MARKOV_CHAIN", 72))
        .await
        .unwrap_err();
    assert!(matches!(err, AttributionError::NotFound { .. }));

    let mut unknown_channel = run_request("LINEAR", 72);
    unknown_channel.config = Some(RunConfigInput {
        include_channels: Some(vec!["carrier_pigeon".to_string()]),
        ..RunConfigInput::default()
    });
    assert!(state.runs.create_run(tenant, unknown_channel).await.is_err());

    let err = state
        .runs
        .create_run(tenant, run_request("LINEAR", 0))
        .await
        .unwrap_err();
    assert!(matches!(err, AttributionError::InvalidInput(_)));

    let mut blank_name = run_request("LINEAR", 72);
    blank_name.name = "   ".to_string();
    let err = state.runs.create_run(tenant, blank_name).await.unwrap_err();
    assert!(matches!(err, AttributionError::InvalidInput(_)));

    let run = state.runs.create_run(tenant, run_request("linear", 72)).await?;
    assert_eq!(run.status, "pending");
    Ok(())
}

#[tokio::test]
async fn re_execution_replaces_results() -> Result<()> {
    let state = setup_test_state().await?;
    let tenant = Uuid::new_v4();
    let who = [phone("+15550300007")];

    touch(&state, tenant, "chat-1", "chat", &who, "2025-03-01T08:00:00Z").await?;
    touch(&state, tenant, "call-1", "call", &who, "2025-03-01T10:00:00Z").await?;
    convert(&state, tenant, "deal-1", &who, 100.0, "2025-03-01T12:00:00Z").await?;

    let run_id = create_run(&state, tenant, "LINEAR", 72).await?;
    state
        .runs
        .execute_run(tenant, run_id, CancellationToken::new())
        .await?;
    let first = results_of(&state, tenant, run_id).await?;

    let outcome = state
        .runs
        .execute_run(tenant, run_id, CancellationToken::new())
        .await?;
    let second = results_of(&state, tenant, run_id).await?;

    assert_eq!(first.len(), 2);
    assert_eq!(second.len(), first.len());
    assert_eq!(outcome.results_written, 2);
    assert_eq!(state.runs.get_run(tenant, run_id).await?.status, "completed");
    Ok(())
}

#[tokio::test]
async fn run_with_live_lease_is_not_reclaimed() -> Result<()> {
    let state = setup_test_state().await?;
    let tenant = Uuid::new_v4();
    let run_id = create_run(&state, tenant, "LINEAR", 72).await?;

    leave_run_running_since(&state.db, run_id, chrono::Utc::now()).await?;

    let err = state
        .runs
        .execute_run(tenant, run_id, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AttributionError::Conflict(_)));
    assert_eq!(state.runs.get_run(tenant, run_id).await?.status, "running");
    Ok(())
}

#[tokio::test]
async fn abandoned_running_run_is_reclaimed_after_lease() -> Result<()> {
    let state = setup_test_state().await?;
    let tenant = Uuid::new_v4();
    let who = [phone("+15550300011")];

    touch(&state, tenant, "call-1", "call", &who, "2025-03-01T10:00:00Z").await?;
    convert(&state, tenant, "deal-1", &who, 100.0, "2025-03-01T12:00:00Z").await?;
    let run_id = create_run(&state, tenant, "LINEAR", 72).await?;

    let lease = state.config.run_executor.run_lease_secs as i64;
    let stale = chrono::Utc::now() - chrono::Duration::seconds(lease + 60);
    leave_run_running_since(&state.db, run_id, stale).await?;

    let outcome = state
        .runs
        .execute_run(tenant, run_id, CancellationToken::new())
        .await?;
    assert_eq!(outcome.conversions_attributed, 1);

    let run = state.runs.get_run(tenant, run_id).await?;
    assert_eq!(run.status, "completed");
    assert!(run.completed_at.is_some());
    assert!(run.started_at.is_some_and(|started| started > stale.fixed_offset()));
    assert_eq!(results_of(&state, tenant, run_id).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn duplicate_result_rows_conflict_and_keep_previous_results() -> Result<()> {
    let state = setup_test_state().await?;
    let tenant = Uuid::new_v4();
    let who = [phone("+15550300012")];

    touch(&state, tenant, "call-1", "call", &who, "2025-03-01T10:00:00Z").await?;
    convert(&state, tenant, "deal-1", &who, 100.0, "2025-03-01T12:00:00Z").await?;
    let run_id = create_run(&state, tenant, "LINEAR", 72).await?;
    state
        .runs
        .execute_run(tenant, run_id, CancellationToken::new())
        .await?;
    let existing = results_of(&state, tenant, run_id).await?;
    assert_eq!(existing.len(), 1);

    let duplicate = |row: &attribution_result::Model| {
        let mut active: attribution_result::ActiveModel = row.clone().into();
        active.id = Set(Uuid::new_v4());
        active
    };
    let repository = AttributionResultRepository::new(state.db.clone());
    let err = repository
        .replace_for_conversion(
            run_id,
            existing[0].conversion_event_id,
            vec![duplicate(&existing[0]), duplicate(&existing[0])],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AttributionError::Conflict(_)), "got {err:?}");

    let after = results_of(&state, tenant, run_id).await?;
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].id, existing[0].id);
    Ok(())
}

#[tokio::test]
async fn cancelled_run_ends_failed() -> Result<()> {
    let state = setup_test_state().await?;
    let tenant = Uuid::new_v4();
    let who = [phone("+15550300008")];

    touch(&state, tenant, "call-1", "call", &who, "2025-03-01T10:00:00Z").await?;
    convert(&state, tenant, "deal-1", &who, 100.0, "2025-03-01T12:00:00Z").await?;

    let run_id = create_run(&state, tenant, "LINEAR", 72).await?;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = state.runs.execute_run(tenant, run_id, cancel).await?;
    assert!(outcome.cancelled);
    assert_eq!(outcome.final_status(), RunStatus::Failed);

    let run = state.runs.get_run(tenant, run_id).await?;
    assert_eq!(run.status, "failed");
    let summary = run.error_summary.expect("error summary recorded");
    assert!(summary.to_string().contains("cancelled"));
    Ok(())
}

#[tokio::test]
async fn failing_conversion_is_counted_while_run_completes() -> Result<()> {
    let state = setup_test_state().await?;
    let tenant = Uuid::new_v4();
    let healthy = [phone("+15550300009")];
    let broken = [phone("+15550300010")];

    touch(&state, tenant, "call-ok", "call", &healthy, "2025-03-01T10:00:00Z").await?;
    convert(&state, tenant, "deal-ok", &healthy, 100.0, "2025-03-01T12:00:00Z").await?;
    let bad = touch(&state, tenant, "call-bad", "call", &broken, "2025-03-01T10:00:00Z").await?;
    let failing = convert(&state, tenant, "deal-bad", &broken, 100.0, "2025-03-01T12:00:00Z").await?;
    corrupt_interaction_metadata(&state.db, bad).await?;

    let run_id = create_run(&state, tenant, "LINEAR", 72).await?;
    let outcome = state
        .runs
        .execute_run(tenant, run_id, CancellationToken::new())
        .await?;

    assert_eq!(outcome.conversions_total, 2);
    assert_eq!(outcome.conversions_attributed, 1);
    assert_eq!(outcome.conversions_failed, 1);
    assert_eq!(outcome.errors[0].conversion_event_id, Some(failing));

    let run = state.runs.get_run(tenant, run_id).await?;
    assert_eq!(run.status, "completed");
    assert_eq!(run.conversions_failed, 1);
    Ok(())
}

#[tokio::test]
async fn runs_are_tenant_scoped_and_listed_newest_first() -> Result<()> {
    let state = setup_test_state().await?;
    let tenant = Uuid::new_v4();

    let older = create_run(&state, tenant, "LINEAR", 72).await?;
    let newer = create_run(&state, tenant, "FIRST_TOUCH", 72).await?;
    create_run(&state, Uuid::new_v4(), "LINEAR", 72).await?;

    let (runs, total) = state.runs.list_runs(tenant, None, None, None).await?;
    assert_eq!(total, 2);
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].id, newer);
    assert_eq!(runs[1].id, older);

    let (pending, _) = state
        .runs
        .list_runs(tenant, Some(RunStatus::Completed), None, None)
        .await?;
    assert!(pending.is_empty());

    let err = state
        .runs
        .get_run(Uuid::new_v4(), older)
        .await
        .unwrap_err();
    assert!(matches!(err, AttributionError::NotFound { .. }));

    let err = state
        .runs
        .list_runs(tenant, None, Some(0), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AttributionError::InvalidInput(_)));
    Ok(())
}

#[tokio::test]
async fn results_paginate_with_cursor() -> Result<()> {
    let state = setup_test_state().await?;
    let tenant = Uuid::new_v4();
    let who = [phone("+15550300011")];

    for (index, hour) in ["06", "07", "08", "09", "10"].iter().enumerate() {
        touch(
            &state,
            tenant,
            &format!("web-{index}"),
            "web",
            &who,
            &format!("2025-03-01T{hour}:00:00Z"),
        )
        .await?;
    }
    convert(&state, tenant, "deal-1", &who, 100.0, "2025-03-01T12:00:00Z").await?;

    let run_id = create_run(&state, tenant, "LINEAR", 72).await?;
    state
        .runs
        .execute_run(tenant, run_id, CancellationToken::new())
        .await?;

    let mut seen = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = state
            .runs
            .list_results(tenant, run_id, cursor.as_deref(), Some(2))
            .await?;
        assert!(page.results.len() <= 2);
        seen.extend(page.results.iter().map(|row| row.id));
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    assert_eq!(seen.len(), 5);
    let mut unique = seen.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), 5);

    let err = state
        .runs
        .list_results(tenant, run_id, Some("not-a-cursor"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AttributionError::InvalidInput(_)));
    Ok(())
}

#[tokio::test]
async fn summary_groups_revenue_by_agent_team_vendor_and_channel() -> Result<()> {
    let state = setup_test_state().await?;
    let tenant = Uuid::new_v4();
    let who = [phone("+15550300012")];

    let vendor = state.references.create_vendor(tenant, "acme-bpo", "Acme BPO").await?;
    let team = state
        .references
        .create_team(tenant, Some(vendor.id), "Closers")
        .await?;
    let agent = state
        .references
        .create_agent(tenant, "agent-1", "Agent One", Some(team.id), Some(vendor.id))
        .await?;

    let mut call = interaction_request("call-1", "call", who.to_vec(), "2025-03-01T10:00:00Z");
    call.participants = vec![agent_participant("agent-1")];
    state.ingestion.ingest_interaction(tenant, call).await?;
    touch(&state, tenant, "web-1", "web", &who, "2025-03-01T09:00:00Z").await?;
    convert(&state, tenant, "deal-1", &who, 300.0, "2025-03-01T12:00:00Z").await?;

    let run_id = create_run(&state, tenant, "LAST_TOUCH", 72).await?;
    state
        .runs
        .execute_run(tenant, run_id, CancellationToken::new())
        .await?;

    let summary = state.runs.run_summary(tenant, run_id).await?;
    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.conversions, 1);
    assert_eq!(summary.results, 2);
    assert!((summary.total_attributed - 300.0).abs() < 1e-9);

    let top_agent = &summary.by_agent[0];
    assert_eq!(top_agent.id, Some(agent.id));
    assert!((top_agent.attributed_amount - 300.0).abs() < 1e-9);
    assert_eq!(top_agent.primary_touches, 1);
    assert_eq!(summary.by_team[0].id, Some(team.id));
    assert_eq!(summary.by_vendor[0].id, Some(vendor.id));
    assert_eq!(summary.by_channel.len(), 2);
    Ok(())
}

#[tokio::test]
async fn list_models_returns_seeded_registry() -> Result<()> {
    let state = setup_test_state().await?;

    let mut codes: Vec<String> = state
        .runs
        .list_models()
        .await?
        .into_iter()
        .map(|model| model.code)
        .collect();
    codes.sort();

    assert_eq!(
        codes,
        vec!["AI_WEIGHTED", "FIRST_TOUCH", "LAST_TOUCH", "LINEAR", "TIME_DECAY"]
    );
    Ok(())
}
