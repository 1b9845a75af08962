//! # Attribution Run Controller
//!
//! Owns the run lifecycle (`pending` → `running` → `completed` | `failed`) and the
//! per-conversion pipeline: journey, weights, then a transactional replacement of the
//! conversion's result rows.
//!
//! Conversions are independent. One failing conversion is counted and summarised on the
//! run; it never fails the run or rolls back other conversions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use metrics::{counter, histogram};
use rand::Rng;
use sea_orm::{DatabaseConnection, Set};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::journey::{JourneyBuilder, Touchpoint};
use super::outcome::{ConversionOutcome, RunOutcome, RunStatus, fatal_error_summary};
use super::registry::{AttributionModelCode, ModelRegistry};
use super::run_config::{RunConfig, RunConfigInput};
use super::weights::{TouchpointWeighting, WeightCalculator, is_primary_touch};
use crate::config::RunExecutorConfig;
use crate::cursor::{decode_cursor, encode_cursor};
use crate::error::{AttributionError, EngineResult};
use crate::models::{attribution_model, attribution_result, attribution_run, conversion_event};
use crate::repositories::{
    AttributionResultRepository, AttributionRunRepository, ConversionRepository,
    InteractionRepository, NewRun, ReferenceDataRepository,
};

/// Default and maximum page sizes for result listing.
pub const DEFAULT_RESULTS_LIMIT: u64 = 100;
pub const MAX_RESULTS_LIMIT: u64 = 500;

/// Default and maximum page sizes for run listing.
pub const DEFAULT_RUNS_LIMIT: u64 = 20;
pub const MAX_RUNS_LIMIT: u64 = 100;

/// Attempts per conversion when its result transaction cannot be started or committed.
const MAX_CONVERSION_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY_MS: u64 = 50;
const RETRY_JITTER_MS: u64 = 25;

/// Body of `POST /api/v1/attribution/runs`
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateRunRequest {
    /// Registry code, e.g. `LINEAR`
    pub model_code: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub config: Option<RunConfigInput>,
}

/// One page of attribution results.
#[derive(Debug, Clone)]
pub struct ResultPage {
    pub results: Vec<attribution_result::Model>,
    pub next_cursor: Option<String>,
}

/// Attributed revenue for one agent, team, vendor, or channel. A null key collects
/// touchpoints without that attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SummaryBucket {
    pub id: Option<Uuid>,
    pub attributed_amount: f64,
    pub touchpoints: u32,
    pub primary_touches: u32,
}

/// Revenue attributed by a run, grouped four ways.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub total_attributed: f64,
    pub conversions: u32,
    pub results: u32,
    pub by_agent: Vec<SummaryBucket>,
    pub by_team: Vec<SummaryBucket>,
    pub by_vendor: Vec<SummaryBucket>,
    pub by_channel: Vec<SummaryBucket>,
}

/// Everything a worker needs to attribute one conversion of a run.
#[derive(Clone)]
struct ConversionWorker {
    tenant_id: Uuid,
    run_id: Uuid,
    model_id: Uuid,
    model: AttributionModelCode,
    config: Arc<RunConfig>,
    channel_ids: Arc<[Uuid]>,
    journeys: JourneyBuilder,
    calculator: WeightCalculator,
    results: AttributionResultRepository,
}

impl ConversionWorker {
    async fn attribute_with_retry(
        &self,
        conversion: &conversion_event::Model,
    ) -> EngineResult<ConversionOutcome> {
        let mut attempt = 1;
        loop {
            match self.attribute(conversion).await {
                Err(err @ AttributionError::TransactionFailure { .. })
                    if attempt < MAX_CONVERSION_ATTEMPTS =>
                {
                    let jitter = rand::thread_rng().gen_range(0..=RETRY_JITTER_MS);
                    let delay = RETRY_BASE_DELAY_MS * 2u64.pow(attempt - 1) + jitter;
                    warn!(
                        conversion_event_id = %conversion.id,
                        attempt,
                        delay_ms = delay,
                        error = %err,
                        "Retrying conversion after transaction failure"
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    #[instrument(skip_all, fields(run_id = %self.run_id, conversion_event_id = %conversion.id))]
    async fn attribute(
        &self,
        conversion: &conversion_event::Model,
    ) -> EngineResult<ConversionOutcome> {
        let window_end = conversion.occurred_at.with_timezone(&Utc);
        let window_start = window_end
            .checked_sub_signed(self.config.window())
            .ok_or_else(|| AttributionError::invalid("attribution window start is out of range"))?;

        let touchpoints = self
            .journeys
            .build_journey(
                self.tenant_id,
                conversion.customer_id,
                window_start,
                window_end,
                &self.channel_ids,
            )
            .await?;

        if touchpoints.is_empty() {
            // Clears rows a previous execution may have written.
            self.results
                .replace_for_conversion(self.run_id, conversion.id, Vec::new())
                .await?;
            debug!("No interactions inside the attribution window");
            return Ok(ConversionOutcome::NoJourney);
        }

        let rows = self.result_rows(conversion, &touchpoints);
        let written = self
            .results
            .replace_for_conversion(self.run_id, conversion.id, rows)
            .await?;

        counter!("attribution_results_written_total", "model" => self.model.as_str())
            .increment(written as u64);
        debug!(touchpoints = touchpoints.len(), results_written = written, "Conversion attributed");
        Ok(ConversionOutcome::Attributed {
            results_written: written,
        })
    }

    fn result_rows(
        &self,
        conversion: &conversion_event::Model,
        touchpoints: &[Touchpoint],
    ) -> Vec<attribution_result::ActiveModel> {
        let weights = self.calculator.weights(self.model, touchpoints);
        let n = touchpoints.len();
        let now = Utc::now().fixed_offset();

        touchpoints
            .iter()
            .zip(weights)
            .enumerate()
            .map(|(index, (touchpoint, weight))| attribution_result::ActiveModel {
                id: Set(Uuid::new_v4()),
                tenant_id: Set(self.tenant_id),
                attribution_run_id: Set(self.run_id),
                conversion_event_id: Set(conversion.id),
                interaction_id: Set(touchpoint.interaction_id),
                customer_id: Set(conversion.customer_id),
                agent_id: Set(touchpoint.agent_id),
                team_id: Set(touchpoint.team_id),
                vendor_id: Set(touchpoint.vendor_id),
                channel_id: Set(Some(touchpoint.channel_id)),
                model_id: Set(self.model_id),
                attribution_weight: Set(weight),
                attributed_amount: Set(conversion.amount_decimal * weight),
                is_primary_touch: Set(is_primary_touch(self.model, index, n)),
                created_at: Set(now),
            })
            .collect()
    }
}

/// Creates, executes, and reports on attribution runs
#[derive(Clone)]
pub struct RunController {
    runs: AttributionRunRepository,
    results: AttributionResultRepository,
    conversions: ConversionRepository,
    references: ReferenceDataRepository,
    journeys: JourneyBuilder,
    calculator: WeightCalculator,
    settings: RunExecutorConfig,
}

impl RunController {
    pub fn new(
        db: DatabaseConnection,
        references: ReferenceDataRepository,
        settings: RunExecutorConfig,
    ) -> Self {
        Self {
            runs: AttributionRunRepository::new(db.clone()),
            results: AttributionResultRepository::new(db.clone()),
            conversions: ConversionRepository::new(db.clone()),
            journeys: JourneyBuilder::new(InteractionRepository::new(db), references.clone()),
            references,
            calculator: WeightCalculator::default(),
            settings,
        }
    }

    /// Replaces the scorer used by the AI_WEIGHTED model.
    pub fn with_scorer(mut self, scorer: Arc<dyn TouchpointWeighting>) -> Self {
        self.calculator = WeightCalculator::new(scorer);
        self
    }

    /// Validates the model and configuration and stores a `pending` run.
    #[instrument(skip(self, request), fields(tenant_id = %tenant_id, model_code = %request.model_code))]
    pub async fn create_run(
        &self,
        tenant_id: Uuid,
        request: CreateRunRequest,
    ) -> EngineResult<attribution_run::Model> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(AttributionError::invalid("run name must not be blank"));
        }

        let definition = ModelRegistry::get(&request.model_code)
            .ok_or_else(|| AttributionError::not_found("attribution_model", &request.model_code))?;
        let model = self
            .references
            .model_by_code(definition.code.as_str())
            .await?
            .ok_or_else(|| AttributionError::not_found("attribution_model", definition.code))?;

        let config = request
            .config
            .unwrap_or_default()
            .resolve(self.settings.default_window_hours)?;
        self.references
            .channel_ids_for_names(&config.include_channels)
            .await?;

        self.runs
            .create(NewRun {
                tenant_id,
                model_id: model.id,
                name: name.to_string(),
                description: request
                    .description
                    .map(|d| d.trim().to_string())
                    .filter(|d| !d.is_empty()),
                config: config.to_json()?,
            })
            .await
    }

    /// Claims and executes a run, returning the persisted outcome.
    ///
    /// Cancellation stops new conversions from starting; in-flight conversions finish and
    /// the run is marked `failed`.
    #[instrument(skip(self, cancel), fields(tenant_id = %tenant_id, run_id = %run_id))]
    pub async fn execute_run(
        &self,
        tenant_id: Uuid,
        run_id: Uuid,
        cancel: CancellationToken,
    ) -> EngineResult<RunOutcome> {
        let run = self
            .runs
            .find_by_tenant(tenant_id, run_id)
            .await?
            .ok_or_else(|| AttributionError::not_found("attribution_run", run_id))?;

        let lease = chrono::Duration::seconds(self.settings.run_lease_secs.min(86_400) as i64);
        if !self.runs.claim(tenant_id, run.id, lease).await? {
            return Err(AttributionError::Conflict(format!(
                "attribution run {run_id} is already running"
            )));
        }
        info!("Attribution run started");
        let started = Instant::now();

        let (worker, conversions) = match self.prepare(&run).await {
            Ok(prepared) => prepared,
            Err(err) => {
                error!(error = %err, "Attribution run could not start");
                self.runs
                    .mark_failed(run.id, fatal_error_summary(err.to_string()))
                    .await?;
                counter!("attribution_runs_failed_total").increment(1);
                return Err(AttributionError::Internal(format!(
                    "attribution run {run_id} failed to start: {err}"
                )));
            }
        };

        if let Err(err) = self.runs.record_total(run.id, conversions.len() as u32).await {
            return Err(self.abandon(run.id, err).await);
        }
        let outcome = self.process(worker, conversions, &cancel).await;

        let finalized = match self.runs.finalize(run.id, &outcome).await {
            Ok(finalized) => finalized,
            Err(err) => return Err(self.abandon(run.id, err).await),
        };
        let elapsed_ms = started.elapsed().as_secs_f64() * 1_000.0;
        histogram!("attribution_run_duration_ms").record(elapsed_ms);

        info!(
            status = %finalized.status,
            conversions_total = outcome.conversions_total,
            conversions_attributed = outcome.conversions_attributed,
            conversions_without_journey = outcome.conversions_without_journey,
            conversions_failed = outcome.conversions_failed,
            results_written = outcome.results_written,
            elapsed_ms,
            "Attribution run finished"
        );
        Ok(outcome)
    }

    /// Releases a claimed run as `failed` after a bookkeeping write failed, so it is not
    /// left `running` until the lease expires.
    async fn abandon(&self, run_id: Uuid, err: AttributionError) -> AttributionError {
        error!(error = %err, "Attribution run bookkeeping failed");
        counter!("attribution_runs_failed_total").increment(1);
        if let Err(mark_err) = self
            .runs
            .mark_failed(run_id, fatal_error_summary(err.to_string()))
            .await
        {
            error!(error = %mark_err, "Could not mark attribution run failed");
        }
        err
    }

    async fn prepare(
        &self,
        run: &attribution_run::Model,
    ) -> EngineResult<(ConversionWorker, Vec<conversion_event::Model>)> {
        let config = RunConfig::from_stored(&run.config, self.settings.default_window_hours)?;
        let model: attribution_model::Model = self
            .references
            .model_by_id(run.model_id)
            .await?
            .ok_or_else(|| AttributionError::not_found("attribution_model", run.model_id))?;
        let channel_ids = self
            .references
            .channel_ids_for_names(&config.include_channels)
            .await?;
        let conversions = self
            .conversions
            .list_eligible(run.tenant_id, &config.event_types, config.min_purchase_amount)
            .await?;

        let worker = ConversionWorker {
            tenant_id: run.tenant_id,
            run_id: run.id,
            model_id: model.id,
            model: AttributionModelCode::resolve_or_linear(&model.code),
            config: Arc::new(config),
            channel_ids: channel_ids.into(),
            journeys: self.journeys.clone(),
            calculator: self.calculator.clone(),
            results: self.results.clone(),
        };
        Ok((worker, conversions))
    }

    async fn process(
        &self,
        worker: ConversionWorker,
        conversions: Vec<conversion_event::Model>,
        cancel: &CancellationToken,
    ) -> RunOutcome {
        let mut outcome = RunOutcome::with_total(conversions.len());
        let semaphore = Arc::new(Semaphore::new(self.settings.conversion_concurrency.max(1)));
        let mut tasks = JoinSet::new();
        let mut in_flight: HashMap<tokio::task::Id, Uuid> = HashMap::new();
        let mut cancelled = false;

        for conversion in conversions {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                permit = Arc::clone(&semaphore).acquire_owned() => permit,
            };
            let Ok(permit) = permit else {
                // The semaphore is owned here and never closed.
                break;
            };

            let worker = worker.clone();
            let conversion_id = conversion.id;
            let handle = tasks.spawn(async move {
                let _permit = permit;
                worker.attribute_with_retry(&conversion).await
            });
            in_flight.insert(handle.id(), conversion_id);

            while let Some(joined) = tasks.try_join_next_with_id() {
                record_joined(&mut outcome, &mut in_flight, joined);
            }
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            record_joined(&mut outcome, &mut in_flight, joined);
        }

        if cancelled {
            warn!(
                skipped = outcome.conversions_skipped(),
                "Attribution run cancelled before all conversions started"
            );
            outcome.mark_cancelled();
        }
        outcome
    }

    pub async fn get_run(
        &self,
        tenant_id: Uuid,
        run_id: Uuid,
    ) -> EngineResult<attribution_run::Model> {
        self.runs
            .find_by_tenant(tenant_id, run_id)
            .await?
            .ok_or_else(|| AttributionError::not_found("attribution_run", run_id))
    }

    /// Newest first; returns the page and the total count for the filter.
    pub async fn list_runs(
        &self,
        tenant_id: Uuid,
        status: Option<RunStatus>,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> EngineResult<(Vec<attribution_run::Model>, u64)> {
        let limit = limit.unwrap_or(DEFAULT_RUNS_LIMIT);
        if !(1..=MAX_RUNS_LIMIT).contains(&limit) {
            return Err(AttributionError::invalid(format!(
                "limit must be between 1 and {MAX_RUNS_LIMIT}"
            )));
        }
        self.runs
            .list_by_tenant(tenant_id, status, limit, offset.unwrap_or(0))
            .await
    }

    /// Keyset-paginated results of a run ordered by `(created_at, id)`.
    pub async fn list_results(
        &self,
        tenant_id: Uuid,
        run_id: Uuid,
        cursor: Option<&str>,
        limit: Option<u64>,
    ) -> EngineResult<ResultPage> {
        let limit = limit.unwrap_or(DEFAULT_RESULTS_LIMIT);
        if !(1..=MAX_RESULTS_LIMIT).contains(&limit) {
            return Err(AttributionError::invalid(format!(
                "limit must be between 1 and {MAX_RESULTS_LIMIT}"
            )));
        }
        let after = cursor.map(decode_cursor).transpose()?;
        let run = self.get_run(tenant_id, run_id).await?;

        let (results, has_more) = self.results.page(run.id, after, limit).await?;
        let next_cursor = if has_more {
            results
                .last()
                .map(|last| encode_cursor(&last.created_at.with_timezone(&Utc), &last.id))
        } else {
            None
        };

        Ok(ResultPage {
            results,
            next_cursor,
        })
    }

    /// Revenue attributed by a run grouped by agent, team, vendor, and channel.
    pub async fn run_summary(&self, tenant_id: Uuid, run_id: Uuid) -> EngineResult<RunSummary> {
        let run = self.get_run(tenant_id, run_id).await?;
        let status = run
            .status
            .parse::<RunStatus>()
            .map_err(AttributionError::Internal)?;
        let results = self.results.all_for_run(run.id).await?;
        Ok(summarize(run.id, status, &results))
    }

    pub async fn list_models(&self) -> EngineResult<Vec<attribution_model::Model>> {
        self.references.list_models().await
    }
}

fn record_joined(
    outcome: &mut RunOutcome,
    in_flight: &mut HashMap<tokio::task::Id, Uuid>,
    joined: Result<(tokio::task::Id, EngineResult<ConversionOutcome>), tokio::task::JoinError>,
) {
    match joined {
        Ok((task_id, Ok(conversion_outcome))) => {
            in_flight.remove(&task_id);
            outcome.record(conversion_outcome);
        }
        Ok((task_id, Err(err))) => {
            let conversion_id = in_flight.remove(&task_id).unwrap_or_default();
            warn!(conversion_event_id = %conversion_id, error = %err, "Conversion attribution failed");
            counter!("attribution_conversions_failed_total").increment(1);
            outcome.record_failure(conversion_id, err.to_string());
        }
        Err(join_err) => {
            let conversion_id = in_flight.remove(&join_err.id()).unwrap_or_default();
            error!(conversion_event_id = %conversion_id, error = ?join_err, "Conversion task panicked");
            counter!("attribution_conversions_failed_total").increment(1);
            outcome.record_failure(conversion_id, "conversion task aborted");
        }
    }
}

/// Groups result rows; buckets are ordered by amount descending, then key.
pub fn summarize(
    run_id: Uuid,
    status: RunStatus,
    results: &[attribution_result::Model],
) -> RunSummary {
    fn group(
        results: &[attribution_result::Model],
        key: impl Fn(&attribution_result::Model) -> Option<Uuid>,
    ) -> Vec<SummaryBucket> {
        let mut buckets: HashMap<Option<Uuid>, SummaryBucket> = HashMap::new();
        for row in results {
            let id = key(row);
            let bucket = buckets.entry(id).or_insert(SummaryBucket {
                id,
                attributed_amount: 0.0,
                touchpoints: 0,
                primary_touches: 0,
            });
            bucket.attributed_amount += row.attributed_amount;
            bucket.touchpoints += 1;
            if row.is_primary_touch {
                bucket.primary_touches += 1;
            }
        }
        let mut buckets: Vec<SummaryBucket> = buckets.into_values().collect();
        buckets.sort_by(|a, b| {
            b.attributed_amount
                .total_cmp(&a.attributed_amount)
                .then_with(|| a.id.cmp(&b.id))
        });
        buckets
    }

    let mut conversions: Vec<Uuid> = results.iter().map(|row| row.conversion_event_id).collect();
    conversions.sort_unstable();
    conversions.dedup();

    RunSummary {
        run_id,
        status,
        total_attributed: results.iter().map(|row| row.attributed_amount).sum(),
        conversions: conversions.len() as u32,
        results: results.len() as u32,
        by_agent: group(results, |row| row.agent_id),
        by_team: group(results, |row| row.team_id),
        by_vendor: group(results, |row| row.vendor_id),
        by_channel: group(results, |row| row.channel_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(
        conversion: Uuid,
        agent: Option<Uuid>,
        channel: Uuid,
        amount: f64,
        primary: bool,
    ) -> attribution_result::Model {
        attribution_result::Model {
            id: Uuid::new_v4(),
            tenant_id: Uuid::nil(),
            attribution_run_id: Uuid::nil(),
            conversion_event_id: conversion,
            interaction_id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            agent_id: agent,
            team_id: None,
            vendor_id: None,
            channel_id: Some(channel),
            model_id: Uuid::nil(),
            attribution_weight: 0.5,
            attributed_amount: amount,
            is_primary_touch: primary,
            created_at: Utc::now().fixed_offset(),
        }
    }

    #[test]
    fn summary_groups_and_orders_by_amount() {
        let conversion = Uuid::new_v4();
        let agent = Uuid::new_v4();
        let call = Uuid::new_v4();
        let chat = Uuid::new_v4();
        let rows = vec![
            row(conversion, Some(agent), call, 60.0, true),
            row(conversion, None, chat, 40.0, false),
            row(Uuid::new_v4(), Some(agent), call, 10.0, false),
        ];

        let summary = summarize(Uuid::nil(), RunStatus::Completed, &rows);

        assert!((summary.total_attributed - 110.0).abs() < 1e-9);
        assert_eq!(summary.conversions, 2);
        assert_eq!(summary.results, 3);
        assert_eq!(summary.by_agent.len(), 2);
        assert_eq!(summary.by_agent[0].id, Some(agent));
        assert!((summary.by_agent[0].attributed_amount - 70.0).abs() < 1e-9);
        assert_eq!(summary.by_agent[0].primary_touches, 1);
        assert_eq!(summary.by_agent[1].id, None);
        assert_eq!(summary.by_channel[0].id, Some(call));
        assert_eq!(summary.by_team.len(), 1);
        assert_eq!(summary.by_team[0].touchpoints, 3);
    }

    #[test]
    fn empty_run_summarises_to_zero() {
        let summary = summarize(Uuid::nil(), RunStatus::Completed, &[]);
        assert_eq!(summary.total_attributed, 0.0);
        assert!(summary.by_agent.is_empty());
        assert_eq!(summary.conversions, 0);
    }
}
