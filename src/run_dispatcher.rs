//! # Run Dispatcher
//!
//! Executes attribution runs off the request path. A semaphore bounds how many runs
//! execute at once; the shared cancellation token fires on graceful shutdown so running
//! runs stop picking up conversions and finish as `failed`.

use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::RunExecutorConfig;
use crate::engine::{RunController, RunOutcome};
use crate::error::{AttributionError, EngineResult};

pub struct RunDispatcher {
    controller: Arc<RunController>,
    permits: Arc<Semaphore>,
    shutdown: CancellationToken,
    tasks: Mutex<JoinSet<()>>,
}

impl RunDispatcher {
    pub fn new(controller: Arc<RunController>, settings: &RunExecutorConfig) -> Self {
        Self {
            controller,
            permits: Arc::new(Semaphore::new(settings.max_concurrent_runs.max(1))),
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Token cancelled by [`RunDispatcher::shutdown`].
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Queues a run for background execution.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, run_id = %run_id))]
    pub async fn schedule(&self, tenant_id: Uuid, run_id: Uuid) -> EngineResult<()> {
        if self.shutdown.is_cancelled() {
            return Err(AttributionError::Conflict(
                "run dispatcher is shutting down".to_string(),
            ));
        }

        let controller = Arc::clone(&self.controller);
        let permits = Arc::clone(&self.permits);
        let shutdown = self.shutdown.clone();

        let mut tasks = self.tasks.lock().await;
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            let permit = tokio::select! {
                _ = shutdown.cancelled() => {
                    warn!(%run_id, "Shutdown before queued run started");
                    return;
                }
                permit = permits.acquire_owned() => permit,
            };
            let Ok(_permit) = permit else {
                return;
            };

            match controller.execute_run(tenant_id, run_id, shutdown).await {
                Ok(outcome) => info!(
                    %run_id,
                    status = %outcome.final_status(),
                    results_written = outcome.results_written,
                    "Background run finished"
                ),
                Err(err) => error!(%run_id, error = %err, "Background run failed"),
            }
        });
        info!("Attribution run scheduled");
        Ok(())
    }

    /// Executes a run on the caller's task, still bounded by the run semaphore.
    pub async fn execute_now(&self, tenant_id: Uuid, run_id: Uuid) -> EngineResult<RunOutcome> {
        let _permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| AttributionError::Internal("run dispatcher is closed".to_string()))?;
        self.controller
            .execute_run(tenant_id, run_id, self.shutdown.clone())
            .await
    }

    /// Cancels running runs and waits for their tasks to finish.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let mut tasks = std::mem::take(&mut *self.tasks.lock().await);
        let pending = tasks.len();
        if pending > 0 {
            info!(pending, "Waiting for attribution runs to stop");
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                error!(error = ?err, "Attribution run task panicked");
            }
        }
        info!("Run dispatcher stopped");
    }
}
