//! # Server Configuration
//!
//! Router, shared state, and OpenAPI document for the Attribution Engine API.

use std::future::Future;
use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, patch, post},
};
use sea_orm::DatabaseConnection;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::auth_middleware;
use crate::config::AppConfig;
use crate::engine::RunController;
use crate::handlers;
use crate::identity::IdentityStore;
use crate::ingestion::IngestionService;
use crate::repositories::ReferenceDataRepository;
use crate::run_dispatcher::RunDispatcher;
use crate::telemetry::trace_context_middleware;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<AppConfig>,
    pub references: ReferenceDataRepository,
    pub identity: IdentityStore,
    pub ingestion: IngestionService,
    pub runs: Arc<RunController>,
    pub dispatcher: Arc<RunDispatcher>,
}

impl AppState {
    /// Wires the services over one connection pool.
    pub fn new(db: DatabaseConnection, config: Arc<AppConfig>) -> Self {
        let references = ReferenceDataRepository::new(db.clone());
        let identity = IdentityStore::new(db.clone(), references.clone());
        let ingestion = IngestionService::new(db.clone(), identity.clone(), references.clone());
        let runs = Arc::new(RunController::new(
            db.clone(),
            references.clone(),
            config.run_executor.clone(),
        ));
        let dispatcher = Arc::new(RunDispatcher::new(Arc::clone(&runs), &config.run_executor));

        Self {
            db,
            config,
            references,
            identity,
            ingestion,
            runs,
            dispatcher,
        }
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let api = Router::new()
        .route("/interactions", post(handlers::interactions::ingest_interaction))
        .route(
            "/interactions/{external_interaction_id}",
            patch(handlers::interactions::update_interaction),
        )
        .route("/conversions", post(handlers::conversions::ingest_conversion))
        .route("/webhooks/calls", post(handlers::webhooks::call_event))
        .route(
            "/customers/{customer_id}/journey",
            get(handlers::customers::customer_journey),
        )
        .route("/attribution/models", get(handlers::models::list_models))
        .route(
            "/attribution/runs",
            post(handlers::runs::create_run).get(handlers::runs::list_runs),
        )
        .route("/attribution/runs/{run_id}", get(handlers::runs::get_run))
        .route(
            "/attribution/runs/{run_id}/execute",
            post(handlers::runs::execute_run),
        )
        .route(
            "/attribution/runs/{run_id}/results",
            get(handlers::runs::list_results),
        )
        .route(
            "/attribution/runs/{run_id}/summary",
            get(handlers::runs::run_summary),
        )
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state.config),
            auth_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .nest("/api/v1", api)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_context_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// Serves the API until `shutdown` resolves, then stops running attribution runs.
pub async fn run_server<F>(state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = state.config.bind_addr()?;
    let dispatcher = Arc::clone(&state.dispatcher);
    let cancel_runs = dispatcher.shutdown_token();
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            tracing::info!("Shutdown signal received");
            cancel_runs.cancel();
        })
        .await?;

    dispatcher.shutdown().await;
    Ok(())
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .description(Some("Operator token"))
                    .build(),
            ),
        );
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::readyz,
        crate::handlers::interactions::ingest_interaction,
        crate::handlers::interactions::update_interaction,
        crate::handlers::conversions::ingest_conversion,
        crate::handlers::webhooks::call_event,
        crate::handlers::customers::customer_journey,
        crate::handlers::models::list_models,
        crate::handlers::runs::create_run,
        crate::handlers::runs::list_runs,
        crate::handlers::runs::get_run,
        crate::handlers::runs::execute_run,
        crate::handlers::runs::list_results,
        crate::handlers::runs::run_summary,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::error::ApiError,
            crate::handlers::types::HealthResponse,
            crate::identity::IdentifierInput,
            crate::identity::CustomerJourney,
            crate::ingestion::IngestInteractionRequest,
            crate::ingestion::IngestInteractionResponse,
            crate::ingestion::UpdateInteractionRequest,
            crate::ingestion::InteractionView,
            crate::ingestion::IngestConversionRequest,
            crate::ingestion::IngestConversionResponse,
            crate::ingestion::CallEvent,
            crate::ingestion::CallEventResponse,
            crate::engine::CreateRunRequest,
            crate::engine::RunConfigInput,
            crate::engine::RunConfig,
            crate::engine::RunStatus,
            crate::engine::RunSummary,
            crate::engine::ErrorSummaryEntry,
            crate::engine::SummaryBucket,
            crate::engine::AttributionModelCode,
            crate::handlers::models::ModelInfo,
            crate::handlers::models::ModelsResponse,
            crate::handlers::runs::RunView,
            crate::handlers::runs::AttributionResultView,
            crate::handlers::runs::ScheduledRunResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "ingestion", description = "Interaction and conversion ingestion"),
        (name = "webhooks", description = "Telephony call events"),
        (name = "customers", description = "Customer identity and journeys"),
        (name = "attribution", description = "Attribution models, runs, and results"),
    ),
    info(
        title = "Attribution Engine API",
        description = "Multi-touch revenue attribution over customer interactions",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
