use anyhow::{Context, Result};
use attribution_engine::{
    config::ConfigLoader, db, engine::RunController, repositories::ReferenceDataRepository,
    seeds, telemetry::init_tracing,
};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Executes one attribution run synchronously and prints its outcome as JSON.
#[derive(Debug, Parser)]
#[command(name = "execute-run", version)]
struct Args {
    /// Tenant that owns the run
    #[arg(long)]
    tenant_id: Uuid,

    /// Run to execute
    #[arg(long)]
    run_id: Uuid,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let loader = ConfigLoader::new();
    let config = loader.load().context("loading configuration")?;
    init_tracing(&config).context("initializing tracing")?;

    let db = db::init_pool(&config)
        .await
        .context("initializing database connection pool")?;
    db::run_migrations(&db).await?;
    seeds::seed_reference_data(&db)
        .await
        .context("seeding reference data")?;

    let controller = RunController::new(
        db.clone(),
        ReferenceDataRepository::new(db),
        config.run_executor.clone(),
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let outcome = controller
        .execute_run(args.tenant_id, args.run_id, cancel)
        .await
        .with_context(|| format!("executing attribution run {}", args.run_id))?;

    println!(
        "{}",
        serde_json::to_string_pretty(&outcome).context("serializing run outcome")?
    );
    Ok(())
}
