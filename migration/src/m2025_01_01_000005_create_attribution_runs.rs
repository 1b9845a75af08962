//! Migration to create the attribution_runs and attribution_results tables.
//!
//! Runs carry the per-execution outcome counters alongside their lifecycle status.
//! Results are unique per `(attribution_run_id, conversion_event_id, interaction_id)` so
//! re-executing a run can never double-insert credit for the same touchpoint.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AttributionRuns::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AttributionRuns::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(AttributionRuns::TenantId).uuid().not_null())
                    .col(ColumnDef::new(AttributionRuns::ModelId).uuid().not_null())
                    .col(ColumnDef::new(AttributionRuns::Name).text().not_null())
                    .col(ColumnDef::new(AttributionRuns::Description).text().null())
                    .col(ColumnDef::new(AttributionRuns::Config).json_binary().not_null())
                    .col(
                        ColumnDef::new(AttributionRuns::Status)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(AttributionRuns::StartedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(AttributionRuns::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(AttributionRuns::ConversionsTotal)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(AttributionRuns::ConversionsAttributed)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(AttributionRuns::ConversionsWithoutJourney)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(AttributionRuns::ConversionsFailed)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(AttributionRuns::ResultsWritten)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(AttributionRuns::ErrorSummary)
                            .json_binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(AttributionRuns::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(AttributionRuns::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_attribution_runs_model_id")
                            .from(AttributionRuns::Table, AttributionRuns::ModelId)
                            .to(AttributionModels::Table, AttributionModels::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_attribution_runs_tenant_status")
                    .table(AttributionRuns::Table)
                    .col(AttributionRuns::TenantId)
                    .col(AttributionRuns::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AttributionResults::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AttributionResults::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(AttributionResults::TenantId).uuid().not_null())
                    .col(
                        ColumnDef::new(AttributionResults::AttributionRunId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AttributionResults::ConversionEventId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AttributionResults::InteractionId)
                            .uuid()
                            .not_null(),
                    )
                    .col(ColumnDef::new(AttributionResults::CustomerId).uuid().not_null())
                    .col(ColumnDef::new(AttributionResults::AgentId).uuid().null())
                    .col(ColumnDef::new(AttributionResults::TeamId).uuid().null())
                    .col(ColumnDef::new(AttributionResults::VendorId).uuid().null())
                    .col(ColumnDef::new(AttributionResults::ChannelId).uuid().null())
                    .col(ColumnDef::new(AttributionResults::ModelId).uuid().not_null())
                    .col(
                        ColumnDef::new(AttributionResults::AttributionWeight)
                            .double()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AttributionResults::AttributedAmount)
                            .double()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AttributionResults::IsPrimaryTouch)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(AttributionResults::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_attribution_results_run_id")
                            .from(AttributionResults::Table, AttributionResults::AttributionRunId)
                            .to(AttributionRuns::Table, AttributionRuns::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_attribution_results_conversion_event_id")
                            .from(
                                AttributionResults::Table,
                                AttributionResults::ConversionEventId,
                            )
                            .to(ConversionEvents::Table, ConversionEvents::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_attribution_results_interaction_id")
                            .from(AttributionResults::Table, AttributionResults::InteractionId)
                            .to(Interactions::Table, Interactions::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_attribution_results_run_conversion_interaction")
                    .table(AttributionResults::Table)
                    .col(AttributionResults::AttributionRunId)
                    .col(AttributionResults::ConversionEventId)
                    .col(AttributionResults::InteractionId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_attribution_results_run_created_at")
                    .table(AttributionResults::Table)
                    .col(AttributionResults::AttributionRunId)
                    .col(AttributionResults::CreatedAt)
                    .col(AttributionResults::Id)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AttributionResults::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AttributionRuns::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum AttributionRuns {
    Table,
    Id,
    TenantId,
    ModelId,
    Name,
    Description,
    Config,
    Status,
    StartedAt,
    CompletedAt,
    ConversionsTotal,
    ConversionsAttributed,
    ConversionsWithoutJourney,
    ConversionsFailed,
    ResultsWritten,
    ErrorSummary,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum AttributionResults {
    Table,
    Id,
    TenantId,
    AttributionRunId,
    ConversionEventId,
    InteractionId,
    CustomerId,
    AgentId,
    TeamId,
    VendorId,
    ChannelId,
    ModelId,
    AttributionWeight,
    AttributedAmount,
    IsPrimaryTouch,
    CreatedAt,
}

#[derive(DeriveIden)]
enum AttributionModels {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum ConversionEvents {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Interactions {
    Table,
    Id,
}
