//! Migration to create the interactions and interaction_participants tables.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Interactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Interactions::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Interactions::TenantId).uuid().not_null())
                    .col(ColumnDef::new(Interactions::CustomerId).uuid().null())
                    .col(
                        ColumnDef::new(Interactions::ExternalInteractionId)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Interactions::ChannelId).uuid().not_null())
                    .col(ColumnDef::new(Interactions::VendorId).uuid().null())
                    .col(
                        ColumnDef::new(Interactions::StartedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Interactions::EndedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Interactions::DurationSeconds).integer().null())
                    .col(ColumnDef::new(Interactions::Direction).text().null())
                    .col(ColumnDef::new(Interactions::Language).text().null())
                    .col(ColumnDef::new(Interactions::TranscriptLocation).text().null())
                    .col(ColumnDef::new(Interactions::PrimaryIntent).text().null())
                    .col(
                        ColumnDef::new(Interactions::SecondaryIntents)
                            .json_binary()
                            .null(),
                    )
                    .col(ColumnDef::new(Interactions::OutcomePrediction).text().null())
                    .col(
                        ColumnDef::new(Interactions::PurchaseProbability)
                            .double()
                            .null(),
                    )
                    .col(ColumnDef::new(Interactions::RawMetadata).json_binary().null())
                    .col(
                        ColumnDef::new(Interactions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Interactions::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_interactions_customer_id")
                            .from(Interactions::Table, Interactions::CustomerId)
                            .to(Customers::Table, Customers::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_interactions_channel_id")
                            .from(Interactions::Table, Interactions::ChannelId)
                            .to(Channels::Table, Channels::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_interactions_tenant_external_id")
                    .table(Interactions::Table)
                    .col(Interactions::TenantId)
                    .col(Interactions::ExternalInteractionId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Journey lookups scan one customer's interactions by start time.
        manager
            .create_index(
                Index::create()
                    .name("idx_interactions_customer_started_at")
                    .table(Interactions::Table)
                    .col(Interactions::CustomerId)
                    .col(Interactions::StartedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(InteractionParticipants::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(InteractionParticipants::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(InteractionParticipants::InteractionId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InteractionParticipants::ParticipantType)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(InteractionParticipants::AgentId).uuid().null())
                    .col(ColumnDef::new(InteractionParticipants::Role).text().null())
                    .col(
                        ColumnDef::new(InteractionParticipants::Metadata)
                            .json_binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(InteractionParticipants::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_interaction_participants_interaction_id")
                            .from(
                                InteractionParticipants::Table,
                                InteractionParticipants::InteractionId,
                            )
                            .to(Interactions::Table, Interactions::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_interaction_participants_interaction_id")
                    .table(InteractionParticipants::Table)
                    .col(InteractionParticipants::InteractionId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(InteractionParticipants::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Interactions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Interactions {
    Table,
    Id,
    TenantId,
    CustomerId,
    ExternalInteractionId,
    ChannelId,
    VendorId,
    StartedAt,
    EndedAt,
    DurationSeconds,
    Direction,
    Language,
    TranscriptLocation,
    PrimaryIntent,
    SecondaryIntents,
    OutcomePrediction,
    PurchaseProbability,
    RawMetadata,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum InteractionParticipants {
    Table,
    Id,
    InteractionId,
    ParticipantType,
    AgentId,
    Role,
    Metadata,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Customers {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Channels {
    Table,
    Id,
}
