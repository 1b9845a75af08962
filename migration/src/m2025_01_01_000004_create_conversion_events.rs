//! Migration to create the conversion_events table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ConversionEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ConversionEvents::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ConversionEvents::TenantId).uuid().not_null())
                    .col(ColumnDef::new(ConversionEvents::CustomerId).uuid().not_null())
                    .col(
                        ColumnDef::new(ConversionEvents::EventSourceId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ConversionEvents::ExternalEventId)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ConversionEvents::EventType).text().not_null())
                    .col(ColumnDef::new(ConversionEvents::ProductId).uuid().null())
                    .col(ColumnDef::new(ConversionEvents::CurrencyId).uuid().not_null())
                    .col(
                        ColumnDef::new(ConversionEvents::AmountDecimal)
                            .double()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ConversionEvents::OccurredAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ConversionEvents::RawPayload)
                            .json_binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ConversionEvents::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_conversion_events_customer_id")
                            .from(ConversionEvents::Table, ConversionEvents::CustomerId)
                            .to(Customers::Table, Customers::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_conversion_events_event_source_id")
                            .from(ConversionEvents::Table, ConversionEvents::EventSourceId)
                            .to(EventSources::Table, EventSources::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_conversion_events_currency_id")
                            .from(ConversionEvents::Table, ConversionEvents::CurrencyId)
                            .to(Currencies::Table, Currencies::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_conversion_events_tenant_source_external_id")
                    .table(ConversionEvents::Table)
                    .col(ConversionEvents::TenantId)
                    .col(ConversionEvents::EventSourceId)
                    .col(ConversionEvents::ExternalEventId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Run execution loads a tenant's conversions filtered by type and ordered by time.
        manager
            .create_index(
                Index::create()
                    .name("idx_conversion_events_tenant_type_occurred_at")
                    .table(ConversionEvents::Table)
                    .col(ConversionEvents::TenantId)
                    .col(ConversionEvents::EventType)
                    .col(ConversionEvents::OccurredAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_conversion_events_customer_occurred_at")
                    .table(ConversionEvents::Table)
                    .col(ConversionEvents::CustomerId)
                    .col(ConversionEvents::OccurredAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ConversionEvents::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ConversionEvents {
    Table,
    Id,
    TenantId,
    CustomerId,
    EventSourceId,
    ExternalEventId,
    EventType,
    ProductId,
    CurrencyId,
    AmountDecimal,
    OccurredAt,
    RawPayload,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Customers {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum EventSources {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Currencies {
    Table,
    Id,
}
