//! Migration to create the customers and customer_identifiers tables.
//!
//! The unique index on `(tenant_id, type, value)` is what lets identity resolution
//! insert identifiers with "do nothing on conflict" semantics.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Customers::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Customers::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Customers::TenantId).uuid().not_null())
                    .col(
                        ColumnDef::new(Customers::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Customers::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_customers_tenant_id")
                    .table(Customers::Table)
                    .col(Customers::TenantId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CustomerIdentifiers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CustomerIdentifiers::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(CustomerIdentifiers::TenantId).uuid().not_null())
                    .col(
                        ColumnDef::new(CustomerIdentifiers::CustomerId)
                            .uuid()
                            .not_null(),
                    )
                    .col(ColumnDef::new(CustomerIdentifiers::Type).text().not_null())
                    .col(ColumnDef::new(CustomerIdentifiers::Value).text().not_null())
                    .col(ColumnDef::new(CustomerIdentifiers::SourceSystem).text().null())
                    .col(
                        ColumnDef::new(CustomerIdentifiers::IsPrimary)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(CustomerIdentifiers::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_customer_identifiers_customer_id")
                            .from(CustomerIdentifiers::Table, CustomerIdentifiers::CustomerId)
                            .to(Customers::Table, Customers::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_customer_identifiers_tenant_type_value")
                    .table(CustomerIdentifiers::Table)
                    .col(CustomerIdentifiers::TenantId)
                    .col(CustomerIdentifiers::Type)
                    .col(CustomerIdentifiers::Value)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_customer_identifiers_customer_id")
                    .table(CustomerIdentifiers::Table)
                    .col(CustomerIdentifiers::CustomerId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CustomerIdentifiers::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Customers::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Customers {
    Table,
    Id,
    TenantId,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum CustomerIdentifiers {
    Table,
    Id,
    TenantId,
    CustomerId,
    Type,
    Value,
    SourceSystem,
    IsPrimary,
    CreatedAt,
}
