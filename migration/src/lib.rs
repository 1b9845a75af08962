//! Database migrations for the Attribution Engine.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_01_01_000001_create_reference_data;
mod m2025_01_01_000002_create_customers;
mod m2025_01_01_000003_create_interactions;
mod m2025_01_01_000004_create_conversion_events;
mod m2025_01_01_000005_create_attribution_runs;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_01_01_000001_create_reference_data::Migration),
            Box::new(m2025_01_01_000002_create_customers::Migration),
            Box::new(m2025_01_01_000003_create_interactions::Migration),
            Box::new(m2025_01_01_000004_create_conversion_events::Migration),
            Box::new(m2025_01_01_000005_create_attribution_runs::Migration),
        ]
    }
}
