//! Reference data seeding
//!
//! Inserts the closed channel set, the known event sources and currencies, and one
//! `attribution_models` row per registry definition.

use anyhow::{Context, Result};
use sea_orm::DatabaseConnection;

use crate::engine::ModelRegistry;
use crate::repositories::ReferenceDataRepository;

const CHANNELS: &[(&str, &str)] = &[
    ("call", "Voice calls"),
    ("chat", "Live chat and messaging"),
    ("email", "Email threads"),
    ("sms", "SMS conversations"),
    ("ad_click", "Paid advertising clicks"),
    ("web", "Website sessions"),
];

const EVENT_SOURCES: &[(&str, &str, &str)] = &[
    ("crm", "crm", "CRM opportunity and deal events"),
    ("billing", "billing", "Subscription and invoice events"),
    ("ecommerce", "ecommerce", "Storefront order events"),
];

const CURRENCIES: &[(&str, &str)] = &[
    ("USD", "US Dollar"),
    ("EUR", "Euro"),
    ("GBP", "Pound Sterling"),
    ("INR", "Indian Rupee"),
];

/// Seeds every global reference table.
///
/// Rows that already exist are left untouched, so this runs on every startup.
pub async fn seed_reference_data(db: &DatabaseConnection) -> Result<()> {
    let repo = ReferenceDataRepository::new(db.clone());
    let mut created = 0usize;

    for (name, description) in CHANNELS {
        if repo
            .ensure_channel(name, description)
            .await
            .with_context(|| format!("seeding channel '{}'", name))?
        {
            log::info!("Created channel: {}", name);
            created += 1;
        }
    }

    for (name, source_type, description) in EVENT_SOURCES {
        if repo
            .ensure_event_source(name, source_type, description)
            .await
            .with_context(|| format!("seeding event source '{}'", name))?
        {
            log::info!("Created event source: {}", name);
            created += 1;
        }
    }

    for (code, name) in CURRENCIES {
        if repo
            .ensure_currency(code, name)
            .await
            .with_context(|| format!("seeding currency '{}'", code))?
        {
            log::info!("Created currency: {}", code);
            created += 1;
        }
    }

    for definition in ModelRegistry::list() {
        if repo
            .ensure_model(definition)
            .await
            .with_context(|| format!("seeding attribution model '{}'", definition.code.as_str()))?
        {
            log::info!("Created attribution model: {}", definition.code.as_str());
            created += 1;
        }
    }

    log::info!("Reference data seeding completed ({} rows created)", created);
    Ok(())
}
