//! # Data Models
//!
//! This module contains all the data models used throughout the Attribution Engine.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod agent;
pub mod attribution_model;
pub mod attribution_result;
pub mod attribution_run;
pub mod channel;
pub mod conversion_event;
pub mod currency;
pub mod customer;
pub mod customer_identifier;
pub mod event_source;
pub mod interaction;
pub mod interaction_participant;
pub mod product;
pub mod team;
pub mod vendor;

pub use agent::Entity as Agent;
pub use attribution_model::Entity as AttributionModel;
pub use attribution_result::Entity as AttributionResult;
pub use attribution_run::Entity as AttributionRun;
pub use channel::Entity as Channel;
pub use conversion_event::Entity as ConversionEvent;
pub use currency::Entity as Currency;
pub use customer::Entity as Customer;
pub use customer_identifier::Entity as CustomerIdentifier;
pub use event_source::Entity as EventSource;
pub use interaction::Entity as Interaction;
pub use interaction_participant::Entity as InteractionParticipant;
pub use product::Entity as Product;
pub use team::Entity as Team;
pub use vendor::Entity as Vendor;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "attribution-engine".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
