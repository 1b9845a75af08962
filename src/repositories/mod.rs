//! # Repository Layer
//!
//! This module contains repository implementations that encapsulate SeaORM operations
//! for database entities, providing a clean API for data access with tenant-aware methods.

pub mod attribution_result;
pub mod attribution_run;
pub mod conversion;
pub mod customer;
pub mod interaction;
pub mod reference;

pub use attribution_result::AttributionResultRepository;
pub use attribution_run::{AttributionRunRepository, NewRun};
pub use conversion::ConversionRepository;
pub use customer::CustomerRepository;
pub use interaction::InteractionRepository;
pub use reference::ReferenceDataRepository;
