//! Database seeding functionality
//!
//! Populates the global reference tables (channels, event sources, currencies, and
//! attribution models) when the application starts. Seeding is idempotent.

pub mod reference;

pub use reference::seed_reference_data;
