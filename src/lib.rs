//! # Attribution Engine Library
//!
//! Identity resolution, interaction and conversion ingestion, and multi-touch revenue
//! attribution, exposed over an Axum HTTP API.

pub mod auth;
pub mod config;
pub mod cursor;
pub mod db;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod ingestion;
pub mod models;
pub mod repositories;
pub mod run_dispatcher;
pub mod seeds;
pub mod server;
pub mod telemetry;
pub use migration;
