//! # Attribution Engine
//!
//! Model registry, weight calculation, journey building, and the run controller that
//! ties them together.

pub mod controller;
pub mod journey;
pub mod outcome;
pub mod registry;
pub mod run_config;
pub mod weights;

pub use controller::{CreateRunRequest, ResultPage, RunController, RunSummary, SummaryBucket};
pub use journey::{JourneyBuilder, Touchpoint};
pub use outcome::{ConversionOutcome, ErrorSummaryEntry, RunOutcome, RunStatus};
pub use registry::{AttributionModelCode, ModelDefinition, ModelRegistry};
pub use run_config::{RunConfig, RunConfigInput};
pub use weights::{TouchpointWeighting, UniformWeighting, WeightCalculator, compute_weights};
