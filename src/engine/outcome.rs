//! Run lifecycle status and the per-execution outcome accumulator.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use utoipa::ToSchema;
use uuid::Uuid;

/// Maximum number of failures kept in a run's error summary.
pub const MAX_ERROR_SUMMARIES: usize = 20;

/// Summary message recorded when a run stops early on shutdown.
pub const CANCELLED_MESSAGE: &str = "cancelled";

/// Lifecycle of an attribution run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(RunStatus::Pending),
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            other => Err(format!("unknown run status '{other}'")),
        }
    }
}

/// One entry in a run's error summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorSummaryEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversion_event_id: Option<Uuid>,
    pub message: String,
}

/// What happened to a single conversion during execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionOutcome {
    /// Journey found; this many result rows were written
    Attributed { results_written: usize },
    /// No interaction fell inside the window
    NoJourney,
}

/// Counts accumulated while executing a run; persisted on the run row when it finishes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RunOutcome {
    pub conversions_total: u32,
    pub conversions_attributed: u32,
    pub conversions_without_journey: u32,
    pub conversions_failed: u32,
    pub results_written: u32,
    pub errors: Vec<ErrorSummaryEntry>,
    pub cancelled: bool,
}

impl RunOutcome {
    pub fn with_total(conversions_total: usize) -> Self {
        Self {
            conversions_total: saturating_u32(conversions_total),
            ..Self::default()
        }
    }

    pub fn record(&mut self, outcome: ConversionOutcome) {
        match outcome {
            ConversionOutcome::Attributed { results_written } => {
                self.conversions_attributed += 1;
                self.results_written = self
                    .results_written
                    .saturating_add(saturating_u32(results_written));
            }
            ConversionOutcome::NoJourney => self.conversions_without_journey += 1,
        }
    }

    pub fn record_failure(&mut self, conversion_event_id: Uuid, message: impl Into<String>) {
        self.conversions_failed += 1;
        self.push_error(Some(conversion_event_id), message.into());
    }

    pub fn mark_cancelled(&mut self) {
        self.cancelled = true;
        // Always keep the cancellation marker, even when the summary is full.
        if self.errors.len() >= MAX_ERROR_SUMMARIES {
            self.errors.truncate(MAX_ERROR_SUMMARIES - 1);
        }
        self.errors.push(ErrorSummaryEntry {
            conversion_event_id: None,
            message: CANCELLED_MESSAGE.to_string(),
        });
    }

    fn push_error(&mut self, conversion_event_id: Option<Uuid>, message: String) {
        if self.errors.len() < MAX_ERROR_SUMMARIES {
            self.errors.push(ErrorSummaryEntry {
                conversion_event_id,
                message,
            });
        }
    }

    /// Conversions that were picked up but never finished because the run was cancelled.
    pub fn conversions_skipped(&self) -> u32 {
        self.conversions_total.saturating_sub(
            self.conversions_attributed + self.conversions_without_journey + self.conversions_failed,
        )
    }

    pub fn final_status(&self) -> RunStatus {
        if self.cancelled {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        }
    }

    pub fn error_summary(&self) -> Option<JsonValue> {
        if self.errors.is_empty() {
            None
        } else {
            Some(json!(self.errors))
        }
    }
}

/// Error summary for a run that failed before processing any conversion.
pub fn fatal_error_summary(message: impl Into<String>) -> JsonValue {
    json!([ErrorSummaryEntry {
        conversion_event_id: None,
        message: message.into(),
    }])
}

fn saturating_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            RunStatus::Pending,
            RunStatus::Running,
            RunStatus::Completed,
            RunStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<RunStatus>(), Ok(status));
        }
        assert!("paused".parse::<RunStatus>().is_err());
    }

    #[test]
    fn test_outcome_counts() {
        let mut outcome = RunOutcome::with_total(4);
        outcome.record(ConversionOutcome::Attributed { results_written: 3 });
        outcome.record(ConversionOutcome::Attributed { results_written: 1 });
        outcome.record(ConversionOutcome::NoJourney);
        outcome.record_failure(Uuid::new_v4(), "boom");

        assert_eq!(outcome.conversions_attributed, 2);
        assert_eq!(outcome.conversions_without_journey, 1);
        assert_eq!(outcome.conversions_failed, 1);
        assert_eq!(outcome.results_written, 4);
        assert_eq!(outcome.conversions_skipped(), 0);
        assert_eq!(outcome.final_status(), RunStatus::Completed);
        assert_eq!(outcome.errors.len(), 1);
    }

    #[test]
    fn test_error_summary_is_capped() {
        let mut outcome = RunOutcome::with_total(50);
        for _ in 0..50 {
            outcome.record_failure(Uuid::new_v4(), "failed");
        }
        assert_eq!(outcome.conversions_failed, 50);
        assert_eq!(outcome.errors.len(), MAX_ERROR_SUMMARIES);
    }

    #[test]
    fn test_cancelled_run_fails_and_keeps_marker() {
        let mut outcome = RunOutcome::with_total(30);
        for _ in 0..25 {
            outcome.record_failure(Uuid::new_v4(), "failed");
        }
        outcome.mark_cancelled();

        assert_eq!(outcome.final_status(), RunStatus::Failed);
        assert_eq!(outcome.errors.len(), MAX_ERROR_SUMMARIES);
        assert_eq!(
            outcome.errors.last().map(|e| e.message.as_str()),
            Some(CANCELLED_MESSAGE)
        );
        assert_eq!(outcome.conversions_skipped(), 5);
    }

    #[test]
    fn test_error_summary_absent_when_clean() {
        let mut outcome = RunOutcome::with_total(1);
        outcome.record(ConversionOutcome::NoJourney);
        assert!(outcome.error_summary().is_none());
    }
}
