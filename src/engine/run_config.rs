//! Versioned configuration stored on every attribution run.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;

use crate::error::{AttributionError, EngineResult};

pub const RUN_CONFIG_VERSION: u32 = 1;
pub const MAX_WINDOW_HOURS: u32 = 8760;

/// Validated run configuration as persisted in `attribution_runs.config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RunConfig {
    pub version: u32,
    /// Hours before a conversion that count toward its journey
    pub time_window_hours: u32,
    /// Channel names a journey may include; empty means all channels
    pub include_channels: Vec<String>,
    /// Conversion event types to attribute; empty means all types
    pub event_types: Vec<String>,
    /// Conversions below this amount are skipped
    pub min_purchase_amount: f64,
}

/// Run configuration as supplied by a caller or read back from storage; absent fields
/// take defaults.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct RunConfigInput {
    #[serde(default)]
    pub version: Option<u32>,
    #[serde(default)]
    pub time_window_hours: Option<u32>,
    #[serde(default)]
    pub include_channels: Option<Vec<String>>,
    #[serde(default)]
    pub event_types: Option<Vec<String>>,
    #[serde(default)]
    pub min_purchase_amount: Option<f64>,
}

impl RunConfigInput {
    /// Applies defaults and validates everything that does not need the database.
    pub fn resolve(self, default_window_hours: u32) -> EngineResult<RunConfig> {
        let version = self.version.unwrap_or(RUN_CONFIG_VERSION);
        if version != RUN_CONFIG_VERSION {
            return Err(AttributionError::invalid(format!(
                "unsupported run config version {version}"
            )));
        }

        let time_window_hours = self.time_window_hours.unwrap_or(default_window_hours);
        if !(1..=MAX_WINDOW_HOURS).contains(&time_window_hours) {
            return Err(AttributionError::invalid(format!(
                "time_window_hours must be between 1 and {MAX_WINDOW_HOURS}, got {time_window_hours}"
            )));
        }

        let min_purchase_amount = self.min_purchase_amount.unwrap_or(0.0);
        if !min_purchase_amount.is_finite() || min_purchase_amount < 0.0 {
            return Err(AttributionError::invalid(
                "min_purchase_amount must be a finite, non-negative number",
            ));
        }

        let include_channels = normalize_list(self.include_channels, "include_channels", true)?;
        let event_types = normalize_list(self.event_types, "event_types", false)?;

        Ok(RunConfig {
            version,
            time_window_hours,
            include_channels,
            event_types,
            min_purchase_amount,
        })
    }
}

fn normalize_list(
    values: Option<Vec<String>>,
    field: &str,
    lowercase: bool,
) -> EngineResult<Vec<String>> {
    let mut normalized: Vec<String> = Vec::new();
    for value in values.unwrap_or_default() {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(AttributionError::invalid(format!(
                "{field} must not contain blank entries"
            )));
        }
        let entry = if lowercase {
            trimmed.to_lowercase()
        } else {
            trimmed.to_string()
        };
        if !normalized.contains(&entry) {
            normalized.push(entry);
        }
    }
    Ok(normalized)
}

impl RunConfig {
    /// Parses the JSON stored on a run row.
    pub fn from_stored(value: &JsonValue, default_window_hours: u32) -> EngineResult<Self> {
        let input: RunConfigInput = serde_json::from_value(value.clone()).map_err(|err| {
            AttributionError::invalid(format!("stored run config is unreadable: {err}"))
        })?;
        input.resolve(default_window_hours)
    }

    pub fn to_json(&self) -> EngineResult<JsonValue> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.time_window_hours))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_applied() {
        let config = RunConfigInput::default().resolve(72).unwrap();
        assert_eq!(config.version, 1);
        assert_eq!(config.time_window_hours, 72);
        assert!(config.include_channels.is_empty());
        assert!(config.event_types.is_empty());
        assert_eq!(config.min_purchase_amount, 0.0);
    }

    #[test]
    fn test_default_window_comes_from_caller() {
        let config = RunConfigInput::default().resolve(24).unwrap();
        assert_eq!(config.time_window_hours, 24);
        assert_eq!(config.window(), chrono::Duration::hours(24));
    }

    #[test]
    fn test_window_bounds() {
        for hours in [0, MAX_WINDOW_HOURS + 1] {
            let input = RunConfigInput {
                time_window_hours: Some(hours),
                ..Default::default()
            };
            assert!(matches!(
                input.resolve(72),
                Err(AttributionError::InvalidInput(_))
            ));
        }

        let max = RunConfigInput {
            time_window_hours: Some(MAX_WINDOW_HOURS),
            ..Default::default()
        };
        assert!(max.resolve(72).is_ok());
    }

    #[test]
    fn test_negative_or_nan_min_amount_rejected() {
        for amount in [-1.0, f64::NAN, f64::INFINITY] {
            let input = RunConfigInput {
                min_purchase_amount: Some(amount),
                ..Default::default()
            };
            assert!(input.resolve(72).is_err());
        }
    }

    #[test]
    fn test_unknown_version_rejected() {
        let input = RunConfigInput {
            version: Some(2),
            ..Default::default()
        };
        assert!(input.resolve(72).is_err());
    }

    #[test]
    fn test_lists_are_trimmed_and_deduplicated() {
        let input = RunConfigInput {
            include_channels: Some(vec![" Call ".into(), "call".into(), "chat".into()]),
            event_types: Some(vec!["purchase".into(), "purchase".into(), "renewal".into()]),
            ..Default::default()
        };
        let config = input.resolve(72).unwrap();
        assert_eq!(config.include_channels, vec!["call", "chat"]);
        assert_eq!(config.event_types, vec!["purchase", "renewal"]);
    }

    #[test]
    fn test_blank_list_entry_rejected() {
        let input = RunConfigInput {
            event_types: Some(vec!["  ".into()]),
            ..Default::default()
        };
        assert!(input.resolve(72).is_err());
    }

    #[test]
    fn test_stored_config_round_trips() {
        let stored = json!({
            "version": 1,
            "time_window_hours": 48,
            "include_channels": ["call"],
            "event_types": ["purchase"],
            "min_purchase_amount": 10.0
        });
        let config = RunConfig::from_stored(&stored, 72).unwrap();
        assert_eq!(config.time_window_hours, 48);
        assert_eq!(config.to_json().unwrap(), stored);
    }

    #[test]
    fn test_stored_config_with_missing_fields_uses_defaults() {
        let config = RunConfig::from_stored(&json!({ "event_types": ["purchase"] }), 72).unwrap();
        assert_eq!(config.time_window_hours, 72);
        assert_eq!(config.event_types, vec!["purchase"]);
    }

    #[test]
    fn test_unreadable_stored_config() {
        let result = RunConfig::from_stored(&json!({ "time_window_hours": "soon" }), 72);
        assert!(matches!(result, Err(AttributionError::InvalidInput(_))));
    }
}
