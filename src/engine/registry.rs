//! Static catalog of attribution models.
//!
//! Each [`AttributionModelCode`] maps to one [`ModelDefinition`] in [`MODEL_TABLE`]; the
//! table is what gets seeded into `attribution_models` and what the weight calculator
//! dispatches on.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use utoipa::ToSchema;

use super::weights::{self, WeightFn};

/// Closed set of weighting strategies the engine knows how to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttributionModelCode {
    FirstTouch,
    LastTouch,
    Linear,
    TimeDecay,
    AiWeighted,
}

impl AttributionModelCode {
    pub const ALL: [AttributionModelCode; 5] = [
        AttributionModelCode::FirstTouch,
        AttributionModelCode::LastTouch,
        AttributionModelCode::Linear,
        AttributionModelCode::TimeDecay,
        AttributionModelCode::AiWeighted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AttributionModelCode::FirstTouch => "FIRST_TOUCH",
            AttributionModelCode::LastTouch => "LAST_TOUCH",
            AttributionModelCode::Linear => "LINEAR",
            AttributionModelCode::TimeDecay => "TIME_DECAY",
            AttributionModelCode::AiWeighted => "AI_WEIGHTED",
        }
    }

    /// Resolves a stored code to a strategy, falling back to LINEAR for unknown codes.
    pub fn resolve_or_linear(code: &str) -> Self {
        code.parse().unwrap_or_else(|_| {
            tracing::warn!(model_code = %code, "Unknown attribution model code, falling back to LINEAR");
            AttributionModelCode::Linear
        })
    }
}

impl fmt::Display for AttributionModelCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name a known model.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown attribution model code '{0}'")]
pub struct UnknownModelCode(pub String);

impl FromStr for AttributionModelCode {
    type Err = UnknownModelCode;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_uppercase();
        AttributionModelCode::ALL
            .into_iter()
            .find(|code| code.as_str() == normalized)
            .ok_or_else(|| UnknownModelCode(value.to_string()))
    }
}

/// Catalog entry for one attribution model.
#[derive(Debug, Clone, Copy)]
pub struct ModelDefinition {
    pub code: AttributionModelCode,
    pub name: &'static str,
    pub description: &'static str,
    pub weigh: WeightFn,
}

impl ModelDefinition {
    /// Parameters persisted alongside the seeded model row.
    pub fn params(&self) -> Option<JsonValue> {
        match self.code {
            AttributionModelCode::TimeDecay => Some(json!({ "decay_rate": weights::TIME_DECAY_RATE })),
            AttributionModelCode::AiWeighted => Some(json!({ "fallback": "LINEAR" })),
            _ => None,
        }
    }
}

pub static MODEL_TABLE: [ModelDefinition; 5] = [
    ModelDefinition {
        code: AttributionModelCode::FirstTouch,
        name: "First Touch",
        description: "All credit goes to the earliest interaction in the journey",
        weigh: weights::first_touch,
    },
    ModelDefinition {
        code: AttributionModelCode::LastTouch,
        name: "Last Touch",
        description: "All credit goes to the interaction closest to the conversion",
        weigh: weights::last_touch,
    },
    ModelDefinition {
        code: AttributionModelCode::Linear,
        name: "Linear",
        description: "Credit is split evenly across every interaction",
        weigh: weights::linear,
    },
    ModelDefinition {
        code: AttributionModelCode::TimeDecay,
        name: "Time Decay",
        description: "Interactions closer to the conversion receive exponentially more credit",
        weigh: weights::time_decay,
    },
    ModelDefinition {
        code: AttributionModelCode::AiWeighted,
        name: "AI Weighted",
        description: "Credit follows a pluggable touchpoint scorer; uniform until one is configured",
        weigh: weights::linear,
    },
];

/// Lookup facade over [`MODEL_TABLE`].
pub struct ModelRegistry;

impl ModelRegistry {
    pub fn list() -> &'static [ModelDefinition] {
        &MODEL_TABLE
    }

    pub fn definition(code: AttributionModelCode) -> &'static ModelDefinition {
        // MODEL_TABLE is indexed in ALL order
        &MODEL_TABLE[code as usize]
    }

    pub fn get(code: &str) -> Option<&'static ModelDefinition> {
        code.parse::<AttributionModelCode>()
            .ok()
            .map(Self::definition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_code_has_a_table_entry() {
        for code in AttributionModelCode::ALL {
            assert_eq!(ModelRegistry::definition(code).code, code);
        }
        assert_eq!(ModelRegistry::list().len(), AttributionModelCode::ALL.len());
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(
            "time_decay".parse::<AttributionModelCode>(),
            Ok(AttributionModelCode::TimeDecay)
        );
        assert_eq!(
            " FIRST_TOUCH ".parse::<AttributionModelCode>(),
            Ok(AttributionModelCode::FirstTouch)
        );
        assert!("W_SHAPED".parse::<AttributionModelCode>().is_err());
    }

    #[test]
    fn test_get_unknown_code_is_none() {
        assert!(ModelRegistry::get("U_SHAPED").is_none());
        assert_eq!(
            ModelRegistry::get("LINEAR").map(|definition| definition.name),
            Some("Linear")
        );
    }

    #[test]
    fn test_unknown_stored_code_falls_back_to_linear() {
        assert_eq!(
            AttributionModelCode::resolve_or_linear("POSITION_BASED"),
            AttributionModelCode::Linear
        );
        assert_eq!(
            AttributionModelCode::resolve_or_linear("LAST_TOUCH"),
            AttributionModelCode::LastTouch
        );
    }

    #[test]
    fn test_serde_uses_screaming_snake_case() {
        let json = serde_json::to_string(&AttributionModelCode::AiWeighted).unwrap();
        assert_eq!(json, "\"AI_WEIGHTED\"");
    }

    #[test]
    fn test_time_decay_params_carry_rate() {
        let params = ModelRegistry::definition(AttributionModelCode::TimeDecay)
            .params()
            .unwrap();
        assert_eq!(params["decay_rate"], 0.5);
        assert!(
            ModelRegistry::definition(AttributionModelCode::Linear)
                .params()
                .is_none()
        );
    }
}
