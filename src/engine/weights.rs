//! Weight calculation for attribution models.
//!
//! Every strategy returns `n` non-negative weights summing to 1.0 for `n >= 1`, and an
//! empty vector for `n == 0`.

use std::sync::Arc;

use super::journey::Touchpoint;
use super::registry::{AttributionModelCode, ModelRegistry};

/// Position-based weighting function stored in the model table.
pub type WeightFn = fn(usize) -> Vec<f64>;

/// Exponent applied per step of distance from the conversion.
pub const TIME_DECAY_RATE: f64 = 0.5;

pub fn first_touch(n: usize) -> Vec<f64> {
    let mut weights = vec![0.0; n];
    if let Some(first) = weights.first_mut() {
        *first = 1.0;
    }
    weights
}

pub fn last_touch(n: usize) -> Vec<f64> {
    let mut weights = vec![0.0; n];
    if let Some(last) = weights.last_mut() {
        *last = 1.0;
    }
    weights
}

pub fn linear(n: usize) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    vec![1.0 / n as f64; n]
}

/// `exp(-rate * (n - i - 1))`, normalized so the latest touch carries the most weight.
pub fn time_decay(n: usize) -> Vec<f64> {
    let raw: Vec<f64> = (0..n)
        .map(|i| (-TIME_DECAY_RATE * (n - i - 1) as f64).exp())
        .collect();
    normalize(raw)
}

fn normalize(raw: Vec<f64>) -> Vec<f64> {
    let total: f64 = raw.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        return linear(raw.len());
    }
    raw.into_iter().map(|w| w / total).collect()
}

/// Position-only weights for `model`.
pub fn compute_weights(n: usize, model: AttributionModelCode) -> Vec<f64> {
    (ModelRegistry::definition(model).weigh)(n)
}

/// Whether the touch at `index` is the one a single-touch model credits in full.
pub fn is_primary_touch(model: AttributionModelCode, index: usize, n: usize) -> bool {
    match model {
        AttributionModelCode::FirstTouch => index == 0 && n > 0,
        AttributionModelCode::LastTouch => n > 0 && index == n - 1,
        _ => false,
    }
}

/// Scores a journey for the AI_WEIGHTED model.
///
/// Implementations receive the full touchpoints so they can use signals such as
/// `purchase_probability`. The output is validated and normalized by [`WeightCalculator`].
pub trait TouchpointWeighting: Send + Sync {
    fn weigh(&self, touchpoints: &[Touchpoint]) -> Vec<f64>;
}

/// Default scorer: equal credit for every touch.
#[derive(Debug, Default, Clone, Copy)]
pub struct UniformWeighting;

impl TouchpointWeighting for UniformWeighting {
    fn weigh(&self, touchpoints: &[Touchpoint]) -> Vec<f64> {
        linear(touchpoints.len())
    }
}

/// Produces the weight vector for a journey under a given model.
#[derive(Clone)]
pub struct WeightCalculator {
    scorer: Arc<dyn TouchpointWeighting>,
}

impl Default for WeightCalculator {
    fn default() -> Self {
        Self::new(Arc::new(UniformWeighting))
    }
}

impl WeightCalculator {
    pub fn new(scorer: Arc<dyn TouchpointWeighting>) -> Self {
        Self { scorer }
    }

    pub fn weights(&self, model: AttributionModelCode, touchpoints: &[Touchpoint]) -> Vec<f64> {
        let n = touchpoints.len();
        if model != AttributionModelCode::AiWeighted {
            return compute_weights(n, model);
        }

        let scored = self.scorer.weigh(touchpoints);
        if scored.len() != n || scored.iter().any(|w| !w.is_finite() || *w < 0.0) {
            tracing::warn!(
                touchpoints = n,
                returned = scored.len(),
                "Touchpoint scorer returned unusable weights, using LINEAR"
            );
            return linear(n);
        }
        normalize(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    const EPSILON: f64 = 1e-9;

    fn assert_sums_to_one(weights: &[f64]) {
        let sum: f64 = weights.iter().sum();
        assert!((sum - 1.0).abs() < EPSILON, "weights {weights:?} sum to {sum}");
    }

    fn touchpoints(n: usize) -> Vec<Touchpoint> {
        (0..n)
            .map(|i| Touchpoint {
                interaction_id: Uuid::new_v4(),
                started_at: Utc.with_ymd_and_hms(2024, 1, 1, i as u32, 0, 0).unwrap(),
                channel_id: Uuid::new_v4(),
                agent_id: None,
                team_id: None,
                vendor_id: None,
                purchase_probability: Some(0.1 * (i + 1) as f64),
            })
            .collect()
    }

    #[test]
    fn test_every_model_sums_to_one() {
        for model in AttributionModelCode::ALL {
            for n in 1..=12 {
                let weights = compute_weights(n, model);
                assert_eq!(weights.len(), n);
                assert!(weights.iter().all(|w| *w >= 0.0));
                assert_sums_to_one(&weights);
            }
        }
    }

    #[test]
    fn test_zero_touchpoints_yield_no_weights() {
        for model in AttributionModelCode::ALL {
            assert!(compute_weights(0, model).is_empty());
        }
    }

    #[test]
    fn test_first_and_last_touch_shapes() {
        assert_eq!(compute_weights(3, AttributionModelCode::FirstTouch), vec![1.0, 0.0, 0.0]);
        assert_eq!(compute_weights(3, AttributionModelCode::LastTouch), vec![0.0, 0.0, 1.0]);
        assert_eq!(compute_weights(1, AttributionModelCode::LastTouch), vec![1.0]);
    }

    #[test]
    fn test_linear_is_uniform() {
        let weights = compute_weights(4, AttributionModelCode::Linear);
        assert!(weights.iter().all(|w| (*w - 0.25).abs() < EPSILON));
    }

    #[test]
    fn test_time_decay_strictly_increasing() {
        for n in 2..=10 {
            let weights = compute_weights(n, AttributionModelCode::TimeDecay);
            assert!(weights.windows(2).all(|pair| pair[0] < pair[1]));
        }
    }

    #[test]
    fn test_time_decay_two_touch_ratio() {
        let weights = compute_weights(2, AttributionModelCode::TimeDecay);
        let expected_ratio = (-0.5f64).exp();
        assert!((weights[0] / weights[1] - expected_ratio).abs() < EPSILON);
    }

    #[test]
    fn test_primary_touch_flags() {
        assert!(is_primary_touch(AttributionModelCode::FirstTouch, 0, 3));
        assert!(!is_primary_touch(AttributionModelCode::FirstTouch, 2, 3));
        assert!(is_primary_touch(AttributionModelCode::LastTouch, 2, 3));
        assert!(!is_primary_touch(AttributionModelCode::LastTouch, 0, 3));
        assert!(!is_primary_touch(AttributionModelCode::Linear, 0, 1));
        assert!(!is_primary_touch(AttributionModelCode::TimeDecay, 1, 2));
    }

    #[test]
    fn test_default_ai_weighting_is_linear() {
        let calculator = WeightCalculator::default();
        let weights = calculator.weights(AttributionModelCode::AiWeighted, &touchpoints(5));
        assert_eq!(weights, linear(5));
    }

    struct ProbabilityScorer;

    impl TouchpointWeighting for ProbabilityScorer {
        fn weigh(&self, touchpoints: &[Touchpoint]) -> Vec<f64> {
            touchpoints
                .iter()
                .map(|tp| tp.purchase_probability.unwrap_or(0.0))
                .collect()
        }
    }

    #[test]
    fn test_custom_scorer_is_normalized() {
        let calculator = WeightCalculator::new(Arc::new(ProbabilityScorer));
        let weights = calculator.weights(AttributionModelCode::AiWeighted, &touchpoints(3));
        assert_sums_to_one(&weights);
        assert!((weights[2] - 0.5).abs() < EPSILON);
    }

    struct BrokenScorer;

    impl TouchpointWeighting for BrokenScorer {
        fn weigh(&self, _touchpoints: &[Touchpoint]) -> Vec<f64> {
            vec![f64::NAN]
        }
    }

    #[test]
    fn test_broken_scorer_falls_back_to_linear() {
        let calculator = WeightCalculator::new(Arc::new(BrokenScorer));
        let weights = calculator.weights(AttributionModelCode::AiWeighted, &touchpoints(2));
        assert_eq!(weights, vec![0.5, 0.5]);
    }

    #[test]
    fn test_scorer_ignored_for_positional_models() {
        let calculator = WeightCalculator::new(Arc::new(BrokenScorer));
        let weights = calculator.weights(AttributionModelCode::FirstTouch, &touchpoints(2));
        assert_eq!(weights, vec![1.0, 0.0]);
    }
}
