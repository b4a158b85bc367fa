use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Whether a higher metric value is good (relevancy) or bad (harmfulness).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    HigherIsBetter,
    LowerIsBetter,
}

impl Direction {
    pub fn passes(&self, value: f64, threshold: f64) -> bool {
        match self {
            Direction::HigherIsBetter => value >= threshold,
            Direction::LowerIsBetter => value <= threshold,
        }
    }
}

/// Text view of one exchange, as metrics see it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricInput {
    pub query: String,
    pub answer: String,
    pub context: Vec<String>,
    pub golden: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricResult {
    /// Always within [0, 1].
    pub score: f64,
    pub reason: Option<String>,
    pub details: serde_json::Value,
}

impl MetricResult {
    pub fn new(score: f64) -> Self {
        let score = if score.is_finite() {
            score.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            score,
            reason: None,
            details: serde_json::json!({}),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

#[async_trait]
pub trait Metric: Send + Sync {
    fn name(&self) -> &'static str;

    fn direction(&self) -> Direction {
        Direction::HigherIsBetter
    }

    /// Metrics that need data the exchange lacks (no context, no golden) are skipped.
    fn applies(&self, _input: &MetricInput) -> bool {
        true
    }

    async fn evaluate(&self, input: &MetricInput) -> anyhow::Result<MetricResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scores_are_clamped() {
        assert_eq!(MetricResult::new(1.7).score, 1.0);
        assert_eq!(MetricResult::new(-0.2).score, 0.0);
        assert_eq!(MetricResult::new(f64::NAN).score, 0.0);
    }

    #[test]
    fn direction_decides_threshold_side() {
        assert!(Direction::HigherIsBetter.passes(0.6, 0.5));
        assert!(!Direction::HigherIsBetter.passes(0.4, 0.5));
        assert!(Direction::LowerIsBetter.passes(0.1, 0.5));
        assert!(!Direction::LowerIsBetter.passes(0.9, 0.5));
    }
}
