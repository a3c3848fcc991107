//! Score combiner weights, bonuses and penalties.
//!
//! Defaults reproduce the digest's established scoring exactly. They are
//! exposed as configuration so they can be tuned without code changes.

use serde::{Deserialize, Serialize};

use biodigest_common::{DigestError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    /// Weight of the classifier's relevance score.
    pub relevance_weight: f64,
    /// Weight of the heuristic score.
    pub heuristic_weight: f64,

    pub code_bonus: f64,
    pub dataset_bonus: f64,
    pub figure_bonus: f64,
    pub social_bonus: f64,

    /// Subtracted when the classifier flags `sim-only`.
    pub sim_only_penalty: f64,
    /// Subtracted when the classifier flags `no-code`.
    pub no_code_penalty: f64,
    pub greylist_penalty: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            relevance_weight: 0.7,
            heuristic_weight: 0.3,
            code_bonus:       5.0,
            dataset_bonus:    3.0,
            figure_bonus:     2.0,
            social_bonus:     2.0,
            sim_only_penalty: 10.0,
            no_code_penalty:  5.0,
            greylist_penalty: 15.0,
        }
    }
}

impl ScoreWeights {
    /// Weights and adjustments must be finite and non-negative. Penalties
    /// are stored as magnitudes.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("relevance_weight", self.relevance_weight),
            ("heuristic_weight", self.heuristic_weight),
            ("code_bonus", self.code_bonus),
            ("dataset_bonus", self.dataset_bonus),
            ("figure_bonus", self.figure_bonus),
            ("social_bonus", self.social_bonus),
            ("sim_only_penalty", self.sim_only_penalty),
            ("no_code_penalty", self.no_code_penalty),
            ("greylist_penalty", self.greylist_penalty),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(DigestError::Config(format!("scoring.{name} must be a non-negative number, got {value}")));
            }
        }
        Ok(())
    }
}
