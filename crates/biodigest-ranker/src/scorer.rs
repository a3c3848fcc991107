//! Final score computation.
//!
//! final = relevance × 0.7 + heuristic × 0.3
//!       + 5 (code) + 3 (dataset) + 2 (figure) + 2 (social)
//!       − 10 (sim-only) − 5 (no-code) − 15 (greylisted)
//!
//! clamped to [0, 100] once, after every adjustment.

use serde::{Deserialize, Serialize};

use biodigest_common::Paper;

use crate::weights::ScoreWeights;

pub const RISK_SIM_ONLY: &str = "sim-only";
pub const RISK_NO_CODE: &str = "no-code";

/// Everything the combiner looks at, pulled out of a paper.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreInputs {
    pub relevance_score: f64,
    pub heuristic_score: f64,
    pub has_code: bool,
    pub has_dataset: bool,
    pub has_figure: bool,
    pub has_social: bool,
    pub sim_only: bool,
    pub no_code: bool,
    pub greylisted: bool,
}

impl ScoreInputs {
    pub fn from_paper(paper: &Paper) -> Self {
        Self {
            relevance_score: paper.relevance_score(),
            heuristic_score: paper.heuristic.score,
            has_code: !paper.links.code.is_empty(),
            has_dataset: !paper.links.datasets.is_empty(),
            has_figure: paper.enrichment.figure_url.is_some(),
            has_social: paper.enrichment.social_url.is_some(),
            sim_only: paper.has_risk_flag(RISK_SIM_ONLY),
            no_code: paper.has_risk_flag(RISK_NO_CODE),
            greylisted: paper.heuristic.greylisted,
        }
    }
}

pub fn compute_final_score(inputs: &ScoreInputs, weights: &ScoreWeights) -> f64 {
    let mut score = inputs.relevance_score * weights.relevance_weight
        + inputs.heuristic_score * weights.heuristic_weight;

    if inputs.has_code {
        score += weights.code_bonus;
    }
    if inputs.has_dataset {
        score += weights.dataset_bonus;
    }
    if inputs.has_figure {
        score += weights.figure_bonus;
    }
    if inputs.has_social {
        score += weights.social_bonus;
    }

    if inputs.sim_only {
        score -= weights.sim_only_penalty;
    }
    if inputs.no_code {
        score -= weights.no_code_penalty;
    }
    if inputs.greylisted {
        score -= weights.greylist_penalty;
    }

    if score.is_nan() {
        return 0.0;
    }
    score.clamp(0.0, 100.0)
}

/// Stateless combiner bound to one weight set.
#[derive(Debug, Clone, Default)]
pub struct ScoreCombiner {
    weights: ScoreWeights,
}

impl ScoreCombiner {
    pub fn new(weights: ScoreWeights) -> Self {
        Self { weights }
    }

    pub fn score(&self, paper: &Paper) -> f64 {
        compute_final_score(&ScoreInputs::from_paper(paper), &self.weights)
    }

    /// Attach final scores, preserving order.
    pub fn combine(&self, papers: Vec<Paper>) -> Vec<Paper> {
        papers
            .into_iter()
            .map(|p| {
                let score = self.score(&p);
                p.with_final_score(score)
            })
            .collect()
    }
}
