//! biodigest-ranker — Deterministic relevance policy and digest tiering.
//! - Heuristic policy engine (drop / greylist / keep, boost scoring, bucket hints)
//! - Score combiner with tunable weights
//! - Tiered selector (top picks, buckets, noteworthy, excluded)

pub mod heuristics;
pub mod scorer;
pub mod tiers;
pub mod weights;

pub use heuristics::{HeuristicDecision, HeuristicEngine, HeuristicReport, TermSet};
pub use scorer::{compute_final_score, ScoreCombiner, ScoreInputs};
pub use tiers::{select_tiers, BucketGroup, TieredDigest};
pub use weights::ScoreWeights;
