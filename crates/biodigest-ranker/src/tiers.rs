//! Tiered selection.
//!
//! 1. Stable sort by final score, descending (ties keep arrival order).
//! 2. The first `top_picks_count` become top picks.
//! 3. Each remaining paper goes to the first configured bucket that appears
//!    in its classifier buckets. A paper is placed in at most one bucket.
//! 4. Unplaced papers scoring at least `noteworthy_threshold` are noteworthy.
//! 5. Everything else is excluded but kept for audit.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::info;

use biodigest_common::{Paper, Placement, SelectionConfig};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketGroup {
    pub name: String,
    pub papers: Vec<Paper>,
}

/// The digest's four mutually exclusive placements.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TieredDigest {
    pub top_picks: Vec<Paper>,
    /// Configured order; empty buckets are omitted.
    pub buckets: Vec<BucketGroup>,
    pub noteworthy: Vec<Paper>,
    pub excluded: Vec<Paper>,
}

impl TieredDigest {
    /// Papers shown in the digest (everything but `excluded`).
    pub fn included(&self) -> impl Iterator<Item = &Paper> {
        self.top_picks
            .iter()
            .chain(self.buckets.iter().flat_map(|b| b.papers.iter()))
            .chain(self.noteworthy.iter())
    }

    pub fn included_count(&self) -> usize {
        self.included().count()
    }

    /// Every processed paper, included or not.
    pub fn all(&self) -> impl Iterator<Item = &Paper> {
        self.included().chain(self.excluded.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.included_count() == 0
    }
}

/// Place `kept` papers into tiers. `rejected` papers (not kept by the
/// classifier) go straight to `excluded`.
pub fn select_tiers(
    kept: Vec<Paper>,
    rejected: Vec<Paper>,
    bucket_order: &[String],
    config: &SelectionConfig,
) -> TieredDigest {
    let mut ranked = kept;
    ranked.sort_by(|a, b| b.final_score.total_cmp(&a.final_score));

    let split = config.top_picks_count.min(ranked.len());
    let rest = ranked.split_off(split);

    let mut digest = TieredDigest {
        top_picks: ranked.into_iter().map(|p| p.placed(Placement::TopPick)).collect(),
        ..Default::default()
    };

    let mut used: HashSet<String> = HashSet::new();
    let mut groups: Vec<BucketGroup> = bucket_order
        .iter()
        .map(|name| BucketGroup { name: name.clone(), papers: Vec::new() })
        .collect();

    for paper in rest {
        let slot = if used.contains(&paper.canonical_id) {
            None
        } else {
            groups.iter().position(|g| paper.has_bucket(&g.name))
        };

        match slot {
            Some(i) => {
                used.insert(paper.canonical_id.clone());
                let name = groups[i].name.clone();
                groups[i].papers.push(paper.placed(Placement::Bucket(name)));
            }
            None if paper.final_score >= config.noteworthy_threshold => {
                digest.noteworthy.push(paper.placed(Placement::Noteworthy));
            }
            None => digest.excluded.push(paper.placed(Placement::Excluded)),
        }
    }

    digest.buckets = groups.into_iter().filter(|g| !g.papers.is_empty()).collect();
    digest.excluded.extend(rejected.into_iter().map(|p| p.placed(Placement::Excluded)));

    info!(
        top_picks = digest.top_picks.len(),
        buckets = digest.buckets.len(),
        bucketed = digest.buckets.iter().map(|b| b.papers.len()).sum::<usize>(),
        noteworthy = digest.noteworthy.len(),
        excluded = digest.excluded.len(),
        "Tiered selection complete"
    );
    digest
}
