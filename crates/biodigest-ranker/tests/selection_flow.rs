//! Heuristics → combiner → tiers over hand-built papers.

use pretty_assertions::assert_eq;

use biodigest_common::{default_buckets, Placement, RulesConfig, SelectionConfig};
use biodigest_ranker::{select_tiers, HeuristicEngine, ScoreCombiner, ScoreWeights};
use biodigest_test_utils::{verdict, PaperBuilder};

fn bucket_order() -> Vec<String> {
    default_buckets().into_iter().map(|b| b.name).collect()
}

#[test]
fn test_screen_score_and_place() {
    let engine = HeuristicEngine::new(&RulesConfig::default(), &default_buckets()).unwrap();

    let candidates = vec![
        PaperBuilder::new("arxiv:1")
            .title("A foundation model for histopathology")
            .abstract_text("Deep learning on patient slides. Code at https://github.com/lab/path.")
            .code("https://github.com/lab/path")
            .build(),
        PaperBuilder::new("arxiv:2")
            .title("Protein binding affinity with transformers")
            .abstract_text("We benchmark a transformer on a new dataset.")
            .dataset("https://zenodo.org/records/1")
            .build(),
        PaperBuilder::new("arxiv:3")
            .title("Cattle growth")
            .abstract_text("Livestock weight curves in veterinary practice.")
            .build(),
        PaperBuilder::new("arxiv:4")
            .title("Murine tumour volumes")
            .abstract_text("A mouse model study without any learning.")
            .build(),
    ];
    let screened = engine.filter_batch(candidates);
    assert_eq!(screened.dropped, 1);
    assert_eq!(screened.greylist_excluded, 1);
    assert_eq!(screened.kept.len(), 2);

    let first = &screened.kept[0];
    // foundation model (20) + co-occurrence (20)
    assert_eq!(first.heuristic.score, 40.0);
    assert_eq!(first.heuristic.detected_buckets, vec!["Medical Imaging".to_string()]);

    let classified: Vec<_> = screened
        .kept
        .into_iter()
        .map(|p| {
            let v = if p.canonical_id == "arxiv:1" {
                verdict(true, 90.0, &["Medical Imaging"])
            } else {
                verdict(true, 70.0, &["Protein & Molecular Modeling", "Drug Discovery"])
            };
            p.with_verdict(v)
        })
        .collect();

    let scored = ScoreCombiner::new(ScoreWeights::default()).combine(classified);
    // 90×0.7 + 40×0.3 + 5 (code)
    assert!((scored[0].final_score - 80.0).abs() < 1e-9, "got {}", scored[0].final_score);

    let rejected = vec![PaperBuilder::new("arxiv:5").verdict(verdict(false, 10.0, &[])).build()];
    let cfg = SelectionConfig { top_picks_count: 1, ..Default::default() };
    let digest = select_tiers(scored, rejected, &bucket_order(), &cfg);

    assert_eq!(digest.top_picks.len(), 1);
    assert_eq!(digest.top_picks[0].canonical_id, "arxiv:1");
    assert_eq!(digest.top_picks[0].placement, Placement::TopPick);

    let names: Vec<&str> = digest.buckets.iter().map(|b| b.name.as_str()).collect();
    // First configured bucket the paper was tagged with.
    assert_eq!(names, vec!["Drug Discovery"]);
    assert_eq!(digest.excluded.len(), 1);
    assert_eq!(digest.included_count(), 2);
}

#[test]
fn test_ties_keep_arrival_order() {
    let papers = vec![
        PaperBuilder::new("pmid:a").kept(70.0, &[]).final_score(70.0).build(),
        PaperBuilder::new("pmid:b").kept(70.0, &[]).final_score(70.0).build(),
        PaperBuilder::new("pmid:c").kept(70.0, &[]).final_score(70.0).build(),
    ];
    let cfg = SelectionConfig { top_picks_count: 2, ..Default::default() };
    let digest = select_tiers(papers, Vec::new(), &bucket_order(), &cfg);

    let top: Vec<&str> = digest.top_picks.iter().map(|p| p.canonical_id.as_str()).collect();
    assert_eq!(top, vec!["pmid:a", "pmid:b"]);
    assert_eq!(digest.noteworthy[0].canonical_id, "pmid:c");
}

#[test]
fn test_greylist_penalty_reaches_final_score() {
    let paper = PaperBuilder::new("doi:10.1/x")
        .kept(80.0, &[])
        .heuristic(0.0, true)
        .build();
    let scored = ScoreCombiner::default().combine(vec![paper]);
    // 56 - 15
    assert!((scored[0].final_score - 41.0).abs() < 1e-9);
}
