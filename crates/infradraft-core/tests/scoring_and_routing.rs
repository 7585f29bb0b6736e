use infradraft_core::{
    compute_confidence, evaluate, route_action, Candidate, CandidateMetrics, EvaluationError,
    RecommendedAction,
};

fn candidate(id: &str, sec: u32, bp: u32, cx: u32, perf: u32, violations: usize) -> Candidate {
    Candidate::new(
        format!("content from {id}"),
        id,
        CandidateMetrics::new(sec, bp, cx, perf),
        (0..violations).map(|i| format!("rule-{i}")).collect(),
    )
}

#[test]
fn scenario_score_rounds_to_one_decimal() {
    let c = candidate("a", 95, 92, 10, 80, 0);
    assert_eq!(c.score_card().total, 91.6);
}

#[test]
fn score_is_a_pure_function_of_the_candidate() {
    for sec in (0..=100).step_by(7) {
        let c = candidate("a", sec, 100 - sec, sec / 2, 33, (sec % 3) as usize);
        assert_eq!(c.score_card(), c.score_card());
        assert!((0.0..=100.0).contains(&c.score_card().total));
    }
}

#[test]
fn evaluation_returns_the_max_and_breaks_ties_by_first_index() {
    let batches = vec![
        vec![
            candidate("a", 60, 60, 20, 50, 0),
            candidate("b", 90, 90, 20, 50, 0),
            candidate("c", 90, 90, 20, 50, 0),
        ],
        vec![
            candidate("a", 80, 80, 10, 80, 1),
            candidate("b", 70, 70, 10, 80, 0),
        ],
        vec![candidate("only", 1, 1, 99, 0, 4)],
    ];

    for batch in &batches {
        let best = batch
            .iter()
            .map(|c| c.score_card().total)
            .fold(f64::MIN, f64::max);
        let first_best = batch
            .iter()
            .position(|c| c.score_card().total == best)
            .unwrap();
        let selection = evaluate(batch).unwrap();
        assert_eq!(selection.score.total, best);
        assert_eq!(selection.index, first_best);
    }

    assert_eq!(evaluate(&batches[0]).unwrap().candidate.producer_id(), "b");
}

#[test]
fn empty_candidates_are_excluded_and_empty_batches_fail() {
    let empty = Candidate::new("", "blank", CandidateMetrics::new(100, 100, 0, 100), vec![]);
    let weak = candidate("weak", 10, 10, 90, 10, 0);
    let batch = vec![empty, weak];
    assert_eq!(evaluate(&batch).unwrap().candidate.producer_id(), "weak");
    assert_eq!(evaluate(&[]).unwrap_err(), EvaluationError::NoCandidates);
}

#[test]
fn confidence_never_decreases_with_security_or_best_practice() {
    for agreement in [0.0, 1.0 / 3.0, 1.0] {
        for repairs in 0..3 {
            let mut last = f64::MIN;
            for sec in 0..=100 {
                let c = compute_confidence(CandidateMetrics::new(sec, 50, 0, 0), agreement, repairs);
                assert!(c >= last);
                last = c;
            }
            let mut last = f64::MIN;
            for bp in 0..=100 {
                let c = compute_confidence(CandidateMetrics::new(50, bp, 0, 0), agreement, repairs);
                assert!(c >= last);
                last = c;
            }
        }
    }
}

#[test]
fn confidence_is_separate_from_selection_score() {
    let c = candidate("a", 95, 92, 10, 80, 0);
    let confidence = compute_confidence(c.metrics(), 1.0, 0);
    assert_eq!(c.score_card().total, 91.6);
    assert!((confidence - 85.6).abs() < 1e-9);
}

#[test]
fn routing_partitions_the_range_without_gaps() {
    let tier = |c: f64| route_action(c).action;
    let mut previous = tier(0.0);
    let mut boundaries = Vec::new();
    for step in 0..=1000 {
        let c = f64::from(step) / 10.0;
        let action = tier(c);
        assert!(action >= previous, "tiers must be monotone at {c}");
        if action != previous {
            boundaries.push(c);
        }
        assert_eq!(route_action(c).requires_human_gate, c < 90.0);
        previous = action;
    }
    assert_eq!(boundaries, vec![40.0, 70.0, 90.0]);
}

#[test]
fn scenario_confidence_55_routes_to_draft() {
    let d = route_action(55.0);
    assert_eq!(d.action, RecommendedAction::RecommendDraft);
    assert!(d.requires_human_gate);
    assert_eq!(d.confidence_score, 55.0);
}
