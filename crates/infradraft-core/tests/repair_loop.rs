use infradraft_core::fakes::{AppendingFixer, CountingValidator, FailingFixer};
use infradraft_core::{
    assess, repair_until_valid, CandidateMetrics, RecommendedAction, RepairOutcome, RepairPolicy,
};

#[test]
fn always_failing_validator_returns_third_fix_unchanged() {
    let validator = CountingValidator::failing(vec!["bad".into()]);
    let fixer = AppendingFixer::default();
    let report = repair_until_valid("draft", &validator, &fixer, RepairPolicy::default());

    assert_eq!(report.outcome, RepairOutcome::Exhausted);
    assert_eq!(report.content, "draft\n# fix 1\n# fix 2\n# fix 3");
    assert_eq!(validator.calls(), 3);
    assert_eq!(fixer.calls(), 3);
    assert_eq!(report.last_errors, vec!["bad".to_string()]);
    assert!(report.unresolved());
}

#[test]
fn loop_terminates_within_max_retries_validator_calls() {
    for max_retries in 0..6 {
        let validator = CountingValidator::failing(vec!["never".into()]);
        let fixer = AppendingFixer::default();
        let report = repair_until_valid("x", &validator, &fixer, RepairPolicy { max_retries });
        assert!(validator.calls() <= max_retries as usize);
        assert_eq!(report.validator_calls, max_retries);
    }
}

#[test]
fn fixer_error_stops_early_and_is_distinct_from_no_change() {
    let validator = CountingValidator::failing(vec!["bad".into()]);
    let report = repair_until_valid("orig", &validator, &FailingFixer, RepairPolicy::default());

    assert_eq!(validator.calls(), 1);
    assert_eq!(report.content, "orig");
    match &report.outcome {
        RepairOutcome::FixerFailed { reason } => assert!(reason.contains("scripted")),
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn passing_content_needs_one_call() {
    let validator = CountingValidator::passing();
    let report = repair_until_valid("ok", &validator, &FailingFixer, RepairPolicy::default());
    assert!(report.is_valid());
    assert_eq!(validator.calls(), 1);
    assert_eq!(report.fixes_applied, 0);
}

#[test]
fn unresolved_repair_forces_lowest_tier_regardless_of_score() {
    let validator = CountingValidator::failing(vec!["bad".into()]);
    let fixer = AppendingFixer::default();
    let report = repair_until_valid("x", &validator, &fixer, RepairPolicy::default());

    let perfect = CandidateMetrics::new(100, 100, 0, 100);
    let decision = assess(perfect, 1.0, &report, &[]);
    assert_eq!(decision.action, RecommendedAction::ManualIntervention);
    assert!(decision.requires_human_gate);
}
