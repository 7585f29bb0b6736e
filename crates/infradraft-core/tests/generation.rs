use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use infradraft_core::fakes::{FailingGenerator, ScriptedGenerator};
use infradraft_core::{
    build_generators, run_generators_parallel, GenerationError, Generator, GeneratorSpec,
    StageKind, StubGenerator,
};

struct PanickingGenerator;

#[async_trait]
impl Generator for PanickingGenerator {
    fn id(&self) -> &str {
        "panics"
    }

    async fn generate(&self, _context: &str) -> Result<String, GenerationError> {
        panic!("generator blew up");
    }
}

#[tokio::test]
async fn three_generators_with_one_empty_give_two_thirds_agreement() {
    let generators: Vec<Arc<dyn Generator>> = vec![
        Arc::new(ScriptedGenerator::new("a", "A".repeat(150))),
        Arc::new(ScriptedGenerator::new("b", "")),
        Arc::new(ScriptedGenerator::new("c", "B".repeat(200))),
    ];
    let batch = run_generators_parallel(&generators, "STAGE: dockerfile", Duration::from_secs(5)).await;

    assert_eq!(batch.generator_count(), 3);
    assert_eq!(batch.non_empty_count(), 2);
    assert!((batch.agreement_ratio(100) - 2.0 / 3.0).abs() < 1e-9);
    let ids: Vec<_> = batch.drafts.iter().map(|d| d.producer_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
}

#[tokio::test(start_paused = true)]
async fn hung_generator_times_out_without_blocking_siblings() {
    let generators: Vec<Arc<dyn Generator>> = vec![
        Arc::new(ScriptedGenerator::new("fast", "FROM alpine:3.19")),
        Arc::new(ScriptedGenerator::new("slow", "late").with_delay(Duration::from_secs(600))),
    ];
    let batch = run_generators_parallel(&generators, "ctx", Duration::from_secs(120)).await;

    assert_eq!(batch.drafts[0].content, "FROM alpine:3.19");
    assert!(batch.drafts[0].succeeded());
    assert!(batch.drafts[1].is_empty());
    assert!(batch.drafts[1].error.as_deref().unwrap().contains("timed out"));
}

#[tokio::test]
async fn failures_and_panics_are_isolated() {
    let generators: Vec<Arc<dyn Generator>> = vec![
        Arc::new(FailingGenerator::new(
            "down",
            GenerationError::Transport("connection refused".into()),
        )),
        Arc::new(PanickingGenerator),
        Arc::new(ScriptedGenerator::new("ok", "services:\n  web: {}")),
    ];
    let batch = run_generators_parallel(&generators, "ctx", Duration::from_secs(5)).await;

    assert!(batch.drafts[0].error.as_deref().unwrap().contains("connection refused"));
    assert!(batch.drafts[1].error.as_deref().unwrap().contains("panicked"));
    assert!(batch.drafts[2].succeeded());
    assert_eq!(batch.non_empty_count(), 1);
}

#[tokio::test]
async fn all_failing_generators_mark_batch_failed() {
    let generators: Vec<Arc<dyn Generator>> = vec![
        Arc::new(FailingGenerator::new("x", GenerationError::Unavailable("no key".into()))),
        Arc::new(ScriptedGenerator::new("y", "   ")),
    ];
    let batch = run_generators_parallel(&generators, "ctx", Duration::from_secs(5)).await;
    assert!(batch.all_failed());
    assert_eq!(batch.agreement_ratio(100), 0.0);
}

#[tokio::test]
async fn factory_falls_back_to_stub_generators() {
    let specs = vec![GeneratorSpec::new("local", "none", "INFRADRAFT_TEST_KEY_THAT_IS_NEVER_SET")];
    let generators = build_generators(&specs);
    assert_eq!(generators.len(), 1);
    assert_eq!(generators[0].id(), "stub-local");

    let out = generators[0].generate("STAGE: kubernetes\n").await.unwrap();
    assert_eq!(out, StubGenerator::new("stub-local").draft_for(StageKind::Kubernetes));
}
