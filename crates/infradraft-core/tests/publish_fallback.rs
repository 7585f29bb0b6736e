use std::sync::Arc;

use infradraft_core::fakes::RecordingChannel;
use infradraft_core::{ArtifactFiles, PublishMetadata, PublishMode, Publisher, StageKind};
use tempfile::tempdir;

fn files(n: usize) -> ArtifactFiles {
    (1..=n)
        .map(|i| (format!("k8s/part-{i}.yaml"), format!("kind: ConfigMap # {i}\n")))
        .collect()
}

fn metadata() -> PublishMetadata {
    PublishMetadata {
        run_id: "feedbeef".into(),
        stage: StageKind::Kubernetes,
        reasoning: "pinned images".into(),
    }
}

#[tokio::test]
async fn failure_on_second_of_three_files_writes_all_three_locally() {
    let dir = tempdir().unwrap();
    let channel = Arc::new(RecordingChannel::failing_on(2));
    let publisher = Publisher::local(dir.path()).with_primary(channel.clone());

    let outcome = publisher.publish(&files(3), &metadata()).await.unwrap();

    assert_eq!(channel.committed(), vec!["k8s/part-1.yaml".to_string()]);
    assert_eq!(outcome.mode, PublishMode::LocalFallback);
    assert_eq!(outcome.paths.len(), 3);
    for i in 1..=3 {
        let written = std::fs::read_to_string(dir.path().join(format!("k8s/part-{i}.yaml"))).unwrap();
        assert_eq!(written, format!("kind: ConfigMap # {i}\n"));
    }
    assert!(outcome.primary_error.unwrap().contains("part-2"));
}

#[tokio::test]
async fn scenario_primary_throws_after_first_of_two_files() {
    let dir = tempdir().unwrap();
    let publisher = Publisher::local(dir.path()).with_primary(Arc::new(RecordingChannel::failing_on(2)));
    let outcome = publisher.publish(&files(2), &metadata()).await.unwrap();
    assert_eq!(outcome.mode.as_str(), "local_fallback");
    assert_eq!(outcome.paths.len(), 2);
}

#[tokio::test]
async fn successful_primary_writes_nothing_locally() {
    let dir = tempdir().unwrap();
    let channel = Arc::new(RecordingChannel::new());
    let publisher = Publisher::local(dir.path()).with_primary(channel.clone());

    let outcome = publisher.publish(&files(2), &metadata()).await.unwrap();
    assert_eq!(outcome.mode, PublishMode::RemotePr);
    assert_eq!(outcome.url.as_deref(), Some("https://example.test/pull/feedbeef"));
    assert!(outcome.paths.is_empty());
    assert_eq!(channel.committed().len(), 2);
    assert!(!dir.path().join("k8s").exists());
}

#[tokio::test]
async fn failed_fallback_is_fatal() {
    let dir = tempdir().unwrap();
    // A regular file where the target directory should be.
    std::fs::write(dir.path().join("k8s"), "not a directory").unwrap();
    let publisher = Publisher::local(dir.path()).with_primary(Arc::new(RecordingChannel::failing_on(1)));

    let err = publisher.publish(&files(1), &metadata()).await.unwrap_err();
    assert!(err.to_string().contains("local fallback failed"));
}
