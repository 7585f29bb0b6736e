//! Concurrent draft generation with failure isolation.
//!
//! Each generator runs in its own tokio task bounded by a shared deadline.
//! A failing, panicking or hung generator yields an empty draft plus its
//! error; it never aborts or blocks its siblings.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use super::{GenerationError, Generator};

/// Result of one generator within a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftOutcome {
    pub producer_id: String,
    /// Empty when the generator failed.
    pub content: String,
    pub error: Option<String>,
    pub latency_ms: u64,
}

impl DraftOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// Everything a stage learns from one generation round, in roster order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationBatch {
    pub drafts: Vec<DraftOutcome>,
}

impl GenerationBatch {
    /// Total generators asked, including failed ones.
    pub fn generator_count(&self) -> usize {
        self.drafts.len()
    }

    /// Drafts that carry content, in roster order.
    pub fn non_empty(&self) -> impl Iterator<Item = &DraftOutcome> {
        self.drafts.iter().filter(|d| !d.is_empty())
    }

    pub fn non_empty_count(&self) -> usize {
        self.non_empty().count()
    }

    pub fn all_failed(&self) -> bool {
        self.non_empty_count() == 0
    }

    /// Fraction of generators whose output is longer than `min_chars`.
    pub fn agreement_ratio(&self, min_chars: usize) -> f64 {
        if self.drafts.is_empty() {
            return 0.0;
        }
        let agreeing = self
            .drafts
            .iter()
            .filter(|d| d.content.trim().chars().count() > min_chars)
            .count();
        agreeing as f64 / self.drafts.len() as f64
    }
}

/// Run every generator concurrently against the same context.
///
/// Returns once all tasks finish or `timeout` elapses, whichever comes first.
/// Generators still running at the deadline are cancelled and reported as
/// [`GenerationError::Timeout`]. Nothing is retried.
#[instrument(skip(generators, context), fields(generators = generators.len()))]
pub async fn run_generators_parallel(
    generators: &[Arc<dyn Generator>],
    context: &str,
    timeout: Duration,
) -> GenerationBatch {
    let deadline = tokio::time::Instant::now() + timeout;
    let context: Arc<str> = Arc::from(context);

    let tasks = generators.iter().map(|generator| {
        let generator = Arc::clone(generator);
        let context = Arc::clone(&context);
        let producer_id = generator.id().to_string();

        let handle = tokio::spawn(async move {
            let started = Instant::now();
            let result = tokio::time::timeout_at(deadline, generator.generate(&context)).await;
            let latency_ms = started.elapsed().as_millis() as u64;
            let result = result.unwrap_or(Err(GenerationError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            }));
            (result, latency_ms)
        });

        async move {
            match handle.await {
                Ok((result, latency_ms)) => settle(producer_id, result, latency_ms),
                Err(join_err) => settle(
                    producer_id,
                    Err(GenerationError::Panicked(join_err.to_string())),
                    0,
                ),
            }
        }
    });

    let drafts = join_all(tasks).await;
    let batch = GenerationBatch { drafts };
    info!(
        non_empty = batch.non_empty_count(),
        total = batch.generator_count(),
        "generation batch complete"
    );
    batch
}

fn settle(
    producer_id: String,
    result: Result<String, GenerationError>,
    latency_ms: u64,
) -> DraftOutcome {
    match result {
        Ok(content) => {
            info!(generator = %producer_id, latency_ms = latency_ms, "generator completed");
            DraftOutcome {
                producer_id,
                content,
                error: None,
                latency_ms,
            }
        }
        Err(e) => {
            warn!(generator = %producer_id, latency_ms = latency_ms, error = %e, "generator failed");
            DraftOutcome {
                producer_id,
                content: String::new(),
                error: Some(e.to_string()),
                latency_ms,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(id: &str, content: &str) -> DraftOutcome {
        DraftOutcome {
            producer_id: id.into(),
            content: content.into(),
            error: None,
            latency_ms: 0,
        }
    }

    #[test]
    fn test_agreement_ratio_counts_long_outputs() {
        let batch = GenerationBatch {
            drafts: vec![
                draft("a", &"A".repeat(150)),
                draft("b", ""),
                draft("c", &"B".repeat(200)),
            ],
        };
        assert!((batch.agreement_ratio(100) - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(batch.non_empty_count(), 2);
        assert!(!batch.all_failed());
    }

    #[test]
    fn test_exactly_threshold_does_not_agree() {
        let batch = GenerationBatch {
            drafts: vec![draft("a", &"x".repeat(100))],
        };
        assert_eq!(batch.agreement_ratio(100), 0.0);
    }

    #[test]
    fn test_empty_batch() {
        let batch = GenerationBatch { drafts: vec![] };
        assert_eq!(batch.agreement_ratio(100), 0.0);
        assert!(batch.all_failed());
    }
}
