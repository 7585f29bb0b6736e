//! Draft generation: the generator capability, its implementations, and the
//! parallel fan-out that collects one draft per generator.

pub mod factory;
pub mod http;
pub mod parallel;
pub mod parse;
pub mod stub;

use async_trait::async_trait;

pub use factory::build_generators;
pub use http::HttpGenerator;
pub use parallel::{run_generators_parallel, DraftOutcome, GenerationBatch};
pub use parse::{parse_model_output, parse_or_plain, strip_code_fence, ModelOutput, ParseError};
pub use stub::StubGenerator;

/// Per-generator failure. Always isolated to the generator that raised it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("unparseable model output: {0}")]
    Parse(#[from] ParseError),

    #[error("generator task panicked: {0}")]
    Panicked(String),

    #[error("generator unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        GenerationError::Transport(err.to_string())
    }
}

/// Produces one candidate artifact from a context blob.
///
/// Implementations must be safe to call concurrently with other generator
/// instances.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Producer id recorded on candidates.
    fn id(&self) -> &str;

    async fn generate(&self, context: &str) -> Result<String, GenerationError>;

    /// Canned drafts rather than model output; never auto-approved.
    fn is_stub(&self) -> bool {
        false
    }
}
