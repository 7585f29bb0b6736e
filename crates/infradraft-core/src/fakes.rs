//! Scripted capability fakes (testing only)
//!
//! Provides generators, prompts, validators, fixers and publish channels
//! that satisfy the capability contracts without any network or terminal.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::approval::{HumanPrompt, HumanResponse, PromptError, RenderedProposal};
use crate::artifacts::ArtifactFiles;
use crate::domain::{StageKind, ValidationResult};
use crate::generation::{GenerationError, Generator};
use crate::publish::{PublishChannel, PublishError, PublishMetadata, PublishReceipt};
use crate::repair::{FixError, Fixer, Validator, ValidatorFactory};

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

/// Returns scripted outputs in order, repeating the last one.
#[derive(Debug)]
pub struct ScriptedGenerator {
    id: String,
    outputs: Vec<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    contexts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(id: &str, output: impl Into<String>) -> Self {
        Self::sequence(id, vec![output.into()])
    }

    pub fn sequence(id: &str, outputs: Vec<String>) -> Self {
        Self {
            id: id.to_string(),
            outputs,
            delay: None,
            calls: AtomicUsize::new(0),
            contexts: Mutex::new(Vec::new()),
        }
    }

    /// Sleep before answering (for timeout tests).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Contexts received, in call order.
    pub fn contexts(&self) -> Vec<String> {
        self.contexts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn id(&self) -> &str {
        &self.id
    }

    async fn generate(&self, context: &str) -> Result<String, GenerationError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.contexts.lock().unwrap().push(context.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let index = n.min(self.outputs.len().saturating_sub(1));
        Ok(self.outputs.get(index).cloned().unwrap_or_default())
    }
}

/// Always fails with the given error.
#[derive(Debug)]
pub struct FailingGenerator {
    id: String,
    error: GenerationError,
}

impl FailingGenerator {
    pub fn new(id: &str, error: GenerationError) -> Self {
        Self {
            id: id.to_string(),
            error,
        }
    }
}

#[async_trait]
impl Generator for FailingGenerator {
    fn id(&self) -> &str {
        &self.id
    }

    async fn generate(&self, _context: &str) -> Result<String, GenerationError> {
        Err(self.error.clone())
    }
}

// ---------------------------------------------------------------------------
// Prompt
// ---------------------------------------------------------------------------

/// Answers with scripted responses; aborts once the script runs out.
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    responses: Mutex<VecDeque<HumanResponse>>,
    seen: Mutex<Vec<RenderedProposal>>,
}

impl ScriptedPrompt {
    pub fn new(responses: Vec<HumanResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Proposals shown so far.
    pub fn seen(&self) -> Vec<RenderedProposal> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl HumanPrompt for ScriptedPrompt {
    async fn ask(&self, proposal: &RenderedProposal) -> Result<HumanResponse, PromptError> {
        self.seen.lock().unwrap().push(proposal.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(PromptError::Aborted)
    }
}

// ---------------------------------------------------------------------------
// Validator / fixer
// ---------------------------------------------------------------------------

/// Fixed verdict validator that counts its calls.
#[derive(Debug)]
pub struct CountingValidator {
    errors: Vec<String>,
    calls: AtomicUsize,
}

impl CountingValidator {
    pub fn passing() -> Self {
        Self::failing(Vec::new())
    }

    pub fn failing(errors: Vec<String>) -> Self {
        Self {
            errors,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Factory handing out this validator for every stage.
    pub fn factory(self: &Arc<Self>) -> ValidatorFactory {
        let shared = Arc::clone(self);
        Arc::new(move |_stage: StageKind| shared.clone() as Arc<dyn Validator>)
    }
}

impl Validator for CountingValidator {
    fn validate(&self, _content: &str) -> ValidationResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ValidationResult::from_errors(self.errors.clone())
    }
}

/// Appends `# fix N` to the content on every call.
#[derive(Debug, Default)]
pub struct AppendingFixer {
    calls: AtomicUsize,
}

impl AppendingFixer {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Fixer for AppendingFixer {
    fn fix(&self, content: &str, _errors: &[String]) -> Result<String, FixError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("{content}\n# fix {n}"))
    }
}

/// Always raises.
#[derive(Debug, Default)]
pub struct FailingFixer;

impl Fixer for FailingFixer {
    fn fix(&self, _content: &str, _errors: &[String]) -> Result<String, FixError> {
        Err(FixError::Failed("scripted fixer failure".to_string()))
    }
}

// ---------------------------------------------------------------------------
// Publish channel
// ---------------------------------------------------------------------------

/// Records committed paths; optionally fails on the Nth file (1-based).
#[derive(Debug, Default)]
pub struct RecordingChannel {
    fail_on_file: Option<usize>,
    committed: Mutex<Vec<String>>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(file: usize) -> Self {
        Self {
            fail_on_file: Some(file),
            committed: Mutex::new(Vec::new()),
        }
    }

    /// Paths committed before any failure.
    pub fn committed(&self) -> Vec<String> {
        self.committed.lock().unwrap().clone()
    }
}

#[async_trait]
impl PublishChannel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn commit(
        &self,
        files: &ArtifactFiles,
        metadata: &PublishMetadata,
    ) -> Result<PublishReceipt, PublishError> {
        for (i, path) in files.keys().enumerate() {
            if self.fail_on_file == Some(i + 1) {
                return Err(PublishError::Primary(format!(
                    "commit of {path} rejected"
                )));
            }
            self.committed.lock().unwrap().push(path.clone());
        }
        Ok(PublishReceipt {
            url: format!("https://example.test/pull/{}", metadata.run_id),
        })
    }
}
