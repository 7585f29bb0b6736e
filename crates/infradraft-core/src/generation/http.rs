//! OpenAI-compatible chat-completions generator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::parse::parse_or_plain;
use super::{GenerationError, Generator};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Generator backed by a remote chat-completions endpoint.
pub struct HttpGenerator {
    id: String,
    model: String,
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpGenerator {
    pub fn new(
        id: impl Into<String>,
        model: impl Into<String>,
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("infradraft/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GenerationError::Unavailable(e.to_string()))?;
        Ok(Self {
            id: id.into(),
            model: model.into(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            client,
        })
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    fn id(&self) -> &str {
        &self.id
    }

    async fn generate(&self, context: &str) -> Result<String, GenerationError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: context,
            }],
            temperature: 0.2,
        };

        let response: ChatResponse = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let raw = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| GenerationError::Transport("response carried no content".into()))?;

        let output = parse_or_plain(&raw)?;
        if !output.reasoning.is_empty() {
            debug!(generator = %self.id, reasoning = %output.reasoning, "model reasoning");
        }
        Ok(output.content)
    }
}
