use async_openai::types::{CreateChatCompletionRequest, CreateChatCompletionRequestArgs};
use futures::Stream;
use serde::Deserialize;
use tavern_clients::{LlmClient, MAX_TOKENS, TEMPERATURE};

use crate::sse::decode_fragments;
use crate::{ChatError, Prompt};

/// Outcome of a single-shot completion call, validated in one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Success { content: String },
    Failure { status: u16, body: String },
}

impl Completion {
    pub fn into_content(self) -> Result<String, ChatError> {
        match self {
            Completion::Success { content } => Ok(content),
            Completion::Failure { status, body } => Err(ChatError::Upstream { status, body }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    message: Option<CompletionMessage>,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

fn parse_success(body: &str) -> Result<Completion, ChatError> {
    let response: CompletionResponse = serde_json::from_str(body)
        .map_err(|e| ChatError::UpstreamContract(format!("invalid JSON body: {e}")))?;

    let content = response.choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .filter(|content| !content.is_empty())
        .ok_or(ChatError::UpstreamContract("response missing required content".to_string()))?;

    Ok(Completion::Success { content })
}

/// Sends prompt envelopes to the completion provider. Holds no per-request
/// state; clones share one HTTP connection pool.
#[derive(Clone)]
pub struct CompletionGateway {
    client: LlmClient,
}

impl CompletionGateway {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }

    fn build_request(&self, envelope: &[Prompt], stream: bool) -> Result<CreateChatCompletionRequest, ChatError> {
        let messages = Prompt::pack(envelope)
            .map_err(|e| ChatError::InvalidMessages(e.to_string()))?;

        CreateChatCompletionRequestArgs::default()
            .model(self.client.model())
            .messages(messages)
            .temperature(TEMPERATURE)
            .max_tokens(MAX_TOKENS)
            .stream(stream)
            .build()
            .map_err(|e| ChatError::InvalidMessages(format!("[CompletionGateway] failed to build request: {e}")))
    }

    /// One outbound call, waiting for the full response.
    pub async fn complete(&self, envelope: &[Prompt]) -> Result<Completion, ChatError> {
        let request = self.build_request(envelope, false)?;
        tracing::info!("[CompletionGateway::complete] sending {} messages to {}", envelope.len(), self.client.model());

        let response = self.client.post_completion(&request).await?;
        let status = response.status();
        let body = response.text().await
            .map_err(|e| ChatError::Upstream { status: status.as_u16(), body: e.to_string() })?;

        if !status.is_success() {
            tracing::error!("[CompletionGateway::complete] provider returned {}: {}", status, body);
            return Ok(Completion::Failure { status: status.as_u16(), body });
        }

        let completion = parse_success(&body);
        if let Err(e) = &completion {
            tracing::error!("[CompletionGateway::complete] {}: {}", e, body);
        }
        completion
    }

    /// Opens a streaming call. Resolves once the provider has accepted the
    /// request; the returned fragments then arrive as the provider produces them.
    /// The stream cannot be restarted.
    pub async fn stream(
        &self, envelope: &[Prompt],
    ) -> Result<impl Stream<Item = String> + Send + 'static, ChatError> {
        let request = self.build_request(envelope, true)?;
        tracing::info!("[CompletionGateway::stream] streaming {} messages to {}", envelope.len(), self.client.model());

        let response = self.client.post_completion(&request).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("[CompletionGateway::stream] provider returned {}: {}", status, body);
            return Err(ChatError::Upstream { status: status.as_u16(), body });
        }

        Ok(decode_fragments(response.bytes_stream()))
    }
}
