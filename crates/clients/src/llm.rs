use std::time::Duration;

use serde::Serialize;
use tavern_common::mask_token;

use crate::LlmEnv;

pub const DEFAULT_BASE_URL: &str = "https://api.openpipe.ai/v1";
pub const DEFAULT_MODEL: &str = "openpipe:Samantha-70b";

/// Sampling is deterministic and output length is capped; neither is tunable per request.
pub const TEMPERATURE: f32 = 0.0;
pub const MAX_TOKENS: u32 = 500;

#[derive(Debug, thiserror::Error)]
pub enum LlmClientError {
    #[error("completion provider API key is not configured")]
    MissingCredential,
    #[error("request to completion provider failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// HTTP handle on an OpenAI-compatible completion provider.
#[derive(Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl LlmClient {
    pub fn new(env: LlmEnv) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = env.openai_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder.build()?;

        match env.openai_api_key.as_deref() {
            Some(key) => tracing::info!(
                "[LlmClient::new] provider {} with key {}, model {}",
                env.openai_base_url, mask_token(key), env.openai_model
            ),
            None => tracing::warn!(
                "[LlmClient::new] OPENAI_API_KEY is not set, chat requests will fail"
            ),
        }

        Ok(Self {
            http,
            base_url: env.openai_base_url,
            api_key: env.openai_api_key,
            model: env.openai_model,
        })
    }

    pub fn from_parts(base_url: &str, api_key: Option<&str>, model: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.to_string(),
            api_key: api_key.map(str::to_string),
            model: model.to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    /// Posts a chat completion body. Fails before touching the network when no
    /// credential is configured. No retries are attempted.
    pub async fn post_completion<T: Serialize + ?Sized>(
        &self, body: &T,
    ) -> Result<reqwest::Response, LlmClientError> {
        let api_key = self.api_key.as_deref()
            .ok_or(LlmClientError::MissingCredential)?;

        tracing::debug!("[LlmClient::post_completion] POST {} model {}", self.completions_url(), self.model);
        let response = self.http
            .post(self.completions_url())
            .bearer_auth(api_key)
            .json(body)
            .send()
            .await?;

        Ok(response)
    }
}
