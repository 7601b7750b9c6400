use tavern_common::{optional_env, EnvVars};

use crate::llm::{DEFAULT_BASE_URL, DEFAULT_MODEL};

/// Completion provider settings. The credential is optional at startup;
/// a missing key surfaces as a configuration error on every chat request.
#[derive(Debug, Clone)]
pub struct LlmEnv {
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,
    pub openai_timeout_secs: Option<u64>,
}

impl EnvVars for LlmEnv {
    fn load() -> Self {
        let openai_timeout_secs = optional_env("OPENAI_TIMEOUT_SECS")
            .and_then(|raw| match raw.parse::<u64>() {
                Ok(secs) => Some(secs),
                Err(e) => {
                    tracing::warn!("[LlmEnv::load] ignoring OPENAI_TIMEOUT_SECS={raw:?}: {e}");
                    None
                }
            });

        Self {
            openai_api_key: optional_env("OPENAI_API_KEY"),
            openai_base_url: optional_env("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            openai_model: optional_env("OPENAI_MODEL")
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            openai_timeout_secs,
        }
    }

    fn get_env_var(&self, key: &str) -> Option<String> {
        match key {
            "OPENAI_API_KEY" => self.openai_api_key.clone(),
            "OPENAI_BASE_URL" => Some(self.openai_base_url.clone()),
            "OPENAI_MODEL" => Some(self.openai_model.clone()),
            "OPENAI_TIMEOUT_SECS" => self.openai_timeout_secs.map(|secs| secs.to_string()),
            _ => None,
        }
    }
}
