/// Failures of the chat pipeline. Each variant knows the HTTP status it is
/// reported with at the endpoint boundary.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Invalid request body format: {0}")]
    MalformedRequest(String),

    #[error("Character not found in request")]
    MissingCharacter,

    #[error("{0}")]
    InvalidMessages(String),

    #[error("{0} is not configured in environment variables")]
    Configuration(String),

    #[error("Completion provider error: {status}{}", format_body(.body))]
    Upstream { status: u16, body: String },

    #[error("Completion provider response unusable: {0}")]
    UpstreamContract(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] anyhow::Error),
}

fn format_body(body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!(" - {}", body)
    }
}

impl ChatError {
    pub fn status_code(&self) -> u16 {
        match self {
            ChatError::MalformedRequest(_) => 400,
            ChatError::MissingCharacter => 404,
            ChatError::InvalidMessages(_) => 400,
            ChatError::Configuration(_) => 500,
            ChatError::Upstream { status, .. } if (400..600).contains(status) => *status,
            ChatError::Upstream { .. } => 500,
            ChatError::UpstreamContract(_) => 500,
            ChatError::Persistence(_) => 500,
        }
    }
}

/// Rejected input to the conversation formatter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl From<ValidationError> for ChatError {
    fn from(err: ValidationError) -> Self {
        ChatError::InvalidMessages(err.0)
    }
}

impl From<tavern_clients::LlmClientError> for ChatError {
    fn from(err: tavern_clients::LlmClientError) -> Self {
        match err {
            tavern_clients::LlmClientError::MissingCredential => {
                ChatError::Configuration("Completion provider API key".to_string())
            }
            tavern_clients::LlmClientError::Transport(e) => ChatError::Upstream {
                status: e.status().map(|s| s.as_u16()).unwrap_or(500),
                body: e.to_string(),
            },
        }
    }
}
