use anyhow::{anyhow, Result};
use reqwest::StatusCode;
use serde::Deserialize;
use tavern_common::{define_module_client, optional_env, ModuleClient};
use uuid::Uuid;

/// Connection details for the external identity provider. Sessions and tokens
/// are issued there; this service only asks who a bearer token belongs to.
pub struct IdentityProvider {
    pub http: reqwest::Client,
    pub auth_url: String,
    pub api_key: String,
}

impl IdentityProvider {
    pub fn new(auth_url: &str, api_key: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            auth_url: auth_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct IdentityUser {
    id: Uuid,
}

define_module_client! {
    (struct IdentityClient, "identity")
    client_type: IdentityProvider,
    env: ["AUTH_URL", "AUTH_API_KEY"],
    setup: async {
        let auth_url = optional_env("AUTH_URL").ok_or(anyhow!("AUTH_URL is not set"))?;
        let api_key = optional_env("AUTH_API_KEY").ok_or(anyhow!("AUTH_API_KEY is not set"))?;
        Ok::<_, anyhow::Error>(IdentityProvider::new(&auth_url, &api_key))
    }
}

impl IdentityClient {
    pub fn new(auth_url: &str, api_key: &str) -> Self {
        Self::from_client(IdentityProvider::new(auth_url, api_key))
    }

    /// Resolves a bearer token to the owning user id.
    /// `Ok(None)` means the provider rejected the token.
    pub async fn verify(&self, token: &str) -> Result<Option<Uuid>> {
        let provider = self.get_client();
        let response = provider.http
            .get(format!("{}/user", provider.auth_url))
            .header("apikey", &provider.api_key)
            .bearer_auth(token)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                let user: IdentityUser = response.json().await?;
                Ok(Some(user.id))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(anyhow!("[IdentityClient::verify] provider returned {}: {}", status, body))
            }
        }
    }
}
