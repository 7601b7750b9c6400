use std::sync::Arc;

use anyhow::Result;
use tavern_clients::{IdentityClient, LlmClient, LlmEnv, PostgresClient, R2Client};
use tavern_common::{EnvVars, ModuleClient};
use tavern_runtime::{ChatStore, CompletionGateway, MemoryChatStore, PgChatStore};

/// Shared handles built once at startup and cloned into every request.
/// Optional modules are `None` when their environment is missing.
#[derive(Clone)]
pub struct GlobalState {
    pub gateway: CompletionGateway,
    pub store: Arc<dyn ChatStore>,
    pub r2_client: Option<R2Client>,
    pub identity_client: Option<IdentityClient>,
}

impl GlobalState {
    pub async fn new() -> Result<Self> {
        let gateway = CompletionGateway::new(LlmClient::new(LlmEnv::load())?);

        let store: Arc<dyn ChatStore> = match PostgresClient::try_setup_connection().await? {
            Some(db) => {
                let store = PgChatStore::new(db);
                store.init_schema().await?;
                Arc::new(store)
            }
            None => {
                tracing::warn!("[GlobalState::new] DATABASE_URL is not set, using in-memory storage");
                Arc::new(MemoryChatStore::new())
            }
        };

        let r2_client = R2Client::try_setup_connection().await?;
        let identity_client = IdentityClient::try_setup_connection().await?;

        Ok(Self::from_parts(gateway, store, r2_client, identity_client))
    }

    pub fn from_parts(
        gateway: CompletionGateway,
        store: Arc<dyn ChatStore>,
        r2_client: Option<R2Client>,
        identity_client: Option<IdentityClient>,
    ) -> Self {
        Self { gateway, store, r2_client, identity_client }
    }
}
